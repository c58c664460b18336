use crate::texture::{ColorTexture, HdrTexture};
use std::sync::Arc;

/// Reference to a decoded color map plus its sampling parameters.
#[derive(Clone, Debug)]
pub struct TextureRef {
    pub texture: Arc<ColorTexture>,
    pub tex_coord: u32,
    pub srgb: bool,
    pub scale: f32,
}

/// Baked-illumination binding. The channel index is pinned to the second UV
/// set and the texture is sampled as raw radiance, never gamma decoded.
#[derive(Clone, Debug)]
pub struct LightmapBinding {
    pub texture: Arc<HdrTexture>,
    pub intensity: f32,
    pub tex_coord: u32,
}

pub const LIGHTMAP_TEX_COORD: u32 = 1;

impl LightmapBinding {
    pub fn new(texture: Arc<HdrTexture>, intensity: f32) -> Self {
        Self { texture, intensity, tex_coord: LIGHTMAP_TEX_COORD }
    }
}

#[derive(Clone, Debug)]
pub struct PbrMaterial {
    pub label: String,
    pub base_color_factor: [f32; 4],
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub emissive_factor: [f32; 3],
    pub base_color_texture: Option<TextureRef>,
    pub metallic_roughness_texture: Option<TextureRef>,
    pub normal_texture: Option<TextureRef>,
    pub emissive_texture: Option<TextureRef>,
    pub lightmap: Option<LightmapBinding>,
    pub flat_shading: bool,
}

#[derive(Clone, Debug)]
pub struct UnlitMaterial {
    pub label: String,
    pub color: [f32; 3],
    pub opacity: f32,
}

/// Per-surface material. Only the Pbr variant has a lightmap input slot; the
/// lightmap binder skips every other variant silently.
#[derive(Clone, Debug)]
pub enum Material {
    Pbr(PbrMaterial),
    Unlit(UnlitMaterial),
}

impl PbrMaterial {
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            base_color_factor: [1.0, 1.0, 1.0, 1.0],
            metallic_factor: 0.0,
            roughness_factor: 1.0,
            emissive_factor: [0.0, 0.0, 0.0],
            base_color_texture: None,
            metallic_roughness_texture: None,
            normal_texture: None,
            emissive_texture: None,
            lightmap: None,
            flat_shading: false,
        }
    }
}

impl Material {
    pub fn label(&self) -> &str {
        match self {
            Material::Pbr(material) => &material.label,
            Material::Unlit(material) => &material.label,
        }
    }

    pub fn as_pbr_mut(&mut self) -> Option<&mut PbrMaterial> {
        match self {
            Material::Pbr(material) => Some(material),
            Material::Unlit(_) => None,
        }
    }
}
