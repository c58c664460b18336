use crate::reflector::ReflectorConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: "Vitrine".to_string(), width: 1280, height: 720, vsync: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneConfig {
    pub model_path: String,
    #[serde(default)]
    pub lightmap_path: Option<String>,
    #[serde(default = "SceneConfig::default_lightmap_intensity")]
    pub lightmap_intensity: f32,
}

impl SceneConfig {
    const fn default_lightmap_intensity() -> f32 {
        1.0
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            model_path: "assets/models/scene.gltf".to_string(),
            lightmap_path: None,
            lightmap_intensity: Self::default_lightmap_intensity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "CameraConfig::default_position")]
    pub position: [f32; 3],
    #[serde(default)]
    pub target: [f32; 3],
    #[serde(default = "CameraConfig::default_fov_degrees")]
    pub fov_degrees: f32,
    #[serde(default = "CameraConfig::default_near")]
    pub near: f32,
    #[serde(default = "CameraConfig::default_far")]
    pub far: f32,
}

impl CameraConfig {
    const fn default_position() -> [f32; 3] {
        [20.0, 20.0, 20.0]
    }

    const fn default_fov_degrees() -> f32 {
        10.0
    }

    const fn default_near() -> f32 {
        0.1
    }

    const fn default_far() -> f32 {
        1000.0
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Self::default_position(),
            target: [0.0, 0.0, 0.0],
            fov_degrees: Self::default_fov_degrees(),
            near: Self::default_near(),
            far: Self::default_far(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LightingConfig {
    #[serde(default = "LightingConfig::default_direction")]
    pub direction: [f32; 3],
    #[serde(default = "LightingConfig::default_color")]
    pub color: [f32; 3],
    #[serde(default = "LightingConfig::default_ambient")]
    pub ambient: [f32; 3],
    #[serde(default = "LightingConfig::default_background")]
    pub background: [f32; 3],
}

impl LightingConfig {
    const fn default_direction() -> [f32; 3] {
        [-0.4, -0.8, -0.35]
    }

    const fn default_color() -> [f32; 3] {
        [1.0, 1.0, 1.0]
    }

    const fn default_ambient() -> [f32; 3] {
        [0.25, 0.25, 0.28]
    }

    // #111 from the reference scene.
    const fn default_background() -> [f32; 3] {
        [0.067, 0.067, 0.067]
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            direction: Self::default_direction(),
            color: Self::default_color(),
            ambient: Self::default_ambient(),
            background: Self::default_background(),
        }
    }
}

/// Global reflection settings. Both knobs the reference behavior hard-codes
/// are configuration here; resolution can still be overridden per mirror.
#[derive(Debug, Clone, Deserialize)]
pub struct ReflectionConfig {
    #[serde(default = "ReflectionConfig::default_throttle_period")]
    pub throttle_period: u32,
    #[serde(default = "ReflectionConfig::default_resolution")]
    pub resolution: u32,
}

impl ReflectionConfig {
    const fn default_throttle_period() -> u32 {
        6
    }

    const fn default_resolution() -> u32 {
        1024
    }
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            throttle_period: Self::default_throttle_period(),
            resolution: Self::default_resolution(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ViewerConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub scene: SceneConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub lighting: LightingConfig,
    #[serde(default)]
    pub reflection: ReflectionConfig,
    #[serde(default)]
    pub reflectors: Vec<ReflectorConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct ViewerConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
}

impl ViewerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                eprintln!("[config] load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ViewerConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(vsync) = overrides.vsync {
            self.window.vsync = vsync;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_behavior() {
        let config = ViewerConfig::default();
        assert_eq!(config.reflection.throttle_period, 6);
        assert_eq!(config.reflection.resolution, 1024);
        assert!(config.reflectors.is_empty());
        assert!((config.camera.fov_degrees - 10.0).abs() < f32::EPSILON);
    }

    #[test]
    fn parses_reflector_list_with_sparse_fields() {
        let json = r#"{
            "scene": { "model_path": "assets/models/room.gltf" },
            "reflectors": [
                {
                    "position": [0.0, 1.0, 1.75],
                    "rotation": [-3.14159265, 0.0, 0.0],
                    "width": 1.74,
                    "height": 1.96,
                    "clip_bias": 0.003,
                    "overlay_opacity": 0.5
                },
                { "position": [0, 0, 0], "rotation": [0, 0, 0], "width": 0.25, "height": 1.11 }
            ]
        }"#;
        let config: ViewerConfig = serde_json::from_str(json).expect("parse");
        assert_eq!(config.reflectors.len(), 2);
        let first = &config.reflectors[0];
        assert!((first.clip_bias - 0.003).abs() < 1e-6);
        assert!((first.overlay_offset[2] + 0.01).abs() < 1e-6);
        let second = &config.reflectors[1];
        assert_eq!(second.clip_bias, 0.0);
        assert_eq!(second.overlay_opacity, 0.0);
        assert!(second.resolution.is_none());
    }

    #[test]
    fn load_reads_file_and_overrides_apply() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "window": {{ "title": "t", "width": 640, "height": 480, "vsync": true }} }}"#)
            .expect("write config");
        let mut config = ViewerConfig::load(file.path()).expect("load");
        assert_eq!(config.window.width, 640);

        config.apply_overrides(&ViewerConfigOverrides {
            width: Some(800),
            height: None,
            vsync: Some(false),
        });
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 480);
        assert!(!config.window.vsync);
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let config = ViewerConfig::load_or_default("no/such/config.json");
        assert_eq!(config.window.width, 1280);
    }
}
