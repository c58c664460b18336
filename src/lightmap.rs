use crate::material::LightmapBinding;
use crate::scene::Scene;
use crate::texture::HdrTexture;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Recomputes smooth vertex normals for every surface in the scene. Split out
/// from binding because it has no dependency on the lightmap texture: it runs
/// even when the texture fails to load.
pub fn recompute_scene_normals(scene: &mut Scene) {
    scene.for_each_surface_mut(|surface| {
        surface.geometry.compute_vertex_normals();
        surface.geometry.compute_tangents();
    });
}

/// Attaches a lightmap to every qualifying material in the scene.
///
/// Per surface: normals are recomputed for smooth shading, the primary UV
/// channel is duplicated into the lightmap channel when that is missing, and
/// each PBR material receives a `LightmapBinding` on the second UV set with
/// every other texture channel left untouched. Surfaces without any UV data
/// and materials without a lightmap slot are skipped silently.
///
/// Mutates geometry and materials in place. Safe to invoke more than once:
/// the UV copy is guarded by existence and rebinding replaces the binding
/// with identical state.
pub fn bind_lightmap(scene: &mut Scene, lightmap: &Arc<HdrTexture>, intensity: f32) {
    let mut bound = 0usize;
    let mut skipped = 0usize;
    scene.for_each_surface_mut(|surface| {
        let geometry = &mut surface.geometry;
        geometry.compute_vertex_normals();
        geometry.compute_tangents();

        if geometry.uv2.is_none() {
            match geometry.uv.as_ref() {
                Some(uv) => geometry.uv2 = Some(uv.clone()),
                // No UV data at all: nothing to sample the lightmap with.
                None => {
                    skipped += 1;
                    return;
                }
            }
        }

        for material in &mut surface.materials {
            match material.as_pbr_mut() {
                Some(pbr) => {
                    pbr.lightmap = Some(LightmapBinding::new(lightmap.clone(), intensity));
                    pbr.flat_shading = false;
                    bound += 1;
                }
                None => skipped += 1,
            }
        }
    });
    eprintln!("[lightmap] bound '{}' to {} material(s), {} skipped", lightmap.label, bound, skipped);
}

/// Loads the lightmap texture and binds it to the scene. When the load fails
/// the error propagates before any material is mutated, so the scene keeps
/// rendering with its original maps.
pub fn load_and_bind(scene: &mut Scene, path: impl AsRef<Path>, intensity: f32) -> Result<Arc<HdrTexture>> {
    let path = path.as_ref();
    let texture = Arc::new(
        HdrTexture::load(path).with_context(|| format!("Failed to load lightmap {}", path.display()))?,
    );
    bind_lightmap(scene, &texture, intensity);
    Ok(texture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::material::{Material, PbrMaterial};
    use crate::scene::{SceneNode, Surface};
    use glam::{Mat4, Vec3};
    use smallvec::smallvec;

    fn test_lightmap() -> Arc<HdrTexture> {
        Arc::new(HdrTexture {
            label: "test-lightmap".to_string(),
            width: 1,
            height: 1,
            pixels: vec![Vec3::ONE],
        })
    }

    #[test]
    fn surface_without_uv_is_left_alone() {
        let mut geometry = Geometry::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 2],
        );
        geometry.uv = None;
        let mut scene = Scene::default();
        scene.push(SceneNode::Surface(Surface {
            name: None,
            transform: Mat4::IDENTITY,
            geometry,
            materials: smallvec![Material::Pbr(PbrMaterial::with_label("bare"))],
        }));

        bind_lightmap(&mut scene, &test_lightmap(), 1.0);
        scene.for_each_surface(|surface| {
            assert!(surface.geometry.uv2.is_none());
            match &surface.materials[0] {
                Material::Pbr(pbr) => assert!(pbr.lightmap.is_none()),
                _ => unreachable!(),
            }
        });
    }

    #[test]
    fn binding_pins_channel_and_intensity() {
        let mut scene = Scene::default();
        scene.push(SceneNode::Surface(Surface {
            name: None,
            transform: Mat4::IDENTITY,
            geometry: Geometry::plane(1.0, 1.0),
            materials: smallvec![Material::Pbr(PbrMaterial::with_label("wall"))],
        }));

        bind_lightmap(&mut scene, &test_lightmap(), 0.75);
        scene.for_each_surface(|surface| {
            let uv = surface.geometry.uv.as_ref().unwrap();
            let uv2 = surface.geometry.uv2.as_ref().unwrap();
            assert_eq!(uv, uv2);
            match &surface.materials[0] {
                Material::Pbr(pbr) => {
                    let binding = pbr.lightmap.as_ref().expect("lightmap bound");
                    assert_eq!(binding.tex_coord, 1);
                    assert!((binding.intensity - 0.75).abs() < f32::EPSILON);
                    assert!(!pbr.flat_shading);
                }
                _ => unreachable!(),
            }
        });
    }

    #[test]
    fn failed_load_leaves_materials_untouched() {
        let mut scene = Scene::default();
        scene.push(SceneNode::Surface(Surface {
            name: None,
            transform: Mat4::IDENTITY,
            geometry: Geometry::plane(1.0, 1.0),
            materials: smallvec![Material::Pbr(PbrMaterial::with_label("wall"))],
        }));

        assert!(load_and_bind(&mut scene, "missing/lightmap.hdr", 1.0).is_err());
        scene.for_each_surface(|surface| match &surface.materials[0] {
            Material::Pbr(pbr) => assert!(pbr.lightmap.is_none()),
            _ => unreachable!(),
        });
    }
}
