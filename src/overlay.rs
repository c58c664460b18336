use crate::geometry::Geometry;
use crate::material::UnlitMaterial;
use crate::reflector::ReflectorConfig;
use glam::{Mat4, Vec3};

/// Translucent darkening quad drawn coplanar with a mirror to fake the
/// dielectric tint of real glass. Pure overdraw: it neither reads the
/// reflection target nor is read by it.
#[derive(Clone, Debug)]
pub struct OverlayQuad {
    pub geometry: Geometry,
    pub material: UnlitMaterial,
    pub model: Mat4,
}

/// Builds the overlay for a mirror config, or `None` when the configured
/// opacity is zero — the quad is skipped entirely, not drawn invisible.
pub fn build_overlay(config: &ReflectorConfig) -> Option<OverlayQuad> {
    if config.overlay_opacity <= 0.0 {
        return None;
    }
    let geometry = Geometry::plane(config.width, config.height);
    let position = Vec3::from_array(config.position) + Vec3::from_array(config.overlay_offset);
    let model = Mat4::from_rotation_translation(config.rotation_quat(), position);
    Some(OverlayQuad {
        geometry,
        material: UnlitMaterial {
            label: "reflector-overlay".to_string(),
            color: [0.0, 0.0, 0.0],
            opacity: config.overlay_opacity.min(1.0),
        },
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(overlay_opacity: f32) -> ReflectorConfig {
        ReflectorConfig {
            position: [0.0, 1.0, 1.75],
            rotation: [-std::f32::consts::PI, 0.0, 0.0],
            width: 1.74,
            height: 1.96,
            color: [0.63, 0.63, 0.63],
            clip_bias: 0.003,
            overlay_opacity,
            overlay_offset: [0.0, 0.0, -0.01],
            resolution: None,
        }
    }

    #[test]
    fn zero_opacity_skips_overlay() {
        assert!(build_overlay(&config(0.0)).is_none());
        assert!(build_overlay(&config(-1.0)).is_none());
    }

    #[test]
    fn overlay_is_congruent_and_offset() {
        let overlay = build_overlay(&config(0.5)).expect("overlay");
        assert_eq!(overlay.geometry.vertex_count(), 4);
        assert!((overlay.material.opacity - 0.5).abs() < f32::EPSILON);

        // Offset is applied to the quad origin, rotation matches the mirror.
        let origin = overlay.model.transform_point3(Vec3::ZERO);
        assert!(origin.distance(Vec3::new(0.0, 1.0, 1.74)) < 1e-5);
    }

    #[test]
    fn opacity_is_clamped_to_one() {
        let overlay = build_overlay(&config(3.0)).expect("overlay");
        assert!((overlay.material.opacity - 1.0).abs() < f32::EPSILON);
    }
}
