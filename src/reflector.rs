use crate::camera3d::Camera3D;
use crate::geometry::Geometry;
use crate::overlay::{self, OverlayQuad};
use crate::renderer::mirror_pass::MirrorGpu;
use glam::{Mat4, Quat, Vec3, Vec4};
use serde::Deserialize;

/// Static description of one planar mirror. Immutable for the lifetime of its
/// runtime; changing any field means tearing the runtime down and building a
/// new one, so no stale GPU state can linger.
#[derive(Debug, Clone, Deserialize)]
pub struct ReflectorConfig {
    pub position: [f32; 3],
    /// Euler angles in radians, XYZ order.
    pub rotation: [f32; 3],
    pub width: f32,
    pub height: f32,
    #[serde(default = "ReflectorConfig::default_color")]
    pub color: [f32; 3],
    #[serde(default)]
    pub clip_bias: f32,
    #[serde(default)]
    pub overlay_opacity: f32,
    #[serde(default = "ReflectorConfig::default_overlay_offset")]
    pub overlay_offset: [f32; 3],
    /// Per-mirror render-target override; falls back to the global setting.
    #[serde(default)]
    pub resolution: Option<u32>,
}

/// Mirror plane as a point and unit normal. The normal is the quad's local +Z
/// carried through the configured rotation.
#[derive(Debug, Clone, Copy)]
pub struct ReflectorPlane {
    pub point: Vec3,
    pub normal: Vec3,
}

/// Mirrored viewpoint for one off-screen render: world-to-view of the
/// reflected camera and its obliquely clipped projection.
#[derive(Debug, Clone, Copy)]
pub struct VirtualCamera {
    pub view: Mat4,
    pub projection: Mat4,
}

impl ReflectorConfig {
    const fn default_color() -> [f32; 3] {
        [0.5, 0.5, 0.5]
    }

    const fn default_overlay_offset() -> [f32; 3] {
        [0.0, 0.0, -0.01]
    }

    pub fn rotation_quat(&self) -> Quat {
        Quat::from_euler(glam::EulerRot::XYZ, self.rotation[0], self.rotation[1], self.rotation[2])
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation_quat(), Vec3::from_array(self.position))
    }

    pub fn plane(&self) -> ReflectorPlane {
        ReflectorPlane {
            point: Vec3::from_array(self.position),
            normal: (self.rotation_quat() * Vec3::Z).normalize(),
        }
    }

    pub fn has_valid_extents(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

impl ReflectorPlane {
    /// Plane constant `d` with the convention `dot(n, x) + d = 0`.
    pub fn constant(&self) -> f32 {
        -self.normal.dot(self.point)
    }

    /// Reflects a world-space point across the plane.
    pub fn reflect_point(&self, point: Vec3) -> Vec3 {
        point - 2.0 * (point - self.point).dot(self.normal) * self.normal
    }

    /// Reflects a direction (translation-free).
    pub fn reflect_direction(&self, direction: Vec3) -> Vec3 {
        direction - 2.0 * direction.dot(self.normal) * self.normal
    }
}

/// Householder reflection across the plane, as a full affine matrix.
pub fn reflection_matrix(plane: &ReflectorPlane) -> Mat4 {
    let n = plane.normal;
    let d = plane.constant();
    Mat4::from_cols(
        Vec4::new(1.0 - 2.0 * n.x * n.x, -2.0 * n.x * n.y, -2.0 * n.x * n.z, 0.0),
        Vec4::new(-2.0 * n.x * n.y, 1.0 - 2.0 * n.y * n.y, -2.0 * n.y * n.z, 0.0),
        Vec4::new(-2.0 * n.x * n.z, -2.0 * n.y * n.z, 1.0 - 2.0 * n.z * n.z, 0.0),
        Vec4::new(-2.0 * d * n.x, -2.0 * d * n.y, -2.0 * d * n.z, 1.0),
    )
}

/// Derives the virtual camera for a mirror: the main camera reflected across
/// the plane, keeping its field of view and clip range.
pub fn reflect_camera(camera: &Camera3D, plane: &ReflectorPlane) -> Camera3D {
    let mut reflected = camera.clone();
    reflected.position = plane.reflect_point(camera.position);
    reflected.target = plane.reflect_point(camera.target);
    reflected.up = plane.reflect_direction(camera.up);
    reflected
}

/// Re-fits the projection's near clip plane to the mirror plane (oblique
/// near-plane clipping), so nothing behind the mirror leaks into the
/// reflection. `clip_bias` nudges the plane along its normal to sidestep
/// z-fighting at the mirror surface. Expects a GL-convention projection.
///
/// When the camera sits exactly on the plane the corner-point denominator
/// collapses; it is clamped to a small epsilon instead of failing.
pub fn oblique_projection(projection: Mat4, view: Mat4, plane: &ReflectorPlane, clip_bias: f32) -> Mat4 {
    const DEGENERATE_EPSILON: f32 = 1e-6;

    let world_plane = Vec4::new(plane.normal.x, plane.normal.y, plane.normal.z, plane.constant());
    let view_plane = view.inverse().transpose() * world_plane;

    let mut m = projection.to_cols_array_2d();
    let qx = (sign(view_plane.x) + m[2][0]) / m[0][0];
    let qy = (sign(view_plane.y) + m[2][1]) / m[1][1];
    let qw = (1.0 + m[2][2]) / m[3][2];
    let q = Vec4::new(qx, qy, -1.0, qw);

    let mut denom = view_plane.dot(q);
    if denom.abs() < DEGENERATE_EPSILON {
        denom = if denom < 0.0 { -DEGENERATE_EPSILON } else { DEGENERATE_EPSILON };
    }
    let scaled = view_plane * (2.0 / denom);

    m[0][2] = scaled.x;
    m[1][2] = scaled.y;
    m[2][2] = scaled.z + 1.0 - clip_bias;
    m[3][2] = scaled.w;
    Mat4::from_cols_array_2d(&m)
}

fn sign(value: f32) -> f32 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Live state for one mirror: quad geometry, derived plane, virtual camera,
/// dirty flag and (once the renderer touches it) the GPU bundle with the
/// off-screen color target. Exactly one runtime exists per config.
pub struct ReflectorRuntime {
    pub config: ReflectorConfig,
    pub plane: ReflectorPlane,
    pub resolution: u32,
    pub geometry: Geometry,
    pub overlay: Option<OverlayQuad>,
    pub dirty: bool,
    virtual_camera: Option<VirtualCamera>,
    pub gpu: Option<MirrorGpu>,
}

impl ReflectorRuntime {
    /// Builds the runtime, or `None` for degenerate extents — the mirror is
    /// skipped without failing the rest of the set.
    pub fn new(config: ReflectorConfig, default_resolution: u32) -> Option<Self> {
        if !config.has_valid_extents() {
            eprintln!(
                "[reflector] skipping mirror with degenerate extents {}x{}",
                config.width, config.height
            );
            return None;
        }
        let plane = config.plane();
        let geometry = Geometry::plane(config.width, config.height);
        let overlay = overlay::build_overlay(&config);
        let resolution = config.resolution.unwrap_or(default_resolution).max(1);
        Some(Self {
            config,
            plane,
            resolution,
            geometry,
            overlay,
            dirty: false,
            virtual_camera: None,
            gpu: None,
        })
    }

    /// True when the viewer is on the reflective side of the plane. Mirrors
    /// seen from behind keep their last rendered target.
    pub fn facing(&self, camera_position: Vec3) -> bool {
        self.plane.normal.dot(camera_position - self.plane.point) > 0.0
    }

    /// Recomputes the mirrored viewpoint for the current main camera. Runs
    /// every frame; the expensive part (the off-screen render) is gated by
    /// the scheduler's dirty flag.
    pub fn update(&mut self, camera: &Camera3D, aspect: f32) {
        if !self.facing(camera.position) {
            self.virtual_camera = None;
            return;
        }
        let reflected = reflect_camera(camera, &self.plane);
        let view = reflected.view_matrix();
        let projection = oblique_projection(
            reflected.projection_matrix(aspect),
            view,
            &self.plane,
            self.config.clip_bias,
        );
        self.virtual_camera = Some(VirtualCamera { view, projection });
    }

    pub fn virtual_camera(&self) -> Option<&VirtualCamera> {
        self.virtual_camera.as_ref()
    }

    /// World-to-texture matrix for projective sampling of the color target.
    pub fn texture_matrix(&self) -> Option<Mat4> {
        self.virtual_camera.map(|vc| uv_bias_matrix() * vc.projection * vc.view)
    }

    /// Releases the GPU bundle (render target, depth, buffers) and overlay
    /// immediately. The runtime itself is dropped by the scheduler right
    /// after, so a disposed runtime is never rendered or sampled again.
    pub fn dispose(&mut self) {
        self.virtual_camera = None;
        self.overlay = None;
        if let Some(gpu) = self.gpu.take() {
            gpu.destroy();
        }
    }
}

/// Maps NDC x/y to texture coordinates (v grows downward).
fn uv_bias_matrix() -> Mat4 {
    Mat4::from_translation(Vec3::new(0.5, 0.5, 0.0)) * Mat4::from_scale(Vec3::new(0.5, -0.5, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor_mirror() -> ReflectorConfig {
        ReflectorConfig {
            position: [0.0, 0.0, 0.0],
            // Local +Z becomes world +Y.
            rotation: [-std::f32::consts::FRAC_PI_2, 0.0, 0.0],
            width: 2.0,
            height: 2.0,
            color: ReflectorConfig::default_color(),
            clip_bias: 0.003,
            overlay_opacity: 0.0,
            overlay_offset: ReflectorConfig::default_overlay_offset(),
            resolution: None,
        }
    }

    #[test]
    fn plane_normal_follows_rotation() {
        let plane = floor_mirror().plane();
        assert!(plane.normal.distance(Vec3::Y) < 1e-5);
    }

    #[test]
    fn camera_reflects_across_plane() {
        let plane = ReflectorPlane { point: Vec3::ZERO, normal: Vec3::Y };
        let reflected = plane.reflect_point(Vec3::new(0.0, 5.0, 0.0));
        assert!(reflected.distance(Vec3::new(0.0, -5.0, 0.0)) < 1e-6);

        let matrix = reflection_matrix(&plane);
        let via_matrix = matrix.transform_point3(Vec3::new(0.0, 5.0, 0.0));
        assert!(via_matrix.distance(Vec3::new(0.0, -5.0, 0.0)) < 1e-6);
    }

    #[test]
    fn reflection_respects_offset_planes() {
        let plane = ReflectorPlane { point: Vec3::new(0.0, 2.0, 0.0), normal: Vec3::Y };
        let matrix = reflection_matrix(&plane);
        let reflected = matrix.transform_point3(Vec3::new(1.0, 5.0, -3.0));
        assert!(reflected.distance(Vec3::new(1.0, -1.0, -3.0)) < 1e-5);
        // Points on the plane stay put.
        let fixed = matrix.transform_point3(Vec3::new(7.0, 2.0, 7.0));
        assert!(fixed.distance(Vec3::new(7.0, 2.0, 7.0)) < 1e-5);
    }

    #[test]
    fn oblique_clip_puts_mirror_plane_at_near() {
        let camera = Camera3D::new(Vec3::new(0.0, 3.0, 4.0), Vec3::ZERO, 60f32.to_radians(), 0.1, 100.0);
        let plane = ReflectorPlane { point: Vec3::ZERO, normal: Vec3::Y };
        let reflected = reflect_camera(&camera, &plane);
        let view = reflected.view_matrix();
        let projection = oblique_projection(reflected.projection_matrix(1.0), view, &plane, 0.0);

        // A point on the mirror plane lands on the GL near plane (ndc z = -1).
        let on_plane = Vec3::new(0.5, 0.0, -0.5);
        let clip = projection * view * on_plane.extend(1.0);
        assert!((clip.z / clip.w + 1.0).abs() < 1e-3);

        // A point behind the mirror is clipped (ndc z < -1).
        let behind = Vec3::new(0.0, -1.0, 0.0);
        let clip = projection * view * behind.extend(1.0);
        assert!(clip.z / clip.w < -1.0);
    }

    #[test]
    fn camera_on_plane_is_clamped_not_nan() {
        let camera = Camera3D::new(Vec3::ZERO, Vec3::new(0.0, -1.0, 0.0), 60f32.to_radians(), 0.1, 100.0);
        let plane = ReflectorPlane { point: Vec3::ZERO, normal: Vec3::Y };
        let reflected = reflect_camera(&camera, &plane);
        let view = Mat4::look_at_rh(reflected.position, reflected.target, Vec3::Z);
        let projection = oblique_projection(reflected.projection_matrix(1.0), view, &plane, 0.0);
        assert!(!projection.to_cols_array().iter().any(|v| v.is_nan() || v.is_infinite()));
    }

    #[test]
    fn degenerate_extents_produce_no_runtime() {
        let mut config = floor_mirror();
        config.width = 0.0;
        assert!(ReflectorRuntime::new(config, 1024).is_none());
        let mut config = floor_mirror();
        config.height = -1.0;
        assert!(ReflectorRuntime::new(config, 1024).is_none());
    }

    #[test]
    fn update_skips_back_side_viewers() {
        let mut runtime = ReflectorRuntime::new(floor_mirror(), 1024).expect("runtime");
        let above = Camera3D::new(Vec3::new(0.0, 5.0, 0.1), Vec3::ZERO, 1.0, 0.1, 100.0);
        runtime.update(&above, 1.0);
        assert!(runtime.virtual_camera().is_some());
        assert!(runtime.texture_matrix().is_some());

        let below = Camera3D::new(Vec3::new(0.0, -5.0, 0.1), Vec3::ZERO, 1.0, 0.1, 100.0);
        runtime.update(&below, 1.0);
        assert!(runtime.virtual_camera().is_none());
    }

    #[test]
    fn per_mirror_resolution_overrides_global() {
        let mut config = floor_mirror();
        config.resolution = Some(256);
        let runtime = ReflectorRuntime::new(config, 1024).expect("runtime");
        assert_eq!(runtime.resolution, 256);
        let runtime = ReflectorRuntime::new(floor_mirror(), 1024).expect("runtime");
        assert_eq!(runtime.resolution, 1024);
    }
}
