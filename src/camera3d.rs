use glam::{Mat4, Quat, Vec2, Vec3};

const DEFAULT_UP: Vec3 = Vec3::Y;

/// Perspective viewer camera.
#[derive(Debug, Clone)]
pub struct Camera3D {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera3D {
    pub fn new(position: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self { position, target, up: DEFAULT_UP, fov_y_radians, near, far }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// GL-convention projection (NDC z in [-1, 1]); the renderer remaps depth
    /// to the wgpu range when it uploads frame uniforms.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y_radians, aspect.max(0.0001), self.near, self.far)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }
}

/// Orbit rig storing yaw/pitch/radius around a target, in the manner of the
/// usual orbit controls.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub radius: f32,
    pub yaw_radians: f32,
    pub pitch_radians: f32,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl OrbitCamera {
    /// Derives the rig from an initial camera placement, so a configured or
    /// imported camera position seeds the orbit.
    pub fn from_placement(position: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        let offset = position - target;
        let radius = offset.length().max(0.01);
        let yaw = offset.x.atan2(offset.z);
        let pitch = (offset.y / radius).clamp(-1.0, 1.0).asin();
        Self { target, radius, yaw_radians: yaw, pitch_radians: pitch, fov_y_radians, near, far }
    }

    pub fn to_camera(&self) -> Camera3D {
        let rotation = Quat::from_euler(glam::EulerRot::YXZ, self.yaw_radians, -self.pitch_radians, 0.0);
        let offset = rotation * Vec3::new(0.0, 0.0, self.radius);
        Camera3D::new(self.target + offset, self.target, self.fov_y_radians, self.near, self.far)
    }

    pub fn orbit(&mut self, delta: Vec2) {
        self.yaw_radians += delta.x;
        self.pitch_radians = (self.pitch_radians + delta.y)
            .clamp(-std::f32::consts::FRAC_PI_2 + 0.01, std::f32::consts::FRAC_PI_2 - 0.01);
    }

    pub fn zoom(&mut self, factor: f32) {
        self.radius = (self.radius * factor).clamp(0.1, 10_000.0);
    }
}
