/// First-person camera driven by look and move deltas
use nalgebra::{Matrix4, Point3, Vector3};

use crate::config::CameraConfig;

/// Pitch limit in degrees. Looking straight up or down would make the
/// right vector degenerate.
pub const PITCH_LIMIT: f32 = 89.0;

/// Yaw/pitch camera. The basis vectors are recomputed on every update and
/// are always unit length and mutually orthogonal.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Point3<f32>,
    front: Vector3<f32>,
    right: Vector3<f32>,
    up: Vector3<f32>,
    world_up: Vector3<f32>,
    /// Degrees
    yaw: f32,
    /// Degrees, clamped to +/- PITCH_LIMIT
    pitch: f32,
    sprinting: bool,
    config: CameraConfig,
}

impl Camera {
    /// Camera at the origin looking down -Z.
    pub fn new(config: CameraConfig) -> Self {
        let mut camera = Self {
            position: Point3::origin(),
            front: -Vector3::z(),
            right: Vector3::x(),
            up: Vector3::y(),
            world_up: Vector3::y(),
            yaw: -90.0,
            pitch: 0.0,
            sprinting: false,
            config,
        };
        camera.update_basis();
        camera
    }

    pub fn with_position(mut self, position: Point3<f32>) -> Self {
        self.position = position;
        self
    }

    /// Sprint toggles between the walk and sprint speed for movement.
    pub fn set_sprinting(&mut self, sprinting: bool) {
        self.sprinting = sprinting;
    }

    pub fn speed(&self) -> f32 {
        if self.sprinting {
            self.config.sprint_speed
        } else {
            self.config.walk_speed
        }
    }

    /// Apply one frame of input. Look deltas are scaled by the sensitivity;
    /// forward movement is locked to the horizontal plane so walking while
    /// looking up does not fly.
    pub fn update(&mut self, look_x: f32, look_y: f32, forward: f32, right: f32, up: f32) {
        self.yaw += look_x * self.config.sensitivity;
        self.pitch =
            (self.pitch + look_y * self.config.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_basis();

        let speed = self.speed();
        let horizontal = Vector3::new(self.front.x, 0.0, self.front.z).normalize();
        self.position += horizontal * forward * speed;
        self.position += self.right * right * speed;
        self.position += self.world_up * up * speed;
    }

    fn update_basis(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        let front = Vector3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos());

        self.front = front.normalize();
        self.right = self.front.cross(&self.world_up).normalize();
        self.up = self.right.cross(&self.front).normalize();
    }

    /// Create the view matrix (camera transformation)
    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position, &(self.position + self.front), &self.up)
    }

    /// Create the projection matrix for a target with the given aspect ratio
    pub fn projection_matrix(&self, aspect: f32) -> Matrix4<f32> {
        Matrix4::new_perspective(
            aspect,
            self.config.fov_degrees.to_radians(),
            self.config.near,
            self.config.far,
        )
    }

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    pub fn front(&self) -> Vector3<f32> {
        self.front
    }

    pub fn right(&self) -> Vector3<f32> {
        self.right
    }

    pub fn up(&self) -> Vector3<f32> {
        self.up
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(CameraConfig::default())
    }
}
