/// The single scene light and its shadow-map view
use nalgebra::{Matrix4, Point3, Vector3};

use crate::camera::Camera;
use crate::config::{LightConfig, LightProjection};

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub direction: Vector3<f32>,
    pub position: Point3<f32>,
    pub colour: Vector3<f32>,
}

impl Light {
    /// White light
    pub fn new(direction: Vector3<f32>, position: Point3<f32>) -> Self {
        Self {
            direction,
            position,
            colour: Vector3::repeat(1.0),
        }
    }

    pub fn from_config(config: &LightConfig) -> Self {
        Self {
            direction: Vector3::from(config.direction),
            position: Point3::from(config.position),
            colour: Vector3::from(config.colour),
        }
    }

    /// Move the light to the camera, shining where the camera looks.
    pub fn reposition_to(&mut self, camera: &Camera) {
        self.direction = camera.front();
        self.position = camera.position();
        log::debug!("light moved to {:?} facing {:?}", self.position, self.direction);
    }

    /// Orthographic projection times the light's view. Transforms world
    /// space into the clip space the shadow map is rendered in.
    pub fn light_space_matrix(&self, projection: &LightProjection) -> Matrix4<f32> {
        let extent = projection.extent;
        let light_projection = Matrix4::new_orthographic(
            -extent,
            extent,
            -extent,
            extent,
            projection.near,
            projection.far,
        );

        let direction = self.direction.normalize();
        let up = if direction.y.abs() > 0.99 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let light_view = Matrix4::look_at_rh(&self.position, &(self.position + direction), &up);

        light_projection * light_view
    }
}

impl Default for Light {
    fn default() -> Self {
        Self::from_config(&LightConfig::default())
    }
}
