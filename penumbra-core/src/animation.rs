/// Time-driven object animation
use nalgebra::Vector3;

use crate::scene::{ObjectId, Scene, SceneError};

/// Continuous rotation of one scene object around a model-space axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Spin {
    pub object: ObjectId,
    pub axis: Vector3<f32>,
    pub radians_per_second: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Animator {
    spins: Vec<Spin>,
}

impl Animator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spin(&mut self, object: ObjectId, axis: Vector3<f32>, radians_per_second: f32) {
        self.spins.push(Spin {
            object,
            axis,
            radians_per_second,
        });
    }

    pub fn spins(&self) -> &[Spin] {
        &self.spins
    }

    /// Advance every animation by `dt` seconds. Rotations accumulate onto the
    /// object's transform like any other transform call.
    pub fn advance(&self, scene: &mut Scene, dt: f32) -> Result<(), SceneError> {
        for spin in &self.spins {
            scene
                .get_mut(spin.object)?
                .rotate(spin.radians_per_second * dt, spin.axis);
        }
        Ok(())
    }
}
