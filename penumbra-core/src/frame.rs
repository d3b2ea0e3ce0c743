/// Per-frame driver: input, animation, shadow pass, colour pass, present
use std::rc::Rc;

use crate::animation::Animator;
use crate::config::{LightProjection, RendererConfig};
use crate::device::Gpu;
use crate::pass::{ColorPass, FrameUniforms, ShadowPass};
use crate::scene::{Scene, SceneContext, SceneError};

/// One frame's worth of operator input. Movement axes are signed amounts
/// (typically -1, 0 or 1 per held key, scaled by the frontend).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInput {
    pub look_x: f32,
    pub look_y: f32,
    pub forward: f32,
    pub right: f32,
    pub up: f32,
    pub sprint: bool,
    pub reposition_light: bool,
    pub quit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Running,
    Closed,
}

pub struct FrameLoop {
    gpu: Rc<dyn Gpu>,
    scene: Scene,
    context: SceneContext,
    animator: Animator,
    shadow_pass: ShadowPass,
    color_pass: ColorPass,
    light_projection: LightProjection,
    frames: u64,
}

impl FrameLoop {
    pub fn new(
        gpu: &Rc<dyn Gpu>,
        scene: Scene,
        context: SceneContext,
        shadow_pass: ShadowPass,
        color_pass: ColorPass,
        config: &RendererConfig,
    ) -> Self {
        Self {
            gpu: Rc::clone(gpu),
            scene,
            context,
            animator: Animator::new(),
            shadow_pass,
            color_pass,
            light_projection: config.light_projection,
            frames: 0,
        }
    }

    pub fn with_animator(mut self, animator: Animator) -> Self {
        self.animator = animator;
        self
    }

    /// The light is moved before the camera so it picks up the camera's
    /// pose from the end of the previous frame.
    pub fn apply_input(&mut self, input: &FrameInput) {
        let SceneContext { camera, light } = &mut self.context;

        if input.reposition_light {
            light.reposition_to(camera);
        }

        camera.set_sprinting(input.sprint);
        camera.update(input.look_x, input.look_y, input.forward, input.right, input.up);
    }

    /// Run one frame. A quit request is honoured before anything is drawn.
    pub fn advance(&mut self, input: &FrameInput, dt: f32) -> Result<FrameStatus, SceneError> {
        if input.quit {
            log::info!("Closing after {} frames", self.frames);
            return Ok(FrameStatus::Closed);
        }

        self.apply_input(input);
        self.animator.advance(&mut self.scene, dt)?;

        let SceneContext { camera, light } = &self.context;
        let light_space = light.light_space_matrix(&self.light_projection);

        self.shadow_pass.render(&self.scene, &light_space);

        let frame = FrameUniforms {
            light_space,
            view: camera.view_matrix(),
            projection: camera.projection_matrix(self.color_pass.resolution().aspect()),
            light_direction: light.direction,
            light_colour: light.colour,
            light_position: light.position,
            camera_position: camera.position(),
        };
        self.color_pass.render(&self.scene, &self.shadow_pass, &frame);

        self.gpu.present();
        self.frames += 1;
        log::trace!("frame {} done in {:.4}s", self.frames, dt);

        Ok(FrameStatus::Running)
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn context(&self) -> &SceneContext {
        &self.context
    }

    pub fn animator(&self) -> &Animator {
        &self.animator
    }

    pub fn color_pass_mut(&mut self) -> &mut ColorPass {
        &mut self.color_pass
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}
