/// The two render passes: depth from the light, then shaded from the camera
use std::fmt;
use std::rc::Rc;

use nalgebra::{Matrix4, Point3, Vector3};

use crate::config::Resolution;
use crate::device::{uniforms, DepthTarget, Framebuffer, Gpu, GpuError, ProgramId, Sampled, Uniform};
use crate::model::Model;
use crate::scene::Scene;

/// Renders scene depth from the light's point of view into an off-screen
/// depth target. The target's resolution is independent of the screen.
#[derive(Debug)]
pub struct ShadowPass {
    target: DepthTarget,
    program: ProgramId,
}

impl ShadowPass {
    pub fn new(
        gpu: &Rc<dyn Gpu>,
        program: ProgramId,
        resolution: Resolution,
    ) -> Result<Self, GpuError> {
        let target = DepthTarget::new(gpu, resolution.width, resolution.height)?;
        log::info!("Shadow map: {}x{}", resolution.width, resolution.height);
        Ok(Self { target, program })
    }

    pub fn begin_frame(&self, light_space: &Matrix4<f32>) {
        let gpu = self.gpu();
        gpu.bind_framebuffer(Framebuffer::Depth(self.target.id()));
        gpu.set_viewport(self.target.width(), self.target.height());
        gpu.clear(None, true);
        gpu.set_blending(false);
        gpu.use_program(self.program);
        gpu.set_uniform(uniforms::LIGHT_SPACE, Uniform::Mat4(*light_space));
    }

    pub fn draw(&self, model: &Model) {
        model.draw(self.program);
    }

    /// Restore blending and the default framebuffer.
    pub fn end_frame(&self) {
        let gpu = self.gpu();
        gpu.set_blending(true);
        gpu.bind_framebuffer(Framebuffer::Screen);
    }

    pub fn render(&self, scene: &Scene, light_space: &Matrix4<f32>) {
        self.begin_frame(light_space);
        for model in scene.models() {
            self.draw(model);
        }
        self.end_frame();
    }

    pub fn depth_target(&self) -> &DepthTarget {
        &self.target
    }

    fn gpu(&self) -> &Rc<dyn Gpu> {
        self.target.gpu()
    }
}

/// Everything the colour pass uploads once per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameUniforms {
    pub light_space: Matrix4<f32>,
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub light_direction: Vector3<f32>,
    pub light_colour: Vector3<f32>,
    pub light_position: Point3<f32>,
    pub camera_position: Point3<f32>,
}

/// Shaded render of the scene into the default framebuffer, sampling the
/// shadow map on unit 1.
pub struct ColorPass {
    gpu: Rc<dyn Gpu>,
    program: ProgramId,
    resolution: Resolution,
    clear_colour: [f32; 4],
}

impl ColorPass {
    pub fn new(
        gpu: &Rc<dyn Gpu>,
        program: ProgramId,
        resolution: Resolution,
        clear_colour: [f32; 4],
    ) -> Self {
        Self {
            gpu: Rc::clone(gpu),
            program,
            resolution,
            clear_colour,
        }
    }

    pub fn resize(&mut self, resolution: Resolution) {
        log::debug!("colour pass resized to {}x{}", resolution.width, resolution.height);
        self.resolution = resolution;
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn render(&self, scene: &Scene, shadow: &ShadowPass, frame: &FrameUniforms) {
        let gpu = &self.gpu;
        gpu.bind_framebuffer(Framebuffer::Screen);
        gpu.set_viewport(self.resolution.width, self.resolution.height);
        gpu.clear(Some(self.clear_colour), true);

        gpu.use_program(self.program);
        gpu.bind_texture(uniforms::SHADOW_MAP_UNIT, Sampled::Depth(shadow.depth_target().id()));
        gpu.set_uniform(uniforms::SHADOW_MAP, Uniform::Sampler(uniforms::SHADOW_MAP_UNIT));

        gpu.set_uniform(uniforms::LIGHT_SPACE, Uniform::Mat4(frame.light_space));
        gpu.set_uniform(uniforms::VIEW, Uniform::Mat4(frame.view));
        gpu.set_uniform(uniforms::PROJECTION, Uniform::Mat4(frame.projection));
        gpu.set_uniform(uniforms::LIGHT_DIRECTION, Uniform::Vec3(frame.light_direction));
        gpu.set_uniform(uniforms::LIGHT_COLOUR, Uniform::Vec3(frame.light_colour));
        gpu.set_uniform(uniforms::LIGHT_POSITION, Uniform::Vec3(frame.light_position.coords));
        gpu.set_uniform(uniforms::CAMERA_POSITION, Uniform::Vec3(frame.camera_position.coords));

        for model in scene.models() {
            model.draw(self.program);
        }
    }
}

impl fmt::Debug for ColorPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColorPass")
            .field("program", &self.program)
            .field("resolution", &self.resolution)
            .finish()
    }
}
