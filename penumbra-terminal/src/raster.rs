/// CPU rasterizer implementing the core GPU interface
///
/// Resources live in a `RefCell` so the device can be shared behind
/// `Rc<dyn Gpu>` like a GL context. Triangles are clipped against the near
/// plane, back faces are culled, and the rest are filled with barycentric
/// coverage tests at pixel centres. Depth uses the GL convention: NDC z is
/// mapped to [0, 1] with 1 as the far plane, and the test is "less".
use std::cell::RefCell;
use std::collections::HashMap;

use nalgebra::{Vector2, Vector4};
use penumbra_core::device::{
    BufferId, DepthTargetId, Framebuffer, Gpu, GpuError, ProgramId, Sampled, TextureId,
    TextureImage, Uniform,
};
use penumbra_core::Vertex;

use crate::shading::{self, DepthMap, Program, ProgramUniforms, Varyings};

/// Depth values of one render target, row 0 at the top.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthBuffer {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl DepthBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![1.0; width as usize * height as usize],
        }
    }

    pub fn clear(&mut self) {
        self.values.fill(1.0);
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

impl DepthMap for DepthBuffer {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn depth(&self, x: u32, y: u32) -> f32 {
        self.values[self.index(x.min(self.width - 1), y.min(self.height - 1))]
    }
}

/// A presented image: linear RGB in [0, 1], row 0 at the top.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 3]>,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    pub fn rgb8(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let [r, g, b] = self.pixel(x, y);
        let quantise = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        (quantise(r), quantise(g), quantise(b))
    }
}

/// The default framebuffer: colour plus depth.
#[derive(Debug, Clone)]
struct Screen {
    colour: Vec<[f32; 4]>,
    depth: DepthBuffer,
}

impl Screen {
    fn new(width: u32, height: u32) -> Self {
        Self {
            colour: vec![[0.0, 0.0, 0.0, 1.0]; width as usize * height as usize],
            depth: DepthBuffer::new(width, height),
        }
    }
}

/// A vertex after the vertex stage.
#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    position: Vector4<f32>,
    varyings: Varyings,
}

/// A vertex after perspective divide and viewport mapping.
#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    depth: f32,
    inverse_w: f32,
    varyings: Varyings,
}

#[derive(Debug)]
struct State {
    next_id: u32,
    buffers: HashMap<BufferId, Vec<Vertex>>,
    textures: HashMap<TextureId, TextureImage>,
    depth_targets: HashMap<DepthTargetId, DepthBuffer>,
    screen: Screen,
    screen_size: (u32, u32),
    framebuffer: Framebuffer,
    viewport: (u32, u32),
    blending: bool,
    program: Option<Program>,
    uniforms: HashMap<Program, ProgramUniforms>,
    units: HashMap<u32, Sampled>,
    vertex_buffer: Option<BufferId>,
    presented: Option<Frame>,
}

/// Software implementation of [`Gpu`] with the depth and shaded programs
/// from [`crate::shading`] built in.
#[derive(Debug)]
pub struct SoftwareGpu {
    state: RefCell<State>,
}

impl SoftwareGpu {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: RefCell::new(State {
                next_id: 0,
                buffers: HashMap::new(),
                textures: HashMap::new(),
                depth_targets: HashMap::new(),
                screen: Screen::new(width, height),
                screen_size: (width, height),
                framebuffer: Framebuffer::Screen,
                viewport: (width, height),
                blending: false,
                program: None,
                uniforms: HashMap::new(),
                units: HashMap::new(),
                vertex_buffer: None,
                presented: None,
            }),
        }
    }

    /// The last presented frame.
    pub fn frame(&self) -> Option<Frame> {
        self.state.borrow().presented.clone()
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.state.borrow().screen_size
    }

    /// Copy of a depth target's contents.
    pub fn depth_target(&self, target: DepthTargetId) -> Option<DepthBuffer> {
        self.state.borrow().depth_targets.get(&target).cloned()
    }

    /// Number of live resources of every kind.
    pub fn resource_count(&self) -> usize {
        let state = self.state.borrow();
        state.buffers.len() + state.textures.len() + state.depth_targets.len()
    }
}

impl State {
    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn draw(&mut self, first: usize, count: usize) {
        let Some(program) = self.program else {
            log::warn!("draw without a program in use");
            return;
        };
        let Some(buffer) = self.vertex_buffer else {
            log::warn!("draw without a vertex buffer bound");
            return;
        };
        let Some(vertices) = self.buffers.get(&buffer) else {
            log::warn!("draw from deleted vertex buffer {:?}", buffer);
            return;
        };
        let Some(vertices) = vertices.get(first..first + count) else {
            log::warn!("draw range {}..{} exceeds buffer {:?}", first, first + count, buffer);
            return;
        };

        let uniforms = self.uniforms.get(&program).cloned().unwrap_or_default();

        let clipped: Vec<[ClipVertex; 3]> = vertices
            .chunks_exact(3)
            .flat_map(|triangle| {
                let stage = |vertex: &Vertex| {
                    let (position, varyings) = shading::vertex_stage(program, &uniforms, vertex);
                    ClipVertex { position, varyings }
                };
                clip_near([stage(&triangle[0]), stage(&triangle[1]), stage(&triangle[2])])
            })
            .collect();

        for triangle in clipped {
            self.fill(program, &uniforms, triangle);
        }
    }

    fn fill(&mut self, program: Program, uniforms: &ProgramUniforms, triangle: [ClipVertex; 3]) {
        let (width, height) = self.viewport;
        let [a, b, c] = triangle.map(|vertex| to_screen(vertex, width, height));

        // counter-clockwise in NDC is clockwise on screen (y points down)
        let area = (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y);
        if area >= 0.0 {
            return;
        }

        let (target_width, target_height) = match self.framebuffer {
            Framebuffer::Screen => self.screen_size,
            Framebuffer::Depth(id) => match self.depth_targets.get(&id) {
                Some(target) => (target.width, target.height),
                None => return,
            },
        };

        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
        let max_x = (a.x.max(b.x).max(c.x).ceil() as i64).min(width.min(target_width) as i64 - 1);
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
        let max_y = (a.y.max(b.y).max(c.y).ceil() as i64).min(height.min(target_height) as i64 - 1);
        if max_x < 0 || max_y < 0 {
            return;
        }

        for y in min_y..=max_y as u32 {
            for x in min_x..=max_x as u32 {
                let centre = (x as f32 + 0.5, y as f32 + 0.5);
                let Some((w0, w1, w2)) = barycentric((a.x, a.y), (b.x, b.y), (c.x, c.y), centre)
                else {
                    continue;
                };
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }

                let depth = w0 * a.depth + w1 * b.depth + w2 * c.depth;
                if !(0.0..=1.0).contains(&depth) {
                    continue;
                }
                self.fragment(program, uniforms, (x, y), depth, [&a, &b, &c], [w0, w1, w2]);
            }
        }
    }

    fn fragment(
        &mut self,
        program: Program,
        uniforms: &ProgramUniforms,
        (x, y): (u32, u32),
        depth: f32,
        vertices: [&ScreenVertex; 3],
        weights: [f32; 3],
    ) {
        let depth_buffer = match self.framebuffer {
            Framebuffer::Screen => &mut self.screen.depth,
            Framebuffer::Depth(id) => match self.depth_targets.get_mut(&id) {
                Some(target) => target,
                None => return,
            },
        };
        let index = depth_buffer.index(x, y);
        if depth >= depth_buffer.values[index] {
            return;
        }
        depth_buffer.values[index] = depth;

        if program == Program::Depth || self.framebuffer != Framebuffer::Screen {
            return;
        }

        // perspective-correct interpolation
        let corrected = [0, 1, 2].map(|i| weights[i] * vertices[i].inverse_w);
        let sum = corrected[0] + corrected[1] + corrected[2];
        if sum <= 0.0 {
            return;
        }
        let varyings = Varyings::blend(
            [&vertices[0].varyings, &vertices[1].varyings, &vertices[2].varyings],
            corrected.map(|weight| weight / sum),
        );

        let texel = match self.units.get(&uniforms.texture_unit) {
            Some(Sampled::Colour(id)) => self
                .textures
                .get(id)
                .map(|image| shading::sample_texture(image, varyings.texcoord))
                .unwrap_or_else(|| Vector4::repeat(1.0)),
            _ => Vector4::repeat(1.0),
        };
        let shadow_map = match self.units.get(&uniforms.shadow_map_unit) {
            Some(Sampled::Depth(id)) => {
                self.depth_targets.get(id).map(|target| target as &dyn DepthMap)
            }
            _ => None,
        };

        let colour = shading::shade_fragment(uniforms, &varyings, texel, shadow_map);
        let pixel = &mut self.screen.colour[index];
        if self.blending {
            let alpha = colour.w;
            for channel in 0..3 {
                pixel[channel] = colour[channel] * alpha + pixel[channel] * (1.0 - alpha);
            }
            pixel[3] = alpha + pixel[3] * (1.0 - alpha);
        } else {
            *pixel = [colour.x, colour.y, colour.z, colour.w];
        }
    }
}

/// Sutherland-Hodgman against the near plane (`z >= -w`), fanned back into
/// triangles. Returns zero, one or two triangles.
fn clip_near(triangle: [ClipVertex; 3]) -> Vec<[ClipVertex; 3]> {
    let distance = |vertex: &ClipVertex| vertex.position.z + vertex.position.w;

    if triangle.iter().all(|vertex| distance(vertex) >= 0.0) {
        return vec![triangle];
    }

    let mut polygon = Vec::with_capacity(4);
    for i in 0..3 {
        let current = triangle[i];
        let next = triangle[(i + 1) % 3];
        let (d_current, d_next) = (distance(&current), distance(&next));

        if d_current >= 0.0 {
            polygon.push(current);
        }
        if (d_current >= 0.0) != (d_next >= 0.0) {
            let t = d_current / (d_current - d_next);
            polygon.push(ClipVertex {
                position: current.position.lerp(&next.position, t),
                varyings: current.varyings.lerp(&next.varyings, t),
            });
        }
    }

    (1..polygon.len().saturating_sub(1))
        .map(|i| [polygon[0], polygon[i], polygon[i + 1]])
        .collect()
}

fn to_screen(vertex: ClipVertex, width: u32, height: u32) -> ScreenVertex {
    let w = if vertex.position.w.abs() < f32::EPSILON {
        f32::EPSILON
    } else {
        vertex.position.w
    };
    let ndc = vertex.position.xyz() / w;
    let screen = Vector2::new(
        (ndc.x + 1.0) * 0.5 * width as f32,
        (1.0 - ndc.y) * 0.5 * height as f32,
    );

    ScreenVertex {
        x: screen.x,
        y: screen.y,
        depth: ndc.z * 0.5 + 0.5,
        inverse_w: 1.0 / w,
        varyings: vertex.varyings,
    }
}

/// Calculate barycentric coordinates for a point in a triangle
fn barycentric(
    v0: (f32, f32),
    v1: (f32, f32),
    v2: (f32, f32),
    p: (f32, f32),
) -> Option<(f32, f32, f32)> {
    let denom = (v1.1 - v2.1) * (v0.0 - v2.0) + (v2.0 - v1.0) * (v0.1 - v2.1);

    if denom.abs() < 1e-6 {
        return None;
    }

    let w0 = ((v1.1 - v2.1) * (p.0 - v2.0) + (v2.0 - v1.0) * (p.1 - v2.1)) / denom;
    let w1 = ((v2.1 - v0.1) * (p.0 - v2.0) + (v0.0 - v2.0) * (p.1 - v2.1)) / denom;
    let w2 = 1.0 - w0 - w1;

    Some((w0, w1, w2))
}

impl Gpu for SoftwareGpu {
    fn create_vertex_buffer(&self, contents: &[u8]) -> Result<BufferId, GpuError> {
        let stride = std::mem::size_of::<Vertex>();
        if contents.len() % stride != 0 {
            return Err(GpuError::Creation {
                kind: "vertex buffer",
                reason: format!(
                    "{} bytes is not a whole number of {}-byte vertices",
                    contents.len(),
                    stride
                ),
            });
        }

        let vertices: Vec<Vertex> =
            contents.chunks_exact(stride).map(bytemuck::pod_read_unaligned).collect();
        let mut state = self.state.borrow_mut();
        let id = BufferId(state.allocate());
        state.buffers.insert(id, vertices);
        Ok(id)
    }

    fn delete_vertex_buffer(&self, buffer: BufferId) {
        let mut state = self.state.borrow_mut();
        state.buffers.remove(&buffer);
        if state.vertex_buffer == Some(buffer) {
            state.vertex_buffer = None;
        }
    }

    fn create_texture(&self, image: &TextureImage) -> Result<TextureId, GpuError> {
        let mut state = self.state.borrow_mut();
        let id = TextureId(state.allocate());
        state.textures.insert(id, image.clone());
        log::debug!("texture {:?}: {}x{}", id, image.width(), image.height());
        Ok(id)
    }

    fn delete_texture(&self, texture: TextureId) {
        self.state.borrow_mut().textures.remove(&texture);
    }

    fn create_depth_target(&self, width: u32, height: u32) -> Result<DepthTargetId, GpuError> {
        if width == 0 || height == 0 {
            return Err(GpuError::Creation {
                kind: "depth target",
                reason: format!("{}x{} is empty", width, height),
            });
        }

        let mut state = self.state.borrow_mut();
        let id = DepthTargetId(state.allocate());
        state.depth_targets.insert(id, DepthBuffer::new(width, height));
        Ok(id)
    }

    fn delete_depth_target(&self, target: DepthTargetId) {
        let mut state = self.state.borrow_mut();
        state.depth_targets.remove(&target);
        if state.framebuffer == Framebuffer::Depth(target) {
            state.framebuffer = Framebuffer::Screen;
        }
    }

    fn bind_framebuffer(&self, framebuffer: Framebuffer) {
        self.state.borrow_mut().framebuffer = framebuffer;
    }

    /// On the default framebuffer the viewport also sizes the screen, the
    /// way a window resize would.
    fn set_viewport(&self, width: u32, height: u32) {
        let mut state = self.state.borrow_mut();
        state.viewport = (width, height);
        if state.framebuffer == Framebuffer::Screen && state.screen_size != (width, height) {
            log::debug!("screen resized to {}x{}", width, height);
            state.screen = Screen::new(width, height);
            state.screen_size = (width, height);
        }
    }

    fn clear(&self, colour: Option<[f32; 4]>, depth: bool) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        match state.framebuffer {
            Framebuffer::Screen => {
                if let Some(colour) = colour {
                    state.screen.colour.fill(colour);
                }
                if depth {
                    state.screen.depth.clear();
                }
            }
            Framebuffer::Depth(id) => {
                if let (true, Some(target)) = (depth, state.depth_targets.get_mut(&id)) {
                    target.clear();
                }
            }
        }
    }

    fn set_blending(&self, enabled: bool) {
        self.state.borrow_mut().blending = enabled;
    }

    fn use_program(&self, program: ProgramId) {
        let mut state = self.state.borrow_mut();
        state.program = Program::from_id(program);
        if state.program.is_none() {
            log::warn!("unknown program {:?}", program);
        }
    }

    fn set_uniform(&self, name: &str, value: Uniform) {
        let mut state = self.state.borrow_mut();
        let Some(program) = state.program else {
            return;
        };
        if !state.uniforms.entry(program).or_default().set(name, value) {
            log::trace!("{:?} has no uniform \"{}\" of that type", program, name);
        }
    }

    fn bind_texture(&self, unit: u32, texture: Sampled) {
        self.state.borrow_mut().units.insert(unit, texture);
    }

    fn bind_vertex_buffer(&self, buffer: BufferId) {
        self.state.borrow_mut().vertex_buffer = Some(buffer);
    }

    fn draw_triangles(&self, first: usize, count: usize) {
        self.state.borrow_mut().draw(first, count);
    }

    fn present(&self) {
        let mut state = self.state.borrow_mut();
        let (width, height) = state.screen_size;
        let pixels = state.screen.colour.iter().map(|[r, g, b, _]| [*r, *g, *b]).collect();
        state.presented = Some(Frame { width, height, pixels });
    }
}
