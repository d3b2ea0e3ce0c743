/// GPU collaborator interface and owned resource handles
///
/// The renderer never talks to a graphics API directly. Everything it needs
/// from the device (buffers, textures, a depth-only target, uniforms and draw
/// calls) goes through [`Gpu`]. Resources created through it are wrapped in
/// owning handles that hand the resource back to the device when dropped.
use std::fmt;
use std::rc::Rc;

use nalgebra::{Matrix4, Vector3};

use crate::geometry::Vertex;

/// Uniform names and texture units shared with the shader programs.
pub mod uniforms {
    pub const MODEL: &str = "model";
    pub const VIEW: &str = "view";
    pub const PROJECTION: &str = "projection";
    pub const LIGHT_SPACE: &str = "projectedLightSpaceMatrix";
    pub const LIGHT_DIRECTION: &str = "lightDirection";
    pub const LIGHT_COLOUR: &str = "lightColour";
    pub const LIGHT_POSITION: &str = "lightPos";
    pub const CAMERA_POSITION: &str = "camPos";
    pub const SHADOW_MAP: &str = "shadowMap";
    pub const TEXTURE: &str = "Texture";

    pub const TEXTURE_UNIT: u32 = 0;
    pub const SHADOW_MAP_UNIT: u32 = 1;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthTargetId(pub u32);

/// Opaque handle to a linked shader program owned by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Render target selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framebuffer {
    Screen,
    Depth(DepthTargetId),
}

/// Something that can be bound to a texture unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampled {
    Colour(TextureId),
    Depth(DepthTargetId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Uniform {
    Mat4(Matrix4<f32>),
    Vec3(Vector3<f32>),
    Sampler(u32),
}

#[derive(thiserror::Error, Debug)]
pub enum GpuError {
    #[error("Failed to create {kind}: {reason}")]
    Creation { kind: &'static str, reason: String },
    #[error(
        "Texture data is {actual} bytes, expected {expected} for a {width}x{height} RGBA image"
    )]
    TextureSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Decoded 8-bit RGBA image, rows top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl TextureImage {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, GpuError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected || expected == 0 {
            return Err(GpuError::TextureSize {
                width,
                height,
                expected,
                actual: rgba.len(),
            });
        }

        Ok(Self { width, height, rgba })
    }

    /// The 1x1 opaque white image used whenever a face has no usable texture.
    pub fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: vec![255, 255, 255, 255],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Texel at integer coordinates, clamped to the image.
    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        let offset = (y * self.width as usize + x) * 4;
        [
            self.rgba[offset],
            self.rgba[offset + 1],
            self.rgba[offset + 2],
            self.rgba[offset + 3],
        ]
    }
}

/// The graphics device. Methods take `&self`; implementations keep their
/// state behind interior mutability the way a GL context does.
pub trait Gpu {
    fn create_vertex_buffer(&self, contents: &[u8]) -> Result<BufferId, GpuError>;
    fn delete_vertex_buffer(&self, buffer: BufferId);

    fn create_texture(&self, image: &TextureImage) -> Result<TextureId, GpuError>;
    fn delete_texture(&self, texture: TextureId);

    fn create_depth_target(&self, width: u32, height: u32) -> Result<DepthTargetId, GpuError>;
    fn delete_depth_target(&self, target: DepthTargetId);

    fn bind_framebuffer(&self, framebuffer: Framebuffer);
    fn set_viewport(&self, width: u32, height: u32);
    fn clear(&self, colour: Option<[f32; 4]>, depth: bool);
    fn set_blending(&self, enabled: bool);

    fn use_program(&self, program: ProgramId);
    /// Set a uniform on the program currently in use.
    fn set_uniform(&self, name: &str, value: Uniform);
    fn bind_texture(&self, unit: u32, texture: Sampled);
    fn bind_vertex_buffer(&self, buffer: BufferId);
    fn draw_triangles(&self, first: usize, count: usize);

    fn present(&self);
}

/// Vertex buffer uploaded once and released on drop.
pub struct VertexBuffer {
    gpu: Rc<dyn Gpu>,
    id: BufferId,
    len: usize,
}

impl VertexBuffer {
    pub fn upload(gpu: &Rc<dyn Gpu>, vertices: &[Vertex]) -> Result<Self, GpuError> {
        let id = gpu.create_vertex_buffer(bytemuck::cast_slice(vertices))?;
        log::debug!("uploaded vertex buffer {:?} ({} vertices)", id, vertices.len());

        Ok(Self {
            gpu: Rc::clone(gpu),
            id,
            len: vertices.len(),
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn gpu(&self) -> &Rc<dyn Gpu> {
        &self.gpu
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        self.gpu.delete_vertex_buffer(self.id);
    }
}

impl fmt::Debug for VertexBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexBuffer").field("id", &self.id).field("len", &self.len).finish()
    }
}

/// Colour texture released on drop.
pub struct Texture {
    gpu: Rc<dyn Gpu>,
    id: TextureId,
}

impl Texture {
    pub fn upload(gpu: &Rc<dyn Gpu>, image: &TextureImage) -> Result<Self, GpuError> {
        let id = gpu.create_texture(image)?;
        Ok(Self { gpu: Rc::clone(gpu), id })
    }

    pub fn id(&self) -> TextureId {
        self.id
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.gpu.delete_texture(self.id);
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Texture").field(&self.id).finish()
    }
}

/// Off-screen depth-only render target released on drop.
pub struct DepthTarget {
    gpu: Rc<dyn Gpu>,
    id: DepthTargetId,
    width: u32,
    height: u32,
}

impl DepthTarget {
    pub fn new(gpu: &Rc<dyn Gpu>, width: u32, height: u32) -> Result<Self, GpuError> {
        let id = gpu.create_depth_target(width, height)?;
        log::debug!("created {}x{} depth target {:?}", width, height, id);

        Ok(Self {
            gpu: Rc::clone(gpu),
            id,
            width,
            height,
        })
    }

    pub fn id(&self) -> DepthTargetId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn gpu(&self) -> &Rc<dyn Gpu> {
        &self.gpu
    }
}

impl Drop for DepthTarget {
    fn drop(&mut self) {
        self.gpu.delete_depth_target(self.id);
    }
}

impl fmt::Debug for DepthTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepthTarget")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Command, RecordingGpu};
    use super::*;
    use crate::geometry::floor_quad;

    #[test]
    fn test_texture_image_validates_size() {
        assert!(TextureImage::new(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            TextureImage::new(2, 2, vec![0; 12]),
            Err(GpuError::TextureSize { expected: 16, actual: 12, .. })
        ));
        assert_eq!(TextureImage::white().texel(5, 5), [255, 255, 255, 255]);
    }

    #[test]
    fn test_resources_released_on_drop() {
        let (recording, gpu) = RecordingGpu::shared();

        {
            let buffer = VertexBuffer::upload(&gpu, &floor_quad(0.5)).unwrap();
            let texture = Texture::upload(&gpu, &TextureImage::white()).unwrap();
            let target = DepthTarget::new(&gpu, 64, 32).unwrap();
            assert_eq!(buffer.len(), 6);
            assert_eq!(target.width(), 64);
            let _ = texture;
        }

        let commands = recording.take();
        assert_eq!(commands[0], Command::CreateBuffer { id: BufferId(1), bytes: 6 * 48 });
        assert!(commands.contains(&Command::DeleteBuffer(BufferId(1))));
        assert!(commands.contains(&Command::DeleteTexture(TextureId(2))));
        assert!(commands.contains(&Command::DeleteDepthTarget(DepthTargetId(3))));
    }
}
