/// Penumbra Core Library - Shadow-mapped scene rendering
///
/// This library holds everything that does not depend on a concrete graphics
/// device: OBJ/MTL loading, material-batched scene objects, the shadow and
/// colour passes, camera and light, and the frame loop that ties them
/// together. The device itself is reached through the [`device::Gpu`] trait.

pub mod animation;
pub mod camera;
pub mod config;
pub mod device;
pub mod frame;
pub mod geometry;
pub mod light;
pub mod material;
pub mod model;
pub mod obj;
pub mod pass;
pub mod scene;

// Re-export commonly used types
pub use animation::{Animator, Spin};
pub use camera::Camera;
pub use config::{RendererConfig, Resolution};
pub use device::{Gpu, GpuError, ProgramId, TextureImage};
pub use frame::{FrameInput, FrameLoop, FrameStatus};
pub use geometry::{Face, Vertex};
pub use light::Light;
pub use material::{Material, MaterialTable};
pub use model::{Model, ModelError, TextureError, TextureLoader};
pub use obj::{MeshAsset, ObjError};
pub use pass::{ColorPass, FrameUniforms, ShadowPass};
pub use scene::{ObjectId, Scene, SceneContext, SceneError};
