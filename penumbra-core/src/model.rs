/// Scene objects: an uploaded vertex stream, its materials and a model transform
use std::path::Path;
use std::rc::Rc;

use nalgebra::{Matrix4, Unit, Vector3};

use crate::device::{
    uniforms, Gpu, GpuError, ProgramId, Sampled, Texture, TextureImage, Uniform, VertexBuffer,
};
use crate::geometry::{triangle_faces, Face, Vertex};
use crate::material::MaterialTable;
use crate::obj::MeshAsset;

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("GPU resource creation failed: {0}")]
    Gpu(#[from] GpuError),
}

#[derive(thiserror::Error, Debug)]
pub enum TextureError {
    #[error("Failed to read texture {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("Failed to decode texture {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Source of decoded texture images, keyed by file path.
pub trait TextureLoader {
    fn load(&mut self, path: &Path) -> Result<TextureImage, TextureError>;
}

impl<F> TextureLoader for F
where
    F: FnMut(&Path) -> Result<TextureImage, TextureError>,
{
    fn load(&mut self, path: &Path) -> Result<TextureImage, TextureError> {
        self(path)
    }
}

/// Draw layer. Opaque faces are always emitted before transparent ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Layer {
    Opaque,
    Transparent,
}

/// A contiguous vertex range drawn with one material binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawBatch {
    pub first: usize,
    pub count: usize,
    pub material: Option<usize>,
    pub layer: Layer,
}

/// Group faces into draw batches: every opaque face first, then every
/// transparent face, each layer in file order. Consecutive faces sharing a
/// material are merged. A face of the other layer ends the current batch,
/// so each batch stays one contiguous range of the vertex stream.
pub fn plan_batches(faces: &[Face], materials: &MaterialTable) -> Vec<DrawBatch> {
    let mut batches = Vec::new();

    for layer in [Layer::Opaque, Layer::Transparent] {
        let mut current: Option<DrawBatch> = None;

        for face in faces {
            let face_layer = if materials.is_transparent(face.material) {
                Layer::Transparent
            } else {
                Layer::Opaque
            };

            if face_layer != layer {
                batches.extend(current.take());
                continue;
            }

            match current.as_mut() {
                Some(batch)
                    if batch.material == face.material && batch.first + batch.count == face.first =>
                {
                    batch.count += face.count;
                }
                _ => {
                    let next = DrawBatch {
                        first: face.first,
                        count: face.count,
                        material: face.material,
                        layer,
                    };
                    batches.extend(current.replace(next));
                }
            }
        }

        batches.extend(current.take());
    }

    batches
}

/// A renderable object. The vertex buffer is created once at construction
/// and never resized; transforms accumulate by post-multiplication and there
/// is deliberately no way to reset them.
#[derive(Debug)]
pub struct Model {
    buffer: VertexBuffer,
    fallback: Texture,
    textures: Vec<Option<Texture>>,
    faces: Vec<Face>,
    materials: MaterialTable,
    batches: Vec<DrawBatch>,
    transform: Matrix4<f32>,
}

impl Model {
    /// Upload a parsed mesh and its material textures. Textures that fail to
    /// load fall back to plain white; failing to create GPU resources is fatal.
    pub fn from_asset(
        gpu: &Rc<dyn Gpu>,
        asset: MeshAsset,
        loader: &mut impl TextureLoader,
    ) -> Result<Self, ModelError> {
        let (vertices, faces, materials) = asset.into_parts();

        let mut textures = Vec::with_capacity(materials.len());
        for material in materials.iter() {
            let texture = match &material.diffuse_texture {
                Some(path) => {
                    log::info!("Loading texture: {}", path.display());
                    match loader.load(path) {
                        Ok(image) => Some(Texture::upload(gpu, &image)?),
                        Err(error) => {
                            log::warn!(
                                "Using fallback texture for material \"{}\": {}",
                                material.name,
                                error
                            );
                            None
                        }
                    }
                }
                None => None,
            };
            textures.push(texture);
        }

        Self::build(gpu, &vertices, faces, materials, textures)
    }

    /// Upload a procedurally generated triangle list without materials.
    pub fn from_vertices(gpu: &Rc<dyn Gpu>, vertices: &[Vertex]) -> Result<Self, ModelError> {
        let faces = triangle_faces(vertices.len());
        Self::build(gpu, vertices, faces, MaterialTable::default(), Vec::new())
    }

    fn build(
        gpu: &Rc<dyn Gpu>,
        vertices: &[Vertex],
        faces: Vec<Face>,
        materials: MaterialTable,
        textures: Vec<Option<Texture>>,
    ) -> Result<Self, ModelError> {
        let fallback = Texture::upload(gpu, &TextureImage::white())?;
        let buffer = VertexBuffer::upload(gpu, vertices)?;
        let batches = plan_batches(&faces, &materials);

        Ok(Self {
            buffer,
            fallback,
            textures,
            faces,
            materials,
            batches,
            transform: Matrix4::identity(),
        })
    }

    pub fn translate(&mut self, translation: Vector3<f32>) {
        self.transform *= Matrix4::new_translation(&translation);
    }

    pub fn rotate(&mut self, angle: f32, axis: Vector3<f32>) {
        match Unit::try_new(axis, 1e-6) {
            Some(axis) => self.transform *= Matrix4::from_axis_angle(&axis, angle),
            None => log::warn!("Ignoring rotation around degenerate axis {:?}", axis),
        }
    }

    /// Non-uniform scaling
    pub fn scale(&mut self, factors: Vector3<f32>) {
        self.transform *= Matrix4::new_nonuniform_scaling(&factors);
    }

    /// Uniform scaling
    pub fn scale_uniform(&mut self, factor: f32) {
        self.scale(Vector3::repeat(factor));
    }

    pub fn transform(&self) -> &Matrix4<f32> {
        &self.transform
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn batches(&self) -> &[DrawBatch] {
        &self.batches
    }

    pub fn vertex_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn has_transparency(&self) -> bool {
        self.materials.has_transparency()
    }

    /// Issue the draw calls for this object with `program`. Leaves the
    /// program, vertex buffer and texture unit 0 bound.
    pub fn draw(&self, program: ProgramId) {
        let gpu = self.buffer.gpu();
        gpu.use_program(program);
        gpu.bind_vertex_buffer(self.buffer.id());
        gpu.set_uniform(uniforms::MODEL, Uniform::Mat4(self.transform));

        if self.materials.is_empty() {
            gpu.bind_texture(uniforms::TEXTURE_UNIT, Sampled::Colour(self.fallback.id()));
            gpu.set_uniform(uniforms::TEXTURE, Uniform::Sampler(uniforms::TEXTURE_UNIT));
            gpu.draw_triangles(0, self.buffer.len());
            return;
        }

        let mut bound = None;
        for batch in &self.batches {
            if bound != Some(batch.material) {
                let texture = self.texture_for(batch.material);
                gpu.bind_texture(uniforms::TEXTURE_UNIT, Sampled::Colour(texture));
                gpu.set_uniform(uniforms::TEXTURE, Uniform::Sampler(uniforms::TEXTURE_UNIT));
                bound = Some(batch.material);
            }
            gpu.draw_triangles(batch.first, batch.count);
        }
    }

    fn texture_for(&self, material: Option<usize>) -> crate::device::TextureId {
        material
            .and_then(|index| self.textures.get(index))
            .and_then(Option::as_ref)
            .unwrap_or(&self.fallback)
            .id()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::device::testing::{Command, RecordingGpu};
    use crate::device::TextureId;
    use crate::geometry::floor_quad;
    use crate::material::Material;

    fn face(first: usize, count: usize, material: usize) -> Face {
        Face {
            first,
            count,
            material: Some(material),
        }
    }

    fn two_layer_asset() -> MeshAsset {
        let vertices = vec![Vertex::default(); 6];
        let faces = vec![face(0, 3, 0), face(3, 3, 1)];
        let materials = MaterialTable::new(vec![
            Material::new("solid", [1.0, 0.0, 0.0], 1.0),
            Material::new("glass", [0.0, 0.0, 1.0], 0.4),
        ]);
        MeshAsset::from_parts(vertices, faces, materials).unwrap()
    }

    fn no_textures(path: &Path) -> Result<TextureImage, TextureError> {
        Err(TextureError::Read {
            path: path.display().to_string(),
            reason: "not found".to_string(),
        })
    }

    #[test]
    fn test_opaque_and_transparent_face_make_two_batches() {
        let (recording, gpu) = RecordingGpu::shared();
        let model = Model::from_asset(&gpu, two_layer_asset(), &mut no_textures).unwrap();
        recording.take();

        model.draw(ProgramId(7));

        assert_eq!(recording.draws(), vec![(0, 3), (3, 3)]);
        assert_eq!(model.batches()[0].layer, Layer::Opaque);
        assert_eq!(model.batches()[1].layer, Layer::Transparent);
    }

    #[test]
    fn test_transparent_faces_drawn_after_opaque() {
        let materials = MaterialTable::new(vec![
            Material::new("glass", [1.0; 3], 0.5),
            Material::new("wood", [1.0; 3], 1.0),
        ]);
        let faces = vec![face(0, 3, 0), face(3, 3, 1), face(6, 3, 0), face(9, 3, 1)];

        let batches = plan_batches(&faces, &materials);
        let first_transparent = batches
            .iter()
            .position(|batch| batch.layer == Layer::Transparent)
            .unwrap();

        assert!(batches[..first_transparent].iter().all(|batch| batch.material == Some(1)));
        assert!(batches[first_transparent..].iter().all(|batch| batch.material == Some(0)));
        assert_eq!(
            batches.iter().map(|batch| (batch.first, batch.count)).collect::<Vec<_>>(),
            vec![(3, 3), (9, 3), (0, 3), (6, 3)]
        );
    }

    #[test]
    fn test_consecutive_faces_coalesce() {
        let materials = MaterialTable::new(vec![
            Material::new("a", [1.0; 3], 1.0),
            Material::new("b", [1.0; 3], 1.0),
        ]);
        let faces = vec![
            face(0, 3, 0),
            face(3, 3, 0),
            face(6, 4, 0),
            face(10, 3, 1),
            face(13, 3, 0),
        ];

        let batches = plan_batches(&faces, &materials);

        assert_eq!(
            batches
                .iter()
                .map(|batch| (batch.first, batch.count, batch.material))
                .collect::<Vec<_>>(),
            vec![(0, 10, Some(0)), (10, 3, Some(1)), (13, 3, Some(0))]
        );
    }

    #[test]
    fn test_other_layer_face_splits_batch() {
        let materials = MaterialTable::new(vec![
            Material::new("solid", [1.0; 3], 1.0),
            Material::new("glass", [1.0; 3], 0.2),
        ]);
        let faces = vec![face(0, 3, 0), face(3, 3, 1), face(6, 3, 0)];

        let batches = plan_batches(&faces, &materials);

        // the solid faces are not adjacent in the stream, so they cannot share a range
        assert_eq!(
            batches.iter().map(|batch| (batch.first, batch.count)).collect::<Vec<_>>(),
            vec![(0, 3), (6, 3), (3, 3)]
        );
    }

    #[test]
    fn test_batches_cover_every_face_once() {
        let materials = MaterialTable::new(vec![
            Material::new("a", [1.0; 3], 1.0),
            Material::new("b", [1.0; 3], 0.7),
            Material::new("c", [1.0; 3], 1.0),
        ]);
        let faces: Vec<Face> = (0..30)
            .map(|i| Face {
                first: i * 3,
                count: 3,
                material: if i % 7 == 0 { None } else { Some(i % 3) },
            })
            .collect();

        let batches = plan_batches(&faces, &materials);

        let mut covered: Vec<usize> = batches
            .iter()
            .flat_map(|batch| batch.first..batch.first + batch.count)
            .collect();
        covered.sort_unstable();
        assert_eq!(covered, (0..90).collect::<Vec<_>>());
    }

    #[test]
    fn test_procedural_mesh_single_fallback_draw() {
        let (recording, gpu) = RecordingGpu::shared();
        let model = Model::from_vertices(&gpu, &floor_quad(0.5)).unwrap();
        recording.take();

        model.draw(ProgramId(1));

        let commands = recording.take();
        assert!(commands.contains(&Command::BindTexture(0, Sampled::Colour(TextureId(1)))));
        assert!(commands.contains(&Command::Uniform("Texture".to_string(), Uniform::Sampler(0))));
        let draws: Vec<_> = commands
            .iter()
            .filter(|command| matches!(command, Command::Draw { .. }))
            .collect();
        assert_eq!(draws, vec![&Command::Draw { first: 0, count: 6 }]);
    }

    #[test]
    fn test_draw_uploads_model_matrix_first() {
        let (recording, gpu) = RecordingGpu::shared();
        let mut model = Model::from_vertices(&gpu, &floor_quad(0.5)).unwrap();
        model.translate(Vector3::new(0.0, -1.2, 0.0));
        recording.take();

        model.draw(ProgramId(3));

        let commands = recording.take();
        assert_eq!(commands[0], Command::UseProgram(ProgramId(3)));
        assert!(matches!(commands[1], Command::BindVertexBuffer(_)));
        assert_eq!(
            commands[2],
            Command::Uniform("model".to_string(), Uniform::Mat4(*model.transform()))
        );
    }

    #[test]
    fn test_textures_loaded_per_material_with_fallback() {
        let (recording, gpu) = RecordingGpu::shared();
        let vertices = vec![Vertex::default(); 6];
        let faces = vec![face(0, 3, 0), face(3, 3, 1)];
        let materials = MaterialTable::new(vec![
            Material::new("painted", [1.0; 3], 1.0).with_texture("paint.png"),
            Material::new("broken", [1.0; 3], 1.0).with_texture("broken.png"),
        ]);
        let asset = MeshAsset::from_parts(vertices, faces, materials).unwrap();

        let mut requested = Vec::new();
        let mut loader = |path: &Path| {
            requested.push(path.to_path_buf());
            if path.ends_with("paint.png") {
                TextureImage::new(2, 1, vec![255; 8]).map_err(TextureError::from)
            } else {
                no_textures(path)
            }
        };
        let model = Model::from_asset(&gpu, asset, &mut loader).unwrap();
        assert_eq!(requested, vec![PathBuf::from("paint.png"), PathBuf::from("broken.png")]);

        recording.take();
        model.draw(ProgramId(1));
        let binds: Vec<_> = recording
            .take()
            .into_iter()
            .filter_map(|command| match command {
                Command::BindTexture(0, Sampled::Colour(id)) => Some(id),
                _ => None,
            })
            .collect();

        // the painted texture was created first, the fallback after it
        assert_eq!(binds, vec![TextureId(1), TextureId(2)]);
    }

    #[test]
    fn test_resource_failure_is_fatal() {
        let (recording, gpu) = RecordingGpu::shared();
        recording.fail_creation.set(true);

        assert!(matches!(Model::from_vertices(&gpu, &floor_quad(0.5)), Err(ModelError::Gpu(_))));
    }

    #[test]
    fn test_transform_order_matters() {
        let (_, gpu) = RecordingGpu::shared();
        let mut scaled_first = Model::from_vertices(&gpu, &floor_quad(0.5)).unwrap();
        let mut translated_first = Model::from_vertices(&gpu, &floor_quad(0.5)).unwrap();

        scaled_first.scale(Vector3::new(2.0, 1.0, 3.0));
        scaled_first.translate(Vector3::new(1.0, 1.0, 1.0));

        translated_first.translate(Vector3::new(1.0, 1.0, 1.0));
        translated_first.scale(Vector3::new(2.0, 1.0, 3.0));

        assert!((scaled_first.transform() - translated_first.transform()).norm() > 1e-3);
        // post-multiplication: the translation is scaled when it comes last
        assert!((scaled_first.transform()[(0, 3)] - 2.0).abs() < 1e-6);
        assert!((translated_first.transform()[(0, 3)] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rotate_ignores_zero_axis() {
        let (_, gpu) = RecordingGpu::shared();
        let mut model = Model::from_vertices(&gpu, &floor_quad(0.5)).unwrap();

        model.rotate(1.0, Vector3::zeros());
        assert_eq!(*model.transform(), Matrix4::identity());

        model.rotate(std::f32::consts::FRAC_PI_2, Vector3::y());
        let x = model.transform().transform_vector(&Vector3::x());
        assert!((x - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-6);
    }
}
