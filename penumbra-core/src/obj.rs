/// Wavefront OBJ/MTL loading into a flat, batch-ready vertex stream
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use nalgebra::Point3;

use crate::geometry::{face_normal, Face, Vertex};
use crate::material::{Material, MaterialTable};

#[derive(thiserror::Error, Debug)]
pub enum ObjError {
    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read mesh source: {0}")]
    Read(#[from] io::Error),
    #[error("Failed to parse mesh: {0}")]
    Parse(#[from] tobj::LoadError),
    #[error("Faces cover {faces} vertices but the stream holds {vertices}")]
    FaceMismatch { faces: usize, vertices: usize },
}

/// A parsed mesh: one vertex per face corner (no index buffer), the faces
/// that partition that stream, and the materials the faces refer to.
#[derive(Debug, Clone, Default)]
pub struct MeshAsset {
    vertices: Vec<Vertex>,
    faces: Vec<Face>,
    materials: MaterialTable,
}

impl MeshAsset {
    /// Assemble a mesh from already expanded parts.
    pub fn from_parts(
        vertices: Vec<Vertex>,
        faces: Vec<Face>,
        materials: MaterialTable,
    ) -> Result<Self, ObjError> {
        let covered: usize = faces.iter().map(|face| face.count).sum();
        let contiguous = faces
            .iter()
            .scan(0, |cursor, face| {
                let ok = face.first == *cursor;
                *cursor += face.count;
                Some(ok)
            })
            .all(|ok| ok);

        if covered != vertices.len() || !contiguous {
            return Err(ObjError::FaceMismatch {
                faces: covered,
                vertices: vertices.len(),
            });
        }

        Ok(Self {
            vertices,
            faces,
            materials,
        })
    }

    /// Load an OBJ file. Material libraries and the textures they reference
    /// are resolved against `search_dir`.
    pub fn load(
        path: impl AsRef<Path>,
        scale: f32,
        search_dir: impl AsRef<Path>,
    ) -> Result<Self, ObjError> {
        let path = path.as_ref();
        let search_dir = search_dir.as_ref();
        log::info!("Parsing \"{}\"", path.display());

        let file = File::open(path).map_err(|source| ObjError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);

        Self::from_reader(&mut reader, scale, search_dir, |mtl_path| {
            tobj::load_mtl(search_dir.join(mtl_path))
        })
    }

    /// Parse OBJ text from any reader. `load_mtl` resolves `mtllib` statements.
    pub fn from_reader<B, F>(
        reader: &mut B,
        scale: f32,
        search_dir: &Path,
        load_mtl: F,
    ) -> Result<Self, ObjError>
    where
        B: BufRead,
        F: Fn(&Path) -> tobj::MTLLoadResult,
    {
        let options = tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        };
        let mut source = String::new();
        reader.read_to_string(&mut source)?;
        let max = normalisation_scalar(&source);

        let (models, materials) = tobj::load_obj_buf(&mut source.as_bytes(), &options, load_mtl)?;

        let materials = match materials {
            Ok(materials) => materials,
            Err(error) => {
                log::warn!(
                    "Failed to load material library, continuing without materials: {}",
                    error
                );
                Vec::new()
            }
        };
        let materials = MaterialTable::new(
            materials
                .iter()
                .map(|material| Material::from_tobj(material, search_dir))
                .collect(),
        );

        let asset = assemble(&models, materials, max, scale)?;
        log::info!(
            "Parsed mesh with {} vertices in {} faces",
            asset.vertices.len(),
            asset.faces.len()
        );

        Ok(asset)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn into_parts(self) -> (Vec<Vertex>, Vec<Face>, MaterialTable) {
        (self.vertices, self.faces, self.materials)
    }
}

/// Largest coordinate value over every `v` record in the file, referenced by
/// a face or not. This is the single scalar positions are divided by; it
/// neither centres the mesh nor keeps its aspect exact.
fn normalisation_scalar(source: &str) -> f32 {
    let max = source
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            (tokens.next() == Some("v")).then_some(tokens)
        })
        .flat_map(|tokens| tokens.take(3).filter_map(|token| token.parse::<f32>().ok()))
        .fold(f32::NEG_INFINITY, f32::max);

    if max == 0.0 || !max.is_finite() {
        1.0
    } else {
        max
    }
}

fn assemble(
    models: &[tobj::Model],
    materials: MaterialTable,
    max: f32,
    scale: f32,
) -> Result<MeshAsset, ObjError> {
    let mut vertices = Vec::new();
    let mut faces = Vec::new();

    for model in models {
        let mesh = &model.mesh;
        let material = mesh.material_id;
        let colour = materials.vertex_colour(material);
        let position = |index: u32| {
            let i = index as usize * 3;
            Point3::new(mesh.positions[i], mesh.positions[i + 1], mesh.positions[i + 2])
        };

        let arities = face_arities(mesh);
        let mut corner = 0;

        for arity in arities {
            let indices = &mesh.indices[corner..corner + arity];
            corner += arity;

            let flat_normal = if mesh.normals.is_empty() && arity >= 3 {
                face_normal(position(indices[0]), position(indices[1]), position(indices[2]))
            } else {
                nalgebra::Vector3::zeros()
            };

            let first = vertices.len();
            for &index in indices {
                let i = index as usize;
                let p = position(index);

                let normal = if mesh.normals.is_empty() {
                    flat_normal.into()
                } else {
                    [mesh.normals[i * 3], mesh.normals[i * 3 + 1], mesh.normals[i * 3 + 2]]
                };

                let texcoord = if mesh.texcoords.is_empty() {
                    [0.0, 0.0]
                } else {
                    [mesh.texcoords[i * 2], mesh.texcoords[i * 2 + 1]]
                };

                vertices.push(Vertex::new(
                    [p.x / max * scale, p.y / max * scale, p.z / max * scale],
                    colour,
                    normal,
                    texcoord,
                ));
            }

            faces.push(Face {
                first,
                count: arity,
                material,
            });
        }
    }

    MeshAsset::from_parts(vertices, faces, materials)
}

/// Vertex count of each face. Triangulated meshes leave the list empty.
fn face_arities(mesh: &tobj::Mesh) -> Vec<usize> {
    if mesh.face_arities.is_empty() {
        vec![3; mesh.indices.len() / 3]
    } else {
        mesh.face_arities.iter().map(|&arity| arity as usize).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    const TWO_MATERIALS_OBJ: &str = "\
mtllib scene.mtl
v 0 0 0
v 2 0 0
v 0 2 0
v 0 0 4
usemtl solid
f 1 2 3
usemtl glass
f 1 2 4
";

    const TWO_MATERIALS_MTL: &str = "\
newmtl solid
Kd 1 0 0
d 1.0

newmtl glass
Kd 0 0 1
d 0.4
";

    fn parse(obj: &str, mtl: &'static str, scale: f32) -> MeshAsset {
        MeshAsset::from_reader(&mut obj.as_bytes(), scale, Path::new("assets"), |_| {
            tobj::load_mtl_buf(&mut mtl.as_bytes())
        })
        .unwrap()
    }

    #[test]
    fn test_faces_cover_vertex_stream() {
        let mesh = parse(TWO_MATERIALS_OBJ, TWO_MATERIALS_MTL, 1.0);

        let total: usize = mesh.faces().iter().map(|face| face.count).sum();
        assert_eq!(total, mesh.vertices().len());
        assert_eq!(mesh.faces().len(), 2);
        assert_eq!(mesh.materials().len(), 2);
    }

    #[test]
    fn test_positions_divided_by_global_max() {
        let mesh = parse(TWO_MATERIALS_OBJ, TWO_MATERIALS_MTL, 2.0);

        // max coordinate is 4, scale is 2: every component is halved
        let positions: Vec<[f32; 3]> = mesh.vertices().iter().map(|v| v.position).collect();
        assert!(positions.contains(&[1.0, 0.0, 0.0]));
        assert!(positions.contains(&[0.0, 1.0, 0.0]));
        assert!(positions.contains(&[0.0, 0.0, 2.0]));
    }

    #[test]
    fn test_unreferenced_vertices_count_towards_max() {
        let obj = "\
v 0 0 0
v 1 0 0
v 0 1 0
v 10 0 0
f 1 2 3
";
        let mesh = parse(obj, "", 1.0);

        let positions: Vec<[f32; 3]> = mesh.vertices().iter().map(|v| v.position).collect();
        assert_eq!(positions, vec![[0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [0.0, 0.1, 0.0]]);
    }

    #[test]
    fn test_normalisation_reads_only_position_records() {
        let source = "v 1 2 3\nvn 0 0 9\nvt 7 7\n  v -1 5 0\n# v 99 0 0\n";
        assert_eq!(normalisation_scalar(source), 5.0);
        assert_eq!(normalisation_scalar("v 0 0 0\n"), 1.0);
        assert_eq!(normalisation_scalar(""), 1.0);
    }

    #[test]
    fn test_flat_normals_shared_within_face() {
        let mesh = parse(TWO_MATERIALS_OBJ, TWO_MATERIALS_MTL, 1.0);

        for face in mesh.faces() {
            let corners = &mesh.vertices()[face.range()];
            let expected =
                face_normal(corners[0].position(), corners[1].position(), corners[2].position());
            for vertex in corners {
                assert!((vertex.normal() - expected).norm() < 1e-6);
            }
        }

        let first = mesh.vertices()[0].normal();
        assert!((first - Vector3::z()).norm() < 1e-6);
    }

    #[test]
    fn test_source_normals_kept() {
        let obj = "\
v 0 0 0
v 1 0 0
v 0 1 0
vn 0 0 2
f 1//1 2//1 3//1
";
        let mesh = parse(obj, "", 1.0);

        for vertex in mesh.vertices() {
            assert_eq!(vertex.normal, [0.0, 0.0, 2.0]);
        }
    }

    #[test]
    fn test_colour_follows_material() {
        let mesh = parse(TWO_MATERIALS_OBJ, TWO_MATERIALS_MTL, 1.0);

        let solid = mesh.faces().iter().find(|face| face.material == Some(0)).unwrap();
        let glass = mesh.faces().iter().find(|face| face.material == Some(1)).unwrap();

        assert_eq!(mesh.vertices()[solid.first].colour, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(mesh.vertices()[glass.first].colour, [0.0, 0.0, 1.0, 0.4]);
        assert!(mesh.materials().is_transparent(glass.material));
    }

    #[test]
    fn test_textured_material_uses_white() {
        let obj = "\
mtllib wood.mtl
v 0 0 0
v 1 0 0
v 0 1 0
vt 0 0
vt 1 0
vt 0 1
usemtl wood
f 1/1 2/2 3/3
";
        let mtl = "\
newmtl wood
Kd 0.5 0.3 0.1
d 0.8
map_Kd wood.png
";
        let mesh = parse(obj, mtl, 1.0);

        assert_eq!(mesh.vertices()[0].colour, [1.0, 1.0, 1.0, 0.8]);
        assert_eq!(mesh.vertices()[1].texcoord, [1.0, 0.0]);
        let material = mesh.materials().get(0).unwrap();
        assert_eq!(material.diffuse_texture, Some(Path::new("assets").join("wood.png")));
    }

    #[test]
    fn test_missing_material_library_is_soft() {
        let obj = "\
mtllib missing.mtl
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
";
        let mesh = MeshAsset::from_reader(&mut obj.as_bytes(), 1.0, Path::new("."), |path| {
            tobj::load_mtl(Path::new("does-not-exist").join(path))
        })
        .unwrap();

        assert!(mesh.materials().is_empty());
        assert_eq!(mesh.vertices()[0].colour, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let error = MeshAsset::load("does-not-exist/model.obj", 1.0, "does-not-exist").unwrap_err();
        assert!(error.to_string().contains("model.obj"));
    }

    #[test]
    fn test_from_parts_checks_coverage() {
        let vertices = crate::geometry::floor_quad(1.0);
        let faces = vec![Face {
            first: 0,
            count: 3,
            material: None,
        }];

        assert!(matches!(
            MeshAsset::from_parts(vertices, faces, MaterialTable::default()),
            Err(ObjError::FaceMismatch { faces: 3, vertices: 6 })
        ));
    }
}
