/// Vertex and face primitives shared by parsed and procedural meshes
use bytemuck::{Pod, Zeroable};
use nalgebra::{Point3, Vector3};

/// A GPU-ready vertex: position, colour (alpha carries the material dissolve),
/// normal and texture coordinate, tightly packed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub colour: [f32; 4],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
}

impl Vertex {
    pub fn new(position: [f32; 3], colour: [f32; 4], normal: [f32; 3], texcoord: [f32; 2]) -> Self {
        Self {
            position,
            colour,
            normal,
            texcoord,
        }
    }

    pub fn position(&self) -> Point3<f32> {
        Point3::from(self.position)
    }

    pub fn normal(&self) -> Vector3<f32> {
        Vector3::from(self.normal)
    }
}

/// A run of `count` consecutive vertices in the flattened stream starting at
/// `first`, drawn with a single material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    pub first: usize,
    pub count: usize,
    pub material: Option<usize>,
}

impl Face {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.first..self.first + self.count
    }
}

/// Split a plain triangle list into faces without materials.
pub fn triangle_faces(vertex_count: usize) -> Vec<Face> {
    (0..vertex_count)
        .step_by(3)
        .map(|first| Face {
            first,
            count: (vertex_count - first).min(3),
            material: None,
        })
        .collect()
}

/// Flat normal of the plane through three points.
pub fn face_normal(p0: Point3<f32>, p1: Point3<f32>, p2: Point3<f32>) -> Vector3<f32> {
    let edge1 = p1 - p0;
    let edge2 = p2 - p0;

    edge1.cross(&edge2).normalize()
}

/// Unit floor quad at y = -size, two triangles facing +Y, opaque white.
pub fn floor_quad(size: f32) -> Vec<Vertex> {
    let vertex = |x: f32, z: f32| {
        Vertex::new([x, -size, z], [1.0, 1.0, 1.0, 1.0], [0.0, 1.0, 0.0], [0.0, 0.0])
    };

    vec![
        // Triangle 1
        vertex(-size, -size),
        vertex(size, size),
        vertex(size, -size),
        // Triangle 2
        vertex(-size, -size),
        vertex(-size, size),
        vertex(size, size),
    ]
}

/// Axis-aligned cube centred on the origin with per-face normals and
/// counter-clockwise outward winding.
pub fn cube(size: f32, colour: [f32; 4]) -> Vec<Vertex> {
    let half = size / 2.0;
    let mut vertices = Vec::with_capacity(36);

    let mut quad = |corners: [[f32; 3]; 4], normal: [f32; 3]| {
        let uv = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        for i in [0, 1, 2, 0, 2, 3] {
            vertices.push(Vertex::new(corners[i], colour, normal, uv[i]));
        }
    };

    // Front face
    quad(
        [[-half, -half, half], [half, -half, half], [half, half, half], [-half, half, half]],
        [0.0, 0.0, 1.0],
    );
    // Back face
    quad(
        [[half, -half, -half], [-half, -half, -half], [-half, half, -half], [half, half, -half]],
        [0.0, 0.0, -1.0],
    );
    // Top face
    quad(
        [[-half, half, half], [half, half, half], [half, half, -half], [-half, half, -half]],
        [0.0, 1.0, 0.0],
    );
    // Bottom face
    quad(
        [[-half, -half, -half], [half, -half, -half], [half, -half, half], [-half, -half, half]],
        [0.0, -1.0, 0.0],
    );
    // Right face
    quad(
        [[half, -half, half], [half, -half, -half], [half, half, -half], [half, half, half]],
        [1.0, 0.0, 0.0],
    );
    // Left face
    quad(
        [[-half, -half, -half], [-half, -half, half], [-half, half, half], [-half, half, -half]],
        [-1.0, 0.0, 0.0],
    );

    vertices
}
