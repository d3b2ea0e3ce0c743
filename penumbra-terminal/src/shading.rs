/// Built-in shader programs of the software device
///
/// Two programs exist: a depth-only program for the shadow pass and a lit,
/// textured, shadowed program for the colour pass. Uniforms are set by name
/// per program, exactly like the GL programs the core expects.
use nalgebra::{Matrix3, Matrix4, Vector2, Vector3, Vector4};
use penumbra_core::device::{uniforms, ProgramId, TextureImage, Uniform};
use penumbra_core::Vertex;

pub const DEPTH_PROGRAM: ProgramId = ProgramId(1);
pub const SHADED_PROGRAM: ProgramId = ProgramId(2);

const AMBIENT: f32 = 0.2;
const SPECULAR_STRENGTH: f32 = 0.5;
const SHININESS: f32 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    Depth,
    Shaded,
}

impl Program {
    pub fn from_id(id: ProgramId) -> Option<Self> {
        match id {
            DEPTH_PROGRAM => Some(Self::Depth),
            SHADED_PROGRAM => Some(Self::Shaded),
            _ => None,
        }
    }
}

/// Uniform block of one program. Unset values default the way freshly
/// linked GL uniforms do: zero matrices, zero vectors, sampler unit 0.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramUniforms {
    pub model: Matrix4<f32>,
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub light_space: Matrix4<f32>,
    pub light_direction: Vector3<f32>,
    pub light_colour: Vector3<f32>,
    pub light_position: Vector3<f32>,
    pub camera_position: Vector3<f32>,
    pub texture_unit: u32,
    pub shadow_map_unit: u32,
}

impl Default for ProgramUniforms {
    fn default() -> Self {
        Self {
            model: Matrix4::zeros(),
            view: Matrix4::zeros(),
            projection: Matrix4::zeros(),
            light_space: Matrix4::zeros(),
            light_direction: Vector3::zeros(),
            light_colour: Vector3::zeros(),
            light_position: Vector3::zeros(),
            camera_position: Vector3::zeros(),
            texture_unit: 0,
            shadow_map_unit: 0,
        }
    }
}

impl ProgramUniforms {
    /// Returns false when the name or value type is not part of the program
    /// interface; the value is then ignored.
    pub fn set(&mut self, name: &str, value: Uniform) -> bool {
        match (name, value) {
            (uniforms::MODEL, Uniform::Mat4(m)) => self.model = m,
            (uniforms::VIEW, Uniform::Mat4(m)) => self.view = m,
            (uniforms::PROJECTION, Uniform::Mat4(m)) => self.projection = m,
            (uniforms::LIGHT_SPACE, Uniform::Mat4(m)) => self.light_space = m,
            (uniforms::LIGHT_DIRECTION, Uniform::Vec3(v)) => self.light_direction = v,
            (uniforms::LIGHT_COLOUR, Uniform::Vec3(v)) => self.light_colour = v,
            (uniforms::LIGHT_POSITION, Uniform::Vec3(v)) => self.light_position = v,
            (uniforms::CAMERA_POSITION, Uniform::Vec3(v)) => self.camera_position = v,
            (uniforms::TEXTURE, Uniform::Sampler(unit)) => self.texture_unit = unit,
            (uniforms::SHADOW_MAP, Uniform::Sampler(unit)) => self.shadow_map_unit = unit,
            _ => return false,
        }
        true
    }
}

/// Per-vertex outputs interpolated across a triangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Varyings {
    pub world: Vector3<f32>,
    pub normal: Vector3<f32>,
    pub colour: Vector4<f32>,
    pub texcoord: Vector2<f32>,
    pub light_space: Vector4<f32>,
}

impl Varyings {
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            world: self.world.lerp(&other.world, t),
            normal: self.normal.lerp(&other.normal, t),
            colour: self.colour.lerp(&other.colour, t),
            texcoord: self.texcoord.lerp(&other.texcoord, t),
            light_space: self.light_space.lerp(&other.light_space, t),
        }
    }

    /// Weighted sum of three vertices' outputs.
    pub fn blend(v: [&Self; 3], w: [f32; 3]) -> Self {
        Self {
            world: v[0].world * w[0] + v[1].world * w[1] + v[2].world * w[2],
            normal: v[0].normal * w[0] + v[1].normal * w[1] + v[2].normal * w[2],
            colour: v[0].colour * w[0] + v[1].colour * w[1] + v[2].colour * w[2],
            texcoord: v[0].texcoord * w[0] + v[1].texcoord * w[1] + v[2].texcoord * w[2],
            light_space: v[0].light_space * w[0]
                + v[1].light_space * w[1]
                + v[2].light_space * w[2],
        }
    }
}

/// Run the vertex stage, returning the clip-space position and outputs.
pub fn vertex_stage(
    program: Program,
    uniforms: &ProgramUniforms,
    vertex: &Vertex,
) -> (Vector4<f32>, Varyings) {
    let world = uniforms.model * vertex.position().to_homogeneous();

    match program {
        Program::Depth => (uniforms.light_space * world, Varyings::default()),
        Program::Shaded => {
            let linear: Matrix3<f32> = uniforms.model.fixed_view::<3, 3>(0, 0).into_owned();
            let normal_matrix =
                linear.try_inverse().map(|inverse| inverse.transpose()).unwrap_or(linear);

            let varyings = Varyings {
                world: world.xyz(),
                normal: normal_matrix * vertex.normal(),
                colour: Vector4::from(vertex.colour),
                texcoord: Vector2::from(vertex.texcoord),
                light_space: uniforms.light_space * world,
            };
            (uniforms.projection * uniforms.view * world, varyings)
        }
    }
}

/// Bilinear sample with repeat wrapping. `v = 1` is the top image row.
pub fn sample_texture(image: &TextureImage, texcoord: Vector2<f32>) -> Vector4<f32> {
    let (width, height) = (image.width() as f32, image.height() as f32);
    let x = texcoord.x.rem_euclid(1.0) * width - 0.5;
    let y = (1.0 - texcoord.y).rem_euclid(1.0) * height - 0.5;

    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);

    let texel = |tx: f32, ty: f32| {
        let tx = (tx as i64).rem_euclid(image.width() as i64) as u32;
        let ty = (ty as i64).rem_euclid(image.height() as i64) as u32;
        let [r, g, b, a] = image.texel(tx, ty);
        Vector4::new(r as f32, g as f32, b as f32, a as f32) / 255.0
    };

    let top = texel(x0, y0).lerp(&texel(x0 + 1.0, y0), fx);
    let bottom = texel(x0, y0 + 1.0).lerp(&texel(x0 + 1.0, y0 + 1.0), fx);
    top.lerp(&bottom, fy)
}

/// Read access to a depth map in [0, 1], row 0 at the top.
pub trait DepthMap {
    fn size(&self) -> (u32, u32);
    fn depth(&self, x: u32, y: u32) -> f32;
}

/// Fraction of a 3x3 neighbourhood that sees an occluder closer to the
/// light than this fragment. Fragments outside the light's far plane are
/// never shadowed.
pub fn shadow_factor(
    shadow_map: &dyn DepthMap,
    light_space: Vector4<f32>,
    normal: Vector3<f32>,
    to_light: Vector3<f32>,
) -> f32 {
    if light_space.w.abs() < f32::EPSILON {
        return 0.0;
    }
    let projected = light_space.xyz() / light_space.w * 0.5 + Vector3::repeat(0.5);
    if projected.z > 1.0 {
        return 0.0;
    }

    let bias = (0.005 * (1.0 - normal.dot(&to_light))).max(0.0005);
    let (width, height) = shadow_map.size();
    let column = (projected.x * width as f32).floor() as i64;
    let row = ((1.0 - projected.y) * height as f32).floor() as i64;

    let mut shadowed = 0.0;
    for dy in -1..=1 {
        for dx in -1..=1 {
            let x = (column + dx).clamp(0, width as i64 - 1) as u32;
            let y = (row + dy).clamp(0, height as i64 - 1) as u32;
            if projected.z - bias > shadow_map.depth(x, y) {
                shadowed += 1.0;
            }
        }
    }
    shadowed / 9.0
}

/// Phong lighting of one fragment. `texel` is the sampled material
/// texture; the result alpha is the texture alpha times the vertex alpha.
pub fn shade_fragment(
    uniforms: &ProgramUniforms,
    varyings: &Varyings,
    texel: Vector4<f32>,
    shadow_map: Option<&dyn DepthMap>,
) -> Vector4<f32> {
    let base = texel.component_mul(&varyings.colour);
    let normal = varyings.normal.try_normalize(1e-8).unwrap_or_else(Vector3::y);
    let to_light = (-uniforms.light_direction).try_normalize(1e-8).unwrap_or_else(Vector3::y);

    let ambient = uniforms.light_colour * AMBIENT;
    let diffuse = uniforms.light_colour * normal.dot(&to_light).max(0.0);

    let view_dir = (uniforms.camera_position - varyings.world)
        .try_normalize(1e-8)
        .unwrap_or_else(Vector3::zeros);
    let reflected = -to_light - normal * 2.0 * normal.dot(&-to_light);
    let highlight = view_dir.dot(&reflected).max(0.0).powf(SHININESS);
    let specular = uniforms.light_colour * SPECULAR_STRENGTH * highlight;

    let shadow = shadow_map
        .map(|map| shadow_factor(map, varyings.light_space, normal, to_light))
        .unwrap_or(0.0);

    let lit = (ambient + (diffuse + specular) * (1.0 - shadow)).component_mul(&base.xyz());
    Vector4::new(lit.x.min(1.0), lit.y.min(1.0), lit.z.min(1.0), base.w)
}
