//! The COLLADA document model.
//!
//! Everything here is already resolved: every `id` is final and every
//! reference is the ID of something else in the same document. Writing it
//! out is a straight walk with no decisions left to make.

use cgmath::Matrix4;

pub struct Document {
    pub asset: Asset,
    pub cameras: Vec<Camera>,
    pub lights: Vec<Light>,
    pub images: Vec<Image>,
    pub effects: Vec<Effect>,
    pub materials: Vec<Material>,
    pub geometries: Vec<Geometry>,
    pub controllers: Vec<Controller>,
    pub animations: Vec<Animation>,
    pub clips: Vec<AnimationClip>,
    pub visual_scene: VisualScene,
}

pub struct Asset {
    pub authoring_tool: String,
    /// ISO 8601, used for both `<created>` and `<modified>`.
    pub timestamp: String,
}

/// A `<source>` with a single accessor.
pub struct Source {
    pub id: String,
    /// ID of the `<*_array>` element.
    pub array_id: String,
    pub array: Array,
    /// Array elements per accessor item (16 for a matrix).
    pub stride: usize,
    /// (name, type) of each accessor param.
    pub params: &'static [(&'static str, &'static str)],
}

pub enum Array {
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// Written row-major, 16 floats each.
    Matrices(Vec<Matrix4<f64>>),
    Name(Vec<String>),
    IdRef(Vec<String>),
}

pub struct Camera {
    pub id: String,
    pub name: String,
    pub optics: Optics,
    pub aspect_ratio: f64,
    pub znear: f64,
    pub zfar: f64,
}

pub enum Optics {
    /// Horizontal field of view, degrees.
    Perspective { xfov: f64 },
    /// Half the width of the view volume.
    Orthographic { xmag: f64 },
}

pub struct Light {
    pub id: String,
    pub name: String,
    pub kind: LightKind,
    pub color: [f32; 3],
}

pub enum LightKind {
    Directional,
    Point { attenuation: Attenuation },
    /// `falloff_angle` in degrees.
    Spot { attenuation: Attenuation, falloff_angle: f32, falloff_exponent: f32 },
}

pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

pub struct Image {
    pub id: String,
    pub name: String,
    pub init_from: String,
}

pub struct Effect {
    pub id: String,
    pub name: String,
    pub emission: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub shininess: f32,
    /// Image ID of the diffuse texture.
    pub texture: Option<String>,
}

pub struct Material {
    pub id: String,
    pub name: String,
    pub effect: String,
}

pub struct Geometry {
    pub id: String,
    pub name: String,
    pub kind: GeometryKind,
}

pub enum GeometryKind {
    Mesh(Mesh),
    Spline(Spline),
}

pub struct Mesh {
    pub sources: Vec<Source>,
    pub vertices_id: String,
    /// ID of the positions source, the only input of `<vertices>`.
    pub positions: String,
    pub primitives: Vec<Primitive>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PrimitiveKind {
    Triangles,
    Polylist,
}

pub struct Primitive {
    pub kind: PrimitiveKind,
    /// Material symbol, bound in the instancing node.
    pub material: Option<String>,
    /// Number of polygons.
    pub count: usize,
    /// All at offset 0.
    pub inputs: Vec<Input>,
    /// Only for polylists.
    pub vcounts: Vec<u32>,
    pub indices: Vec<u32>,
}

pub struct Input {
    pub semantic: &'static str,
    pub source: String,
    pub set: Option<usize>,
}

pub struct Spline {
    pub closed: bool,
    pub sources: Vec<Source>,
    pub control_vertices: Vec<Input>,
}

pub struct Controller {
    pub id: String,
    pub name: String,
    pub kind: ControllerKind,
}

pub enum ControllerKind {
    Skin(Skin),
    Morph(Morph),
}

pub struct Skin {
    /// Geometry or morph controller being skinned.
    pub source: String,
    pub bind_shape: Matrix4<f64>,
    pub joints: Source,
    pub inv_binds: Source,
    pub weights: Source,
    /// Influence count of each vertex.
    pub vcounts: Vec<u32>,
    /// (joint index, weight index) of every influence.
    pub v: Vec<(u32, u32)>,
}

pub struct Morph {
    pub source: String,
    pub targets: Source,
    pub weights: Source,
}

/// One animated channel.
pub struct Animation {
    pub id: String,
    pub input: Source,
    pub output: Source,
    pub interpolation: Source,
    pub sampler_id: String,
    /// Eg. `Cube/transform` or `Cube-morph-weights(0)`.
    pub target: String,
}

pub struct AnimationClip {
    pub id: String,
    pub name: String,
    pub start: f64,
    pub end: f64,
    pub animations: Vec<String>,
}

pub struct VisualScene {
    pub id: String,
    pub name: String,
    pub nodes: Vec<Node>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeType {
    Node,
    Joint,
}

pub struct Node {
    pub id: String,
    pub sid: Option<String>,
    pub name: String,
    pub node_type: NodeType,
    /// Local-to-parent; written with `sid="transform"` so it can be animated.
    pub matrix: Matrix4<f64>,
    pub instances: Vec<Instance>,
    pub children: Vec<Node>,
}

pub enum Instance {
    Camera { url: String },
    Light { url: String },
    Geometry { url: String, materials: Vec<MaterialBinding> },
    Controller { url: String, skeletons: Vec<String>, materials: Vec<MaterialBinding> },
}

pub struct MaterialBinding {
    pub symbol: String,
    pub target: String,
    /// Bind the texture's `CHANNEL0` texcoord to this TEXCOORD set.
    pub texcoord_set: Option<usize>,
}

impl Array {
    /// Number of values in the `<*_array>`.
    pub fn len(&self) -> usize {
        match *self {
            Array::F32(ref v) => v.len(),
            Array::F64(ref v) => v.len(),
            Array::Matrices(ref v) => 16 * v.len(),
            Array::Name(ref v) => v.len(),
            Array::IdRef(ref v) => v.len(),
        }
    }
}

impl Source {
    /// Number of accessor items.
    pub fn count(&self) -> usize {
        if self.stride == 0 { 0 } else { self.array.len() / self.stride }
    }
}

pub const XYZ: &[(&str, &str)] = &[("X", "float"), ("Y", "float"), ("Z", "float")];
pub const ST: &[(&str, &str)] = &[("S", "float"), ("T", "float")];
pub const RGBA: &[(&str, &str)] = &[("R", "float"), ("G", "float"), ("B", "float"), ("A", "float")];
pub const TRANSFORM: &[(&str, &str)] = &[("TRANSFORM", "float4x4")];
pub const TIME: &[(&str, &str)] = &[("TIME", "float")];
pub const WEIGHT: &[(&str, &str)] = &[("WEIGHT", "float")];
pub const JOINT: &[(&str, &str)] = &[("JOINT", "name")];
pub const MORPH_TARGET: &[(&str, &str)] = &[("MORPH_TARGET", "IDREF")];
pub const INTERPOLATION: &[(&str, &str)] = &[("INTERPOLATION", "name")];
