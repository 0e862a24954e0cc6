//! The scene snapshot the exporter reads.
//!
//! This is an abstract stand-in for whatever the host application uses: an
//! arena of objects linked by parent indices, plus the actions, materials and
//! images they refer to. It's built once before the export starts and is only
//! ever read afterwards.

pub mod load;
mod transform;

pub use self::transform::{Rotation, Trs};

use cgmath::{Matrix4, One};
use smallvec::SmallVec;
use std::path::PathBuf;

pub type ObjectId = usize;
pub type MaterialId = usize;
pub type ImageId = usize;
pub type ActionId = usize;

pub struct Scene {
    pub objects: Vec<SceneObject>,
    pub actions: Vec<Action>,
    pub materials: Vec<Material>,
    pub images: Vec<Image>,
    /// Playback rate, in frames per second.
    pub fps: f64,
}

pub struct SceneObject {
    pub name: String,
    pub parent: Option<ObjectId>,
    /// Local-to-parent transform.
    pub transform: Trs,
    pub selected: bool,
    /// Visible in the active view layer.
    pub visible: bool,
    pub data: ObjectData,
    pub animation: Option<AnimationData>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Empty,
    Camera,
    Light,
    Armature,
    Mesh,
    Curve,
}

pub enum ObjectData {
    Empty,
    Camera(CameraData),
    Light(LightData),
    Armature(ArmatureData),
    Mesh(MeshData),
    Curve(CurveData),
    /// Something the host has that we don't know how to export. Kept around
    /// so the hierarchy under it stays intact.
    Unsupported(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimationData {
    /// Name of the active action.
    pub action: Option<String>,
}

impl Scene {
    pub fn new() -> Scene {
        Scene {
            objects: vec![],
            actions: vec![],
            materials: vec![],
            images: vec![],
            fps: 24.0,
        }
    }

    pub fn add_object(&mut self, object: SceneObject) -> ObjectId {
        self.objects.push(object);
        self.objects.len() - 1
    }

    pub fn action_by_name(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// The local-to-world matrix of an object in its static (unanimated)
    /// state.
    pub fn world_matrix(&self, id: ObjectId) -> Matrix4<f64> {
        let mut mat = Matrix4::one();
        let mut cur = Some(id);
        while let Some(i) = cur {
            mat = self.objects[i].transform.matrix() * mat;
            cur = self.objects[i].parent;
        }
        mat
    }
}

impl Default for Scene {
    fn default() -> Scene {
        Scene::new()
    }
}

impl SceneObject {
    pub fn new<S: Into<String>>(name: S, data: ObjectData) -> SceneObject {
        SceneObject {
            name: name.into(),
            parent: None,
            transform: Trs::identity(),
            selected: false,
            visible: true,
            data,
            animation: None,
        }
    }

    /// `None` for unsupported objects.
    pub fn kind(&self) -> Option<ObjectKind> {
        Some(match self.data {
            ObjectData::Empty => ObjectKind::Empty,
            ObjectData::Camera(_) => ObjectKind::Camera,
            ObjectData::Light(_) => ObjectKind::Light,
            ObjectData::Armature(_) => ObjectKind::Armature,
            ObjectData::Mesh(_) => ObjectKind::Mesh,
            ObjectData::Curve(_) => ObjectKind::Curve,
            ObjectData::Unsupported(_) => return None,
        })
    }

    pub fn active_action(&self) -> Option<&str> {
        self.animation.as_ref().and_then(|a| a.action.as_ref()).map(|s| s.as_str())
    }
}


//////////////
// Meshes
//////////////

#[derive(Clone)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub polygons: Vec<Polygon>,
    /// Per-corner texture coordinates, one layer per UV map.
    pub uv_layers: Vec<CornerLayer<[f32; 2]>>,
    /// Per-corner RGBA colors.
    pub color_layers: Vec<CornerLayer<[f32; 4]>>,
    /// Per-corner normals overriding the smooth/flat normals.
    pub custom_normals: Option<Vec<[f32; 3]>>,
    /// Names of the vertex groups `Vertex::groups` refers to. Groups named
    /// like a bone hold that bone's skin weights.
    pub vertex_groups: Vec<String>,
    /// Material slots; `Polygon::material` indexes this.
    pub materials: Vec<Option<MaterialId>>,
    /// Shape keys, not counting the basis (the vertex positions themselves).
    pub shape_keys: Vec<ShapeKey>,
    /// Drives the shape key values.
    pub shape_key_animation: Option<AnimationData>,
    pub modifiers: Vec<Modifier>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Vertex {
    pub co: [f32; 3],
    pub groups: SmallVec<[GroupWeight; 4]>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GroupWeight {
    pub group: usize,
    pub weight: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    pub vertices: Vec<usize>,
    pub material: usize,
    pub smooth: bool,
}

/// Data stored for every polygon corner, in polygon order.
#[derive(Clone, Debug, PartialEq)]
pub struct CornerLayer<T> {
    pub name: String,
    pub data: Vec<T>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShapeKey {
    pub name: String,
    /// When set, `points` are offsets from the basis positions; otherwise they
    /// are absolute positions.
    pub relative: bool,
    /// One entry per mesh vertex.
    pub points: Vec<[f32; 3]>,
    /// Current value, used as the morph weight when not animated.
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Modifier {
    /// Deforms the mesh by the current pose of an armature object.
    Armature { object: ObjectId },
    /// Mirrors the mesh across the selected local axes, duplicating it.
    Mirror { axes: [bool; 3] },
}

impl MeshData {
    pub fn new() -> MeshData {
        MeshData {
            vertices: vec![],
            polygons: vec![],
            uv_layers: vec![],
            color_layers: vec![],
            custom_normals: None,
            vertex_groups: vec![],
            materials: vec![],
            shape_keys: vec![],
            shape_key_animation: None,
            modifiers: vec![],
        }
    }

    /// Build a mesh from positions and faces, with no other attributes.
    pub fn from_faces(positions: &[[f32; 3]], faces: &[&[usize]]) -> MeshData {
        let mut mesh = MeshData::new();
        mesh.vertices = positions.iter()
            .map(|&co| Vertex { co, groups: SmallVec::new() })
            .collect();
        mesh.polygons = faces.iter()
            .map(|f| Polygon { vertices: f.to_vec(), material: 0, smooth: false })
            .collect();
        mesh
    }

    pub fn num_corners(&self) -> usize {
        self.polygons.iter().map(|p| p.vertices.len()).sum()
    }

    /// Index of the first corner of every polygon.
    pub fn corner_starts(&self) -> Vec<usize> {
        let mut starts = Vec::with_capacity(self.polygons.len());
        let mut n = 0;
        for poly in &self.polygons {
            starts.push(n);
            n += poly.vertices.len();
        }
        starts
    }

    /// The armature object deforming this mesh, if any.
    pub fn armature(&self) -> Option<ObjectId> {
        self.modifiers.iter().filter_map(|m| match *m {
            Modifier::Armature { object } => Some(object),
            _ => None,
        }).next()
    }
}

impl Default for MeshData {
    fn default() -> MeshData {
        MeshData::new()
    }
}


//////////////
// Armatures
//////////////

#[derive(Clone, Default)]
pub struct ArmatureData {
    pub bones: Vec<Bone>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    /// Rest transform relative to the parent bone (or the armature for root
    /// bones).
    pub rest: Matrix4<f64>,
    pub deform: bool,
    /// Pose applied on top of `rest` when no action animates this bone.
    pub pose: Trs,
}

impl ArmatureData {
    pub fn bone_by_name(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    /// Armature-space rest matrices for every bone.
    pub fn rest_matrices(&self) -> Vec<Matrix4<f64>> {
        self.chain_matrices(|b| b.rest)
    }

    /// Armature-space posed matrices for every bone, with `local` giving the
    /// parent-relative posed matrix of each bone.
    pub fn chain_matrices<F>(&self, local: F) -> Vec<Matrix4<f64>>
    where F: Fn(&Bone) -> Matrix4<f64> {
        let mut mats: Vec<Option<Matrix4<f64>>> = vec![None; self.bones.len()];
        for i in 0..self.bones.len() {
            self.chain_matrix(i, &local, &mut mats);
        }
        mats.into_iter().map(|m| m.unwrap_or_else(Matrix4::one)).collect()
    }

    fn chain_matrix<F>(&self, i: usize, local: &F, mats: &mut [Option<Matrix4<f64>>]) -> Matrix4<f64>
    where F: Fn(&Bone) -> Matrix4<f64> {
        if let Some(m) = mats[i] {
            return m;
        }
        let bone = &self.bones[i];
        let m = match bone.parent {
            Some(p) => self.chain_matrix(p, local, mats) * local(bone),
            None => local(bone),
        };
        mats[i] = Some(m);
        m
    }
}

impl Bone {
    pub fn new<S: Into<String>>(name: S, parent: Option<usize>, rest: Matrix4<f64>) -> Bone {
        Bone { name: name.into(), parent, rest, deform: true, pose: Trs::identity() }
    }
}


//////////////
// Cameras, lights, curves
//////////////

#[derive(Clone, Debug, PartialEq)]
pub struct CameraData {
    pub projection: Projection,
    pub aspect_ratio: f64,
    pub clip_start: f64,
    pub clip_end: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Projection {
    /// Horizontal field of view in radians.
    Perspective { fov_x: f64 },
    /// Width of the view volume.
    Orthographic { scale: f64 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct LightData {
    pub kind: LightKind,
    pub color: [f32; 3],
    pub energy: f32,
    /// Falloff distance; 0 means no falloff.
    pub distance: f32,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LightKind {
    Point,
    Sun,
    /// `angle` is the full cone angle in radians, `blend` the softness of its
    /// edge in [0, 1].
    Spot { angle: f32, blend: f32 },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CurveData {
    pub splines: Vec<Spline>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Spline {
    pub points: Vec<BezierPoint>,
    pub cyclic: bool,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BezierPoint {
    pub co: [f32; 3],
    pub handle_left: [f32; 3],
    pub handle_right: [f32; 3],
}


//////////////
// Materials and images
//////////////

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub emission: [f32; 4],
    pub shininess: f32,
    pub texture: Option<ImageId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub name: String,
    pub path: PathBuf,
}

impl Material {
    pub fn new<S: Into<String>>(name: S) -> Material {
        Material {
            name: name.into(),
            diffuse: [0.8, 0.8, 0.8, 1.0],
            specular: [0.5, 0.5, 0.5, 1.0],
            emission: [0.0, 0.0, 0.0, 1.0],
            shininess: 50.0,
            texture: None,
        }
    }
}


//////////////
// Actions
//////////////

pub struct Action {
    pub name: String,
    pub fcurves: Vec<FCurve>,
}

/// One animated scalar: a component of some property of some target.
pub struct FCurve {
    pub target: ChannelTarget,
    pub property: Property,
    /// Component of the property (eg. 1 for location Y, 0 for quaternion W).
    pub index: usize,
    /// Sorted by frame.
    pub keyframes: Vec<Keyframe>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChannelTarget {
    /// The object the action is assigned to.
    Object,
    Bone(String),
    ShapeKey(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Property {
    Location,
    RotationEuler,
    RotationQuaternion,
    Scale,
    /// A shape key's value.
    Value,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Keyframe {
    pub frame: f64,
    pub value: f64,
    pub interpolation: Interpolation,
    /// Bezier handles as (frame, value); only used with `Interpolation::Bezier`.
    pub handle_left: [f64; 2],
    pub handle_right: [f64; 2],
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Interpolation {
    Constant,
    Linear,
    Bezier,
}

impl Keyframe {
    pub fn linear(frame: f64, value: f64) -> Keyframe {
        Keyframe {
            frame,
            value,
            interpolation: Interpolation::Linear,
            handle_left: [frame, value],
            handle_right: [frame, value],
        }
    }
}

impl FCurve {
    pub fn new(target: ChannelTarget, property: Property, index: usize, keyframes: Vec<Keyframe>) -> FCurve {
        FCurve { target, property, index, keyframes }
    }
}

impl Action {
    /// The integer frame range covering every keyframe, or `None` if the
    /// action has no keyframes at all.
    pub fn frame_range(&self) -> Option<(i32, i32)> {
        let mut range: Option<(f64, f64)> = None;
        for kf in self.fcurves.iter().flat_map(|fc| fc.keyframes.iter()) {
            range = Some(match range {
                None => (kf.frame, kf.frame),
                Some((lo, hi)) => (lo.min(kf.frame), hi.max(kf.frame)),
            });
        }
        range.map(|(lo, hi)| (lo.floor() as i32, hi.ceil() as i32))
    }

    pub fn animates_bones(&self) -> bool {
        self.fcurves.iter().any(|fc| match fc.target {
            ChannelTarget::Bone(_) => true,
            _ => false,
        })
    }

    pub fn animates_object(&self) -> bool {
        self.fcurves.iter().any(|fc| fc.target == ChannelTarget::Object)
    }
}

#[test]
fn test_frame_range() {
    let action = Action {
        name: "a".to_string(),
        fcurves: vec![
            FCurve::new(ChannelTarget::Object, Property::Location, 0,
                vec![Keyframe::linear(1.0, 0.0), Keyframe::linear(9.5, 1.0)]),
            FCurve::new(ChannelTarget::Object, Property::Scale, 2,
                vec![Keyframe::linear(0.25, 1.0)]),
        ],
    };
    assert_eq!(action.frame_range(), Some((0, 10)));

    let empty = Action { name: "b".to_string(), fcurves: vec![] };
    assert_eq!(empty.frame_range(), None);
}

#[test]
fn test_bone_chain() {
    use cgmath::vec3;
    let arm = ArmatureData {
        bones: vec![
            Bone::new("child", Some(1), Matrix4::from_translation(vec3(0.0, 1.0, 0.0))),
            Bone::new("root", None, Matrix4::from_translation(vec3(0.0, 2.0, 0.0))),
        ],
    };
    let rest = arm.rest_matrices();
    assert_eq!(rest[0], Matrix4::from_translation(vec3(0.0, 3.0, 0.0)));
    assert_eq!(rest[1], Matrix4::from_translation(vec3(0.0, 2.0, 0.0)));
}
