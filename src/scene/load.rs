//! Load a scene snapshot from JSON.
//!
//! The layout mirrors what a host application would dump: objects refer to
//! their parents, actions, materials and armatures by name, and f-curves are
//! addressed with data paths like `location` or
//! `pose.bones["spine"].rotation_quaternion`.
//!
//! ```text
//! {
//!   "fps": 24,
//!   "images": [{ "name": "skin", "path": "textures/skin.png" }],
//!   "materials": [{ "name": "Body", "diffuse": [1, 0, 0, 1], "texture": "skin" }],
//!   "actions": [{ "name": "walk", "fcurves": [
//!       { "data_path": "location", "index": 0,
//!         "keyframes": [{ "frame": 1, "value": 0, "interpolation": "LINEAR" }] }
//!   ]}],
//!   "objects": [{ "name": "Cube", "type": "MESH", "parent": null,
//!                 "location": [0, 0, 0], "data": { ... } }]
//! }
//! ```

use cgmath::{Matrix4, Quaternion, vec3};
use errors::{ErrorKind, Result};
use json::{self, JsonValue};
use scene::*;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub fn load_file(path: &Path) -> Result<Scene> {
    let text = fs::read_to_string(path)?;
    load_str(&text)
}

pub fn load_str(text: &str) -> Result<Scene> {
    let root = json::parse(text)?;
    Loader::new(&root)?.load()
}

fn invalid<T>(msg: String) -> Result<T> {
    Err(ErrorKind::InvalidScene(msg).into())
}

struct Loader<'a> {
    root: &'a JsonValue,
    object_ids: HashMap<&'a str, ObjectId>,
    material_ids: HashMap<&'a str, MaterialId>,
    image_ids: HashMap<&'a str, ImageId>,
}

impl<'a> Loader<'a> {
    fn new(root: &'a JsonValue) -> Result<Loader<'a>> {
        Ok(Loader {
            root,
            object_ids: name_table(&root["objects"], "object")?,
            material_ids: name_table(&root["materials"], "material")?,
            image_ids: name_table(&root["images"], "image")?,
        })
    }

    fn load(&self) -> Result<Scene> {
        let mut scene = Scene::new();
        if !self.root["fps"].is_null() {
            scene.fps = num(&self.root["fps"], "fps")?;
            if !(scene.fps > 0.0) {
                return invalid(format!("fps must be positive, got {}", scene.fps));
            }
        }
        for j in self.root["images"].members() {
            scene.images.push(Image {
                name: string(&j["name"], "image name")?,
                path: string(&j["path"], "image path")?.into(),
            });
        }
        for j in self.root["materials"].members() {
            scene.materials.push(self.material(j)?);
        }
        for j in self.root["actions"].members() {
            scene.actions.push(action(j)?);
        }
        for j in self.root["objects"].members() {
            scene.objects.push(self.object(j)?);
        }
        check_object_cycles(&scene)?;
        Ok(scene)
    }

    fn material(&self, j: &JsonValue) -> Result<Material> {
        let mut mat = Material::new(string(&j["name"], "material name")?);
        if !j["diffuse"].is_null() { mat.diffuse = floats(&j["diffuse"], "diffuse")?; }
        if !j["specular"].is_null() { mat.specular = floats(&j["specular"], "specular")?; }
        if !j["emission"].is_null() { mat.emission = floats(&j["emission"], "emission")?; }
        if !j["shininess"].is_null() { mat.shininess = num(&j["shininess"], "shininess")? as f32; }
        if !j["texture"].is_null() {
            let name = str_(&j["texture"], "texture")?;
            mat.texture = Some(lookup(&self.image_ids, name, "image")?);
        }
        Ok(mat)
    }

    fn object(&self, j: &JsonValue) -> Result<SceneObject> {
        let name = string(&j["name"], "object name")?;
        let ty = str_(&j["type"], "object type")?;
        let d = &j["data"];
        let data = match ty {
            "EMPTY" => ObjectData::Empty,
            "MESH" => ObjectData::Mesh(self.mesh(d)?),
            "ARMATURE" => ObjectData::Armature(armature(d)?),
            "CAMERA" => ObjectData::Camera(camera(d)?),
            "LIGHT" | "LAMP" => ObjectData::Light(light(d)?),
            "CURVE" => ObjectData::Curve(curve(d)?),
            other => {
                debug!("object {}: unsupported type {}", name, other);
                ObjectData::Unsupported(other.to_string())
            }
        };

        let mut obj = SceneObject::new(name, data);
        if !j["parent"].is_null() {
            let parent = str_(&j["parent"], "parent")?;
            obj.parent = Some(lookup(&self.object_ids, parent, "object")?);
        }
        obj.transform = trs(j)?;
        obj.selected = opt_bool(&j["selected"], false)?;
        obj.visible = opt_bool(&j["visible"], true)?;
        if !j["action"].is_null() {
            obj.animation = Some(AnimationData { action: Some(string(&j["action"], "action")?) });
        }
        if let ObjectData::Mesh(ref mesh) = obj.data {
            if mesh.polygons.iter().flat_map(|p| p.vertices.iter()).any(|&v| v >= mesh.vertices.len()) {
                return invalid(format!("mesh {}: polygon vertex index out of range", obj.name));
            }
            if mesh.polygons.iter().any(|p| p.vertices.len() < 3) {
                return invalid(format!("mesh {}: polygon with fewer than 3 vertices", obj.name));
            }
            for m in &mesh.modifiers {
                if let Modifier::Armature { object } = *m {
                    if self.root["objects"][object]["type"].as_str() != Some("ARMATURE") {
                        return invalid(format!("mesh {}: armature modifier target isn't an armature", obj.name));
                    }
                }
            }
        }
        Ok(obj)
    }

    fn mesh(&self, j: &JsonValue) -> Result<MeshData> {
        let mut mesh = MeshData::new();

        for v in j["vertices"].members() {
            mesh.vertices.push(Vertex { co: floats(v, "vertex")?, groups: SmallVec::new() });
        }
        for g in j["vertex_groups"].members() {
            mesh.vertex_groups.push(string(g, "vertex group")?);
        }
        // weights[vi] = [[group, weight], ...]
        for (vi, ws) in j["weights"].members().enumerate() {
            if vi >= mesh.vertices.len() {
                return invalid("more weight lists than vertices".to_string());
            }
            for w in ws.members() {
                let group = index(&w[0], "vertex group index")?;
                if group >= mesh.vertex_groups.len() {
                    return invalid(format!("vertex group index {} out of range", group));
                }
                let weight = num(&w[1], "weight")? as f32;
                mesh.vertices[vi].groups.push(GroupWeight { group, weight });
            }
        }

        for p in j["polygons"].members() {
            let (verts, material, smooth) = if p.is_array() {
                (p, 0, false)
            } else {
                (&p["vertices"], opt_index(&p["material"], 0)?, opt_bool(&p["smooth"], false)?)
            };
            let vertices = verts.members()
                .map(|v| index(v, "polygon vertex"))
                .collect::<Result<Vec<_>>>()?;
            mesh.polygons.push(Polygon { vertices, material, smooth });
        }

        let num_corners = mesh.num_corners();
        for l in j["uv_layers"].members() {
            mesh.uv_layers.push(corner_layer(l, num_corners)?);
        }
        for l in j["color_layers"].members() {
            let layer: CornerLayer<[f32; 4]> = corner_layer(l, num_corners)?;
            mesh.color_layers.push(layer);
        }
        if !j["custom_normals"].is_null() {
            let normals = j["custom_normals"].members()
                .map(|n| floats(n, "custom normal"))
                .collect::<Result<Vec<_>>>()?;
            if normals.len() != num_corners {
                return invalid("custom normals don't match the corner count".to_string());
            }
            mesh.custom_normals = Some(normals);
        }

        for m in j["materials"].members() {
            mesh.materials.push(match m.as_str() {
                Some(name) => Some(lookup(&self.material_ids, name, "material")?),
                None => None,
            });
        }
        let num_slots = mesh.materials.len().max(1);
        if mesh.polygons.iter().any(|p| p.material >= num_slots) {
            return invalid("polygon material slot out of range".to_string());
        }

        for k in j["shape_keys"].members() {
            let points = k["points"].members()
                .map(|p| floats(p, "shape key point"))
                .collect::<Result<Vec<_>>>()?;
            if points.len() != mesh.vertices.len() {
                return invalid("shape key doesn't have a point for every vertex".to_string());
            }
            mesh.shape_keys.push(ShapeKey {
                name: string(&k["name"], "shape key name")?,
                relative: opt_bool(&k["relative"], true)?,
                points,
                value: opt_num(&k["value"], 0.0)? as f32,
            });
        }
        if !j["shape_key_action"].is_null() {
            mesh.shape_key_animation = Some(AnimationData {
                action: Some(string(&j["shape_key_action"], "shape key action")?),
            });
        }

        for m in j["modifiers"].members() {
            mesh.modifiers.push(match str_(&m["type"], "modifier type")? {
                "ARMATURE" => {
                    let target = str_(&m["object"], "armature modifier object")?;
                    Modifier::Armature { object: lookup(&self.object_ids, target, "object")? }
                }
                "MIRROR" => {
                    let mut axes = [false; 3];
                    for (i, a) in m["axes"].members().take(3).enumerate() {
                        axes[i] = opt_bool(a, false)?;
                    }
                    Modifier::Mirror { axes }
                }
                other => return invalid(format!("unknown modifier type {}", other)),
            });
        }

        Ok(mesh)
    }
}

fn armature(j: &JsonValue) -> Result<ArmatureData> {
    let names: HashMap<&str, usize> = name_table(&j["bones"], "bone")?;
    let mut arm = ArmatureData::default();
    for b in j["bones"].members() {
        let parent = match b["parent"].as_str() {
            Some(p) => Some(lookup(&names, p, "bone")?),
            None => None,
        };
        let rest = if b["matrix"].is_null() {
            Matrix4::from_translation(vec3_of(opt_floats(&b["head"], [0.0; 3])?))
        } else {
            matrix(&b["matrix"])?
        };
        let mut bone = Bone::new(string(&b["name"], "bone name")?, parent, rest);
        bone.deform = opt_bool(&b["deform"], true)?;
        if !b["pose"].is_null() {
            bone.pose = trs(&b["pose"])?;
        }
        arm.bones.push(bone);
    }

    // Every chain of parents has to end at a root.
    for start in 0..arm.bones.len() {
        let mut cur = arm.bones[start].parent;
        let mut steps = 0;
        while let Some(p) = cur {
            steps += 1;
            if steps > arm.bones.len() {
                return invalid(format!("bone {} is part of a parent cycle", arm.bones[start].name));
            }
            cur = arm.bones[p].parent;
        }
    }
    Ok(arm)
}

fn camera(j: &JsonValue) -> Result<CameraData> {
    let projection = match j["type"].as_str().unwrap_or("PERSP") {
        "ORTHO" => Projection::Orthographic { scale: opt_num(&j["ortho_scale"], 6.0)? },
        "PERSP" => Projection::Perspective { fov_x: opt_num(&j["angle"], 0.8575560)? },
        other => return invalid(format!("unknown camera type {}", other)),
    };
    Ok(CameraData {
        projection,
        aspect_ratio: opt_num(&j["aspect_ratio"], 16.0 / 9.0)?,
        clip_start: opt_num(&j["clip_start"], 0.1)?,
        clip_end: opt_num(&j["clip_end"], 100.0)?,
    })
}

fn light(j: &JsonValue) -> Result<LightData> {
    let kind = match j["type"].as_str().unwrap_or("POINT") {
        "POINT" => LightKind::Point,
        "SUN" => LightKind::Sun,
        "SPOT" => LightKind::Spot {
            angle: opt_num(&j["spot_size"], ::std::f64::consts::FRAC_PI_4)? as f32,
            blend: opt_num(&j["spot_blend"], 0.15)? as f32,
        },
        other => return invalid(format!("unknown light type {}", other)),
    };
    Ok(LightData {
        kind,
        color: opt_floats(&j["color"], [1.0, 1.0, 1.0])?,
        energy: opt_num(&j["energy"], 1.0)? as f32,
        distance: opt_num(&j["distance"], 0.0)? as f32,
    })
}

fn curve(j: &JsonValue) -> Result<CurveData> {
    let mut data = CurveData::default();
    for s in j["splines"].members() {
        let mut points = vec![];
        for p in s["points"].members() {
            let co = floats(&p["co"], "curve point")?;
            points.push(BezierPoint {
                co,
                handle_left: opt_floats(&p["handle_left"], co)?,
                handle_right: opt_floats(&p["handle_right"], co)?,
            });
        }
        data.splines.push(Spline { points, cyclic: opt_bool(&s["cyclic"], false)? });
    }
    Ok(data)
}

fn action(j: &JsonValue) -> Result<Action> {
    let name = string(&j["name"], "action name")?;
    let mut fcurves = vec![];
    for fc in j["fcurves"].members() {
        let (target, property) = parse_data_path(str_(&fc["data_path"], "data path")?)?;
        let index = opt_index(&fc["index"], 0)?;
        let mut keyframes = vec![];
        for k in fc["keyframes"].members() {
            keyframes.push(keyframe(k)?);
        }
        keyframes.sort_by(|a, b| a.frame.partial_cmp(&b.frame).unwrap_or(::std::cmp::Ordering::Equal));
        fcurves.push(FCurve { target, property, index, keyframes });
    }
    Ok(Action { name, fcurves })
}

fn keyframe(j: &JsonValue) -> Result<Keyframe> {
    let frame = num(&j["frame"], "keyframe frame")?;
    let value = num(&j["value"], "keyframe value")?;
    let interpolation = match j["interpolation"].as_str().unwrap_or("BEZIER") {
        "CONSTANT" => Interpolation::Constant,
        "LINEAR" => Interpolation::Linear,
        "BEZIER" => Interpolation::Bezier,
        other => return invalid(format!("unknown interpolation {}", other)),
    };
    Ok(Keyframe {
        frame,
        value,
        interpolation,
        handle_left: opt_floats(&j["handle_left"], [frame, value])?,
        handle_right: opt_floats(&j["handle_right"], [frame, value])?,
    })
}

/// Splits a data path like `pose.bones["x"].location` into its target and
/// property.
pub fn parse_data_path(path: &str) -> Result<(ChannelTarget, Property)> {
    let (target, prop) = match path.rfind('.') {
        Some(i) if path[..i].ends_with(']') => (&path[..i], &path[i + 1..]),
        _ => ("", path),
    };

    let target = if target.is_empty() {
        ChannelTarget::Object
    } else if let Some(name) = quoted_key(target, "pose.bones[") {
        ChannelTarget::Bone(name)
    } else if let Some(name) = quoted_key(target, "key_blocks[") {
        ChannelTarget::ShapeKey(name)
    } else {
        return invalid(format!("unsupported data path {}", path));
    };

    let property = match prop {
        "location" => Property::Location,
        "rotation_euler" => Property::RotationEuler,
        "rotation_quaternion" => Property::RotationQuaternion,
        "scale" => Property::Scale,
        "value" => Property::Value,
        _ => return invalid(format!("unsupported data path {}", path)),
    };

    match (&target, property) {
        (&ChannelTarget::ShapeKey(_), Property::Value) => (),
        (&ChannelTarget::ShapeKey(_), _) | (_, Property::Value) =>
            return invalid(format!("unsupported data path {}", path)),
        _ => (),
    }

    Ok((target, property))
}

/// `prefix"name"]` -> `name`
fn quoted_key(s: &str, prefix: &str) -> Option<String> {
    if !s.starts_with(prefix) || !s.ends_with("\"]") {
        return None;
    }
    let inner = &s[prefix.len()..s.len() - 2];
    if !inner.starts_with('"') {
        return None;
    }
    Some(inner[1..].replace("\\\"", "\""))
}

fn check_object_cycles(scene: &Scene) -> Result<()> {
    for (id, obj) in scene.objects.iter().enumerate() {
        let mut cur = obj.parent;
        let mut steps = 0;
        while let Some(p) = cur {
            steps += 1;
            if steps > scene.objects.len() {
                return invalid(format!("object {} is part of a parent cycle", scene.objects[id].name));
            }
            cur = scene.objects[p].parent;
        }
    }
    Ok(())
}


//////////////
// Field helpers
//////////////

fn name_table<'a>(list: &'a JsonValue, what: &str) -> Result<HashMap<&'a str, usize>> {
    let mut table = HashMap::new();
    for (i, j) in list.members().enumerate() {
        let name = str_(&j["name"], what)?;
        if table.insert(name, i).is_some() {
            return invalid(format!("duplicate {} name {}", what, name));
        }
    }
    Ok(table)
}

fn lookup(table: &HashMap<&str, usize>, name: &str, what: &str) -> Result<usize> {
    match table.get(name) {
        Some(&i) => Ok(i),
        None => invalid(format!("no {} named {}", what, name)),
    }
}

fn str_<'a>(j: &'a JsonValue, what: &str) -> Result<&'a str> {
    match j.as_str() {
        Some(s) => Ok(s),
        None => invalid(format!("expected a string for {}", what)),
    }
}

fn string(j: &JsonValue, what: &str) -> Result<String> {
    str_(j, what).map(|s| s.to_string())
}

fn num(j: &JsonValue, what: &str) -> Result<f64> {
    match j.as_f64() {
        Some(x) if x.is_finite() => Ok(x),
        _ => invalid(format!("expected a number for {}", what)),
    }
}

fn opt_num(j: &JsonValue, default: f64) -> Result<f64> {
    if j.is_null() { Ok(default) } else { num(j, "number") }
}

fn index(j: &JsonValue, what: &str) -> Result<usize> {
    match j.as_usize() {
        Some(i) => Ok(i),
        None => invalid(format!("expected an index for {}", what)),
    }
}

fn opt_index(j: &JsonValue, default: usize) -> Result<usize> {
    if j.is_null() { Ok(default) } else { index(j, "index") }
}

fn opt_bool(j: &JsonValue, default: bool) -> Result<bool> {
    if j.is_null() {
        return Ok(default);
    }
    match j.as_bool() {
        Some(b) => Ok(b),
        None => invalid("expected a boolean".to_string()),
    }
}

/// Fixed-size float arrays (`[f32; 3]`, `[f64; 2]`, ...).
trait FloatArray: Sized {
    fn from_json(j: &JsonValue) -> Option<Self>;
}

macro_rules! impl_float_array {
    ($t:ty, $n:expr) => {
        impl FloatArray for [$t; $n] {
            fn from_json(j: &JsonValue) -> Option<[$t; $n]> {
                if !j.is_array() || j.len() != $n {
                    return None;
                }
                let mut a = [0 as $t; $n];
                for i in 0..$n {
                    let x = j[i].as_f64()?;
                    if !x.is_finite() { return None; }
                    a[i] = x as $t;
                }
                Some(a)
            }
        }
    };
}
impl_float_array!(f32, 2);
impl_float_array!(f32, 3);
impl_float_array!(f32, 4);
impl_float_array!(f64, 2);
impl_float_array!(f64, 3);
impl_float_array!(f64, 4);

fn floats<A: FloatArray>(j: &JsonValue, what: &str) -> Result<A> {
    match A::from_json(j) {
        Some(a) => Ok(a),
        None => invalid(format!("bad array for {}", what)),
    }
}

fn opt_floats<A: FloatArray>(j: &JsonValue, default: A) -> Result<A> {
    if j.is_null() { Ok(default) } else { floats(j, "array") }
}

fn corner_layer<A: FloatArray>(j: &JsonValue, num_corners: usize) -> Result<CornerLayer<A>> {
    let name = string(&j["name"], "layer name")?;
    let data = j["data"].members()
        .map(|x| floats(x, "layer value"))
        .collect::<Result<Vec<A>>>()?;
    if data.len() != num_corners {
        return invalid(format!("layer {} doesn't have a value for every corner", name));
    }
    Ok(CornerLayer { name, data })
}

fn vec3_of(a: [f64; 3]) -> ::cgmath::Vector3<f64> {
    vec3(a[0], a[1], a[2])
}

/// A 4x4 matrix given as four rows.
fn matrix(j: &JsonValue) -> Result<Matrix4<f64>> {
    let r: [[f64; 4]; 4] = [
        floats(&j[0], "matrix row")?,
        floats(&j[1], "matrix row")?,
        floats(&j[2], "matrix row")?,
        floats(&j[3], "matrix row")?,
    ];
    // cgmath is column-major
    Ok(Matrix4::new(
        r[0][0], r[1][0], r[2][0], r[3][0],
        r[0][1], r[1][1], r[2][1], r[3][1],
        r[0][2], r[1][2], r[2][2], r[3][2],
        r[0][3], r[1][3], r[2][3], r[3][3],
    ))
}

fn trs(j: &JsonValue) -> Result<Trs> {
    let mut t = Trs::identity();
    t.location = vec3_of(opt_floats(&j["location"], [0.0; 3])?);
    t.scale = vec3_of(opt_floats(&j["scale"], [1.0; 3])?);
    if !j["rotation_quaternion"].is_null() {
        let q: [f64; 4] = floats(&j["rotation_quaternion"], "rotation_quaternion")?;
        t.rotation = Rotation::Quaternion(Quaternion::new(q[0], q[1], q[2], q[3]));
    } else if !j["rotation_euler"].is_null() {
        t.rotation = Rotation::Euler(floats(&j["rotation_euler"], "rotation_euler")?);
    }
    Ok(t)
}


#[test]
fn test_data_paths() {
    assert_eq!(parse_data_path("location").unwrap(), (ChannelTarget::Object, Property::Location));
    assert_eq!(
        parse_data_path("pose.bones[\"spine.001\"].rotation_quaternion").unwrap(),
        (ChannelTarget::Bone("spine.001".to_string()), Property::RotationQuaternion),
    );
    assert_eq!(
        parse_data_path("key_blocks[\"smile\"].value").unwrap(),
        (ChannelTarget::ShapeKey("smile".to_string()), Property::Value),
    );
    assert!(parse_data_path("data.lens").is_err());
    assert!(parse_data_path("value").is_err());
}

#[test]
fn test_load_scene() {
    let scene = load_str(r#"{
        "fps": 30,
        "materials": [{ "name": "Red", "diffuse": [1, 0, 0, 1] }],
        "actions": [{ "name": "walk", "fcurves": [
            { "data_path": "pose.bones[\"root\"].location", "index": 2,
              "keyframes": [{ "frame": 10, "value": 1 }, { "frame": 1, "value": 0 }] }
        ]}],
        "objects": [
            { "name": "Tri", "type": "MESH", "parent": "Rig",
              "data": { "vertices": [[0,0,0],[1,0,0],[0,1,0]], "polygons": [[0,1,2]],
                        "materials": ["Red"],
                        "vertex_groups": ["root"], "weights": [[[0, 1]], [], []],
                        "modifiers": [{ "type": "ARMATURE", "object": "Rig" }] } },
            { "name": "Rig", "type": "ARMATURE", "action": "walk",
              "data": { "bones": [{ "name": "root", "head": [0, 0, 1] }] } },
            { "name": "Speaker", "type": "SPEAKER" }
        ]
    }"#).unwrap();

    assert_eq!(scene.fps, 30.0);
    assert_eq!(scene.objects[0].parent, Some(1));
    assert_eq!(scene.objects[1].active_action(), Some("walk"));
    assert_eq!(scene.objects[2].kind(), None);
    match scene.objects[0].data {
        ObjectData::Mesh(ref mesh) => {
            assert_eq!(mesh.armature(), Some(1));
            assert_eq!(mesh.vertices[0].groups[0], GroupWeight { group: 0, weight: 1.0 });
            assert_eq!(mesh.materials, vec![Some(0)]);
        }
        _ => panic!("expected a mesh"),
    }
    // keyframes come out sorted
    assert_eq!(scene.actions[0].fcurves[0].keyframes[0].frame, 1.0);
    assert_eq!(scene.actions[0].frame_range(), Some((1, 10)));
}

#[test]
fn test_reject_cycles() {
    let bones = load_str(r#"{ "objects": [{ "name": "Rig", "type": "ARMATURE", "data": { "bones": [
        { "name": "a", "parent": "b" }, { "name": "b", "parent": "a" }
    ]}}]}"#);
    assert!(bones.is_err());

    let objects = load_str(r#"{ "objects": [
        { "name": "a", "type": "EMPTY", "parent": "b" },
        { "name": "b", "type": "EMPTY", "parent": "a" }
    ]}"#);
    assert!(objects.is_err());

    let bad_index = load_str(r#"{ "objects": [{ "name": "m", "type": "MESH",
        "data": { "vertices": [[0,0,0]], "polygons": [[0, 1, 2]] } }]}"#);
    match bad_index {
        Err(e) => match *e.kind() {
            ErrorKind::InvalidScene(_) => (),
            _ => panic!("wrong error kind"),
        },
        Ok(_) => panic!("out of range vertex accepted"),
    }
}
