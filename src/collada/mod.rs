//! COLLADA output.
//!
//! `assemble` gathers the extracted fragments into a `Document`, giving every
//! element its ID through one `IdRegistry`; `write` turns the document into
//! text. IDs are handed out in export order (visual scene first, then the
//! nodes and joints, then everything they instance) so the same scene always
//! gets the same IDs.

#[macro_use]
mod format;
pub mod document;
mod write;

use animation::{ActionSamples, AnimTarget, Values};
use config::ExportConfig;
use errors::Result;
use geometry::Geometry;
use ids::{Entity, IdRegistry, Role};
use petgraph::graph::NodeIndex;
use scene::{self, Image, ImageId, MaterialId, ObjectData, ObjectId, Projection, Scene};
use self::document as doc;
use skeleton::{Skeleton, Skin};
use std::collections::{BTreeMap, HashMap};
use time;
use util::name::{FileNameFmt, IdFmt};
use util::{InsOrderSet, UniqueNamer};
use version;
use walker::Walk;

/// The `<created>`/`<modified>` stamp used when metadata is off.
pub const EPOCH: &str = "1970-01-01T00:00:00Z";

/// Per-object results of extraction, made once and shared by every document
/// of an export.
#[derive(Default)]
pub struct Fragments {
    pub geometries: BTreeMap<ObjectId, Geometry>,
    pub skeletons: BTreeMap<ObjectId, Skeleton>,
    /// Mesh object -> (armature object, skin)
    pub skins: BTreeMap<ObjectId, (ObjectId, Skin)>,
}

/// Everything that goes into one document.
pub struct Content<'a> {
    pub scene: &'a Scene,
    pub config: &'a ExportConfig,
    pub walk: &'a Walk,
    pub fragments: &'a Fragments,
    pub animations: &'a [ActionSamples],
    pub timestamp: &'a str,
}

/// The timestamp for the `<asset>` block.
pub fn timestamp(config: &ExportConfig) -> Result<String> {
    if !config.use_metadata {
        return Ok(EPOCH.to_string());
    }
    let now = time::now_utc();
    Ok(time::strftime("%FT%TZ", &now)?)
}

/// File names the scene's images get when they're copied next to the
/// document, indexed by `ImageId`. Clashing names get a number before the
/// extension (`tex.png`, `tex1.png`).
pub fn copied_image_names(scene: &Scene) -> Vec<String> {
    let mut namer = UniqueNamer::new();
    scene.images.iter()
        .map(|image| {
            let file_name = match image.path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => FileNameFmt(&image.name).to_string(),
            };
            let (stem, ext) = match file_name.rfind('.') {
                Some(dot) if dot > 0 => file_name.split_at(dot),
                _ => (&file_name[..], ""),
            };
            format!("{}{}", namer.get_fresh_name(stem), ext)
        })
        .collect()
}

fn image_reference(image: &Image, copied_name: &str, copy: bool) -> String {
    if copy {
        format!("images/{}", copied_name)
    } else {
        image.path.to_string_lossy().into_owned()
    }
}

/// Build and serialize one document.
pub fn render(content: &Content) -> Result<String> {
    let document = assemble(content)?;
    let mut s = String::new();
    write::write(&mut s, &document)?;
    Ok(s)
}

pub fn assemble(content: &Content) -> Result<doc::Document> {
    let mut a = Assembler {
        c: content,
        ids: IdRegistry::new(content.scene),
        instances: HashMap::new(),
        morph_weights: HashMap::new(),
        image_files: copied_image_names(content.scene),
        doc: doc::Document {
            asset: doc::Asset {
                authoring_tool: version::authoring_tool(),
                timestamp: content.timestamp.to_string(),
            },
            cameras: vec![],
            lights: vec![],
            images: vec![],
            effects: vec![],
            materials: vec![],
            geometries: vec![],
            controllers: vec![],
            animations: vec![],
            clips: vec![],
            visual_scene: doc::VisualScene { id: String::new(), name: String::new(), nodes: vec![] },
        },
    };

    let scene_id = a.ids.assign(Entity::VisualScene, Role::VisualScene);
    for node in &content.walk.nodes {
        a.ids.assign(Entity::Object(node.object), Role::Node);
        if let Some(skel) = content.fragments.skeletons.get(&node.object) {
            for n in skel.tree.node_indices() {
                a.ids.assign(Entity::Bone(node.object, skel.tree[n].bone), Role::Node);
            }
        }
    }
    for node in &content.walk.nodes {
        a.add_object_data(node.object)?;
    }
    for samples in content.animations {
        a.add_action(samples);
    }
    let nodes = a.build_nodes(None);
    a.doc.visual_scene = doc::VisualScene {
        name: a.ids.entity_name(Entity::VisualScene),
        id: scene_id,
        nodes,
    };
    Ok(a.doc)
}

struct Assembler<'a> {
    c: &'a Content<'a>,
    ids: IdRegistry<'a>,
    doc: doc::Document,
    /// What each object's node instances.
    instances: HashMap<ObjectId, Vec<doc::Instance>>,
    /// Mesh object -> ID of its morph controller's weights source.
    morph_weights: HashMap<ObjectId, String>,
    /// `copied_image_names` of the scene.
    image_files: Vec<String>,
}

fn flatten<T: Copy>(items: &[[T; 3]]) -> Vec<T> {
    items.iter().flat_map(|a| a.iter().cloned()).collect()
}

type Params = &'static [(&'static str, &'static str)];

impl<'a> Assembler<'a> {
    /// A `<source>`; its array gets an ID of its own.
    fn source(&mut self, id: String, array: doc::Array, params: Params) -> doc::Source {
        let array_id = self.ids.sub(&id, "array");
        let stride = match array {
            doc::Array::Matrices(_) => 16,
            _ => params.len(),
        };
        doc::Source { id, array_id, array, stride, params }
    }

    fn float_source(&mut self, id: String, values: Vec<f32>, params: Params) -> doc::Source {
        self.source(id, doc::Array::F32(values), params)
    }

    fn add_object_data(&mut self, id: ObjectId) -> Result<()> {
        let c = self.c;
        let obj = &c.scene.objects[id];
        let instances = match obj.data {
            ObjectData::Mesh(_) => match c.fragments.geometries.get(&id) {
                Some(geom) => vec![self.add_mesh(id, geom)?],
                None => vec![],
            },
            ObjectData::Camera(ref cam) => vec![self.add_camera(id, cam)],
            ObjectData::Light(ref light) => vec![self.add_light(id, light)],
            ObjectData::Curve(ref curve) => self.add_curve(id, curve),
            ObjectData::Armature(_) | ObjectData::Empty | ObjectData::Unsupported(_) => vec![],
        };
        self.instances.insert(id, instances);
        Ok(())
    }

    fn add_mesh(&mut self, id: ObjectId, geom: &'a Geometry) -> Result<doc::Instance> {
        let c = self.c;
        let name = c.scene.objects[id].name.clone();

        let geom_id = self.ids.assign(Entity::Object(id), Role::Geometry);
        let mesh = self.mesh_element(&geom_id, geom, None);
        self.doc.geometries.push(doc::Geometry {
            id: geom_id.clone(),
            name: name.clone(),
            kind: doc::GeometryKind::Mesh(mesh),
        });
        let materials = self.material_bindings(geom);

        let mut controller = None;
        if c.config.use_shape_key_export && !geom.morph_targets.is_empty() {
            controller = Some(self.add_morph(id, &name, geom, &geom_id));
        }
        let mut skeletons = vec![];
        if let Some(&(arm, ref skin)) = c.fragments.skins.get(&id) {
            if let Some(skel) = c.fragments.skeletons.get(&arm) {
                check!(skin.inv_binds.len() == skel.num_joints())?;
                check!(skin.vertices.len() == geom.vertices.len())?;
                let source = controller.clone().unwrap_or_else(|| geom_id.clone());
                controller = Some(self.add_skin(id, &name, arm, skel, skin, &source));
                skeletons = skel.roots.iter()
                    .map(|&r| self.ids.assign(Entity::Bone(arm, skel.tree[r].bone), Role::Node))
                    .collect();
            }
        }

        Ok(match controller {
            Some(url) => doc::Instance::Controller { url, skeletons, materials },
            None => doc::Instance::Geometry { url: geom_id, materials },
        })
    }

    /// The `<mesh>` for a geometry. `positions` replaces the vertex
    /// positions, for morph targets.
    fn mesh_element(&mut self, owner: &str, geom: &Geometry, positions: Option<&[[f32; 3]]>) -> doc::Mesh {
        let mut sources = vec![];
        let mut inputs = vec![];

        let positions_id = self.ids.sub(owner, "positions");
        let pos: Vec<f32> = match positions {
            Some(p) => flatten(p),
            None => geom.vertices.iter().flat_map(|v| v.position.iter().cloned()).collect(),
        };
        sources.push(self.float_source(positions_id.clone(), pos, doc::XYZ));

        let vertices_id = self.ids.sub(owner, "vertices");
        inputs.push(doc::Input { semantic: "VERTEX", source: vertices_id.clone(), set: None });

        let normals_id = self.ids.sub(owner, "normals");
        let normals = geom.vertices.iter().flat_map(|v| v.normal.iter().cloned()).collect();
        sources.push(self.float_source(normals_id.clone(), normals, doc::XYZ));
        inputs.push(doc::Input { semantic: "NORMAL", source: normals_id, set: None });

        for set in 0..geom.uv_layer_names.len() {
            let uv_id = self.ids.sub(owner, "texcoords");
            let uvs = geom.vertices.iter().flat_map(|v| v.uvs[set].iter().cloned()).collect();
            sources.push(self.float_source(uv_id.clone(), uvs, doc::ST));
            inputs.push(doc::Input { semantic: "TEXCOORD", source: uv_id, set: Some(set) });
        }

        for set in 0..geom.color_layer_names.len() {
            let color_id = self.ids.sub(owner, "colors");
            let colors = geom.vertices.iter().flat_map(|v| v.colors[set].iter().cloned()).collect();
            sources.push(self.float_source(color_id.clone(), colors, doc::RGBA));
            inputs.push(doc::Input { semantic: "COLOR", source: color_id, set: Some(set) });
        }

        if let Some(ref tangents) = geom.tangents {
            let tangent_id = self.ids.sub(owner, "tangents");
            let binormal_id = self.ids.sub(owner, "binormals");
            let ts: Vec<[f32; 3]> = tangents.iter().map(|&(t, _)| t).collect();
            let bs: Vec<[f32; 3]> = tangents.iter().map(|&(_, b)| b).collect();
            sources.push(self.float_source(tangent_id.clone(), flatten(&ts), doc::XYZ));
            sources.push(self.float_source(binormal_id.clone(), flatten(&bs), doc::XYZ));
            inputs.push(doc::Input { semantic: "TEXTANGENT", source: tangent_id, set: Some(0) });
            inputs.push(doc::Input { semantic: "TEXBINORMAL", source: binormal_id, set: Some(0) });
        }

        let mut primitives = vec![];
        for prim in &geom.primitives {
            let material = prim.material.map(|m| self.add_material(m));
            let prim_inputs = inputs.iter()
                .map(|i| doc::Input { semantic: i.semantic, source: i.source.clone(), set: i.set })
                .collect();
            primitives.push(doc::Primitive {
                kind: if prim.triangulated { doc::PrimitiveKind::Triangles } else { doc::PrimitiveKind::Polylist },
                material,
                count: prim.vcounts.len(),
                inputs: prim_inputs,
                vcounts: if prim.triangulated { vec![] } else { prim.vcounts.clone() },
                indices: prim.indices.clone(),
            });
        }

        doc::Mesh { sources, vertices_id, positions: positions_id, primitives }
    }

    fn material_bindings(&mut self, geom: &Geometry) -> Vec<doc::MaterialBinding> {
        let mut bindings: Vec<doc::MaterialBinding> = vec![];
        for prim in &geom.primitives {
            let m = match prim.material {
                Some(m) => m,
                None => continue,
            };
            let id = self.add_material(m);
            if bindings.iter().any(|b| b.symbol == id) {
                continue;
            }
            let textured = self.c.scene.materials[m].texture.is_some();
            bindings.push(doc::MaterialBinding {
                symbol: id.clone(),
                target: id,
                texcoord_set: if textured && !geom.uv_layer_names.is_empty() { Some(0) } else { None },
            });
        }
        bindings
    }

    fn add_material(&mut self, m: MaterialId) -> String {
        if let Some(id) = self.ids.get(Entity::Material(m), Role::Material) {
            return id.to_string();
        }
        let c = self.c;
        let mat = &c.scene.materials[m];
        let id = self.ids.assign(Entity::Material(m), Role::Material);
        let effect = self.ids.assign(Entity::Material(m), Role::Effect);
        let texture = mat.texture.map(|image| self.add_image(image));
        self.doc.effects.push(doc::Effect {
            id: effect.clone(),
            name: mat.name.clone(),
            emission: mat.emission,
            diffuse: mat.diffuse,
            specular: mat.specular,
            shininess: mat.shininess,
            texture,
        });
        self.doc.materials.push(doc::Material { id: id.clone(), name: mat.name.clone(), effect });
        id
    }

    fn add_image(&mut self, i: ImageId) -> String {
        if let Some(id) = self.ids.get(Entity::Image(i), Role::Image) {
            return id.to_string();
        }
        let c = self.c;
        let image = &c.scene.images[i];
        let id = self.ids.assign(Entity::Image(i), Role::Image);
        self.doc.images.push(doc::Image {
            id: id.clone(),
            name: image.name.clone(),
            init_from: image_reference(image, &self.image_files[i], c.config.use_copy_images),
        });
        id
    }

    fn add_morph(&mut self, id: ObjectId, name: &str, geom: &Geometry, geom_id: &str) -> String {
        let morph_id = self.ids.assign(Entity::Object(id), Role::Morph);

        let mut targets = vec![];
        for target in &geom.morph_targets {
            let target_id = self.ids.assign(Entity::ShapeKey(id, target.key), Role::Geometry);
            let mesh = self.mesh_element(&target_id, geom, Some(&target.positions));
            self.doc.geometries.push(doc::Geometry {
                id: target_id.clone(),
                name: target.name.clone(),
                kind: doc::GeometryKind::Mesh(mesh),
            });
            targets.push(target_id);
        }

        let targets_id = self.ids.sub(&morph_id, "targets");
        let targets = self.source(targets_id, doc::Array::IdRef(targets), doc::MORPH_TARGET);
        let weights_id = self.ids.sub(&morph_id, "weights");
        let weights = self.float_source(
            weights_id.clone(),
            geom.morph_targets.iter().map(|t| t.weight).collect(),
            doc::WEIGHT,
        );
        self.morph_weights.insert(id, weights_id);

        self.doc.controllers.push(doc::Controller {
            id: morph_id.clone(),
            name: name.to_string(),
            kind: doc::ControllerKind::Morph(doc::Morph { source: geom_id.to_string(), targets, weights }),
        });
        morph_id
    }

    fn add_skin(
        &mut self,
        id: ObjectId,
        name: &str,
        arm: ObjectId,
        skel: &Skeleton,
        skin: &Skin,
        source: &str,
    ) -> String {
        let skin_id = self.ids.assign(Entity::Object(id), Role::Skin);

        let joint_names = skel.tree.node_indices()
            .map(|n| self.ids.assign(Entity::Bone(arm, skel.tree[n].bone), Role::Node))
            .collect();
        let joints_id = self.ids.sub(&skin_id, "joints");
        let joints = self.source(joints_id, doc::Array::Name(joint_names), doc::JOINT);
        let inv_binds_id = self.ids.sub(&skin_id, "bind_poses");
        let inv_binds = self.source(inv_binds_id, doc::Array::Matrices(skin.inv_binds.clone()), doc::TRANSFORM);

        // Weights go in a table of distinct values which the influences
        // index into. Floats can't be hashed, so the table is keyed on their
        // bits.
        let mut table = InsOrderSet::new();
        let mut vcounts = Vec::with_capacity(skin.vertices.len());
        let mut v = vec![];
        for sv in &skin.vertices {
            vcounts.push(sv.influences.len() as u32);
            for inf in &sv.influences {
                let w = table.insert(inf.weight.to_bits());
                v.push((inf.joint.index() as u32, w as u32));
            }
        }
        let weights_id = self.ids.sub(&skin_id, "weights");
        let weights = self.float_source(
            weights_id,
            table.iter().map(|&bits| f32::from_bits(bits)).collect(),
            doc::WEIGHT,
        );

        self.doc.controllers.push(doc::Controller {
            id: skin_id.clone(),
            name: name.to_string(),
            kind: doc::ControllerKind::Skin(doc::Skin {
                source: source.to_string(),
                bind_shape: skin.bind_shape,
                joints,
                inv_binds,
                weights,
                vcounts,
                v,
            }),
        });
        skin_id
    }

    fn add_camera(&mut self, id: ObjectId, cam: &scene::CameraData) -> doc::Instance {
        let cam_id = self.ids.assign(Entity::Object(id), Role::Camera);
        let optics = match cam.projection {
            Projection::Perspective { fov_x } => doc::Optics::Perspective { xfov: fov_x.to_degrees() },
            Projection::Orthographic { scale } => doc::Optics::Orthographic { xmag: scale * 0.5 },
        };
        self.doc.cameras.push(doc::Camera {
            id: cam_id.clone(),
            name: self.c.scene.objects[id].name.clone(),
            optics,
            aspect_ratio: cam.aspect_ratio,
            znear: cam.clip_start,
            zfar: cam.clip_end,
        });
        doc::Instance::Camera { url: cam_id }
    }

    fn add_light(&mut self, id: ObjectId, light: &scene::LightData) -> doc::Instance {
        let light_id = self.ids.assign(Entity::Object(id), Role::Light);
        let attenuation = || doc::Attenuation {
            constant: 1.0,
            linear: 0.0,
            quadratic: if light.distance > 0.0 { 1.0 / (light.distance * light.distance) } else { 0.0 },
        };
        let kind = match light.kind {
            scene::LightKind::Sun => doc::LightKind::Directional,
            scene::LightKind::Point => doc::LightKind::Point { attenuation: attenuation() },
            scene::LightKind::Spot { angle, blend } => doc::LightKind::Spot {
                attenuation: attenuation(),
                falloff_angle: angle.to_degrees(),
                falloff_exponent: blend,
            },
        };
        let e = light.energy;
        self.doc.lights.push(doc::Light {
            id: light_id.clone(),
            name: self.c.scene.objects[id].name.clone(),
            kind,
            color: [light.color[0] * e, light.color[1] * e, light.color[2] * e],
        });
        doc::Instance::Light { url: light_id }
    }

    /// One `<spline>` geometry per spline of the curve.
    fn add_curve(&mut self, id: ObjectId, curve: &scene::CurveData) -> Vec<doc::Instance> {
        let mut instances = vec![];
        for (i, spline) in curve.splines.iter().enumerate() {
            let geom_id = self.ids.assign(Entity::Spline(id, i), Role::Geometry);
            let pick = |f: fn(&scene::BezierPoint) -> [f32; 3]| -> Vec<f32> {
                spline.points.iter().flat_map(|p| f(p).to_vec()).collect()
            };

            let positions = self.ids.sub(&geom_id, "positions");
            let in_tangents = self.ids.sub(&geom_id, "in_tangents");
            let out_tangents = self.ids.sub(&geom_id, "out_tangents");
            let interpolations = self.ids.sub(&geom_id, "interpolations");
            let sources = vec![
                self.float_source(positions.clone(), pick(|p| p.co), doc::XYZ),
                self.float_source(in_tangents.clone(), pick(|p| p.handle_left), doc::XYZ),
                self.float_source(out_tangents.clone(), pick(|p| p.handle_right), doc::XYZ),
                self.source(
                    interpolations.clone(),
                    doc::Array::Name(vec!["BEZIER".to_string(); spline.points.len()]),
                    doc::INTERPOLATION,
                ),
            ];
            let control_vertices = vec![
                doc::Input { semantic: "POSITION", source: positions, set: None },
                doc::Input { semantic: "IN_TANGENT", source: in_tangents, set: None },
                doc::Input { semantic: "OUT_TANGENT", source: out_tangents, set: None },
                doc::Input { semantic: "INTERPOLATION", source: interpolations, set: None },
            ];

            self.doc.geometries.push(doc::Geometry {
                id: geom_id.clone(),
                name: self.ids.entity_name(Entity::Spline(id, i)),
                kind: doc::GeometryKind::Spline(doc::Spline { closed: spline.cyclic, sources, control_vertices }),
            });
            instances.push(doc::Instance::Geometry { url: geom_id, materials: vec![] });
        }
        instances
    }

    fn add_action(&mut self, samples: &ActionSamples) {
        let base = self.ids.assign(Entity::Action(samples.action), Role::Animation);
        let mut anim_ids = vec![];

        for ch in &samples.channels {
            let (target_name, target) = match ch.target {
                AnimTarget::Node(o) => {
                    let id = self.ids.assign(Entity::Object(o), Role::Node);
                    (id.clone(), format!("{}/transform", id))
                }
                AnimTarget::Joint(o, b) => {
                    let id = self.ids.assign(Entity::Bone(o, b), Role::Node);
                    (id.clone(), format!("{}/transform", id))
                }
                AnimTarget::MorphWeight(o, k) => match self.morph_weights.get(&o) {
                    Some(weights) => (
                        IdFmt(&self.ids.entity_name(Entity::ShapeKey(o, k))).to_string(),
                        format!("{}({})", weights, k),
                    ),
                    None => {
                        debug!("no morph controller for shape key channel; skipping it");
                        continue;
                    }
                },
            };

            let id = self.ids.sub(&base, &target_name);
            let n = ch.times.len();
            let input_id = self.ids.sub(&id, "input");
            let input = self.source(input_id, doc::Array::F64(ch.times.clone()), doc::TIME);
            let output_id = self.ids.sub(&id, "output");
            let output = match ch.values {
                Values::Matrices(ref mats) =>
                    self.source(output_id, doc::Array::Matrices(mats.clone()), doc::TRANSFORM),
                Values::Scalars(ref xs) =>
                    self.source(output_id, doc::Array::F64(xs.clone()), doc::WEIGHT),
            };
            let interpolation_id = self.ids.sub(&id, "interpolation");
            let interpolation = self.source(
                interpolation_id,
                doc::Array::Name(vec!["LINEAR".to_string(); n]),
                doc::INTERPOLATION,
            );
            let sampler_id = self.ids.sub(&id, "sampler");

            anim_ids.push(id.clone());
            self.doc.animations.push(doc::Animation { id, input, output, interpolation, sampler_id, target });
        }

        if anim_ids.is_empty() {
            return;
        }
        self.doc.clips.push(doc::AnimationClip {
            id: self.ids.assign(Entity::Action(samples.action), Role::Clip),
            name: self.c.scene.actions[samples.action].name.clone(),
            start: samples.start,
            end: samples.end,
            animations: anim_ids,
        });
    }

    /// The node tree under `parent` (the scene root for `None`).
    fn build_nodes(&mut self, parent: Option<ObjectId>) -> Vec<doc::Node> {
        let c = self.c;
        let mut nodes = vec![];
        for node in c.walk.children(parent) {
            let id = node.object;
            let mut children = vec![];
            if let Some(skel) = c.fragments.skeletons.get(&id) {
                for &root in &skel.roots {
                    children.push(self.joint_node(id, skel, root));
                }
            }
            children.extend(self.build_nodes(Some(id)));

            nodes.push(doc::Node {
                id: self.ids.assign(Entity::Object(id), Role::Node),
                sid: None,
                name: c.scene.objects[id].name.clone(),
                node_type: doc::NodeType::Node,
                matrix: node.local,
                instances: self.instances.remove(&id).unwrap_or_else(Vec::new),
                children,
            });
        }
        nodes
    }

    fn joint_node(&mut self, arm: ObjectId, skel: &Skeleton, n: NodeIndex) -> doc::Node {
        let joint = &skel.tree[n];
        let id = self.ids.assign(Entity::Bone(arm, joint.bone), Role::Node);
        let children = skel.children(n).into_iter()
            .map(|child| self.joint_node(arm, skel, child))
            .collect();
        doc::Node {
            sid: Some(id.clone()),
            id,
            name: self.ids.entity_name(Entity::Bone(arm, joint.bone)),
            node_type: doc::NodeType::Joint,
            matrix: joint.local_rest,
            instances: vec![],
            children,
        }
    }
}

/// An identity-transform mesh object, for tests.
#[cfg(test)]
fn mesh_object(name: &str, mesh: scene::MeshData) -> scene::SceneObject {
    scene::SceneObject::new(name, ObjectData::Mesh(mesh))
}

#[cfg(test)]
fn render_scene(scene: &Scene, config: &ExportConfig) -> String {
    use errors::Warnings;
    use walker;
    let walk = walker::walk(scene, config);
    let mut warnings = Warnings::new();
    let fragments = ::export::extract(scene, &walk, config, &mut warnings);
    let content = Content {
        scene,
        config,
        walk: &walk,
        fragments: &fragments,
        animations: &[],
        timestamp: EPOCH,
    };
    render(&content).unwrap()
}

#[test]
fn test_empty_scene() {
    let xml = render_scene(&Scene::new(), &ExportConfig::default());
    assert!(xml.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
    assert!(xml.contains("<library_geometries>\n  </library_geometries>"));
    assert!(xml.contains(r#"<visual_scene id="Scene" name="Scene">"#));
    assert!(xml.contains(r##"<instance_visual_scene url="#Scene"/>"##));
    assert!(xml.contains("<created>1970-01-01T00:00:00Z</created>"));
    for absent in &["library_cameras", "library_controllers", "library_animations", "library_materials"] {
        assert!(!xml.contains(absent));
    }
    assert!(xml.ends_with("</COLLADA>\n"));
}

#[test]
fn test_library_order() {
    use scene::{CameraData, LightData, LightKind, Material, SceneObject};
    let mut scene = Scene::new();
    let mut mesh = ::geometry::cube();
    mesh.materials = vec![Some(0)];
    scene.materials.push(Material::new("Red"));
    scene.add_object(mesh_object("Cube", mesh));
    scene.add_object(SceneObject::new("Lamp", ObjectData::Light(LightData {
        kind: LightKind::Point, color: [1.0, 1.0, 1.0], energy: 1.0, distance: 2.0,
    })));
    scene.add_object(SceneObject::new("Camera", ObjectData::Camera(CameraData {
        projection: Projection::Perspective { fov_x: ::std::f64::consts::FRAC_PI_2 },
        aspect_ratio: 1.5, clip_start: 0.1, clip_end: 100.0,
    })));
    let xml = render_scene(&scene, &ExportConfig::default());

    let order = [
        "<asset>", "<library_cameras>", "<library_lights>", "<library_effects>",
        "<library_materials>", "<library_geometries>", "<library_visual_scenes>", "<scene>",
    ];
    let positions: Vec<usize> = order.iter().map(|tag| xml.find(tag).unwrap()).collect();
    let mut sorted = positions.clone();
    sorted.sort();
    assert_eq!(positions, sorted);

    let xfov_at = xml.find("<xfov sid=\"xfov\">").unwrap() + "<xfov sid=\"xfov\">".len();
    let xfov: f64 = xml[xfov_at..].split('<').next().unwrap().parse().unwrap();
    assert!((xfov - 90.0).abs() < 1e-9);
    assert!(xml.contains("<quadratic_attenuation>0.25</quadratic_attenuation>"));
    assert!(xml.contains(r#"<polylist material="Red-material" count="6">"#));
    assert!(xml.contains(r##"<instance_material symbol="Red-material" target="#Red-material"/>"##));
}

#[test]
fn test_cross_references_resolve() {
    use scene::{CornerLayer, Image, Material};
    let mut scene = Scene::new();
    let mut mesh = ::geometry::cube();
    mesh.materials = vec![Some(0)];
    mesh.uv_layers.push(CornerLayer { name: "UVMap".into(), data: vec![[0.5, 0.5]; 24] });
    let mut mat = Material::new("Skin");
    mat.texture = Some(0);
    scene.materials.push(mat);
    scene.images.push(Image { name: "skin.png".into(), path: "/textures/skin.png".into() });
    scene.add_object(mesh_object("Cube", mesh));
    let mut config = ExportConfig::default();
    config.use_copy_images = true;
    let xml = render_scene(&scene, &config);

    // Every url="#x" and source="#x" names an element with id="x".
    let mut rest = &xml[..];
    while let Some(i) = rest.find("\"#") {
        let tail = &rest[i + 2..];
        let end = tail.find('"').unwrap();
        let target = &tail[..end];
        assert!(xml.contains(&format!("id=\"{}\"", target)), "dangling reference to {}", target);
        rest = &tail[end..];
    }
    assert!(xml.contains("<init_from>images/skin.png</init_from>"));
    assert!(xml.contains(r#"<texture texture="skin.png-image-sampler" texcoord="CHANNEL0"/>"#));
    assert!(xml.contains(r#"<bind_vertex_input semantic="CHANNEL0" input_semantic="TEXCOORD" input_set="0"/>"#));
}

#[test]
fn test_skinned_morphed_mesh() {
    use cgmath::{Matrix4, vec3};
    use scene::{ArmatureData, Bone, GroupWeight, Modifier, SceneObject, ShapeKey};

    let mut scene = Scene::new();
    let t = |y| Matrix4::from_translation(vec3(0.0, y, 0.0));
    let arm = scene.add_object(SceneObject::new("Rig", ObjectData::Armature(ArmatureData {
        bones: vec![
            Bone::new("root", None, t(0.0)),
            Bone::new("ctrl_ik", Some(0), t(1.0)),
            Bone::new("spine", Some(1), t(1.0)),
        ],
    })));
    let mut mesh = scene::MeshData::from_faces(
        &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[&[0, 1, 2]]);
    mesh.vertex_groups = vec!["root".into(), "spine".into()];
    for (i, v) in mesh.vertices.iter_mut().enumerate() {
        v.groups.push(GroupWeight { group: i % 2, weight: 1.0 });
    }
    mesh.modifiers.push(Modifier::Armature { object: arm });
    mesh.shape_keys.push(ShapeKey { name: "up".into(), relative: true, points: vec![[0.0, 0.0, 1.0]; 3], value: 0.0 });
    let mut body = mesh_object("Body", mesh);
    body.parent = Some(arm);
    scene.add_object(body);

    let mut config = ExportConfig::default();
    config.use_shape_key_export = true;
    let xml = render_scene(&scene, &config);

    assert!(xml.contains(r##"<morph source="#Body-mesh" method="NORMALIZED">"##));
    assert!(xml.contains(r##"<skin source="#Body-morph">"##));
    assert!(xml.contains(r#"<Name_array id="Body-skin-joints-array" count="2">root spine</Name_array>"#));
    assert!(xml.contains(r##"<instance_controller url="#Body-skin">"##));
    assert!(xml.contains("<skeleton>#root</skeleton>"));
    assert!(xml.contains(r#"<node id="spine" sid="spine" name="spine" type="JOINT">"#));
    assert!(!xml.contains("ctrl_ik"));
    // The morph comes first since the skin refers to it.
    assert!(xml.find("<morph ").unwrap() < xml.find("<skin ").unwrap());
}

#[test]
fn test_spline() {
    use scene::{BezierPoint, CurveData, SceneObject, Spline};
    let p = |x| BezierPoint { co: [x, 0.0, 0.0], handle_left: [x - 0.5, 0.0, 0.0], handle_right: [x + 0.5, 0.0, 0.0] };
    let mut scene = Scene::new();
    scene.add_object(SceneObject::new("Path", ObjectData::Curve(CurveData {
        splines: vec![Spline { points: vec![p(0.0), p(1.0)], cyclic: true }],
    })));
    let xml = render_scene(&scene, &ExportConfig::default());
    assert!(xml.contains(r#"<geometry id="Path-spline0-mesh" name="Path-spline0">"#));
    assert!(xml.contains(r#"<spline closed="true">"#));
    assert!(xml.contains(r#"BEZIER BEZIER"#));
    assert!(xml.contains(r##"<instance_geometry url="#Path-spline0-mesh"/>"##));
}

#[test]
fn test_identity_node_matrix() {
    use cgmath::{Matrix4, One};
    use scene::SceneObject;
    let mut scene = Scene::new();
    scene.add_object(SceneObject::new("Empty", ObjectData::Empty));
    let xml = render_scene(&scene, &ExportConfig::default());
    let identity = format!("<matrix sid=\"transform\">{}</matrix>", format::Mat(&Matrix4::one()));
    assert!(xml.contains(&identity));
}

#[test]
fn test_array_ids_are_registered() {
    use scene::SceneObject;
    let mut scene = Scene::new();
    scene.add_object(mesh_object("Cube", ::geometry::cube()));
    scene.add_object(SceneObject::new("Cube-mesh-positions-array", ObjectData::Empty));
    let xml = render_scene(&scene, &ExportConfig::default());

    assert_eq!(xml.matches(r#"id="Cube-mesh-positions-array""#).count(), 1);
    assert!(xml.contains(r##"<accessor source="#Cube-mesh-positions-array1" count="24" stride="3">"##));

    // No two elements share an ID.
    let mut seen = ::std::collections::HashSet::new();
    for part in xml.split(" id=\"").skip(1) {
        let id = &part[..part.find('"').unwrap()];
        assert!(seen.insert(id.to_string()), "duplicate id {}", id);
    }
}

#[test]
fn test_copied_image_names_are_unique() {
    use scene::Image;
    let mut scene = Scene::new();
    for path in &["a/tex.png", "b/tex.png", "c/tex1.png", "noext"] {
        scene.images.push(Image { name: "tex".into(), path: path.into() });
    }
    assert_eq!(copied_image_names(&scene), vec!["tex.png", "tex1.png", "tex11.png", "noext"]);
}
