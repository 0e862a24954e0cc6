//! Animation sampling.
//!
//! Actions are sampled once per integer frame over their keyed range, turned
//! into matrix channels (nodes and joints) or scalar channels (morph
//! weights), and then optionally thinned out by dropping samples that
//! linear interpolation reproduces. The frame is always passed in
//! explicitly; nothing here reads or changes a "current frame".

pub mod curve;
pub mod optimize;

use cgmath::{Matrix4, One, Quaternion};
use config::ExportConfig;
use errors::{Warning, Warnings};
use scene::{
    Action, ActionId, ArmatureData, ChannelTarget, FCurve, ObjectData, ObjectId, ObjectKind,
    Property, Rotation, Scene, SceneObject, Trs,
};
use skeleton::Skeleton;
use std::collections::{BTreeMap, HashMap};
use util::make_invertible::invert;
use walker::{ExportNode, Walk};

/// Which action drives what, in one output document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assignment {
    /// Object (and, for armatures, bone) channels.
    pub objects: BTreeMap<ObjectId, ActionId>,
    /// Shape key weights of meshes.
    pub shape_keys: BTreeMap<ObjectId, ActionId>,
}

/// The animation for one output document.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentAnimation {
    /// In all-actions mode, the action the document is written for.
    pub action: Option<ActionId>,
    pub assignment: Assignment,
}

/// What a channel animates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnimTarget {
    /// The `transform` matrix of an object's node.
    Node(ObjectId),
    /// The `transform` matrix of a joint: (armature object, bone index).
    Joint(ObjectId, usize),
    /// One weight of a mesh's morph controller: (mesh object, shape key).
    MorphWeight(ObjectId, usize),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Values {
    Matrices(Vec<Matrix4<f64>>),
    Scalars(Vec<f64>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    pub target: AnimTarget,
    /// Seconds, strictly increasing.
    pub times: Vec<f64>,
    /// One value per time.
    pub values: Values,
}

/// Every channel sampled from one action.
pub struct ActionSamples {
    pub action: ActionId,
    /// Seconds.
    pub start: f64,
    pub end: f64,
    pub channels: Vec<Channel>,
}

impl Values {
    pub fn len(&self) -> usize {
        match *self {
            Values::Matrices(ref v) => v.len(),
            Values::Scalars(ref v) => v.len(),
        }
    }
}


//////////////
// Action selection
//////////////

/// Decide which documents to write and what animates in each.
///
/// Without animation, or in the usual single-action mode, that's one
/// document. In all-actions mode it's one per action of the first exported
/// armature.
pub fn select(scene: &Scene, walk: &Walk, config: &ExportConfig, warnings: &mut Warnings) -> Vec<DocumentAnimation> {
    if !config.use_anim {
        return vec![DocumentAnimation { action: None, assignment: Assignment::default() }];
    }

    let active = active_assignment(scene, walk, config, warnings);
    if !config.use_anim_action_all {
        return vec![DocumentAnimation { action: None, assignment: active }];
    }

    let armature = walk.nodes.iter()
        .map(|n| n.object)
        .find(|&o| scene.objects[o].kind() == Some(ObjectKind::Armature));
    let armature = match armature {
        Some(a) => a,
        None => {
            warnings.push(Warning::AnimationSource {
                action: String::new(),
                reason: "no armature is exported, so there are no actions to write; writing the scene without animation",
            });
            return vec![DocumentAnimation { action: None, assignment: Assignment::default() }];
        }
    };

    let arm_obj = &scene.objects[armature];
    let docs: Vec<DocumentAnimation> = scene.actions.iter().enumerate()
        .filter(|&(_, action)| is_associated(action, arm_obj))
        .filter(|&(_, action)| {
            let skip = config.is_skipped_action_name(&action.name);
            if skip {
                debug!("skipping action {}", action.name);
            }
            !skip
        })
        .map(|(id, _)| {
            let mut assignment = active.clone();
            assignment.objects.insert(armature, id);
            DocumentAnimation { action: Some(id), assignment }
        })
        .collect();

    if docs.is_empty() {
        warnings.push(Warning::AnimationSource {
            action: String::new(),
            reason: "no exportable action belongs to the armature; writing the scene without animation",
        });
        return vec![DocumentAnimation { action: None, assignment: Assignment::default() }];
    }
    docs
}

/// An action goes with an armature if it's the armature's active action or
/// animates one of its bones.
fn is_associated(action: &Action, obj: &SceneObject) -> bool {
    if obj.active_action() == Some(action.name.as_str()) {
        return true;
    }
    let arm = match obj.data {
        ObjectData::Armature(ref arm) => arm,
        _ => return false,
    };
    action.fcurves.iter().any(|fc| match fc.target {
        ChannelTarget::Bone(ref name) => arm.bone_by_name(name).is_some(),
        _ => false,
    })
}

fn active_assignment(scene: &Scene, walk: &Walk, config: &ExportConfig, warnings: &mut Warnings) -> Assignment {
    let mut assignment = Assignment::default();
    for node in &walk.nodes {
        let obj = &scene.objects[node.object];
        if let Some(name) = obj.active_action() {
            if let Some(id) = find_action(scene, name, config, warnings) {
                assignment.objects.insert(node.object, id);
            }
        }
        if !config.use_shape_key_export {
            continue;
        }
        if let ObjectData::Mesh(ref mesh) = obj.data {
            let name = mesh.shape_key_animation.as_ref().and_then(|a| a.action.as_ref());
            if let (false, Some(name)) = (mesh.shape_keys.is_empty(), name) {
                if let Some(id) = find_action(scene, name, config, warnings) {
                    assignment.shape_keys.insert(node.object, id);
                }
            }
        }
    }
    assignment
}

fn find_action(scene: &Scene, name: &str, config: &ExportConfig, warnings: &mut Warnings) -> Option<ActionId> {
    if config.is_skipped_action_name(name) {
        debug!("skipping action {}", name);
        return None;
    }
    let id = scene.actions.iter().position(|a| a.name == name);
    if id.is_none() {
        warnings.push(Warning::AnimationSource { action: name.to_string(), reason: "no action with this name" });
    }
    id
}


//////////////
// Sampling
//////////////

struct Sampler<'a> {
    scene: &'a Scene,
    walk: &'a Walk,
    skeletons: &'a BTreeMap<ObjectId, Skeleton>,
    assignment: &'a Assignment,
}

/// Sample every action in `assignment`, in the order the objects using them
/// are exported.
pub fn sample(
    scene: &Scene,
    walk: &Walk,
    skeletons: &BTreeMap<ObjectId, Skeleton>,
    assignment: &Assignment,
    config: &ExportConfig,
    warnings: &mut Warnings,
) -> Vec<ActionSamples> {
    let s = Sampler { scene, walk, skeletons, assignment };

    let mut order: Vec<ActionId> = vec![];
    for node in &walk.nodes {
        let ids = assignment.objects.get(&node.object).into_iter()
            .chain(assignment.shape_keys.get(&node.object));
        for &id in ids {
            if !order.contains(&id) {
                order.push(id);
            }
        }
    }

    let tolerance = config.anim_tolerance();
    let mut out = vec![];
    for action_id in order {
        let action = &scene.actions[action_id];
        let (lo, hi) = match action.frame_range() {
            Some(r) => r,
            None => {
                warnings.push(Warning::AnimationSource {
                    action: action.name.clone(),
                    reason: "action has no keyframes",
                });
                continue;
            }
        };
        let frames: Vec<f64> = (lo..hi + 1).map(|f| f as f64).collect();

        let mut channels = s.channels_for(action_id, &frames);
        if config.use_anim_optimize {
            for ch in &mut channels {
                optimize_channel(ch, tolerance);
            }
        }
        debug!("action {}: frames {}..{}, {} channels", action.name, lo, hi, channels.len());

        out.push(ActionSamples {
            action: action_id,
            start: lo as f64 / scene.fps,
            end: hi as f64 / scene.fps,
            channels,
        });
    }
    out
}

impl<'a> Sampler<'a> {
    fn channels_for(&self, action_id: ActionId, frames: &[f64]) -> Vec<Channel> {
        let fps = self.scene.fps;
        let times: Vec<f64> = frames.iter().map(|f| f / fps).collect();
        let action = &self.scene.actions[action_id];
        let mut channels = vec![];

        for node in &self.walk.nodes {
            let obj = &self.scene.objects[node.object];

            if self.node_action(node) == Some(action_id) {
                let mats = frames.iter().map(|&f| self.node_local_at(node, f)).collect();
                channels.push(Channel {
                    target: AnimTarget::Node(node.object),
                    times: times.clone(),
                    values: Values::Matrices(mats),
                });
            }

            if self.assignment.objects.get(&node.object) == Some(&action_id) && action.animates_bones() {
                if let (&ObjectData::Armature(ref arm), Some(skel)) = (&obj.data, self.skeletons.get(&node.object)) {
                    channels.extend(joint_channels(node.object, arm, skel, action, frames, &times));
                }
            }

            if self.assignment.shape_keys.get(&node.object) == Some(&action_id) {
                if let ObjectData::Mesh(ref mesh) = obj.data {
                    for (k, key) in mesh.shape_keys.iter().enumerate() {
                        let fc = action.fcurves.iter().find(|fc| {
                            fc.property == Property::Value && fc.target == ChannelTarget::ShapeKey(key.name.clone())
                        });
                        let weights = frames.iter()
                            .map(|&f| fc.and_then(|fc| curve::evaluate(fc, f)).unwrap_or(key.value as f64))
                            .collect();
                        channels.push(Channel {
                            target: AnimTarget::MorphWeight(node.object, k),
                            times: times.clone(),
                            values: Values::Scalars(weights),
                        });
                    }
                }
            }
        }
        channels
    }

    fn object_action(&self, id: ObjectId) -> Option<&'a Action> {
        self.assignment.objects.get(&id).map(|&a| &self.scene.actions[a])
    }

    /// The action that moves a node, if any. For a reparented node that's
    /// its own action or that of an object between it and its exported
    /// parent.
    fn node_action(&self, node: &ExportNode) -> Option<ActionId> {
        let moves = |id: ObjectId| -> Option<ActionId> {
            match self.assignment.objects.get(&id) {
                Some(&a) if self.scene.actions[a].animates_object() => Some(a),
                _ => None,
            }
        };
        if let Some(a) = moves(node.object) {
            return Some(a);
        }
        if !node.reparented {
            return None;
        }
        let mut cur = self.scene.objects[node.object].parent;
        while let Some(p) = cur {
            if Some(p) == node.parent {
                break;
            }
            if let Some(a) = moves(p) {
                return Some(a);
            }
            cur = self.scene.objects[p].parent;
        }
        None
    }

    fn object_local_at(&self, id: ObjectId, frame: f64) -> Matrix4<f64> {
        let obj = &self.scene.objects[id];
        match self.object_action(id) {
            Some(action) => {
                let fcurves = action.fcurves.iter().filter(|fc| fc.target == ChannelTarget::Object);
                animated_trs(&obj.transform, fcurves, frame).matrix()
            }
            None => obj.transform.matrix(),
        }
    }

    fn object_world_at(&self, id: ObjectId, frame: f64) -> Matrix4<f64> {
        let mut m = Matrix4::one();
        let mut cur = Some(id);
        while let Some(i) = cur {
            m = self.object_local_at(i, frame) * m;
            cur = self.scene.objects[i].parent;
        }
        m
    }

    /// Local matrix of a node relative to its exported parent.
    fn node_local_at(&self, node: &ExportNode, frame: f64) -> Matrix4<f64> {
        if !node.reparented {
            return self.object_local_at(node.object, frame);
        }
        let world = self.object_world_at(node.object, frame);
        match node.parent {
            Some(p) => invert(&self.object_world_at(p, frame)) * world,
            None => world,
        }
    }
}

/// One matrix channel per joint, in joint order.
fn joint_channels(
    armature: ObjectId,
    arm: &ArmatureData,
    skel: &Skeleton,
    action: &Action,
    frames: &[f64],
    times: &[f64],
) -> Vec<Channel> {
    let mut bone_curves: HashMap<&str, Vec<&FCurve>> = HashMap::new();
    for fc in &action.fcurves {
        if let ChannelTarget::Bone(ref name) = fc.target {
            bone_curves.entry(name.as_str()).or_insert_with(Vec::new).push(fc);
        }
    }

    let mut per_joint: Vec<Vec<Matrix4<f64>>> = vec![Vec::with_capacity(frames.len()); skel.num_joints()];
    for &frame in frames {
        let posed = arm.chain_matrices(|b| {
            let basis = match bone_curves.get(b.name.as_str()) {
                Some(fcs) => animated_trs(&b.pose, fcs.iter().cloned(), frame),
                None => b.pose,
            };
            b.rest * basis.matrix()
        });
        for (j, m) in skel.posed_locals(&posed).into_iter().enumerate() {
            per_joint[j].push(m);
        }
    }

    skel.tree.node_indices().zip(per_joint)
        .map(|(n, mats)| Channel {
            target: AnimTarget::Joint(armature, skel.tree[n].bone),
            times: times.to_vec(),
            values: Values::Matrices(mats),
        })
        .collect()
}

/// `base` with the components the f-curves animate replaced by their value
/// at `frame`.
fn animated_trs<'f, I>(base: &Trs, fcurves: I, frame: f64) -> Trs
where I: Iterator<Item = &'f FCurve> {
    let mut trs = *base;
    let mut euler: Option<[f64; 3]> = None;
    let mut quat: Option<[f64; 4]> = None;
    for fc in fcurves {
        let v = match curve::evaluate(fc, frame) {
            Some(v) => v,
            None => continue,
        };
        let i = fc.index;
        match fc.property {
            Property::Location if i < 3 => trs.location[i] = v,
            Property::Scale if i < 3 => trs.scale[i] = v,
            Property::RotationEuler if i < 3 => {
                let e = euler.get_or_insert_with(|| match base.rotation {
                    Rotation::Euler(e) => e,
                    Rotation::Quaternion(_) => [0.0; 3],
                });
                e[i] = v;
            }
            Property::RotationQuaternion if i < 4 => {
                let q = quat.get_or_insert_with(|| match base.rotation {
                    Rotation::Quaternion(q) => [q.s, q.v.x, q.v.y, q.v.z],
                    Rotation::Euler(_) => [1.0, 0.0, 0.0, 0.0],
                });
                q[i] = v;
            }
            _ => (),
        }
    }
    if let Some(q) = quat {
        trs.rotation = Rotation::Quaternion(Quaternion::new(q[0], q[1], q[2], q[3]));
    } else if let Some(e) = euler {
        trs.rotation = Rotation::Euler(e);
    }
    trs
}

fn optimize_channel(ch: &mut Channel, tolerance: f64) {
    let kept = match ch.values {
        Values::Matrices(ref mats) => {
            let values: Vec<&[f64]> = mats.iter()
                .map(|m| { let a: &[f64; 16] = m.as_ref(); &a[..] })
                .collect();
            optimize::reduce(&ch.times, &values, tolerance)
        }
        Values::Scalars(ref xs) => {
            let values: Vec<&[f64]> = xs.iter().map(|x| ::std::slice::from_ref(x)).collect();
            optimize::reduce(&ch.times, &values, tolerance)
        }
    };
    if kept.len() == ch.times.len() {
        return;
    }
    ch.times = kept.iter().map(|&i| ch.times[i]).collect();
    ch.values = match ch.values {
        Values::Matrices(ref mats) => Values::Matrices(kept.iter().map(|&i| mats[i]).collect()),
        Values::Scalars(ref xs) => Values::Scalars(kept.iter().map(|&i| xs[i]).collect()),
    };
}


#[cfg(test)]
mod test {
    use super::*;
    use cgmath::vec3;
    use scene::{Bone, Keyframe, MeshData, ShapeKey, AnimationData};
    use walker;

    fn action(name: &str, fcurves: Vec<FCurve>) -> Action {
        Action { name: name.to_string(), fcurves }
    }

    fn bone_curve(bone: &str, keys: Vec<Keyframe>) -> FCurve {
        FCurve::new(ChannelTarget::Bone(bone.to_string()), Property::Location, 0, keys)
    }

    fn rig_scene() -> Scene {
        let mut scene = Scene::new();
        let t = |y| Matrix4::from_translation(vec3(0.0, y, 0.0));
        let arm = ArmatureData {
            bones: vec![
                Bone::new("root", None, t(0.0)),
                Bone::new("ctrl_ik", Some(0), t(1.0)),
                Bone::new("spine", Some(1), t(1.0)),
            ],
        };
        let mut obj = SceneObject::new("Rig", ObjectData::Armature(arm));
        obj.animation = Some(AnimationData { action: Some("walk".into()) });
        scene.add_object(obj);
        let keys = || vec![Keyframe::linear(1.0, 0.0), Keyframe::linear(5.0, 4.0)];
        scene.actions.push(action("walk", vec![bone_curve("root", keys())]));
        scene.actions.push(action("walk-noexp", vec![bone_curve("root", keys())]));
        scene.actions.push(action("unrelated", vec![bone_curve("tail", keys())]));
        scene
    }

    fn skeletons(scene: &Scene, config: &ExportConfig) -> BTreeMap<ObjectId, Skeleton> {
        let mut map = BTreeMap::new();
        if let ObjectData::Armature(ref arm) = scene.objects[0].data {
            map.insert(0, Skeleton::build(arm, config));
        }
        map
    }

    #[test]
    fn test_no_anim() {
        let scene = rig_scene();
        let config = ExportConfig::default();
        let walk = walker::walk(&scene, &config);
        let mut warnings = Warnings::new();
        let docs = select(&scene, &walk, &config, &mut warnings);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].assignment, Assignment::default());
    }

    #[test]
    fn test_all_actions_skips_noexp() {
        let scene = rig_scene();
        let mut config = ExportConfig::default();
        config.use_anim = true;
        config.use_anim_action_all = true;
        let walk = walker::walk(&scene, &config);
        let mut warnings = Warnings::new();

        let docs = select(&scene, &walk, &config, &mut warnings);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].action, Some(0));
        assert!(warnings.is_empty());

        config.use_anim_skip_noexp = false;
        let docs = select(&scene, &walk, &config, &mut warnings);
        let actions: Vec<_> = docs.iter().map(|d| d.action).collect();
        assert_eq!(actions, vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_bone_channels() {
        let scene = rig_scene();
        let mut config = ExportConfig::default();
        config.use_anim = true;
        config.use_anim_optimize = false;
        let walk = walker::walk(&scene, &config);
        let skels = skeletons(&scene, &config);
        let mut warnings = Warnings::new();
        let docs = select(&scene, &walk, &config, &mut warnings);
        let samples = sample(&scene, &walk, &skels, &docs[0].assignment, &config, &mut warnings);

        assert_eq!(samples.len(), 1);
        let s = &samples[0];
        assert_eq!(s.start, 1.0 / 24.0);
        assert_eq!(s.end, 5.0 / 24.0);
        // root and spine; ctrl_ik is pruned. The node itself isn't animated.
        let targets: Vec<_> = s.channels.iter().map(|c| c.target).collect();
        assert_eq!(targets, vec![AnimTarget::Joint(0, 0), AnimTarget::Joint(0, 2)]);
        assert_eq!(s.channels[0].times.len(), 5);

        match s.channels[0].values {
            Values::Matrices(ref mats) => {
                assert_eq!(mats[0], Matrix4::one());
                assert_eq!(mats[4], Matrix4::from_translation(vec3(4.0, 0.0, 0.0)));
            }
            _ => panic!("expected matrices"),
        }
        // spine is 2 above root through the pruned ctrl_ik, whatever root does.
        match s.channels[1].values {
            Values::Matrices(ref mats) => {
                for m in mats {
                    assert_eq!(*m, Matrix4::from_translation(vec3(0.0, 2.0, 0.0)));
                }
            }
            _ => panic!("expected matrices"),
        }
    }

    #[test]
    fn test_optimized_channel_keeps_ends() {
        let scene = rig_scene();
        let mut config = ExportConfig::default();
        config.use_anim = true;
        let walk = walker::walk(&scene, &config);
        let skels = skeletons(&scene, &config);
        let mut warnings = Warnings::new();
        let docs = select(&scene, &walk, &config, &mut warnings);
        let samples = sample(&scene, &walk, &skels, &docs[0].assignment, &config, &mut warnings);
        // Linear motion and a constant: both collapse to the end points.
        for ch in &samples[0].channels {
            assert_eq!(ch.times, vec![1.0 / 24.0, 5.0 / 24.0]);
            assert_eq!(ch.values.len(), 2);
        }
    }

    #[test]
    fn test_empty_action_warns() {
        let mut scene = rig_scene();
        scene.actions[0].fcurves[0].keyframes.clear();
        let mut config = ExportConfig::default();
        config.use_anim = true;
        let walk = walker::walk(&scene, &config);
        let skels = skeletons(&scene, &config);
        let mut warnings = Warnings::new();
        let docs = select(&scene, &walk, &config, &mut warnings);
        let samples = sample(&scene, &walk, &skels, &docs[0].assignment, &config, &mut warnings);
        assert!(samples.is_empty());
        let list = warnings.into_vec();
        match list[..] {
            [Warning::AnimationSource { ref action, .. }] => assert_eq!(action, "walk"),
            _ => panic!("expected one animation warning"),
        }
    }

    #[test]
    fn test_object_and_shape_key_channels() {
        let mut scene = Scene::new();
        let mut mesh = MeshData::from_faces(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[&[0, 1, 2]]);
        mesh.shape_keys.push(ShapeKey { name: "smile".into(), relative: true, points: vec![[0.0; 3]; 3], value: 0.5 });
        mesh.shape_keys.push(ShapeKey { name: "frown".into(), relative: true, points: vec![[0.0; 3]; 3], value: 0.25 });
        mesh.shape_key_animation = Some(AnimationData { action: Some("faces".into()) });
        let mut obj = SceneObject::new("Face", ObjectData::Mesh(mesh));
        obj.animation = Some(AnimationData { action: Some("move".into()) });
        scene.add_object(obj);
        scene.actions.push(action("move", vec![
            FCurve::new(ChannelTarget::Object, Property::Location, 2,
                vec![Keyframe::linear(0.0, 0.0), Keyframe::linear(2.0, 2.0)]),
        ]));
        scene.actions.push(action("faces", vec![
            FCurve::new(ChannelTarget::ShapeKey("smile".into()), Property::Value, 0,
                vec![Keyframe::linear(0.0, 0.0), Keyframe::linear(4.0, 1.0)]),
        ]));

        let mut config = ExportConfig::default();
        config.use_anim = true;
        config.use_shape_key_export = true;
        config.use_anim_optimize = false;
        let walk = walker::walk(&scene, &config);
        let mut warnings = Warnings::new();
        let docs = select(&scene, &walk, &config, &mut warnings);
        let samples = sample(&scene, &walk, &BTreeMap::new(), &docs[0].assignment, &config, &mut warnings);

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].channels[0].target, AnimTarget::Node(0));
        match samples[0].channels[0].values {
            Values::Matrices(ref mats) => assert_eq!(mats[1], Matrix4::from_translation(vec3(0.0, 0.0, 1.0))),
            _ => panic!("expected matrices"),
        }
        let weights = &samples[1].channels;
        assert_eq!(weights.len(), 2);
        assert_eq!(weights[1].target, AnimTarget::MorphWeight(0, 1));
        assert_eq!(weights[0].values, Values::Scalars(vec![0.0, 0.25, 0.5, 0.75, 1.0]));
        // Unanimated key holds its value.
        assert_eq!(weights[1].values, Values::Scalars(vec![0.25; 5]));
    }

    #[test]
    fn test_animated_trs_rotation_modes() {
        let base = Trs::identity();
        let fc = FCurve::new(ChannelTarget::Object, Property::RotationQuaternion, 3,
            vec![Keyframe::linear(0.0, 1.0)]);
        let trs = animated_trs(&base, ::std::iter::once(&fc), 0.0);
        match trs.rotation {
            Rotation::Quaternion(q) => assert_eq!(q, Quaternion::new(1.0, 0.0, 0.0, 1.0)),
            _ => panic!("expected a quaternion"),
        }
    }
}
