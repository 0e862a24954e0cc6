//! Build the joint tree for an armature and the skins of the meshes it
//! deforms.
//!
//! A brief review of how skinning works. The skeleton consists of a _tree of
//! joints_ and a _skin vertex_ for every vertex.
//!
//! Each joint in the tree has a local-to-parent transform. Composing it with
//! its parent's, and so on up to the root, gives the joint's local-to-world
//! transform. Example:
//!
//! ```text
//!      A       A's local-to-parent = a, B's = b, etc.
//!     / \      D's local-to-world = a c d
//!    B   C     D's world-to-local = d^{-1} c^{-1} a^{-1}
//!       /
//!      D
//! ```
//!
//! A skin vertex is a list of influences, each a joint and a weight. The
//! vertex's final position is given by the skinning equation
//!
//! ```text
//!     (vertex final pos) =
//!       ∑_{influence}
//!         (weight) (pose local-to-world) (rest world-to-local) (bind shape) (vertex pos)
//! ```
//!
//! The joints are the armature's bones minus the excluded ones (control
//! rigs and non-deforming helpers). Removing a bone from the middle of the
//! tree hands its children to its nearest remaining ancestor, and their
//! local-to-parent transforms are recomputed against that ancestor so the
//! rest pose comes out the same.

use cgmath::Matrix4;
use config::ExportConfig;
use errors::{Warning, Warnings};
use geometry::Geometry;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::Direction;
use scene::ArmatureData;
use smallvec::SmallVec;
use util::make_invertible::{invert, make_invertible};

pub type JointTree = Graph<Joint, ()>;

/// The pruned bone tree of one armature.
pub struct Skeleton {
    pub tree: JointTree,
    /// Joints without a parent, in bone order.
    pub roots: Vec<NodeIndex>,
    /// For every bone, its joint, or `None` if the bone was excluded.
    pub bone_joints: Vec<Option<NodeIndex>>,
}

pub struct Joint {
    /// Index of the bone in the armature.
    pub bone: usize,
    /// The bone's nearest remaining ancestor.
    pub parent_bone: Option<usize>,
    /// Rest local-to-parent, relative to `parent_bone`.
    pub local_rest: Matrix4<f64>,
    /// Rest local-to-armature.
    pub rest: Matrix4<f64>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Influence {
    pub weight: f32,
    pub joint: NodeIndex,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkinVertex {
    pub influences: SmallVec<[Influence; 4]>,
}

/// Skin of one mesh against a skeleton.
pub struct Skin {
    /// World matrix of the mesh at bind time.
    pub bind_shape: Matrix4<f64>,
    /// Rest world-to-local for every joint, in joint order.
    pub inv_binds: Vec<Matrix4<f64>>,
    /// One per output vertex of the geometry.
    pub vertices: Vec<SkinVertex>,
}

/// Whether a bone is left out of the joint tree.
pub fn is_excluded(arm: &ArmatureData, bone: usize, config: &ExportConfig) -> bool {
    let b = &arm.bones[bone];
    config.use_exclude_ctrl_bones && (!b.deform || config.is_ctrl_bone_name(&b.name))
}

impl Skeleton {
    pub fn build(arm: &ArmatureData, config: &ExportConfig) -> Skeleton {
        let rest = arm.rest_matrices();
        let excluded: Vec<bool> = (0..arm.bones.len())
            .map(|b| is_excluded(arm, b, config))
            .collect();

        let nearest_remaining_ancestor = |b: usize| -> Option<usize> {
            let mut cur = arm.bones[b].parent;
            while let Some(p) = cur {
                if !excluded[p] {
                    return Some(p);
                }
                cur = arm.bones[p].parent;
            }
            None
        };

        let mut root_bones = vec![];
        let mut children: Vec<Vec<usize>> = vec![vec![]; arm.bones.len()];
        for b in 0..arm.bones.len() {
            if excluded[b] {
                debug!("excluding bone {}", arm.bones[b].name);
                continue;
            }
            match nearest_remaining_ancestor(b) {
                Some(p) => children[p].push(b),
                None => root_bones.push(b),
            }
        }

        let mut tree = JointTree::with_capacity(arm.bones.len(), arm.bones.len());
        let mut roots = vec![];
        let mut bone_joints = vec![None; arm.bones.len()];

        // Depth-first so joint indices come out in parent-before-child order.
        let mut stack: Vec<(usize, Option<NodeIndex>)> =
            root_bones.into_iter().rev().map(|b| (b, None)).collect();
        while let Some((b, parent)) = stack.pop() {
            let parent_bone = parent.map(|p| tree[p].bone);
            let local_rest = match parent_bone {
                Some(p) => invert(&rest[p]) * rest[b],
                None => rest[b],
            };
            let node = tree.add_node(Joint { bone: b, parent_bone, local_rest, rest: rest[b] });
            bone_joints[b] = Some(node);
            match parent {
                Some(p) => { tree.add_edge(p, node, ()); }
                None => roots.push(node),
            }
            for &child in children[b].iter().rev() {
                stack.push((child, Some(node)));
            }
        }

        Skeleton { tree, roots, bone_joints }
    }

    pub fn num_joints(&self) -> usize {
        self.tree.node_count()
    }

    /// Children of a joint, in bone order.
    pub fn children(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut kids: Vec<_> = self.tree.neighbors_directed(node, Direction::Outgoing).collect();
        kids.sort();
        kids
    }

    pub fn parent(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.tree.neighbors_directed(node, Direction::Incoming).next()
    }

    /// Local-to-parent matrix of every joint for some pose, given the
    /// armature-space posed matrix of every bone. Excluded bones still take
    /// part in the chain through `posed`.
    pub fn posed_locals(&self, posed: &[Matrix4<f64>]) -> Vec<Matrix4<f64>> {
        self.tree.node_indices()
            .map(|n| {
                let joint = &self.tree[n];
                match joint.parent_bone {
                    Some(p) => invert(&posed[p]) * posed[joint.bone],
                    None => posed[joint.bone],
                }
            })
            .collect()
    }

    /// Build the skin for a mesh deformed by this skeleton. `None` when no
    /// vertex is influenced by any remaining joint.
    pub fn build_skin(
        &self,
        arm: &ArmatureData,
        arm_world: &Matrix4<f64>,
        mesh_world: &Matrix4<f64>,
        geom: &Geometry,
        object_name: &str,
        warnings: &mut Warnings,
    ) -> Option<Skin> {
        let mesh = &geom.mesh;

        // Vertex group -> joint
        let group_joints: Vec<Option<NodeIndex>> = mesh.vertex_groups.iter()
            .map(|g| arm.bone_by_name(g).and_then(|b| self.bone_joints[b]))
            .collect();

        let skin_vertex = |vi: usize| -> SkinVertex {
            let mut influences: SmallVec<[Influence; 4]> = SmallVec::new();
            for gw in &mesh.vertices[vi].groups {
                let joint = match group_joints.get(gw.group).cloned().and_then(|j| j) {
                    Some(j) => j,
                    None => continue,
                };
                if !(gw.weight > 0.0) {
                    continue;
                }
                match influences.iter().position(|inf| inf.joint == joint) {
                    Some(i) => influences[i].weight += gw.weight,
                    None => influences.push(Influence { weight: gw.weight, joint }),
                }
            }
            let total: f64 = influences.iter().map(|inf| inf.weight as f64).sum();
            for inf in &mut influences {
                inf.weight = (inf.weight as f64 / total) as f32;
            }
            SkinVertex { influences }
        };

        let vertices: Vec<SkinVertex> = geom.source_vertex.iter()
            .map(|&vi| skin_vertex(vi))
            .collect();

        if vertices.iter().all(|v| v.influences.is_empty()) {
            warnings.push(Warning::DegenerateGeometry {
                object: object_name.to_string(),
                reason: "no vertex is weighted to an exported bone; writing it unskinned",
            });
            return None;
        }

        let inv_binds = self.tree.node_indices()
            .map(|n| invert(&make_invertible(&(arm_world * self.tree[n].rest))))
            .collect();

        Some(Skin { bind_shape: *mesh_world, inv_binds, vertices })
    }
}

#[cfg(test)]
fn test_armature() -> ArmatureData {
    use cgmath::vec3;
    use scene::Bone;
    let t = |y| Matrix4::from_translation(vec3(0.0, y, 0.0));
    ArmatureData {
        bones: vec![
            Bone::new("root", None, t(1.0)),
            Bone::new("ctrl_ik", Some(0), t(2.0)),
            Bone::new("spine", Some(1), t(3.0)),
        ],
    }
}

#[test]
fn test_ctrl_bones_pruned() {
    use cgmath::vec3;
    let arm = test_armature();
    let skel = Skeleton::build(&arm, &ExportConfig::default());

    let names: Vec<_> = skel.tree.node_indices()
        .map(|n| arm.bones[skel.tree[n].bone].name.as_str())
        .collect();
    assert_eq!(names, vec!["root", "spine"]);
    assert_eq!(skel.bone_joints[1], None);

    let spine = skel.bone_joints[2].unwrap();
    let root = skel.bone_joints[0].unwrap();
    assert_eq!(skel.parent(spine), Some(root));
    assert_eq!(skel.roots, vec![root]);
    // spine's rest is relative to root now: 2 (from ctrl_ik) + 3
    assert_eq!(skel.tree[spine].local_rest, Matrix4::from_translation(vec3(0.0, 5.0, 0.0)));
    assert_eq!(skel.tree[spine].rest, Matrix4::from_translation(vec3(0.0, 6.0, 0.0)));

    // Nothing is pruned with the option off.
    let mut config = ExportConfig::default();
    config.use_exclude_ctrl_bones = false;
    assert_eq!(Skeleton::build(&arm, &config).num_joints(), 3);
}

#[test]
fn test_non_deform_bones_pruned() {
    let mut arm = test_armature();
    arm.bones[1].name = "helper".into();
    arm.bones[1].deform = false;
    arm.bones[0].deform = false;
    let skel = Skeleton::build(&arm, &ExportConfig::default());
    assert_eq!(skel.num_joints(), 1);
    assert_eq!(skel.roots.len(), 1);
    assert_eq!(skel.tree[skel.roots[0]].bone, 2);
    assert_eq!(skel.tree[skel.roots[0]].parent_bone, None);
    // Every remaining joint's chain is made of remaining bones
    for n in skel.tree.node_indices() {
        if let Some(p) = skel.tree[n].parent_bone {
            assert!(skel.bone_joints[p].is_some());
        }
    }
}

#[test]
fn test_weights_renormalized() {
    use cgmath::One;
    use scene::{GroupWeight, MeshData, ObjectData, Scene, SceneObject};
    use geometry;

    let arm = test_armature();
    let skel = Skeleton::build(&arm, &ExportConfig::default());

    let mut mesh = MeshData::from_faces(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[&[0, 1, 2]]);
    mesh.vertex_groups = vec!["root".into(), "ctrl_ik".into(), "spine".into(), "unrelated".into()];
    let gw = |group, weight| GroupWeight { group, weight };
    mesh.vertices[0].groups = vec![gw(0, 0.2), gw(1, 0.5), gw(2, 0.2)].into_iter().collect();
    mesh.vertices[1].groups = vec![gw(1, 1.0)].into_iter().collect();
    mesh.vertices[2].groups = vec![gw(2, 0.3), gw(3, 0.3)].into_iter().collect();

    let mut scene = Scene::new();
    let id = scene.add_object(SceneObject::new("m", ObjectData::Mesh(mesh.clone())));
    let mut warnings = Warnings::new();
    let geom = geometry::extract(&scene, id, &mesh, &ExportConfig::default(), &mut warnings);
    let skin = skel.build_skin(&arm, &Matrix4::one(), &Matrix4::one(), &geom, "m", &mut warnings).unwrap();

    for (out, &vi) in skin.vertices.iter().zip(&geom.source_vertex) {
        let sum: f32 = out.influences.iter().map(|i| i.weight).sum();
        match vi {
            0 => {
                assert_eq!(out.influences.len(), 2);
                assert!((sum - 1.0).abs() < 1e-6);
                assert!((out.influences[0].weight - 0.5).abs() < 1e-6);
            }
            1 => assert!(out.influences.is_empty()),
            2 => {
                assert_eq!(out.influences.len(), 1);
                assert!((sum - 1.0).abs() < 1e-6);
            }
            _ => unreachable!(),
        }
    }
    assert_eq!(skin.inv_binds.len(), 2);
    assert!(warnings.is_empty());
}

#[test]
fn test_fully_pruned_skin_is_dropped() {
    use cgmath::One;
    use scene::{GroupWeight, MeshData, ObjectData, Scene, SceneObject};
    use geometry;

    let arm = test_armature();
    let skel = Skeleton::build(&arm, &ExportConfig::default());
    let mut mesh = MeshData::from_faces(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[&[0, 1, 2]]);
    mesh.vertex_groups = vec!["ctrl_ik".into()];
    for v in &mut mesh.vertices {
        v.groups.push(GroupWeight { group: 0, weight: 1.0 });
    }
    let mut scene = Scene::new();
    let id = scene.add_object(SceneObject::new("m", ObjectData::Mesh(mesh.clone())));
    let mut warnings = Warnings::new();
    let geom = geometry::extract(&scene, id, &mesh, &ExportConfig::default(), &mut warnings);
    assert!(skel.build_skin(&arm, &Matrix4::one(), &Matrix4::one(), &geom, "m", &mut warnings).is_none());
    assert_eq!(warnings.into_vec().len(), 1);
}
