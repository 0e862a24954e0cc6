//! Pick the objects to export and put them in parent-before-child order.

use cgmath::Matrix4;
use config::ExportConfig;
use scene::{ObjectId, Scene, SceneObject};
use std::collections::HashMap;
use util::make_invertible::invert;

/// An object that passed the filters, as it will sit in the exported
/// hierarchy.
#[derive(Clone, Debug)]
pub struct ExportNode {
    pub object: ObjectId,
    /// Nearest exported ancestor; `None` means it hangs off the scene root.
    pub parent: Option<ObjectId>,
    /// True when `parent` isn't the object's real parent, ie. the real parent
    /// (or more) was filtered out.
    pub reparented: bool,
    /// Local-to-parent matrix relative to `parent`. Keeps the world
    /// transform the same as in the scene.
    pub local: Matrix4<f64>,
}

pub struct Walk {
    /// Every exported object. A parent always comes before its children and
    /// siblings keep their scene order.
    pub nodes: Vec<ExportNode>,
    index: HashMap<ObjectId, usize>,
}

impl Walk {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, object: ObjectId) -> bool {
        self.index.contains_key(&object)
    }

    pub fn get(&self, object: ObjectId) -> Option<&ExportNode> {
        self.index.get(&object).map(|&i| &self.nodes[i])
    }

    /// Exported children of `parent` (or the roots for `None`), in order.
    pub fn children<'a>(&'a self, parent: Option<ObjectId>) -> Box<Iterator<Item = &'a ExportNode> + 'a> {
        Box::new(self.nodes.iter().filter(move |n| n.parent == parent))
    }
}

pub fn is_included(obj: &SceneObject, config: &ExportConfig) -> bool {
    let kind = match obj.kind() {
        Some(k) => k,
        None => return false,
    };
    config.object_types.contains(&kind)
        && (!config.use_export_selected || obj.selected)
        && (!config.use_active_layers || obj.visible)
}

pub fn walk(scene: &Scene, config: &ExportConfig) -> Walk {
    let included: Vec<bool> = scene.objects.iter()
        .map(|o| is_included(o, config))
        .collect();

    let nearest_included_ancestor = |id: ObjectId| -> Option<ObjectId> {
        let mut cur = scene.objects[id].parent;
        while let Some(p) = cur {
            if included[p] {
                return Some(p);
            }
            cur = scene.objects[p].parent;
        }
        None
    };

    // Children lists in scene order, under the exported parent.
    let mut roots = vec![];
    let mut children: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
    for id in 0..scene.objects.len() {
        if !included[id] { continue; }
        match nearest_included_ancestor(id) {
            Some(p) => children.entry(p).or_insert_with(Vec::new).push(id),
            None => roots.push(id),
        }
    }

    let mut walk = Walk { nodes: vec![], index: HashMap::new() };
    let mut stack: Vec<(ObjectId, Option<ObjectId>)> =
        roots.into_iter().rev().map(|id| (id, None)).collect();
    while let Some((id, parent)) = stack.pop() {
        let obj = &scene.objects[id];
        let reparented = obj.parent != parent;
        let local = if !reparented {
            obj.transform.matrix()
        } else {
            let world = scene.world_matrix(id);
            match parent {
                Some(p) => invert(&scene.world_matrix(p)) * world,
                None => world,
            }
        };
        if reparented {
            debug!("object {} attached to {}", obj.name,
                parent.map(|p| scene.objects[p].name.as_str()).unwrap_or("the scene root"));
        }

        walk.index.insert(id, walk.nodes.len());
        walk.nodes.push(ExportNode { object: id, parent, reparented, local });

        if let Some(kids) = children.get(&id) {
            for &kid in kids.iter().rev() {
                stack.push((kid, Some(id)));
            }
        }
    }

    debug!("{} of {} objects pass the export filters", walk.nodes.len(), scene.objects.len());
    walk
}

#[cfg(test)]
fn obj(scene: &mut Scene, name: &str, parent: Option<ObjectId>) -> ObjectId {
    use scene::ObjectData;
    let mut o = SceneObject::new(name, ObjectData::Empty);
    o.parent = parent;
    scene.add_object(o)
}

#[test]
fn test_parent_before_child() {
    let mut scene = Scene::new();
    // Children listed before their parents in the scene
    let c = obj(&mut scene, "c", None);
    let b = obj(&mut scene, "b", None);
    let a = obj(&mut scene, "a", None);
    scene.objects[c].parent = Some(b);
    scene.objects[b].parent = Some(a);
    let d = obj(&mut scene, "d", Some(a));

    let w = walk(&scene, &ExportConfig::default());
    let order: Vec<ObjectId> = w.nodes.iter().map(|n| n.object).collect();
    assert_eq!(order, vec![a, b, c, d]);
    assert_eq!(w.get(c).unwrap().parent, Some(b));
    assert!(w.nodes.iter().all(|n| !n.reparented));
}

#[test]
fn test_filters() {
    use scene::ObjectKind;
    let mut scene = Scene::new();
    let a = obj(&mut scene, "a", None);
    let b = obj(&mut scene, "b", None);
    let hidden = obj(&mut scene, "hidden", None);
    scene.objects[a].selected = true;
    scene.objects[hidden].visible = false;

    let mut config = ExportConfig::default();
    assert_eq!(walk(&scene, &config).nodes.len(), 2);

    config.use_active_layers = false;
    assert_eq!(walk(&scene, &config).nodes.len(), 3);

    config.use_export_selected = true;
    let w = walk(&scene, &config);
    assert!(w.contains(a) && !w.contains(b));

    config.use_export_selected = false;
    config.object_types.remove(&ObjectKind::Empty);
    assert!(walk(&scene, &config).is_empty());
}

#[test]
fn test_excluded_parent_keeps_world_transform() {
    use cgmath::{vec3, Transform, Point3};
    use scene::{Rotation, Trs};

    let mut scene = Scene::new();
    let root = obj(&mut scene, "root", None);
    let mid = obj(&mut scene, "mid", Some(root));
    let leaf = obj(&mut scene, "leaf", Some(mid));
    scene.objects[root].transform = Trs::from_location(1.0, 0.0, 0.0);
    scene.objects[mid].transform = Trs {
        location: vec3(0.0, 2.0, 0.0),
        rotation: Rotation::Euler([0.0, 0.0, 1.0]),
        scale: vec3(2.0, 2.0, 2.0),
    };
    scene.objects[leaf].transform = Trs::from_location(0.0, 0.0, 3.0);
    scene.objects[mid].visible = false;

    let w = walk(&scene, &ExportConfig::default());
    let node = w.get(leaf).unwrap();
    assert_eq!(node.parent, Some(root));
    assert!(node.reparented);

    let exported_world = scene.objects[root].transform.matrix() * node.local;
    let p = Point3::new(0.5, -0.25, 1.0);
    let expected = scene.world_matrix(leaf).transform_point(p);
    let got = exported_world.transform_point(p);
    assert!((expected.x - got.x).abs() < 1e-9);
    assert!((expected.y - got.y).abs() < 1e-9);
    assert!((expected.z - got.z).abs() < 1e-9);
}

#[test]
fn test_unsupported_objects_are_skipped() {
    use scene::ObjectData;
    let mut scene = Scene::new();
    let speaker = scene.add_object(SceneObject::new("speaker", ObjectData::Unsupported("SPEAKER".into())));
    let child = obj(&mut scene, "child", Some(speaker));
    let w = walk(&scene, &ExportConfig::default());
    assert!(!w.contains(speaker));
    assert_eq!(w.get(child).unwrap().parent, None);
}
