//! Document-wide identifiers.
//!
//! Every element that something else refers to gets its ID from here. The ID
//! for an (entity, role) pair is made once, from the entity's name, and then
//! handed back unchanged for every later reference, so the `url`/`source`
//! attributes always agree with the `id` they point at.

use scene::{ActionId, ImageId, MaterialId, ObjectData, ObjectId, Scene};
use std::collections::HashMap;
use util::name::IdFmt;
use util::UniqueNamer;

/// Something in the scene that gets written to the document.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Entity {
    Object(ObjectId),
    /// (armature object, bone index)
    Bone(ObjectId, usize),
    /// (mesh object, shape key index)
    ShapeKey(ObjectId, usize),
    /// (curve object, spline index)
    Spline(ObjectId, usize),
    Material(MaterialId),
    Image(ImageId),
    Action(ActionId),
    VisualScene,
}

/// What an element is for. The same entity usually shows up in several
/// roles (a mesh object is a node, a geometry and maybe a skin).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Node,
    Geometry,
    Skin,
    Morph,
    Camera,
    Light,
    Effect,
    Material,
    Image,
    Animation,
    Clip,
    VisualScene,
}

impl Role {
    pub fn suffix(self) -> &'static str {
        match self {
            Role::Node => "",
            Role::Geometry => "-mesh",
            Role::Skin => "-skin",
            Role::Morph => "-morph",
            Role::Camera => "-camera",
            Role::Light => "-light",
            Role::Effect => "-effect",
            Role::Material => "-material",
            Role::Image => "-image",
            Role::Animation => "-anim",
            Role::Clip => "",
            Role::VisualScene => "",
        }
    }
}

pub struct IdRegistry<'a> {
    scene: &'a Scene,
    namer: UniqueNamer,
    ids: HashMap<(Entity, Role), String>,
}

impl<'a> IdRegistry<'a> {
    pub fn new(scene: &'a Scene) -> IdRegistry<'a> {
        IdRegistry { scene, namer: UniqueNamer::new(), ids: HashMap::new() }
    }

    /// The ID for `entity` in `role`, made on first use.
    pub fn assign(&mut self, entity: Entity, role: Role) -> String {
        if let Some(id) = self.ids.get(&(entity, role)) {
            return id.clone();
        }
        let desired = format!("{}{}", IdFmt(&self.entity_name(entity)), role.suffix());
        let id = self.namer.get_fresh_name(desired);
        self.ids.insert((entity, role), id.clone());
        id
    }

    /// Looks up an ID without making one.
    pub fn get(&self, entity: Entity, role: Role) -> Option<&str> {
        self.ids.get(&(entity, role)).map(|s| s.as_str())
    }

    /// A fresh ID for an element that belongs to another one, like the
    /// `<source>`s of a geometry (`Cube-mesh-positions`). Unlike `assign`
    /// every call makes a new ID.
    pub fn sub(&mut self, owner: &str, what: &str) -> String {
        self.namer.get_fresh_name(format!("{}-{}", owner, what))
    }

    /// The (unsanitized) name an entity's IDs are made from.
    pub fn entity_name(&self, entity: Entity) -> String {
        let scene = self.scene;
        match entity {
            Entity::Object(o) => scene.objects[o].name.clone(),
            Entity::Bone(o, b) => match scene.objects[o].data {
                ObjectData::Armature(ref arm) => arm.bones[b].name.clone(),
                _ => format!("{}-bone{}", scene.objects[o].name, b),
            },
            Entity::ShapeKey(o, k) => match scene.objects[o].data {
                ObjectData::Mesh(ref mesh) if k < mesh.shape_keys.len() =>
                    format!("{}-{}", scene.objects[o].name, mesh.shape_keys[k].name),
                _ => format!("{}-key{}", scene.objects[o].name, k),
            },
            Entity::Spline(o, i) => format!("{}-spline{}", scene.objects[o].name, i),
            Entity::Material(m) => scene.materials[m].name.clone(),
            Entity::Image(i) => scene.images[i].name.clone(),
            Entity::Action(a) => scene.actions[a].name.clone(),
            Entity::VisualScene => "Scene".to_string(),
        }
    }
}

#[cfg(test)]
fn test_scene() -> Scene {
    use scene::{Material, SceneObject};
    let mut scene = Scene::new();
    scene.add_object(SceneObject::new("Cube", ObjectData::Empty));
    scene.add_object(SceneObject::new("Cube", ObjectData::Empty));
    scene.add_object(SceneObject::new("my cube", ObjectData::Empty));
    scene.add_object(SceneObject::new("my#cube", ObjectData::Empty));
    scene.add_object(SceneObject::new("", ObjectData::Empty));
    scene.materials.push(Material::new("Cube"));
    scene
}

#[test]
fn test_assign_is_idempotent() {
    let scene = test_scene();
    let mut ids = IdRegistry::new(&scene);
    let a = ids.assign(Entity::Object(0), Role::Node);
    assert_eq!(a, "Cube");
    assert_eq!(ids.assign(Entity::Object(0), Role::Node), a);
    assert_eq!(ids.get(Entity::Object(0), Role::Node), Some("Cube"));
    assert_eq!(ids.assign(Entity::Object(0), Role::Geometry), "Cube-mesh");
    assert_eq!(ids.get(Entity::Object(1), Role::Node), None);
}

#[test]
fn test_collisions() {
    let scene = test_scene();
    let mut ids = IdRegistry::new(&scene);
    assert_eq!(ids.assign(Entity::Object(0), Role::Node), "Cube");
    assert_eq!(ids.assign(Entity::Object(1), Role::Node), "Cube1");
    // Both sanitize to "my_cube"
    assert_eq!(ids.assign(Entity::Object(2), Role::Node), "my_cube");
    assert_eq!(ids.assign(Entity::Object(3), Role::Node), "my_cube1");
    assert_eq!(ids.assign(Entity::Object(4), Role::Node), "_");
    // Same name, different role suffix: no collision
    assert_eq!(ids.assign(Entity::Material(0), Role::Material), "Cube-material");
    assert_eq!(ids.assign(Entity::Material(0), Role::Effect), "Cube-effect");

    let s1 = ids.sub("Cube-mesh", "positions");
    let s2 = ids.sub("Cube-mesh", "positions");
    assert_eq!(s1, "Cube-mesh-positions");
    assert_ne!(s1, s2);
}
