//! Modifier evaluation.
//!
//! Modifiers are applied to a copy of the mesh; the scene is never touched.
//! Shape keys ride along through every modifier so morph targets still line
//! up with the evaluated base mesh.

use cgmath::{Matrix, Matrix3, Matrix4, Point3, SquareMatrix, Transform, Vector3, Zero};
use config::ExportConfig;
use scene::{ArmatureData, MeshData, Modifier, ObjectData, ObjectId, Scene};
use util::make_invertible::invert;

/// The mesh of object `id` with its modifier stack applied (or not) as the
/// config says.
pub fn evaluate(scene: &Scene, id: ObjectId, mesh: &MeshData, config: &ExportConfig) -> MeshData {
    let mut out = mesh.clone();
    if !config.use_mesh_modifiers {
        return out;
    }
    for modifier in &mesh.modifiers {
        match *modifier {
            Modifier::Armature { object } => {
                if config.use_exclude_armature_modifier {
                    continue;
                }
                match scene.objects[object].data {
                    ObjectData::Armature(ref arm) => {
                        let to_arm = invert(&scene.world_matrix(object)) * scene.world_matrix(id);
                        apply_armature(&mut out, arm, &to_arm);
                    }
                    _ => warn!("object {}: armature modifier doesn't point at an armature",
                        scene.objects[id].name),
                }
            }
            Modifier::Mirror { axes } => {
                for axis in 0..3 {
                    if axes[axis] {
                        apply_mirror(&mut out, axis);
                    }
                }
            }
        }
    }
    // Everything that can be applied has been.
    out.modifiers.retain(|m| match *m {
        Modifier::Armature { .. } => config.use_exclude_armature_modifier,
        Modifier::Mirror { .. } => false,
    });
    out
}

fn to_point(a: [f32; 3]) -> Point3<f64> {
    Point3::new(a[0] as f64, a[1] as f64, a[2] as f64)
}

fn to_vector(a: [f32; 3]) -> Vector3<f64> {
    Vector3::new(a[0] as f64, a[1] as f64, a[2] as f64)
}

fn from_point(p: Point3<f64>) -> [f32; 3] {
    [p.x as f32, p.y as f32, p.z as f32]
}

fn from_vector(v: Vector3<f64>) -> [f32; 3] {
    [v.x as f32, v.y as f32, v.z as f32]
}

/// Deform by the armature's current pose. `to_arm` takes mesh space to
/// armature space.
fn apply_armature(mesh: &mut MeshData, arm: &ArmatureData, to_arm: &Matrix4<f64>) {
    let rest = arm.rest_matrices();
    let posed = arm.chain_matrices(|b| b.rest * b.pose.matrix());
    let from_arm = invert(to_arm);

    // Vertex group -> the deforming bone with that name.
    let group_bones: Vec<Option<usize>> = mesh.vertex_groups.iter()
        .map(|g| arm.bone_by_name(g).filter(|&b| arm.bones[b].deform))
        .collect();
    let skinning: Vec<Matrix4<f64>> = (0..arm.bones.len())
        .map(|b| posed[b] * invert(&rest[b]))
        .collect();

    let mut vertex_mats = Vec::with_capacity(mesh.vertices.len());
    for v in &mesh.vertices {
        let mut total = 0.0;
        let mut m = Matrix4::zero();
        for gw in &v.groups {
            if let Some(b) = group_bones.get(gw.group).cloned().and_then(|b| b) {
                if gw.weight > 0.0 {
                    m = m + skinning[b] * gw.weight as f64;
                    total += gw.weight as f64;
                }
            }
        }
        let m = if total > 0.0 {
            from_arm * (m * (1.0 / total)) * to_arm
        } else {
            Matrix4::from_scale(1.0)
        };
        vertex_mats.push(m);
    }

    for (v, m) in mesh.vertices.iter_mut().zip(&vertex_mats) {
        v.co = from_point(m.transform_point(to_point(v.co)));
    }
    for key in &mut mesh.shape_keys {
        for (p, m) in key.points.iter_mut().zip(&vertex_mats) {
            *p = if key.relative {
                from_vector(m.transform_vector(to_vector(*p)))
            } else {
                from_point(m.transform_point(to_point(*p)))
            };
        }
    }
    if let Some(ref mut normals) = mesh.custom_normals {
        let mut corner = 0;
        for poly in &mesh.polygons {
            for &vi in &poly.vertices {
                let m = &vertex_mats[vi];
                let lin = Matrix3::from_cols(m.x.truncate(), m.y.truncate(), m.z.truncate());
                let normal_mat = lin.invert().map(|i| i.transpose()).unwrap_or(lin);
                let n = normal_mat * to_vector(normals[corner]);
                let len = (n.x * n.x + n.y * n.y + n.z * n.z).sqrt();
                if len > 0.0 {
                    normals[corner] = from_vector(n / len);
                }
                corner += 1;
            }
        }
    }
}

/// Add a copy of the mesh reflected across the plane `axis = 0`.
fn apply_mirror(mesh: &mut MeshData, axis: usize) {
    let nv = mesh.vertices.len();

    let mirrored: Vec<_> = mesh.vertices.iter()
        .map(|v| {
            let mut v = v.clone();
            v.co[axis] = -v.co[axis];
            v
        })
        .collect();
    mesh.vertices.extend(mirrored);

    // Reflection flips orientation, so reverse each polygon to keep it
    // facing outwards. Corner data gets reversed the same way.
    let starts = mesh.corner_starts();
    let mirrored_polys: Vec<_> = mesh.polygons.iter()
        .map(|p| {
            let mut p = p.clone();
            p.vertices.reverse();
            for v in &mut p.vertices {
                *v += nv;
            }
            p
        })
        .collect();
    let mirror_corners = |polys: &[::scene::Polygon]| -> Vec<usize> {
        let mut order = vec![];
        for (p, &start) in polys.iter().zip(&starts) {
            for i in (0..p.vertices.len()).rev() {
                order.push(start + i);
            }
        }
        order
    };
    let corner_order = mirror_corners(&mesh.polygons);
    mesh.polygons.extend(mirrored_polys);

    for layer in &mut mesh.uv_layers {
        let extra: Vec<_> = corner_order.iter().map(|&c| layer.data[c]).collect();
        layer.data.extend(extra);
    }
    for layer in &mut mesh.color_layers {
        let extra: Vec<_> = corner_order.iter().map(|&c| layer.data[c]).collect();
        layer.data.extend(extra);
    }
    if let Some(ref mut normals) = mesh.custom_normals {
        let extra: Vec<_> = corner_order.iter()
            .map(|&c| {
                let mut n = normals[c];
                n[axis] = -n[axis];
                n
            })
            .collect();
        normals.extend(extra);
    }
    // A reflection is linear, so offsets and absolute positions mirror the
    // same way.
    for key in &mut mesh.shape_keys {
        let extra: Vec<_> = key.points.iter()
            .map(|&p| {
                let mut p = p;
                p[axis] = -p[axis];
                p
            })
            .collect();
        key.points.extend(extra);
    }
}

#[cfg(test)]
fn config_with_modifiers() -> ExportConfig {
    let mut config = ExportConfig::default();
    config.use_mesh_modifiers = true;
    config
}

#[test]
fn test_mirror() {
    use scene::{CornerLayer, SceneObject, ShapeKey};

    let mut mesh = MeshData::from_faces(&[[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [1.0, 1.0, 0.0]], &[&[0, 1, 2]]);
    mesh.uv_layers.push(CornerLayer { name: "uv".into(), data: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]] });
    mesh.shape_keys.push(ShapeKey {
        name: "up".into(),
        relative: true,
        points: vec![[0.5, 0.0, 1.0]; 3],
        value: 0.0,
    });
    mesh.modifiers.push(Modifier::Mirror { axes: [true, false, false] });

    let mut scene = Scene::new();
    let id = scene.add_object(SceneObject::new("m", ObjectData::Mesh(mesh.clone())));

    // Without use_mesh_modifiers nothing happens.
    let plain = evaluate(&scene, id, &mesh, &ExportConfig::default());
    assert_eq!(plain.vertices.len(), 3);

    let out = evaluate(&scene, id, &mesh, &config_with_modifiers());
    assert_eq!(out.vertices.len(), 6);
    assert_eq!(out.vertices[3].co, [-1.0, 0.0, 0.0]);
    assert_eq!(out.polygons[1].vertices, vec![5, 4, 3]);
    let mirrored_uvs: Vec<[f32; 2]> = vec![[0.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
    assert_eq!(out.uv_layers[0].data[3..].to_vec(), mirrored_uvs);
    assert_eq!(out.shape_keys[0].points[4], [-0.5, 0.0, 1.0]);
    assert!(out.modifiers.is_empty());
    // The scene's mesh is untouched.
    match scene.objects[id].data {
        ObjectData::Mesh(ref m) => assert_eq!(m.vertices.len(), 3),
        _ => unreachable!(),
    }
}

#[test]
fn test_armature_deform() {
    use cgmath::vec3;
    use scene::{Bone, GroupWeight, SceneObject, Trs};
    use smallvec::SmallVec;

    let mut bone = Bone::new("b", None, Matrix4::from_translation(vec3(0.0, 0.0, 1.0)));
    bone.pose = Trs::from_location(0.0, 2.0, 0.0);
    let mut scene = Scene::new();
    let arm = scene.add_object(SceneObject::new("rig", ObjectData::Armature(ArmatureData { bones: vec![bone] })));

    let mut mesh = MeshData::from_faces(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[&[0, 1, 2]]);
    mesh.vertex_groups.push("b".into());
    let mut groups = SmallVec::new();
    groups.push(GroupWeight { group: 0, weight: 0.5 });
    mesh.vertices[0].groups = groups;
    mesh.modifiers.push(Modifier::Armature { object: arm });
    let id = scene.add_object(SceneObject::new("m", ObjectData::Mesh(mesh.clone())));

    let mut config = config_with_modifiers();
    let skipped = evaluate(&scene, id, &mesh, &config);
    assert_eq!(skipped.vertices[0].co, [0.0, 0.0, 0.0]);
    assert_eq!(skipped.modifiers.len(), 1);

    config.use_exclude_armature_modifier = false;
    let out = evaluate(&scene, id, &mesh, &config);
    // Weight is normalized, so the vertex follows the bone fully.
    assert_eq!(out.vertices[0].co, [0.0, 2.0, 0.0]);
    // Ungrouped vertices stay put.
    assert_eq!(out.vertices[1].co, [1.0, 0.0, 0.0]);
    assert!(out.modifiers.is_empty());
}
