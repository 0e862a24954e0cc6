//! Geometry extraction.
//!
//! Turns an evaluated mesh into what a `<geometry>` needs: one table of
//! distinct vertices, where a vertex is a (position, normal, UVs, colors)
//! tuple, and per material slot a list of polygons indexing into it. Since
//! all attributes live in the same table, every `<input>` of a primitive
//! shares offset 0.

pub mod modifiers;
mod tangents;

pub use self::modifiers::evaluate;

use cgmath::{InnerSpace, Vector3, vec3};
use config::ExportConfig;
use errors::{Warning, Warnings};
use scene::{MaterialId, MeshData, ObjectId, Scene};
use smallvec::SmallVec;
use util::InsOrderSet;

pub struct Geometry {
    /// The evaluated mesh the geometry was made from.
    pub mesh: MeshData,
    pub vertices: Vec<OutVertex>,
    /// For each output vertex, the mesh vertex it came from.
    pub source_vertex: Vec<usize>,
    pub uv_layer_names: Vec<String>,
    pub color_layer_names: Vec<String>,
    pub primitives: Vec<Primitive>,
    /// (tangent, binormal) per output vertex, from the first UV layer.
    pub tangents: Option<Vec<([f32; 3], [f32; 3])>>,
    pub morph_targets: Vec<MorphTarget>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uvs: SmallVec<[[f32; 2]; 2]>,
    pub colors: SmallVec<[[f32; 4]; 1]>,
}

/// All the polygons using one material slot.
pub struct Primitive {
    pub material_slot: usize,
    pub material: Option<MaterialId>,
    /// Vertex count of each polygon; all 3s when triangulated.
    pub vcounts: Vec<u32>,
    pub indices: Vec<u32>,
    pub triangulated: bool,
}

/// A shape key as a full set of output vertex positions.
pub struct MorphTarget {
    /// Index into the mesh's shape keys.
    pub key: usize,
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    /// Morph weight when not animated.
    pub weight: f32,
}

impl Geometry {
    pub fn num_polygons(&self) -> usize {
        self.primitives.iter().map(|p| p.vcounts.len()).sum()
    }

    /// Every primitive fan-triangulated, for things that want triangles.
    pub fn triangles(&self) -> Vec<[u32; 3]> {
        let mut tris = vec![];
        for prim in &self.primitives {
            let mut start = 0;
            for &n in &prim.vcounts {
                let poly = &prim.indices[start..start + n as usize];
                for i in 1..poly.len().saturating_sub(1) {
                    tris.push([poly[0], poly[i], poly[i + 1]]);
                }
                start += n as usize;
            }
        }
        tris
    }
}

/// Bit pattern of a float for hashing; -0.0 and 0.0 are the same value.
fn float_key(x: f32) -> u32 {
    if x == 0.0 { 0 } else { x.to_bits() }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct VertexKey(SmallVec<[u32; 16]>);

impl VertexKey {
    /// `source` is the mesh vertex, for meshes where that matters.
    fn new(v: &OutVertex, source: Option<usize>) -> VertexKey {
        let mut k = SmallVec::new();
        if let Some(vi) = source {
            k.push(vi as u32);
        }
        k.extend(v.position.iter().cloned().map(float_key));
        k.extend(v.normal.iter().cloned().map(float_key));
        for uv in &v.uvs {
            k.extend(uv.iter().cloned().map(float_key));
        }
        for c in &v.colors {
            k.extend(c.iter().cloned().map(float_key));
        }
        VertexKey(k)
    }
}

/// Extract the geometry for the mesh object `id`.
pub fn extract(
    scene: &Scene,
    id: ObjectId,
    mesh: &MeshData,
    config: &ExportConfig,
    warnings: &mut Warnings,
) -> Geometry {
    let mesh = evaluate(scene, id, mesh, config);
    let name = &scene.objects[id].name;

    if mesh.polygons.is_empty() {
        warnings.push(Warning::DegenerateGeometry { object: name.clone(), reason: "mesh has no faces" });
    }

    let normals = corner_normals(&mesh);
    let starts = mesh.corner_starts();

    // Skin weights and shape keys belong to mesh vertices, so coincident
    // corners of different mesh vertices must stay apart when those are
    // written.
    let split_by_source = mesh.armature().is_some()
        || (config.use_shape_key_export && !mesh.shape_keys.is_empty());

    // Dedup every corner into the vertex table.
    let mut keys = InsOrderSet::new();
    let mut vertices = vec![];
    let mut source_vertex = vec![];
    let mut corner_index = Vec::with_capacity(normals.len());
    for (poly, &start) in mesh.polygons.iter().zip(&starts) {
        for (i, &vi) in poly.vertices.iter().enumerate() {
            let c = start + i;
            let v = OutVertex {
                position: mesh.vertices[vi].co,
                normal: normals[c],
                uvs: mesh.uv_layers.iter().map(|l| l.data[c]).collect(),
                colors: mesh.color_layers.iter().map(|l| l.data[c]).collect(),
            };
            let before = keys.len();
            let source = if split_by_source { Some(vi) } else { None };
            let idx = keys.insert(VertexKey::new(&v, source));
            if idx == before {
                vertices.push(v);
                source_vertex.push(vi);
            }
            corner_index.push(idx as u32);
        }
    }

    // One primitive per material slot, in slot order.
    let num_slots = mesh.materials.len().max(1);
    let mut primitives = vec![];
    for slot in 0..num_slots {
        let mut prim = Primitive {
            material_slot: slot,
            material: mesh.materials.get(slot).cloned().and_then(|m| m),
            vcounts: vec![],
            indices: vec![],
            triangulated: config.use_triangles,
        };
        for (poly, &start) in mesh.polygons.iter().zip(&starts) {
            if poly.material != slot {
                continue;
            }
            let corners = &corner_index[start..start + poly.vertices.len()];
            if config.use_triangles {
                for i in 1..corners.len().saturating_sub(1) {
                    prim.vcounts.push(3);
                    prim.indices.extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
                }
            } else {
                prim.vcounts.push(corners.len() as u32);
                prim.indices.extend_from_slice(corners);
            }
        }
        if !prim.vcounts.is_empty() {
            primitives.push(prim);
        }
    }

    let mut geom = Geometry {
        uv_layer_names: mesh.uv_layers.iter().map(|l| l.name.clone()).collect(),
        color_layer_names: mesh.color_layers.iter().map(|l| l.name.clone()).collect(),
        mesh,
        vertices,
        source_vertex,
        primitives,
        tangents: None,
        morph_targets: vec![],
    };

    if config.use_tangent_arrays {
        if geom.uv_layer_names.is_empty() {
            debug!("object {}: no UV layer, so no tangents", name);
        } else {
            let positions: Vec<_> = geom.vertices.iter().map(|v| v.position).collect();
            let normals: Vec<_> = geom.vertices.iter().map(|v| v.normal).collect();
            let uvs: Vec<_> = geom.vertices.iter().map(|v| v.uvs[0]).collect();
            geom.tangents = Some(tangents::compute(&positions, &normals, &uvs, &geom.triangles()));
        }
    }

    if config.use_shape_key_export {
        geom.morph_targets = morph_targets(&geom);
    }

    debug!("object {}: {} vertices, {} polygons in {} primitives",
        name, geom.vertices.len(), geom.num_polygons(), geom.primitives.len());

    geom
}

/// Shape keys as absolute output-vertex positions.
fn morph_targets(geom: &Geometry) -> Vec<MorphTarget> {
    let mesh = &geom.mesh;
    mesh.shape_keys.iter().enumerate()
        .map(|(k, key)| {
            let positions = geom.source_vertex.iter()
                .map(|&vi| {
                    let p = key.points[vi];
                    if key.relative {
                        let base = mesh.vertices[vi].co;
                        [base[0] + p[0], base[1] + p[1], base[2] + p[2]]
                    } else {
                        p
                    }
                })
                .collect();
            MorphTarget { key: k, name: key.name.clone(), positions, weight: key.value }
        })
        .collect()
}

fn v3(a: [f32; 3]) -> Vector3<f64> {
    vec3(a[0] as f64, a[1] as f64, a[2] as f64)
}

fn normalized(v: Vector3<f64>) -> [f32; 3] {
    if v.magnitude2() > 0.0 {
        let n = v.normalize();
        [n.x as f32, n.y as f32, n.z as f32]
    } else {
        [0.0, 0.0, 1.0]
    }
}

/// Area-weighted normal of a polygon (Newell's method). The length is twice
/// the area.
fn polygon_normal(mesh: &MeshData, poly: &::scene::Polygon) -> Vector3<f64> {
    let mut n = vec3(0.0, 0.0, 0.0);
    let len = poly.vertices.len();
    for i in 0..len {
        let a = v3(mesh.vertices[poly.vertices[i]].co);
        let b = v3(mesh.vertices[poly.vertices[(i + 1) % len]].co);
        n += a.cross(b);
    }
    n
}

/// A normal for every polygon corner.
fn corner_normals(mesh: &MeshData) -> Vec<[f32; 3]> {
    if let Some(ref custom) = mesh.custom_normals {
        return custom.iter().map(|&n| normalized(v3(n))).collect();
    }

    let face_normals: Vec<_> = mesh.polygons.iter()
        .map(|p| polygon_normal(mesh, p))
        .collect();
    let mut vertex_normals = vec![vec3(0.0, 0.0, 0.0); mesh.vertices.len()];
    for (poly, n) in mesh.polygons.iter().zip(&face_normals) {
        for &vi in &poly.vertices {
            vertex_normals[vi] += *n;
        }
    }

    let mut out = Vec::with_capacity(mesh.num_corners());
    for (poly, n) in mesh.polygons.iter().zip(&face_normals) {
        for &vi in &poly.vertices {
            out.push(if poly.smooth { normalized(vertex_normals[vi]) } else { normalized(*n) });
        }
    }
    out
}

#[cfg(test)]
pub fn cube() -> MeshData {
    MeshData::from_faces(
        &[
            [-1.0, -1.0, -1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0], [-1.0, 1.0, -1.0],
            [-1.0, -1.0, 1.0], [1.0, -1.0, 1.0], [1.0, 1.0, 1.0], [-1.0, 1.0, 1.0],
        ],
        &[
            &[0, 3, 2, 1], &[4, 5, 6, 7], &[0, 1, 5, 4],
            &[1, 2, 6, 5], &[2, 3, 7, 6], &[3, 0, 4, 7],
        ],
    )
}

#[cfg(test)]
fn extract_one(mesh: MeshData, config: &ExportConfig) -> (Geometry, Vec<Warning>) {
    use scene::{ObjectData, SceneObject};
    let mut scene = Scene::new();
    let id = scene.add_object(SceneObject::new("Cube", ObjectData::Mesh(mesh.clone())));
    let mut warnings = Warnings::new();
    let geom = extract(&scene, id, &mesh, config, &mut warnings);
    (geom, warnings.into_vec())
}

#[test]
fn test_cube_triangles() {
    use std::collections::HashSet;
    let mut config = ExportConfig::default();
    config.use_triangles = true;
    let (geom, warnings) = extract_one(cube(), &config);

    assert!(warnings.is_empty());
    assert_eq!(geom.primitives.len(), 1);
    assert_eq!(geom.num_polygons(), 12);
    assert!(geom.primitives[0].vcounts.iter().all(|&n| n == 3));
    let positions: HashSet<_> = geom.vertices.iter()
        .map(|v| v.position.iter().map(|x| x.to_bits()).collect::<Vec<_>>())
        .collect();
    assert_eq!(positions.len(), 8);
    // Flat shading: 6 faces x 4 corners, all distinct
    assert_eq!(geom.vertices.len(), 24);
    // Every index in range
    assert!(geom.primitives[0].indices.iter().all(|&i| (i as usize) < geom.vertices.len()));
}

#[test]
fn test_dedup_matches_distinct_tuples() {
    let mut mesh = cube();
    for p in &mut mesh.polygons {
        p.smooth = true;
    }
    let (geom, _) = extract_one(mesh, &ExportConfig::default());
    // Smooth: one normal per position
    assert_eq!(geom.vertices.len(), 8);
    assert_eq!(geom.primitives[0].vcounts, vec![4; 6]);

    let mut keys = ::std::collections::HashSet::new();
    for v in &geom.vertices {
        assert!(keys.insert(VertexKey::new(v, None)));
    }
    // Normals point away from the center
    for v in &geom.vertices {
        let d: f32 = (0..3).map(|i| v.position[i] * v.normal[i]).sum();
        assert!(d > 0.0);
    }
}

#[test]
fn test_material_slots() {
    use scene::{CornerLayer};
    let mut mesh = cube();
    mesh.materials = vec![Some(0), None, Some(1)];
    mesh.polygons[0].material = 2;
    mesh.polygons[3].material = 2;
    // Slot 1 is unused
    mesh.uv_layers.push(CornerLayer { name: "UVMap".into(), data: vec![[0.0, 0.0]; 24] });

    let (geom, _) = extract_one(mesh, &ExportConfig::default());
    let slots: Vec<_> = geom.primitives.iter().map(|p| p.material_slot).collect();
    assert_eq!(slots, vec![0, 2]);
    assert_eq!(geom.primitives[1].material, Some(1));
    assert_eq!(geom.primitives[1].vcounts.len(), 2);
    assert_eq!(geom.uv_layer_names, vec!["UVMap".to_string()]);
}

#[test]
fn test_no_faces() {
    let mesh = MeshData::from_faces(&[[0.0, 0.0, 0.0]], &[]);
    let (geom, warnings) = extract_one(mesh, &ExportConfig::default());
    assert!(geom.vertices.is_empty());
    assert!(geom.primitives.is_empty());
    match warnings[..] {
        [Warning::DegenerateGeometry { .. }] => (),
        _ => panic!("expected a degenerate geometry warning"),
    }
}

#[test]
fn test_tangent_arrays() {
    use scene::CornerLayer;
    let mut mesh = MeshData::from_faces(
        &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
        &[&[0, 1, 2, 3]],
    );
    mesh.uv_layers.push(CornerLayer { name: "uv".into(), data: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]] });
    let mut config = ExportConfig::default();
    config.use_tangent_arrays = true;
    let (geom, _) = extract_one(mesh, &config);
    let tangents = geom.tangents.unwrap();
    assert_eq!(tangents.len(), geom.vertices.len());
    for &(t, _) in &tangents {
        assert!((t[0] - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_morph_targets() {
    use scene::ShapeKey;
    let mut mesh = cube();
    mesh.shape_keys.push(ShapeKey {
        name: "up".into(),
        relative: true,
        points: vec![[0.0, 0.0, 1.0]; 8],
        value: 0.25,
    });
    let mut config = ExportConfig::default();
    config.use_shape_key_export = true;
    let (geom, _) = extract_one(mesh, &config);
    assert_eq!(geom.morph_targets.len(), 1);
    let target = &geom.morph_targets[0];
    assert_eq!(target.positions.len(), geom.vertices.len());
    for (v, p) in geom.vertices.iter().zip(&target.positions) {
        assert_eq!(p[2], v.position[2] + 1.0);
    }
}

#[cfg(test)]
fn lip_seam() -> MeshData {
    use scene::ShapeKey;
    // Two triangles meeting at the origin, from different mesh vertices
    let mut mesh = MeshData::from_faces(
        &[
            [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, -1.0, 0.0],
        ],
        &[&[0, 1, 2], &[3, 4, 5]],
    );
    mesh.shape_keys.push(ShapeKey {
        name: "open".into(),
        relative: true,
        points: vec![
            [0.0, 0.5, 0.0], [0.0, 0.5, 0.0], [0.0, 0.5, 0.0],
            [0.0, -0.5, 0.0], [0.0, -0.5, 0.0], [0.0, -0.5, 0.0],
        ],
        value: 0.0,
    });
    mesh
}

#[test]
fn test_coincident_seam_kept_apart_for_shape_keys() {
    let mut config = ExportConfig::default();
    config.use_shape_key_export = true;
    let (geom, _) = extract_one(lip_seam(), &config);

    assert_eq!(geom.vertices.len(), 6);
    assert_eq!(geom.source_vertex, vec![0, 1, 2, 3, 4, 5]);
    let opened = &geom.morph_targets[0].positions;
    for (out, &vi) in geom.source_vertex.iter().enumerate() {
        let dy = if vi < 3 { 0.5 } else { -0.5 };
        assert_eq!(opened[out][1], geom.vertices[out].position[1] + dy);
    }
}

#[test]
fn test_coincident_seam_kept_apart_when_skinned() {
    use scene::Modifier;
    let mut mesh = lip_seam();
    mesh.shape_keys.clear();
    mesh.modifiers.push(Modifier::Armature { object: 0 });
    let (geom, _) = extract_one(mesh, &ExportConfig::default());
    assert_eq!(geom.source_vertex, vec![0, 1, 2, 3, 4, 5]);

    // Nothing per-vertex to keep apart: the seam merges.
    let (geom, _) = extract_one(lip_seam(), &ExportConfig::default());
    assert_eq!(geom.vertices.len(), 5);
}
