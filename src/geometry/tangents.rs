//! Tangent/binormal generation.

use cgmath::{InnerSpace, Vector3, vec3};

/// Computes a (tangent, binormal) pair for every vertex.
///
/// `triangles` index into `positions`, `normals` and `uvs`. Per-triangle
/// tangents from the UV deltas are summed onto each corner's vertex, then
/// made orthogonal to the normal. The binormal is `n x t` with the sign that
/// matches the UV layout (so mirrored UVs get a flipped binormal).
pub fn compute(
    positions: &[[f32; 3]],
    normals: &[[f32; 3]],
    uvs: &[[f32; 2]],
    triangles: &[[u32; 3]],
) -> Vec<([f32; 3], [f32; 3])> {
    let n = positions.len();
    let mut tan = vec![vec3(0.0, 0.0, 0.0); n];
    let mut bitan = vec![vec3(0.0, 0.0, 0.0); n];

    for tri in triangles {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let p0 = v3(positions[i0]);
        let e1 = v3(positions[i1]) - p0;
        let e2 = v3(positions[i2]) - p0;
        let du1 = (uvs[i1][0] - uvs[i0][0]) as f64;
        let dv1 = (uvs[i1][1] - uvs[i0][1]) as f64;
        let du2 = (uvs[i2][0] - uvs[i0][0]) as f64;
        let dv2 = (uvs[i2][1] - uvs[i0][1]) as f64;

        let det = du1 * dv2 - du2 * dv1;
        if det.abs() < 1e-12 {
            continue;
        }
        let r = 1.0 / det;
        let t = (e1 * dv2 - e2 * dv1) * r;
        let b = (e2 * du1 - e1 * du2) * r;
        for &i in &[i0, i1, i2] {
            tan[i] += t;
            bitan[i] += b;
        }
    }

    (0..n).map(|i| {
        let normal = v3(normals[i]);
        let normal = if normal.magnitude2() > 0.0 { normal.normalize() } else { vec3(0.0, 0.0, 1.0) };

        // Gram-Schmidt
        let mut t = tan[i] - normal * normal.dot(tan[i]);
        if t.magnitude2() < 1e-20 {
            t = any_perpendicular(normal);
        }
        let t = t.normalize();
        let handedness = if normal.cross(t).dot(bitan[i]) < 0.0 { -1.0 } else { 1.0 };
        let b = normal.cross(t) * handedness;
        (f3(t), f3(b))
    }).collect()
}

fn v3(a: [f32; 3]) -> Vector3<f64> {
    vec3(a[0] as f64, a[1] as f64, a[2] as f64)
}

fn f3(v: Vector3<f64>) -> [f32; 3] {
    [v.x as f32, v.y as f32, v.z as f32]
}

fn any_perpendicular(n: Vector3<f64>) -> Vector3<f64> {
    let axis = if n.x.abs() < 0.9 { vec3(1.0, 0.0, 0.0) } else { vec3(0.0, 1.0, 0.0) };
    axis - n * n.dot(axis)
}

#[test]
fn test_quad_in_xy_plane() {
    let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]];
    let normals = [[0.0, 0.0, 1.0]; 4];
    let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
    let tris = [[0, 1, 2], [0, 2, 3]];
    let out = compute(&positions, &normals, &uvs, &tris);
    for &(t, b) in &out {
        assert!((t[0] - 1.0).abs() < 1e-6 && t[1].abs() < 1e-6 && t[2].abs() < 1e-6);
        assert!((b[1] - 1.0).abs() < 1e-6 && b[0].abs() < 1e-6 && b[2].abs() < 1e-6);
    }

    // Flip U: tangent follows U, binormal keeps following V.
    let mirrored_uvs = [[1.0, 0.0], [0.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
    let out = compute(&positions, &normals, &mirrored_uvs, &tris);
    for &(t, b) in &out {
        assert!((t[0] + 1.0).abs() < 1e-6);
        assert!((b[1] - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_orthonormal() {
    let positions = [[0.0, 0.0, 0.0], [2.0, 0.0, 0.5], [0.0, 1.0, 0.3]];
    let normals = [[0.1, 0.2, 0.9]; 3];
    let uvs = [[0.0, 0.0], [0.7, 0.1], [0.2, 0.9]];
    let out = compute(&positions, &normals, &uvs, &[[0, 1, 2]]);
    let n = v3(normals[0]).normalize();
    for &(t, b) in &out {
        let (t, b) = (v3(t), v3(b));
        assert!(t.dot(n).abs() < 1e-5);
        assert!(b.dot(n).abs() < 1e-5);
        assert!(t.dot(b).abs() < 1e-5);
        assert!((t.magnitude() - 1.0).abs() < 1e-5);
    }
}
