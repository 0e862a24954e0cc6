use cgmath::Matrix4;

/// Slightly perturb a matrix's diagonal to create a non-singular matrix.
///
/// For example, a bone or object scaled to zero (to eg. hide part of a mesh)
/// has no inverse, but COLLADA wants inverse bind matrices and we need one to
/// re-express a child relative to a new parent. This makes a matrix that
/// "hides" it by making it very small instead.
pub fn make_invertible(m: &Matrix4<f64>) -> Matrix4<f64> {
    use cgmath::{SquareMatrix, One};

    if m.is_invertible() {
        return *m;
    }

    for &epsilon in &[0.000001, 0.00001, 0.0001, 0.001f64] {
        let m2 = m + Matrix4::from_scale(epsilon);
        if m2.is_invertible() {
            return m2;
        }
    }

    warn!("found singular matrix where an invertible one is required; \
        proceeding with the identity. The result may look wrong.");
    debug!("namely, the matrix {:#?}", m);
    Matrix4::one()
}

/// Inverse of `m`, going through `make_invertible` first.
pub fn invert(m: &Matrix4<f64>) -> Matrix4<f64> {
    use cgmath::{SquareMatrix, One};
    make_invertible(m).invert().unwrap_or_else(Matrix4::one)
}

#[test]
fn test_make_invertible() {
    use cgmath::{SquareMatrix, Zero, vec3};

    let m = Matrix4::from_translation(vec3(1.0, 2.0, 3.0));
    assert_eq!(make_invertible(&m), m);

    let zero = Matrix4::zero();
    let fixed = make_invertible(&zero);
    assert!(fixed.is_invertible());
    assert!(fixed.x.x < 0.01);

    let flat = Matrix4::from_nonuniform_scale(1.0, 1.0, 0.0);
    assert!(invert(&flat).is_invertible());
}
