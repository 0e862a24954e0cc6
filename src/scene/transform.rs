use cgmath::{Matrix4, One, Quaternion, Rad, Vector3, vec3};

/// A location/rotation/scale triple, composed as T * R * S.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Trs {
    pub location: Vector3<f64>,
    pub rotation: Rotation,
    pub scale: Vector3<f64>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Rotation {
    /// XYZ Euler angles in radians (X applied first).
    Euler([f64; 3]),
    Quaternion(Quaternion<f64>),
}

impl Trs {
    pub fn identity() -> Trs {
        Trs {
            location: vec3(0.0, 0.0, 0.0),
            rotation: Rotation::Euler([0.0; 3]),
            scale: vec3(1.0, 1.0, 1.0),
        }
    }

    pub fn from_location(x: f64, y: f64, z: f64) -> Trs {
        Trs { location: vec3(x, y, z), ..Trs::identity() }
    }

    pub fn matrix(&self) -> Matrix4<f64> {
        Matrix4::from_translation(self.location)
            * self.rotation.matrix()
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

impl Default for Trs {
    fn default() -> Trs {
        Trs::identity()
    }
}

impl Rotation {
    pub fn matrix(&self) -> Matrix4<f64> {
        match *self {
            Rotation::Euler([x, y, z]) => {
                Matrix4::from_angle_z(Rad(z))
                    * Matrix4::from_angle_y(Rad(y))
                    * Matrix4::from_angle_x(Rad(x))
            }
            Rotation::Quaternion(q) => {
                let mag2 = q.s * q.s + q.v.x * q.v.x + q.v.y * q.v.y + q.v.z * q.v.z;
                if mag2 == 0.0 {
                    Matrix4::one()
                } else {
                    Matrix4::from(q * (1.0 / mag2.sqrt()))
                }
            }
        }
    }
}

#[test]
fn test_trs_order() {
    use cgmath::{Point3, Transform};

    // Scale, then rotate a quarter turn about Z, then translate.
    let trs = Trs {
        location: vec3(10.0, 0.0, 0.0),
        rotation: Rotation::Euler([0.0, 0.0, ::std::f64::consts::FRAC_PI_2]),
        scale: vec3(2.0, 2.0, 2.0),
    };
    let p = trs.matrix().transform_point(Point3::new(1.0, 0.0, 0.0));
    assert!((p.x - 10.0).abs() < 1e-9);
    assert!((p.y - 2.0).abs() < 1e-9);
    assert!(p.z.abs() < 1e-9);
}

#[test]
fn test_quaternion_is_normalized() {
    let half = Rotation::Quaternion(Quaternion::new(2.0, 0.0, 0.0, 0.0));
    assert_eq!(half.matrix(), Matrix4::one());
}
