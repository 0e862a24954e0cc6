use cgmath::Matrix4;
use std::fmt;

macro_rules! cat_lines {
    ($s:expr) => { concat!($s, "\n") };
    ($s:expr, $($ss:expr),*) => { concat!($s, "\n", cat_lines!($($ss),*)) };
}

macro_rules! write_lines {
    ($dst:expr, $($fmt_strs:expr),*; $($args:tt)*) => {
        write!($dst, cat_lines!($($fmt_strs),*), $($args)*)
    };
}

pub struct FnFmt<F: Fn(&mut fmt::Formatter) -> fmt::Result>(pub F);

impl<F> fmt::Display for FnFmt<F>
where F: Fn(&mut fmt::Formatter) -> fmt::Result {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (&self.0)(f)
    }
}

/// Prints a matrix in row-major order, the way COLLADA wants it.
pub struct Mat<'a>(pub &'a Matrix4<f64>);

impl<'a> fmt::Display for Mat<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {}",
            self.0.x.x, self.0.y.x, self.0.z.x, self.0.w.x,
            self.0.x.y, self.0.y.y, self.0.z.y, self.0.w.y,
            self.0.x.z, self.0.y.z, self.0.z.z, self.0.w.z,
            self.0.x.w, self.0.y.w, self.0.z.w, self.0.w.w,
        )
    }
}

/// Prints the items of a slice separated by single spaces.
pub struct Spaced<'a, T: 'a>(pub &'a [T]);

impl<'a, T: fmt::Display> fmt::Display for Spaced<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, x) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", x)?;
        }
        Ok(())
    }
}

#[test]
fn test_mat_is_row_major() {
    use cgmath::vec3;
    let m = Matrix4::from_translation(vec3(1.0, 2.0, 3.0));
    assert_eq!(Mat(&m).to_string(), "1 0 0 1 0 1 0 2 0 0 1 3 0 0 0 1");
    assert_eq!(Spaced(&[1, 2, 3]).to_string(), "1 2 3");
    assert_eq!(Spaced::<u32>(&[]).to_string(), "");
}
