//! F-curve evaluation.

use scene::{FCurve, Interpolation, Keyframe};

/// Value of an f-curve at `frame`. Outside the keyed range the curve holds
/// its first/last value.
pub fn evaluate(fcurve: &FCurve, frame: f64) -> Option<f64> {
    let keys = &fcurve.keyframes;
    let first = keys.first()?;
    let last = keys.last()?;
    if frame <= first.frame {
        return Some(first.value);
    }
    if frame >= last.frame {
        return Some(last.value);
    }
    // First key after `frame`; there's always one before it too.
    let i = keys.iter().position(|k| k.frame > frame)?;
    Some(segment(&keys[i - 1], &keys[i], frame))
}

/// Interpolation between two neighbouring keys, controlled by the left one.
fn segment(k0: &Keyframe, k1: &Keyframe, frame: f64) -> f64 {
    let span = k1.frame - k0.frame;
    if span <= 0.0 {
        return k1.value;
    }
    match k0.interpolation {
        Interpolation::Constant => k0.value,
        Interpolation::Linear => {
            let t = (frame - k0.frame) / span;
            k0.value + (k1.value - k0.value) * t
        }
        Interpolation::Bezier => bezier(k0, k1, frame),
    }
}

fn cubic(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let s = 1.0 - t;
    s * s * s * p0 + 3.0 * s * s * t * p1 + 3.0 * s * t * t * p2 + t * t * t * p3
}

fn bezier(k0: &Keyframe, k1: &Keyframe, frame: f64) -> f64 {
    // Keep the handles inside the segment so x(t) is monotonic.
    let x0 = k0.frame;
    let x3 = k1.frame;
    let x1 = k0.handle_right[0].max(x0).min(x3);
    let x2 = k1.handle_left[0].max(x0).min(x3);

    // Solve x(t) = frame by bisection.
    let (mut lo, mut hi) = (0.0, 1.0);
    for _ in 0..64 {
        let mid = 0.5 * (lo + hi);
        if cubic(x0, x1, x2, x3, mid) < frame {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let t = 0.5 * (lo + hi);
    cubic(k0.value, k0.handle_right[1], k1.handle_left[1], k1.value, t)
}

#[cfg(test)]
fn curve(keys: Vec<Keyframe>) -> FCurve {
    use scene::{ChannelTarget, Property};
    FCurve::new(ChannelTarget::Object, Property::Location, 0, keys)
}

#[test]
fn test_linear_and_hold() {
    let fc = curve(vec![Keyframe::linear(1.0, 0.0), Keyframe::linear(5.0, 2.0)]);
    assert_eq!(evaluate(&fc, -3.0), Some(0.0));
    assert_eq!(evaluate(&fc, 3.0), Some(1.0));
    assert_eq!(evaluate(&fc, 9.0), Some(2.0));
    assert_eq!(evaluate(&curve(vec![]), 1.0), None);
}

#[test]
fn test_constant() {
    let mut k0 = Keyframe::linear(0.0, 1.0);
    k0.interpolation = Interpolation::Constant;
    let fc = curve(vec![k0, Keyframe::linear(10.0, 5.0)]);
    assert_eq!(evaluate(&fc, 9.9), Some(1.0));
    assert_eq!(evaluate(&fc, 10.0), Some(5.0));
}

#[test]
fn test_bezier() {
    // Handles a third of the way along make the bezier a straight line.
    let mut k0 = Keyframe::linear(0.0, 0.0);
    let mut k1 = Keyframe::linear(3.0, 3.0);
    k0.interpolation = Interpolation::Bezier;
    k0.handle_right = [1.0, 1.0];
    k1.handle_left = [2.0, 2.0];
    let fc = curve(vec![k0, k1]);
    assert!((evaluate(&fc, 1.5).unwrap() - 1.5).abs() < 1e-9);

    // Flat handles ease in and out: symmetric about the midpoint.
    let mut k0 = Keyframe::linear(0.0, 0.0);
    let mut k1 = Keyframe::linear(2.0, 1.0);
    k0.interpolation = Interpolation::Bezier;
    k0.handle_right = [0.7, 0.0];
    k1.handle_left = [1.3, 1.0];
    let fc = curve(vec![k0, k1]);
    assert!((evaluate(&fc, 1.0).unwrap() - 0.5).abs() < 1e-9);
    assert!(evaluate(&fc, 0.2).unwrap() < 0.1);
}
