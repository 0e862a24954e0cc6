//! Keyframe reduction.

/// Picks which samples of a channel to keep.
///
/// `values[i]` holds the components of sample `i` (16 for a matrix, 1 for a
/// weight). A sample is dropped when linearly interpolating between the kept
/// samples on either side of it reproduces every component to within
/// `tolerance`. The scan is greedy: from each kept anchor it extends the
/// segment as far as the bound holds, so the guarantee is about the final
/// set of kept samples, not just immediate neighbours. The first and last
/// samples are always kept.
pub fn reduce(times: &[f64], values: &[&[f64]], tolerance: f64) -> Vec<usize> {
    let n = times.len();
    if n <= 2 {
        return (0..n).collect();
    }

    let mut kept = vec![0];
    let mut anchor = 0;
    let mut end = 2;
    while end < n {
        if segment_fits(times, values, anchor, end, tolerance) {
            end += 1;
        } else {
            anchor = end - 1;
            kept.push(anchor);
            end = anchor + 2;
        }
    }
    kept.push(n - 1);
    kept
}

/// Whether every sample strictly between `a` and `b` lies within `tolerance`
/// of the line from `a` to `b`.
fn segment_fits(times: &[f64], values: &[&[f64]], a: usize, b: usize, tolerance: f64) -> bool {
    let span = times[b] - times[a];
    (a + 1..b).all(|k| {
        let t = if span > 0.0 { (times[k] - times[a]) / span } else { 0.0 };
        values[k].iter().enumerate().all(|(c, &v)| {
            let lerp = values[a][c] + (values[b][c] - values[a][c]) * t;
            (v - lerp).abs() <= tolerance
        })
    })
}

#[cfg(test)]
fn check_bound(times: &[f64], values: &[f64], kept: &[usize], tolerance: f64) {
    for w in kept.windows(2) {
        let (a, b) = (w[0], w[1]);
        for k in a + 1..b {
            let t = (times[k] - times[a]) / (times[b] - times[a]);
            let lerp = values[a] + (values[b] - values[a]) * t;
            assert!((values[k] - lerp).abs() <= tolerance);
        }
    }
}

#[test]
fn test_straight_line_collapses() {
    let times: Vec<f64> = (0..10).map(|f| f as f64 / 24.0).collect();
    let vals: Vec<f64> = (0..10).map(|f| 2.0 * f as f64).collect();
    let values: Vec<&[f64]> = vals.iter().map(|v| ::std::slice::from_ref(v)).collect();
    assert_eq!(reduce(&times, &values, 1e-6), vec![0, 9]);
}

#[test]
fn test_corner_kept() {
    let times: Vec<f64> = (0..9).map(|f| f as f64).collect();
    let vals = [0.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0, 1.0, 0.0];
    let values: Vec<&[f64]> = vals.iter().map(|v| ::std::slice::from_ref(v)).collect();
    let kept = reduce(&times, &values, 1e-6);
    assert_eq!(kept, vec![0, 4, 8]);
}

#[test]
fn test_tolerance_bound_holds() {
    let times: Vec<f64> = (0..60).map(|f| f as f64 / 30.0).collect();
    let vals: Vec<f64> = times.iter().map(|t| (t * 3.0).sin()).collect();
    let values: Vec<&[f64]> = vals.iter().map(|v| ::std::slice::from_ref(v)).collect();
    for &tol in &[1e-1, 1e-3, 1e-6] {
        let kept = reduce(&times, &values, tol);
        assert_eq!(kept[0], 0);
        assert_eq!(*kept.last().unwrap(), 59);
        check_bound(&times, &vals, &kept, tol);
    }
    // Looser tolerance never keeps more.
    assert!(reduce(&times, &values, 1e-1).len() <= reduce(&times, &values, 1e-3).len());
}

#[test]
fn test_all_components_checked() {
    let times = [0.0, 1.0, 2.0];
    let a = [0.0, 0.0];
    let b = [1.0, 5.0];
    let c = [2.0, 0.0];
    let values: Vec<&[f64]> = vec![&a[..], &b[..], &c[..]];
    // First component is linear, second isn't.
    assert_eq!(reduce(&times, &values, 1e-6), vec![0, 1, 2]);
}

#[test]
fn test_short_channels() {
    let one = [1.0];
    let values: Vec<&[f64]> = vec![&one[..]];
    assert_eq!(reduce(&[0.0], &values, 1e-6), vec![0]);
    assert_eq!(reduce(&[], &[], 1e-6), Vec::<usize>::new());
}
