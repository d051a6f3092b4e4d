//! Hot-loop slice kernels shared by the frame analyzers.
//!
//! Written over `chunks_exact` blocks with scalar tails so the compiler can
//! vectorize them; callers must not assume any particular summation order.

/// Dot product of two equal-length slices.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut acc = [0.0f32; 8];
    let chunks = a.len() / 8;
    for c in 0..chunks {
        let ca = &a[c * 8..c * 8 + 8];
        let cb = &b[c * 8..c * 8 + 8];
        for i in 0..8 {
            acc[i] += ca[i] * cb[i];
        }
    }

    let mut sum: f32 = acc.iter().sum();
    for i in chunks * 8..a.len() {
        sum += a[i] * b[i];
    }
    sum
}

/// Sum of squares of a slice.
#[inline]
pub fn sum_of_squares(x: &[f32]) -> f32 {
    let mut acc = [0.0f32; 8];
    let chunks = x.len() / 8;
    for c in 0..chunks {
        let cx = &x[c * 8..c * 8 + 8];
        for i in 0..8 {
            acc[i] += cx[i] * cx[i];
        }
    }

    let mut sum: f32 = acc.iter().sum();
    for &v in &x[chunks * 8..] {
        sum += v * v;
    }
    sum
}

/// Half-wave rectified difference, squared and summed:
/// `sum(max(0, curr[k] - prev[k])^2)`. This is the spectral flux inner loop.
#[inline]
pub fn hwr_diff_sq_sum(curr: &[f32], prev: &[f32]) -> f32 {
    debug_assert_eq!(curr.len(), prev.len());

    let mut sum = 0.0f32;
    for (c, p) in curr.chunks_exact(8).zip(prev.chunks_exact(8)) {
        for i in 0..8 {
            let d = (c[i] - p[i]).max(0.0);
            sum += d * d;
        }
    }
    let tail = curr.len() - curr.len() % 8;
    for (c, p) in curr[tail..].iter().zip(&prev[tail..]) {
        let d = (c - p).max(0.0);
        sum += d * d;
    }
    sum
}

/// In-place elementwise multiply, used for windowing an analysis frame.
#[inline]
pub fn apply_window(frame: &mut [f32], window: &[f32]) {
    debug_assert_eq!(frame.len(), window.len());
    for (f, w) in frame.iter_mut().zip(window) {
        *f *= w;
    }
}
