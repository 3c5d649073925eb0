use ndarray::{Array2, ArrayView1};

/// Sigmoid inputs are clamped to this magnitude so `exp` stays finite in f32.
pub const SIGMOID_INPUT_LIMIT: f32 = 80.0;

/// Distance kept between a sigmoid output and the ends of (0, 1).
///
/// In f32, `1 / (1 + e^{-x})` rounds to exactly 1.0 for x above ~16.6.
pub const SIGMOID_OUTPUT_MARGIN: f32 = f32::EPSILON;

/// Logistic sigmoid: 1 / (1 + e^{-x}), always strictly inside (0, 1)
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    let x = x.clamp(-SIGMOID_INPUT_LIMIT, SIGMOID_INPUT_LIMIT);
    (1.0 / (1.0 + (-x).exp())).clamp(SIGMOID_OUTPUT_MARGIN, 1.0 - SIGMOID_OUTPUT_MARGIN)
}

/// Derivative of the sigmoid expressed through its output `s`
#[inline]
pub fn sigmoid_derivative_from_output(s: f32) -> f32 {
    s * (1.0 - s)
}

/// Dot product of a weight row with `values`, treating missing trailing
/// entries of `values` as zero.
///
/// Entries of `values` beyond the row length are ignored.
#[inline]
pub fn padded_dot(row: ArrayView1<f32>, values: &[f32]) -> f32 {
    row.iter().zip(values.iter()).map(|(w, x)| w * x).sum()
}

/// Entry `j` of `values`, or zero when `values` is shorter.
#[inline]
pub fn padded_get(values: &[f32], j: usize) -> f32 {
    values.get(j).copied().unwrap_or(0.0)
}

/// Replace non-finite entries with zero and clamp the rest to `[-limit, limit]`.
pub fn clamp_finite(grads: &mut Array2<f32>, limit: f32) {
    grads.mapv_inplace(|x| {
        if x.is_finite() {
            x.clamp(-limit, limit)
        } else {
            0.0
        }
    });
}

/// Returns true when every entry is finite.
pub fn all_finite(values: &Array2<f32>) -> bool {
    values.iter().all(|x| x.is_finite())
}
