//! Approximate equality of kernel outputs.
//!
//! Kernels narrow their accumulators to the output type with
//! round-to-nearest-even, so outputs are compared to a wide reference with
//! a tolerance that follows the output [`DataType`]. Distances are mixed
//! relative/absolute: `|a - b| / max(1, |a|, |b|)`.

use crate::dtype::DataType;

/// `|a - b| / max(1, |a|, |b|)`. Non-finite values are only close to
/// themselves.
pub fn relative_error(a: f64, b: f64) -> f64 {
    if a == b || (a.is_nan() && b.is_nan()) {
        return 0.0;
    }
    if !a.is_finite() || !b.is_finite() {
        return f64::INFINITY;
    }
    (a - b).abs() / a.abs().max(b.abs()).max(1.0)
}

/// Largest [`relative_error`] over paired elements; infinite on a length
/// mismatch.
pub fn max_relative_error(actual: &[f64], expected: &[f64]) -> f64 {
    if actual.len() != expected.len() {
        return f64::INFINITY;
    }
    actual
        .iter()
        .zip(expected)
        .map(|(&a, &e)| relative_error(a, e))
        .fold(0.0, f64::max)
}

/// Relative error a kernel writing `dtype` is allowed against an `f64`
/// reference. Integer outputs must match exactly.
pub const fn tolerance(dtype: DataType) -> f64 {
    match dtype {
        DataType::I8 | DataType::I32 => 0.0,
        DataType::F16 => 1e-2,
        DataType::BF16 => 2e-2,
        DataType::F32 => 1e-5,
        DataType::F64 => 1e-12,
    }
}

/// First index where `actual` and `expected` differ by more than the
/// tolerance of `dtype`, with both values.
pub fn first_mismatch(actual: &[f64], expected: &[f64], dtype: DataType) -> Option<(usize, f64, f64)> {
    if actual.len() != expected.len() {
        return Some((actual.len().min(expected.len()), f64::NAN, f64::NAN));
    }
    let tol = tolerance(dtype);
    actual
        .iter()
        .zip(expected)
        .position(|(&a, &e)| relative_error(a, e) > tol)
        .map(|i| (i, actual[i], expected[i]))
}
