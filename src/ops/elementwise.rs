//! Element-wise post-operations applied by kernel epilogues.
//!
//! A post-op sees each finished output value once, in `f64`, before the
//! final narrowing cast. Domain-specific operations (bias, activations) are
//! supplied by callers; this module only ships the trivial ones.

use core::fmt;

/// Maps a finished accumulator value `x` to the stored value `y`.
///
/// Blocks run on the `rayon` pool and may call `apply` concurrently.
pub trait ElementwiseOp: Sync {
    /// Writes `op(x)` into `y`.
    fn apply(&self, y: &mut f64, x: f64);

    /// Whether `apply` is the identity. Lets backends skip the epilogue.
    fn is_identity(&self) -> bool {
        false
    }
}

/// `y = x`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassThrough;

impl ElementwiseOp for PassThrough {
    fn apply(&self, y: &mut f64, x: f64) {
        *y = x;
    }

    fn is_identity(&self) -> bool {
        true
    }
}

/// `y = alpha · x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale(pub f64);

impl ElementwiseOp for Scale {
    fn apply(&self, y: &mut f64, x: f64) {
        *y = self.0 * x;
    }
}

/// Adapts a closure `Fn(f64) -> f64` into a post-op.
///
/// # Example
/// ```
/// use tile_kernels::ops::elementwise::{ElementwiseOp, FnOp};
/// let relu = FnOp(|x: f64| x.max(0.0));
/// let mut y = 0.0;
/// relu.apply(&mut y, -3.0);
/// assert_eq!(y, 0.0);
/// ```
#[derive(Clone, Copy)]
pub struct FnOp<F>(pub F);

impl<F: Fn(f64) -> f64 + Sync> ElementwiseOp for FnOp<F> {
    fn apply(&self, y: &mut f64, x: f64) {
        *y = (self.0)(x);
    }
}

impl<F> fmt::Debug for FnOp<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnOp(..)")
    }
}

/// Applies `op` to `x`, starting from `y = 0`.
pub(crate) fn finish(op: &dyn ElementwiseOp, x: f64) -> f64 {
    let mut y = 0.0;
    op.apply(&mut y, x);
    y
}
