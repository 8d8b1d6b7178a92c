//! # Kernel Implementations
//!
//! One submodule per operation family, each implementing
//! [`KernelInstance`](crate::kernel::KernelInstance) on top of the shared
//! [pipeline](crate::pipeline) and [planner](crate::planner).
//!
//! ## Submodules
//!
//! - [`gemm`]: plain, split-K and grouped GEMM
//! - [`rmsnorm`]: RMSNorm 2-D forward
//! - [`pool`]: 3-D pooling forward and average-pooling backward
//! - [`smoothquant`]: row-wise smoothing and int8 quantisation
//! - [`elementwise`]: post-ops consumed by every epilogue
//! - [`wgpu`] *(opt-in)*: fp32 GEMM on a GPU through `wgpu`
//!
//! ## Execution Model
//!
//! Every kernel follows the same shape:
//!
//! 1. Validate the launch against the problem and grid.
//! 2. Run all blocks of the grid concurrently on the `rayon` pool. A block
//!    builds a [`TileProgram`](crate::pipeline::TileProgram) and drives it
//!    through [`run_block`](crate::pipeline::run_block).
//! 3. Collect block results in block order, fold split-K partials, apply the
//!    post-op and scatter into the output tensors.
//!
//! Blocks never share staging and never write outputs directly, so each
//! output element is written exactly once after its full reduction.
//!
//! ## Feature Flags
//!
//! - `wgpu`: Enables the GPU GEMM path, selected with
//!   [`set_backend`](crate::backend::set_backend)

pub mod elementwise;
pub mod gemm;
pub mod pool;
pub mod rmsnorm;
pub mod smoothquant;
#[cfg(feature = "wgpu")]
pub mod wgpu;

use rayon::prelude::*;

use crate::planner::{BlockPartition, GridDims, TileShape};

/// Runs `block(x, y, z)` for every block of `grid` in parallel.
///
/// Results come back in linear block order (`x` fastest).
pub(crate) fn run_blocks<R, F>(grid: &GridDims, block: F) -> Vec<R>
where
    R: Send,
    F: Fn(usize, usize, usize) -> R + Sync + Send,
{
    (0..grid.blocks())
        .into_par_iter()
        .map(|id| {
            let (x, y, z) = grid.coords(id);
            block(x, y, z)
        })
        .collect()
}

/// Block-local positions owned by every warp of `tile`.
pub(crate) fn warp_positions(tile: &TileShape) -> Vec<Vec<(usize, usize)>> {
    let partition = BlockPartition::new(tile);
    (0..partition.warps()).map(|w| partition.positions(w)).collect()
}

/// Lays per-warp accumulators back out as a row-major `rows × cols` tile.
pub(crate) fn assemble<A: Copy>(
    positions: &[Vec<(usize, usize)>],
    accumulators: Vec<Vec<A>>,
    cols: usize,
    fill: A,
    len: usize,
) -> Vec<A> {
    let mut tile = vec![fill; len];
    for (warp, acc) in accumulators.into_iter().enumerate() {
        for (&(r, c), v) in positions[warp].iter().zip(acc) {
            tile[r * cols + c] = v;
        }
    }
    tile
}
