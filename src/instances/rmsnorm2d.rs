//! RMSNorm 2-D forward instances.
//!
//! Rows map onto warps: `Block_M` rows per block spread over `Warps_M`
//! warps, each row reduced in `Block_K` chunks.

use crate::dtype::DataType::{self, BF16, F16, F32};
use crate::error::Result;
use crate::kernel::{InstanceDescriptor, OperationFamily};
use crate::pipeline::PipelineConfig;
use crate::planner::TileShape;
use crate::problem::Padding;
use crate::registry::RegistryBuilder;

/// `(Block_M, Block_K, Warps_M)`.
const TILES: &[(usize, usize, usize)] = &[(1, 1024, 1), (4, 256, 4), (8, 128, 4), (16, 64, 4)];

const TYPES: &[DataType] = &[F16, BF16, F32];

/// fp16, bf16 and fp32, exact and padded.
pub fn add_rmsnorm2d_fwd_instances(builder: &mut RegistryBuilder) -> Result<usize> {
    let mut added = 0;
    for &dtype in TYPES {
        for padding in [Padding::NoPad, Padding::PadMNK] {
            for &(bm, bk, wm) in TILES {
                let desc = InstanceDescriptor::rmsnorm2d(
                    TileShape::new(bm, 1, bk).warps(wm, 1),
                    PipelineConfig::default(),
                    [dtype; 3],
                    padding,
                );
                added += usize::from(builder.register(OperationFamily::Rmsnorm2dFwd, desc)?);
            }
        }
    }
    Ok(added)
}
