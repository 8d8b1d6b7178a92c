//! Smoothquant instances.
//!
//! One row per block for wide rows, several rows per block for short ones.
//! `X` is fp16 or bf16; the smoothing and row scales are fp32 and the
//! quantised output is int8.

use crate::dtype::DataType::{BF16, F16, F32, I8};
use crate::error::Result;
use crate::kernel::{InstanceDescriptor, OperationFamily};
use crate::pipeline::PipelineConfig;
use crate::planner::TileShape;
use crate::problem::Padding;
use crate::registry::RegistryBuilder;

/// `(Block_M, Block_K, Warps_M)`.
const TILES: &[(usize, usize, usize)] = &[(1, 1024, 1), (1, 512, 1), (4, 256, 4), (16, 64, 4)];

/// fp16 and bf16 input, exact and padded.
pub fn add_smoothquant_instances(builder: &mut RegistryBuilder) -> Result<usize> {
    let mut added = 0;
    for x in [BF16, F16] {
        for padding in [Padding::NoPad, Padding::PadMNK] {
            for &(bm, bk, wm) in TILES {
                let desc = InstanceDescriptor::smoothquant(
                    TileShape::new(bm, 1, bk).warps(wm, 1),
                    PipelineConfig::default(),
                    [x, F32, F32, I8],
                    padding,
                );
                added += usize::from(builder.register(OperationFamily::Smoothquant, desc)?);
            }
        }
    }
    Ok(added)
}
