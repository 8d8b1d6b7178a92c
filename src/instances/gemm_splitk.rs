//! Split-K GEMM instances.
//!
//! Pipelines here keep a single staging slot (`prefetch = 1`): the reduction
//! each block sees is already cut by `k_batch`, so deeper rings rarely pay
//! for their staging.

use crate::dtype::DataType::{BF16, F16, I8};
use crate::error::Result;
use crate::instances::{TileRow, tile};
use crate::kernel::{InstanceDescriptor, OperationFamily};
use crate::pipeline::{PipelineConfig, Scheduler};
use crate::problem::Layout::{ColumnMajor as C, RowMajor as R};
use crate::problem::Padding;
use crate::registry::RegistryBuilder;

const TILES: &[TileRow] = &[
    (256, 128, 32, 2, 2, 8),
    (128, 256, 32, 2, 2, 8),
    (128, 128, 32, 2, 2, 8),
    (128, 64, 32, 2, 2, 8),
    (64, 128, 32, 2, 2, 8),
    (64, 64, 32, 2, 2, 8),
    (32, 64, 32, 1, 2, 8),
];

/// bf16 × int8 → bf16, `mk_nk_mn`, inter-wave scheduling.
pub fn add_gemm_splitk_bf16_i8_bf16_instances(builder: &mut RegistryBuilder) -> Result<usize> {
    let mut added = 0;
    for padding in [Padding::NoPad, Padding::PadMN, Padding::PadMNK] {
        for &row in TILES {
            let desc = InstanceDescriptor::gemm(
                tile(row),
                PipelineConfig::new(Scheduler::Interwave, 1),
                [BF16, I8, BF16],
                [R, C, R],
                padding,
            );
            added += usize::from(builder.register(OperationFamily::GemmSplitK, desc)?);
        }
    }
    Ok(added)
}

/// fp16 `mk_kn_mn`, both schedulers.
pub fn add_gemm_splitk_f16_instances(builder: &mut RegistryBuilder) -> Result<usize> {
    let mut added = 0;
    for padding in [Padding::NoPad, Padding::PadMNK] {
        for scheduler in [Scheduler::Intrawave, Scheduler::Interwave] {
            for &row in TILES {
                let desc = InstanceDescriptor::gemm(
                    tile(row),
                    PipelineConfig::new(scheduler, 1),
                    [F16; 3],
                    [R; 3],
                    padding,
                );
                added += usize::from(builder.register(OperationFamily::GemmSplitK, desc)?);
            }
        }
    }
    Ok(added)
}
