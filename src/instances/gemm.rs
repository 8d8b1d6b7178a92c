//! Plain GEMM instances.

use crate::dtype::DataType::{self, F16, F32, I8};
use crate::error::Result;
use crate::instances::{TileRow, tile};
use crate::kernel::{InstanceDescriptor, OperationFamily};
use crate::pipeline::{PipelineConfig, Scheduler};
use crate::problem::Layout::{self, ColumnMajor as C, RowMajor as R};
use crate::problem::Padding;
use crate::registry::RegistryBuilder;

/// `A`, `B`, `C` layouts covered by the fp16 tables: `mk_kn_mn`, `mk_nk_mn`,
/// `km_kn_mn`, `km_nk_mn`.
const LAYOUTS: [[Layout; 3]; 4] = [[R, R, R], [R, C, R], [C, R, R], [C, C, R]];

const F16_TILES: &[TileRow] = &[
    (256, 128, 32, 2, 2, 8),
    (128, 256, 32, 2, 2, 8),
    (128, 128, 32, 2, 2, 8),
    (128, 64, 32, 2, 2, 8),
    (64, 128, 32, 2, 2, 8),
    (64, 64, 32, 2, 2, 8),
];

/// Multiples of 16, so they are eligible for the GPU path.
const F32_TILES: &[TileRow] = &[(128, 128, 16, 2, 2, 4), (64, 64, 16, 2, 2, 4), (32, 32, 16, 1, 1, 4)];

/// Irregular int8 tiles, K-exact and M/N-padded.
const I8_IRREGULAR_TILES: &[TileRow] = &[
    (128, 128, 64, 2, 2, 4),
    (128, 64, 64, 2, 2, 4),
    (64, 128, 64, 2, 2, 4),
    (64, 64, 32, 2, 1, 4),
    (32, 32, 32, 1, 1, 4),
    (16, 16, 32, 1, 1, 2),
    (8, 64, 64, 1, 1, 2),
    (64, 8, 64, 1, 1, 2),
    (8, 8, 8, 1, 1, 2),
];

fn add_table(
    builder: &mut RegistryBuilder,
    tiles: &[TileRow],
    dtypes: [DataType; 3],
    layouts: &[[Layout; 3]],
    paddings: &[Padding],
    schedulers: &[Scheduler],
) -> Result<usize> {
    let mut added = 0;
    for &layout in layouts {
        for &padding in paddings {
            for &scheduler in schedulers {
                for &row in tiles {
                    let desc =
                        InstanceDescriptor::gemm(tile(row), PipelineConfig::new(scheduler, 2), dtypes, layout, padding);
                    added += usize::from(builder.register(OperationFamily::Gemm, desc)?);
                }
            }
        }
    }
    Ok(added)
}

/// fp16 GEMM over every layout combination, exact and `MNKPadding`, both
/// schedulers.
pub fn add_gemm_f16_instances(builder: &mut RegistryBuilder) -> Result<usize> {
    add_table(
        builder,
        F16_TILES,
        [F16; 3],
        &LAYOUTS,
        &[Padding::NoPad, Padding::PadMNK],
        &[Scheduler::Intrawave, Scheduler::Interwave],
    )
}

/// fp32 GEMM, `mk_kn_mn` and `mk_nk_mn`.
pub fn add_gemm_f32_instances(builder: &mut RegistryBuilder) -> Result<usize> {
    add_table(
        builder,
        F32_TILES,
        [F32; 3],
        &LAYOUTS[..2],
        &[Padding::NoPad, Padding::PadMNK],
        &[Scheduler::Intrawave],
    )
}

/// int8 `mk_kn_mn` GEMM with int32 accumulation for shapes that only need
/// M/N masking.
pub fn add_gemm_i8_irregular_instances(builder: &mut RegistryBuilder) -> Result<usize> {
    add_table(
        builder,
        I8_IRREGULAR_TILES,
        [I8; 3],
        &LAYOUTS[..1],
        &[Padding::PadMN],
        &[Scheduler::Intrawave],
    )
}
