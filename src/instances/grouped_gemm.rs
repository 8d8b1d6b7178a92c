//! Grouped GEMM instances with fixed N and K across groups.

use crate::dtype::DataType::F16;
use crate::error::Result;
use crate::instances::{TileRow, tile};
use crate::kernel::{InstanceDescriptor, OperationFamily};
use crate::pipeline::{PipelineConfig, Scheduler};
use crate::problem::Layout::{ColumnMajor as C, RowMajor as R};
use crate::problem::Padding;
use crate::registry::RegistryBuilder;

const TILES: &[TileRow] = &[
    (128, 256, 64, 2, 2, 8),
    (128, 128, 64, 2, 2, 8),
    (128, 64, 64, 2, 2, 8),
    (64, 128, 64, 2, 2, 8),
    (128, 128, 64, 2, 1, 8),
    (64, 64, 64, 2, 1, 8),
    (64, 32, 64, 2, 1, 8),
    (32, 64, 64, 1, 2, 8),
    (64, 64, 64, 1, 1, 8),
];

/// Skinny tiles for groups with few rows or few columns.
const IRREGULAR_TILES: &[TileRow] = &[
    (16, 128, 32, 1, 2, 8),
    (16, 256, 32, 1, 4, 8),
    (128, 16, 32, 4, 1, 8),
    (256, 16, 32, 4, 1, 8),
];

/// fp16 `mk_nk_mn` and `mk_kn_mn`, `MNKPadding`.
pub fn add_grouped_gemm_fixed_nk_f16_instances(builder: &mut RegistryBuilder) -> Result<usize> {
    let mut added = 0;
    for layouts in [[R, C, R], [R, R, R]] {
        for &row in TILES.iter().chain(IRREGULAR_TILES) {
            let desc = InstanceDescriptor::gemm(
                tile(row),
                PipelineConfig::new(Scheduler::Intrawave, 1),
                [F16; 3],
                layouts,
                Padding::PadMNK,
            );
            added += usize::from(builder.register(OperationFamily::GroupedGemm, desc)?);
        }
    }
    Ok(added)
}
