//! 3-D pooling instances over `NDHWC`: forward average and max, and average
//! backward. Both directions share the tile table.

use crate::dtype::DataType::{self, F16, F32};
use crate::error::Result;
use crate::instances::{TileRow, tile};
use crate::kernel::{InstanceDescriptor, OperationFamily};
use crate::pipeline::PipelineConfig;
use crate::problem::{Padding, ReduceOp};
use crate::registry::RegistryBuilder;

/// Output positions × channels × window taps.
const TILES: &[TileRow] = &[(32, 32, 4, 2, 2, 4), (16, 64, 4, 1, 2, 4), (64, 16, 2, 2, 1, 4), (8, 8, 8, 1, 1, 2)];

const TYPES: &[DataType] = &[F16, F32];

/// Average and max pooling for fp16 and fp32.
pub fn add_pool3d_fwd_instances(builder: &mut RegistryBuilder) -> Result<usize> {
    let mut added = 0;
    for &dtype in TYPES {
        for reduce in [ReduceOp::Avg, ReduceOp::Max] {
            for &row in TILES {
                let desc = InstanceDescriptor::pool3d(
                    tile(row),
                    PipelineConfig::default(),
                    [dtype; 2],
                    reduce,
                    Padding::PadMNK,
                );
                added += usize::from(builder.register(OperationFamily::Pool3dFwd, desc)?);
            }
        }
    }
    Ok(added)
}

/// Average-pooling backward for fp16 and fp32.
pub fn add_avgpool3d_bwd_instances(builder: &mut RegistryBuilder) -> Result<usize> {
    let mut added = 0;
    for &dtype in TYPES {
        for &row in TILES {
            let desc = InstanceDescriptor::avgpool3d_bwd(tile(row), PipelineConfig::default(), [dtype; 2], Padding::PadMNK);
            added += usize::from(builder.register(OperationFamily::AvgPool3dBwd, desc)?);
        }
    }
    Ok(added)
}
