//! # Built-in Instance Catalogue
//!
//! Tables of pre-specialised instances, one submodule per operation family.
//! Each table is a list of tile shapes; the `add_*` functions expand them
//! over element types, layouts, padding policies and schedulers and register
//! the result.
//!
//! Registration order matters: selection breaks padded-volume ties in favour
//! of the instance registered first, so every table lists exact-division
//! (`NoPad`) variants before their padding counterparts.
//!
//! [`register_all`] populates a builder with every table; the
//! [default registry](crate::registry::default_registry) is built from it.

pub mod gemm;
pub mod gemm_splitk;
pub mod grouped_gemm;
pub mod pool3d;
pub mod rmsnorm2d;
pub mod smoothquant;

use log::debug;

use crate::error::Result;
use crate::planner::TileShape;
use crate::registry::RegistryBuilder;

/// `(Block_M, Block_N, Block_K, Warps_M, Warps_N, vector)`.
pub(crate) type TileRow = (usize, usize, usize, usize, usize, usize);

pub(crate) const fn tile((bm, bn, bk, wm, wn, v): TileRow) -> TileShape {
    TileShape::new(bm, bn, bk).warps(wm, wn).vector(v)
}

/// Registers every built-in table into `builder`.
///
/// # Returns
/// The number of instances added.
///
/// # Errors
/// [`KernelError::InvalidInstance`](crate::error::KernelError::InvalidInstance)
/// if a table row is inconsistent with its family.
pub fn register_all(builder: &mut RegistryBuilder) -> Result<usize> {
    let added = gemm::add_gemm_f16_instances(builder)?
        + gemm::add_gemm_f32_instances(builder)?
        + gemm::add_gemm_i8_irregular_instances(builder)?
        + gemm_splitk::add_gemm_splitk_bf16_i8_bf16_instances(builder)?
        + gemm_splitk::add_gemm_splitk_f16_instances(builder)?
        + grouped_gemm::add_grouped_gemm_fixed_nk_f16_instances(builder)?
        + rmsnorm2d::add_rmsnorm2d_fwd_instances(builder)?
        + smoothquant::add_smoothquant_instances(builder)?
        + pool3d::add_pool3d_fwd_instances(builder)?
        + pool3d::add_avgpool3d_bwd_instances(builder)?;
    debug!("built-in catalogue: {added} instances");
    Ok(added)
}
