//! Kernel instances.
//!
//! # Kernel Instance
//!
//! A kernel instance is one pre-specialised realisation of an operation:
//! `{tile shape × pipeline × element types × layouts × padding × reduction}`.
//! Instances are immutable, hold no per-call state and can be executed
//! concurrently from any thread.
//!
//! ## Design Highlights
//! - [`InstanceDescriptor`] is the instance's identity. Two registrations with
//!   equal descriptors are the same instance.
//! - [`instantiate`] is the factory: it validates a descriptor against its
//!   [`OperationFamily`] and picks the family's implementation in `ops`.
//! - [`KernelInstance::execute`] re-checks that the launch arguments agree
//!   with the problem and the grid before any block runs.
//!
//! ## Example
//!
//! ```rust
//! use tile_kernels::dtype::DataType;
//! use tile_kernels::kernel::{instantiate, launch, InstanceDescriptor, LaunchArgs, OperationFamily};
//! use tile_kernels::pipeline::{PipelineConfig, Scheduler};
//! use tile_kernels::planner::TileShape;
//! use tile_kernels::problem::{Layout, Padding, ProblemDesc};
//! use tile_kernels::tensor;
//!
//! let desc = InstanceDescriptor::gemm(
//!     TileShape::new(16, 16, 8).warps(2, 2).warp_size(8),
//!     PipelineConfig::new(Scheduler::Intrawave, 2),
//!     [DataType::F32; 3],
//!     [Layout::RowMajor; 3],
//!     Padding::PadMNK,
//! );
//! let gemm = instantiate(OperationFamily::Gemm, desc).unwrap();
//!
//! let a = tensor!(F32; [[1.0, 2.0], [3.0, 4.0]]);
//! let b = tensor!(F32; [[5.0, 6.0], [7.0, 8.0]]);
//! let mut c = tensor!(F32; [[0.0, 0.0], [0.0, 0.0]]);
//! let problem = ProblemDesc::gemm(a.desc().clone(), b.desc().clone(), c.desc().clone()).unwrap();
//! launch(gemm.as_ref(), LaunchArgs::gemm(&problem, &a, &b, &mut c)).unwrap();
//! assert_eq!(c.to_logical_f64(), vec![19.0, 22.0, 43.0, 50.0]);
//! ```

use core::fmt;
use std::sync::Arc;

use log::debug;

use crate::dtype::DataType;
use crate::error::{KernelError, Result};
use crate::ops::elementwise::{ElementwiseOp, PassThrough};
use crate::ops::gemm::GemmKernel;
use crate::ops::pool::Pool3dKernel;
use crate::ops::rmsnorm::Rmsnorm2dKernel;
use crate::ops::smoothquant::SmoothquantKernel;
use crate::pipeline::PipelineConfig;
use crate::planner::{GridDims, TilePlanner, TileShape};
use crate::problem::{Layout, OperandDesc, Padding, ProblemDesc, ProblemKind, ReduceOp};
use crate::registry::DeviceLimits;
use crate::tensors::Tensor;

/// Operation families served by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationFamily {
    /// Plain GEMM, `k_batch = 1`.
    Gemm,
    /// GEMM with the reduction split over grid `z`.
    GemmSplitK,
    /// Several GEMMs in one launch.
    GroupedGemm,
    /// Row-wise RMS normalisation forward.
    Rmsnorm2dFwd,
    /// 3-D pooling forward.
    Pool3dFwd,
    /// 3-D average pooling backward.
    AvgPool3dBwd,
    /// Row-wise smoothing and int8 quantisation.
    Smoothquant,
}

impl OperationFamily {
    /// Operands per group.
    pub const fn arity(self) -> usize {
        match self {
            Self::Gemm | Self::GemmSplitK | Self::GroupedGemm | Self::Rmsnorm2dFwd => 3,
            Self::Pool3dFwd | Self::AvgPool3dBwd => 2,
            Self::Smoothquant => 4,
        }
    }

    /// Leading operands the accumulator must be wider than.
    pub const fn reduced_inputs(self) -> usize {
        match self {
            Self::Gemm | Self::GemmSplitK | Self::GroupedGemm | Self::Smoothquant => 2,
            Self::Rmsnorm2dFwd | Self::Pool3dFwd | Self::AvgPool3dBwd => 1,
        }
    }

    /// Problem kind this family serves.
    pub const fn problem_kind(self) -> ProblemKind {
        match self {
            Self::Gemm | Self::GemmSplitK => ProblemKind::Gemm,
            Self::GroupedGemm => ProblemKind::GroupedGemm,
            Self::Rmsnorm2dFwd => ProblemKind::Rmsnorm2d,
            Self::Pool3dFwd => ProblemKind::Pool3d,
            Self::AvgPool3dBwd => ProblemKind::Pool3dBwd,
            Self::Smoothquant => ProblemKind::Smoothquant,
        }
    }

    /// Name used in logs and instance strings.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gemm => "gemm",
            Self::GemmSplitK => "gemm_splitk",
            Self::GroupedGemm => "grouped_gemm",
            Self::Rmsnorm2dFwd => "rmsnorm2d_fwd",
            Self::Pool3dFwd => "pool3d_fwd",
            Self::AvgPool3dBwd => "avgpool3d_bwd",
            Self::Smoothquant => "smoothquant",
        }
    }
}

impl fmt::Display for OperationFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The identity of a kernel instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceDescriptor {
    /// Block/warp/lane extents.
    pub tile: TileShape,
    /// Scheduler and prefetch depth.
    pub pipeline: PipelineConfig,
    /// Element type of every operand.
    pub dtypes: Vec<DataType>,
    /// Accumulator type.
    pub acc: DataType,
    /// Layout tag of every operand.
    pub layouts: Vec<Layout>,
    /// Dimensions the instance can mask.
    pub padding: Padding,
    /// Reduction kind.
    pub reduce: ReduceOp,
}

impl InstanceDescriptor {
    /// A GEMM-family descriptor for `A`, `B`, `C`. The accumulator follows
    /// [`DataType::accumulator`] over `A` and `B`.
    pub fn gemm(
        tile: TileShape,
        pipeline: PipelineConfig,
        dtypes: [DataType; 3],
        layouts: [Layout; 3],
        padding: Padding,
    ) -> Self {
        Self {
            tile,
            pipeline,
            acc: DataType::accumulator(&dtypes[..2]),
            dtypes: dtypes.to_vec(),
            layouts: layouts.to_vec(),
            padding,
            reduce: ReduceOp::Sum,
        }
    }

    /// An RMSNorm descriptor for `X`, `Gamma`, `Y`. The accumulator follows
    /// [`DataType::accumulator`] over `X`.
    ///
    /// `tile.block_m` is the number of rows per block and `tile.block_k` the
    /// row chunk staged per pipeline step.
    pub fn rmsnorm2d(tile: TileShape, pipeline: PipelineConfig, dtypes: [DataType; 3], padding: Padding) -> Self {
        Self {
            tile,
            pipeline,
            acc: DataType::accumulator(&dtypes[..1]),
            dtypes: dtypes.to_vec(),
            layouts: vec![Layout::RowMajor; 3],
            padding,
            reduce: ReduceOp::Sum,
        }
    }

    /// A pooling descriptor over `NDHWC` input and output.
    pub fn pool3d(
        tile: TileShape,
        pipeline: PipelineConfig,
        dtypes: [DataType; 2],
        reduce: ReduceOp,
        padding: Padding,
    ) -> Self {
        Self {
            tile,
            pipeline,
            acc: DataType::accumulator(&dtypes[..1]),
            dtypes: dtypes.to_vec(),
            layouts: vec![Layout::Custom("NDHWC"); 2],
            padding,
            reduce,
        }
    }

    /// An average-pooling backward descriptor: `dOut` in, `dIn` out, both
    /// `NDHWC`.
    pub fn avgpool3d_bwd(tile: TileShape, pipeline: PipelineConfig, dtypes: [DataType; 2], padding: Padding) -> Self {
        Self {
            tile,
            pipeline,
            acc: DataType::accumulator(&dtypes[..1]),
            dtypes: dtypes.to_vec(),
            layouts: vec![Layout::Custom("NDHWC"); 2],
            padding,
            reduce: ReduceOp::Avg,
        }
    }

    /// A smoothquant descriptor for `X`, `XScale`, `YScale`, `QY`.
    ///
    /// Tiles follow [`InstanceDescriptor::rmsnorm2d`]: `Block_M` rows per
    /// block, `Block_K` columns per pipeline step.
    pub fn smoothquant(tile: TileShape, pipeline: PipelineConfig, dtypes: [DataType; 4], padding: Padding) -> Self {
        Self {
            tile,
            pipeline,
            acc: DataType::accumulator(&dtypes[..2]),
            dtypes: dtypes.to_vec(),
            layouts: vec![Layout::RowMajor; 4],
            padding,
            reduce: ReduceOp::Max,
        }
    }

    /// Replaces the accumulator type.
    #[must_use]
    pub fn with_acc(mut self, acc: DataType) -> Self {
        self.acc = acc;
        self
    }

    /// Human-readable instance string, e.g.
    /// `gemm_fp16_fp16_fp16_rrr_256x128x64_2x2x64_v8_Intrawave_p2_MNKPadding`.
    pub fn name(&self, family: OperationFamily) -> String {
        let types: Vec<&str> = self.dtypes.iter().map(|d| d.name()).collect();
        let layouts: String = if self.layouts.iter().all(|l| matches!(l, Layout::RowMajor | Layout::ColumnMajor)) {
            self.layouts.iter().map(|l| l.tag()).collect()
        } else {
            self.layouts.first().map_or("", |l| l.tag()).to_owned()
        };
        let t = &self.tile;
        let mut name = format!(
            "{family}_{}_{layouts}_{}x{}x{}_{}x{}x{}_v{}_{}_p{}_{}",
            types.join("_"),
            t.block_m,
            t.block_n,
            t.block_k,
            t.warps_m,
            t.warps_n,
            t.warp_size,
            t.vector,
            self.pipeline.scheduler.name(),
            self.pipeline.prefetch,
            self.padding,
        );
        if family == OperationFamily::Pool3dFwd {
            name.push('_');
            name.push_str(self.reduce.name());
        }
        name
    }
}

/// Operands of one GEMM.
#[derive(Debug)]
pub struct GemmOperands<'a> {
    /// `A: [M, K]`.
    pub a: &'a Tensor,
    /// `B: [K, N]`.
    pub b: &'a Tensor,
    /// `C: [M, N]`, written.
    pub c: &'a mut Tensor,
}

/// Family-specific tensors of a launch.
#[derive(Debug)]
pub enum KernelArgs<'a> {
    /// Plain or split-K GEMM.
    Gemm(GemmOperands<'a>),
    /// One entry per group.
    GroupedGemm(Vec<GemmOperands<'a>>),
    /// RMSNorm forward.
    Rmsnorm2d {
        /// Input `[M, N]`.
        x: &'a Tensor,
        /// Scale `[N]`.
        gamma: &'a Tensor,
        /// Output `[M, N]`.
        y: &'a mut Tensor,
        /// Optional per-row inverse RMS `[M]`.
        inv_rms: Option<&'a mut Tensor>,
        /// Added to the mean square.
        epsilon: f32,
    },
    /// Pooling forward.
    Pool3d {
        /// `NDHWC` input.
        input: &'a Tensor,
        /// `NDHWC` output.
        output: &'a mut Tensor,
    },
    /// Average pooling backward.
    AvgPool3dBwd {
        /// Gradient of the pooled output, `NDHWC`.
        dout: &'a Tensor,
        /// Gradient of the pooling input, `NDHWC`, written.
        din: &'a mut Tensor,
    },
    /// Smoothquant.
    Smoothquant {
        /// Input `[M, N]`.
        x: &'a Tensor,
        /// Per-column smoothing scale `[N]`.
        xscale: &'a Tensor,
        /// Per-row dequantisation scale `[M]`, written.
        yscale: &'a mut Tensor,
        /// Quantised output `[M, N]`, written.
        qy: &'a mut Tensor,
    },
}

/// Everything a kernel needs for one launch.
pub struct LaunchArgs<'a> {
    /// Problem the tensors describe.
    pub problem: &'a ProblemDesc,
    /// Tensors.
    pub tensors: KernelArgs<'a>,
    /// Post-op applied by the epilogue.
    pub post_op: &'a dyn ElementwiseOp,
}

impl fmt::Debug for LaunchArgs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchArgs")
            .field("problem", self.problem)
            .field("tensors", &self.tensors)
            .finish_non_exhaustive()
    }
}

impl KernelArgs<'_> {
    /// Short name of the variant, for diagnostics.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Gemm(_) => "gemm",
            Self::GroupedGemm(_) => "grouped_gemm",
            Self::Rmsnorm2d { .. } => "rmsnorm2d",
            Self::Pool3d { .. } => "pool3d",
            Self::AvgPool3dBwd { .. } => "avgpool3d_bwd",
            Self::Smoothquant { .. } => "smoothquant",
        }
    }
}

impl<'a> LaunchArgs<'a> {
    /// GEMM arguments with a pass-through epilogue.
    pub fn gemm(problem: &'a ProblemDesc, a: &'a Tensor, b: &'a Tensor, c: &'a mut Tensor) -> Self {
        Self {
            problem,
            tensors: KernelArgs::Gemm(GemmOperands { a, b, c }),
            post_op: &PassThrough,
        }
    }

    /// Grouped GEMM arguments with a pass-through epilogue.
    pub fn grouped_gemm(problem: &'a ProblemDesc, groups: Vec<GemmOperands<'a>>) -> Self {
        Self {
            problem,
            tensors: KernelArgs::GroupedGemm(groups),
            post_op: &PassThrough,
        }
    }

    /// RMSNorm arguments with a pass-through epilogue.
    pub fn rmsnorm2d(
        problem: &'a ProblemDesc,
        x: &'a Tensor,
        gamma: &'a Tensor,
        y: &'a mut Tensor,
        inv_rms: Option<&'a mut Tensor>,
        epsilon: f32,
    ) -> Self {
        Self {
            problem,
            tensors: KernelArgs::Rmsnorm2d { x, gamma, y, inv_rms, epsilon },
            post_op: &PassThrough,
        }
    }

    /// Pooling arguments with a pass-through epilogue.
    pub fn pool3d(problem: &'a ProblemDesc, input: &'a Tensor, output: &'a mut Tensor) -> Self {
        Self {
            problem,
            tensors: KernelArgs::Pool3d { input, output },
            post_op: &PassThrough,
        }
    }

    /// Average-pooling backward arguments with a pass-through epilogue.
    pub fn avgpool3d_bwd(problem: &'a ProblemDesc, dout: &'a Tensor, din: &'a mut Tensor) -> Self {
        Self {
            problem,
            tensors: KernelArgs::AvgPool3dBwd { dout, din },
            post_op: &PassThrough,
        }
    }

    /// Smoothquant arguments with a pass-through epilogue.
    pub fn smoothquant(
        problem: &'a ProblemDesc,
        x: &'a Tensor,
        xscale: &'a Tensor,
        yscale: &'a mut Tensor,
        qy: &'a mut Tensor,
    ) -> Self {
        Self {
            problem,
            tensors: KernelArgs::Smoothquant { x, xscale, yscale, qy },
            post_op: &PassThrough,
        }
    }

    /// Replaces the post-op.
    #[must_use]
    pub fn with_post_op(mut self, post_op: &'a dyn ElementwiseOp) -> Self {
        self.post_op = post_op;
        self
    }
}

/// A specialised, reentrant kernel.
pub trait KernelInstance: Send + Sync + fmt::Debug {
    /// Family the instance belongs to.
    fn family(&self) -> OperationFamily;

    /// Identity of the instance.
    fn descriptor(&self) -> &InstanceDescriptor;

    /// Bytes of one staged k-tile.
    fn stage_bytes(&self) -> usize;

    /// Family-specific problem checks beyond tiling.
    ///
    /// # Errors
    /// [`KernelError::UnsupportedShape`] when the instance cannot serve the
    /// problem.
    fn supports(&self, _problem: &ProblemDesc) -> Result<()> {
        Ok(())
    }

    /// Runs every block of `grid` and writes the outputs.
    ///
    /// # Errors
    /// [`KernelError::InvalidArguments`] when the tensors, the problem and the
    /// grid disagree. Nothing is written in that case.
    fn execute(&self, args: LaunchArgs<'_>, grid: &GridDims) -> Result<()>;

    /// Planner bound to this instance's tile and padding.
    fn planner(&self) -> TilePlanner {
        let d = self.descriptor();
        TilePlanner::new(d.tile, d.padding)
    }

    /// Staging held by one block: `prefetch × stage_bytes`.
    fn staging_bytes(&self) -> usize {
        self.descriptor().pipeline.staging_bytes(self.stage_bytes())
    }

    /// Checks the instance against device limits.
    ///
    /// # Errors
    /// [`KernelError::PipelineCapacity`] when the staging ring does not fit,
    /// [`KernelError::UnsupportedShape`] when the block has too many threads.
    fn check_capacity(&self, limits: &DeviceLimits) -> Result<()> {
        let required = self.staging_bytes();
        if required > limits.shared_memory_bytes {
            return Err(KernelError::PipelineCapacity {
                required,
                available: limits.shared_memory_bytes,
            });
        }
        let threads = self.descriptor().tile.threads();
        if threads > limits.max_threads_per_block {
            return Err(KernelError::UnsupportedShape(format!(
                "{threads} threads per block, device allows {}",
                limits.max_threads_per_block
            )));
        }
        Ok(())
    }

    /// Grid for `problem`.
    ///
    /// # Errors
    /// [`KernelError::UnsupportedShape`] when the instance cannot tile the
    /// problem.
    fn grid_shape(&self, problem: &ProblemDesc) -> Result<GridDims> {
        self.supports(problem)?;
        self.planner().grid_shape(problem)
    }

    /// Instance string.
    fn name(&self) -> String {
        self.descriptor().name(self.family())
    }
}

fn check_descriptor(family: OperationFamily, desc: &InstanceDescriptor) -> Result<()> {
    desc.tile.validate()?;
    desc.pipeline.validate()?;
    let arity = family.arity();
    if desc.dtypes.len() != arity || desc.layouts.len() != arity {
        return Err(KernelError::InvalidInstance(format!(
            "{family} takes {arity} operands, descriptor lists {} types and {} layouts",
            desc.dtypes.len(),
            desc.layouts.len()
        )));
    }
    let float_inputs = desc.dtypes[..arity - 1].iter().any(|d| d.is_float());
    let required = DataType::accumulator(&desc.dtypes[..family.reduced_inputs()]);
    if desc.acc != required && !(required == DataType::F32 && desc.acc == DataType::F64) {
        return Err(KernelError::InvalidInstance(format!(
            "{} cannot accumulate {:?}, needs at least {required}",
            desc.acc, desc.dtypes
        )));
    }

    match family {
        OperationFamily::Gemm | OperationFamily::GemmSplitK | OperationFamily::GroupedGemm => {
            if desc.layouts.iter().any(|l| matches!(l, Layout::Custom(_))) {
                return Err(KernelError::InvalidInstance("GEMM operands must be row- or column-major".into()));
            }
            if desc.reduce != ReduceOp::Sum {
                return Err(KernelError::InvalidInstance("GEMM reduces by sum".into()));
            }
        }
        OperationFamily::Rmsnorm2dFwd => {
            let t = &desc.tile;
            if t.block_n != 1 || t.warps_n != 1 || t.vector != 1 {
                return Err(KernelError::InvalidInstance(
                    "RMSNorm tiles are Block_M rows wide and one column deep".into(),
                ));
            }
            if desc.layouts.iter().any(|&l| l != Layout::RowMajor) || !float_inputs || desc.reduce != ReduceOp::Sum {
                return Err(KernelError::InvalidInstance(
                    "RMSNorm takes row-major float operands and reduces by sum".into(),
                ));
            }
        }
        OperationFamily::Pool3dFwd | OperationFamily::AvgPool3dBwd => {
            if desc.reduce == ReduceOp::Sum || (family == OperationFamily::AvgPool3dBwd && desc.reduce != ReduceOp::Avg) {
                return Err(KernelError::InvalidInstance(format!("{family} cannot reduce by {}", desc.reduce)));
            }
            if desc.layouts.iter().any(|&l| l != Layout::Custom("NDHWC")) {
                return Err(KernelError::InvalidInstance("pooling operands must be NDHWC".into()));
            }
        }
        OperationFamily::Smoothquant => {
            let t = &desc.tile;
            if t.block_n != 1 || t.warps_n != 1 || t.vector != 1 {
                return Err(KernelError::InvalidInstance(
                    "smoothquant tiles are Block_M rows wide and one column deep".into(),
                ));
            }
            let d = &desc.dtypes;
            if !d[0].is_float() || !d[1].is_float() || !d[2].is_float() || d[3] != DataType::I8 {
                return Err(KernelError::InvalidInstance(format!(
                    "smoothquant takes float X, XScale and YScale and an i8 QY, got {d:?}"
                )));
            }
            if desc.layouts.iter().any(|&l| l != Layout::RowMajor) || desc.reduce != ReduceOp::Max {
                return Err(KernelError::InvalidInstance(
                    "smoothquant takes row-major operands and reduces by max".into(),
                ));
            }
        }
    }
    Ok(())
}

/// Builds the instance for `desc` in `family`.
///
/// # Errors
/// [`KernelError::InvalidInstance`] when the descriptor is inconsistent with
/// the family.
pub fn instantiate(family: OperationFamily, desc: InstanceDescriptor) -> Result<Arc<dyn KernelInstance>> {
    check_descriptor(family, &desc)?;
    Ok(match family {
        OperationFamily::Gemm | OperationFamily::GemmSplitK | OperationFamily::GroupedGemm => {
            Arc::new(GemmKernel::new(family, desc))
        }
        OperationFamily::Rmsnorm2dFwd => Arc::new(Rmsnorm2dKernel::new(desc)),
        OperationFamily::Pool3dFwd | OperationFamily::AvgPool3dBwd => Arc::new(Pool3dKernel::new(family, desc)),
        OperationFamily::Smoothquant => Arc::new(SmoothquantKernel::new(desc)),
    })
}

/// Computes the grid for `args.problem` and executes.
///
/// # Errors
/// Whatever [`KernelInstance::grid_shape`] or [`KernelInstance::execute`]
/// returns.
pub fn launch(instance: &dyn KernelInstance, args: LaunchArgs<'_>) -> Result<()> {
    let grid = instance.grid_shape(args.problem)?;
    debug!(
        "launching {} on grid {}x{}x{} ({} blocks)",
        instance.name(),
        grid.x,
        grid.y,
        grid.z,
        grid.blocks()
    );
    instance.execute(args, &grid)
}

/// Checks that the launch targets the problem and the grid the instance
/// would compute for it.
pub(crate) fn check_launch(instance: &dyn KernelInstance, problem: &ProblemDesc, grid: &GridDims) -> Result<()> {
    if instance.family().problem_kind() != problem.kind() {
        return Err(KernelError::InvalidArguments(format!(
            "{} cannot run a {:?} problem",
            instance.family(),
            problem.kind()
        )));
    }
    let d = instance.descriptor();
    let (dtypes, layouts) = (problem.dtypes(), problem.layouts());
    if d.dtypes != dtypes || d.layouts != layouts || d.reduce != problem.reduce() {
        return Err(KernelError::InvalidArguments(format!(
            "{} is built for {:?}/{:?}/{}, problem is {dtypes:?}/{layouts:?}/{}",
            instance.name(),
            d.dtypes,
            d.layouts,
            d.reduce.name(),
            problem.reduce().name()
        )));
    }
    let expected = instance.grid_shape(problem)?;
    if expected != *grid {
        return Err(KernelError::InvalidArguments(format!(
            "grid {grid:?} does not match the problem's {expected:?}"
        )));
    }
    Ok(())
}

/// Checks that `tensor` is described by `expected`.
pub(crate) fn check_tensor(what: &str, tensor: &Tensor, expected: &OperandDesc) -> Result<()> {
    if tensor.desc().same_shape(expected) {
        Ok(())
    } else {
        Err(KernelError::InvalidArguments(format!(
            "{what} is {:?}/{}, problem expects {:?}/{}",
            tensor.desc().lengths(),
            tensor.desc().dtype(),
            expected.lengths(),
            expected.dtype()
        )))
    }
}
