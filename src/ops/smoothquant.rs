//! Row-wise smoothquant.
//!
//! For `X: [M, N]` and a per-column smoothing scale `XScale: [N]`:
//!
//! ```text
//! Y[m, n]   = op(X[m, n] · XScale[n])
//! YScale[m] = max_n |Y[m, n]| / 127
//! QY[m, n]  = sat_i8(round(Y[m, n] / YScale[m]))
//! ```
//!
//! Like RMSNorm the problem is `{m: M, n: 1, k: N}`. The pipeline stages a
//! `Block_K` chunk of every row together with the matching `XScale` chunk
//! and reduces the row's absolute maximum (pass one); the block then
//! quantises each row against its scale (pass two). An all-zero row gets
//! `YScale = 0` and quantises to zeros.

use core::marker::PhantomData;

use crate::dtype::{Accumulator, DataType};
use crate::error::{KernelError, Result};
use crate::kernel::{InstanceDescriptor, KernelArgs, KernelInstance, LaunchArgs, OperationFamily, check_launch, check_tensor};
use crate::ops::elementwise::{ElementwiseOp, finish};
use crate::ops::{assemble, run_blocks, warp_positions};
use crate::pipeline::{LoadSlice, TileProgram, run_block};
use crate::planner::{GridDims, TileShape};
use crate::problem::ProblemDesc;
use crate::tensors::Tensor;

/// Largest magnitude of the quantised type.
const QMAX: f64 = 127.0;

/// Smoothquant kernel instance.
#[derive(Debug)]
pub struct SmoothquantKernel {
    desc: InstanceDescriptor,
    positions: Vec<Vec<(usize, usize)>>,
}

type Writes = Vec<(usize, f64)>;

struct SmoothquantIo<'a> {
    x: &'a Tensor,
    xscale: &'a Tensor,
    yscale: &'a Tensor,
    qy: &'a Tensor,
}

impl SmoothquantKernel {
    pub(crate) fn new(desc: InstanceDescriptor) -> Self {
        let positions = warp_positions(&desc.tile);
        Self { desc, positions }
    }

    fn run_host<A: Accumulator>(
        &self,
        problem: &ProblemDesc,
        grid: &GridDims,
        io: &SmoothquantIo<'_>,
        post_op: &dyn ElementwiseOp,
    ) -> Vec<(Writes, Writes)> {
        let planner = self.planner();
        let tile = &self.desc.tile;
        let ext = problem.extents()[0];
        let (rows_total, cols) = (ext.m, ext.k);
        let smooth = |row: usize, col: usize| -> f64 {
            let v = A::zero().mul_add(A::from_f64(io.x.get(&[row, col])), A::from_f64(io.xscale.get(&[col])));
            finish(post_op, v.to_f64())
        };

        run_blocks(grid, |x, y, z| {
            let origin = planner.block_origin(problem, x, y, z);
            let program = AbsMaxProgram::<A> {
                x: io.x,
                xscale: io.xscale,
                tile,
                positions: &self.positions,
                post_op,
                m0: origin.m0,
                rows: rows_total,
                cols,
                _acc: PhantomData,
            };
            let state = run_block(&program, &self.desc.pipeline, false);
            let maxima = assemble(&self.positions, state.into_accumulators(), 1, A::zero(), tile.block_m);

            let rows = (rows_total - origin.m0).min(tile.block_m);
            let mut qy_writes = Vec::with_capacity(rows * cols);
            let mut scale_writes = Vec::with_capacity(rows);
            for (r, absmax) in maxima.iter().take(rows).enumerate() {
                let row = origin.m0 + r;
                let scale = A::from_f64(absmax.to_f64() / QMAX).to_f64();
                for col in 0..cols {
                    let q = if scale > 0.0 { smooth(row, col) / scale } else { 0.0 };
                    qy_writes.push((io.qy.desc().offset(&[row, col]), q));
                }
                scale_writes.push((io.yscale.desc().offset(&[row]), scale));
            }
            (qy_writes, scale_writes)
        })
    }
}

impl KernelInstance for SmoothquantKernel {
    fn family(&self) -> OperationFamily {
        OperationFamily::Smoothquant
    }

    fn descriptor(&self) -> &InstanceDescriptor {
        &self.desc
    }

    fn stage_bytes(&self) -> usize {
        let t = &self.desc.tile;
        t.block_m * t.block_k * self.desc.dtypes[0].size_bytes() + t.block_k * self.desc.dtypes[1].size_bytes()
    }

    fn supports(&self, problem: &ProblemDesc) -> Result<()> {
        if problem.k_batch() != 1 {
            return Err(KernelError::UnsupportedShape("smoothquant rows cannot be split".into()));
        }
        Ok(())
    }

    fn execute(&self, args: LaunchArgs<'_>, grid: &GridDims) -> Result<()> {
        check_launch(self, args.problem, grid)?;
        let problem = args.problem;
        let kind = args.tensors.kind_name();
        let KernelArgs::Smoothquant { x, xscale, yscale, qy } = args.tensors else {
            return Err(KernelError::InvalidArguments(format!("{} got {kind} arguments", self.family())));
        };
        let d = problem.operands();
        check_tensor("X", x, &d[0])?;
        check_tensor("XScale", xscale, &d[1])?;
        check_tensor("YScale", yscale, &d[2])?;
        check_tensor("QY", qy, &d[3])?;

        let results = {
            let io = SmoothquantIo { x, xscale, yscale, qy };
            match self.desc.acc {
                DataType::F32 => self.run_host::<f32>(problem, grid, &io, args.post_op),
                DataType::F64 => self.run_host::<f64>(problem, grid, &io, args.post_op),
                other => {
                    return Err(KernelError::InvalidInstance(format!("{other} cannot accumulate smoothquant")));
                }
            }
        };

        for (qy_writes, scale_writes) in &results {
            qy.data_mut().scatter(qy_writes);
            yscale.data_mut().scatter(scale_writes);
        }
        Ok(())
    }
}

/// One staged k-tile: `Block_M × Block_K` of `X` and `Block_K` of `XScale`.
struct SmoothStage<A> {
    x: Vec<A>,
    scale: Vec<A>,
    /// Columns of the chunk inside the row.
    valid: usize,
}

struct AbsMaxProgram<'a, A> {
    x: &'a Tensor,
    xscale: &'a Tensor,
    tile: &'a TileShape,
    positions: &'a [Vec<(usize, usize)>],
    post_op: &'a dyn ElementwiseOp,
    m0: usize,
    rows: usize,
    cols: usize,
    _acc: PhantomData<A>,
}

impl<A: Accumulator> TileProgram for AbsMaxProgram<'_, A> {
    type Acc = A;
    type Stage = SmoothStage<A>;

    fn num_k_tiles(&self) -> usize {
        self.cols.div_ceil(self.tile.block_k)
    }

    fn num_warps(&self) -> usize {
        self.positions.len()
    }

    fn alloc_stage(&self) -> SmoothStage<A> {
        let bk = self.tile.block_k;
        SmoothStage {
            x: vec![A::zero(); self.tile.block_m * bk],
            scale: vec![A::zero(); bk],
            valid: 0,
        }
    }

    fn load(&self, tile: usize, slice: LoadSlice, stage: &mut SmoothStage<A>) {
        let bk = self.tile.block_k;
        let k0 = tile * bk;
        stage.valid = self.cols.saturating_sub(k0).min(bk);
        let part = slice.range(stage.x.len());
        let offsets: Vec<Option<usize>> = part
            .clone()
            .map(|e| {
                let (gm, gk) = (self.m0 + e / bk, k0 + e % bk);
                (gm < self.rows && gk < self.cols).then(|| self.x.desc().offset(&[gm, gk]))
            })
            .collect();
        self.x.data().gather(&offsets, A::zero(), &mut stage.x[part]);

        let part = slice.range(bk);
        let offsets: Vec<Option<usize>> = part
            .clone()
            .map(|e| (k0 + e < self.cols).then(|| self.xscale.desc().offset(&[k0 + e])))
            .collect();
        self.xscale.data().gather(&offsets, A::zero(), &mut stage.scale[part]);
    }

    fn compute(&self, stage: &SmoothStage<A>, warp: usize, acc: &mut [A]) {
        let bk = self.tile.block_k;
        for (slot, &(r, _)) in self.positions[warp].iter().enumerate() {
            let mut m = acc[slot];
            for (v, s) in stage.x[r * bk..r * bk + stage.valid].iter().zip(&stage.scale) {
                let y = finish(self.post_op, A::zero().mul_add(*v, *s).to_f64());
                m = m.max(A::from_f64(y.abs()));
            }
            acc[slot] = m;
        }
    }

    fn acc_init(&self, warp: usize) -> Vec<A> {
        vec![A::zero(); self.positions[warp].len()]
    }
}
