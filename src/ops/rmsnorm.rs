//! RMSNorm 2-D forward.
//!
//! For `X: [M, N]`, `Gamma: [N]`:
//!
//! ```text
//! inv_rms[m] = 1 / sqrt(mean_n(X[m, n]^2) + epsilon)
//! Y[m, n]    = op(X[m, n] · inv_rms[m] · Gamma[n])
//! ```
//!
//! The problem is modelled as `{m: M, n: 1, k: N}`: a block owns `Block_M`
//! rows and the pipeline walks each row in `Block_K` chunks, accumulating the
//! sum of squares (pass one). Once a row is fully reduced the block computes
//! its inverse RMS and writes the normalised row (pass two), optionally
//! saving `inv_rms` as well.

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

/// RMSNorm forward kernel instance.
#[derive(Debug)]
pub struct Rmsnorm2dKernel {
    desc: InstanceDescriptor,
    positions: Vec<Vec<(usize, usize)>>,
}

type Writes = Vec<(usize, f64)>;

struct RmsnormIo<'a> {
    x: &'a Tensor,
    gamma: &'a Tensor,
    y: &'a Tensor,
    inv_rms: Option<&'a Tensor>,
    epsilon: f64,
}

impl Rmsnorm2dKernel {
    pub(crate) fn new(desc: InstanceDescriptor) -> Self {
        let positions = warp_positions(&desc.tile);
        Self { desc, positions }
    }

    fn run_host<A: Accumulator>(
        &self,
        problem: &ProblemDesc,
        grid: &GridDims,
        io: &RmsnormIo<'_>,
        post_op: &dyn ElementwiseOp,
    ) -> Vec<(Writes, Writes)> {
        let planner = self.planner();
        let tile = &self.desc.tile;
        let ext = problem.extents()[0];
        let (rows_total, cols) = (ext.m, ext.k);

        run_blocks(grid, |x, y, z| {
            let origin = planner.block_origin(problem, x, y, z);
            let program = SquareSumProgram::<A> {
                x: io.x,
                tile,
                positions: &self.positions,
                m0: origin.m0,
                rows: rows_total,
                cols,
                _acc: PhantomData,
            };
            let state = run_block(&program, &self.desc.pipeline, false);
            let sums = assemble(&self.positions, state.into_accumulators(), 1, A::zero(), tile.block_m);

            let rows = (rows_total - origin.m0).min(tile.block_m);
            let mut y_writes = Vec::with_capacity(rows * cols);
            let mut inv_writes = Vec::new();
            for (r, sum) in sums.iter().take(rows).enumerate() {
                let row = origin.m0 + r;
                let mean = sum.to_f64() / cols as f64;
                let inv = A::from_f64(1.0 / (mean + io.epsilon).sqrt()).to_f64();
                for col in 0..cols {
                    let v = io.x.get(&[row, col]) * inv * io.gamma.get(&[col]);
                    y_writes.push((io.y.desc().offset(&[row, col]), finish(post_op, v)));
                }
                if let Some(t) = io.inv_rms {
                    inv_writes.push((t.desc().offset(&[row]), inv));
                }
            }
            (y_writes, inv_writes)
        })
    }
}

impl KernelInstance for Rmsnorm2dKernel {
    fn family(&self) -> OperationFamily {
        OperationFamily::Rmsnorm2dFwd
    }

    fn descriptor(&self) -> &InstanceDescriptor {
        &self.desc
    }

    fn stage_bytes(&self) -> usize {
        let t = &self.desc.tile;
        t.block_m * t.block_k * self.desc.dtypes[0].size_bytes()
    }

    fn supports(&self, problem: &ProblemDesc) -> Result<()> {
        if problem.k_batch() != 1 {
            return Err(KernelError::UnsupportedShape("RMSNorm rows cannot be split".into()));
        }
        Ok(())
    }

    fn execute(&self, args: LaunchArgs<'_>, grid: &GridDims) -> Result<()> {
        check_launch(self, args.problem, grid)?;
        let problem = args.problem;
        let kind = args.tensors.kind_name();
        let KernelArgs::Rmsnorm2d { x, gamma, y, inv_rms, epsilon } = args.tensors else {
            return Err(KernelError::InvalidArguments(format!("{} got {kind} arguments", self.family())));
        };
        let d = problem.operands();
        check_tensor("X", x, &d[0])?;
        check_tensor("Gamma", gamma, &d[1])?;
        check_tensor("Y", y, &d[2])?;
        let rows = problem.extents()[0].m;
        if let Some(t) = inv_rms.as_deref() {
            if t.desc().lengths() != [rows] || !t.desc().dtype().is_float() {
                return Err(KernelError::InvalidArguments(format!(
                    "inv_rms must be a float vector of {rows}, got {:?}/{}",
                    t.desc().lengths(),
                    t.desc().dtype()
                )));
            }
        }
        if epsilon.is_nan() || epsilon < 0.0 {
            return Err(KernelError::InvalidArguments(format!("epsilon must be non-negative, got {epsilon}")));
        }

        let results = {
            let io = RmsnormIo {
                x,
                gamma,
                y,
                inv_rms: inv_rms.as_deref(),
                epsilon: f64::from(epsilon),
            };
            match self.desc.acc {
                DataType::F32 => self.run_host::<f32>(problem, grid, &io, args.post_op),
                DataType::F64 => self.run_host::<f64>(problem, grid, &io, args.post_op),
                other => {
                    return Err(KernelError::InvalidInstance(format!("{other} cannot accumulate RMSNorm")));
                }
            }
        };

        let mut inv_rms = inv_rms;
        for (y_writes, inv_writes) in &results {
            y.data_mut().scatter(y_writes);
            if let Some(t) = inv_rms.as_deref_mut() {
                t.data_mut().scatter(inv_writes);
            }
        }
        Ok(())
    }
}

struct SquareSumProgram<'a, A> {
    x: &'a Tensor,
    tile: &'a TileShape,
    positions: &'a [Vec<(usize, usize)>],
    m0: usize,
    rows: usize,
    cols: usize,
    _acc: PhantomData<A>,
}

impl<A: Accumulator> TileProgram for SquareSumProgram<'_, A> {
    type Acc = A;
    type Stage = Vec<A>;

    fn num_k_tiles(&self) -> usize {
        self.cols.div_ceil(self.tile.block_k)
    }

    fn num_warps(&self) -> usize {
        self.positions.len()
    }

    fn alloc_stage(&self) -> Vec<A> {
        vec![A::zero(); self.tile.block_m * self.tile.block_k]
    }

    fn load(&self, tile: usize, slice: LoadSlice, stage: &mut Vec<A>) {
        let bk = self.tile.block_k;
        let k0 = tile * bk;
        let part = slice.range(stage.len());
        let offsets: Vec<Option<usize>> = part
            .clone()
            .map(|e| {
                let (gm, gk) = (self.m0 + e / bk, k0 + e % bk);
                (gm < self.rows && gk < self.cols).then(|| self.x.desc().offset(&[gm, gk]))
            })
            .collect();
        self.x.data().gather(&offsets, A::zero(), &mut stage[part]);
    }

    fn compute(&self, stage: &Vec<A>, warp: usize, acc: &mut [A]) {
        let bk = self.tile.block_k;
        for (slot, &(r, _)) in self.positions[warp].iter().enumerate() {
            let mut s = acc[slot];
            for v in &stage[r * bk..(r + 1) * bk] {
                s = s.mul_add(*v, *v);
            }
            acc[slot] = s;
        }
    }

    fn acc_init(&self, warp: usize) -> Vec<A> {
        vec![A::zero(); self.positions[warp].len()]
    }
}
