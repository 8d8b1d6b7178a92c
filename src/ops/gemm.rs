//! GEMM kernels: plain, split-K and grouped.
//!
//! `C = op(A · B)` with `A: [M, K]`, `B: [K, N]`, `C: [M, N]`, any mix of row-
//! and column-major operands (all addressing goes through strides).
//!
//! # Block program
//!
//! A stage holds one `Block_M × Block_K` tile of `A` and one
//! `Block_K × Block_N` tile of `B`, widened to the accumulator type. Loads
//! outside the problem (or outside the block's split-K range) read as zero.
//! Each warp reduces its own output positions over the staged `k` in
//! ascending order.
//!
//! # Split-K
//!
//! Grid `z` partitions K. Partials of the same output tile are folded in
//! `z` order in the accumulator type before the epilogue, so results do not
//! depend on block completion order.
//!
//! # Grouped
//!
//! Grid `x` enumerates every group's tiles in group order; a block looks up
//! its group through the planner and reads that group's tensors.

use core::marker::PhantomData;

#[cfg(feature = "wgpu")]
use log::warn;

use crate::dtype::{Accumulator, DataType};
use crate::error::{KernelError, Result};
use crate::kernel::{
    GemmOperands, InstanceDescriptor, KernelArgs, KernelInstance, LaunchArgs, OperationFamily, check_launch,
    check_tensor,
};
use crate::ops::elementwise::{ElementwiseOp, finish};
use crate::ops::{assemble, run_blocks, warp_positions};
use crate::pipeline::{LoadSlice, TileProgram, run_block};
use crate::planner::{BlockOrigin, GridDims, TileShape};
use crate::problem::ProblemDesc;
use crate::tensors::Tensor;

/// GEMM-family kernel instance.
#[derive(Debug)]
pub struct GemmKernel {
    family: OperationFamily,
    desc: InstanceDescriptor,
    positions: Vec<Vec<(usize, usize)>>,
}

impl GemmKernel {
    pub(crate) fn new(family: OperationFamily, desc: InstanceDescriptor) -> Self {
        let positions = warp_positions(&desc.tile);
        Self { family, desc, positions }
    }

    fn run_host<A: Accumulator>(
        &self,
        problem: &ProblemDesc,
        grid: &GridDims,
        groups: &mut [GemmOperands<'_>],
        post_op: &dyn ElementwiseOp,
    ) {
        let planner = self.planner();
        let tile = &self.desc.tile;
        let inputs: Vec<(&Tensor, &Tensor)> = groups.iter().map(|g| (g.a, g.b)).collect();

        let partials: Vec<(BlockOrigin, Vec<A>)> = run_blocks(grid, |x, y, z| {
            let origin = planner.block_origin(problem, x, y, z);
            let ext = problem.extents()[origin.group];
            let (a, b) = inputs[origin.group];
            let program = GemmProgram::<A> {
                a,
                b,
                tile,
                positions: &self.positions,
                origin,
                m: ext.m,
                n: ext.n,
                _acc: PhantomData,
            };
            let state = run_block(&program, &self.desc.pipeline, false);
            let values = assemble(
                &self.positions,
                state.into_accumulators(),
                tile.block_n,
                A::zero(),
                tile.block_m * tile.block_n,
            );
            (origin, values)
        });

        let plane = grid.x * grid.y;
        for id in 0..plane {
            let (origin, first) = &partials[id];
            let mut acc = first.clone();
            for z in 1..grid.z {
                for (s, p) in acc.iter_mut().zip(&partials[id + z * plane].1) {
                    *s = s.add(*p);
                }
            }

            let ext = problem.extents()[origin.group];
            let rows = (ext.m - origin.m0).min(tile.block_m);
            let cols = (ext.n - origin.n0).min(tile.block_n);
            let c = &mut groups[origin.group].c;
            let mut writes = Vec::with_capacity(rows * cols);
            for r in 0..rows {
                for col in 0..cols {
                    let v = finish(post_op, acc[r * tile.block_n + col].to_f64());
                    writes.push((c.desc().offset(&[origin.m0 + r, origin.n0 + col]), v));
                }
            }
            c.data_mut().scatter(&writes);
        }
    }
}

impl KernelInstance for GemmKernel {
    fn family(&self) -> OperationFamily {
        self.family
    }

    fn descriptor(&self) -> &InstanceDescriptor {
        &self.desc
    }

    fn stage_bytes(&self) -> usize {
        let t = &self.desc.tile;
        t.block_m * t.block_k * self.desc.dtypes[0].size_bytes() + t.block_k * t.block_n * self.desc.dtypes[1].size_bytes()
    }

    fn supports(&self, problem: &ProblemDesc) -> Result<()> {
        if self.family != OperationFamily::GemmSplitK && problem.k_batch() != 1 {
            return Err(KernelError::UnsupportedShape(format!(
                "{} does not split K (k_batch = {})",
                self.family,
                problem.k_batch()
            )));
        }
        Ok(())
    }

    fn execute(&self, args: LaunchArgs<'_>, grid: &GridDims) -> Result<()> {
        check_launch(self, args.problem, grid)?;
        let problem = args.problem;
        let mut groups = match args.tensors {
            KernelArgs::Gemm(ops) => vec![ops],
            KernelArgs::GroupedGemm(groups) => groups,
            other => {
                return Err(KernelError::InvalidArguments(format!(
                    "{} got {} arguments",
                    self.family,
                    other.kind_name()
                )));
            }
        };
        if groups.len() != problem.extents().len() {
            return Err(KernelError::InvalidArguments(format!(
                "{} operand groups for a {}-group problem",
                groups.len(),
                problem.extents().len()
            )));
        }
        for (g, ops) in groups.iter().enumerate() {
            let d = &problem.operands()[3 * g..3 * g + 3];
            check_tensor("A", ops.a, &d[0])?;
            check_tensor("B", ops.b, &d[1])?;
            check_tensor("C", &*ops.c, &d[2])?;
        }

        #[cfg(feature = "wgpu")]
        if crate::backend::get_backend() == crate::backend::Backend::Wgpu {
            match crate::ops::wgpu::try_gemm(self, problem, &mut groups, args.post_op) {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => warn!("{}: {e}; falling back to the host pipeline", self.name()),
            }
        }

        match self.desc.acc {
            DataType::F32 => self.run_host::<f32>(problem, grid, &mut groups, args.post_op),
            DataType::F64 => self.run_host::<f64>(problem, grid, &mut groups, args.post_op),
            DataType::I32 => self.run_host::<i32>(problem, grid, &mut groups, args.post_op),
            other => {
                return Err(KernelError::InvalidInstance(format!("{other} is not an accumulator type")));
            }
        }
        Ok(())
    }
}

struct GemmStage<A> {
    a: Vec<A>,
    b: Vec<A>,
}

struct GemmProgram<'a, A> {
    a: &'a Tensor,
    b: &'a Tensor,
    tile: &'a TileShape,
    positions: &'a [Vec<(usize, usize)>],
    origin: BlockOrigin,
    m: usize,
    n: usize,
    _acc: PhantomData<A>,
}

impl<A: Accumulator> TileProgram for GemmProgram<'_, A> {
    type Acc = A;
    type Stage = GemmStage<A>;

    fn num_k_tiles(&self) -> usize {
        (self.origin.k_end - self.origin.k_begin).div_ceil(self.tile.block_k)
    }

    fn num_warps(&self) -> usize {
        self.positions.len()
    }

    fn alloc_stage(&self) -> GemmStage<A> {
        let t = self.tile;
        GemmStage {
            a: vec![A::zero(); t.block_m * t.block_k],
            b: vec![A::zero(); t.block_k * t.block_n],
        }
    }

    fn load(&self, tile: usize, slice: LoadSlice, stage: &mut GemmStage<A>) {
        let (bm, bn, bk) = (self.tile.block_m, self.tile.block_n, self.tile.block_k);
        let (m0, n0) = (self.origin.m0, self.origin.n0);
        let k0 = self.origin.k_begin + tile * bk;
        let k_end = self.origin.k_end;
        let a_len = bm * bk;
        let range = slice.range(a_len + bk * bn);

        let a_part = range.start.min(a_len)..range.end.min(a_len);
        if !a_part.is_empty() {
            let offsets: Vec<Option<usize>> = a_part
                .clone()
                .map(|e| {
                    let (gm, gk) = (m0 + e / bk, k0 + e % bk);
                    (gm < self.m && gk < k_end).then(|| self.a.desc().offset(&[gm, gk]))
                })
                .collect();
            self.a.data().gather(&offsets, A::zero(), &mut stage.a[a_part]);
        }

        let b_part = range.start.max(a_len) - a_len..range.end.max(a_len) - a_len;
        if !b_part.is_empty() {
            let offsets: Vec<Option<usize>> = b_part
                .clone()
                .map(|e| {
                    let (gk, gn) = (k0 + e / bn, n0 + e % bn);
                    (gk < k_end && gn < self.n).then(|| self.b.desc().offset(&[gk, gn]))
                })
                .collect();
            self.b.data().gather(&offsets, A::zero(), &mut stage.b[b_part]);
        }
    }

    fn compute(&self, stage: &GemmStage<A>, warp: usize, acc: &mut [A]) {
        let (bn, bk) = (self.tile.block_n, self.tile.block_k);
        for (slot, &(r, c)) in self.positions[warp].iter().enumerate() {
            let mut s = acc[slot];
            for kk in 0..bk {
                s = s.mul_add(stage.a[r * bk + kk], stage.b[kk * bn + c]);
            }
            acc[slot] = s;
        }
    }

    fn acc_init(&self, warp: usize) -> Vec<A> {
        vec![A::zero(); self.positions[warp].len()]
    }
}
