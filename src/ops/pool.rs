//! 3-D pooling over `NDHWC` tensors, forward and average backward.
//!
//! The forward problem is modelled as `{m: N·Do·Ho·Wo, n: C, k: Z·Y·X}`: a
//! block owns `Block_M` output positions by `Block_N` channels and the
//! pipeline walks the window taps in `Block_K` chunks.
//!
//! Taps that fall into the padding read as the reduction identity, so
//! [`ReduceOp::Max`] ignores them while [`ReduceOp::Avg`] counts them: the
//! average always divides by the full window volume. A max window made only
//! of padding is rejected when the problem is built.
//!
//! The backward pass swaps the roles: rows are `dIn` positions and tap `t`
//! reads the `dOut` position whose window put `t` over that row, if any.
//! Rows covered by no window receive zero.

use core::marker::PhantomData;

use crate::dtype::{Accumulator, DataType};
use crate::error::{KernelError, Result};
use crate::kernel::{InstanceDescriptor, KernelArgs, KernelInstance, LaunchArgs, OperationFamily, check_launch, check_tensor};
use crate::ops::elementwise::finish;
use crate::ops::{assemble, run_blocks, warp_positions};
use crate::pipeline::{LoadSlice, TileProgram, run_block};
use crate::planner::{BlockOrigin, GridDims, TileShape};
use crate::problem::{Extents, PoolWindow, ProblemDesc, ReduceOp};
use crate::tensors::Tensor;

/// Which way a row's taps map onto the source tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Output row, input taps.
    Forward,
    /// Input-gradient row, output-gradient taps.
    Backward,
}

/// Pooling kernel instance, forward or average backward.
#[derive(Debug)]
pub struct Pool3dKernel {
    family: OperationFamily,
    desc: InstanceDescriptor,
    positions: Vec<Vec<(usize, usize)>>,
}

impl Pool3dKernel {
    pub(crate) fn new(family: OperationFamily, desc: InstanceDescriptor) -> Self {
        let positions = warp_positions(&desc.tile);
        Self { family, desc, positions }
    }

    fn direction(&self) -> Direction {
        if self.family == OperationFamily::AvgPool3dBwd {
            Direction::Backward
        } else {
            Direction::Forward
        }
    }

    fn run_host<A: Accumulator>(
        &self,
        problem: &ProblemDesc,
        window: &PoolWindow,
        grid: &GridDims,
        source: &Tensor,
    ) -> Vec<(BlockOrigin, Vec<A>)> {
        let planner = self.planner();
        let tile = &self.desc.tile;
        let l = problem.operands()[1].lengths();
        let dest_spatial = [l[1], l[2], l[3]];
        let direction = self.direction();

        run_blocks(grid, |x, y, z| {
            let origin = planner.block_origin(problem, x, y, z);
            let program = PoolProgram::<A> {
                source,
                window,
                dest_spatial,
                direction,
                tile,
                positions: &self.positions,
                origin,
                extents: problem.extents()[0],
                reduce: self.desc.reduce,
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
        })
    }
}

impl KernelInstance for Pool3dKernel {
    fn family(&self) -> OperationFamily {
        self.family
    }

    fn descriptor(&self) -> &InstanceDescriptor {
        &self.desc
    }

    fn stage_bytes(&self) -> usize {
        let t = &self.desc.tile;
        t.block_m * t.block_k * t.block_n * self.desc.dtypes[0].size_bytes()
    }

    fn supports(&self, problem: &ProblemDesc) -> Result<()> {
        if problem.k_batch() != 1 {
            return Err(KernelError::UnsupportedShape("pooling windows cannot be split".into()));
        }
        Ok(())
    }

    fn execute(&self, args: LaunchArgs<'_>, grid: &GridDims) -> Result<()> {
        check_launch(self, args.problem, grid)?;
        let problem = args.problem;
        let kind = args.tensors.kind_name();
        let (source, output) = match (self.direction(), args.tensors) {
            (Direction::Forward, KernelArgs::Pool3d { input, output }) => {
                check_tensor("input", input, &problem.operands()[0])?;
                check_tensor("output", output, &problem.operands()[1])?;
                (input, output)
            }
            (Direction::Backward, KernelArgs::AvgPool3dBwd { dout, din }) => {
                check_tensor("dOut", dout, &problem.operands()[0])?;
                check_tensor("dIn", din, &problem.operands()[1])?;
                (dout, din)
            }
            _ => {
                return Err(KernelError::InvalidArguments(format!("{} got {kind} arguments", self.family)));
            }
        };
        let Some(window) = problem.pool() else {
            return Err(KernelError::InvalidArguments("pooling problem has no window".into()));
        };
        if problem.reduce() != self.desc.reduce {
            return Err(KernelError::InvalidArguments(format!(
                "problem reduces by {}, instance by {}",
                problem.reduce(),
                self.desc.reduce
            )));
        }

        let volume = window.volume() as f64;
        let reduce = self.desc.reduce;
        let tile = self.desc.tile;
        let ext = problem.extents()[0];
        let post_op = args.post_op;
        let mut store = |origin: &BlockOrigin, value: &dyn Fn(usize) -> f64| {
            let rows = (ext.m - origin.m0).min(tile.block_m);
            let cols = (ext.n - origin.n0).min(tile.block_n);
            let mut writes = Vec::with_capacity(rows * cols);
            for r in 0..rows {
                for c in 0..cols {
                    let v = value(r * tile.block_n + c);
                    let v = if reduce == ReduceOp::Avg { v / volume } else { v };
                    let offset = row_offset(output, origin.m0 + r) + (origin.n0 + c) * output.desc().strides()[4];
                    writes.push((offset, finish(post_op, v)));
                }
            }
            output.data_mut().scatter(&writes);
        };

        match self.desc.acc {
            DataType::F32 => {
                for (origin, vals) in self.run_host::<f32>(problem, window, grid, source) {
                    store(&origin, &|i| vals[i].to_f64());
                }
            }
            DataType::F64 => {
                for (origin, vals) in self.run_host::<f64>(problem, window, grid, source) {
                    store(&origin, &|i| vals[i].to_f64());
                }
            }
            DataType::I32 => {
                for (origin, vals) in self.run_host::<i32>(problem, window, grid, source) {
                    store(&origin, &|i| vals[i].to_f64());
                }
            }
            other => {
                return Err(KernelError::InvalidInstance(format!("{other} is not an accumulator type")));
            }
        }
        Ok(())
    }
}

/// Splits a flattened output row into `(n, do, ho, wo)` and returns its
/// storage offset at channel zero.
fn row_offset(t: &Tensor, row: usize) -> usize {
    let l = t.desc().lengths();
    let s = t.desc().strides();
    let wo = row % l[3];
    let ho = (row / l[3]) % l[2];
    let d = (row / (l[3] * l[2])) % l[1];
    let n = row / (l[3] * l[2] * l[1]);
    n * s[0] + d * s[1] + ho * s[2] + wo * s[3]
}

struct PoolProgram<'a, A> {
    source: &'a Tensor,
    window: &'a PoolWindow,
    dest_spatial: [usize; 3],
    direction: Direction,
    tile: &'a TileShape,
    positions: &'a [Vec<(usize, usize)>],
    origin: BlockOrigin,
    extents: Extents,
    reduce: ReduceOp,
    _acc: PhantomData<A>,
}

impl<A: Accumulator> PoolProgram<'_, A> {
    fn identity(&self) -> A {
        match self.reduce {
            ReduceOp::Max => A::lowest(),
            ReduceOp::Sum | ReduceOp::Avg => A::zero(),
        }
    }

    /// Source offset read by row `row`, tap `tap`, channel `c`, or `None`
    /// when the tap has no source element.
    fn tap_offset(&self, row: usize, tap: usize, c: usize) -> Option<usize> {
        let [dd, dh, dw] = self.dest_spatial;
        let w = self.window;
        let dest = [(row / (dh * dw)) % dd, (row / dw) % dh, row % dw];
        let n = row / (dd * dh * dw);
        let taps = [tap / (w.lengths[1] * w.lengths[2]), (tap / w.lengths[2]) % w.lengths[1], tap % w.lengths[2]];

        let src_lengths = self.source.desc().lengths();
        let mut index = [n, 0, 0, 0, c];
        for axis in 0..3 {
            let pos = match self.direction {
                Direction::Forward => (dest[axis] * w.strides[axis] + taps[axis] * w.dilations[axis])
                    .checked_sub(w.left_pads[axis])?,
                Direction::Backward => {
                    let shifted = (dest[axis] + w.left_pads[axis]).checked_sub(taps[axis] * w.dilations[axis])?;
                    if shifted % w.strides[axis] != 0 {
                        return None;
                    }
                    shifted / w.strides[axis]
                }
            };
            if pos >= src_lengths[axis + 1] {
                return None;
            }
            index[axis + 1] = pos;
        }
        Some(self.source.desc().offset(&index))
    }
}

impl<A: Accumulator> TileProgram for PoolProgram<'_, A> {
    type Acc = A;
    type Stage = Vec<A>;

    fn num_k_tiles(&self) -> usize {
        (self.origin.k_end - self.origin.k_begin).div_ceil(self.tile.block_k)
    }

    fn num_warps(&self) -> usize {
        self.positions.len()
    }

    fn alloc_stage(&self) -> Vec<A> {
        let t = self.tile;
        vec![A::zero(); t.block_m * t.block_k * t.block_n]
    }

    fn load(&self, tile: usize, slice: LoadSlice, stage: &mut Vec<A>) {
        let (bn, bk) = (self.tile.block_n, self.tile.block_k);
        let k0 = self.origin.k_begin + tile * bk;
        let part = slice.range(stage.len());
        let offsets: Vec<Option<usize>> = part
            .clone()
            .map(|e| {
                let (r, kk, c) = (e / (bk * bn), (e / bn) % bk, e % bn);
                let (row, tap, ch) = (self.origin.m0 + r, k0 + kk, self.origin.n0 + c);
                if row < self.extents.m && ch < self.extents.n && tap < self.origin.k_end {
                    self.tap_offset(row, tap, ch)
                } else {
                    None
                }
            })
            .collect();
        self.source.data().gather(&offsets, self.identity(), &mut stage[part]);
    }

    fn compute(&self, stage: &Vec<A>, warp: usize, acc: &mut [A]) {
        let (bn, bk) = (self.tile.block_n, self.tile.block_k);
        for (slot, &(r, c)) in self.positions[warp].iter().enumerate() {
            let mut s = acc[slot];
            for kk in 0..bk {
                let v = stage[(r * bk + kk) * bn + c];
                s = match self.reduce {
                    ReduceOp::Max => s.max(v),
                    ReduceOp::Sum | ReduceOp::Avg => s.add(v),
                };
            }
            acc[slot] = s;
        }
    }

    fn acc_init(&self, warp: usize) -> Vec<A> {
        vec![self.identity(); self.positions[warp].len()]
    }
}
