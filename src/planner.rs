//! Tile partition planning.
//!
//! # Tile Partition Planner
//!
//! Maps a [`ProblemDesc`] onto the execution hierarchy of the accelerator:
//!
//! ```text
//! problem  M × N × K
//!   └─ grid of block tiles      Block_M × Block_N   (x: M, y: N, z: split-K)
//!        └─ warps               Warps_M × Warps_N   (contiguous or strided)
//!             └─ lanes          vector-wide chunks of N dealt round-robin
//! ```
//!
//! ## Design Highlights
//! - Grid extents round up; dimensions that do not divide must be covered by
//!   both the instance's padding tag and the caller's allowance, otherwise the
//!   instance cannot serve the problem ([`KernelError::UnsupportedShape`]).
//! - Grouped problems flatten every group's tile grid into grid `x`, in group
//!   order, so a single launch serves all groups.
//! - [`BlockPartition`] is a bijection between block-tile elements and
//!   `(warp, lane, slot)` triples; [`BlockPartition::owner`] is its inverse.
//!
//! ## Example
//!
//! ```rust
//! use tile_kernels::dtype::DataType;
//! use tile_kernels::planner::{compute_grid_shape, GridDims, TileShape};
//! use tile_kernels::problem::{Layout, OperandDesc, Padding, ProblemDesc};
//!
//! let op = |r, c| OperandDesc::packed(&[r, c], DataType::F16, Layout::RowMajor).unwrap();
//! let p = ProblemDesc::gemm(op(127, 64), op(64, 255), op(127, 255)).unwrap();
//! let tile = TileShape::new(128, 256, 64);
//! let grid = compute_grid_shape(&p, &tile, Padding::PadMN).unwrap();
//! assert_eq!(grid, GridDims { x: 1, y: 1, z: 1 });
//! ```

use crate::error::{KernelError, Result};
use crate::problem::{Extents, PadMask, Padding, ProblemDesc, ProblemKind};

/// How warps are arranged over the block tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WarpLayout {
    /// Each warp owns one contiguous sub-tile.
    #[default]
    Contiguous,
    /// Warps interleave rows and vector chunks.
    Strided,
}

/// Block, warp and lane extents of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileShape {
    /// Rows of output per block.
    pub block_m: usize,
    /// Columns of output per block.
    pub block_n: usize,
    /// Reduction elements staged per pipeline step.
    pub block_k: usize,
    /// Warps along M.
    pub warps_m: usize,
    /// Warps along N.
    pub warps_n: usize,
    /// Lanes per warp.
    pub warp_size: usize,
    /// Consecutive N elements per lane chunk.
    pub vector: usize,
    /// Warp arrangement.
    pub warp_layout: WarpLayout,
}

impl TileShape {
    /// Block extents with a single warp of 64 lanes and scalar chunks.
    pub const fn new(block_m: usize, block_n: usize, block_k: usize) -> Self {
        Self {
            block_m,
            block_n,
            block_k,
            warps_m: 1,
            warps_n: 1,
            warp_size: 64,
            vector: 1,
            warp_layout: WarpLayout::Contiguous,
        }
    }

    /// Sets the warp grid.
    #[must_use]
    pub const fn warps(mut self, warps_m: usize, warps_n: usize) -> Self {
        self.warps_m = warps_m;
        self.warps_n = warps_n;
        self
    }

    /// Sets the per-lane vector width.
    #[must_use]
    pub const fn vector(mut self, vector: usize) -> Self {
        self.vector = vector;
        self
    }

    /// Sets the lanes per warp.
    #[must_use]
    pub const fn warp_size(mut self, warp_size: usize) -> Self {
        self.warp_size = warp_size;
        self
    }

    /// Sets the warp arrangement.
    #[must_use]
    pub const fn warp_layout(mut self, layout: WarpLayout) -> Self {
        self.warp_layout = layout;
        self
    }

    /// Threads per block.
    pub const fn threads(&self) -> usize {
        self.warps_m * self.warps_n * self.warp_size
    }

    /// Number of warps per block.
    pub const fn num_warps(&self) -> usize {
        self.warps_m * self.warps_n
    }

    /// Checks that warps and vectors tile the block exactly.
    ///
    /// # Errors
    /// [`KernelError::InvalidInstance`] otherwise.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            self.block_m,
            self.block_n,
            self.block_k,
            self.warps_m,
            self.warps_n,
            self.warp_size,
            self.vector,
        ];
        if fields.contains(&0) {
            return Err(KernelError::InvalidInstance(format!("tile has a zero extent: {self:?}")));
        }
        if self.block_m % self.warps_m != 0 {
            return Err(KernelError::InvalidInstance(format!(
                "Block_M {} is not a multiple of Warps_M {}",
                self.block_m, self.warps_m
            )));
        }
        if self.block_n % (self.warps_n * self.vector) != 0 {
            return Err(KernelError::InvalidInstance(format!(
                "Block_N {} is not a multiple of Warps_N {} x vector {}",
                self.block_n, self.warps_n, self.vector
            )));
        }
        Ok(())
    }
}

/// Launch grid extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridDims {
    /// Tiles along M (or all tiles of a grouped problem).
    pub x: usize,
    /// Tiles along N.
    pub y: usize,
    /// Split-K partitions.
    pub z: usize,
}

impl GridDims {
    /// Total number of blocks.
    pub const fn blocks(&self) -> usize {
        self.x * self.y * self.z
    }

    /// Block coordinates of a linear block id; `x` varies fastest.
    pub const fn coords(&self, id: usize) -> (usize, usize, usize) {
        (id % self.x, (id / self.x) % self.y, id / (self.x * self.y))
    }
}

/// Dimensions of `problem` that do not divide `tile`.
pub fn required_padding(problem: &ProblemDesc, tile: &TileShape) -> PadMask {
    let k_step = tile.block_k * problem.k_batch();
    problem.extents().iter().fold(PadMask::NONE, |acc, e| {
        let mut mask = acc;
        if e.m % tile.block_m != 0 {
            mask = mask.union(PadMask::M);
        }
        if e.n % tile.block_n != 0 {
            mask = mask.union(PadMask::N);
        }
        if e.k % k_step != 0 {
            mask = mask.union(PadMask::K);
        }
        mask
    })
}

fn tiles_of(e: &Extents, tile: &TileShape) -> (usize, usize) {
    (e.m.div_ceil(tile.block_m), e.n.div_ceil(tile.block_n))
}

/// Grid needed to cover `problem` with `tile` under an instance's `padding`.
///
/// # Errors
/// [`KernelError::UnsupportedShape`] when a dimension that does not divide
/// the tile is not covered by `padding` or by the problem's own allowance.
pub fn compute_grid_shape(problem: &ProblemDesc, tile: &TileShape, padding: Padding) -> Result<GridDims> {
    let required = required_padding(problem, tile);
    if !padding.covers(required) {
        return Err(KernelError::UnsupportedShape(format!(
            "tile {}x{}x{} leaves {required} ragged but the instance only pads {}",
            tile.block_m,
            tile.block_n,
            tile.block_k,
            padding.mask()
        )));
    }
    if !problem.padding().covers(required) {
        return Err(KernelError::UnsupportedShape(format!(
            "tile {}x{}x{} leaves {required} ragged but the problem only allows {}",
            tile.block_m,
            tile.block_n,
            tile.block_k,
            problem.padding().mask()
        )));
    }

    let z = problem.k_batch();
    if problem.kind() == ProblemKind::GroupedGemm {
        let x = problem
            .extents()
            .iter()
            .map(|e| {
                let (tm, tn) = tiles_of(e, tile);
                tm * tn
            })
            .sum();
        return Ok(GridDims { x, y: 1, z });
    }

    let (x, y) = tiles_of(&problem.extents()[0], tile);
    Ok(GridDims { x, y, z })
}

/// Where one block sits in the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOrigin {
    /// Group the block belongs to.
    pub group: usize,
    /// First output row.
    pub m0: usize,
    /// First output column.
    pub n0: usize,
    /// First reduction index of this split.
    pub k_begin: usize,
    /// One past the last reduction index of this split.
    pub k_end: usize,
}

/// The planner bound to one instance's tile and padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlanner {
    tile: TileShape,
    padding: Padding,
}

impl TilePlanner {
    /// Planner for an instance.
    pub const fn new(tile: TileShape, padding: Padding) -> Self {
        Self { tile, padding }
    }

    /// Tile shape.
    pub const fn tile(&self) -> &TileShape {
        &self.tile
    }

    /// Instance padding tag.
    pub const fn padding(&self) -> Padding {
        self.padding
    }

    /// See [`compute_grid_shape`].
    ///
    /// # Errors
    /// [`KernelError::UnsupportedShape`] when the tile does not cover the
    /// problem.
    pub fn grid_shape(&self, problem: &ProblemDesc) -> Result<GridDims> {
        compute_grid_shape(problem, &self.tile, self.padding)
    }

    /// Reduction elements handled by one split-K partition.
    pub fn k_per_split(&self, problem: &ProblemDesc, group: usize) -> usize {
        let k = problem.extents()[group].k;
        let step = self.tile.block_k * problem.k_batch();
        k.div_ceil(step) * self.tile.block_k
    }

    /// Origin of the block at grid coordinates `(x, y, z)`.
    pub fn block_origin(&self, problem: &ProblemDesc, x: usize, y: usize, z: usize) -> BlockOrigin {
        let (group, tm, tn) = if problem.kind() == ProblemKind::GroupedGemm {
            let mut local = x;
            let mut group = 0;
            for (g, e) in problem.extents().iter().enumerate() {
                let (tm, tn) = tiles_of(e, &self.tile);
                group = g;
                if local < tm * tn {
                    break;
                }
                local -= tm * tn;
            }
            let (_, tn) = tiles_of(&problem.extents()[group], &self.tile);
            (group, local / tn, local % tn)
        } else {
            (0, x, y)
        };

        let k = problem.extents()[group].k;
        let per_split = self.k_per_split(problem, group);
        let k_begin = (z * per_split).min(k);
        let k_end = (k_begin + per_split).min(k);
        BlockOrigin {
            group,
            m0: tm * self.tile.block_m,
            n0: tn * self.tile.block_n,
            k_begin,
            k_end,
        }
    }

    /// Intra-block distribution of this tile.
    pub fn partition(&self) -> BlockPartition {
        BlockPartition::new(&self.tile)
    }
}

/// Location of one block-tile element in the warp/lane hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaneSlot {
    /// Warp id, `wm · Warps_N + wn`.
    pub warp: usize,
    /// Lane within the warp.
    pub lane: usize,
    /// Register slot within the lane.
    pub slot: usize,
}

/// Distribution of a block tile over warps and lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPartition {
    tile: TileShape,
}

impl BlockPartition {
    /// Partition of `tile`. The tile must have passed [`TileShape::validate`].
    pub const fn new(tile: &TileShape) -> Self {
        Self { tile: *tile }
    }

    const fn warp_tile_m(&self) -> usize {
        self.tile.block_m / self.tile.warps_m
    }

    const fn chunks_per_warp_row(&self) -> usize {
        self.tile.block_n / self.tile.warps_n / self.tile.vector
    }

    /// Warps per block.
    pub const fn warps(&self) -> usize {
        self.tile.num_warps()
    }

    fn split_row(&self, r: usize) -> (usize, usize) {
        match self.tile.warp_layout {
            WarpLayout::Contiguous => (r / self.warp_tile_m(), r % self.warp_tile_m()),
            WarpLayout::Strided => (r % self.tile.warps_m, r / self.tile.warps_m),
        }
    }

    fn split_chunk(&self, cc: usize) -> (usize, usize) {
        let cpw = self.chunks_per_warp_row();
        match self.tile.warp_layout {
            WarpLayout::Contiguous => (cc / cpw, cc % cpw),
            WarpLayout::Strided => (cc % self.tile.warps_n, cc / self.tile.warps_n),
        }
    }

    fn join_row(&self, wm: usize, i: usize) -> usize {
        match self.tile.warp_layout {
            WarpLayout::Contiguous => wm * self.warp_tile_m() + i,
            WarpLayout::Strided => i * self.tile.warps_m + wm,
        }
    }

    fn join_chunk(&self, wn: usize, lc: usize) -> usize {
        match self.tile.warp_layout {
            WarpLayout::Contiguous => wn * self.chunks_per_warp_row() + lc,
            WarpLayout::Strided => lc * self.tile.warps_n + wn,
        }
    }

    /// The `(warp, lane, slot)` owning block-local element `(m, n)`.
    pub fn owner(&self, m: usize, n: usize) -> LaneSlot {
        let v = self.tile.vector;
        let (wm, i) = self.split_row(m);
        let (wn, lc) = self.split_chunk(n / v);
        let q = i * self.chunks_per_warp_row() + lc;
        LaneSlot {
            warp: wm * self.tile.warps_n + wn,
            lane: q % self.tile.warp_size,
            slot: (q / self.tile.warp_size) * v + n % v,
        }
    }

    fn chunk_origin(&self, warp: usize, q: usize) -> (usize, usize) {
        let cpw = self.chunks_per_warp_row();
        let (wm, wn) = (warp / self.tile.warps_n, warp % self.tile.warps_n);
        let (i, lc) = (q / cpw, q % cpw);
        (self.join_row(wm, i), self.join_chunk(wn, lc) * self.tile.vector)
    }

    /// Block-local elements held by one lane, in slot order.
    pub fn fragment(&self, warp: usize, lane: usize) -> Vec<(usize, usize)> {
        let total = self.warp_tile_m() * self.chunks_per_warp_row();
        let mut out = Vec::new();
        for q in (lane..total).step_by(self.tile.warp_size) {
            let (r, c0) = self.chunk_origin(warp, q);
            out.extend((0..self.tile.vector).map(|e| (r, c0 + e)));
        }
        out
    }

    /// Every block-local element owned by a warp, in chunk order.
    pub fn positions(&self, warp: usize) -> Vec<(usize, usize)> {
        let total = self.warp_tile_m() * self.chunks_per_warp_row();
        let mut out = Vec::with_capacity(total * self.tile.vector);
        for q in 0..total {
            let (r, c0) = self.chunk_origin(warp, q);
            out.extend((0..self.tile.vector).map(|e| (r, c0 + e)));
        }
        out
    }
}
