//! Problem descriptors.
//!
//! A [`ProblemDesc`] is the immutable, validated description of one kernel
//! invocation: operand shapes and strides, element types, layout tags, the
//! padding the caller allows, the split-K factor and (for pooling) the window.
//! It never owns data; tensors are passed separately at launch.
//!
//! ## Design Highlights
//! - Public constructors take signed extents so that zero or negative values
//!   coming from user code surface as [`KernelError::InvalidShape`] instead of
//!   wrapping around.
//! - Every family is reduced to one or more `M × N × K` [`Extents`], which is
//!   what the planner and the pipeline actually consume. RMSNorm reduces along
//!   its row, so it is modelled as `{m: rows, n: 1, k: cols}`. Pooling reduces
//!   over the window: `{m: N·Do·Ho·Wo, n: C, k: Z·Y·X}`.
//! - Strides are always honoured; the layout tag only has to be *consistent*
//!   with them. Kernels address every operand through its strides.
//!
//! ## Example
//!
//! ```rust
//! use tile_kernels::dtype::DataType;
//! use tile_kernels::problem::{Layout, OperandDesc, ProblemDesc};
//!
//! let a = OperandDesc::packed(&[64, 32], DataType::F16, Layout::RowMajor).unwrap();
//! let b = OperandDesc::packed(&[32, 16], DataType::F16, Layout::RowMajor).unwrap();
//! let c = OperandDesc::packed(&[64, 16], DataType::F16, Layout::RowMajor).unwrap();
//! let p = ProblemDesc::gemm(a, b, c).unwrap();
//! assert_eq!(p.extents()[0].k, 32);
//! ```

use core::fmt;

use crate::dtype::DataType;
use crate::error::{KernelError, Result};

/// Storage order tag of an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Last dimension is contiguous.
    RowMajor,
    /// First dimension is contiguous.
    ColumnMajor,
    /// Named layout (e.g. `NDHWC`); only its arity is checked.
    Custom(&'static str),
}

impl Layout {
    /// Short tag used in instance names: `r`, `c`, or the custom name.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::RowMajor => "r",
            Self::ColumnMajor => "c",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RowMajor => f.write_str("row-major"),
            Self::ColumnMajor => f.write_str("column-major"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// A set of problem dimensions that may be edge-masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PadMask(u8);

impl PadMask {
    /// No dimension.
    pub const NONE: Self = Self(0);
    /// The M dimension.
    pub const M: Self = Self(0b001);
    /// The N dimension.
    pub const N: Self = Self(0b010);
    /// The K dimension.
    pub const K: Self = Self(0b100);

    /// Union of two masks.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every dimension of `other` is also in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no dimension is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PadMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("{}");
        }
        f.write_str("{")?;
        let mut first = true;
        for (bit, name) in [(Self::M, "M"), (Self::N, "N"), (Self::K, "K")] {
            if self.contains(bit) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        f.write_str("}")
    }
}

/// Padding policy: which dimensions may be partially covered by edge tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Padding {
    /// Every dimension must divide the tile exactly.
    NoPad,
    /// M may be ragged.
    PadM,
    /// N may be ragged.
    PadN,
    /// K may be ragged.
    PadK,
    /// M and N may be ragged.
    PadMN,
    /// Every dimension may be ragged.
    #[default]
    PadMNK,
}

impl Padding {
    /// The dimensions this policy masks.
    pub const fn mask(self) -> PadMask {
        match self {
            Self::NoPad => PadMask::NONE,
            Self::PadM => PadMask::M,
            Self::PadN => PadMask::N,
            Self::PadK => PadMask::K,
            Self::PadMN => PadMask::M.union(PadMask::N),
            Self::PadMNK => PadMask::M.union(PadMask::N).union(PadMask::K),
        }
    }

    /// Whether this policy can serve a problem that needs `required` padded.
    pub const fn covers(self, required: PadMask) -> bool {
        self.mask().contains(required)
    }

    /// Name used in instance strings.
    pub const fn name(self) -> &'static str {
        match self {
            Self::NoPad => "Default",
            Self::PadM => "MPadding",
            Self::PadN => "NPadding",
            Self::PadK => "KPadding",
            Self::PadMN => "MNPadding",
            Self::PadMNK => "MNKPadding",
        }
    }
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reduction kind applied along K.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReduceOp {
    /// Sum (GEMM products, RMSNorm squares).
    #[default]
    Sum,
    /// Mean over the full window.
    Avg,
    /// Maximum over valid positions.
    Max,
}

impl ReduceOp {
    /// Short name used in instance strings.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn positive(what: &str, v: i64) -> Result<usize> {
    if v <= 0 {
        return Err(KernelError::InvalidShape(format!("{what} must be positive, got {v}")));
    }
    usize::try_from(v).map_err(|_| KernelError::InvalidShape(format!("{what} {v} does not fit the host")))
}

/// Shape, strides, element type and layout of one operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperandDesc {
    lengths: Vec<usize>,
    strides: Vec<usize>,
    dtype: DataType,
    layout: Layout,
}

impl OperandDesc {
    /// Builds a descriptor with explicit strides.
    ///
    /// # Errors
    /// [`KernelError::InvalidShape`] when an extent or stride is not positive,
    /// the stride count differs from the rank, or the strides contradict a
    /// row- or column-major tag.
    pub fn new(lengths: &[i64], strides: &[i64], dtype: DataType, layout: Layout) -> Result<Self> {
        if lengths.is_empty() {
            return Err(KernelError::InvalidShape("operand has rank 0".into()));
        }
        if strides.len() != lengths.len() {
            return Err(KernelError::InvalidShape(format!(
                "{} strides given for a rank-{} operand",
                strides.len(),
                lengths.len()
            )));
        }
        let lengths = lengths
            .iter()
            .map(|&l| positive("extent", l))
            .collect::<Result<Vec<_>>>()?;
        let strides = strides
            .iter()
            .map(|&s| positive("stride", s))
            .collect::<Result<Vec<_>>>()?;

        let rank = lengths.len();
        // a product that overflows can never be covered by a smaller stride
        let covers = |outer: usize, inner: usize, len: usize| inner.checked_mul(len).is_some_and(|p| outer >= p);
        let consistent = match layout {
            Layout::RowMajor => {
                strides[rank - 1] == 1 && (0..rank - 1).all(|i| covers(strides[i], strides[i + 1], lengths[i + 1]))
            }
            Layout::ColumnMajor => {
                strides[0] == 1 && (1..rank).all(|i| covers(strides[i], strides[i - 1], lengths[i - 1]))
            }
            Layout::Custom(_) => true,
        };
        if !consistent {
            return Err(KernelError::InvalidShape(format!(
                "strides {strides:?} are not {layout} for lengths {lengths:?}"
            )));
        }

        let numel = lengths.iter().try_fold(1usize, |acc, &l| acc.checked_mul(l));
        let span = lengths
            .iter()
            .zip(&strides)
            .try_fold(1usize, |acc, (&l, &s)| (l - 1).checked_mul(s).and_then(|d| acc.checked_add(d)));
        if numel.is_none() || span.is_none() {
            return Err(KernelError::InvalidShape(format!(
                "lengths {lengths:?} with strides {strides:?} overflow the address space"
            )));
        }

        Ok(Self { lengths, strides, dtype, layout })
    }

    /// Builds a densely packed descriptor.
    ///
    /// Row-major and custom layouts pack the last dimension innermost;
    /// column-major packs the first.
    ///
    /// # Errors
    /// [`KernelError::InvalidShape`] when an extent is not positive or the
    /// packed strides overflow.
    pub fn packed(lengths: &[i64], dtype: DataType, layout: Layout) -> Result<Self> {
        let overflow = || KernelError::InvalidShape(format!("packed strides of {lengths:?} overflow"));
        let mut strides = vec![1i64; lengths.len()];
        match layout {
            Layout::ColumnMajor => {
                for i in 1..lengths.len() {
                    strides[i] = strides[i - 1].checked_mul(lengths[i - 1].max(1)).ok_or_else(overflow)?;
                }
            }
            Layout::RowMajor | Layout::Custom(_) => {
                for i in (0..lengths.len().saturating_sub(1)).rev() {
                    strides[i] = strides[i + 1].checked_mul(lengths[i + 1].max(1)).ok_or_else(overflow)?;
                }
            }
        }
        Self::new(lengths, &strides, dtype, layout)
    }

    /// Extent of every dimension.
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Element stride of every dimension.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Element type.
    pub const fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Layout tag.
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.lengths.len()
    }

    /// Number of logical elements.
    pub fn numel(&self) -> usize {
        self.lengths.iter().product()
    }

    /// Number of storage elements spanned, i.e. largest offset plus one.
    ///
    /// Construction rejects descriptors whose span overflows.
    pub fn span(&self) -> usize {
        1 + self
            .lengths
            .iter()
            .zip(&self.strides)
            .map(|(l, s)| (l - 1) * s)
            .sum::<usize>()
    }

    /// Storage offset of a logical index. The index must be in bounds.
    pub fn offset(&self, index: &[usize]) -> usize {
        debug_assert_eq!(index.len(), self.rank());
        index.iter().zip(&self.strides).map(|(i, s)| i * s).sum()
    }

    /// Same shape, strides and type. Used to check launch tensors.
    pub fn same_shape(&self, other: &Self) -> bool {
        self == other
    }
}

/// Extents of one `M × N × K` problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extents {
    /// Output rows.
    pub m: usize,
    /// Output columns.
    pub n: usize,
    /// Reduction length.
    pub k: usize,
}

impl Extents {
    /// `m · n · k`.
    pub fn volume(&self) -> u128 {
        self.m as u128 * self.n as u128 * self.k as u128
    }
}

/// A 3-D pooling window over the `Z × Y × X` (depth, height, width) axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolWindow {
    /// Window extents.
    pub lengths: [usize; 3],
    /// Window strides.
    pub strides: [usize; 3],
    /// Window dilations.
    pub dilations: [usize; 3],
    /// Padding before each axis.
    pub left_pads: [usize; 3],
    /// Padding after each axis.
    pub right_pads: [usize; 3],
}

impl PoolWindow {
    /// Validates and builds a window.
    ///
    /// # Errors
    /// [`KernelError::InvalidShape`] when a length, stride or dilation is not
    /// positive or a pad is negative.
    pub fn new(
        lengths: [i64; 3],
        strides: [i64; 3],
        dilations: [i64; 3],
        left_pads: [i64; 3],
        right_pads: [i64; 3],
    ) -> Result<Self> {
        let pos = |what: &str, v: [i64; 3]| -> Result<[usize; 3]> {
            Ok([positive(what, v[0])?, positive(what, v[1])?, positive(what, v[2])?])
        };
        let pad = |v: [i64; 3]| -> Result<[usize; 3]> {
            let mut out = [0; 3];
            for (o, &p) in out.iter_mut().zip(&v) {
                *o = usize::try_from(p)
                    .map_err(|_| KernelError::InvalidShape(format!("pad must not be negative, got {p}")))?;
            }
            Ok(out)
        };
        Ok(Self {
            lengths: pos("window length", lengths)?,
            strides: pos("window stride", strides)?,
            dilations: pos("window dilation", dilations)?,
            left_pads: pad(left_pads)?,
            right_pads: pad(right_pads)?,
        })
    }

    /// Output extent along `axis` for an input extent, or `None` if the
    /// dilated window is larger than the padded input.
    pub fn output_len(&self, axis: usize, input: usize) -> Option<usize> {
        let padded = input + self.left_pads[axis] + self.right_pads[axis];
        let eff = (self.lengths[axis] - 1) * self.dilations[axis] + 1;
        padded.checked_sub(eff).map(|d| d / self.strides[axis] + 1)
    }

    /// Number of taps in the window, padding included.
    pub fn volume(&self) -> usize {
        self.lengths.iter().product()
    }

    /// First output index along `axis` whose taps all land in the padding of
    /// an input of extent `input`.
    pub fn first_empty_output(&self, axis: usize, input: usize) -> Option<usize> {
        let out = self.output_len(axis, input)?;
        let (s, d, lp) = (self.strides[axis], self.dilations[axis], self.left_pads[axis]);
        (0..out).find(|&o| {
            (0..self.lengths[axis]).all(|t| (o * s + t * d).checked_sub(lp).is_none_or(|pos| pos >= input))
        })
    }
}

/// Structural kind of a problem, one per operand arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    /// `C[M,N] = A[M,K] · B[K,N]`.
    Gemm,
    /// Several GEMMs sharing types, layouts, N and K.
    GroupedGemm,
    /// Row-wise RMS normalisation of `X[M,N]`.
    Rmsnorm2d,
    /// 3-D pooling over an `NDHWC` tensor.
    Pool3d,
    /// Gradient of 3-D average pooling.
    Pool3dBwd,
    /// Row-wise smoothing and quantisation of `X[M,N]`.
    Smoothquant,
}

/// Immutable description of a kernel invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemDesc {
    kind: ProblemKind,
    operands: Vec<OperandDesc>,
    extents: Vec<Extents>,
    k_batch: usize,
    reduce: ReduceOp,
    pool: Option<PoolWindow>,
    padding: Padding,
}

fn ndhwc_pair(what: &str, pooled: &OperandDesc, full: &OperandDesc, window: &PoolWindow) -> Result<()> {
    if pooled.rank() != 5 || full.rank() != 5 {
        return Err(KernelError::InvalidShape(format!("{what} operands must be rank 5 (NDHWC)")));
    }
    let (i, o) = (full.lengths(), pooled.lengths());
    if i[0] != o[0] || i[4] != o[4] {
        return Err(KernelError::InvalidShape(format!(
            "batch/channels differ: input {i:?}, output {o:?}"
        )));
    }
    for axis in 0..3 {
        let expected = window.output_len(axis, i[axis + 1]);
        if expected != Some(o[axis + 1]) {
            return Err(KernelError::InvalidShape(format!(
                "output spatial axis {axis} is {}, window gives {expected:?}",
                o[axis + 1]
            )));
        }
    }
    Ok(())
}

fn gemm_extents(a: &OperandDesc, b: &OperandDesc, c: &OperandDesc) -> Result<Extents> {
    if a.rank() != 2 || b.rank() != 2 || c.rank() != 2 {
        return Err(KernelError::InvalidShape("GEMM operands must be rank 2".into()));
    }
    let (m, k) = (a.lengths()[0], a.lengths()[1]);
    let (kb, n) = (b.lengths()[0], b.lengths()[1]);
    if k != kb {
        return Err(KernelError::InvalidShape(format!("inner extents differ: A has K={k}, B has K={kb}")));
    }
    if c.lengths() != [m, n] {
        return Err(KernelError::InvalidShape(format!(
            "C is {:?}, expected [{m}, {n}]",
            c.lengths()
        )));
    }
    Ok(Extents { m, n, k })
}

impl ProblemDesc {
    /// `C = A · B` with `A: [M, K]`, `B: [K, N]`, `C: [M, N]`.
    ///
    /// # Errors
    /// [`KernelError::InvalidShape`] when the operands are not rank 2 or their
    /// extents disagree.
    pub fn gemm(a: OperandDesc, b: OperandDesc, c: OperandDesc) -> Result<Self> {
        let ext = gemm_extents(&a, &b, &c)?;
        Ok(Self {
            kind: ProblemKind::Gemm,
            operands: vec![a, b, c],
            extents: vec![ext],
            k_batch: 1,
            reduce: ReduceOp::Sum,
            pool: None,
            padding: Padding::default(),
        })
    }

    /// Several independent GEMMs launched together.
    ///
    /// Groups may differ in M but must share element types, layouts, N and K.
    ///
    /// # Errors
    /// [`KernelError::InvalidShape`] when `groups` is empty or a group
    /// disagrees with the first one.
    pub fn grouped_gemm(groups: Vec<[OperandDesc; 3]>) -> Result<Self> {
        let Some(first) = groups.first() else {
            return Err(KernelError::InvalidShape("grouped GEMM needs at least one group".into()));
        };
        let head = gemm_extents(&first[0], &first[1], &first[2])?;
        let signature = |g: &[OperandDesc; 3]| g.each_ref().map(|o| (o.dtype(), o.layout()));
        let head_sig = signature(first);

        let mut extents = Vec::with_capacity(groups.len());
        for (i, g) in groups.iter().enumerate() {
            let ext = gemm_extents(&g[0], &g[1], &g[2])?;
            if ext.n != head.n || ext.k != head.k {
                return Err(KernelError::InvalidShape(format!(
                    "group {i} has N={} K={}, expected N={} K={}",
                    ext.n, ext.k, head.n, head.k
                )));
            }
            if signature(g) != head_sig {
                return Err(KernelError::InvalidShape(format!("group {i} differs in element types or layouts")));
            }
            extents.push(ext);
        }

        Ok(Self {
            kind: ProblemKind::GroupedGemm,
            operands: groups.into_iter().flatten().collect(),
            extents,
            k_batch: 1,
            reduce: ReduceOp::Sum,
            pool: None,
            padding: Padding::default(),
        })
    }

    /// Row-wise RMS normalisation: `X: [M, N]`, `Gamma: [N]`, `Y: [M, N]`.
    ///
    /// # Errors
    /// [`KernelError::InvalidShape`] when `X` is not a row-major matrix or the
    /// operand extents disagree.
    pub fn rmsnorm2d(x: OperandDesc, gamma: OperandDesc, y: OperandDesc) -> Result<Self> {
        if x.rank() != 2 || x.layout() != Layout::RowMajor {
            return Err(KernelError::InvalidShape("RMSNorm input must be a row-major matrix".into()));
        }
        let (m, n) = (x.lengths()[0], x.lengths()[1]);
        if gamma.lengths() != [n] {
            return Err(KernelError::InvalidShape(format!(
                "gamma is {:?}, expected [{n}]",
                gamma.lengths()
            )));
        }
        if y.lengths() != x.lengths() {
            return Err(KernelError::InvalidShape(format!(
                "output is {:?}, expected [{m}, {n}]",
                y.lengths()
            )));
        }
        Ok(Self {
            kind: ProblemKind::Rmsnorm2d,
            operands: vec![x, gamma, y],
            extents: vec![Extents { m, n: 1, k: n }],
            k_batch: 1,
            reduce: ReduceOp::Sum,
            pool: None,
            padding: Padding::default(),
        })
    }

    /// 3-D pooling forward over `NDHWC` tensors.
    ///
    /// A max window has no value where every tap is padding, so such windows
    /// are rejected. Average windows divide by the full volume and stay valid.
    ///
    /// # Errors
    /// [`KernelError::InvalidShape`] when the tensors are not rank 5, the
    /// reduction is not `Avg` or `Max`, batch or channel extents differ, the
    /// output spatial extents disagree with the window, or a max window lies
    /// entirely in the padding.
    pub fn pool3d_fwd(input: OperandDesc, output: OperandDesc, window: PoolWindow, reduce: ReduceOp) -> Result<Self> {
        if reduce == ReduceOp::Sum {
            return Err(KernelError::InvalidShape("pooling reduction must be avg or max".into()));
        }
        ndhwc_pair("pooling", &output, &input, &window)?;
        let (i, o) = (input.lengths(), output.lengths());
        if reduce == ReduceOp::Max {
            for axis in 0..3 {
                if let Some(pos) = window.first_empty_output(axis, i[axis + 1]) {
                    return Err(KernelError::InvalidShape(format!(
                        "max window at output {pos} of spatial axis {axis} covers only padding"
                    )));
                }
            }
        }
        let ext = Extents {
            m: o[0] * o[1] * o[2] * o[3],
            n: o[4],
            k: window.volume(),
        };
        Ok(Self {
            kind: ProblemKind::Pool3d,
            operands: vec![input, output],
            extents: vec![ext],
            k_batch: 1,
            reduce,
            pool: Some(window),
            padding: Padding::default(),
        })
    }

    /// Gradient of 3-D average pooling: `dOut` is the pooled gradient, `dIn`
    /// has the extents of the forward input.
    ///
    /// Every `dIn` position gathers `dOut / volume` from each window that
    /// covers it, so the problem is `{m: N·Di·Hi·Wi, n: C, k: Z·Y·X}`.
    ///
    /// # Errors
    /// [`KernelError::InvalidShape`] under the same conditions as
    /// [`ProblemDesc::pool3d_fwd`] with `dIn` in the input's place.
    pub fn avgpool3d_bwd(dout: OperandDesc, din: OperandDesc, window: PoolWindow) -> Result<Self> {
        ndhwc_pair("pooling gradient", &dout, &din, &window)?;
        let i = din.lengths();
        let ext = Extents {
            m: i[0] * i[1] * i[2] * i[3],
            n: i[4],
            k: window.volume(),
        };
        Ok(Self {
            kind: ProblemKind::Pool3dBwd,
            operands: vec![dout, din],
            extents: vec![ext],
            k_batch: 1,
            reduce: ReduceOp::Avg,
            pool: Some(window),
            padding: Padding::default(),
        })
    }

    /// Row-wise smoothquant: `X: [M, N]`, `XScale: [N]`, `YScale: [M]`,
    /// `QY: [M, N]`.
    ///
    /// # Errors
    /// [`KernelError::InvalidShape`] when `X` or `QY` is not a row-major
    /// matrix or the operand extents disagree.
    pub fn smoothquant(x: OperandDesc, xscale: OperandDesc, yscale: OperandDesc, qy: OperandDesc) -> Result<Self> {
        if x.rank() != 2 || x.layout() != Layout::RowMajor || qy.layout() != Layout::RowMajor {
            return Err(KernelError::InvalidShape("smoothquant input and output must be row-major matrices".into()));
        }
        let (m, n) = (x.lengths()[0], x.lengths()[1]);
        if xscale.lengths() != [n] || yscale.lengths() != [m] || qy.lengths() != x.lengths() {
            return Err(KernelError::InvalidShape(format!(
                "xscale {:?}, yscale {:?}, qy {:?} do not fit X [{m}, {n}]",
                xscale.lengths(),
                yscale.lengths(),
                qy.lengths()
            )));
        }
        Ok(Self {
            kind: ProblemKind::Smoothquant,
            operands: vec![x, xscale, yscale, qy],
            extents: vec![Extents { m, n: 1, k: n }],
            k_batch: 1,
            reduce: ReduceOp::Max,
            pool: None,
            padding: Padding::default(),
        })
    }

    /// Replaces the padding allowance.
    #[must_use]
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Sets the split-K factor.
    ///
    /// # Errors
    /// [`KernelError::InvalidShape`] when `k_batch < 1`.
    pub fn with_k_batch(mut self, k_batch: i64) -> Result<Self> {
        self.k_batch = positive("k_batch", k_batch)?;
        Ok(self)
    }

    /// Structural kind.
    pub const fn kind(&self) -> ProblemKind {
        self.kind
    }

    /// All operand descriptors; grouped problems list three per group.
    pub fn operands(&self) -> &[OperandDesc] {
        &self.operands
    }

    /// One entry per group.
    pub fn extents(&self) -> &[Extents] {
        &self.extents
    }

    /// Split-K factor.
    pub const fn k_batch(&self) -> usize {
        self.k_batch
    }

    /// Reduction kind.
    pub const fn reduce(&self) -> ReduceOp {
        self.reduce
    }

    /// Pooling window, if any.
    pub const fn pool(&self) -> Option<&PoolWindow> {
        self.pool.as_ref()
    }

    /// Caller's padding allowance.
    pub const fn padding(&self) -> Padding {
        self.padding
    }

    /// Number of operands per group.
    pub fn arity(&self) -> usize {
        self.operands.len() / self.extents.len()
    }

    /// Element types of one group's operands.
    pub fn dtypes(&self) -> Vec<DataType> {
        self.operands[..self.arity()].iter().map(OperandDesc::dtype).collect()
    }

    /// Layout tags of one group's operands.
    pub fn layouts(&self) -> Vec<Layout> {
        self.operands[..self.arity()].iter().map(OperandDesc::layout).collect()
    }

    /// Sum of `M · N · K` over groups.
    pub fn volume(&self) -> u128 {
        self.extents.iter().map(Extents::volume).sum()
    }
}
