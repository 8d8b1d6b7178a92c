//! Host tensors.
//!
//! A [`Tensor`] pairs an [`OperandDesc`] with a type-tagged storage buffer.
//! Storage is addressed only through the descriptor's strides, so padded
//! leading dimensions and column-major data work without copies.
//!
//! Kernels never touch a tensor element by element through `f64`. Instead they
//! [`gather`](TensorData::gather) a whole tile of offsets into accumulator
//! values (one `match` on the element type per tile) and
//! [`scatter`](TensorData::scatter) finished results back with a single
//! round-to-nearest-even cast.
//!
//! ## Example
//!
//! ```rust
//! use tile_kernels::tensor;
//!
//! let t = tensor!(F16; [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
//! assert_eq!(t.desc().lengths(), &[2, 3]);
//! assert_eq!(t.get(&[1, 2]), 6.0);
//! ```

use half::{bf16, f16};

use crate::dtype::{Accumulator, DataType, Element};
use crate::error::{KernelError, Result};
use crate::problem::{Layout, OperandDesc};

/// Type-tagged flat storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// `i8` storage.
    I8(Vec<i8>),
    /// `i32` storage.
    I32(Vec<i32>),
    /// fp16 storage.
    F16(Vec<f16>),
    /// bf16 storage.
    BF16(Vec<bf16>),
    /// fp32 storage.
    F32(Vec<f32>),
    /// fp64 storage.
    F64(Vec<f64>),
}

macro_rules! with_storage {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            TensorData::I8($v) => $body,
            TensorData::I32($v) => $body,
            TensorData::F16($v) => $body,
            TensorData::BF16($v) => $body,
            TensorData::F32($v) => $body,
            TensorData::F64($v) => $body,
        }
    };
}

fn gather_from<E: Element, A: Accumulator>(src: &[E], offsets: &[Option<usize>], fill: A, out: &mut [A]) {
    for (dst, o) in out.iter_mut().zip(offsets) {
        *dst = match o {
            Some(i) => A::from_f64(src[*i].to_f64()),
            None => fill,
        };
    }
}

fn scatter_into<E: Element>(dst: &mut [E], writes: &[(usize, f64)]) {
    for &(i, v) in writes {
        dst[i] = E::from_f64(v);
    }
}

impl TensorData {
    /// Zero-filled storage of `len` elements.
    pub fn zeros(dtype: DataType, len: usize) -> Self {
        Self::from_f64(dtype, &vec![0.0; len])
    }

    /// Storage built by casting every value with round-to-nearest-even.
    pub fn from_f64(dtype: DataType, values: &[f64]) -> Self {
        fn cast<E: Element>(values: &[f64]) -> Vec<E> {
            values.iter().map(|&v| E::from_f64(v)).collect()
        }
        match dtype {
            DataType::I8 => Self::I8(cast(values)),
            DataType::I32 => Self::I32(cast(values)),
            DataType::F16 => Self::F16(cast(values)),
            DataType::BF16 => Self::BF16(cast(values)),
            DataType::F32 => Self::F32(cast(values)),
            DataType::F64 => Self::F64(cast(values)),
        }
    }

    /// Element type tag.
    pub const fn dtype(&self) -> DataType {
        match self {
            Self::I8(_) => DataType::I8,
            Self::I32(_) => DataType::I32,
            Self::F16(_) => DataType::F16,
            Self::BF16(_) => DataType::BF16,
            Self::F32(_) => DataType::F32,
            Self::F64(_) => DataType::F64,
        }
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        with_storage!(self, v => v.len())
    }

    /// Whether the storage is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at a storage offset, widened exactly.
    pub fn get_f64(&self, offset: usize) -> f64 {
        with_storage!(self, v => Element::to_f64(v[offset]))
    }

    /// Every stored element, widened exactly.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        with_storage!(self, v => v.iter().map(|e| Element::to_f64(*e)).collect())
    }

    /// Loads the elements at `offsets` into the matching positions of `out`,
    /// substituting `fill` for masked (`None`) positions.
    pub fn gather<A: Accumulator>(&self, offsets: &[Option<usize>], fill: A, out: &mut [A]) {
        with_storage!(self, v => gather_from(v, offsets, fill, out));
    }

    /// Stores `(offset, value)` pairs, narrowing with round-to-nearest-even.
    pub fn scatter(&mut self, writes: &[(usize, f64)]) {
        with_storage!(self, v => scatter_into(v, writes));
    }

    /// fp32 view of the storage, if that is the element type.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Self::F32(v) => Some(v),
            _ => None,
        }
    }

    /// Mutable fp32 view of the storage, if that is the element type.
    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        match self {
            Self::F32(v) => Some(v),
            _ => None,
        }
    }
}

/// A strided, typed host tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    desc: OperandDesc,
    data: TensorData,
}

impl Tensor {
    /// Wraps storage in a descriptor.
    ///
    /// # Errors
    /// [`KernelError::InvalidShape`] when the storage type differs from the
    /// descriptor's or the storage is shorter than the descriptor's span.
    pub fn new(desc: OperandDesc, data: TensorData) -> Result<Self> {
        if data.dtype() != desc.dtype() {
            return Err(KernelError::InvalidShape(format!(
                "storage is {}, descriptor is {}",
                data.dtype(),
                desc.dtype()
            )));
        }
        if data.len() < desc.span() {
            return Err(KernelError::InvalidShape(format!(
                "storage holds {} elements, descriptor spans {}",
                data.len(),
                desc.span()
            )));
        }
        Ok(Self { desc, data })
    }

    /// Zero tensor covering the descriptor's span.
    pub fn zeros(desc: OperandDesc) -> Self {
        let data = TensorData::zeros(desc.dtype(), desc.span());
        Self { desc, data }
    }

    /// Tensor whose element at every logical index is `f(index)`.
    ///
    /// Indices are visited in row-major logical order. Storage gaps between
    /// strided rows are left at zero.
    pub fn from_fn(desc: OperandDesc, mut f: impl FnMut(&[usize]) -> f64) -> Self {
        let mut values = vec![0.0; desc.span()];
        for_each_index(desc.lengths(), |idx| values[desc.offset(idx)] = f(idx));
        let data = TensorData::from_f64(desc.dtype(), &values);
        Self { desc, data }
    }

    /// Dense row-major tensor from logical values.
    ///
    /// # Panics
    /// Panics if an extent is zero or `values` does not hold exactly one value
    /// per element.
    pub fn row_major(lengths: &[usize], dtype: DataType, values: &[f64]) -> Self {
        let signed: Vec<i64> = lengths.iter().map(|&l| l as i64).collect();
        let desc = match OperandDesc::packed(&signed, dtype, Layout::RowMajor) {
            Ok(d) => d,
            Err(e) => panic!("{e}"),
        };
        assert_eq!(
            desc.numel(),
            values.len(),
            "shape {:?} is incompatible with {} data elements",
            lengths,
            values.len()
        );
        let data = TensorData::from_f64(dtype, values);
        Self { desc, data }
    }

    /// Descriptor.
    pub const fn desc(&self) -> &OperandDesc {
        &self.desc
    }

    /// Storage.
    pub const fn data(&self) -> &TensorData {
        &self.data
    }

    /// Mutable storage.
    pub fn data_mut(&mut self) -> &mut TensorData {
        &mut self.data
    }

    /// Element at a logical index, widened exactly.
    pub fn get(&self, index: &[usize]) -> f64 {
        self.data.get_f64(self.desc.offset(index))
    }

    /// Logical elements in row-major order, widened exactly.
    pub fn to_logical_f64(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.desc.numel());
        for_each_index(self.desc.lengths(), |idx| out.push(self.get(idx)));
        out
    }
}

/// Visits every index of `lengths` in row-major order.
pub(crate) fn for_each_index(lengths: &[usize], mut f: impl FnMut(&[usize])) {
    if lengths.contains(&0) {
        return;
    }
    let mut idx = vec![0usize; lengths.len()];
    loop {
        f(&idx);
        let mut d = lengths.len();
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < lengths[d] {
                break;
            }
            idx[d] = 0;
        }
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __tensor_literal {
    ($lit:literal) => {
        (Vec::<usize>::new(), vec![$lit as f64])
    };

    ([ $( $inner:tt ),+ $(,)? ]) => {{
        let children: Vec<(Vec<usize>, Vec<f64>)> = vec![ $( $crate::__tensor_literal!($inner) ),+ ];
        let first_shape = children[0].0.clone();
        assert!(children.iter().all(|c| c.0 == first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(&first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].1.len());
        for c in children { data.extend(c.1); }
        (shape, data)
    }};
}

/// Defines a dense row-major tensor from nested literal arrays.
///
/// The first token names the [`DataType`](crate::dtype::DataType) variant.
/// Literals must be non-negative; build signed data with
/// [`Tensor::from_fn`](crate::tensors::Tensor::from_fn).
///
/// # Example
/// ```
/// use tile_kernels::tensor;
/// let t = tensor!(F32; [[1.0, 2.0], [3.0, 4.0]]);
/// assert_eq!(t.desc().lengths(), &[2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($dtype:ident; $($body:tt)+) => {{
        let (shape, data) = $crate::__tensor_literal!($($body)+);
        $crate::tensors::Tensor::row_major(&shape, $crate::dtype::DataType::$dtype, &data)
    }};
}
