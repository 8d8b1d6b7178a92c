//! Element types, host element conversions and accumulator types.
//!
//! Kernels never compute in their storage type. Operands are widened into an
//! [`Accumulator`] when they are staged, reduced there, and cast back down to
//! the output type with round-to-nearest-even at the epilogue.
//!
//! | Inputs            | Accumulator |
//! |-------------------|-------------|
//! | fp16, bf16        | fp32        |
//! | fp32, fp64        | fp64        |
//! | int8 (int32)      | int32       |
//! | int8 mixed float  | fp32        |

use core::fmt;

use half::{bf16, f16};

/// Closed set of element type tags understood by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    /// 8-bit signed integer.
    I8,
    /// 32-bit signed integer.
    I32,
    /// IEEE half precision.
    F16,
    /// bfloat16.
    BF16,
    /// IEEE single precision.
    F32,
    /// IEEE double precision.
    F64,
}

impl DataType {
    /// Storage size of one element in bytes.
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::I8 => 1,
            Self::F16 | Self::BF16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Whether the type is a floating point format.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F16 | Self::BF16 | Self::F32 | Self::F64)
    }

    /// Short name used in instance names (`fp16`, `bf16`, `i8`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::I32 => "i32",
            Self::F16 => "fp16",
            Self::BF16 => "bf16",
            Self::F32 => "fp32",
            Self::F64 => "fp64",
        }
    }

    /// Picks the accumulator for a set of input types.
    ///
    /// Any float input makes the accumulation floating point: fp32 unless an
    /// input is already 32 bits or wider, in which case fp64. All-integer
    /// inputs accumulate in int32.
    pub fn accumulator(inputs: &[Self]) -> Self {
        if inputs.iter().any(|t| t.is_float()) {
            if inputs.iter().any(|t| matches!(t, Self::F32 | Self::F64)) {
                Self::F64
            } else {
                Self::F32
            }
        } else {
            Self::I32
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A host storage element.
///
/// Conversions go through `f64`, which represents every supported element
/// exactly, so `from_f64` is the only rounding step.
pub trait Element: Copy + Send + Sync + 'static {
    /// Tag of this element type.
    const DTYPE: DataType;

    /// Exact widening conversion.
    fn to_f64(self) -> f64;

    /// Round-to-nearest-even narrowing; integers saturate and map NaN to zero.
    fn from_f64(v: f64) -> Self;
}

impl Element for i8 {
    const DTYPE: DataType = DataType::I8;

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(v: f64) -> Self {
        // `as` saturates and maps NaN to 0
        v.round_ties_even() as Self
    }
}

impl Element for i32 {
    const DTYPE: DataType = DataType::I32;

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(v: f64) -> Self {
        v.round_ties_even() as Self
    }
}

impl Element for f16 {
    const DTYPE: DataType = DataType::F16;

    fn to_f64(self) -> f64 {
        Self::to_f64(self)
    }

    fn from_f64(v: f64) -> Self {
        Self::from_f64(v)
    }
}

impl Element for bf16 {
    const DTYPE: DataType = DataType::BF16;

    fn to_f64(self) -> f64 {
        Self::to_f64(self)
    }

    fn from_f64(v: f64) -> Self {
        Self::from_f64(v)
    }
}

impl Element for f32 {
    const DTYPE: DataType = DataType::F32;

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(v: f64) -> Self {
        v as Self
    }
}

impl Element for f64 {
    const DTYPE: DataType = DataType::F64;

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(v: f64) -> Self {
        v
    }
}

/// Intermediate type a kernel reduces in.
///
/// `mul_add` is deliberately unfused so the result depends only on the order
/// of operations, not on the target's FMA support.
pub trait Accumulator: Copy + Send + Sync + PartialOrd + fmt::Debug + 'static {
    /// Tag of this accumulator type.
    const DTYPE: DataType;

    /// Additive identity.
    fn zero() -> Self;

    /// Identity of `max`.
    fn lowest() -> Self;

    /// Widening conversion of a staged operand.
    fn from_f64(v: f64) -> Self;

    /// Exact conversion for the epilogue.
    fn to_f64(self) -> f64;

    /// `self + a * b`.
    fn mul_add(self, a: Self, b: Self) -> Self;

    /// `self + other`.
    fn add(self, other: Self) -> Self;

    /// Larger of the two.
    fn max(self, other: Self) -> Self {
        if other > self { other } else { self }
    }
}

impl Accumulator for f32 {
    const DTYPE: DataType = DataType::F32;

    fn zero() -> Self {
        0.0
    }

    fn lowest() -> Self {
        Self::NEG_INFINITY
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(v: f64) -> Self {
        v as Self
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn mul_add(self, a: Self, b: Self) -> Self {
        self + a * b
    }

    fn add(self, other: Self) -> Self {
        self + other
    }
}

impl Accumulator for f64 {
    const DTYPE: DataType = DataType::F64;

    fn zero() -> Self {
        0.0
    }

    fn lowest() -> Self {
        Self::NEG_INFINITY
    }

    fn from_f64(v: f64) -> Self {
        v
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn mul_add(self, a: Self, b: Self) -> Self {
        self + a * b
    }

    fn add(self, other: Self) -> Self {
        self + other
    }
}

impl Accumulator for i32 {
    const DTYPE: DataType = DataType::I32;

    fn zero() -> Self {
        0
    }

    fn lowest() -> Self {
        Self::MIN
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(v: f64) -> Self {
        v as Self
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn mul_add(self, a: Self, b: Self) -> Self {
        self.wrapping_add(a.wrapping_mul(b))
    }

    fn add(self, other: Self) -> Self {
        self.wrapping_add(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_is_wider_than_narrow_inputs() {
        assert_eq!(DataType::accumulator(&[DataType::F16, DataType::F16]), DataType::F32);
        assert_eq!(DataType::accumulator(&[DataType::BF16, DataType::I8]), DataType::F32);
        assert_eq!(DataType::accumulator(&[DataType::F32, DataType::F32]), DataType::F64);
        assert_eq!(DataType::accumulator(&[DataType::I8, DataType::I8]), DataType::I32);
    }

    #[test]
    fn narrowing_rounds_to_nearest_even() {
        // 2049 sits exactly between the fp16 neighbours 2048 and 2050
        assert_eq!(<f16 as Element>::from_f64(2049.0).to_f32(), 2048.0);
        assert_eq!(<f16 as Element>::from_f64(2051.0).to_f32(), 2052.0);
        assert_eq!(<i8 as Element>::from_f64(2.5), 2);
        assert_eq!(<i8 as Element>::from_f64(3.5), 4);
    }

    #[test]
    fn integer_narrowing_saturates() {
        assert_eq!(<i8 as Element>::from_f64(1000.0), i8::MAX);
        assert_eq!(<i8 as Element>::from_f64(-1000.0), i8::MIN);
        assert_eq!(<i8 as Element>::from_f64(f64::NAN), 0);
    }
}
