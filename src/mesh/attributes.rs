//! Runtime-typed attribute arrays.
//!
//! Attribute data is a closed tagged union over the ten numeric scalar
//! types the wire format supports, plus packed-bit booleans which are
//! representable but deliberately *not* transferable. Type dispatch
//! happens once per array via [`with_scalar_type!`]; every arm
//! monomorphizes over a [`Scalar`] type, and the `Bit` arm is the single
//! place the `UnsupportedAttributeType` error originates.

use bytemuck::Pod;
use num_traits::{NumCast, Zero};
use serde::{Deserialize, Serialize};

/// Type tag for one attribute array, fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// Packed single-bit booleans. Not serializable by the transfer
    /// engine; any attempt to move such an array is a fatal error.
    Bit,
}

impl ScalarType {
    /// Stable numeric code used in the schema wire record.
    pub fn to_wire(self) -> u32 {
        match self {
            ScalarType::U8 => 0,
            ScalarType::I8 => 1,
            ScalarType::U16 => 2,
            ScalarType::I16 => 3,
            ScalarType::U32 => 4,
            ScalarType::I32 => 5,
            ScalarType::U64 => 6,
            ScalarType::I64 => 7,
            ScalarType::F32 => 8,
            ScalarType::F64 => 9,
            ScalarType::Bit => 10,
        }
    }

    pub fn from_wire(code: u32) -> Option<ScalarType> {
        Some(match code {
            0 => ScalarType::U8,
            1 => ScalarType::I8,
            2 => ScalarType::U16,
            3 => ScalarType::I16,
            4 => ScalarType::U32,
            5 => ScalarType::I32,
            6 => ScalarType::U64,
            7 => ScalarType::I64,
            8 => ScalarType::F32,
            9 => ScalarType::F64,
            10 => ScalarType::Bit,
            _ => return None,
        })
    }
}

/// A scalar type the transfer engine can gather, scatter, and cast to
/// bytes. Implemented exactly for the numeric variants of
/// [`AttributeData`].
pub trait Scalar:
    Pod + NumCast + Zero + Copy + PartialEq + std::fmt::Debug + Send + Sync + 'static
{
    const TYPE: ScalarType;

    fn slice(data: &AttributeData) -> Option<&[Self]>;
    fn slice_mut(data: &mut AttributeData) -> Option<&mut [Self]>;

    /// The owning rank id as a value of this type (fill-rank mode).
    fn from_rank(rank: usize) -> Self {
        NumCast::from(rank).unwrap_or_else(Self::zero)
    }
}

/// Typed storage for one attribute array: `tuples × components` scalars.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttributeData {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// Packed bits, 8 logical values per byte.
    Bit(Vec<u8>),
}

macro_rules! impl_scalar {
    ($($t:ty => $variant:ident),* $(,)?) => {$(
        impl Scalar for $t {
            const TYPE: ScalarType = ScalarType::$variant;

            fn slice(data: &AttributeData) -> Option<&[$t]> {
                match data {
                    AttributeData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(data: &mut AttributeData) -> Option<&mut [$t]> {
                match data {
                    AttributeData::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    )*};
}

impl_scalar! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}

/// Dispatch once on a [`ScalarType`], binding `$T` to the matching
/// [`Scalar`] type in `$body`. The `Bit` arm evaluates `$unsupported`.
macro_rules! with_scalar_type {
    ($st:expr, $T:ident => $body:expr, $unsupported:expr $(,)?) => {
        match $st {
            $crate::mesh::attributes::ScalarType::U8 => {
                type $T = u8;
                $body
            }
            $crate::mesh::attributes::ScalarType::I8 => {
                type $T = i8;
                $body
            }
            $crate::mesh::attributes::ScalarType::U16 => {
                type $T = u16;
                $body
            }
            $crate::mesh::attributes::ScalarType::I16 => {
                type $T = i16;
                $body
            }
            $crate::mesh::attributes::ScalarType::U32 => {
                type $T = u32;
                $body
            }
            $crate::mesh::attributes::ScalarType::I32 => {
                type $T = i32;
                $body
            }
            $crate::mesh::attributes::ScalarType::U64 => {
                type $T = u64;
                $body
            }
            $crate::mesh::attributes::ScalarType::I64 => {
                type $T = i64;
                $body
            }
            $crate::mesh::attributes::ScalarType::F32 => {
                type $T = f32;
                $body
            }
            $crate::mesh::attributes::ScalarType::F64 => {
                type $T = f64;
                $body
            }
            $crate::mesh::attributes::ScalarType::Bit => $unsupported,
        }
    };
}

pub(crate) use with_scalar_type;

impl AttributeData {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            AttributeData::U8(_) => ScalarType::U8,
            AttributeData::I8(_) => ScalarType::I8,
            AttributeData::U16(_) => ScalarType::U16,
            AttributeData::I16(_) => ScalarType::I16,
            AttributeData::U32(_) => ScalarType::U32,
            AttributeData::I32(_) => ScalarType::I32,
            AttributeData::U64(_) => ScalarType::U64,
            AttributeData::I64(_) => ScalarType::I64,
            AttributeData::F32(_) => ScalarType::F32,
            AttributeData::F64(_) => ScalarType::F64,
            AttributeData::Bit(_) => ScalarType::Bit,
        }
    }

    /// Number of stored scalar values (logical bits for `Bit`).
    pub fn len(&self) -> usize {
        match self {
            AttributeData::U8(v) => v.len(),
            AttributeData::I8(v) => v.len(),
            AttributeData::U16(v) => v.len(),
            AttributeData::I16(v) => v.len(),
            AttributeData::U32(v) => v.len(),
            AttributeData::I32(v) => v.len(),
            AttributeData::U64(v) => v.len(),
            AttributeData::I64(v) => v.len(),
            AttributeData::F32(v) => v.len(),
            AttributeData::F64(v) => v.len(),
            AttributeData::Bit(v) => v.len() * 8,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-filled storage of the given type sized for `scalars` values.
    pub fn zeroed(scalar: ScalarType, scalars: usize) -> AttributeData {
        match scalar {
            ScalarType::U8 => AttributeData::U8(vec![0; scalars]),
            ScalarType::I8 => AttributeData::I8(vec![0; scalars]),
            ScalarType::U16 => AttributeData::U16(vec![0; scalars]),
            ScalarType::I16 => AttributeData::I16(vec![0; scalars]),
            ScalarType::U32 => AttributeData::U32(vec![0; scalars]),
            ScalarType::I32 => AttributeData::I32(vec![0; scalars]),
            ScalarType::U64 => AttributeData::U64(vec![0; scalars]),
            ScalarType::I64 => AttributeData::I64(vec![0; scalars]),
            ScalarType::F32 => AttributeData::F32(vec![0.0; scalars]),
            ScalarType::F64 => AttributeData::F64(vec![0.0; scalars]),
            ScalarType::Bit => AttributeData::Bit(vec![0; scalars.div_ceil(8)]),
        }
    }

    /// Zero-filled storage of the same type sized for `scalars` values.
    pub fn zeroed_like(&self, scalars: usize) -> AttributeData {
        match self {
            AttributeData::U8(_) => AttributeData::U8(vec![0; scalars]),
            AttributeData::I8(_) => AttributeData::I8(vec![0; scalars]),
            AttributeData::U16(_) => AttributeData::U16(vec![0; scalars]),
            AttributeData::I16(_) => AttributeData::I16(vec![0; scalars]),
            AttributeData::U32(_) => AttributeData::U32(vec![0; scalars]),
            AttributeData::I32(_) => AttributeData::I32(vec![0; scalars]),
            AttributeData::U64(_) => AttributeData::U64(vec![0; scalars]),
            AttributeData::I64(_) => AttributeData::I64(vec![0; scalars]),
            AttributeData::F32(_) => AttributeData::F32(vec![0.0; scalars]),
            AttributeData::F64(_) => AttributeData::F64(vec![0.0; scalars]),
            AttributeData::Bit(_) => AttributeData::Bit(vec![0; scalars.div_ceil(8)]),
        }
    }
}

/// One named attribute array: a fixed-size tuple of `components` scalars
/// per point or per cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub components: usize,
    pub data: AttributeData,
}

impl Attribute {
    pub fn new(name: impl Into<String>, components: usize, data: AttributeData) -> Self {
        Self {
            name: name.into(),
            components,
            data,
        }
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.data.scalar_type()
    }

    /// Number of tuples (per-point or per-cell entries).
    pub fn tuples(&self) -> usize {
        if self.components == 0 {
            0
        } else {
            self.data.len() / self.components
        }
    }

    /// Same name/type/shape, zero-filled for `tuples` entries.
    pub fn zeroed_like(&self, tuples: usize) -> Attribute {
        Attribute {
            name: self.name.clone(),
            components: self.components,
            data: self.data.zeroed_like(tuples * self.components),
        }
    }

    /// Zero-filled array built from a schema record rather than an
    /// existing array.
    pub fn zeroed(
        name: impl Into<String>,
        components: usize,
        scalar: ScalarType,
        tuples: usize,
    ) -> Attribute {
        Attribute {
            name: name.into(),
            components,
            data: AttributeData::zeroed(scalar, tuples * components),
        }
    }
}

/// Ordered collection of named attribute arrays.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    arrays: Vec<Attribute>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    pub fn push(&mut self, attr: Attribute) {
        self.arrays.push(attr);
    }

    pub fn arrays(&self) -> &[Attribute] {
        &self.arrays
    }

    pub fn arrays_mut(&mut self) -> &mut [Attribute] {
        &mut self.arrays
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.arrays.iter()
    }

    pub fn by_name(&self, name: &str) -> Option<&Attribute> {
        self.arrays.iter().find(|a| a.name == name)
    }
}
