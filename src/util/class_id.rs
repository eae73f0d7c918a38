//! Type tag registry - the persisted identity of every scalar element type.
//!
//! Each scalar, vector, matrix and raster written to a Quipu file is preceded
//! by its [`ClassId`]. Readers dispatch on that tag to decode the native width
//! and then convert into whatever type the caller asked for, which is how a
//! reader built for `f64` consumes data a writer emitted as `f32`.

use byteorder::{ByteOrder, LittleEndian};
use bytemuck::Pod;
use std::fmt;

use super::{Error, Result};

/// Persisted element type tag.
///
/// Discriminants are explicit and append-only: a value must never be
/// renumbered or reused, otherwise independently built readers and writers
/// disagree on what a tag means. New element types get a new explicit value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum ClassId {
    /// A class id stored as a value in its own right
    Tag = 0,
    /// 32-bit IEEE 754 float
    Float32 = 1,
    /// 64-bit IEEE 754 float
    Float64 = 2,
    /// Unsigned 8-bit integer
    Uint8 = 3,
    /// Unsigned 16-bit integer
    Uint16 = 4,
    /// Unsigned 32-bit integer
    Uint32 = 5,
    /// Unsigned 64-bit integer
    Uint64 = 6,
    /// Signed 8-bit integer
    Int8 = 7,
    /// Signed 16-bit integer
    Int16 = 8,
    /// Signed 32-bit integer
    Int32 = 9,
    /// Signed 64-bit integer
    Int64 = 10,
}

impl ClassId {
    /// Number of registered tags.
    pub const COUNT: usize = 11;

    /// All registered tags in discriminant order.
    pub const ALL: [ClassId; Self::COUNT] = [
        Self::Tag,
        Self::Float32,
        Self::Float64,
        Self::Uint8,
        Self::Uint16,
        Self::Uint32,
        Self::Uint64,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
    ];

    /// Size in bytes of one element of this type on disk.
    #[inline]
    pub const fn num_bytes(self) -> usize {
        match self {
            Self::Tag => 2,
            Self::Float32 => 4,
            Self::Float64 => 8,
            Self::Uint8 => 1,
            Self::Uint16 => 2,
            Self::Uint32 => 4,
            Self::Uint64 => 8,
            Self::Int8 => 1,
            Self::Int16 => 2,
            Self::Int32 => 4,
            Self::Int64 => 8,
        }
    }

    /// Returns the name of this type as a string.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tag => "class_id",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
        }
    }

    /// The persisted integer value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Look up a persisted value; `None` if unregistered.
    pub const fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(Self::Tag),
            1 => Some(Self::Float32),
            2 => Some(Self::Float64),
            3 => Some(Self::Uint8),
            4 => Some(Self::Uint16),
            5 => Some(Self::Uint32),
            6 => Some(Self::Uint64),
            7 => Some(Self::Int8),
            8 => Some(Self::Int16),
            9 => Some(Self::Int32),
            10 => Some(Self::Int64),
            _ => None,
        }
    }

    /// Like [`ClassId::from_u16`] but fails with `UnsupportedClassId`.
    pub fn try_from_u16(v: u16) -> Result<Self> {
        Self::from_u16(v).ok_or(Error::UnsupportedClassId(v))
    }

    /// Returns true if this is a floating point type.
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Returns true if this is an integer type (the tag type counts as one).
    #[inline]
    pub const fn is_integer(self) -> bool {
        !self.is_float()
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One decoded scalar at its native on-disk width.
///
/// Reading goes bytes -> `Scalar` (dispatch on the tag) -> caller type
/// (numeric conversion), so adding a tag means adding a variant here and the
/// compiler points at every match that needs it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    Tag(u16),
    Float32(f32),
    Float64(f64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
}

impl Scalar {
    /// Tag describing this value's native width.
    pub const fn class_id(&self) -> ClassId {
        match self {
            Self::Tag(_) => ClassId::Tag,
            Self::Float32(_) => ClassId::Float32,
            Self::Float64(_) => ClassId::Float64,
            Self::Uint8(_) => ClassId::Uint8,
            Self::Uint16(_) => ClassId::Uint16,
            Self::Uint32(_) => ClassId::Uint32,
            Self::Uint64(_) => ClassId::Uint64,
            Self::Int8(_) => ClassId::Int8,
            Self::Int16(_) => ClassId::Int16,
            Self::Int32(_) => ClassId::Int32,
            Self::Int64(_) => ClassId::Int64,
        }
    }

    /// Decode one element. `bytes` must hold exactly `class_id.num_bytes()`.
    pub fn decode(class_id: ClassId, bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), class_id.num_bytes());
        match class_id {
            ClassId::Tag => Self::Tag(LittleEndian::read_u16(bytes)),
            ClassId::Float32 => Self::Float32(LittleEndian::read_f32(bytes)),
            ClassId::Float64 => Self::Float64(LittleEndian::read_f64(bytes)),
            ClassId::Uint8 => Self::Uint8(bytes[0]),
            ClassId::Uint16 => Self::Uint16(LittleEndian::read_u16(bytes)),
            ClassId::Uint32 => Self::Uint32(LittleEndian::read_u32(bytes)),
            ClassId::Uint64 => Self::Uint64(LittleEndian::read_u64(bytes)),
            ClassId::Int8 => Self::Int8(bytes[0] as i8),
            ClassId::Int16 => Self::Int16(LittleEndian::read_i16(bytes)),
            ClassId::Int32 => Self::Int32(LittleEndian::read_i32(bytes)),
            ClassId::Int64 => Self::Int64(LittleEndian::read_i64(bytes)),
        }
    }

    /// Convert into the caller's type.
    #[inline]
    pub fn to<T: QuipuPod>(self) -> T {
        T::from_scalar(self)
    }
}

/// Rust types that have a registered [`ClassId`].
pub trait QuipuPod: Pod + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The tag written in front of values of this type.
    const CLASS_ID: ClassId;

    /// Numeric conversion from any registered width (`as` semantics).
    fn from_scalar(s: Scalar) -> Self;

    /// Wrap this value as a [`Scalar`].
    fn to_scalar(self) -> Scalar;
}

macro_rules! impl_quipu_pod {
    ($t:ty, $variant:ident) => {
        impl QuipuPod for $t {
            const CLASS_ID: ClassId = ClassId::$variant;

            #[inline]
            fn from_scalar(s: Scalar) -> Self {
                match s {
                    Scalar::Tag(v) => v as $t,
                    Scalar::Float32(v) => v as $t,
                    Scalar::Float64(v) => v as $t,
                    Scalar::Uint8(v) => v as $t,
                    Scalar::Uint16(v) => v as $t,
                    Scalar::Uint32(v) => v as $t,
                    Scalar::Uint64(v) => v as $t,
                    Scalar::Int8(v) => v as $t,
                    Scalar::Int16(v) => v as $t,
                    Scalar::Int32(v) => v as $t,
                    Scalar::Int64(v) => v as $t,
                }
            }

            #[inline]
            fn to_scalar(self) -> Scalar {
                Scalar::$variant(self)
            }
        }
    };
}

impl_quipu_pod!(f32, Float32);
impl_quipu_pod!(f64, Float64);
impl_quipu_pod!(u8, Uint8);
impl_quipu_pod!(u16, Uint16);
impl_quipu_pod!(u32, Uint32);
impl_quipu_pod!(u64, Uint64);
impl_quipu_pod!(i8, Int8);
impl_quipu_pod!(i16, Int16);
impl_quipu_pod!(i32, Int32);
impl_quipu_pod!(i64, Int64);

/// Decode a packed run of `class_id` elements into `T`.
///
/// Same-type data is copied straight out of the buffer; anything else is
/// decoded element by element at the stored width and converted.
pub fn decode_slice<T: QuipuPod>(class_id: ClassId, bytes: &[u8]) -> Result<Vec<T>> {
    let width = class_id.num_bytes();
    if bytes.len() % width != 0 {
        return Err(Error::invalid(format!(
            "{} bytes is not a whole number of {} elements",
            bytes.len(),
            class_id
        )));
    }
    if class_id == T::CLASS_ID {
        return Ok(bytemuck::pod_collect_to_vec(bytes));
    }
    Ok(bytes
        .chunks_exact(width)
        .map(|chunk| Scalar::decode(class_id, chunk).to::<T>())
        .collect())
}
