//! Element types - the fundamental storage types of container datasets.

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Storage type of one dataset element.
///
/// Every dataset in a container holds elements of exactly one of these
/// types. Numeric types have a fixed little-endian binary representation;
/// strings are stored length-prefixed inside their chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ElementType {
    /// Signed 8-bit integer
    Int8 = 0,
    /// Unsigned 8-bit integer
    Uint8 = 1,
    /// Signed 16-bit integer
    Int16 = 2,
    /// Unsigned 16-bit integer
    Uint16 = 3,
    /// Signed 32-bit integer
    Int32 = 4,
    /// Unsigned 32-bit integer
    Uint32 = 5,
    /// Signed 64-bit integer
    Int64 = 6,
    /// Unsigned 64-bit integer
    Uint64 = 7,
    /// 32-bit floating point
    Float32 = 8,
    /// 64-bit floating point
    Float64 = 9,
    /// Variable-length UTF-8 string
    String = 10,
    /// Unknown/invalid type
    #[default]
    Unknown = 127,
}

impl ElementType {
    /// Size in bytes of one element. Zero for strings and unknown.
    #[inline]
    pub const fn num_bytes(self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Int64 | Self::Uint64 | Self::Float64 => 8,
            Self::String | Self::Unknown => 0,
        }
    }

    /// Name of this type as used in diagnostics.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Uint8 => "uint8",
            Self::Int16 => "int16",
            Self::Uint16 => "uint16",
            Self::Int32 => "int32",
            Self::Uint32 => "uint32",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
            Self::Unknown => "unknown",
        }
    }

    /// Convert from the on-disk tag.
    pub const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Int8,
            1 => Self::Uint8,
            2 => Self::Int16,
            3 => Self::Uint16,
            4 => Self::Int32,
            5 => Self::Uint32,
            6 => Self::Int64,
            7 => Self::Uint64,
            8 => Self::Float32,
            9 => Self::Float64,
            10 => Self::String,
            _ => Self::Unknown,
        }
    }

    /// Returns true if this is an integer type.
    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Uint8
                | Self::Int16
                | Self::Uint16
                | Self::Int32
                | Self::Uint32
                | Self::Int64
                | Self::Uint64
        )
    }

    /// Returns true if this is a floating point type.
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Returns true if this is a numeric type.
    #[inline]
    pub const fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Numeric types that can be stored directly as dataset elements.
pub trait Element: Pod + Zeroable + Copy + Default + PartialEq + fmt::Debug {
    /// The corresponding element type tag.
    const ELEMENT_TYPE: ElementType;

    /// Lossy conversion to f64, used when reconciling float arrays.
    fn to_f64(self) -> f64;

    /// Lossy conversion to i64, used when reconciling integer arrays.
    fn to_i64(self) -> i64;
}

macro_rules! impl_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const ELEMENT_TYPE: ElementType = ElementType::$variant;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn to_i64(self) -> i64 {
                self as i64
            }
        }
    };
}

impl_element!(i8, Int8);
impl_element!(u8, Uint8);
impl_element!(i16, Int16);
impl_element!(u16, Uint16);
impl_element!(i32, Int32);
impl_element!(u32, Uint32);
impl_element!(i64, Int64);
impl_element!(u64, Uint64);
impl_element!(f32, Float32);
impl_element!(f64, Float64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for tag in 0u8..=10 {
            let t = ElementType::from_u8(tag);
            assert_ne!(t, ElementType::Unknown);
            assert_eq!(t as u8, tag);
        }
        assert_eq!(ElementType::from_u8(99), ElementType::Unknown);
    }

    #[test]
    fn test_classification() {
        assert!(ElementType::Uint8.is_integer());
        assert!(!ElementType::Float32.is_integer());
        assert!(ElementType::Float64.is_float());
        assert!(!ElementType::String.is_numeric());
        assert_eq!(ElementType::Int64.num_bytes(), 8);
        assert_eq!(<f32 as Element>::ELEMENT_TYPE, ElementType::Float32);
    }
}
