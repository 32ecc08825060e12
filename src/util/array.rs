//! Typed array storage shared by the container and the in-memory model.

use std::ops::Range;

use super::{Element, ElementType, Error, Result};

/// Homogeneous, flat element storage.
///
/// Multi-component tuples are stored interleaved; the component count lives
/// on [`DataArray`], not here.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    Int8(Vec<i8>),
    Uint8(Vec<u8>),
    Int16(Vec<i16>),
    Uint16(Vec<u16>),
    Int32(Vec<i32>),
    Uint32(Vec<u32>),
    Int64(Vec<i64>),
    Uint64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    String(Vec<String>),
}

/// Apply one expression to the inner vector of any variant.
macro_rules! with_vec {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ArrayData::Int8($v) => $body,
            ArrayData::Uint8($v) => $body,
            ArrayData::Int16($v) => $body,
            ArrayData::Uint16($v) => $body,
            ArrayData::Int32($v) => $body,
            ArrayData::Uint32($v) => $body,
            ArrayData::Int64($v) => $body,
            ArrayData::Uint64($v) => $body,
            ArrayData::Float32($v) => $body,
            ArrayData::Float64($v) => $body,
            ArrayData::String($v) => $body,
        }
    };
}

/// Apply one expression to the inner vector and rewrap in the same variant.
macro_rules! map_vec {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ArrayData::Int8($v) => ArrayData::Int8($body),
            ArrayData::Uint8($v) => ArrayData::Uint8($body),
            ArrayData::Int16($v) => ArrayData::Int16($body),
            ArrayData::Uint16($v) => ArrayData::Uint16($body),
            ArrayData::Int32($v) => ArrayData::Int32($body),
            ArrayData::Uint32($v) => ArrayData::Uint32($body),
            ArrayData::Int64($v) => ArrayData::Int64($body),
            ArrayData::Uint64($v) => ArrayData::Uint64($body),
            ArrayData::Float32($v) => ArrayData::Float32($body),
            ArrayData::Float64($v) => ArrayData::Float64($body),
            ArrayData::String($v) => ArrayData::String($body),
        }
    };
}

/// Apply one expression to numeric variants only.
macro_rules! with_numeric {
    ($data:expr, $v:ident => $body:expr, $string:expr) => {
        match $data {
            ArrayData::Int8($v) => $body,
            ArrayData::Uint8($v) => $body,
            ArrayData::Int16($v) => $body,
            ArrayData::Uint16($v) => $body,
            ArrayData::Int32($v) => $body,
            ArrayData::Uint32($v) => $body,
            ArrayData::Int64($v) => $body,
            ArrayData::Uint64($v) => $body,
            ArrayData::Float32($v) => $body,
            ArrayData::Float64($v) => $body,
            ArrayData::String(_) => $string,
        }
    };
}

impl ArrayData {
    /// Empty storage of the given element type.
    pub fn empty(element_type: ElementType) -> Result<Self> {
        Ok(match element_type {
            ElementType::Int8 => Self::Int8(Vec::new()),
            ElementType::Uint8 => Self::Uint8(Vec::new()),
            ElementType::Int16 => Self::Int16(Vec::new()),
            ElementType::Uint16 => Self::Uint16(Vec::new()),
            ElementType::Int32 => Self::Int32(Vec::new()),
            ElementType::Uint32 => Self::Uint32(Vec::new()),
            ElementType::Int64 => Self::Int64(Vec::new()),
            ElementType::Uint64 => Self::Uint64(Vec::new()),
            ElementType::Float32 => Self::Float32(Vec::new()),
            ElementType::Float64 => Self::Float64(Vec::new()),
            ElementType::String => Self::String(Vec::new()),
            ElementType::Unknown => return Err(Error::invalid("unknown element type")),
        })
    }

    /// Element type tag of this storage.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Int8(_) => ElementType::Int8,
            Self::Uint8(_) => ElementType::Uint8,
            Self::Int16(_) => ElementType::Int16,
            Self::Uint16(_) => ElementType::Uint16,
            Self::Int32(_) => ElementType::Int32,
            Self::Uint32(_) => ElementType::Uint32,
            Self::Int64(_) => ElementType::Int64,
            Self::Uint64(_) => ElementType::Uint64,
            Self::Float32(_) => ElementType::Float32,
            Self::Float64(_) => ElementType::Float64,
            Self::String(_) => ElementType::String,
        }
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        with_vec!(self, v => v.len())
    }

    /// Check if storage holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the elements as a typed slice, if the type matches.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        if self.element_type() != T::ELEMENT_TYPE {
            return None;
        }
        with_numeric!(self, v => bytemuck::try_cast_slice(v.as_slice()).ok(), None)
    }

    /// Copy of the elements widened to f64. None for strings.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        with_numeric!(self, v => Some(v.iter().map(|x| x.to_f64()).collect()), None)
    }

    /// Copy of the elements widened to i64. None unless the type is an integer.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        if !self.element_type().is_integer() {
            return None;
        }
        with_numeric!(self, v => Some(v.iter().map(|x| x.to_i64()).collect()), None)
    }

    /// Elements in `range` as a new storage of the same type.
    pub fn slice(&self, range: Range<usize>) -> Self {
        map_vec!(self, v => v[range.clone()].to_vec())
    }

    /// Concatenate the given element ranges into a new storage.
    pub fn select_runs(&self, runs: &[Range<usize>]) -> Self {
        map_vec!(self, v => {
            let total = runs.iter().map(|r| r.len()).sum();
            let mut out = Vec::with_capacity(total);
            for r in runs {
                out.extend_from_slice(&v[r.clone()]);
            }
            out
        })
    }

    /// Append all elements of `other`, which must have the same type.
    pub fn extend_from(&mut self, other: &ArrayData) -> Result<()> {
        macro_rules! ext {
            ($($variant:ident),*) => {
                match (&mut *self, other) {
                    $( (Self::$variant(a), Self::$variant(b)) => {
                        a.extend_from_slice(b);
                        Ok(())
                    } )*
                    (a, b) => Err(Error::type_mismatch(
                        "appended data",
                        a.element_type().name(),
                        b.element_type().name(),
                    )),
                }
            };
        }
        ext!(Int8, Uint8, Int16, Uint16, Int32, Uint32, Int64, Uint64, Float32, Float64, String)
    }

    /// Release excess capacity.
    pub fn shrink_to_fit(&mut self) {
        with_vec!(self, v => v.shrink_to_fit())
    }

    /// Allocated capacity in elements.
    pub fn capacity(&self) -> usize {
        with_vec!(self, v => v.capacity())
    }

    /// Encode to the container's little-endian byte layout.
    ///
    /// Strings are written as `u32` length + UTF-8 bytes each.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::String(v) => {
                let mut out = Vec::with_capacity(v.iter().map(|s| 4 + s.len()).sum());
                for s in v {
                    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
                out
            }
            other => with_numeric!(other, v => bytemuck::cast_slice(v.as_slice()).to_vec(), Vec::new()),
        }
    }

    /// Decode from the container's little-endian byte layout.
    pub fn from_le_bytes(element_type: ElementType, bytes: &[u8]) -> Result<Self> {
        if element_type == ElementType::String {
            let mut out = Vec::new();
            let mut pos = 0usize;
            while pos < bytes.len() {
                if pos + 4 > bytes.len() {
                    return Err(Error::invalid("string element length truncated"));
                }
                let len = u32::from_le_bytes([
                    bytes[pos],
                    bytes[pos + 1],
                    bytes[pos + 2],
                    bytes[pos + 3],
                ]) as usize;
                pos += 4;
                if pos + len > bytes.len() {
                    return Err(Error::invalid("string element truncated"));
                }
                out.push(String::from_utf8(bytes[pos..pos + len].to_vec())?);
                pos += len;
            }
            return Ok(Self::String(out));
        }

        let size = element_type.num_bytes();
        if size == 0 {
            return Err(Error::invalid("unknown element type"));
        }
        if bytes.len() % size != 0 {
            return Err(Error::invalid(format!(
                "{} bytes is not a multiple of {} element size {}",
                bytes.len(),
                element_type,
                size
            )));
        }
        Ok(match element_type {
            ElementType::Int8 => Self::Int8(bytemuck::pod_collect_to_vec(bytes)),
            ElementType::Uint8 => Self::Uint8(bytes.to_vec()),
            ElementType::Int16 => Self::Int16(bytemuck::pod_collect_to_vec(bytes)),
            ElementType::Uint16 => Self::Uint16(bytemuck::pod_collect_to_vec(bytes)),
            ElementType::Int32 => Self::Int32(bytemuck::pod_collect_to_vec(bytes)),
            ElementType::Uint32 => Self::Uint32(bytemuck::pod_collect_to_vec(bytes)),
            ElementType::Int64 => Self::Int64(bytemuck::pod_collect_to_vec(bytes)),
            ElementType::Uint64 => Self::Uint64(bytemuck::pod_collect_to_vec(bytes)),
            ElementType::Float32 => Self::Float32(bytemuck::pod_collect_to_vec(bytes)),
            ElementType::Float64 => Self::Float64(bytemuck::pod_collect_to_vec(bytes)),
            ElementType::String | ElementType::Unknown => unreachable!("handled above"),
        })
    }
}

macro_rules! impl_from_vec {
    ($t:ty, $variant:ident) => {
        impl From<Vec<$t>> for ArrayData {
            fn from(v: Vec<$t>) -> Self {
                Self::$variant(v)
            }
        }
    };
}

impl_from_vec!(i8, Int8);
impl_from_vec!(u8, Uint8);
impl_from_vec!(i16, Int16);
impl_from_vec!(u16, Uint16);
impl_from_vec!(i32, Int32);
impl_from_vec!(u32, Uint32);
impl_from_vec!(i64, Int64);
impl_from_vec!(u64, Uint64);
impl_from_vec!(f32, Float32);
impl_from_vec!(f64, Float64);
impl_from_vec!(String, String);

/// A named array of fixed-width tuples.
#[derive(Clone, Debug, PartialEq)]
pub struct DataArray {
    /// Array name, unique within its attribute set.
    pub name: String,
    /// Number of components per tuple (at least 1).
    pub components: usize,
    /// Interleaved tuple storage.
    pub data: ArrayData,
}

impl DataArray {
    /// Create a named array.
    pub fn new(name: impl Into<String>, components: usize, data: impl Into<ArrayData>) -> Self {
        Self {
            name: name.into(),
            components: components.max(1),
            data: data.into(),
        }
    }

    /// Single-component array.
    pub fn scalars(name: impl Into<String>, data: impl Into<ArrayData>) -> Self {
        Self::new(name, 1, data)
    }

    /// Number of tuples.
    #[inline]
    pub fn num_tuples(&self) -> usize {
        self.data.len() / self.components
    }

    /// Element type of the stored values.
    #[inline]
    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    /// Tuples `start..start + count` as a new array with the same name.
    pub fn slice_tuples(&self, start: usize, count: usize) -> Self {
        let c = self.components;
        Self {
            name: self.name.clone(),
            components: c,
            data: self.data.slice(start * c..(start + count) * c),
        }
    }

    /// Append the tuples of `other`; component count and type must agree.
    pub fn append(&mut self, other: &DataArray) -> Result<()> {
        if other.components != self.components {
            return Err(Error::ReadError {
                array: self.name.clone(),
                reason: format!(
                    "cannot append {} components to {} components",
                    other.components, self.components
                ),
            });
        }
        self.data.extend_from(&other.data).map_err(|_| {
            Error::type_mismatch(
                self.name.clone(),
                self.element_type().name(),
                other.element_type().name(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_roundtrip_numeric() {
        let data = ArrayData::from(vec![1.5f64, -2.0, 3.25]);
        let bytes = data.to_le_bytes();
        assert_eq!(bytes.len(), 24);
        let back = ArrayData::from_le_bytes(ElementType::Float64, &bytes).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_bytes_roundtrip_strings() {
        let data = ArrayData::from(vec!["alpha".to_string(), String::new(), "γ".to_string()]);
        let back = ArrayData::from_le_bytes(ElementType::String, &data.to_le_bytes()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_bytes_bad_length() {
        let err = ArrayData::from_le_bytes(ElementType::Int32, &[0, 1, 2]);
        assert!(err.is_err());
    }

    #[test]
    fn test_conversions() {
        let data = ArrayData::from(vec![1u8, 2, 3]);
        assert_eq!(data.to_i64_vec(), Some(vec![1, 2, 3]));
        assert_eq!(data.to_f64_vec(), Some(vec![1.0, 2.0, 3.0]));
        assert!(ArrayData::from(vec![1.0f32]).to_i64_vec().is_none());
        assert_eq!(data.as_slice::<u8>(), Some(&[1u8, 2, 3][..]));
        assert!(data.as_slice::<i8>().is_none());
    }

    #[test]
    fn test_select_runs() {
        let data = ArrayData::from((0..10).collect::<Vec<i32>>());
        let out = data.select_runs(&[1..3, 7..9]);
        assert_eq!(out, ArrayData::from(vec![1, 2, 7, 8]));
    }

    #[test]
    fn test_data_array_tuples() {
        let mut a = DataArray::new("v", 3, vec![0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(a.num_tuples(), 2);
        let s = a.slice_tuples(1, 1);
        assert_eq!(s.data, ArrayData::from(vec![3.0f32, 4.0, 5.0]));

        a.append(&s).unwrap();
        assert_eq!(a.num_tuples(), 3);

        let wrong = DataArray::new("v", 1, vec![1.0f32]);
        assert!(a.append(&wrong).is_err());
        let wrong_type = DataArray::new("v", 3, vec![1.0f64, 2.0, 3.0]);
        assert!(matches!(a.append(&wrong_type), Err(Error::ArrayTypeMismatch { .. })));
    }
}
