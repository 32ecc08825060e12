//! Dataset shapes.
//!
//! A shape describes the extent of an N-dimensional dataset. Dimension 0 is
//! the row dimension: it is the one datasets are chunked and extended along.

use smallvec::SmallVec;

/// Shape of an N-dimensional dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Shape {
    /// Size of each dimension. Empty means scalar (rank 0).
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    /// Create a scalar shape (rank 0).
    pub fn scalar() -> Self {
        Self { dims: SmallVec::new() }
    }

    /// Create a 1D shape.
    pub fn d1(rows: usize) -> Self {
        Self { dims: smallvec::smallvec![rows] }
    }

    /// Create a 2D shape.
    pub fn d2(rows: usize, cols: usize) -> Self {
        Self { dims: smallvec::smallvec![rows, cols] }
    }

    /// Create from a slice of sizes.
    pub fn from_slice(sizes: &[usize]) -> Self {
        Self { dims: SmallVec::from_slice(sizes) }
    }

    /// Shape of `rows` tuples with `components` values each.
    ///
    /// Single-component arrays are 1D, others get a trailing component axis.
    pub fn tuples(rows: usize, components: usize) -> Self {
        if components > 1 {
            Self::d2(rows, components)
        } else {
            Self::d1(rows)
        }
    }

    /// Number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Size of one dimension, None if out of range.
    pub fn size(&self, dim: usize) -> Option<usize> {
        self.dims.get(dim).copied()
    }

    /// All dimension sizes.
    pub fn sizes(&self) -> &[usize] {
        &self.dims
    }

    /// Number of rows (dimension 0). Scalars count as one row.
    #[inline]
    pub fn rows(&self) -> usize {
        self.dims.first().copied().unwrap_or(1)
    }

    /// Elements per row: product of all dimensions after the first.
    pub fn row_len(&self) -> usize {
        self.dims.iter().skip(1).product()
    }

    /// Total number of elements.
    pub fn num_elements(&self) -> usize {
        if self.dims.is_empty() {
            1
        } else {
            self.dims.iter().product()
        }
    }

    /// Check if this is a scalar shape.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Same shape with dimension 0 replaced.
    pub fn with_rows(&self, rows: usize) -> Self {
        let mut out = self.clone();
        if out.dims.is_empty() {
            out.dims.push(rows);
        } else {
            out.dims[0] = rows;
        }
        out
    }

    /// Same shape without dimension 0.
    pub fn inner(&self) -> Self {
        Self::from_slice(self.dims.get(1..).unwrap_or(&[]))
    }

    /// Add a new dimension at the end.
    pub fn push(&mut self, size: usize) {
        self.dims.push(size);
    }
}

impl From<usize> for Shape {
    fn from(rows: usize) -> Self {
        Self::d1(rows)
    }
}

impl From<(usize, usize)> for Shape {
    fn from((r, c): (usize, usize)) -> Self {
        Self::d2(r, c)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Self { dims: SmallVec::from_vec(v) }
    }
}

impl From<&[usize]> for Shape {
    fn from(v: &[usize]) -> Self {
        Self::from_slice(v)
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, s) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", s)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar() {
        let s = Shape::scalar();
        assert_eq!(s.rank(), 0);
        assert!(s.is_scalar());
        assert_eq!(s.num_elements(), 1);
        assert_eq!(s.rows(), 1);
    }

    #[test]
    fn test_rows_and_inner() {
        let s = Shape::from(vec![4, 3, 2]);
        assert_eq!(s.rows(), 4);
        assert_eq!(s.row_len(), 6);
        assert_eq!(s.num_elements(), 24);
        assert_eq!(s.inner().sizes(), &[3, 2]);
        assert_eq!(s.with_rows(10).sizes(), &[10, 3, 2]);
        assert_eq!(format!("{}", s), "(4, 3, 2)");
    }

    #[test]
    fn test_tuples() {
        assert_eq!(Shape::tuples(5, 1).sizes(), &[5]);
        assert_eq!(Shape::tuples(5, 3).sizes(), &[5, 3]);
        assert_eq!(Shape::d1(7).row_len(), 1);
    }
}
