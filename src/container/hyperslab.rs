//! Rectangular sub-range selections of N-dimensional datasets.

use std::ops::Range;

use crate::util::{Error, Result, Shape};

/// A contiguous block selection: `count[d]` elements from `start[d]` in every
/// dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hyperslab {
    pub start: Vec<usize>,
    pub count: Vec<usize>,
}

impl Hyperslab {
    /// Build from one range per dimension.
    pub fn from_ranges(ranges: &[Range<usize>]) -> Self {
        Self {
            start: ranges.iter().map(|r| r.start).collect(),
            count: ranges.iter().map(|r| r.end.saturating_sub(r.start)).collect(),
        }
    }

    /// Select `count` rows from `start` and everything in the inner dimensions.
    pub fn rows(shape: &Shape, start: usize, count: usize) -> Self {
        let mut slab = Self::all(shape);
        if let (Some(s), Some(c)) = (slab.start.first_mut(), slab.count.first_mut()) {
            *s = start;
            *c = count;
        }
        slab
    }

    /// Select the whole dataset.
    pub fn all(shape: &Shape) -> Self {
        Self {
            start: vec![0; shape.rank()],
            count: shape.sizes().to_vec(),
        }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.start.len()
    }

    /// Number of selected elements.
    pub fn num_elements(&self) -> usize {
        self.count.iter().product()
    }

    /// Shape of the selected block.
    pub fn output_shape(&self) -> Shape {
        Shape::from_slice(&self.count)
    }

    /// Check the selection lies inside `shape`.
    pub fn validate(&self, shape: &Shape) -> Result<()> {
        if self.rank() != shape.rank() || self.count.len() != self.start.len() {
            return Err(Error::OutOfBounds(format!(
                "selection of rank {} on dataset of rank {}",
                self.rank(),
                shape.rank()
            )));
        }
        for (d, (&s, &c)) in self.start.iter().zip(&self.count).enumerate() {
            let extent = shape.sizes()[d];
            if s + c > extent {
                return Err(Error::OutOfBounds(format!(
                    "dimension {}: {}..{} exceeds extent {}",
                    d,
                    s,
                    s + c,
                    extent
                )));
            }
        }
        Ok(())
    }

    /// Element runs of one selected row, relative to the start of that row.
    ///
    /// Adjacent runs are merged, so selecting the full inner block yields a
    /// single run.
    pub fn inner_runs(&self, shape: &Shape) -> Vec<Range<usize>> {
        let dims = shape.sizes();
        let rank = dims.len();
        if rank <= 1 {
            return vec![0..1];
        }
        if self.count[1..].iter().any(|&c| c == 0) {
            return Vec::new();
        }

        // Row-major strides of the inner dimensions.
        let mut strides = vec![1usize; rank];
        for d in (1..rank - 1).rev() {
            strides[d] = strides[d + 1] * dims[d + 1];
        }

        let last = rank - 1;
        let run_len = self.count[last];
        let mut runs: Vec<Range<usize>> = Vec::new();
        let mut idx = vec![0usize; rank];
        loop {
            let mut offset = self.start[last];
            for d in 1..last {
                offset += (self.start[d] + idx[d]) * strides[d];
            }
            match runs.last_mut() {
                Some(prev) if prev.end == offset => prev.end += run_len,
                _ => runs.push(offset..offset + run_len),
            }

            // Odometer over dimensions 1..last.
            let mut d = last;
            loop {
                if d <= 1 {
                    return runs;
                }
                d -= 1;
                idx[d] += 1;
                if idx[d] < self.count[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows() {
        let shape = Shape::d2(10, 3);
        let slab = Hyperslab::rows(&shape, 2, 4);
        assert_eq!(slab.start, vec![2, 0]);
        assert_eq!(slab.count, vec![4, 3]);
        assert_eq!(slab.num_elements(), 12);
        assert!(slab.validate(&shape).is_ok());
        assert!(Hyperslab::rows(&shape, 8, 4).validate(&shape).is_err());
    }

    #[test]
    fn test_inner_runs_full_row_merges() {
        let shape = Shape::from(vec![5, 4, 3]);
        let slab = Hyperslab::rows(&shape, 1, 2);
        assert_eq!(slab.inner_runs(&shape), vec![0..12]);
    }

    #[test]
    fn test_inner_runs_partial() {
        // rows x 4 x 5, select [*, 1..3, 2..4]
        let shape = Shape::from(vec![2, 4, 5]);
        let slab = Hyperslab::from_ranges(&[0..2, 1..3, 2..4]);
        assert_eq!(slab.inner_runs(&shape), vec![7..9, 12..14]);
    }

    #[test]
    fn test_inner_runs_1d() {
        let shape = Shape::d1(8);
        assert_eq!(Hyperslab::rows(&shape, 0, 8).inner_runs(&shape), vec![0..1]);
    }
}
