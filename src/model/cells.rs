//! Cell connectivity storage.

use crate::util::{Error, Result};

/// Variable-size cells in offsets + connectivity form.
///
/// `offsets` always holds `num_cells + 1` entries starting at 0; cell `i`
/// uses `connectivity[offsets[i]..offsets[i + 1]]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellArray {
    offsets: Vec<i64>,
    connectivity: Vec<i64>,
}

impl Default for CellArray {
    fn default() -> Self {
        Self::new()
    }
}

impl CellArray {
    /// An empty cell array.
    pub fn new() -> Self {
        Self {
            offsets: vec![0],
            connectivity: Vec::new(),
        }
    }

    /// Build from raw offsets and connectivity, checking consistency.
    pub fn from_raw(offsets: Vec<i64>, connectivity: Vec<i64>) -> Result<Self> {
        if offsets.is_empty() {
            if !connectivity.is_empty() {
                return Err(Error::invalid("connectivity without offsets"));
            }
            return Ok(Self::new());
        }
        if offsets[0] != 0 {
            return Err(Error::invalid(format!("cell offsets start at {}", offsets[0])));
        }
        if offsets.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::invalid("cell offsets are not monotonic"));
        }
        let last = offsets.last().copied().unwrap_or(0);
        if last as usize != connectivity.len() {
            return Err(Error::invalid(format!(
                "cell offsets end at {} but connectivity has {} ids",
                last,
                connectivity.len()
            )));
        }
        Ok(Self {
            offsets,
            connectivity,
        })
    }

    /// Build from a list of cells.
    pub fn from_cells<C: AsRef<[i64]>>(cells: &[C]) -> Self {
        let mut out = Self::new();
        for c in cells {
            out.push_cell(c.as_ref());
        }
        out
    }

    /// Append one cell.
    pub fn push_cell(&mut self, ids: &[i64]) {
        self.connectivity.extend_from_slice(ids);
        self.offsets.push(self.connectivity.len() as i64);
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.offsets.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_cells() == 0
    }

    /// Total number of point ids over all cells.
    #[inline]
    pub fn num_connectivity_ids(&self) -> usize {
        self.connectivity.len()
    }

    /// Point ids of cell `i`.
    pub fn cell(&self, i: usize) -> &[i64] {
        let (a, b) = (self.offsets[i] as usize, self.offsets[i + 1] as usize);
        &self.connectivity[a..b]
    }

    pub fn offsets(&self) -> &[i64] {
        &self.offsets
    }

    pub fn connectivity(&self) -> &[i64] {
        &self.connectivity
    }

    /// Append all cells of `other`, shifting its point ids by `point_shift`.
    pub fn append(&mut self, other: &CellArray, point_shift: i64) {
        let base = self.connectivity.len() as i64;
        self.connectivity
            .extend(other.connectivity.iter().map(|&id| id + point_shift));
        self.offsets
            .extend(other.offsets.iter().skip(1).map(|&o| o + base));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cells() {
        let cells = CellArray::from_cells(&[vec![0, 1, 2], vec![2, 3]]);
        assert_eq!(cells.num_cells(), 2);
        assert_eq!(cells.num_connectivity_ids(), 5);
        assert_eq!(cells.offsets(), &[0, 3, 5]);
        assert_eq!(cells.cell(1), &[2, 3]);
    }

    #[test]
    fn test_from_raw_validation() {
        assert!(CellArray::from_raw(vec![0, 2], vec![1, 2]).is_ok());
        assert!(CellArray::from_raw(vec![1, 2], vec![1, 2]).is_err());
        assert!(CellArray::from_raw(vec![0, 3], vec![1, 2]).is_err());
        assert!(CellArray::from_raw(vec![0, 2, 1], vec![1, 2]).is_err());
        assert!(CellArray::from_raw(Vec::new(), Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_append_shifts_ids() {
        let mut a = CellArray::from_cells(&[vec![0, 1]]);
        let b = CellArray::from_cells(&[vec![0, 1, 2]]);
        a.append(&b, 2);
        assert_eq!(a.offsets(), &[0, 2, 5]);
        assert_eq!(a.connectivity(), &[0, 1, 2, 3, 4]);
    }
}
