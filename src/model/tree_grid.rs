//! Tree-structured adaptive grids.
//!
//! Each coarse cell of the grid holds a tree. A tree is stored breadth-first:
//! `cells_per_depth[k]` cells live at depth `k`, and every cell above the
//! deepest depth owns one refinement bit (1 = refined into
//! `children_per_cell` children, 0 = leaf).

use super::attributes::Attributes;
use crate::util::{Error, Result};

/// One refinement tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    /// Index of the coarse cell this tree refines.
    pub index: i64,
    pub cells_per_depth: Vec<i64>,
    /// Refinement bits of every depth except the deepest.
    pub descriptor: Vec<bool>,
    /// Optional validity mask, one bit per cell.
    pub mask: Option<Vec<bool>>,
}

impl Tree {
    /// A tree made of a single unrefined root.
    pub fn leaf(index: i64) -> Self {
        Self {
            index,
            cells_per_depth: vec![1],
            descriptor: Vec::new(),
            mask: None,
        }
    }

    /// Derive the per-depth cell counts from a breadth-first descriptor.
    pub fn from_descriptor(index: i64, descriptor: Vec<bool>, children_per_cell: usize) -> Result<Self> {
        let mut cells_per_depth = vec![1i64];
        let mut pos = 0usize;
        while pos < descriptor.len() {
            let n = cells_per_depth.last().copied().unwrap_or(0) as usize;
            if pos + n > descriptor.len() {
                return Err(Error::invalid(format!(
                    "tree {}: descriptor ends inside depth {}",
                    index,
                    cells_per_depth.len() - 1
                )));
            }
            let refined = descriptor[pos..pos + n].iter().filter(|&&b| b).count();
            if refined == 0 {
                return Err(Error::invalid(format!(
                    "tree {}: depth {} carries bits but refines nothing",
                    index,
                    cells_per_depth.len() - 1
                )));
            }
            pos += n;
            cells_per_depth.push((refined * children_per_cell) as i64);
        }
        Ok(Self {
            index,
            cells_per_depth,
            descriptor,
            mask: None,
        })
    }

    /// Number of depths.
    #[inline]
    pub fn depth(&self) -> usize {
        self.cells_per_depth.len()
    }

    /// Total number of cells.
    pub fn num_cells(&self) -> usize {
        self.cells_per_depth.iter().sum::<i64>() as usize
    }

    /// Cells at depths `< min(max_depth, depth)`.
    pub fn cells_to_depth(&self, max_depth: usize) -> usize {
        cells_to_depth(&self.cells_per_depth, max_depth)
    }

    /// Length of the refinement descriptor (every depth but the deepest).
    pub fn descriptor_len(&self) -> usize {
        descriptor_len_to_depth(&self.cells_per_depth, self.depth())
    }

    /// Check counts, descriptor and mask agree.
    pub fn validate(&self, children_per_cell: usize) -> Result<()> {
        if self.cells_per_depth.first() != Some(&1) {
            return Err(Error::invalid(format!("tree {} does not start with one root", self.index)));
        }
        if self.descriptor.len() != self.descriptor_len() {
            return Err(Error::invalid(format!(
                "tree {}: {} descriptor bits for {} non-leaf-depth cells",
                self.index,
                self.descriptor.len(),
                self.descriptor_len()
            )));
        }
        let mut pos = 0usize;
        for k in 0..self.depth().saturating_sub(1) {
            let n = self.cells_per_depth[k] as usize;
            let refined = self.descriptor[pos..pos + n].iter().filter(|&&b| b).count();
            if (refined * children_per_cell) as i64 != self.cells_per_depth[k + 1] {
                return Err(Error::invalid(format!(
                    "tree {}: depth {} refines {} cells but depth {} holds {}",
                    self.index,
                    k,
                    refined,
                    k + 1,
                    self.cells_per_depth[k + 1]
                )));
            }
            pos += n;
        }
        if let Some(mask) = &self.mask {
            if mask.len() != self.num_cells() {
                return Err(Error::invalid(format!(
                    "tree {}: mask has {} bits for {} cells",
                    self.index,
                    mask.len(),
                    self.num_cells()
                )));
            }
        }
        Ok(())
    }

    /// Copy of this tree cut at `max_depth` depths.
    ///
    /// Cells of the last kept depth become leaves.
    pub fn truncated(&self, max_depth: usize) -> Tree {
        let d = max_depth.min(self.depth()).max(1);
        let cells = self.cells_to_depth(d);
        Tree {
            index: self.index,
            cells_per_depth: self.cells_per_depth[..d].to_vec(),
            descriptor: self.descriptor[..descriptor_len_to_depth(&self.cells_per_depth, d)].to_vec(),
            mask: self.mask.as_ref().map(|m| m[..cells].to_vec()),
        }
    }
}

/// Cells at depths below `min(max_depth, depths)`.
pub fn cells_to_depth(cells_per_depth: &[i64], max_depth: usize) -> usize {
    let d = max_depth.min(cells_per_depth.len());
    cells_per_depth[..d].iter().sum::<i64>() as usize
}

/// Descriptor bits needed to describe the first `max_depth` depths.
pub fn descriptor_len_to_depth(cells_per_depth: &[i64], max_depth: usize) -> usize {
    let d = max_depth.min(cells_per_depth.len());
    cells_to_depth(cells_per_depth, d.saturating_sub(1))
}

/// Grid of refinement trees on rectilinear coarse coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeGrid {
    pub branch_factor: usize,
    /// Coordinate points per axis.
    pub dimensions: [usize; 3],
    pub x_coords: Vec<f64>,
    pub y_coords: Vec<f64>,
    pub z_coords: Vec<f64>,
    pub trees: Vec<Tree>,
    /// Cell data over all trees, tree by tree in breadth-first order.
    pub attributes: Attributes,
    pub interface_intercepts_name: Option<String>,
    pub interface_normals_name: Option<String>,
}

impl Default for TreeGrid {
    fn default() -> Self {
        Self {
            branch_factor: 2,
            dimensions: [1, 1, 1],
            x_coords: vec![0.0],
            y_coords: vec![0.0],
            z_coords: vec![0.0],
            trees: Vec::new(),
            attributes: Attributes::default(),
            interface_intercepts_name: None,
            interface_normals_name: None,
        }
    }
}

impl TreeGrid {
    /// Number of axes with more than one coordinate.
    pub fn dimension(&self) -> usize {
        self.dimensions.iter().filter(|&&n| n > 1).count()
    }

    /// Children of a refined cell: `branch_factor ^ dimension`.
    pub fn children_per_cell(&self) -> usize {
        self.branch_factor.pow(self.dimension() as u32)
    }

    /// Number of coarse cells that may hold a tree.
    pub fn max_trees(&self) -> usize {
        self.dimensions
            .iter()
            .map(|&n| n.saturating_sub(1).max(1))
            .product()
    }

    /// Total cells over all trees.
    pub fn num_cells(&self) -> usize {
        self.trees.iter().map(Tree::num_cells).sum()
    }

    /// Check if any tree carries a mask.
    pub fn has_mask(&self) -> bool {
        self.trees.iter().any(|t| t.mask.is_some())
    }

    /// Drop excess capacity left by pre-sizing during assembly.
    pub fn shrink_to_fit(&mut self) {
        self.trees.shrink_to_fit();
        for t in &mut self.trees {
            t.cells_per_depth.shrink_to_fit();
            t.descriptor.shrink_to_fit();
            if let Some(m) = &mut t.mask {
                m.shrink_to_fit();
            }
        }
        for kind in super::AttributeKind::ALL {
            let set = self.attributes.get_mut(kind);
            let names: Vec<String> = set.names().iter().map(|s| s.to_string()).collect();
            for name in names {
                if let Some(a) = set.get_mut(&name) {
                    a.data.shrink_to_fit();
                }
            }
        }
    }

    /// Check every tree.
    pub fn validate(&self) -> Result<()> {
        let children = self.children_per_cell();
        for t in &self.trees {
            t.validate(children)?;
        }
        Ok(())
    }
}

/// Pack bits MSB-first.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; bits.len().div_ceil(8)];
    for (i, &b) in bits.iter().enumerate() {
        if b {
            out[i / 8] |= 0x80 >> (i % 8);
        }
    }
    out
}

/// Unpack `count` bits MSB-first starting at bit `start`.
pub fn unpack_bits(bytes: &[u8], start: usize, count: usize) -> Result<Vec<bool>> {
    if (start + count).div_ceil(8) > bytes.len() {
        return Err(Error::invalid(format!(
            "bit range {}..{} exceeds {} bytes",
            start,
            start + count,
            bytes.len()
        )));
    }
    Ok((start..start + count)
        .map(|i| bytes[i / 8] & (0x80 >> (i % 8)) != 0)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Binary 1-D tree: root refined, first child refined again.
    fn sample() -> Tree {
        Tree::from_descriptor(0, vec![true, true, false], 2).unwrap()
    }

    #[test]
    fn test_from_descriptor() {
        let t = sample();
        assert_eq!(t.cells_per_depth, vec![1, 2, 2]);
        assert_eq!(t.num_cells(), 5);
        assert_eq!(t.descriptor_len(), 3);
        assert!(t.validate(2).is_ok());
    }

    #[test]
    fn test_bad_descriptor() {
        assert!(Tree::from_descriptor(0, vec![true, true], 2).is_err());
        assert!(Tree::from_descriptor(0, vec![false], 2).is_err());
    }

    #[test]
    fn test_truncation() {
        let mut t = sample();
        t.mask = Some(vec![false, true, false, false, true]);
        let cut = t.truncated(2);
        assert_eq!(cut.cells_per_depth, vec![1, 2]);
        assert_eq!(cut.num_cells(), 3);
        assert_eq!(cut.descriptor, vec![true]);
        assert_eq!(cut.mask, Some(vec![false, true, false]));
        assert_eq!(t.truncated(10), t);
        assert_eq!(t.truncated(0).num_cells(), 1);
    }

    #[test]
    fn test_depth_prefixes() {
        let counts = [1, 4, 8, 16];
        assert_eq!(cells_to_depth(&counts, 2), 5);
        assert_eq!(descriptor_len_to_depth(&counts, 2), 1);
        assert_eq!(descriptor_len_to_depth(&counts, 4), 13);
        assert_eq!(descriptor_len_to_depth(&counts, 99), 13);
    }

    #[test]
    fn test_bits() {
        let bits = vec![true, false, true, true, false, false, false, false, true];
        let packed = pack_bits(&bits);
        assert_eq!(packed, vec![0b1011_0000, 0b1000_0000]);
        assert_eq!(unpack_bits(&packed, 0, 9).unwrap(), bits);
        assert_eq!(unpack_bits(&packed, 2, 3).unwrap(), vec![true, true, false]);
        assert!(unpack_bits(&packed, 10, 8).is_err());
    }

    #[test]
    fn test_grid_children() {
        let grid = TreeGrid {
            dimensions: [3, 3, 1],
            ..Default::default()
        };
        assert_eq!(grid.dimension(), 2);
        assert_eq!(grid.children_per_cell(), 4);
        assert_eq!(grid.max_trees(), 4);
    }
}
