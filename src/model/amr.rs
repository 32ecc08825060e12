//! Overlapping adaptive mesh refinement hierarchies.

use glam::DVec3;

use super::attributes::ArraySet;
use super::image::{extent_from_dims, ImageData};

/// Cell-index box of one AMR block, inclusive on both ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AmrBox {
    pub lo: [i64; 3],
    pub hi: [i64; 3],
}

impl AmrBox {
    pub fn new(lo: [i64; 3], hi: [i64; 3]) -> Self {
        Self { lo, hi }
    }

    /// Stored row layout: `lo_x, hi_x, lo_y, hi_y, lo_z, hi_z`.
    pub fn to_row(&self) -> [i64; 6] {
        [self.lo[0], self.hi[0], self.lo[1], self.hi[1], self.lo[2], self.hi[2]]
    }

    pub fn from_row(row: &[i64]) -> Self {
        Self {
            lo: [row[0], row[2], row[4]],
            hi: [row[1], row[3], row[5]],
        }
    }

    /// Points per axis: `hi - lo + 2`, or 1 for a collapsed axis.
    pub fn point_dims(&self) -> [usize; 3] {
        let mut dims = [1usize; 3];
        for (axis, d) in dims.iter_mut().enumerate() {
            if self.hi[axis] >= self.lo[axis] {
                *d = (self.hi[axis] - self.lo[axis] + 2) as usize;
            }
        }
        dims
    }

    /// Cells per axis: `hi - lo + 1`, or 1 for a collapsed axis.
    pub fn cell_dims(&self) -> [usize; 3] {
        let p = self.point_dims();
        [p[0].saturating_sub(1).max(1), p[1].saturating_sub(1).max(1), p[2].saturating_sub(1).max(1)]
    }

    pub fn num_points(&self) -> usize {
        self.point_dims().iter().product()
    }

    pub fn num_cells(&self) -> usize {
        self.cell_dims().iter().product()
    }
}

/// One block of a level. `data` is `None` when the block was not loaded
/// for the current piece.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AmrBlock {
    pub amr_box: AmrBox,
    pub data: Option<ImageData>,
}

/// One refinement level.
#[derive(Clone, Debug, PartialEq)]
pub struct AmrLevel {
    pub spacing: DVec3,
    pub blocks: Vec<AmrBlock>,
    /// Arrays attached to the level rather than to a block.
    pub field_data: ArraySet,
}

impl AmrLevel {
    pub fn new(spacing: DVec3) -> Self {
        Self {
            spacing,
            blocks: Vec::new(),
            field_data: ArraySet::new(),
        }
    }
}

/// Overlapping AMR hierarchy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlappingAmr {
    pub origin: DVec3,
    pub levels: Vec<AmrLevel>,
    pub field_data: ArraySet,
}

impl OverlappingAmr {
    /// Build the sub-grid geometry of a box on a level with `spacing`.
    pub fn block_grid(&self, amr_box: &AmrBox, spacing: DVec3) -> ImageData {
        let lo = DVec3::new(amr_box.lo[0] as f64, amr_box.lo[1] as f64, amr_box.lo[2] as f64);
        ImageData {
            extent: extent_from_dims([0, 0, 0], amr_box.point_dims()),
            origin: self.origin + lo * spacing,
            spacing,
            ..Default::default()
        }
    }

    /// Total number of blocks over all levels.
    pub fn num_blocks(&self) -> usize {
        self.levels.iter().map(|l| l.blocks.len()).sum()
    }

    /// Blocks that carry data on this piece.
    pub fn num_loaded_blocks(&self) -> usize {
        self.levels
            .iter()
            .flat_map(|l| &l.blocks)
            .filter(|b| b.data.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_dims() {
        let b = AmrBox::new([0, 0, 0], [3, 1, -1]);
        assert_eq!(b.point_dims(), [5, 3, 1]);
        assert_eq!(b.cell_dims(), [4, 2, 1]);
        assert_eq!(b.num_cells(), 8);
        assert_eq!(AmrBox::from_row(&b.to_row()), b);
    }

    #[test]
    fn test_block_grid_origin() {
        let amr = OverlappingAmr {
            origin: DVec3::new(1.0, 0.0, 0.0),
            ..Default::default()
        };
        let grid = amr.block_grid(&AmrBox::new([2, 4, 0], [3, 5, -1]), DVec3::splat(0.5));
        assert_eq!(grid.origin, DVec3::new(2.0, 2.0, 0.0));
        assert_eq!(grid.point_dims(), [3, 3, 1]);
    }
}
