//! Uniform rectilinear grids.

use glam::{DMat3, DVec3};

use super::attributes::Attributes;

/// Axis-aligned (optionally rotated) uniform grid over an integer extent.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    /// `[x0, x1, y0, y1, z0, z1]`, inclusive point indices.
    pub extent: [i64; 6],
    pub origin: DVec3,
    pub spacing: DVec3,
    /// Row-major direction matrix.
    pub direction: DMat3,
    pub attributes: Attributes,
}

impl Default for ImageData {
    fn default() -> Self {
        Self {
            extent: [0, -1, 0, -1, 0, -1],
            origin: DVec3::ZERO,
            spacing: DVec3::ONE,
            direction: DMat3::IDENTITY,
            attributes: Attributes::default(),
        }
    }
}

impl ImageData {
    /// Grid with `dims` points per axis starting at index 0.
    pub fn with_dimensions(dims: [usize; 3]) -> Self {
        Self {
            extent: extent_from_dims([0, 0, 0], dims),
            ..Default::default()
        }
    }

    /// Points per axis; zero when the extent is empty on that axis.
    pub fn point_dims(&self) -> [usize; 3] {
        point_dims(&self.extent)
    }

    /// Cells per axis; a flat axis still counts one cell layer.
    pub fn cell_dims(&self) -> [usize; 3] {
        cell_dims(&self.extent)
    }

    pub fn num_points(&self) -> usize {
        self.point_dims().iter().product()
    }

    pub fn num_cells(&self) -> usize {
        self.cell_dims().iter().product()
    }

    /// Check if the extent holds no points.
    pub fn is_empty(&self) -> bool {
        self.num_points() == 0
    }
}

/// Points per axis of an extent.
pub fn point_dims(extent: &[i64; 6]) -> [usize; 3] {
    let mut dims = [0usize; 3];
    for (axis, d) in dims.iter_mut().enumerate() {
        let (lo, hi) = (extent[2 * axis], extent[2 * axis + 1]);
        *d = if hi < lo { 0 } else { (hi - lo + 1) as usize };
    }
    dims
}

/// Cells per axis of an extent: `max(points - 1, 1)`, or all zero when empty.
pub fn cell_dims(extent: &[i64; 6]) -> [usize; 3] {
    let p = point_dims(extent);
    if p.iter().any(|&n| n == 0) {
        return [0, 0, 0];
    }
    [p[0].saturating_sub(1).max(1), p[1].saturating_sub(1).max(1), p[2].saturating_sub(1).max(1)]
}

/// Extent covering `dims` points from the point index `lo`.
pub fn extent_from_dims(lo: [i64; 3], dims: [usize; 3]) -> [i64; 6] {
    [
        lo[0],
        lo[0] + dims[0] as i64 - 1,
        lo[1],
        lo[1] + dims[1] as i64 - 1,
        lo[2],
        lo[2] + dims[2] as i64 - 1,
    ]
}

/// Split `whole` into `num_pieces` slabs along the slowest axis with more
/// than one cell, returning the slab for `piece`.
///
/// Neighbouring slabs share their boundary point layer. Pieces beyond the
/// number of available cell layers get an empty extent.
pub fn split_extent(whole: &[i64; 6], piece: usize, num_pieces: usize) -> [i64; 6] {
    let num_pieces = num_pieces.max(1);
    if num_pieces == 1 {
        return *whole;
    }
    let p = point_dims(whole);
    if p.iter().any(|&n| n == 0) {
        return if piece == 0 { *whole } else { [0, -1, 0, -1, 0, -1] };
    }
    let axis = match (0..3).rev().find(|&a| p[a] > 1) {
        Some(a) => a,
        None => {
            return if piece == 0 { *whole } else { [0, -1, 0, -1, 0, -1] };
        }
    };
    let cells = p[axis] - 1;
    if piece >= cells.min(num_pieces) {
        return [0, -1, 0, -1, 0, -1];
    }
    let pieces = cells.min(num_pieces);
    let lo_cell = piece * cells / pieces;
    let hi_cell = (piece + 1) * cells / pieces;
    let mut out = *whole;
    out[2 * axis] = whole[2 * axis] + lo_cell as i64;
    out[2 * axis + 1] = whole[2 * axis] + hi_cell as i64;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dims() {
        let img = ImageData::with_dimensions([4, 3, 1]);
        assert_eq!(img.point_dims(), [4, 3, 1]);
        assert_eq!(img.cell_dims(), [3, 2, 1]);
        assert_eq!(img.num_points(), 12);
        assert_eq!(img.num_cells(), 6);
        assert!(ImageData::default().is_empty());
        assert_eq!(ImageData::default().num_cells(), 0);
    }

    #[test]
    fn test_split_along_slowest_axis() {
        let whole = [0, 9, 0, 9, 0, 4];
        assert_eq!(split_extent(&whole, 0, 2), [0, 9, 0, 9, 0, 2]);
        assert_eq!(split_extent(&whole, 1, 2), [0, 9, 0, 9, 2, 4]);

        // Flat z: split along y
        let flat = [0, 3, 0, 6, 0, 0];
        assert_eq!(split_extent(&flat, 0, 3), [0, 3, 0, 2, 0, 0]);
        assert_eq!(split_extent(&flat, 2, 3), [0, 3, 4, 6, 0, 0]);
    }

    #[test]
    fn test_split_more_pieces_than_cells() {
        let whole = [0, 2, 0, 0, 0, 0];
        assert_eq!(split_extent(&whole, 0, 4), [0, 1, 0, 0, 0, 0]);
        assert_eq!(split_extent(&whole, 1, 4), [1, 2, 0, 0, 0, 0]);
        assert_eq!(point_dims(&split_extent(&whole, 3, 4)), [0, 0, 0]);
    }
}
