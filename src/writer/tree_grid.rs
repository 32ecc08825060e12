//! Tree grid output.
//!
//! Each part appends its trees back to back. Descriptor and mask bits of a
//! part are packed into one bitstream padded to a whole byte, so the
//! `DescriptorsOffsets` and `MaskOffsets` step rows count bytes.

use tracing::{debug, warn};

use super::attributes::{AttributeStreams, Layout};
use super::sink::{child_path, Sink};
use crate::core::schema::*;
use crate::model::{pack_bits, Attributes, AttributeKind, DataObject, TreeGrid};
use crate::util::{ArrayData, Error, Result, Shape};

#[derive(Debug)]
pub(crate) struct TreeGridWriter {
    path: String,
    attributes: AttributeStreams,
    /// Fixed by the first step: whether a `Mask` stream is written.
    with_mask: Option<bool>,
    header_written: bool,
    cells_written: usize,
}

impl TreeGridWriter {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            attributes: AttributeStreams::new(path.clone(), child_path(&path, STEPS_GROUP)),
            path,
            with_mask: None,
            header_written: false,
            cells_written: 0,
        }
    }

    fn grids<'a>(&self, parts: &'a [DataObject]) -> Result<Vec<&'a TreeGrid>> {
        parts
            .iter()
            .map(|p| {
                p.as_tree_grid()
                    .ok_or_else(|| Error::write(format!("{}: expected tree grid part, got {}", self.path, p.kind())))
            })
            .collect()
    }

    /// Attributes and coordinates shared by every part, from the first one.
    fn write_header(&mut self, sink: &mut Sink, grid: &TreeGrid) -> Result<()> {
        sink.attr(&self.path, ATTR_BRANCH_FACTOR, grid.branch_factor as i64)?;
        let dims: Vec<i64> = grid.dimensions.iter().map(|&d| d as i64).collect();
        sink.attr(&self.path, ATTR_DIMENSIONS, dims)?;
        if let Some(name) = &grid.interface_intercepts_name {
            sink.attr(&self.path, ATTR_INTERFACE_INTERCEPTS, name.as_str())?;
        }
        if let Some(name) = &grid.interface_normals_name {
            sink.attr(&self.path, ATTR_INTERFACE_NORMALS, name.as_str())?;
        }
        for (name, coords) in [
            (X_COORDINATES, &grid.x_coords),
            (Y_COORDINATES, &grid.y_coords),
            (Z_COORDINATES, &grid.z_coords),
        ] {
            sink.put_fixed(
                &child_path(&self.path, name),
                Shape::d1(coords.len()),
                &ArrayData::from(coords.clone()),
            )?;
        }
        Ok(())
    }

    pub fn write(&mut self, sink: &mut Sink, parts: &[DataObject], step: usize) -> Result<()> {
        let grids = self.grids(parts)?;
        for g in &grids {
            g.validate()?;
        }
        if !self.header_written {
            if let Some(first) = grids.first() {
                self.write_header(sink, first)?;
                self.header_written = true;
            }
        }
        let with_mask = *self.with_mask.get_or_insert_with(|| grids.iter().any(|g| g.has_mask()));
        if !with_mask && grids.iter().any(|g| g.has_mask()) {
            warn!("{}: masks first appear at step {}; dropped", self.path, step);
        }

        let at = |name: &str| child_path(&self.path, name);
        let chunk = sink.chunk_size;
        let n = grids.len();

        let mut trees = Vec::with_capacity(n);
        let mut depths = Vec::with_capacity(n);
        let mut cells = Vec::with_capacity(n);
        let mut bits = Vec::with_capacity(n);
        let (mut ids, mut depth_per_tree, mut cells_per_depth) = (Vec::new(), Vec::new(), Vec::new());
        let (mut descriptors, mut mask) = (Vec::new(), Vec::new());
        for g in &grids {
            trees.push(g.trees.len() as i64);
            depths.push(g.trees.iter().map(|t| t.depth() as i64).sum::<i64>());
            cells.push(g.num_cells() as i64);

            let mut desc_bits = Vec::new();
            let mut mask_bits = Vec::new();
            for t in &g.trees {
                ids.push(t.index);
                depth_per_tree.push(t.depth() as i64);
                cells_per_depth.extend_from_slice(&t.cells_per_depth);
                desc_bits.extend_from_slice(&t.descriptor);
                match &t.mask {
                    Some(m) => mask_bits.extend_from_slice(m),
                    None => mask_bits.resize(mask_bits.len() + t.num_cells(), false),
                }
            }
            bits.push(desc_bits.len() as i64);
            descriptors.extend(pack_bits(&desc_bits));
            if with_mask {
                mask.extend(pack_bits(&mask_bits));
            }
        }
        let total_cells: usize = cells.iter().sum::<i64>() as usize;

        let put_ids = |sink: &mut Sink, name: &str, values: Vec<i64>| {
            sink.put(&at(name), values.len(), &[], &ArrayData::from(values), chunk)
        };
        let part_offset = put_ids(sink, NUMBER_OF_TREES, trees)?;
        put_ids(sink, NUMBER_OF_DEPTHS, depths)?;
        put_ids(sink, NUMBER_OF_CELLS, cells)?;
        put_ids(sink, DESCRIPTORS_SIZE, bits)?;
        let tree_offset = put_ids(sink, TREE_IDS, ids)?;
        put_ids(sink, DEPTH_PER_TREE, depth_per_tree)?;
        let depth_offset = put_ids(sink, NUMBER_OF_CELLS_PER_TREE_DEPTH, cells_per_depth)?;
        let descriptor_offset = sink.put(&at(DESCRIPTORS), descriptors.len(), &[], &ArrayData::from(descriptors), chunk)?;
        let mask_offset = if with_mask {
            Some(sink.put(&at(MASK), mask.len(), &[], &ArrayData::from(mask), chunk)?)
        } else {
            None
        };

        if sink.transient {
            let steps = at(STEPS_GROUP);
            let row = |name: &str| child_path(&steps, name);
            for (name, value) in [
                (PART_OFFSETS, part_offset),
                (NUMBER_OF_PARTS, n),
                (TREE_IDS_OFFSETS, tree_offset),
                (DEPTH_PER_TREE_OFFSETS, tree_offset),
                (CELLS_PER_TREE_DEPTH_OFFSETS, depth_offset),
                (CELL_OFFSETS, self.cells_written),
                (DESCRIPTORS_OFFSETS, descriptor_offset),
            ] {
                sink.step_row(&row(name), step, &[value as i64], &[0])?;
            }
            if let Some(offset) = mask_offset {
                sink.step_row(&row(MASK_OFFSETS), step, &[offset as i64], &[0])?;
            }
        }
        self.cells_written += total_cells;

        let mut merged = Attributes::default();
        for (i, g) in grids.iter().enumerate() {
            if i == 0 {
                merged = g.attributes.clone();
            } else {
                merged.append(&g.attributes)?;
            }
        }
        self.attributes
            .write(sink, AttributeKind::Cell, &merged.cell, Layout::Tuples(total_cells), step)?;
        self.attributes
            .write(sink, AttributeKind::Field, &merged.field, Layout::Field, step)?;
        debug!(path = %self.path, parts = n, cells = total_cells, step, "wrote tree grid");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerWriter;
    use crate::model::Tree;

    #[test]
    fn test_byte_aligned_parts() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut sink = Sink::new(ContainerWriter::create(file.path(), true).unwrap(), 16);
        sink.ensure_path("/HDFMesh").unwrap();
        let tree = Tree::from_descriptor(0, vec![true], 4).unwrap();
        let grid = TreeGrid {
            dimensions: [2, 2, 1],
            x_coords: vec![0.0, 1.0],
            y_coords: vec![0.0, 1.0],
            trees: vec![tree],
            ..Default::default()
        };
        let parts = [DataObject::TreeGrid(grid.clone()), DataObject::TreeGrid(grid)];
        let mut w = TreeGridWriter::new("/HDFMesh");
        w.write(&mut sink, &parts, 0).unwrap();
        // one bit per part, each part padded to a byte
        assert_eq!(sink.out.rows("/HDFMesh/Descriptors").unwrap(), 2);
        assert!(!sink.out.exists("/HDFMesh/Mask"));
        sink.out.close().unwrap();
    }
}
