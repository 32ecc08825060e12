//! Offset calculator.
//!
//! Turns count tables and step tables into element ranges of the flat
//! datasets. Every offset is a row index along dimension 0.
//!
//! ```text
//! step base (Steps/*Offsets[step])
//!   + prefix sum of counts over parts [part_offset, part_offset + piece)
//!   = absolute row of the piece
//! ```

use super::metadata::{step_table_row, MetadataResolver};
use super::schema::*;
use crate::container::Group;
use crate::model::CellClass;
use crate::util::{Error, Result};

/// Where the count tables of an explicit mesh live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshLayout {
    /// One cell class; tables at the dataset root.
    Unstructured,
    /// Four cell classes, each in its own group.
    Poly,
}

impl MeshLayout {
    pub const fn num_classes(self) -> usize {
        match self {
            Self::Unstructured => 1,
            Self::Poly => 4,
        }
    }

    /// Path of a per-class table relative to the dataset root.
    pub fn class_table(self, class: usize, name: &str) -> String {
        match self {
            Self::Unstructured => name.to_string(),
            Self::Poly => format!("{}/{}", CellClass::ALL[class].name(), name),
        }
    }
}

/// Starting offsets of one step into the geometry datasets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepGeometryOffsets {
    pub part_offset: usize,
    pub number_of_parts: usize,
    pub point_offset: usize,
    pub cell_offsets: [usize; 4],
    pub connectivity_offsets: [usize; 4],
}

impl StepGeometryOffsets {
    /// Offsets of `step`; all zero for static data.
    ///
    /// A transient dataset whose step tables are absent, empty or shorter
    /// than `step` fails with `InconsistentStepMetadata`.
    pub fn read(meta: &MetadataResolver<'_>, layout: MeshLayout, step: usize) -> Result<Self> {
        if !meta.is_transient() {
            return Ok(Self {
                number_of_parts: meta.number_of_parts(0, NUMBER_OF_POINTS)?,
                ..Default::default()
            });
        }

        let row = |name: &str| -> Result<Vec<i64>> {
            meta.step_row(name, step).map_err(|e| match e {
                Error::MissingMetadata(what) => Error::inconsistent_steps(format!("{} is missing", what)),
                other => other,
            })
        };
        let part_offset = first(&row(PART_OFFSETS)?, PART_OFFSETS)?;
        let point_offset = first(&row(POINT_OFFSETS)?, POINT_OFFSETS)?;
        let cells = row(CELL_OFFSETS)?;
        let conn = row(CONNECTIVITY_ID_OFFSETS)?;
        let number_of_parts = meta.number_of_parts(step, NUMBER_OF_POINTS)?;

        let classes = layout.num_classes();
        if cells.len() < classes || conn.len() < classes {
            return Err(Error::inconsistent_steps(format!(
                "step {}: expected {} cell classes, found {} cell and {} connectivity offsets",
                step,
                classes,
                cells.len(),
                conn.len()
            )));
        }
        let mut out = Self {
            part_offset,
            number_of_parts,
            point_offset,
            ..Default::default()
        };
        for c in 0..classes {
            out.cell_offsets[c] = non_negative(cells[c], CELL_OFFSETS)?;
            out.connectivity_offsets[c] = non_negative(conn[c], CONNECTIVITY_ID_OFFSETS)?;
        }
        Ok(out)
    }
}

/// Offsets and sizes of one part of an explicit mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeshPieceOffsets {
    /// Global part index (row of the count tables).
    pub part: usize,
    pub num_points: usize,
    pub point_offset: usize,
    pub point_offset_in_step: usize,
    pub num_cells: [usize; 4],
    pub cell_offsets: [usize; 4],
    pub cell_offsets_in_step: [usize; 4],
    pub num_connectivity_ids: [usize; 4],
    pub connectivity_offsets: [usize; 4],
}

impl MeshPieceOffsets {
    /// Cells over all classes.
    pub fn total_cells(&self) -> usize {
        self.num_cells.iter().sum()
    }

    /// First cell-data row of this part: class offsets summed in class order.
    pub fn cell_data_offset(&self) -> usize {
        self.cell_offsets.iter().sum()
    }

    pub fn cell_data_offset_in_step(&self) -> usize {
        self.cell_offsets_in_step.iter().sum()
    }

    /// First row of the `Offsets` dataset of `class` for this part.
    ///
    /// Each part stores `cells + 1` entries, so earlier parts add one row each.
    pub fn offsets_row(&self, class: usize) -> usize {
        self.cell_offsets[class] + self.part
    }
}

/// Per-part counts of every part of one step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshCountTables {
    pub layout: Option<MeshLayout>,
    pub points: Vec<i64>,
    pub cells: [Vec<i64>; 4],
    pub connectivity_ids: [Vec<i64>; 4],
}

impl MeshCountTables {
    /// Read the counts of the parts of `geom`.
    pub fn read(meta: &MetadataResolver<'_>, layout: MeshLayout, geom: &StepGeometryOffsets) -> Result<Self> {
        let (n, at) = (geom.number_of_parts, geom.part_offset);
        let mut out = Self {
            layout: Some(layout),
            points: meta.read_count_table(NUMBER_OF_POINTS, n, at)?,
            ..Default::default()
        };
        for c in 0..layout.num_classes() {
            out.cells[c] = meta.read_count_table(&layout.class_table(c, NUMBER_OF_CELLS), n, at)?;
            out.connectivity_ids[c] = meta.read_count_table(&layout.class_table(c, NUMBER_OF_CONNECTIVITY_IDS), n, at)?;
        }
        Ok(out)
    }

    pub fn num_parts(&self) -> usize {
        self.points.len()
    }

    /// Offsets of the `piece`-th part of the step.
    pub fn piece(&self, geom: &StepGeometryOffsets, piece: usize) -> Result<MeshPieceOffsets> {
        if piece >= self.num_parts() {
            return Err(Error::OutOfBounds(format!(
                "part {} requested, step holds {} parts",
                piece,
                self.num_parts()
            )));
        }
        let classes = self.layout.map(MeshLayout::num_classes).unwrap_or(1);
        let (before, own) = prefix_and_own(&self.points, piece, NUMBER_OF_POINTS)?;
        let mut out = MeshPieceOffsets {
            part: geom.part_offset + piece,
            num_points: own,
            point_offset: geom.point_offset + before,
            point_offset_in_step: before,
            ..Default::default()
        };
        for c in 0..classes {
            let (before, own) = prefix_and_own(&self.cells[c], piece, NUMBER_OF_CELLS)?;
            out.num_cells[c] = own;
            out.cell_offsets[c] = geom.cell_offsets[c] + before;
            out.cell_offsets_in_step[c] = before;
            let (before, own) = prefix_and_own(&self.connectivity_ids[c], piece, NUMBER_OF_CONNECTIVITY_IDS)?;
            out.num_connectivity_ids[c] = own;
            out.connectivity_offsets[c] = geom.connectivity_offsets[c] + before;
        }
        Ok(out)
    }
}

/// Sum of `counts[..piece]` and `counts[piece]`.
pub fn prefix_and_own(counts: &[i64], piece: usize, table: &str) -> Result<(usize, usize)> {
    let mut before = 0usize;
    for &c in &counts[..piece.min(counts.len())] {
        before += non_negative(c, table)?;
    }
    let own = counts
        .get(piece)
        .map(|&c| non_negative(c, table))
        .transpose()?
        .unwrap_or(0);
    Ok((before, own))
}

/// Offsets of one refinement level at one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AmrLevelOffsets {
    pub box_offset: usize,
    pub box_count: usize,
}

impl AmrLevelOffsets {
    /// Box range of `level_group` at `step`.
    ///
    /// `steps_level` is `Steps/Level{N}` of a transient file.
    pub fn read(
        level_group: &Group<'_>,
        steps_level: Option<&Group<'_>>,
        version: SchemaVersion,
        step: usize,
    ) -> Result<Self> {
        let total = level_group
            .try_dataset(AMR_BOX)
            .map(|ds| ds.rows())
            .ok_or_else(|| Error::MissingRequiredArray(format!("{}/{}", level_group.path(), AMR_BOX)))?;
        let Some(steps) = steps_level else {
            return Ok(Self { box_offset: 0, box_count: total });
        };

        let offsets = steps
            .try_dataset(AMR_BOX_OFFSETS)
            .ok_or_else(|| Error::inconsistent_steps(format!("{}/{} is missing", steps.path(), AMR_BOX_OFFSETS)))?;
        let counts = version
            .amr_box_count_names()
            .into_iter()
            .find_map(|name| steps.try_dataset(name))
            .ok_or_else(|| Error::inconsistent_steps(format!("{}: no AMR box count table", steps.path())))?;

        let box_offset = first(&step_table_row(&offsets, step)?, AMR_BOX_OFFSETS)?;
        let box_count = first(&step_table_row(&counts, step)?, NUMBER_OF_AMR_BOXES)?;
        if box_offset + box_count > total {
            return Err(Error::inconsistent_steps(format!(
                "{}: step {} boxes {}..{} exceed {} stored boxes",
                level_group.path(),
                step,
                box_offset,
                box_offset + box_count,
                total
            )));
        }
        Ok(Self { box_offset, box_count })
    }
}

/// Starting offsets of one tree-grid step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStepOffsets {
    pub part_offset: usize,
    pub number_of_parts: usize,
    pub tree_offset: usize,
    /// Row of `DepthPerTree`; follows `tree_offset` when the table is absent.
    pub depth_per_tree_offset: usize,
    pub depth_offset: usize,
    pub cell_offset: usize,
    /// Byte offsets into the descriptor and mask bitstreams.
    pub descriptor_offset: usize,
    pub mask_offset: usize,
}

impl TreeStepOffsets {
    pub fn read(meta: &MetadataResolver<'_>, step: usize) -> Result<Self> {
        if !meta.is_transient() {
            return Ok(Self {
                number_of_parts: meta.number_of_parts(0, NUMBER_OF_TREES)?,
                ..Default::default()
            });
        }
        let row = |name: &str| -> Result<usize> {
            let r = meta.step_row(name, step).map_err(|e| match e {
                Error::MissingMetadata(what) => Error::inconsistent_steps(format!("{} is missing", what)),
                other => other,
            })?;
            first(&r, name)
        };
        let optional = |name: &str| -> Result<usize> {
            match meta.try_step_row(name, step)? {
                Some(r) => first(&r, name),
                None => Ok(0),
            }
        };
        let tree_offset = row(TREE_IDS_OFFSETS)?;
        let depth_per_tree_offset = match meta.try_step_row(DEPTH_PER_TREE_OFFSETS, step)? {
            Some(r) => first(&r, DEPTH_PER_TREE_OFFSETS)?,
            None => tree_offset,
        };
        Ok(Self {
            part_offset: row(PART_OFFSETS)?,
            number_of_parts: meta.number_of_parts(step, NUMBER_OF_TREES)?,
            tree_offset,
            depth_per_tree_offset,
            depth_offset: row(CELLS_PER_TREE_DEPTH_OFFSETS)?,
            cell_offset: row(CELL_OFFSETS)?,
            descriptor_offset: row(DESCRIPTORS_OFFSETS)?,
            mask_offset: optional(MASK_OFFSETS)?,
        })
    }
}

/// Offsets and sizes of one tree-grid part.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreePartOffsets {
    pub part: usize,
    pub num_trees: usize,
    pub tree_offset: usize,
    pub depth_per_tree_offset: usize,
    pub num_depths: usize,
    pub depth_offset: usize,
    pub num_cells: usize,
    pub cell_offset: usize,
    pub cell_offset_in_step: usize,
    /// Descriptor length in bits.
    pub descriptor_bits: usize,
    pub descriptor_byte_offset: usize,
    pub mask_byte_offset: usize,
}

/// Per-part counts of every tree-grid part of one step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeCountTables {
    pub trees: Vec<i64>,
    pub depths: Vec<i64>,
    pub cells: Vec<i64>,
    pub descriptor_bits: Vec<i64>,
}

impl TreeCountTables {
    pub fn read(meta: &MetadataResolver<'_>, step: &TreeStepOffsets) -> Result<Self> {
        let (n, at) = (step.number_of_parts, step.part_offset);
        Ok(Self {
            trees: meta.read_count_table(NUMBER_OF_TREES, n, at)?,
            depths: meta.read_count_table(NUMBER_OF_DEPTHS, n, at)?,
            cells: meta.read_count_table(NUMBER_OF_CELLS, n, at)?,
            descriptor_bits: meta.read_count_table(DESCRIPTORS_SIZE, n, at)?,
        })
    }

    pub fn num_parts(&self) -> usize {
        self.trees.len()
    }

    pub fn piece(&self, step: &TreeStepOffsets, piece: usize) -> Result<TreePartOffsets> {
        if piece >= self.num_parts() {
            return Err(Error::OutOfBounds(format!(
                "part {} requested, step holds {} parts",
                piece,
                self.num_parts()
            )));
        }
        let (trees_before, num_trees) = prefix_and_own(&self.trees, piece, NUMBER_OF_TREES)?;
        let (depths_before, num_depths) = prefix_and_own(&self.depths, piece, NUMBER_OF_DEPTHS)?;
        let (cells_before, num_cells) = prefix_and_own(&self.cells, piece, NUMBER_OF_CELLS)?;
        let (_, descriptor_bits) = prefix_and_own(&self.descriptor_bits, piece, DESCRIPTORS_SIZE)?;

        let mut descriptor_bytes = 0usize;
        let mut mask_bytes = 0usize;
        for p in 0..piece {
            descriptor_bytes += non_negative(self.descriptor_bits[p], DESCRIPTORS_SIZE)?.div_ceil(8);
            mask_bytes += non_negative(self.cells[p], NUMBER_OF_CELLS)?.div_ceil(8);
        }

        Ok(TreePartOffsets {
            part: step.part_offset + piece,
            num_trees,
            tree_offset: step.tree_offset + trees_before,
            depth_per_tree_offset: step.depth_per_tree_offset + trees_before,
            num_depths,
            depth_offset: step.depth_offset + depths_before,
            num_cells,
            cell_offset: step.cell_offset + cells_before,
            cell_offset_in_step: cells_before,
            descriptor_bits,
            descriptor_byte_offset: step.descriptor_offset + descriptor_bytes,
            mask_byte_offset: step.mask_offset + mask_bytes,
        })
    }
}

fn first(row: &[i64], table: &str) -> Result<usize> {
    match row.first() {
        Some(&v) => non_negative(v, table),
        None => Err(Error::inconsistent_steps(format!("{}: empty row", table))),
    }
}

fn non_negative(v: i64, table: &str) -> Result<usize> {
    usize::try_from(v).map_err(|_| Error::invalid(format!("{}: negative entry {}", table, v)))
}
