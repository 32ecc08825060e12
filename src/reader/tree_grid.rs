//! Tree grid assembly with optional depth limiting.
//!
//! Trees of a part are stored back to back: descriptor bits and mask bits
//! are concatenated bitwise within a part, each part starting on a byte.
//! A depth limit keeps a breadth-first prefix of each tree, so the cells of
//! a tree that are read always form one contiguous run.

use std::ops::Range;

use tracing::debug;

use super::context::{read_attributes, read_ids, required, ReadContext};
use super::mesh::assigned_parts;
use crate::container::Dataset;
use crate::core::schema::*;
use crate::core::{ArrayOffsetPlan, MetadataResolver, ReadRequest, TreeCountTables, TreePartOffsets, TreeStepOffsets};
use crate::model::{cells_to_depth, descriptor_len_to_depth, unpack_bits, AttributeKind, Tree, TreeGrid};
use crate::util::{ElementType, Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TreeGridAssembler {
    pub path: String,
}

impl TreeGridAssembler {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn read(&self, ctx: &mut ReadContext<'_>, request: &ReadRequest) -> Result<TreeGrid> {
        let group = ctx.container.group(&self.path)?;
        let meta = MetadataResolver::new(group.clone(), ctx.version);
        let root = meta.read_root_attributes()?;
        let step = if meta.is_transient() { request.step } else { 0 };

        let mut grid = TreeGrid {
            branch_factor: root
                .branch_factor
                .ok_or_else(|| Error::missing_metadata(format!("{}/{}", self.path, ATTR_BRANCH_FACTOR)))?,
            dimensions: root
                .dimensions
                .ok_or_else(|| Error::missing_metadata(format!("{}/{}", self.path, ATTR_DIMENSIONS)))?,
            x_coords: required(&group, X_COORDINATES)?.read_f64_all()?,
            y_coords: required(&group, Y_COORDINATES)?.read_f64_all()?,
            z_coords: required(&group, Z_COORDINATES)?.read_f64_all()?,
            interface_intercepts_name: root.interface_intercepts_name.clone(),
            interface_normals_name: root.interface_normals_name.clone(),
            ..Default::default()
        };
        let children = grid.children_per_cell();

        let step_offsets = TreeStepOffsets::read(&meta, step)?;
        let counts = TreeCountTables::read(&meta, &step_offsets)?;
        let parts = assigned_parts(counts.num_parts(), request.piece, request.num_pieces, ctx.options.merge_parts);

        let tree_ids = required(&group, TREE_IDS)?;
        let depth_per_tree = required(&group, DEPTH_PER_TREE)?;
        let cells_per_depth = required(&group, NUMBER_OF_CELLS_PER_TREE_DEPTH)?;
        let descriptors = required(&group, DESCRIPTORS)?;
        let mask = group.try_dataset(MASK);

        let mut read_parts: Vec<(TreePartOffsets, Vec<Range<usize>>)> = Vec::with_capacity(parts.len());
        for p in parts {
            ctx.check_abort()?;
            let off = counts.piece(&step_offsets, p)?;
            let ids = read_ids(&tree_ids, off.tree_offset, off.num_trees)?;
            let depths = read_ids(&depth_per_tree, off.depth_per_tree_offset, off.num_trees)?;
            let cpd_all = read_ids(&cells_per_depth, off.depth_offset, off.num_depths)?;
            let desc_bytes = read_bytes(&descriptors, off.descriptor_byte_offset, off.descriptor_bits.div_ceil(8))?;
            let mask_bytes = mask
                .as_ref()
                .map(|ds| read_bytes(ds, off.mask_byte_offset, off.num_cells.div_ceil(8)))
                .transpose()?;

            grid.trees.reserve(off.num_trees);
            let mut runs = Vec::with_capacity(off.num_trees);
            let (mut depth_pos, mut bit_pos, mut cell_pos) = (0usize, 0usize, 0usize);
            for (t, (&index, &depth)) in ids.iter().zip(&depths).enumerate() {
                ctx.check_abort()?;
                let depth = usize::try_from(depth)
                    .ok()
                    .filter(|&d| d > 0 && depth_pos + d <= cpd_all.len())
                    .ok_or_else(|| Error::invalid(format!("{}: tree {} has invalid depth {}", self.path, t, depth)))?;
                let cpd = &cpd_all[depth_pos..depth_pos + depth];
                let limit = ctx.options.max_tree_depth.map_or(depth, |m| m.clamp(1, depth));

                let keep_cells = cells_to_depth(cpd, limit);
                let tree = Tree {
                    index,
                    cells_per_depth: cpd[..limit].to_vec(),
                    descriptor: unpack_bits(&desc_bytes, bit_pos, descriptor_len_to_depth(cpd, limit))?,
                    mask: mask_bytes
                        .as_ref()
                        .map(|bytes| unpack_bits(bytes, cell_pos, keep_cells))
                        .transpose()?,
                };
                tree.validate(children)?;
                grid.trees.push(tree);

                push_run(&mut runs, cell_pos..cell_pos + keep_cells);
                depth_pos += depth;
                bit_pos += descriptor_len_to_depth(cpd, depth);
                cell_pos += cells_to_depth(cpd, depth);
            }
            if cell_pos != off.num_cells {
                return Err(Error::invalid(format!(
                    "{}: part {} trees hold {} cells, table says {}",
                    self.path, off.part, cell_pos, off.num_cells
                )));
            }
            read_parts.push((off, runs));
        }

        let plan = ArrayOffsetPlan::build(&group, meta.steps_group(), ctx.selection, step)?;
        grid.attributes.cell = read_attributes(ctx, &group, &plan, AttributeKind::Cell, |_, s| {
            read_parts
                .iter()
                .flat_map(|(off, runs)| {
                    let start = s.start(off.cell_offset, off.cell_offset_in_step);
                    runs.iter().map(move |r| (start + r.start, r.len()))
                })
                .collect()
        })?;
        grid.attributes.field = read_attributes(ctx, &group, &plan, AttributeKind::Field, |ds, s| {
            vec![s.field_range(ds.rows())]
        })?;
        grid.shrink_to_fit();
        debug!(path = %self.path, trees = grid.trees.len(), cells = grid.num_cells(), step, "assembled tree grid");
        Ok(grid)
    }
}

/// Append a run, merging it into the previous one when adjacent.
fn push_run(runs: &mut Vec<Range<usize>>, run: Range<usize>) {
    match runs.last_mut() {
        Some(last) if last.end == run.start => last.end = run.end,
        _ if run.is_empty() => {}
        _ => runs.push(run),
    }
}

fn read_bytes(ds: &Dataset<'_>, start: usize, count: usize) -> Result<Vec<u8>> {
    if ds.element_type() != ElementType::Uint8 {
        return Err(Error::type_mismatch(ds.path(), "uint8", ds.element_type().name()));
    }
    let data = ds.read_rows(start, count)?;
    Ok(data.as_slice::<u8>().map(<[u8]>::to_vec).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_run_merges() {
        let mut runs = Vec::new();
        push_run(&mut runs, 0..5);
        push_run(&mut runs, 5..7);
        push_run(&mut runs, 9..9);
        push_run(&mut runs, 10..12);
        assert_eq!(runs, vec![0..7, 10..12]);
    }
}
