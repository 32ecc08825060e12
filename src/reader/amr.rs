//! Overlapping AMR assembly.
//!
//! ```text
//! Level0/ Spacing, AMRBox (B,6), PointData/ CellData/ FieldData/
//! Level1/ ...
//! Steps/Level0/ AMRBoxOffsets, NumberOfAMRBoxes, PointDataOffsets/...
//! ```
//!
//! Boxes of each level are dealt round-robin to the requested pieces; boxes
//! of other pieces stay in the hierarchy without data.

use glam::DVec3;
use tracing::debug;

use super::context::{read_attributes, read_ids, required, ReadContext};
use crate::core::schema::*;
use crate::core::{AmrLevelOffsets, ArrayOffsetPlan, MetadataResolver, ReadRequest};
use crate::model::{AmrBlock, AmrBox, AmrLevel, AttributeKind, OverlappingAmr};
use crate::util::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AmrAssembler {
    pub path: String,
}

impl AmrAssembler {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn read(&self, ctx: &mut ReadContext<'_>, request: &ReadRequest) -> Result<OverlappingAmr> {
        let group = ctx.container.group(&self.path)?;
        let meta = MetadataResolver::new(group.clone(), ctx.version);
        let root = meta.read_root_attributes()?;
        let step = if meta.is_transient() { request.step } else { 0 };
        let (piece, num_pieces) = (request.piece, request.num_pieces.max(1));

        let mut amr = OverlappingAmr {
            origin: root.origin,
            ..Default::default()
        };
        let root_plan = ArrayOffsetPlan::build(&group, meta.steps_group(), ctx.selection, step)?;
        amr.field_data = read_attributes(ctx, &group, &root_plan, AttributeKind::Field, |ds, s| {
            vec![s.field_range(ds.rows())]
        })?;

        let max_level = ctx.options.max_amr_level;
        for index in 0.. {
            if max_level > 0 && index >= max_level {
                break;
            }
            let Some(lg) = group.try_group(&level_group(index)) else {
                break;
            };
            ctx.check_abort()?;

            let spacing = lg
                .attr(ATTR_SPACING)
                .and_then(|v| v.to_floats())
                .filter(|v| v.len() >= 3)
                .map(|v| DVec3::new(v[0], v[1], v[2]))
                .ok_or_else(|| Error::missing_metadata(format!("{}/{}", lg.path(), ATTR_SPACING)))?;
            let steps_level = meta.steps_group().and_then(|s| s.try_group(&level_group(index)));
            let offsets = AmrLevelOffsets::read(&lg, steps_level.as_ref(), ctx.version, step)?;

            let box_table = required(&lg, AMR_BOX)?;
            let current: Vec<AmrBox> = read_ids(&box_table, offsets.box_offset, offsets.box_count)?
                .chunks_exact(6)
                .map(AmrBox::from_row)
                .collect();

            let plan = ArrayOffsetPlan::build(&lg, steps_level.as_ref(), ctx.selection, step)?;
            // arrays without their own step offsets start after the data of
            // every earlier box of the level
            let (mut base_points, mut base_cells) = (0usize, 0usize);
            if offsets.box_offset > 0 && (plan.uses_geometry(AttributeKind::Point) || plan.uses_geometry(AttributeKind::Cell)) {
                for row in read_ids(&box_table, 0, offsets.box_offset)?.chunks_exact(6) {
                    let earlier = AmrBox::from_row(row);
                    base_points += earlier.num_points();
                    base_cells += earlier.num_cells();
                }
            }
            let mut level = AmrLevel::new(spacing);
            let (mut points_in_step, mut cells_in_step) = (0usize, 0usize);
            for (i, amr_box) in current.iter().enumerate() {
                let data = if i % num_pieces == piece {
                    let mut block = amr.block_grid(amr_box, spacing);
                    let (p, c) = (points_in_step, cells_in_step);
                    block.attributes.point = read_attributes(ctx, &lg, &plan, AttributeKind::Point, |_, s| {
                        vec![(s.start(base_points + p, p), amr_box.num_points())]
                    })?;
                    block.attributes.cell = read_attributes(ctx, &lg, &plan, AttributeKind::Cell, |_, s| {
                        vec![(s.start(base_cells + c, c), amr_box.num_cells())]
                    })?;
                    Some(block)
                } else {
                    None
                };
                level.blocks.push(AmrBlock {
                    amr_box: *amr_box,
                    data,
                });
                points_in_step += amr_box.num_points();
                cells_in_step += amr_box.num_cells();
            }
            level.field_data = read_attributes(ctx, &lg, &plan, AttributeKind::Field, |ds, s| {
                vec![s.field_range(ds.rows())]
            })?;
            debug!(level = index, boxes = level.blocks.len(), step, "assembled AMR level");
            amr.levels.push(level);
        }
        Ok(amr)
    }
}
