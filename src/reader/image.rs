//! Image data assembly: hyperslab reads of a sub-extent.

use tracing::debug;

use super::context::{read_attributes, ReadContext};
use crate::container::{Dataset, Hyperslab};
use crate::core::{ArrayOffsetPlan, MetadataResolver, OffsetStrategy, ReadRequest};
use crate::core::schema::ATTR_WHOLE_EXTENT;
use crate::model::{cell_dims, point_dims, split_extent, ArraySet, AttributeKind, ImageData};
use crate::util::{ArrayData, DataArray, Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ImageAssembler {
    pub path: String,
}

impl ImageAssembler {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn read(&self, ctx: &mut ReadContext<'_>, request: &ReadRequest) -> Result<ImageData> {
        let group = ctx.container.group(&self.path)?;
        let meta = MetadataResolver::new(group.clone(), ctx.version);
        let root = meta.read_root_attributes()?;
        let whole = root
            .whole_extent
            .ok_or_else(|| Error::missing_metadata(format!("{}/{}", self.path, ATTR_WHOLE_EXTENT)))?;
        let transient = meta.is_transient();
        let step = if transient { request.step } else { 0 };

        let extent = match request.update_extent {
            Some(e) => intersect(&whole, &e),
            None => split_extent(&whole, request.piece, request.num_pieces),
        };
        debug!(path = %self.path, ?extent, step, "reading image piece");

        let mut image = ImageData {
            extent,
            origin: root.origin,
            spacing: root.spacing,
            direction: root.direction,
            ..Default::default()
        };

        let plan = ArrayOffsetPlan::build(&group, meta.steps_group(), ctx.selection, step)?;
        let slabs = [
            (AttributeKind::Point, point_region(&whole, &extent)),
            (AttributeKind::Cell, cell_region(&whole, &extent)),
        ];
        for (kind, (lo, dims)) in slabs {
            ctx.check_abort()?;
            let Some(data_group) = group.try_group(kind.group_name()) else {
                continue;
            };
            let mut set = ArraySet::new();
            for planned in plan.arrays(kind) {
                let name = planned.name.as_str();
                let result = data_group
                    .dataset(name)
                    .and_then(|ds| read_region(&ds, name, lo, dims, transient.then(|| planned.strategy.start(step, 0))))
                    .map_err(|e| if e.is_isolated() { e } else { Error::read_failure(name, &e) });
                if let Some(array) = ctx.isolate(name, result)? {
                    set.insert(array);
                }
            }
            *image.attributes.get_mut(kind) = set;
        }
        image.attributes.field = read_attributes(ctx, &group, &plan, AttributeKind::Field, |ds, s: OffsetStrategy| {
            vec![s.field_range(ds.rows())]
        })?;
        Ok(image)
    }
}

/// Intersection of two extents; empty when they do not overlap.
fn intersect(a: &[i64; 6], b: &[i64; 6]) -> [i64; 6] {
    let mut out = [0i64; 6];
    for axis in 0..3 {
        out[2 * axis] = a[2 * axis].max(b[2 * axis]);
        out[2 * axis + 1] = a[2 * axis + 1].min(b[2 * axis + 1]);
    }
    out
}

/// Point index offset and size of `extent` within `whole`, x first.
fn point_region(whole: &[i64; 6], extent: &[i64; 6]) -> ([usize; 3], [usize; 3]) {
    let dims = point_dims(extent);
    if dims.contains(&0) {
        return ([0; 3], [0; 3]);
    }
    let lo = [0, 1, 2].map(|a| (extent[2 * a] - whole[2 * a]).max(0) as usize);
    (lo, dims)
}

/// Cell index offset and size of `extent` within `whole`, x first.
///
/// A flat axis keeps one cell layer, so its offset is clamped to it.
fn cell_region(whole: &[i64; 6], extent: &[i64; 6]) -> ([usize; 3], [usize; 3]) {
    let dims = cell_dims(extent);
    let whole_dims = cell_dims(whole);
    if dims.contains(&0) {
        return ([0; 3], [0; 3]);
    }
    let lo = [0, 1, 2].map(|a| {
        let off = (extent[2 * a] - whole[2 * a]).max(0) as usize;
        off.min(whole_dims[a].saturating_sub(dims[a]))
    });
    (lo, dims)
}

/// Read the region `lo..lo+dims` of a `(z, y, x[, c])` dataset, optionally
/// at `step` of a leading step dimension.
fn read_region(ds: &Dataset<'_>, name: &str, lo: [usize; 3], dims: [usize; 3], step: Option<usize>) -> Result<DataArray> {
    let shape = ds.shape();
    let base_rank = 3 + usize::from(step.is_some());
    let (mut start, mut count) = (Vec::with_capacity(5), Vec::with_capacity(5));
    if let Some(s) = step {
        start.push(s);
        count.push(1);
    }
    start.extend([lo[2], lo[1], lo[0]]);
    count.extend([dims[2], dims[1], dims[0]]);

    let components = match shape.rank() {
        r if r == base_rank => 1,
        r if r == base_rank + 1 => {
            let c = shape.sizes()[r - 1];
            start.push(0);
            count.push(c);
            c
        }
        r => {
            return Err(Error::read_failure(
                name,
                &Error::invalid(format!("image array of rank {} where {} or {} expected", r, base_rank, base_rank + 1)),
            ))
        }
    };
    if dims.contains(&0) {
        return Ok(DataArray::new(name, components, ArrayData::empty(ds.element_type())?));
    }
    let data = ds.read_slab(&Hyperslab { start, count })?;
    Ok(DataArray::new(name, components, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regions() {
        let whole = [0, 9, 0, 4, 0, 0];
        let piece = [0, 9, 2, 4, 0, 0];
        assert_eq!(point_region(&whole, &piece), ([0, 2, 0], [10, 3, 1]));
        assert_eq!(cell_region(&whole, &piece), ([0, 2, 0], [9, 2, 1]));

        let empty = [0, -1, 0, -1, 0, -1];
        assert_eq!(point_region(&whole, &empty).1, [0, 0, 0]);
    }

    #[test]
    fn test_intersect() {
        assert_eq!(intersect(&[0, 9, 0, 9, 0, 0], &[5, 20, -3, 2, 0, 0]), [5, 9, 0, 2, 0, 0]);
    }
}
