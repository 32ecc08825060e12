//! State shared by the assemblers during one piece read.

use glam::DVec3;
use tracing::warn;

use crate::container::{Container, Dataset, Group};
use crate::core::{ArrayOffsetPlan, ArraySelection, MeshCache, OffsetStrategy, ReaderOptions, SchemaVersion};
use crate::model::{ArraySet, AttributeKind};
use crate::util::{DataArray, Error, Result};

/// Borrowed reader state handed to an assembler for one read.
pub(crate) struct ReadContext<'a> {
    pub container: &'a Container,
    pub version: SchemaVersion,
    pub options: &'a ReaderOptions,
    pub selection: &'a ArraySelection,
    pub cache: &'a mut MeshCache,
}

impl ReadContext<'_> {
    /// Fail with `Aborted` if the caller asked to stop.
    pub fn check_abort(&self) -> Result<()> {
        if self.options.aborted() {
            return Err(Error::Aborted);
        }
        Ok(())
    }

    /// Degrade an isolated array failure to `None` unless strict.
    pub fn isolate<T>(&self, array: &str, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_isolated() && !self.options.strict => {
                warn!("omitting array '{}': {}", array, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// A dataset the piece cannot do without.
pub(crate) fn required<'a>(group: &Group<'a>, name: &str) -> Result<Dataset<'a>> {
    group
        .try_dataset(name)
        .ok_or_else(|| Error::MissingRequiredArray(format!("{}/{}", group.path(), name)))
}

/// Read `count` points of an `(N, 3)` float dataset.
pub(crate) fn read_points(ds: &Dataset<'_>, start: usize, count: usize) -> Result<Vec<DVec3>> {
    if !ds.element_type().is_float() {
        return Err(Error::type_mismatch(ds.path(), "float", ds.element_type().name()));
    }
    if ds.shape().row_len() != 3 {
        return Err(Error::invalid(format!("{}: points need 3 components, found {}", ds.path(), ds.shape())));
    }
    let values = ds
        .read_rows(start, count)?
        .to_f64_vec()
        .ok_or_else(|| Error::type_mismatch(ds.path(), "float", ds.element_type().name()))?;
    Ok(values.chunks_exact(3).map(|p| DVec3::new(p[0], p[1], p[2])).collect())
}

/// Read `count` integer ids widened to i64.
pub(crate) fn read_ids(ds: &Dataset<'_>, start: usize, count: usize) -> Result<Vec<i64>> {
    if !ds.element_type().is_integer() {
        return Err(Error::type_mismatch(ds.path(), "integer", ds.element_type().name()));
    }
    ds.read_i64_rows(start, count)
}

/// Read rows of one attribute array as an isolated failure domain.
pub(crate) fn read_array_rows(ds: &Dataset<'_>, name: &str, start: usize, count: usize) -> Result<DataArray> {
    let components = ds.shape().row_len().max(1);
    ds.read_rows(start, count)
        .map(|data| DataArray::new(name, components, data))
        .map_err(|e| if e.is_isolated() { e } else { Error::read_failure(name, &e) })
}

/// Read every planned array of `kind` under `group`.
///
/// `ranges` maps a dataset and its strategy to the row ranges to read; the
/// ranges are concatenated in order.
pub(crate) fn read_attributes(
    ctx: &ReadContext<'_>,
    group: &Group<'_>,
    plan: &ArrayOffsetPlan,
    kind: AttributeKind,
    ranges: impl Fn(&Dataset<'_>, OffsetStrategy) -> Vec<(usize, usize)>,
) -> Result<ArraySet> {
    let mut out = ArraySet::new();
    let Some(data_group) = group.try_group(kind.group_name()) else {
        return Ok(out);
    };
    for planned in plan.arrays(kind) {
        let name = planned.name.as_str();
        let result = data_group
            .dataset(name)
            .map_err(|e| Error::read_failure(name, &e))
            .and_then(|ds| {
                let mut acc: Option<DataArray> = None;
                for (start, count) in ranges(&ds, planned.strategy) {
                    let part = read_array_rows(&ds, name, start, count)?;
                    match &mut acc {
                        Some(a) => a.append(&part)?,
                        None => acc = Some(part),
                    }
                }
                match acc {
                    Some(a) => Ok(a),
                    None => Ok(DataArray::new(name, ds.shape().row_len().max(1), crate::util::ArrayData::empty(ds.element_type())?)),
                }
            });
        if let Some(array) = ctx.isolate(name, result)? {
            out.insert(array);
        }
    }
    Ok(out)
}
