//! Root attributes, count tables and step tables.
//!
//! Everything here is small metadata read before any bulk array I/O.

use glam::{DMat3, DVec3};
use tracing::debug;

use super::schema::*;
use crate::container::{Dataset, Group};
use crate::model::DatasetKind;
use crate::util::{Error, Result};

/// Root-level description of one stored dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct RootMeta {
    pub kind: DatasetKind,
    pub version: SchemaVersion,
    pub whole_extent: Option<[i64; 6]>,
    pub origin: DVec3,
    pub spacing: DVec3,
    pub direction: DMat3,
    pub branch_factor: Option<usize>,
    pub dimensions: Option<[usize; 3]>,
    pub interface_intercepts_name: Option<String>,
    pub interface_normals_name: Option<String>,
    /// Parts stored for the first step.
    pub number_of_parts: usize,
    pub number_of_steps: usize,
}

/// Reads metadata of the dataset rooted at one group.
#[derive(Clone)]
pub struct MetadataResolver<'a> {
    group: Group<'a>,
    steps: Option<Group<'a>>,
    version: SchemaVersion,
}

impl<'a> MetadataResolver<'a> {
    /// Resolver for `group`, using `version` from the file root.
    pub fn new(group: Group<'a>, version: SchemaVersion) -> Self {
        let steps = group.try_group(STEPS_GROUP);
        Self { group, steps, version }
    }

    #[inline]
    pub fn group(&self) -> &Group<'a> {
        &self.group
    }

    #[inline]
    pub fn steps_group(&self) -> Option<&Group<'a>> {
        self.steps.as_ref()
    }

    #[inline]
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Stored kind from the `Type` attribute.
    pub fn kind(&self) -> Result<DatasetKind> {
        let name = self
            .group
            .attr(ATTR_TYPE)
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::NotAContainer(format!("{}: missing {} attribute", self.group.path(), ATTR_TYPE)))?;
        DatasetKind::from_type_name(name)
            .ok_or_else(|| Error::NotAContainer(format!("{}: unknown dataset type '{}'", self.group.path(), name)))
    }

    pub fn read_root_attributes(&self) -> Result<RootMeta> {
        let kind = self.kind()?;
        let ints = |name: &str| self.group.attr(name).and_then(|v| v.as_ints());
        let vec3 = |name: &str, default: DVec3| {
            self.group
                .attr(name)
                .and_then(|v| v.to_floats())
                .filter(|v| v.len() >= 3)
                .map(|v| DVec3::new(v[0], v[1], v[2]))
                .unwrap_or(default)
        };
        let text = |name: &str| self.group.attr(name).and_then(|v| v.as_str()).map(str::to_string);

        let whole_extent = match ints(ATTR_WHOLE_EXTENT) {
            Some(e) if e.len() >= 6 => Some([e[0], e[1], e[2], e[3], e[4], e[5]]),
            Some(_) => return Err(Error::invalid(format!("{}: malformed {}", self.group.path(), ATTR_WHOLE_EXTENT))),
            None => None,
        };
        let direction = match self.group.attr(ATTR_DIRECTION).and_then(|v| v.to_floats()) {
            Some(d) if d.len() >= 9 => DMat3::from_cols_array(&[d[0], d[3], d[6], d[1], d[4], d[7], d[2], d[5], d[8]]),
            _ => DMat3::IDENTITY,
        };
        let dimensions = ints(ATTR_DIMENSIONS)
            .filter(|d| d.len() >= 3)
            .map(|d| [d[0].max(0) as usize, d[1].max(0) as usize, d[2].max(0) as usize]);

        let number_of_parts = match kind {
            DatasetKind::UnstructuredGrid | DatasetKind::PolyData => self.number_of_parts(0, NUMBER_OF_POINTS)?,
            DatasetKind::TreeGrid => self.number_of_parts(0, NUMBER_OF_TREES)?,
            _ => 1,
        };

        Ok(RootMeta {
            kind,
            version: self.version,
            whole_extent,
            origin: vec3(ATTR_ORIGIN, DVec3::ZERO),
            spacing: vec3(ATTR_SPACING, DVec3::ONE),
            direction,
            branch_factor: self.group.attr(ATTR_BRANCH_FACTOR).and_then(|v| v.as_int()).map(|b| b.max(0) as usize),
            dimensions,
            interface_intercepts_name: text(ATTR_INTERFACE_INTERCEPTS),
            interface_normals_name: text(ATTR_INTERFACE_NORMALS),
            number_of_parts,
            number_of_steps: self.number_of_steps()?,
        })
    }

    /// Whether this dataset carries a `Steps` group.
    #[inline]
    pub fn is_transient(&self) -> bool {
        self.steps.is_some()
    }

    /// 1 for static data, else the length of the step values.
    pub fn number_of_steps(&self) -> Result<usize> {
        let Some(steps) = &self.steps else {
            return Ok(1);
        };
        if let Some(values) = steps.try_dataset(STEP_VALUES) {
            return Ok(values.rows());
        }
        match steps.attr(ATTR_NSTEPS).and_then(|v| v.as_int()) {
            Some(n) => Ok(n.max(0) as usize),
            None => Ok(1),
        }
    }

    /// Time coordinate of each step; empty for static data.
    pub fn step_values(&self) -> Result<Vec<f64>> {
        match self.steps.as_ref().and_then(|s| s.try_dataset(STEP_VALUES)) {
            Some(ds) => ds.read_f64_all(),
            None => Ok(Vec::new()),
        }
    }

    /// `(min, max)` of the step values, if any.
    pub fn time_range(&self) -> Result<Option<(f64, f64)>> {
        let values = self.step_values()?;
        Ok(time_range(&values))
    }

    /// Nearest step not after `time`.
    pub fn step_for_time(&self, time: f64) -> Result<usize> {
        Ok(floor_step(&self.step_values()?, time))
    }

    /// Dataset `name` under this group or `MissingMetadata`.
    pub fn table(&self, name: &str) -> Result<Dataset<'a>> {
        self.group
            .try_dataset(name)
            .ok_or_else(|| Error::missing_metadata(format!("{}/{}", self.group.path(), name)))
    }

    /// Read `count` entries of a 1-D count table starting at `part_offset`.
    pub fn read_count_table(&self, name: &str, count: usize, part_offset: usize) -> Result<Vec<i64>> {
        let ds = self.table(name)?;
        if part_offset + count > ds.rows() {
            return Err(Error::inconsistent_steps(format!(
                "{}: parts {}..{} requested but table holds {}",
                ds.path(),
                part_offset,
                part_offset + count,
                ds.rows()
            )));
        }
        ds.read_i64_rows(part_offset, count)
    }

    /// Like [`Self::read_count_table`], but `None` when the table is absent.
    pub fn try_count_table(&self, name: &str, count: usize, part_offset: usize) -> Result<Option<Vec<i64>>> {
        match self.read_count_table(name, count, part_offset) {
            Ok(v) => Ok(Some(v)),
            Err(Error::MissingMetadata(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Number of parts stored for `step`.
    ///
    /// Transient files read `Steps/NumberOfParts`; static files use the
    /// length of `count_table`.
    pub fn number_of_parts(&self, step: usize, count_table: &str) -> Result<usize> {
        if let Some(row) = self.try_step_row(NUMBER_OF_PARTS, step)? {
            return Ok(row.first().copied().unwrap_or(0).max(0) as usize);
        }
        match self.group.try_dataset(count_table) {
            Some(ds) => Ok(ds.rows()),
            None => Ok(0),
        }
    }

    /// Row `step` of a table under `Steps`.
    ///
    /// Fails with `MissingMetadata` when absent and with
    /// `InconsistentStepMetadata` when the table is empty or too short.
    pub fn step_row(&self, name: &str, step: usize) -> Result<Vec<i64>> {
        let steps = self
            .steps
            .as_ref()
            .ok_or_else(|| Error::missing_metadata(format!("{}/{}", self.group.path(), STEPS_GROUP)))?;
        let ds = steps
            .try_dataset(name)
            .ok_or_else(|| Error::missing_metadata(format!("{}/{}", steps.path(), name)))?;
        step_table_row(&ds, step)
    }

    /// Row `step` of a `Steps` table, or `None` when the table is absent.
    pub fn try_step_row(&self, name: &str, step: usize) -> Result<Option<Vec<i64>>> {
        match self.steps.as_ref().and_then(|s| s.try_dataset(name)) {
            Some(ds) => step_table_row(&ds, step).map(Some),
            None => Ok(None),
        }
    }
}

/// Read one row of a step-indexed table.
pub fn step_table_row(ds: &Dataset<'_>, step: usize) -> Result<Vec<i64>> {
    if ds.rows() == 0 {
        return Err(Error::inconsistent_steps(format!("{} is empty", ds.path())));
    }
    if step >= ds.rows() {
        return Err(Error::inconsistent_steps(format!(
            "{} holds {} steps, step {} requested",
            ds.path(),
            ds.rows(),
            step
        )));
    }
    let row = ds.read_i64_rows(step, 1)?;
    debug!(table = ds.path(), step, ?row, "step row");
    Ok(row)
}

/// Min and max over step values.
pub fn time_range(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(values.iter().fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))))
}

/// Largest step whose value is `<= time`, clamped to the valid range.
pub fn floor_step(values: &[f64], time: f64) -> usize {
    if values.is_empty() {
        return 0;
    }
    let mut lo = 0;
    let mut hi = values.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if values[mid] <= time {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo.saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_step() {
        let values = [0.0, 0.5, 1.0, 2.0];
        assert_eq!(floor_step(&values, -1.0), 0);
        assert_eq!(floor_step(&values, 0.0), 0);
        assert_eq!(floor_step(&values, 0.7), 1);
        assert_eq!(floor_step(&values, 1.0), 2);
        assert_eq!(floor_step(&values, 99.0), 3);
        assert_eq!(floor_step(&[], 1.0), 0);
    }

    #[test]
    fn test_time_range() {
        assert_eq!(time_range(&[]), None);
        assert_eq!(time_range(&[1.0, 3.0, 2.0]), Some((1.0, 3.0)));
    }
}
