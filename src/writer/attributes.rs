//! Point, cell and field arrays of one dataset group.
//!
//! The set of arrays of each kind is fixed by the first write. In transient
//! mode every array gets its own offset table under `Steps`, and field
//! arrays also record their `[components, tuples]` per step.

use tracing::{debug, warn};

use super::sink::{child_path, Sink, UniqueNames};
use crate::core::schema::FIELD_DATA_SIZES;
use crate::model::{ArraySet, AttributeKind};
use crate::util::{ArrayData, DataArray, ElementType, Error, Result};

/// How the tuples of one kind are laid out on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Layout {
    /// `n` tuples stored as `(n[, c])`.
    Tuples(usize),
    /// Image grid of `[nz, ny, nx]` tuples stored as `(nz, ny, nx[, c])`.
    Grid([usize; 3]),
    /// Any tuple count.
    Field,
}

impl Layout {
    fn expected_tuples(self) -> Option<usize> {
        match self {
            Self::Tuples(n) => Some(n),
            Self::Grid(d) => Some(d.iter().product()),
            Self::Field => None,
        }
    }
}

#[derive(Clone, Debug)]
struct KnownArray {
    name: String,
    stored: String,
    components: usize,
    element_type: ElementType,
}

fn slot(kind: AttributeKind) -> usize {
    match kind {
        AttributeKind::Point => 0,
        AttributeKind::Cell => 1,
        AttributeKind::Field => 2,
    }
}

/// Writes the attribute arrays stored under one data root.
#[derive(Debug)]
pub(crate) struct AttributeStreams {
    data_root: String,
    steps_root: String,
    known: [Option<Vec<KnownArray>>; 3],
}

impl AttributeStreams {
    /// Arrays go to `data_root/{PointData,CellData,FieldData}` and their
    /// offset tables to `steps_root`.
    pub fn new(data_root: impl Into<String>, steps_root: impl Into<String>) -> Self {
        Self {
            data_root: data_root.into(),
            steps_root: steps_root.into(),
            known: Default::default(),
        }
    }

    /// Write the arrays of `kind` for `step`.
    pub fn write(&mut self, sink: &mut Sink, kind: AttributeKind, set: &ArraySet, layout: Layout, step: usize) -> Result<()> {
        let known = self.known[slot(kind)].get_or_insert_with(|| {
            let mut names = UniqueNames::new();
            set.iter()
                .map(|a| KnownArray {
                    name: a.name.clone(),
                    stored: names.claim(&a.name, || "_".to_string()),
                    components: a.components.max(1),
                    element_type: a.element_type(),
                })
                .collect()
        });
        for array in set.iter() {
            if !known.iter().any(|k| k.name == array.name) {
                warn!("{} array '{}' first appears at step {}; skipped", kind, array.name, step);
            }
        }

        let group = child_path(&self.data_root, kind.group_name());
        let offsets_group = child_path(&self.steps_root, kind.offsets_group_name());
        let sizes_group = child_path(&self.steps_root, FIELD_DATA_SIZES);
        for k in known.iter() {
            let path = child_path(&group, &k.stored);
            let data = match set.get(&k.name) {
                Some(array) => check_array(k, array, layout)?,
                None if kind == AttributeKind::Field || layout.expected_tuples() == Some(0) => {
                    ArrayData::empty(k.element_type)?
                }
                None => {
                    return Err(Error::write(format!(
                        "{} array '{}' is missing at step {}",
                        kind, k.name, step
                    )))
                }
            };
            let tuples = data.len() / k.components;

            let mut inner = Vec::with_capacity(4);
            let (rows, chunk_rows) = match layout {
                Layout::Grid([nz, ny, nx]) if sink.transient => {
                    inner.extend([nz, ny, nx]);
                    (1, 1)
                }
                Layout::Grid([nz, ny, nx]) => {
                    inner.extend([ny, nx]);
                    (nz, (sink.chunk_size / (ny * nx).max(1)).max(1))
                }
                _ => (tuples, sink.chunk_size),
            };
            if k.components > 1 {
                inner.push(k.components);
            }
            let before = sink.put(&path, rows, &inner, &data, chunk_rows)?;

            if sink.transient {
                sink.step_row(&child_path(&offsets_group, &k.stored), step, &[before as i64], &[0])?;
                if kind == AttributeKind::Field {
                    let c = k.components as i64;
                    sink.step_row(&child_path(&sizes_group, &k.stored), step, &[c, tuples as i64], &[c, 0])?;
                }
            }
        }
        if !known.is_empty() {
            debug!(group = %group, arrays = known.len(), step, "wrote {} data", kind);
        }
        Ok(())
    }
}

/// Validate `array` against its first-step description and layout.
fn check_array(known: &KnownArray, array: &DataArray, layout: Layout) -> Result<ArrayData> {
    if array.components.max(1) != known.components {
        return Err(Error::write(format!(
            "array '{}' has {} components, first step had {}",
            array.name, array.components, known.components
        )));
    }
    if array.element_type() != known.element_type {
        return Err(Error::write(format!(
            "array '{}' changed type from {} to {}",
            array.name,
            known.element_type,
            array.element_type()
        )));
    }
    if array.data.len() % known.components != 0 {
        return Err(Error::write(format!(
            "array '{}': {} values are not whole tuples of {}",
            array.name,
            array.data.len(),
            known.components
        )));
    }
    if let Some(expected) = layout.expected_tuples() {
        if array.num_tuples() != expected {
            return Err(Error::write(format!(
                "array '{}' has {} tuples, dataset has {}",
                array.name,
                array.num_tuples(),
                expected
            )));
        }
    }
    Ok(array.data.clone())
}
