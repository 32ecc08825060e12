//! Dataset output shared by the per-kind writers.
//!
//! In static mode every dataset is written once with its final shape. In
//! transient mode datasets are extendable along dimension 0 and every step
//! appends to them; `put` returns the row count before the append, which is
//! the value recorded in the step offset tables.

use std::collections::{BTreeSet, HashSet};

use tracing::{trace, warn};

use crate::container::{AttrValue, ContainerWriter};
use crate::util::{ArrayData, ElementType, Result, Shape};

/// Chunk rows of the small per-step tables.
const STEP_TABLE_CHUNK: usize = 64;

pub(crate) struct Sink {
    pub out: ContainerWriter,
    pub chunk_size: usize,
    pub transient: bool,
    steps_groups: BTreeSet<String>,
}

fn parent_of(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}

impl Sink {
    pub fn new(out: ContainerWriter, chunk_size: usize) -> Self {
        Self {
            out,
            chunk_size: chunk_size.max(1),
            transient: false,
            steps_groups: BTreeSet::new(),
        }
    }

    /// Create `path` and any missing ancestors.
    pub fn ensure_path(&mut self, path: &str) -> Result<()> {
        let mut current = String::new();
        for name in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(name);
            self.out.ensure_group(&current)?;
        }
        Ok(())
    }

    pub fn attr(&mut self, path: &str, name: &str, value: impl Into<AttrValue>) -> Result<()> {
        self.out.set_attr(path, name, value)
    }

    pub fn link(&mut self, path: &str, target: &str) -> Result<()> {
        self.ensure_path(parent_of(path))?;
        self.out.create_link(path, target)
    }

    /// Write `rows` rows of shape `inner` to `path`.
    ///
    /// Static: creates the dataset. Transient: appends, creating an
    /// extendable dataset on first use. Returns the rows stored before.
    pub fn put(&mut self, path: &str, rows: usize, inner: &[usize], data: &ArrayData, chunk_rows: usize) -> Result<usize> {
        self.ensure_path(parent_of(path))?;
        if !self.transient {
            let mut dims = Vec::with_capacity(inner.len() + 1);
            dims.push(rows);
            dims.extend_from_slice(inner);
            self.out.write_dataset(path, Shape::from(dims), data, chunk_rows)?;
            return Ok(0);
        }
        if !self.out.exists(path) {
            self.out
                .create_extendable(path, data.element_type(), &Shape::from_slice(inner), chunk_rows)?;
        }
        let before = self.out.rows(path)?;
        if !data.is_empty() {
            self.out.append(path, data)?;
        }
        trace!(path, before, rows, "appended rows");
        Ok(before)
    }

    /// Write a dataset once, whatever the mode.
    pub fn put_fixed(&mut self, path: &str, shape: Shape, data: &ArrayData) -> Result<()> {
        self.ensure_path(parent_of(path))?;
        let chunk = self.chunk_size;
        self.out.write_dataset(path, shape, data, chunk)
    }

    /// Append the row of `step` to a step table.
    ///
    /// Steps before `step` that have no row yet get `fill`, so a table that
    /// starts late still has one row per step.
    pub fn step_row(&mut self, path: &str, step: usize, row: &[i64], fill: &[i64]) -> Result<()> {
        self.ensure_path(parent_of(path))?;
        if !self.out.exists(path) {
            let inner: &[usize] = if row.len() == 1 { &[] } else { &[row.len()] };
            self.out
                .create_extendable(path, ElementType::Int64, &Shape::from_slice(inner), STEP_TABLE_CHUNK)?;
        }
        let mut rows = self.out.rows(path)?;
        while rows < step {
            self.out.append(path, &ArrayData::from(fill.to_vec()))?;
            rows += 1;
        }
        self.out.append(path, &ArrayData::from(row.to_vec()))
    }

    /// Remember a `Steps` group so `NSteps` is stamped on close.
    pub fn register_steps(&mut self, path: String) -> Result<()> {
        self.ensure_path(&path)?;
        self.steps_groups.insert(path);
        Ok(())
    }

    pub fn steps_groups(&self) -> impl Iterator<Item = &str> {
        self.steps_groups.iter().map(String::as_str)
    }
}

/// Make `name` usable as a container object name.
///
/// Slashes become underscores; empty names and names made only of dots get
/// a leading underscore.
pub(crate) fn sanitize_name(name: &str) -> String {
    let cleaned = name.replace('/', "_");
    if cleaned.chars().all(|c| c == '.') {
        format!("_{}", cleaned)
    } else {
        cleaned
    }
}

/// Hands out unique sanitized names within one group.
#[derive(Debug, Default)]
pub(crate) struct UniqueNames {
    used: HashSet<String>,
}

impl UniqueNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize `name`, or use `fallback` when empty, and make it unique.
    pub fn claim(&mut self, name: &str, fallback: impl FnOnce() -> String) -> String {
        let base = if name.is_empty() { fallback() } else { sanitize_name(name) };
        let mut candidate = base.clone();
        let mut n = 1;
        while !self.used.insert(candidate.clone()) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        if candidate != name && !name.is_empty() {
            warn!("array or block '{}' stored as '{}'", name, candidate);
        }
        candidate
    }
}

/// Join a group path and a child name.
pub(crate) fn child_path(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}
