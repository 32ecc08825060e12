//! Array selection and the per-step array offset plan.

use std::collections::BTreeMap;

use tracing::trace;

use super::metadata::step_table_row;
use super::schema::FIELD_DATA_SIZES;
use crate::container::Group;
use crate::model::AttributeKind;
use crate::util::{Error, Result};

/// Enabled/disabled state of named arrays per attribute kind.
///
/// Arrays never mentioned follow the per-kind default, which starts enabled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArraySelection {
    defaults: [bool; 3],
    states: [BTreeMap<String, bool>; 3],
}

impl Default for ArraySelection {
    fn default() -> Self {
        Self {
            defaults: [true; 3],
            states: Default::default(),
        }
    }
}

fn slot(kind: AttributeKind) -> usize {
    match kind {
        AttributeKind::Point => 0,
        AttributeKind::Cell => 1,
        AttributeKind::Field => 2,
    }
}

impl ArraySelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, kind: AttributeKind, name: &str, enabled: bool) {
        self.states[slot(kind)].insert(name.to_string(), enabled);
    }

    pub fn enable(&mut self, kind: AttributeKind, name: &str) {
        self.set(kind, name, true);
    }

    pub fn disable(&mut self, kind: AttributeKind, name: &str) {
        self.set(kind, name, false);
    }

    /// Enable or disable every array of `kind`, known or not.
    pub fn set_all(&mut self, kind: AttributeKind, enabled: bool) {
        let s = slot(kind);
        self.defaults[s] = enabled;
        for v in self.states[s].values_mut() {
            *v = enabled;
        }
    }

    pub fn is_enabled(&self, kind: AttributeKind, name: &str) -> bool {
        let s = slot(kind);
        self.states[s].get(name).copied().unwrap_or(self.defaults[s])
    }

    /// Record arrays found in a file without changing their state.
    pub fn register<'n>(&mut self, kind: AttributeKind, names: impl IntoIterator<Item = &'n str>) {
        let s = slot(kind);
        let default = self.defaults[s];
        for name in names {
            self.states[s].entry(name.to_string()).or_insert(default);
        }
    }

    /// Known arrays of `kind` with their state, sorted by name.
    pub fn arrays(&self, kind: AttributeKind) -> impl Iterator<Item = (&str, bool)> {
        self.states[slot(kind)].iter().map(|(n, &e)| (n.as_str(), e))
    }
}

/// How the rows of one attribute array are located for a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetStrategy {
    /// Follow the geometry offsets of the piece.
    Geometry,
    /// The array carries its own step offset table.
    Override { base: usize, size: Option<usize> },
}

impl OffsetStrategy {
    /// Start row of a point or cell array.
    ///
    /// `geometry_start` is the absolute geometry-derived row and `in_step`
    /// the same row relative to the step base.
    pub fn start(&self, geometry_start: usize, in_step: usize) -> usize {
        match *self {
            Self::Geometry => geometry_start,
            Self::Override { base, .. } => base + in_step,
        }
    }

    /// Row range `(start, count)` of a field array holding `rows` rows.
    pub fn field_range(&self, rows: usize) -> (usize, usize) {
        match *self {
            Self::Geometry => (0, rows),
            Self::Override { base, size } => {
                let base = base.min(rows);
                (base, size.unwrap_or(rows - base).min(rows - base))
            }
        }
    }
}

/// One enabled array and how to locate it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedArray {
    pub kind: AttributeKind,
    pub name: String,
    pub strategy: OffsetStrategy,
}

/// Offset strategy of every enabled array for one step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArrayOffsetPlan {
    pub step: usize,
    entries: Vec<PlannedArray>,
}

impl ArrayOffsetPlan {
    /// Plan the arrays stored under `data_root` for `step`.
    ///
    /// `steps` is the group holding the per-array offset tables (`Steps` or
    /// `Steps/Level{N}`); `None` for static data.
    pub fn build(
        data_root: &Group<'_>,
        steps: Option<&Group<'_>>,
        selection: &ArraySelection,
        step: usize,
    ) -> Result<Self> {
        let mut entries = Vec::new();
        for kind in AttributeKind::ALL {
            let Some(group) = data_root.try_group(kind.group_name()) else {
                continue;
            };
            let offsets = steps.and_then(|s| s.try_group(kind.offsets_group_name()));
            let sizes = steps.and_then(|s| s.try_group(FIELD_DATA_SIZES));
            for name in group.child_names() {
                if !selection.is_enabled(kind, name) {
                    trace!(%kind, name, "array disabled");
                    continue;
                }
                let strategy = match offsets.as_ref().and_then(|g| g.try_dataset(name)) {
                    None => OffsetStrategy::Geometry,
                    Some(table) => {
                        let base = single(&step_table_row(&table, step)?, table.path())?;
                        let size = match (kind, sizes.as_ref().and_then(|g| g.try_dataset(name))) {
                            (AttributeKind::Field, Some(sz)) => {
                                let row = step_table_row(&sz, step)?;
                                Some(row.get(1).copied().unwrap_or(0).max(0) as usize)
                            }
                            _ if step + 1 < table.rows() => {
                                let next = single(&step_table_row(&table, step + 1)?, table.path())?;
                                Some(next.saturating_sub(base))
                            }
                            _ => None,
                        };
                        OffsetStrategy::Override { base, size }
                    }
                };
                entries.push(PlannedArray {
                    kind,
                    name: name.to_string(),
                    strategy,
                });
            }
        }
        Ok(Self { step, entries })
    }

    pub fn strategy(&self, kind: AttributeKind, name: &str) -> Option<OffsetStrategy> {
        self.entries
            .iter()
            .find(|e| e.kind == kind && e.name == name)
            .map(|e| e.strategy)
    }

    /// Whether any planned array of `kind` follows the geometry offsets.
    pub fn uses_geometry(&self, kind: AttributeKind) -> bool {
        self.arrays(kind).any(|e| e.strategy == OffsetStrategy::Geometry)
    }

    /// Planned arrays of `kind` in storage order.
    pub fn arrays(&self, kind: AttributeKind) -> impl Iterator<Item = &PlannedArray> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn single(row: &[i64], table: &str) -> Result<usize> {
    let v = row
        .first()
        .copied()
        .ok_or_else(|| Error::inconsistent_steps(format!("{}: empty row", table)))?;
    usize::try_from(v).map_err(|_| Error::invalid(format!("{}: negative offset {}", table, v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_defaults() {
        let mut sel = ArraySelection::new();
        assert!(sel.is_enabled(AttributeKind::Point, "Temperature"));
        sel.disable(AttributeKind::Point, "Temperature");
        assert!(!sel.is_enabled(AttributeKind::Point, "Temperature"));
        assert!(sel.is_enabled(AttributeKind::Cell, "Temperature"));

        sel.set_all(AttributeKind::Cell, false);
        assert!(!sel.is_enabled(AttributeKind::Cell, "Anything"));
        sel.enable(AttributeKind::Cell, "Id");
        assert!(sel.is_enabled(AttributeKind::Cell, "Id"));
    }

    #[test]
    fn test_register_keeps_state() {
        let mut sel = ArraySelection::new();
        sel.disable(AttributeKind::Field, "Time");
        sel.register(AttributeKind::Field, ["Time", "Label"]);
        let arrays: Vec<_> = sel.arrays(AttributeKind::Field).collect();
        assert_eq!(arrays, vec![("Label", true), ("Time", false)]);
    }

    #[test]
    fn test_strategy_ranges() {
        assert_eq!(OffsetStrategy::Geometry.start(18, 3), 18);
        let o = OffsetStrategy::Override { base: 40, size: Some(2) };
        assert_eq!(o.start(18, 3), 43);
        assert_eq!(o.field_range(100), (40, 2));
        assert_eq!(OffsetStrategy::Geometry.field_range(5), (0, 5));
        let tail = OffsetStrategy::Override { base: 3, size: None };
        assert_eq!(tail.field_range(5), (3, 2));
    }
}
