//! Attribute kinds and named array sets.

use std::fmt;

use crate::util::DataArray;

/// Domain an attribute array is defined on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeKind {
    Point,
    Cell,
    Field,
}

impl AttributeKind {
    /// All kinds in storage order.
    pub const ALL: [AttributeKind; 3] = [Self::Point, Self::Cell, Self::Field];

    /// Name of the container group holding arrays of this kind.
    pub const fn group_name(self) -> &'static str {
        match self {
            Self::Point => "PointData",
            Self::Cell => "CellData",
            Self::Field => "FieldData",
        }
    }

    /// Name of the per-array step offset group under `Steps/`.
    pub const fn offsets_group_name(self) -> &'static str {
        match self {
            Self::Point => "PointDataOffsets",
            Self::Cell => "CellDataOffsets",
            Self::Field => "FieldDataOffsets",
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Point => "point",
            Self::Cell => "cell",
            Self::Field => "field",
        };
        write!(f, "{}", s)
    }
}

/// Ordered set of named arrays. Names are unique; insertion order is kept.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArraySet {
    arrays: Vec<DataArray>,
}

impl ArraySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an array, replacing any array with the same name.
    pub fn insert(&mut self, array: DataArray) {
        match self.arrays.iter_mut().find(|a| a.name == array.name) {
            Some(slot) => *slot = array,
            None => self.arrays.push(array),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DataArray> {
        self.arrays.iter().find(|a| a.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DataArray> {
        self.arrays.iter_mut().find(|a| a.name == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<DataArray> {
        let idx = self.arrays.iter().position(|a| a.name == name)?;
        Some(self.arrays.remove(idx))
    }

    pub fn names(&self) -> Vec<&str> {
        self.arrays.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataArray> {
        self.arrays.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    pub fn clear(&mut self) {
        self.arrays.clear();
    }
}

impl<'a> IntoIterator for &'a ArraySet {
    type Item = &'a DataArray;
    type IntoIter = std::slice::Iter<'a, DataArray>;

    fn into_iter(self) -> Self::IntoIter {
        self.arrays.iter()
    }
}

impl FromIterator<DataArray> for ArraySet {
    fn from_iter<I: IntoIterator<Item = DataArray>>(iter: I) -> Self {
        let mut set = Self::new();
        for a in iter {
            set.insert(a);
        }
        set
    }
}

/// Point, cell and field arrays of one dataset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attributes {
    pub point: ArraySet,
    pub cell: ArraySet,
    pub field: ArraySet,
}

impl Attributes {
    pub fn get(&self, kind: AttributeKind) -> &ArraySet {
        match kind {
            AttributeKind::Point => &self.point,
            AttributeKind::Cell => &self.cell,
            AttributeKind::Field => &self.field,
        }
    }

    pub fn get_mut(&mut self, kind: AttributeKind) -> &mut ArraySet {
        match kind {
            AttributeKind::Point => &mut self.point,
            AttributeKind::Cell => &mut self.cell,
            AttributeKind::Field => &mut self.field,
        }
    }

    /// Append every array of `other` onto the same-named array here.
    ///
    /// Arrays missing on either side are dropped from the result, so the
    /// merged set only holds arrays defined on every merged piece. Field
    /// data is kept from `self` when it already has any.
    pub fn append(&mut self, other: &Attributes) -> crate::util::Result<()> {
        for kind in [AttributeKind::Point, AttributeKind::Cell] {
            let mine = self.get_mut(kind);
            let theirs = other.get(kind);
            let names: Vec<String> = mine.names().iter().map(|s| s.to_string()).collect();
            for name in names {
                match (mine.get_mut(&name), theirs.get(&name)) {
                    (Some(a), Some(b)) => a.append(b)?,
                    _ => {
                        mine.remove(&name);
                    }
                }
            }
        }
        if self.field.is_empty() {
            self.field = other.field.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replace_order() {
        let mut set = ArraySet::new();
        set.insert(DataArray::scalars("b", vec![1.0f64]));
        set.insert(DataArray::scalars("a", vec![2.0f64]));
        set.insert(DataArray::scalars("b", vec![3.0f64]));
        assert_eq!(set.names(), vec!["b", "a"]);
        assert_eq!(set.get("b").map(|a| a.num_tuples()), Some(1));
        assert!(set.remove("a").is_some());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_append_keeps_common_arrays() {
        let mut a = Attributes::default();
        a.point.insert(DataArray::scalars("t", vec![1i32, 2]));
        a.point.insert(DataArray::scalars("only_a", vec![0i32, 0]));
        let mut b = Attributes::default();
        b.point.insert(DataArray::scalars("t", vec![3i32]));
        a.append(&b).unwrap();
        assert_eq!(a.point.names(), vec!["t"]);
        assert_eq!(a.point.get("t").map(|x| x.num_tuples()), Some(3));
    }

    #[test]
    fn test_group_names() {
        assert_eq!(AttributeKind::Cell.group_name(), "CellData");
        assert_eq!(AttributeKind::Field.offsets_group_name(), "FieldDataOffsets");
    }
}
