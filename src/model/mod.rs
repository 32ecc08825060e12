//! In-memory dataset types.
//!
//! These are the values the reader produces and the writer consumes:
//!
//! - [`UnstructuredGrid`] / [`PolyData`] - explicit meshes sharing [`Mesh`]
//! - [`ImageData`] - uniform grids
//! - [`OverlappingAmr`] - refinement hierarchies of image blocks
//! - [`TreeGrid`] - grids of refinement trees
//! - [`PartitionedDataSet`], [`PartitionedCollection`], [`MultiBlock`] - composites
//!
//! [`DataObject`] closes over all of them.

mod amr;
mod attributes;
mod cells;
mod composite;
mod image;
mod mesh;
mod tree_grid;

pub use amr::*;
pub use attributes::*;
pub use cells::*;
pub use composite::*;
pub use image::*;
pub use mesh::*;
pub use tree_grid::*;

use std::fmt;

/// Kind of dataset stored under a root group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    ImageData,
    UnstructuredGrid,
    PolyData,
    OverlappingAmr,
    TreeGrid,
    PartitionedCollection,
    MultiBlock,
}

impl DatasetKind {
    /// Value of the `Type` attribute.
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::ImageData => "ImageData",
            Self::UnstructuredGrid => "UnstructuredGrid",
            Self::PolyData => "PolyData",
            Self::OverlappingAmr => "OverlappingAMR",
            Self::TreeGrid => "HyperTreeGrid",
            Self::PartitionedCollection => "PartitionedDataSetCollection",
            Self::MultiBlock => "MultiBlockDataSet",
        }
    }

    /// Parse a `Type` attribute value.
    pub fn from_type_name(name: &str) -> Option<Self> {
        [
            Self::ImageData,
            Self::UnstructuredGrid,
            Self::PolyData,
            Self::OverlappingAmr,
            Self::TreeGrid,
            Self::PartitionedCollection,
            Self::MultiBlock,
        ]
        .into_iter()
        .find(|k| k.type_name() == name)
    }

    /// Check if this kind holds other datasets.
    pub const fn is_composite(self) -> bool {
        matches!(self, Self::PartitionedCollection | Self::MultiBlock)
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Any dataset the reader can produce or the writer can store.
#[derive(Clone, Debug, PartialEq)]
pub enum DataObject {
    Image(ImageData),
    Unstructured(UnstructuredGrid),
    Poly(PolyData),
    Amr(OverlappingAmr),
    TreeGrid(TreeGrid),
    Partitioned(PartitionedDataSet),
    Collection(PartitionedCollection),
    MultiBlock(MultiBlock),
}

impl DataObject {
    /// Stored kind of this object. A partitioned dataset reports the kind of
    /// its first partition (unstructured when empty).
    pub fn kind(&self) -> DatasetKind {
        match self {
            Self::Image(_) => DatasetKind::ImageData,
            Self::Unstructured(_) => DatasetKind::UnstructuredGrid,
            Self::Poly(_) => DatasetKind::PolyData,
            Self::Amr(_) => DatasetKind::OverlappingAmr,
            Self::TreeGrid(_) => DatasetKind::TreeGrid,
            Self::Partitioned(p) => p
                .partitions
                .first()
                .map(DataObject::kind)
                .unwrap_or(DatasetKind::UnstructuredGrid),
            Self::Collection(_) => DatasetKind::PartitionedCollection,
            Self::MultiBlock(_) => DatasetKind::MultiBlock,
        }
    }

    pub fn as_unstructured(&self) -> Option<&UnstructuredGrid> {
        match self {
            Self::Unstructured(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_poly(&self) -> Option<&PolyData> {
        match self {
            Self::Poly(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageData> {
        match self {
            Self::Image(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_amr(&self) -> Option<&OverlappingAmr> {
        match self {
            Self::Amr(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_tree_grid(&self) -> Option<&TreeGrid> {
        match self {
            Self::TreeGrid(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_partitioned(&self) -> Option<&PartitionedDataSet> {
        match self {
            Self::Partitioned(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&PartitionedCollection> {
        match self {
            Self::Collection(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_multiblock(&self) -> Option<&MultiBlock> {
        match self {
            Self::MultiBlock(m) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        for kind in [
            DatasetKind::ImageData,
            DatasetKind::UnstructuredGrid,
            DatasetKind::PolyData,
            DatasetKind::OverlappingAmr,
            DatasetKind::TreeGrid,
            DatasetKind::PartitionedCollection,
            DatasetKind::MultiBlock,
        ] {
            assert_eq!(DatasetKind::from_type_name(kind.type_name()), Some(kind));
        }
        assert_eq!(DatasetKind::from_type_name("Bogus"), None);
        assert!(DatasetKind::MultiBlock.is_composite());
    }

    #[test]
    fn test_partitioned_kind() {
        let p = PartitionedDataSet::new(vec![DataObject::Poly(PolyData::default())]);
        assert_eq!(DataObject::Partitioned(p).kind(), DatasetKind::PolyData);
    }
}
