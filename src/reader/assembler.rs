//! Assembler selection by dataset kind.

use super::amr::AmrAssembler;
use super::composite::{CollectionAssembler, MultiBlockAssembler};
use super::context::ReadContext;
use super::image::ImageAssembler;
use super::mesh::MeshAssembler;
use super::tree_grid::TreeGridAssembler;
use crate::container::Group;
use crate::core::{MetadataResolver, ReadRequest, SchemaVersion};
use crate::model::{
    DataObject, DatasetKind, PartitionedDataSet, PolyData, PolyTopology, UnstructuredGrid, UnstructuredTopology,
};
use crate::util::Result;

/// One assembler per dataset kind, chosen when a file is opened.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Assembler {
    Image(ImageAssembler),
    Unstructured(MeshAssembler),
    Poly(MeshAssembler),
    Amr(AmrAssembler),
    TreeGrid(TreeGridAssembler),
    Collection(CollectionAssembler),
    MultiBlock(MultiBlockAssembler),
}

impl Assembler {
    /// Pick the assembler for the dataset rooted at `group`.
    pub fn for_group(group: &Group<'_>, version: SchemaVersion) -> Result<Self> {
        let kind = MetadataResolver::new(group.clone(), version).kind()?;
        let path = group.path().to_string();
        Ok(match kind {
            DatasetKind::ImageData => Self::Image(ImageAssembler::new(path)),
            DatasetKind::UnstructuredGrid => Self::Unstructured(MeshAssembler::new(path)),
            DatasetKind::PolyData => Self::Poly(MeshAssembler::new(path)),
            DatasetKind::OverlappingAmr => Self::Amr(AmrAssembler::new(path)),
            DatasetKind::TreeGrid => Self::TreeGrid(TreeGridAssembler::new(path)),
            DatasetKind::PartitionedCollection => Self::Collection(CollectionAssembler::open(group, version)?),
            DatasetKind::MultiBlock => Self::MultiBlock(MultiBlockAssembler::open(group, version)?),
        })
    }

    pub fn kind(&self) -> DatasetKind {
        match self {
            Self::Image(_) => DatasetKind::ImageData,
            Self::Unstructured(_) => DatasetKind::UnstructuredGrid,
            Self::Poly(_) => DatasetKind::PolyData,
            Self::Amr(_) => DatasetKind::OverlappingAmr,
            Self::TreeGrid(_) => DatasetKind::TreeGrid,
            Self::Collection(_) => DatasetKind::PartitionedCollection,
            Self::MultiBlock(_) => DatasetKind::MultiBlock,
        }
    }

    /// Read one piece.
    pub fn assemble(&self, ctx: &mut ReadContext<'_>, request: &ReadRequest) -> Result<DataObject> {
        Ok(match self {
            Self::Image(a) => DataObject::Image(a.read(ctx, request)?),
            Self::Unstructured(a) => DataObject::Unstructured(a.read::<UnstructuredTopology>(ctx, request)?),
            Self::Poly(a) => DataObject::Poly(a.read::<PolyTopology>(ctx, request)?),
            Self::Amr(a) => DataObject::Amr(a.read(ctx, request)?),
            Self::TreeGrid(a) => DataObject::TreeGrid(a.read(ctx, request)?),
            Self::Collection(a) => DataObject::Collection(a.read(ctx, request)?),
            Self::MultiBlock(a) => DataObject::MultiBlock(a.read(ctx, request)?),
        })
    }

    /// Read one piece keeping file parts apart, one partition each.
    pub fn assemble_partitions(&self, ctx: &mut ReadContext<'_>, request: &ReadRequest) -> Result<PartitionedDataSet> {
        let partitions = match self {
            Self::Unstructured(a) => a
                .read_partitions::<UnstructuredTopology>(ctx, request)?
                .into_iter()
                .map(|m: UnstructuredGrid| DataObject::Unstructured(m))
                .collect(),
            Self::Poly(a) => a
                .read_partitions::<PolyTopology>(ctx, request)?
                .into_iter()
                .map(|m: PolyData| DataObject::Poly(m))
                .collect(),
            other => vec![other.assemble(ctx, request)?],
        };
        Ok(PartitionedDataSet::new(partitions))
    }
}
