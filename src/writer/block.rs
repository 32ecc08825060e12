//! Per-kind writer dispatch.

use tracing::debug;

use super::amr::AmrWriter;
use super::composite::{CollectionWriter, MultiBlockWriter};
use super::image::ImageWriter;
use super::mesh::MeshWriter;
use super::sink::{child_path, Sink};
use super::tree_grid::TreeGridWriter;
use crate::core::schema::{ATTR_TYPE, STEPS_GROUP};
use crate::model::{DataObject, DatasetKind, PolyTopology, UnstructuredTopology};
use crate::util::{Error, Result};

/// The parts of one dataset: the partitions of a partitioned dataset, or the
/// object itself.
pub(crate) fn flatten(obj: &DataObject) -> &[DataObject] {
    match obj {
        DataObject::Partitioned(p) => &p.partitions,
        other => std::slice::from_ref(other),
    }
}

/// Kind shared by all `parts`; unstructured when there are none.
fn parts_kind(path: &str, parts: &[DataObject]) -> Result<DatasetKind> {
    let Some(first) = parts.first() else {
        return Ok(DatasetKind::UnstructuredGrid);
    };
    for p in parts {
        if matches!(p, DataObject::Partitioned(_)) {
            return Err(Error::write(format!("{}: nested partitioned datasets are not supported", path)));
        }
        if p.kind() != first.kind() {
            return Err(Error::write(format!(
                "{}: partitions mix {} and {}",
                path,
                first.kind(),
                p.kind()
            )));
        }
    }
    let kind = first.kind();
    let multi_part = matches!(
        kind,
        DatasetKind::UnstructuredGrid | DatasetKind::PolyData | DatasetKind::TreeGrid
    );
    if !multi_part && parts.len() != 1 {
        return Err(Error::write(format!("{}: {} cannot be split into {} partitions", path, kind, parts.len())));
    }
    Ok(kind)
}

/// Writer of one dataset group, chosen from the first step.
#[derive(Debug)]
pub(crate) enum BlockWriter {
    Image(ImageWriter),
    Unstructured(MeshWriter<UnstructuredTopology>),
    Poly(MeshWriter<PolyTopology>),
    Amr(AmrWriter),
    TreeGrid(TreeGridWriter),
    Collection(CollectionWriter),
    MultiBlock(MultiBlockWriter),
}

impl BlockWriter {
    /// Prepare the group at `path` for `parts` and stamp its `Type`.
    pub fn create(sink: &mut Sink, path: &str, parts: &[DataObject]) -> Result<Self> {
        let kind = parts_kind(path, parts)?;
        sink.ensure_path(path)?;
        sink.attr(path, ATTR_TYPE, kind.type_name())?;
        if sink.transient && !kind.is_composite() {
            sink.register_steps(child_path(path, STEPS_GROUP))?;
        }
        debug!(path, %kind, parts = parts.len(), "creating dataset writer");

        Ok(match (kind, parts.first()) {
            (DatasetKind::ImageData, _) => Self::Image(ImageWriter::new(path)),
            (DatasetKind::UnstructuredGrid, _) => Self::Unstructured(MeshWriter::new(path)),
            (DatasetKind::PolyData, _) => Self::Poly(MeshWriter::new(path)),
            (DatasetKind::OverlappingAmr, _) => Self::Amr(AmrWriter::new(path)),
            (DatasetKind::TreeGrid, _) => Self::TreeGrid(TreeGridWriter::new(path)),
            (DatasetKind::PartitionedCollection, Some(DataObject::Collection(c))) => {
                Self::Collection(CollectionWriter::create(sink, path, c)?)
            }
            (DatasetKind::MultiBlock, Some(DataObject::MultiBlock(mb))) => {
                Self::MultiBlock(MultiBlockWriter::create(sink, path, mb)?)
            }
            (kind, _) => return Err(Error::write(format!("{}: cannot write {}", path, kind))),
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

    /// Write `parts` as step `step`.
    pub fn write(&mut self, sink: &mut Sink, parts: &[DataObject], step: usize) -> Result<()> {
        let kind = self.kind();
        let mismatch = |got: &DataObject| Error::write(format!("expected {}, got {} at step {}", kind, got.kind(), step));
        let single = || match parts {
            [one] => Ok(one),
            _ => Err(Error::write(format!("{} takes one partition, got {}", kind, parts.len()))),
        };
        match self {
            Self::Unstructured(w) => w.write(sink, parts, step),
            Self::Poly(w) => w.write(sink, parts, step),
            Self::TreeGrid(w) => w.write(sink, parts, step),
            Self::Image(w) => {
                let obj = single()?;
                w.write(sink, obj.as_image().ok_or_else(|| mismatch(obj))?, step)
            }
            Self::Amr(w) => {
                let obj = single()?;
                w.write(sink, obj.as_amr().ok_or_else(|| mismatch(obj))?, step)
            }
            Self::Collection(w) => {
                let obj = single()?;
                w.write(sink, obj.as_collection().ok_or_else(|| mismatch(obj))?, step)
            }
            Self::MultiBlock(w) => {
                let obj = single()?;
                w.write(sink, obj.as_multiblock().ok_or_else(|| mismatch(obj))?, step)
            }
        }
    }
}
