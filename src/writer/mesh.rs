//! Unstructured grid and surface mesh output.
//!
//! Every part appends its own count rows; `Offsets` receives the
//! `cells + 1` part-local offsets of each part. A step whose parts carry the
//! same mesh fingerprints as the previous step only repeats the previous
//! step rows and writes no geometry.

use std::marker::PhantomData;

use tracing::debug;

use super::attributes::{AttributeStreams, Layout};
use super::sink::{child_path, Sink};
use crate::core::schema::*;
use crate::core::MeshLayout;
use crate::model::{
    Attributes, AttributeKind, CellArray, DataObject, DatasetKind, Mesh, PolyTopology, Topology, UnstructuredTopology,
};
use crate::util::{ArrayData, Error, Result};

/// Topologies that can be written part by part.
pub(crate) trait MeshTopologyWrite: Topology {
    const LAYOUT: MeshLayout;
    const KIND: DatasetKind;

    /// Cells of class `class`; unstructured grids have only class 0.
    fn class_cells(&self, class: usize) -> &CellArray;

    /// Per-cell type codes, for layouts that store them.
    fn cell_types(&self) -> Option<&[u8]>;

    fn from_object(obj: &DataObject) -> Option<&Mesh<Self>>;
}

impl MeshTopologyWrite for UnstructuredTopology {
    const LAYOUT: MeshLayout = MeshLayout::Unstructured;
    const KIND: DatasetKind = DatasetKind::UnstructuredGrid;

    fn class_cells(&self, _class: usize) -> &CellArray {
        &self.cells
    }

    fn cell_types(&self) -> Option<&[u8]> {
        Some(&self.cell_types)
    }

    fn from_object(obj: &DataObject) -> Option<&Mesh<Self>> {
        obj.as_unstructured()
    }
}

impl MeshTopologyWrite for PolyTopology {
    const LAYOUT: MeshLayout = MeshLayout::Poly;
    const KIND: DatasetKind = DatasetKind::PolyData;

    fn class_cells(&self, class: usize) -> &CellArray {
        &self.classes[class]
    }

    fn cell_types(&self) -> Option<&[u8]> {
        None
    }

    fn from_object(obj: &DataObject) -> Option<&Mesh<Self>> {
        obj.as_poly()
    }
}

/// Step table rows of one step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct StepRows {
    part_offset: i64,
    number_of_parts: i64,
    point_offset: i64,
    cell_offsets: Vec<i64>,
    connectivity_offsets: Vec<i64>,
}

/// Writer for one explicit mesh dataset.
#[derive(Debug)]
pub(crate) struct MeshWriter<T> {
    path: String,
    attributes: AttributeStreams,
    previous: Option<(Vec<u64>, StepRows)>,
    cells_written: [usize; 4],
    _topology: PhantomData<T>,
}

impl<T: MeshTopologyWrite> MeshWriter<T> {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            attributes: AttributeStreams::new(path.clone(), child_path(&path, STEPS_GROUP)),
            path,
            previous: None,
            cells_written: [0; 4],
            _topology: PhantomData,
        }
    }

    /// Downcast `parts` to meshes of this topology.
    fn meshes<'a>(&self, parts: &'a [DataObject]) -> Result<Vec<&'a Mesh<T>>> {
        parts
            .iter()
            .map(|p| {
                T::from_object(p).ok_or_else(|| {
                    Error::write(format!("{}: expected {} part, got {}", self.path, T::KIND, p.kind()))
                })
            })
            .collect()
    }

    pub fn write(&mut self, sink: &mut Sink, parts: &[DataObject], step: usize) -> Result<()> {
        let meshes = self.meshes(parts)?;
        for m in &meshes {
            m.topology().validate()?;
        }
        let fingerprints: Vec<u64> = meshes.iter().map(|m| m.mesh_fingerprint()).collect();

        let rows = match &self.previous {
            Some((prev, rows)) if sink.transient && *prev == fingerprints => {
                debug!(path = %self.path, step, "mesh unchanged; reusing previous geometry");
                rows.clone()
            }
            _ => self.write_geometry(sink, &meshes)?,
        };

        if sink.transient {
            let steps = child_path(&self.path, STEPS_GROUP);
            let at = |name: &str| child_path(&steps, name);
            let zeros = vec![0i64; rows.cell_offsets.len()];
            sink.step_row(&at(PART_OFFSETS), step, &[rows.part_offset], &[0])?;
            sink.step_row(&at(NUMBER_OF_PARTS), step, &[rows.number_of_parts], &[0])?;
            sink.step_row(&at(POINT_OFFSETS), step, &[rows.point_offset], &[0])?;
            sink.step_row(&at(CELL_OFFSETS), step, &rows.cell_offsets, &zeros)?;
            sink.step_row(&at(CONNECTIVITY_ID_OFFSETS), step, &rows.connectivity_offsets, &zeros)?;
        }

        let mut merged = Attributes::default();
        for (i, m) in meshes.iter().enumerate() {
            if i == 0 {
                merged = m.attributes.clone();
            } else {
                merged.append(&m.attributes)?;
            }
        }
        let points: usize = meshes.iter().map(|m| m.num_points()).sum();
        let cells: usize = meshes.iter().map(|m| m.num_cells()).sum();
        self.attributes
            .write(sink, AttributeKind::Point, &merged.point, Layout::Tuples(points), step)?;
        self.attributes
            .write(sink, AttributeKind::Cell, &merged.cell, Layout::Tuples(cells), step)?;
        self.attributes
            .write(sink, AttributeKind::Field, &merged.field, Layout::Field, step)?;

        self.previous = Some((fingerprints, rows));
        Ok(())
    }

    /// Append the geometry of every part and return the step rows.
    fn write_geometry(&mut self, sink: &mut Sink, meshes: &[&Mesh<T>]) -> Result<StepRows> {
        let at = |name: &str| child_path(&self.path, name);
        let chunk = sink.chunk_size;
        let n = meshes.len();

        let point_counts: Vec<i64> = meshes.iter().map(|m| m.num_points() as i64).collect();
        let part_offset = sink.put(&at(NUMBER_OF_POINTS), n, &[], &ArrayData::from(point_counts), chunk)?;

        let mut coords = Vec::with_capacity(meshes.iter().map(|m| m.num_points() * 3).sum());
        for m in meshes {
            for p in m.topology().points() {
                coords.extend_from_slice(&[p.x, p.y, p.z]);
            }
        }
        let num_points = coords.len() / 3;
        let point_offset = sink.put(&at(POINTS), num_points, &[3], &ArrayData::from(coords), chunk)?;

        let classes = T::LAYOUT.num_classes();
        let mut rows = StepRows {
            part_offset: part_offset as i64,
            number_of_parts: n as i64,
            point_offset: point_offset as i64,
            cell_offsets: Vec::with_capacity(classes),
            connectivity_offsets: Vec::with_capacity(classes),
        };
        for c in 0..classes {
            let table = |name: &str| at(&T::LAYOUT.class_table(c, name));
            let cells: Vec<&CellArray> = meshes.iter().map(|m| m.topology().class_cells(c)).collect();

            let counts: Vec<i64> = cells.iter().map(|a| a.num_cells() as i64).collect();
            let ids: Vec<i64> = cells.iter().map(|a| a.num_connectivity_ids() as i64).collect();
            sink.put(&table(NUMBER_OF_CELLS), n, &[], &ArrayData::from(counts), chunk)?;
            sink.put(&table(NUMBER_OF_CONNECTIVITY_IDS), n, &[], &ArrayData::from(ids), chunk)?;

            let offsets: Vec<i64> = cells.iter().flat_map(|a| a.offsets().iter().copied()).collect();
            sink.put(&table(OFFSETS), offsets.len(), &[], &ArrayData::from(offsets), chunk)?;
            let connectivity: Vec<i64> = cells.iter().flat_map(|a| a.connectivity().iter().copied()).collect();
            let conn_offset = sink.put(
                &table(CONNECTIVITY),
                connectivity.len(),
                &[],
                &ArrayData::from(connectivity),
                chunk,
            )?;

            rows.cell_offsets.push(self.cells_written[c] as i64);
            rows.connectivity_offsets.push(conn_offset as i64);
            self.cells_written[c] += cells.iter().map(|a| a.num_cells()).sum::<usize>();
        }

        if let Some(first) = meshes.first() {
            if first.topology().cell_types().is_some() {
                let types: Vec<u8> = meshes
                    .iter()
                    .flat_map(|m| m.topology().cell_types().unwrap_or_default().iter().copied())
                    .collect();
                sink.put(&at(TYPES), types.len(), &[], &ArrayData::from(types), chunk)?;
            }
        } else if T::LAYOUT == MeshLayout::Unstructured {
            sink.put(&at(TYPES), 0, &[], &ArrayData::from(Vec::<u8>::new()), chunk)?;
        }

        debug!(
            path = %self.path,
            parts = n,
            points = num_points,
            "wrote mesh geometry"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerWriter;
    use glam::DVec3;

    fn triangle() -> Mesh<UnstructuredTopology> {
        Mesh::new(UnstructuredTopology {
            points: vec![DVec3::ZERO, DVec3::X, DVec3::Y],
            cell_types: vec![5],
            cells: CellArray::from_cells(&[[0i64, 1, 2]]),
        })
    }

    #[test]
    fn test_frozen_step_reuses_rows() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut sink = Sink::new(ContainerWriter::create(file.path(), true).unwrap(), 16);
        sink.transient = true;
        let mut w = MeshWriter::<UnstructuredTopology>::new("/HDFMesh");
        let part = [DataObject::Unstructured(triangle())];
        w.write(&mut sink, &part, 0).unwrap();
        w.write(&mut sink, &part, 1).unwrap();
        assert_eq!(sink.out.rows("/HDFMesh/Points").unwrap(), 3);
        assert_eq!(sink.out.rows("/HDFMesh/Steps/PointOffsets").unwrap(), 2);

        let moved = [DataObject::Unstructured(triangle())];
        w.write(&mut sink, &moved, 2).unwrap();
        assert_eq!(sink.out.rows("/HDFMesh/Points").unwrap(), 6);
        assert_eq!(sink.out.rows("/HDFMesh/Offsets").unwrap(), 4);
        sink.out.close().unwrap();
    }

    #[test]
    fn test_kind_mismatch() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut sink = Sink::new(ContainerWriter::create(file.path(), true).unwrap(), 16);
        let mut w = MeshWriter::<PolyTopology>::new("/HDFMesh");
        let part = [DataObject::Unstructured(triangle())];
        assert!(matches!(w.write(&mut sink, &part, 0), Err(Error::WriteError(_))));
        sink.out.close().unwrap();
    }
}
