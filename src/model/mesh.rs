//! Explicit meshes: unstructured grids and surface meshes.
//!
//! Geometry and connectivity live behind an `Arc` so that a cached mesh can
//! be handed out step after step without copying. Every structural change
//! draws a fresh value from the global fingerprint counter.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::DVec3;

use super::attributes::Attributes;
use super::cells::CellArray;
use crate::util::{Error, Result};

static NEXT_FINGERPRINT: AtomicU64 = AtomicU64::new(1);

/// Draw a new mesh topology fingerprint. Values strictly increase.
pub fn next_fingerprint() -> u64 {
    NEXT_FINGERPRINT.fetch_add(1, Ordering::Relaxed)
}

/// Geometry and connectivity of an explicit mesh.
pub trait Topology: Clone + Default + fmt::Debug + PartialEq {
    fn points(&self) -> &[DVec3];
    fn num_cells(&self) -> usize;

    #[inline]
    fn num_points(&self) -> usize {
        self.points().len()
    }

    /// Append another topology, renumbering its point ids.
    fn append(&mut self, other: &Self);

    /// Check internal consistency.
    fn validate(&self) -> Result<()>;
}

/// Unstructured grid topology: one cell type code per cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnstructuredTopology {
    pub points: Vec<DVec3>,
    pub cell_types: Vec<u8>,
    pub cells: CellArray,
}

impl Topology for UnstructuredTopology {
    fn points(&self) -> &[DVec3] {
        &self.points
    }

    fn num_cells(&self) -> usize {
        self.cells.num_cells()
    }

    fn append(&mut self, other: &Self) {
        let shift = self.points.len() as i64;
        self.points.extend_from_slice(&other.points);
        self.cell_types.extend_from_slice(&other.cell_types);
        self.cells.append(&other.cells, shift);
    }

    fn validate(&self) -> Result<()> {
        if self.cell_types.len() != self.cells.num_cells() {
            return Err(Error::invalid(format!(
                "{} cell types for {} cells",
                self.cell_types.len(),
                self.cells.num_cells()
            )));
        }
        validate_ids(&self.cells, self.points.len())
    }
}

/// The four cell classes of a surface mesh, in storage order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellClass {
    Vertices,
    Lines,
    Polygons,
    Strips,
}

impl CellClass {
    pub const ALL: [CellClass; 4] = [Self::Vertices, Self::Lines, Self::Polygons, Self::Strips];

    /// Group name of this class in the container.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vertices => "Vertices",
            Self::Lines => "Lines",
            Self::Polygons => "Polygons",
            Self::Strips => "Strips",
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Surface mesh topology: four independent cell arrays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolyTopology {
    pub points: Vec<DVec3>,
    pub classes: [CellArray; 4],
}

impl PolyTopology {
    pub fn class(&self, c: CellClass) -> &CellArray {
        &self.classes[c.index()]
    }

    pub fn class_mut(&mut self, c: CellClass) -> &mut CellArray {
        &mut self.classes[c.index()]
    }
}

impl Topology for PolyTopology {
    fn points(&self) -> &[DVec3] {
        &self.points
    }

    fn num_cells(&self) -> usize {
        self.classes.iter().map(CellArray::num_cells).sum()
    }

    fn append(&mut self, other: &Self) {
        let shift = self.points.len() as i64;
        self.points.extend_from_slice(&other.points);
        for (mine, theirs) in self.classes.iter_mut().zip(&other.classes) {
            mine.append(theirs, shift);
        }
    }

    fn validate(&self) -> Result<()> {
        for cells in &self.classes {
            validate_ids(cells, self.points.len())?;
        }
        Ok(())
    }
}

fn validate_ids(cells: &CellArray, num_points: usize) -> Result<()> {
    match cells
        .connectivity()
        .iter()
        .find(|&&id| id < 0 || id as usize >= num_points)
    {
        Some(id) => Err(Error::invalid(format!(
            "point id {} out of range for {} points",
            id, num_points
        ))),
        None => Ok(()),
    }
}

/// An explicit mesh with attribute arrays and a topology fingerprint.
#[derive(Clone, Debug)]
pub struct Mesh<T: Topology> {
    topology: Arc<T>,
    mesh_fingerprint: u64,
    pub attributes: Attributes,
}

/// Unstructured grid.
pub type UnstructuredGrid = Mesh<UnstructuredTopology>;

/// Surface mesh with vertices, lines, polygons and strips.
pub type PolyData = Mesh<PolyTopology>;

impl<T: Topology> Default for Mesh<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Topology> Mesh<T> {
    /// Mesh with the given topology and no attributes.
    pub fn new(topology: T) -> Self {
        Self::from_shared(Arc::new(topology))
    }

    /// Mesh around an already shared topology, with a fresh fingerprint.
    pub fn from_shared(topology: Arc<T>) -> Self {
        Self {
            topology,
            mesh_fingerprint: next_fingerprint(),
            attributes: Attributes::default(),
        }
    }

    #[inline]
    pub fn topology(&self) -> &T {
        &self.topology
    }

    /// Shared handle to the topology.
    #[inline]
    pub fn shared_topology(&self) -> &Arc<T> {
        &self.topology
    }

    /// Mutable topology access; counts as a structural change.
    pub fn topology_mut(&mut self) -> &mut T {
        self.mesh_fingerprint = next_fingerprint();
        Arc::make_mut(&mut self.topology)
    }

    /// Replace the topology; counts as a structural change.
    pub fn set_topology(&mut self, topology: Arc<T>) {
        self.topology = topology;
        self.mesh_fingerprint = next_fingerprint();
    }

    /// Adopt the topology and fingerprint of another mesh.
    ///
    /// Used to hand out cached geometry: both meshes then report the same
    /// fingerprint because they share the same structure.
    pub fn share_topology_from(&mut self, other: &Mesh<T>) {
        self.topology = Arc::clone(&other.topology);
        self.mesh_fingerprint = other.mesh_fingerprint;
    }

    /// Last structural change of this mesh.
    #[inline]
    pub fn mesh_fingerprint(&self) -> u64 {
        self.mesh_fingerprint
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.topology.num_points()
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.topology.num_cells()
    }

    /// Merge another piece into this one by appending points, cells and
    /// attribute tuples.
    pub fn append(&mut self, other: &Mesh<T>) -> Result<()> {
        self.topology_mut().append(other.topology());
        self.attributes.append(&other.attributes)
    }
}

impl<T: Topology> PartialEq for Mesh<T> {
    /// Content equality; fingerprints are not compared.
    fn eq(&self, other: &Self) -> bool {
        self.topology == other.topology && self.attributes == other.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> UnstructuredTopology {
        UnstructuredTopology {
            points: vec![DVec3::ZERO, DVec3::X, DVec3::Y],
            cell_types: vec![5],
            cells: CellArray::from_cells(&[vec![0, 1, 2]]),
        }
    }

    #[test]
    fn test_fingerprint_monotonic() {
        let mut mesh = UnstructuredGrid::new(triangle());
        let first = mesh.mesh_fingerprint();
        mesh.attributes.point.insert(crate::util::DataArray::scalars("t", vec![1.0f64, 2.0, 3.0]));
        assert_eq!(mesh.mesh_fingerprint(), first);
        mesh.topology_mut().points[0] = DVec3::ONE;
        assert!(mesh.mesh_fingerprint() > first);
    }

    #[test]
    fn test_share_topology() {
        let a = UnstructuredGrid::new(triangle());
        let mut b = UnstructuredGrid::default();
        b.share_topology_from(&a);
        assert_eq!(a.mesh_fingerprint(), b.mesh_fingerprint());
        assert!(Arc::ptr_eq(a.shared_topology(), b.shared_topology()));
    }

    #[test]
    fn test_append() {
        let mut a = UnstructuredGrid::new(triangle());
        let b = UnstructuredGrid::new(triangle());
        a.append(&b).unwrap();
        assert_eq!(a.num_points(), 6);
        assert_eq!(a.num_cells(), 2);
        assert_eq!(a.topology().cells.cell(1), &[3, 4, 5]);
        assert!(a.topology().validate().is_ok());
    }

    #[test]
    fn test_poly_cells() {
        let mut topo = PolyTopology {
            points: vec![DVec3::ZERO, DVec3::X, DVec3::Y],
            ..Default::default()
        };
        topo.class_mut(CellClass::Vertices).push_cell(&[0]);
        topo.class_mut(CellClass::Polygons).push_cell(&[0, 1, 2]);
        assert_eq!(topo.num_cells(), 2);
        assert!(topo.validate().is_ok());
        topo.class_mut(CellClass::Lines).push_cell(&[0, 7]);
        assert!(topo.validate().is_err());
    }
}
