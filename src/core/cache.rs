//! Geometry cache for transient meshes.
//!
//! One entry per block path and piece. An entry is `Uncached` until the
//! first full read, then `Cached` with geometry shared by `Arc`. A later step
//! reuses the cached geometry when its point and cell counts match and the
//! caller did not force a re-read.

use std::collections::HashMap;

use tracing::debug;

use crate::model::{Mesh, Topology, UnstructuredTopology, PolyTopology};

/// Identifies one cached piece.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PieceKey {
    /// Container path of the dataset group.
    pub block: String,
    pub piece: usize,
    pub num_pieces: usize,
}

impl PieceKey {
    pub fn new(block: impl Into<String>, piece: usize, num_pieces: usize) -> Self {
        Self {
            block: block.into(),
            piece,
            num_pieces,
        }
    }

    /// Key of a single file part read on its own.
    ///
    /// `num_pieces` is 0 so it never collides with a round-robin piece.
    pub fn part(block: impl Into<String>, part: usize) -> Self {
        Self::new(block, part, 0)
    }
}

/// Cache state of one piece.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheState {
    Uncached,
    Cached { num_points: usize, num_cells: usize, fingerprint: u64 },
}

/// What to do with the geometry of the next read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheDecision {
    /// Hand out the cached geometry and refresh attributes only.
    Reuse,
    /// Read geometry from the file and replace the entry.
    Reload,
}

/// Cached geometry per piece for one topology type.
#[derive(Clone, Debug)]
pub struct GeometryCache<T: Topology> {
    entries: HashMap<PieceKey, Mesh<T>>,
    hits: usize,
    misses: usize,
}

impl<T: Topology> Default for GeometryCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<T: Topology> GeometryCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, key: &PieceKey) -> CacheState {
        match self.entries.get(key) {
            None => CacheState::Uncached,
            Some(m) => CacheState::Cached {
                num_points: m.num_points(),
                num_cells: m.num_cells(),
                fingerprint: m.mesh_fingerprint(),
            },
        }
    }

    /// Decide whether a piece with the given counts may reuse the cache.
    pub fn decide(&mut self, key: &PieceKey, num_points: usize, num_cells: usize, force: bool) -> CacheDecision {
        let decision = match self.state(key) {
            CacheState::Cached { num_points: p, num_cells: c, .. } if !force && p == num_points && c == num_cells => {
                self.hits += 1;
                CacheDecision::Reuse
            }
            _ => {
                self.misses += 1;
                CacheDecision::Reload
            }
        };
        debug!(block = %key.block, piece = key.piece, ?decision, "geometry cache");
        decision
    }

    /// Cached geometry of a piece, attributes empty.
    pub fn get(&self, key: &PieceKey) -> Option<&Mesh<T>> {
        self.entries.get(key)
    }

    /// Remember the geometry of a freshly read piece.
    pub fn store(&mut self, key: PieceKey, mesh: &Mesh<T>) {
        let mut geometry = Mesh::<T>::default();
        geometry.share_topology_from(mesh);
        self.entries.insert(key, geometry);
    }

    pub fn remove(&mut self, key: &PieceKey) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }
}

/// Geometry caches of every explicit mesh type.
#[derive(Clone, Debug, Default)]
pub struct MeshCache {
    pub unstructured: GeometryCache<UnstructuredTopology>,
    pub poly: GeometryCache<PolyTopology>,
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.unstructured.clear();
        self.poly.clear();
    }

    pub fn len(&self) -> usize {
        self.unstructured.len() + self.poly.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellArray, UnstructuredGrid};
    use glam::DVec3;

    fn grid(points: usize) -> UnstructuredGrid {
        UnstructuredGrid::new(UnstructuredTopology {
            points: vec![DVec3::ZERO; points],
            cell_types: vec![1],
            cells: CellArray::from_cells(&[vec![0]]),
        })
    }

    #[test]
    fn test_cache_transitions() {
        let mut cache = GeometryCache::<UnstructuredTopology>::new();
        let key = PieceKey::new("/HDFMesh", 0, 1);
        assert_eq!(cache.state(&key), CacheState::Uncached);
        assert_eq!(cache.decide(&key, 3, 1, false), CacheDecision::Reload);

        let mesh = grid(3);
        cache.store(key.clone(), &mesh);
        assert!(matches!(cache.state(&key), CacheState::Cached { fingerprint, .. } if fingerprint == mesh.mesh_fingerprint()));

        assert_eq!(cache.decide(&key, 3, 1, false), CacheDecision::Reuse);
        assert_eq!(cache.decide(&key, 3, 1, true), CacheDecision::Reload);
        assert_eq!(cache.decide(&key, 4, 1, false), CacheDecision::Reload);
        assert_eq!(cache.stats(), (1, 3));
    }

    #[test]
    fn test_cached_geometry_has_no_attributes() {
        let mut cache = GeometryCache::new();
        let mut mesh = grid(1);
        mesh.attributes.point.insert(crate::util::DataArray::scalars("a", vec![1i32]));
        let key = PieceKey::new("/b", 0, 1);
        cache.store(key.clone(), &mesh);
        let cached = cache.get(&key).unwrap();
        assert!(cached.attributes.point.is_empty());
        assert_eq!(cached.mesh_fingerprint(), mesh.mesh_fingerprint());
    }
}
