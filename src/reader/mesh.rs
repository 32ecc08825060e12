//! Unstructured grid and surface mesh assembly.

use tracing::debug;

use super::context::{read_attributes, read_ids, read_points, required, ReadContext};
use crate::container::Group;
use crate::core::schema::*;
use crate::core::{
    ArrayOffsetPlan, CacheDecision, GeometryCache, MeshCache, MeshCountTables, MeshLayout, MeshPieceOffsets,
    MetadataResolver, PieceKey, ReadRequest, StepGeometryOffsets,
};
use crate::model::{
    AttributeKind, CellArray, CellClass, Mesh, PolyTopology, Topology, UnstructuredTopology,
};
use crate::util::{Error, Result};

/// Topologies that can be read part by part.
pub(crate) trait MeshTopologyRead: Topology {
    const LAYOUT: MeshLayout;

    /// Read the geometry and connectivity of one part.
    fn read_part(group: &Group<'_>, offsets: &MeshPieceOffsets) -> Result<Self>;

    fn cache(cache: &mut MeshCache) -> &mut GeometryCache<Self>;
}

impl MeshTopologyRead for UnstructuredTopology {
    const LAYOUT: MeshLayout = MeshLayout::Unstructured;

    fn read_part(group: &Group<'_>, off: &MeshPieceOffsets) -> Result<Self> {
        let points = read_points(&required(group, POINTS)?, off.point_offset, off.num_points)?;
        let n = off.num_cells[0];
        let types = read_ids(&required(group, TYPES)?, off.cell_offsets[0], n)?
            .into_iter()
            .map(|t| u8::try_from(t).map_err(|_| Error::invalid(format!("{}: cell type {} out of range", group.path(), t))))
            .collect::<Result<Vec<u8>>>()?;
        let cells = read_cells(group, off, 0)?;
        Ok(Self {
            points,
            cell_types: types,
            cells,
        })
    }

    fn cache(cache: &mut MeshCache) -> &mut GeometryCache<Self> {
        &mut cache.unstructured
    }
}

impl MeshTopologyRead for PolyTopology {
    const LAYOUT: MeshLayout = MeshLayout::Poly;

    fn read_part(group: &Group<'_>, off: &MeshPieceOffsets) -> Result<Self> {
        let mut topo = PolyTopology {
            points: read_points(&required(group, POINTS)?, off.point_offset, off.num_points)?,
            ..Default::default()
        };
        for class in CellClass::ALL {
            let class_group = group
                .try_group(class.name())
                .ok_or_else(|| Error::MissingRequiredArray(format!("{}/{}", group.path(), class.name())))?;
            topo.classes[class.index()] = read_cells(&class_group, off, class.index())?;
        }
        Ok(topo)
    }

    fn cache(cache: &mut MeshCache) -> &mut GeometryCache<Self> {
        &mut cache.poly
    }
}

/// Read the `Offsets` and `Connectivity` of one class of one part.
fn read_cells(group: &Group<'_>, off: &MeshPieceOffsets, class: usize) -> Result<CellArray> {
    let n = off.num_cells[class];
    let mut offsets = read_ids(&required(group, OFFSETS)?, off.offsets_row(class), n + 1)?;
    let connectivity = read_ids(
        &required(group, CONNECTIVITY)?,
        off.connectivity_offsets[class],
        off.num_connectivity_ids[class],
    )?;
    if let Some(&base) = offsets.first() {
        offsets.iter_mut().for_each(|o| *o -= base);
    }
    CellArray::from_raw(offsets, connectivity)
}

/// File parts gathered into `piece` of `num_pieces`.
///
/// With `merge` the parts are taken round-robin; otherwise only the part
/// with the same index is read.
pub(crate) fn assigned_parts(num_parts: usize, piece: usize, num_pieces: usize, merge: bool) -> Vec<usize> {
    if merge {
        (piece..num_parts).step_by(num_pieces.max(1)).collect()
    } else if piece < num_parts {
        vec![piece]
    } else {
        Vec::new()
    }
}

/// Assembler for explicit meshes stored under one group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MeshAssembler {
    pub path: String,
}

impl MeshAssembler {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    fn resolver<'a>(&self, ctx: &'a ReadContext<'_>) -> Result<MetadataResolver<'a>> {
        Ok(MetadataResolver::new(ctx.container.group(&self.path)?, ctx.version))
    }

    /// Number of parts stored for `step`.
    pub fn number_of_parts<T: MeshTopologyRead>(&self, ctx: &ReadContext<'_>, step: usize) -> Result<usize> {
        let meta = self.resolver(ctx)?;
        Ok(StepGeometryOffsets::read(&meta, T::LAYOUT, step)?.number_of_parts)
    }

    /// The requested piece, file parts merged by append.
    pub fn read<T: MeshTopologyRead>(&self, ctx: &mut ReadContext<'_>, request: &ReadRequest) -> Result<Mesh<T>> {
        let num_parts = self.number_of_parts::<T>(ctx, request.step)?;
        let parts = assigned_parts(num_parts, request.piece, request.num_pieces, ctx.options.merge_parts);
        let key = PieceKey::new(self.path.clone(), request.piece, request.num_pieces);
        self.read_parts(ctx, request, key, &parts)
    }

    /// The parts assigned to the requested piece, one mesh each.
    pub fn read_partitions<T: MeshTopologyRead>(
        &self,
        ctx: &mut ReadContext<'_>,
        request: &ReadRequest,
    ) -> Result<Vec<Mesh<T>>> {
        let num_parts = self.number_of_parts::<T>(ctx, request.step)?;
        let mut out = Vec::new();
        for part in assigned_parts(num_parts, request.piece, request.num_pieces, true) {
            let key = PieceKey::part(self.path.clone(), part);
            out.push(self.read_parts(ctx, request, key, &[part])?);
        }
        Ok(out)
    }

    fn read_parts<T: MeshTopologyRead>(
        &self,
        ctx: &mut ReadContext<'_>,
        request: &ReadRequest,
        key: PieceKey,
        parts: &[usize],
    ) -> Result<Mesh<T>> {
        let container = ctx.container;
        let group = container.group(&self.path)?;
        let meta = MetadataResolver::new(group.clone(), ctx.version);
        let step = if meta.is_transient() { request.step } else { 0 };

        let geom = StepGeometryOffsets::read(&meta, T::LAYOUT, step)?;
        let counts = MeshCountTables::read(&meta, T::LAYOUT, &geom)?;
        let offsets = parts
            .iter()
            .map(|&p| counts.piece(&geom, p))
            .collect::<Result<Vec<_>>>()?;
        let num_points: usize = offsets.iter().map(|o| o.num_points).sum();
        let num_cells: usize = offsets.iter().map(MeshPieceOffsets::total_cells).sum();

        let decision = if ctx.options.use_cache {
            T::cache(ctx.cache).decide(&key, num_points, num_cells, request.force_geometry)
        } else {
            CacheDecision::Reload
        };
        let cached = match decision {
            CacheDecision::Reuse => T::cache(ctx.cache).get(&key).cloned(),
            CacheDecision::Reload => None,
        };

        let mut mesh = match cached {
            Some(mesh) => mesh,
            None => {
                let mut topology = T::default();
                for (i, off) in offsets.iter().enumerate() {
                    ctx.check_abort()?;
                    let part = T::read_part(&group, off)?;
                    if i == 0 {
                        topology = part;
                    } else {
                        topology.append(&part);
                    }
                }
                topology.validate()?;
                let mesh = Mesh::new(topology);
                if ctx.options.use_cache {
                    T::cache(ctx.cache).store(key, &mesh);
                }
                mesh
            }
        };
        debug!(
            path = %self.path,
            step,
            parts = parts.len(),
            num_points,
            num_cells,
            fingerprint = mesh.mesh_fingerprint(),
            "assembled mesh"
        );

        let plan = ArrayOffsetPlan::build(&group, meta.steps_group(), ctx.selection, step)?;
        mesh.attributes.point = read_attributes(ctx, &group, &plan, AttributeKind::Point, |_, s| {
            offsets
                .iter()
                .map(|o| (s.start(o.point_offset, o.point_offset_in_step), o.num_points))
                .collect()
        })?;
        mesh.attributes.cell = read_attributes(ctx, &group, &plan, AttributeKind::Cell, |_, s| {
            offsets
                .iter()
                .map(|o| (s.start(o.cell_data_offset(), o.cell_data_offset_in_step()), o.total_cells()))
                .collect()
        })?;
        mesh.attributes.field = read_attributes(ctx, &group, &plan, AttributeKind::Field, |ds, s| {
            vec![s.field_range(ds.rows())]
        })?;
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assigned_parts() {
        assert_eq!(assigned_parts(5, 0, 2, true), vec![0, 2, 4]);
        assert_eq!(assigned_parts(5, 1, 2, true), vec![1, 3]);
        assert_eq!(assigned_parts(2, 3, 4, true), Vec::<usize>::new());
        assert_eq!(assigned_parts(5, 1, 2, false), vec![1]);
        assert_eq!(assigned_parts(0, 0, 1, true), Vec::<usize>::new());
    }
}
