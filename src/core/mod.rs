//! Core layer - schema, metadata and offsets.
//!
//! This module provides:
//! - [`SchemaVersion`] - the version gate and container names
//! - [`MetadataResolver`] - root attributes, count tables, step tables
//! - [`StepGeometryOffsets`] / [`MeshCountTables`] - the offset calculator
//! - [`ArraySelection`] / [`ArrayOffsetPlan`] - which arrays to read and where
//! - [`ReadRequest`] / [`ReaderOptions`] - per-read values and configuration
//! - [`MeshCache`] - geometry reuse across transient steps

mod cache;
mod metadata;
mod offsets;
mod request;
pub mod schema;
mod selection;

pub use cache::{CacheDecision, CacheState, GeometryCache, MeshCache, PieceKey};
pub use metadata::{floor_step, step_table_row, time_range, MetadataResolver, RootMeta};
pub use offsets::{
    prefix_and_own, AmrLevelOffsets, MeshCountTables, MeshLayout, MeshPieceOffsets, StepGeometryOffsets,
    TreeCountTables, TreePartOffsets, TreeStepOffsets,
};
pub use request::{AbortCheck, ReadRequest, ReaderOptions};
pub use schema::SchemaVersion;
pub use selection::{ArrayOffsetPlan, ArraySelection, OffsetStrategy, PlannedArray};
