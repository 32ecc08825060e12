//! # hdfmesh
//!
//! Reader and writer for scientific mesh datasets stored in a single
//! hierarchical binary container: unstructured grids, surface meshes, image
//! grids, overlapping AMR hierarchies, tree grids and composites of them,
//! split into parts and optionally varying over time steps.
//!
//! ## Modules
//!
//! - [`util`] - element types, typed arrays, shapes, errors
//! - [`container`] - the hierarchical store (groups, chunked datasets, links)
//! - [`core`] - schema names, version gate, metadata, offsets, geometry cache
//! - [`model`] - in-memory dataset types
//! - [`reader`] - [`Reader`] and the per-kind assemblers
//! - [`writer`] - [`Writer`] and the per-kind writers
//!
//! ## Example
//!
//! ```ignore
//! use hdfmesh::prelude::*;
//!
//! let mut reader = Reader::new();
//! reader.open("flow.hdfm")?;
//! let piece = reader.read(&ReadRequest::at_step(3).with_piece(0, 4))?;
//! if let Some(grid) = piece.as_unstructured() {
//!     println!("{} points", grid.num_points());
//! }
//! ```

pub mod container;
pub mod core;
pub mod model;
pub mod reader;
pub mod util;
pub mod writer;

pub use reader::Reader;
pub use util::{Error, Result};
pub use writer::{Writer, WriterOptions};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{ArraySelection, ReadRequest, ReaderOptions, SchemaVersion};
    pub use crate::model::*;
    pub use crate::reader::Reader;
    pub use crate::util::{ArrayData, DataArray, ElementType, Error, Result};
    pub use crate::writer::{Writer, WriterOptions};
    pub use glam::{DMat3, DVec3};
}
