//! Utility types shared by every layer of the crate.
//!
//! - [`ElementType`] / [`Element`] - dataset element types
//! - [`ArrayData`] / [`DataArray`] - typed flat storage and named tuple arrays
//! - [`Shape`] - N-dimensional dataset extents
//! - [`Error`] / [`Result`] - error handling
//! - Math type re-exports from glam

mod array;
mod element;
mod error;
mod shape;

pub use array::*;
pub use element::*;
pub use error::*;
pub use shape::*;

pub use glam::{DMat3, DVec3};
