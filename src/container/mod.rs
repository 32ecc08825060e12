//! Hierarchical binary container.
//!
//! A container is a tree of named groups, N-dimensional typed datasets,
//! attributes and soft links stored in one file. Datasets are chunked along
//! dimension 0, may be zlib-compressed, and may be extendable.
//!
//! ## File Structure
//!
//! ```text
//! +---------------------+
//! | Magic               |  8 bytes
//! +---------------------+
//! | Frozen flag         |  1 byte (0x00 or 0xFF) + 1 reserved
//! +---------------------+
//! | Format version      |  2 bytes (u16 LE) + 4 reserved
//! +---------------------+
//! | Index position      |  8 bytes (u64 LE)
//! +---------------------+
//! | Index length        |  8 bytes (u64 LE)
//! +---------------------+
//! | ... chunk data ...  |
//! +---------------------+
//! | Index tree          |
//! +---------------------+
//! ```

mod chunk_cache;
pub mod compression;
mod format;
mod hyperslab;
mod node;
mod reader;
mod writer;

pub use chunk_cache::ChunkCache;
pub use format::*;
pub use hyperslab::Hyperslab;
pub use node::{AttrValue, AttrMap, ChunkRef, DatasetNode, GroupNode, Node};
pub use reader::*;
pub use writer::*;
