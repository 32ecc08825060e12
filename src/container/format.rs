//! Container file format constants.

/// Magic bytes at the start of a container file.
pub const CONTAINER_MAGIC: &[u8; 8] = b"\x89HMSH\r\n\x1a";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Offset of the frozen flag in the header.
pub const FROZEN_OFFSET: usize = 8;

/// Offset of the container format version in the header.
pub const VERSION_OFFSET: usize = 10;

/// Offset of the index position in the header.
pub const INDEX_POS_OFFSET: usize = 16;

/// Offset of the index length in the header.
pub const INDEX_LEN_OFFSET: usize = 24;

/// Current container format version.
pub const CURRENT_VERSION: u16 = 1;

/// Frozen flag value once the index has been written.
pub const FROZEN_FLAG: u8 = 0xFF;

/// Frozen flag value while the file is still being written.
pub const NOT_FROZEN_FLAG: u8 = 0x00;

/// Index node tags.
pub const NODE_GROUP: u8 = 0;
pub const NODE_DATASET: u8 = 1;
pub const NODE_LINK: u8 = 2;

/// Attribute value tags.
pub const ATTR_INT: u8 = 0;
pub const ATTR_FLOAT: u8 = 1;
pub const ATTR_STR: u8 = 2;

/// Chunk rows used when a caller does not pick one.
pub const DEFAULT_CHUNK_ROWS: usize = 25_000;

/// Maximum number of soft links followed while resolving one path.
pub const MAX_LINK_DEPTH: usize = 16;

/// Build a fresh header for a file that is not yet frozen.
pub fn empty_header() -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..8].copy_from_slice(CONTAINER_MAGIC);
    header[FROZEN_OFFSET] = NOT_FROZEN_FLAG;
    header[VERSION_OFFSET..VERSION_OFFSET + 2].copy_from_slice(&CURRENT_VERSION.to_le_bytes());
    header
}
