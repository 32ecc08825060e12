//! Index tree of a container: groups, datasets, soft links and attributes.
//!
//! The index is written once, at close, after all chunk data. Group children
//! keep their creation order.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::format::*;
use crate::util::{ElementType, Error, Result, Shape};

/// Value of one attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(String),
}

impl AttrValue {
    /// Integer values, widening nothing. None for float or string.
    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Values as f64; integers are converted.
    pub fn to_floats(&self) -> Option<Vec<f64>> {
        match self {
            Self::Int(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Self::Float(v) => Some(v.clone()),
            Self::Str(_) => None,
        }
    }

    /// String value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// First integer value.
    pub fn as_int(&self) -> Option<i64> {
        self.as_ints().and_then(|v| v.first().copied())
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(vec![v])
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        Self::Int(v)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(v: Vec<f64>) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Ordered attribute list of a group or dataset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttrMap {
    entries: Vec<(String, AttrValue)>,
}

impl AttrMap {
    /// Look up an attribute by name.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Set an attribute, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: AttrValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Location of one stored chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRef {
    /// Absolute file position of the stored bytes.
    pub pos: u64,
    /// Stored (possibly compressed) size in bytes.
    pub stored_len: u64,
    /// Decoded size in bytes.
    pub raw_len: u64,
    /// Rows held by this chunk.
    pub rows: u64,
    /// Whether the stored bytes are zlib-compressed.
    pub compressed: bool,
}

/// Dataset entry of the index.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetNode {
    pub element_type: ElementType,
    pub shape: Shape,
    pub chunk_rows: usize,
    pub extendable: bool,
    pub chunks: Vec<ChunkRef>,
    pub attrs: AttrMap,
}

/// Group entry of the index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupNode {
    pub attrs: AttrMap,
    pub children: Vec<(String, Node)>,
}

impl GroupNode {
    /// Child by name.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Mutable child by name.
    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|(n, _)| n == name).map(|(_, c)| c)
    }
}

/// One node of the index tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Group(GroupNode),
    Dataset(DatasetNode),
    /// Soft link holding an absolute target path.
    Link(String),
}

impl Node {
    /// Short kind label for diagnostics and listings.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Group(_) => "group",
            Self::Dataset(_) => "dataset",
            Self::Link(_) => "link",
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Serialize the root group into index bytes.
pub fn encode_index(root: &GroupNode) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_group(&mut out, root)?;
    Ok(out)
}

fn write_str<W: Write>(w: &mut W, s: &str) -> Result<()> {
    w.write_u32::<LittleEndian>(s.len() as u32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn write_attrs<W: Write>(w: &mut W, attrs: &AttrMap) -> Result<()> {
    w.write_u32::<LittleEndian>(attrs.len() as u32)?;
    for (name, value) in attrs.iter() {
        write_str(w, name)?;
        match value {
            AttrValue::Int(v) => {
                w.write_u8(ATTR_INT)?;
                w.write_u32::<LittleEndian>(v.len() as u32)?;
                for &x in v {
                    w.write_i64::<LittleEndian>(x)?;
                }
            }
            AttrValue::Float(v) => {
                w.write_u8(ATTR_FLOAT)?;
                w.write_u32::<LittleEndian>(v.len() as u32)?;
                for &x in v {
                    w.write_f64::<LittleEndian>(x)?;
                }
            }
            AttrValue::Str(s) => {
                w.write_u8(ATTR_STR)?;
                write_str(w, s)?;
            }
        }
    }
    Ok(())
}

fn write_group<W: Write>(w: &mut W, group: &GroupNode) -> Result<()> {
    write_attrs(w, &group.attrs)?;
    w.write_u32::<LittleEndian>(group.children.len() as u32)?;
    for (name, child) in &group.children {
        write_str(w, name)?;
        match child {
            Node::Group(g) => {
                w.write_u8(NODE_GROUP)?;
                write_group(w, g)?;
            }
            Node::Dataset(d) => {
                w.write_u8(NODE_DATASET)?;
                write_dataset(w, d)?;
            }
            Node::Link(target) => {
                w.write_u8(NODE_LINK)?;
                write_str(w, target)?;
            }
        }
    }
    Ok(())
}

fn write_dataset<W: Write>(w: &mut W, ds: &DatasetNode) -> Result<()> {
    write_attrs(w, &ds.attrs)?;
    w.write_u8(ds.element_type as u8)?;
    w.write_u8(ds.shape.rank() as u8)?;
    for &d in ds.shape.sizes() {
        w.write_u64::<LittleEndian>(d as u64)?;
    }
    w.write_u64::<LittleEndian>(ds.chunk_rows as u64)?;
    w.write_u8(ds.extendable as u8)?;
    w.write_u32::<LittleEndian>(ds.chunks.len() as u32)?;
    for c in &ds.chunks {
        w.write_u64::<LittleEndian>(c.pos)?;
        w.write_u64::<LittleEndian>(c.stored_len)?;
        w.write_u64::<LittleEndian>(c.raw_len)?;
        w.write_u64::<LittleEndian>(c.rows)?;
        w.write_u8(c.compressed as u8)?;
    }
    Ok(())
}

// ============================================================================
// Decoding
// ============================================================================

/// Parse index bytes back into the root group.
pub fn decode_index(bytes: &[u8]) -> Result<GroupNode> {
    let mut cur = Cursor::new(bytes);
    let root = read_group(&mut cur, 0).map_err(truncated)?;
    if cur.position() as usize != bytes.len() {
        return Err(Error::invalid("trailing bytes after container index"));
    }
    Ok(root)
}

fn truncated(e: Error) -> Error {
    match e {
        Error::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            Error::invalid("container index is truncated")
        }
        other => other,
    }
}

fn read_str(r: &mut Cursor<&[u8]>) -> Result<String> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    let remaining = r.get_ref().len() - r.position() as usize;
    if len > remaining {
        return Err(Error::invalid("string length exceeds index size"));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

fn read_count(r: &mut Cursor<&[u8]>, min_item_size: usize) -> Result<usize> {
    let n = r.read_u32::<LittleEndian>()? as usize;
    let remaining = r.get_ref().len() - r.position() as usize;
    if n.saturating_mul(min_item_size) > remaining {
        return Err(Error::invalid("element count exceeds index size"));
    }
    Ok(n)
}

fn read_attrs(r: &mut Cursor<&[u8]>) -> Result<AttrMap> {
    let n = read_count(r, 5)?;
    let mut attrs = AttrMap::default();
    for _ in 0..n {
        let name = read_str(r)?;
        let value = match r.read_u8()? {
            ATTR_INT => {
                let len = read_count(r, 8)?;
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(r.read_i64::<LittleEndian>()?);
                }
                AttrValue::Int(v)
            }
            ATTR_FLOAT => {
                let len = read_count(r, 8)?;
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(r.read_f64::<LittleEndian>()?);
                }
                AttrValue::Float(v)
            }
            ATTR_STR => AttrValue::Str(read_str(r)?),
            tag => return Err(Error::invalid(format!("unknown attribute tag {}", tag))),
        };
        attrs.set(name, value);
    }
    Ok(attrs)
}

fn read_group(r: &mut Cursor<&[u8]>, depth: usize) -> Result<GroupNode> {
    if depth > 256 {
        return Err(Error::invalid("container index nested too deeply"));
    }
    let attrs = read_attrs(r)?;
    let n = read_count(r, 5)?;
    let mut children = Vec::with_capacity(n);
    for _ in 0..n {
        let name = read_str(r)?;
        let node = match r.read_u8()? {
            NODE_GROUP => Node::Group(read_group(r, depth + 1)?),
            NODE_DATASET => Node::Dataset(read_dataset(r)?),
            NODE_LINK => Node::Link(read_str(r)?),
            tag => return Err(Error::invalid(format!("unknown node tag {}", tag))),
        };
        children.push((name, node));
    }
    Ok(GroupNode { attrs, children })
}

fn read_dataset(r: &mut Cursor<&[u8]>) -> Result<DatasetNode> {
    let attrs = read_attrs(r)?;
    let element_type = ElementType::from_u8(r.read_u8()?);
    if element_type == ElementType::Unknown {
        return Err(Error::invalid("dataset has unknown element type"));
    }
    let rank = r.read_u8()? as usize;
    let mut dims = Vec::with_capacity(rank);
    for _ in 0..rank {
        dims.push(r.read_u64::<LittleEndian>()? as usize);
    }
    let chunk_rows = r.read_u64::<LittleEndian>()? as usize;
    let extendable = r.read_u8()? != 0;
    let n = read_count(r, 33)?;
    let mut chunks = Vec::with_capacity(n);
    for _ in 0..n {
        chunks.push(ChunkRef {
            pos: r.read_u64::<LittleEndian>()?,
            stored_len: r.read_u64::<LittleEndian>()?,
            raw_len: r.read_u64::<LittleEndian>()?,
            rows: r.read_u64::<LittleEndian>()?,
            compressed: r.read_u8()? != 0,
        });
    }
    Ok(DatasetNode {
        element_type,
        shape: Shape::from(dims),
        chunk_rows,
        extendable,
        chunks,
        attrs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> GroupNode {
        let mut root = GroupNode::default();
        root.attrs.set("Version", AttrValue::Int(vec![2, 4]));
        root.attrs.set("Type", AttrValue::from("UnstructuredGrid"));

        let mut attrs = AttrMap::default();
        attrs.set("Spacing", AttrValue::Float(vec![0.5, 0.5, 1.0]));
        let ds = DatasetNode {
            element_type: ElementType::Float64,
            shape: Shape::d2(10, 3),
            chunk_rows: 4,
            extendable: true,
            chunks: vec![ChunkRef { pos: 32, stored_len: 96, raw_len: 96, rows: 4, compressed: false }],
            attrs,
        };
        let mut child = GroupNode::default();
        child.children.push(("Points".into(), Node::Dataset(ds)));
        root.children.push(("Block0".into(), Node::Group(child)));
        root.children.push(("Alias".into(), Node::Link("/Block0".into())));
        root
    }

    #[test]
    fn test_index_roundtrip() {
        let root = sample_tree();
        let bytes = encode_index(&root).unwrap();
        let back = decode_index(&bytes).unwrap();
        assert_eq!(back, root);
        assert_eq!(back.children[0].0, "Block0");
        assert_eq!(back.children[1].1.kind_name(), "link");
    }

    #[test]
    fn test_truncated_index() {
        let bytes = encode_index(&sample_tree()).unwrap();
        let err = decode_index(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, Error::InvalidStructure(_)));
    }

    #[test]
    fn test_attribute_replace() {
        let mut attrs = AttrMap::default();
        attrs.set("Index", AttrValue::from(1));
        attrs.set("Index", AttrValue::from(2));
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("Index").and_then(AttrValue::as_int), Some(2));
        assert_eq!(AttrValue::Int(vec![1, 2]).to_floats(), Some(vec![1.0, 2.0]));
    }
}
