//! Container writer.
//!
//! Chunk data is streamed to the file as it is produced; the index tree is
//! kept in memory and written once by [`ContainerWriter::close`], which also
//! sets the frozen flag. A file that was never closed stays unreadable.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::{debug, trace, warn};

use super::compression;
use super::format::*;
use super::node::{encode_index, AttrValue, AttrMap, ChunkRef, DatasetNode, GroupNode, Node};
use crate::util::{ArrayData, ElementType, Error, Result, Shape};

/// Output stream for writing container data.
pub struct OStream {
    writer: BufWriter<File>,
    pos: u64,
}

impl OStream {
    /// Create (or truncate) the output file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            writer: BufWriter::with_capacity(2 * 1024 * 1024, file),
            pos: 0,
        })
    }

    /// Current write position.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Write bytes and advance position.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.pos += 1;
        Ok(())
    }

    /// Seek to a position.
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        self.writer.flush()?;
        let new_pos = self.writer.seek(SeekFrom::Start(pos))?;
        self.pos = new_pos;
        Ok(new_pos)
    }

    /// Flush the buffer and sync file contents.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}

/// Writer for a new container file.
pub struct ContainerWriter {
    path: PathBuf,
    stream: OStream,
    root: GroupNode,
    /// Rows appended to extendable datasets but not yet flushed as a chunk.
    pending: HashMap<String, ArrayData>,
    compression_level: u32,
    closed: bool,
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl ContainerWriter {
    /// Create a new container at `path`.
    ///
    /// Fails with `WriteError` if the file exists and `overwrite` is false.
    pub fn create(path: impl AsRef<Path>, overwrite: bool) -> Result<Self> {
        let path = path.as_ref();
        if !overwrite && path.exists() {
            return Err(Error::write(format!(
                "{} exists and overwriting is disabled",
                path.display()
            )));
        }
        let mut stream = OStream::create(path)
            .map_err(|e| Error::write(format!("cannot create {}: {}", path.display(), e)))?;
        stream.write_bytes(&empty_header())?;
        debug!(path = %path.display(), "created container");

        Ok(Self {
            path: path.to_path_buf(),
            stream,
            root: GroupNode::default(),
            pending: HashMap::new(),
            compression_level: 0,
            closed: false,
        })
    }

    /// Set the zlib level (0-9) used for chunks written from now on.
    pub fn set_compression_level(&mut self, level: u32) {
        self.compression_level = level.min(9);
    }

    /// Path of the file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Frozen)
        } else {
            Ok(())
        }
    }

    fn group_mut(&mut self, path: &str) -> Result<&mut GroupNode> {
        let mut current = &mut self.root;
        for name in split_path(path) {
            current = match current.child_mut(name) {
                Some(Node::Group(g)) => g,
                Some(other) => {
                    return Err(Error::write(format!(
                        "{} in {} is a {}, not a group",
                        name,
                        path,
                        other.kind_name()
                    )))
                }
                None => return Err(Error::NotFound(path.to_string())),
            };
        }
        Ok(current)
    }

    fn dataset_mut(&mut self, path: &str) -> Result<&mut DatasetNode> {
        let (parent, name) = Self::split_parent(path)?;
        match self.group_mut(parent)?.child_mut(name) {
            Some(Node::Dataset(d)) => Ok(d),
            _ => Err(Error::NotFound(path.to_string())),
        }
    }

    fn split_parent(path: &str) -> Result<(&str, &str)> {
        let trimmed = path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(i) if i + 1 < trimmed.len() => Ok((&trimmed[..i], &trimmed[i + 1..])),
            None if !trimmed.is_empty() => Ok(("", trimmed)),
            _ => Err(Error::write(format!("invalid object path '{}'", path))),
        }
    }

    fn insert_node(&mut self, path: &str, node: Node) -> Result<()> {
        self.check_open()?;
        let (parent, name) = Self::split_parent(path)?;
        let group = self.group_mut(parent)?;
        if group.child(name).is_some() {
            return Err(Error::write(format!("object {} already exists", path)));
        }
        group.children.push((name.to_string(), node));
        Ok(())
    }

    /// Check whether an object exists at `path` (links are not followed).
    pub fn exists(&self, path: &str) -> bool {
        let mut current = &self.root;
        let parts = split_path(path);
        for (i, name) in parts.iter().enumerate() {
            match current.child(name) {
                Some(Node::Group(g)) => current = g,
                Some(_) => return i + 1 == parts.len(),
                None => return false,
            }
        }
        true
    }

    /// Create a group. The parent must exist.
    pub fn create_group(&mut self, path: &str) -> Result<()> {
        self.insert_node(path, Node::Group(GroupNode::default()))
    }

    /// Create a group unless it already exists.
    pub fn ensure_group(&mut self, path: &str) -> Result<()> {
        if self.exists(path) {
            self.group_mut(path).map(|_| ())
        } else {
            self.create_group(path)
        }
    }

    /// Create a soft link at `path` pointing to the absolute `target`.
    pub fn create_link(&mut self, path: &str, target: &str) -> Result<()> {
        self.insert_node(path, Node::Link(target.to_string()))
    }

    /// Set an attribute on the group or dataset at `path`.
    pub fn set_attr(&mut self, path: &str, name: &str, value: impl Into<AttrValue>) -> Result<()> {
        self.check_open()?;
        let value = value.into();
        let attrs: &mut AttrMap = if split_path(path).is_empty() {
            &mut self.root.attrs
        } else {
            let (parent, child) = Self::split_parent(path)?;
            match self.group_mut(parent)?.child_mut(child) {
                Some(Node::Group(g)) => &mut g.attrs,
                Some(Node::Dataset(d)) => &mut d.attrs,
                _ => return Err(Error::NotFound(path.to_string())),
            }
        };
        attrs.set(name, value);
        Ok(())
    }

    /// Write a fixed-size dataset in one go.
    pub fn write_dataset(
        &mut self,
        path: &str,
        shape: Shape,
        data: &ArrayData,
        chunk_rows: usize,
    ) -> Result<()> {
        self.check_open()?;
        if data.len() != shape.num_elements() {
            return Err(Error::write(format!(
                "{}: {} elements do not fill shape {}",
                path,
                data.len(),
                shape
            )));
        }
        let chunk_rows = chunk_rows.max(1);
        let row_len = shape.row_len();
        let mut chunks = Vec::new();
        if row_len > 0 && !shape.is_scalar() {
            let rows = shape.rows();
            let mut start = 0;
            while start < rows {
                let n = chunk_rows.min(rows - start);
                chunks.push(self.write_chunk(&data.slice(start * row_len..(start + n) * row_len), n)?);
                start += n;
            }
        } else if !data.is_empty() {
            chunks.push(self.write_chunk(data, 1)?);
        }

        trace!(path, %shape, chunks = chunks.len(), "write dataset");
        self.insert_node(
            path,
            Node::Dataset(DatasetNode {
                element_type: data.element_type(),
                shape,
                chunk_rows,
                extendable: false,
                chunks,
                attrs: AttrMap::default(),
            }),
        )
    }

    /// Create an empty dataset that grows along dimension 0.
    ///
    /// `inner` is the shape of one row (empty for 1-D datasets).
    pub fn create_extendable(
        &mut self,
        path: &str,
        element_type: ElementType,
        inner: &Shape,
        chunk_rows: usize,
    ) -> Result<()> {
        let mut dims = vec![0usize];
        dims.extend_from_slice(inner.sizes());
        self.insert_node(
            path,
            Node::Dataset(DatasetNode {
                element_type,
                shape: Shape::from(dims),
                chunk_rows: chunk_rows.max(1),
                extendable: true,
                chunks: Vec::new(),
                attrs: AttrMap::default(),
            }),
        )?;
        self.pending.insert(path.to_string(), ArrayData::empty(element_type)?);
        Ok(())
    }

    /// Append whole rows to an extendable dataset.
    ///
    /// Full chunks are flushed immediately; a trailing partial chunk stays
    /// buffered until more rows arrive or the file is closed.
    pub fn append(&mut self, path: &str, data: &ArrayData) -> Result<()> {
        self.check_open()?;
        let (chunk_rows, row_len, element_type) = {
            let ds = self.dataset_mut(path)?;
            if !ds.extendable {
                return Err(Error::write(format!("{} is not extendable", path)));
            }
            (ds.chunk_rows, ds.shape.row_len(), ds.element_type)
        };
        if data.element_type() != element_type {
            return Err(Error::write(format!(
                "{}: cannot append {} to {} dataset",
                path,
                data.element_type(),
                element_type
            )));
        }
        if row_len == 0 || data.len() % row_len != 0 {
            return Err(Error::write(format!(
                "{}: {} elements are not whole rows of {}",
                path,
                data.len(),
                row_len
            )));
        }
        let new_rows = data.len() / row_len;
        if new_rows == 0 {
            return Ok(());
        }

        let mut buffer = self
            .pending
            .remove(path)
            .ok_or_else(|| Error::write(format!("{} has no append buffer", path)))?;
        buffer.extend_from(data)?;

        let mut written = Vec::new();
        let chunk_len = chunk_rows * row_len;
        let mut consumed = 0;
        while buffer.len() - consumed >= chunk_len {
            written.push(self.write_chunk(&buffer.slice(consumed..consumed + chunk_len), chunk_rows)?);
            consumed += chunk_len;
        }
        if consumed > 0 {
            buffer = buffer.slice(consumed..buffer.len());
        }
        self.pending.insert(path.to_string(), buffer);

        let ds = self.dataset_mut(path)?;
        ds.chunks.extend(written);
        let rows = ds.shape.rows() + new_rows;
        ds.shape = ds.shape.with_rows(rows);
        Ok(())
    }

    /// Current number of rows of a dataset, buffered rows included.
    pub fn rows(&mut self, path: &str) -> Result<usize> {
        Ok(self.dataset_mut(path)?.shape.rows())
    }

    fn write_chunk(&mut self, data: &ArrayData, rows: usize) -> Result<ChunkRef> {
        let raw = data.to_le_bytes();
        let (stored, compressed) = compression::compress(&raw, self.compression_level)?;
        let pos = self.stream.pos();
        self.stream.write_bytes(&stored)?;
        Ok(ChunkRef {
            pos,
            stored_len: stored.len() as u64,
            raw_len: raw.len() as u64,
            rows: rows as u64,
            compressed,
        })
    }

    /// Flush buffered rows, write the index and freeze the file.
    pub fn close(&mut self) -> Result<()> {
        self.check_open()?;

        let mut paths: Vec<String> = self.pending.keys().cloned().collect();
        paths.sort();
        for path in paths {
            let buffer = match self.pending.remove(&path) {
                Some(b) if !b.is_empty() => b,
                _ => continue,
            };
            let row_len = self.dataset_mut(&path)?.shape.row_len().max(1);
            let chunk = self.write_chunk(&buffer, buffer.len() / row_len)?;
            self.dataset_mut(&path)?.chunks.push(chunk);
        }

        let index = encode_index(&self.root)?;
        let index_pos = self.stream.pos();
        self.stream.write_bytes(&index)?;

        self.stream.seek(INDEX_POS_OFFSET as u64)?;
        self.stream.write_u64(index_pos)?;
        self.stream.write_u64(index.len() as u64)?;
        self.stream.seek(FROZEN_OFFSET as u64)?;
        self.stream.write_u8(FROZEN_FLAG)?;
        self.stream.flush()?;

        self.closed = true;
        debug!(path = %self.path.display(), index_bytes = index.len(), "container frozen");
        Ok(())
    }

    /// Check if the container was closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for ContainerWriter {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                path = %self.path.display(),
                "container dropped without close; file is left unreadable"
            );
        }
    }
}
