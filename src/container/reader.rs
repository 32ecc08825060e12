//! Container reader: file streams, index, and typed dataset reads.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::chunk_cache::ChunkCache;
use super::compression;
use super::format::*;
use super::hyperslab::Hyperslab;
use super::node::{decode_index, AttrValue, AttrMap, DatasetNode, GroupNode, Node};
use crate::util::{ArrayData, ElementType, Error, Result, Shape};

/// Input streams for reading container data.
/// Supports both memory-mapped and locked-file I/O.
pub struct Streams {
    inner: StreamsInner,
    size: u64,
}

enum StreamsInner {
    /// Memory-mapped file (preferred for large files)
    Mmap(Mmap),
    /// Seek + read through a locked handle (fallback)
    File(Arc<RwLock<File>>),
}

impl Streams {
    /// Open a file, memory-mapping it when `use_mmap` is set.
    pub fn open_opts(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        let size = file.metadata()?.len();

        let inner = if use_mmap && cfg!(feature = "mmap") && size > 0 {
            // Safety: the file is opened read-only and never written through this map.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapFailed(e.to_string()))?;
            StreamsInner::Mmap(mmap)
        } else {
            StreamsInner::File(Arc::new(RwLock::new(file)))
        };

        Ok(Self { inner, size })
    }

    /// Total file size.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Check if the file is memory-mapped.
    #[inline]
    pub fn is_mmap(&self) -> bool {
        matches!(self.inner, StreamsInner::Mmap(_))
    }

    /// Read bytes at a specific position.
    pub fn read_bytes(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(pos, &mut buf)?;
        Ok(buf)
    }

    /// Read bytes into an existing buffer.
    pub fn read_into(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let end = pos
            .checked_add(buf.len() as u64)
            .ok_or(Error::UnexpectedEof(u64::MAX))?;
        if end > self.size {
            return Err(Error::UnexpectedEof(end));
        }

        match &self.inner {
            StreamsInner::Mmap(mmap) => {
                buf.copy_from_slice(&mmap[pos as usize..end as usize]);
                Ok(())
            }
            StreamsInner::File(file) => {
                let mut f = file.write();
                f.seek(SeekFrom::Start(pos))?;
                f.read_exact(buf)?;
                Ok(())
            }
        }
    }

    /// Read a u64 value at the given position.
    pub fn read_u64(&self, pos: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_into(pos, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

/// Join a group path and a child name.
pub fn join_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    format!("{}/{}", parent, name)
}

/// Resolved index node.
enum Target<'a> {
    Group(&'a GroupNode),
    Dataset(&'a DatasetNode),
}

/// An open, frozen container file.
pub struct Container {
    path: PathBuf,
    streams: Streams,
    version: u16,
    root: GroupNode,
    cache: ChunkCache,
}

impl Container {
    /// Open a container with memory mapping.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_opts(path, true)
    }

    /// Open a container, optionally memory-mapped.
    ///
    /// Fails with `NotAContainer` when the magic is wrong or the file was
    /// never closed cleanly.
    pub fn open_opts(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let streams = Streams::open_opts(path, use_mmap)?;
        let shown = path.display().to_string();

        if streams.size() < HEADER_SIZE as u64 {
            return Err(Error::NotAContainer(format!("{}: file too small", shown)));
        }
        let header = streams.read_bytes(0, HEADER_SIZE)?;
        if &header[..8] != CONTAINER_MAGIC {
            return Err(Error::NotAContainer(format!("{}: bad magic", shown)));
        }
        if header[FROZEN_OFFSET] != FROZEN_FLAG {
            return Err(Error::NotAContainer(format!(
                "{}: file was not closed cleanly",
                shown
            )));
        }
        let version = u16::from_le_bytes([header[VERSION_OFFSET], header[VERSION_OFFSET + 1]]);
        if version > CURRENT_VERSION {
            return Err(Error::NotAContainer(format!(
                "{}: container format version {} is newer than {}",
                shown, version, CURRENT_VERSION
            )));
        }

        let index_pos = streams.read_u64(INDEX_POS_OFFSET as u64)?;
        let index_len = streams.read_u64(INDEX_LEN_OFFSET as u64)?;
        if index_pos < HEADER_SIZE as u64 || index_pos.saturating_add(index_len) > streams.size() {
            return Err(Error::NotAContainer(format!("{}: index out of range", shown)));
        }
        let index = streams.read_bytes(index_pos, index_len as usize)?;
        let root = decode_index(&index)?;

        debug!(
            path = %shown,
            size = streams.size(),
            mmap = streams.is_mmap(),
            "opened container"
        );

        Ok(Self {
            path: path.to_path_buf(),
            streams,
            version,
            root,
            cache: ChunkCache::default(),
        })
    }

    /// Path this container was opened from.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Container format version.
    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    /// The root group.
    pub fn root(&self) -> Group<'_> {
        Group {
            container: self,
            path: "/".to_string(),
            node: &self.root,
        }
    }

    /// Group at an absolute path, following soft links.
    pub fn group(&self, path: &str) -> Result<Group<'_>> {
        match self.resolve(path, 0)? {
            (canonical, Target::Group(node)) => Ok(Group {
                container: self,
                path: canonical,
                node,
            }),
            (_, Target::Dataset(_)) => Err(Error::NotFound(format!("{} is not a group", path))),
        }
    }

    /// Dataset at an absolute path, following soft links.
    pub fn dataset(&self, path: &str) -> Result<Dataset<'_>> {
        match self.resolve(path, 0)? {
            (canonical, Target::Dataset(node)) => Ok(Dataset {
                container: self,
                path: canonical,
                node,
            }),
            (_, Target::Group(_)) => Err(Error::NotFound(format!("{} is not a dataset", path))),
        }
    }

    /// Check whether a path resolves to anything.
    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path, 0).is_ok()
    }

    fn resolve(&self, path: &str, depth: usize) -> Result<(String, Target<'_>)> {
        if depth > MAX_LINK_DEPTH {
            return Err(Error::invalid(format!("too many soft links resolving '{}'", path)));
        }
        let mut current = Target::Group(&self.root);
        let mut canonical = String::from("/");
        for name in path.split('/').filter(|s| !s.is_empty()) {
            let group = match current {
                Target::Group(g) => g,
                Target::Dataset(_) => return Err(Error::NotFound(path.to_string())),
            };
            match group.child(name) {
                Some(Node::Group(g)) => {
                    canonical = join_path(&canonical, name);
                    current = Target::Group(g);
                }
                Some(Node::Dataset(d)) => {
                    canonical = join_path(&canonical, name);
                    current = Target::Dataset(d);
                }
                Some(Node::Link(target)) => {
                    let (c, t) = self.resolve(target, depth + 1)?;
                    canonical = c;
                    current = t;
                }
                None => return Err(Error::NotFound(path.to_string())),
            }
        }
        Ok((canonical, current))
    }

    /// Decode one chunk, going through the chunk cache.
    fn load_chunk(&self, node: &DatasetNode, index: usize) -> Result<Arc<ArrayData>> {
        let chunk = node
            .chunks
            .get(index)
            .ok_or_else(|| Error::invalid(format!("chunk {} out of range", index)))?;
        if let Some(hit) = self.cache.get(chunk.pos) {
            return Ok(hit);
        }

        trace!(pos = chunk.pos, len = chunk.stored_len, "decode chunk");
        let stored = self.streams.read_bytes(chunk.pos, chunk.stored_len as usize)?;
        let raw = if chunk.compressed {
            compression::decompress(&stored)?
        } else {
            stored
        };
        if raw.len() as u64 != chunk.raw_len {
            return Err(Error::invalid(format!(
                "chunk at {} decoded to {} bytes, index says {}",
                chunk.pos,
                raw.len(),
                chunk.raw_len
            )));
        }
        let data = ArrayData::from_le_bytes(node.element_type, &raw)?;
        let expected = chunk.rows as usize * node.shape.row_len();
        if data.len() != expected {
            return Err(Error::invalid(format!(
                "chunk at {} holds {} elements, expected {}",
                chunk.pos,
                data.len(),
                expected
            )));
        }

        let data = Arc::new(data);
        self.cache.insert(chunk.pos, Arc::clone(&data), raw.len());
        Ok(data)
    }
}

/// A group in the container hierarchy.
#[derive(Clone)]
pub struct Group<'a> {
    container: &'a Container,
    path: String,
    node: &'a GroupNode,
}

impl<'a> Group<'a> {
    /// Absolute path of this group (links resolved).
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name of this group (last path component).
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    /// All attributes.
    #[inline]
    pub fn attrs(&self) -> &'a AttrMap {
        &self.node.attrs
    }

    /// Attribute by name.
    pub fn attr(&self, name: &str) -> Option<&'a AttrValue> {
        self.node.attrs.get(name)
    }

    /// Direct children in creation order, links unresolved.
    pub fn children(&self) -> impl Iterator<Item = (&'a str, &'a Node)> {
        self.node.children.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Names of the direct children in creation order.
    pub fn child_names(&self) -> Vec<&'a str> {
        self.node.children.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Check whether a direct child (of any kind) exists.
    pub fn has(&self, name: &str) -> bool {
        self.node.child(name).is_some()
    }

    /// Soft link target of a direct child, if it is a link.
    pub fn link_target(&self, name: &str) -> Option<&'a str> {
        match self.node.child(name) {
            Some(Node::Link(t)) => Some(t.as_str()),
            _ => None,
        }
    }

    /// Child group, following soft links.
    pub fn group(&self, name: &str) -> Result<Group<'a>> {
        self.container.group(&join_path(&self.path, name))
    }

    /// Child dataset, following soft links.
    pub fn dataset(&self, name: &str) -> Result<Dataset<'a>> {
        self.container.dataset(&join_path(&self.path, name))
    }

    /// Child group if present.
    pub fn try_group(&self, name: &str) -> Option<Group<'a>> {
        self.group(name).ok()
    }

    /// Child dataset if present.
    pub fn try_dataset(&self, name: &str) -> Option<Dataset<'a>> {
        self.dataset(name).ok()
    }

    /// The container this group belongs to.
    #[inline]
    pub fn container(&self) -> &'a Container {
        self.container
    }
}

/// A dataset in the container hierarchy.
#[derive(Clone)]
pub struct Dataset<'a> {
    container: &'a Container,
    path: String,
    node: &'a DatasetNode,
}

impl<'a> Dataset<'a> {
    /// Absolute path of this dataset (links resolved).
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name of this dataset (last path component).
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    #[inline]
    pub fn element_type(&self) -> ElementType {
        self.node.element_type
    }

    #[inline]
    pub fn shape(&self) -> &'a Shape {
        &self.node.shape
    }

    /// Number of rows (dimension 0).
    #[inline]
    pub fn rows(&self) -> usize {
        self.node.shape.rows()
    }

    #[inline]
    pub fn is_extendable(&self) -> bool {
        self.node.extendable
    }

    #[inline]
    pub fn chunk_rows(&self) -> usize {
        self.node.chunk_rows
    }

    /// Number of stored chunks.
    #[inline]
    pub fn num_chunks(&self) -> usize {
        self.node.chunks.len()
    }

    /// Stored bytes over all chunks.
    pub fn stored_bytes(&self) -> u64 {
        self.node.chunks.iter().map(|c| c.stored_len).sum()
    }

    /// Attribute by name.
    pub fn attr(&self, name: &str) -> Option<&'a AttrValue> {
        self.node.attrs.get(name)
    }

    /// Read every element.
    pub fn read_all(&self) -> Result<ArrayData> {
        if self.node.shape.is_scalar() {
            let mut out = ArrayData::empty(self.node.element_type)?;
            for i in 0..self.node.chunks.len() {
                let chunk = self.container.load_chunk(self.node, i)?;
                out.extend_from(&*chunk)?;
            }
            return Ok(out);
        }
        self.read_slab(&Hyperslab::all(&self.node.shape))
    }

    /// Read `count` rows starting at `start`, all inner dimensions included.
    pub fn read_rows(&self, start: usize, count: usize) -> Result<ArrayData> {
        self.read_slab(&Hyperslab::rows(&self.node.shape, start, count))
    }

    /// Read a hyperslab, decoding only the chunks it intersects.
    pub fn read_slab(&self, slab: &Hyperslab) -> Result<ArrayData> {
        let shape = &self.node.shape;
        slab.validate(shape).map_err(|e| match e {
            Error::OutOfBounds(msg) => Error::OutOfBounds(format!("{}: {}", self.path, msg)),
            other => other,
        })?;

        let mut out = ArrayData::empty(self.node.element_type)?;
        if slab.num_elements() == 0 {
            return Ok(out);
        }

        let row_len = shape.row_len();
        let runs = slab.inner_runs(shape);
        let full_rows = runs.len() == 1 && runs[0] == (0..row_len);
        let (first, last) = (slab.start[0], slab.start[0] + slab.count[0]);

        let mut chunk_start = 0usize;
        for (i, chunk) in self.node.chunks.iter().enumerate() {
            let chunk_end = chunk_start + chunk.rows as usize;
            if chunk_end > first && chunk_start < last {
                let data = self.container.load_chunk(self.node, i)?;
                let lo = first.max(chunk_start) - chunk_start;
                let hi = last.min(chunk_end) - chunk_start;
                if full_rows {
                    out.extend_from(&data.slice(lo * row_len..hi * row_len))?;
                } else {
                    let mut selected = Vec::with_capacity((hi - lo) * runs.len());
                    for row in lo..hi {
                        let base = row * row_len;
                        selected.extend(runs.iter().map(|r| base + r.start..base + r.end));
                    }
                    out.extend_from(&data.select_runs(&selected))?;
                }
            }
            if chunk_end >= last {
                break;
            }
            chunk_start = chunk_end;
        }

        if out.len() != slab.num_elements() {
            return Err(Error::invalid(format!(
                "{}: chunks cover {} of {} selected elements",
                self.path,
                out.len(),
                slab.num_elements()
            )));
        }
        Ok(out)
    }

    /// Read rows of an integer dataset widened to i64.
    pub fn read_i64_rows(&self, start: usize, count: usize) -> Result<Vec<i64>> {
        let data = self.read_rows(start, count)?;
        data.to_i64_vec().ok_or_else(|| {
            Error::type_mismatch(self.path.clone(), "integer", self.node.element_type.name())
        })
    }

    /// Read a whole integer dataset widened to i64.
    pub fn read_i64_all(&self) -> Result<Vec<i64>> {
        let data = self.read_all()?;
        data.to_i64_vec().ok_or_else(|| {
            Error::type_mismatch(self.path.clone(), "integer", self.node.element_type.name())
        })
    }

    /// Read a whole numeric dataset widened to f64.
    pub fn read_f64_all(&self) -> Result<Vec<f64>> {
        let data = self.read_all()?;
        data.to_f64_vec().ok_or_else(|| {
            Error::type_mismatch(self.path.clone(), "numeric", self.node.element_type.name())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerWriter;

    fn write_sample() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut out = ContainerWriter::create(file.path(), true).unwrap();
        out.create_group("/g").unwrap();
        out.set_attr("/g", "Kind", "sample").unwrap();
        out.write_dataset("/g/scalar", Shape::scalar(), &ArrayData::from(vec![2.5f64]), 4)
            .unwrap();
        out.write_dataset(
            "/g/table",
            Shape::d2(3, 2),
            &ArrayData::from(vec![0i64, 1, 2, 3, 4, 5]),
            2,
        )
        .unwrap();
        out.close().unwrap();
        file
    }

    #[test]
    fn test_scalar_dataset() {
        let file = write_sample();
        let container = Container::open(file.path()).unwrap();
        let ds = container.dataset("/g/scalar").unwrap();
        assert!(ds.shape().is_scalar());
        assert_eq!(ds.read_f64_all().unwrap(), vec![2.5]);
    }

    #[test]
    fn test_open_without_mmap() {
        let file = write_sample();
        let container = Container::open_opts(file.path(), false).unwrap();
        assert_eq!(container.path(), file.path());
        let table = container.dataset("/g/table").unwrap();
        assert_eq!(table.num_chunks(), 2);
        assert_eq!(table.read_i64_rows(1, 2).unwrap(), vec![2, 3, 4, 5]);
        assert!(container.root().group("g").unwrap().attr("Kind").is_some());
    }

    #[test]
    fn test_not_a_container() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), vec![0u8; 64]).unwrap();
        assert!(matches!(Container::open(file.path()), Err(Error::NotAContainer(_))));
    }
}
