//! Reader front-end.
//!
//! A [`Reader`] owns one open container, the assembler chosen for its root
//! dataset, the array selection and the geometry cache. Every read is
//! driven by an explicit [`ReadRequest`]; the current step kept on the
//! reader only feeds [`Reader::update`].
//!
//! # Example
//!
//! ```ignore
//! use hdfmesh::prelude::*;
//!
//! let mut reader = Reader::new();
//! reader.open("flow.hdfm")?;
//! reader.selection_mut().disable(AttributeKind::Point, "Velocity");
//! for step in 0..reader.number_of_steps() {
//!     reader.set_step(step)?;
//!     let piece = reader.update()?;
//!     println!("{}: {:?}", step, piece.kind());
//! }
//! ```

mod amr;
mod assembler;
mod composite;
mod context;
mod image;
mod mesh;
mod tree_grid;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::container::{Container, Group, Node};
use crate::core::schema::{ROOT_GROUP, STEPS_GROUP};
use crate::core::{
    floor_step, time_range, ArraySelection, MeshCache, MetadataResolver, ReadRequest, ReaderOptions, SchemaVersion,
};
use crate::model::{AttributeKind, DataObject, DatasetKind};
use crate::util::{Error, Result};

use assembler::Assembler;
use context::ReadContext;

/// Open file state; dropped as a whole on close or re-open.
struct OpenFile {
    path: PathBuf,
    container: Container,
    version: SchemaVersion,
    assembler: Assembler,
    step_values: Vec<f64>,
    number_of_steps: usize,
}

/// Reader for mesh containers.
pub struct Reader {
    file: Option<OpenFile>,
    step: usize,
    selection: ArraySelection,
    options: ReaderOptions,
    cache: MeshCache,
}

impl Default for Reader {
    fn default() -> Self {
        Self::new()
    }
}

impl Reader {
    pub fn new() -> Self {
        Self::with_options(ReaderOptions::default())
    }

    pub fn with_options(options: ReaderOptions) -> Self {
        Self {
            file: None,
            step: 0,
            selection: ArraySelection::new(),
            options,
            cache: MeshCache::new(),
        }
    }

    /// Open `path`, replacing any previously opened file.
    ///
    /// Opening the path that is already open does nothing. Fails with
    /// `NotAContainer` or `UnsupportedVersion`; on failure the reader is
    /// left closed.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.file.as_ref().is_some_and(|f| f.path == path) {
            return Ok(());
        }
        self.close();

        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let container = Container::open_opts(path, self.options.use_mmap)?;
        let (version, assembler, step_values, number_of_steps) = {
            let root = container
                .root()
                .try_group(ROOT_GROUP)
                .ok_or_else(|| Error::NotAContainer(format!("{}: no /{} group", path.display(), ROOT_GROUP)))?;
            let version = SchemaVersion::read(&root)?.check()?;
            let assembler = Assembler::for_group(&root, version)?;
            register_arrays(&root, &mut self.selection)?;
            let meta = MetadataResolver::new(root, version);
            (version, assembler, meta.step_values()?, meta.number_of_steps()?)
        };
        info!(
            path = %path.display(),
            kind = %assembler.kind(),
            %version,
            steps = number_of_steps,
            "opened mesh container"
        );

        self.file = Some(OpenFile {
            path: path.to_path_buf(),
            container,
            version,
            assembler,
            step_values,
            number_of_steps,
        });
        Ok(())
    }

    /// Release the file and every cached piece.
    pub fn close(&mut self) {
        if let Some(file) = self.file.take() {
            debug!(path = %file.path.display(), "closing mesh container");
        }
        self.cache = MeshCache::new();
        self.step = 0;
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn file(&self) -> Result<&OpenFile> {
        self.file.as_ref().ok_or_else(|| Error::NotFound("no file is open".into()))
    }

    /// Path of the open file.
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path.as_path())
    }

    pub fn kind(&self) -> Option<DatasetKind> {
        self.file.as_ref().map(|f| f.assembler.kind())
    }

    pub fn version(&self) -> Option<SchemaVersion> {
        self.file.as_ref().map(|f| f.version)
    }

    /// Underlying container of the open file.
    pub fn container(&self) -> Option<&Container> {
        self.file.as_ref().map(|f| &f.container)
    }

    /// Number of steps; 1 for static data and 0 when closed.
    pub fn number_of_steps(&self) -> usize {
        self.file.as_ref().map_or(0, |f| f.number_of_steps)
    }

    /// Time coordinate of every step; empty for static data.
    pub fn step_values(&self) -> &[f64] {
        self.file.as_ref().map_or(&[], |f| f.step_values.as_slice())
    }

    /// `(min, max)` over the step values.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        time_range(self.step_values())
    }

    #[inline]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Select the step read by [`Self::update`].
    pub fn set_step(&mut self, step: usize) -> Result<()> {
        let n = self.number_of_steps();
        if step >= n.max(1) {
            return Err(Error::OutOfBounds(format!("step {} requested, file holds {}", step, n)));
        }
        self.step = step;
        Ok(())
    }

    /// Select the last step whose time is not after `time`.
    pub fn set_time(&mut self, time: f64) -> usize {
        self.step = floor_step(self.step_values(), time);
        self.step
    }

    pub fn selection(&self) -> &ArraySelection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut ArraySelection {
        &mut self.selection
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Options may change between reads; the cache is kept.
    pub fn options_mut(&mut self) -> &mut ReaderOptions {
        &mut self.options
    }

    /// Geometry cache hits and misses since the file was opened.
    pub fn cache_stats(&self) -> (usize, usize) {
        let (uh, um) = self.cache.unstructured.stats();
        let (ph, pm) = self.cache.poly.stats();
        (uh + ph, um + pm)
    }

    /// Read one piece.
    pub fn read(&mut self, request: &ReadRequest) -> Result<DataObject> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| Error::NotFound("no file is open".into()))?;
        let steps = file.number_of_steps.max(1);
        if request.step >= steps {
            return Err(Error::OutOfBounds(format!(
                "step {} requested, file holds {}",
                request.step, file.number_of_steps
            )));
        }
        let mut ctx = ReadContext {
            container: &file.container,
            version: file.version,
            options: &self.options,
            selection: &self.selection,
            cache: &mut self.cache,
        };
        ctx.check_abort()?;
        debug!(
            step = request.step,
            piece = request.piece,
            num_pieces = request.num_pieces,
            "reading piece"
        );
        file.assembler.assemble(&mut ctx, request)
    }

    /// Read the whole dataset at the current step.
    pub fn update(&mut self) -> Result<DataObject> {
        let request = ReadRequest::at_step(self.step);
        self.read(&request)
    }

    /// Read one piece at the current step.
    pub fn update_piece(&mut self, piece: usize, num_pieces: usize) -> Result<DataObject> {
        let request = ReadRequest::at_step(self.step).with_piece(piece, num_pieces);
        self.read(&request)
    }

    /// Kind of the dataset stored at `path`, for inspection.
    pub fn kind_at(&self, path: &str) -> Result<DatasetKind> {
        let file = self.file()?;
        MetadataResolver::new(file.container.group(path)?, file.version).kind()
    }
}

/// Record every attribute array stored anywhere below `group`.
fn register_arrays(group: &Group<'_>, selection: &mut ArraySelection) -> Result<()> {
    for (name, node) in group.children() {
        if !matches!(node, Node::Group(_)) || name == STEPS_GROUP {
            continue;
        }
        let child = group.group(name)?;
        match AttributeKind::ALL.into_iter().find(|k| k.group_name() == name) {
            Some(kind) => selection.register(kind, child.child_names()),
            None => register_arrays(&child, selection)?,
        }
    }
    Ok(())
}
