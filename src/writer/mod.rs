//! Writer front-end.
//!
//! A [`Writer`] stores one dataset, either once ([`Writer::write`]) or as a
//! series of time steps ([`Writer::write_step`]). Transient datasets grow
//! extendable datasets step by step and record where each step starts in
//! the `Steps` tables. Any failure poisons the writer: the file is never
//! frozen and stays unreadable.
//!
//! # Example
//!
//! ```ignore
//! use hdfmesh::prelude::*;
//!
//! let mut writer = Writer::create("flow.hdfm", WriterOptions::default())?;
//! for (time, mesh) in frames {
//!     writer.write_step(time, &DataObject::Unstructured(mesh))?;
//! }
//! writer.close()?;
//! ```

mod amr;
mod attributes;
mod block;
mod composite;
mod image;
mod mesh;
mod sink;
mod tree_grid;

use std::path::Path;

use tracing::{debug, info, warn};

use crate::container::{ContainerWriter, DEFAULT_CHUNK_ROWS};
use crate::core::schema::*;
use crate::core::SchemaVersion;
use crate::model::DataObject;
use crate::util::{ArrayData, Error, Result};

use block::{flatten, BlockWriter};
use sink::{child_path, Sink};

/// Writer configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriterOptions {
    /// Rows per chunk of extendable datasets.
    pub chunk_size: usize,
    /// zlib level 0-9; 0 stores chunks uncompressed.
    pub compression_level: u32,
    /// Replace an existing file.
    pub overwrite: bool,
    /// [`Writer::write_series`] writes every step instead of only the first.
    pub write_all_steps: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_ROWS,
            compression_level: 0,
            overwrite: true,
            write_all_steps: true,
        }
    }
}

impl WriterOptions {
    pub fn chunk_size(mut self, rows: usize) -> Self {
        self.chunk_size = rows.max(1);
        self
    }

    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn write_all_steps(mut self, all: bool) -> Self {
        self.write_all_steps = all;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Mode {
    Unset,
    Static,
    Transient { steps: usize, last_time: f64 },
}

/// Writer for mesh containers.
pub struct Writer {
    sink: Sink,
    options: WriterOptions,
    root: Option<BlockWriter>,
    mode: Mode,
    failed: bool,
}

fn root_path() -> String {
    format!("/{}", ROOT_GROUP)
}

impl Writer {
    /// Create the file at `path` with an empty root group.
    pub fn create(path: impl AsRef<Path>, options: WriterOptions) -> Result<Self> {
        let mut out = ContainerWriter::create(path.as_ref(), options.overwrite)?;
        out.set_compression_level(options.compression_level);
        let mut sink = Sink::new(out, options.chunk_size);
        let root = root_path();
        sink.ensure_path(&root)?;
        sink.attr(&root, ATTR_VERSION, SchemaVersion::CURRENT.to_attr())?;
        debug!(path = %path.as_ref().display(), ?options, "created writer");
        Ok(Self {
            sink,
            options,
            root: None,
            mode: Mode::Unset,
            failed: false,
        })
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Path of the file being written.
    pub fn path(&self) -> &Path {
        self.sink.out.path()
    }

    /// Steps written so far; 1 after a static write.
    pub fn number_of_steps(&self) -> usize {
        match self.mode {
            Mode::Unset => 0,
            Mode::Static => 1,
            Mode::Transient { steps, .. } => steps,
        }
    }

    /// Run `f`, poisoning the writer when it fails.
    fn guarded(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        if self.failed {
            return Err(Error::write("an earlier write failed; the file cannot be completed"));
        }
        let result = f(self);
        if let Err(e) = &result {
            warn!(path = %self.path().display(), "write failed: {}", e);
            self.failed = true;
        }
        result
    }

    /// Write `obj` as a static dataset. Allowed once per file.
    pub fn write(&mut self, obj: &DataObject) -> Result<()> {
        if self.mode != Mode::Unset {
            return Err(Error::write("a dataset was already written to this file"));
        }
        self.guarded(|w| {
            w.mode = Mode::Static;
            let parts = flatten(obj);
            let mut root = BlockWriter::create(&mut w.sink, &root_path(), parts)?;
            root.write(&mut w.sink, parts, 0)?;
            w.root = Some(root);
            Ok(())
        })
    }

    /// Append `obj` as the next time step at `time`.
    ///
    /// Step times must increase. The kind and the composite structure are
    /// fixed by the first step.
    pub fn write_step(&mut self, time: f64, obj: &DataObject) -> Result<()> {
        let step = match self.mode {
            Mode::Unset => 0,
            Mode::Static => return Err(Error::write("cannot append a step to a static dataset")),
            Mode::Transient { steps, last_time } => {
                if time <= last_time {
                    return Err(Error::write(format!(
                        "step time {} does not increase past {}",
                        time, last_time
                    )));
                }
                steps
            }
        };
        self.guarded(|w| {
            let parts = flatten(obj);
            let steps = child_path(&root_path(), STEPS_GROUP);
            if w.root.is_none() {
                w.sink.transient = true;
                w.sink.register_steps(steps.clone())?;
                w.root = Some(BlockWriter::create(&mut w.sink, &root_path(), parts)?);
            }
            w.sink.put(
                &child_path(&steps, STEP_VALUES),
                1,
                &[],
                &ArrayData::from(vec![time]),
                w.options.chunk_size,
            )?;
            if let Some(root) = w.root.as_mut() {
                root.write(&mut w.sink, parts, step)?;
            }
            w.mode = Mode::Transient {
                steps: step + 1,
                last_time: time,
            };
            debug!(step, time, "wrote step");
            Ok(())
        })
    }

    /// Write a time series: every step when `write_all_steps` is set,
    /// otherwise only the first one as a static dataset.
    pub fn write_series<'a>(&mut self, series: impl IntoIterator<Item = (f64, &'a DataObject)>) -> Result<()> {
        let mut series = series.into_iter();
        if !self.options.write_all_steps {
            return match series.next() {
                Some((_, obj)) => self.write(obj),
                None => Ok(()),
            };
        }
        for (time, obj) in series {
            self.write_step(time, obj)?;
        }
        Ok(())
    }

    /// Stamp `NSteps`, flush and freeze the file.
    pub fn close(&mut self) -> Result<()> {
        if self.failed {
            return Err(Error::write(format!(
                "{}: an earlier write failed; file left incomplete",
                self.path().display()
            )));
        }
        if self.mode == Mode::Unset {
            warn!(path = %self.path().display(), "closing writer with no dataset");
        }
        let steps = self.number_of_steps() as i64;
        let groups: Vec<String> = self.sink.steps_groups().map(str::to_string).collect();
        for g in &groups {
            self.sink.attr(g, ATTR_NSTEPS, steps)?;
        }
        self.sink.out.close()?;
        info!(path = %self.path().display(), steps, "wrote mesh container");
        Ok(())
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.sink.out.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImageData;

    #[test]
    fn test_static_then_step_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut w = Writer::create(file.path(), WriterOptions::default()).unwrap();
        let img = DataObject::Image(ImageData::with_dimensions([2, 2, 1]));
        w.write(&img).unwrap();
        assert!(w.write(&img).is_err());
        assert!(w.write_step(0.0, &img).is_err());
        w.close().unwrap();
        assert!(w.is_closed());
    }

    #[test]
    fn test_times_must_increase() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut w = Writer::create(file.path(), WriterOptions::default()).unwrap();
        let img = DataObject::Image(ImageData::with_dimensions([2, 2, 1]));
        w.write_step(0.0, &img).unwrap();
        assert!(w.write_step(0.0, &img).is_err());
        w.write_step(0.5, &img).unwrap();
        assert_eq!(w.number_of_steps(), 2);
        w.close().unwrap();
    }

    #[test]
    fn test_failure_poisons() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut w = Writer::create(file.path(), WriterOptions::default()).unwrap();
        let img = DataObject::Image(ImageData::with_dimensions([2, 2, 1]));
        w.write_step(0.0, &img).unwrap();
        let bigger = DataObject::Image(ImageData::with_dimensions([3, 2, 1]));
        assert!(w.write_step(1.0, &bigger).is_err());
        assert!(w.write_step(2.0, &img).is_err());
        assert!(w.close().is_err());
    }

    #[test]
    fn test_options_builder() {
        let o = WriterOptions::default().chunk_size(0).compression_level(12).overwrite(false);
        assert_eq!(o.chunk_size, 1);
        assert_eq!(o.compression_level, 9);
        assert!(!o.overwrite);
        assert!(o.write_all_steps);
    }
}
