//! Overlapping AMR output.
//!
//! Levels are written as `Level{N}` groups. In transient mode each level
//! keeps its own box and array offset tables under `Steps/Level{N}`; a known
//! level that is absent at a step records zero boxes.

use glam::DVec3;
use tracing::debug;

use super::attributes::{AttributeStreams, Layout};
use super::sink::{child_path, Sink};
use crate::core::schema::*;
use crate::model::{AmrLevel, ArraySet, Attributes, AttributeKind, OverlappingAmr};
use crate::util::{ArrayData, Error, Result};

#[derive(Debug)]
struct LevelWriter {
    path: String,
    steps: String,
    spacing: DVec3,
    attributes: AttributeStreams,
}

impl LevelWriter {
    fn create(sink: &mut Sink, root: &str, index: usize, spacing: DVec3) -> Result<Self> {
        let path = child_path(root, &level_group(index));
        let steps = child_path(&child_path(root, STEPS_GROUP), &level_group(index));
        sink.ensure_path(&path)?;
        sink.attr(&path, ATTR_SPACING, spacing.to_array().to_vec())?;
        Ok(Self {
            attributes: AttributeStreams::new(path.clone(), steps.clone()),
            path,
            steps,
            spacing,
        })
    }

    /// Write the boxes and arrays of `level`, or an empty step when `None`.
    fn write(&mut self, sink: &mut Sink, level: Option<&AmrLevel>, step: usize) -> Result<()> {
        let empty = AmrLevel::new(self.spacing);
        let level = level.unwrap_or(&empty);
        if level.spacing != self.spacing {
            return Err(Error::write(format!(
                "{}: spacing changed from {} to {} at step {}",
                self.path, self.spacing, level.spacing, step
            )));
        }

        let rows: Vec<i64> = level.blocks.iter().flat_map(|b| b.amr_box.to_row()).collect();
        let count = level.blocks.len();
        let chunk = sink.chunk_size;
        let before = sink.put(&child_path(&self.path, AMR_BOX), count, &[6], &ArrayData::from(rows), chunk)?;
        if sink.transient {
            sink.step_row(&child_path(&self.steps, AMR_BOX_OFFSETS), step, &[before as i64], &[0])?;
            sink.step_row(&child_path(&self.steps, NUMBER_OF_AMR_BOXES), step, &[count as i64], &[0])?;
        }

        // a block without data leaves only the arrays every block has, i.e. none
        let mut merged = Attributes::default();
        for (i, block) in level.blocks.iter().enumerate() {
            let attrs = block.data.as_ref().map(|d| d.attributes.clone()).unwrap_or_default();
            if i == 0 {
                merged = attrs;
            } else {
                merged.append(&attrs)?;
            }
        }
        let points = level.blocks.iter().map(|b| b.amr_box.num_points()).sum();
        let cells = level.blocks.iter().map(|b| b.amr_box.num_cells()).sum();
        self.attributes
            .write(sink, AttributeKind::Point, &merged.point, Layout::Tuples(points), step)?;
        self.attributes
            .write(sink, AttributeKind::Cell, &merged.cell, Layout::Tuples(cells), step)?;
        self.attributes
            .write(sink, AttributeKind::Field, &level.field_data, Layout::Field, step)?;
        debug!(level = %self.path, boxes = count, step, "wrote AMR level");
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct AmrWriter {
    path: String,
    origin: Option<DVec3>,
    fields: AttributeStreams,
    levels: Vec<LevelWriter>,
}

impl AmrWriter {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            fields: AttributeStreams::new(path.clone(), child_path(&path, STEPS_GROUP)),
            path,
            origin: None,
            levels: Vec::new(),
        }
    }

    pub fn write(&mut self, sink: &mut Sink, amr: &OverlappingAmr, step: usize) -> Result<()> {
        match self.origin {
            None => {
                sink.attr(&self.path, ATTR_ORIGIN, amr.origin.to_array().to_vec())?;
                self.origin = Some(amr.origin);
            }
            Some(origin) if origin != amr.origin => {
                return Err(Error::write(format!(
                    "{}: origin changed from {} to {} at step {}",
                    self.path, origin, amr.origin, step
                )));
            }
            Some(_) => {}
        }

        for (index, level) in amr.levels.iter().enumerate() {
            if index == self.levels.len() {
                self.levels
                    .push(LevelWriter::create(sink, &self.path, index, level.spacing)?);
            }
        }
        for (index, writer) in self.levels.iter_mut().enumerate() {
            writer.write(sink, amr.levels.get(index), step)?;
        }

        let root_fields: &ArraySet = &amr.field_data;
        self.fields
            .write(sink, AttributeKind::Field, root_fields, Layout::Field, step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerWriter;
    use crate::model::{AmrBlock, AmrBox};

    fn level(boxes: usize) -> AmrLevel {
        let mut l = AmrLevel::new(DVec3::ONE);
        for i in 0..boxes {
            let lo = 2 * i as i64;
            l.blocks.push(AmrBlock {
                amr_box: AmrBox::new([lo, 0, 0], [lo + 1, 1, -1]),
                data: None,
            });
        }
        l
    }

    #[test]
    fn test_late_level_padded() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut sink = Sink::new(ContainerWriter::create(file.path(), true).unwrap(), 16);
        sink.transient = true;
        sink.ensure_path("/HDFMesh").unwrap();
        let mut w = AmrWriter::new("/HDFMesh");
        let mut amr = OverlappingAmr::default();
        amr.levels.push(level(2));
        w.write(&mut sink, &amr, 0).unwrap();
        amr.levels.push(level(3));
        w.write(&mut sink, &amr, 1).unwrap();
        amr.levels.truncate(1);
        w.write(&mut sink, &amr, 2).unwrap();

        assert_eq!(sink.out.rows("/HDFMesh/Level0/AMRBox").unwrap(), 6);
        assert_eq!(sink.out.rows("/HDFMesh/Level1/AMRBox").unwrap(), 3);
        assert_eq!(sink.out.rows("/HDFMesh/Steps/Level1/NumberOfAMRBoxes").unwrap(), 3);
        assert_eq!(sink.out.rows("/HDFMesh/Steps/Level1/AMRBoxOffsets").unwrap(), 3);
        sink.out.close().unwrap();
    }
}
