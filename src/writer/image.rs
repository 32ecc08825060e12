//! Image data output.

use super::attributes::{AttributeStreams, Layout};
use super::sink::{child_path, Sink};
use crate::core::schema::*;
use crate::model::{cell_dims, point_dims, AttributeKind, ImageData};
use crate::util::{Error, Result};

#[derive(Debug)]
pub(crate) struct ImageWriter {
    path: String,
    attributes: AttributeStreams,
    extent: Option<[i64; 6]>,
}

/// `[x, y, z]` dims as the `[z, y, x]` grid layout.
fn grid(dims: [usize; 3]) -> Layout {
    Layout::Grid([dims[2], dims[1], dims[0]])
}

impl ImageWriter {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            attributes: AttributeStreams::new(path.clone(), child_path(&path, STEPS_GROUP)),
            path,
            extent: None,
        }
    }

    pub fn write(&mut self, sink: &mut Sink, image: &ImageData, step: usize) -> Result<()> {
        match self.extent {
            None => {
                sink.attr(&self.path, ATTR_WHOLE_EXTENT, image.extent.to_vec())?;
                sink.attr(&self.path, ATTR_ORIGIN, image.origin.to_array().to_vec())?;
                sink.attr(&self.path, ATTR_SPACING, image.spacing.to_array().to_vec())?;
                // stored row by row
                let direction = image.direction.transpose().to_cols_array().to_vec();
                sink.attr(&self.path, ATTR_DIRECTION, direction)?;
                self.extent = Some(image.extent);
            }
            Some(extent) if extent != image.extent => {
                return Err(Error::write(format!(
                    "{}: extent changed from {:?} to {:?} at step {}",
                    self.path, extent, image.extent, step
                )));
            }
            Some(_) => {}
        }

        let attrs = &image.attributes;
        self.attributes
            .write(sink, AttributeKind::Point, &attrs.point, grid(point_dims(&image.extent)), step)?;
        self.attributes
            .write(sink, AttributeKind::Cell, &attrs.cell, grid(cell_dims(&image.extent)), step)?;
        self.attributes
            .write(sink, AttributeKind::Field, &attrs.field, Layout::Field, step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_order() {
        assert_eq!(grid([4, 3, 1]), Layout::Grid([1, 3, 4]));
    }
}
