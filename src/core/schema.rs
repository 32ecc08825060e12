//! Schema names and the version gate.
//!
//! ```text
//! /HDFMesh                     Version=[2,4], Type=<kind>
//!   NumberOfPoints, Points, ...  topology datasets per kind
//!   PointData/ CellData/ FieldData/
//!   Steps/                     NSteps, Values, PartOffsets, ...
//!   Assembly/                  composites only
//! ```

use tracing::warn;

use crate::container::Group;
use crate::util::{Error, Result};

pub const ROOT_GROUP: &str = "HDFMesh";
pub const STEPS_GROUP: &str = "Steps";
pub const ASSEMBLY_GROUP: &str = "Assembly";

pub const ATTR_VERSION: &str = "Version";
pub const ATTR_TYPE: &str = "Type";
pub const ATTR_INDEX: &str = "Index";
pub const ATTR_NSTEPS: &str = "NSteps";
pub const ATTR_WHOLE_EXTENT: &str = "WholeExtent";
pub const ATTR_ORIGIN: &str = "Origin";
pub const ATTR_SPACING: &str = "Spacing";
pub const ATTR_DIRECTION: &str = "Direction";
pub const ATTR_BRANCH_FACTOR: &str = "BranchFactor";
pub const ATTR_DIMENSIONS: &str = "Dimensions";
pub const ATTR_INTERFACE_INTERCEPTS: &str = "InterfaceInterceptsName";
pub const ATTR_INTERFACE_NORMALS: &str = "InterfaceNormalsName";

pub const NUMBER_OF_POINTS: &str = "NumberOfPoints";
pub const NUMBER_OF_CELLS: &str = "NumberOfCells";
pub const NUMBER_OF_CONNECTIVITY_IDS: &str = "NumberOfConnectivityIds";
pub const POINTS: &str = "Points";
pub const TYPES: &str = "Types";
pub const OFFSETS: &str = "Offsets";
pub const CONNECTIVITY: &str = "Connectivity";

pub const AMR_BOX: &str = "AMRBox";
pub const AMR_BOX_OFFSETS: &str = "AMRBoxOffsets";
pub const NUMBER_OF_AMR_BOXES: &str = "NumberOfAMRBoxes";
pub const NUMBER_OF_AMR_BOX_LEGACY: &str = "NumberOfAMRBox";

pub const X_COORDINATES: &str = "XCoordinates";
pub const Y_COORDINATES: &str = "YCoordinates";
pub const Z_COORDINATES: &str = "ZCoordinates";
pub const DESCRIPTORS: &str = "Descriptors";
pub const DESCRIPTORS_SIZE: &str = "DescriptorsSize";
pub const MASK: &str = "Mask";
pub const TREE_IDS: &str = "TreeIds";
pub const DEPTH_PER_TREE: &str = "DepthPerTree";
pub const NUMBER_OF_TREES: &str = "NumberOfTrees";
pub const NUMBER_OF_DEPTHS: &str = "NumberOfDepths";
pub const NUMBER_OF_CELLS_PER_TREE_DEPTH: &str = "NumberOfCellsPerTreeDepth";

pub const STEP_VALUES: &str = "Values";
pub const PART_OFFSETS: &str = "PartOffsets";
pub const NUMBER_OF_PARTS: &str = "NumberOfParts";
pub const POINT_OFFSETS: &str = "PointOffsets";
pub const CELL_OFFSETS: &str = "CellOffsets";
pub const CONNECTIVITY_ID_OFFSETS: &str = "ConnectivityIdOffsets";
pub const FIELD_DATA_SIZES: &str = "FieldDataSizes";
pub const TREE_IDS_OFFSETS: &str = "TreeIdsOffsets";
pub const DEPTH_PER_TREE_OFFSETS: &str = "DepthPerTreeOffsets";
pub const CELLS_PER_TREE_DEPTH_OFFSETS: &str = "NumberOfCellsPerTreeDepthOffsets";
pub const DESCRIPTORS_OFFSETS: &str = "DescriptorsOffsets";
pub const MASK_OFFSETS: &str = "MaskOffsets";

/// Name of the group holding refinement level `level`.
pub fn level_group(level: usize) -> String {
    format!("Level{}", level)
}

/// Schema version stored in the root `Version` attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: i64,
    pub minor: i64,
}

impl SchemaVersion {
    /// The version this implementation reads and writes.
    pub const CURRENT: SchemaVersion = SchemaVersion { major: 2, minor: 4 };

    /// The only version that names the AMR box count table `NumberOfAMRBox`.
    pub const LEGACY_AMR_COUNT: SchemaVersion = SchemaVersion { major: 2, minor: 2 };

    pub const fn new(major: i64, minor: i64) -> Self {
        Self { major, minor }
    }

    /// Read the version attribute of a root group.
    pub fn read(root: &Group<'_>) -> Result<Self> {
        let ints = root
            .attr(ATTR_VERSION)
            .and_then(|v| v.as_ints())
            .ok_or_else(|| Error::NotAContainer(format!("{}: missing {} attribute", root.path(), ATTR_VERSION)))?;
        match ints {
            [major, minor, ..] => Ok(Self::new(*major, *minor)),
            [major] => Ok(Self::new(*major, 0)),
            [] => Err(Error::NotAContainer(format!("{}: empty {} attribute", root.path(), ATTR_VERSION))),
        }
    }

    /// Reject newer major versions; a newer minor version only warns.
    pub fn check(self) -> Result<Self> {
        let supported = Self::CURRENT;
        if self.major > supported.major {
            return Err(Error::UnsupportedVersion {
                major: self.major,
                minor: self.minor,
                supported: supported.major,
            });
        }
        if self.major == supported.major && self.minor > supported.minor {
            warn!(
                "file schema version {} is newer than supported {}; reading known fields only",
                self, supported
            );
        }
        Ok(self)
    }

    /// AMR box count table names, preferred name first.
    pub fn amr_box_count_names(self) -> [&'static str; 2] {
        if self == Self::LEGACY_AMR_COUNT {
            [NUMBER_OF_AMR_BOX_LEGACY, NUMBER_OF_AMR_BOXES]
        } else {
            [NUMBER_OF_AMR_BOXES, NUMBER_OF_AMR_BOX_LEGACY]
        }
    }

    pub fn to_attr(self) -> Vec<i64> {
        vec![self.major, self.minor]
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_gate() {
        assert!(SchemaVersion::new(2, 4).check().is_ok());
        assert!(SchemaVersion::new(1, 0).check().is_ok());
        assert!(SchemaVersion::new(2, 9).check().is_ok());
        assert!(matches!(
            SchemaVersion::new(3, 0).check(),
            Err(Error::UnsupportedVersion { major: 3, minor: 0, supported: 2 })
        ));
    }

    #[test]
    fn test_amr_count_names() {
        assert_eq!(SchemaVersion::new(2, 2).amr_box_count_names()[0], "NumberOfAMRBox");
        assert_eq!(SchemaVersion::new(2, 4).amr_box_count_names()[0], "NumberOfAMRBoxes");
        assert_eq!(level_group(3), "Level3");
    }
}
