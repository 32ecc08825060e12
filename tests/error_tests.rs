//! Failure handling: version gate, unfinished files, isolated array
//! failures and cooperative abort.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hdfmesh::container::ContainerWriter;
use hdfmesh::prelude::*;
use hdfmesh::util::Shape;

use tempfile::NamedTempFile;

/// A one-triangle unstructured grid written by hand, with one intact and
/// one truncated point array.
fn handmade(version: Vec<i64>) -> NamedTempFile {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let mut out = ContainerWriter::create(temp.path(), true).expect("Failed to create container");
    out.create_group("/HDFMesh").unwrap();
    out.set_attr("/HDFMesh", "Version", version).unwrap();
    out.set_attr("/HDFMesh", "Type", "UnstructuredGrid").unwrap();

    let ints = |v: Vec<i64>| ArrayData::from(v);
    out.write_dataset("/HDFMesh/NumberOfPoints", Shape::d1(1), &ints(vec![3]), 16).unwrap();
    out.write_dataset("/HDFMesh/NumberOfCells", Shape::d1(1), &ints(vec![1]), 16).unwrap();
    out.write_dataset("/HDFMesh/NumberOfConnectivityIds", Shape::d1(1), &ints(vec![3]), 16)
        .unwrap();
    out.write_dataset(
        "/HDFMesh/Points",
        Shape::d2(3, 3),
        &ArrayData::from(vec![0.0f64, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
        16,
    )
    .unwrap();
    out.write_dataset("/HDFMesh/Offsets", Shape::d1(2), &ints(vec![0, 3]), 16).unwrap();
    out.write_dataset("/HDFMesh/Connectivity", Shape::d1(3), &ints(vec![0, 1, 2]), 16).unwrap();
    out.write_dataset("/HDFMesh/Types", Shape::d1(1), &ArrayData::from(vec![5u8]), 16).unwrap();

    out.create_group("/HDFMesh/PointData").unwrap();
    out.write_dataset("/HDFMesh/PointData/Good", Shape::d1(3), &ArrayData::from(vec![1.0f64, 2.0, 3.0]), 16)
        .unwrap();
    out.write_dataset("/HDFMesh/PointData/Short", Shape::d1(2), &ArrayData::from(vec![1.0f64, 2.0]), 16)
        .unwrap();
    out.close().unwrap();
    temp
}

/// A two-step AMR file as written by schema version 2.2, which names the
/// per-step box count table `NumberOfAMRBox`. The cell array has no step
/// offset table, so its rows follow the boxes.
fn legacy_amr() -> NamedTempFile {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let mut out = ContainerWriter::create(temp.path(), true).expect("Failed to create container");
    out.create_group("/HDFMesh").unwrap();
    out.set_attr("/HDFMesh", "Version", vec![2i64, 2]).unwrap();
    out.set_attr("/HDFMesh", "Type", "OverlappingAMR").unwrap();
    out.set_attr("/HDFMesh", "Origin", vec![0.0f64, 0.0, 0.0]).unwrap();

    let boxes = [
        AmrBox::new([0, 0, 0], [1, 0, -1]),
        AmrBox::new([0, 0, 0], [0, 0, -1]),
        AmrBox::new([2, 0, 0], [3, 0, -1]),
    ];
    let rows: Vec<i64> = boxes.iter().flat_map(|b| b.to_row()).collect();
    out.create_group("/HDFMesh/Level0").unwrap();
    out.set_attr("/HDFMesh/Level0", "Spacing", vec![1.0f64, 1.0, 1.0]).unwrap();
    out.write_dataset("/HDFMesh/Level0/AMRBox", Shape::d2(3, 6), &ArrayData::from(rows), 16)
        .unwrap();
    out.create_group("/HDFMesh/Level0/CellData").unwrap();
    out.write_dataset(
        "/HDFMesh/Level0/CellData/rho",
        Shape::d1(5),
        &ArrayData::from(vec![1.0f64, 1.0, 2.0, 3.0, 3.0]),
        16,
    )
    .unwrap();

    out.create_group("/HDFMesh/Steps").unwrap();
    out.set_attr("/HDFMesh/Steps", "NSteps", 2i64).unwrap();
    out.write_dataset("/HDFMesh/Steps/Values", Shape::d1(2), &ArrayData::from(vec![0.0f64, 1.0]), 16)
        .unwrap();
    out.create_group("/HDFMesh/Steps/Level0").unwrap();
    out.write_dataset("/HDFMesh/Steps/Level0/AMRBoxOffsets", Shape::d1(2), &ArrayData::from(vec![0i64, 1]), 16)
        .unwrap();
    out.write_dataset("/HDFMesh/Steps/Level0/NumberOfAMRBox", Shape::d1(2), &ArrayData::from(vec![1i64, 2]), 16)
        .unwrap();
    out.close().unwrap();
    temp
}

#[test]
fn test_legacy_amr_box_counts() {
    let temp = legacy_amr();
    let mut reader = Reader::new();
    reader.open(temp.path()).expect("Failed to open");
    assert_eq!(reader.version(), Some(SchemaVersion::new(2, 2)));
    assert_eq!(reader.number_of_steps(), 2);

    let first = reader.read(&ReadRequest::at_step(0)).expect("Failed to read step 0");
    let level = &first.as_amr().unwrap().levels[0];
    assert_eq!(level.blocks.len(), 1);
    assert_eq!(level.blocks[0].amr_box, AmrBox::new([0, 0, 0], [1, 0, -1]));

    let second = reader.read(&ReadRequest::at_step(1)).expect("Failed to read step 1");
    let level = &second.as_amr().unwrap().levels[0];
    let boxes: Vec<AmrBox> = level.blocks.iter().map(|b| b.amr_box).collect();
    assert_eq!(boxes, vec![AmrBox::new([0, 0, 0], [0, 0, -1]), AmrBox::new([2, 0, 0], [3, 0, -1])]);
    let rho: Vec<Vec<f64>> = level
        .blocks
        .iter()
        .map(|b| {
            let data = b.data.as_ref().expect("block data");
            data.attributes.cell.get("rho").unwrap().data.to_f64_vec().unwrap()
        })
        .collect();
    assert_eq!(rho, vec![vec![2.0], vec![3.0, 3.0]]);
}

#[test]
fn test_handmade_file_reads() {
    let temp = handmade(vec![2, 4]);
    let mut reader = Reader::new();
    reader.open(temp.path()).expect("Failed to open");
    assert_eq!(reader.kind(), Some(DatasetKind::UnstructuredGrid));
    let piece = reader.update().expect("Failed to read");
    let grid = piece.as_unstructured().unwrap();
    assert_eq!(grid.num_cells(), 1);
    assert!(grid.attributes.point.get("Good").is_some());
}

#[test]
fn test_isolated_failure_omits_array() {
    let temp = handmade(vec![2, 4]);
    let mut reader = Reader::new();
    reader.open(temp.path()).unwrap();
    let piece = reader.update().expect("isolated failures do not fail the piece");
    let point = &piece.as_unstructured().unwrap().attributes.point;
    assert_eq!(point.names(), vec!["Good"]);
}

#[test]
fn test_strict_mode_fails_piece() {
    let temp = handmade(vec![2, 4]);
    let mut reader = Reader::with_options(ReaderOptions::default().strict(true));
    reader.open(temp.path()).unwrap();
    let err = reader.update().unwrap_err();
    assert!(err.is_isolated(), "unexpected error: {}", err);

    reader.selection_mut().disable(AttributeKind::Point, "Short");
    let piece = reader.update().expect("disabled arrays are not read");
    assert_eq!(piece.as_unstructured().unwrap().attributes.point.len(), 1);
}

#[test]
fn test_newer_major_version_rejected() {
    let temp = handmade(vec![3, 0]);
    let mut reader = Reader::new();
    match reader.open(temp.path()) {
        Err(Error::UnsupportedVersion { major, supported, .. }) => {
            assert_eq!(major, 3);
            assert_eq!(supported, 2);
        }
        other => panic!("expected UnsupportedVersion, got {:?}", other.map(|_| ())),
    }
    assert!(!reader.is_open());
}

#[test]
fn test_newer_minor_version_accepted() {
    let temp = handmade(vec![2, 9]);
    let mut reader = Reader::new();
    reader.open(temp.path()).expect("newer minor versions only warn");
    assert_eq!(reader.version(), Some(SchemaVersion::new(2, 9)));
    assert!(reader.update().is_ok());
}

#[test]
fn test_unfinished_file_rejected() {
    let temp = NamedTempFile::new().unwrap();
    {
        let mut writer = Writer::create(temp.path(), WriterOptions::default()).unwrap();
        writer
            .write(&DataObject::Image(ImageData::with_dimensions([2, 2, 2])))
            .unwrap();
        // dropped without close
    }
    let mut reader = Reader::new();
    assert!(matches!(reader.open(temp.path()), Err(Error::NotAContainer(_))));
}

#[test]
fn test_failed_writer_leaves_unreadable_file() {
    let temp = NamedTempFile::new().unwrap();
    let mut writer = Writer::create(temp.path(), WriterOptions::default()).unwrap();
    let image = DataObject::Image(ImageData::with_dimensions([2, 2, 2]));
    writer.write_step(0.0, &image).unwrap();
    let other = DataObject::Unstructured(Mesh::default());
    assert!(writer.write_step(1.0, &other).is_err());
    assert!(writer.close().is_err());
    drop(writer);

    let mut reader = Reader::new();
    assert!(matches!(reader.open(temp.path()), Err(Error::NotAContainer(_))));
}

#[test]
fn test_missing_root_group() {
    let temp = NamedTempFile::new().unwrap();
    let mut out = ContainerWriter::create(temp.path(), true).unwrap();
    out.create_group("/Other").unwrap();
    out.close().unwrap();

    let mut reader = Reader::new();
    assert!(matches!(reader.open(temp.path()), Err(Error::NotAContainer(_))));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut reader = Reader::new();
    let result = reader.open(dir.path().join("absent.hdfm"));
    assert!(matches!(result, Err(Error::FileNotFound(_))));
}

#[test]
fn test_no_overwrite() {
    let temp = NamedTempFile::new().unwrap();
    let result = Writer::create(temp.path(), WriterOptions::default().overwrite(false));
    assert!(matches!(result, Err(Error::WriteError(_))));
}

#[test]
fn test_abort() {
    let temp = handmade(vec![2, 4]);
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let mut reader = Reader::with_options(ReaderOptions::default().abort_check(move || flag.load(Ordering::Relaxed)));
    reader.open(temp.path()).unwrap();
    assert!(reader.update().is_ok());

    stop.store(true, Ordering::Relaxed);
    assert!(matches!(reader.update(), Err(Error::Aborted)));

    stop.store(false, Ordering::Relaxed);
    assert!(reader.update().is_ok());
}
