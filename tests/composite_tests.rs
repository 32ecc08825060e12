//! Collections and multiblocks.

use hdfmesh::prelude::*;

use tempfile::NamedTempFile;

fn image(nx: usize) -> DataObject {
    let mut img = ImageData::with_dimensions([nx, 2, 1]);
    img.attributes
        .point
        .insert(DataArray::scalars("n", vec![nx as i32; nx * 2]));
    DataObject::Image(img)
}

fn segment(x0: f64) -> DataObject {
    DataObject::Unstructured(Mesh::new(UnstructuredTopology {
        points: vec![DVec3::new(x0, 0.0, 0.0), DVec3::new(x0 + 1.0, 0.0, 0.0)],
        cell_types: vec![3],
        cells: CellArray::from_cells(&[[0i64, 1]]),
    }))
}

fn collection() -> PartitionedCollection {
    let mut coll = PartitionedCollection::default();
    let mesh = coll.push("mesh", PartitionedDataSet::new(vec![segment(0.0), segment(5.0)]));
    let grid = coll.push("grid", PartitionedDataSet::new(vec![image(3)]));
    coll.assembly.add_child("solids").datasets.push(mesh);
    let fluids = coll.assembly.add_child("fluids");
    fluids.datasets.push(grid);
    fluids.add_child("inlet").datasets.push(mesh);
    coll
}

fn write(obj: &DataObject) -> NamedTempFile {
    let temp = NamedTempFile::new().unwrap();
    let mut writer = Writer::create(temp.path(), WriterOptions::default()).unwrap();
    writer.write(obj).unwrap();
    writer.close().unwrap();
    temp
}

#[test]
fn test_collection_roundtrip() {
    let temp = write(&DataObject::Collection(collection()));
    let mut reader = Reader::new();
    reader.open(temp.path()).unwrap();
    assert_eq!(reader.kind(), Some(DatasetKind::PartitionedCollection));
    assert_eq!(reader.kind_at("/HDFMesh/grid").unwrap(), DatasetKind::ImageData);

    let piece = reader.update().unwrap();
    let coll = piece.as_collection().unwrap();
    let names: Vec<&str> = coll.blocks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["mesh", "grid"]);

    // each file part of a block stays its own partition
    let mesh = &coll.blocks[0].data;
    assert_eq!(mesh.len(), 2);
    assert_eq!(
        mesh.partitions[1].as_unstructured().unwrap().topology().points[0],
        DVec3::new(5.0, 0.0, 0.0)
    );
    let grid = coll.blocks[1].data.partitions[0].as_image().unwrap();
    assert_eq!(grid.point_dims(), [3, 2, 1]);

    let assembly = &coll.assembly;
    let children: Vec<&str> = assembly.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(children, vec!["solids", "fluids"]);
    assert_eq!(assembly.children[0].datasets, vec![0]);
    assert_eq!(assembly.children[1].datasets, vec![1]);
    assert_eq!(assembly.children[1].children[0].name, "inlet");
    assert_eq!(assembly.children[1].children[0].datasets, vec![0]);
}

#[test]
fn test_block_extent_fixed_by_first_step() {
    let temp = NamedTempFile::new().unwrap();
    let mut writer = Writer::create(temp.path(), WriterOptions::default()).unwrap();
    writer.write_step(0.0, &DataObject::Collection(collection())).unwrap();

    let mut grown = collection();
    grown.blocks[1].data = PartitionedDataSet::new(vec![image(4)]);
    let result = writer.write_step(1.0, &DataObject::Collection(grown));
    assert!(matches!(result, Err(Error::WriteError(_))));
    assert!(writer.close().is_err());
}

#[test]
fn test_collection_steps() {
    let temp = NamedTempFile::new().unwrap();
    let mut writer = Writer::create(temp.path(), WriterOptions::default()).unwrap();
    for step in 0..3 {
        let mut coll = collection();
        coll.blocks[0].data = PartitionedDataSet::new(vec![segment(step as f64)]);
        writer.write_step(step as f64, &DataObject::Collection(coll)).unwrap();
    }
    writer.close().unwrap();

    let mut reader = Reader::new();
    reader.open(temp.path()).unwrap();
    assert_eq!(reader.number_of_steps(), 3);
    let piece = reader.read(&ReadRequest::at_step(2)).unwrap();
    let mesh = &piece.as_collection().unwrap().blocks[0].data;
    assert_eq!(mesh.len(), 1);
    assert_eq!(
        mesh.partitions[0].as_unstructured().unwrap().topology().points[0],
        DVec3::new(2.0, 0.0, 0.0)
    );
}

#[test]
fn test_multiblock_roundtrip() {
    let mut inner = MultiBlock::default();
    inner.push("c", Some(segment(1.0)));
    let mut mb = MultiBlock::default();
    mb.push("a", Some(image(2)));
    mb.push("nested", Some(DataObject::MultiBlock(inner)));
    mb.push("", None);
    mb.push("parts", Some(DataObject::Partitioned(PartitionedDataSet::new(vec![segment(0.0), segment(3.0)]))));
    assert_eq!(mb.num_leaves(), 4);

    let temp = write(&DataObject::MultiBlock(mb));
    let mut reader = Reader::new();
    reader.open(temp.path()).unwrap();
    assert_eq!(reader.kind(), Some(DatasetKind::MultiBlock));

    let piece = reader.update().unwrap();
    let read = piece.as_multiblock().unwrap();
    let names: Vec<&str> = read.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["a", "nested", "Block_3", "parts"]);
    assert!(read.children[0].data.as_ref().and_then(DataObject::as_image).is_some());
    assert!(read.children[2].data.is_none());

    let nested = read.children[1].data.as_ref().and_then(DataObject::as_multiblock).unwrap();
    assert_eq!(nested.children[0].name, "c");
    assert!(nested.children[0].data.as_ref().and_then(DataObject::as_unstructured).is_some());

    // multiblock leaves read with their parts merged
    let parts = read.children[3].data.as_ref().and_then(DataObject::as_unstructured).unwrap();
    assert_eq!(parts.num_points(), 4);
    assert_eq!(parts.num_cells(), 2);
}

#[test]
fn test_sanitized_block_names() {
    let mut coll = PartitionedCollection::default();
    coll.push("a/b", PartitionedDataSet::new(vec![segment(0.0)]));
    coll.push("a_b", PartitionedDataSet::new(vec![segment(1.0)]));
    coll.push("..", PartitionedDataSet::new(vec![segment(2.0)]));
    let temp = write(&DataObject::Collection(coll));

    let mut reader = Reader::new();
    reader.open(temp.path()).unwrap();
    let piece = reader.update().unwrap();
    let names: Vec<&str> = piece
        .as_collection()
        .unwrap()
        .blocks
        .iter()
        .map(|b| b.name.as_str())
        .collect();
    assert_eq!(names, vec!["a_b", "a_b_1", "_.."]);
}
