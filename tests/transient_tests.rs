//! Time series: step tables, geometry reuse and per-step arrays.

use hdfmesh::container::{join_path, Container, ContainerWriter, Group, Node};
use hdfmesh::prelude::*;
use hdfmesh::util::Shape;

use tempfile::NamedTempFile;

fn triangle() -> UnstructuredGrid {
    Mesh::new(UnstructuredTopology {
        points: vec![DVec3::ZERO, DVec3::X, DVec3::Y],
        cell_types: vec![5],
        cells: CellArray::from_cells(&[[0i64, 1, 2]]),
    })
}

fn quad() -> UnstructuredGrid {
    Mesh::new(UnstructuredTopology {
        points: vec![DVec3::ZERO, DVec3::X, DVec3::ONE, DVec3::Y],
        cell_types: vec![9],
        cells: CellArray::from_cells(&[[0i64, 1, 2, 3]]),
    })
}

fn with_temperature(mut grid: UnstructuredGrid, value: f64) -> UnstructuredGrid {
    let n = grid.num_points();
    grid.attributes.point.insert(DataArray::scalars("T", vec![value; n]));
    grid
}

fn write_series(steps: &[(f64, DataObject)]) -> NamedTempFile {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let mut writer = Writer::create(temp.path(), WriterOptions::default().chunk_size(4)).expect("Failed to create writer");
    writer
        .write_series(steps.iter().map(|(t, obj)| (*t, obj)))
        .expect("Failed to write series");
    assert_eq!(writer.number_of_steps(), steps.len());
    writer.close().expect("Failed to close writer");
    temp
}

fn temperature(obj: &DataObject) -> Vec<f64> {
    obj.as_unstructured()
        .and_then(|g| g.attributes.point.get("T"))
        .and_then(|a| a.data.to_f64_vec())
        .unwrap_or_default()
}

#[test]
fn test_step_values_and_time() {
    let base = triangle();
    let steps: Vec<(f64, DataObject)> = [0.0, 0.5, 1.25]
        .iter()
        .enumerate()
        .map(|(i, &t)| (t, DataObject::Unstructured(with_temperature(base.clone(), i as f64))))
        .collect();
    let temp = write_series(&steps);

    let mut reader = Reader::new();
    reader.open(temp.path()).expect("Failed to open");
    assert_eq!(reader.number_of_steps(), 3);
    assert_eq!(reader.step_values(), &[0.0, 0.5, 1.25]);
    assert_eq!(reader.time_range(), Some((0.0, 1.25)));

    assert_eq!(reader.set_time(0.7), 1);
    assert_eq!(temperature(&reader.update().unwrap()), vec![1.0; 3]);
    assert_eq!(reader.set_time(99.0), 2);
    assert_eq!(reader.set_time(-1.0), 0);
    assert_eq!(reader.set_time(1.25), 2);

    reader.set_step(1).expect("step 1 exists");
    assert_eq!(reader.step(), 1);
    assert!(matches!(reader.set_step(3), Err(Error::OutOfBounds(_))));
    assert!(matches!(reader.read(&ReadRequest::at_step(5)), Err(Error::OutOfBounds(_))));
}

#[test]
fn test_static_geometry_reused() {
    let base = triangle();
    let steps: Vec<(f64, DataObject)> = (0..3)
        .map(|i| (i as f64, DataObject::Unstructured(with_temperature(base.clone(), 10.0 * i as f64))))
        .collect();
    let temp = write_series(&steps);

    let mut reader = Reader::new();
    reader.open(temp.path()).expect("Failed to open");
    // one copy of the points for all three steps
    let points = reader.container().unwrap().dataset("/HDFMesh/Points").unwrap();
    assert_eq!(points.rows(), 3);

    let mut fingerprints = Vec::new();
    for step in 0..3 {
        let piece = reader.read(&ReadRequest::at_step(step)).expect("Failed to read step");
        assert_eq!(temperature(&piece), vec![10.0 * step as f64; 3]);
        let grid = piece.as_unstructured().unwrap();
        assert_eq!(grid.topology(), base.topology());
        fingerprints.push(grid.mesh_fingerprint());
    }
    assert!(fingerprints.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(reader.cache_stats(), (2, 1));

    let forced = reader.read(&ReadRequest::at_step(1).forced()).unwrap();
    assert_ne!(forced.as_unstructured().unwrap().mesh_fingerprint(), fingerprints[0]);
}

#[test]
fn test_changing_geometry() {
    let steps = vec![
        (0.0, DataObject::Unstructured(with_temperature(triangle(), 1.0))),
        (1.0, DataObject::Unstructured(with_temperature(quad(), 2.0))),
        (2.0, DataObject::Unstructured(with_temperature(triangle(), 3.0))),
    ];
    let temp = write_series(&steps);

    let mut reader = Reader::new();
    reader.open(temp.path()).expect("Failed to open");
    let quad_read = reader.read(&ReadRequest::at_step(1)).unwrap();
    let grid = quad_read.as_unstructured().unwrap();
    assert_eq!(grid.num_points(), 4);
    assert_eq!(grid.topology().cell_types, vec![9]);
    assert_eq!(grid.topology().cells.cell(0), &[0, 1, 2, 3]);

    let last = reader.read(&ReadRequest::at_step(2)).unwrap();
    assert_eq!(last.as_unstructured().unwrap().topology(), triangle().topology());
    assert_eq!(temperature(&last), vec![3.0; 3]);

    // reading a step again gives the same piece
    let again = reader.read(&ReadRequest::at_step(1)).unwrap();
    assert_eq!(again, quad_read);
    let first = reader.read(&ReadRequest::at_step(0)).unwrap();
    assert_eq!(temperature(&first), vec![1.0; 3]);
}

#[test]
fn test_transient_field_sizes() {
    let mut steps = Vec::new();
    for (i, len) in [1usize, 3, 0].into_iter().enumerate() {
        let mut grid = triangle();
        grid.attributes
            .field
            .insert(DataArray::new("history", 2, (0..2 * len).map(|v| v as f64).collect::<Vec<f64>>()));
        steps.push((i as f64, DataObject::Unstructured(grid)));
    }
    let temp = write_series(&steps);

    let mut reader = Reader::new();
    reader.open(temp.path()).expect("Failed to open");
    for (step, len) in [(1usize, 3usize), (0, 1), (2, 0)] {
        let piece = reader.read(&ReadRequest::at_step(step)).unwrap();
        let history = piece.as_unstructured().unwrap().attributes.field.get("history").unwrap();
        assert_eq!(history.components, 2);
        assert_eq!(history.num_tuples(), len, "step {}", step);
    }
    let sizes = reader
        .container()
        .unwrap()
        .dataset("/HDFMesh/Steps/FieldDataSizes/history")
        .unwrap()
        .read_i64_all()
        .unwrap();
    assert_eq!(sizes, vec![2, 1, 2, 3, 2, 0]);
}

#[test]
fn test_transient_image() {
    let frames: Vec<(f64, DataObject)> = (0..3)
        .map(|i| {
            let mut image = ImageData::with_dimensions([3, 2, 1]);
            image
                .attributes
                .point
                .insert(DataArray::scalars("phi", vec![i as f32; 6]));
            (0.1 * i as f64, DataObject::Image(image))
        })
        .collect();
    let temp = write_series(&frames);

    let mut reader = Reader::new();
    reader.open(temp.path()).expect("Failed to open");
    assert_eq!(reader.kind(), Some(DatasetKind::ImageData));
    assert_eq!(reader.number_of_steps(), 3);
    reader.set_step(2).unwrap();
    let piece = reader.update().unwrap();
    let phi = piece.as_image().unwrap().attributes.point.get("phi").unwrap();
    assert_eq!(phi.data.to_f64_vec().unwrap(), vec![2.0; 6]);
    assert_eq!(piece.as_image().unwrap().extent, [0, 2, 0, 1, 0, 0]);
}

#[test]
fn test_transient_amr_levels() {
    let level = |boxes: i64| {
        let mut l = AmrLevel::new(DVec3::ONE);
        for i in 0..boxes {
            l.blocks.push(AmrBlock {
                amr_box: AmrBox::new([2 * i, 0, 0], [2 * i + 1, 0, -1]),
                data: None,
            });
        }
        l
    };
    let frames = vec![
        (0.0, DataObject::Amr(OverlappingAmr { levels: vec![level(1)], ..Default::default() })),
        (1.0, DataObject::Amr(OverlappingAmr { levels: vec![level(3), level(2)], ..Default::default() })),
    ];
    let temp = write_series(&frames);

    let mut reader = Reader::new();
    reader.open(temp.path()).expect("Failed to open");
    let first = reader.read(&ReadRequest::at_step(0)).unwrap();
    let first = first.as_amr().unwrap();
    assert_eq!(first.levels[0].blocks.len(), 1);
    // a level that appears later is empty at earlier steps
    assert!(first.levels.get(1).map_or(true, |l| l.blocks.is_empty()));

    let second = reader.read(&ReadRequest::at_step(1)).unwrap();
    let second = second.as_amr().unwrap();
    let boxes: Vec<[i64; 6]> = second.levels[0].blocks.iter().map(|b| b.amr_box.to_row()).collect();
    assert_eq!(boxes, vec![[0, 1, 0, 0, 0, -1], [2, 3, 0, 0, 0, -1], [4, 5, 0, 0, 0, -1]]);
    assert_eq!(second.levels[1].blocks.len(), 2);
}

#[test]
fn test_first_step_only() {
    let frames = vec![
        (0.0, DataObject::Unstructured(with_temperature(triangle(), 1.0))),
        (1.0, DataObject::Unstructured(with_temperature(triangle(), 2.0))),
    ];
    let temp = NamedTempFile::new().unwrap();
    let mut writer = Writer::create(temp.path(), WriterOptions::default().write_all_steps(false)).unwrap();
    writer.write_series(frames.iter().map(|(t, o)| (*t, o))).unwrap();
    writer.close().unwrap();

    let mut reader = Reader::new();
    reader.open(temp.path()).unwrap();
    assert_eq!(reader.number_of_steps(), 1);
    assert!(reader.step_values().is_empty());
    assert_eq!(temperature(&reader.update().unwrap()), vec![1.0; 3]);
}

/// Copy every group, attribute, dataset and link of `src` into a new
/// container, passing each dataset through `edit`.
fn rewrite(src: &NamedTempFile, edit: impl Fn(&str, &Shape, ArrayData) -> (Shape, ArrayData)) -> NamedTempFile {
    fn copy(
        group: &Group<'_>,
        out: &mut ContainerWriter,
        edit: &dyn Fn(&str, &Shape, ArrayData) -> (Shape, ArrayData),
    ) {
        for (name, value) in group.attrs().iter() {
            out.set_attr(group.path(), name, value.clone()).expect("Failed to copy attribute");
        }
        for (name, node) in group.children() {
            let path = join_path(group.path(), name);
            match node {
                Node::Group(_) => {
                    out.create_group(&path).expect("Failed to create group");
                    copy(&group.group(name).unwrap(), out, edit);
                }
                Node::Dataset(_) => {
                    let ds = group.dataset(name).unwrap();
                    let (shape, data) = edit(&path, ds.shape(), ds.read_all().unwrap());
                    out.write_dataset(&path, shape, &data, 16).expect("Failed to write dataset");
                }
                Node::Link(target) => out.create_link(&path, target).expect("Failed to create link"),
            }
        }
    }

    let container = Container::open(src.path()).expect("Failed to open source");
    let dst = NamedTempFile::new().expect("Failed to create temp file");
    let mut out = ContainerWriter::create(dst.path(), true).expect("Failed to create container");
    copy(&container.root(), &mut out, &edit);
    out.close().expect("Failed to close container");
    dst
}

fn small_tree_grid(trees: Vec<Tree>) -> DataObject {
    DataObject::TreeGrid(TreeGrid {
        branch_factor: 2,
        dimensions: [3, 2, 1],
        x_coords: vec![0.0, 1.0, 2.0],
        y_coords: vec![0.0, 1.0],
        z_coords: vec![0.0],
        trees,
        ..Default::default()
    })
}

#[test]
fn test_tree_depths_located_by_own_offsets() {
    let frames = vec![
        (
            0.0,
            small_tree_grid(vec![
                Tree::from_descriptor(0, vec![true], 4).unwrap(),
                Tree::from_descriptor(1, vec![], 4).unwrap(),
            ]),
        ),
        (
            1.0,
            small_tree_grid(vec![
                Tree::from_descriptor(0, vec![], 4).unwrap(),
                Tree::from_descriptor(1, vec![true, false, true, false, false], 4).unwrap(),
            ]),
        ),
    ];
    let written = write_series(&frames);

    // DepthPerTree gains a leading entry, so its step offsets no longer
    // match TreeIdsOffsets
    let shifted = rewrite(&written, |path, shape, data| {
        if path.ends_with("/DepthPerTree") {
            let mut v = vec![99i64];
            v.extend(data.to_i64_vec().unwrap());
            (Shape::d1(v.len()), ArrayData::from(v))
        } else if path.ends_with("/Steps/DepthPerTreeOffsets") {
            let v: Vec<i64> = data.to_i64_vec().unwrap().iter().map(|o| o + 1).collect();
            (shape.clone(), ArrayData::from(v))
        } else {
            (shape.clone(), data)
        }
    });

    let mut reader = Reader::new();
    reader.open(shifted.path()).expect("Failed to open");
    let ids_offsets = reader
        .container()
        .unwrap()
        .dataset("/HDFMesh/Steps/TreeIdsOffsets")
        .unwrap()
        .read_i64_all()
        .unwrap();
    assert_eq!(ids_offsets, vec![0, 2]);

    for (step, depths) in [(0usize, [2usize, 1]), (1, [1, 3])] {
        let piece = reader.read(&ReadRequest::at_step(step)).expect("Failed to read step");
        let grid = piece.as_tree_grid().unwrap();
        let read: Vec<usize> = grid.trees.iter().map(|t| t.cells_per_depth.len()).collect();
        assert_eq!(read, depths, "step {}", step);
    }
    let last = reader.read(&ReadRequest::at_step(1)).unwrap();
    assert_eq!(last.as_tree_grid().unwrap().trees[1].cells_per_depth, vec![1, 4, 4]);
}

#[test]
fn test_transient_amr_block_data() {
    let frame = |boxes: &[(i64, f64)]| {
        let mut amr = OverlappingAmr::default();
        let mut level = AmrLevel::new(DVec3::ONE);
        for &(x, value) in boxes {
            let amr_box = AmrBox::new([x, 0, 0], [x + 1, 0, -1]);
            let mut data = amr.block_grid(&amr_box, level.spacing);
            data.attributes
                .cell
                .insert(DataArray::scalars("rho", vec![value; amr_box.num_cells()]));
            level.blocks.push(AmrBlock { amr_box, data: Some(data) });
        }
        amr.levels.push(level);
        DataObject::Amr(amr)
    };
    let frames = vec![(0.0, frame(&[(0, 1.0), (2, 2.0)])), (1.0, frame(&[(4, 7.0)]))];
    let temp = write_series(&frames);

    let mut reader = Reader::new();
    reader.open(temp.path()).expect("Failed to open");
    let piece = reader.read(&ReadRequest::at_step(1)).expect("Failed to read step 1");
    let block = &piece.as_amr().unwrap().levels[0].blocks[0];
    assert_eq!(block.amr_box, AmrBox::new([4, 0, 0], [5, 0, -1]));
    let rho = block.data.as_ref().unwrap().attributes.cell.get("rho").unwrap();
    assert_eq!(rho.data.to_f64_vec().unwrap(), vec![7.0, 7.0]);
}
