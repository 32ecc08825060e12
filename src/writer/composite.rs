//! Collection and multiblock output.
//!
//! Blocks are child groups of the composite group, each a complete dataset
//! with its own `Type`, `Index` and `Steps`. The `Assembly` group mirrors
//! the named hierarchy; its leaves are soft links to the block groups.

use tracing::debug;

use super::block::{flatten, BlockWriter};
use super::sink::{child_path, Sink, UniqueNames};
use crate::core::schema::{ASSEMBLY_GROUP, ATTR_INDEX};
use crate::model::{AssemblyNode, DataObject, MultiBlock, PartitionedCollection};
use crate::util::{Error, Result};

#[derive(Debug)]
pub(crate) struct CollectionWriter {
    path: String,
    blocks: Vec<BlockWriter>,
}

impl CollectionWriter {
    /// Create every block group and the assembly of `coll`.
    pub fn create(sink: &mut Sink, path: &str, coll: &PartitionedCollection) -> Result<Self> {
        let mut names = UniqueNames::new();
        let mut stored = Vec::with_capacity(coll.blocks.len());
        let mut blocks = Vec::with_capacity(coll.blocks.len());
        for (i, block) in coll.blocks.iter().enumerate() {
            let name = names.claim(&block.name, || format!("Block{}", i));
            let block_path = child_path(path, &name);
            blocks.push(BlockWriter::create(sink, &block_path, &block.data.partitions)?);
            sink.attr(&block_path, ATTR_INDEX, i as i64)?;
            stored.push((name, block_path));
        }

        let assembly = child_path(path, ASSEMBLY_GROUP);
        sink.ensure_path(&assembly)?;
        write_assembly(sink, &assembly, &coll.assembly, &stored)?;
        debug!(path, blocks = blocks.len(), "created collection");
        Ok(Self {
            path: path.to_string(),
            blocks,
        })
    }

    pub fn write(&mut self, sink: &mut Sink, coll: &PartitionedCollection, step: usize) -> Result<()> {
        if coll.blocks.len() != self.blocks.len() {
            return Err(Error::write(format!(
                "{}: {} blocks at step {}, first step had {}",
                self.path,
                coll.blocks.len(),
                step,
                self.blocks.len()
            )));
        }
        for (writer, block) in self.blocks.iter_mut().zip(&coll.blocks) {
            writer.write(sink, &block.data.partitions, step)?;
        }
        Ok(())
    }
}

/// Write one assembly node below `group`: a link per attached block and a
/// subgroup per child node.
fn write_assembly(sink: &mut Sink, group: &str, node: &AssemblyNode, blocks: &[(String, String)]) -> Result<()> {
    let mut names = UniqueNames::new();
    for &index in &node.datasets {
        let (name, target) = blocks
            .get(index)
            .ok_or_else(|| Error::write(format!("assembly node '{}' names missing block {}", node.name, index)))?;
        let link = child_path(group, &names.claim(name, || format!("Block{}", index)));
        sink.link(&link, target)?;
    }
    for child in &node.children {
        let sub = child_path(group, &names.claim(&child.name, || "Node".to_string()));
        sink.ensure_path(&sub)?;
        write_assembly(sink, &sub, child, blocks)?;
    }
    Ok(())
}

/// One child of a multiblock tree.
#[derive(Debug)]
enum MultiBlockNode {
    /// A dataset, or `None` for a null leaf.
    Leaf(Option<BlockWriter>),
    Nested(Vec<MultiBlockNode>),
}

#[derive(Debug)]
pub(crate) struct MultiBlockWriter {
    path: String,
    children: Vec<MultiBlockNode>,
}

impl MultiBlockWriter {
    /// Lay out the blocks of `mb` as `Block_<n>` groups, numbered
    /// depth-first, and mirror the tree under `Assembly`.
    pub fn create(sink: &mut Sink, path: &str, mb: &MultiBlock) -> Result<Self> {
        let assembly = child_path(path, ASSEMBLY_GROUP);
        sink.ensure_path(&assembly)?;
        let mut counter = 0usize;
        let children = create_nodes(sink, path, &assembly, mb, &mut counter)?;
        debug!(path, blocks = counter, "created multiblock");
        Ok(Self {
            path: path.to_string(),
            children,
        })
    }

    pub fn write(&mut self, sink: &mut Sink, mb: &MultiBlock, step: usize) -> Result<()> {
        write_nodes(sink, &self.path, &mut self.children, mb, step)
    }
}

fn create_nodes(
    sink: &mut Sink,
    root: &str,
    assembly: &str,
    mb: &MultiBlock,
    counter: &mut usize,
) -> Result<Vec<MultiBlockNode>> {
    let mut names = UniqueNames::new();
    let mut nodes = Vec::with_capacity(mb.children.len());
    for child in &mb.children {
        let index = *counter;
        *counter += 1;
        let name = names.claim(&child.name, || format!("Block_{}", index));
        let entry = child_path(assembly, &name);
        match &child.data {
            Some(DataObject::MultiBlock(sub)) => {
                sink.ensure_path(&entry)?;
                nodes.push(MultiBlockNode::Nested(create_nodes(sink, root, &entry, sub, counter)?));
            }
            data => {
                let block_path = child_path(root, &format!("Block_{}", index));
                let writer = match data {
                    Some(obj) => {
                        let w = BlockWriter::create(sink, &block_path, flatten(obj))?;
                        sink.attr(&block_path, ATTR_INDEX, index as i64)?;
                        Some(w)
                    }
                    None => {
                        sink.ensure_path(&block_path)?;
                        None
                    }
                };
                sink.link(&entry, &block_path)?;
                nodes.push(MultiBlockNode::Leaf(writer));
            }
        }
    }
    Ok(nodes)
}

fn write_nodes(sink: &mut Sink, path: &str, nodes: &mut [MultiBlockNode], mb: &MultiBlock, step: usize) -> Result<()> {
    if nodes.len() != mb.children.len() {
        return Err(Error::write(format!(
            "{}: multiblock has {} children at step {}, first step had {}",
            path,
            mb.children.len(),
            step,
            nodes.len()
        )));
    }
    for (node, child) in nodes.iter_mut().zip(&mb.children) {
        match (node, &child.data) {
            (MultiBlockNode::Nested(sub), Some(DataObject::MultiBlock(m))) => write_nodes(sink, path, sub, m, step)?,
            (MultiBlockNode::Leaf(Some(w)), Some(obj)) if !matches!(obj, DataObject::MultiBlock(_)) => {
                w.write(sink, flatten(obj), step)?
            }
            (MultiBlockNode::Leaf(None), None) => {}
            _ => {
                return Err(Error::write(format!(
                    "{}: child '{}' changed structure at step {}",
                    path, child.name, step
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerWriter;
    use crate::model::{ImageData, PartitionedDataSet};

    fn image() -> DataObject {
        DataObject::Image(ImageData::with_dimensions([2, 2, 1]))
    }

    #[test]
    fn test_multiblock_numbering() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut sink = Sink::new(ContainerWriter::create(file.path(), true).unwrap(), 16);
        let mut inner = MultiBlock::default();
        inner.push("c", Some(image()));
        let mut mb = MultiBlock::default();
        mb.push("a", Some(image()));
        mb.push("nested", Some(DataObject::MultiBlock(inner)));
        mb.push("", None);

        let mut w = MultiBlockWriter::create(&mut sink, "/HDFMesh", &mb).unwrap();
        w.write(&mut sink, &mb, 0).unwrap();
        assert!(sink.out.exists("/HDFMesh/Block_0"));
        assert!(sink.out.exists("/HDFMesh/Block_2"));
        assert!(sink.out.exists("/HDFMesh/Block_3"));
        assert!(!sink.out.exists("/HDFMesh/Block_1"));
        assert!(sink.out.exists("/HDFMesh/Assembly/nested/c"));
        assert!(sink.out.exists("/HDFMesh/Assembly/Block_3"));

        let mut changed = mb.clone();
        changed.children[2].data = Some(image());
        assert!(w.write(&mut sink, &changed, 1).is_err());
        sink.out.close().unwrap();
    }

    #[test]
    fn test_collection_assembly() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut sink = Sink::new(ContainerWriter::create(file.path(), true).unwrap(), 16);
        let mut coll = PartitionedCollection::default();
        let a = coll.push("left/part", PartitionedDataSet::new(vec![image()]));
        coll.push("", PartitionedDataSet::new(vec![image()]));
        coll.assembly.add_child("group").datasets.push(a);

        let mut w = CollectionWriter::create(&mut sink, "/HDFMesh", &coll).unwrap();
        w.write(&mut sink, &coll, 0).unwrap();
        assert!(sink.out.exists("/HDFMesh/left_part"));
        assert!(sink.out.exists("/HDFMesh/Block1"));
        assert!(sink.out.exists("/HDFMesh/Assembly/group/left_part"));

        coll.blocks.pop();
        assert!(w.write(&mut sink, &coll, 1).is_err());
        sink.out.close().unwrap();
    }
}
