//! Composite datasets: partitioned datasets, collections and multiblocks.

use super::DataObject;

/// A dataset split into independent partitions of one leaf kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartitionedDataSet {
    pub partitions: Vec<DataObject>,
}

impl PartitionedDataSet {
    pub fn new(partitions: Vec<DataObject>) -> Self {
        Self { partitions }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

/// Node of a named hierarchy over collection blocks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssemblyNode {
    pub name: String,
    /// Indices of collection blocks attached to this node.
    pub datasets: Vec<usize>,
    pub children: Vec<AssemblyNode>,
}

impl AssemblyNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a child node and return it.
    pub fn add_child(&mut self, name: impl Into<String>) -> &mut AssemblyNode {
        self.children.push(AssemblyNode::new(name));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Visit this node and its descendants depth-first with their paths
    /// relative to this node.
    pub fn walk<'a>(&'a self, prefix: &str, visit: &mut dyn FnMut(&str, &'a AssemblyNode)) {
        for child in &self.children {
            let path = if prefix.is_empty() {
                child.name.clone()
            } else {
                format!("{}/{}", prefix, child.name)
            };
            visit(&path, child);
            child.walk(&path, visit);
        }
    }
}

/// One named block of a collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectionBlock {
    pub name: String,
    pub data: PartitionedDataSet,
}

/// Ordered collection of partitioned datasets plus an assembly tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartitionedCollection {
    pub blocks: Vec<CollectionBlock>,
    pub assembly: AssemblyNode,
}

impl PartitionedCollection {
    /// Append a named block and return its index.
    pub fn push(&mut self, name: impl Into<String>, data: PartitionedDataSet) -> usize {
        self.blocks.push(CollectionBlock {
            name: name.into(),
            data,
        });
        self.blocks.len() - 1
    }
}

/// One child of a multiblock: a named dataset, nested multiblock, or null.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultiBlockChild {
    pub name: String,
    pub data: Option<DataObject>,
}

/// Tree of named datasets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultiBlock {
    pub children: Vec<MultiBlockChild>,
}

impl MultiBlock {
    pub fn push(&mut self, name: impl Into<String>, data: Option<DataObject>) {
        self.children.push(MultiBlockChild {
            name: name.into(),
            data,
        });
    }

    /// Number of non-multiblock leaves, null leaves included.
    pub fn num_leaves(&self) -> usize {
        self.children
            .iter()
            .map(|c| match &c.data {
                Some(DataObject::MultiBlock(mb)) => mb.num_leaves(),
                _ => 1,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembly_walk() {
        let mut root = AssemblyNode::new("Assembly");
        let a = root.add_child("a");
        a.datasets.push(0);
        a.add_child("b").datasets.push(1);
        root.add_child("c");

        let mut seen = Vec::new();
        root.walk("", &mut |path, node| seen.push((path.to_string(), node.datasets.clone())));
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), vec![0]),
                ("a/b".to_string(), vec![1]),
                ("c".to_string(), vec![]),
            ]
        );
    }

    #[test]
    fn test_multiblock_leaves() {
        let mut inner = MultiBlock::default();
        inner.push("x", None);
        inner.push("y", None);
        let mut mb = MultiBlock::default();
        mb.push("inner", Some(DataObject::MultiBlock(inner)));
        mb.push("z", None);
        assert_eq!(mb.num_leaves(), 3);
    }
}
