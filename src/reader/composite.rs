//! Collection and multiblock assembly.
//!
//! ```text
//! /HDFMesh                 Type=PartitionedDataSetCollection
//!   BlockA/                Type=UnstructuredGrid, Index=0
//!   BlockB/                Type=ImageData, Index=1
//!   Assembly/
//!     group/BlockA  -> /HDFMesh/BlockA   (soft link)
//! ```

use std::collections::HashMap;

use tracing::warn;

use super::assembler::Assembler;
use super::context::ReadContext;
use crate::container::{Group, Node};
use crate::core::schema::*;
use crate::core::{ReadRequest, SchemaVersion};
use crate::model::{AssemblyNode, CollectionBlock, DataObject, MultiBlock, PartitionedCollection};
use crate::util::Result;

/// Child groups of `group` that hold a dataset, ordered by `Index`.
fn block_groups<'a>(group: &Group<'a>) -> Result<Vec<(String, Group<'a>)>> {
    let mut blocks = Vec::new();
    for (order, (name, node)) in group.children().enumerate() {
        if !matches!(node, Node::Group(_)) || name == ASSEMBLY_GROUP || name == STEPS_GROUP {
            continue;
        }
        let child = group.group(name)?;
        if child.attr(ATTR_TYPE).is_none() {
            continue;
        }
        let index = child.attr(ATTR_INDEX).and_then(|v| v.as_int()).unwrap_or(order as i64);
        blocks.push((index, name.to_string(), child));
    }
    blocks.sort_by_key(|(index, _, _)| *index);
    Ok(blocks.into_iter().map(|(_, name, g)| (name, g)).collect())
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CollectionEntry {
    pub name: String,
    pub assembler: Assembler,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CollectionAssembler {
    pub path: String,
    pub blocks: Vec<CollectionEntry>,
    pub assembly: AssemblyNode,
}

impl CollectionAssembler {
    pub fn open(group: &Group<'_>, version: SchemaVersion) -> Result<Self> {
        let mut blocks = Vec::new();
        let mut by_path = HashMap::new();
        for (i, (name, g)) in block_groups(group)?.into_iter().enumerate() {
            by_path.insert(g.path().to_string(), i);
            blocks.push(CollectionEntry {
                name,
                assembler: Assembler::for_group(&g, version)?,
            });
        }
        let assembly = match group.try_group(ASSEMBLY_GROUP) {
            Some(g) => read_assembly(&g, &by_path)?,
            None => AssemblyNode::default(),
        };
        Ok(Self {
            path: group.path().to_string(),
            blocks,
            assembly,
        })
    }

    pub fn read(&self, ctx: &mut ReadContext<'_>, request: &ReadRequest) -> Result<PartitionedCollection> {
        let mut out = PartitionedCollection {
            assembly: self.assembly.clone(),
            ..Default::default()
        };
        for entry in &self.blocks {
            ctx.check_abort()?;
            out.blocks.push(CollectionBlock {
                name: entry.name.clone(),
                data: entry.assembler.assemble_partitions(ctx, request)?,
            });
        }
        Ok(out)
    }
}

/// Rebuild an assembly tree; soft links name the blocks attached to a node.
fn read_assembly(group: &Group<'_>, blocks: &HashMap<String, usize>) -> Result<AssemblyNode> {
    let mut node = AssemblyNode::default();
    for (name, child) in group.children() {
        match child {
            Node::Link(target) => {
                let resolved = group.container().group(target)?;
                match blocks.get(resolved.path()) {
                    Some(&index) => node.datasets.push(index),
                    None => warn!("assembly link {} points to unknown block {}", name, target),
                }
            }
            Node::Group(_) => {
                let mut sub = read_assembly(&group.group(name)?, blocks)?;
                sub.name = name.to_string();
                node.children.push(sub);
            }
            Node::Dataset(_) => {}
        }
    }
    Ok(node)
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum MultiBlockEntry {
    /// A dataset; `None` for a null leaf.
    Leaf { name: String, assembler: Option<Assembler> },
    Nested { name: String, children: Vec<MultiBlockEntry> },
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MultiBlockAssembler {
    pub path: String,
    pub children: Vec<MultiBlockEntry>,
}

impl MultiBlockAssembler {
    /// Build the tree from `Assembly`, or from the block groups when the
    /// file has no assembly.
    pub fn open(group: &Group<'_>, version: SchemaVersion) -> Result<Self> {
        let children = match group.try_group(ASSEMBLY_GROUP) {
            Some(assembly) => entries(&assembly, version)?,
            None => block_groups(group)?
                .into_iter()
                .map(|(name, g)| {
                    Ok(MultiBlockEntry::Leaf {
                        name,
                        assembler: Some(Assembler::for_group(&g, version)?),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(Self {
            path: group.path().to_string(),
            children,
        })
    }

    pub fn read(&self, ctx: &mut ReadContext<'_>, request: &ReadRequest) -> Result<MultiBlock> {
        read_entries(&self.children, ctx, request)
    }
}

fn entries(assembly: &Group<'_>, version: SchemaVersion) -> Result<Vec<MultiBlockEntry>> {
    let container = assembly.container();
    let mut out = Vec::new();
    for (name, node) in assembly.children() {
        match node {
            Node::Link(target) => {
                let block = container.group(target)?;
                let assembler = match block.attr(ATTR_TYPE) {
                    Some(_) => Some(Assembler::for_group(&block, version)?),
                    None => None,
                };
                out.push(MultiBlockEntry::Leaf {
                    name: name.to_string(),
                    assembler,
                });
            }
            Node::Group(_) => out.push(MultiBlockEntry::Nested {
                name: name.to_string(),
                children: entries(&assembly.group(name)?, version)?,
            }),
            Node::Dataset(_) => {}
        }
    }
    Ok(out)
}

fn read_entries(entries: &[MultiBlockEntry], ctx: &mut ReadContext<'_>, request: &ReadRequest) -> Result<MultiBlock> {
    let mut mb = MultiBlock::default();
    for entry in entries {
        ctx.check_abort()?;
        match entry {
            MultiBlockEntry::Leaf { name, assembler } => {
                let data = match assembler {
                    Some(a) => Some(a.assemble(ctx, request)?),
                    None => None,
                };
                mb.push(name.clone(), data);
            }
            MultiBlockEntry::Nested { name, children } => {
                let sub = read_entries(children, ctx, request)?;
                mb.push(name.clone(), Some(DataObject::MultiBlock(sub)));
            }
        }
    }
    Ok(mb)
}
