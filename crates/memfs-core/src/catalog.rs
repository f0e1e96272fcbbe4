// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Catalog tree: the directory hierarchy mapping paths to inodes
//!
//! Nodes live in an arena keyed by `NodeId`. A node refers to its parent by
//! id only, so the root's self-referential `.`/`..` and every child → parent
//! edge are plain lookups rather than owning references. The synthetic `.`
//! and `..` entries are never stored; traversal and listing synthesize them.

use std::collections::HashMap;

use tracing::trace;

use crate::error::{FsError, FsResult};
use crate::types::{DirEntry, InodeId};

/// Arena index of a catalog node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

#[derive(Debug)]
enum NodeKind {
    File,
    Directory {
        /// Live children in insertion order.
        children: Vec<NodeId>,
        index: HashMap<String, NodeId>,
    },
}

/// One named entry in the hierarchy
#[derive(Debug)]
pub struct CatalogNode {
    name: String,
    inode: InodeId,
    parent: Option<NodeId>,
    kind: NodeKind,
}

impl CatalogNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inode(&self) -> InodeId {
        self.inode
    }

    /// `None` only for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    /// Number of user-visible children (`.` and `..` excluded).
    pub fn child_count(&self) -> usize {
        match &self.kind {
            NodeKind::Directory { children, .. } => children.len(),
            NodeKind::File => 0,
        }
    }
}

#[derive(Debug)]
pub struct Catalog {
    nodes: HashMap<NodeId, CatalogNode>,
    root: NodeId,
    next_id: u64,
}

/// Split an absolute path into its non-empty components.
pub(crate) fn components(path: &str) -> FsResult<Vec<&str>> {
    if !path.starts_with('/') || path.contains('\0') {
        return Err(FsError::InvalidInput);
    }
    Ok(path.split('/').filter(|c| !c.is_empty()).collect())
}

/// Split an absolute path into `(parent_path, name)`.
pub(crate) fn split_parent(path: &str) -> FsResult<(&str, &str)> {
    components(path)?;
    let trimmed = path.trim_end_matches('/');
    let pos = trimmed.rfind('/').ok_or(FsError::InvalidInput)?;
    let name = &trimmed[pos + 1..];
    if name.is_empty() {
        return Err(FsError::InvalidInput);
    }
    let parent = if pos == 0 { "/" } else { &trimmed[..pos] };
    Ok((parent, name))
}

fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(FsError::InvalidInput);
    }
    Ok(())
}

impl Catalog {
    /// Create a catalog holding only the root directory.
    pub fn new(root_inode: InodeId) -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            CatalogNode {
                name: String::new(),
                inode: root_inode,
                parent: None,
                kind: NodeKind::Directory {
                    children: Vec::new(),
                    index: HashMap::new(),
                },
            },
        );
        Self {
            nodes,
            root,
            next_id: 1,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> FsResult<&CatalogNode> {
        self.nodes.get(&id).ok_or(FsError::NotFound)
    }

    /// Number of nodes including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node `..` leads to; the root is its own parent.
    pub fn parent_of(&self, id: NodeId) -> FsResult<NodeId> {
        Ok(self.node(id)?.parent.unwrap_or(self.root))
    }

    /// Walk `path` from the root, honoring `.` and `..`.
    pub fn resolve(&self, path: &str) -> FsResult<NodeId> {
        self.resolve_from(self.root, &components(path)?)
    }

    fn resolve_from(&self, start: NodeId, components: &[&str]) -> FsResult<NodeId> {
        let mut current = start;
        for component in components {
            let node = self.node(current)?;
            let NodeKind::Directory { index, .. } = &node.kind else {
                return Err(FsError::NotADirectory);
            };
            current = match *component {
                "." => current,
                ".." => node.parent.unwrap_or(self.root),
                name => *index.get(name).ok_or(FsError::NotFound)?,
            };
        }
        Ok(current)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    /// Link a new entry named `name` under the directory at `parent_path`.
    pub fn insert(
        &mut self,
        parent_path: &str,
        name: &str,
        is_directory: bool,
        inode: InodeId,
    ) -> FsResult<NodeId> {
        validate_name(name)?;
        let parent = self.resolve(parent_path)?;
        self.insert_at(parent, name, is_directory, inode)
    }

    /// `insert` addressed by the full path of the new entry.
    pub fn insert_path(
        &mut self,
        path: &str,
        is_directory: bool,
        inode: InodeId,
    ) -> FsResult<NodeId> {
        let (parent_path, name) = split_parent(path)?;
        self.insert(parent_path, name, is_directory, inode)
    }

    fn insert_at(
        &mut self,
        parent: NodeId,
        name: &str,
        is_directory: bool,
        inode: InodeId,
    ) -> FsResult<NodeId> {
        let id = NodeId(self.next_id);
        let parent_node = self.nodes.get_mut(&parent).ok_or(FsError::NotFound)?;
        let NodeKind::Directory { children, index } = &mut parent_node.kind else {
            return Err(FsError::NotADirectory);
        };
        if index.contains_key(name) {
            return Err(FsError::AlreadyExists);
        }
        children.try_reserve(1)?;
        index.try_reserve(1)?;
        children.push(id);
        index.insert(name.to_string(), id);
        self.next_id += 1;

        let kind = if is_directory {
            NodeKind::Directory {
                children: Vec::new(),
                index: HashMap::new(),
            }
        } else {
            NodeKind::File
        };
        self.nodes.insert(
            id,
            CatalogNode {
                name: name.to_string(),
                inode,
                parent: Some(parent),
                kind,
            },
        );
        trace!(target: "memfs::catalog", name, %inode, is_directory, "inserted entry");
        Ok(id)
    }

    /// Remove `id` and, for directories, its entire subtree. Returns the
    /// inodes referenced by every removed node, children before parents.
    ///
    /// The inode store is not touched; callers decide what happens to the
    /// returned inodes.
    pub fn erase(&mut self, id: NodeId, detach_from_parent: bool) -> FsResult<Vec<InodeId>> {
        if id == self.root {
            return Err(FsError::InvalidInput);
        }
        let mut released = Vec::new();
        self.erase_into(id, detach_from_parent, &mut released)?;
        Ok(released)
    }

    fn erase_into(
        &mut self,
        id: NodeId,
        detach_from_parent: bool,
        released: &mut Vec<InodeId>,
    ) -> FsResult<()> {
        let children = match &self.node(id)?.kind {
            NodeKind::Directory { children, .. } => children.clone(),
            NodeKind::File => Vec::new(),
        };
        // The subtree is discarded wholesale; children need no detaching.
        for child in children {
            self.erase_into(child, false, released)?;
        }
        if detach_from_parent {
            self.detach(id)?;
        }
        let node = self.nodes.remove(&id).ok_or(FsError::NotFound)?;
        trace!(target: "memfs::catalog", name = %node.name, inode = %node.inode, "erased entry");
        released.push(node.inode);
        Ok(())
    }

    fn detach(&mut self, id: NodeId) -> FsResult<()> {
        let node = self.node(id)?;
        let parent = node.parent.ok_or(FsError::InvalidInput)?;
        let name = node.name.clone();
        let parent_node = self.nodes.get_mut(&parent).ok_or(FsError::NotFound)?;
        if let NodeKind::Directory { children, index } = &mut parent_node.kind {
            if index.remove(&name).is_some() {
                children.retain(|child| *child != id);
            }
        }
        Ok(())
    }

    /// Listing of a directory: `.` and `..` first, then live children in
    /// insertion order.
    pub fn entries(&self, id: NodeId) -> FsResult<Vec<DirEntry>> {
        let node = self.node(id)?;
        let NodeKind::Directory { children, .. } = &node.kind else {
            return Err(FsError::NotADirectory);
        };
        let parent = self.node(node.parent.unwrap_or(self.root))?;

        let mut entries = Vec::with_capacity(children.len() + 2);
        entries.push(DirEntry {
            name: ".".to_string(),
            ino: node.inode,
            is_dir: true,
        });
        entries.push(DirEntry {
            name: "..".to_string(),
            ino: parent.inode,
            is_dir: true,
        });
        for child in children {
            let child = self.node(*child)?;
            entries.push(DirEntry {
                name: child.name.clone(),
                ino: child.inode,
                is_dir: child.is_directory(),
            });
        }
        Ok(entries)
    }

    /// Absolute path of `id`, rebuilt by walking parent links.
    pub fn path_of(&self, id: NodeId) -> FsResult<String> {
        let mut names = Vec::new();
        let mut current = self.node(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.node(parent)?;
        }
        if names.is_empty() {
            return Ok("/".to_string());
        }
        names.reverse();
        Ok(names.iter().fold(String::new(), |mut path, name| {
            path.push('/');
            path.push_str(name);
            path
        }))
    }
}
