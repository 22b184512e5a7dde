//! Arena-backed project tree
//!
//! Nodes live in slab slots addressed by `NodeId`, so identity survives
//! in-place updates and observers can hold ids across evaluation passes.
//! Parent links are back-references only; ownership runs parent to child
//! through the sorted `children` lists on container nodes.

use promodel_reader::{FileKind, ProjectType, TargetDescription, VariableBindings};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A sub-project in the tree, together with everything its last
/// evaluation produced
#[derive(Debug, Clone)]
pub struct ContainerData {
    pub path: PathBuf,
    pub project_type: ProjectType,
    /// Last successful exact evaluation's variable values
    pub bindings: Arc<VariableBindings>,
    /// False after a failed or degraded evaluation
    pub valid_parse: bool,
    /// True while an evaluation pass covering this node is outstanding
    pub parse_in_progress: bool,
    /// Child node ids, kept sorted by path
    pub children: Vec<NodeId>,
    /// Directories whose contents influence this node
    pub watch_dirs: BTreeSet<PathBuf>,
    /// Every file whose save invalidates this node: the project file
    /// itself plus all transitive includes
    pub includes: BTreeSet<PathBuf>,
    pub target: TargetDescription,
    pub install_rules: Vec<promodel_reader::InstallRule>,
    pub tools: BTreeMap<String, String>,
}

impl ContainerData {
    pub fn new(path: PathBuf) -> Self {
        let mut includes = BTreeSet::new();
        includes.insert(path.clone());
        Self {
            path,
            project_type: ProjectType::Invalid,
            bindings: Arc::default(),
            valid_parse: false,
            parse_in_progress: false,
            children: Vec::new(),
            watch_dirs: BTreeSet::new(),
            includes,
            target: TargetDescription::default(),
            install_rules: Vec::new(),
            tools: BTreeMap::new(),
        }
    }

    /// Whether this node currently contributes a build target
    pub fn is_buildable(&self) -> bool {
        self.project_type.is_buildable() && self.valid_parse
    }
}

/// A leaf: one file the project names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
    pub path: PathBuf,
    pub kind: FileKind,
    pub generated: bool,
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Container(ContainerData),
    File(FileData),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub data: NodeData,
}

impl Node {
    pub fn path(&self) -> &Path {
        match &self.data {
            NodeData::Container(container) => &container.path,
            NodeData::File(file) => &file.path,
        }
    }

    pub fn as_container(&self) -> Option<&ContainerData> {
        match &self.data {
            NodeData::Container(container) => Some(container),
            NodeData::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileData> {
        match &self.data {
            NodeData::Container(_) => None,
            NodeData::File(file) => Some(file),
        }
    }
}

/// A node removed by reconciliation, with what its owner registrations
/// were, so watches and pending work can be cleaned up
#[derive(Debug, Clone)]
pub struct RemovedNode {
    pub id: NodeId,
    pub path: PathBuf,
    pub was_container: bool,
    pub watch_dirs: BTreeSet<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ProjectTree {
    slots: Vec<Option<Node>>,
    free: Vec<u32>,
    root: Option<NodeId>,
}

impl ProjectTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn container(&self, id: NodeId) -> Option<&ContainerData> {
        self.get(id).and_then(Node::as_container)
    }

    pub fn container_mut(&mut self, id: NodeId) -> Option<&mut ContainerData> {
        match self.get_mut(id) {
            Some(Node {
                data: NodeData::Container(container),
                ..
            }) => Some(container),
            _ => None,
        }
    }

    pub fn insert(&mut self, parent: Option<NodeId>, data: NodeData) -> NodeId {
        let node = Node { parent, data };
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(node);
                NodeId(index)
            }
            None => {
                self.slots.push(Some(node));
                NodeId((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Remove `id` and everything below it, returning the removed nodes
    /// bottom-up. The parent's child list is not touched; callers
    /// rebuilding that list do so themselves.
    pub fn remove_subtree(&mut self, id: NodeId) -> Vec<RemovedNode> {
        let mut removed = Vec::new();
        self.remove_subtree_into(id, &mut removed);
        if self.root == Some(id) {
            self.root = None;
        }
        removed
    }

    fn remove_subtree_into(&mut self, id: NodeId, removed: &mut Vec<RemovedNode>) {
        let children = match self.get(id) {
            Some(node) => node
                .as_container()
                .map(|c| c.children.clone())
                .unwrap_or_default(),
            None => return,
        };
        for child in children {
            self.remove_subtree_into(child, removed);
        }
        if let Some(node) = self.slots.get_mut(id.index()).and_then(Option::take) {
            let (was_container, watch_dirs) = match &node.data {
                NodeData::Container(container) => (true, container.watch_dirs.clone()),
                NodeData::File(_) => (false, BTreeSet::new()),
            };
            removed.push(RemovedNode {
                id,
                path: node.path().to_path_buf(),
                was_container,
                watch_dirs,
            });
            self.free.push(id.index() as u32);
        }
    }

    /// Walk parent links from `id` upward, excluding `id` itself
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.get(id).and_then(|node| node.parent),
        }
    }

    /// True when `path` is already held by `id` or one of its ancestors,
    /// meaning a child at `path` would close a cycle
    pub fn would_cycle(&self, id: NodeId, path: &Path) -> bool {
        if self.get(id).is_some_and(|node| node.path() == path) {
            return true;
        }
        self.ancestors(id)
            .any(|ancestor| self.get(ancestor).is_some_and(|node| node.path() == path))
    }

    /// All live container nodes, in slot order
    pub fn containers(&self) -> impl Iterator<Item = (NodeId, &ContainerData)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref().and_then(|node| {
                node.as_container()
                    .map(|container| (NodeId(index as u32), container))
            })
        })
    }

    /// Ids of `id` and every node below it
    pub fn subtree_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut ids = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.get(current) {
                ids.push(current);
                if let Some(container) = node.as_container() {
                    stack.extend(container.children.iter().copied());
                }
            }
        }
        ids
    }

    pub fn mark_parsing(&mut self, id: NodeId, parsing: bool) {
        if let Some(container) = self.container_mut(id) {
            container.parse_in_progress = parsing;
        }
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Ancestors<'t> {
    tree: &'t ProjectTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.get(current).and_then(|node| node.parent);
        Some(current)
    }
}
