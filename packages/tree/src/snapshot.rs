//! Read-only tree snapshots for observers
//!
//! Snapshots are plain owned data, detached from the arena, so they can
//! cross task boundaries and serialize for tooling without holding the
//! tree lock.

use crate::node::{NodeData, NodeId, ProjectTree};
use promodel_reader::{FileKind, ProjectType, TargetDescription, VariableBindings};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize)]
pub struct TreeSnapshot {
    pub root: Option<SnapshotNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotNode {
    pub path: PathBuf,
    pub name: String,
    pub detail: SnapshotDetail,
    pub children: Vec<SnapshotNode>,
}

#[derive(Debug, Clone, Serialize)]
pub enum SnapshotDetail {
    Container {
        project_type: ProjectType,
        valid_parse: bool,
        parse_in_progress: bool,
        target: TargetDescription,
        bindings: VariableBindings,
    },
    File {
        kind: FileKind,
        generated: bool,
    },
}

impl TreeSnapshot {
    pub fn capture(tree: &ProjectTree) -> Self {
        Self {
            root: tree.root().and_then(|id| capture_node(tree, id)),
        }
    }

    /// Depth-first lookup by path
    pub fn find(&self, path: &Path) -> Option<&SnapshotNode> {
        self.root.as_ref().and_then(|root| root.find(path))
    }

    pub fn node_count(&self) -> usize {
        fn count(node: &SnapshotNode) -> usize {
            1 + node.children.iter().map(count).sum::<usize>()
        }
        self.root.as_ref().map(count).unwrap_or(0)
    }
}

impl SnapshotNode {
    pub fn find(&self, path: &Path) -> Option<&SnapshotNode> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(path))
    }

    pub fn is_container(&self) -> bool {
        matches!(self.detail, SnapshotDetail::Container { .. })
    }
}

fn capture_node(tree: &ProjectTree, id: NodeId) -> Option<SnapshotNode> {
    let node = tree.get(id)?;
    let path = node.path().to_path_buf();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let snapshot = match &node.data {
        NodeData::Container(container) => SnapshotNode {
            path,
            name,
            detail: SnapshotDetail::Container {
                project_type: container.project_type,
                valid_parse: container.valid_parse,
                parse_in_progress: container.parse_in_progress,
                target: container.target.clone(),
                bindings: (*container.bindings).clone(),
            },
            children: container
                .children
                .iter()
                .filter_map(|child| capture_node(tree, *child))
                .collect(),
        },
        NodeData::File(file) => SnapshotNode {
            path,
            name,
            detail: SnapshotDetail::File {
                kind: file.kind,
                generated: file.generated,
            },
            children: Vec::new(),
        },
    };
    Some(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ContainerData, FileData};

    #[test]
    fn test_capture_and_find() {
        let mut tree = ProjectTree::new();
        let root = tree.insert(
            None,
            NodeData::Container(ContainerData::new(PathBuf::from("/p/app.pro"))),
        );
        tree.set_root(root);
        let file = tree.insert(
            Some(root),
            NodeData::File(FileData {
                path: PathBuf::from("/p/main.cpp"),
                kind: FileKind::Source,
                generated: false,
            }),
        );
        if let Some(container) = tree.container_mut(root) {
            container.children.push(file);
            container.valid_parse = true;
        }

        let snapshot = TreeSnapshot::capture(&tree);
        assert_eq!(snapshot.node_count(), 2);
        let root_node = snapshot.root.as_ref().unwrap();
        assert_eq!(root_node.name, "app.pro");
        assert!(root_node.is_container());

        let found = snapshot.find(Path::new("/p/main.cpp")).unwrap();
        assert!(!found.is_container());
        match &found.detail {
            SnapshotDetail::File { kind, .. } => assert_eq!(*kind, FileKind::Source),
            SnapshotDetail::Container { .. } => panic!("expected a file node"),
        }
    }

    #[test]
    fn test_serializes_to_json() {
        let mut tree = ProjectTree::new();
        let root = tree.insert(
            None,
            NodeData::Container(ContainerData::new(PathBuf::from("/p/app.pro"))),
        );
        tree.set_root(root);

        let snapshot = TreeSnapshot::capture(&tree);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"app.pro\""));
        assert!(json.contains("Invalid"));
    }
}
