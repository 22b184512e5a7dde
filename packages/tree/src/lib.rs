//! The live project tree and its reconciler
//!
//! An arena of container and file nodes mirrors the build description's
//! structure. Reconciliation folds freshly evaluated results in with
//! minimal churn: unchanged paths keep their node ids, so watcher
//! registrations and observer references stay valid across passes.

pub mod node;
pub mod reconcile;
pub mod snapshot;

pub use node::{
    ContainerData, FileData, Node, NodeData, NodeId, ProjectTree, RemovedNode,
};
pub use reconcile::{apply, apply_at, ReconcileOutcome, TypeChange};
pub use snapshot::{SnapshotDetail, SnapshotNode, TreeSnapshot};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_crate_surface() {
        let mut tree = ProjectTree::new();
        let id = tree.insert(
            None,
            NodeData::Container(ContainerData::new(PathBuf::from("/p/app.pro"))),
        );
        tree.set_root(id);
        assert_eq!(TreeSnapshot::capture(&tree).node_count(), 1);
    }
}
