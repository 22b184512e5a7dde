//! Reconciliation of evaluation results into the tree
//!
//! Each pass walks a container's previous child list and the freshly
//! evaluated child set in lockstep by sorted path. Paths only in the old
//! list are removed subtree-first; paths only in the new set are created;
//! paths in both are updated in place so node identity, and with it
//! watcher registrations and observer-held ids, survives the pass. A
//! path can be wanted as a plain file, an included project fragment, or
//! a nested sub-project; the sub-project interpretation wins ties.

use crate::node::{ContainerData, FileData, NodeData, NodeId, ProjectTree, RemovedNode};
use promodel_reader::{EvalOutcome, FileKind, ProData, ProSubtree, ProjectType};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A container whose classification or buildability flipped this pass
#[derive(Debug, Clone)]
pub struct TypeChange {
    pub node: NodeId,
    pub path: PathBuf,
    pub previous: ProjectType,
    pub current: ProjectType,
    pub buildable_changed: bool,
}

/// Everything one reconciliation pass did to the tree
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Any node was created or removed
    pub structure_changed: bool,
    /// Nodes taken out of the tree, bottom-up
    pub removed: Vec<RemovedNode>,
    /// Containers whose payload (and possibly watch set) was replaced
    pub refreshed: Vec<NodeId>,
    pub type_changes: Vec<TypeChange>,
}

/// Fold a freshly read subtree into the tree, creating the root
/// container on first application
pub fn apply(tree: &mut ProjectTree, subtree: &ProSubtree) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    let root_path = subtree.result.path.as_path();

    let root = match tree.root() {
        Some(id) if tree.get(id).is_some_and(|node| node.path() == root_path) => id,
        Some(id) => {
            // the project was re-opened under a different root file
            outcome.removed.extend(tree.remove_subtree(id));
            outcome.structure_changed = true;
            let id = tree.insert(
                None,
                NodeData::Container(ContainerData::new(root_path.to_path_buf())),
            );
            tree.set_root(id);
            id
        }
        None => {
            let id = tree.insert(
                None,
                NodeData::Container(ContainerData::new(root_path.to_path_buf())),
            );
            tree.set_root(id);
            outcome.structure_changed = true;
            id
        }
    };

    apply_node(tree, root, subtree, &mut outcome);
    outcome
}

/// Fold a freshly read subtree in at one existing container, leaving the
/// rest of the tree alone. A result for a node that no longer exists, or
/// whose slot now holds a different path, is dropped.
pub fn apply_at(tree: &mut ProjectTree, id: NodeId, subtree: &ProSubtree) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    match tree.get(id) {
        Some(node) if node.path() == subtree.result.path => {
            apply_node(tree, id, subtree, &mut outcome);
        }
        _ => {
            debug!(
                path = %subtree.result.path.display(),
                "result for a node that left the tree, dropping"
            );
        }
    }
    outcome
}

fn apply_node(
    tree: &mut ProjectTree,
    id: NodeId,
    subtree: &ProSubtree,
    outcome: &mut ReconcileOutcome,
) {
    match subtree.result.outcome {
        // a superseded pass concludes nothing; the follow-up full pass
        // will bring the node up to date
        EvalOutcome::Aborted => {}
        EvalOutcome::Failure => apply_failure(tree, id, outcome),
        EvalOutcome::Ok | EvalOutcome::PartialFailure => apply_data(tree, id, subtree, outcome),
    }
}

/// An unreadable or unparsable project keeps its node, but the node is
/// invalid and everything below it goes away
fn apply_failure(tree: &mut ProjectTree, id: NodeId, outcome: &mut ReconcileOutcome) {
    let Some(container) = tree.container(id) else {
        return;
    };
    let previous_type = container.project_type;
    let previous_buildable = container.is_buildable();
    let path = container.path.clone();
    let children = container.children.clone();

    if !children.is_empty() {
        outcome.structure_changed = true;
    }
    for child in children {
        outcome.removed.extend(tree.remove_subtree(child));
    }

    let Some(container) = tree.container_mut(id) else {
        return;
    };
    container.children.clear();
    container.project_type = ProjectType::Invalid;
    container.valid_parse = false;
    container.parse_in_progress = false;
    container.bindings = Arc::default();
    container.watch_dirs.clear();
    container.includes = BTreeSet::from([path.clone()]);
    container.target = Default::default();
    container.install_rules.clear();
    container.tools.clear();
    let current_buildable = container.is_buildable();

    outcome.refreshed.push(id);
    if previous_type != ProjectType::Invalid || previous_buildable != current_buildable {
        outcome.type_changes.push(TypeChange {
            node: id,
            path,
            previous: previous_type,
            current: ProjectType::Invalid,
            buildable_changed: previous_buildable != current_buildable,
        });
    }
}

fn apply_data(
    tree: &mut ProjectTree,
    id: NodeId,
    subtree: &ProSubtree,
    outcome: &mut ReconcileOutcome,
) {
    let result = &subtree.result;
    let structure: Vec<&ProData> = [result.exact.as_ref(), result.cumulative.as_ref()]
        .into_iter()
        .flatten()
        .collect();
    let Some(primary) = result.primary() else {
        return;
    };

    let desired = desired_children(&result.path, &structure, &subtree.children);
    sweep_children(tree, id, &desired, outcome);

    let (previous_type, previous_buildable) = match tree.container(id) {
        Some(container) => (container.project_type, container.is_buildable()),
        None => return,
    };

    let valid = result.outcome == EvalOutcome::Ok;
    // a degraded pass keeps the last trustworthy classification
    let new_type = if valid || previous_type == ProjectType::Invalid {
        primary.project_type
    } else {
        previous_type
    };

    let mut includes: BTreeSet<PathBuf> = structure
        .iter()
        .flat_map(|data| data.contents.includes.iter().cloned())
        .collect();
    includes.insert(result.path.clone());
    let watch_dirs: BTreeSet<PathBuf> = structure
        .iter()
        .flat_map(|data| data.contents.watch_dirs.iter().cloned())
        .collect();

    let Some(container) = tree.container_mut(id) else {
        return;
    };
    container.project_type = new_type;
    container.valid_parse = valid;
    container.parse_in_progress = false;
    container.bindings = Arc::new(primary.bindings.clone());
    container.includes = includes;
    container.watch_dirs = watch_dirs;
    container.target = primary.contents.target.clone();
    container.install_rules = primary.contents.install_rules.clone();
    container.tools = primary.contents.tools.clone();
    let current_buildable = container.is_buildable();

    outcome.refreshed.push(id);
    if previous_type != new_type || previous_buildable != current_buildable {
        outcome.type_changes.push(TypeChange {
            node: id,
            path: result.path.clone(),
            previous: previous_type,
            current: new_type,
            buildable_changed: previous_buildable != current_buildable,
        });
    }
}

/// What a container should hold at one path
enum Desired<'a> {
    Sub(&'a ProSubtree),
    Include,
    File { kind: FileKind, generated: bool },
}

fn rank(desired: &Desired<'_>) -> u8 {
    match desired {
        Desired::Sub(_) => 2,
        Desired::Include => 1,
        Desired::File { .. } => 0,
    }
}

fn desired_children<'a>(
    own_path: &Path,
    structure: &[&'a ProData],
    children: &'a [ProSubtree],
) -> BTreeMap<&'a Path, Desired<'a>> {
    let mut desired: BTreeMap<&Path, Desired<'_>> = BTreeMap::new();

    // exact entries come first, so a file's precise kind wins over the
    // cumulative approximation
    for data in structure {
        for (path, entry) in &data.contents.files {
            desired.entry(path.as_path()).or_insert(Desired::File {
                kind: entry.kind,
                generated: entry.generated,
            });
        }
        for path in &data.contents.includes {
            upgrade(&mut desired, path.as_path(), Desired::Include);
        }
    }
    for child in children {
        upgrade(&mut desired, child.result.path.as_path(), Desired::Sub(child));
    }

    desired.remove(own_path);
    desired
}

fn upgrade<'a>(map: &mut BTreeMap<&'a Path, Desired<'a>>, path: &'a Path, new: Desired<'a>) {
    match map.get(path) {
        Some(existing) if rank(existing) >= rank(&new) => {}
        _ => {
            map.insert(path, new);
        }
    }
}

/// The lockstep sweep over previous and wanted children, both in path
/// order. Rebuilds the child id list in sorted order as it goes.
fn sweep_children(
    tree: &mut ProjectTree,
    id: NodeId,
    desired: &BTreeMap<&Path, Desired<'_>>,
    outcome: &mut ReconcileOutcome,
) {
    let previous: Vec<(NodeId, PathBuf)> = match tree.container(id) {
        Some(container) => container
            .children
            .iter()
            .filter_map(|child| tree.get(*child).map(|node| (*child, node.path().to_path_buf())))
            .collect(),
        None => return,
    };

    let mut next_children: Vec<NodeId> = Vec::with_capacity(desired.len());
    let mut prev_iter = previous.into_iter().peekable();
    let mut want_iter = desired.iter().peekable();

    loop {
        let order = match (prev_iter.peek(), want_iter.peek()) {
            (None, None) => break,
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (Some((_, prev_path)), Some((want_path, _))) => prev_path.as_path().cmp(want_path),
        };
        match order {
            std::cmp::Ordering::Less => {
                if let Some((prev_id, _)) = prev_iter.next() {
                    outcome.removed.extend(tree.remove_subtree(prev_id));
                    outcome.structure_changed = true;
                }
            }
            std::cmp::Ordering::Greater => {
                if let Some((path, want)) = want_iter.next() {
                    if let Some(created) = create_child(tree, id, path, want, outcome) {
                        next_children.push(created);
                    }
                }
            }
            std::cmp::Ordering::Equal => {
                if let (Some((prev_id, path)), Some((_, want))) =
                    (prev_iter.next(), want_iter.next())
                {
                    if let Some(kept) = update_child(tree, id, prev_id, &path, want, outcome) {
                        next_children.push(kept);
                    }
                }
            }
        }
    }

    if let Some(container) = tree.container_mut(id) {
        container.children = next_children;
    }
}

fn create_child(
    tree: &mut ProjectTree,
    parent: NodeId,
    path: &Path,
    want: &Desired<'_>,
    outcome: &mut ReconcileOutcome,
) -> Option<NodeId> {
    match want {
        Desired::Sub(sub) => {
            if tree.would_cycle(parent, path) {
                debug!(path = %path.display(), "rejecting sub-project that would be its own ancestor");
                return None;
            }
            let id = tree.insert(
                Some(parent),
                NodeData::Container(ContainerData::new(path.to_path_buf())),
            );
            outcome.structure_changed = true;
            apply_node(tree, id, sub, outcome);
            Some(id)
        }
        Desired::Include => {
            let id = tree.insert(
                Some(parent),
                NodeData::File(FileData {
                    path: path.to_path_buf(),
                    kind: FileKind::ProjectInclude,
                    generated: false,
                }),
            );
            outcome.structure_changed = true;
            Some(id)
        }
        Desired::File { kind, generated } => {
            let id = tree.insert(
                Some(parent),
                NodeData::File(FileData {
                    path: path.to_path_buf(),
                    kind: *kind,
                    generated: *generated,
                }),
            );
            outcome.structure_changed = true;
            Some(id)
        }
    }
}

/// Same path on both sides: update in place when the node class matches,
/// otherwise replace the node
fn update_child(
    tree: &mut ProjectTree,
    parent: NodeId,
    id: NodeId,
    path: &Path,
    want: &Desired<'_>,
    outcome: &mut ReconcileOutcome,
) -> Option<NodeId> {
    let is_container = tree.get(id).is_some_and(|node| node.as_container().is_some());
    match (is_container, want) {
        (true, Desired::Sub(sub)) => {
            apply_node(tree, id, sub, outcome);
            Some(id)
        }
        (false, Desired::Include) => {
            if let Some(node) = tree.get_mut(id) {
                if let NodeData::File(file) = &mut node.data {
                    file.kind = FileKind::ProjectInclude;
                    file.generated = false;
                }
            }
            Some(id)
        }
        (false, Desired::File { kind, generated }) => {
            if let Some(node) = tree.get_mut(id) {
                if let NodeData::File(file) = &mut node.data {
                    file.kind = *kind;
                    file.generated = *generated;
                }
            }
            Some(id)
        }
        _ => {
            outcome.removed.extend(tree.remove_subtree(id));
            outcome.structure_changed = true;
            create_child(tree, parent, path, want, outcome)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promodel_reader::{ProContents, ProReadResult, VariableBindings};

    fn data(project_type: ProjectType, contents: ProContents) -> ProData {
        ProData {
            bindings: VariableBindings::new(),
            project_type,
            contents,
        }
    }

    fn ok_result(path: &str, project_type: ProjectType, contents: ProContents) -> ProReadResult {
        ProReadResult {
            path: PathBuf::from(path),
            outcome: EvalOutcome::Ok,
            exact: Some(data(project_type, contents.clone())),
            cumulative: Some(data(project_type, contents)),
            diagnostics: Vec::new(),
        }
    }

    fn leaf(path: &str, project_type: ProjectType, contents: ProContents) -> ProSubtree {
        ProSubtree {
            result: ok_result(path, project_type, contents),
            children: Vec::new(),
        }
    }

    fn with_files(paths: &[&str]) -> ProContents {
        let mut contents = ProContents::default();
        for path in paths {
            contents.files.insert(
                PathBuf::from(path),
                promodel_reader::FileEntry {
                    kind: FileKind::Source,
                    generated: false,
                },
            );
        }
        contents
    }

    #[test]
    fn test_first_apply_builds_tree() {
        let mut tree = ProjectTree::new();
        let subtree = leaf(
            "/p/app.pro",
            ProjectType::Application,
            with_files(&["/p/a.cpp", "/p/b.cpp"]),
        );
        let outcome = apply(&mut tree, &subtree);

        assert!(outcome.structure_changed);
        let root = tree.root().unwrap();
        let container = tree.container(root).unwrap();
        assert_eq!(container.project_type, ProjectType::Application);
        assert!(container.valid_parse);
        assert_eq!(container.children.len(), 2);
        assert_eq!(outcome.type_changes.len(), 1);
        assert_eq!(outcome.type_changes[0].current, ProjectType::Application);
    }

    #[test]
    fn test_reapply_unchanged_is_quiet_and_preserves_ids() {
        let mut tree = ProjectTree::new();
        let subtree = leaf(
            "/p/app.pro",
            ProjectType::Application,
            with_files(&["/p/a.cpp", "/p/b.cpp"]),
        );
        apply(&mut tree, &subtree);
        let root = tree.root().unwrap();
        let before = tree.container(root).unwrap().children.clone();

        let outcome = apply(&mut tree, &subtree);
        assert!(!outcome.structure_changed);
        assert!(outcome.removed.is_empty());
        assert!(outcome.type_changes.is_empty());
        let after = tree.container(root).unwrap().children.clone();
        assert_eq!(before, after);
    }

    #[test]
    fn test_apply_at_updates_one_container_in_place() {
        let mut tree = ProjectTree::new();
        let subtree = ProSubtree {
            result: ok_result("/p/top.pro", ProjectType::SubDirs, ProContents::default()),
            children: vec![leaf(
                "/p/sub/sub.pro",
                ProjectType::Application,
                with_files(&["/p/sub/a.cpp"]),
            )],
        };
        apply(&mut tree, &subtree);
        let root = tree.root().unwrap();
        let sub = tree.container(root).unwrap().children[0];

        let fresh = leaf(
            "/p/sub/sub.pro",
            ProjectType::Application,
            with_files(&["/p/sub/a.cpp", "/p/sub/b.cpp"]),
        );
        let outcome = apply_at(&mut tree, sub, &fresh);

        assert!(outcome.structure_changed);
        assert_eq!(tree.container(sub).unwrap().children.len(), 2);
        assert_eq!(tree.root(), Some(root));
        assert_eq!(tree.container(root).unwrap().children, vec![sub]);
    }

    #[test]
    fn test_apply_at_drops_result_for_reused_slot() {
        let mut tree = ProjectTree::new();
        apply(
            &mut tree,
            &leaf("/p/app.pro", ProjectType::Application, with_files(&["/p/a.cpp"])),
        );
        let root = tree.root().unwrap();
        let file_id = tree.container(root).unwrap().children[0];

        // a result read for a path the node no longer has
        let stale = leaf("/p/other.pro", ProjectType::Application, ProContents::default());
        let outcome = apply_at(&mut tree, file_id, &stale);

        assert!(!outcome.structure_changed);
        assert!(outcome.refreshed.is_empty());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_sweep_removes_and_creates_by_path_order() {
        let mut tree = ProjectTree::new();
        apply(
            &mut tree,
            &leaf(
                "/p/app.pro",
                ProjectType::Application,
                with_files(&["/p/a.cpp", "/p/b.cpp", "/p/d.cpp"]),
            ),
        );
        let root = tree.root().unwrap();
        let keep_a = tree.container(root).unwrap().children[0];

        let outcome = apply(
            &mut tree,
            &leaf(
                "/p/app.pro",
                ProjectType::Application,
                with_files(&["/p/a.cpp", "/p/c.cpp", "/p/d.cpp"]),
            ),
        );
        assert!(outcome.structure_changed);
        assert_eq!(outcome.removed.len(), 1);
        assert_eq!(outcome.removed[0].path, Path::new("/p/b.cpp"));

        let children = &tree.container(root).unwrap().children;
        assert_eq!(children.len(), 3);
        assert_eq!(children[0], keep_a);
        let paths: Vec<&Path> = children
            .iter()
            .map(|id| tree.get(*id).unwrap().path())
            .collect();
        assert_eq!(
            paths,
            vec![
                Path::new("/p/a.cpp"),
                Path::new("/p/c.cpp"),
                Path::new("/p/d.cpp"),
            ]
        );
    }

    #[test]
    fn test_subproject_wins_over_include_at_same_path() {
        let mut tree = ProjectTree::new();
        let mut contents = ProContents::default();
        contents.includes.insert(PathBuf::from("/p/sub/sub.pro"));
        let subtree = ProSubtree {
            result: ok_result("/p/top.pro", ProjectType::SubDirs, contents),
            children: vec![leaf("/p/sub/sub.pro", ProjectType::Library, ProContents::default())],
        };
        apply(&mut tree, &subtree);

        let root = tree.root().unwrap();
        let children = &tree.container(root).unwrap().children;
        assert_eq!(children.len(), 1);
        let child = tree.get(children[0]).unwrap();
        assert!(child.as_container().is_some());
        assert_eq!(
            child.as_container().unwrap().project_type,
            ProjectType::Library
        );
    }

    #[test]
    fn test_failure_tears_down_children_but_keeps_node() {
        let mut tree = ProjectTree::new();
        apply(
            &mut tree,
            &leaf(
                "/p/app.pro",
                ProjectType::Application,
                with_files(&["/p/a.cpp"]),
            ),
        );
        let root = tree.root().unwrap();

        let failed = ProSubtree {
            result: ProReadResult {
                path: PathBuf::from("/p/app.pro"),
                outcome: EvalOutcome::Failure,
                exact: None,
                cumulative: None,
                diagnostics: Vec::new(),
            },
            children: Vec::new(),
        };
        let outcome = apply(&mut tree, &failed);

        assert_eq!(tree.root(), Some(root));
        let container = tree.container(root).unwrap();
        assert_eq!(container.project_type, ProjectType::Invalid);
        assert!(!container.valid_parse);
        assert!(container.children.is_empty());
        assert_eq!(outcome.removed.len(), 1);
        assert_eq!(outcome.type_changes.len(), 1);
        assert_eq!(outcome.type_changes[0].current, ProjectType::Invalid);
    }

    #[test]
    fn test_partial_failure_keeps_previous_type_and_structure() {
        let mut tree = ProjectTree::new();
        apply(
            &mut tree,
            &leaf(
                "/p/app.pro",
                ProjectType::Application,
                with_files(&["/p/a.cpp"]),
            ),
        );
        let root = tree.root().unwrap();

        let degraded = ProSubtree {
            result: ProReadResult {
                path: PathBuf::from("/p/app.pro"),
                outcome: EvalOutcome::PartialFailure,
                exact: None,
                cumulative: Some(data(
                    ProjectType::Invalid,
                    with_files(&["/p/a.cpp", "/p/maybe.cpp"]),
                )),
                diagnostics: Vec::new(),
            },
            children: Vec::new(),
        };
        let outcome = apply(&mut tree, &degraded);

        let container = tree.container(root).unwrap();
        assert_eq!(container.project_type, ProjectType::Application);
        assert!(!container.valid_parse);
        assert_eq!(container.children.len(), 2);

        // buildability flipped off even though the type was kept
        assert_eq!(outcome.type_changes.len(), 1);
        assert!(outcome.type_changes[0].buildable_changed);
        assert_eq!(outcome.type_changes[0].current, ProjectType::Application);
    }

    #[test]
    fn test_aborted_leaves_tree_untouched() {
        let mut tree = ProjectTree::new();
        apply(
            &mut tree,
            &leaf(
                "/p/app.pro",
                ProjectType::Application,
                with_files(&["/p/a.cpp"]),
            ),
        );
        let root = tree.root().unwrap();
        let before = tree.container(root).unwrap().clone();

        let aborted = ProSubtree {
            result: ProReadResult {
                path: PathBuf::from("/p/app.pro"),
                outcome: EvalOutcome::Aborted,
                exact: None,
                cumulative: None,
                diagnostics: Vec::new(),
            },
            children: Vec::new(),
        };
        let outcome = apply(&mut tree, &aborted);
        assert!(!outcome.structure_changed);
        assert!(outcome.refreshed.is_empty());
        let after = tree.container(root).unwrap();
        assert_eq!(after.project_type, before.project_type);
        assert_eq!(after.children, before.children);
        assert!(after.valid_parse);
    }

    #[test]
    fn test_file_kind_updates_in_place() {
        let mut tree = ProjectTree::new();
        let mut contents = ProContents::default();
        contents.files.insert(
            PathBuf::from("/p/notes.txt"),
            promodel_reader::FileEntry {
                kind: FileKind::Other,
                generated: false,
            },
        );
        apply(
            &mut tree,
            &leaf("/p/app.pro", ProjectType::Application, contents),
        );
        let root = tree.root().unwrap();
        let file_id = tree.container(root).unwrap().children[0];

        let mut contents = ProContents::default();
        contents.files.insert(
            PathBuf::from("/p/notes.txt"),
            promodel_reader::FileEntry {
                kind: FileKind::Source,
                generated: true,
            },
        );
        let outcome = apply(
            &mut tree,
            &leaf("/p/app.pro", ProjectType::Application, contents),
        );

        assert!(!outcome.structure_changed);
        let file = tree.get(file_id).unwrap().as_file().unwrap();
        assert_eq!(file.kind, FileKind::Source);
        assert!(file.generated);
    }

    #[test]
    fn test_cycle_creating_child_is_omitted() {
        let mut tree = ProjectTree::new();
        let subtree = ProSubtree {
            result: ok_result("/p/top.pro", ProjectType::SubDirs, ProContents::default()),
            children: vec![leaf("/p/top.pro", ProjectType::SubDirs, ProContents::default())],
        };
        apply(&mut tree, &subtree);
        let root = tree.root().unwrap();
        assert!(tree.container(root).unwrap().children.is_empty());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_nested_subprojects_recurse() {
        let mut tree = ProjectTree::new();
        let inner = leaf(
            "/p/libs/util/util.pro",
            ProjectType::Library,
            with_files(&["/p/libs/util/util.cpp"]),
        );
        let libs = ProSubtree {
            result: ok_result("/p/libs/libs.pro", ProjectType::SubDirs, ProContents::default()),
            children: vec![inner],
        };
        let top = ProSubtree {
            result: ok_result("/p/top.pro", ProjectType::SubDirs, ProContents::default()),
            children: vec![libs],
        };
        apply(&mut tree, &top);

        let root = tree.root().unwrap();
        let libs_id = tree.container(root).unwrap().children[0];
        let util_id = tree.container(libs_id).unwrap().children[0];
        let util = tree.container(util_id).unwrap();
        assert_eq!(util.project_type, ProjectType::Library);
        assert_eq!(util.children.len(), 1);
        assert_eq!(tree.get(util_id).unwrap().parent, Some(libs_id));
    }
}
