//! Build-target and deployment projections over the tree
//!
//! Pure reads against the current [`ProjectTree`]; the coordinator
//! answers the corresponding queries by calling these between passes.

use promodel_tree::{NodeId, ProjectTree};
use serde::Serialize;
use std::path::PathBuf;

/// Where one buildable node's artifact lands and runs
#[derive(Debug, Clone, Serialize)]
pub struct TargetInformation {
    pub node: NodeId,
    /// The project file the target comes from
    pub path: PathBuf,
    /// TARGET value, already defaulted to the file stem during evaluation
    pub target: String,
    pub destdir: Option<PathBuf>,
    /// OBJECTS_DIR, falling back to the project file's directory
    pub build_dir: PathBuf,
    /// Where the artifact is expected to run: DESTDIR, falling back to
    /// the project file's directory
    pub working_dir: PathBuf,
}

/// One file an install rule deploys
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentEntry {
    pub source: PathBuf,
    pub target_path: String,
    /// The INSTALLS rule the entry came from
    pub rule: String,
}

/// Targets for every buildable container, in path order
pub fn target_information(tree: &ProjectTree) -> Vec<TargetInformation> {
    let mut targets: Vec<TargetInformation> = tree
        .containers()
        .filter(|(_, container)| container.is_buildable())
        .map(|(id, container)| {
            let project_dir = container
                .path
                .parent()
                .map(|dir| dir.to_path_buf())
                .unwrap_or_default();
            TargetInformation {
                node: id,
                path: container.path.clone(),
                target: container.target.name.clone(),
                destdir: container.target.destdir.clone(),
                build_dir: container
                    .target
                    .objects_dir
                    .clone()
                    .unwrap_or_else(|| project_dir.clone()),
                working_dir: container
                    .target
                    .destdir
                    .clone()
                    .unwrap_or(project_dir),
            }
        })
        .collect();
    targets.sort_by(|a, b| a.path.cmp(&b.path));
    targets
}

/// Flattens every install rule that names a destination, in path order.
/// Rules without a `.path` entry install nowhere and are skipped.
pub fn deployment_data(tree: &ProjectTree) -> Vec<DeploymentEntry> {
    let mut entries = Vec::new();
    let mut containers: Vec<_> = tree.containers().collect();
    containers.sort_by(|(_, a), (_, b)| a.path.cmp(&b.path));
    for (_, container) in containers {
        for rule in &container.install_rules {
            let Some(target_path) = &rule.target_path else {
                continue;
            };
            for file in &rule.files {
                entries.push(DeploymentEntry {
                    source: file.clone(),
                    target_path: target_path.clone(),
                    rule: rule.name.clone(),
                });
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use promodel_reader::{InstallRule, ProjectType, TargetDescription};
    use promodel_tree::{ContainerData, NodeData};

    fn buildable(path: &str, target: &str) -> ContainerData {
        let mut container = ContainerData::new(PathBuf::from(path));
        container.project_type = ProjectType::Application;
        container.valid_parse = true;
        container.target = TargetDescription {
            name: target.to_string(),
            destdir: None,
            objects_dir: None,
        };
        container
    }

    #[test]
    fn test_targets_cover_only_buildable_containers() {
        let mut tree = ProjectTree::new();
        let root = tree.insert(
            None,
            NodeData::Container({
                let mut top = ContainerData::new(PathBuf::from("/p/top.pro"));
                top.project_type = ProjectType::SubDirs;
                top.valid_parse = true;
                top
            }),
        );
        tree.set_root(root);
        let app = tree.insert(
            Some(root),
            NodeData::Container(buildable("/p/app/app.pro", "app")),
        );
        let broken = tree.insert(Some(root), {
            let mut lib = buildable("/p/lib/lib.pro", "core");
            lib.valid_parse = false;
            NodeData::Container(lib)
        });
        tree.container_mut(root).unwrap().children = vec![app, broken];

        let targets = target_information(&tree);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].node, app);
        assert_eq!(targets[0].target, "app");
    }

    #[test]
    fn test_target_directories_fall_back_to_the_project_directory() {
        let mut tree = ProjectTree::new();
        let id = tree.insert(
            None,
            NodeData::Container(buildable("/p/app/app.pro", "app")),
        );
        tree.set_root(id);

        let targets = target_information(&tree);
        assert_eq!(targets[0].build_dir, PathBuf::from("/p/app"));
        assert_eq!(targets[0].working_dir, PathBuf::from("/p/app"));
        assert_eq!(targets[0].destdir, None);
    }

    #[test]
    fn test_destdir_and_objects_dir_override_the_fallbacks() {
        let mut tree = ProjectTree::new();
        let mut container = buildable("/p/app/app.pro", "app");
        container.target.destdir = Some(PathBuf::from("/p/bin"));
        container.target.objects_dir = Some(PathBuf::from("/p/build/app"));
        let id = tree.insert(None, NodeData::Container(container));
        tree.set_root(id);

        let targets = target_information(&tree);
        assert_eq!(targets[0].build_dir, PathBuf::from("/p/build/app"));
        assert_eq!(targets[0].working_dir, PathBuf::from("/p/bin"));
        assert_eq!(targets[0].destdir, Some(PathBuf::from("/p/bin")));
    }

    #[test]
    fn test_deployment_skips_rules_without_a_destination() {
        let mut tree = ProjectTree::new();
        let mut container = buildable("/p/app/app.pro", "app");
        container.install_rules = vec![
            InstallRule {
                name: "docs".to_string(),
                files: vec![
                    PathBuf::from("/p/app/readme.txt"),
                    PathBuf::from("/p/app/manual.pdf"),
                ],
                target_path: Some("/usr/share/doc".to_string()),
            },
            InstallRule {
                name: "extras".to_string(),
                files: vec![PathBuf::from("/p/app/extra.dat")],
                target_path: None,
            },
        ];
        let id = tree.insert(None, NodeData::Container(container));
        tree.set_root(id);

        let entries = deployment_data(&tree);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|entry| entry.rule == "docs"));
        assert!(entries
            .iter()
            .all(|entry| entry.target_path == "/usr/share/doc"));
    }
}
