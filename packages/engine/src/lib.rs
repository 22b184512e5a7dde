//! Incremental project engine
//!
//! Keeps a live [`tree`](promodel_tree) of an open project and re-reads
//! exactly as much of it as filesystem activity demands. One coordinator
//! task owns all state; callers talk to it through the [`Project`]
//! handle and observe it through snapshots and broadcast events.

pub mod error;
pub mod project;
pub mod scheduler;
pub mod targets;
pub mod watcher;

pub use error::{ProjectError, ProjectResult, WatchError, WatchResult};
pub use project::{Project, ProjectConfig, ProjectEvent};
pub use scheduler::SchedulerPhase;
pub use targets::{DeploymentEntry, TargetInformation};
pub use watcher::{FolderChange, FolderWatcher, NotifyBackend, WatchBackend};
