//! The evaluation scheduler
//!
//! A pure state machine deciding when evaluation passes run. Change
//! requests accumulate behind a debounce window that restarts on every
//! request; a project-wide request discards any partial set; a request
//! landing mid-pass cancels the pass and queues a full one in its
//! place. The machine never touches a clock or a timer itself: callers
//! feed it the current instant and sleep until [`Scheduler::next_deadline`].

use promodel_tree::{NodeId, ProjectTree};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Externally visible scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Base,
    PartialUpdatePending,
    FullUpdatePending,
    InProgress,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Full,
    Partial,
}

/// One evaluation root within a pass; one background task each
#[derive(Debug, Clone)]
pub struct EvalRoot {
    /// The node being refreshed; None on the very first pass, before
    /// the tree has a root
    pub node: Option<NodeId>,
    pub path: PathBuf,
}

/// A pass the coordinator must now start
pub struct Dispatch {
    pub generation: u64,
    pub cancel: Arc<AtomicBool>,
    pub kind: PassKind,
    pub roots: Vec<EvalRoot>,
}

/// What one task completion meant to the pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Tasks remain outstanding
    Pending,
    /// The pass finished; the scheduler is back at Base
    Finished,
    /// The pass drained after being cancelled; a full pass is pending
    Superseded,
    /// The last task of a shutdown drain finished
    Drained,
    /// A completion for a generation that is not the current one
    Stale,
}

struct Flight {
    generation: u64,
    cancel: Arc<AtomicBool>,
    outstanding: usize,
    /// A request arrived mid-pass: the pass is cancelled and a full
    /// pass takes over once it drains
    rerun: bool,
}

impl Flight {
    fn cancel_and_rerun(&mut self) {
        if !self.rerun {
            debug!(
                generation = self.generation,
                "request mid-pass, cancelling for a fresh full pass"
            );
        }
        self.rerun = true;
        self.cancel.store(true, Ordering::Relaxed);
    }
}

enum State {
    Base,
    PartialPending {
        nodes: BTreeSet<NodeId>,
        deadline: Instant,
    },
    FullPending {
        deadline: Instant,
    },
    InProgress(Flight),
    ShuttingDown {
        flight: Option<Flight>,
    },
}

pub struct Scheduler {
    root_file: PathBuf,
    debounce: Duration,
    state: State,
    next_generation: u64,
}

impl Scheduler {
    pub fn new(root_file: PathBuf, debounce: Duration) -> Self {
        Self {
            root_file,
            debounce,
            state: State::Base,
            next_generation: 1,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        match &self.state {
            State::Base => SchedulerPhase::Base,
            State::PartialPending { .. } => SchedulerPhase::PartialUpdatePending,
            State::FullPending { .. } => SchedulerPhase::FullUpdatePending,
            State::InProgress(_) => SchedulerPhase::InProgress,
            State::ShuttingDown { .. } => SchedulerPhase::ShuttingDown,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Base)
    }

    /// True once shutdown has begun and every task has drained
    pub fn is_drained(&self) -> bool {
        matches!(self.state, State::ShuttingDown { flight: None })
    }

    /// Asks for a refresh of one node's subtree. The pending set keeps
    /// only subtree roots: a pending ancestor absorbs the request, and
    /// the request drops any pending descendants.
    pub fn request_partial(&mut self, tree: &ProjectTree, node: NodeId, now: Instant) {
        match &mut self.state {
            State::Base => {
                self.state = State::PartialPending {
                    nodes: BTreeSet::from([node]),
                    deadline: now + self.debounce,
                };
            }
            State::PartialPending { nodes, deadline } => {
                merge_pending(tree, nodes, node);
                *deadline = now + self.debounce;
            }
            State::FullPending { deadline } => {
                // the full pass already covers the node; just wait for quiet
                *deadline = now + self.debounce;
            }
            State::InProgress(flight) => flight.cancel_and_rerun(),
            State::ShuttingDown { .. } => debug!("request during shutdown ignored"),
        }
    }

    /// Asks for a refresh of the whole tree, superseding any partial set
    pub fn request_full(&mut self, now: Instant) {
        match &mut self.state {
            State::Base | State::PartialPending { .. } | State::FullPending { .. } => {
                self.state = State::FullPending {
                    deadline: now + self.debounce,
                };
            }
            State::InProgress(flight) => flight.cancel_and_rerun(),
            State::ShuttingDown { .. } => debug!("request during shutdown ignored"),
        }
    }

    /// When the running debounce window closes, if one is running
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.state {
            State::PartialPending { deadline, .. } | State::FullPending { deadline } => {
                Some(*deadline)
            }
            _ => None,
        }
    }

    /// Starts a pass once the debounce window has elapsed
    pub fn poll(&mut self, tree: &ProjectTree, now: Instant) -> Option<Dispatch> {
        match &self.state {
            State::PartialPending { deadline, .. } | State::FullPending { deadline }
                if *deadline <= now => {}
            _ => return None,
        }

        let state = std::mem::replace(&mut self.state, State::Base);
        match state {
            State::PartialPending { nodes, .. } => {
                let roots: Vec<EvalRoot> = nodes
                    .iter()
                    .filter_map(|id| {
                        tree.get(*id).map(|node| EvalRoot {
                            node: Some(*id),
                            path: node.path().to_path_buf(),
                        })
                    })
                    .collect();
                if roots.is_empty() {
                    debug!("every pending node left the tree, nothing to do");
                    return None;
                }
                Some(self.begin(PassKind::Partial, roots))
            }
            State::FullPending { .. } => {
                let roots = vec![EvalRoot {
                    node: tree.root(),
                    path: self.root_file.clone(),
                }];
                Some(self.begin(PassKind::Full, roots))
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    fn begin(&mut self, kind: PassKind, roots: Vec<EvalRoot>) -> Dispatch {
        let generation = self.next_generation;
        self.next_generation += 1;
        let cancel = Arc::new(AtomicBool::new(false));
        debug!(generation, tasks = roots.len(), ?kind, "starting evaluation pass");
        self.state = State::InProgress(Flight {
            generation,
            cancel: Arc::clone(&cancel),
            outstanding: roots.len(),
            rerun: false,
        });
        Dispatch {
            generation,
            cancel,
            kind,
            roots,
        }
    }

    /// Whether results from pass `generation` may still be folded into
    /// the tree. False once the pass was cancelled or superseded.
    pub fn should_apply(&self, generation: u64) -> bool {
        matches!(
            &self.state,
            State::InProgress(flight) if flight.generation == generation && !flight.rerun
        )
    }

    /// Accounts for one finished task of pass `generation`
    pub fn task_completed(&mut self, generation: u64, now: Instant) -> Completion {
        match &mut self.state {
            State::InProgress(flight) if flight.generation == generation => {
                flight.outstanding = flight.outstanding.saturating_sub(1);
                if flight.outstanding > 0 {
                    return Completion::Pending;
                }
                if flight.rerun {
                    // a cancelled pass always hands over to a fresh full pass
                    self.state = State::FullPending {
                        deadline: now + self.debounce,
                    };
                    Completion::Superseded
                } else {
                    self.state = State::Base;
                    Completion::Finished
                }
            }
            State::ShuttingDown { flight } => {
                match flight {
                    Some(inner) if inner.generation == generation => {
                        inner.outstanding = inner.outstanding.saturating_sub(1);
                        if inner.outstanding == 0 {
                            *flight = None;
                            return Completion::Drained;
                        }
                        Completion::Pending
                    }
                    _ => Completion::Stale,
                }
            }
            _ => {
                debug!(generation, "completion from a stale pass");
                Completion::Stale
            }
        }
    }

    /// Stops accepting requests and cancels any running pass; the
    /// coordinator keeps draining completions until [`Self::is_drained`]
    pub fn begin_shutdown(&mut self) {
        let state = std::mem::replace(&mut self.state, State::ShuttingDown { flight: None });
        match state {
            State::InProgress(flight) => {
                flight.cancel.store(true, Ordering::Relaxed);
                self.state = State::ShuttingDown {
                    flight: Some(flight),
                };
            }
            State::ShuttingDown { flight } => {
                self.state = State::ShuttingDown { flight };
            }
            _ => {}
        }
    }

    #[cfg(test)]
    fn pending_nodes(&self) -> Option<&BTreeSet<NodeId>> {
        match &self.state {
            State::PartialPending { nodes, .. } => Some(nodes),
            _ => None,
        }
    }
}

/// Folds `new` into the pending set under ancestor/descendant
/// containment: an ancestor already pending absorbs it, and it drops
/// any pending descendants of its own.
fn merge_pending(tree: &ProjectTree, nodes: &mut BTreeSet<NodeId>, new: NodeId) {
    if nodes.contains(&new) || tree.ancestors(new).any(|ancestor| nodes.contains(&ancestor)) {
        return;
    }
    let dropped: Vec<NodeId> = nodes
        .iter()
        .copied()
        .filter(|pending| tree.ancestors(*pending).any(|ancestor| ancestor == new))
        .collect();
    for node in dropped {
        debug!(?node, "pending update superseded by its ancestor");
        nodes.remove(&node);
    }
    nodes.insert(new);
}
