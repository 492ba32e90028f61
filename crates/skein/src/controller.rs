//! The node controller.
//!
//! One task per node owns the whole supervision graph and the name
//! registry, and processes an ordered stream of control signals from
//! local processes and the transport. Serial processing is the locking
//! discipline: no other code mutates these maps, so there is no lock
//! ordering to get wrong between monitors, links, and names.
//!
//! Signals for remote entities are framed to the entity's own node:
//! monitors live on the node of the thing being watched, and a
//! cross-node link is recorded on both endpoint nodes, each side
//! keeping the half that touches its local entity.

use crate::closure::{Closure, ProcessBody, Resolved};
use crate::error::Failure;
use crate::node::NodeHandle;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use skein_core::{
    DidSpawn, DidUnlink, DidUnmonitor, ExitReason, Identifier, Message, MonitorNotification,
    MonitorRef, ProcessId, SpawnRef, Term, WhereIsReply,
};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::mpsc;

/// A control signal. Everything that mutates the supervision graph,
/// the registry, or the process table goes through one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Signal {
    /// Install a monitor; the target is inside the reference.
    Monitor {
        /// The process to notify on target death.
        watcher: ProcessId,
        /// The reference minted by the watcher.
        reference: MonitorRef,
    },
    /// Remove a monitor and acknowledge, known reference or not.
    Unmonitor {
        /// The process that installed the monitor.
        watcher: ProcessId,
        /// The reference to remove.
        reference: MonitorRef,
    },
    /// Record a link between `from` and `id`.
    Link {
        /// The linking process.
        from: ProcessId,
        /// The other endpoint.
        id: Identifier,
        /// Set on the copy forwarded to the remote endpoint's node.
        mirrored: bool,
    },
    /// Remove a link and acknowledge, known edge or not.
    Unlink {
        /// The unlinking process.
        from: ProcessId,
        /// The other endpoint.
        id: Identifier,
        /// Set on the copy forwarded to the remote endpoint's node.
        mirrored: bool,
    },
    /// Install (`Some`) or remove (`None`) a registry entry.
    /// Installing over an existing label replaces it.
    Register {
        /// The label.
        label: String,
        /// The process to register, or `None` to unregister.
        pid: Option<ProcessId>,
    },
    /// Look a label up and reply to the requester.
    WhereIs {
        /// Who gets the [`WhereIsReply`].
        from: ProcessId,
        /// The label to look up.
        label: String,
    },
    /// Deliver an envelope to whatever the label names. Unknown labels
    /// drop silently.
    NamedSend {
        /// The label to deliver to.
        label: String,
        /// The envelope.
        message: Message,
    },
    /// Resolve a closure, start the process, and reply with its pid.
    Spawn {
        /// Who gets the [`DidSpawn`] reply.
        from: ProcessId,
        /// The requester's correlation reference.
        reference: SpawnRef,
        /// What to run.
        closure: Closure,
    },
    /// An entity died; walk the graph.
    Died {
        /// The dead entity.
        id: Identifier,
        /// Why it died.
        reason: ExitReason,
    },
}

pub(crate) struct Controller {
    node: NodeHandle,
    /// Target -> monitors installed on it. Duplicates are distinct
    /// entries and each gets its own notification.
    monitors: HashMap<Identifier, Vec<(MonitorRef, ProcessId)>>,
    /// Symmetric link adjacency; every edge appears under both
    /// endpoints.
    links: HashMap<Identifier, HashSet<Identifier>>,
    /// The name registry.
    names: HashMap<String, ProcessId>,
    /// Inverse of `names`, so a death removes all its labels.
    names_by_pid: HashMap<ProcessId, HashSet<String>>,
}

impl Controller {
    pub(crate) fn new(node: NodeHandle) -> Self {
        Self {
            node,
            monitors: HashMap::new(),
            links: HashMap::new(),
            names: HashMap::new(),
            names_by_pid: HashMap::new(),
        }
    }

    pub(crate) async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Signal>) {
        while let Some(signal) = inbox.recv().await {
            self.handle(signal).await;
        }
    }

    async fn handle(&mut self, signal: Signal) {
        match signal {
            Signal::Monitor { watcher, reference } => {
                let id = reference.id();
                if self.entity_alive(id) {
                    self.monitors.entry(id).or_default().push((reference, watcher));
                } else {
                    self.notify(
                        watcher,
                        &MonitorNotification {
                            reference,
                            id,
                            reason: ExitReason::UnknownEntity,
                        },
                    )
                    .await;
                }
            }
            Signal::Unmonitor { watcher, reference } => {
                let key = reference.id();
                let now_empty = match self.monitors.get_mut(&key) {
                    Some(entries) => {
                        entries.retain(|(r, _)| *r != reference);
                        entries.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    self.monitors.remove(&key);
                }
                // The ack goes out even for references we never saw.
                self.notify(watcher, &DidUnmonitor { reference }).await;
            }
            Signal::Link { from, id, mirrored } => {
                self.add_edge(Identifier::Process(from), id);
                let target_node = id.node_id();
                if target_node == self.node.node_id() {
                    if !self.entity_alive(id) {
                        // Linking to the already-dead propagates at once.
                        self.run_death(id, ExitReason::UnknownEntity).await;
                    }
                } else if !mirrored {
                    let _ = self
                        .node
                        .route_signal(target_node, Signal::Link { from, id, mirrored: true })
                        .await;
                }
            }
            Signal::Unlink { from, id, mirrored } => {
                self.remove_edge(Identifier::Process(from), id);
                if !mirrored {
                    let target_node = id.node_id();
                    if target_node != self.node.node_id() {
                        let _ = self
                            .node
                            .route_signal(target_node, Signal::Unlink { from, id, mirrored: true })
                            .await;
                    }
                    self.notify(from, &DidUnlink { id }).await;
                }
            }
            Signal::Register { label, pid } => match pid {
                Some(pid) => {
                    if let Some(previous) = self.names.insert(label.clone(), pid) {
                        if let Some(labels) = self.names_by_pid.get_mut(&previous) {
                            labels.remove(&label);
                        }
                    }
                    self.names_by_pid.entry(pid).or_default().insert(label);
                }
                None => {
                    if let Some(previous) = self.names.remove(&label) {
                        if let Some(labels) = self.names_by_pid.get_mut(&previous) {
                            labels.remove(&label);
                        }
                    }
                }
            },
            Signal::WhereIs { from, label } => {
                let pid = self.names.get(&label).copied();
                self.notify(from, &WhereIsReply { label, pid }).await;
            }
            Signal::NamedSend { label, message } => match self.names.get(&label) {
                Some(pid) => self.node.route_envelope(*pid, message).await,
                None => tracing::debug!(%label, "dropping named send to unknown label"),
            },
            Signal::Spawn {
                from,
                reference,
                closure,
            } => {
                let label = closure.label().to_string();
                let body: ProcessBody = match self
                    .node
                    .resolver()
                    .resolve(closure.label(), closure.env())
                {
                    Some(Resolved::Process(body)) => body,
                    Some(Resolved::Value(_)) | None => {
                        // The requester still gets a pid; the stub dies
                        // with the resolution error so monitors see it.
                        tracing::warn!(%label, "spawn of unresolvable closure");
                        Box::new(move |_ctx| -> BoxFuture<'static, crate::ProcessResult> {
                            async move { Err(Failure::UnresolvedClosure(label)) }.boxed()
                        })
                    }
                };
                let pid = self.node.spawn_boxed(body);
                self.notify(from, &DidSpawn { reference, pid }).await;
            }
            Signal::Died { id, reason } => {
                self.run_death(id, reason).await;
            }
        }
    }

    fn entity_alive(&self, id: Identifier) -> bool {
        let local = id.node_id() == self.node.node_id();
        match id {
            Identifier::Process(pid) => !local || self.node.alive(pid),
            // Nodes are presumed up until the transport says otherwise.
            Identifier::Node(_) => true,
            Identifier::Port(spid) => !local || self.node.has_sink(spid),
        }
    }

    async fn notify<M: Term>(&self, to: ProcessId, msg: &M) {
        self.node.route_envelope(to, Message::create(msg)).await;
    }

    fn add_edge(&mut self, a: Identifier, b: Identifier) {
        self.links.entry(a).or_default().insert(b);
        self.links.entry(b).or_default().insert(a);
    }

    fn remove_edge(&mut self, a: Identifier, b: Identifier) {
        for (x, y) in [(a, b), (b, a)] {
            let now_empty = match self.links.get_mut(&x) {
                Some(set) => {
                    set.remove(&y);
                    set.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.links.remove(&x);
            }
        }
    }

    /// Walks the graph for a death and every death it causes.
    async fn run_death(&mut self, id: Identifier, reason: ExitReason) {
        let mut work = VecDeque::new();
        work.push_back((id, reason));
        while let Some((id, reason)) = work.pop_front() {
            self.one_death(id, reason, &mut work).await;
        }
    }

    async fn one_death(
        &mut self,
        id: Identifier,
        reason: ExitReason,
        work: &mut VecDeque<(Identifier, ExitReason)>,
    ) {
        let local = id.node_id() == self.node.node_id();
        let down_node = match id {
            Identifier::Node(nid) => Some(nid),
            _ => None,
        };

        // Everything that dies together with this entity.
        let mut dead = vec![id];
        match id {
            Identifier::Process(pid) => {
                if local {
                    self.node.remove_process(pid);
                    for spid in self.node.remove_sinks_of(pid) {
                        dead.push(Identifier::Port(spid));
                    }
                }
                if let Some(labels) = self.names_by_pid.remove(&pid) {
                    for label in labels {
                        self.names.remove(&label);
                    }
                }
            }
            Identifier::Node(nid) => {
                // Every entity of that node we know anything about.
                let mut on_node: HashSet<Identifier> = HashSet::new();
                on_node.extend(self.monitors.keys().copied().filter(|k| k.node_id() == nid));
                on_node.extend(self.links.keys().copied().filter(|k| k.node_id() == nid));
                on_node.remove(&id);
                dead.extend(on_node);
                // And its registrations.
                self.names.retain(|_, pid| pid.node() != nid);
                self.names_by_pid.retain(|pid, _| pid.node() != nid);
            }
            Identifier::Port(spid) => {
                if local {
                    self.node.remove_sink(spid);
                }
            }
        }

        for d in dead {
            if let Some(watchers) = self.monitors.remove(&d) {
                for (reference, watcher) in watchers {
                    self.notify(
                        watcher,
                        &MonitorNotification {
                            reference,
                            id: d,
                            reason: reason.clone(),
                        },
                    )
                    .await;
                }
            }

            if let Some(partners) = self.links.remove(&d) {
                for partner in partners {
                    let now_empty = match self.links.get_mut(&partner) {
                        Some(set) => {
                            set.remove(&d);
                            set.is_empty()
                        }
                        None => false,
                    };
                    if now_empty {
                        self.links.remove(&partner);
                    }
                    if let Identifier::Process(p) = partner {
                        if p.node() == self.node.node_id() {
                            if self.node.kill_process(p) {
                                work.push_back((partner, ExitReason::Linked(d)));
                            }
                        } else if Some(p.node()) != down_node {
                            // The partner's own node propagates from its
                            // half of the edge.
                            let _ = self
                                .node
                                .route_signal(
                                    p.node(),
                                    Signal::Died {
                                        id: d,
                                        reason: reason.clone(),
                                    },
                                )
                                .await;
                        }
                    }
                }
            }

            // Monitors held by a dead process will never be consumed.
            if let Identifier::Process(p) = d {
                self.monitors.retain(|_, entries| {
                    entries.retain(|(_, watcher)| *watcher != p);
                    !entries.is_empty()
                });
            }
        }
    }
}
