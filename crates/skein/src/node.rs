//! The node: process table, spawn path, and message routing.
//!
//! A [`Node`] owns everything shared across its processes: the table of
//! live mailboxes, the table of live typed-channel write ends, the
//! controller inbox, and the transport and resolver collaborators.
//! [`NodeHandle`] is the cloneable view used by processes, the
//! controller, and the transport driver.
//!
//! Deliveries write straight to the destination mailbox or channel;
//! only supervision, registry, and spawn traffic serializes through the
//! controller.

use crate::closure::{ProcessBody, Resolver};
use crate::context::Context;
use crate::controller::{Controller, Signal};
use crate::error::ProcessResult;
use crate::transport::{Frame, Transport, TransportError};
use dashmap::DashMap;
use futures::FutureExt;
use skein_core::{
    DecodeError, ExitReason, Identifier, Message, NodeId, ProcessId, SendPortId, Term,
};
use skein_runtime::{Mailbox, MailboxSender};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

/// One live process, as seen from outside its task.
struct ProcessRecord {
    sender: MailboxSender,
    abort: AbortHandle,
}

/// The type-erased write end of a typed channel: a typed fast path for
/// local senders and a fingerprint-checked envelope path for wire
/// deliveries.
pub(crate) struct ChannelSink {
    typed: Box<dyn Any + Send + Sync>,
    wire: Box<dyn Fn(&Message) -> Result<(), DecodeError> + Send + Sync>,
}

struct NodeInner {
    id: NodeId,
    processes: DashMap<ProcessId, ProcessRecord>,
    sinks: DashMap<SendPortId, ChannelSink>,
    ctrl: mpsc::UnboundedSender<Signal>,
    next_pid: AtomicU64,
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn Resolver>,
}

/// A running node. Dropping the `Node` does not stop its processes;
/// they hold handles of their own.
pub struct Node {
    handle: NodeHandle,
}

impl Node {
    /// Starts a node with the given identity and collaborators. The
    /// controller task starts immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(id: NodeId, transport: Arc<dyn Transport>, resolver: Arc<dyn Resolver>) -> Self {
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let handle = NodeHandle {
            inner: Arc::new(NodeInner {
                id,
                processes: DashMap::new(),
                sinks: DashMap::new(),
                ctrl: ctrl_tx,
                next_pid: AtomicU64::new(0),
                transport,
                resolver,
            }),
        };
        tokio::spawn(Controller::new(handle.clone()).run(ctrl_rx));
        tracing::debug!(node = %id, "node started");
        Self { handle }
    }

    /// Starts a node with no reachable peers and an empty closure
    /// table. Enough for purely local process networks.
    pub fn single(id: NodeId) -> Self {
        Self::new(
            id,
            Arc::new(crate::transport::NullTransport),
            Arc::new(crate::closure::StaticTable::new()),
        )
    }

    /// A cloneable handle to this node.
    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }
}

/// A cloneable handle to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    inner: Arc<NodeInner>,
}

impl NodeHandle {
    /// This node's identity.
    pub fn node_id(&self) -> NodeId {
        self.inner.id
    }

    /// Spawns a process running `f` and returns its pid.
    pub fn spawn<F, Fut>(&self, f: F) -> ProcessId
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = ProcessResult> + Send + 'static,
    {
        self.spawn_boxed(Box::new(move |ctx| f(ctx).boxed()))
    }

    pub(crate) fn spawn_boxed(&self, body: ProcessBody) -> ProcessId {
        let pid = ProcessId::new(self.inner.id, self.inner.next_pid.fetch_add(1, Ordering::Relaxed));
        let (mailbox, sender) = Mailbox::new();
        let ctx = Context::new(pid, self.clone(), mailbox);

        // The task starts only once its record is registered, so a body
        // that returns immediately still dies with its record in place.
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _ = release_rx.await;
            match body(ctx).await {
                Ok(()) => ExitReason::Normal,
                Err(failure) => failure.exit_reason(),
            }
        });

        self.inner.processes.insert(
            pid,
            ProcessRecord {
                sender,
                abort: task.abort_handle(),
            },
        );
        let _ = release_tx.send(());

        // The watcher reports the death to the controller. An aborted
        // task is someone else's kill; the killer reports that one.
        let watcher = self.clone();
        tokio::spawn(async move {
            let reason = match task.await {
                Ok(reason) => reason,
                Err(err) if err.is_panic() => {
                    let panic = err.into_panic();
                    let text = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "process panicked".to_string());
                    ExitReason::Error(text)
                }
                Err(_) => return,
            };
            tracing::debug!(%pid, %reason, "process exited");
            watcher.signal_local(Signal::Died {
                id: Identifier::Process(pid),
                reason,
            });
        });

        pid
    }

    /// Whether `pid` is a live process on this node.
    pub fn alive(&self, pid: ProcessId) -> bool {
        self.inner.processes.contains_key(&pid)
    }

    /// Sends a typed message to a process, local or remote.
    pub async fn send<M: Term>(&self, to: ProcessId, msg: &M) {
        self.route_envelope(to, Message::create(msg)).await;
    }

    /// Hands a received wire frame to this node. This is the incoming
    /// half of the transport contract: the transport driver calls it
    /// once per frame, in per-sender order.
    pub fn deliver(&self, bytes: &[u8]) {
        match Frame::decode(bytes) {
            Ok(Frame::ToProcess { to, message }) => self.deliver_local(to, message),
            Ok(Frame::ToPort { to, message }) => self.deliver_port_local(to, &message),
            Ok(Frame::Control(signal)) => self.signal_local(signal),
            Err(err) => tracing::warn!(%err, "dropping undecodable frame"),
        }
    }

    pub(crate) fn signal_local(&self, signal: Signal) {
        let _ = self.inner.ctrl.send(signal);
    }

    pub(crate) async fn route_frame(
        &self,
        node: NodeId,
        frame: Frame,
    ) -> Result<(), TransportError> {
        let bytes = frame.encode()?;
        match self.inner.transport.send_to(node, bytes).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // An unreachable node is a dead node as far as the
                // supervision graph is concerned.
                tracing::warn!(%node, %err, "transport failure, treating node as down");
                self.signal_local(Signal::Died {
                    id: Identifier::Node(node),
                    reason: ExitReason::Disconnect,
                });
                Err(err)
            }
        }
    }

    /// Routes a control signal to `node`'s controller: straight onto
    /// the local inbox, or framed over the transport.
    pub(crate) async fn route_signal(
        &self,
        node: NodeId,
        signal: Signal,
    ) -> Result<(), TransportError> {
        if node == self.inner.id {
            self.signal_local(signal);
            Ok(())
        } else {
            self.route_frame(node, Frame::Control(signal)).await
        }
    }

    /// Delivers an envelope to a process mailbox, local or remote.
    /// Delivery is at-most-once: unknown or dead targets drop.
    pub(crate) async fn route_envelope(&self, to: ProcessId, message: Message) {
        if to.node() == self.inner.id {
            self.deliver_local(to, message);
        } else {
            let _ = self.route_frame(to.node(), Frame::ToProcess { to, message }).await;
        }
    }

    pub(crate) fn deliver_local(&self, to: ProcessId, message: Message) {
        match self.inner.processes.get(&to) {
            Some(record) => {
                record.sender.send(message);
            }
            None => tracing::debug!(%to, "dropping message for unknown process"),
        }
    }

    /// Delivers an envelope to a remote typed channel.
    pub(crate) async fn route_port_envelope(&self, to: SendPortId, message: Message) {
        let _ = self
            .route_frame(to.process().node(), Frame::ToPort { to, message })
            .await;
    }

    pub(crate) fn deliver_port_local(&self, to: SendPortId, message: &Message) {
        match self.inner.sinks.get(&to) {
            Some(sink) => {
                if let Err(err) = (sink.wire)(message) {
                    // A fingerprint this channel does not carry: the
                    // schemas disagree, discard rather than decode garbage.
                    tracing::warn!(%to, %err, "discarding channel delivery");
                }
            }
            None => tracing::debug!(%to, "dropping delivery for unknown channel"),
        }
    }

    pub(crate) fn register_sink<T: Term>(&self, id: SendPortId, tx: mpsc::UnboundedSender<T>) {
        let wire_tx = tx.clone();
        self.inner.sinks.insert(
            id,
            ChannelSink {
                typed: Box::new(tx),
                wire: Box::new(move |message| {
                    let value = message.decode::<T>()?;
                    let _ = wire_tx.send(value);
                    Ok(())
                }),
            },
        );
    }

    pub(crate) fn send_chan_local<T: Term>(&self, id: SendPortId, value: T) {
        match self.inner.sinks.get(&id) {
            Some(sink) => match sink.typed.downcast_ref::<mpsc::UnboundedSender<T>>() {
                Some(tx) => {
                    let _ = tx.send(value);
                }
                None => tracing::warn!(%id, "discarding channel send of mismatched type"),
            },
            None => tracing::debug!(%id, "dropping send to unknown channel"),
        }
    }

    pub(crate) fn has_sink(&self, id: SendPortId) -> bool {
        self.inner.sinks.contains_key(&id)
    }

    pub(crate) fn remove_sink(&self, id: SendPortId) {
        self.inner.sinks.remove(&id);
    }

    /// Drops every channel owned by `pid`, returning their identities
    /// so the controller can notify port monitors.
    pub(crate) fn remove_sinks_of(&self, pid: ProcessId) -> Vec<SendPortId> {
        let owned: Vec<SendPortId> = self
            .inner
            .sinks
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| id.process() == pid)
            .collect();
        for id in &owned {
            self.inner.sinks.remove(id);
        }
        owned
    }

    pub(crate) fn remove_process(&self, pid: ProcessId) -> bool {
        self.inner.processes.remove(&pid).is_some()
    }

    /// Removes and cancels a process. The cancellation lands at the
    /// task's next suspension point. Returns whether it was alive.
    pub(crate) fn kill_process(&self, pid: ProcessId) -> bool {
        match self.inner.processes.remove(&pid) {
            Some((_, record)) => {
                record.abort.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.inner.resolver
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.inner.id)
            .field("processes", &self.inner.processes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn spawn_runs_the_body() {
        let node = Node::single(NodeId::new("test:1"));
        let handle = node.handle();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let pid = handle.spawn(move |_ctx| async move {
            ran_clone.store(true, Ordering::SeqCst);
            Ok(())
        });

        sleep(Duration::from_millis(50)).await;
        assert!(ran.load(Ordering::SeqCst));
        assert!(!handle.alive(pid));
    }

    #[tokio::test]
    async fn pids_are_per_node_monotonic() {
        let node = Node::single(NodeId::new("test:2"));
        let handle = node.handle();
        let a = handle.spawn(|_ctx| async { Ok(()) });
        let b = handle.spawn(|_ctx| async { Ok(()) });
        assert!(b.local_id() > a.local_id());
        assert_eq!(a.node(), b.node());
    }

    #[tokio::test]
    async fn dead_process_drops_messages() {
        let node = Node::single(NodeId::new("test:3"));
        let handle = node.handle();
        let pid = handle.spawn(|_ctx| async { Ok(()) });
        sleep(Duration::from_millis(30)).await;

        // No panic, no error: at-most-once delivery just drops.
        handle.send(pid, &1u32).await;
    }
}
