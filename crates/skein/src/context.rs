//! The process context: the operation surface handed to every process.
//!
//! A [`Context`] owns the process's mailbox and its private counters
//! (channel index, monitor counter, spawn counter) and borrows the node
//! for everything shared. It is moved into the process body at spawn
//! and never leaves that task, so none of its state needs a lock.
//!
//! The synchronous primitives (`unmonitor`, `unlink*`, `whereis*`,
//! `spawn`) emit a control signal and then selectively receive the
//! correlated acknowledgement; each receive predicate keys on the
//! correlation token alone, so overlapping outstanding requests cannot
//! steal each other's replies.

use crate::closure::{Closure, Resolved};
use crate::controller::Signal;
use crate::error::{Failure, ProcessResult};
use crate::node::NodeHandle;
use skein_core::{
    DidSpawn, DidUnlink, DidUnmonitor, ExitReason, Identifier, Message, MonitorNotification,
    MonitorRef, NodeId, ProcessId, SayMessage, SendPortId, SpawnRef, Term, WhereIsReply,
};
use skein_runtime::{Mailbox, Match, ReceivePort, SendPort, match_if, match_msg};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

/// The execution context of one process.
pub struct Context {
    pid: ProcessId,
    node: NodeHandle,
    mailbox: Mailbox,
    next_channel: u32,
    next_monitor: u64,
    next_spawn: u64,
}

impl Context {
    pub(crate) fn new(pid: ProcessId, node: NodeHandle, mailbox: Mailbox) -> Self {
        Self {
            pid,
            node,
            mailbox,
            next_channel: 0,
            next_monitor: 0,
            next_spawn: 0,
        }
    }

    /// This process's pid.
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// The identity of the node this process runs on.
    pub fn node_id(&self) -> NodeId {
        self.node.node_id()
    }

    /// A handle to the node, e.g. for spawning unrelated processes.
    pub fn handle(&self) -> NodeHandle {
        self.node.clone()
    }

    // --- messaging ---

    /// Sends a typed message to `to`, enqueuing directly on a local
    /// mailbox or going through the transport for a remote one.
    pub async fn send<M: Term>(&self, to: ProcessId, msg: &M) {
        self.node.route_envelope(to, Message::create(msg)).await;
    }

    /// Receives the next message of type `M`, leaving messages of other
    /// types untouched and in order.
    pub async fn expect<M: Term>(&mut self) -> M {
        self.mailbox.receive(&mut [match_msg(|m: M| m)]).await
    }

    /// As [`Context::expect`], giving up after `timeout`. A zero
    /// timeout scans what is already queued and never suspends.
    pub async fn expect_timeout<M: Term>(&mut self, timeout: Duration) -> Option<M> {
        self.mailbox
            .receive_timeout(timeout, &mut [match_msg(|m: M| m)])
            .await
    }

    /// Selectively receives: consumes the first message accepted by any
    /// of the ordered probes, blocking until one matches.
    pub async fn receive_wait<T>(&mut self, matches: &mut [Match<T>]) -> T {
        self.mailbox.receive(matches).await
    }

    /// As [`Context::receive_wait`] with a timeout; see
    /// [`Context::expect_timeout`] for the zero-timeout contract.
    pub async fn receive_timeout<T>(
        &mut self,
        timeout: Duration,
        matches: &mut [Match<T>],
    ) -> Option<T> {
        self.mailbox.receive_timeout(timeout, matches).await
    }

    // --- typed channels ---

    /// Creates a typed channel owned by this process. The send half is
    /// serializable and may be shipped anywhere; the receive half stays
    /// here.
    pub fn new_chan<T: Term>(&mut self) -> (SendPort<T>, ReceivePort<T>) {
        let index = self.next_channel;
        self.next_channel += 1;
        let id = SendPortId::new(self.pid, index);
        let (tx, rx) = mpsc::unbounded_channel::<T>();
        self.node.register_sink(id, tx);
        (SendPort::new(id), ReceivePort::Single(rx))
    }

    /// Delivers a value to a typed channel, locally or over the wire.
    pub async fn send_chan<T: Term>(&self, port: &SendPort<T>, value: T) {
        let id = port.id();
        if id.process().node() == self.node.node_id() {
            self.node.send_chan_local(id, value);
        } else {
            self.node.route_port_envelope(id, Message::create(&value)).await;
        }
    }

    // --- monitors ---

    /// Monitors a process; its death (or nonexistence) produces one
    /// [`MonitorNotification`] carrying the returned reference.
    pub async fn monitor(&mut self, pid: ProcessId) -> MonitorRef {
        self.monitor_id(Identifier::Process(pid)).await
    }

    /// Monitors a whole node.
    pub async fn monitor_node(&mut self, node: NodeId) -> MonitorRef {
        self.monitor_id(Identifier::Node(node)).await
    }

    /// Monitors a typed-channel send port.
    pub async fn monitor_port(&mut self, port: SendPortId) -> MonitorRef {
        self.monitor_id(Identifier::Port(port)).await
    }

    async fn monitor_id(&mut self, id: Identifier) -> MonitorRef {
        let reference = MonitorRef::new(id, self.next_monitor);
        self.next_monitor += 1;
        let signal = Signal::Monitor {
            watcher: self.pid,
            reference,
        };
        if self.node.route_signal(id.node_id(), signal).await.is_err() {
            // The target's node is unreachable, which is its death.
            let note = MonitorNotification {
                reference,
                id,
                reason: ExitReason::Disconnect,
            };
            self.node.deliver_local(self.pid, Message::create(&note));
        }
        reference
    }

    /// Removes a monitor. Completes once the controller acknowledges;
    /// idempotent, and safe for references that were never issued.
    pub async fn unmonitor(&mut self, reference: MonitorRef) {
        let signal = Signal::Unmonitor {
            watcher: self.pid,
            reference,
        };
        if self
            .node
            .route_signal(reference.id().node_id(), signal)
            .await
            .is_err()
        {
            // An unreachable node holds no monitors worth removing.
            self.node
                .deliver_local(self.pid, Message::create(&DidUnmonitor { reference }));
        }
        self.mailbox
            .receive(&mut [match_if(
                move |ack: &DidUnmonitor| ack.reference == reference,
                |_| (),
            )])
            .await;
    }

    // --- links ---

    /// Links this process to another: if either dies, the other is
    /// terminated too.
    pub fn link(&self, pid: ProcessId) {
        self.link_id(Identifier::Process(pid));
    }

    /// Links this process to a node's fate.
    pub fn link_node(&self, node: NodeId) {
        self.link_id(Identifier::Node(node));
    }

    /// Links this process to a send port's fate.
    pub fn link_port(&self, port: SendPortId) {
        self.link_id(Identifier::Port(port));
    }

    fn link_id(&self, id: Identifier) {
        self.node.signal_local(Signal::Link {
            from: self.pid,
            id,
            mirrored: false,
        });
    }

    /// Removes a link to a process. Completes once acknowledged;
    /// idempotent, and the acknowledgement comes even if the target is
    /// already dead.
    pub async fn unlink(&mut self, pid: ProcessId) {
        self.unlink_id(Identifier::Process(pid)).await;
    }

    /// Removes a link to a node.
    pub async fn unlink_node(&mut self, node: NodeId) {
        self.unlink_id(Identifier::Node(node)).await;
    }

    /// Removes a link to a send port.
    pub async fn unlink_port(&mut self, port: SendPortId) {
        self.unlink_id(Identifier::Port(port)).await;
    }

    async fn unlink_id(&mut self, id: Identifier) {
        self.node.signal_local(Signal::Unlink {
            from: self.pid,
            id,
            mirrored: false,
        });
        self.mailbox
            .receive(&mut [match_if(move |ack: &DidUnlink| ack.id == id, |_| ())])
            .await;
    }

    // --- registry ---

    /// Registers `pid` under `label` on this node, replacing any
    /// previous holder of the label.
    pub fn register(&self, label: &str, pid: ProcessId) {
        self.node.signal_local(Signal::Register {
            label: label.to_string(),
            pid: Some(pid),
        });
    }

    /// Removes a label from this node's registry.
    pub fn unregister(&self, label: &str) {
        self.node.signal_local(Signal::Register {
            label: label.to_string(),
            pid: None,
        });
    }

    /// Registers `pid` under `label` on a remote node.
    pub async fn register_remote(&self, node: NodeId, label: &str, pid: ProcessId) {
        let _ = self
            .node
            .route_signal(
                node,
                Signal::Register {
                    label: label.to_string(),
                    pid: Some(pid),
                },
            )
            .await;
    }

    /// Removes a label from a remote node's registry.
    pub async fn unregister_remote(&self, node: NodeId, label: &str) {
        let _ = self
            .node
            .route_signal(
                node,
                Signal::Register {
                    label: label.to_string(),
                    pid: None,
                },
            )
            .await;
    }

    /// Looks a label up in this node's registry.
    pub async fn whereis(&mut self, label: &str) -> Option<ProcessId> {
        self.whereis_on(self.node.node_id(), label).await
    }

    /// Looks a label up in a remote node's registry. An unreachable
    /// node answers `None`.
    pub async fn whereis_remote(&mut self, node: NodeId, label: &str) -> Option<ProcessId> {
        self.whereis_on(node, label).await
    }

    async fn whereis_on(&mut self, node: NodeId, label: &str) -> Option<ProcessId> {
        let signal = Signal::WhereIs {
            from: self.pid,
            label: label.to_string(),
        };
        if self.node.route_signal(node, signal).await.is_err() {
            return None;
        }
        let want = label.to_string();
        self.mailbox
            .receive(&mut [match_if(
                move |reply: &WhereIsReply| reply.label == want,
                |reply: WhereIsReply| reply.pid,
            )])
            .await
    }

    /// Sends a typed message to whatever `label` names on this node.
    /// Unknown labels drop silently.
    pub fn nsend<M: Term>(&self, label: &str, msg: &M) {
        self.node.signal_local(Signal::NamedSend {
            label: label.to_string(),
            message: Message::create(msg),
        });
    }

    /// Sends a typed message to whatever `label` names on a remote node.
    pub async fn nsend_remote<M: Term>(&self, node: NodeId, label: &str, msg: &M) {
        let _ = self
            .node
            .route_signal(
                node,
                Signal::NamedSend {
                    label: label.to_string(),
                    message: Message::create(msg),
                },
            )
            .await;
    }

    // --- spawn ---

    /// Asks `node` to resolve and start `closure`, returning the
    /// reference that will correlate the [`DidSpawn`] reply.
    pub async fn spawn_async(&mut self, node: NodeId, closure: Closure) -> Result<SpawnRef, Failure> {
        let reference = SpawnRef::new(self.next_spawn);
        self.next_spawn += 1;
        self.node
            .route_signal(
                node,
                Signal::Spawn {
                    from: self.pid,
                    reference,
                    closure,
                },
            )
            .await
            .map_err(Failure::error)?;
        Ok(reference)
    }

    /// As [`Context::spawn_async`], then awaits the reply and returns
    /// the new pid.
    pub async fn spawn(&mut self, node: NodeId, closure: Closure) -> Result<ProcessId, Failure> {
        let reference = self.spawn_async(node, closure).await?;
        let pid = self
            .mailbox
            .receive(&mut [match_if(
                move |reply: &DidSpawn| reply.reference == reference,
                |reply: DidSpawn| reply.pid,
            )])
            .await;
        Ok(pid)
    }

    /// Spawns a local child and links it to this process in the same
    /// controller turn, before the child runs.
    pub fn spawn_link<F, Fut>(&self, f: F) -> ProcessId
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = ProcessResult> + Send + 'static,
    {
        let child = self.node.spawn(f);
        self.link(child);
        child
    }

    /// Spawns a local child and monitors it.
    pub async fn spawn_monitor<F, Fut>(&mut self, f: F) -> (ProcessId, MonitorRef)
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = ProcessResult> + Send + 'static,
    {
        let child = self.node.spawn(f);
        let reference = self.monitor(child).await;
        (child, reference)
    }

    // --- closures ---

    /// Resolves a closure to a plain value of type `T`. An unregistered
    /// label and a fingerprint mismatch are both user-visible failures.
    pub fn un_closure<T: Term>(&self, closure: &Closure) -> Result<T, Failure> {
        match self
            .node
            .resolver()
            .resolve(closure.label(), closure.env())
        {
            None => Err(Failure::UnresolvedClosure(closure.label().to_string())),
            Some(Resolved::Value(msg)) => Ok(msg.decode::<T>()?),
            Some(Resolved::Process(_)) => Err(Failure::error(format!(
                "closure `{}` resolves to a process, not a value",
                closure.label()
            ))),
        }
    }

    // --- logging ---

    /// Sends a log line to the process registered as `"logger"`,
    /// stamped with the wall-clock time and this pid.
    pub fn say(&self, text: &str) {
        let line = SayMessage {
            time: chrono::Utc::now().to_rfc3339(),
            from: self.pid,
            text: text.to_string(),
        };
        self.nsend("logger", &line);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("pid", &self.pid).finish()
    }
}
