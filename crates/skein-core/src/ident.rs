//! The addressing scheme.
//!
//! Every entity the runtime can observe dying - a process, a node, a
//! typed-channel send port - has an identifier here. [`MonitorRef`] and
//! [`SpawnRef`] are the correlation tokens that tie asynchronous
//! controller replies back to the primitive that asked for them.

use crate::atom::Atom;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network-unique identity of a node, conventionally its `host:port`
/// endpoint string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Atom);

impl NodeId {
    /// Creates a node identity from its endpoint string.
    pub fn new(endpoint: &str) -> Self {
        Self(Atom::new(endpoint))
    }

    /// Returns the endpoint string.
    pub fn endpoint(&self) -> String {
        self.0.as_str()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A process identifier: the owning node plus a per-node monotonic
/// local id. Globally unique, totally ordered within a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId {
    node: NodeId,
    id: u64,
}

impl ProcessId {
    /// Assembles a pid from its parts. Pids are normally minted by the
    /// node at spawn time; this is for deserialization and tests.
    pub fn new(node: NodeId, id: u64) -> Self {
        Self { node, id }
    }

    /// The node this process lives on.
    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The process id within its node.
    #[inline]
    pub const fn local_id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid<{}.{}>", self.node, self.id)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}.{}>", self.node, self.id)
    }
}

/// Identifies one send port of a typed channel: the owning process plus
/// a per-process monotonic channel index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SendPortId {
    process: ProcessId,
    index: u32,
}

impl SendPortId {
    /// Assembles a port id from its parts.
    pub fn new(process: ProcessId, index: u32) -> Self {
        Self { process, index }
    }

    /// The process owning the channel.
    #[inline]
    pub fn process(&self) -> ProcessId {
        self.process
    }

    /// The channel index within the owning process.
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Debug for SendPortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Port<{}.{}.{}>", self.process.node(), self.process.local_id(), self.index)
    }
}

impl fmt::Display for SendPortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.process, self.index)
    }
}

/// Anything that can be monitored, linked to, or die.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    /// A process.
    Process(ProcessId),
    /// A whole node.
    Node(NodeId),
    /// One typed-channel send port.
    Port(SendPortId),
}

impl Identifier {
    /// The node the identified entity lives on.
    pub fn node_id(&self) -> NodeId {
        match self {
            Identifier::Process(pid) => pid.node(),
            Identifier::Node(nid) => *nid,
            Identifier::Port(spid) => spid.process().node(),
        }
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Process(pid) => write!(f, "{pid:?}"),
            Identifier::Node(nid) => write!(f, "{nid:?}"),
            Identifier::Port(spid) => write!(f, "{spid:?}"),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Process(pid) => write!(f, "{pid}"),
            Identifier::Node(nid) => write!(f, "{nid}"),
            Identifier::Port(spid) => write!(f, "{spid}"),
        }
    }
}

/// A monitor reference: the monitored identifier plus a per-process
/// monotonic counter minted by the watcher.
///
/// The counter makes duplicate monitors of the same target distinct -
/// each yields its own death notification.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorRef {
    id: Identifier,
    counter: u64,
}

impl MonitorRef {
    /// Creates a reference for `id` with the watcher's next counter value.
    pub fn new(id: Identifier, counter: u64) -> Self {
        Self { id, counter }
    }

    /// The monitored identifier.
    #[inline]
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// The watcher-local counter.
    #[inline]
    pub const fn counter(&self) -> u64 {
        self.counter
    }
}

impl fmt::Debug for MonitorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MonitorRef({:?}, {})", self.id, self.counter)
    }
}

/// Correlates a spawn request with its reply. Per-process monotonic.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpawnRef(u64);

impl SpawnRef {
    /// Creates a reference from the requesting process's next counter
    /// value.
    pub const fn new(counter: u64) -> Self {
        Self(counter)
    }

    /// The raw counter value.
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SpawnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpawnRef({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_display() {
        let pid = ProcessId::new(NodeId::new("127.0.0.1:9001"), 42);
        assert_eq!(format!("{pid}"), "<127.0.0.1:9001.42>");
        assert_eq!(format!("{pid:?}"), "Pid<127.0.0.1:9001.42>");
    }

    #[test]
    fn pid_equality_is_structural() {
        let node = NodeId::new("127.0.0.1:9001");
        assert_eq!(ProcessId::new(node, 7), ProcessId::new(node, 7));
        assert_ne!(ProcessId::new(node, 7), ProcessId::new(node, 8));
        assert_ne!(
            ProcessId::new(node, 7),
            ProcessId::new(NodeId::new("127.0.0.1:9002"), 7)
        );
    }

    #[test]
    fn identifier_node_id() {
        let node = NodeId::new("10.0.0.1:4000");
        let pid = ProcessId::new(node, 1);
        let spid = SendPortId::new(pid, 3);
        assert_eq!(Identifier::Process(pid).node_id(), node);
        assert_eq!(Identifier::Node(node).node_id(), node);
        assert_eq!(Identifier::Port(spid).node_id(), node);
    }

    #[test]
    fn monitor_refs_with_same_target_are_distinct() {
        let pid = ProcessId::new(NodeId::new("a:1"), 0);
        let r1 = MonitorRef::new(Identifier::Process(pid), 0);
        let r2 = MonitorRef::new(Identifier::Process(pid), 1);
        assert_ne!(r1, r2);
        assert_eq!(r1.id(), r2.id());
    }

    #[test]
    fn pid_serialization_round_trip() {
        let pid = ProcessId::new(NodeId::new("192.168.1.5:7777"), 123);
        let bytes = postcard::to_allocvec(&pid).unwrap();
        let back: ProcessId = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(pid, back);
        assert_eq!(back.node().endpoint(), "192.168.1.5:7777");
    }
}
