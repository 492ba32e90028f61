//! The transport seam.
//!
//! The runtime assumes a transport that delivers opaque byte frames
//! reliably and in order per (sender, receiver) pair; everything else
//! about moving bytes between nodes is someone else's problem. Outbound
//! traffic goes through [`Transport::send_to`]; inbound frames are
//! handed to [`crate::NodeHandle::deliver`].
//!
//! [`Frame`] is the wire vocabulary: envelopes for mailboxes, envelopes
//! for typed channels, and control signals for the controller. Frames
//! are postcard-encoded; the length-prefix helpers suit stream
//! transports that need their own framing.

use crate::controller::Signal;
use crate::node::NodeHandle;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use skein_core::{Message, NodeId, ProcessId, SendPortId};
use std::sync::Arc;
use thiserror::Error;

/// A transport failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The target node cannot be reached. The runtime treats this as
    /// the node's death.
    #[error("node unreachable: {0}")]
    Unreachable(NodeId),
    /// A frame failed to encode.
    #[error("frame encode failed: {0}")]
    Encode(String),
    /// A frame failed to decode.
    #[error("frame decode failed: {0}")]
    Decode(String),
    /// Anything else the transport wants to report.
    #[error("transport i/o: {0}")]
    Io(String),
}

/// Outbound delivery of opaque frames, reliable and ordered per
/// (sender, receiver) pair.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Delivers one frame to `node`.
    async fn send_to(&self, node: NodeId, frame: Vec<u8>) -> Result<(), TransportError>;
}

/// One unit of inter-node traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Frame {
    /// An envelope for a process mailbox.
    ToProcess {
        /// The destination process.
        to: ProcessId,
        /// The envelope.
        message: Message,
    },
    /// An envelope for a typed channel.
    ToPort {
        /// The destination port.
        to: SendPortId,
        /// The envelope.
        message: Message,
    },
    /// A control signal for the destination node's controller.
    Control(Signal),
}

impl Frame {
    /// Serializes this frame.
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        postcard::to_allocvec(self).map_err(|e| TransportError::Encode(e.to_string()))
    }

    /// Deserializes a frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        postcard::from_bytes(bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// Frames a message with a 4-byte big-endian length prefix, for stream
/// transports.
pub fn frame_bytes(frame: &Frame) -> Result<Vec<u8>, TransportError> {
    let payload = frame.encode()?;
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Parses one length-prefixed frame from `buf`.
///
/// Returns `Some((frame, bytes_consumed))` when a complete frame is
/// available, `None` when more bytes are needed.
pub fn parse_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, TransportError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if buf.len() < 4 + len {
        return Ok(None);
    }
    let frame = Frame::decode(&buf[4..4 + len])?;
    Ok(Some((frame, 4 + len)))
}

/// An in-process transport wiring nodes of one host directly together.
/// Attach each node's handle after creating it.
#[derive(Default)]
pub struct LoopbackSwitch {
    nodes: DashMap<NodeId, NodeHandle>,
}

impl LoopbackSwitch {
    /// Creates an empty switch.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes a node reachable through this switch.
    pub fn attach(&self, handle: NodeHandle) {
        self.nodes.insert(handle.node_id(), handle);
    }

    /// Makes a node unreachable again, as if its host vanished.
    pub fn detach(&self, node: NodeId) {
        self.nodes.remove(&node);
    }
}

#[async_trait]
impl Transport for LoopbackSwitch {
    async fn send_to(&self, node: NodeId, frame: Vec<u8>) -> Result<(), TransportError> {
        match self.nodes.get(&node) {
            Some(handle) => {
                handle.deliver(&frame);
                Ok(())
            }
            None => Err(TransportError::Unreachable(node)),
        }
    }
}

/// A transport with no peers: every remote node is unreachable.
pub struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn send_to(&self, node: NodeId, _frame: Vec<u8>) -> Result<(), TransportError> {
        Err(TransportError::Unreachable(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let node = NodeId::new("h:1");
        let pid = ProcessId::new(node, 3);
        let frame = Frame::ToProcess {
            to: pid,
            message: Message::create(&"payload".to_string()),
        };
        let bytes = frame.encode().unwrap();
        match Frame::decode(&bytes).unwrap() {
            Frame::ToProcess { to, message } => {
                assert_eq!(to, pid);
                assert_eq!(message.decode::<String>().unwrap(), "payload");
            }
            other => panic!("wrong frame: {other:?}"),
        }
    }

    #[test]
    fn length_prefix_round_trip() {
        let frame = Frame::Control(Signal::Register {
            label: "logger".to_string(),
            pid: None,
        });
        let bytes = frame_bytes(&frame).unwrap();
        let (parsed, consumed) = parse_frame(&bytes).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        assert!(matches!(parsed, Frame::Control(Signal::Register { .. })));
    }

    #[test]
    fn parse_frame_wants_more_bytes() {
        assert!(parse_frame(&[0, 0]).unwrap().is_none());

        let frame = Frame::Control(Signal::Register {
            label: "x".to_string(),
            pid: None,
        });
        let bytes = frame_bytes(&frame).unwrap();
        assert!(parse_frame(&bytes[..bytes.len() - 1]).unwrap().is_none());
    }

    #[tokio::test]
    async fn null_transport_is_unreachable() {
        let err = NullTransport
            .send_to(NodeId::new("gone:0"), vec![1, 2, 3])
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(_)));
    }
}
