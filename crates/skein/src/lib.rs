//! # Skein
//!
//! Distributed processes for Rust in the Erlang tradition: lightweight,
//! independently scheduled units of computation addressed by globally
//! unique identifiers, communicating only by asynchronous messages over
//! in-process mailboxes and inter-node links.
//!
//! - **Processes** with unbounded mailboxes and selective receive
//! - **Typed channels** whose send halves cross the wire, with biased
//!   and round-robin merges
//! - **Monitors** (one-way death notifications) and **links**
//!   (symmetric termination propagation), for processes, nodes, and
//!   channel ports
//! - A per-node **name registry** with local and remote lookup
//! - A per-node **controller** task serializing all supervision,
//!   registry, and spawn mutations
//!
//! # Quick start
//!
//! ```ignore
//! use skein::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let node = Node::single(NodeId::new("127.0.0.1:9001"));
//!     let handle = node.handle();
//!
//!     let echo = handle.spawn(|mut ctx| async move {
//!         let (from, text): (ProcessId, String) = ctx.expect().await;
//!         ctx.send(from, &text).await;
//!         Ok(())
//!     });
//!
//!     handle.spawn(move |mut ctx| async move {
//!         ctx.send(echo, &(ctx.pid(), "hi".to_string())).await;
//!         let reply: String = ctx.expect().await;
//!         ctx.say(&reply);
//!         Ok(())
//!     });
//! }
//! ```
//!
//! # Distribution
//!
//! Nodes exchange frames through an implementation of
//! [`transport::Transport`]; incoming frames are handed to
//! [`NodeHandle::deliver`]. Remote computations are described by
//! [`Closure`]s resolved against the node's [`closure::Resolver`].

#![deny(missing_docs)]

mod context;
mod controller;
mod error;
mod node;

pub mod closure;
pub mod transport;

pub use context::Context;
pub use controller::Signal;
pub use error::{Failure, ProcessResult, terminate};
pub use node::{Node, NodeHandle};

pub use closure::Closure;

// Re-export the in-process machinery and core types.
pub use skein_core::{
    DecodeError, DidSpawn, DidUnlink, DidUnmonitor, ExitReason, Fingerprint, Identifier, Message,
    MonitorNotification, MonitorRef, NodeId, ProcessId, SayMessage, SendPortId, SpawnRef, Term,
    WhereIsReply,
};
pub use skein_runtime::{
    Mailbox, MailboxSender, Match, ReceivePort, SendPort, match_if, match_msg, merge_ports_biased,
    merge_ports_rr,
};

/// Everything commonly needed, in one import.
pub mod prelude {
    pub use crate::closure::{Resolved, Resolver, StaticTable};
    pub use crate::transport::{LoopbackSwitch, NullTransport, Transport};
    pub use crate::{
        Closure, Context, ExitReason, Failure, Identifier, Message, MonitorNotification,
        MonitorRef, Node, NodeHandle, NodeId, ProcessId, ProcessResult, SayMessage, SendPort,
        SendPortId, SpawnRef, Term, WhereIsReply, match_if, match_msg, merge_ports_biased,
        merge_ports_rr, terminate,
    };
    pub use skein_runtime::{Match, ReceivePort};
}
