//! # skein-core
//!
//! Core types for Skein, a distributed process runtime in the Erlang
//! tradition: lightweight processes addressed by globally unique
//! identifiers, communicating only by asynchronous messages.
//!
//! This crate holds everything the rest of the runtime agrees on:
//!
//! - [`NodeId`], [`ProcessId`], [`SendPortId`], [`Identifier`] - the
//!   addressing scheme
//! - [`MonitorRef`], [`SpawnRef`] - correlation tokens for supervision
//!   and remote spawn
//! - [`Message`] and [`Fingerprint`] - the serializable envelope with
//!   type-based routing
//! - [`ExitReason`] - why a process died
//! - the system message types exchanged with the node controller

#![deny(missing_docs)]

pub mod atom;
mod envelope;
mod exit_reason;
mod ident;
mod system;

pub use atom::Atom;
pub use envelope::{DecodeError, Fingerprint, Message, Term};
pub use exit_reason::ExitReason;
pub use ident::{Identifier, MonitorRef, NodeId, ProcessId, SendPortId, SpawnRef};
pub use system::{
    DidSpawn, DidUnlink, DidUnmonitor, MonitorNotification, SayMessage, WhereIsReply,
};
