//! # skein-runtime
//!
//! The in-process machinery of Skein:
//!
//! - [`Mailbox`] - an unbounded FIFO of message envelopes with
//!   selective receive: blocking, non-blocking, and timed dequeue
//!   against an ordered list of [`Match`] probes
//! - [`SendPort`] / [`ReceivePort`] - the halves of a typed channel,
//!   with biased and round-robin merges

#![deny(missing_docs)]

mod channel;
mod mailbox;
mod matching;

pub use channel::{ReceivePort, SendPort, merge_ports_biased, merge_ports_rr};
pub use mailbox::{Mailbox, MailboxSender};
pub use matching::{Match, match_if, match_msg};
