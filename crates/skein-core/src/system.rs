//! System messages.
//!
//! Controller acknowledgements and notifications are ordinary typed
//! messages delivered through the recipient's mailbox, so synchronous
//! primitives can selectively receive them. Each acknowledgement
//! carries the correlation token it answers; receive predicates must
//! key on that token alone so concurrent outstanding requests cannot
//! steal each other's replies.

use crate::exit_reason::ExitReason;
use crate::ident::{Identifier, MonitorRef, ProcessId, SpawnRef};
use serde::{Deserialize, Serialize};

/// Delivered to a watcher when a monitored entity dies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorNotification {
    /// The reference returned when the monitor was installed.
    pub reference: MonitorRef,
    /// The entity that died.
    pub id: Identifier,
    /// Why it died.
    pub reason: ExitReason,
}

/// Acknowledges an unmonitor request. Emitted even for references the
/// controller never saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DidUnmonitor {
    /// The reference that was removed.
    pub reference: MonitorRef,
}

/// Acknowledges an unlink request, keyed on the identifier variant that
/// was unlinked. Emitted even for edges the controller never saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DidUnlink {
    /// The endpoint that was unlinked from the caller.
    pub id: Identifier,
}

/// Reply to a `whereis` lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereIsReply {
    /// The label that was looked up.
    pub label: String,
    /// The registered process, if any.
    pub pid: Option<ProcessId>,
}

/// Reply to a spawn request, correlated by the requester's spawn
/// reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DidSpawn {
    /// The reference minted by the requester.
    pub reference: SpawnRef,
    /// The newly started process.
    pub pid: ProcessId,
}

/// A user log line, named-sent to the process registered as `"logger"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SayMessage {
    /// Formatted wall-clock time at the sender.
    pub time: String,
    /// Who said it.
    pub from: ProcessId,
    /// The line itself.
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Message;
    use crate::ident::NodeId;

    #[test]
    fn notification_round_trips_as_envelope() {
        let pid = ProcessId::new(NodeId::new("h:1"), 9);
        let reference = MonitorRef::new(Identifier::Process(pid), 0);
        let note = MonitorNotification {
            reference,
            id: Identifier::Process(pid),
            reason: ExitReason::Normal,
        };
        let msg = Message::create(&note);
        assert!(msg.is::<MonitorNotification>());
        assert_eq!(msg.decode::<MonitorNotification>().unwrap(), note);
    }

    #[test]
    fn acks_are_distinct_types() {
        let pid = ProcessId::new(NodeId::new("h:1"), 9);
        let reference = MonitorRef::new(Identifier::Process(pid), 0);
        let ack = Message::create(&DidUnmonitor { reference });
        assert!(!ack.is::<MonitorNotification>());
        assert!(!ack.is::<DidUnlink>());
        assert!(ack.is::<DidUnmonitor>());
    }
}
