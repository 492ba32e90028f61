//! Process exit reasons.
//!
//! An [`ExitReason`] records why an entity died. It travels inside
//! monitor notifications and drives link propagation.

use crate::ident::Identifier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a process (or node, or port) died.
///
/// # Examples
///
/// ```
/// use skein_core::ExitReason;
///
/// assert!(ExitReason::Normal.is_normal());
/// assert!(!ExitReason::Terminated.is_normal());
/// assert_eq!(ExitReason::Terminated.to_string(), "killed by self");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExitReason {
    /// The process's computation returned.
    #[default]
    Normal,
    /// The process raised the termination condition on itself.
    Terminated,
    /// A linked entity died and the termination propagated.
    Linked(Identifier),
    /// The process failed with an error.
    Error(String),
    /// The target was already dead or never existed when it was
    /// monitored or linked.
    UnknownEntity,
    /// The entity's node became unreachable.
    Disconnect,
}

impl ExitReason {
    /// Returns `true` for a clean exit.
    pub fn is_normal(&self) -> bool {
        matches!(self, ExitReason::Normal)
    }

    /// Creates an [`ExitReason::Error`] from any displayable value.
    pub fn error(msg: impl fmt::Display) -> Self {
        ExitReason::Error(msg.to_string())
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Normal => write!(f, "normal"),
            ExitReason::Terminated => write!(f, "killed by self"),
            ExitReason::Linked(id) => write!(f, "linked process died: {id}"),
            ExitReason::Error(msg) => write!(f, "{msg}"),
            ExitReason::UnknownEntity => write!(f, "unknown entity"),
            ExitReason::Disconnect => write!(f, "node disconnected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{NodeId, ProcessId};

    #[test]
    fn normal_is_the_only_clean_exit() {
        assert!(ExitReason::Normal.is_normal());
        assert!(!ExitReason::Terminated.is_normal());
        assert!(!ExitReason::error("boom").is_normal());
        assert!(!ExitReason::UnknownEntity.is_normal());
        assert!(!ExitReason::Disconnect.is_normal());
    }

    #[test]
    fn display_matches_the_death_vocabulary() {
        let pid = ProcessId::new(NodeId::new("h:1"), 4);
        assert_eq!(ExitReason::Normal.to_string(), "normal");
        assert_eq!(ExitReason::Terminated.to_string(), "killed by self");
        assert_eq!(
            ExitReason::Linked(Identifier::Process(pid)).to_string(),
            "linked process died: <h:1.4>"
        );
        assert_eq!(ExitReason::error("boom").to_string(), "boom");
    }

    #[test]
    fn serialization_round_trip() {
        let reason = ExitReason::error("connection reset");
        let bytes = postcard::to_allocvec(&reason).unwrap();
        let back: ExitReason = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(reason, back);
    }
}
