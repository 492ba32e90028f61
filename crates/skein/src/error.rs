//! Process-level failures.

use skein_core::{DecodeError, ExitReason};
use thiserror::Error;

/// What a process body returns: clean completion or a [`Failure`] that
/// becomes the process's exit reason.
pub type ProcessResult = Result<(), Failure>;

/// A failure inside a process.
///
/// Failures propagate through `?` to the process boundary, where the
/// runner records the exit reason and walks the supervision graph.
/// Catching a failure is plain Rust: match on the `Result` before
/// returning it.
#[derive(Debug, Error)]
pub enum Failure {
    /// The process raised the termination condition on itself; the
    /// boundary records the exit reason "killed by self".
    #[error("killed by self")]
    Terminated,

    /// A closure label had no entry in the resolver.
    #[error("unregistered closure label: {0}")]
    UnresolvedClosure(String),

    /// A message or resolved closure value did not decode as the
    /// expected type.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Any other error, carried as text.
    #[error("{0}")]
    Error(String),
}

impl Failure {
    /// Creates a [`Failure::Error`] from any displayable value.
    pub fn error(msg: impl std::fmt::Display) -> Self {
        Failure::Error(msg.to_string())
    }

    pub(crate) fn exit_reason(&self) -> ExitReason {
        match self {
            Failure::Terminated => ExitReason::Terminated,
            other => ExitReason::Error(other.to_string()),
        }
    }
}

/// The termination condition: return `Err(terminate())` to shut the
/// current process down cleanly with reason "killed by self".
pub fn terminate() -> Failure {
    Failure::Terminated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminate_maps_to_killed_by_self() {
        assert_eq!(terminate().exit_reason(), ExitReason::Terminated);
        assert_eq!(terminate().to_string(), "killed by self");
    }

    #[test]
    fn other_failures_become_error_reasons() {
        let reason = Failure::error("boom").exit_reason();
        assert_eq!(reason, ExitReason::Error("boom".to_string()));
        let reason = Failure::UnresolvedClosure("worker".into()).exit_reason();
        assert_eq!(
            reason,
            ExitReason::Error("unregistered closure label: worker".to_string())
        );
    }
}
