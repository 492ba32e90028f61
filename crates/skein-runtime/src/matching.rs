//! Match probes for selective receive.
//!
//! A [`Match`] inspects one envelope and either claims it, producing an
//! action value, or leaves it in place for later probes and later
//! receives.

use skein_core::{Message, Term};

/// One clause of a selective receive: a probe from envelope to optional
/// action.
pub struct Match<T> {
    probe: Box<dyn FnMut(&Message) -> Option<T> + Send>,
}

impl<T> Match<T> {
    /// Wraps a raw probe over the envelope.
    pub fn new(probe: impl FnMut(&Message) -> Option<T> + Send + 'static) -> Self {
        Self {
            probe: Box::new(probe),
        }
    }

    /// Runs the probe against one envelope.
    pub fn check(&mut self, msg: &Message) -> Option<T> {
        (self.probe)(msg)
    }
}

/// Matches any envelope carrying an `M`, mapping it through `f`.
pub fn match_msg<M: Term, T>(mut f: impl FnMut(M) -> T + Send + 'static) -> Match<T> {
    Match::new(move |msg| msg.decode::<M>().ok().map(&mut f))
}

/// Matches an envelope carrying an `M` for which `pred` holds, mapping
/// it through `f`. Envelopes of other types, and `M`s rejected by the
/// predicate, stay in the mailbox.
pub fn match_if<M: Term, T>(
    pred: impl Fn(&M) -> bool + Send + 'static,
    mut f: impl FnMut(M) -> T + Send + 'static,
) -> Match<T> {
    Match::new(move |msg| match msg.decode::<M>() {
        Ok(value) if pred(&value) => Some(f(value)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_msg_claims_only_its_type() {
        let mut m = match_msg(|s: String| s.len());
        assert_eq!(m.check(&Message::create(&"abc".to_string())), Some(3));
        assert_eq!(m.check(&Message::create(&42u32)), None);
    }

    #[test]
    fn match_if_applies_the_predicate() {
        let mut even = match_if(|n: &u32| n % 2 == 0, |n| n);
        assert_eq!(even.check(&Message::create(&3u32)), None);
        assert_eq!(even.check(&Message::create(&4u32)), Some(4));
    }
}
