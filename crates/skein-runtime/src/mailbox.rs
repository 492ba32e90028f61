//! The process mailbox.
//!
//! A mailbox is an unbounded FIFO of message envelopes supporting
//! selective receive: the consumer scans messages in arrival order and
//! consumes the first one accepted by any probe in an ordered list,
//! leaving every other message in place, in order.
//!
//! The structure is in two halves. Producers append through an
//! unbounded mpsc channel, which serializes concurrent enqueues into a
//! single arrival order without blocking each other for more than one
//! append. The consumer keeps a private scan buffer of messages that
//! earlier receives rejected; a scan visits the buffer first, then
//! drains whatever the channel already holds, and only then waits for
//! new arrivals.

use crate::matching::Match;
use skein_core::Message;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};

/// The consuming half of a mailbox. Owned by exactly one process.
pub struct Mailbox {
    rx: mpsc::UnboundedReceiver<Message>,
    /// Messages already pulled off the channel but claimed by no probe
    /// yet, in arrival order.
    buffer: VecDeque<Message>,
}

/// The producing half. Cloned freely; enqueues never block.
#[derive(Clone)]
pub struct MailboxSender {
    tx: mpsc::UnboundedSender<Message>,
}

impl MailboxSender {
    /// Appends an envelope. Returns `false` if the mailbox was dropped.
    pub fn send(&self, msg: Message) -> bool {
        self.tx.send(msg).is_ok()
    }
}

fn probe_all<T>(matches: &mut [Match<T>], msg: &Message) -> Option<T> {
    matches.iter_mut().find_map(|m| m.check(msg))
}

impl Mailbox {
    /// Creates a mailbox and its sender.
    pub fn new() -> (Self, MailboxSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx,
                buffer: VecDeque::new(),
            },
            MailboxSender { tx },
        )
    }

    /// Scans the private buffer in arrival order. A hit is removed
    /// without disturbing the relative order of the rest.
    fn scan_buffer<T>(&mut self, matches: &mut [Match<T>]) -> Option<T> {
        for i in 0..self.buffer.len() {
            if let Some(action) = probe_all(matches, &self.buffer[i]) {
                self.buffer.remove(i);
                return Some(action);
            }
        }
        None
    }

    /// Drains every message the channel already holds, probing each in
    /// arrival order; misses move to the buffer.
    fn drain_ready<T>(&mut self, matches: &mut [Match<T>]) -> Option<T> {
        while let Ok(msg) = self.rx.try_recv() {
            if let Some(action) = probe_all(matches, &msg) {
                return Some(action);
            }
            self.buffer.push_back(msg);
        }
        None
    }

    /// Selectively receives, blocking until some probe accepts a
    /// message.
    pub async fn receive<T>(&mut self, matches: &mut [Match<T>]) -> T {
        if let Some(action) = self.scan_buffer(matches) {
            return action;
        }
        if let Some(action) = self.drain_ready(matches) {
            return action;
        }
        loop {
            match self.rx.recv().await {
                Some(msg) => {
                    if let Some(action) = probe_all(matches, &msg) {
                        return action;
                    }
                    self.buffer.push_back(msg);
                }
                // Every sender is gone; no message can ever match.
                None => std::future::pending::<()>().await,
            }
        }
    }

    /// Selectively receives without waiting: scans what is already
    /// present and returns `None` on no match.
    pub fn try_receive<T>(&mut self, matches: &mut [Match<T>]) -> Option<T> {
        self.scan_buffer(matches)
            .or_else(|| self.drain_ready(matches))
    }

    /// Selectively receives, waiting at most `timeout` for a matching
    /// message to arrive.
    ///
    /// The timer covers only the waiting phase: messages already queued
    /// are scanned before it starts, and a zero timeout is exactly
    /// [`Mailbox::try_receive`].
    pub async fn receive_timeout<T>(
        &mut self,
        timeout: Duration,
        matches: &mut [Match<T>],
    ) -> Option<T> {
        if let Some(action) = self.try_receive(matches) {
            return Some(action);
        }
        if timeout.is_zero() {
            return None;
        }
        let deadline = Instant::now() + timeout;
        loop {
            match timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(msg)) => {
                    if let Some(action) = probe_all(matches, &msg) {
                        return Some(action);
                    }
                    self.buffer.push_back(msg);
                }
                Ok(None) => {
                    // Disconnected: nothing more can arrive, wait out
                    // the timer to keep the timing contract.
                    tokio::time::sleep_until(deadline).await;
                    return None;
                }
                Err(_) => return None,
            }
        }
    }

    /// Number of messages currently held (buffered plus undrained).
    pub fn len(&self) -> usize {
        self.buffer.len() + self.rx.len()
    }

    /// Whether the mailbox currently holds no messages.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{match_if, match_msg};

    fn any<M: skein_core::Term>() -> Match<M> {
        match_msg(|m: M| m)
    }

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let (mut mailbox, sender) = Mailbox::new();
        for n in 1u32..=3 {
            sender.send(Message::create(&n));
        }
        assert_eq!(mailbox.receive(&mut [any::<u32>()]).await, 1);
        assert_eq!(mailbox.receive(&mut [any::<u32>()]).await, 2);
        assert_eq!(mailbox.receive(&mut [any::<u32>()]).await, 3);
    }

    #[tokio::test]
    async fn selective_receive_skips_without_reordering() {
        let (mut mailbox, sender) = Mailbox::new();
        for n in 1u32..=3 {
            sender.send(Message::create(&n));
        }
        // Claim the first even message.
        let even = mailbox
            .receive(&mut [match_if(|n: &u32| n % 2 == 0, |n| n)])
            .await;
        assert_eq!(even, 2);
        // The rest is the original sequence minus the claimed message.
        assert_eq!(mailbox.receive(&mut [any::<u32>()]).await, 1);
        assert_eq!(mailbox.receive(&mut [any::<u32>()]).await, 3);
    }

    #[tokio::test]
    async fn probes_are_tried_in_order() {
        let (mut mailbox, sender) = Mailbox::new();
        sender.send(Message::create(&6u32));
        // Both probes accept 6; the first one wins.
        let tagged = mailbox
            .receive(&mut [
                match_if(|n: &u32| n % 2 == 0, |n| ("even", n)),
                match_if(|n: &u32| n % 3 == 0, |n| ("triple", n)),
            ])
            .await;
        assert_eq!(tagged, ("even", 6));
    }

    #[tokio::test]
    async fn unmatched_types_stay_queued() {
        let (mut mailbox, sender) = Mailbox::new();
        sender.send(Message::create(&"first".to_string()));
        sender.send(Message::create(&42u32));
        assert_eq!(mailbox.receive(&mut [any::<u32>()]).await, 42);
        assert_eq!(
            mailbox.receive(&mut [any::<String>()]).await,
            "first".to_string()
        );
    }

    #[tokio::test]
    async fn zero_timeout_never_suspends() {
        let (mut mailbox, _sender) = Mailbox::new();
        let got = mailbox
            .receive_timeout(Duration::ZERO, &mut [any::<u32>()])
            .await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn timeout_scans_queued_messages_before_timing() {
        let (mut mailbox, sender) = Mailbox::new();
        sender.send(Message::create(&9u32));
        let got = mailbox
            .receive_timeout(Duration::ZERO, &mut [any::<u32>()])
            .await;
        assert_eq!(got, Some(9));
    }

    #[tokio::test]
    async fn timeout_elapses_on_no_match() {
        let (mut mailbox, sender) = Mailbox::new();
        sender.send(Message::create(&"noise".to_string()));
        let got = mailbox
            .receive_timeout(Duration::from_millis(20), &mut [any::<u32>()])
            .await;
        assert_eq!(got, None);
        // The unmatched message is still there.
        assert_eq!(
            mailbox.receive(&mut [any::<String>()]).await,
            "noise".to_string()
        );
    }

    #[tokio::test]
    async fn blocking_receive_wakes_on_arrival() {
        let (mut mailbox, sender) = Mailbox::new();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            sender.send(Message::create(&5u32));
        });
        assert_eq!(mailbox.receive(&mut [any::<u32>()]).await, 5);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_senders_keep_per_sender_order() {
        let (mut mailbox, sender) = Mailbox::new();
        let s1 = sender.clone();
        let s2 = sender.clone();
        let t1 = tokio::spawn(async move {
            for n in 0u32..50 {
                s1.send(Message::create(&("a".to_string(), n)));
            }
        });
        let t2 = tokio::spawn(async move {
            for n in 0u32..50 {
                s2.send(Message::create(&("b".to_string(), n)));
            }
        });
        t1.await.unwrap();
        t2.await.unwrap();

        let mut last_a = None;
        let mut last_b = None;
        for _ in 0..100 {
            let (who, n) = mailbox.receive(&mut [any::<(String, u32)>()]).await;
            let last = if who == "a" { &mut last_a } else { &mut last_b };
            if let Some(prev) = *last {
                assert!(n > prev, "sender {who} reordered: {n} after {prev}");
            }
            *last = Some(n);
        }
    }
}
