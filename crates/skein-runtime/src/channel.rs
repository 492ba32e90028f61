//! Typed channels.
//!
//! A typed channel is an in-process ordered queue of already-typed
//! values. The [`SendPort`] half is serializable and may cross the
//! wire; the [`ReceivePort`] half stays with the creating process.
//!
//! Receive ports compose: a biased merge reads whichever underlying
//! port has a value, preferring the leftmost; a round-robin merge does
//! the same but rotates the read port to the back of the list after
//! each success. A composite read commits to exactly one underlying
//! queue - polling a port either takes one element or leaves the port
//! untouched, so losing branches never phantom-consume.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::task::{Context, Poll};

use futures::future::poll_fn;
use skein_core::SendPortId;
use tokio::sync::mpsc;

/// The sharable, serializable write half of a typed channel.
///
/// Holding a `SendPort<T>` is the capability to push `T`s into the
/// channel, locally or from another node.
#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
pub struct SendPort<T> {
    id: SendPortId,
    #[serde(skip)]
    _ty: PhantomData<fn() -> T>,
}

impl<T> SendPort<T> {
    /// Wraps a port identifier.
    pub fn new(id: SendPortId) -> Self {
        Self {
            id,
            _ty: PhantomData,
        }
    }

    /// The wire identity of this port.
    #[inline]
    pub fn id(&self) -> SendPortId {
        self.id
    }
}

impl<T> Clone for SendPort<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SendPort<T> {}

impl<T> std::fmt::Debug for SendPort<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SendPort({:?})", self.id)
    }
}

/// The local-only read half of a typed channel, in one of three shapes:
/// a single channel, or a biased or round-robin merge of other ports.
pub enum ReceivePort<T> {
    /// Reads exactly one channel.
    Single(mpsc::UnboundedReceiver<T>),
    /// Reads whichever member has a value, preferring earlier entries.
    Biased(Vec<ReceivePort<T>>),
    /// As biased, but the selected member moves to the back after each
    /// successful read.
    RoundRobin(Vec<ReceivePort<T>>),
}

impl<T: Send> ReceivePort<T> {
    /// Receives the next value, suspending until one is available.
    ///
    /// A port whose every source has been dropped can never produce a
    /// value and suspends forever.
    pub async fn receive(&mut self) -> T {
        match poll_fn(|cx| self.poll_receive(cx)).await {
            Some(value) => value,
            None => std::future::pending().await,
        }
    }

    /// Receives without waiting.
    pub fn try_receive(&mut self) -> Option<T> {
        let mut noop = Context::from_waker(std::task::Waker::noop());
        match self.poll_receive(&mut noop) {
            Poll::Ready(value) => value,
            Poll::Pending => None,
        }
    }

    fn poll_receive(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        match self {
            ReceivePort::Single(rx) => rx.poll_recv(cx),
            ReceivePort::Biased(ports) => {
                let mut open = false;
                for port in ports.iter_mut() {
                    match port.poll_receive(cx) {
                        Poll::Ready(Some(value)) => return Poll::Ready(Some(value)),
                        Poll::Ready(None) => {}
                        Poll::Pending => open = true,
                    }
                }
                if open || ports.is_empty() {
                    Poll::Pending
                } else {
                    Poll::Ready(None)
                }
            }
            ReceivePort::RoundRobin(ports) => {
                let mut open = false;
                for i in 0..ports.len() {
                    match ports[i].poll_receive(cx) {
                        Poll::Ready(Some(value)) => {
                            // The port just read yields to the others.
                            let port = ports.remove(i);
                            ports.push(port);
                            return Poll::Ready(Some(value));
                        }
                        Poll::Ready(None) => {}
                        Poll::Pending => open = true,
                    }
                }
                if open || ports.is_empty() {
                    Poll::Pending
                } else {
                    Poll::Ready(None)
                }
            }
        }
    }
}

/// Merges receive ports into one that prefers earlier ports when
/// several have a value. Wraps the ports; no values are copied and no
/// channels are created.
pub fn merge_ports_biased<T: Send>(ports: Vec<ReceivePort<T>>) -> ReceivePort<T> {
    ReceivePort::Biased(ports)
}

/// Merges receive ports round-robin: ties prefer earlier ports, and
/// each successful read rotates the selected port to the back.
pub fn merge_ports_rr<T: Send>(ports: Vec<ReceivePort<T>>) -> ReceivePort<T> {
    ReceivePort::RoundRobin(ports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::{NodeId, ProcessId};
    use std::time::Duration;

    fn port_pair<T>() -> (mpsc::UnboundedSender<T>, ReceivePort<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, ReceivePort::Single(rx))
    }

    #[tokio::test]
    async fn single_port_is_fifo() {
        let (tx, mut rx) = port_pair();
        tx.send("a").unwrap();
        tx.send("b").unwrap();
        assert_eq!(rx.receive().await, "a");
        assert_eq!(rx.receive().await, "b");
    }

    #[tokio::test]
    async fn biased_merge_prefers_leftmost() {
        let (tx0, rx0) = port_pair();
        let (tx1, rx1) = port_pair();
        let mut merged = merge_ports_biased(vec![rx0, rx1]);

        tx1.send("right").unwrap();
        tx0.send("left").unwrap();
        // Both have a value; the earlier port wins the tie.
        assert_eq!(merged.receive().await, "left");
        assert_eq!(merged.receive().await, "right");
    }

    #[tokio::test]
    async fn biased_merge_does_not_phantom_consume() {
        let (tx0, rx0) = port_pair();
        let (tx1, rx1) = port_pair();
        let mut merged = merge_ports_biased(vec![rx0, rx1]);

        tx0.send(1).unwrap();
        tx1.send(2).unwrap();
        assert_eq!(merged.receive().await, 1);
        // The losing branch kept its element.
        assert_eq!(merged.receive().await, 2);
        drop(tx0);
        drop(tx1);
    }

    #[tokio::test]
    async fn round_robin_rotates_after_each_read() {
        let (tx0, rx0) = port_pair();
        let (tx1, rx1) = port_pair();
        let (tx2, rx2) = port_pair();
        let mut merged = merge_ports_rr(vec![rx0, rx1, rx2]);

        tx0.send("a").unwrap();
        tx1.send("b").unwrap();
        tx2.send("c").unwrap();
        assert_eq!(merged.receive().await, "a");
        assert_eq!(merged.receive().await, "b");
        assert_eq!(merged.receive().await, "c");

        // After a full rotation the original head is preferred again.
        tx0.send("d").unwrap();
        assert_eq!(merged.receive().await, "d");
    }

    #[tokio::test]
    async fn round_robin_is_fair_under_load() {
        let mut senders = Vec::new();
        let mut ports = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = port_pair();
            for n in 0..4u32 {
                tx.send(n).unwrap();
            }
            senders.push(tx);
            ports.push(rx);
        }
        let mut merged = merge_ports_rr(ports);
        // Twelve reads over three saturated ports: each port serves
        // exactly every third read.
        let mut seen = Vec::new();
        for _ in 0..12 {
            seen.push(merged.receive().await);
        }
        assert_eq!(seen, vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3]);
    }

    #[tokio::test]
    async fn merge_wakes_on_late_arrival() {
        let (tx0, rx0) = port_pair();
        let (_tx1, rx1) = port_pair::<&str>();
        let mut merged = merge_ports_biased(vec![rx0, rx1]);

        let feeder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx0.send("late").unwrap();
        });
        assert_eq!(merged.receive().await, "late");
        feeder.await.unwrap();
    }

    #[tokio::test]
    async fn nested_merges_compose() {
        let (tx0, rx0) = port_pair();
        let (tx1, rx1) = port_pair();
        let (tx2, rx2) = port_pair();
        let inner = merge_ports_biased(vec![rx0, rx1]);
        let mut merged = merge_ports_rr(vec![inner, rx2]);

        tx0.send("i0").unwrap();
        tx1.send("i1").unwrap();
        tx2.send("o").unwrap();
        assert_eq!(merged.receive().await, "i0");
        assert_eq!(merged.receive().await, "o");
        assert_eq!(merged.receive().await, "i1");
    }

    #[test]
    fn try_receive_does_not_wait() {
        let (tx, mut rx) = port_pair();
        assert_eq!(rx.try_receive(), None);
        tx.send(1).unwrap();
        assert_eq!(rx.try_receive(), Some(1));
    }

    #[test]
    fn send_port_serializes_by_identity() {
        let pid = ProcessId::new(NodeId::new("h:1"), 2);
        let port: SendPort<String> = SendPort::new(SendPortId::new(pid, 5));
        let bytes = postcard::to_allocvec(&port).unwrap();
        let back: SendPort<String> = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back.id(), port.id());
    }
}
