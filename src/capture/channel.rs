//! Bounded, lossy one-way channels out of the capture context
//!
//! The capture loop must never block, so sends use `try_send` and a full
//! channel drops the item. Drops are counted so the status reporter can
//! surface them.

use super::event::{AuthEvent, EventRecord};
use crate::flow::Fragment;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

/// Sending half of a lossy channel
#[derive(Debug)]
pub struct LossySender<T> {
    tx: mpsc::Sender<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for LossySender<T> {
    fn clone(&self) -> Self {
        LossySender {
            tx: self.tx.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

impl<T> LossySender<T> {
    /// Try to send, dropping the item if the channel is full or closed
    ///
    /// Returns true if the item was queued.
    pub fn send_lossy(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    warn!("Channel full, {} items dropped so far", dropped);
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                trace!("Channel closed, dropping item");
                false
            }
        }
    }

    /// Number of items dropped because the channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a bounded lossy channel
pub fn lossy_channel<T>(capacity: usize) -> (LossySender<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        LossySender {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

/// Sending half of the auth event channel
pub type EventSender = LossySender<EventRecord>;

/// Sending half of the fragment channel
pub type FragmentSender = LossySender<Fragment>;

impl LossySender<EventRecord> {
    /// Encode and send one event
    pub fn emit(&self, event: &AuthEvent) -> bool {
        self.send_lossy(event.encode())
    }
}

/// Receiving half of the auth event channel
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<EventRecord>,
}

impl EventReceiver {
    /// Wrap a raw record receiver
    pub fn new(rx: mpsc::Receiver<EventRecord>) -> Self {
        EventReceiver { rx }
    }

    /// Receive the next decodable event
    ///
    /// Records that fail to decode are logged and skipped. Returns `None`
    /// once every sender is gone.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            let record = self.rx.recv().await?;
            match AuthEvent::decode(&record) {
                Ok(event) => return Some(event),
                Err(e) => warn!("Discarding undecodable auth event: {}", e),
            }
        }
    }

    /// Take the next decodable event without waiting
    pub fn try_recv(&mut self) -> Option<AuthEvent> {
        while let Ok(record) = self.rx.try_recv() {
            match AuthEvent::decode(&record) {
                Ok(event) => return Some(event),
                Err(e) => warn!("Discarding undecodable auth event: {}", e),
            }
        }
        None
    }
}

/// Create the auth event channel
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = lossy_channel(capacity);
    (tx, EventReceiver::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::event::CREDENTIAL_FIELD_LEN;

    fn event(pid: u32) -> AuthEvent {
        AuthEvent {
            pid,
            src_ip: 1,
            dst_ip: 2,
            src_port: 3,
            dst_port: 1080,
            username: [b'u'; CREDENTIAL_FIELD_LEN],
            password: [b'p'; CREDENTIAL_FIELD_LEN],
            username_len: 1,
            password_len: 1,
            timestamp_ns: 0,
        }
    }

    #[tokio::test]
    async fn test_event_channel_delivers() {
        let (tx, mut rx) = event_channel(4);
        assert!(tx.emit(&event(7)));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.pid, 7);
        assert_eq!(received.username_bytes(), b"u");
    }

    #[tokio::test]
    async fn test_event_channel_drops_when_full() {
        let (tx, mut rx) = event_channel(2);
        assert!(tx.emit(&event(1)));
        assert!(tx.emit(&event(2)));
        assert!(!tx.emit(&event(3)));
        assert_eq!(tx.dropped(), 1);

        assert_eq!(rx.recv().await.unwrap().pid, 1);
        assert_eq!(rx.recv().await.unwrap().pid, 2);
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_event_receiver_skips_bad_records() {
        let (tx, rx) = lossy_channel::<EventRecord>(4);
        let mut rx = EventReceiver::new(rx);
        let mut bad = event(1).encode();
        bad[144] = 99;
        assert!(tx.send_lossy(bad));
        assert!(tx.emit(&event(2)));
        assert_eq!(rx.recv().await.unwrap().pid, 2);
    }

    #[test]
    fn test_event_receiver_try_recv() {
        let (tx, mut rx) = event_channel(4);
        assert!(rx.try_recv().is_none());
        assert!(tx.emit(&event(5)));
        assert_eq!(rx.try_recv().unwrap().pid, 5);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_event_receiver_wakes_on_emit() {
        let (tx, mut rx) = event_channel(4);
        let mut recv = tokio_test::task::spawn(rx.recv());
        tokio_test::assert_pending!(recv.poll());

        assert!(tx.emit(&event(9)));
        assert!(recv.is_woken());
        let received = tokio_test::assert_ready!(recv.poll()).unwrap();
        assert_eq!(received.pid, 9);
    }

    #[test]
    fn test_send_to_closed_channel() {
        let (tx, rx) = lossy_channel::<u8>(1);
        drop(rx);
        assert!(!tx.send_lossy(1));
        assert_eq!(tx.dropped(), 0);
    }

    #[test]
    fn test_clone_shares_drop_counter() {
        let (tx, _rx) = lossy_channel::<u8>(1);
        let tx2 = tx.clone();
        assert!(tx.send_lossy(1));
        assert!(!tx2.send_lossy(2));
        assert_eq!(tx.dropped(), 1);
    }
}
