//! Publish/subscribe fan-out
//!
//! The subscriber set is owned by a single control loop ([`BrokerLoop`]).
//! Handles ([`Broker`]) only talk to the loop through channels, so they can
//! be cloned freely across tasks without locking.
//!
//! Delivery is best effort: every subscriber has a small bounded queue, and
//! a message is dropped for a subscriber whose queue is full instead of
//! stalling the loop.

use rct_core::{RctError, RctResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of each subscriber queue
pub const SUBSCRIBER_CAPACITY: usize = 5;

/// Capacity of the publish channel
pub const PUBLISH_CAPACITY: usize = 1;

/// Requests handled by the control loop
#[derive(Debug)]
enum Control<T> {
    Subscribe(u64, mpsc::Sender<T>),
    Unsubscribe(u64),
}

/// Handle to a broker control loop
#[derive(Debug)]
pub struct Broker<T> {
    publish_tx: mpsc::Sender<T>,
    control_tx: mpsc::UnboundedSender<Control<T>>,
    next_id: Arc<AtomicU64>,
    registered: Arc<AtomicUsize>,
}

impl<T> Clone for Broker<T> {
    fn clone(&self) -> Self {
        Self {
            publish_tx: self.publish_tx.clone(),
            control_tx: self.control_tx.clone(),
            next_id: Arc::clone(&self.next_id),
            registered: Arc::clone(&self.registered),
        }
    }
}

impl<T: Clone + Send + 'static> Broker<T> {
    /// Create a broker handle and its control loop
    ///
    /// The loop does nothing until [`BrokerLoop::run`] is awaited or spawned.
    pub fn new() -> (Broker<T>, BrokerLoop<T>) {
        let (publish_tx, publish_rx) = mpsc::channel(PUBLISH_CAPACITY);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let registered = Arc::new(AtomicUsize::new(0));
        let broker = Broker {
            publish_tx,
            control_tx,
            next_id: Arc::new(AtomicU64::new(0)),
            registered: Arc::clone(&registered),
        };
        let control_loop = BrokerLoop {
            publish_rx,
            control_rx,
            subscribers: HashMap::new(),
            registered,
        };
        (broker, control_loop)
    }

    /// Register a new subscriber
    ///
    /// The registration is queued ahead of any message published after this
    /// call returns.
    pub fn subscribe(&self) -> Subscription<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        // a stopped loop drops the sender, so the subscription just ends
        let _ = self.control_tx.send(Control::Subscribe(id, tx));
        Subscription {
            id,
            rx,
            control_tx: self.control_tx.clone(),
        }
    }

    /// Deregister a subscriber and close its queue
    pub fn unsubscribe(&self, subscription: Subscription<T>) {
        drop(subscription);
    }

    /// Number of subscribers currently registered with the control loop
    ///
    /// Lags behind [`subscribe`](Self::subscribe) and dropped subscriptions
    /// until the loop has applied them.
    pub fn subscriber_count(&self) -> usize {
        self.registered.load(Ordering::Acquire)
    }

    /// Publish a message to all current subscribers
    ///
    /// Waits while the publish channel is full.
    ///
    /// # Errors
    /// Returns `RctError::Cancelled` if the control loop has stopped.
    pub async fn publish(&self, message: T) -> RctResult<()> {
        self.publish_tx
            .send(message)
            .await
            .map_err(|_| RctError::Cancelled)
    }
}

/// A subscriber's delivery queue
///
/// Dropping the subscription deregisters it.
#[derive(Debug)]
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::Receiver<T>,
    control_tx: mpsc::UnboundedSender<Control<T>>,
}

impl<T> Subscription<T> {
    /// Receive the next message
    ///
    /// Returns None once the subscription is closed by the broker.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Receive a message if one is queued
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        let _ = self.control_tx.send(Control::Unsubscribe(self.id));
    }
}

/// The broker's control loop, owning the subscriber set
#[derive(Debug)]
pub struct BrokerLoop<T> {
    publish_rx: mpsc::Receiver<T>,
    control_rx: mpsc::UnboundedReceiver<Control<T>>,
    subscribers: HashMap<u64, mpsc::Sender<T>>,
    registered: Arc<AtomicUsize>,
}

impl<T: Clone + Send + 'static> BrokerLoop<T> {
    /// Run until `token` is cancelled or every handle is gone
    ///
    /// Pending control requests are always applied before the next publish.
    pub async fn run(mut self, token: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                Some(control) = self.control_rx.recv() => self.apply(control),
                message = self.publish_rx.recv() => match message {
                    Some(message) => self.deliver(message),
                    None => break,
                },
            }
        }
        log::debug!("broker stopped with {} subscribers", self.subscribers.len());
    }

    fn apply(&mut self, control: Control<T>) {
        match control {
            Control::Subscribe(id, tx) => {
                self.subscribers.insert(id, tx);
            }
            Control::Unsubscribe(id) => {
                self.subscribers.remove(&id);
            }
        }
        self.registered.store(self.subscribers.len(), Ordering::Release);
    }

    fn deliver(&mut self, message: T) {
        self.subscribers.retain(|id, tx| match tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::trace!("subscriber {} is full, dropping message", id);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        self.registered.store(self.subscribers.len(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn start() -> (Broker<u32>, CancellationToken) {
        let (broker, control_loop) = Broker::new();
        let token = CancellationToken::new();
        tokio::spawn(control_loop.run(token.clone()));
        (broker, token)
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let (broker, _token) = start();
        let mut a = broker.subscribe();
        let mut b = broker.subscribe();

        broker.publish(1).await.unwrap();
        broker.publish(2).await.unwrap();

        assert_eq!(a.recv().await, Some(1));
        assert_eq!(a.recv().await, Some(2));
        assert_eq!(b.recv().await, Some(1));
        assert_eq!(b.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block_others() {
        let (broker, _token) = start();
        let mut stalled = broker.subscribe();
        let mut active = broker.subscribe();

        for i in 0..20 {
            broker.publish(i).await.unwrap();
            let got = timeout(Duration::from_secs(1), active.recv()).await.unwrap();
            assert_eq!(got, Some(i));
        }

        // only the first queue-full of messages reached the stalled subscriber
        let mut received = Vec::new();
        while let Some(v) = stalled.try_recv() {
            received.push(v);
        }
        assert_eq!(received, (0..SUBSCRIBER_CAPACITY as u32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_queue() {
        let (broker, _token) = start();
        let a = broker.subscribe();
        let mut b = broker.subscribe();
        broker.unsubscribe(a);

        broker.publish(7).await.unwrap();
        assert_eq!(b.recv().await, Some(7));
        assert_eq!(broker.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_messages_before_subscribe_are_not_delivered() {
        let (broker, _token) = start();
        let mut early = broker.subscribe();
        broker.publish(1).await.unwrap();
        assert_eq!(early.recv().await, Some(1));

        let mut late = broker.subscribe();
        broker.publish(2).await.unwrap();
        assert_eq!(late.recv().await, Some(2));
        assert_eq!(early.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_cancel_stops_loop() {
        let (broker, control_loop) = Broker::<u32>::new();
        let token = CancellationToken::new();
        let handle = tokio::spawn(control_loop.run(token.clone()));
        let mut sub = broker.subscribe();

        token.cancel();
        handle.await.unwrap();

        assert_eq!(sub.recv().await, None);
        assert!(matches!(broker.publish(1).await, Err(RctError::Cancelled)));
    }
}
