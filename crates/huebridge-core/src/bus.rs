//! Cluster bus between the master and its workers
//!
//! The emulator only needs `publish(channel, payload)` and
//! `subscribe(channel)`. `LocalBus` is the in-process implementation used when
//! master and worker share a process, and by tests.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Master → worker: merged device state
pub const UPDATES_CHANNEL: &str = "hue-emulator.updates";
/// Worker → master: device commands and resync requests
pub const COMMANDS_CHANNEL: &str = "hue-emulator.commands";

#[derive(Error, Debug)]
pub enum BusError {
    #[error("failed to encode bus message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("bus is closed, cannot use channel {0}")]
    Closed(String),
}

/// Pub/sub transport connecting emulator nodes
pub trait ClusterBus: Send + Sync {
    /// Publish a raw payload, returns the number of subscribers it reached
    fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<usize, BusError>;

    /// Subscribe to a channel. The receiver yields `None` once the bus closes.
    fn subscribe(&self, channel: &str) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, BusError>;
}

/// Encode a message as JSON and publish it
pub fn publish_json<T: Serialize>(
    bus: &dyn ClusterBus,
    channel: &str,
    message: &T,
) -> Result<usize, BusError> {
    let payload = serde_json::to_vec(message)?;
    bus.publish(channel, payload)
}

/// In-process cluster bus
#[derive(Default)]
pub struct LocalBus {
    channels: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>>,
    closed: AtomicBool,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every subscriber sender. Subscribed loops see their channel close.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut channels = self.channels();
        let count: usize = channels.values().map(Vec::len).sum();
        channels.clear();
        debug!(subscribers = count, "Cluster bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of live subscribers on a channel
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels()
            .get(channel)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ClusterBus for LocalBus {
    fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<usize, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed(channel.to_string()));
        }

        let mut channels = self.channels();
        let Some(subscribers) = channels.get_mut(channel) else {
            trace!(channel, "Publish with no subscribers");
            return Ok(0);
        };

        // Unbounded send never blocks; drop subscribers that went away
        subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        trace!(channel, delivered = subscribers.len(), bytes = payload.len(), "Published");
        Ok(subscribers.len())
    }

    fn subscribe(&self, channel: &str) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed(channel.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.channels()
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        debug!(channel, "Subscribed to cluster bus channel");
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = LocalBus::new();
        let mut a = bus.subscribe("chan").unwrap();
        let mut b = bus.subscribe("chan").unwrap();
        let mut other = bus.subscribe("other").unwrap();

        assert_eq!(bus.publish("chan", b"hello".to_vec()).unwrap(), 2);
        assert_eq!(a.recv().await.unwrap(), b"hello");
        assert_eq!(b.recv().await.unwrap(), b"hello");
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = LocalBus::new();
        assert_eq!(bus.publish("nobody", b"x".to_vec()).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let bus = LocalBus::new();
        let rx = bus.subscribe("chan").unwrap();
        drop(rx);
        assert_eq!(bus.publish("chan", b"x".to_vec()).unwrap(), 0);
        assert_eq!(bus.subscriber_count("chan"), 0);
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let bus = LocalBus::new();
        let mut rx = bus.subscribe("chan").unwrap();
        bus.close();

        assert!(rx.recv().await.is_none());
        assert!(matches!(
            bus.publish("chan", b"x".to_vec()),
            Err(BusError::Closed(_))
        ));
        assert!(bus.subscribe("chan").is_err());
    }

    #[tokio::test]
    async fn test_publish_json() {
        let bus = LocalBus::new();
        let mut rx = bus.subscribe(UPDATES_CHANNEL).unwrap();
        publish_json(&bus, UPDATES_CHANNEL, &serde_json::json!({"i": "x"})).unwrap();
        assert_eq!(rx.recv().await.unwrap(), br#"{"i":"x"}"#);
    }
}
