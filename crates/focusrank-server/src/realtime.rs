//! Keyed broadcast fan-out.
//!
//! One `tokio::sync::broadcast` channel per key (squad). Channels are created
//! on first subscribe and dropped by [`Fanout::prune`] once nobody listens.
//! Delivery is at-least-once from the consumer's point of view: a lagging
//! receiver skips ahead, and consumers must tolerate repeats.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use tokio::sync::broadcast;

pub struct Fanout<K, T> {
    channels: Mutex<HashMap<K, broadcast::Sender<T>>>,
    capacity: usize,
}

impl<K, T> Fanout<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, key: &K) -> broadcast::Receiver<T> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send `value` to every current subscriber of `key`. Returns how many
    /// receivers it reached; zero when nobody is listening.
    pub fn publish(&self, key: &K, value: T) -> usize {
        let channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match channels.get(key) {
            Some(tx) => tx.send(value).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop channels with no receivers left. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = channels.len();
        channels.retain(|_, tx| tx.receiver_count() > 0);
        before - channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn test_publish_reaches_only_its_key() {
        let fanout: Fanout<&str, u32> = Fanout::new(8);
        let mut a = fanout.subscribe(&"a");
        let mut b = fanout.subscribe(&"b");

        assert_eq!(fanout.publish(&"a", 1), 1);
        assert_eq!(a.recv().await.unwrap(), 1);
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let fanout: Fanout<u8, u8> = Fanout::new(8);
        assert_eq!(fanout.publish(&1, 1), 0);

        let rx = fanout.subscribe(&1);
        let _other = fanout.subscribe(&2);
        assert_eq!(fanout.prune(), 0);
        drop(rx);
        assert_eq!(fanout.publish(&1, 2), 0);
        assert_eq!(fanout.prune(), 1);
        assert_eq!(fanout.publish(&2, 3), 1);
    }

    #[tokio::test]
    async fn test_slow_receiver_lags() {
        let fanout: Fanout<u8, u32> = Fanout::new(2);
        let mut rx = fanout.subscribe(&0);
        for i in 0..5 {
            fanout.publish(&0, i);
        }
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(rx.recv().await.unwrap(), 3);
        assert_eq!(rx.recv().await.unwrap(), 4);
    }
}
