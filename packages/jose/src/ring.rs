//! Per-algorithm key rings
//!
//! A ring is an ordered list of keys behind an atomically swapped snapshot.
//! Readers load the current snapshot without locking; writers publish a new
//! list, so a reader never observes a half-updated ring.

use crate::key::KeyMaterial;
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Ordered keys for one algorithm with a round-robin cursor
#[derive(Debug)]
pub struct KeyRing {
    keys: ArcSwap<Vec<Arc<KeyMaterial>>>,
    cursor: AtomicUsize,
}

impl Default for KeyRing {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyRing {
    /// Create an empty ring
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: ArcSwap::from_pointee(Vec::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Insert `key`, replacing in place an entry with the same label.
    ///
    /// Returns `true` when an entry was replaced.
    pub fn insert(&self, key: Arc<KeyMaterial>) -> bool {
        let previous = self.keys.rcu(|current| {
            let mut next = Vec::clone(current);
            match next.iter().position(|k| k.label() == key.label()) {
                Some(index) => next[index] = Arc::clone(&key),
                None => next.push(Arc::clone(&key)),
            }
            next
        });

        let replaced = previous.iter().any(|k| k.label() == key.label());
        if replaced {
            info!(label = key.label(), algorithm = %key.algorithm(), "replacing JWK");
        }
        replaced
    }

    /// Next key in round-robin order, `None` for an empty ring.
    #[must_use]
    pub fn next(&self) -> Option<Arc<KeyMaterial>> {
        let keys = self.keys.load();
        match keys.len() {
            0 => None,
            1 => Some(Arc::clone(&keys[0])),
            len => {
                let index = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
                Some(Arc::clone(&keys[index]))
            }
        }
    }

    /// Current list of keys, in insertion order
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Arc<KeyMaterial>>> {
        self.keys.load_full()
    }

    /// Number of keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.load().len()
    }

    /// True when the ring holds no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.load().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::Algorithm;

    fn key(secret: &[u8], kid: &str) -> Arc<KeyMaterial> {
        Arc::new(KeyMaterial::from_secret(Algorithm::HS256, secret, Some(kid.to_string())).unwrap())
    }

    #[test]
    fn replacement_keeps_position() {
        let ring = KeyRing::new();
        assert!(!ring.insert(key(b"a", "k1")));
        assert!(!ring.insert(key(b"b", "k2")));
        assert!(ring.insert(key(b"c", "k1")));

        let keys = ring.snapshot();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].label(), "k1");
        assert_eq!(keys[1].label(), "k2");
        // the replacement signs differently from the original
        let signature = keys[0].sign(b"x").unwrap();
        assert!(key(b"c", "k1").verify(&signature, b"x").unwrap());
    }

    #[test]
    fn round_robin_visits_every_key() {
        let ring = KeyRing::new();
        assert!(ring.next().is_none());
        ring.insert(key(b"a", "k1"));
        ring.insert(key(b"b", "k2"));
        ring.insert(key(b"c", "k3"));

        let labels: Vec<String> = (0..6)
            .map(|_| ring.next().unwrap().label().to_string())
            .collect();
        assert_eq!(labels, ["k1", "k2", "k3", "k1", "k2", "k3"]);
    }

    #[test]
    fn single_key_is_always_returned() {
        let ring = KeyRing::new();
        ring.insert(key(b"a", "only"));
        for _ in 0..3 {
            assert_eq!(ring.next().unwrap().label(), "only");
        }
    }
}
