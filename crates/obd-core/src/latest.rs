//! Latest-value slot shared between one producer and many readers
//!
//! The producer builds a complete replacement off to the side and swaps it
//! in with [`Latest::publish`]. Readers clone the `Arc` under a short read
//! lock, so they only ever observe a fully built value.

use std::sync::Arc;

use parking_lot::RwLock;

/// Atomically replaced "latest completed value" cell
#[derive(Debug)]
pub struct Latest<T> {
    slot: RwLock<Option<Arc<T>>>,
}

impl<T> Latest<T> {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Replace the current value wholesale
    pub fn publish(&self, value: T) {
        self.publish_arc(Arc::new(value));
    }

    pub fn publish_arc(&self, value: Arc<T>) {
        *self.slot.write() = Some(value);
    }

    /// Latest completed value, if any refresh has finished yet
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Drop the current value
    pub fn clear(&self) {
        *self.slot.write() = None;
    }
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_until_published() {
        let latest: Latest<u32> = Latest::new();
        assert!(latest.get().is_none());

        latest.publish(5);
        assert_eq!(latest.get().as_deref(), Some(&5));

        latest.clear();
        assert!(!latest.is_set());
    }

    #[test]
    fn test_readers_keep_their_instance_across_replacement() {
        let latest = Latest::new();
        latest.publish(vec![1, 2, 3]);

        let held = latest.get().unwrap();
        latest.publish(vec![9]);

        assert_eq!(*held, vec![1, 2, 3]);
        assert_eq!(*latest.get().unwrap(), vec![9]);
    }

    #[test]
    fn test_concurrent_readers_never_see_partial_values() {
        // Each published value is a vector whose elements are all equal;
        // a torn read would show mixed elements.
        let latest = Arc::new(Latest::new());
        latest.publish(vec![0u32; 64]);

        let writer = {
            let latest = latest.clone();
            std::thread::spawn(move || {
                for i in 1..500u32 {
                    latest.publish(vec![i; 64]);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let latest = latest.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let value = latest.get().unwrap();
                        assert!(value.iter().all(|v| *v == value[0]));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
