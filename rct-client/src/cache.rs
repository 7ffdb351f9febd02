//! Last-value response cache

use parking_lot::RwLock;
use rct_core::{Datagram, Identifier};
use std::collections::HashMap;
use std::time::Instant;

/// Most recent datagram per identifier, with its receipt time
///
/// Entries never expire on their own; callers decide on staleness from the
/// returned timestamp.
#[derive(Debug, Default)]
pub struct Cache {
    entries: RwLock<HashMap<Identifier, (Datagram, Instant)>>,
}

impl Cache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached datagram for `identifier` and when it was stored
    pub fn get(&self, identifier: Identifier) -> Option<(Datagram, Instant)> {
        self.entries.read().get(&identifier).cloned()
    }

    /// Store `datagram`, replacing any previous entry for its identifier
    pub fn put(&self, datagram: Datagram) {
        self.put_at(datagram, Instant::now());
    }

    pub(crate) fn put_at(&self, datagram: Datagram, received: Instant) {
        self.entries
            .write()
            .insert(datagram.identifier(), (datagram, received));
    }

    /// Number of cached identifiers
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check whether nothing has been cached yet
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rct_core::Command;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_get_missing() {
        let cache = Cache::new();
        assert!(cache.get(Identifier::BATTERY_SOC).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let cache = Cache::new();
        let id = Identifier::BATTERY_SOC;
        cache.put(Datagram::from_f32(Command::Response, id, 0.25));
        let before = Instant::now();
        cache.put(Datagram::from_f32(Command::Response, id, 0.5));

        let (dg, ts) = cache.get(id).unwrap();
        assert_eq!(dg.f32().unwrap(), 0.5);
        assert!(ts >= before);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_keeps_identifiers_apart() {
        let cache = Cache::new();
        let earlier = Instant::now()
            .checked_sub(Duration::from_secs(10))
            .unwrap_or_else(Instant::now);
        cache.put_at(Datagram::from_u8(Command::Response, Identifier::INVERTER_STATE, 11), earlier);
        cache.put(Datagram::from_f32(Command::Response, Identifier::BATTERY_POWER_W, -300.0));

        let (state, ts) = cache.get(Identifier::INVERTER_STATE).unwrap();
        assert_eq!(state.u8().unwrap(), 11);
        assert_eq!(ts, earlier);
        assert_eq!(cache.get(Identifier::BATTERY_POWER_W).unwrap().0.f32().unwrap(), -300.0);
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let cache = Arc::new(Cache::new());
        let id = Identifier::TOTAL_GRID_POWER_W;

        let writer = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..1000 {
                    cache.put(Datagram::from_i32(Command::Response, id, i));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let mut last = -1;
                    for _ in 0..1000 {
                        if let Some((dg, _)) = cache.get(id) {
                            let value = dg.i32().unwrap();
                            assert!(value >= last);
                            last = value;
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(cache.get(id).unwrap().0.i32().unwrap(), 999);
    }
}
