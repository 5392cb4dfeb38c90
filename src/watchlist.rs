//! Favorited coin identifiers, persisted write-through.

use crate::store::KeyValueStore;

/// Key holding the JSON array of watched ids.
pub const WATCHLIST_KEY: &str = "crypto-watchlist";

pub struct WatchlistStore {
    backend: Box<dyn KeyValueStore>,
    ids: Vec<String>,
}

impl WatchlistStore {
    /// Reads the persisted set. Missing, unreadable or corrupt data yields an
    /// empty watchlist.
    pub fn load(backend: Box<dyn KeyValueStore>) -> Self {
        let ids = match backend.get(WATCHLIST_KEY) {
            Ok(Some(raw)) => decode_ids(&raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("watchlist.load.error {:#}", e);
                Vec::new()
            }
        };
        log::debug!("watchlist.load count={}", ids.len());
        Self { backend, ids }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|x| x == id)
    }

    /// Appends `id` unless already present.
    pub fn add(&mut self, id: &str) {
        if self.contains(id) {
            return;
        }
        self.ids.push(id.to_string());
        self.persist();
    }

    pub fn remove(&mut self, id: &str) {
        let before = self.ids.len();
        self.ids.retain(|x| x != id);
        if self.ids.len() != before {
            self.persist();
        }
    }

    /// Flips membership and returns whether `id` is now watched.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.contains(id) {
            self.remove(id);
            false
        } else {
            self.add(id);
            true
        }
    }

    // Persistence failures must not reach callers; the in-memory set stays
    // authoritative for this session.
    fn persist(&self) {
        let encoded = match serde_json::to_string(&self.ids) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("watchlist.encode.error {}", e);
                return;
            }
        };
        if let Err(e) = self.backend.set(WATCHLIST_KEY, &encoded) {
            log::warn!("watchlist.persist.error count={} {:#}", self.ids.len(), e);
        }
    }
}

fn decode_ids(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(ids) => {
            let mut out: Vec<String> = Vec::with_capacity(ids.len());
            for id in ids {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
            out
        }
        Err(e) => {
            log::warn!("watchlist.load.corrupt {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::anyhow;

    use super::*;
    use crate::store::MemoryStore;

    /// Shares one `MemoryStore` between the watchlist and the test.
    #[derive(Clone, Default)]
    struct SharedStore(Arc<MemoryStore>);

    impl KeyValueStore for SharedStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.0.get(key)
        }
        fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.0.set(key, value)
        }
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Err(anyhow!("disk on fire"))
        }
        fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            Err(anyhow!("disk on fire"))
        }
    }

    fn persisted(store: &SharedStore) -> Option<String> {
        store.get(WATCHLIST_KEY).unwrap()
    }

    #[test]
    fn test_load_empty_when_absent() {
        let wl = WatchlistStore::load(Box::new(MemoryStore::new()));
        assert!(wl.is_empty());
    }

    #[test]
    fn test_load_corrupt_is_empty() {
        let store = SharedStore::default();
        store.set(WATCHLIST_KEY, "{not json").unwrap();
        assert!(WatchlistStore::load(Box::new(store.clone())).is_empty());

        store.set(WATCHLIST_KEY, r#"[1, 2, 3]"#).unwrap();
        assert!(WatchlistStore::load(Box::new(store)).is_empty());
    }

    #[test]
    fn test_load_collapses_duplicates() {
        let store = SharedStore::default();
        store
            .set(WATCHLIST_KEY, r#"["bitcoin","ethereum","bitcoin"]"#)
            .unwrap();
        let wl = WatchlistStore::load(Box::new(store));
        assert_eq!(wl.ids(), ["bitcoin", "ethereum"]);
    }

    #[test]
    fn test_add_then_contains_and_persists() {
        let store = SharedStore::default();
        let mut wl = WatchlistStore::load(Box::new(store.clone()));
        wl.add("bitcoin");
        assert!(wl.contains("bitcoin"));
        assert_eq!(persisted(&store).as_deref(), Some(r#"["bitcoin"]"#));
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut wl = WatchlistStore::load(Box::new(MemoryStore::new()));
        wl.add("bitcoin");
        wl.add("ethereum");
        wl.add("bitcoin");
        assert_eq!(wl.ids(), ["bitcoin", "ethereum"]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let store = SharedStore::default();
        let mut wl = WatchlistStore::load(Box::new(store.clone()));
        wl.remove("dogecoin");
        assert!(wl.is_empty());
        assert_eq!(persisted(&store), None);

        wl.add("bitcoin");
        wl.remove("dogecoin");
        assert_eq!(wl.ids(), ["bitcoin"]);
    }

    #[test]
    fn test_toggle_twice_restores_membership() {
        let store = SharedStore::default();
        let mut wl = WatchlistStore::load(Box::new(store.clone()));
        wl.add("ethereum");

        assert!(wl.toggle("bitcoin"));
        assert!(wl.contains("bitcoin"));
        assert!(!wl.toggle("bitcoin"));
        assert!(!wl.contains("bitcoin"));

        assert!(!wl.toggle("ethereum"));
        assert!(wl.toggle("ethereum"));
        assert_eq!(wl.ids(), ["ethereum"]);
        assert_eq!(persisted(&store).as_deref(), Some(r#"["ethereum"]"#));
    }

    #[test]
    fn test_survives_reload() {
        let store = SharedStore::default();
        {
            let mut wl = WatchlistStore::load(Box::new(store.clone()));
            wl.add("solana");
            wl.add("cardano");
            wl.remove("solana");
        }
        let wl = WatchlistStore::load(Box::new(store));
        assert_eq!(wl.ids(), ["cardano"]);
    }

    #[test]
    fn test_backend_failures_are_swallowed() {
        let mut wl = WatchlistStore::load(Box::new(FailingStore));
        assert!(wl.is_empty());
        wl.add("bitcoin");
        assert!(wl.contains("bitcoin"));
        assert!(!wl.toggle("bitcoin"));
        assert!(wl.is_empty());
    }
}
