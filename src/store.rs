//! Debounced on-disk order book snapshot
//!
//! The whole open-order map is written to a single file, replaced
//! atomically (write-temp-then-rename) so a crash mid-write never leaves a
//! truncated snapshot. Writes are debounced by `should_save`: at most one
//! per interval, and an empty book is written exactly once after the last
//! non-empty snapshot.

use crate::error::{Result, XBridgeError};
use crate::order::OrderMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

pub const SNAPSHOT_VERSION: u32 = 1;
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    orders: OrderMap,
}

#[derive(Debug)]
struct SaveState {
    last_save: Option<Instant>,
    last_empty: bool,
}

pub struct OrderStore {
    path: PathBuf,
    interval: Duration,
    state: Mutex<SaveState>,
}

impl OrderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_interval(path, DEFAULT_SAVE_INTERVAL)
    }

    pub fn with_interval(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            state: Mutex::new(SaveState {
                last_save: None,
                last_empty: false,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// The debounce predicate: save when the interval since the last
    /// successful write has elapsed, and the book is non-empty or the last
    /// snapshot was (so a newly empty book is cleared exactly once).
    pub fn should_save(&self, orders: &OrderMap) -> bool {
        let state = self.state.lock().expect("store lock poisoned");
        if orders.is_empty() && state.last_empty {
            return false;
        }
        match state.last_save {
            None => true,
            Some(at) => at.elapsed() >= self.interval,
        }
    }

    /// Write the snapshot unless debounced; returns whether a write
    /// happened. `force` bypasses the interval but never re-writes an
    /// already-empty book.
    pub fn write(&self, orders: &OrderMap, force: bool) -> Result<bool> {
        {
            let state = self.state.lock().expect("store lock poisoned");
            if orders.is_empty() && state.last_empty {
                return Ok(false);
            }
        }
        if !force && !self.should_save(orders) {
            return Ok(false);
        }

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            orders: orders.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = self.temp_path();
        fs::write(&tmp, &bytes).map_err(|e| {
            XBridgeError::PersistenceFailure(format!("write {}: {}", tmp.display(), e))
        })?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(XBridgeError::PersistenceFailure(format!(
                "rename into {}: {}",
                self.path.display(),
                e
            )));
        }

        let mut state = self.state.lock().expect("store lock poisoned");
        state.last_save = Some(Instant::now());
        state.last_empty = orders.is_empty();
        debug!(orders = orders.len(), path = %self.path.display(), "order book snapshot written");
        Ok(true)
    }

    /// Load the snapshot. A missing file is an empty book, not an error.
    pub fn read(&self) -> Result<OrderMap> {
        if !self.path.exists() {
            return Ok(OrderMap::new());
        }
        let bytes = fs::read(&self.path).map_err(|e| {
            XBridgeError::PersistenceFailure(format!("read {}: {}", self.path.display(), e))
        })?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(XBridgeError::PersistenceFailure(format!(
                "unsupported snapshot version {} in {}",
                snapshot.version,
                self.path.display()
            )));
        }
        Ok(snapshot.orders)
    }

    fn temp_path(&self) -> PathBuf {
        use rand::Rng;
        let suffix: u16 = rand::thread_rng().gen();
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "orders.dat".to_string());
        name.push_str(&format!(".{:04x}", suffix));
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Order, OrderState};

    fn temp_store(interval: Duration) -> OrderStore {
        use rand::Rng;
        let suffix: u64 = rand::thread_rng().gen();
        let path = std::env::temp_dir().join(format!("xbridge-store-{:016x}.dat", suffix));
        OrderStore::with_interval(path, interval)
    }

    fn sample_orders(n: usize) -> OrderMap {
        let mut orders = OrderMap::new();
        for i in 0..n {
            let order = Order::new(
                vec![i as u8 + 1; 32],
                "LTC",
                10_000_000 + i as u64,
                "DOGE",
                5_000_000,
            );
            orders.insert(order.id, order);
        }
        orders
    }

    #[test]
    fn round_trip_preserves_orders() {
        let store = temp_store(Duration::from_secs(0));
        let mut orders = sample_orders(3);
        let id = *orders.keys().next().unwrap();
        orders
            .get_mut(&id)
            .unwrap()
            .transition(OrderState::Accepted, None)
            .unwrap();

        assert!(store.write(&orders, false).unwrap());
        let restored = store.read().unwrap();
        assert_eq!(restored, orders);

        let _ = fs::remove_file(store.path());
    }

    #[test]
    fn missing_file_reads_as_empty_book() {
        let store = temp_store(Duration::from_secs(0));
        assert!(!store.exists());
        assert!(store.read().unwrap().is_empty());
    }

    #[test]
    fn should_save_debounces_after_write() {
        let store = temp_store(Duration::from_millis(50));
        let orders = sample_orders(2);

        assert!(store.should_save(&orders));
        assert!(store.write(&orders, false).unwrap());

        // immediately after a successful write of the same set
        assert!(!store.should_save(&orders));
        assert!(!store.write(&orders, false).unwrap());

        // true again once the interval elapses, with no changes
        std::thread::sleep(Duration::from_millis(60));
        assert!(store.should_save(&orders));
        assert!(store.write(&orders, false).unwrap());

        let _ = fs::remove_file(store.path());
    }

    #[test]
    fn empty_book_is_cleared_exactly_once() {
        let store = temp_store(Duration::from_secs(0));
        let orders = sample_orders(1);
        let empty = OrderMap::new();

        assert!(store.write(&orders, false).unwrap());
        // one write clears the now-empty book
        assert!(store.write(&empty, false).unwrap());
        assert!(store.read().unwrap().is_empty());
        // no repeated empty writes, not even forced
        assert!(!store.should_save(&empty));
        assert!(!store.write(&empty, false).unwrap());
        assert!(!store.write(&empty, true).unwrap());
        // a non-empty book resumes writing
        assert!(store.write(&orders, false).unwrap());

        let _ = fs::remove_file(store.path());
    }

    #[test]
    fn force_bypasses_interval() {
        let store = temp_store(Duration::from_secs(3600));
        let orders = sample_orders(1);
        assert!(store.write(&orders, false).unwrap());
        assert!(!store.write(&orders, false).unwrap());
        assert!(store.write(&orders, true).unwrap());

        let _ = fs::remove_file(store.path());
    }

    #[test]
    fn rejects_unknown_snapshot_version() {
        let store = temp_store(Duration::from_secs(0));
        fs::write(store.path(), br#"{"version":99,"orders":{}}"#).unwrap();
        let err = store.read().unwrap_err();
        assert!(matches!(err, XBridgeError::PersistenceFailure(_)));

        let _ = fs::remove_file(store.path());
    }
}
