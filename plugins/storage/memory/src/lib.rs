use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use rump_api::{KeyValueStore, ScanPage, StoreError, StoreFuture, Ttl};

/// Prefix of every snapshot produced by [`MemoryStore`]'s `dump`.
const SNAPSHOT_MAGIC: &[u8] = b"RMEM";

// ═══════════════════════════════════════════════════════════════
//  MemoryStore
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process key-value store with the same primitives as a live server.
///
/// Keys are scanned in byte order; the scan cursor is a position among all
/// stored entries, so a page may come back short or empty while expired
/// entries are stepped over. Expired entries are hidden on read, never
/// removed. Snapshots are the raw value behind a short magic prefix, so
/// `restore` rejects payloads it did not produce.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain write, like `SET key value [PX ttl]`.
    pub async fn set(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, ttl: Option<Duration>) {
        let entry = Entry {
            value: value.into(),
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.entries.write().await.insert(key.into(), entry);
    }

    /// Plain read, like `GET key`.
    pub async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.get(key).filter(|e| e.is_live(now)).map(|e| e.value.clone())
    }

    /// Live keys and values, in key order.
    pub async fn snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().await.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn scan(&self, cursor: u64, count: usize) -> StoreFuture<'_, ScanPage> {
        Box::pin(async move {
            let now = Instant::now();
            let entries = self.entries.read().await;
            let start = usize::try_from(cursor)
                .map_err(|_| StoreError::response(format!("invalid cursor {cursor}")))?;

            // The cursor indexes every entry, expired or not, so a key that
            // lives through the whole scan is never shifted past it.
            let mut end = start;
            let mut keys = Vec::new();
            for (key, entry) in entries.iter().skip(start).take(count.max(1)) {
                end += 1;
                if entry.is_live(now) {
                    keys.push(key.clone());
                }
            }

            Ok(ScanPage {
                keys,
                cursor: if end < entries.len() { end as u64 } else { 0 },
            })
        })
    }

    fn dump<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            Ok(self.get(key).await.map(|value| {
                let mut snapshot = Vec::with_capacity(SNAPSHOT_MAGIC.len() + value.len());
                snapshot.extend_from_slice(SNAPSHOT_MAGIC);
                snapshot.extend_from_slice(&value);
                snapshot
            }))
        })
    }

    fn pttl<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, i64> {
        Box::pin(async move {
            let now = Instant::now();
            let entries = self.entries.read().await;
            let reply = match entries.get(key) {
                Some(e) if e.is_live(now) => match e.expires_at {
                    None => -1,
                    Some(at) => (at - now).as_millis().max(1) as i64,
                },
                _ => -2,
            };
            Ok(reply)
        })
    }

    fn restore<'a>(&'a self, key: &'a [u8], ttl: Ttl, payload: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let value = payload
                .strip_prefix(SNAPSHOT_MAGIC)
                .ok_or_else(|| StoreError::response("DUMP payload version or checksum are wrong"))?;
            let ttl = (!ttl.is_none()).then(|| Duration::from_millis(ttl.as_millis()));
            self.set(key, value, ttl).await;
            Ok(())
        })
    }
}
