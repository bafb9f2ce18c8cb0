use std::future::Future;
use std::pin::Pin;

use crate::error::StoreError;
use crate::record::Ttl;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// One page of a cursor-based keyspace scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub keys: Vec<Vec<u8>>,
    /// Continuation cursor. `0` means the iteration is complete.
    pub cursor: u64,
}

impl ScanPage {
    pub fn is_last(&self) -> bool {
        self.cursor == 0
    }
}

/// Primitives of a live key-value store, as used by the store adapters.
///
/// The pipeline doesn't know the wire protocol behind these calls.
/// For the pipeline, a store is just this trait.
pub trait KeyValueStore: Send + Sync {
    /// Fetch one page of keys starting at `cursor` (`0` starts a new scan).
    /// `count` is a hint for the page size.
    fn scan(&self, cursor: u64, count: usize) -> StoreFuture<'_, ScanPage>;

    /// Opaque serialized snapshot of the key's value.
    /// `None` if the key no longer exists.
    fn dump<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, Option<Vec<u8>>>;

    /// Remaining time-to-live in milliseconds.
    /// `-1` when the key has no expiration, `-2` when it does not exist.
    fn pttl<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, i64>;

    /// Create the key from a snapshot, replacing any existing value.
    /// [`Ttl::NONE`] means no expiration.
    fn restore<'a>(&'a self, key: &'a [u8], ttl: Ttl, payload: &'a [u8]) -> StoreFuture<'a, ()>;
}
