//! Shared types of the rump workspace: the [`Record`] that flows through a
//! pipeline and the [`KeyValueStore`] primitives a store driver provides.

pub mod error;
pub mod record;
pub mod store;

pub use error::{ErrorKind, StoreError};
pub use record::{InvalidTtl, Record, Ttl};
pub use store::{KeyValueStore, ScanPage, StoreFuture};
