//! Redis driver for the store adapters: SCAN, DUMP, PTTL and
//! RESTORE … REPLACE over one multiplexed async connection.

use redis::RedisError;
use redis::aio::MultiplexedConnection;

use rump_api::{KeyValueStore, ScanPage, StoreError, StoreFuture, Ttl};

fn store_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
        StoreError::io(e.to_string())
    } else {
        StoreError::response(e.to_string())
    }
}

/// Handle to one Redis database.
///
/// Cheap to share: every call clones the multiplexed connection, and
/// concurrent calls are pipelined over the same socket.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to `redis://[user:password@]host[:port][/db]` (or `rediss://`,
    /// `redis+unix://`) and check the connection with a PING.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::config(format!("invalid store url: {e}")))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| store_error(e).with_context("connect"))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| store_error(e).with_context("ping"))?;

        tracing::debug!(db = conn_db(url), "redis connected");
        Ok(Self { conn })
    }
}

/// Database index from the URL path, for logs only.
fn conn_db(url: &str) -> i64 {
    redis::parse_redis_url(url)
        .and_then(|u| u.path_segments()?.next()?.parse().ok())
        .unwrap_or(0)
}

impl KeyValueStore for RedisStore {
    fn scan(&self, cursor: u64, count: usize) -> StoreFuture<'_, ScanPage> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let (cursor, keys): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn)
                .await
                .map_err(store_error)?;
            Ok(ScanPage { keys, cursor })
        })
    }

    fn dump<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let payload: Option<Vec<u8>> = redis::cmd("DUMP")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(store_error)?;
            Ok(payload)
        })
    }

    fn pttl<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, i64> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let reply: i64 = redis::cmd("PTTL")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(store_error)?;
            Ok(reply)
        })
    }

    fn restore<'a>(&'a self, key: &'a [u8], ttl: Ttl, payload: &'a [u8]) -> StoreFuture<'a, ()> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            // RESTORE takes 0 as "no expiration".
            let _: () = redis::cmd("RESTORE")
                .arg(key)
                .arg(ttl.as_millis())
                .arg(payload)
                .arg("REPLACE")
                .query_async(&mut conn)
                .await
                .map_err(store_error)?;
            Ok(())
        })
    }
}
