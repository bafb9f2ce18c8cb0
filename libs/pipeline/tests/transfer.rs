//! End-to-end transfers between in-memory stores and dump files.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use pipeline::frame::FrameReader;
use pipeline::source::AdapterFuture;
use pipeline::{
    BusReader, Endpoint, FileSink, FileSource, FrameError, Orchestrator, Outcome, PipelineConfig, PipelineError, Sink,
    StoreSink, StoreSource,
};
use rump_api::{KeyValueStore, Record, ScanPage, StoreError, StoreFuture, Ttl};
use storage_memory::MemoryStore;

// ═══════════════════════════════════════════════════════════════
//  Fixtures
// ═══════════════════════════════════════════════════════════════

/// key1..key20 → value1..value20.
async fn seeded(ttl: Option<Duration>) -> (Arc<MemoryStore>, BTreeMap<Vec<u8>, Vec<u8>>) {
    let store = Arc::new(MemoryStore::new());
    for i in 1..=20 {
        store.set(format!("key{i}"), format!("value{i}"), ttl).await;
    }
    let expected = store.snapshot().await;
    (store, expected)
}

/// Wraps a memory store with injectable failures and a log of restored keys.
#[derive(Default)]
struct FaultyStore {
    inner: Arc<MemoryStore>,
    scan_fails_from_page: Option<usize>,
    dump_fails: HashSet<Vec<u8>>,
    pttl_fails: HashSet<Vec<u8>>,
    restore_fails: HashSet<Vec<u8>>,
    pages: AtomicUsize,
    restored: Mutex<Vec<Vec<u8>>>,
}

impl FaultyStore {
    fn over(inner: Arc<MemoryStore>) -> Self {
        Self { inner, ..Default::default() }
    }

    fn restored(&self) -> Vec<Vec<u8>> {
        self.restored.lock().unwrap().clone()
    }
}

impl KeyValueStore for FaultyStore {
    fn scan(&self, cursor: u64, count: usize) -> StoreFuture<'_, ScanPage> {
        let page = self.pages.fetch_add(1, Ordering::SeqCst);
        if self.scan_fails_from_page.is_some_and(|n| page >= n) {
            return Box::pin(async { Err(StoreError::io("connection reset by peer")) });
        }
        self.inner.scan(cursor, count)
    }

    fn dump<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, Option<Vec<u8>>> {
        if self.dump_fails.contains(key) {
            return Box::pin(async { Err(StoreError::response("ERR dump refused")) });
        }
        self.inner.dump(key)
    }

    fn pttl<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, i64> {
        if self.pttl_fails.contains(key) {
            return Box::pin(async { Err(StoreError::io("read timed out")) });
        }
        self.inner.pttl(key)
    }

    fn restore<'a>(&'a self, key: &'a [u8], ttl: Ttl, payload: &'a [u8]) -> StoreFuture<'a, ()> {
        if self.restore_fails.contains(key) {
            return Box::pin(async { Err(StoreError::response("BUSYKEY Target key name already exists")) });
        }
        self.restored.lock().unwrap().push(key.to_vec());
        self.inner.restore(key, ttl, payload)
    }
}

/// Never takes from the bus; waits for cancellation instead.
struct StalledSink;

impl Sink for StalledSink {
    fn name(&self) -> &str {
        "stalled"
    }

    fn write<'a>(&'a mut self, bus: BusReader, token: &'a CancellationToken) -> AdapterFuture<'a> {
        Box::pin(async move {
            let _bus = bus;
            token.cancelled().await;
            Err(PipelineError::Cancelled)
        })
    }
}

struct PanickingSink;

impl Sink for PanickingSink {
    fn name(&self) -> &str {
        "panicking"
    }

    fn write<'a>(&'a mut self, bus: BusReader, _token: &'a CancellationToken) -> AdapterFuture<'a> {
        Box::pin(async move {
            let _bus = bus;
            panic!("sink exploded");
        })
    }
}

fn store_to_store(from: Arc<dyn KeyValueStore>, to: Arc<dyn KeyValueStore>, track_ttl: bool) -> Orchestrator {
    Orchestrator::new(
        Box::new(StoreSource::new("from", from, track_ttl, false).with_scan_count(3)),
        Box::new(StoreSink::new("to", to, false)),
        4,
    )
}

fn store_to_file(from: Arc<dyn KeyValueStore>, path: &Path, track_ttl: bool) -> Orchestrator {
    Orchestrator::new(
        Box::new(StoreSource::new("from", from, track_ttl, false)),
        Box::new(FileSink::new("dump", path, false)),
        4,
    )
}

fn file_to_store(path: &Path, to: Arc<dyn KeyValueStore>) -> Orchestrator {
    Orchestrator::new(
        Box::new(FileSource::new("dump", path, false)),
        Box::new(StoreSink::new("to", to, false)),
        4,
    )
}

async fn read_dump(path: &Path) -> Vec<Record> {
    let file = tokio::fs::File::open(path).await.unwrap();
    let mut reader = FrameReader::new(file);
    let mut records = Vec::new();
    while let Some(r) = reader.next_record().await.unwrap() {
        records.push(r);
    }
    records
}

// ═══════════════════════════════════════════════════════════════
//  Scenarios
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn store_to_store_reproduces_mapping() {
    let (source, expected) = seeded(None).await;
    let target = Arc::new(MemoryStore::new());

    let outcome = store_to_store(source, target.clone(), false)
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(target.snapshot().await, expected);
}

#[tokio::test]
async fn store_to_file_to_store_keeps_values_and_ttls() {
    let (source, expected) = seeded(Some(Duration::from_secs(60))).await;
    let target = Arc::new(MemoryStore::new());
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump.rump");

    let outcome = store_to_file(source, &dump, true).run(std::future::pending()).await.unwrap();
    assert_eq!(outcome, Outcome::Completed);
    let outcome = file_to_store(&dump, target.clone()).run(std::future::pending()).await.unwrap();
    assert_eq!(outcome, Outcome::Completed);

    assert_eq!(target.snapshot().await, expected);
    for key in expected.keys() {
        let pttl = target.pttl(key).await.unwrap();
        assert!(pttl > 0 && pttl <= 60_000, "expiration lost: {pttl}");
    }
}

#[tokio::test]
async fn ttl_tracking_disabled_writes_zero_ttls() {
    let (source, _) = seeded(Some(Duration::from_secs(60))).await;
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump.rump");

    store_to_file(source, &dump, false).run(std::future::pending()).await.unwrap();

    let records = read_dump(&dump).await;
    assert_eq!(records.len(), 20);
    assert!(records.iter().all(|r| r.ttl == Ttl::NONE));
}

#[tokio::test]
async fn key_without_expiration_has_zero_ttl() {
    let source = Arc::new(MemoryStore::new());
    source.set("forever", "v", None).await;
    source.set("soon", "v", Some(Duration::from_secs(60))).await;
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump.rump");

    store_to_file(source, &dump, true).run(std::future::pending()).await.unwrap();

    let records = read_dump(&dump).await;
    assert_eq!(records[0].key, b"forever");
    assert_eq!(records[0].ttl, Ttl::NONE);
    assert_eq!(records[1].key, b"soon");
    assert!(!records[1].ttl.is_none());

    let target = Arc::new(MemoryStore::new());
    file_to_store(&dump, target.clone()).run(std::future::pending()).await.unwrap();
    assert_eq!(target.pttl(b"forever").await.unwrap(), -1);
}

#[tokio::test]
async fn records_keep_source_order() {
    let (source, expected) = seeded(None).await;
    let scan_order: Vec<Vec<u8>> = expected.keys().cloned().collect();
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump.rump");

    // store → store
    let target = Arc::new(FaultyStore::over(Arc::new(MemoryStore::new())));
    store_to_store(source.clone(), target.clone(), false)
        .run(std::future::pending())
        .await
        .unwrap();
    assert_eq!(target.restored(), scan_order);

    // store → file
    store_to_file(source, &dump, false).run(std::future::pending()).await.unwrap();
    let file_order: Vec<Vec<u8>> = read_dump(&dump).await.into_iter().map(|r| r.key).collect();
    assert_eq!(file_order, scan_order);

    // file → store
    let target = Arc::new(FaultyStore::over(Arc::new(MemoryStore::new())));
    file_to_store(&dump, target.clone()).run(std::future::pending()).await.unwrap();
    assert_eq!(target.restored(), file_order);
}

#[tokio::test]
async fn empty_source_produces_empty_dump() {
    let source = Arc::new(MemoryStore::new());
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump.rump");

    let outcome = store_to_file(source, &dump, false).run(std::future::pending()).await.unwrap();
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(tokio::fs::metadata(&dump).await.unwrap().len(), 0);
}

// ═══════════════════════════════════════════════════════════════
//  Cancellation
// ═══════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_releases_source_blocked_on_full_bus() {
    let (source, _) = seeded(None).await;
    let orchestrator = Orchestrator::new(
        Box::new(StoreSource::new("from", source, false, false)),
        Box::new(StalledSink),
        1,
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(orchestrator.run(async move {
        let _ = stop_rx.await;
    }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());
    stop_tx.send(()).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("pipeline must stop promptly")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, Outcome::Cancelled);
}

#[tokio::test]
async fn shutdown_keeps_records_already_written_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump.rump");
    let token = CancellationToken::new();

    let (tx, rx) = pipeline::bus(8);
    let mut sink = FileSink::new("dump", &dump, false);
    let sink_token = token.clone();
    let writer = tokio::spawn(async move { sink.write(rx, &sink_token).await });

    tx.put(Record::new("a", "1", Ttl::NONE), &token).await.unwrap();
    tx.put(Record::new("b", "2", Ttl::NONE), &token).await.unwrap();
    // Let the sink take and encode both records before the cancel arrives.
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let result = writer.await.unwrap();
    assert!(result.unwrap_err().is_cancelled());
    let keys: Vec<Vec<u8>> = read_dump(&dump).await.into_iter().map(|r| r.key).collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    drop(tx);
}

// ═══════════════════════════════════════════════════════════════
//  Failure policy
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn one_failed_restore_fails_the_run() {
    let (source, _) = seeded(None).await;
    let inner = Arc::new(MemoryStore::new());
    let target = Arc::new(FaultyStore {
        restore_fails: HashSet::from([b"key13".to_vec()]),
        ..FaultyStore::over(inner.clone())
    });

    let err = store_to_store(source, target.clone(), false)
        .run(std::future::pending())
        .await
        .unwrap_err();

    match err {
        PipelineError::Restore { key, .. } => assert_eq!(key, "key13"),
        other => panic!("expected restore failure, got {other:?}"),
    }
    // Writes accepted before the failure persist; nothing after it is written.
    let written: Vec<Vec<u8>> = inner.snapshot().await.into_keys().collect();
    assert_eq!(
        written,
        vec![b"key1".to_vec(), b"key10".to_vec(), b"key11".to_vec(), b"key12".to_vec()]
    );
    assert_eq!(target.restored(), written);
}

#[tokio::test]
async fn failed_dump_skips_only_that_key() {
    let (inner, mut expected) = seeded(None).await;
    let source = Arc::new(FaultyStore {
        dump_fails: HashSet::from([b"key5".to_vec()]),
        ..FaultyStore::over(inner)
    });
    let target = Arc::new(MemoryStore::new());

    let outcome = store_to_store(source, target.clone(), false)
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Completed);
    expected.remove(b"key5".as_slice());
    assert_eq!(target.snapshot().await, expected);
}

#[tokio::test]
async fn failed_pttl_skips_only_that_key() {
    let (inner, mut expected) = seeded(Some(Duration::from_secs(60))).await;
    let source = Arc::new(FaultyStore {
        pttl_fails: HashSet::from([b"key7".to_vec()]),
        ..FaultyStore::over(inner)
    });
    let target = Arc::new(MemoryStore::new());

    let outcome = store_to_store(source, target.clone(), true)
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Completed);
    expected.remove(b"key7".as_slice());
    assert_eq!(target.snapshot().await, expected);
}

#[tokio::test]
async fn empty_key_is_never_emitted() {
    let (source, expected) = seeded(None).await;
    source.set("", "nameless", None).await;
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump.rump");

    let outcome = store_to_file(source.clone(), &dump, false)
        .run(std::future::pending())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);
    let keys: Vec<Vec<u8>> = read_dump(&dump).await.into_iter().map(|r| r.key).collect();
    assert_eq!(keys, expected.keys().cloned().collect::<Vec<_>>());

    let target = Arc::new(MemoryStore::new());
    let outcome = store_to_store(source, target.clone(), false)
        .run(std::future::pending())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(target.snapshot().await, expected);
}

#[tokio::test]
async fn scan_failure_is_fatal() {
    let (inner, _) = seeded(None).await;
    let source = Arc::new(FaultyStore {
        scan_fails_from_page: Some(1),
        ..FaultyStore::over(inner)
    });
    let target = Arc::new(MemoryStore::new());

    let err = store_to_store(source, target.clone(), false)
        .run(std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Scan(_)), "got {err:?}");
    // Only the first page (scan count 3) made it through.
    assert!(target.len().await <= 3);
}

#[tokio::test]
async fn truncated_dump_is_fatal() {
    let (source, _) = seeded(None).await;
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump.rump");
    store_to_file(source, &dump, false).run(std::future::pending()).await.unwrap();

    let bytes = tokio::fs::read(&dump).await.unwrap();
    tokio::fs::write(&dump, &bytes[..bytes.len() - 2]).await.unwrap();

    let target = Arc::new(MemoryStore::new());
    let err = file_to_store(&dump, target.clone()).run(std::future::pending()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Frame(FrameError::Truncated { .. })), "got {err:?}");
    assert_eq!(target.len().await, 19);
}

#[tokio::test]
async fn missing_dump_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let target = Arc::new(MemoryStore::new());
    let err = file_to_store(&dir.path().join("absent.rump"), target)
        .run(std::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Open { .. }), "got {err:?}");
}

#[tokio::test]
async fn panicking_task_fails_the_run() {
    let (source, _) = seeded(None).await;
    let orchestrator = Orchestrator::new(
        Box::new(StoreSource::new("from", source, false, false)),
        Box::new(PanickingSink),
        1,
    );
    let err = orchestrator.run(std::future::pending()).await.unwrap_err();
    match err {
        PipelineError::TaskPanicked(detail) => assert!(detail.contains("sink exploded")),
        other => panic!("expected panic report, got {other:?}"),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Configuration
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn from_config_selects_adapters() {
    let (source, expected) = seeded(None).await;
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump.rump");

    let mut cfg = PipelineConfig::new(
        Endpoint::parse("redis://localhost:6379/3").unwrap(),
        Endpoint::parse(dump.to_str().unwrap()).unwrap(),
    );
    cfg.bus_capacity = 2;
    let outcome = Orchestrator::from_config(&cfg, Some(source as Arc<dyn KeyValueStore>), None)
        .unwrap()
        .run(std::future::pending())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(read_dump(&dump).await.len(), expected.len());
}

#[test]
fn from_config_requires_store_handles() {
    let cfg = PipelineConfig::new(
        Endpoint::parse("redis://localhost:6379/3").unwrap(),
        Endpoint::parse("redis://localhost:6379/4").unwrap(),
    );
    let err = Orchestrator::from_config(&cfg, None, None).err().unwrap();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[tokio::test]
async fn zero_capacity_is_rejected() {
    let (source, _) = seeded(None).await;
    let target = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(
        Box::new(StoreSource::new("from", source, false, false)),
        Box::new(StoreSink::new("to", target, false)),
        0,
    );
    let err = orchestrator.run(std::future::pending()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}
