// tests/lifecycle.rs
//
// Open -> Closed transitions and the administrative operations:
// - close force-closes everything and is idempotent; afterwards every
//   engine-dependent call fails Closed and changes nothing;
// - reset clears data and bumps the generation, or closes the store on failure;
// - compact validates its range and leaves logical state alone;
// - the delete-if-expired policy flag and its configuration.

use std::sync::Arc;

use anyhow::Result;
use FerryStore::{
    Batch, Forward, MemEngine, MemProbe, Store, StoreBuilder, StoreConfig, StoreError,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn open_mem() -> (Store<MemEngine>, Arc<MemProbe>) {
    init_logger();
    let engine = MemEngine::new();
    let probe = engine.probe();
    (Store::open_with_config(engine, StoreConfig::default()), probe)
}

fn put(store: &Store<MemEngine>, key: &str, value: &str) -> Result<()> {
    let mut b = Batch::new();
    b.put(key.as_bytes(), value.as_bytes())?;
    store.acquire()?.commit(&b, &Forward::new(0, "SET", Vec::new()))?;
    Ok(())
}

#[test]
fn close_is_terminal_and_idempotent() -> Result<()> {
    let (store, probe) = open_mem();
    put(&store, "k", "v")?;
    let sp = store.new_snapshot()?;
    {
        let mut g = store.acquire()?;
        let it = g.borrow_iterator()?;
        g.return_iterator(it);
    }
    assert_eq!(probe.live_iterators(), 1);

    store.close();
    assert!(store.is_closed());
    assert!(probe.is_closed());
    assert!(sp.is_closed());
    assert_eq!(probe.live_snapshots(), 0);
    assert_eq!(probe.live_iterators(), 0);

    let before = store.metrics();
    store.close();
    assert_eq!(store.metrics(), before);
    assert_eq!(store.generation(), 1);

    assert!(matches!(store.acquire(), Err(StoreError::Closed)));
    assert!(matches!(store.new_snapshot(), Err(StoreError::Closed)));
    assert!(matches!(store.reset(), Err(StoreError::Closed)));
    assert!(matches!(store.compact(None, None), Err(StoreError::Closed)));
    assert!(store
        .add_pre_commit_handler(|_fw: &Forward| -> Result<()> { Ok(()) })
        .unwrap_err()
        .is_closed());
    assert!(store
        .add_post_commit_handler(|_fw: &Forward| -> Result<()> { Ok(()) })
        .unwrap_err()
        .is_closed());

    // Closed precedes argument validation.
    assert!(matches!(
        store.compact(Some(b"z"), Some(b"a")),
        Err(StoreError::Closed)
    ));

    store.release_snapshot(&sp);
    assert_eq!(store.metrics(), before);
    assert_eq!(store.generation(), 1);
    Ok(())
}

#[test]
fn reset_clears_data_and_bumps_generation() -> Result<()> {
    let (store, probe) = open_mem();
    put(&store, "a", "1")?;
    put(&store, "b", "2")?;
    let sp = store.new_snapshot()?;
    {
        let mut g = store.acquire()?;
        let it = g.borrow_iterator()?;
        g.return_iterator(it);
    }

    store.reset()?;
    assert_eq!(store.generation(), 3);
    assert!(sp.is_closed());
    assert_eq!(probe.live_snapshots(), 0);
    assert_eq!(probe.live_iterators(), 0);

    let g = store.acquire()?;
    assert_eq!(g.get(b"a")?, None);
    assert_eq!(g.pooled_iterators(), 0);
    assert_eq!(g.open_snapshots(), 0);
    drop(g);

    let m = store.metrics();
    assert_eq!(m.resets, 1);
    assert_eq!(m.snapshots_force_closed, 1);
    assert_eq!(m.iterators_discarded, 1);

    // Still usable.
    put(&store, "c", "3")?;
    assert_eq!(store.generation(), 4);
    Ok(())
}

#[test]
fn failed_reset_closes_the_store() -> Result<()> {
    let (store, probe) = open_mem();
    put(&store, "a", "1")?;
    let sp = store.new_snapshot()?;

    probe.fail_next_clear();
    match store.reset() {
        Err(StoreError::Underlying { context, source }) => {
            assert_eq!(context, "store reset");
            assert!(source.to_string().contains("injected clear failure"));
        }
        other => panic!("expected underlying reset failure, got {other:?}"),
    }

    assert!(store.is_closed());
    assert!(probe.is_closed());
    assert!(sp.is_closed());
    assert_eq!(store.generation(), 1);
    assert_eq!(store.metrics().failed_resets, 1);
    assert!(matches!(store.compact(None, None), Err(StoreError::Closed)));
    assert!(matches!(store.reset(), Err(StoreError::Closed)));
    Ok(())
}

#[test]
fn compact_failure_leaves_state_untouched() -> Result<()> {
    let (store, probe) = open_mem();
    put(&store, "a", "1")?;
    {
        let mut g = store.acquire()?;
        let it = g.borrow_iterator()?;
        g.return_iterator(it);
    }

    probe.fail_next_compact();
    let err = store.compact(Some(b"a"), None).unwrap_err();
    assert!(matches!(err, StoreError::Underlying { .. }));
    assert!(!store.is_closed());

    store.compact(Some(b"a"), Some(b"a"))?;
    assert_eq!(probe.compactions(), 1);
    assert_eq!(store.generation(), 1);

    let g = store.acquire()?;
    assert_eq!(g.pooled_iterators(), 1);
    assert_eq!(g.get(b"a")?, Some(b"1".to_vec()));
    drop(g);

    let m = store.metrics();
    assert_eq!(m.compactions, 1);
    assert_eq!(m.failed_compactions, 1);
    Ok(())
}

#[test]
fn inverted_compact_range_is_invalid() -> Result<()> {
    let (store, probe) = open_mem();
    let err = store.compact(Some(b"b"), Some(b"a")).unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
    assert_eq!(probe.compactions(), 0);
    assert_eq!(store.metrics().failed_compactions, 0);
    Ok(())
}

#[test]
fn delete_if_expired_policy() -> Result<()> {
    let (store, _probe) = open_mem();
    assert!(store.delete_if_expired());

    store.set_delete_if_expired(false);
    assert!(!store.delete_if_expired());
    assert!(!store.acquire()?.delete_if_expired());

    store.set_delete_if_expired(true);
    assert!(store.acquire()?.delete_if_expired());

    let follower = StoreBuilder::from_default()
        .delete_if_expired(false)
        .open(MemEngine::new());
    assert!(!follower.delete_if_expired());
    assert!(!follower.config().delete_if_expired);

    // The flag does not depend on the lifecycle.
    follower.close();
    follower.set_delete_if_expired(true);
    assert!(follower.delete_if_expired());
    Ok(())
}

#[test]
fn config_from_lookup() -> Result<()> {
    let cfg = StoreConfig::from_lookup(|k| match k {
        "FERRY_DELETE_IF_EXPIRED" => Some("0".to_string()),
        "FERRY_MAX_POOLED_ITERATORS" => Some("8".to_string()),
        _ => None,
    });
    assert!(!cfg.delete_if_expired);
    assert_eq!(cfg.max_pooled_iterators, Some(8));
    assert!(cfg.log_snapshots);

    let store = Store::open_with_config(MemEngine::new(), cfg);
    assert!(!store.delete_if_expired());
    Ok(())
}

#[test]
fn metrics_can_be_zeroed() -> Result<()> {
    let (store, _probe) = open_mem();
    put(&store, "a", "1")?;
    store.compact(None, None)?;
    assert_eq!(store.metrics().commits, 1);

    store.reset_metrics();
    let m = store.metrics();
    assert_eq!(m.commits, 0);
    assert_eq!(m.compactions, 0);
    // Counters only; the generation is store state.
    assert_eq!(store.generation(), 1);

    put(&store, "b", "2")?;
    assert_eq!(store.metrics().commits, 1);
    Ok(())
}
