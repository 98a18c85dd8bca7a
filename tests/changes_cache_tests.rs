#![allow(clippy::unwrap_used, missing_docs)]

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use docker_api::models::ChangeKind;
use dockerfs::changes::ChangesCache;

mod common;
use common::{MockContainerApi, MockState};

const LONG_TTL: Duration = Duration::from_secs(300);

fn cache(state: &Arc<MockState>, ttl: Duration) -> ChangesCache<MockContainerApi> {
    ChangesCache::with_interval(Arc::new(MockContainerApi::new(Arc::clone(state))), ttl)
}

#[tokio::test]
async fn back_to_back_calls_issue_one_diff() {
    let state = Arc::new(MockState::default());
    state.push_change("/tmp/x", ChangeKind::Added);
    state.insert_file_stat("/tmp/x", 0o644, 2);
    let cache = cache(&state, LONG_TTL);

    cache.changes_in_dir("/tmp").await.unwrap();
    cache.changes_in_dir("/tmp").await.unwrap();
    cache.changes_in_dir("/etc").await.unwrap();

    assert_eq!(state.change_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_ttl_refreshes() {
    let state = Arc::new(MockState::default());
    let cache = cache(&state, Duration::ZERO);

    cache.changes_in_dir("/tmp").await.unwrap();
    cache.changes_in_dir("/tmp").await.unwrap();

    assert_eq!(state.change_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn modified_changes_are_dropped() {
    let state = Arc::new(MockState::default());
    state.push_change("/etc/hostname", ChangeKind::Modified);
    state.push_change("/etc/resolv.conf", ChangeKind::Added);
    state.insert_file_stat("/etc/resolv.conf", 0o644, 10);
    let cache = cache(&state, LONG_TTL);

    let changes = cache.changes_in_dir("/etc").await.unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].path, "/etc/resolv.conf");
    assert_eq!(changes[0].kind, ChangeKind::Added);
}

#[tokio::test]
async fn only_direct_children_are_returned() {
    let state = Arc::new(MockState::default());
    state.push_change("/tmp/x", ChangeKind::Added);
    state.push_change("/tmp/sub/y", ChangeKind::Added);
    state.push_change("/var/z", ChangeKind::Added);
    state.insert_file_stat("/tmp/x", 0o644, 1);
    state.insert_file_stat("/tmp/sub/y", 0o644, 1);
    state.insert_file_stat("/var/z", 0o644, 1);
    let cache = cache(&state, LONG_TTL);

    let changes = cache.changes_in_dir("/tmp").await.unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].path, "/tmp/x");
}

#[tokio::test]
async fn added_modes_are_populated_once() {
    let state = Arc::new(MockState::default());
    state.push_change("/tmp/x", ChangeKind::Added);
    state.insert_file_stat("/tmp/x", 0o600, 4);
    let cache = cache(&state, LONG_TTL);

    let first = cache.changes_in_dir("/tmp").await.unwrap();
    assert_eq!(first[0].mode.unwrap().perm(), 0o600);

    let second = cache.changes_in_dir("/tmp").await.unwrap();
    assert_eq!(second[0].mode.unwrap().perm(), 0o600);

    let stat_calls = state.stat_calls.lock().unwrap();
    assert_eq!(
        stat_calls.iter().filter(|p| *p == "/tmp/x").count(),
        1,
        "mode must be populated lazily, exactly once"
    );
}

#[tokio::test]
async fn added_entry_with_failing_stat_is_skipped() {
    let state = Arc::new(MockState::default());
    state.push_change("/tmp/good", ChangeKind::Added);
    state.push_change("/tmp/bad", ChangeKind::Added);
    state.insert_file_stat("/tmp/good", 0o644, 1);
    state
        .failing_stats
        .lock()
        .unwrap()
        .insert(String::from("/tmp/bad"));
    let cache = cache(&state, LONG_TTL);

    let changes = cache.changes_in_dir("/tmp").await.unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].path, "/tmp/good");
}

#[tokio::test]
async fn removed_entries_pass_through_without_stat() {
    let state = Arc::new(MockState::default());
    state.push_change("/etc/hostname", ChangeKind::Removed);
    let cache = cache(&state, LONG_TTL);

    let changes = cache.changes_in_dir("/etc").await.unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, ChangeKind::Removed);
    assert!(changes[0].mode.is_none());
    assert!(
        state.stat_calls.lock().unwrap().is_empty(),
        "removed paths are gone; nothing to stat"
    );
}

#[tokio::test]
async fn refresh_failure_propagates_then_recovers() {
    let state = Arc::new(MockState::default());
    state.fail_changes.store(true, Ordering::SeqCst);
    let cache = cache(&state, LONG_TTL);

    assert!(cache.changes_in_dir("/tmp").await.is_err());

    state.fail_changes.store(false, Ordering::SeqCst);
    state.push_change("/tmp/x", ChangeKind::Added);
    state.insert_file_stat("/tmp/x", 0o644, 1);

    let changes = cache.changes_in_dir("/tmp").await.unwrap();
    assert_eq!(changes.len(), 1);
}
