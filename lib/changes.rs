//! Periodically refreshed view of the container's filesystem changes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use docker_api::error::ApiError;
use docker_api::models::{Change, ChangeKind};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::ContainerApi;
use crate::path;

/// Default time-to-live of a fetched change list.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

struct CacheState {
    entries: Vec<Change>,
    last_refresh: Option<Instant>,
}

/// Cache of the container diff report with TTL-driven refresh.
///
/// A single mutex covers refresh, filtering, and lazy mode population, so at
/// most one refresh is ever in flight and every reader observes a consistent
/// entry list. The filesystem workload is bursty and the stat fan-out per
/// call is small, so the coarse lock holds up.
pub struct ChangesCache<A> {
    api: Arc<A>,
    refresh_interval: Duration,
    state: Mutex<CacheState>,
}

impl<A: ContainerApi> ChangesCache<A> {
    /// Create a cache with [`DEFAULT_REFRESH_INTERVAL`].
    pub fn new(api: Arc<A>) -> Self {
        Self::with_interval(api, DEFAULT_REFRESH_INTERVAL)
    }

    /// Create a cache refreshing no more often than `refresh_interval`.
    pub fn with_interval(api: Arc<A>, refresh_interval: Duration) -> Self {
        Self {
            api,
            refresh_interval,
            state: Mutex::new(CacheState {
                entries: Vec::new(),
                last_refresh: None,
            }),
        }
    }

    /// The `Added` and `Removed` changes that are direct children of `dir`.
    ///
    /// `Modified` entries are dropped: a file that was in the snapshot and
    /// changed afterwards keeps its snapshot listing. `Added` entries get
    /// their mode populated (once) through a live stat; an entry whose stat
    /// fails is skipped with a log line. `Removed` entries pass through
    /// without a stat; their target no longer exists in the container.
    ///
    /// A refresh failure propagates without touching the cached state.
    pub async fn changes_in_dir(&self, dir: &str) -> Result<Vec<Change>, ApiError> {
        let mut state = self.state.lock().await;

        let expired = state
            .last_refresh
            .is_none_or(|at| at.elapsed() >= self.refresh_interval);
        if expired {
            let entries = self.api.changes().await?;
            debug!(count = entries.len(), "refreshed container change list");
            state.entries = entries;
            state.last_refresh = Some(Instant::now());
        }

        let dir = path::clean(dir);
        let mut result = Vec::new();
        for change in &mut state.entries {
            if change.kind == ChangeKind::Modified {
                continue;
            }
            if path::parent(&change.path) != dir {
                continue;
            }
            if change.kind == ChangeKind::Added && change.mode.is_none() {
                match self.api.stat_path(&change.path).await {
                    Ok(stat) => change.mode = Some(stat.mode),
                    Err(e) => {
                        warn!(path = %change.path, error = %e, "skipping change with failing stat");
                        continue;
                    }
                }
            }
            result.push(change.clone());
        }
        Ok(result)
    }
}
