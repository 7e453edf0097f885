//! Application/window cache with MRU ordering.
//!
//! The store publishes immutable snapshots (`Arc<Vec<Application>>`). Readers
//! clone the handle under a lock held for a pointer copy, so they never wait
//! for an enumeration; refreshes enumerate outside the lock and only take it
//! to merge and swap.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::model::{Application, Pid};
use crate::window_enumerator::{AssembleOptions, WindowEnumerator, assemble_applications};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(2);
pub const DEFAULT_SUPPRESSION_WINDOW: Duration = Duration::from_millis(300);

/// Immutable, point-in-time ordered list of applications.
pub type Snapshot = Arc<Vec<Application>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreConfig {
    pub ttl: Duration,
    pub suppression_window: Duration,
    pub assemble: AssembleOptions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            ttl: DEFAULT_CACHE_TTL,
            suppression_window: DEFAULT_SUPPRESSION_WINDOW,
            assemble: AssembleOptions::default(),
        }
    }
}

struct Published {
    apps: Snapshot,
    refreshed_at: Option<Instant>,
    /// Bumped by every invalidation so a refresh that started earlier does
    /// not mark the cache fresh.
    invalidations: u64,
}

pub struct WindowSnapshotStore<E: WindowEnumerator> {
    enumerator: E,
    config: StoreConfig,
    published: Mutex<Published>,
    prefetching: AtomicBool,
    /// pid -> end of its suppression window
    suppressed: Mutex<HashMap<Pid, Instant>>,
}

/// Clears the prefetch flag when the prefetch ends, however it ends.
struct PrefetchGuard<'a>(&'a AtomicBool);

impl Drop for PrefetchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<E: WindowEnumerator> WindowSnapshotStore<E> {
    /// Create an empty store. Nothing is enumerated until the first read.
    pub fn new(enumerator: E, config: StoreConfig) -> Self {
        WindowSnapshotStore {
            enumerator,
            config,
            published: Mutex::new(Published {
                apps: Arc::new(Vec::new()),
                refreshed_at: None,
                invalidations: 0,
            }),
            prefetching: AtomicBool::new(false),
            suppressed: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &E {
        &self.enumerator
    }

    /// Last published snapshot. Never waits for a refresh; may be stale or empty.
    pub fn cached_snapshot(&self) -> Snapshot {
        Arc::clone(&self.published.lock().apps)
    }

    /// True if the snapshot is non-empty and younger than the TTL.
    pub fn is_fresh(&self) -> bool {
        let published = self.published.lock();
        Self::fresh(&published, self.config.ttl, Instant::now())
    }

    fn fresh(published: &Published, ttl: Duration, now: Instant) -> bool {
        !published.apps.is_empty()
            && published
                .refreshed_at
                .is_some_and(|at| now.saturating_duration_since(at) < ttl)
    }

    /// Cached snapshot if fresh, otherwise a synchronous re-enumeration.
    ///
    /// Blocks for as long as the enumerator takes (typically 100-200 ms) when
    /// a refresh is needed. Do not call from the keyboard path.
    pub fn snapshot_blocking(&self, force_refresh: bool) -> Snapshot {
        if !force_refresh {
            let published = self.published.lock();
            if Self::fresh(&published, self.config.ttl, Instant::now()) {
                return Arc::clone(&published.apps);
            }
        }
        self.refresh()
    }

    /// Enumerate, merge with the current order and publish.
    ///
    /// On enumeration failure the previous snapshot stays in place.
    pub fn refresh(&self) -> Snapshot {
        let generation = self.published.lock().invalidations;
        let started = Instant::now();

        let listing = match self.enumerator.list_windows(None) {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Window enumeration failed, keeping previous snapshot: {}", e);
                return self.cached_snapshot();
            }
        };
        let fresh = assemble_applications(listing, self.config.assemble);

        let mut published = self.published.lock();
        let merged = merge_mru_order(&published.apps, fresh);
        published.apps = Arc::new(merged);
        if published.invalidations == generation {
            published.refreshed_at = Some(Instant::now());
        } else {
            debug!("Cache invalidated during refresh, leaving it stale");
        }
        debug!(
            "Refreshed to {} applications in {:?}",
            published.apps.len(),
            started.elapsed()
        );
        Arc::clone(&published.apps)
    }

    /// Re-enumerate a single process and replace its entry in place.
    ///
    /// A process the cache has not seen yet is appended. A process that no
    /// longer reports anything is left alone; the next full refresh drops it.
    pub fn refresh_application(&self, pid: Pid) {
        let listing = match self.enumerator.list_windows(Some(pid)) {
            Ok(listing) => listing,
            Err(e) => {
                debug!("Could not refresh pid {}: {}", pid, e);
                return;
            }
        };
        let Some(mut fresh) = assemble_applications(listing, self.config.assemble)
            .into_iter()
            .find(|app| app.pid == pid)
        else {
            return;
        };

        let mut published = self.published.lock();
        let apps = Arc::make_mut(&mut published.apps);
        match apps.iter_mut().find(|app| app.pid == pid) {
            Some(existing) => {
                fresh.is_active = existing.is_active;
                *existing = fresh;
            }
            None => apps.push(fresh),
        }
    }

    /// Refresh on the calling thread unless a prefetch is already running.
    ///
    /// Returns false (and does nothing) when another prefetch is in flight.
    pub fn prefetch(&self) -> bool {
        if !self.begin_prefetch() {
            return false;
        }
        let _guard = PrefetchGuard(&self.prefetching);
        self.refresh();
        true
    }

    pub fn is_prefetching(&self) -> bool {
        self.prefetching.load(Ordering::Acquire)
    }

    fn begin_prefetch(&self) -> bool {
        let started = self
            .prefetching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !started {
            debug!("Prefetch already in flight");
        }
        started
    }

    /// Mark the cache stale. Existing data stays visible until replaced.
    pub fn invalidate(&self) {
        let mut published = self.published.lock();
        published.refreshed_at = None;
        published.invalidations += 1;
    }

    /// Move `pid` to the front of the MRU order and mark it active.
    ///
    /// With `self_initiated`, the OS echo of this activation is ignored for the
    /// suppression window. Returns false, and invalidates the cache, when `pid`
    /// is not cached.
    pub fn move_to_front(&self, pid: Pid, self_initiated: bool) -> bool {
        self.move_to_front_at(pid, self_initiated, Instant::now())
    }

    pub fn move_to_front_at(&self, pid: Pid, self_initiated: bool, now: Instant) -> bool {
        if self_initiated {
            self.suppressed
                .lock()
                .insert(pid, now + self.config.suppression_window);
        }

        let mut published = self.published.lock();
        let Some(position) = published.apps.iter().position(|app| app.pid == pid) else {
            drop(published);
            debug!("pid {} not cached, invalidating", pid);
            self.invalidate();
            return false;
        };

        let apps = Arc::make_mut(&mut published.apps);
        apps[..=position].rotate_right(1);
        for (index, app) in apps.iter_mut().enumerate() {
            app.is_active = index == 0;
        }
        true
    }

    /// OS notification: `pid` became the active application.
    ///
    /// Returns true if the cache was reordered.
    pub fn handle_app_activated(&self, pid: Pid) -> bool {
        self.handle_app_activated_at(pid, Instant::now())
    }

    pub fn handle_app_activated_at(&self, pid: Pid, now: Instant) -> bool {
        if self.is_suppressed(pid, now) {
            debug!("Ignoring activation echo for pid {}", pid);
            return false;
        }
        self.move_to_front_at(pid, false, now)
    }

    fn is_suppressed(&self, pid: Pid, now: Instant) -> bool {
        let mut suppressed = self.suppressed.lock();
        suppressed.retain(|_, until| *until > now);
        suppressed.contains_key(&pid)
    }
}

impl<E: WindowEnumerator + 'static> WindowSnapshotStore<E> {
    /// Refresh on a worker thread. Returns immediately; false when a prefetch
    /// is already running.
    pub fn prefetch_async(self: &Arc<Self>) -> bool {
        if !self.begin_prefetch() {
            return false;
        }
        let store = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("snapshot-prefetch".to_string())
            .spawn(move || {
                let _guard = PrefetchGuard(&store.prefetching);
                store.refresh();
            });
        if let Err(e) = spawned {
            warn!("Failed to spawn prefetch thread: {}", e);
            self.prefetching.store(false, Ordering::Release);
            return false;
        }
        true
    }
}

/// Merge a fresh enumeration into the previous MRU order.
///
/// The result has:
/// 1. Previously known applications still present, in their previous order,
///    carrying the fresh data
/// 2. Newly discovered applications after them, in enumeration order
///
/// On a cold start (no previous order) the active application goes first.
#[must_use]
pub fn merge_mru_order(previous: &[Application], fresh: Vec<Application>) -> Vec<Application> {
    let cold_start = previous.is_empty();
    let fresh_order: Vec<Pid> = fresh.iter().map(|app| app.pid).collect();
    let mut by_pid: HashMap<Pid, Application> = HashMap::with_capacity(fresh.len());
    for app in fresh {
        by_pid.entry(app.pid).or_insert(app);
    }

    let mut result = Vec::with_capacity(by_pid.len());
    for old in previous {
        if let Some(app) = by_pid.remove(&old.pid) {
            result.push(app);
        }
    }
    for pid in fresh_order {
        if let Some(app) = by_pid.remove(&pid) {
            result.push(app);
        }
    }

    if cold_start && let Some(active) = result.iter().position(|app| app.is_active) {
        result[..=active].rotate_right(1);
        info!("Initial snapshot with {} applications", result.len());
    }

    result
}
