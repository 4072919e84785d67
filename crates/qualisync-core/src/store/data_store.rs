// ── Central reactive data store ──
//
// Session-scoped mirror of all backend collections. One versioned slot
// per collection plus store-level load phase and wave-generation
// signals. Mutations are broadcast to subscribers via `watch` channels.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use qualisync_api::Record;
use strum::{EnumCount, IntoEnumIterator};
use tokio::sync::watch;

use super::collection::{CollectionState, RecordCollection};
use crate::model::Collection;

// ── LoadPhase ───────────────────────────────────────────────────────

/// Store-level loading flag with a "never loaded" sentinel, so a new
/// session re-triggers a real load while "loaded but empty" does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPhase {
    #[default]
    NotLoaded,
    Loading,
    Ready,
}

// ── DataStore ───────────────────────────────────────────────────────

/// Central reactive store for all mirrored collections.
///
/// Reads are wait-free snapshots; writes go through per-slot version
/// checks. Consumers receive read-only state and never mutate the
/// cache directly.
pub struct DataStore {
    collections: Vec<RecordCollection>,
    phase: watch::Sender<LoadPhase>,
    /// Bumped once per applied wave; a consumer that has observed
    /// generation `g` sees every wave up to `g` fully applied.
    generation: watch::Sender<u64>,
    /// Global write-version sequence shared by all slots.
    version: AtomicU64,
    last_full_refresh: watch::Sender<Option<DateTime<Utc>>>,
    last_change_event: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(LoadPhase::NotLoaded);
        let (generation, _) = watch::channel(0u64);
        let (last_full_refresh, _) = watch::channel(None);
        let (last_change_event, _) = watch::channel(None);

        Self {
            collections: (0..Collection::COUNT).map(|_| RecordCollection::new()).collect(),
            phase,
            generation,
            version: AtomicU64::new(0),
            last_full_refresh,
            last_change_event,
        }
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    /// Current rows of a collection (empty unless `Loaded`).
    pub fn rows(&self, collection: Collection) -> Arc<Vec<Record>> {
        self.slot(collection).rows()
    }

    /// Current state of a collection.
    pub fn state(&self, collection: Collection) -> CollectionState {
        self.slot(collection).state()
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.slot(collection).rows().len()
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Subscribe to one collection's state transitions.
    pub fn subscribe(&self, collection: Collection) -> watch::Receiver<CollectionState> {
        self.slot(collection).subscribe()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<LoadPhase> {
        self.phase.subscribe()
    }

    pub fn subscribe_generation(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    // ── Load phase ───────────────────────────────────────────────────

    pub fn phase(&self) -> LoadPhase {
        *self.phase.borrow()
    }

    /// `true` while a full staged load is in flight.
    pub fn loading(&self) -> bool {
        self.phase() == LoadPhase::Loading
    }

    /// How many waves have been applied since the store was created.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn last_full_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_full_refresh.borrow()
    }

    pub fn last_change_event(&self) -> Option<DateTime<Utc>> {
        *self.last_change_event.borrow()
    }

    /// How long ago the last full load finished, or `None` if never.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.last_full_refresh().map(|t| Utc::now() - t)
    }

    // ── Session teardown ─────────────────────────────────────────────

    /// Drop all cached data and return to the pre-load sentinel state.
    pub fn reset(&self) {
        for slot in &self.collections {
            slot.reset();
        }
        let _ = self.phase.send(LoadPhase::NotLoaded);
        let _ = self.last_full_refresh.send(None);
        let _ = self.last_change_event.send(None);
    }

    // ── Crate-internal write surface ─────────────────────────────────

    pub(crate) fn slot(&self, collection: Collection) -> &RecordCollection {
        &self.collections[collection.index()]
    }

    /// Draw the next write version.
    pub(crate) fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Enter the loading phase; slots without data show `Loading`.
    pub(crate) fn begin_full_load(&self) {
        let _ = self.phase.send(LoadPhase::Loading);
        for collection in Collection::iter() {
            self.slot(collection).mark_loading();
        }
    }

    /// Leave the loading phase (always called, even after failures).
    pub(crate) fn finish_full_load(&self) {
        let _ = self.phase.send(LoadPhase::Ready);
        let _ = self.last_full_refresh.send(Some(Utc::now()));
    }

    pub(crate) fn bump_generation(&self) {
        self.generation.send_modify(|g| *g += 1);
    }

    pub(crate) fn note_change_event(&self) {
        let _ = self.last_change_event.send(Some(Utc::now()));
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}
