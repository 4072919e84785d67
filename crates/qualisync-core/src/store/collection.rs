// ── Versioned cache slot ──
//
// One slot per collection: a watch channel broadcasting the current
// `CollectionState`, guarded by a monotonic applied-version counter.
// Every write carries a version drawn from the store's global sequence;
// a write older than the last applied one is rejected, which turns the
// load/refresh/patch race into a defined conflict rule.

use std::sync::{Mutex, PoisonError};
use std::sync::{Arc, OnceLock};

use qualisync_api::{Record, RecordId};
use tokio::sync::watch;

// ── CollectionState ─────────────────────────────────────────────────

/// Lifecycle of one cached collection.
///
/// Distinguishes "empty because truly empty" (`Loaded` with no rows)
/// from "empty because the fetch failed" (`Failed`). Consumers that
/// only want rows use [`rows`](Self::rows), which degrades every
/// non-loaded state to an empty slice.
#[derive(Debug, Clone, Default)]
pub enum CollectionState {
    /// No load has been attempted in this session.
    #[default]
    NotLoaded,
    /// The initial fetch is in flight.
    Loading,
    /// Last fetch (or patch) succeeded.
    Loaded(Arc<Vec<Record>>),
    /// Last full fetch failed; the reason is kept for diagnostics.
    Failed(String),
}

impl CollectionState {
    /// The rows, degraded to empty for every non-loaded state.
    pub fn rows(&self) -> Arc<Vec<Record>> {
        match self {
            Self::Loaded(rows) => Arc::clone(rows),
            _ => empty_rows(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Short status label for logs and CLI tables.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotLoaded => "not loaded",
            Self::Loading => "loading",
            Self::Loaded(_) => "loaded",
            Self::Failed(_) => "failed",
        }
    }
}

fn empty_rows() -> Arc<Vec<Record>> {
    static EMPTY: OnceLock<Arc<Vec<Record>>> = OnceLock::new();
    Arc::clone(EMPTY.get_or_init(|| Arc::new(Vec::new())))
}

// ── RecordCollection ────────────────────────────────────────────────

/// One cache slot with push-based change notification.
pub(crate) struct RecordCollection {
    state: watch::Sender<CollectionState>,
    /// Version of the last applied write.
    applied: Mutex<u64>,
}

impl RecordCollection {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(CollectionState::NotLoaded);
        Self {
            state,
            applied: Mutex::new(0),
        }
    }

    pub(crate) fn state(&self) -> CollectionState {
        self.state.borrow().clone()
    }

    pub(crate) fn rows(&self) -> Arc<Vec<Record>> {
        self.state.borrow().rows()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<CollectionState> {
        self.state.subscribe()
    }

    /// Mark the slot as loading unless it already holds data. A full
    /// reload keeps stale rows visible until the new merge lands.
    pub(crate) fn mark_loading(&self) {
        self.state.send_if_modified(|s| {
            if matches!(s, CollectionState::Loaded(_) | CollectionState::Loading) {
                false
            } else {
                *s = CollectionState::Loading;
                true
            }
        });
    }

    /// Replace the slot contents wholesale.
    pub(crate) fn set_rows(&self, version: u64, rows: Vec<Record>) -> bool {
        self.apply(version, |s| {
            *s = CollectionState::Loaded(Arc::new(rows));
            true
        })
    }

    /// Record a failed fetch.
    pub(crate) fn set_failed(&self, version: u64, reason: String) -> bool {
        self.apply(version, |s| {
            *s = CollectionState::Failed(reason);
            true
        })
    }

    /// Id-keyed replace-or-insert: an existing row with the same id is
    /// replaced in place, a new row is prepended. Duplicate delivery of
    /// the same event therefore converges to the same state.
    pub(crate) fn patch_upsert(&self, version: u64, record: Record) -> bool {
        let Some(id) = record.id() else {
            tracing::debug!("dropping patch for row without id");
            return false;
        };
        self.apply(version, move |s| {
            let mut rows: Vec<Record> = s.rows().as_ref().clone();
            match rows.iter().position(|r| r.id().as_ref() == Some(&id)) {
                Some(pos) => rows[pos] = record,
                None => rows.insert(0, record),
            }
            *s = CollectionState::Loaded(Arc::new(rows));
            true
        })
    }

    /// Remove the row with the given id, leaving every other row (and
    /// a slot with no such row) untouched.
    pub(crate) fn patch_delete(&self, version: u64, id: &RecordId) -> bool {
        self.apply(version, |s| {
            let rows = s.rows();
            let Some(pos) = rows.iter().position(|r| r.id().as_ref() == Some(id)) else {
                return false;
            };
            let mut next = rows.as_ref().clone();
            next.remove(pos);
            *s = CollectionState::Loaded(Arc::new(next));
            true
        })
    }

    /// Back to the initial state; the version counter restarts too.
    pub(crate) fn reset(&self) {
        let mut applied = self.lock_applied();
        *applied = 0;
        self.state.send_modify(|s| *s = CollectionState::NotLoaded);
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Apply a write if its version is not older than the last applied
    /// one. Returns `false` for stale writes (nothing changes).
    fn apply(&self, version: u64, f: impl FnOnce(&mut CollectionState) -> bool) -> bool {
        let mut applied = self.lock_applied();
        if version < *applied {
            return false;
        }
        *applied = version;
        self.state.send_if_modified(f);
        true
    }

    fn lock_applied(&self) -> std::sync::MutexGuard<'_, u64> {
        self.applied.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn fresh_slot_is_not_loaded_with_empty_rows() {
        let slot = RecordCollection::new();
        assert!(matches!(slot.state(), CollectionState::NotLoaded));
        assert!(slot.rows().is_empty());
    }

    #[test]
    fn stale_write_is_rejected() {
        let slot = RecordCollection::new();
        assert!(slot.set_rows(5, vec![record(json!({ "id": 1 }))]));
        assert!(!slot.set_rows(3, Vec::new()));
        assert_eq!(slot.rows().len(), 1);
    }

    #[test]
    fn equal_version_wins() {
        // "applied only if source version >= current" -- replays at the
        // same version are allowed (idempotent by construction).
        let slot = RecordCollection::new();
        assert!(slot.set_rows(4, Vec::new()));
        assert!(slot.set_rows(4, vec![record(json!({ "id": 1 }))]));
        assert_eq!(slot.rows().len(), 1);
    }

    #[test]
    fn upsert_prepends_new_rows() {
        let slot = RecordCollection::new();
        slot.set_rows(1, vec![record(json!({ "id": 1, "v": "a" }))]);
        slot.patch_upsert(2, record(json!({ "id": 2, "v": "b" })));

        let rows = slot.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id(), Some(RecordId::Int(2)));
    }

    #[test]
    fn upsert_replay_is_idempotent() {
        let slot = RecordCollection::new();
        slot.set_rows(1, vec![record(json!({ "id": 1, "v": "a" }))]);

        slot.patch_upsert(2, record(json!({ "id": 2, "v": "b" })));
        slot.patch_upsert(3, record(json!({ "id": 2, "v": "b" })));

        let rows = slot.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("v"), Some(&json!("b")));
    }

    #[test]
    fn upsert_replaces_in_place() {
        let slot = RecordCollection::new();
        slot.set_rows(
            1,
            vec![
                record(json!({ "id": 1, "v": "a" })),
                record(json!({ "id": 2, "v": "b" })),
            ],
        );

        slot.patch_upsert(2, record(json!({ "id": 2, "v": "b2" })));

        let rows = slot.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("v"), Some(&json!("b2")));
    }

    #[test]
    fn delete_removes_exactly_one() {
        let slot = RecordCollection::new();
        slot.set_rows(
            1,
            vec![
                record(json!({ "id": 1 })),
                record(json!({ "id": 2 })),
                record(json!({ "id": 3 })),
            ],
        );

        assert!(slot.patch_delete(2, &RecordId::Int(2)));
        let rows = slot.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id(), Some(RecordId::Int(1)));
        assert_eq!(rows[1].id(), Some(RecordId::Int(3)));
    }

    #[test]
    fn delete_of_absent_id_leaves_slot_untouched() {
        let slot = RecordCollection::new();
        slot.set_rows(1, vec![record(json!({ "id": 1 }))]);

        assert!(slot.patch_delete(2, &RecordId::Int(99)));
        assert_eq!(slot.rows().len(), 1);
        assert!(slot.state().is_loaded());
    }

    #[test]
    fn loading_does_not_blank_loaded_rows() {
        let slot = RecordCollection::new();
        slot.set_rows(1, vec![record(json!({ "id": 1 }))]);

        slot.mark_loading();
        assert!(slot.state().is_loaded());
        assert_eq!(slot.rows().len(), 1);
    }

    #[test]
    fn failed_state_keeps_reason_and_degrades_to_empty() {
        let slot = RecordCollection::new();
        slot.set_failed(1, "relation does not exist".into());

        assert!(slot.state().is_failed());
        assert!(slot.rows().is_empty());
        assert_eq!(slot.state().label(), "failed");
    }

    #[test]
    fn reset_restarts_version_counter() {
        let slot = RecordCollection::new();
        slot.set_rows(10, vec![record(json!({ "id": 1 }))]);

        slot.reset();
        assert!(matches!(slot.state(), CollectionState::NotLoaded));

        // After reset, low versions apply again (new session).
        assert!(slot.set_rows(1, Vec::new()));
        assert!(slot.state().is_loaded());
    }

    #[test]
    fn subscribers_see_state_transitions() {
        let slot = RecordCollection::new();
        let mut rx = slot.subscribe();

        slot.set_rows(1, vec![record(json!({ "id": 1 }))]);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_loaded());
    }
}
