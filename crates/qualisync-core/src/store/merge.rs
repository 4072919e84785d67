// ── Merge application logic ──
//
// Applies bulk fetch results and targeted change-feed patches into the
// DataStore. Bulk writes (wave merge, single-collection refresh) draw
// their version at application time, so between two bulk writers the
// later-applied one wins. Patch versions are drawn by the caller at
// event receipt, so a patch delayed past a newer refresh is rejected
// as stale instead of resurrecting old rows.

use qualisync_api::{Record, RecordId};
use tracing::{debug, warn};

use super::data_store::DataStore;
use crate::model::Collection;

/// Outcome of one fetch inside a wave. The reason string of a failure
/// is kept for the `Failed` slot state; the error itself was already
/// classified and logged at the fetch site.
pub(crate) type FetchOutcome = (Collection, Result<Vec<Record>, String>);

impl DataStore {
    /// Apply one settled wave as a single merged update.
    ///
    /// Every slot is written without an intervening await point, then
    /// the wave generation is bumped, so a consumer that observes
    /// generation `g` sees all of wave `g`'s collections applied.
    /// Failed fetches become `Failed` slots, never absent ones.
    pub(crate) fn apply_wave(&self, results: Vec<FetchOutcome>) {
        for (collection, result) in results {
            let version = self.next_version();
            match result {
                Ok(rows) => {
                    debug!(collection = %collection, rows = rows.len(), "collection merged");
                    self.slot(collection).set_rows(version, rows);
                }
                Err(reason) => {
                    warn!(collection = %collection, %reason, "collection load failed");
                    self.slot(collection).set_failed(version, reason);
                }
            }
        }
        self.bump_generation();
    }

    /// Replace one collection wholesale after a successful refetch.
    pub(crate) fn apply_refresh(&self, collection: Collection, rows: Vec<Record>) {
        let version = self.next_version();
        self.slot(collection).set_rows(version, rows);
    }

    /// Id-keyed replace-or-insert from a change-feed event.
    pub(crate) fn apply_upsert(&self, collection: Collection, version: u64, record: Record) {
        if !self.slot(collection).patch_upsert(version, record) {
            debug!(collection = %collection, version, "stale upsert patch rejected");
        }
    }

    /// Remove one row by id from a change-feed delete event.
    pub(crate) fn apply_delete(&self, collection: Collection, version: u64, id: &RecordId) {
        if !self.slot(collection).patch_delete(version, id) {
            debug!(collection = %collection, version, "stale delete patch rejected");
        }
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
    fn wave_failures_become_failed_slots_not_gaps() {
        let store = DataStore::new();

        store.apply_wave(vec![
            (Collection::Personnel, Ok(vec![record(json!({ "id": 1 }))])),
            (Collection::TaskTags, Err("HTTP 500".into())),
            (Collection::Customers, Ok(Vec::new())),
        ]);

        assert_eq!(store.len(Collection::Personnel), 1);
        assert!(store.state(Collection::TaskTags).is_failed());
        assert!(store.rows(Collection::TaskTags).is_empty());
        assert!(store.state(Collection::Customers).is_loaded());
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn each_wave_bumps_generation_once() {
        let store = DataStore::new();

        store.apply_wave(vec![(Collection::Personnel, Ok(Vec::new()))]);
        store.apply_wave(vec![
            (Collection::Tasks, Ok(Vec::new())),
            (Collection::Kpis, Ok(Vec::new())),
        ]);

        assert_eq!(store.generation(), 2);
    }

    #[test]
    fn refresh_applied_after_patch_wins() {
        let store = DataStore::new();
        store.apply_refresh(Collection::QualityCosts, vec![record(json!({ "id": 1 }))]);

        // Patch version drawn at "receipt", refresh applied afterwards.
        let stale = store.next_version();
        store.apply_refresh(
            Collection::QualityCosts,
            vec![record(json!({ "id": 1 })), record(json!({ "id": 2 }))],
        );
        store.apply_upsert(Collection::QualityCosts, stale, record(json!({ "id": 3 })));

        // The stale patch was rejected; the refresh result stands.
        assert_eq!(store.len(Collection::QualityCosts), 2);
    }

    #[test]
    fn fresh_patch_applies_over_refresh() {
        let store = DataStore::new();
        store.apply_refresh(Collection::Documents, vec![record(json!({ "id": 1 }))]);

        let version = store.next_version();
        store.apply_upsert(Collection::Documents, version, record(json!({ "id": 2 })));

        let rows = store.rows(Collection::Documents);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id(), Some(RecordId::Int(2)));
    }
}
