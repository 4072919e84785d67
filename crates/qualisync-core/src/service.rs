// ── Data service ──
//
// Session lifecycle and orchestration on top of the DataStore: the
// staged four-wave load, per-collection refresh, the change-feed
// listener, audit-trail appends, and KPI metric evaluation. One
// instance per process; consumers receive read-only snapshots and
// never mutate the cache.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde_json::Value;
use strum::IntoEnumIterator;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use qualisync_api::transport::{TlsMode, TransportConfig};
use qualisync_api::{
    ChangeEvent, ChangeFeed, ChangeOp, Record, ReconnectConfig, RestClient,
};

use crate::config::{Actor, ServiceConfig, Session, TlsVerification};
use crate::error::CoreError;
use crate::model::{Collection, FetchSpec, Metric, Wave};
use crate::options::map_rows_to_options;
use crate::store::{CollectionState, DataStore, LoadPhase};

/// Page size for the one unbounded collection (quality costs).
const PAGE_SIZE: u32 = 1000;

// ── DataService ─────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ServiceInner>`. Owns the staged load
/// sequence, the reload guard, the change-feed listener, and the
/// audit side channel. Reads go through [`store`](Self::store) or the
/// snapshot delegates below.
#[derive(Clone)]
pub struct DataService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: ServiceConfig,
    store: Arc<DataStore>,
    session: Mutex<Option<ActiveSession>>,
    /// Serializes full reloads. `initialize` uses `try_lock` (a second
    /// call while one is in flight is a no-op); `force_reload` awaits
    /// the lock and queues. Single-collection refreshes never touch it.
    reload: Mutex<()>,
}

struct ActiveSession {
    client: Arc<RestClient>,
    actor: Actor,
    feed: Option<ChangeFeed>,
    cancel: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl DataService {
    /// Create a service from configuration. Does not connect -- call
    /// [`start`](Self::start) (or [`connect`](Self::connect)) once a
    /// session is available.
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                config,
                store: Arc::new(DataStore::new()),
                session: Mutex::new(None),
                reload: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// The underlying reactive store.
    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    // ── Session lifecycle ────────────────────────────────────────────

    /// Attach an authenticated session and subscribe to the change
    /// feed, without running the staged load. A previous session, if
    /// any, is torn down first.
    pub async fn connect(&self, session: Session) -> Result<(), CoreError> {
        self.end_session().await;

        let transport = self.transport_config();
        let client = Arc::new(RestClient::new(
            self.inner.config.base_url.clone(),
            &self.inner.config.anon_key,
            Some(&session.access_token),
            &transport,
        )?);

        let cancel = CancellationToken::new();
        let mut feed = None;
        let mut listener = None;

        if self.inner.config.realtime_enabled {
            let connected = ChangeFeed::connect(
                self.inner.config.feed_url()?,
                Collection::realtime_tables(),
                ReconnectConfig::default(),
                cancel.clone(),
                Some(session.access_token.clone()),
            );
            let service = self.clone();
            let events = connected.subscribe();
            listener = Some(tokio::spawn(listener_task(service, events, cancel.clone())));
            feed = Some(connected);
        }

        *self.inner.session.lock().await = Some(ActiveSession {
            client,
            actor: session.actor,
            feed,
            cancel,
            listener,
        });

        debug!("session attached");
        Ok(())
    }

    /// Attach a session and run the staged load.
    pub async fn start(&self, session: Session) -> Result<(), CoreError> {
        self.connect(session).await?;
        self.initialize().await
    }

    /// Tear down the session: cancel the listener, drop the client,
    /// and reset the cache to its pre-load sentinel state.
    pub async fn end_session(&self) {
        let previous = self.inner.session.lock().await.take();
        let Some(active) = previous else { return };

        active.cancel.cancel();
        if let Some(handle) = active.listener {
            let _ = handle.await;
        }
        drop(active.feed);

        self.inner.store.reset();
        debug!("session ended, cache reset");
    }

    // ── Staged load ──────────────────────────────────────────────────

    /// Run the four load waves in priority order.
    ///
    /// Idempotent per session: a no-op when the store is already loaded
    /// or another full load is in flight. Per-fetch failures degrade to
    /// `Failed` slots; `initialize` itself only errors when no session
    /// is attached.
    pub async fn initialize(&self) -> Result<(), CoreError> {
        let client = self.client().await?;

        if self.inner.store.phase() == LoadPhase::Ready {
            debug!("store already loaded, skipping (use force_reload to re-run)");
            return Ok(());
        }
        let Ok(_guard) = self.inner.reload.try_lock() else {
            debug!("full load already in flight, skipping");
            return Ok(());
        };

        self.run_full_load(&client).await;
        Ok(())
    }

    /// Full wave sequence bypassing the already-loaded check. Queues
    /// behind any in-flight full load rather than racing it.
    pub async fn force_reload(&self) -> Result<(), CoreError> {
        let client = self.client().await?;
        let _guard = self.inner.reload.lock().await;
        self.run_full_load(&client).await;
        Ok(())
    }

    async fn run_full_load(&self, client: &RestClient) {
        let started = Instant::now();
        self.inner.store.begin_full_load();

        for wave in Wave::iter() {
            debug!(%wave, "starting load wave");
            let results = self.run_wave(client, wave).await;
            self.inner.store.apply_wave(results);
        }

        self.inner.store.finish_full_load();
        info!(
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "staged load complete"
        );
    }

    /// Fetch every collection in the wave concurrently and wait for
    /// all of them to settle. A failing fetch never aborts siblings;
    /// its outcome is captured for the merged update.
    async fn run_wave(
        &self,
        client: &RestClient,
        wave: Wave,
    ) -> Vec<(Collection, Result<Vec<Record>, String>)> {
        let fetches = Collection::in_wave(wave).map(|collection| async move {
            (collection, self.fetch_with_deadline(client, collection).await)
        });
        join_all(fetches).await
    }

    /// One wave fetch bounded by the configured deadline; a hang
    /// becomes a soft failure instead of starving the wave barrier.
    async fn fetch_with_deadline(
        &self,
        client: &RestClient,
        collection: Collection,
    ) -> Result<Vec<Record>, String> {
        let deadline = self.inner.config.fetch_timeout;
        match tokio::time::timeout(deadline, fetch_rows(client, collection)).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => {
                if e.is_missing_relation() {
                    debug!(collection = %collection, "relation missing on backend");
                }
                Err(e.to_string())
            }
            Err(_) => Err(format!("timed out after {}s", deadline.as_secs())),
        }
    }

    // ── Per-collection refresh ───────────────────────────────────────

    /// Re-run one collection's fetch and replace its slot wholesale.
    ///
    /// On failure the slot keeps its previous rows -- stale data beats
    /// a blank screen on a transient error. Never touches the reload
    /// guard; safe to call while a full load is in flight.
    pub async fn refresh(&self, collection: Collection) -> Result<(), CoreError> {
        let client = self.client().await?;
        match fetch_rows(&client, collection).await {
            Ok(rows) => {
                debug!(collection = %collection, rows = rows.len(), "collection refreshed");
                self.inner.store.apply_refresh(collection, rows);
                Ok(())
            }
            Err(e) => {
                warn!(collection = %collection, error = %e, "refresh failed, keeping cached rows");
                Err(e.into())
            }
        }
    }

    pub async fn refresh_quality_costs(&self) -> Result<(), CoreError> {
        self.refresh(Collection::QualityCosts).await
    }

    pub async fn refresh_tasks(&self) -> Result<(), CoreError> {
        self.refresh(Collection::Tasks).await
    }

    pub async fn refresh_non_conformities(&self) -> Result<(), CoreError> {
        self.refresh(Collection::NonConformities).await
    }

    pub async fn refresh_documents(&self) -> Result<(), CoreError> {
        self.refresh(Collection::Documents).await
    }

    pub async fn refresh_personnel(&self) -> Result<(), CoreError> {
        self.refresh(Collection::Personnel).await
    }

    pub async fn refresh_deviations(&self) -> Result<(), CoreError> {
        self.refresh(Collection::Deviations).await
    }

    pub async fn refresh_kpis(&self) -> Result<(), CoreError> {
        self.refresh(Collection::Kpis).await
    }

    pub async fn refresh_suppliers(&self) -> Result<(), CoreError> {
        self.refresh(Collection::Suppliers).await
    }

    pub async fn refresh_customer_complaints(&self) -> Result<(), CoreError> {
        self.refresh(Collection::CustomerComplaints).await
    }

    pub async fn refresh_produced_vehicles(&self) -> Result<(), CoreError> {
        self.refresh(Collection::ProducedVehicles).await
    }

    // ── Change-feed merge ────────────────────────────────────────────

    /// Merge one change event into the store.
    ///
    /// High-frequency collections get a targeted patch; the remaining
    /// realtime collections are refetched (correctness over efficiency
    /// for low-traffic tables). Events for unmapped tables are dropped.
    /// Public so tests and alternate feeds can drive it directly.
    pub async fn apply_change(&self, event: &ChangeEvent) {
        let Some(collection) = Collection::from_table(&event.table) else {
            debug!(table = %event.table, "change event for unmapped table, dropping");
            return;
        };

        self.inner.store.note_change_event();
        debug!(collection = %collection, op = event.op.as_str(), "change event received");

        // Audit append runs independently of the merge path.
        self.spawn_audit(event);

        if collection.patchable() {
            // Version drawn at event receipt: a patch that loses the
            // race against a newer refresh is rejected as stale.
            let version = self.inner.store.next_version();
            match event.op {
                ChangeOp::Insert | ChangeOp::Update => {
                    if let Some(record) = event.record.clone() {
                        self.inner.store.apply_upsert(collection, version, record);
                    } else {
                        debug!(collection = %collection, "change event without record, dropping");
                    }
                }
                ChangeOp::Delete => {
                    if let Some(id) = event.row_id() {
                        self.inner.store.apply_delete(collection, version, &id);
                    } else {
                        debug!(collection = %collection, "delete event without row id, dropping");
                    }
                }
            }
        } else {
            // Failure is already logged (and the slot kept) by refresh.
            let _ = self.refresh(collection).await;
        }
    }

    /// Subscribe to the raw change-event stream of the active session.
    pub async fn subscribe_changes(
        &self,
    ) -> Result<broadcast::Receiver<Arc<ChangeEvent>>, CoreError> {
        let guard = self.inner.session.lock().await;
        let active = guard.as_ref().ok_or(CoreError::SessionRequired)?;
        active
            .feed
            .as_ref()
            .map(ChangeFeed::subscribe)
            .ok_or_else(|| CoreError::Config {
                message: "change feed is disabled for this session".into(),
            })
    }

    // ── Audit trail ──────────────────────────────────────────────────

    fn spawn_audit(&self, event: &ChangeEvent) {
        let service = self.clone();
        let action = event.op.as_str();
        let table = event.table.clone();
        let details = event.row_id().map(|id| format!("row {id}"));
        tokio::spawn(async move {
            service.log_audit(action, &table, details.as_deref()).await;
        });
    }

    /// Best-effort audit-trail append attributed to the session actor.
    ///
    /// Permission-denied is an expected outcome (not every actor holds
    /// the audit-write grant) and is silently skipped; every other
    /// failure is logged and swallowed. Nothing here can surface to
    /// the merge path or to consumers.
    pub async fn log_audit(&self, action: &str, table: &str, details: Option<&str>) {
        let Some((client, actor)) = self.session_parts().await else {
            return;
        };

        let row = serde_json::json!({
            "action": action,
            "table_name": table,
            "actor_id": actor.id.to_value(),
            "actor_name": actor.full_name,
            "details": details,
        });

        match client.insert("audit_log_entries", &row).await {
            Ok(()) => debug!(action, table, "audit entry recorded"),
            Err(e) if e.is_permission_denied() => {
                debug!(action, table, "audit append not permitted, skipping");
            }
            Err(e) => warn!(action, table, error = %e, "audit append failed"),
        }
    }

    // ── KPI metrics ──────────────────────────────────────────────────

    /// Evaluate a dashboard metric via its backend stored procedure.
    pub async fn fetch_metric(&self, metric: Metric) -> Result<f64, CoreError> {
        let client = self.client().await?;
        let value: Value = client
            .rpc(metric.procedure(), &serde_json::json!({}))
            .await?;
        metric_value(metric, &value)
    }

    // ── Snapshot delegates ───────────────────────────────────────────

    pub fn rows(&self, collection: Collection) -> Arc<Vec<Record>> {
        self.inner.store.rows(collection)
    }

    pub fn state(&self, collection: Collection) -> CollectionState {
        self.inner.store.state(collection)
    }

    pub fn subscribe(&self, collection: Collection) -> tokio::sync::watch::Receiver<CollectionState> {
        self.inner.store.subscribe(collection)
    }

    pub fn loading(&self) -> bool {
        self.inner.store.loading()
    }

    pub fn phase(&self) -> LoadPhase {
        self.inner.store.phase()
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn client(&self) -> Result<Arc<RestClient>, CoreError> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| Arc::clone(&s.client))
            .ok_or(CoreError::SessionRequired)
    }

    async fn session_parts(&self) -> Option<(Arc<RestClient>, Actor)> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| (Arc::clone(&s.client), s.actor.clone()))
    }

    fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.inner.config.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.inner.config.timeout,
        }
    }
}

// ── Background listener ──────────────────────────────────────────────

/// Drain the change-feed broadcast, merging each event into the store.
async fn listener_task(
    service: DataService,
    mut events: broadcast::Receiver<Arc<ChangeEvent>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => service.apply_change(&event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change-feed consumer lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    debug!("change-feed listener exiting");
}

// ── Shared fetch path ────────────────────────────────────────────────

/// Fetch one collection the way it is declared in the catalog:
/// paginated for the unbounded collection, with the per-row secondary
/// fetch where the backend cannot embed the relation, and with the
/// option-row transform applied before the rows reach the store. Used
/// by both the wave loader and single-collection refresh.
async fn fetch_rows(
    client: &RestClient,
    collection: Collection,
) -> Result<Vec<Record>, qualisync_api::Error> {
    let spec = collection.spec();

    let mut rows = if collection.paginated() {
        fetch_paginated(client, &spec).await?
    } else {
        let mut req = client.select(spec.table).columns(spec.columns);
        if let Some((column, ascending)) = spec.order {
            req = req.order(column, ascending);
        }
        if let Some(limit) = spec.limit {
            req = req.limit(limit);
        }
        req.fetch().await?
    };

    if let Some((relation, fk, field)) = collection.row_subfetch() {
        attach_row_subfetches(client, &mut rows, relation, fk, field).await;
    }

    if let Some(mapping) = collection.option_mapping() {
        rows = map_rows_to_options(rows, &mapping);
    }

    Ok(rows)
}

/// Page through an unbounded collection in fixed-size chunks until a
/// short page, accumulating into one sequence merged as a unit.
async fn fetch_paginated(
    client: &RestClient,
    spec: &FetchSpec,
) -> Result<Vec<Record>, qualisync_api::Error> {
    let mut all = Vec::new();
    let mut page: u64 = 0;

    loop {
        let mut req = client
            .select(spec.table)
            .columns(spec.columns)
            .limit(PAGE_SIZE)
            .offset(page * u64::from(PAGE_SIZE));
        if let Some((column, ascending)) = spec.order {
            req = req.order(column, ascending);
        }

        let rows = req.fetch().await?;
        let short = rows.len() < PAGE_SIZE as usize;
        all.extend(rows);
        if short {
            break;
        }
        page += 1;
    }

    Ok(all)
}

/// Run the per-row secondary query and attach the result under the
/// declared field. A failed sub-fetch degrades that row to an empty
/// related list instead of failing the whole collection.
async fn attach_row_subfetches(
    client: &RestClient,
    rows: &mut [Record],
    relation: &str,
    fk: &str,
    field: &str,
) {
    let fetches = rows.iter().map(|row| async move {
        let Some(id) = row.id() else {
            return Vec::new();
        };
        client
            .select(relation)
            .eq(fk, id)
            .fetch()
            .await
            .unwrap_or_else(|e| {
                debug!(relation, error = %e, "row sub-fetch failed, defaulting to empty");
                Vec::new()
            })
    });
    let related = join_all(fetches).await;

    for (row, related_rows) in rows.iter_mut().zip(related) {
        row.insert(
            field,
            Value::Array(related_rows.into_iter().map(Record::into_value).collect()),
        );
    }
}

// ── Metric payload parsing ───────────────────────────────────────────

/// Coerce a stored procedure's scalar reply into `f64`. Procedures
/// return numbers, numeric strings, or null (no matching rows).
fn metric_value(metric: Metric, value: &Value) -> Result<f64, CoreError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| CoreError::Metric {
            metric: metric.to_string(),
            message: format!("number out of f64 range: {n}"),
        }),
        Value::String(s) => s.parse().map_err(|_| CoreError::Metric {
            metric: metric.to_string(),
            message: format!("non-numeric string: {s:?}"),
        }),
        Value::Null => Ok(0.0),
        other => Err(CoreError::Metric {
            metric: metric.to_string(),
            message: format!("unexpected payload: {other}"),
        }),
    }
}
