// Service-level tests for change-event merging: targeted patches for
// the high-frequency collections, refetch routing for the rest, and
// the best-effort audit side channel.

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use qualisync_core::{
    Actor, ChangeEvent, ChangeOp, Collection, DataService, Record, RecordId, ServiceConfig,
    Session,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn test_config(server: &MockServer) -> ServiceConfig {
    ServiceConfig {
        base_url: server.uri().parse().expect("mock server uri"),
        anon_key: SecretString::from("test-anon-key".to_owned()),
        fetch_timeout: Duration::from_secs(5),
        realtime_enabled: false,
        ..ServiceConfig::default()
    }
}

fn test_session() -> Session {
    Session {
        access_token: SecretString::from("test-access-token".to_owned()),
        actor: Actor {
            id: RecordId::Int(42),
            full_name: "Ayşe Demir".to_owned(),
        },
    }
}

fn record(value: serde_json::Value) -> Record {
    serde_json::from_value(value).expect("record literal")
}

fn event(table: &str, op: ChangeOp, value: serde_json::Value) -> ChangeEvent {
    let row = record(value);
    match op {
        ChangeOp::Delete => ChangeEvent {
            table: table.to_owned(),
            op,
            record: None,
            old_record: Some(row),
        },
        ChangeOp::Insert | ChangeOp::Update => ChangeEvent {
            table: table.to_owned(),
            op,
            record: Some(row),
            old_record: None,
        },
    }
}

async fn mount_backend(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/rest/v1/.*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/audit_log_entries"))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;
}

async fn seeded_service(server: &MockServer) -> DataService {
    Mock::given(method("GET"))
        .and(path("/rest/v1/quality_costs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "amount": 100.0 },
            { "id": 2, "amount": 250.0 },
        ])))
        .with_priority(1)
        .mount(server)
        .await;

    let service = DataService::new(test_config(server));
    service.start(test_session()).await.expect("start");
    service
}

/// The audit append is fire-and-forget; poll for the write to land.
async fn audit_writes(server: &MockServer) -> Vec<serde_json::Value> {
    for _ in 0..100 {
        let bodies: Vec<serde_json::Value> = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == "POST" && r.url.path() == "/rest/v1/audit_log_entries")
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect();
        if !bodies.is_empty() {
            return bodies;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Vec::new()
}

// ── Targeted patches (quality costs, documents) ─────────────────────

#[tokio::test]
async fn insert_event_prepends_the_new_record() {
    let server = MockServer::start().await;
    mount_backend(&server).await;
    let service = seeded_service(&server).await;

    service
        .apply_change(&event(
            "quality_costs",
            ChangeOp::Insert,
            json!({ "id": 3, "amount": 75.0 }),
        ))
        .await;

    let rows = service.rows(Collection::QualityCosts);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].id(), Some(RecordId::Int(3)));
    assert!(service.store().last_change_event().is_some());
}

#[tokio::test]
async fn duplicate_delivery_of_an_insert_is_idempotent() {
    let server = MockServer::start().await;
    mount_backend(&server).await;
    let service = seeded_service(&server).await;

    let insert = event("quality_costs", ChangeOp::Insert, json!({ "id": 3, "amount": 75.0 }));
    service.apply_change(&insert).await;
    service.apply_change(&insert).await;

    let rows = service.rows(Collection::QualityCosts);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("amount"), Some(&json!(75.0)));
}

#[tokio::test]
async fn update_event_replaces_the_matching_record_in_place() {
    let server = MockServer::start().await;
    mount_backend(&server).await;
    let service = seeded_service(&server).await;

    service
        .apply_change(&event(
            "quality_costs",
            ChangeOp::Update,
            json!({ "id": 2, "amount": 999.0 }),
        ))
        .await;

    let rows = service.rows(Collection::QualityCosts);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].id(), Some(RecordId::Int(2)));
    assert_eq!(rows[1].get("amount"), Some(&json!(999.0)));
}

#[tokio::test]
async fn delete_event_removes_exactly_the_matching_record() {
    let server = MockServer::start().await;
    mount_backend(&server).await;
    let service = seeded_service(&server).await;

    service
        .apply_change(&event("quality_costs", ChangeOp::Delete, json!({ "id": 1 })))
        .await;

    let rows = service.rows(Collection::QualityCosts);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id(), Some(RecordId::Int(2)));

    // A delete for an id that is not present leaves the slot untouched.
    service
        .apply_change(&event("quality_costs", ChangeOp::Delete, json!({ "id": 99 })))
        .await;
    assert_eq!(service.rows(Collection::QualityCosts).len(), 1);
}

#[tokio::test]
async fn events_without_usable_payload_are_dropped() {
    let server = MockServer::start().await;
    mount_backend(&server).await;
    let service = seeded_service(&server).await;

    // Insert with no record, delete with no row id.
    service
        .apply_change(&ChangeEvent {
            table: "quality_costs".to_owned(),
            op: ChangeOp::Insert,
            record: None,
            old_record: None,
        })
        .await;
    service
        .apply_change(&event("quality_costs", ChangeOp::Delete, json!({ "note": "no id" })))
        .await;

    assert_eq!(service.rows(Collection::QualityCosts).len(), 2);
}

// ── Refetch routing for low-traffic realtime tables ─────────────────

#[tokio::test]
async fn task_events_trigger_a_single_collection_refetch() {
    let server = MockServer::start().await;
    mount_backend(&server).await;

    // Initial load sees one task; the post-event refetch sees two.
    Mock::given(method("GET"))
        .and(path("/rest/v1/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 10, "title": "Calibrate CMM" },
        ])))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 11, "title": "Review 8D report" },
            { "id": 10, "title": "Calibrate CMM" },
        ])))
        .with_priority(2)
        .mount(&server)
        .await;

    let service = DataService::new(test_config(&server));
    service.start(test_session()).await.expect("start");
    assert_eq!(service.rows(Collection::Tasks).len(), 1);

    service
        .apply_change(&event("tasks", ChangeOp::Insert, json!({ "id": 11 })))
        .await;

    assert_eq!(service.rows(Collection::Tasks).len(), 2);
    let task_requests = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/rest/v1/tasks")
        .count();
    assert_eq!(task_requests, 2);
}

#[tokio::test]
async fn events_for_unmapped_tables_are_ignored() {
    let server = MockServer::start().await;
    mount_backend(&server).await;
    let service = seeded_service(&server).await;
    let before = service.store().last_change_event();

    service
        .apply_change(&event(
            "vehicle_timeline_events",
            ChangeOp::Insert,
            json!({ "id": 1 }),
        ))
        .await;

    assert_eq!(service.rows(Collection::QualityCosts).len(), 2);
    assert_eq!(service.store().last_change_event(), before);
}

// ── Audit side channel ──────────────────────────────────────────────

#[tokio::test]
async fn change_events_append_an_attributed_audit_entry() {
    let server = MockServer::start().await;
    mount_backend(&server).await;
    let service = seeded_service(&server).await;

    service
        .apply_change(&event(
            "quality_costs",
            ChangeOp::Insert,
            json!({ "id": 3, "amount": 75.0 }),
        ))
        .await;

    let writes = audit_writes(&server).await;
    assert!(!writes.is_empty(), "audit append should be issued");
    assert_eq!(writes[0]["action"], json!("INSERT"));
    assert_eq!(writes[0]["table_name"], json!("quality_costs"));
    assert_eq!(writes[0]["actor_name"], json!("Ayşe Demir"));
}

#[tokio::test]
async fn audit_permission_denial_never_reaches_the_merge_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/rest/v1/.*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/audit_log_entries"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "new row violates row-level security policy",
            "code": "42501",
        })))
        .mount(&server)
        .await;

    let service = seeded_service(&server).await;

    service
        .apply_change(&event(
            "quality_costs",
            ChangeOp::Insert,
            json!({ "id": 3, "amount": 75.0 }),
        ))
        .await;

    // The patch applied despite the rejected audit write.
    assert_eq!(service.rows(Collection::QualityCosts).len(), 3);

    // Give the fire-and-forget task time to run its course.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(service.rows(Collection::QualityCosts).len(), 3);
}
