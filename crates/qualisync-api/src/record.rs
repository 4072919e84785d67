// ── Row types ───────────────────────────────────────────────────────
//
// The backend's tables are schema-flexible from the client's point of
// view: every row is a JSON object whose only universally-guaranteed
// column is the server-assigned `id`. Rows are kept as raw objects and
// `RecordId` unifies the identifier shapes the backend emits.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ── RecordId ────────────────────────────────────────────────────────

/// Canonical identifier for a row in any collection.
///
/// Transparently wraps a UUID (most tables), a bigint (serial-keyed
/// tables such as audit log entries), or an opaque string. Consumers
/// never care which.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Uuid(Uuid),
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Build from a raw JSON value, if it has an identifier shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::from(s.as_str())),
            Value::Number(n) => n.as_i64().map(Self::Int),
            _ => None,
        }
    }

    /// The JSON value this identifier serializes to.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Uuid(u) => Value::String(u.to_string()),
            Self::Int(i) => Value::from(*i),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        match Uuid::parse_str(s) {
            Ok(u) => Self::Uuid(u),
            Err(_) => Self::Text(s.to_owned()),
        }
    }
}

impl From<Uuid> for RecordId {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

impl From<i64> for RecordId {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

// ── Record ──────────────────────────────────────────────────────────

/// A single row: a JSON object with an optional `id` column.
///
/// Nothing the backend sends is dropped; embedded-resource columns from
/// join selects arrive as nested arrays/objects and are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// The server-assigned identifier, if the row carries one.
    pub fn id(&self) -> Option<RecordId> {
        self.0.get("id").and_then(RecordId::from_value)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// A field rendered as a display string (`""` for null/absent).
    pub fn display(&self, field: &str) -> String {
        match self.0.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Borrow the row as a JSON object, e.g. for audit detail payloads.
    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn uuid_id_is_parsed() {
        let rec = record(json!({ "id": "550e8400-e29b-41d4-a716-446655440000", "name": "x" }));
        assert!(matches!(rec.id(), Some(RecordId::Uuid(_))));
    }

    #[test]
    fn integer_id_is_parsed() {
        let rec = record(json!({ "id": 42, "action": "INSERT" }));
        assert_eq!(rec.id(), Some(RecordId::Int(42)));
    }

    #[test]
    fn opaque_string_id_is_kept() {
        let rec = record(json!({ "id": "NC-2026-0041" }));
        assert_eq!(rec.id(), Some(RecordId::Text("NC-2026-0041".into())));
    }

    #[test]
    fn missing_id_is_none() {
        let rec = record(json!({ "part_code": "P-100", "is_current": true }));
        assert!(rec.id().is_none());
    }

    #[test]
    fn nested_join_columns_survive_roundtrip() {
        let raw = json!({
            "id": 7,
            "amount": 1250.5,
            "supplier": { "name": "Acme" },
            "non_conformities": [{ "nc_number": "8D-12", "id": 3 }]
        });
        let rec = record(raw.clone());
        assert_eq!(rec.as_value(), raw);
        assert_eq!(rec.display("amount"), "1250.5");
        assert_eq!(rec.display("missing"), "");
    }
}
