// ── Derived option rows ──
//
// The reference collections backing UI selectors are stored as
// `{value, label, ...}` rows, mapped once at store time so every
// consumer sees the same shape. Pure functions, no state.

use qualisync_api::Record;
use serde_json::Value;

use crate::model::OptionMapping;

/// Map one raw record to an option row.
///
/// `value` takes the record's identifier field, `label` its display
/// field; fields listed in `carry` are copied over verbatim. Absent
/// fields become `null` so the shape contract holds for every row.
pub fn map_to_option(record: &Record, mapping: &OptionMapping) -> Record {
    let mut out = Record::new();
    out.insert(
        "value",
        record.get(mapping.value_field).cloned().unwrap_or(Value::Null),
    );
    out.insert(
        "label",
        record.get(mapping.label_field).cloned().unwrap_or(Value::Null),
    );
    for field in mapping.carry {
        if let Some(v) = record.get(field) {
            out.insert(*field, v.clone());
        }
    }
    out
}

/// Map a whole fetch result to option rows.
pub fn map_rows_to_options(rows: Vec<Record>, mapping: &OptionMapping) -> Vec<Record> {
    rows.iter().map(|r| map_to_option(r, mapping)).collect()
}
