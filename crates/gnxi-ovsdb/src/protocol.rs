//! OVSDB wire-protocol structures (RFC 7047) over serde_json.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A single row, as carried in monitor updates and select results.
pub type Row = Map<String, Value>;

/// One operation inside a `transact` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub op: String,
    pub table: String,
    #[serde(rename = "where", default, skip_serializing_if = "Vec::is_empty")]
    pub clauses: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<Row>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

impl Operation {
    /// Row update keyed by `_uuid`.
    pub fn update(table: impl Into<String>, uuid: &str, row: Row) -> Self {
        Self {
            op: "update".to_string(),
            table: table.into(),
            clauses: vec![uuid_condition(uuid)],
            row: Some(row),
            columns: Vec::new(),
        }
    }

    pub fn select(table: impl Into<String>, clauses: Vec<Value>, columns: Vec<String>) -> Self {
        Self {
            op: "select".to_string(),
            table: table.into(),
            clauses,
            row: None,
            columns,
        }
    }
}

/// `["_uuid", "==", ["uuid", ...]]` condition clause.
pub fn uuid_condition(uuid: &str) -> Value {
    json!(["_uuid", "==", ["uuid", uuid]])
}

/// Per-operation result inside a `transact` reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationResult {
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub uuid: Option<Value>,
}

/// Which row events a monitor reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonitorSelect {
    pub initial: bool,
    pub insert: bool,
    pub delete: bool,
    pub modify: bool,
}

impl MonitorSelect {
    pub fn all() -> Self {
        Self { initial: true, insert: true, delete: true, modify: true }
    }
}

/// Per-table request inside a `monitor` call.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    pub select: MonitorSelect,
}

/// One row change: `new` empty means the row was deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Row>,
}

impl RowUpdate {
    pub fn upserts(&self) -> bool {
        self.new.as_ref().map(|r| !r.is_empty()).unwrap_or(false)
    }
}

/// Rows changed in one table, keyed by row UUID.
pub type TableUpdate = HashMap<String, RowUpdate>;

/// All table changes carried by one monitor reply or update notification.
pub type TableUpdates = HashMap<String, TableUpdate>;

/// Extract the uuid string from an OVSDB `["uuid", "..."]` pair.
pub fn atom_uuid(value: &Value) -> Option<String> {
    let pair = value.as_array()?;
    if pair.len() == 2 && pair[0] == "uuid" {
        pair[1].as_str().map(|s| s.to_string())
    } else {
        None
    }
}

/// Optional scalar columns come back as `["set", []]` when unset.
pub fn is_empty_set(value: &Value) -> bool {
    match value.as_array() {
        Some(pair) => {
            pair.len() == 2
                && pair[0] == "set"
                && pair[1].as_array().map(|m| m.is_empty()).unwrap_or(false)
        }
        None => false,
    }
}

/// Members of an OVSDB set column; a bare scalar is a one-element set.
pub fn set_members(value: &Value) -> Vec<Value> {
    match value.as_array() {
        Some(pair) if pair.len() == 2 && pair[0] == "set" => {
            pair[1].as_array().cloned().unwrap_or_default()
        }
        _ => vec![value.clone()],
    }
}

/// Entries of an OVSDB map column (`["map", [[k, v], ...]]`).
pub fn map_entries(value: &Value) -> Vec<(String, Value)> {
    let Some(pair) = value.as_array() else {
        return Vec::new();
    };
    if pair.len() != 2 || pair[0] != "map" {
        return Vec::new();
    }
    pair[1]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| {
                    let kv = e.as_array()?;
                    Some((kv.first()?.as_str()?.to_string(), kv.get(1)?.clone()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Build an OVSDB map column value.
pub fn map_column(entries: &[(&str, &str)]) -> Value {
    let pairs: Vec<Value> = entries.iter().map(|(k, v)| json!([k, v])).collect();
    json!(["map", pairs])
}
