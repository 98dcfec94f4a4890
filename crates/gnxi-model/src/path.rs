//! gNMI path helpers shared by the model and the service.

use gnxi_proto::gnmi::{Path, PathElem};
use serde_json::Value;

/// Build the full path from the prefix and path.
pub fn full_path(prefix: Option<&Path>, path: &Path) -> Path {
    let mut full = Path { origin: path.origin.clone(), ..Default::default() };
    if !path.element.is_empty() {
        if let Some(prefix) = prefix {
            full.element.extend(prefix.element.iter().cloned());
        }
        full.element.extend(path.element.iter().cloned());
    }
    if !path.elem.is_empty() {
        if let Some(prefix) = prefix {
            full.elem.extend(prefix.elem.iter().cloned());
        }
        full.elem.extend(path.elem.iter().cloned());
    }
    full
}

/// A path equal to the empty root path addresses the whole tree.
pub fn is_root(path: &Path) -> bool {
    path.elem.is_empty() && path.element.is_empty() && path.origin.is_empty()
}

/// Render a path in xpath form for error messages.
pub fn path_to_string(path: &Path) -> String {
    let mut out = String::new();
    for elem in &path.elem {
        out.push('/');
        out.push_str(&elem.name);
        let mut keys: Vec<_> = elem.key.iter().collect();
        keys.sort();
        for (k, v) in keys {
            out.push_str(&format!("[{}={}]", k, v));
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Render a JSON value the way keyed-list attributes are compared: numbers
/// and booleans by their canonical text form, strings verbatim.
pub fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a path-attribute value the way it is stored in the JSON tree:
/// integral numbers become JSON numbers, everything else stays a string.
pub fn key_value(attr: &str) -> Value {
    if let Ok(n) = attr.parse::<u64>() {
        return Value::from(n);
    }
    if let Ok(n) = attr.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(n) = attr.parse::<f64>() {
        if let Some(v) = serde_json::Number::from_f64(n) {
            return Value::Number(v);
        }
    }
    Value::String(attr.to_string())
}

/// Whether a list entry matches every attribute of the path elem.
pub fn entry_matches(entry: &serde_json::Map<String, Value>, elem: &PathElem) -> bool {
    for (k, v) in &elem.key {
        match entry.get(k) {
            Some(attr) if key_string(attr) == *v => {}
            _ => return false,
        }
    }
    true
}
