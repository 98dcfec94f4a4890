//! Schema-aware mutation of the IETF JSON configuration tree.
//!
//! Set operations are applied to a plain JSON clone of the validated tree;
//! the result is re-materialized into a validated struct afterwards, so
//! these helpers only have to keep the tree shape consistent, not the
//! semantics.

use gnxi_core::{Error, Result};
use gnxi_model::path::{entry_matches, key_string, key_value};
use gnxi_model::schema::{SchemaKind, SchemaNode};
use gnxi_proto::gnmi::PathElem;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Replace,
    Update,
}

/// Delete the node addressed by `elems`. Returns whether a path was
/// actually deleted (which is what gates the downstream apply).
pub fn delete_path(
    tree: &mut Map<String, Value>,
    schema: &'static SchemaNode,
    elems: &[PathElem],
) -> bool {
    let Some((elem, rest)) = elems.split_first() else {
        return false;
    };

    if rest.is_empty() {
        if elem.key.is_empty() {
            tree.remove(&elem.name);
            return true;
        }
        return delete_keyed_list_entry(tree, elem);
    }

    let Some(child_schema) = schema.child(&elem.name) else {
        return false;
    };
    match &child_schema.kind {
        SchemaKind::List { .. } => {
            let Some(Value::Array(entries)) = tree.get_mut(&elem.name) else {
                return false;
            };
            let Some(entry) = entries.iter_mut().find(|entry| {
                entry
                    .as_object()
                    .map(|m| entry_matches(m, elem))
                    .unwrap_or(false)
            }) else {
                return false;
            };
            match entry.as_object_mut() {
                Some(entry) => delete_path(entry, child_schema, rest),
                None => false,
            }
        }
        _ => {
            let Some(Value::Object(child)) = tree.get_mut(&elem.name) else {
                return false;
            };
            delete_path(child, child_schema, rest)
        }
    }
}

/// Delete the keyed list entry matching the path elem. A single-entry list
/// collapses into removal of the parent node.
pub fn delete_keyed_list_entry(node: &mut Map<String, Value>, elem: &PathElem) -> bool {
    let Some(Value::Array(entries)) = node.get(&elem.name) else {
        return false;
    };

    let mut matched = None;
    for (i, entry) in entries.iter().enumerate() {
        let Some(entry) = entry.as_object() else {
            tracing::error!("expected object for a keyed list entry, got {}", entry);
            return false;
        };
        let mut matching = true;
        for (k, v) in &elem.key {
            match entry.get(k) {
                Some(attr) => {
                    if key_string(attr) != *v {
                        matching = false;
                        break;
                    }
                }
                None => return false,
            }
        }
        if matching {
            matched = Some(i);
            break;
        }
    }

    let Some(index) = matched else {
        return false;
    };
    let Some(Value::Array(entries)) = node.get_mut(&elem.name) else {
        return false;
    };
    if entries.len() == 1 {
        node.remove(&elem.name);
    } else {
        entries.swap_remove(index);
    }
    true
}

/// Replace or update the node addressed by `elems` with `node_val`,
/// creating intermediate containers and keyed-list entries as needed.
pub fn set_path(
    tree: &mut Map<String, Value>,
    schema: &'static SchemaNode,
    elems: &[PathElem],
    op: SetOp,
    node_val: Value,
) -> Result<()> {
    let Some((elem, rest)) = elems.split_first() else {
        return Err(Error::internal("set of an empty path"));
    };

    if rest.is_empty() {
        if elem.key.is_empty() {
            return set_path_without_attribute(op, tree, elem, node_val);
        }
        return set_path_with_attribute(op, tree, elem, node_val);
    }

    let child_schema = schema
        .child(&elem.name)
        .ok_or_else(|| Error::not_found(format!("path elem not found: {}", elem.name)))?;
    match &child_schema.kind {
        SchemaKind::List { .. } => {
            let entry = get_keyed_list_entry(tree, elem, true)
                .ok_or_else(|| Error::not_found(format!("path elem not found: {}", elem.name)))?;
            set_path(entry, child_schema, rest, op, node_val)
        }
        SchemaKind::Container { .. } => {
            let child = tree
                .entry(elem.name.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            match child.as_object_mut() {
                Some(child) => set_path(child, child_schema, rest, op, node_val),
                None => Err(Error::internal(format!("wrong node type at {}", elem.name))),
            }
        }
        SchemaKind::Leaf { .. } => {
            Err(Error::not_found(format!("uncompatible path elem: {}", elem.name)))
        }
    }
}

/// Replace or update a keyed-list entry, writing the path attributes back
/// into the entry and rejecting conflicting key values in the body.
fn set_path_with_attribute(
    op: SetOp,
    node: &mut Map<String, Value>,
    elem: &PathElem,
    node_val: Value,
) -> Result<()> {
    let Value::Object(body) = node_val else {
        return Err(Error::invalid_argument(format!(
            "expect nodeVal is a json object, received {}", node_val
        )));
    };

    let entry = get_keyed_list_entry(node, elem, true)
        .ok_or_else(|| Error::not_found(format!("path elem not found: {}", elem.name)))?;
    if op == SetOp::Replace {
        entry.clear();
    }
    for (attr_key, attr_val) in &elem.key {
        entry.insert(attr_key.clone(), key_value(attr_val));
        if let Some(v) = body.get(attr_key) {
            if key_string(v) != *attr_val {
                return Err(Error::invalid_argument(format!(
                    "invalid config data: {} is a path attribute", attr_key
                )));
            }
        }
    }
    for (k, v) in body {
        entry.insert(k, v);
    }
    Ok(())
}

/// Replace or update a plain child node. An update into an existing object
/// merges keys; everything else overwrites.
fn set_path_without_attribute(
    op: SetOp,
    node: &mut Map<String, Value>,
    elem: &PathElem,
    node_val: Value,
) -> Result<()> {
    let has_elem = node.contains_key(&elem.name);
    let node_val_is_tree = node_val.is_object();
    if op == SetOp::Replace || !has_elem || !node_val_is_tree {
        node.insert(elem.name.clone(), node_val);
        return Ok(());
    }
    let target = node.get_mut(&elem.name).unwrap();
    let Value::Object(target) = target else {
        return Err(Error::internal(format!(
            "error in setting path: expect object to update, got {}", target
        )));
    };
    if let Value::Object(body) = node_val {
        for (k, v) in body {
            target.insert(k, v);
        }
    }
    Ok(())
}

/// Find (or create) the keyed-list entry matching the path elem.
pub fn get_keyed_list_entry<'a>(
    node: &'a mut Map<String, Value>,
    elem: &PathElem,
    create: bool,
) -> Option<&'a mut Map<String, Value>> {
    if !node.contains_key(&elem.name) {
        if !create {
            return None;
        }
        node.insert(elem.name.clone(), Value::Array(Vec::new()));
    }

    let entries = node.get_mut(&elem.name)?.as_array_mut()?;
    let mut index = None;
    for (i, entry) in entries.iter().enumerate() {
        if entry
            .as_object()
            .map(|m| entry_matches(m, elem))
            .unwrap_or(false)
        {
            index = Some(i);
            break;
        }
    }

    let index = match index {
        Some(i) => i,
        None => {
            if !create {
                return None;
            }
            let mut entry = Map::new();
            for (k, v) in &elem.key {
                entry.insert(k.clone(), key_value(v));
            }
            entries.push(Value::Object(entry));
            entries.len() - 1
        }
    };

    entries.get_mut(index)?.as_object_mut()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gnxi_model::Model;
    use serde_json::json;

    fn elem(name: &str) -> PathElem {
        PathElem { name: name.to_string(), key: Default::default() }
    }

    fn keyed(name: &str, key: &str, value: &str) -> PathElem {
        let mut e = elem(name);
        e.key.insert(key.to_string(), value.to_string());
        e
    }

    fn sample_tree() -> Map<String, Value> {
        json!({
            "system": {
                "config": {"hostname": "target.gnxi.lan"},
                "openflow": {
                    "controllers": {
                        "controller": [{
                            "name": "main",
                            "config": {"name": "main"},
                            "connections": {
                                "connection": [{
                                    "aux-id": 0,
                                    "config": {"aux-id": 0, "port": 6653}
                                }]
                            }
                        }]
                    }
                }
            },
            "interfaces": {
                "interface": [
                    {"name": "sw1-eth1", "config": {"name": "sw1-eth1", "mtu": 1500}},
                    {"name": "sw1-eth2", "config": {"name": "sw1-eth2", "mtu": 1500}}
                ]
            }
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn schema() -> &'static gnxi_model::schema::SchemaNode {
        Model::new().schema_root()
    }

    #[test]
    fn test_delete_scalar_leaf() {
        let mut tree = sample_tree();
        let elems = [elem("system"), elem("config"), elem("hostname")];
        assert!(delete_path(&mut tree, schema(), &elems));
        assert!(tree["system"]["config"].get("hostname").is_none());
    }

    #[test]
    fn test_delete_keyed_entry_keeps_siblings() {
        let mut tree = sample_tree();
        let elems = [
            elem("interfaces"),
            keyed("interface", "name", "sw1-eth1"),
        ];
        assert!(delete_path(&mut tree, schema(), &elems));
        let remaining = tree["interfaces"]["interface"].as_array().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0]["name"], "sw1-eth2");
    }

    #[test]
    fn test_delete_single_entry_collapses_list() {
        let mut tree = sample_tree();
        let elems = [
            elem("system"),
            elem("openflow"),
            elem("controllers"),
            keyed("controller", "name", "main"),
        ];
        assert!(delete_path(&mut tree, schema(), &elems));
        assert!(tree["system"]["openflow"]["controllers"]
            .get("controller")
            .is_none());
    }

    #[test]
    fn test_delete_missing_keyed_entry_is_noop() {
        let mut tree = sample_tree();
        let elems = [
            elem("interfaces"),
            keyed("interface", "name", "sw1-eth9"),
        ];
        assert!(!delete_path(&mut tree, schema(), &elems));
        assert_eq!(tree["interfaces"]["interface"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_set_leaf_through_keyed_lists() {
        let mut tree = sample_tree();
        let elems = [
            elem("system"),
            elem("openflow"),
            elem("controllers"),
            keyed("controller", "name", "main"),
            elem("connections"),
            keyed("connection", "aux-id", "0"),
            elem("config"),
            elem("port"),
        ];
        set_path(&mut tree, schema(), &elems, SetOp::Update, json!(6654)).unwrap();
        assert_eq!(
            tree["system"]["openflow"]["controllers"]["controller"][0]["connections"]
                ["connection"][0]["config"]["port"],
            6654
        );
    }

    #[test]
    fn test_replace_entry_preserves_key_attributes() {
        let mut tree = sample_tree();
        let elems = [
            elem("interfaces"),
            keyed("interface", "name", "sw1-eth1"),
        ];
        set_path(
            &mut tree,
            schema(),
            &elems,
            SetOp::Replace,
            json!({"config": {"mtu": 1400}}),
        )
        .unwrap();
        let entry = &tree["interfaces"]["interface"][0];
        assert_eq!(entry["name"], "sw1-eth1");
        assert_eq!(entry["config"]["mtu"], 1400);
        // Replace cleared the rest of the entry.
        assert!(entry["config"].get("name").is_none());
    }

    #[test]
    fn test_replace_rejects_conflicting_key_in_body() {
        let mut tree = sample_tree();
        let elems = [
            elem("interfaces"),
            keyed("interface", "name", "sw1-eth1"),
        ];
        let err = set_path(
            &mut tree,
            schema(),
            &elems,
            SetOp::Replace,
            json!({"name": "other"}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_update_merges_into_existing_object() {
        let mut tree = sample_tree();
        let elems = [elem("system"), elem("config")];
        set_path(
            &mut tree,
            schema(),
            &elems,
            SetOp::Update,
            json!({"hostname": "example.lan"}),
        )
        .unwrap();
        assert_eq!(tree["system"]["config"]["hostname"], "example.lan");
    }

    #[test]
    fn test_set_creates_missing_entry() {
        let mut tree = sample_tree();
        let elems = [
            elem("interfaces"),
            keyed("interface", "name", "sw1-eth3"),
            elem("config"),
            elem("mtu"),
        ];
        set_path(&mut tree, schema(), &elems, SetOp::Update, json!(9000)).unwrap();
        let entries = tree["interfaces"]["interface"].as_array().unwrap();
        assert_eq!(entries.len(), 3);
        let new_entry = entries.iter().find(|e| e["name"] == "sw1-eth3").unwrap();
        assert_eq!(new_entry["config"]["mtu"], 9000);
    }
}
