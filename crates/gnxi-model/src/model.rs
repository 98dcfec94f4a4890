//! The validated-tree model consumed by the gNXI service.
//!
//! Bundles the supported model list with the operations the service needs:
//! unmarshal+validate (`new_config_struct`), schema/path walking
//! (`get_node`, `new_node`), RFC 7951 emit (`to_ietf_json`), enum name
//! tables (via the schema), and per-leaf notification expansion
//! (`to_notifications`).

use gnxi_core::{Error, Result};
use gnxi_proto::gnmi::{typed_value, ModelData, Notification, Path, PathElem, TypedValue, Update};
use serde_json::Value;

use crate::device::*;
use crate::path::{entry_matches, key_string, path_to_string};
use crate::schema::{self, LeafType, SchemaKind, SchemaNode};

/// The fixed list of models this target reports in Capabilities.
pub fn supported_model_data() -> Vec<ModelData> {
    const MODELS: &[(&str, &str)] = &[
        ("openconfig-interfaces", "2.0.0"),
        ("openconfig-openflow", "0.1.0"),
        ("openconfig-platform", "0.5.0"),
        ("openconfig-system", "0.2.0"),
    ];
    MODELS
        .iter()
        .map(|(name, version)| ModelData {
            name: name.to_string(),
            organization: "OpenConfig working group".to_string(),
            version: version.to_string(),
        })
        .collect()
}

/// Result of resolving a path against the configuration tree.
#[derive(Debug)]
pub enum Node {
    Leaf { value: Value, ty: LeafType },
    Subtree { value: Value, schema: &'static SchemaNode },
}

/// Typed empty node resolved from a path, used to validate Replace/Update
/// values before they are spliced into the JSON tree.
pub enum PathTarget {
    Struct { parse: fn(&[u8]) -> Result<Value> },
    Leaf { ty: LeafType },
}

trait Validated {
    fn validate_node(&self) -> Result<()>;
}

macro_rules! validated {
    ($($t:ty),* $(,)?) => {
        $(impl Validated for $t {
            fn validate_node(&self) -> Result<()> {
                self.validate()
            }
        })*
    };
}

macro_rules! validated_ok {
    ($($t:ty),* $(,)?) => {
        $(impl Validated for $t {
            fn validate_node(&self) -> Result<()> {
                Ok(())
            }
        })*
    };
}

validated!(Device, System, Openflow, Controllers, Controller, Connections, Components, Interfaces);
validated_ok!(
    SystemConfig,
    ControllerConfig,
    Connection,
    ConnectionConfig,
    ConnectionState,
    Component,
    ComponentConfig,
    ComponentState,
    Interface,
    InterfaceConfig,
    InterfaceState,
    Counters,
);

fn parse_struct<T>(bytes: &[u8]) -> Result<Value>
where
    T: serde::de::DeserializeOwned + serde::Serialize + Validated,
{
    let raw: Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::invalid_argument(format!(
            "unmarshaling json data to config struct fails: {}", e
        )))?;
    let bare = strip_module_names(&raw);
    let node: T = serde_json::from_value(bare).map_err(|e| {
        Error::invalid_argument(format!(
            "unmarshaling json data to config struct fails: {}", e
        ))
    })?;
    node.validate_node()
        .map_err(|e| Error::invalid_argument(format!("config data validation fails: {}", e)))?;
    Ok(serde_json::to_value(&node)?)
}

/// Remove RFC 7951 module prefixes from every object key.
pub fn strip_module_names(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let bare = match k.find(':') {
                    Some(idx) => &k[idx + 1..],
                    None => k.as_str(),
                };
                out.insert(bare.to_string(), strip_module_names(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(strip_module_names).collect()),
        other => other.clone(),
    }
}

/// Add RFC 7951 module prefixes at module boundaries, schema-driven.
pub fn append_module_names(value: &Value, schema: &'static SchemaNode) -> Value {
    match (&schema.kind, value) {
        (SchemaKind::Container { children }, Value::Object(map)) => {
            Value::Object(prefix_children(map, children, schema.module))
        }
        (SchemaKind::List { entry, .. }, Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => {
                        Value::Object(prefix_children(map, entry, schema.module))
                    }
                    other => other.clone(),
                })
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn prefix_children(
    map: &serde_json::Map<String, Value>,
    children: &'static [SchemaNode],
    parent_module: &str,
) -> serde_json::Map<String, Value> {
    let mut out = serde_json::Map::with_capacity(map.len());
    for (k, v) in map {
        match children.iter().find(|c| c.name == k.as_str()) {
            Some(child) => {
                let key = if child.module != parent_module {
                    format!("{}:{}", child.module, child.name)
                } else {
                    child.name.to_string()
                };
                out.insert(key, append_module_names(v, child));
            }
            None => {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    out
}

/// The model bound to a gNXI service instance.
#[derive(Debug, Clone)]
pub struct Model {
    model_data: Vec<ModelData>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self { model_data: supported_model_data() }
    }

    pub fn model_data(&self) -> &[ModelData] {
        &self.model_data
    }

    pub fn schema_root(&self) -> &'static SchemaNode {
        schema::root()
    }

    /// Unmarshal RFC 7951 bytes into a validated device tree.
    pub fn new_config_struct(&self, json: &[u8]) -> Result<Device> {
        let raw: Value = serde_json::from_slice(json).map_err(|e| {
            Error::invalid_argument(format!(
                "error in creating config struct from IETF JSON data: {}", e
            ))
        })?;
        self.new_config_struct_from_value(&raw)
    }

    /// Unmarshal an in-memory JSON tree into a validated device tree.
    pub fn new_config_struct_from_value(&self, raw: &Value) -> Result<Device> {
        let bare = strip_module_names(raw);
        let device: Device = serde_json::from_value(bare).map_err(|e| {
            Error::invalid_argument(format!(
                "error in creating config struct from IETF JSON data: {}", e
            ))
        })?;
        device
            .validate()
            .map_err(|e| Error::invalid_argument(format!("config data validation fails: {}", e)))?;
        Ok(device)
    }

    /// Emit the device tree as an RFC 7951 JSON value.
    pub fn to_ietf_json(&self, device: &Device, append_module_name: bool) -> Result<Value> {
        let bare = serde_json::to_value(device)?;
        if append_module_name {
            Ok(append_module_names(&bare, schema::root()))
        } else {
            Ok(bare)
        }
    }

    /// Resolve a full path against the device tree.
    pub fn get_node(&self, device: &Device, path: &Path) -> Result<Node> {
        let tree = serde_json::to_value(device)?;
        let mut cur = &tree;
        let mut node = schema::root();

        for elem in &path.elem {
            let child = node.child(&elem.name).ok_or_else(|| {
                Error::not_found(format!("path {} not found", path_to_string(path)))
            })?;

            let next = match &child.kind {
                SchemaKind::List { .. } => {
                    if elem.key.is_empty() {
                        return Err(Error::not_found(format!(
                            "path {} not found", path_to_string(path)
                        )));
                    }
                    let entries = cur
                        .get(&elem.name)
                        .and_then(Value::as_array)
                        .ok_or_else(|| {
                            Error::not_found(format!("path {} not found", path_to_string(path)))
                        })?;
                    entries
                        .iter()
                        .find(|entry| {
                            entry
                                .as_object()
                                .map(|m| entry_matches(m, elem))
                                .unwrap_or(false)
                        })
                        .ok_or_else(|| {
                            Error::not_found(format!("path {} not found", path_to_string(path)))
                        })?
                }
                _ => cur.get(&elem.name).ok_or_else(|| {
                    Error::not_found(format!("path {} not found", path_to_string(path)))
                })?,
            };

            cur = next;
            node = child;
        }

        match &node.kind {
            SchemaKind::Leaf { ty } => Ok(Node::Leaf { value: cur.clone(), ty: *ty }),
            _ => Ok(Node::Subtree { value: cur.clone(), schema: node }),
        }
    }

    /// Resolve the typed empty node addressed by a full path.
    pub fn new_node(&self, path: &Path) -> Result<PathTarget> {
        let mut node = schema::root();
        let mut names: Vec<&str> = Vec::with_capacity(path.elem.len());

        for elem in &path.elem {
            node = node.child(&elem.name).ok_or_else(|| {
                Error::not_found(format!(
                    "path {} is not found in the config structure", path_to_string(path)
                ))
            })?;
            names.push(node.name);
        }

        if let SchemaKind::Leaf { ty } = &node.kind {
            return Ok(PathTarget::Leaf { ty: *ty });
        }

        let parse = match names.join("/").as_str() {
            "" => parse_struct::<Device>,
            "system" => parse_struct::<System>,
            "system/config" => parse_struct::<SystemConfig>,
            "system/openflow" => parse_struct::<Openflow>,
            "system/openflow/controllers" => parse_struct::<Controllers>,
            "system/openflow/controllers/controller" => parse_struct::<Controller>,
            "system/openflow/controllers/controller/config" => parse_struct::<ControllerConfig>,
            "system/openflow/controllers/controller/connections" => parse_struct::<Connections>,
            "system/openflow/controllers/controller/connections/connection" => {
                parse_struct::<Connection>
            }
            "system/openflow/controllers/controller/connections/connection/config" => {
                parse_struct::<ConnectionConfig>
            }
            "system/openflow/controllers/controller/connections/connection/state" => {
                parse_struct::<ConnectionState>
            }
            "components" => parse_struct::<Components>,
            "components/component" => parse_struct::<Component>,
            "components/component/config" => parse_struct::<ComponentConfig>,
            "components/component/state" => parse_struct::<ComponentState>,
            "interfaces" => parse_struct::<Interfaces>,
            "interfaces/interface" => parse_struct::<Interface>,
            "interfaces/interface/config" => parse_struct::<InterfaceConfig>,
            "interfaces/interface/state" => parse_struct::<InterfaceState>,
            "interfaces/interface/state/counters" => parse_struct::<Counters>,
            other => {
                return Err(Error::internal(format!(
                    "no struct registered for container path {}", other
                )))
            }
        };

        Ok(PathTarget::Struct { parse })
    }
}

/// Convert a leaf JSON value into a gNMI TypedValue according to its schema
/// type. Enumeration leaves are returned as their name string.
pub fn leaf_typed_value(value: &Value, ty: LeafType) -> Result<TypedValue> {
    let inner = match ty {
        LeafType::Uint8 | LeafType::Uint16 | LeafType::Uint64 => {
            let n = value.as_u64().ok_or_else(|| {
                Error::internal(format!("leaf node does not contain an unsigned value: {}", value))
            })?;
            typed_value::Value::UintVal(n)
        }
        LeafType::Bool => {
            let b = value.as_bool().ok_or_else(|| {
                Error::internal(format!("leaf node does not contain a bool value: {}", value))
            })?;
            typed_value::Value::BoolVal(b)
        }
        LeafType::String | LeafType::Enumeration(_) => {
            let s = value.as_str().ok_or_else(|| {
                Error::internal(format!("leaf node does not contain a string value: {}", value))
            })?;
            typed_value::Value::StringVal(s.to_string())
        }
    };
    Ok(TypedValue { value: Some(inner) })
}

/// Convert a gNMI TypedValue into the scalar JSON value stored in the tree.
pub fn typed_value_to_scalar(val: &TypedValue) -> Result<Value> {
    match &val.value {
        Some(typed_value::Value::StringVal(s)) => Ok(Value::String(s.clone())),
        Some(typed_value::Value::IntVal(n)) => Ok(Value::from(*n)),
        Some(typed_value::Value::UintVal(n)) => Ok(Value::from(*n)),
        Some(typed_value::Value::BoolVal(b)) => Ok(Value::Bool(*b)),
        Some(typed_value::Value::FloatVal(f)) => {
            serde_json::Number::from_f64(*f as f64)
                .map(Value::Number)
                .ok_or_else(|| Error::internal("float value is not representable in JSON"))
        }
        Some(typed_value::Value::JsonVal(bytes))
        | Some(typed_value::Value::JsonIetfVal(bytes)) => {
            serde_json::from_slice(bytes).map_err(|e| {
                Error::invalid_argument(format!("invalid JSON leaf value: {}", e))
            })
        }
        other => Err(Error::internal(format!(
            "cannot convert leaf node to scalar type: {:?}", other
        ))),
    }
}

/// Expand a subtree into one Notification with per-leaf updates, paths
/// prefixed with the requested elems.
pub fn to_notifications(
    value: &Value,
    schema: &'static SchemaNode,
    timestamp: i64,
    prefix: &[PathElem],
) -> Result<Vec<Notification>> {
    let mut updates = Vec::new();
    collect_leaf_updates(value, schema, prefix.to_vec(), &mut updates)?;
    Ok(vec![Notification {
        timestamp,
        update: updates,
        ..Default::default()
    }])
}

fn collect_leaf_updates(
    value: &Value,
    schema: &'static SchemaNode,
    elems: Vec<PathElem>,
    out: &mut Vec<Update>,
) -> Result<()> {
    match &schema.kind {
        SchemaKind::Leaf { ty } => {
            out.push(Update {
                path: Some(Path { elem: elems, ..Default::default() }),
                val: Some(leaf_typed_value(value, *ty)?),
                ..Default::default()
            });
            Ok(())
        }
        SchemaKind::Container { children } => {
            let obj = value.as_object().ok_or_else(|| {
                Error::internal(format!("expected object for container {}", schema.name))
            })?;
            collect_child_updates(obj, children, elems, out)
        }
        // A single keyed-list entry; the keyed elem is already part of the
        // caller's prefix.
        SchemaKind::List { entry, .. } => {
            let obj = value.as_object().ok_or_else(|| {
                Error::internal(format!("expected object for list entry {}", schema.name))
            })?;
            collect_child_updates(obj, entry, elems, out)
        }
    }
}

fn collect_child_updates(
    obj: &serde_json::Map<String, Value>,
    children: &'static [SchemaNode],
    elems: Vec<PathElem>,
    out: &mut Vec<Update>,
) -> Result<()> {
    for child in children {
        let Some(child_val) = obj.get(child.name) else {
            continue;
        };
        match &child.kind {
            SchemaKind::List { key, .. } => {
                let entries = child_val.as_array().ok_or_else(|| {
                    Error::internal(format!("expected array for list {}", child.name))
                })?;
                for entry in entries {
                    let entry_obj = entry.as_object().ok_or_else(|| {
                        Error::internal(format!("expected object entry in list {}", child.name))
                    })?;
                    let key_val = entry_obj.get(*key).map(key_string).unwrap_or_default();
                    let mut elem = PathElem {
                        name: child.name.to_string(),
                        key: Default::default(),
                    };
                    elem.key.insert(key.to_string(), key_val);
                    let mut entry_elems = elems.clone();
                    entry_elems.push(elem);
                    collect_leaf_updates(entry, child, entry_elems, out)?;
                }
            }
            _ => {
                let mut child_elems = elems.clone();
                child_elems.push(PathElem {
                    name: child.name.to_string(),
                    key: Default::default(),
                });
                collect_leaf_updates(child_val, child, child_elems, out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gnxi_proto::gnmi::PathElem;

    fn sample_device() -> Device {
        Device {
            system: Some(System {
                config: Some(SystemConfig { hostname: Some("target.gnxi.lan".to_string()) }),
                openflow: Some(Openflow {
                    controllers: Some(Controllers {
                        controller: vec![Controller {
                            name: "main".to_string(),
                            config: Some(ControllerConfig { name: Some("main".to_string()) }),
                            connections: Some(Connections {
                                connection: vec![Connection {
                                    aux_id: 0,
                                    config: Some(ConnectionConfig {
                                        aux_id: Some(0),
                                        address: Some("172.18.0.2".to_string()),
                                        port: Some(6653),
                                        transport: Some(Transport::Tcp),
                                    }),
                                    state: Some(ConnectionState {
                                        connected: Some(true),
                                        ..Default::default()
                                    }),
                                }],
                            }),
                        }],
                    }),
                }),
            }),
            components: Some(Components {
                component: vec![Component {
                    name: "os".to_string(),
                    config: Some(ComponentConfig { name: Some("os".to_string()) }),
                    state: Some(ComponentState {
                        name: Some("os".to_string()),
                        component_type: Some(ComponentType::OperatingSystem),
                        description: Some("2.9.2".to_string()),
                    }),
                }],
            }),
            interfaces: Some(Interfaces {
                interface: vec![Interface {
                    name: "sw1-eth1".to_string(),
                    config: Some(InterfaceConfig {
                        name: Some("sw1-eth1".to_string()),
                        mtu: Some(1500),
                    }),
                    state: Some(InterfaceState {
                        admin_status: Some(AdminStatus::Up),
                        oper_status: Some(OperStatus::Up),
                        mtu: Some(1500),
                        counters: Some(Counters {
                            in_pkts: Some(42),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                }],
            }),
        }
    }

    fn path(elems: &[(&str, Option<(&str, &str)>)]) -> Path {
        Path {
            elem: elems
                .iter()
                .map(|(name, key)| {
                    let mut e = PathElem { name: name.to_string(), key: Default::default() };
                    if let Some((k, v)) = key {
                        e.key.insert(k.to_string(), v.to_string());
                    }
                    e
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_ietf_json_module_prefixes() {
        let model = Model::new();
        let json = model.to_ietf_json(&sample_device(), true).unwrap();
        assert!(json.get("openconfig-system:system").is_some());
        assert!(json["openconfig-system:system"]
            .get("openconfig-openflow:openflow")
            .is_some());
        assert!(json.get("openconfig-interfaces:interfaces").is_some());
        // Same-module children keep bare names.
        assert_eq!(
            json["openconfig-system:system"]["config"]["hostname"],
            "target.gnxi.lan"
        );
    }

    #[test]
    fn test_round_trip_through_ietf_json() {
        let model = Model::new();
        let device = sample_device();
        let json = model.to_ietf_json(&device, true).unwrap();
        let bytes = serde_json::to_vec(&json).unwrap();
        let parsed = model.new_config_struct(&bytes).unwrap();
        assert_eq!(parsed, device);
    }

    #[test]
    fn test_get_node_leaf() {
        let model = Model::new();
        let p = path(&[("system", None), ("config", None), ("hostname", None)]);
        match model.get_node(&sample_device(), &p).unwrap() {
            Node::Leaf { value, .. } => assert_eq!(value, "target.gnxi.lan"),
            other => panic!("expected leaf, got {:?}", other),
        }
    }

    #[test]
    fn test_get_node_keyed_leaf() {
        let model = Model::new();
        let p = path(&[
            ("system", None),
            ("openflow", None),
            ("controllers", None),
            ("controller", Some(("name", "main"))),
            ("connections", None),
            ("connection", Some(("aux-id", "0"))),
            ("config", None),
            ("port", None),
        ]);
        match model.get_node(&sample_device(), &p).unwrap() {
            Node::Leaf { value, .. } => assert_eq!(value, 6653),
            other => panic!("expected leaf, got {:?}", other),
        }
    }

    #[test]
    fn test_get_node_missing_entry() {
        let model = Model::new();
        let p = path(&[
            ("interfaces", None),
            ("interface", Some(("name", "missing"))),
        ]);
        assert!(matches!(
            model.get_node(&sample_device(), &p),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_new_node_leaf_and_struct() {
        let model = Model::new();
        let leaf = model
            .new_node(&path(&[("system", None), ("config", None), ("hostname", None)]))
            .unwrap();
        assert!(matches!(leaf, PathTarget::Leaf { ty: LeafType::String }));

        let target = model
            .new_node(&path(&[
                ("interfaces", None),
                ("interface", Some(("name", "sw1-eth1"))),
            ]))
            .unwrap();
        let PathTarget::Struct { parse } = target else {
            panic!("expected struct target");
        };
        let value = parse(br#"{"config": {"name": "sw1-eth1", "mtu": 1400}}"#).unwrap();
        assert_eq!(value["config"]["mtu"], 1400);
    }

    #[test]
    fn test_new_node_rejects_invalid_body() {
        let model = Model::new();
        let target = model
            .new_node(&path(&[("interfaces", None)]))
            .unwrap();
        let PathTarget::Struct { parse } = target else {
            panic!("expected struct target");
        };
        // Duplicate interface keys fail validation.
        let body = br#"{"interface": [{"name": "a"}, {"name": "a"}]}"#;
        assert!(matches!(parse(body), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_to_notifications_counts_leaves() {
        let model = Model::new();
        let p = path(&[
            ("interfaces", None),
            ("interface", Some(("name", "sw1-eth1"))),
            ("state", None),
            ("counters", None),
        ]);
        let Node::Subtree { value, schema } = model.get_node(&sample_device(), &p).unwrap() else {
            panic!("expected subtree");
        };
        let notifications = to_notifications(&value, schema, 1, &p.elem).unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].update.len(), 1);
        let update = &notifications[0].update[0];
        let names: Vec<_> = update
            .path
            .as_ref()
            .unwrap()
            .elem
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(
            names,
            ["interfaces", "interface", "state", "counters", "in-pkts"]
        );
        assert_eq!(
            update.val.as_ref().unwrap().value,
            Some(typed_value::Value::UintVal(42))
        );
    }
}
