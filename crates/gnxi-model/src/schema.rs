//! Static schema tree for the supported OpenConfig subset.
//!
//! The schema mirrors the shape of [`crate::device::Device`] and drives path
//! resolution, keyed-list handling, RFC 7951 module-name prefixing, and
//! per-leaf notification expansion.

/// A named set of enumeration values, as emitted in RFC 7951 JSON.
#[derive(Debug)]
pub struct EnumSet {
    pub name: &'static str,
    pub values: &'static [&'static str],
}

impl EnumSet {
    pub fn contains(&self, value: &str) -> bool {
        self.values.contains(&value)
    }
}

pub static ADMIN_STATUS: EnumSet = EnumSet {
    name: "AdminStatus",
    values: &["UP", "DOWN", "TESTING"],
};

pub static OPER_STATUS: EnumSet = EnumSet {
    name: "OperStatus",
    values: &[
        "UP",
        "DOWN",
        "TESTING",
        "UNKNOWN",
        "DORMANT",
        "NOT_PRESENT",
        "LOWER_LAYER_DOWN",
    ],
};

pub static TRANSPORT: EnumSet = EnumSet {
    name: "Transport",
    values: &["TCP", "TLS"],
};

pub static COMPONENT_TYPE: EnumSet = EnumSet {
    name: "ComponentType",
    values: &["openconfig-platform-types:OPERATING_SYSTEM"],
};

/// Value type of a leaf node.
#[derive(Debug, Clone, Copy)]
pub enum LeafType {
    String,
    Uint8,
    Uint16,
    Uint64,
    Bool,
    Enumeration(&'static EnumSet),
}

/// Kind of a schema node.
#[derive(Debug)]
pub enum SchemaKind {
    Container { children: &'static [SchemaNode] },
    List { key: &'static str, entry: &'static [SchemaNode] },
    Leaf { ty: LeafType },
}

/// A node in the schema tree.
#[derive(Debug)]
pub struct SchemaNode {
    pub name: &'static str,
    pub module: &'static str,
    pub kind: SchemaKind,
}

impl SchemaNode {
    /// Child lookup by bare (unprefixed) name. For lists this resolves
    /// against the list entry's children.
    pub fn child(&self, name: &str) -> Option<&'static SchemaNode> {
        let children = match &self.kind {
            SchemaKind::Container { children } => children,
            SchemaKind::List { entry, .. } => entry,
            SchemaKind::Leaf { .. } => return None,
        };
        children.iter().find(|c| c.name == name)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, SchemaKind::Leaf { .. })
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, SchemaKind::List { .. })
    }

    /// Key leaf name for list nodes.
    pub fn list_key(&self) -> Option<&'static str> {
        match &self.kind {
            SchemaKind::List { key, .. } => Some(key),
            _ => None,
        }
    }
}

const fn leaf(name: &'static str, module: &'static str, ty: LeafType) -> SchemaNode {
    SchemaNode { name, module, kind: SchemaKind::Leaf { ty } }
}

const fn container(
    name: &'static str,
    module: &'static str,
    children: &'static [SchemaNode],
) -> SchemaNode {
    SchemaNode { name, module, kind: SchemaKind::Container { children } }
}

const fn list(
    name: &'static str,
    module: &'static str,
    key: &'static str,
    entry: &'static [SchemaNode],
) -> SchemaNode {
    SchemaNode { name, module, kind: SchemaKind::List { key, entry } }
}

const OC_SYS: &str = "openconfig-system";
const OC_OF: &str = "openconfig-openflow";
const OC_PLAT: &str = "openconfig-platform";
const OC_IF: &str = "openconfig-interfaces";

static SYSTEM_CONFIG: [SchemaNode; 1] = [leaf("hostname", OC_SYS, LeafType::String)];

static CONNECTION_CONFIG: [SchemaNode; 4] = [
    leaf("aux-id", OC_OF, LeafType::Uint8),
    leaf("address", OC_OF, LeafType::String),
    leaf("port", OC_OF, LeafType::Uint16),
    leaf("transport", OC_OF, LeafType::Enumeration(&TRANSPORT)),
];

static CONNECTION_STATE: [SchemaNode; 5] = [
    leaf("aux-id", OC_OF, LeafType::Uint8),
    leaf("address", OC_OF, LeafType::String),
    leaf("port", OC_OF, LeafType::Uint16),
    leaf("transport", OC_OF, LeafType::Enumeration(&TRANSPORT)),
    leaf("connected", OC_OF, LeafType::Bool),
];

static CONNECTION_ENTRY: [SchemaNode; 3] = [
    leaf("aux-id", OC_OF, LeafType::Uint8),
    container("config", OC_OF, &CONNECTION_CONFIG),
    container("state", OC_OF, &CONNECTION_STATE),
];

static CONNECTIONS: [SchemaNode; 1] =
    [list("connection", OC_OF, "aux-id", &CONNECTION_ENTRY)];

static CONTROLLER_CONFIG: [SchemaNode; 1] = [leaf("name", OC_OF, LeafType::String)];

static CONTROLLER_ENTRY: [SchemaNode; 3] = [
    leaf("name", OC_OF, LeafType::String),
    container("config", OC_OF, &CONTROLLER_CONFIG),
    container("connections", OC_OF, &CONNECTIONS),
];

static CONTROLLERS: [SchemaNode; 1] = [list("controller", OC_OF, "name", &CONTROLLER_ENTRY)];

static OPENFLOW: [SchemaNode; 1] = [container("controllers", OC_OF, &CONTROLLERS)];

static SYSTEM: [SchemaNode; 2] = [
    container("config", OC_SYS, &SYSTEM_CONFIG),
    container("openflow", OC_OF, &OPENFLOW),
];

static COMPONENT_CONFIG: [SchemaNode; 1] = [leaf("name", OC_PLAT, LeafType::String)];

static COMPONENT_STATE: [SchemaNode; 3] = [
    leaf("name", OC_PLAT, LeafType::String),
    leaf("type", OC_PLAT, LeafType::Enumeration(&COMPONENT_TYPE)),
    leaf("description", OC_PLAT, LeafType::String),
];

static COMPONENT_ENTRY: [SchemaNode; 3] = [
    leaf("name", OC_PLAT, LeafType::String),
    container("config", OC_PLAT, &COMPONENT_CONFIG),
    container("state", OC_PLAT, &COMPONENT_STATE),
];

static COMPONENTS: [SchemaNode; 1] = [list("component", OC_PLAT, "name", &COMPONENT_ENTRY)];

static COUNTERS: [SchemaNode; 6] = [
    leaf("in-pkts", OC_IF, LeafType::Uint64),
    leaf("in-errors", OC_IF, LeafType::Uint64),
    leaf("in-discards", OC_IF, LeafType::Uint64),
    leaf("out-pkts", OC_IF, LeafType::Uint64),
    leaf("out-errors", OC_IF, LeafType::Uint64),
    leaf("out-discards", OC_IF, LeafType::Uint64),
];

static INTERFACE_CONFIG: [SchemaNode; 2] = [
    leaf("name", OC_IF, LeafType::String),
    leaf("mtu", OC_IF, LeafType::Uint16),
];

static INTERFACE_STATE: [SchemaNode; 5] = [
    leaf("admin-status", OC_IF, LeafType::Enumeration(&ADMIN_STATUS)),
    leaf("oper-status", OC_IF, LeafType::Enumeration(&OPER_STATUS)),
    leaf("mtu", OC_IF, LeafType::Uint16),
    leaf("name", OC_IF, LeafType::String),
    container("counters", OC_IF, &COUNTERS),
];

static INTERFACE_ENTRY: [SchemaNode; 3] = [
    leaf("name", OC_IF, LeafType::String),
    container("config", OC_IF, &INTERFACE_CONFIG),
    container("state", OC_IF, &INTERFACE_STATE),
];

static INTERFACES: [SchemaNode; 1] = [list("interface", OC_IF, "name", &INTERFACE_ENTRY)];

static DEVICE: [SchemaNode; 3] = [
    container("system", OC_SYS, &SYSTEM),
    container("components", OC_PLAT, &COMPONENTS),
    container("interfaces", OC_IF, &INTERFACES),
];

static ROOT: SchemaNode = container("device", "", &DEVICE);

/// The schema tree root (the device fake-root).
pub fn root() -> &'static SchemaNode {
    &ROOT
}
