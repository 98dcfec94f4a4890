//! gnxi-model: OpenConfig subset data model for ovs-gnxi
//!
//! Provides:
//! - The typed device configuration tree with RFC 7951 (de)serialization
//! - The static schema tree driving path resolution and keyed lists
//! - The `Model` consumed by the gNXI service (unmarshal/validate, node
//!   lookup, notification expansion, enum name tables)

pub mod device;
pub mod model;
pub mod path;
pub mod schema;

pub use device::Device;
pub use model::{Model, Node, PathTarget};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::device::Device;
    pub use super::model::{
        leaf_typed_value, supported_model_data, to_notifications, typed_value_to_scalar, Model,
        Node, PathTarget,
    };
    pub use super::path::{full_path, is_root, path_to_string};
    pub use super::schema::{LeafType, SchemaKind, SchemaNode};
}
