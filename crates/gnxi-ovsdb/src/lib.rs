//! gnxi-ovsdb: OVSDB integration for ovs-gnxi
//!
//! Provides:
//! - The JSON-RPC-over-TLS wire connection (`connection`)
//! - The raw + typed monitor-driven cache (`cache`, `objects`)
//! - The typed client with setters and change diffing (`client`)

pub mod cache;
pub mod client;
pub mod connection;
pub mod objects;
pub mod protocol;

pub use cache::{overwrite_object_cache_with_json, OvsdbCache, SyncCallback};
pub use client::{HostScripts, OvsdbClient, TlsPaths};
pub use connection::{OvsdbConnection, TlsConnection};
pub use objects::{
    ControllerTarget, Interface, InterfaceCounters, ObjectCache, OpenFlowController, SystemInfo,
    PRIMARY_CONTROLLER_NAME,
};

/// The monitored database.
pub const DEFAULT_DATABASE: &str = "Open_vSwitch";
/// The System table (shares its name with the database).
pub const SYSTEM_TABLE: &str = "Open_vSwitch";
pub const CONTROLLER_TABLE: &str = "Controller";
pub const INTERFACE_TABLE: &str = "Interface";

/// Prelude for convenient imports
pub mod prelude {
    pub use super::cache::{overwrite_object_cache_with_json, OvsdbCache, SyncCallback};
    pub use super::client::{HostScripts, OvsdbClient, TlsPaths};
    pub use super::connection::OvsdbConnection;
    pub use super::objects::{
        ControllerTarget, Interface, ObjectCache, OpenFlowController, SystemInfo,
        PRIMARY_CONTROLLER_NAME,
    };
}
