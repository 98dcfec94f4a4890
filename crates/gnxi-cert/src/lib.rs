//! gnxi-cert: certificate package management for ovs-gnxi
//!
//! Packages live under `<root>/<id>/{target.crt,target.key,ca.crt}`; the
//! active package is mirrored into `<root>/active/` and backs both the gRPC
//! listener and the OVSDB dial.

pub mod manager;
pub mod package;

pub use manager::{Manager, ACTIVE_DIR_NAME, DEFAULT_CERT_ID};
pub use package::{Package, CA_CERT_FILE_NAME, CERT_FILE_NAME, KEY_FILE_NAME};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::manager::{Manager, DEFAULT_CERT_ID};
    pub use super::package::Package;
}
