//! gnxi-proto: vendored gNMI/gNOI protocol bindings
//!
//! The `.proto` sources under `proto/` are trimmed copies of the upstream
//! OpenConfig definitions, compiled by `tonic-build`.

/// gNMI service and message types (package `gnmi`).
pub mod gnmi {
    tonic::include_proto!("gnmi");
}

/// gNOI service and message types.
pub mod gnoi {
    /// gNOI System service (package `gnoi.system`).
    pub mod system {
        tonic::include_proto!("gnoi.system");
    }

    /// gNOI Certificate Management service (package `gnoi.certificate`).
    pub mod certificate {
        tonic::include_proto!("gnoi.certificate");
    }
}

/// Version of the gNMI service the vendored proto corresponds to. Upstream
/// carries this in the `gnmi_service` file-option extension, which prost
/// does not surface.
pub const GNMI_SERVICE_VERSION: &str = "0.7.0";
