//! Typed mirror of the monitored OVSDB rows.

use std::collections::BTreeMap;
use std::fmt;

use gnxi_core::{Error, Result};

/// Logical name assigned to the single primary Controller row.
pub const PRIMARY_CONTROLLER_NAME: &str = "main";

/// The Open_vSwitch (System) row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemInfo {
    pub uuid: String,
    pub version: String,
    pub hostname: String,
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "System(uuid: \"{}\", version: \"{}\", hostname: \"{}\")",
            self.uuid, self.version, self.hostname
        )
    }
}

/// Structured form of the Controller `target` column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerTarget {
    pub protocol: String,
    pub address: String,
    pub port: u16,
}

impl fmt::Display for ControllerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.protocol, self.address, self.port)
    }
}

impl ControllerTarget {
    /// Parse `"<proto>:<address>:<port>"`, port base-10 16-bit.
    pub fn parse(target: &str) -> Result<Self> {
        let mut parts = target.splitn(3, ':');
        let (Some(protocol), Some(address), Some(port)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::ovsdb(format!("malformed controller target: {}", target)));
        };
        let port: u16 = port
            .parse()
            .map_err(|_| Error::ovsdb(format!("malformed controller target port: {}", target)))?;
        Ok(Self {
            protocol: protocol.to_string(),
            address: address.to_string(),
            port,
        })
    }
}

/// A Controller row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenFlowController {
    pub uuid: String,
    pub name: String,
    pub connected: bool,
    pub target: ControllerTarget,
}

impl fmt::Display for OpenFlowController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OpenFlowController(uuid: \"{}\", name: \"{}\", target: \"{}\")",
            self.uuid, self.name, self.target
        )
    }
}

/// Interface packet counters, from the `statistics` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub received_packets: u64,
    pub received_errors: u64,
    pub received_dropped: u64,
    pub transmitted_packets: u64,
    pub transmitted_errors: u64,
    pub transmitted_dropped: u64,
}

/// An Interface row. Statuses are the raw OVSDB strings (`up`, `down`) with
/// the empty string standing for unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interface {
    pub uuid: String,
    pub name: String,
    pub mtu: u16,
    pub admin_status: String,
    pub link_status: String,
    pub counters: InterfaceCounters,
}

/// The typed cache over the three monitored tables. Controllers and
/// interfaces are keyed by name; the OVSDB UUID travels as a payload field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectCache {
    pub system: SystemInfo,
    pub controllers: BTreeMap<String, OpenFlowController>,
    pub interfaces: BTreeMap<String, Interface>,
}

impl ObjectCache {
    /// Deep copy used to diff prev/new across a gNMI Set.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_round_trip() {
        let target = ControllerTarget::parse("tcp:172.18.0.2:6653").unwrap();
        assert_eq!(target.protocol, "tcp");
        assert_eq!(target.address, "172.18.0.2");
        assert_eq!(target.port, 6653);
        assert_eq!(target.to_string(), "tcp:172.18.0.2:6653");
    }

    #[test]
    fn test_target_rejects_bad_port() {
        assert!(ControllerTarget::parse("tcp:172.18.0.2:65536").is_err());
        assert!(ControllerTarget::parse("tcp:172.18.0.2").is_err());
    }
}
