//! Typed configuration tree for the supported OpenConfig subset.
//!
//! The structs serialize to RFC 7951 instance data with bare node names;
//! module-name prefixing is applied at the emit boundary by
//! [`crate::model::Model`]. A tree deserialized through
//! [`crate::model::Model::new_config_struct`] is always validated.
//!
//! List key leaves carry `#[serde(default)]` so that a keyed-list entry can
//! be unmarshaled from a Set value body that omits the key (the key is
//! written back from the path attributes afterwards). Key/config agreement
//! and key uniqueness are therefore enforced by the list parents, which only
//! ever see fully materialized entries.

use gnxi_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminStatus {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN")]
    Down,
    #[serde(rename = "TESTING")]
    Testing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperStatus {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN")]
    Down,
    #[serde(rename = "TESTING")]
    Testing,
    #[serde(rename = "UNKNOWN")]
    Unknown,
    #[serde(rename = "DORMANT")]
    Dormant,
    #[serde(rename = "NOT_PRESENT")]
    NotPresent,
    #[serde(rename = "LOWER_LAYER_DOWN")]
    LowerLayerDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "TLS")]
    Tls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentType {
    #[serde(rename = "openconfig-platform-types:OPERATING_SYSTEM")]
    OperatingSystem,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Device {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<System>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<Interfaces>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct System {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<SystemConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openflow: Option<Openflow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Openflow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controllers: Option<Controllers>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Controllers {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controller: Vec<Controller>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Controller {
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ControllerConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<Connections>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Connections {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connection: Vec<Connection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Connection {
    #[serde(rename = "aux-id", default)]
    pub aux_id: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ConnectionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<ConnectionState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    #[serde(rename = "aux-id", skip_serializing_if = "Option::is_none")]
    pub aux_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionState {
    #[serde(rename = "aux-id", skip_serializing_if = "Option::is_none")]
    pub aux_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Components {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component: Vec<Component>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Component {
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ComponentConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<ComponentState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub component_type: Option<ComponentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Interfaces {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interface: Vec<Interface>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Interface {
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<InterfaceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<InterfaceState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "admin-status", skip_serializing_if = "Option::is_none")]
    pub admin_status: Option<AdminStatus>,
    #[serde(rename = "oper-status", skip_serializing_if = "Option::is_none")]
    pub oper_status: Option<OperStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counters: Option<Counters>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Counters {
    #[serde(rename = "in-pkts", skip_serializing_if = "Option::is_none")]
    pub in_pkts: Option<u64>,
    #[serde(rename = "in-errors", skip_serializing_if = "Option::is_none")]
    pub in_errors: Option<u64>,
    #[serde(rename = "in-discards", skip_serializing_if = "Option::is_none")]
    pub in_discards: Option<u64>,
    #[serde(rename = "out-pkts", skip_serializing_if = "Option::is_none")]
    pub out_pkts: Option<u64>,
    #[serde(rename = "out-errors", skip_serializing_if = "Option::is_none")]
    pub out_errors: Option<u64>,
    #[serde(rename = "out-discards", skip_serializing_if = "Option::is_none")]
    pub out_discards: Option<u64>,
}

impl Device {
    pub fn validate(&self) -> Result<()> {
        if let Some(system) = &self.system {
            system.validate()?;
        }
        if let Some(components) = &self.components {
            components.validate()?;
        }
        if let Some(interfaces) = &self.interfaces {
            interfaces.validate()?;
        }
        Ok(())
    }
}

impl System {
    pub fn validate(&self) -> Result<()> {
        if let Some(openflow) = &self.openflow {
            openflow.validate()?;
        }
        Ok(())
    }
}

impl Openflow {
    pub fn validate(&self) -> Result<()> {
        if let Some(controllers) = &self.controllers {
            controllers.validate()?;
        }
        Ok(())
    }
}

impl Controllers {
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for controller in &self.controller {
            if controller.name.is_empty() {
                return Err(Error::model("controller name must not be empty"));
            }
            if !seen.insert(controller.name.as_str()) {
                return Err(Error::model(format!(
                    "duplicate controller key: {}",
                    controller.name
                )));
            }
            if let Some(config_name) = controller.config.as_ref().and_then(|c| c.name.as_ref()) {
                if *config_name != controller.name {
                    return Err(Error::model(format!(
                        "controller key \"{}\" does not match config name \"{}\"",
                        controller.name, config_name
                    )));
                }
            }
            controller.validate()?;
        }
        Ok(())
    }
}

impl Controller {
    pub fn validate(&self) -> Result<()> {
        if let Some(connections) = &self.connections {
            connections.validate()?;
        }
        Ok(())
    }
}

impl Connections {
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for connection in &self.connection {
            if !seen.insert(connection.aux_id) {
                return Err(Error::model(format!(
                    "duplicate connection key: {}",
                    connection.aux_id
                )));
            }
            if let Some(aux_id) = connection.config.as_ref().and_then(|c| c.aux_id) {
                if aux_id != connection.aux_id {
                    return Err(Error::model(format!(
                        "connection key {} does not match config aux-id {}",
                        connection.aux_id, aux_id
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Components {
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for component in &self.component {
            if component.name.is_empty() {
                return Err(Error::model("component name must not be empty"));
            }
            if !seen.insert(component.name.as_str()) {
                return Err(Error::model(format!(
                    "duplicate component key: {}",
                    component.name
                )));
            }
        }
        Ok(())
    }
}

impl Interfaces {
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for interface in &self.interface {
            if interface.name.is_empty() {
                return Err(Error::model("interface name must not be empty"));
            }
            if !seen.insert(interface.name.as_str()) {
                return Err(Error::model(format!(
                    "duplicate interface key: {}",
                    interface.name
                )));
            }
            if let Some(config_name) = interface.config.as_ref().and_then(|c| c.name.as_ref()) {
                if *config_name != interface.name {
                    return Err(Error::model(format!(
                        "interface key \"{}\" does not match config name \"{}\"",
                        interface.name, config_name
                    )));
                }
            }
        }
        Ok(())
    }
}
