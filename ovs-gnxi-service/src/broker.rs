//! The system broker: translates between the gNMI configuration tree and
//! the OVSDB object cache, and dispatches lifecycle events to the watchdog.

use std::sync::Arc;

use futures::FutureExt;
use gnxi_core::{Error, Result};
use gnxi_model::device::{
    AdminStatus, Component, ComponentConfig, ComponentState, ComponentType, Components,
    Connection, ConnectionConfig, ConnectionState, Connections, Controller, ControllerConfig,
    Controllers,
    Device, Interface, InterfaceConfig, InterfaceState, Counters, Interfaces, Openflow,
    OperStatus, System, SystemConfig, Transport,
};
use gnxi_model::Model;
use gnxi_ovsdb::{overwrite_object_cache_with_json, ObjectCache, OvsdbClient, SyncCallback};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error};

use crate::service::{
    CallbackHandler, ConfigChangeCallback, ConfigSetupCallback, RebootCallback, Service,
};

/// Control channels into the watchdog loop.
pub struct WatchdogChannels {
    pub start_ovs: mpsc::Sender<()>,
    pub stop_ovs: mpsc::Sender<()>,
    pub start_gnxi: mpsc::Sender<()>,
    pub stop_gnxi: mpsc::Sender<()>,
}

/// Bridges the gNXI service and the OVSDB client. The gNXI service is
/// registered after construction (and re-registered after a
/// watchdog-driven rebuild).
pub struct SystemBroker {
    model: Model,
    ovs_client: Arc<OvsdbClient>,
    certs: Arc<gnxi_cert::Manager>,
    gnxi: RwLock<Option<Arc<Service>>>,
    watchdog: RwLock<Option<WatchdogChannels>>,
}

impl SystemBroker {
    pub fn new(ovs_client: Arc<OvsdbClient>, certs: Arc<gnxi_cert::Manager>) -> Arc<Self> {
        Arc::new(Self {
            model: Model::new(),
            ovs_client,
            certs,
            gnxi: RwLock::new(None),
            watchdog: RwLock::new(None),
        })
    }

    pub fn ovs_client(&self) -> &Arc<OvsdbClient> {
        &self.ovs_client
    }

    pub fn certs(&self) -> &Arc<gnxi_cert::Manager> {
        &self.certs
    }

    pub async fn register_gnxi_service(&self, service: Arc<Service>) {
        *self.gnxi.write().await = Some(service);
    }

    pub async fn register_watchdog_channels(&self, channels: WatchdogChannels) {
        *self.watchdog.write().await = Some(channels);
    }

    /// Build the RFC 7951 configuration for the current object cache.
    pub fn generate_config(&self, cache: &ObjectCache) -> Result<Vec<u8>> {
        let mut controllers = Vec::new();
        for controller in cache.controllers.values() {
            let transport = match controller.target.protocol.to_lowercase().as_str() {
                "tcp" => Some(Transport::Tcp),
                "tls" => Some(Transport::Tls),
                _ => None,
            };
            controllers.push(Controller {
                name: controller.name.clone(),
                config: Some(ControllerConfig { name: Some(controller.name.clone()) }),
                connections: Some(Connections {
                    connection: vec![Connection {
                        aux_id: 0,
                        config: Some(ConnectionConfig {
                            aux_id: Some(0),
                            address: Some(controller.target.address.clone()),
                            port: Some(controller.target.port),
                            transport,
                        }),
                        state: Some(ConnectionState {
                            aux_id: Some(0),
                            address: Some(controller.target.address.clone()),
                            port: Some(controller.target.port),
                            transport,
                            connected: Some(controller.connected),
                        }),
                    }],
                }),
            });
        }

        let mut interfaces = Vec::new();
        for interface in cache.interfaces.values() {
            let admin_status = match interface.admin_status.as_str() {
                "up" => Some(AdminStatus::Up),
                "down" => Some(AdminStatus::Down),
                _ => None,
            };
            let oper_status = match interface.link_status.as_str() {
                "up" => Some(OperStatus::Up),
                "down" => Some(OperStatus::Down),
                _ => None,
            };
            interfaces.push(Interface {
                name: interface.name.clone(),
                config: Some(InterfaceConfig {
                    name: Some(interface.name.clone()),
                    mtu: Some(interface.mtu),
                }),
                state: Some(InterfaceState {
                    name: None,
                    admin_status,
                    oper_status,
                    mtu: Some(interface.mtu),
                    counters: Some(Counters {
                        in_pkts: Some(interface.counters.received_packets),
                        in_errors: Some(interface.counters.received_errors),
                        in_discards: Some(interface.counters.received_dropped),
                        out_pkts: Some(interface.counters.transmitted_packets),
                        out_errors: Some(interface.counters.transmitted_errors),
                        out_discards: Some(interface.counters.transmitted_dropped),
                    }),
                }),
            });
        }

        let device = Device {
            system: Some(System {
                config: Some(SystemConfig { hostname: Some(cache.system.hostname.clone()) }),
                openflow: Some(Openflow {
                    controllers: Some(Controllers { controller: controllers }),
                }),
            }),
            components: Some(Components {
                component: vec![Component {
                    name: "os".to_string(),
                    config: Some(ComponentConfig { name: Some("os".to_string()) }),
                    state: Some(ComponentState {
                        name: Some("os".to_string()),
                        component_type: Some(ComponentType::OperatingSystem),
                        description: Some(cache.system.version.clone()),
                    }),
                }],
            }),
            interfaces: Some(Interfaces { interface: interfaces }),
        };
        device.validate()?;

        let json = self.model.to_ietf_json(&device, true)?;
        Ok(serde_json::to_vec_pretty(&json)?)
    }

    /// Called by the OVSDB cache after every sync: regenerate the gNMI
    /// config, overwrite the service tree, raise the streaming signal.
    pub async fn ovs_config_change_callback(&self, cache: ObjectCache) -> Result<()> {
        debug!("received new change by OVS device");
        let config = self.generate_config(&cache).map_err(|e| {
            error!("unable to generate gNMI config from OVS config source: {}", e);
            e
        })?;

        if let Some(service) = self.gnxi.read().await.clone() {
            service.overwrite_config(&config).await?;
            service.raise_config_update();
        }
        Ok(())
    }

    /// One-shot initial-tree install: derive the object cache from the
    /// validated struct and overwrite the OVSDB cache (no transact).
    pub async fn gnmi_config_setup_callback(&self, device: Device) -> Result<()> {
        debug!("received initial config by gNMI target");
        let json = self.model.to_ietf_json(&device, true)?;

        let mut cache = self.ovs_client.cache().copy_object_cache().await;
        overwrite_object_cache_with_json(&mut cache, &json);
        self.ovs_client.cache().overwrite_object_cache(cache).await;
        Ok(())
    }

    /// Per-Set apply: rebuild the object cache from the new struct and
    /// push the diffs down to OVSDB.
    pub async fn gnmi_config_change_callback(&self, device: Device) -> Result<()> {
        debug!("received new change by gNMI target");
        let json = self.model.to_ietf_json(&device, true)?;

        let prev = self.ovs_client.cache().copy_object_cache().await;
        let mut new_cache = prev.deep_copy();
        overwrite_object_cache_with_json(&mut new_cache, &json);
        self.ovs_client
            .cache()
            .overwrite_object_cache(new_cache.clone())
            .await;

        self.ovs_client
            .sync_changes_to_remote(&prev, &new_cache)
            .await
            .map_err(|e| {
                error!("unable to sync changes to OVS system: {}", e);
                e
            })
    }

    /// Reboot: stop monitoring, restart the switch, and cycle both
    /// services through the watchdog.
    pub async fn gnoi_reboot_callback(&self) -> Result<()> {
        debug!("received OVS reboot request by gNOI target");
        self.ovs_client.stop_monitoring().await;
        self.ovs_client.restart_system().await.map_err(|e| {
            error!("unable to reboot OVS system: {}", e);
            e
        })?;

        let watchdog = self.watchdog.read().await;
        let Some(channels) = watchdog.as_ref() else {
            return Err(Error::internal("watchdog channels are not registered"));
        };
        for channel in [
            &channels.stop_ovs,
            &channels.start_ovs,
            &channels.stop_gnxi,
            &channels.start_gnxi,
        ] {
            if channel.send(()).await.is_err() {
                error!("watchdog control channel closed");
            }
        }
        Ok(())
    }

    /// Callback bundle handed to the gNXI service.
    pub fn callback_handler(self: &Arc<Self>) -> CallbackHandler {
        let setup: ConfigSetupCallback = {
            let broker = self.clone();
            Arc::new(move |device: Device| {
                let broker = broker.clone();
                async move { broker.gnmi_config_setup_callback(device).await }.boxed()
            })
        };
        let change: ConfigChangeCallback = {
            let broker = self.clone();
            Arc::new(move |device: Device| {
                let broker = broker.clone();
                async move { broker.gnmi_config_change_callback(device).await }.boxed()
            })
        };
        let reboot: RebootCallback = {
            let broker = self.clone();
            Arc::new(move || {
                let broker = broker.clone();
                async move { broker.gnoi_reboot_callback().await }.boxed()
            })
        };
        CallbackHandler {
            setup: Some(setup),
            change: Some(change),
            reboot: Some(reboot),
        }
    }

    /// Post-sync callback installed into the OVSDB cache.
    pub fn ovs_sync_callback(self: &Arc<Self>) -> SyncCallback {
        let broker = self.clone();
        Arc::new(move |cache: ObjectCache| {
            let broker = broker.clone();
            async move { broker.ovs_config_change_callback(cache).await }.boxed()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gnxi_core::Authenticator;
    use gnxi_ovsdb::client::{ConnectionFactory, HostScripts, TlsPaths};
    use gnxi_ovsdb::connection::OvsdbConnection;
    use gnxi_ovsdb::protocol::{MonitorSelect, Operation, OperationResult, TableUpdates};
    use gnxi_proto::gnmi::g_nmi_server::GNmi;
    use gnxi_proto::gnmi::{
        typed_value, GetRequest, Path, PathElem, SetRequest, TypedValue, Update,
    };
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tonic::Request;

    #[derive(Default)]
    struct MockState {
        transactions: Vec<Vec<Operation>>,
    }

    #[derive(Clone, Default)]
    struct MockConnection {
        state: Arc<StdMutex<MockState>>,
    }

    #[async_trait]
    impl OvsdbConnection for MockConnection {
        async fn transact(
            &self,
            _database: &str,
            operations: Vec<Operation>,
        ) -> gnxi_core::Result<Vec<OperationResult>> {
            let count = operations.len();
            self.state.lock().unwrap().transactions.push(operations);
            Ok(vec![OperationResult::default(); count])
        }

        async fn monitor(
            &self,
            _database: &str,
            _tables: &[&str],
            _select: MonitorSelect,
        ) -> gnxi_core::Result<TableUpdates> {
            Ok(serde_json::from_value(json!({
                "Open_vSwitch": {
                    "sys-uuid": {
                        "new": {
                            "ovs_version": "2.9.2",
                            "external_ids": ["map", [["hostname", "target.gnxi.lan"]]]
                        }
                    }
                },
                "Controller": {
                    "ctl-uuid": {
                        "new": {"target": "tcp:172.18.0.2:6653", "is_connected": true}
                    }
                },
                "Interface": {
                    "if-uuid": {
                        "new": {
                            "name": "sw1-eth1",
                            "mtu": 1500,
                            "admin_state": "up",
                            "link_state": "up",
                            "statistics": ["map", [["rx_packets", 42]]]
                        }
                    }
                }
            }))
            .unwrap())
        }

        fn register_notifier(
            &self,
            _notifier: tokio::sync::mpsc::UnboundedSender<TableUpdates>,
        ) {
        }

        async fn disconnect(&self) {}
    }

    async fn broker_with_mock() -> (Arc<SystemBroker>, MockConnection) {
        let mock = MockConnection::default();
        let factory: ConnectionFactory = {
            let mock = mock.clone();
            Arc::new(move |_, _, _| {
                let mock = mock.clone();
                async move { Ok(Box::new(mock) as Box<dyn OvsdbConnection>) }.boxed()
            })
        };
        let (client, _errors) =
            OvsdbClient::with_factory("ovs.gnxi.lan", 6640, HostScripts::default(), factory);
        client
            .start(TlsPaths {
                key: "target.key".to_string(),
                cert: "target.crt".to_string(),
                ca: "ca.crt".to_string(),
            })
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let certs = Arc::new(gnxi_cert::Manager::new(dir.path()));
        (SystemBroker::new(client, certs), mock)
    }

    fn authed<T>(message: T) -> Request<T> {
        let mut request = Request::new(message);
        request
            .metadata_mut()
            .insert("username", "admin".parse().unwrap());
        request
            .metadata_mut()
            .insert("password", "testpassword".parse().unwrap());
        request
    }

    fn port_path() -> Path {
        let elems = [
            ("system", None),
            ("openflow", None),
            ("controllers", None),
            ("controller", Some(("name", "main"))),
            ("connections", None),
            ("connection", Some(("aux-id", "0"))),
            ("config", None),
            ("port", None),
        ];
        Path {
            elem: elems
                .iter()
                .map(|(name, key): &(&str, Option<(&str, &str)>)| {
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

    #[tokio::test]
    async fn test_generate_config_contains_cache_values() {
        let (broker, _mock) = broker_with_mock().await;
        let cache = broker.ovs_client().cache().copy_object_cache().await;
        let config = broker.generate_config(&cache).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&config).unwrap();

        assert_eq!(
            json["openconfig-system:system"]["config"]["hostname"],
            "target.gnxi.lan"
        );
        let controller = &json["openconfig-system:system"]["openconfig-openflow:openflow"]
            ["controllers"]["controller"][0];
        assert_eq!(controller["name"], "main");
        assert_eq!(
            controller["connections"]["connection"][0]["config"]["port"],
            6653
        );
        let component = &json["openconfig-platform:components"]["component"][0];
        assert_eq!(component["state"]["description"], "2.9.2");
    }

    #[tokio::test]
    async fn test_generate_config_round_trips_through_cache_overwrite() {
        let (broker, _mock) = broker_with_mock().await;
        let cache = broker.ovs_client().cache().copy_object_cache().await;
        let config = broker.generate_config(&cache).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&config).unwrap();

        let mut copy = cache.deep_copy();
        overwrite_object_cache_with_json(&mut copy, &json);
        assert_eq!(copy, cache);
    }

    #[tokio::test]
    async fn test_set_port_reaches_cache_and_remote() {
        let (broker, mock) = broker_with_mock().await;

        let cache = broker.ovs_client().cache().copy_object_cache().await;
        let config = broker.generate_config(&cache).unwrap();
        let service = Service::new(
            Authenticator::new("admin", "testpassword"),
            Model::new(),
            broker.certs().clone(),
            &config,
            broker.callback_handler(),
            10161,
        )
        .await
        .unwrap();
        broker.register_gnxi_service(service.clone()).await;

        let request = SetRequest {
            update: vec![Update {
                path: Some(port_path()),
                val: Some(TypedValue {
                    value: Some(typed_value::Value::UintVal(6654)),
                }),
                ..Default::default()
            }],
            ..Default::default()
        };
        let response = service.set(authed(request)).await.unwrap().into_inner();
        assert_eq!(response.response.len(), 1);

        // (b) the tree reflects the new port
        let got = service
            .get(authed(GetRequest { path: vec![port_path()], ..Default::default() }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(
            got.notification[0].update[0].val.clone().unwrap().value,
            Some(typed_value::Value::UintVal(6654))
        );

        // (c) the object cache was rebuilt with the new port
        let cache = broker.ovs_client().cache().copy_object_cache().await;
        assert_eq!(cache.controllers["main"].target.port, 6654);

        // (d) exactly one OVSDB update on Controller with the new target
        let state = mock.state.lock().unwrap();
        assert_eq!(state.transactions.len(), 1);
        let op = &state.transactions[0][0];
        assert_eq!(op.table, "Controller");
        assert_eq!(op.row.as_ref().unwrap()["target"], json!("tcp:172.18.0.2:6654"));
    }
}
