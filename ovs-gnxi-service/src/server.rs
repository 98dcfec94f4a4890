//! Assembly root: wires the authenticator, certificate manager, system
//! broker, and gNXI service together.

use std::path::PathBuf;
use std::sync::Arc;

use gnxi_core::{Authenticator, Error, Result};
use gnxi_model::Model;
use gnxi_ovsdb::{HostScripts, OvsdbClient};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::broker::SystemBroker;
use crate::service::Service;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub grpc_port: u16,
    pub admin_username: String,
    pub admin_password: String,
    pub cert_root: PathBuf,
    pub ovsdb_address: String,
    pub ovsdb_port: u16,
    pub scripts: HostScripts,
}

/// The gNXI server: owns the long-lived components and (re)builds the
/// service once the OVSDB cache has its first snapshot.
pub struct GnxiServer {
    auth: Authenticator,
    cert_manager: Arc<gnxi_cert::Manager>,
    broker: Arc<SystemBroker>,
    service: RwLock<Option<Arc<Service>>>,
    grpc_port: u16,
}

impl GnxiServer {
    pub fn new(config: ServerConfig) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<Error>)> {
        info!("Initializing gNXI Server...");

        let auth = Authenticator::new(&config.admin_username, &config.admin_password);
        let cert_manager = Arc::new(gnxi_cert::Manager::with_default_package(&config.cert_root)?);
        let (ovs_client, ovs_errors) =
            OvsdbClient::new(config.ovsdb_address, config.ovsdb_port, config.scripts);
        let broker = SystemBroker::new(ovs_client, cert_manager.clone());

        let server = Arc::new(Self {
            auth,
            cert_manager,
            broker,
            service: RwLock::new(None),
            grpc_port: config.grpc_port,
        });
        Ok((server, ovs_errors))
    }

    pub fn broker(&self) -> &Arc<SystemBroker> {
        &self.broker
    }

    pub fn cert_manager(&self) -> &Arc<gnxi_cert::Manager> {
        &self.cert_manager
    }

    pub async fn service(&self) -> Option<Arc<Service>> {
        self.service.read().await.clone()
    }

    /// Build the gNXI service from the current object cache and register
    /// it with the broker. Called at startup and again after every
    /// watchdog-driven rebuild.
    pub async fn initialize_service(&self) -> Result<()> {
        let service = self.create_service().await?;
        *self.service.write().await = Some(service.clone());
        self.broker.register_gnxi_service(service).await;
        Ok(())
    }

    async fn create_service(&self) -> Result<Arc<Service>> {
        let cache = self.broker.ovs_client().cache().clone();
        cache.wait_initialized().await;

        info!("Start generating initial gNMI config from OVS system source...");
        let objects = cache.copy_object_cache().await;
        let config = self.broker.generate_config(&objects)?;
        debug!(
            "using following initial config data: {}",
            String::from_utf8_lossy(&config)
        );

        cache.overwrite_callback(self.broker.ovs_sync_callback()).await;

        Service::new(
            self.auth.clone(),
            Model::new(),
            self.cert_manager.clone(),
            &config,
            self.broker.callback_handler(),
            self.grpc_port,
        )
        .await
    }
}
