//! The gNXI service: gRPC server state for gNMI + gNOI.
//!
//! One reader-writer lock protects the validated tree. Set holds the writer
//! lock across the whole apply+callback+rollback sequence; read-side
//! operations take the reader lock only while snapshotting.

pub mod gnmi;
pub mod gnoi;
pub mod tree;

use std::sync::Arc;

use futures::future::BoxFuture;
use gnxi_core::{Authenticator, Error, Result};
use gnxi_model::{Device, Model};
use gnxi_proto::gnoi::certificate::certificate_management_server::CertificateManagementServer;
use gnxi_proto::gnoi::certificate::CertificateInfo;
use gnxi_proto::gnoi::system::system_server::SystemServer;
use gnxi_proto::gnmi::g_nmi_server::GNmiServer;
use tokio::sync::{oneshot, watch, Mutex, RwLock};
use tonic::metadata::MetadataMap;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tonic::Status;
use tracing::{error, info};

/// One-shot callback installing the initial tree into the OVSDB cache.
pub type ConfigSetupCallback =
    Arc<dyn Fn(Device) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Applies a validated config to the device; also used for rollback.
pub type ConfigChangeCallback =
    Arc<dyn Fn(Device) -> BoxFuture<'static, Result<()>> + Send + Sync>;

pub type RebootCallback = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct CallbackHandler {
    pub setup: Option<ConfigSetupCallback>,
    pub change: Option<ConfigChangeCallback>,
    pub reboot: Option<RebootCallback>,
}

/// gNXI service state shared by the gNMI and gNOI trait impls.
pub struct Service {
    auth: Authenticator,
    model: Model,
    certs: Arc<gnxi_cert::Manager>,
    config: Arc<RwLock<Device>>,
    callbacks: CallbackHandler,
    config_update: watch::Sender<()>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    port: u16,
}

impl Service {
    /// Create the service around an initial JSON config. The setup
    /// callback, if present, receives the validated initial tree.
    pub async fn new(
        auth: Authenticator,
        model: Model,
        certs: Arc<gnxi_cert::Manager>,
        config: &[u8],
        callbacks: CallbackHandler,
        port: u16,
    ) -> Result<Arc<Self>> {
        let device = model.new_config_struct(config)?;
        if let Some(setup) = &callbacks.setup {
            setup(device.clone()).await?;
        }
        let (config_update, _) = watch::channel(());
        Ok(Arc::new(Self {
            auth,
            model,
            certs,
            config: Arc::new(RwLock::new(device)),
            callbacks,
            config_update,
            shutdown: Mutex::new(None),
            port,
        }))
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Check credentials on the request metadata.
    pub(crate) fn authorize(&self, metadata: &MetadataMap, rpc: &str) -> std::result::Result<(), Status> {
        match self.auth.authorize(metadata) {
            Ok(()) => {
                info!("allowed a {} request", rpc);
                Ok(())
            }
            Err(e) => {
                info!("denied a {} request: {}", rpc, e);
                Err(Status::permission_denied(e.to_string()))
            }
        }
    }

    /// Replace the authoritative tree with a freshly validated one built
    /// from the given RFC 7951 JSON.
    pub async fn overwrite_config(&self, json: &[u8]) -> Result<()> {
        let device = self.model.new_config_struct(json)?;
        *self.config.write().await = device;
        Ok(())
    }

    /// Raise the coalescing config-update signal consumed by STREAM
    /// subscribers.
    pub fn raise_config_update(&self) {
        let _ = self.config_update.send(());
    }

    pub fn subscribe_config_updates(&self) -> watch::Receiver<()> {
        self.config_update.subscribe()
    }

    /// Snapshot of the authoritative tree.
    pub async fn current_config(&self) -> Device {
        self.config.read().await.clone()
    }

    /// Bind the mTLS listener and serve gNMI + gNOI until stopped.
    pub async fn start_service(self: &Arc<Self>) -> Result<()> {
        info!("Start gNXI Service");

        let package = self
            .certs
            .get_active_package()
            .ok_or_else(|| Error::certificate("no active certificate package"))?;
        let identity = Identity::from_pem(&package.certificate_pem, &package.private_key_pem);
        let client_ca = Certificate::from_pem(&package.ca_bundle_pem);
        let tls = ServerTlsConfig::new()
            .identity(identity)
            .client_ca_root(client_ca);

        let addr = format!("0.0.0.0:{}", self.port)
            .parse()
            .map_err(|e| Error::internal(format!("invalid listen address: {}", e)))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown.lock().await = Some(shutdown_tx);

        info!("Starting to serve gNXI on {}", addr);
        Server::builder()
            .tls_config(tls)
            .map_err(|e| Error::certificate(format!("invalid TLS configuration: {}", e)))?
            .add_service(GNmiServer::from_arc(self.clone()))
            .add_service(SystemServer::from_arc(self.clone()))
            .add_service(CertificateManagementServer::from_arc(self.clone()))
            .serve_with_shutdown(addr, async {
                let _ = shutdown_rx.await;
            })
            .await
            .map_err(|e| Error::connection(format!("failed to serve: {}", e)))
    }

    /// Graceful stop of the listener.
    pub async fn stop_service(&self) {
        info!("Stop gNXI Service");
        if let Some(shutdown) = self.shutdown.lock().await.take() {
            let _ = shutdown.send(());
        }
    }

    pub(crate) async fn apply_change(
        &self,
        new_config: &Device,
        current: &Device,
    ) -> std::result::Result<(), Status> {
        let Some(change) = &self.callbacks.change else {
            return Ok(());
        };
        if let Err(apply_err) = change(new_config.clone()).await {
            if let Err(rollback_err) = change(current.clone()).await {
                return Err(Status::internal(format!(
                    "error in rollback the failed operation ({}): {}",
                    apply_err, rollback_err
                )));
            }
            return Err(Status::aborted(format!(
                "error in applying operation to device: {}",
                apply_err
            )));
        }
        Ok(())
    }

    pub(crate) fn dispatch_reboot(&self) {
        let Some(reboot) = self.callbacks.reboot.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = reboot().await {
                error!("reboot callback failed: {}", e);
            }
        });
    }

    pub(crate) fn active_cert_info(&self) -> Vec<CertificateInfo> {
        self.certs.active_cert_info()
    }
}

/// Map a core error to the gRPC status used on the wire.
pub(crate) fn status_from_error(e: Error) -> Status {
    match e {
        Error::NotFound(msg) => Status::not_found(msg),
        Error::InvalidArgument(msg) => Status::invalid_argument(msg),
        Error::PermissionDenied(msg) => Status::permission_denied(msg),
        Error::Timeout(msg) => Status::deadline_exceeded(msg),
        other => Status::internal(other.to_string()),
    }
}
