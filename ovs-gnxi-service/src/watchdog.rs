//! Top-level lifecycle supervisor for the OVSDB client and the gNXI
//! service.

use std::sync::Arc;

use gnxi_core::{Error, Result};
use gnxi_ovsdb::TlsPaths;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::broker::WatchdogChannels;
use crate::server::GnxiServer;

/// Supervises the two long-running tasks over four control channels plus
/// the OVSDB client's error channel. A start-gNXI signal rebuilds the
/// service, because its tree is bound to the current object cache.
pub struct Watchdog {
    server: Arc<GnxiServer>,
    start_ovs: mpsc::Receiver<()>,
    stop_ovs: mpsc::Receiver<()>,
    start_gnxi: mpsc::Receiver<()>,
    stop_gnxi: mpsc::Receiver<()>,
    ovs_errors: mpsc::UnboundedReceiver<Error>,
}

impl Watchdog {
    pub async fn new(
        server: Arc<GnxiServer>,
        ovs_errors: mpsc::UnboundedReceiver<Error>,
    ) -> Self {
        info!("Initializing Watchdog...");

        let (start_ovs_tx, start_ovs) = mpsc::channel(1);
        let (stop_ovs_tx, stop_ovs) = mpsc::channel(1);
        let (start_gnxi_tx, start_gnxi) = mpsc::channel(1);
        let (stop_gnxi_tx, stop_gnxi) = mpsc::channel(1);

        server
            .broker()
            .register_watchdog_channels(WatchdogChannels {
                start_ovs: start_ovs_tx,
                stop_ovs: stop_ovs_tx,
                start_gnxi: start_gnxi_tx,
                stop_gnxi: stop_gnxi_tx,
            })
            .await;

        Self { server, start_ovs, stop_ovs, start_gnxi, stop_gnxi, ovs_errors }
    }

    /// Start both services and supervise them until a fatal OVSDB error.
    pub async fn run_services(mut self) -> Result<()> {
        self.run_ovs_client();
        self.server.initialize_service().await?;
        self.run_gnxi_service().await;

        loop {
            // Biased polling keeps the reboot sequence (stop-OVSDB,
            // start-OVSDB, stop-gNXI, start-gNXI) in order when several
            // signals are pending.
            tokio::select! {
                biased;
                Some(e) = self.ovs_errors.recv() => {
                    error!("OVSDB client reported a fatal error: {}", e);
                    return Err(e);
                }
                Some(_) = self.stop_ovs.recv() => {
                    self.server.broker().ovs_client().stop().await;
                }
                Some(_) = self.start_ovs.recv() => {
                    self.run_ovs_client();
                }
                Some(_) = self.stop_gnxi.recv() => {
                    if let Some(service) = self.server.service().await {
                        service.stop_service().await;
                    }
                }
                Some(_) = self.start_gnxi.recv() => {
                    self.server.initialize_service().await?;
                    self.run_gnxi_service().await;
                }
                else => return Ok(()),
            }
        }
    }

    fn run_ovs_client(&self) {
        let Some((key, cert, ca)) = self.server.cert_manager().active_tls_paths() else {
            error!("no active certificate package to dial OVSDB with");
            return;
        };
        let paths = TlsPaths {
            key: key.to_string_lossy().into_owned(),
            cert: cert.to_string_lossy().into_owned(),
            ca: ca.to_string_lossy().into_owned(),
        };
        let client = self.server.broker().ovs_client().clone();
        tokio::spawn(async move { client.run(paths).await });
    }

    async fn run_gnxi_service(&self) {
        let Some(service) = self.server.service().await else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = service.start_service().await {
                error!("gNXI service exited: {}", e);
            }
        });
    }
}
