//! ovs-gnxi-service
//!
//! Management gateway exposing an OpenConfig-modelled tree over gNMI/gNOI
//! while mirroring it into a live Open vSwitch instance over OVSDB.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use gnxi_core::config;
use gnxi_ovsdb::HostScripts;
use tracing::{error, info};

mod broker;
mod server;
mod service;
mod watchdog;

use server::{GnxiServer, ServerConfig};
use watchdog::Watchdog;

// Flag defaults resolve through gnxi_core::config::defaults, so every knob
// can also be pinned in the environment file loaded before parsing.
#[derive(Parser, Debug)]
#[command(name = "ovs-gnxi-service")]
#[command(about = "Open vSwitch gNXI management gateway")]
struct Args {
    /// gRPC listen port for gNMI and gNOI
    #[arg(long, default_value_t = config::defaults::grpc_port())]
    grpc_port: u16,

    /// OVSDB server address
    #[arg(long, default_value_t = config::defaults::ovsdb_address())]
    ovsdb_address: String,

    /// OVSDB server port
    #[arg(long, default_value_t = config::defaults::ovsdb_port())]
    ovsdb_port: u16,

    /// Root directory of the certificate packages
    #[arg(long, default_value_os_t = config::defaults::cert_root())]
    cert_root: PathBuf,

    /// Administrative username checked on every RPC
    #[arg(long, default_value_t = config::defaults::admin_username())]
    admin_username: String,

    /// Administrative password checked on every RPC
    #[arg(long, default_value_t = config::defaults::admin_password())]
    admin_password: String,

    /// Script starting the host Open vSwitch daemon
    #[arg(long, default_value_t = config::defaults::start_script())]
    start_script: String,

    /// Script stopping the host Open vSwitch daemon
    #[arg(long, default_value_t = config::defaults::stop_script())]
    stop_script: String,

    /// Script restarting the host Open vSwitch daemon
    #[arg(long, default_value_t = config::defaults::restart_script())]
    restart_script: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Seed flag defaults from /etc/ovs-gnxi/environment (if present)
    config::load_environment();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ovs_gnxi_service=info".parse()?)
                .add_directive("gnxi_ovsdb=info".parse()?)
                .add_directive("gnxi_cert=info".parse()?)
                .add_directive("gnxi_model=info".parse()?),
        )
        .init();

    let args = Args::parse();

    info!("Starting Open vSwitch gNXI interface");

    let config = ServerConfig {
        grpc_port: args.grpc_port,
        admin_username: args.admin_username,
        admin_password: args.admin_password,
        cert_root: args.cert_root,
        ovsdb_address: args.ovsdb_address,
        ovsdb_port: args.ovsdb_port,
        scripts: HostScripts {
            start: args.start_script,
            stop: args.stop_script,
            restart: args.restart_script,
        },
    };

    let (server, ovs_errors) = GnxiServer::new(config)?;
    let watchdog = Watchdog::new(server, ovs_errors).await;

    if let Err(e) = watchdog.run_services().await {
        error!("fatal: {}", e);
        std::process::exit(1);
    }

    info!("Exiting Open vSwitch gNXI interface");
    Ok(())
}
