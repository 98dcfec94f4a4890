//! Runtime configuration for the gateway.
//!
//! `load_environment()` seeds the process environment from the canonical
//! environment file before flag parsing; the [`defaults`] module then
//! resolves the service binary's flag defaults, so every knob can be pinned
//! either on the command line or in `/etc/ovs-gnxi/environment`.

use std::path::Path;
use std::{env, fs};

use tracing::{debug, info, warn};

/// Locations probed for the environment file, in priority order.
pub const ENV_FILE_PATHS: &[&str] = &[
    "/etc/ovs-gnxi/environment",
    "/etc/ovs-gnxi.env",
    ".env",
];

/// Seed the process environment from the first environment file found.
/// `GNXI_ENV_FILE` overrides the probe list; variables that are already set
/// always win. Returns the path that was loaded, if any.
pub fn load_environment() -> Option<String> {
    let custom = env::var("GNXI_ENV_FILE").ok();
    let candidates = custom
        .iter()
        .map(String::as_str)
        .chain(ENV_FILE_PATHS.iter().copied());

    for path in candidates {
        match apply_env_file(path) {
            Ok(Some(loaded)) => {
                info!("loaded {} environment variables from {}", loaded, path);
                return Some(path.to_string());
            }
            Ok(None) => {}
            Err(e) => warn!("failed to read environment file {}: {}", path, e),
        }
    }

    debug!("no environment file found, using process environment");
    None
}

/// Apply one `KEY=VALUE`-per-line file. Returns `None` when the file does
/// not exist, otherwise the number of variables set.
fn apply_env_file(path: &str) -> std::io::Result<Option<usize>> {
    if !Path::new(path).exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    let mut loaded = 0;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue;
        }
        env::set_var(key, unquote(value.trim()));
        loaded += 1;
    }
    Ok(Some(loaded))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Flag defaults for the service binary, each overridable through the
/// environment file (`GNXI_GRPC_PORT`, `GNXI_OVSDB_ADDRESS`, ...).
pub mod defaults {
    use std::path::PathBuf;

    use super::{env_or, env_u16};

    pub fn grpc_port() -> u16 {
        env_u16("GNXI_GRPC_PORT", 10161)
    }

    pub fn ovsdb_address() -> String {
        env_or("GNXI_OVSDB_ADDRESS", "ovs.gnxi.lan")
    }

    pub fn ovsdb_port() -> u16 {
        env_u16("GNXI_OVSDB_PORT", 6640)
    }

    pub fn cert_root() -> PathBuf {
        PathBuf::from(env_or("GNXI_CERT_ROOT", "certs"))
    }

    pub fn admin_username() -> String {
        env_or("GNXI_ADMIN_USERNAME", "admin")
    }

    pub fn admin_password() -> String {
        env_or("GNXI_ADMIN_PASSWORD", "testpassword")
    }

    pub fn start_script() -> String {
        env_or("GNXI_START_SCRIPT", "start_ovs.sh")
    }

    pub fn stop_script() -> String {
        env_or("GNXI_STOP_SCRIPT", "stop_ovs.sh")
    }

    pub fn restart_script() -> String {
        env_or("GNXI_RESTART_SCRIPT", "restart_ovs.sh")
    }
}
