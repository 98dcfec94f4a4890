//! Raw and typed caches over the monitored OVSDB tables.
//!
//! The raw cache holds the last row seen per table/uuid; the typed
//! [`ObjectCache`] is rebuilt wholesale from the raw rows on every monitor
//! update, so a row change never leaves a partially updated object behind.

use std::collections::HashMap;

use futures::future::BoxFuture;
use gnxi_core::Result;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error};

use crate::objects::{
    ControllerTarget, Interface, InterfaceCounters, ObjectCache, OpenFlowController, SystemInfo,
    PRIMARY_CONTROLLER_NAME,
};
use crate::protocol::{is_empty_set, map_entries, Row, TableUpdates};
use crate::{CONTROLLER_TABLE, INTERFACE_TABLE, SYSTEM_TABLE};

/// Callback invoked with a cache snapshot after every sync.
pub type SyncCallback =
    Arc<dyn Fn(ObjectCache) -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Default)]
struct CacheInner {
    raw: HashMap<String, HashMap<String, Row>>,
    objects: ObjectCache,
}

/// The OVSDB-side cache. A single writer lock protects both the raw rows
/// and the typed objects; the post-sync callback runs after the lock is
/// released.
pub struct OvsdbCache {
    inner: RwLock<CacheInner>,
    callback: RwLock<Option<SyncCallback>>,
    initialized_tx: watch::Sender<bool>,
}

impl Default for OvsdbCache {
    fn default() -> Self {
        Self::new()
    }
}

impl OvsdbCache {
    pub fn new() -> Self {
        let (initialized_tx, _) = watch::channel(false);
        Self {
            inner: RwLock::new(CacheInner::default()),
            callback: RwLock::new(None),
            initialized_tx,
        }
    }

    /// Seed the cache from the monitor's initial reply and fire the
    /// one-shot initialized signal.
    pub async fn initialize(&self, updates: TableUpdates) -> Result<()> {
        self.apply(updates).await;
        let _ = self.initialized_tx.send(true);
        self.run_callback().await
    }

    /// Apply an incremental monitor update, then invoke the callback.
    pub async fn sync(&self, updates: TableUpdates) -> Result<()> {
        self.apply(updates).await;
        self.run_callback().await
    }

    async fn apply(&self, updates: TableUpdates) {
        let mut inner = self.inner.write().await;
        for (table, rows) in updates {
            match table.as_str() {
                SYSTEM_TABLE | CONTROLLER_TABLE | INTERFACE_TABLE => {}
                other => {
                    error!("received update for unsupported table \"{}\"", other);
                    continue;
                }
            }
            let cached = inner.raw.entry(table).or_default();
            for (uuid, row_update) in rows {
                if row_update.upserts() {
                    cached.insert(uuid, row_update.new.unwrap_or_default());
                } else {
                    cached.remove(&uuid);
                }
            }
        }
        inner.objects = rebuild_objects(&inner.raw);
    }

    async fn run_callback(&self) -> Result<()> {
        let callback = self.callback.read().await.clone();
        if let Some(callback) = callback {
            let snapshot = self.copy_object_cache().await;
            callback(snapshot).await?;
        }
        Ok(())
    }

    /// Receiver for the one-shot initialized signal.
    pub fn initialized(&self) -> watch::Receiver<bool> {
        self.initialized_tx.subscribe()
    }

    /// Block until the first monitor snapshot has been applied.
    pub async fn wait_initialized(&self) {
        let mut rx = self.initialized_tx.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Deep copy of the typed cache.
    pub async fn copy_object_cache(&self) -> ObjectCache {
        self.inner.read().await.objects.deep_copy()
    }

    /// Atomic replacement of the typed cache.
    pub async fn overwrite_object_cache(&self, objects: ObjectCache) {
        self.inner.write().await.objects = objects;
    }

    /// Install the post-sync callback.
    pub async fn overwrite_callback(&self, callback: SyncCallback) {
        *self.callback.write().await = Some(callback);
    }

    /// Drop all cached state and re-arm the initialized signal.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.raw.clear();
        inner.objects = ObjectCache::default();
        let _ = self.initialized_tx.send(false);
    }
}

fn rebuild_objects(raw: &HashMap<String, HashMap<String, Row>>) -> ObjectCache {
    let mut objects = ObjectCache::default();

    if let Some(rows) = raw.get(SYSTEM_TABLE) {
        if let Some((uuid, row)) = rows.iter().next() {
            objects.system = parse_system(uuid, row);
        }
    }

    if let Some(rows) = raw.get(CONTROLLER_TABLE) {
        let single = rows.len() == 1;
        for (uuid, row) in rows {
            // The single primary Controller row maps to the fixed name
            // "main"; additional rows fall back to their uuid.
            let name = if single {
                PRIMARY_CONTROLLER_NAME.to_string()
            } else {
                uuid.clone()
            };
            let controller = parse_controller(uuid, &name, row);
            objects.controllers.insert(name, controller);
        }
    }

    if let Some(rows) = raw.get(INTERFACE_TABLE) {
        for (uuid, row) in rows {
            let interface = parse_interface(uuid, row);
            if interface.name.is_empty() {
                continue;
            }
            objects.interfaces.insert(interface.name.clone(), interface);
        }
    }

    objects
}

fn parse_system(uuid: &str, row: &Row) -> SystemInfo {
    let version = row
        .get("ovs_version")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    // The hostname travels either as a first-class column or inside
    // external_ids, depending on the ovs-vswitchd deployment.
    let hostname = row
        .get("hostname")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            row.get("external_ids").and_then(|ids| {
                map_entries(ids)
                    .into_iter()
                    .find(|(k, _)| k == "hostname")
                    .and_then(|(_, v)| v.as_str().map(str::to_string))
            })
        })
        .unwrap_or_default();

    SystemInfo { uuid: uuid.to_string(), version, hostname }
}

fn parse_controller(uuid: &str, name: &str, row: &Row) -> OpenFlowController {
    let target = match row.get("target").and_then(Value::as_str) {
        Some(raw) => match ControllerTarget::parse(raw) {
            Ok(target) => target,
            Err(e) => {
                error!("controller {}: {}", name, e);
                ControllerTarget::default()
            }
        },
        None => ControllerTarget::default(),
    };

    let connected = row
        .get("is_connected")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    OpenFlowController {
        uuid: uuid.to_string(),
        name: name.to_string(),
        connected,
        target,
    }
}

fn parse_interface(uuid: &str, row: &Row) -> Interface {
    let name = row
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mtu = match row.get("mtu") {
        Some(value) if is_empty_set(value) => {
            debug!("interface \"{}\" has no mtu set", name);
            0
        }
        Some(value) => value
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .unwrap_or(0),
        None => 0,
    };

    Interface {
        uuid: uuid.to_string(),
        name,
        mtu,
        admin_status: status_string(row.get("admin_state")),
        link_status: status_string(row.get("link_state")),
        counters: parse_counters(row.get("statistics")),
    }
}

fn status_string(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn parse_counters(value: Option<&Value>) -> InterfaceCounters {
    let mut counters = InterfaceCounters::default();
    let Some(value) = value else {
        return counters;
    };
    for (key, v) in map_entries(value) {
        // Statistics arrive as JSON numbers that may decode as floats.
        let n = v
            .as_u64()
            .or_else(|| v.as_f64().map(|f| f as u64))
            .unwrap_or(0);
        match key.as_str() {
            "rx_packets" => counters.received_packets = n,
            "rx_errors" => counters.received_errors = n,
            "rx_dropped" => counters.received_dropped = n,
            "tx_packets" => counters.transmitted_packets = n,
            "tx_errors" => counters.transmitted_errors = n,
            "tx_dropped" => counters.transmitted_dropped = n,
            _ => {}
        }
    }
    counters
}

/// Child lookup tolerating RFC 7951 module-prefixed keys.
fn get_child<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    let obj = value.as_object()?;
    obj.get(name).or_else(|| {
        obj.iter()
            .find(|(k, _)| k.rsplit(':').next() == Some(name))
            .map(|(_, v)| v)
    })
}

/// Reconcile a copied object cache with a gNMI configuration tree. Only the
/// fields the tree models are touched; everything else keeps its OVSDB
/// value.
pub fn overwrite_object_cache_with_json(cache: &mut ObjectCache, tree: &Value) {
    if let Some(system) = get_child(tree, "system") {
        if let Some(hostname) = get_child(system, "config")
            .and_then(|c| get_child(c, "hostname"))
            .and_then(Value::as_str)
        {
            cache.system.hostname = hostname.to_string();
        }

        let controllers = get_child(system, "openflow")
            .and_then(|of| get_child(of, "controllers"))
            .and_then(|cs| get_child(cs, "controller"))
            .and_then(Value::as_array);
        if let Some(controllers) = controllers {
            for entry in controllers {
                overwrite_controller(cache, entry);
            }
        }
    }

    let components = get_child(tree, "components")
        .and_then(|cs| get_child(cs, "component"))
        .and_then(Value::as_array);
    if let Some(components) = components {
        for entry in components {
            if get_child(entry, "name").and_then(Value::as_str) == Some("os") {
                if let Some(description) = get_child(entry, "state")
                    .and_then(|s| get_child(s, "description"))
                    .and_then(Value::as_str)
                {
                    cache.system.version = description.to_string();
                }
            }
        }
    }

    let interfaces = get_child(tree, "interfaces")
        .and_then(|is| get_child(is, "interface"))
        .and_then(Value::as_array);
    if let Some(interfaces) = interfaces {
        for entry in interfaces {
            overwrite_interface(cache, entry);
        }
    }
}

fn overwrite_controller(cache: &mut ObjectCache, entry: &Value) {
    let Some(name) = get_child(entry, "name").and_then(Value::as_str) else {
        return;
    };
    let Some(controller) = cache.controllers.get_mut(name) else {
        return;
    };

    let connection = get_child(entry, "connections")
        .and_then(|cs| get_child(cs, "connection"))
        .and_then(Value::as_array)
        .and_then(|conns| {
            conns.iter().find(|c| {
                get_child(c, "aux-id").and_then(Value::as_u64) == Some(0)
            })
        });
    let Some(connection) = connection else {
        return;
    };

    let config = get_child(connection, "config");
    let state = get_child(connection, "state");
    let field = |name: &str| {
        config
            .and_then(|c| get_child(c, name))
            .or_else(|| state.and_then(|s| get_child(s, name)))
    };

    if let Some(address) = field("address").and_then(Value::as_str) {
        controller.target.address = address.to_string();
    }
    if let Some(port) = field("port").and_then(Value::as_u64) {
        if let Ok(port) = u16::try_from(port) {
            controller.target.port = port;
        }
    }
    if let Some(transport) = field("transport").and_then(Value::as_str) {
        controller.target.protocol = transport.to_lowercase();
    }
    if let Some(connected) = state
        .and_then(|s| get_child(s, "connected"))
        .and_then(Value::as_bool)
    {
        controller.connected = connected;
    }
}

fn overwrite_interface(cache: &mut ObjectCache, entry: &Value) {
    let Some(name) = get_child(entry, "name").and_then(Value::as_str) else {
        return;
    };
    let Some(interface) = cache.interfaces.get_mut(name) else {
        return;
    };

    let config = get_child(entry, "config");
    let state = get_child(entry, "state");

    let mtu = config
        .and_then(|c| get_child(c, "mtu"))
        .or_else(|| state.and_then(|s| get_child(s, "mtu")))
        .and_then(Value::as_u64);
    if let Some(mtu) = mtu {
        if let Ok(mtu) = u16::try_from(mtu) {
            interface.mtu = mtu;
        }
    }

    if let Some(admin) = state
        .and_then(|s| get_child(s, "admin-status"))
        .and_then(Value::as_str)
    {
        interface.admin_status = admin.to_lowercase();
    }
    if let Some(oper) = state
        .and_then(|s| get_child(s, "oper-status"))
        .and_then(Value::as_str)
    {
        interface.link_status = oper.to_lowercase();
    }

    if let Some(counters) = state.and_then(|s| get_child(s, "counters")) {
        let read = |field: &str| get_child(counters, field).and_then(Value::as_u64);
        if let Some(n) = read("in-pkts") {
            interface.counters.received_packets = n;
        }
        if let Some(n) = read("in-errors") {
            interface.counters.received_errors = n;
        }
        if let Some(n) = read("in-discards") {
            interface.counters.received_dropped = n;
        }
        if let Some(n) = read("out-pkts") {
            interface.counters.transmitted_packets = n;
        }
        if let Some(n) = read("out-errors") {
            interface.counters.transmitted_errors = n;
        }
        if let Some(n) = read("out-discards") {
            interface.counters.transmitted_dropped = n;
        }
    }
}
