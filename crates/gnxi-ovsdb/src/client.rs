//! The OVSDB client: dial, monitor, typed setters, and change diffing.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use gnxi_core::{Error, Result};
use serde_json::json;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::cache::OvsdbCache;
use crate::connection::{OvsdbConnection, TlsConnection};
use crate::objects::{Interface, ObjectCache, OpenFlowController, SystemInfo};
use crate::protocol::{MonitorSelect, Operation, Row, TableUpdates};
use crate::{CONTROLLER_TABLE, DEFAULT_DATABASE, INTERFACE_TABLE, SYSTEM_TABLE};

/// Paths to the TLS material used for the southbound dial.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub key: String,
    pub cert: String,
    pub ca: String,
}

/// Shell scripts controlling the host Open vSwitch daemon.
#[derive(Debug, Clone)]
pub struct HostScripts {
    pub start: String,
    pub stop: String,
    pub restart: String,
}

impl Default for HostScripts {
    fn default() -> Self {
        Self {
            start: "start_ovs.sh".to_string(),
            stop: "stop_ovs.sh".to_string(),
            restart: "restart_ovs.sh".to_string(),
        }
    }
}

/// Produces a wire connection; swapped out for a mock in tests.
pub type ConnectionFactory = Arc<
    dyn Fn(String, u16, TlsPaths) -> BoxFuture<'static, Result<Box<dyn OvsdbConnection>>>
        + Send
        + Sync,
>;

fn default_factory() -> ConnectionFactory {
    Arc::new(|address: String, port: u16, paths: TlsPaths| {
        async move {
            let connection =
                TlsConnection::connect(&address, port, &paths.key, &paths.cert, &paths.ca).await?;
            Ok(Box::new(connection) as Box<dyn OvsdbConnection>)
        }
        .boxed()
    })
}

/// OVSDB client bound to one switch. Owns the cache and the monitor drain
/// task; fatal errors surface on the error channel handed out by [`new`].
///
/// [`new`]: OvsdbClient::new
pub struct OvsdbClient {
    address: String,
    port: u16,
    database: String,
    cache: Arc<OvsdbCache>,
    scripts: HostScripts,
    factory: ConnectionFactory,
    connection: Mutex<Option<Arc<dyn OvsdbConnection>>>,
    quit: Mutex<Option<oneshot::Sender<()>>>,
    error_tx: mpsc::UnboundedSender<Error>,
}

impl OvsdbClient {
    pub fn new(
        address: impl Into<String>,
        port: u16,
        scripts: HostScripts,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Error>) {
        Self::with_factory(address, port, scripts, default_factory())
    }

    /// Construct with an explicit connection factory (tests).
    pub fn with_factory(
        address: impl Into<String>,
        port: u16,
        scripts: HostScripts,
        factory: ConnectionFactory,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Error>) {
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            address: address.into(),
            port,
            database: DEFAULT_DATABASE.to_string(),
            cache: Arc::new(OvsdbCache::new()),
            scripts,
            factory,
            connection: Mutex::new(None),
            quit: Mutex::new(None),
            error_tx,
        });
        (client, error_rx)
    }

    pub fn cache(&self) -> &Arc<OvsdbCache> {
        &self.cache
    }

    /// Dial OVSDB, register the monitor on the three tables, seed the
    /// cache, and start the update-drain task.
    pub async fn start(&self, paths: TlsPaths) -> Result<()> {
        info!("Starting OVSDB client for {}:{}", self.address, self.port);

        let connection: Arc<dyn OvsdbConnection> =
            Arc::from((self.factory)(self.address.clone(), self.port, paths).await?);

        let (update_tx, update_rx) = mpsc::unbounded_channel();
        connection.register_notifier(update_tx);

        let initial = connection
            .monitor(
                &self.database,
                &[SYSTEM_TABLE, CONTROLLER_TABLE, INTERFACE_TABLE],
                MonitorSelect::all(),
            )
            .await?;
        self.cache.initialize(initial).await?;

        let (quit_tx, quit_rx) = oneshot::channel();
        *self.connection.lock().await = Some(connection);
        *self.quit.lock().await = Some(quit_tx);

        tokio::spawn(drain_updates(self.cache.clone(), update_rx, quit_rx));
        Ok(())
    }

    /// start() wrapper that reports failure on the error channel; spawned
    /// by the watchdog.
    pub async fn run(&self, paths: TlsPaths) {
        if let Err(e) = self.start(paths).await {
            error!("OVSDB client failed: {}", e);
            let _ = self.error_tx.send(e);
        }
    }

    /// Interrupt the update-drain task without tearing the dial down.
    pub async fn stop_monitoring(&self) {
        if let Some(quit) = self.quit.lock().await.take() {
            let _ = quit.send(());
        }
    }

    /// Idempotent shutdown: interrupt the drain task, disconnect, reset
    /// the cache.
    pub async fn stop(&self) {
        info!("Stopping OVSDB client");
        if let Some(quit) = self.quit.lock().await.take() {
            let _ = quit.send(());
        }
        if let Some(connection) = self.connection.lock().await.take() {
            connection.disconnect().await;
        }
        self.cache.reset().await;
    }

    async fn transact_checked(&self, operations: Vec<Operation>) -> Result<()> {
        let connection = self
            .connection
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::connection("ovsdb client is not connected"))?;

        let reply = connection.transact(&self.database, operations.clone()).await?;
        if reply.len() < operations.len() {
            warn!(
                "transaction returned {} replies for {} operations",
                reply.len(),
                operations.len()
            );
        }
        for result in &reply {
            if let Some(error) = &result.error {
                let details = result.details.clone().unwrap_or_default();
                return Err(Error::transaction(format!("{} ({})", error, details)));
            }
        }
        Ok(())
    }

    /// Update the System row keyed by uuid; writes the hostname.
    pub async fn set_system(&self, system: &SystemInfo) -> Result<()> {
        let mut row = Row::new();
        row.insert("hostname".to_string(), json!(system.hostname));
        self.transact_checked(vec![Operation::update(SYSTEM_TABLE, &system.uuid, row)])
            .await
            .map_err(|e| Error::ovsdb(format!("unable to set system hostname: {}", e)))
    }

    /// Update the Controller row keyed by uuid; writes the target string.
    pub async fn set_openflow_controller(&self, controller: &OpenFlowController) -> Result<()> {
        let mut row = Row::new();
        row.insert("target".to_string(), json!(controller.target.to_string()));
        self.transact_checked(vec![Operation::update(
            CONTROLLER_TABLE,
            &controller.uuid,
            row,
        )])
        .await
        .map_err(|e| Error::ovsdb(format!("unable to set openflow controller address: {}", e)))
    }

    /// Update the Interface row keyed by uuid; writes name and mtu.
    pub async fn set_interface(&self, interface: &Interface) -> Result<()> {
        let mut row = Row::new();
        row.insert("name".to_string(), json!(interface.name));
        row.insert("mtu".to_string(), json!(interface.mtu));
        self.transact_checked(vec![Operation::update(
            INTERFACE_TABLE,
            &interface.uuid,
            row,
        )])
        .await
        .map_err(|e| Error::ovsdb(format!("unable to set interface: {}", e)))
    }

    /// Diff two object caches and push the minimal set of row updates.
    /// Controllers and interfaces are paired by name; only rows whose uuid
    /// is unchanged are update candidates. The first transaction error is
    /// returned after the remaining diffs have been attempted.
    pub async fn sync_changes_to_remote(
        &self,
        prev: &ObjectCache,
        new: &ObjectCache,
    ) -> Result<()> {
        let mut first_error: Option<Error> = None;

        if prev.system.uuid == new.system.uuid && prev.system.hostname != new.system.hostname {
            debug!("syncing hostname change to remote");
            if let Err(e) = self.set_system(&new.system).await {
                first_error.get_or_insert(e);
            }
        }

        for (name, new_controller) in &new.controllers {
            let Some(prev_controller) = prev.controllers.get(name) else {
                continue;
            };
            if prev_controller.uuid == new_controller.uuid
                && prev_controller.target != new_controller.target
            {
                debug!("syncing controller \"{}\" target change to remote", name);
                if let Err(e) = self.set_openflow_controller(new_controller).await {
                    first_error.get_or_insert(e);
                }
            }
        }

        for (name, new_interface) in &new.interfaces {
            let Some(prev_interface) = prev.interfaces.get(name) else {
                continue;
            };
            if prev_interface.uuid == new_interface.uuid
                && (prev_interface.mtu != new_interface.mtu
                    || prev_interface.name != new_interface.name)
            {
                debug!("syncing interface \"{}\" change to remote", name);
                if let Err(e) = self.set_interface(new_interface).await {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn start_system(&self) -> Result<()> {
        run_script(&self.scripts.start).await
    }

    pub async fn stop_system(&self) -> Result<()> {
        run_script(&self.scripts.stop).await
    }

    pub async fn restart_system(&self) -> Result<()> {
        run_script(&self.scripts.restart).await
    }
}

async fn drain_updates(
    cache: Arc<OvsdbCache>,
    mut updates: mpsc::UnboundedReceiver<TableUpdates>,
    mut quit: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut quit => break,
            update = updates.recv() => match update {
                Some(update) => {
                    for table in update.keys() {
                        debug!("received table update for \"{}\"", table);
                    }
                    if let Err(e) = cache.sync(update).await {
                        error!("failed to sync table update into cache: {}", e);
                    }
                }
                None => break,
            },
        }
    }
    debug!("ovsdb update drain stopped");
}

async fn run_script(path: &str) -> Result<()> {
    info!("running host script {}", path);
    let status = tokio::process::Command::new("/bin/sh")
        .arg(path)
        .status()
        .await
        .map_err(|e| Error::internal(format!("failed to run {}: {}", path, e)))?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::internal(format!("{} exited with {}", path, status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::ControllerTarget;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct MockState {
        transactions: Vec<Vec<Operation>>,
        fail_with: Option<String>,
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
        ) -> Result<Vec<crate::protocol::OperationResult>> {
            let mut state = self.state.lock().unwrap();
            let count = operations.len();
            state.transactions.push(operations);
            let result = crate::protocol::OperationResult {
                error: state.fail_with.clone(),
                ..Default::default()
            };
            Ok(vec![result; count])
        }

        async fn monitor(
            &self,
            _database: &str,
            _tables: &[&str],
            _select: MonitorSelect,
        ) -> Result<TableUpdates> {
            Ok(TableUpdates::new())
        }

        fn register_notifier(&self, _notifier: mpsc::UnboundedSender<TableUpdates>) {}

        async fn disconnect(&self) {}
    }

    fn mock_client(mock: MockConnection) -> Arc<OvsdbClient> {
        let factory: ConnectionFactory = Arc::new(move |_, _, _| {
            let mock = mock.clone();
            async move { Ok(Box::new(mock) as Box<dyn OvsdbConnection>) }.boxed()
        });
        let (client, _errors) =
            OvsdbClient::with_factory("ovs.gnxi.lan", 6640, HostScripts::default(), factory);
        client
    }

    fn paths() -> TlsPaths {
        TlsPaths {
            key: "target.key".to_string(),
            cert: "target.crt".to_string(),
            ca: "ca.crt".to_string(),
        }
    }

    fn cache_with_controller(port: u16) -> ObjectCache {
        let mut cache = ObjectCache::default();
        cache.system = SystemInfo {
            uuid: "sys-uuid".to_string(),
            version: "2.9.2".to_string(),
            hostname: "target.gnxi.lan".to_string(),
        };
        cache.controllers.insert(
            "main".to_string(),
            OpenFlowController {
                uuid: "ctl-uuid".to_string(),
                name: "main".to_string(),
                connected: true,
                target: ControllerTarget {
                    protocol: "tcp".to_string(),
                    address: "172.18.0.2".to_string(),
                    port,
                },
            },
        );
        cache.interfaces.insert(
            "sw1-eth1".to_string(),
            Interface {
                uuid: "if-uuid".to_string(),
                name: "sw1-eth1".to_string(),
                mtu: 1500,
                ..Default::default()
            },
        );
        cache
    }

    #[tokio::test]
    async fn test_controller_port_change_issues_one_update() {
        let mock = MockConnection::default();
        let client = mock_client(mock.clone());
        client.start(paths()).await.unwrap();

        let prev = cache_with_controller(6653);
        let new = cache_with_controller(6654);
        client.sync_changes_to_remote(&prev, &new).await.unwrap();

        let state = mock.state.lock().unwrap();
        assert_eq!(state.transactions.len(), 1);
        let ops = &state.transactions[0];
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].table, CONTROLLER_TABLE);
        assert_eq!(
            ops[0].row.as_ref().unwrap()["target"],
            json!("tcp:172.18.0.2:6654")
        );
    }

    #[tokio::test]
    async fn test_unchanged_caches_issue_nothing() {
        let mock = MockConnection::default();
        let client = mock_client(mock.clone());
        client.start(paths()).await.unwrap();

        let prev = cache_with_controller(6653);
        let new = prev.deep_copy();
        client.sync_changes_to_remote(&prev, &new).await.unwrap();

        assert!(mock.state.lock().unwrap().transactions.is_empty());
    }

    #[tokio::test]
    async fn test_mtu_change_updates_interface() {
        let mock = MockConnection::default();
        let client = mock_client(mock.clone());
        client.start(paths()).await.unwrap();

        let prev = cache_with_controller(6653);
        let mut new = prev.deep_copy();
        new.interfaces.get_mut("sw1-eth1").unwrap().mtu = 1400;
        client.sync_changes_to_remote(&prev, &new).await.unwrap();

        let state = mock.state.lock().unwrap();
        assert_eq!(state.transactions.len(), 1);
        assert_eq!(state.transactions[0][0].table, INTERFACE_TABLE);
        assert_eq!(state.transactions[0][0].row.as_ref().unwrap()["mtu"], json!(1400));
    }

    #[tokio::test]
    async fn test_transaction_error_surfaces_as_set_failure() {
        let mock = MockConnection::default();
        mock.state.lock().unwrap().fail_with = Some("constraint violation".to_string());
        let client = mock_client(mock.clone());
        client.start(paths()).await.unwrap();

        let prev = cache_with_controller(6653);
        let new = cache_with_controller(6654);
        let err = client.sync_changes_to_remote(&prev, &new).await.unwrap_err();
        assert!(err.to_string().contains("unable to set openflow controller"));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mock = MockConnection::default();
        let client = mock_client(mock.clone());
        client.start(paths()).await.unwrap();

        client.stop().await;
        client.stop().await;
        assert!(!*client.cache().initialized().borrow());
    }
}
