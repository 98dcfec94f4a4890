//! OVSDB wire connection: JSON-RPC over mutually-authenticated TLS.
//!
//! [`OvsdbConnection`] is the seam the rest of the crate programs against;
//! [`TlsConnection`] is the production implementation. A reader task routes
//! replies to their callers by request id and fans `update` notifications
//! into the registered notifier channel.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use gnxi_core::{Error, Result};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, error, warn};

use crate::protocol::{MonitorRequest, MonitorSelect, Operation, OperationResult, TableUpdates};

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// The opaque OVSDB wire client: transactions, monitors, and a registered
/// notifier for asynchronous table updates.
#[async_trait]
pub trait OvsdbConnection: Send + Sync {
    /// Execute a transaction against the named database.
    async fn transact(
        &self,
        database: &str,
        operations: Vec<Operation>,
    ) -> Result<Vec<OperationResult>>;

    /// Register a monitor on the given tables and return the initial state.
    async fn monitor(
        &self,
        database: &str,
        tables: &[&str],
        select: MonitorSelect,
    ) -> Result<TableUpdates>;

    /// Register the channel that receives `update` notifications.
    fn register_notifier(&self, notifier: mpsc::UnboundedSender<TableUpdates>);

    /// Tear the connection down.
    async fn disconnect(&self);
}

type Writer = Arc<Mutex<WriteHalf<TlsStream<TcpStream>>>>;
type Pending = Arc<StdMutex<HashMap<u64, oneshot::Sender<Value>>>>;
type Notifier = Arc<StdMutex<Option<mpsc::UnboundedSender<TableUpdates>>>>;

/// JSON-RPC over TLS against ovsdb-server.
pub struct TlsConnection {
    writer: Writer,
    pending: Pending,
    notifier: Notifier,
    next_id: AtomicU64,
    reader: StdMutex<Option<JoinHandle<()>>>,
    timeout: Duration,
}

impl TlsConnection {
    /// Dial ovsdb-server presenting the given client certificate.
    pub async fn connect(
        address: &str,
        port: u16,
        key_path: &str,
        cert_path: &str,
        ca_path: &str,
    ) -> Result<Self> {
        let config = client_tls_config(key_path, cert_path, ca_path)?;
        let connector = TlsConnector::from(Arc::new(config));

        let tcp = TcpStream::connect((address, port))
            .await
            .map_err(|e| Error::connection(format!("failed to dial {}:{}: {}", address, port, e)))?;
        let server_name = rustls::pki_types::ServerName::try_from(address.to_string())
            .map_err(|e| Error::connection(format!("invalid server name {}: {}", address, e)))?;
        let stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::connection(format!("TLS handshake with {} failed: {}", address, e)))?;

        let (read_half, write_half) = tokio::io::split(stream);
        let writer: Writer = Arc::new(Mutex::new(write_half));
        let pending: Pending = Arc::new(StdMutex::new(HashMap::new()));
        let notifier: Notifier = Arc::new(StdMutex::new(None));

        let reader = tokio::spawn(read_loop(
            read_half,
            writer.clone(),
            pending.clone(),
            notifier.clone(),
        ));

        Ok(Self {
            writer,
            pending,
            notifier,
            next_id: AtomicU64::new(0),
            reader: StdMutex::new(Some(reader)),
            timeout: RPC_TIMEOUT,
        })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let request = json!({"method": method, "params": params, "id": id});
        let payload = serde_json::to_vec(&request)?;
        debug!("ovsdb request: {}", request);

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.write_all(&payload).await {
                self.pending.lock().unwrap().remove(&id);
                return Err(Error::connection(format!("ovsdb write failed: {}", e)));
            }
        }

        let reply = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                return Err(Error::connection("ovsdb connection closed"));
            }
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                return Err(Error::Timeout(format!("ovsdb {} call timed out", method)));
            }
        };

        if let Some(err) = reply.get("error") {
            if !err.is_null() {
                return Err(Error::ovsdb(err.to_string()));
            }
        }
        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl OvsdbConnection for TlsConnection {
    async fn transact(
        &self,
        database: &str,
        operations: Vec<Operation>,
    ) -> Result<Vec<OperationResult>> {
        let mut params = vec![json!(database)];
        for op in &operations {
            params.push(serde_json::to_value(op)?);
        }
        let result = self.rpc_call("transact", Value::Array(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn monitor(
        &self,
        database: &str,
        tables: &[&str],
        select: MonitorSelect,
    ) -> Result<TableUpdates> {
        let mut requests = Map::new();
        for table in tables {
            requests.insert(
                table.to_string(),
                serde_json::to_value(MonitorRequest { columns: Vec::new(), select })?,
            );
        }
        let result = self
            .rpc_call("monitor", json!([database, Value::Null, requests]))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    fn register_notifier(&self, notifier: mpsc::UnboundedSender<TableUpdates>) {
        *self.notifier.lock().unwrap() = Some(notifier);
    }

    async fn disconnect(&self) {
        if let Some(reader) = self.reader.lock().unwrap().take() {
            reader.abort();
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        self.pending.lock().unwrap().clear();
    }
}

async fn read_loop(
    mut read_half: ReadHalf<TlsStream<TcpStream>>,
    writer: Writer,
    pending: Pending,
    notifier: Notifier,
) {
    let mut buf: Vec<u8> = Vec::with_capacity(16 * 1024);
    let mut chunk = [0u8; 16 * 1024];

    loop {
        let n = match read_half.read(&mut chunk).await {
            Ok(0) => {
                warn!("ovsdb connection closed by peer");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                error!("ovsdb read error: {}", e);
                break;
            }
        };
        buf.extend_from_slice(&chunk[..n]);

        // ovsdb-server concatenates JSON values with no framing; peel off
        // every complete value and keep the tail for the next read.
        let mut consumed = 0;
        {
            let mut stream = serde_json::Deserializer::from_slice(&buf).into_iter::<Value>();
            loop {
                match stream.next() {
                    Some(Ok(message)) => {
                        consumed = stream.byte_offset();
                        handle_message(message, &writer, &pending, &notifier).await;
                    }
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => {
                        error!("malformed ovsdb message: {}", e);
                        return;
                    }
                    None => break,
                }
            }
        }
        buf.drain(..consumed);
    }

    // Wake every caller still waiting on a reply.
    pending.lock().unwrap().clear();
}

async fn handle_message(message: Value, writer: &Writer, pending: &Pending, notifier: &Notifier) {
    match message.get("method").and_then(Value::as_str) {
        Some("update") => {
            let updates = message
                .get("params")
                .and_then(Value::as_array)
                .and_then(|params| params.get(1))
                .cloned()
                .and_then(|v| serde_json::from_value::<TableUpdates>(v).ok());
            match updates {
                Some(updates) => {
                    let sender = notifier.lock().unwrap().clone();
                    if let Some(sender) = sender {
                        if sender.send(updates).is_err() {
                            warn!("dropping ovsdb update: notifier closed");
                        }
                    }
                }
                None => error!("malformed ovsdb update notification"),
            }
        }
        Some("echo") => {
            let reply = json!({
                "id": message.get("id").cloned().unwrap_or(Value::Null),
                "result": message.get("params").cloned().unwrap_or_else(|| json!([])),
                "error": Value::Null,
            });
            let payload = serde_json::to_vec(&reply).unwrap_or_default();
            let mut writer = writer.lock().await;
            if let Err(e) = writer.write_all(&payload).await {
                error!("failed to answer ovsdb echo: {}", e);
            }
        }
        Some(other) => debug!("ignoring ovsdb method \"{}\"", other),
        None => {
            if let Some(id) = message.get("id").and_then(Value::as_u64) {
                let sender = pending.lock().unwrap().remove(&id);
                if let Some(sender) = sender {
                    let _ = sender.send(message);
                }
            }
        }
    }
}

fn client_tls_config(
    key_path: &str,
    cert_path: &str,
    ca_path: &str,
) -> Result<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    let ca_file = File::open(ca_path)
        .map_err(|e| Error::certificate(format!("could not read CA certificate {}: {}", ca_path, e)))?;
    for cert in rustls_pemfile::certs(&mut BufReader::new(ca_file)) {
        let cert = cert
            .map_err(|e| Error::certificate(format!("failed to parse CA certificate: {}", e)))?;
        roots
            .add(cert)
            .map_err(|e| Error::certificate(format!("failed to append CA certificate: {}", e)))?;
    }

    let cert_file = File::open(cert_path)
        .map_err(|e| Error::certificate(format!("could not read certificate {}: {}", cert_path, e)))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::certificate(format!("failed to parse certificate: {}", e)))?;

    let key_file = File::open(key_path)
        .map_err(|e| Error::certificate(format!("could not read key {}: {}", key_path, e)))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| Error::certificate(format!("failed to parse key: {}", e)))?
        .ok_or_else(|| Error::certificate(format!("no private key found in {}", key_path)))?;

    rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|e| Error::certificate(format!("could not build TLS config: {}", e)))
}
