//! gNMI RPC surface: Capabilities, Get, Set, Subscribe.

use std::pin::Pin;
use std::sync::Arc;

use futures::stream::Stream;
use gnxi_model::model::{
    append_module_names, leaf_typed_value, to_notifications, typed_value_to_scalar,
};
use gnxi_model::path::{full_path, is_root};
use gnxi_model::{Device, Model, Node, PathTarget};
use gnxi_proto::gnmi::g_nmi_server::GNmi;
use gnxi_proto::gnmi::{
    get_request, subscribe_request, subscribe_response, subscription_list, typed_value,
    update_result, CapabilityRequest, CapabilityResponse, Encoding, GetRequest, GetResponse,
    ModelData, Notification, Path, SetRequest, SetResponse, SubscribeRequest, SubscribeResponse,
    SubscriptionList, TypedValue, Update, UpdateResult,
};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info};

use super::tree::{self, SetOp};
use super::{status_from_error, Service};

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

impl Service {
    fn check_encoding_and_model(
        &self,
        encoding: i32,
        models: &[ModelData],
    ) -> std::result::Result<(), String> {
        let supported = [Encoding::Json, Encoding::JsonIetf];
        match Encoding::try_from(encoding) {
            Ok(e) if supported.contains(&e) => {}
            Ok(e) => return Err(format!("unsupported encoding: {}", e.as_str_name())),
            Err(_) => return Err(format!("unsupported encoding: {}", encoding)),
        }
        for model in models {
            if !self.model().model_data().contains(model) {
                return Err(format!("unsupported model: {:?}", model));
            }
        }
        Ok(())
    }

    async fn do_delete(
        &self,
        json_tree: &mut Map<String, Value>,
        prefix: Option<&Path>,
        path: &Path,
        current: &Device,
    ) -> std::result::Result<UpdateResult, Status> {
        let full = full_path(prefix, path);

        let path_deleted = if is_root(&full) {
            json_tree.clear();
            false
        } else {
            tree::delete_path(json_tree, self.model().schema_root(), &full.elem)
        };

        if path_deleted {
            let new_config = self
                .model()
                .new_config_struct_from_value(&Value::Object(json_tree.clone()))
                .map_err(status_from_error)?;
            self.apply_change(&new_config, current).await?;
        }

        Ok(UpdateResult {
            path: Some(path.clone()),
            op: update_result::Operation::Delete as i32,
            ..Default::default()
        })
    }

    async fn do_replace_or_update(
        &self,
        json_tree: &mut Map<String, Value>,
        op: SetOp,
        prefix: Option<&Path>,
        path: &Path,
        val: &TypedValue,
        current: &Device,
    ) -> std::result::Result<UpdateResult, Status> {
        let full = full_path(prefix, path);

        let node_val = match self.model().new_node(&full).map_err(status_from_error)? {
            PathTarget::Struct { parse } => {
                let bytes = match &val.value {
                    Some(typed_value::Value::JsonIetfVal(bytes))
                    | Some(typed_value::Value::JsonVal(bytes)) => bytes.as_slice(),
                    _ => {
                        return Err(Status::invalid_argument(
                            "expected a JSON value for a non-leaf node",
                        ))
                    }
                };
                parse(bytes).map_err(status_from_error)?
            }
            PathTarget::Leaf { .. } => typed_value_to_scalar(val).map_err(status_from_error)?,
        };

        if is_root(&full) {
            if op == SetOp::Update {
                return Err(Status::unimplemented(
                    "update the root of config tree is unsupported",
                ));
            }
            let Value::Object(body) = node_val else {
                return Err(Status::invalid_argument(
                    "expect a tree to replace the root, got a scalar value",
                ));
            };
            json_tree.clear();
            for (k, v) in body {
                json_tree.insert(k, v);
            }
        } else {
            tree::set_path(json_tree, self.model().schema_root(), &full.elem, op, node_val)
                .map_err(status_from_error)?;
        }

        let new_config = self
            .model()
            .new_config_struct_from_value(&Value::Object(json_tree.clone()))
            .map_err(status_from_error)?;
        self.apply_change(&new_config, current).await?;

        let result_op = match op {
            SetOp::Replace => update_result::Operation::Replace,
            SetOp::Update => update_result::Operation::Update,
        };
        Ok(UpdateResult {
            path: Some(path.clone()),
            op: result_op as i32,
            ..Default::default()
        })
    }
}

/// Resolve one requested path into a Notification, applying the leaf,
/// per-leaf-expansion, and IETF-JSON sub-tree rules.
pub(crate) fn notification_for_path(
    model: &Model,
    device: &Device,
    prefix: Option<&Path>,
    path: &Path,
    use_models: &[ModelData],
    encoding: Encoding,
) -> std::result::Result<Notification, Status> {
    let full = full_path(prefix, path);
    if full.elem.is_empty() && !full.element.is_empty() {
        return Err(Status::unimplemented(
            "deprecated path element type is unsupported",
        ));
    }

    let node = model.get_node(device, &full).map_err(status_from_error)?;
    let ts = now_nanos();

    match node {
        Node::Leaf { value, ty } => {
            let val = leaf_typed_value(&value, ty).map_err(status_from_error)?;
            Ok(Notification {
                timestamp: ts,
                prefix: prefix.cloned(),
                update: vec![Update {
                    path: Some(path.clone()),
                    val: Some(val),
                    ..Default::default()
                }],
                ..Default::default()
            })
        }
        Node::Subtree { value, schema } => {
            if use_models.len() != model.model_data().len() && encoding != Encoding::JsonIetf {
                let mut results =
                    to_notifications(&value, schema, ts, &full.elem).map_err(status_from_error)?;
                if results.len() != 1 {
                    return Err(Status::internal(format!(
                        "notification expansion returned {} notifications instead of one",
                        results.len()
                    )));
                }
                Ok(results.remove(0))
            } else {
                let ietf = append_module_names(&value, schema);
                let bytes = serde_json::to_vec(&ietf).map_err(|e| {
                    Status::internal(format!("error in marshaling IETF JSON tree to bytes: {}", e))
                })?;
                Ok(Notification {
                    timestamp: ts,
                    prefix: prefix.cloned(),
                    update: vec![Update {
                        path: Some(path.clone()),
                        val: Some(TypedValue {
                            value: Some(typed_value::Value::JsonIetfVal(bytes)),
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                })
            }
        }
    }
}

/// Walk every subscribed path once against the current tree and build the
/// SubscribeResponse for it.
pub(crate) async fn subscription_snapshot(
    model: Model,
    config: Arc<RwLock<Device>>,
    list: &SubscriptionList,
) -> std::result::Result<SubscribeResponse, Status> {
    let device = config.read().await.clone();
    let prefix = list.prefix.clone();
    let encoding = Encoding::try_from(list.encoding).unwrap_or(Encoding::Json);

    let mut notification: Option<Notification> = None;
    for subscription in &list.subscription {
        let path = subscription.path.clone().unwrap_or_default();
        notification = Some(notification_for_path(
            &model,
            &device,
            prefix.as_ref(),
            &path,
            &list.use_models,
            encoding,
        )?);
    }

    let update = notification
        .ok_or_else(|| Status::invalid_argument("subscription contains no paths"))?;
    Ok(SubscribeResponse {
        response: Some(subscribe_response::Response::Update(update)),
    })
}

#[tonic::async_trait]
impl GNmi for Service {
    /// Returns supported encodings and supported models.
    async fn capabilities(
        &self,
        request: Request<CapabilityRequest>,
    ) -> std::result::Result<Response<CapabilityResponse>, Status> {
        self.authorize(request.metadata(), "Capabilities")?;

        Ok(Response::new(CapabilityResponse {
            supported_models: self.model().model_data().to_vec(),
            supported_encodings: vec![Encoding::Json as i32, Encoding::JsonIetf as i32],
            gnmi_version: gnxi_proto::GNMI_SERVICE_VERSION.to_string(),
        }))
    }

    async fn get(
        &self,
        request: Request<GetRequest>,
    ) -> std::result::Result<Response<GetResponse>, Status> {
        self.authorize(request.metadata(), "Get")?;
        let req = request.into_inner();

        if req.r#type != get_request::DataType::All as i32 {
            let name = get_request::DataType::try_from(req.r#type)
                .map(|t| t.as_str_name().to_string())
                .unwrap_or_else(|_| req.r#type.to_string());
            return Err(Status::unimplemented(format!(
                "unsupported request type: {}", name
            )));
        }
        self.check_encoding_and_model(req.encoding, &req.use_models)
            .map_err(Status::unimplemented)?;

        let encoding = Encoding::try_from(req.encoding).unwrap_or(Encoding::Json);
        let device = self.current_config().await;

        let mut notifications = Vec::with_capacity(req.path.len());
        for path in &req.path {
            notifications.push(notification_for_path(
                self.model(),
                &device,
                req.prefix.as_ref(),
                path,
                &req.use_models,
                encoding,
            )?);
        }

        Ok(Response::new(GetResponse {
            notification: notifications,
            ..Default::default()
        }))
    }

    async fn set(
        &self,
        request: Request<SetRequest>,
    ) -> std::result::Result<Response<SetResponse>, Status> {
        self.authorize(request.metadata(), "Set")?;
        let req = request.into_inner();

        let mut config = self.config.write().await;

        let tree_value = self
            .model
            .to_ietf_json(&config, false)
            .map_err(status_from_error)?;
        let mut json_tree = tree_value.as_object().cloned().unwrap_or_default();

        let prefix = req.prefix.clone();
        let mut results = Vec::new();

        for path in &req.delete {
            let result = self
                .do_delete(&mut json_tree, prefix.as_ref(), path, &config)
                .await?;
            results.push(result);
        }
        for update in &req.replace {
            let path = update.path.clone().unwrap_or_default();
            let val = update.val.clone().unwrap_or_default();
            let result = self
                .do_replace_or_update(
                    &mut json_tree,
                    SetOp::Replace,
                    prefix.as_ref(),
                    &path,
                    &val,
                    &config,
                )
                .await?;
            results.push(result);
        }
        for update in &req.update {
            let path = update.path.clone().unwrap_or_default();
            let val = update.val.clone().unwrap_or_default();
            let result = self
                .do_replace_or_update(
                    &mut json_tree,
                    SetOp::Update,
                    prefix.as_ref(),
                    &path,
                    &val,
                    &config,
                )
                .await?;
            results.push(result);
        }

        let new_config = self
            .model
            .new_config_struct_from_value(&Value::Object(json_tree))
            .map_err(status_from_error)?;
        *config = new_config;
        drop(config);

        self.raise_config_update();

        Ok(Response::new(SetResponse {
            prefix: req.prefix,
            response: results,
            ..Default::default()
        }))
    }

    type SubscribeStream =
        Pin<Box<dyn Stream<Item = std::result::Result<SubscribeResponse, Status>> + Send + 'static>>;

    async fn subscribe(
        &self,
        request: Request<Streaming<SubscribeRequest>>,
    ) -> std::result::Result<Response<Self::SubscribeStream>, Status> {
        self.authorize(request.metadata(), "Subscribe")?;
        let mut inbound = request.into_inner();

        let Some(first) = inbound.message().await? else {
            // Client closed without a request.
            let stream =
                futures::stream::empty::<std::result::Result<SubscribeResponse, Status>>();
            return Ok(Response::new(Box::pin(stream)));
        };
        let Some(subscribe_request::Request::Subscribe(list)) = first.request else {
            return Err(Status::invalid_argument("request must contain a subscription"));
        };

        self.check_encoding_and_model(list.encoding, &list.use_models)
            .map_err(Status::unimplemented)?;

        let mode = subscription_list::Mode::try_from(list.mode)
            .map_err(|_| Status::unimplemented(format!("unsupported subscribe mode: {}", list.mode)))?;

        match mode {
            subscription_list::Mode::Once => {
                info!("serving subscribe ONCE");
                let response =
                    subscription_snapshot(self.model.clone(), self.config.clone(), &list).await?;
                let stream = futures::stream::iter(vec![Ok::<_, Status>(response)]);
                Ok(Response::new(Box::pin(stream)))
            }
            subscription_list::Mode::Stream => {
                info!("serving subscribe STREAM");
                let (tx, rx) = mpsc::channel(16);
                let model = self.model.clone();
                let config = self.config.clone();
                let mut updates = self.subscribe_config_updates();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            changed = updates.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                                let response =
                                    subscription_snapshot(model.clone(), config.clone(), &list)
                                        .await;
                                match response {
                                    Ok(response) => {
                                        if tx.send(Ok(response)).await.is_err() {
                                            debug!("subscribe STREAM client went away");
                                            break;
                                        }
                                    }
                                    Err(status) => {
                                        let _ = tx.send(Err(status)).await;
                                        break;
                                    }
                                }
                            }
                            _ = tx.closed() => break,
                        }
                    }
                });

                Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
            }
            subscription_list::Mode::Poll => Err(Status::unimplemented(
                "unsupported subscribe mode: POLL",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::CallbackHandler;
    use futures::FutureExt;
    use gnxi_core::{Authenticator, Error};
    use gnxi_proto::gnmi::{PathElem, Subscription};
    use serde_json::json;

    fn initial_config_json() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "openconfig-system:system": {
                "config": {"hostname": "target.gnxi.lan"},
                "openconfig-openflow:openflow": {
                    "controllers": {
                        "controller": [{
                            "name": "main",
                            "config": {"name": "main"},
                            "connections": {
                                "connection": [{
                                    "aux-id": 0,
                                    "config": {
                                        "aux-id": 0,
                                        "address": "172.18.0.2",
                                        "port": 6653,
                                        "transport": "TCP"
                                    },
                                    "state": {"connected": true}
                                }]
                            }
                        }]
                    }
                }
            },
            "openconfig-platform:components": {
                "component": [{
                    "name": "os",
                    "config": {"name": "os"},
                    "state": {
                        "type": "openconfig-platform-types:OPERATING_SYSTEM",
                        "description": "2.9.2"
                    }
                }]
            },
            "openconfig-interfaces:interfaces": {
                "interface": [{
                    "name": "sw1-eth1",
                    "config": {"name": "sw1-eth1", "mtu": 1500},
                    "state": {
                        "admin-status": "UP",
                        "oper-status": "UP",
                        "mtu": 1500,
                        "counters": {"in-pkts": 42}
                    }
                }]
            }
        }))
        .unwrap()
    }

    async fn test_service(callbacks: CallbackHandler) -> Arc<Service> {
        let dir = tempfile::tempdir().unwrap();
        Service::new(
            Authenticator::new("admin", "testpassword"),
            Model::new(),
            Arc::new(gnxi_cert::Manager::new(dir.path())),
            &initial_config_json(),
            callbacks,
            10161,
        )
        .await
        .unwrap()
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

    fn path(elems: &[(&str, Option<(&str, &str)>)]) -> Path {
        Path {
            elem: elems
                .iter()
                .map(|(name, key)| {
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

    fn hostname_path() -> Path {
        path(&[("system", None), ("config", None), ("hostname", None)])
    }

    fn port_path() -> Path {
        path(&[
            ("system", None),
            ("openflow", None),
            ("controllers", None),
            ("controller", Some(("name", "main"))),
            ("connections", None),
            ("connection", Some(("aux-id", "0"))),
            ("config", None),
            ("port", None),
        ])
    }

    fn first_value(response: &GetResponse) -> typed_value::Value {
        response.notification[0].update[0]
            .val
            .clone()
            .unwrap()
            .value
            .unwrap()
    }

    #[tokio::test]
    async fn test_capabilities_reports_encodings_and_version() {
        let service = test_service(CallbackHandler::default()).await;
        let response = service
            .capabilities(authed(CapabilityRequest::default()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(
            response.supported_encodings,
            vec![Encoding::Json as i32, Encoding::JsonIetf as i32]
        );
        assert!(!response.gnmi_version.is_empty());
        assert_eq!(response.supported_models.len(), 4);
    }

    #[tokio::test]
    async fn test_unauthenticated_request_denied() {
        let service = test_service(CallbackHandler::default()).await;
        let status = service
            .capabilities(Request::new(CapabilityRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);
    }

    #[tokio::test]
    async fn test_get_hostname_round_trip() {
        let service = test_service(CallbackHandler::default()).await;
        let request = GetRequest { path: vec![hostname_path()], ..Default::default() };
        let response = service.get(authed(request)).await.unwrap().into_inner();
        assert_eq!(
            first_value(&response),
            typed_value::Value::StringVal("target.gnxi.lan".to_string())
        );
    }

    #[tokio::test]
    async fn test_get_rejects_non_all_type() {
        let service = test_service(CallbackHandler::default()).await;
        let request = GetRequest {
            path: vec![hostname_path()],
            r#type: get_request::DataType::Config as i32,
            ..Default::default()
        };
        let status = service.get(authed(request)).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_get_rejects_unsupported_encoding() {
        let service = test_service(CallbackHandler::default()).await;
        let request = GetRequest {
            path: vec![hostname_path()],
            encoding: Encoding::Bytes as i32,
            ..Default::default()
        };
        let status = service.get(authed(request)).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_get_rejects_deprecated_element_path() {
        let service = test_service(CallbackHandler::default()).await;
        let request = GetRequest {
            path: vec![Path {
                element: vec!["system".to_string()],
                ..Default::default()
            }],
            ..Default::default()
        };
        let status = service.get(authed(request)).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_get_missing_path_not_found() {
        let service = test_service(CallbackHandler::default()).await;
        let request = GetRequest {
            path: vec![path(&[
                ("interfaces", None),
                ("interface", Some(("name", "missing"))),
            ])],
            ..Default::default()
        };
        let status = service.get(authed(request)).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn test_set_update_port_then_get() {
        let service = test_service(CallbackHandler::default()).await;

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
        assert_eq!(
            response.response[0].op,
            update_result::Operation::Update as i32
        );

        let get = GetRequest { path: vec![port_path()], ..Default::default() };
        let got = service.get(authed(get)).await.unwrap().into_inner();
        assert_eq!(first_value(&got), typed_value::Value::UintVal(6654));
    }

    #[tokio::test]
    async fn test_set_replace_then_get_returns_value() {
        let service = test_service(CallbackHandler::default()).await;
        let mtu_path = path(&[
            ("interfaces", None),
            ("interface", Some(("name", "sw1-eth1"))),
            ("config", None),
            ("mtu", None),
        ]);

        let request = SetRequest {
            replace: vec![Update {
                path: Some(mtu_path.clone()),
                val: Some(TypedValue {
                    value: Some(typed_value::Value::UintVal(1400)),
                }),
                ..Default::default()
            }],
            ..Default::default()
        };
        service.set(authed(request)).await.unwrap();

        let got = service
            .get(authed(GetRequest { path: vec![mtu_path], ..Default::default() }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(first_value(&got), typed_value::Value::UintVal(1400));
    }

    #[tokio::test]
    async fn test_set_rollback_on_apply_failure() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = calls.clone();
        let mut callbacks = CallbackHandler::default();
        callbacks.change = Some(Arc::new(move |device: Device| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(device);
                Err(Error::ovsdb("unable to set system hostname"))
            }
            .boxed()
        }));
        let service = test_service(callbacks).await;

        let request = SetRequest {
            update: vec![Update {
                path: Some(hostname_path()),
                val: Some(TypedValue {
                    value: Some(typed_value::Value::StringVal("example.lan".to_string())),
                }),
                ..Default::default()
            }],
            ..Default::default()
        };
        let status = service.set(authed(request)).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Aborted);

        // Both the apply and the rollback invoked the callback.
        assert_eq!(calls.lock().unwrap().len(), 2);

        let got = service
            .get(authed(GetRequest { path: vec![hostname_path()], ..Default::default() }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(
            first_value(&got),
            typed_value::Value::StringVal("target.gnxi.lan".to_string())
        );
    }

    #[tokio::test]
    async fn test_delete_keyed_entry_then_get_not_found() {
        let service = test_service(CallbackHandler::default()).await;
        let entry_path = path(&[
            ("interfaces", None),
            ("interface", Some(("name", "sw1-eth1"))),
        ]);

        let request = SetRequest { delete: vec![entry_path.clone()], ..Default::default() };
        let response = service.set(authed(request)).await.unwrap().into_inner();
        assert_eq!(
            response.response[0].op,
            update_result::Operation::Delete as i32
        );

        let status = service
            .get(authed(GetRequest { path: vec![entry_path], ..Default::default() }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn test_set_invalid_value_leaves_tree_unchanged() {
        let service = test_service(CallbackHandler::default()).await;
        let request = SetRequest {
            update: vec![Update {
                path: Some(path(&[
                    ("interfaces", None),
                    ("interface", Some(("name", "sw1-eth1"))),
                ])),
                val: Some(TypedValue {
                    value: Some(typed_value::Value::JsonIetfVal(
                        br#"{"config": {"name": "other-name"}}"#.to_vec(),
                    )),
                }),
                ..Default::default()
            }],
            ..Default::default()
        };
        // The body's config name conflicts with the entry key after the key
        // attributes are written back, so re-materialization fails.
        let status = service.set(authed(request)).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let got = service
            .get(authed(GetRequest { path: vec![hostname_path()], ..Default::default() }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(
            first_value(&got),
            typed_value::Value::StringVal("target.gnxi.lan".to_string())
        );
    }

    #[tokio::test]
    async fn test_subscription_snapshot_once_counters() {
        let service = test_service(CallbackHandler::default()).await;
        let list = SubscriptionList {
            subscription: vec![Subscription {
                path: Some(path(&[
                    ("interfaces", None),
                    ("interface", Some(("name", "sw1-eth1"))),
                    ("state", None),
                    ("counters", None),
                    ("in-pkts", None),
                ])),
                ..Default::default()
            }],
            mode: subscription_list::Mode::Once as i32,
            ..Default::default()
        };

        let response =
            subscription_snapshot(service.model().clone(), service.config.clone(), &list)
                .await
                .unwrap();
        let Some(subscribe_response::Response::Update(notification)) = response.response else {
            panic!("expected update response");
        };
        assert_eq!(
            notification.update[0].val.clone().unwrap().value,
            Some(typed_value::Value::UintVal(42))
        );
    }

    #[tokio::test]
    async fn test_config_update_signal_coalesces() {
        let service = test_service(CallbackHandler::default()).await;
        let mut updates = service.subscribe_config_updates();

        service.raise_config_update();
        service.raise_config_update();
        service.raise_config_update();

        // A slow subscriber observes a single pending notification.
        updates.changed().await.unwrap();
        assert!(!updates.has_changed().unwrap());
    }
}
