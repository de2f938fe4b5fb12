use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Aria2Method, Aria2Notification, RpcRequest, RpcResponse};
use crate::cache::{CorrelationCache, CorrelationValue};
use crate::error::BridgeError;

#[async_trait]
pub trait ResponseHandler: Send + Sync {
    async fn add_uri(&self, _request: RpcRequest, _response: RpcResponse) {}
    async fn add_torrent(&self, _request: RpcRequest, _response: RpcResponse) {}
}

#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn download_start(&self, _gid: String) {}
    async fn download_pause(&self, _gid: String) {}
    async fn download_stop(&self, _gid: String) {}
    async fn download_complete(&self, _gid: String) {}
    async fn download_error(&self, _gid: String) {}
    async fn bt_download_complete(&self, _gid: String) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    ProtocolError,
    Notification(Aria2Notification),
    IgnoredNotification,
    Response(Aria2Method),
    Unmatched,
}

pub struct RpcRouter {
    pending: Arc<CorrelationCache>,
    responses: Arc<dyn ResponseHandler>,
    notifications: Arc<dyn NotificationHandler>,
}

impl RpcRouter {
    pub fn new(
        pending: Arc<CorrelationCache>,
        responses: Arc<dyn ResponseHandler>,
        notifications: Arc<dyn NotificationHandler>,
    ) -> Self {
        Self {
            pending,
            responses,
            notifications,
        }
    }

    pub async fn route(&self, message: RpcResponse) -> RouteOutcome {
        if let Some(error) = &message.error {
            let dump = serde_json::to_string_pretty(&message)
                .unwrap_or_else(|_| format!("{message:?}"));
            let err = BridgeError::Protocol(format!("code={} message={}", error.code, error.message));
            warn!("aria2 {err}: {dump}");
            return RouteOutcome::ProtocolError;
        }

        if let Some(method) = message.notification_method() {
            return self.route_notification(method, &message).await;
        }

        self.route_response(message).await
    }

    async fn route_notification(&self, method: &str, message: &RpcResponse) -> RouteOutcome {
        let Some(kind) = Aria2Notification::from_method(method) else {
            debug!("aria2 notification ignored: {method}");
            return RouteOutcome::IgnoredNotification;
        };
        let Some(gid) = message.notification_gid().map(str::to_owned) else {
            debug!("aria2 notification {method} without gid");
            return RouteOutcome::IgnoredNotification;
        };
        let handler = &self.notifications;
        match kind {
            Aria2Notification::DownloadStart => handler.download_start(gid).await,
            Aria2Notification::DownloadPause => handler.download_pause(gid).await,
            Aria2Notification::DownloadStop => handler.download_stop(gid).await,
            Aria2Notification::DownloadComplete => handler.download_complete(gid).await,
            Aria2Notification::DownloadError => handler.download_error(gid).await,
            Aria2Notification::BtDownloadComplete => handler.bt_download_complete(gid).await,
        }
        RouteOutcome::Notification(kind)
    }

    async fn route_response(&self, message: RpcResponse) -> RouteOutcome {
        let Some(id) = message.id.clone() else {
            debug!("aria2 frame without id, method or error dropped");
            return RouteOutcome::Unmatched;
        };
        let request = match self.pending.get(&id).await {
            Some(CorrelationValue::PendingRequest(request)) => request,
            Some(other) => {
                // the key belongs to another pipeline stage; leave it where it was
                self.pending.put(id, other).await;
                return RouteOutcome::Unmatched;
            }
            None => {
                debug!("aria2 response {id} has no pending request");
                return RouteOutcome::Unmatched;
            }
        };
        let method = request.method;
        match method {
            Aria2Method::AddUri => self.responses.add_uri(request, message).await,
            Aria2Method::AddTorrent => self.responses.add_torrent(request, message).await,
        }
        RouteOutcome::Response(method)
    }
}
