use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::router::{NotificationHandler, ResponseHandler};
use super::{RpcRequest, RpcResponse};
use crate::bus::EventBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStage {
    Started,
    Paused,
    Stopped,
    Completed,
    BtCompleted,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Accepted {
        request: RpcRequest,
        response: RpcResponse,
    },
    Lifecycle { gid: String, stage: DownloadStage },
}

pub type DownloadBus = EventBus<DownloadEvent>;

pub struct BusPublisher {
    bus: Arc<DownloadBus>,
}

impl BusPublisher {
    pub fn new(bus: Arc<DownloadBus>) -> Self {
        Self { bus }
    }

    async fn accepted(&self, request: RpcRequest, response: RpcResponse) {
        let topic = request.id.clone();
        let delivered = self
            .bus
            .publish(&topic, DownloadEvent::Accepted { request, response })
            .await;
        debug!("aria2 response {topic} delivered to {delivered} subscribers");
    }

    async fn lifecycle(&self, gid: String, stage: DownloadStage) {
        let delivered = self
            .bus
            .publish(
                &gid,
                DownloadEvent::Lifecycle {
                    gid: gid.clone(),
                    stage,
                },
            )
            .await;
        debug!("aria2 {stage:?} for {gid} delivered to {delivered} subscribers");
    }
}

#[async_trait]
impl ResponseHandler for BusPublisher {
    async fn add_uri(&self, request: RpcRequest, response: RpcResponse) {
        self.accepted(request, response).await;
    }

    async fn add_torrent(&self, request: RpcRequest, response: RpcResponse) {
        self.accepted(request, response).await;
    }
}

#[async_trait]
impl NotificationHandler for BusPublisher {
    async fn download_start(&self, gid: String) {
        self.lifecycle(gid, DownloadStage::Started).await;
    }

    async fn download_pause(&self, gid: String) {
        self.lifecycle(gid, DownloadStage::Paused).await;
    }

    async fn download_stop(&self, gid: String) {
        self.lifecycle(gid, DownloadStage::Stopped).await;
    }

    async fn download_complete(&self, gid: String) {
        self.lifecycle(gid, DownloadStage::Completed).await;
    }

    async fn download_error(&self, gid: String) {
        self.lifecycle(gid, DownloadStage::Failed).await;
    }

    async fn bt_download_complete(&self, gid: String) {
        self.lifecycle(gid, DownloadStage::BtCompleted).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_util::FutureExt;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::{BusPublisher, DownloadBus, DownloadEvent, DownloadStage};
    use crate::aria2::router::{NotificationHandler, ResponseHandler};
    use crate::aria2::{RpcRequest, RpcResponse};
    use crate::bus::Delivery;

    #[tokio::test]
    async fn responses_publish_on_request_id_and_notifications_on_gid() {
        let bus = Arc::new(DownloadBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let request = RpcRequest::add_uri("http://example.com/a.iso");

        for topic in [request.id.as_str(), "gid1"] {
            let seen = seen.clone();
            bus.subscribe(
                topic,
                Arc::new(move |delivery: Delivery<DownloadEvent>| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().await.push((delivery.topic, delivery.event));
                    }
                    .boxed()
                }),
            )
            .await;
        }

        let publisher = BusPublisher::new(bus);
        let response = RpcResponse {
            id: Some(request.id.clone()),
            result: Some(json!("gid1")),
            ..RpcResponse::default()
        };
        publisher.add_torrent(request.clone(), response.clone()).await;
        publisher.bt_download_complete("gid1".to_owned()).await;
        publisher.download_start("other".to_owned()).await;

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, request.id);
        assert_eq!(seen[0].1, DownloadEvent::Accepted { request, response });
        assert_eq!(
            seen[1],
            (
                "gid1".to_owned(),
                DownloadEvent::Lifecycle {
                    gid: "gid1".to_owned(),
                    stage: DownloadStage::BtCompleted
                }
            )
        );
    }
}
