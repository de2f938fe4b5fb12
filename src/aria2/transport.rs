use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::router::RpcRouter;
use super::{RpcRequest, RpcResponse};
use crate::cache::{CorrelationCache, CorrelationValue};
use crate::config::Aria2Config;
use crate::error::{BridgeError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OUTBOUND_QUEUE: usize = 64;

#[async_trait]
pub trait Aria2Api: Send + Sync {
    async fn submit(&self, request: RpcRequest) -> Result<()>;
}

pub struct WsTransport {
    out_tx: mpsc::Sender<Message>,
    pending: Arc<CorrelationCache>,
    secret: Option<String>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WsTransport {
    pub async fn connect(
        config: &Aria2Config,
        router: Arc<RpcRouter>,
        pending: Arc<CorrelationCache>,
    ) -> Result<Self> {
        let ws = connect_with_retry(
            &config.rpc_url,
            config.connect_attempts,
            Duration::from_millis(config.connect_retry_ms),
        )
        .await?;
        let (mut write, read) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
        let writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if write.send(message).await.is_err() || closing {
                    break;
                }
            }
        });
        let reader = tokio::spawn(read_loop(read, router, out_tx.clone()));

        Ok(Self {
            out_tx,
            pending,
            secret: config.secret.clone(),
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
        })
    }

    pub async fn close(&self) {
        let _ = self.out_tx.send(Message::Close(None)).await;
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(2), writer)
                .await
                .is_err()
            {
                warn!("aria2 websocket writer did not stop in time");
            }
        }
        info!("aria2 rpc transport closed");
    }
}

#[async_trait]
impl Aria2Api for WsTransport {
    async fn submit(&self, request: RpcRequest) -> Result<()> {
        let id = request.id.clone();
        let frame = request.to_wire(self.secret.as_deref()).to_string();
        debug!("aria2 submit {} id={id}", request.method.as_str());
        self.pending
            .put(id.clone(), CorrelationValue::PendingRequest(request))
            .await;
        if self.out_tx.send(Message::Text(frame)).await.is_err() {
            self.pending.get(&id).await;
            return Err(BridgeError::Closed);
        }
        Ok(())
    }
}

async fn connect_with_retry(url: &str, attempts: u32, delay: Duration) -> Result<WsStream> {
    let attempts = attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match connect_async(url).await {
            Ok((ws, _)) => {
                info!("aria2 rpc connected attempt={attempt}");
                return Ok(ws);
            }
            Err(err) => {
                debug!("aria2 rpc connect attempt {attempt}/{attempts} failed: {err}");
                last_err = Some(BridgeError::from(err));
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| BridgeError::Transport("websocket connect failed".to_owned())))
}

async fn read_loop(
    mut read: SplitStream<WsStream>,
    router: Arc<RpcRouter>,
    out_tx: mpsc::Sender<Message>,
) {
    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<RpcResponse>(&text) {
                Ok(message) => {
                    let outcome = router.route(message).await;
                    debug!("aria2 frame routed: {outcome:?}");
                }
                Err(err) => warn!("aria2 invalid JSON frame: {err}"),
            },
            Ok(Message::Ping(payload)) => {
                let _ = out_tx.try_send(Message::Pong(payload));
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(err) => {
                warn!("aria2 websocket read failed: {err}");
                break;
            }
        }
    }
    info!("aria2 websocket reader stopped");
}
