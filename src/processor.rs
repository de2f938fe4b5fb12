use std::sync::{Arc, Weak};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::FutureExt;
use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use crate::aria2::events::{DownloadBus, DownloadEvent, DownloadStage};
use crate::aria2::transport::Aria2Api;
use crate::aria2::RpcRequest;
use crate::bus::{BusHandler, Delivery};
use crate::cache::{CorrelationCache, CorrelationValue};
use crate::error::{BridgeError, Result};
use crate::observer::{BotCommandArgument, BotCommandObservers};
use crate::poll::{build_poll, option_text, SearchSession};
use crate::search::SearchProvider;
use crate::telegram::models::SendMessage;
use crate::telegram::ChatApi;

pub const SEARCH_COMMAND: &str = "search";
pub const BY_FILE_COMMAND: &str = "byFile";
pub const BY_MAGNET_COMMAND: &str = "byMagnet";

const SEARCH_OBSERVER: &str = "processSearch";
const DOCUMENT_OBSERVER: &str = "processDocument";
const MAGNET_OBSERVER: &str = "processMagnetLink";

const TORRENT_FILE_PATTERN: &str = r".*\.torrent$";
const LINK_SCHEMES: &[&str] = &["magnet", "http", "https", "ftp", "sftp"];

const MISSING_DOCUMENT_TEXT: &str = "Attach a .torrent file with the /byFile caption";
const WRONG_FORMAT_TEXT: &str = "Wrong file format. Pattern '.*\\.torrent$'";
const MAGNET_USAGE_TEXT: &str =
    "Usage: /byMagnet <link>. Supported links: magnet, http, https, ftp, sftp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    AwaitingAccept,
    AwaitingStart,
    AwaitingCompletion,
}

pub struct CommandProcessor {
    chat: Arc<dyn ChatApi>,
    aria: Arc<dyn Aria2Api>,
    search: Arc<dyn SearchProvider>,
    contexts: Arc<CorrelationCache>,
    bus: Arc<DownloadBus>,
    torrent_file: Regex,
    this: Weak<CommandProcessor>,
}

impl CommandProcessor {
    pub fn new(
        chat: Arc<dyn ChatApi>,
        aria: Arc<dyn Aria2Api>,
        search: Arc<dyn SearchProvider>,
        contexts: Arc<CorrelationCache>,
        bus: Arc<DownloadBus>,
    ) -> Result<Arc<Self>> {
        let torrent_file = Regex::new(TORRENT_FILE_PATTERN)
            .map_err(|err| BridgeError::Validation(format!("invalid file pattern: {err}")))?;
        Ok(Arc::new_cyclic(|this| Self {
            chat,
            aria,
            search,
            contexts,
            bus,
            torrent_file,
            this: this.clone(),
        }))
    }

    pub async fn register(self: &Arc<Self>, observers: &BotCommandObservers) {
        let processor = self.clone();
        observers
            .register(
                Arc::new(move |argument: BotCommandArgument| {
                    let processor = processor.clone();
                    async move { processor.process_search(argument).await }.boxed()
                }),
                SEARCH_OBSERVER,
            )
            .await;

        let processor = self.clone();
        observers
            .register(
                Arc::new(move |argument: BotCommandArgument| {
                    let processor = processor.clone();
                    async move { processor.process_document(argument).await }.boxed()
                }),
                DOCUMENT_OBSERVER,
            )
            .await;

        let processor = self.clone();
        observers
            .register(
                Arc::new(move |argument: BotCommandArgument| {
                    let processor = processor.clone();
                    async move { processor.process_magnet_link(argument).await }.boxed()
                }),
                MAGNET_OBSERVER,
            )
            .await;
    }

    pub async fn unregister(&self, observers: &BotCommandObservers) {
        for observer_id in [SEARCH_OBSERVER, DOCUMENT_OBSERVER, MAGNET_OBSERVER] {
            observers.unregister(observer_id).await;
        }
    }

    pub async fn process_search(&self, argument: BotCommandArgument) {
        if argument.command != SEARCH_COMMAND {
            return;
        }
        let results = match self.search.search(&argument.argument).await {
            Ok(results) => results,
            Err(BridgeError::Search(message)) => {
                self.reply(&argument, message).await;
                return;
            }
            Err(err) => {
                warn!("search '{}' failed: {err}", argument.argument);
                return;
            }
        };
        match results.as_slice() {
            [] => {
                self.reply(&argument, format!("Nothing found for '{}'", argument.argument))
                    .await
            }
            [only] => self.reply(&argument, option_text(only)).await,
            _ => {
                let session = SearchSession {
                    chat_id: argument.chat_id,
                    message_id: argument.message_id,
                    results,
                    page: 1,
                };
                if let Err(err) = send_search_page(self.chat.as_ref(), &self.contexts, session).await
                {
                    warn!("telegram sendPoll failed: {err}");
                }
            }
        }
    }

    pub async fn process_document(&self, argument: BotCommandArgument) {
        if argument.command != BY_FILE_COMMAND {
            return;
        }
        let Some(document) = argument
            .update
            .message
            .as_ref()
            .and_then(|message| message.document.clone())
        else {
            self.reply(&argument, MISSING_DOCUMENT_TEXT).await;
            return;
        };
        let file_name = document.file_name.as_deref().unwrap_or_default();
        if !self.torrent_file.is_match(file_name) {
            self.reply(&argument, WRONG_FORMAT_TEXT).await;
            return;
        }

        let torrent = match self.fetch_document(&document.file_id).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("torrent download for {file_name} failed: {err}");
                return;
            }
        };
        let request = RpcRequest::add_torrent(STANDARD.encode(torrent));
        if let Err(err) = self.submit(argument, request).await {
            warn!("aria2 addTorrent for {file_name} failed: {err}");
        }
    }

    pub async fn process_magnet_link(&self, argument: BotCommandArgument) {
        if argument.command != BY_MAGNET_COMMAND {
            return;
        }
        let link = argument.argument.trim().to_owned();
        if !is_supported_link(&link) {
            self.reply(&argument, MAGNET_USAGE_TEXT).await;
            return;
        }
        if let Err(err) = self.submit(argument, RpcRequest::add_uri(&link)).await {
            warn!("aria2 addUri failed: {err}");
        }
    }

    async fn fetch_document(&self, file_id: &str) -> Result<Vec<u8>> {
        let file = self.chat.get_file(file_id).await?;
        let path = file.file_path.ok_or_else(|| BridgeError::Api {
            method: "getFile".to_owned(),
            description: format!("file {file_id} has no download path"),
        })?;
        self.chat.download_file(&path).await
    }

    // Parks the chat context and subscribes before the request is written, so
    // a fast response always finds its subscriber.
    async fn submit(&self, argument: BotCommandArgument, request: RpcRequest) -> Result<()> {
        let request_id = request.id.clone();
        self.contexts
            .put(
                request_id.clone(),
                CorrelationValue::PendingCommand(argument),
            )
            .await;
        let subscription = self
            .bus
            .subscribe(&request_id, self.stage_handler(Stage::AwaitingAccept))
            .await;

        if let Err(err) = self.aria.submit(request).await {
            self.bus.unsubscribe(&request_id, subscription).await;
            self.contexts.get(&request_id).await;
            return Err(err);
        }
        debug!(
            "aria2 request {request_id} awaiting response subscribers={}",
            self.bus.subscriber_count(&request_id).await
        );
        Ok(())
    }

    fn stage_handler(&self, stage: Stage) -> BusHandler<DownloadEvent> {
        let processor = self.this.clone();
        Arc::new(move |delivery: Delivery<DownloadEvent>| {
            let processor = processor.clone();
            async move {
                let Some(processor) = processor.upgrade() else {
                    return;
                };
                match stage {
                    Stage::AwaitingAccept => processor.on_accepted(delivery).await,
                    Stage::AwaitingStart => processor.on_started(delivery).await,
                    Stage::AwaitingCompletion => processor.on_completed(delivery).await,
                }
            }
            .boxed()
        })
    }

    async fn on_accepted(&self, delivery: Delivery<DownloadEvent>) {
        let DownloadEvent::Accepted { request, response } = &delivery.event else {
            return;
        };
        let context = self.take_context(&request.id).await;
        match (context, response.result_gid()) {
            (Some(argument), Some(gid)) => {
                info!("aria2 accepted request {} as gid {gid}", request.id);
                self.reply(&argument, format!("Aria Received. Gid: {gid}"))
                    .await;
                self.contexts
                    .put(gid, CorrelationValue::PendingCommand(argument))
                    .await;
                self.bus
                    .subscribe(gid, self.stage_handler(Stage::AwaitingStart))
                    .await;
            }
            (Some(_), None) => warn!("aria2 response {} carries no gid", request.id),
            (None, _) => debug!("no chat context for request {}", request.id),
        }
        self.bus
            .unsubscribe(&delivery.topic, delivery.subscription)
            .await;
    }

    async fn on_started(&self, delivery: Delivery<DownloadEvent>) {
        let DownloadEvent::Lifecycle { gid, stage } = &delivery.event else {
            return;
        };
        match stage {
            DownloadStage::Started => {
                if let Some(argument) = self.take_context(gid).await {
                    self.reply(&argument, format!("Download started. Gid: {gid}"))
                        .await;
                    self.contexts
                        .put(gid.clone(), CorrelationValue::PendingCommand(argument))
                        .await;
                    self.bus
                        .subscribe(gid, self.stage_handler(Stage::AwaitingCompletion))
                        .await;
                } else {
                    debug!("no chat context for started gid {gid}");
                }
                self.bus
                    .unsubscribe(&delivery.topic, delivery.subscription)
                    .await;
            }
            DownloadStage::Paused => {}
            _ => self.finish(&delivery, gid, *stage).await,
        }
    }

    async fn on_completed(&self, delivery: Delivery<DownloadEvent>) {
        let DownloadEvent::Lifecycle { gid, stage } = &delivery.event else {
            return;
        };
        match stage {
            DownloadStage::Started | DownloadStage::Paused => {}
            _ => self.finish(&delivery, gid, *stage).await,
        }
    }

    async fn finish(&self, delivery: &Delivery<DownloadEvent>, gid: &str, stage: DownloadStage) {
        let outcome = match stage {
            DownloadStage::Completed | DownloadStage::BtCompleted => "Download Completed",
            DownloadStage::Stopped => "Download stopped",
            _ => "Download failed",
        };
        match self.take_context(gid).await {
            Some(argument) => {
                info!("{outcome} gid={gid}");
                self.reply(&argument, format!("{outcome}. Gid: {gid}")).await;
            }
            None => debug!("no chat context for finished gid {gid}"),
        }
        self.bus
            .unsubscribe(&delivery.topic, delivery.subscription)
            .await;
    }

    async fn take_context(&self, key: &str) -> Option<BotCommandArgument> {
        match self.contexts.get(key).await? {
            CorrelationValue::PendingCommand(argument) => Some(argument),
            other => {
                self.contexts.put(key, other).await;
                None
            }
        }
    }

    async fn reply(&self, argument: &BotCommandArgument, text: impl Into<String>) {
        let message = SendMessage::reply(argument.chat_id, argument.message_id, text);
        if let Err(err) = self.chat.send_message(&message).await {
            warn!("telegram sendMessage failed: {err}");
        }
    }
}

// Sends one page of search results. The poll id keys the session so a
// "Next page" answer can continue from it; a page left with a single result
// goes out as a plain message because polls need two options.
pub async fn send_search_page(
    chat: &dyn ChatApi,
    contexts: &CorrelationCache,
    session: SearchSession,
) -> Result<()> {
    let poll = build_poll(
        session.chat_id,
        session.message_id,
        session.page,
        &session.results,
    );
    if let [only] = poll.options.as_slice() {
        let message = SendMessage::reply(session.chat_id, session.message_id, only.clone());
        chat.send_message(&message).await?;
        return Ok(());
    }
    let sent = chat.send_poll(&poll).await?;
    match sent.poll {
        Some(poll) => {
            contexts
                .put(poll.id, CorrelationValue::SearchPage(session))
                .await
        }
        None => warn!("telegram sendPoll returned a message without poll"),
    }
    Ok(())
}

fn is_supported_link(link: &str) -> bool {
    Url::parse(link)
        .map(|url| LINK_SCHEMES.contains(&url.scheme()))
        .unwrap_or(false)
}
