use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use crate::aria2::daemon::DaemonSupervisor;
use crate::aria2::events::{BusPublisher, DownloadBus};
use crate::aria2::router::RpcRouter;
use crate::aria2::transport::WsTransport;
use crate::cache::CorrelationCache;
use crate::config::Config;
use crate::dispatcher::UpdateDispatcher;
use crate::observer::BotCommandObservers;
use crate::processor::CommandProcessor;
use crate::search::Torrentz2Search;
use crate::telegram::{ChatApi, TelegramClient};

pub struct BridgeRuntime {
    config: Config,
}

impl BridgeRuntime {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        config.bot_token()?;
        Ok(Self { config })
    }

    pub async fn run(self) -> Result<()> {
        let aria2 = &self.config.aria2;
        info!(
            "starting bridge (rpc_url={}, daemon={}, poll_timeout_s={}, offset={})",
            aria2.rpc_url,
            aria2.daemon.enabled,
            self.config.telegram.poll_timeout_secs,
            self.config.telegram.initial_offset
        );

        let daemon = if aria2.daemon.enabled {
            Some(DaemonSupervisor::spawn(aria2).await?)
        } else {
            None
        };

        let pending = Arc::new(CorrelationCache::new());
        let contexts = Arc::new(CorrelationCache::new());
        let bus = Arc::new(DownloadBus::new());
        let publisher = Arc::new(BusPublisher::new(bus.clone()));
        let router = Arc::new(RpcRouter::new(
            pending.clone(),
            publisher.clone(),
            publisher,
        ));
        let transport = Arc::new(
            WsTransport::connect(aria2, router, pending.clone())
                .await
                .with_context(|| format!("failed connecting to aria2 at {}", aria2.rpc_url))?,
        );

        let chat: Arc<dyn ChatApi> = Arc::new(
            TelegramClient::new(&self.config.telegram)
                .context("failed building telegram http client")?,
        );
        let search = Arc::new(
            Torrentz2Search::new(&self.config.search).context("failed building search client")?,
        );

        let commands = Arc::new(BotCommandObservers::new());
        let processor = CommandProcessor::new(
            chat.clone(),
            transport.clone(),
            search,
            contexts.clone(),
            bus.clone(),
        )?;
        processor.register(&commands).await;

        let dispatcher = UpdateDispatcher::new(
            chat,
            commands.clone(),
            contexts.clone(),
            self.config.telegram.poll_timeout_secs,
        )
        .await;
        let mut dispatcher_task = dispatcher.clone().spawn(self.config.telegram.initial_offset);

        tokio::select! {
            res = &mut dispatcher_task => {
                if let Err(err) = res {
                    warn!("telegram dispatcher task ended: {err}");
                }
            }
            _ = signal::ctrl_c() => {
                info!("received ctrl-c, shutting down");
            }
        }
        dispatcher_task.abort();
        let _ = dispatcher_task.await;

        info!(
            "in-flight state at shutdown: pending_requests={} chat_contexts={} bus_topics={} command_observers={}",
            pending.len().await,
            contexts.len().await,
            bus.topic_count().await,
            commands.len().await
        );
        dispatcher.detach().await;
        processor.unregister(&commands).await;

        transport.close().await;
        if let Some(daemon) = daemon {
            daemon.kill().await;
        }
        Ok(())
    }
}
