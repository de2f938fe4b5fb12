use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tracing::{info, warn};
use url::Url;

use crate::config::{Aria2Config, DaemonConfig};

const ARIA2_DEFAULT_RPC_PORT: u16 = 6800;

pub struct DaemonSupervisor {
    child: Child,
}

impl DaemonSupervisor {
    pub async fn spawn(config: &Aria2Config) -> Result<Self> {
        let daemon = &config.daemon;
        tokio::fs::create_dir_all(&daemon.download_dir)
            .await
            .with_context(|| format!("failed creating download dir {}", daemon.download_dir))?;

        let port = rpc_port(&config.rpc_url)?;
        let args = build_args(daemon, port, config.secret.as_deref());
        let child = Command::new(&daemon.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed spawning {}", daemon.binary))?;
        info!(
            "aria2 daemon started pid={} port={port} dir={}",
            child.id().unwrap_or_default(),
            daemon.download_dir
        );
        Ok(Self { child })
    }

    pub async fn kill(mut self) {
        match self.child.kill().await {
            Ok(()) => info!("aria2 daemon stopped"),
            Err(err) => warn!("aria2 daemon kill failed: {err}"),
        }
    }
}

pub fn rpc_port(rpc_url: &str) -> Result<u16> {
    let url = Url::parse(rpc_url).with_context(|| format!("invalid aria2 rpc_url {rpc_url}"))?;
    Ok(url.port().unwrap_or(ARIA2_DEFAULT_RPC_PORT))
}

pub fn build_args(daemon: &DaemonConfig, port: u16, secret: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--enable-rpc".to_owned(),
        format!("--rpc-listen-port={port}"),
    ];
    if let Some(secret) = secret.filter(|value| !value.is_empty()) {
        args.push(format!("--rpc-secret={secret}"));
    }
    args.push(format!("--dir={}", daemon.download_dir));
    if let Some(log_file) = daemon.log_file.as_deref() {
        args.push(format!("--log={log_file}"));
    }
    args.push(format!(
        "--max-concurrent-downloads={}",
        daemon.max_concurrent_downloads
    ));
    args.push(format!(
        "--max-connection-per-server={}",
        daemon.max_connections_per_server
    ));
    args.push(format!("--log-level={}", daemon.log_level));
    args
}
