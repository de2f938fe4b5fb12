mod aria2;
mod bus;
mod cache;
mod config;
mod dispatcher;
mod error;
mod observer;
mod poll;
mod processor;
mod runtime;
mod search;
mod telegram;

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use config::Config;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Telegram bot front-end for the aria2 download daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(
        long,
        global = true,
        env = "ARIA_TG_CONFIG",
        default_value = "aria2-telegram-bridge.toml"
    )]
    config: PathBuf,

    /// Override the Telegram bot token.
    #[arg(long, global = true, env = "ARIA_TG_BOT_TOKEN", hide_env_values = true)]
    bot_token: Option<String>,

    /// Override the aria2 JSON-RPC websocket URL.
    #[arg(long, global = true, env = "ARIA_TG_RPC_URL")]
    rpc_url: Option<String>,

    /// Log level filter, e.g. info,debug,trace.
    #[arg(long, global = true, env = "ARIA_TG_LOG", default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum CliCommand {
    /// Run the bridge until interrupted.
    Run,
    /// Check configuration and local prerequisites.
    Doctor(DoctorArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct DoctorArgs {
    /// Emit doctor output as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
struct DoctorReport {
    ok: bool,
    checks: Vec<DoctorCheck>,
}

#[derive(Debug, Clone, Serialize)]
struct DoctorCheck {
    id: String,
    status: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl DoctorCheck {
    fn new(id: &str, status: &str, message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            id: id.to_owned(),
            status: status.to_owned(),
            message: message.into(),
            detail,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log)?;

    let command = cli.command.clone().unwrap_or(CliCommand::Run);
    match command {
        CliCommand::Run => run_runtime(cli).await,
        CliCommand::Doctor(args) => run_doctor(&cli, args),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut cfg = Config::load(&cli.config)?;
    cfg.apply_cli_overrides(cli.bot_token.as_deref(), cli.rpc_url.as_deref());
    Ok(cfg)
}

async fn run_runtime(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli)?;
    let runtime = runtime::BridgeRuntime::new(cfg)?;
    runtime.run().await
}

fn run_doctor(cli: &Cli, args: DoctorArgs) -> Result<()> {
    let config_result = load_config(cli).map_err(|err| format!("{err:#}"));
    let daemon_available = config_result
        .as_ref()
        .ok()
        .filter(|cfg| cfg.aria2.daemon.enabled)
        .map(|cfg| command_available(&cfg.aria2.daemon.binary));
    let report = build_doctor_report(config_result, &cli.config, daemon_available);
    print_doctor_report(&report, args.json);
    if report.ok {
        return Ok(());
    }
    Err(anyhow!("doctor reported blocking issues"))
}

/// `daemon_available` is `None` when the config does not ask for a local daemon.
fn build_doctor_report(
    config_result: std::result::Result<Config, String>,
    config_path: &Path,
    daemon_available: Option<bool>,
) -> DoctorReport {
    let mut checks = Vec::new();

    let cfg = match config_result {
        Ok(cfg) => {
            let message = if config_path.exists() {
                format!("loaded {}", config_path.display())
            } else {
                format!("{} not found, using defaults", config_path.display())
            };
            checks.push(DoctorCheck::new("config.load", "pass", message, None));
            Some(cfg)
        }
        Err(err) => {
            checks.push(DoctorCheck::new(
                "config.load",
                "fail",
                format!("failed to load {}", config_path.display()),
                Some(err),
            ));
            None
        }
    };

    if let Some(cfg) = cfg.as_ref() {
        checks.push(match cfg.validate() {
            Ok(()) => DoctorCheck::new("config.validate", "pass", "config values are valid", None),
            Err(err) => DoctorCheck::new(
                "config.validate",
                "fail",
                "config values are invalid",
                Some(format!("{err:#}")),
            ),
        });

        checks.push(match cfg.bot_token() {
            Ok(_) => DoctorCheck::new("telegram.bot_token", "pass", "bot token configured", None),
            Err(err) => DoctorCheck::new(
                "telegram.bot_token",
                "fail",
                "bot token missing",
                Some(err.to_string()),
            ),
        });

        let scheme = Url::parse(&cfg.aria2.rpc_url)
            .map(|url| url.scheme().to_owned())
            .unwrap_or_default();
        let scheme_ok = matches!(scheme.as_str(), "ws" | "wss");
        checks.push(DoctorCheck::new(
            "aria2.rpc_url",
            if scheme_ok { "pass" } else { "fail" },
            cfg.aria2.rpc_url.clone(),
            Some("websocket scheme (ws or wss) required".to_owned()),
        ));

        checks.push(DoctorCheck::new(
            "aria2.secret",
            if cfg.aria2.secret.is_some() { "pass" } else { "warn" },
            if cfg.aria2.secret.is_some() {
                "rpc secret configured"
            } else {
                "rpc secret not set"
            },
            None,
        ));
    }

    checks.push(match daemon_available {
        None => DoctorCheck::new(
            "aria2.daemon_binary",
            "pass",
            "local daemon disabled",
            None,
        ),
        Some(true) => DoctorCheck::new(
            "aria2.daemon_binary",
            "pass",
            "aria2c is available",
            None,
        ),
        Some(false) => DoctorCheck::new(
            "aria2.daemon_binary",
            "fail",
            "aria2c is not available",
            Some("install aria2 or set aria2.daemon.binary".to_owned()),
        ),
    });

    let ok = checks.iter().all(|check| check.status != "fail");
    DoctorReport { ok, checks }
}

fn print_doctor_report(report: &DoctorReport, json_output: bool) {
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(report)
                .unwrap_or_else(|_| "{\"ok\":false,\"checks\":[]}".to_owned())
        );
        return;
    }

    println!("doctor: {}", if report.ok { "ok" } else { "issues" });
    for check in &report.checks {
        let detail = check
            .detail
            .as_deref()
            .map(|value| format!(" ({value})"))
            .unwrap_or_default();
        println!(
            "[{}] {}: {}{}",
            check.status.to_uppercase(),
            check.id,
            check.message,
            detail
        );
    }
}

fn command_available(name: &str) -> bool {
    Command::new(name)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn init_logging(filter: &str) -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env)
        .with_target(false)
        .init();
    Ok(())
}
