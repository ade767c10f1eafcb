mod cli_args;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use storefront_notify::{
    default_credential_probes, default_gateway_catalog, probe_credential_formats, DeliveryEngine,
    InMemoryProductCatalog, JsonlFailureLog, NotificationService, NotifyConfig,
};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use crate::cli_args::{Cli, CliCommand};

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();
}

fn load_product_catalog(path: Option<&Path>) -> Result<InMemoryProductCatalog> {
    let Some(path) = path else {
        return Ok(InMemoryProductCatalog::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read products file {}", path.display()))?;
    InMemoryProductCatalog::from_json_str(&raw)
        .with_context(|| format!("failed to parse products file {}", path.display()))
}

fn build_engine(config: NotifyConfig) -> Result<DeliveryEngine> {
    let failure_log_path = config.failure_log_path.clone();
    let engine = DeliveryEngine::new(config, default_gateway_catalog())
        .context("failed to initialize delivery engine")?;
    match failure_log_path {
        Some(path) => {
            let log = JsonlFailureLog::open(path)?;
            info!(path = %log.path().display(), "recording failed deliveries to file");
            Ok(engine.with_failure_sink(Arc::new(log)))
        }
        None => Ok(engine),
    }
}

fn spawn_ctrl_c_cancel() -> watch::Receiver<bool> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling remaining gateway attempts");
            let _ = cancel_tx.send(true);
        } else {
            // Keep the sender alive so receivers never observe a closed channel.
            std::future::pending::<()>().await;
        }
    });
    cancel_rx
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

async fn run_cli(cli: Cli) -> Result<()> {
    let config = cli.notify_config();
    info!(
        gateway = %config.gateway_base_url,
        credential = %config.credential_hint(),
        admin_configured = config.admin_recipient().is_some(),
        fallback_enabled = config.fallback_enabled,
        "storefront notify configuration loaded"
    );
    let engine = build_engine(config)?;

    match &cli.command {
        CliCommand::ShowCatalog => {
            let base = engine.config().gateway_base_url.clone();
            for (index, entry) in engine.catalog().iter().enumerate() {
                println!(
                    "{:>2}. {:<24} {:<4} {:<4} {}",
                    index + 1,
                    entry.name,
                    entry.method.as_str(),
                    entry.body_encoding.as_str(),
                    entry.endpoint(&base)
                );
            }
            println!(
                "worst-case latency: {} ms",
                engine.worst_case_latency().as_millis()
            );
            Ok(())
        }
        CliCommand::ProbeCredentials => {
            let report = probe_credential_formats(&engine, &default_credential_probes()).await?;
            print_json(&report)?;
            if report.working_credential_param.is_none() {
                bail!("no credential format was accepted by the gateway");
            }
            Ok(())
        }
        command => {
            let Some(request) = command.notification_request() else {
                bail!("unsupported command");
            };
            let lookup = load_product_catalog(cli.products_file.as_deref())?;
            let service = NotificationService::new(engine, Arc::new(lookup));
            let report = service
                .send_notification_with_cancel(request, spawn_ctrl_c_cancel())
                .await?;
            print_json(&report)?;
            if let Some(follow_up) = report.manual_follow_up.as_deref() {
                bail!("delivery failed; manual follow-up required: {follow_up}");
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    run_cli(Cli::parse()).await
}
