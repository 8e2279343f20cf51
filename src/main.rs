//! thriftd: contribution ledger and eligibility engine for a weekly thrift
//! savings platform.
//!
//! The daemon owns the authoritative thrift ledger, reconciles payment
//! provider webhooks into it exactly once, runs the scheduled default sweep
//! and serves the ledger/eligibility API for dashboards and admin tooling.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use thriftd::api::{create_router, AppState};
use thriftd::config::Config;
use thriftd::eligibility::EligibilityEngine;
use thriftd::ledger::Ledger;
use thriftd::referrals::ReferralTracker;
use thriftd::store::Store;
use thriftd::sweep::Sweep;
use thriftd::webhook::WebhookGateway;

#[derive(Parser)]
#[command(name = "thriftd")]
#[command(about = "Contribution ledger and eligibility engine for a thrift savings platform")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "thriftd.toml")]
    config: String,

    /// Data directory
    #[arg(short, long, env = "THRIFTD_DATA_DIR")]
    data_dir: Option<String>,

    /// HTTP API port (overrides config file)
    #[arg(long, env = "THRIFTD_HTTP_PORT")]
    http_port: Option<u16>,

    /// Webhook signing secret (overrides config file)
    #[arg(long, env = "THRIFTD_WEBHOOK_SECRET")]
    webhook_secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thriftd=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting thriftd");
    info!("Config file: {}", cli.config);

    // Load or create default config
    let mut config: Config = if std::path::Path::new(&cli.config).exists() {
        let content = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&content)?
    } else {
        info!("Config file not found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    if let Some(data_dir) = cli.data_dir {
        config.node.data_dir = PathBuf::from(data_dir);
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(secret) = cli.webhook_secret {
        config.webhook.secret = secret;
    }

    info!("Node ID: {}", config.node.id);
    info!("Data dir: {}", config.node.data_dir.display());

    // Wire up the core: store → ledger → trackers → gateway
    let store = Arc::new(Store::open(&config.node.data_dir)?);
    let ledger = Arc::new(Ledger::new(store.clone(), config.thrift.clone()));
    let referrals = Arc::new(ReferralTracker::new(store.clone()));
    let eligibility = Arc::new(EligibilityEngine::new(
        store.clone(),
        referrals.clone(),
        config.eligibility.clone(),
    ));
    let gateway = Arc::new(WebhookGateway::new(
        store.clone(),
        ledger.clone(),
        config.webhook.clone(),
    ));

    // Start the default sweep in the background
    if config.sweep.enabled {
        let sweep = Sweep::new(store.clone(), ledger.clone(), config.sweep.clone());
        tokio::spawn(sweep.run());
        info!(interval_secs = config.sweep.interval_secs, "Default sweep started");
    } else {
        info!("Default sweep is disabled");
    }

    // Serve the API
    let app = create_router(AppState {
        ledger,
        gateway,
        eligibility,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.http_port));
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
