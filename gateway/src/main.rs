//! realmlink gateway
//!
//! Serves a directory of virtual resources over HTTP through the realm
//! network interceptor.
//!
//! Usage:
//!   realmlink-gateway --publish ./site --port 4080

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{Context, Result};
use clap::Parser;
use realmlink_gateway::{build_router, Gateway, GatewayConfig};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "realmlink-gateway")]
#[command(about = "Serve virtual resources through the realm network interceptor")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "realmlink.toml")]
    config: PathBuf,

    /// HTTP port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Origin treated as same-origin by the interceptor
    #[arg(long)]
    origin: Option<String>,

    /// Directory to publish under the prefix
    #[arg(long)]
    publish: Option<PathBuf>,

    /// Fragment injected into the head of published HTML
    #[arg(long)]
    inject: Option<String>,

    /// Format published sources
    #[arg(long)]
    format: bool,

    /// SQLite file persisting published resources
    #[arg(long)]
    database: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(origin) = &self.origin {
            config.origin = origin.clone();
        }
        if let Some(dir) = &self.publish {
            config.publish_dir = Some(dir.clone());
        }
        if let Some(inject) = &self.inject {
            config.inject = Some(inject.clone());
        }
        if self.format {
            config.format = true;
        }
        if let Some(database) = &self.database {
            config.database = Some(database.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if std::env::var_os("RUST_LOG").is_some() {
        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .compact()
            .init();
    } else {
        let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
        FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_target(false)
            .compact()
            .init();
    }

    let mut config = GatewayConfig::load_from(&args.config);
    args.apply(&mut config);

    info!("realmlink gateway starting...");
    let gateway = Gateway::start(config.clone())
        .await
        .context("Failed to start gateway realms")?;

    if let Some(dir) = &config.publish_dir {
        gateway
            .publish_dir(dir)
            .with_context(|| format!("Failed to publish {}", dir.display()))?;
    }

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP gateway listening on {}", addr);
    info!("Resources: {}{}", config.origin, config.prefix);

    let gateway = Arc::new(gateway);
    axum::serve(listener, build_router(Arc::clone(&gateway)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    gateway.shutdown().await.context("Failed to stop file server")?;
    info!("realmlink gateway stopped");
    Ok(())
}
