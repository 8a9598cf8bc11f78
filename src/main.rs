// Copyright 2026 The Refract Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use refract::config::{self, FileSource};
use refract::forward::{ReqwestUpstreamClient, UpstreamClient};
use refract::proxy;

use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "refract", about = "SSE re-framing forwarding proxy")]
struct Cli {
    /// Path to an optional refract.yaml config file
    #[arg(long, env = "REFRACT_CONFIG")]
    config: Option<String>,

    /// Port to listen on
    #[arg(long, default_value_t = 8080, env = "REFRACT_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    tracing::info!(%addr, "refract starting");

    let config = match cli.config {
        Some(path) => {
            let source = FileSource {
                path: std::path::PathBuf::from(path),
            };
            match config::load_config(&source) {
                Ok(c) => Arc::new(c),
                Err(e) => {
                    tracing::error!("failed to load config: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => Arc::new(config::Config::default()),
    };

    tracing::info!(
        buffered_provider = %config.buffered.provider,
        stream_provider = %config.stream.provider,
        connect_timeout_ms = ?config.upstream.connect_timeout_ms,
        read_timeout_ms = ?config.upstream.read_timeout_ms,
        "config loaded"
    );

    let upstream: Arc<dyn UpstreamClient> =
        match ReqwestUpstreamClient::from_config(&config.upstream) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                tracing::error!("failed to build upstream client: {e}");
                std::process::exit(1);
            }
        };

    let app = proxy::build_router(upstream, config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "refract listening");

    axum::serve(listener, app)
        .await
        .expect("server error");
}
