//! Vigil presence hub -- broadcast server for presence and ephemeral signals.
//!
//! An axum WebSocket server that binds each connection to a user identity,
//! keeps the authoritative presence store, and fans every change out to all
//! connected clients.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8080
//! cargo run --bin vigil-hub
//!
//! # Run on custom address
//! cargo run --bin vigil-hub -- --bind 127.0.0.1:9090
//!
//! # Or via environment variable
//! VIGIL_HUB_ADDR=127.0.0.1:9090 cargo run --bin vigil-hub
//! ```

use std::sync::Arc;

use clap::Parser;
use vigil_hub::config::{HubCliArgs, HubConfig};
use vigil_hub::hub::{self, HubState};

#[tokio::main]
async fn main() {
    let cli = HubCliArgs::parse();

    let config = match HubConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting vigil presence hub");

    let state = Arc::new(HubState::with_config(config.max_frame_size));

    match hub::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "hub listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "hub server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start hub server");
            std::process::exit(1);
        }
    }
}
