//! Comet gateway entry point
//!
//! Run with:
//! ```bash
//! cargo run -p comet-gateway
//! ```
//!
//! Configuration is loaded from environment variables.

use comet_common::{try_init_tracing_with_config, AppConfig, TracingConfig};
use comet_gateway::authority::{Authority, HttpAuthority, TokenAuthority};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Gateway failed");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        env = ?config.app.env,
        tcp = ?config.tcp.bind,
        websocket = ?config.websocket.bind,
        rpc = %config.rpc.bind,
        buckets = config.bucket.size,
        "Configuration loaded"
    );

    let authority: Arc<dyn Authority> = match &config.authority.url {
        Some(url) => {
            info!(url = %url, "Using HTTP authority");
            Arc::new(HttpAuthority::new(url, config.authority.timeout())?)
        }
        None => {
            warn!("COMET_AUTHORITY_URL unset, trusting self-describing tokens");
            Arc::new(TokenAuthority::new())
        }
    };

    comet_gateway::run(config, authority).await?;
    Ok(())
}
