//! Standalone Scrawl server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin scrawl-server
//! SCRAWL_BIND=127.0.0.1:9000 SCRAWL_MAX_ROUNDS=5 RUST_LOG=scrawl=debug cargo run --bin scrawl-server
//! ```

use std::time::Duration;

use scrawl::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn setup_logger(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("scrawl={default_level},scrawl_server={default_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Reads a numeric override, falling back (with a warning) on bad input.
fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}

#[tokio::main]
async fn main() {
    setup_logger("info");

    let bind = std::env::var("SCRAWL_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let defaults = GameConfig::default();
    let game_config = GameConfig {
        max_rounds: env_number("SCRAWL_MAX_ROUNDS", defaults.max_rounds),
        round_duration: Duration::from_secs(env_number(
            "SCRAWL_ROUND_SECS",
            defaults.round_duration.as_secs(),
        )),
        ..defaults
    };
    tracing::info!(
        %bind,
        max_rounds = game_config.max_rounds,
        round_secs = game_config.round_duration.as_secs(),
        "starting scrawl server"
    );

    let server = match ScrawlServer::builder()
        .bind(&bind)
        .game_config(game_config)
        .build()
        .await
    {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}
