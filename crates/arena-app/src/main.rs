//! arenabot entry point
//!
//! Run with:
//! ```bash
//! cargo run -p arena-app
//! ```
//!
//! Configuration is loaded from environment variables; the realtime
//! credential triple (`ARENA_USER_ID`, `ARENA_USERNAME`,
//! `ARENA_REALTIME_CREDENTIALS`) is required.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info, warn};

use arena_client::{GameError, GameLogic, TurnContext};
use arena_common::{try_init_tracing_with_config, AppConfig, AppResult, TracingConfig};
use arena_table::AppContext;

/// Default game logic: joins, votes, and watches, but leaves moves to a
/// human or a future engine.
struct PassiveLogic;

#[async_trait]
impl GameLogic for PassiveLogic {
    fn game_name(&self) -> &str {
        "quarto"
    }

    async fn on_turn(&self, ctx: TurnContext<'_>) -> Result<(), GameError> {
        warn!(
            table = %ctx.table,
            state = ?ctx.state.id,
            "it is our turn but no move engine is configured"
        );
        Ok(())
    }
}

/// Tracing setup derived from the loaded configuration: JSON output in
/// production, and an optional log file via `LOG_FILE`.
fn tracing_config_for(config: &AppConfig) -> TracingConfig {
    let tracing_config = if config.app.env.is_production() {
        TracingConfig::production()
    } else {
        TracingConfig::default()
    };
    match &config.app.log_file {
        Some(path) => tracing_config.with_log_file(path.clone()),
        None => tracing_config,
    }
}

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = try_init_tracing_with_config(tracing_config_for(&config)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, code = e.error_code(), "arenabot failed");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> AppResult<()> {
    info!("Starting arenabot...");
    info!(
        env = ?config.app.env,
        user_id = config.credentials.user_id,
        platform = %config.platform.base_url,
        "Configuration loaded"
    );

    let ctx = AppContext::new(config, Arc::new(PassiveLogic));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut runner = tokio::spawn(ctx.run(shutdown_rx));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Interrupt received, shutting down"),
                Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
            }
            let _ = shutdown_tx.send(true);
            match runner.await {
                Ok(result) => result?,
                Err(e) => warn!(error = %e, "Context task did not join cleanly"),
            }
        }
        result = &mut runner => {
            match result {
                Ok(result) => result?,
                Err(e) => warn!(error = %e, "Context task did not join cleanly"),
            }
        }
    }

    info!("arenabot stopped");
    Ok(())
}
