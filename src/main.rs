use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use netarch_engine::Tutor;
use netarch_llm::{CompletionClient, OpenAiCompatProvider, ProviderConfig};
use netarch_server::{HandlerState, ServerConfig};
use netarch_settings::NetarchSettings;
use netarch_store::Database;
use netarch_telemetry::{init_telemetry, TelemetryConfig};

/// NetArchitect: an AI tutor for hands-on networking practice.
#[derive(Debug, Parser)]
#[command(name = "netarch", version)]
struct Args {
    /// Settings file (defaults to ~/.netarch/settings.json or $NETARCH_SETTINGS).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the conversation database path.
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = match &args.settings {
        Some(path) => netarch_settings::load_settings_from_path(path),
        None => netarch_settings::load_settings(),
    }
    .context("loading settings")?;

    let telemetry = Arc::new(init_telemetry(telemetry_config(&settings)));

    // Bad credentials stop startup before anything is served.
    let completion = match settings.completion.validate() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "completion settings are invalid");
            anyhow::bail!("{e}");
        }
    };

    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.storage.db_path));
    let db = Database::open(&db_path)
        .with_context(|| format!("opening database at {}", db_path.display()))?;

    let mut provider_config =
        ProviderConfig::new(completion.api_key, completion.base_url, completion.model);
    provider_config.connect_timeout = completion.connect_timeout;
    provider_config.idle_timeout = completion.idle_timeout;
    let provider = OpenAiCompatProvider::new(provider_config).context("building completion client")?;
    let client = CompletionClient::new(Arc::new(provider))
        .with_diagnose_temperature(completion.diagnose_temperature);

    let tutor = Arc::new(Tutor::new(db.clone(), client));
    let handler_state = Arc::new(HandlerState::new(db, tutor).with_telemetry(telemetry));

    let config = ServerConfig {
        host: settings.server.host.clone(),
        port: args.port.unwrap_or(settings.server.port),
        request_timeout: Duration::from_millis(settings.server.request_timeout_ms),
        session_idle_timeout: Duration::from_millis(settings.server.session_idle_timeout_ms),
    };

    let shutdown = CancellationToken::new();
    let handle = netarch_server::start(config, handler_state, shutdown.clone())
        .await
        .context("starting server")?;
    tracing::info!(addr = %handle.addr, "NetArchitect ready");

    tokio::signal::ctrl_c().await.context("listening for ctrl+c")?;
    tracing::info!("shutting down");
    shutdown.cancel();
    handle.join().await;
    Ok(())
}

fn telemetry_config(settings: &NetarchSettings) -> TelemetryConfig {
    TelemetryConfig {
        log_to_sqlite: settings.logging.log_to_sqlite,
        log_db_path: PathBuf::from(&settings.logging.log_db_path),
        ..TelemetryConfig::default()
    }
    .with_level_name(&settings.logging.level)
}
