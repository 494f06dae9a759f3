mod auth;
mod error;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use verba_core::chat::ChatService;
use verba_core::config::VerbaConfig;
use verba_core::llm::LlmService;
use verba_core::storage::{self, SqliteStorage};

const DEFAULT_LOG_FILTER: &str = "verba_web=info,verba_core=info,tower_http=info";

#[derive(Parser)]
#[command(name = "verba-web", about = "Verba: chat with an AI assistant", version)]
struct Args {
    /// Extra config file layered over ~/.config/verba/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,
}

pub struct AppState {
    pub storage: SqliteStorage,
    pub chat: ChatService<SqliteStorage>,
    pub config: VerbaConfig,
}

impl AppState {
    pub fn new(storage: SqliteStorage, llm: Option<LlmService>, config: VerbaConfig) -> Self {
        let chat = ChatService::new(
            storage.clone(),
            llm,
            config.chat.clone(),
            config.uploads.clone(),
        );
        Self {
            storage,
            chat,
            config,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();

    let mut config = VerbaConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.web.host = host;
    }
    if let Some(port) = args.port {
        config.web.port = port;
    }

    let storage = storage::create_backend(&config)?;
    tracing::info!(path = %storage.path().display(), "opened database");

    // Without a client the app still serves pages; chat shows as unavailable.
    let llm = match LlmService::from_config(&config.llm) {
        Ok(llm) => {
            tracing::info!(provider = llm.provider_name(), model = llm.model(), "completion client ready");
            Some(llm)
        }
        Err(e) => {
            tracing::error!("completion client not initialized, chat disabled: {e}");
            None
        }
    };

    let addr = format!("{}:{}", config.web.host, config.web.port);
    let state = Arc::new(AppState::new(storage, llm, config));
    let app = routes::app(state);

    tracing::info!("verba-web listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
