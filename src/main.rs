//! Pulse server binary

use clap::Parser;
use pulse_core::{
    ApiServer, ApiServerConfig, ContextBuilder, LibsqlStorage, LlmConfig, LlmService,
    PriorityEngine, Settings, Storage,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pulse", about = "Engineering-activity radar API server")]
struct Args {
    /// Bind host (overrides API_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides API_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Database path (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pulse=info,pulse_core=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let mut settings = Settings::from_env()?;
    if let Some(host) = args.host {
        settings.api_host = host;
    }
    if let Some(port) = args.port {
        settings.api_port = port;
    }
    if let Some(database_url) = args.database_url {
        settings.database_url = database_url;
    }

    let storage: Arc<dyn Storage> =
        Arc::new(LibsqlStorage::from_path(&settings.database_url).await?);
    info!("Storage ready at {}", settings.database_url);

    let reasoning = match settings.anthropic_api_key.clone() {
        Some(api_key) if !api_key.is_empty() => {
            let service = LlmService::new(LlmConfig {
                api_key,
                model: settings.reasoning_model.clone(),
            })?;
            Some(Arc::new(service) as Arc<dyn pulse_core::ReasoningBackend>)
        }
        _ => {
            warn!("ANTHROPIC_API_KEY not set; recommendations use fallback reasoning");
            None
        }
    };

    let engine = Arc::new(PriorityEngine::new(
        ContextBuilder::new(storage.clone(), settings.local_utc_offset_hours),
        reasoning,
    ));

    let addr: SocketAddr = format!("{}:{}", settings.api_host, settings.api_port).parse()?;
    let config = ApiServerConfig {
        addr,
        cors_origin: settings.cors_origin.clone(),
    };

    ApiServer::new(config, storage, engine, Arc::new(settings))
        .serve()
        .await
}
