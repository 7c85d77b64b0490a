mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use nova_api::auth::{AppState, AppStateInner};
use nova_api::templates::Templates;
use nova_api::turn::TurnOrchestrator;
use nova_provider::CompletionsProvider;

use crate::config::{Config, generate_secret};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::args().skip(1).any(|a| a == "--generate-secret") {
        println!("{}", generate_secret());
        return Ok(());
    }

    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nova=debug,nova_api=debug,nova_db=info,nova_provider=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {}.", e);
            eprintln!("       Set it in your .env file and restart.");
            eprintln!("       `nova --generate-secret` prints a fresh NOVA_SECRET_KEY.");
            std::process::exit(1);
        }
    };

    // Init database
    let db = Arc::new(nova_db::Database::open(&config.db_path)?);

    let provider = CompletionsProvider::new(config.provider.clone())?;
    info!(
        model = %config.provider.model,
        url = %config.provider.base_url,
        retries = config.provider.max_retries,
        "Provider configured"
    );

    let turns = TurnOrchestrator::new(
        db.clone(),
        Arc::new(provider),
        config.context.clone(),
        config.sampling,
    );

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.secret_key.clone(),
        turns,
        templates: Templates::new()?,
        max_upload_bytes: config.max_upload_bytes,
    });

    if !config.static_dir.is_dir() {
        warn!("Static directory {} not found; /static will 404", config.static_dir.display());
    }

    let app = nova_api::router(state)
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Nova server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
