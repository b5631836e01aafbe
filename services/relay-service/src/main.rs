//! Parley Relay Service
//!
//! Serves identity registration over HTTP and the presence-aware message
//! relay over WebSocket.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use parley_relay::config::{DEFAULT_STORAGE_PATH, RelayServerConfig};
use parley_relay::storage::open_database;
use parley_relay::{websocket, Relay};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

mod api;
mod error;

/// Relay service CLI arguments
#[derive(Parser, Debug)]
#[command(name = "relay-service")]
#[command(about = "Parley presence-aware message relay")]
struct Args {
    /// Host to bind both listeners to
    #[arg(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// HTTP API port
    #[arg(short, long, env = "PORT", default_value = "5000")]
    port: u16,

    /// WebSocket relay port
    #[arg(long, env = "WS_PORT", default_value = "5001")]
    ws_port: u16,

    /// Storage path
    #[arg(short, long, env = "DATABASE_PATH", default_value = DEFAULT_STORAGE_PATH)]
    storage_path: String,

    /// Comma separated list of allowed CORS origins; empty allows any
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "")]
    allowed_origins: String,

    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> RelayServerConfig {
        RelayServerConfig {
            http_address: format!("{}:{}", self.host, self.port),
            ws_address: format!("{}:{}", self.host, self.ws_port),
            storage_path: self.storage_path.clone(),
            allowed_origins: RelayServerConfig::parse_origins(&self.allowed_origins),
        }
    }
}

/// Application state
pub struct AppState {
    pub relay: Arc<Relay>,
}

fn cors(allowed_origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

    if allowed_origins.is_empty() {
        return cors.allow_any_origin();
    }
    allowed_origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = args.config();
    config.validate()?;
    let http_addr = config.http_socket_addr()?;
    let ws_addr = config.ws_socket_addr()?;

    info!("Starting Parley relay service (http {}, ws {})", http_addr, ws_addr);

    // Initialize storage
    let db = open_database(&config.storage_path)
        .with_context(|| format!("Failed to open storage at {}", config.storage_path))?;
    let relay = Arc::new(Relay::open(&db)?);

    // Start WebSocket relay
    let listener = TcpListener::bind(ws_addr)
        .await
        .with_context(|| format!("Failed to bind WebSocket listener on {}", ws_addr))?;
    let ws_relay = Arc::clone(&relay);
    tokio::spawn(async move {
        if let Err(e) = websocket::serve(listener, ws_relay).await {
            error!("WebSocket relay stopped: {}", e);
        }
    });

    let app_state = web::Data::new(AppState { relay });
    let allowed_origins = config.allowed_origins.clone();

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .wrap(cors(&allowed_origins))
            .configure(api::configure)
            .default_service(web::to(api::not_found))
    })
    .bind(http_addr)
    .with_context(|| format!("Failed to bind HTTP listener on {}", http_addr))?
    .run()
    .await?;

    db.flush_async().await?;
    info!("Relay service stopped");
    Ok(())
}
