mod models;
mod handlers;
mod routes;
mod docs;
mod config;
mod error;
mod db;
mod clients;
mod auth;
mod services;
mod websocket;
mod ws;

use config::Config;
use db::dbroom::DbRoom;
use db::store::{MemorySessionStore, SessionStore};
use clients::store_service_client::StoreServiceClient;
use routes::create_app;
use services::session_service::SessionService;
use tracing::{info, error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use std::panic;
use std::sync::Arc;

/// Shared state of all routes
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionService,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn SessionStore>) -> Self {
        Self {
            sessions: SessionService::new(&config, store),
            config: Arc::new(config),
        }
    }
}

/// Pick the durable backend: database, then store service, then memory
async fn init_store(config: &Config) -> Arc<dyn SessionStore> {
    if let Some(db_url) = &config.db_url {
        match DbRoom::new(db_url).await {
            Ok(db) => {
                info!("Database initialized successfully");
                return Arc::new(db);
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
            }
        }
    }

    if let Some(url) = &config.store_service_url {
        match StoreServiceClient::new(url, config.cloud_auth_jwt_secret.clone(), config.cloud_service_name.clone()) {
            Ok(client) => {
                info!("Using store service at {}", url);
                return Arc::new(client);
            }
            Err(e) => {
                error!("Failed to create store service client: {}", e);
            }
        }
    }

    warn!("No durable storage available - sessions will not survive a restart");
    Arc::new(MemorySessionStore::new())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration before tracing, it decides the default filter
    let loaded = Config::load();
    let default_filter = match &loaded {
        Ok(config) => config.log_filter(),
        Err(_) => Config::default().log_filter(),
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .init();

    info!("Starting server...");

    let config = loaded
        .inspect(|_| info!("✅ Configuration loaded successfully"))
        .unwrap_or_else(|e| {
            error!("❌ Failed to load configuration: {}", e);
            warn!("Using default configuration");
            Config::default()
        });
    info!(
        "Revision mode: {:?}, checkpoint debounce: {} ms",
        config.revision_mode, config.checkpoint_debounce_ms
    );

    let store = init_store(&config).await;
    let address = config.server_address();
    let state = AppState::new(config, store);
    let app_routes = create_app(state.clone());

    // Start the HTTP/API server
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", address));

    info!("🚀 Server running on http://{}", address);
    info!("📡 WebSocket available at ws://{}/ws", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    if let Err(e) = axum::serve(listener, app_routes)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    // Persist whatever is still dirty
    let failures = state.sessions.shutdown().await;
    if failures > 0 {
        error!("{} sessions could not be flushed before exit", failures);
    } else {
        info!("All sessions flushed, bye");
    }
}
