//! mintboard sync server
//!
//! Reference backend that mintboard clients push to and pull from.
//!
//! # Configuration
//!
//! Environment variables:
//! - `MINTBOARD_PORT`: Port to listen on (default: 8080)
//! - `MINTBOARD_DATA_DIR`: Directory for collection files (default: ~/.local/share/mintboard-server)
//! - `MINTBOARD_SERVER_CONFIG`: Path to config file (default: ~/.config/mintboard-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     name: "laptop"
//! ```
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET|POST /api/{kind}`: List or create entities (auth required)
//! - `PUT|DELETE /api/{kind}/{id}`: Update or delete an entity (auth required)

use mintboard::server::{router, ApiKeyStore, AppState, EntityStorage};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    /// Port to listen on
    port: u16,
    /// Directory for collection files
    data_dir: PathBuf,
    /// Path to config file
    config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("MINTBOARD_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = std::env::var("MINTBOARD_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("mintboard-server")
            });

        let config_path = std::env::var("MINTBOARD_SERVER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("mintboard-server")
                    .join("config.yaml")
            });

        Self {
            port,
            data_dir,
            config_path,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mintboard=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Config file: {}", config.config_path.display());

    let storage = match EntityStorage::open(&config.data_dir) {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            tracing::error!("Failed to open storage: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState {
        api_keys: Arc::new(ApiKeyStore::load(&config.config_path)),
        storage,
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
