use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::collaborators::{HmacSessionStore, PostgresCredentialAuthenticator};
use crate::common::config::Config;
use crate::services::cas_service::CasService;
use crate::storage::TicketStore;
use crate::web::{router, AppState};

const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(1800);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct CasServer {
    router: Router,
    address: SocketAddr,
}

impl CasServer {
    pub async fn new(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let pool_options = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .acquire_timeout(Duration::from_secs(config.database.connection_timeout_seconds))
            .max_lifetime(DEFAULT_MAX_LIFETIME)
            .idle_timeout(DEFAULT_IDLE_TIMEOUT)
            .test_before_acquire(true);

        let database_url = config.database_url();
        info!("connecting to database");
        let pool = pool_options.connect(&database_url).await?;

        info!("running migrations");
        MIGRATOR.run(&pool).await?;

        let store = TicketStore::new(pool.clone());
        let cas_service = Arc::new(CasService::new(store, config.cas.clone()));
        let authenticator = Arc::new(PostgresCredentialAuthenticator::new(pool));
        let sessions = Arc::new(HmacSessionStore::new(&config.security));

        let state = AppState {
            cas_service,
            authenticator,
            sessions,
        };

        let router = router(state).layer(cors_layer(&config)).layer(TraceLayer::new_for_http());

        let address = format!("{}:{}", config.server.host, config.server.port).parse::<SocketAddr>()?;

        Ok(Self { router, address })
    }

    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        info!("listening on {}", self.address);
        let listener = tokio::net::TcpListener::bind(self.address).await?;
        axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins = &config.cors.allowed_origins;
    let mut layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|origin| origin == "*") {
        layer = layer.allow_origin(Any);
    } else {
        let parsed: Vec<http::HeaderValue> = origins
            .iter()
            .filter_map(|origin| http::HeaderValue::from_str(origin).ok())
            .collect();
        layer = if parsed.is_empty() {
            layer.allow_origin(Any)
        } else {
            layer.allow_origin(parsed)
        };
    }

    layer
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {err}");
    }
    info!("shutting down");
}
