use std::sync::Arc;

use sessionward::core::auth::{AuthApiState, AuthService, TokenIssuer, auth_api_router};
use sessionward::core::cache::{MemoryCache, RedisCache, SessionCache};
use sessionward::core::config::Config;
use sessionward::core::db::{PgCredentialDirectory, PgSessionRecords, create_pool_with_migrations};
use sessionward::core::session_store::SessionStore;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sessionward=info,tower_http=info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(?config, "Config loaded");

    let pool = match create_pool_with_migrations(&config.db).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database setup failed: {e}");
            std::process::exit(1);
        }
    };

    let cache: Arc<dyn SessionCache> = match config.store.redis_url.as_deref() {
        Some(url) => match RedisCache::connect(url).await {
            Ok(cache) => {
                tracing::info!("Session cache: redis");
                Arc::new(cache)
            }
            Err(e) => {
                tracing::error!("Redis connection failed: {e}");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("REDIS_URL not set, session cache is in-process (single instance only)");
            Arc::new(MemoryCache::new())
        }
    };

    let store = SessionStore::new(cache, Arc::new(PgSessionRecords::new(pool.clone())))
        .with_op_timeout(config.store.op_timeout);

    let auth_service = AuthService::new(
        Arc::new(PgCredentialDirectory::new(pool.clone())),
        TokenIssuer::new(config.tokens.clone()),
        store.clone(),
    );

    // Lazy cleanup of expired durable sessions
    let purge_interval = config.store.purge_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Purged expired sessions"),
                Err(e) => tracing::warn!("Session purge failed: {e}"),
            }
        }
    });

    let state = AuthApiState::new(auth_service)
        .cookie_secure(config.server.cookie_secure)
        .with_db(pool);
    let app = auth_api_router(state).layer(TraceLayer::new_for_http());

    let addr = config.server.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down");
}
