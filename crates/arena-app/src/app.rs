//! Application wiring.
//!
//! Builds every component from the configuration, owns the shutdown
//! channel, and runs the HTTP server plus the background tasks (cache
//! sweeper, tournament scheduler) until a termination signal arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use arena_auth::{AccountService, LnurlAuthService, RateLimiter, SessionManager};
use arena_cache::{spawn_sweeper, Cache, MemoryCache};
use arena_db::Database;
use arena_engine::scheduler::spawn_scheduler;
use arena_engine::Engine;
use arena_lightning::{CachedPriceOracle, FixedPrice, LightningBackend, LnbitsClient, PriceSource};

use crate::config::{AppConfig, Environment};
use crate::http;

pub struct App {
    pub config: AppConfig,
    pub db: Database,
    pub memory_cache: Arc<MemoryCache>,
    pub engine: Engine,
    pub sessions: Arc<SessionManager>,
    pub accounts: AccountService,
    pub lnurl_auth: LnurlAuthService,
    pub rate_limiter: RateLimiter,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl App {
    /// Build all components. Fails fast on invalid configuration.
    pub fn new(config: AppConfig) -> anyhow::Result<Arc<Self>> {
        config.validate()?;

        tracing::info!(
            environment = ?config.environment,
            database = ?config.database.path,
            "Initializing sats-arena"
        );

        let db = Database::open(&config.database.path)?;

        let memory_cache = Arc::new(MemoryCache::with_capacity(config.cache.capacity));
        if config.cache.url.is_some() {
            // The remote keyed store plugs in behind the same trait;
            // until that backend is wired the process-local cache serves
            // single-instance deployments.
            tracing::info!("cache.url configured; serving from process-local cache");
        }
        let cache: Arc<dyn Cache> = memory_cache.clone();

        let lightning: Arc<dyn LightningBackend> =
            Arc::new(LnbitsClient::new(config.lnbits_config())?);

        let price: Arc<dyn PriceSource> = if config.environment == Environment::Development
            && config.price.url.is_none()
            && config.price.fallback_usd.is_some()
        {
            // Dev with a pinned price skips the network entirely.
            Arc::new(FixedPrice(config.price.fallback_usd.unwrap_or(0.0)))
        } else {
            Arc::new(CachedPriceOracle::new(
                config.price.url.clone(),
                config.price.fallback_usd,
                Duration::from_millis(config.price.timeout_ms),
            )?)
        };

        let engine = Engine::new(
            db.clone(),
            cache.clone(),
            lightning,
            price,
            config.engine_config(),
        );

        let sessions = Arc::new(SessionManager::new(cache.clone()));
        let accounts = AccountService::new(db.clone(), sessions.clone());
        let lnurl_auth = LnurlAuthService::new(db.clone(), cache.clone(), sessions.clone());
        let rate_limiter = RateLimiter::new(cache);

        let (shutdown_tx, _) = broadcast::channel(4);

        Ok(Arc::new(Self {
            config,
            db,
            memory_cache,
            engine,
            sessions,
            accounts,
            lnurl_auth,
            rate_limiter,
            shutdown_tx,
        }))
    }

    /// Run the server and background tasks until shutdown.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let sweeper = spawn_sweeper(
            self.memory_cache.clone(),
            Duration::from_secs(self.config.cache.sweep_interval_secs),
            self.shutdown_tx.subscribe(),
        );
        let scheduler = spawn_scheduler(
            self.engine.tournaments.clone(),
            self.engine.payouts.clone(),
            self.shutdown_tx.subscribe(),
        );

        // Make sure today's tournament exists before the first request.
        self.engine.tournaments.ensure_tournament(chrono::Utc::now())?;

        let addr = format!("{}:{}", self.config.server.address, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(addr = %addr, "HTTP server listening");

        let router = http::router(self.clone());
        let shutdown_tx = self.shutdown_tx.clone();

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            wait_for_termination().await;
            tracing::info!("Termination signal received; shutting down");
            let _ = shutdown_tx.send(());
        })
        .await?;

        // Stop background loops before the process exits.
        let _ = self.shutdown_tx.send(());
        let _ = sweeper.await;
        let _ = scheduler.await;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}

async fn wait_for_termination() {
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
