//! Application state wiring the pipeline, registry and storage together.
//!
//! `AppState` pins the generic core components to the concrete infra and
//! transport implementations. The background pieces that need an orderly stop
//! (event pipeline, idle-bucket sweeper) are returned separately as
//! [`ServerTasks`] so `main` can shut them down after the HTTP server exits.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use huddle_core::pipeline::{ConsumerReport, ConsumerSettings, EventPublisher, Pipeline};
use huddle_core::rate_limit::RateLimiter;
use huddle_core::registry::ConnectionRegistry;
use huddle_core::responder::KeywordResponder;
use huddle_infra::filesystem::ensure_data_dir;
use huddle_infra::sqlite::message::SqliteMessageRepository;
use huddle_infra::sqlite::pool::{DatabasePool, database_url};
use huddle_types::config::HuddleConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::http::handlers::ws::WsConnection;

pub type ConcreteRegistry = ConnectionRegistry<WsConnection>;

/// How long open sessions get to flush and close once the pipeline drained.
const SESSION_GRACE: Duration = Duration::from_secs(5);

/// Shared state handed to every HTTP and WebSocket handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<HuddleConfig>,
    pub db_pool: DatabasePool,
    pub repository: Arc<SqliteMessageRepository>,
    pub registry: Arc<ConcreteRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub publisher: EventPublisher,
    /// Fired once the pipeline has drained; open sessions close.
    pub shutdown: CancellationToken,
    /// Live WebSocket sessions, awaited during shutdown.
    pub sessions: TaskTracker,
    pub started_at: Instant,
}

/// Background work owned by a running server.
pub struct ServerTasks {
    pipeline: Pipeline,
    sweeper: JoinHandle<()>,
    shutdown: CancellationToken,
    sessions: TaskTracker,
}

impl ServerTasks {
    /// Drain the pipeline while sessions are still registered, then close
    /// the sessions and stop the sweeper.
    pub async fn shutdown(self) -> anyhow::Result<ConsumerReport> {
        let report = self.pipeline.shutdown().await;

        self.shutdown.cancel();
        self.sessions.close();
        if tokio::time::timeout(SESSION_GRACE, self.sessions.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.sessions.len(),
                "sessions still open after {SESSION_GRACE:?}"
            );
        }

        if let Err(e) = self.sweeper.await {
            tracing::warn!(error = %e, "bucket sweeper task failed");
        }
        Ok(report?)
    }
}

/// Open (creating if needed) the message database under `data_dir`.
pub async fn open_storage(
    data_dir: &Path,
) -> anyhow::Result<(DatabasePool, Arc<SqliteMessageRepository>)> {
    ensure_data_dir(data_dir).await?;
    let db_pool = DatabasePool::new(&database_url(data_dir)).await?;
    let repository = Arc::new(SqliteMessageRepository::new(db_pool.clone()));
    Ok((db_pool, repository))
}

impl AppState {
    /// Connect storage, build the registry and rate limiter, and start the
    /// event pipeline and idle-bucket sweeper.
    pub async fn init(data_dir: &Path, config: HuddleConfig) -> anyhow::Result<(Self, ServerTasks)> {
        let (db_pool, repository) = open_storage(data_dir).await?;
        let settings = ConsumerSettings::from_config(&config.assistant)?;

        let registry = Arc::new(ConcreteRegistry::new());
        let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let shutdown = CancellationToken::new();
        let sessions = TaskTracker::new();

        let pipeline = Pipeline::start(
            config.pipeline.queue_capacity,
            Arc::clone(&repository),
            Arc::new(KeywordResponder::new()),
            Arc::clone(&registry),
            settings,
        );

        let sweeper = spawn_bucket_sweeper(
            Arc::clone(&rate_limiter),
            Duration::from_secs(config.rate_limit.idle_eviction_secs),
            shutdown.clone(),
        );

        let state = Self {
            config: Arc::new(config),
            db_pool,
            repository,
            registry,
            rate_limiter,
            publisher: pipeline.publisher(),
            shutdown: shutdown.clone(),
            sessions: sessions.clone(),
            started_at: Instant::now(),
        };
        let tasks = ServerTasks {
            pipeline,
            sweeper,
            shutdown,
            sessions,
        };
        Ok((state, tasks))
    }
}

/// Periodically evict rate-limit buckets idle for longer than `max_idle`.
fn spawn_bucket_sweeper(
    limiter: Arc<RateLimiter>,
    max_idle: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let period = (max_idle / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = limiter.evict_idle(max_idle, Instant::now());
                    if evicted > 0 {
                        tracing::debug!(evicted, tracked = limiter.tracked(), "evicted idle rate-limit buckets");
                    }
                }
            }
        }
    })
}
