use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stillpoint_media::Composer;
use stillpoint_providers::script::{ScriptClient, ScriptConfig};
use stillpoint_providers::video::{VeoClient, VideoConfig};
use stillpoint_providers::voice::{VoiceClient, VoiceConfig};
use stillpoint_queue::JobQueue;
use stillpoint_storage::{BlobStore, ObjectStore, S3Config};
use stillpoint_worker::runner::{Runner, RunnerConfig};
use stillpoint_worker::{sweeper, Pipeline};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stillpoint_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = stillpoint_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    stillpoint_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    stillpoint_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Collaborators ---
    let store = ObjectStore::connect(S3Config::from_env()).await;
    store
        .health_check()
        .await
        .expect("Object storage health check failed");
    tracing::info!("Object storage ready");

    let store: Arc<dyn BlobStore> = Arc::new(store);
    let queue = JobQueue::new(pool.clone());

    let pipeline = Pipeline::new(
        pool.clone(),
        Arc::clone(&store),
        Arc::new(ScriptClient::new(ScriptConfig::from_env())),
        Arc::new(VoiceClient::new(VoiceConfig::from_env())),
        Arc::new(VeoClient::new(VideoConfig::from_env())),
        Arc::new(Composer),
    );

    // --- Background loops ---
    let cancel = CancellationToken::new();

    let requeue_handle = tokio::spawn(sweeper::run_requeue(
        pool.clone(),
        queue.clone(),
        cancel.clone(),
    ));
    let purge_handle = tokio::spawn(sweeper::run_purge(queue.clone(), cancel.clone()));

    let runner = Runner::new(pool, queue, pipeline, store, RunnerConfig::from_env());

    // --- Run until ctrl-c ---
    let runner_cancel = cancel.clone();
    tokio::select! {
        _ = runner.run(runner_cancel) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            cancel.cancel();
        }
    }

    let _ = requeue_handle.await;
    let _ = purge_handle.await;
    tracing::info!("Worker stopped");
}
