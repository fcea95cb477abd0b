//! The miniflow execution engine process.
//!
//! Wires the two handler loops to PostgreSQL and the NATS worker queue,
//! then runs until a termination signal arrives. Startup failures are
//! fatal with a diagnostic; once the handlers are up, runtime errors stay
//! inside their loops.

mod config;

use config::EngineConfig;
use miniflow_resolver::{ParameterResolver, PassthroughCipher, PgResolverSource};
use miniflow_scheduler::{
    InputHandler, NatsWorkerQueue, OutputHandler, PgInputScheduler, PgOutputScheduler,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let engine_config = EngineConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(engine_config.database.max_connections)
        .connect(&engine_config.database.url)
        .await
        .expect("failed to connect to database");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    tracing::info!("Connecting to worker queue...");
    let queue = Arc::new(
        NatsWorkerQueue::connect(&engine_config.queue)
            .await
            .expect("failed to connect to worker queue"),
    );

    let cipher = Arc::new(PassthroughCipher);
    let source = Arc::new(PgResolverSource::new(db_pool.clone()));
    let resolver = ParameterResolver::new(engine_config.scheduler_service.clone());

    let input_scheduler = Arc::new(PgInputScheduler::new(
        db_pool.clone(),
        resolver,
        source,
        cipher,
    ));
    let output_scheduler = Arc::new(PgOutputScheduler::new(db_pool.clone()));

    let input_handle = InputHandler::new(
        input_scheduler,
        Arc::clone(&queue),
        engine_config.input_handler.clone(),
    )
    .spawn();
    let output_handle = OutputHandler::new(
        output_scheduler,
        Arc::clone(&queue),
        engine_config.output_handler.clone(),
    )
    .spawn();

    tracing::info!("Engine running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");

    tracing::info!("Shutting down...");
    input_handle.stop().await;
    output_handle.stop().await;
    db_pool.close().await;
    tracing::info!("Engine stopped");
}
