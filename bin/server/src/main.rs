use leadflow_ai::OpenAiInvoker;
use leadflow_core::SystemClock;
use leadflow_integration::{ActionType, RoutingDispatcher, WebhookHandler};
use leadflow_scheduler::ResumeScheduler;
use leadflow_server::actions::{CRM_ACTIONS, CrmOutboxHandler};
use leadflow_server::config::ServerConfig;
use leadflow_server::db::{PgExecutionStore, PgWorkflowStore};
use leadflow_server::error::StartupError;
use leadflow_server::routes::{self, AppState};
use leadflow_workflow::ExecutionEngine;
use rootcause::Report;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<StartupError>> {
    let config = ServerConfig::from_env().map_err(|e| StartupError::Config {
        details: e.to_string(),
    })?;
    tracing::info!("Loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| StartupError::Database {
            details: e.to_string(),
        })?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .map_err(|e| StartupError::Migration {
            details: e.to_string(),
        })?;

    let ai = OpenAiInvoker::new(config.ai).map_err(|e| StartupError::Collaborator {
        name: "ai",
        details: e.to_string(),
    })?;
    let webhook = WebhookHandler::new(&config.webhook).map_err(|e| StartupError::Collaborator {
        name: "webhook",
        details: e.to_string(),
    })?;
    let actions = RoutingDispatcher::new()
        .with_handler(ActionType::Webhook, Arc::new(webhook))
        .with_handler_for(CRM_ACTIONS, Arc::new(CrmOutboxHandler::new(db_pool.clone())));

    let executions = Arc::new(PgExecutionStore::new(db_pool.clone()));
    let engine = Arc::new(ExecutionEngine::new(
        Arc::new(PgWorkflowStore::new(db_pool)),
        executions.clone(),
        Arc::new(ai),
        Arc::new(actions),
        config.engine,
    ));

    let shutdown = CancellationToken::new();
    let scheduler = ResumeScheduler::new(
        engine.clone(),
        executions,
        Arc::new(SystemClock),
        config.scheduler,
    );
    let scheduler_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { scheduler.run(shutdown).await }
    });

    let app = routes::router(AppState { engine })
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| StartupError::Bind {
            addr: config.listen_addr.clone(),
            details: e.to_string(),
        })?;
    tracing::info!("listening on http://{}", config.listen_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    shutdown.cancel();
    if let Err(e) = scheduler_task.await {
        tracing::warn!(error = %e, "scheduler task ended abnormally");
    }

    served.map_err(|e| StartupError::Serve {
        details: e.to_string(),
    })?;
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
                shutdown.cancelled().await;
            }
        }
        () = shutdown.cancelled() => {}
    }
    tracing::info!("shutting down");
    shutdown.cancel();
}
