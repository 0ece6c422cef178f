//! HTTP front door for QuickTrain Core.
//!
//! ## Endpoints
//! - `POST /trigger-training` - Validate a training request and queue its job
//! - `GET /health` - Liveness probe

pub mod error;
mod routes;

pub use error::{ApiError, ErrorResponse};

use crate::config::Config;
use crate::error::Result;
use crate::runtime::Runtime;
use axum::{
    routing::{get, post},
    Router,
};
use quicktrain_orchestrator::JobDispatcher;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Builds the router around `dispatcher`.
pub fn create_router(dispatcher: Arc<JobDispatcher>) -> Router {
    Router::new()
        .route("/trigger-training", post(routes::trigger_training))
        .route("/health", get(routes::health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(dispatcher)
}

/// Starts the job worker and serves HTTP until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the runtime cannot be built or the server fails to bind to
/// the configured address.
pub async fn run(config: &Config) -> Result<()> {
    let mut runtime = Runtime::build(config)?;
    runtime.start()?;

    let addr = config.server.address;
    let app = create_router(runtime.dispatcher());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, backends = runtime.registry().len(), "QuickTrain server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!(pending = runtime.pending_jobs(), "Server stopped");
    runtime.stop()?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use quicktrain_orchestrator::{BackendRegistry, JobQueue, JobReceiver};
    use tower::ServiceExt;

    fn router(capacity: usize) -> (Router, JobReceiver) {
        let registry = Arc::new(BackendRegistry::builtin().unwrap());
        let (queue, receiver) = JobQueue::new(capacity);
        (create_router(Arc::new(JobDispatcher::new(registry, Arc::new(queue)))), receiver)
    }

    async fn post_json(app: Router, body: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/trigger-training")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_trigger_training_acknowledges() {
        let (app, mut receiver) = router(4);
        let (status, body) =
            post_json(app, r#"{"jobId":"j1","modelType":"EBM","trainFile":"data.csv"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Training started for job j1");
        assert_eq!(body["jobId"], "j1");
        assert_eq!(body["modelType"], "ebm");
        assert_eq!(receiver.recv().await.unwrap().job_id, "j1");
    }

    #[tokio::test]
    async fn test_trigger_training_rejects_bad_requests() {
        let (app, _receiver) = router(4);
        let (status, body) = post_json(app.clone(), r#"{"modelType":"resnet","trainFile1":"a.zip"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required field 'jobId'");

        let (status, body) = post_json(app.clone(), r#"{"jobId":"j","modelType":"svm","trainFile1":"a"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("svm"));

        let (status, body) = post_json(app, "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn test_full_queue_is_server_error() {
        let (app, _receiver) = router(1);
        let body = r#"{"jobId":"j","modelType":"ebm","trainFile1":"a.csv"}"#;
        assert_eq!(post_json(app.clone(), body).await.0, StatusCode::OK);

        let (status, body) = post_json(app, body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("queue is full"));
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _receiver) = router(1);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(serde_json::from_slice::<serde_json::Value>(&bytes).unwrap(), serde_json::json!({"status":"ok"}));
    }
}
