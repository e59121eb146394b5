use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::error_handling::HandleErrorLayer;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{BoxError, Json, Router};
use chrono::Utc;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::knowledge;
use crate::models::{AskRequest, AskResponse, GenerateEmbeddingsResponse, SourceRef};
use crate::rag::RagEngine;

pub struct AppState {
    pub engine: RagEngine,
    pub collection: String,
}

pub fn create_app(state: Arc<AppState>, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/generate-embeddings", post(generate_embeddings_handler))
        .route("/ask", post(ask_handler))
        .route("/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn handle_middleware_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        tracing::error!("Request exceeded the configured timeout");
        AppError::Timeout
    } else {
        AppError::Internal(err.to_string())
    }
}

async fn generate_embeddings_handler(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<GenerateEmbeddingsResponse>> {
    let settings = state.engine.settings();
    let chunks = knowledge::georgian_history_chunks(settings.max_chunk_chars, settings.chunk_overlap);
    tracing::info!("Loaded {} sections from Georgian history", chunks.len());

    let stored = state.engine.ingest(&chunks).await.map_err(|e| {
        tracing::error!("Failed to generate embeddings: {:#}", e);
        AppError::from(e)
    })?;

    Ok(Json(GenerateEmbeddingsResponse {
        status: "success".to_string(),
        chunks_stored: stored,
        message: format!(
            "Georgian history processed: {} chunks embedded into collection {}",
            stored, state.collection
        ),
    }))
}

async fn ask_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> AppResult<Json<AskResponse>> {
    let started = Instant::now();
    let request_id = Uuid::new_v4();

    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let question = request.question.as_deref().map(str::trim).unwrap_or_default();
    if question.is_empty() {
        return Err(AppError::Validation(
            "question is required and must be a non-empty string".to_string(),
        ));
    }

    tracing::info!(%request_id, "Answering question: {}", question);

    let result = state.engine.answer(question).await;
    let duration = started.elapsed().as_secs_f64();

    let answer = result.map_err(|e| {
        tracing::error!(%request_id, "Failed to answer question after {:.2} seconds: {:#}", duration, e);
        AppError::from(e)
    })?;

    tracing::info!(%request_id, "Answered in {:.2} seconds", duration);

    let sources = answer
        .sources
        .iter()
        .map(|source| SourceRef {
            id: source.id,
            score: source.score,
        })
        .collect();

    Ok(Json(AskResponse {
        answer: answer.answer,
        confidence: answer.confidence,
        context_chunks: answer.sources.len(),
        sources,
        duration_seconds: duration,
    }))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let vector_store_healthy = match state.engine.ping_vector_store().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Vector store health check failed: {:#}", e);
            false
        }
    };

    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "collection": state.collection,
        "services": {
            "vector_store": vector_store_healthy
        }
    }))
}
