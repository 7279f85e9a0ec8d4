//! HTTP API поверх `StressPredictor`

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{Environment, ServiceConfig, MAX_BATCH_SIZE, MAX_CONTENT_LENGTH};
use crate::models::StressPredictor;

const SERVICE_NAME: &str = "stress-detection-api";
const API_VERSION: &str = "v1";

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<StressPredictor>,
    pub environment: Environment,
}

impl AppState {
    pub fn new(predictor: Arc<StressPredictor>, environment: Environment) -> Self {
        Self {
            predictor,
            environment,
        }
    }
}

pub fn router(state: AppState, config: &ServiceConfig) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/docs", get(docs))
        .route("/api/health", get(api_health))
        .route("/api/predict", post(predict))
        .route("/api/batch-predict", post(batch_predict))
        .route("/api/features", get(features))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_CONTENT_LENGTH))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(config)),
        )
        .with_state(state)
}

fn cors_layer(config: &ServiceConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

fn error_response(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

/// Тело запроса не разобрано как JSON
fn rejection_response(rejection: JsonRejection) -> Response {
    let status = match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    };
    let message = match rejection {
        JsonRejection::MissingJsonContentType(_) => "Content-Type must be application/json".to_string(),
        other => other.body_text(),
    };
    error_response(status, json!({ "error": message }))
}

async fn index() -> Json<Value> {
    Json(json!({
        "application": "Stress Detection API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "api_health": "/api/health",
            "predict": "/api/predict (POST)",
            "batch_predict": "/api/batch-predict (POST)",
            "features": "/api/features (GET)"
        },
        "documentation": "/docs"
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.environment.to_string()
    }))
}

async fn api_health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Stress Detection API is running",
        "model_status": "loaded",
        "model_origin": state.predictor.origin(),
        "api_version": API_VERSION
    }))
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(data) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };

    let keys: Vec<&str> = data
        .as_object()
        .map(|m| m.keys().map(String::as_str).collect())
        .unwrap_or_default();
    tracing::info!("Prediction request received: {:?}", keys);

    let result = state.predictor.predict(&data);
    if let Some(error) = &result.error {
        tracing::info!("Prediction rejected: {}", error);
        return (StatusCode::BAD_REQUEST, Json(result)).into_response();
    }

    if let Some(level) = result.stress_level {
        tracing::info!("Prediction completed: {}", level);
    }
    (StatusCode::OK, Json(result)).into_response()
}

async fn batch_predict(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };

    let Some(items) = body.get("data").and_then(Value::as_array) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            json!({ "error": "Request must contain \"data\" key with a list of predictions" }),
        );
    };
    if items.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, json!({ "error": "Data list cannot be empty" }));
    }
    if items.len() > MAX_BATCH_SIZE {
        return error_response(
            StatusCode::BAD_REQUEST,
            json!({ "error": format!("Batch size limited to {} predictions", MAX_BATCH_SIZE) }),
        );
    }

    tracing::info!("Batch prediction request: {} items", items.len());
    let predictions = state.predictor.batch_predict(items);

    Json(json!({
        "count": predictions.len(),
        "predictions": predictions
    }))
    .into_response()
}

async fn features(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "features": state.predictor.feature_names(),
        "stress_classes": state.predictor.stress_classes(),
        "model_features": state.predictor.artifact().feature_names,
        "description": {
            "heart_rate": "Heart rate in beats per minute (0-200)",
            "ecg": "ECG signal normalized (0-1)",
            "emg": "EMG signal normalized (0-1)",
            "gsr": "Galvanic Skin Response normalized (0-1)",
            "resp": "Respiration signal normalized (0-1)"
        }
    }))
}

async fn docs() -> Json<Value> {
    Json(json!({
        "title": "Stress Detection API Documentation",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "API for predicting stress levels using physiological data",
        "endpoints": {
            "/health": {
                "method": "GET",
                "description": "Health check endpoint",
                "response": { "status": "healthy", "service": SERVICE_NAME }
            },
            "/api/predict": {
                "method": "POST",
                "description": "Predict stress level for single input",
                "request": {
                    "heart_rate": "number",
                    "ecg": "number",
                    "emg": "number",
                    "gsr": "number",
                    "resp": "number"
                },
                "response": {
                    "stress_level": "low|medium|high",
                    "confidence": "number (0-1)",
                    "probabilities": { "low": "number", "medium": "number", "high": "number" },
                    "features_used": "array of feature names"
                }
            },
            "/api/batch-predict": {
                "method": "POST",
                "description": format!("Predict stress levels for 1 to {} inputs", MAX_BATCH_SIZE),
                "request": { "data": "array of prediction objects" }
            },
            "/api/features": {
                "method": "GET",
                "description": "Get information about model features"
            }
        }
    }))
}

async fn not_found(uri: Uri) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        json!({
            "error": "Endpoint not found",
            "message": "Please check the API documentation at /docs",
            "path": uri.path()
        }),
    )
}

async fn method_not_allowed(method: Method, uri: Uri) -> Response {
    error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        json!({
            "error": "Method not allowed",
            "path": uri.path(),
            "method": method.as_str()
        }),
    )
}
