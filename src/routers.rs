use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, Method, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::models::UploadResponse;
use crate::AppState;

type ApiError = (StatusCode, Json<Value>);

#[derive(Serialize)]
pub struct Endpoints {
    pub upload: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub message: String,
    pub status: String,
    pub endpoints: Endpoints,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "Stock Analysis API is running!".to_string(),
        status: "healthy".to_string(),
        endpoints: Endpoints {
            upload: "/api/upload".to_string(),
        },
    })
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message.into() })))
}

/// Accepts a multipart `file` field and returns the analysis of it.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Malformed multipart request: {}", e);
                return Err(bad_request(format!("Malformed upload: {}", e)));
            }
        };

        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().map(str::to_owned);
        let bytes = field.bytes().await.map_err(|e| {
            tracing::warn!("Failed to read uploaded file: {}", e);
            bad_request(format!("Failed to read upload: {}", e))
        })?;
        upload = Some((file_name, bytes));
        break;
    }

    let Some((file_name, bytes)) = upload else {
        tracing::warn!("Upload request without a file");
        return Err(bad_request("No file uploaded"));
    };

    tracing::info!(
        "Analyzing upload {} ({} bytes)",
        file_name.as_deref().unwrap_or("(unnamed)"),
        bytes.len()
    );

    match state.upload.analyze_upload(file_name.as_deref(), &bytes).await {
        Ok(response) => {
            tracing::info!("Analysis completed, predictions: {}", response.analysis.has_predictions);
            Ok(Json(response))
        }
        Err(e) if e.is_client_error() => {
            tracing::warn!("Rejected upload: {}", e);
            Err(bad_request(e.to_string()))
        }
        Err(e) => {
            tracing::error!("Upload analysis failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to analyze file",
                    "details": e.to_string(),
                })),
            ))
        }
    }
}

fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    match frontend_url.and_then(|url| HeaderValue::from_str(url).ok()) {
        Some(origin) => cors.allow_origin(origin),
        None => cors.allow_origin(Any),
    }
}

pub fn create_routes(state: AppState) -> Router {
    let chart_route = format!("/{}", state.config.chart_route.trim_matches('/'));
    let charts = ServeDir::new(&state.config.chart_dir);
    let middleware = ServiceBuilder::new()
        .layer(cors_layer(state.config.frontend_url.as_deref()))
        .layer(DefaultBodyLimit::max(state.config.upload_limit()));

    Router::new()
        .route("/", get(health_check))
        .route("/api/upload", post(upload_file))
        .nest_service(&chart_route, charts)
        .layer(middleware)
        .with_state(state)
}
