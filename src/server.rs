use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer, ExposeHeaders},
    trace::TraceLayer,
};

use crate::service::{AnalyticsService, ApiResponse, EventImpactQuery, ListQuery};
use crate::settings::Settings;

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.body)).into_response();

        if let Some(range) = self.content_range
            && let Ok(value) = HeaderValue::from_str(&range)
        {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
        }

        response
    }
}

/// Run the synchronous engine path off the async workers.
async fn run_blocking<F>(job: F) -> ApiResponse
where
    F: FnOnce() -> ApiResponse + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(error = %error, "Request job panicked.");
            ApiResponse::with_status(500, json!({ "error": "internal error" }))
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_prices(
    State(service): State<Arc<AnalyticsService>>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    run_blocking(move || service.prices(&query)).await
}

async fn get_changepoints(
    State(service): State<Arc<AnalyticsService>>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    run_blocking(move || service.changepoints(&query)).await
}

async fn get_events(
    State(service): State<Arc<AnalyticsService>>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    run_blocking(move || service.events(&query)).await
}

async fn get_correlation(State(service): State<Arc<AnalyticsService>>) -> ApiResponse {
    run_blocking(move || service.correlation()).await
}

async fn get_impact_summary(
    State(service): State<Arc<AnalyticsService>>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    run_blocking(move || service.impact_summary(&query)).await
}

async fn get_event_impact(
    State(service): State<Arc<AnalyticsService>>,
    Query(query): Query<EventImpactQuery>,
) -> ApiResponse {
    run_blocking(move || service.event_impact(&query)).await
}

/// Routes for every resource, with permissive CORS and request tracing.
pub fn router(service: AnalyticsService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(Any)
        .allow_headers(AllowHeaders::any())
        .expose_headers(ExposeHeaders::list([header::CONTENT_RANGE]));

    Router::new()
        .route("/health", get(health))
        .route("/api/prices", get(get_prices))
        .route("/api/changepoints", get(get_changepoints))
        .route("/api/events", get(get_events))
        .route("/api/correlation", get(get_correlation))
        .route("/api/impact-summary", get(get_impact_summary))
        .route("/api/event-impact", get(get_event_impact))
        .with_state(Arc::new(service))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let addr = settings.server.addr()?;
    let app = router(AnalyticsService::new(settings.data));

    tracing::info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
