// Data Money - Web Server
// JSON API over the comparison core with Axum

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use data_money::{
    compare_at_path, init_logging, parse_reference_date, AppConfig, CompareError, Comparison,
    ComparisonRequest, DateBounds, GranularityMode, Lookback, SqliteStore, WeekPolicy,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared application state. Each request opens its own read-only connection.
#[derive(Clone)]
struct AppState {
    db_path: Arc<PathBuf>,
    week_policy: WeekPolicy,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn failure(status: StatusCode, message: String) -> Response {
    tracing::error!(status = %status, error = %message, "request failed");

    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
    )
        .into_response()
}

fn error_response(err: &CompareError) -> Response {
    let status = match err {
        e if e.is_caller_error() => StatusCode::BAD_REQUEST,
        CompareError::EmptyStore => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    failure(status, err.to_string())
}

/// Query string of /api/compare
#[derive(Debug, Deserialize)]
struct CompareParams {
    mode: Option<String>,
    date: Option<String>,
    lookback: Option<String>,
    week_policy: Option<String>,
}

impl CompareParams {
    fn into_request(self, default_weeks: WeekPolicy) -> Result<ComparisonRequest, CompareError> {
        let mode: GranularityMode = self.mode.as_deref().unwrap_or("daily").parse()?;
        let current = self.date.as_deref().map(parse_reference_date).transpose()?;

        let mut request = ComparisonRequest::new(mode, current).with_week_policy(
            match self.week_policy.as_deref() {
                Some(policy) => policy.parse()?,
                None => default_weeks,
            },
        );
        if let Some(lookback) = self.lookback.as_deref() {
            request = request.with_lookback(lookback.parse::<Lookback>()?);
        }
        Ok(request)
    }
}

/// Run blocking store work off the async runtime.
/// Store errors and a panicked task both come back as error responses.
async fn blocking<T, F>(work: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CompareError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(error_response(&e)),
        Err(join) => Err(failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("store task failed: {}", join),
        )),
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/dates - Date range, months and years the store can answer for
async fn get_dates(State(state): State<AppState>) -> Response {
    let db_path = state.db_path.clone();
    let result: Result<DateBounds, Response> =
        blocking(move || SqliteStore::open_read_only(&db_path)?.date_bounds()).await;

    match result {
        Ok(bounds) => ApiResponse::ok(bounds),
        Err(response) => response,
    }
}

/// GET /api/compare?mode=&date=&lookback=&week_policy= - Comparison table
async fn get_compare(State(state): State<AppState>, Query(params): Query<CompareParams>) -> Response {
    let request = match params.into_request(state.week_policy) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    let db_path = state.db_path.clone();
    let result: Result<Comparison, Response> =
        blocking(move || compare_at_path(&db_path, &request)).await;

    match result {
        Ok(comparison) => ApiResponse::ok(comparison),
        Err(response) => response,
    }
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/dates", get(get_dates))
        .route("/compare", get(get_compare))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("DATAMONEY_CONFIG").map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    init_logging(&config.log_filter);

    if !config.db_path.exists() {
        anyhow::bail!(
            "Database not found at {} (run `data-money import` first)",
            config.db_path.display()
        );
    }

    let state = AppState {
        db_path: Arc::new(config.db_path.clone()),
        week_policy: config.week_policy,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, db = %config.db_path.display(), "server listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mode: &str, lookback: Option<&str>) -> CompareParams {
        CompareParams {
            mode: Some(mode.to_string()),
            date: Some("2024-01-08".to_string()),
            lookback: lookback.map(str::to_string),
            week_policy: None,
        }
    }

    #[test]
    fn test_params_build_request() {
        let request = params("weekly", Some("1m"))
            .into_request(WeekPolicy::Trailing7Days)
            .unwrap();
        assert_eq!(request.mode, GranularityMode::Weekly);
        assert_eq!(request.lookback, Lookback::OffsetDays(30));
        assert_eq!(request.week_policy, WeekPolicy::Trailing7Days);
    }

    #[test]
    fn test_bad_params_are_caller_errors() {
        let err = params("hourly", None)
            .into_request(WeekPolicy::default())
            .unwrap_err();
        assert!(err.is_caller_error());

        let err = params("daily", Some("sometime"))
            .into_request(WeekPolicy::default())
            .unwrap_err();
        assert_eq!(error_response(&err).status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_blocking_maps_outcomes_to_statuses() {
        let ok = blocking(|| Ok::<_, CompareError>(7)).await;
        assert_eq!(ok.ok(), Some(7));

        let empty = blocking(|| Err::<(), _>(CompareError::EmptyStore)).await;
        assert_eq!(empty.unwrap_err().status(), StatusCode::NOT_FOUND);

        let panicked = blocking(|| -> Result<(), CompareError> { panic!("store exploded") }).await;
        assert_eq!(panicked.unwrap_err().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
