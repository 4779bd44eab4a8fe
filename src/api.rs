use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::pns::{Coordinates, EventCategory, InvalidRecord, ObservationRecord, RecordField};
use crate::services::{
    AggregateSummary, DateRange, HeatMap, HeatMapPoint, StationSummary, SummaryError,
    SummaryService,
};
use crate::store::ObservationStore;
use crate::utils::canonical_station_code;

#[derive(Clone)]
pub struct AppState {
    pub summary_service: SummaryService,
    pub store: ObservationStore,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub stored_observations: usize,
    pub invalid_count: usize,
    pub invalid_records: Vec<InvalidRecord>,
}

#[derive(Serialize, ToSchema)]
pub struct StationObservationsResponse {
    pub station_id: String,
    pub total_measurement: f64,
    pub records: Vec<ObservationRecord>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RangeParams {
    /// First day of the range (inclusive), `YYYY-MM-DD`
    pub start: NaiveDate,
    /// Last day of the range (inclusive), `YYYY-MM-DD`
    pub end: NaiveDate,
    pub category: Option<EventCategory>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CategoryParams {
    pub category: Option<EventCategory>,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Snow Report Service",
        description = "Snowfall observations collected from NWS Public Information Statements"
    ),
    paths(
        health,
        get_summary,
        get_recent_summary,
        get_heat_map,
        get_station_observations,
        get_diagnostics
    ),
    components(schemas(
        HealthResponse,
        DiagnosticsResponse,
        StationObservationsResponse,
        AggregateSummary,
        StationSummary,
        Coordinates,
        DateRange,
        HeatMap,
        HeatMapPoint,
        EventCategory,
        ObservationRecord,
        InvalidRecord,
        RecordField
    )),
    tags((name = "snow-report", description = "Snowfall summaries and diagnostics"))
)]
pub struct ApiDoc;

pub fn generate_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/summary", get(get_summary))
        .route("/summary/recent", get(get_recent_summary))
        .route("/heatmap", get(get_heat_map))
        .route("/stations/{station_id}/observations", get(get_station_observations))
        .route("/diagnostics", get(get_diagnostics))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}

fn summary_error_status(e: SummaryError) -> StatusCode {
    match e {
        SummaryError::InvalidRange { start, end } => {
            warn!("Rejected date range {} to {}", start, end);
            StatusCode::BAD_REQUEST
        }
        SummaryError::Store(e) => {
            error!("Failed to read observation store: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "snow-report",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
#[instrument(skip(_state))]
async fn health(State(_state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");
    let response = HealthResponse {
        status: "healthy".to_string(),
    };
    (StatusCode::OK, Json(response))
}

#[utoipa::path(
    get,
    path = "/api/v1/summary",
    tag = "snow-report",
    params(RangeParams),
    responses(
        (status = 200, description = "Per-station totals for the range", body = AggregateSummary),
        (status = 400, description = "Start date is after end date")
    )
)]
#[instrument(skip(state))]
async fn get_summary(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Result<Json<AggregateSummary>, StatusCode> {
    let range = DateRange::new(params.start, params.end).map_err(summary_error_status)?;
    let summary = state
        .summary_service
        .get_summary(range, params.category)
        .map_err(summary_error_status)?;

    info!(
        "Built summary for {} with {} stations",
        summary.label,
        summary.stations.len()
    );
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/api/v1/summary/recent",
    tag = "snow-report",
    params(CategoryParams),
    responses((status = 200, description = "Summary over the last 48 hours, or the latest data window", body = AggregateSummary))
)]
#[instrument(skip(state))]
async fn get_recent_summary(
    State(state): State<AppState>,
    Query(params): Query<CategoryParams>,
) -> Result<Json<AggregateSummary>, StatusCode> {
    let summary = state
        .summary_service
        .get_recent_summary(params.category, Utc::now())
        .map_err(summary_error_status)?;

    info!(
        "Built recent summary for {} with {} stations",
        summary.label,
        summary.stations.len()
    );
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/api/v1/heatmap",
    tag = "snow-report",
    params(RangeParams),
    responses(
        (status = 200, description = "Station totals with coordinates", body = HeatMap),
        (status = 400, description = "Start date is after end date")
    )
)]
#[instrument(skip(state))]
async fn get_heat_map(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Result<Json<HeatMap>, StatusCode> {
    let range = DateRange::new(params.start, params.end).map_err(summary_error_status)?;
    let heat_map = state
        .summary_service
        .get_heat_map(range, params.category)
        .map_err(summary_error_status)?;

    debug!("Heat map has {} points", heat_map.points.len());
    Ok(Json(heat_map))
}

#[utoipa::path(
    get,
    path = "/api/v1/stations/{station_id}/observations",
    tag = "snow-report",
    params(("station_id" = String, Path, description = "3-letter station code")),
    responses(
        (status = 200, description = "All stored observations for the station", body = StationObservationsResponse),
        (status = 400, description = "Malformed station code"),
        (status = 404, description = "No observations for the station")
    )
)]
#[instrument(skip(state), fields(station_id = %station_id))]
async fn get_station_observations(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
) -> Result<Json<StationObservationsResponse>, StatusCode> {
    let station_id = canonical_station_code(&station_id).ok_or_else(|| {
        warn!("Malformed station code {}", station_id);
        StatusCode::BAD_REQUEST
    })?;

    let records = state
        .summary_service
        .get_station_observations(&station_id)
        .map_err(summary_error_status)?;
    if records.is_empty() {
        warn!("No observations found for station {}", station_id);
        return Err(StatusCode::NOT_FOUND);
    }

    info!("Retrieved {} observations for station {}", records.len(), station_id);
    Ok(Json(StationObservationsResponse {
        total_measurement: records.iter().map(|r| r.measurement).sum(),
        station_id,
        records,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    tag = "snow-report",
    responses((status = 200, description = "Recently rejected records", body = DiagnosticsResponse))
)]
#[instrument(skip(state))]
async fn get_diagnostics(
    State(state): State<AppState>,
) -> Result<Json<DiagnosticsResponse>, StatusCode> {
    let (stored_observations, invalid_records) = state
        .store
        .len()
        .and_then(|len| Ok((len, state.store.diagnostics()?)))
        .map_err(|e| {
            error!("Failed to read diagnostics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(DiagnosticsResponse {
        stored_observations,
        invalid_count: invalid_records.len(),
        invalid_records,
    }))
}
