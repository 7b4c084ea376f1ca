use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::AvailabilityGrid;
use crate::observability::HTTP_REQUESTS_TOTAL;
use crate::sql::parse_date_str;
use crate::tenant::TenantManager;

const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for HttpError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound(_) => HttpError::NotFound(e.to_string()),
            EngineError::Validation(_) | EngineError::LimitExceeded(_) => {
                HttpError::BadRequest(e.to_string())
            }
            _ => HttpError::Internal(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl HttpError {
    fn status(&self) -> StatusCode {
        match self {
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("availability request failed: {self}");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AvailabilityQuery {
    /// `YYYY-MM-DD`; today on the venue clock when absent.
    pub date: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct OperatingHoursBody {
    pub open: String,
    pub close: String,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct SlotBody {
    pub start: String,
    pub end: String,
    pub available: bool,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct AvailabilityBody {
    /// `false` when the court does not open on that date.
    pub available: bool,
    pub operating_hours: Option<OperatingHoursBody>,
    pub slots: Vec<SlotBody>,
}

impl From<AvailabilityGrid> for AvailabilityBody {
    fn from(grid: AvailabilityGrid) -> Self {
        Self {
            available: !grid.is_closed(),
            operating_hours: grid.operating_hours.map(|(open, close)| OperatingHoursBody {
                open: open.format(TIME_FORMAT).to_string(),
                close: close.format(TIME_FORMAT).to_string(),
            }),
            slots: grid
                .slots
                .iter()
                .map(|slot| SlotBody {
                    start: slot.span.start.format(TIME_FORMAT).to_string(),
                    end: slot.span.end.format(TIME_FORMAT).to_string(),
                    available: slot.available,
                })
                .collect(),
        }
    }
}

pub fn build_router(tenant_manager: Arc<TenantManager>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/venues/{venue}/courts/{court_id}/availability",
            get(availability),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(tenant_manager)
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn availability(
    State(tenant_manager): State<Arc<TenantManager>>,
    Path((venue, court_id)): Path<(String, String)>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityBody>, HttpError> {
    let result = lookup_availability(&tenant_manager, &venue, &court_id, query).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status(),
    };
    metrics::counter!(HTTP_REQUESTS_TOTAL, "status" => status.as_str().to_owned()).increment(1);
    result.map(Json)
}

async fn lookup_availability(
    tenant_manager: &TenantManager,
    venue: &str,
    court_id: &str,
    query: AvailabilityQuery,
) -> Result<AvailabilityBody, HttpError> {
    let court_id = Ulid::from_string(court_id)
        .map_err(|e| HttpError::BadRequest(format!("bad court id {court_id:?}: {e}")))?;
    let engine = tenant_manager
        .open_existing(venue)
        .map_err(|e| HttpError::Internal(e.to_string()))?
        .ok_or_else(|| HttpError::NotFound(format!("venue {venue}")))?;
    let date = match query.date.as_deref() {
        Some(raw) => parse_date_str(raw)
            .ok_or_else(|| HttpError::BadRequest(format!("bad date {raw:?}, expected YYYY-MM-DD")))?,
        None => engine.today(),
    };

    let grid = engine.compute_availability(court_id, date).await?;
    Ok(grid.into())
}
