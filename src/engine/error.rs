use chrono::NaiveDate;
use thiserror::Error;
use ulid::Ulid;

use crate::model::ResourceStatus;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("conflict with reservation: {0}")]
    Conflict(Ulid),
    #[error("resource {resource_id} is closed on {date}")]
    Closed { resource_id: Ulid, date: NaiveDate },
    #[error("resource {id} is not bookable: {status}")]
    ResourceUnavailable { id: Ulid, status: ResourceStatus },
    #[error("cannot delete resource {0}: has reservations")]
    HasReservations(Ulid),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::Conflict(_) => "conflict",
            EngineError::Closed { .. } => "closed",
            EngineError::ResourceUnavailable { .. } => "resource_unavailable",
            EngineError::HasReservations(_) => "has_reservations",
            EngineError::Validation(_) => "validation",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal",
        }
    }
}
