use crate::model::{ReservationId, ResourceId, Status};

#[derive(Debug)]
pub enum EngineError {
    /// Start after end, or unparseable/missing bounds. Rejected before any
    /// store access.
    InvalidInterval(&'static str),
    /// Referenced resource does not exist (catalogs with a directory only).
    ResourceNotFound(ResourceId),
    /// Interval unavailable — an expected outcome, not a failure. Carries the
    /// blocking reservation.
    Conflict(ReservationId),
    /// Status change not permitted from the current state.
    InvalidTransition { from: Status, to: Status },
    /// Caller-supplied status string outside the known set.
    InvalidStatus(String),
    /// Caller is not the reservation's owner.
    Forbidden(ReservationId),
    /// Reservation id does not exist.
    NotFound(ReservationId),
    LimitExceeded(&'static str),
    /// Underlying persistence failure. Always surfaced, never retried here.
    Storage(String),
}

impl EngineError {
    /// Domain-expected outcomes are mapped into structured results at the
    /// facade; only storage failures propagate as hard errors.
    pub fn is_domain_outcome(&self) -> bool {
        !matches!(self, EngineError::Storage(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval(msg) => write!(f, "invalid interval: {msg}"),
            EngineError::ResourceNotFound(id) => write!(f, "resource not found: {id}"),
            EngineError::Conflict(id) => write!(f, "interval conflicts with reservation {id}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid transition: {from} -> {to}")
            }
            EngineError::InvalidStatus(s) => write!(f, "unknown status: {s:?}"),
            EngineError::Forbidden(id) => write!(f, "not the owner of reservation {id}"),
            EngineError::NotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
