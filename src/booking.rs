use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::lifecycle::{BookingAction, Lifecycle};
use crate::model::{Interval, Reservation, ReservationId, Status};
use crate::observability;
use crate::store::EngineError;

/// A booking request as it arrives from the caller-facing layer. Timestamps
/// are ISO-8601: RFC 3339, or a bare `YYYY-MM-DD` taken as midnight UTC.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub resource_id: String,
    pub requester_id: String,
    pub start: String,
    pub end: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModifyRequest {
    pub reservation_id: ReservationId,
    pub requester_id: String,
    pub start: String,
    pub end: String,
    /// Move the reservation to another resource of the same catalog.
    pub new_resource_id: Option<String>,
    pub reason: Option<String>,
}

/// The structured result every facade operation returns. Domain refusals are
/// carried here with `success: false`; only storage failures escape as
/// errors.
#[derive(Debug, Clone, Serialize)]
pub struct BookingResult {
    pub success: bool,
    #[serde(rename = "reservationId", skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<ReservationId>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl BookingResult {
    fn granted(reservation: &Reservation, message: &str) -> Self {
        Self {
            success: true,
            reservation_id: Some(reservation.id),
            message: message.to_string(),
            status: Some(reservation.status),
        }
    }

    fn refused(err: &EngineError) -> Self {
        Self {
            success: false,
            reservation_id: None,
            message: err.to_string(),
            status: None,
        }
    }
}

fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, EngineError> {
    let t = input.trim();
    if t.is_empty() {
        return Err(EngineError::InvalidInterval("missing bound"));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(d) = t.parse::<NaiveDate>() {
        return Ok(d.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc());
    }
    Err(EngineError::InvalidInterval("unparseable timestamp"))
}

fn parse_interval(start: &str, end: &str) -> Result<Interval, EngineError> {
    let start = parse_timestamp(start)?;
    let end = parse_timestamp(end)?;
    if start > end {
        return Err(EngineError::InvalidInterval("start after end"));
    }
    Ok(Interval::new(start, end))
}

fn outcome_label(outcome: &Result<Reservation, EngineError>) -> &'static str {
    match outcome {
        Ok(_) => "ok",
        Err(EngineError::Conflict(_)) => "conflict",
        Err(e) if e.is_domain_outcome() => "refused",
        Err(_) => "error",
    }
}

fn conclude(
    outcome: Result<Reservation, EngineError>,
    message: &str,
) -> Result<BookingResult, EngineError> {
    match outcome {
        Ok(r) => Ok(BookingResult::granted(&r, message)),
        Err(e) if e.is_domain_outcome() => Ok(BookingResult::refused(&e)),
        Err(e) => Err(e),
    }
}

/// Single entry point for one catalog's booking traffic. Validates boundary
/// input, dispatches actions through the lifecycle, and keeps the undo
/// history of reservations created through this service.
pub struct BookingService {
    lifecycle: Lifecycle,
    history: Mutex<Vec<ReservationId>>,
}

impl BookingService {
    pub fn new(lifecycle: Lifecycle) -> Self {
        Self {
            lifecycle,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    async fn dispatch(&self, action: BookingAction) -> Result<Reservation, EngineError> {
        let op = observability::action_label(&action);
        let start = Instant::now();
        let outcome = self.lifecycle.execute(action).await;
        metrics::histogram!(observability::OPERATION_DURATION_SECONDS, "op" => op)
            .record(start.elapsed().as_secs_f64());
        metrics::counter!(
            observability::OPERATIONS_TOTAL,
            "op" => op,
            "outcome" => outcome_label(&outcome)
        )
        .increment(1);
        outcome
    }

    pub async fn book(&self, req: BookingRequest) -> Result<BookingResult, EngineError> {
        let interval = match parse_interval(&req.start, &req.end) {
            Ok(i) => i,
            Err(e) => return Ok(BookingResult::refused(&e)),
        };
        let outcome = self
            .dispatch(BookingAction::CreateReservation {
                resource_id: req.resource_id,
                requester_id: req.requester_id,
                interval,
                reason: req.reason,
            })
            .await;
        if let Ok(ref r) = outcome {
            self.history.lock().expect("history lock").push(r.id);
        }
        conclude(outcome, "reservation created")
    }

    pub async fn modify(&self, req: ModifyRequest) -> Result<BookingResult, EngineError> {
        let interval = match parse_interval(&req.start, &req.end) {
            Ok(i) => i,
            Err(e) => return Ok(BookingResult::refused(&e)),
        };
        let outcome = self
            .dispatch(BookingAction::ModifyReservation {
                reservation_id: req.reservation_id,
                requester_id: req.requester_id,
                interval,
                new_resource_id: req.new_resource_id,
                reason: req.reason,
            })
            .await;
        conclude(outcome, "reservation updated")
    }

    pub async fn cancel(
        &self,
        reservation_id: ReservationId,
        requester_id: &str,
    ) -> Result<BookingResult, EngineError> {
        let outcome = self
            .dispatch(BookingAction::CancelReservation {
                reservation_id,
                requester_id: requester_id.to_string(),
            })
            .await;
        conclude(outcome, "reservation cancelled")
    }

    pub async fn update_status(
        &self,
        reservation_id: ReservationId,
        status: &str,
    ) -> Result<BookingResult, EngineError> {
        let outcome = self
            .dispatch(BookingAction::UpdateStatus {
                reservation_id,
                status: status.to_string(),
            })
            .await;
        conclude(outcome, "reservation status updated")
    }

    pub async fn get_by_id(&self, id: ReservationId) -> Result<BookingResult, EngineError> {
        match self.lifecycle.store().get_by_id(id).await {
            Some(r) => Ok(BookingResult::granted(&r, "reservation found")),
            None => Ok(BookingResult::refused(&EngineError::NotFound(id))),
        }
    }

    /// Full record, for callers that need more than the result envelope.
    pub async fn details(&self, id: ReservationId) -> Option<Reservation> {
        self.lifecycle.store().get_by_id(id).await
    }

    /// Compensating flow: hard-delete the most recently created reservation,
    /// provided nobody has confirmed (or otherwise moved) it yet.
    pub async fn undo_last(&self) -> Result<BookingResult, EngineError> {
        let popped = self.history.lock().expect("history lock").pop();
        let Some(id) = popped else {
            return Ok(BookingResult {
                success: false,
                reservation_id: None,
                message: "nothing to undo".into(),
                status: None,
            });
        };

        let store = self.lifecycle.store();
        match store.get_by_id(id).await {
            None => Ok(BookingResult::refused(&EngineError::NotFound(id))),
            Some(r) if r.status != Status::Pending => Ok(BookingResult {
                success: false,
                reservation_id: Some(id),
                message: format!("cannot undo: reservation is {}", r.status),
                status: Some(r.status),
            }),
            Some(_) => match store.delete(id).await {
                Ok(removed) => Ok(BookingResult {
                    success: true,
                    reservation_id: Some(removed.id),
                    message: "reservation deleted".into(),
                    status: None,
                }),
                Err(e) if e.is_domain_outcome() => Ok(BookingResult::refused(&e)),
                Err(e) => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_rfc3339_and_bare_dates() {
        let dt = parse_timestamp("2024-10-05T09:30:00Z").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 10, 5, 9, 30, 0).unwrap());

        let midnight = parse_timestamp("2024-10-05").unwrap();
        assert_eq!(midnight, Utc.with_ymd_and_hms(2024, 10, 5, 0, 0, 0).unwrap());

        // Offset timestamps normalize to UTC
        let offset = parse_timestamp("2024-10-05T09:30:00+02:00").unwrap();
        assert_eq!(offset, Utc.with_ymd_and_hms(2024, 10, 5, 7, 30, 0).unwrap());
    }

    #[test]
    fn parse_rejects_bad_bounds() {
        assert!(matches!(
            parse_timestamp(""),
            Err(EngineError::InvalidInterval("missing bound"))
        ));
        assert!(matches!(
            parse_timestamp("next tuesday"),
            Err(EngineError::InvalidInterval(_))
        ));
        assert!(matches!(
            parse_interval("2024-10-10", "2024-10-05"),
            Err(EngineError::InvalidInterval("start after end"))
        ));
        // Equal bounds are a valid instant-long interval
        assert!(parse_interval("2024-10-05", "2024-10-05").is_ok());
    }

    #[test]
    fn result_serializes_to_boundary_shape() {
        let id = ulid::Ulid::new();
        let result = BookingResult {
            success: true,
            reservation_id: Some(id),
            message: "reservation created".into(),
            status: Some(Status::Pending),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["reservationId"], id.to_string());
        assert_eq!(json["message"], "reservation created");
        assert_eq!(json["status"], "pending");
    }

    #[test]
    fn refusal_omits_optional_fields() {
        let result = BookingResult::refused(&EngineError::InvalidInterval("start after end"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("reservationId").is_none());
        assert!(json.get("status").is_none());
    }
}
