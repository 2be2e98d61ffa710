use std::sync::Arc;

use tracing::info;

use crate::model::*;
use crate::store::{EngineError, ReservationStore};

/// The booking actions, as data. Each variant's validation lives next to its
/// transition rule in `execute` — there is no command-object hierarchy to
/// subclass.
#[derive(Debug, Clone)]
pub enum BookingAction {
    CreateReservation {
        resource_id: ResourceId,
        requester_id: RequesterId,
        interval: Interval,
        reason: Option<String>,
    },
    ModifyReservation {
        reservation_id: ReservationId,
        requester_id: RequesterId,
        interval: Interval,
        new_resource_id: Option<ResourceId>,
        reason: Option<String>,
    },
    UpdateStatus {
        reservation_id: ReservationId,
        /// Raw caller-supplied status; normalized case-insensitively and
        /// matched against the known set (legacy spellings included).
        status: String,
    },
    CancelReservation {
        reservation_id: ReservationId,
        requester_id: RequesterId,
    },
}

/// Domain rules on top of the store's CRUD: evaluator-approved creation with
/// a confirmation signal, normalized status input, owner-only cancellation.
pub struct Lifecycle {
    store: Arc<ReservationStore>,
}

impl Lifecycle {
    pub fn new(store: Arc<ReservationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ReservationStore> {
        &self.store
    }

    pub async fn execute(&self, action: BookingAction) -> Result<Reservation, EngineError> {
        match action {
            BookingAction::CreateReservation {
                resource_id,
                requester_id,
                interval,
                reason,
            } => {
                let reservation = self
                    .store
                    .insert_if_available(resource_id, requester_id, interval, reason)
                    .await?;
                // The store already published the Created event on the notify
                // hub; delivery is the subscriber's problem.
                info!("confirmation signal for reservation {}", reservation.id);
                Ok(reservation)
            }
            BookingAction::ModifyReservation {
                reservation_id,
                requester_id,
                interval,
                new_resource_id,
                reason,
            } => {
                self.store
                    .update_interval(reservation_id, &requester_id, interval, new_resource_id, reason)
                    .await
            }
            BookingAction::UpdateStatus {
                reservation_id,
                status,
            } => {
                let parsed =
                    Status::parse(&status).ok_or(EngineError::InvalidStatus(status))?;
                self.store.update_status(reservation_id, parsed).await
            }
            BookingAction::CancelReservation {
                reservation_id,
                requester_id,
            } => {
                self.store
                    .cancel_by_owner(reservation_id, &requester_id)
                    .await
            }
        }
    }
}
