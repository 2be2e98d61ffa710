use chrono::Utc;

use crate::model::*;

use super::overlap::{find_conflict, validate_interval};
use super::{EngineError, ReservationStore};

/// Read accessors. Every row leaves the store through `effective_view`, so
/// callers always observe the lazy `Active → Completed` transition.
impl ReservationStore {
    /// Availability check, read-only. Safe to call concurrently; the result
    /// reflects the schedule under its read lock. `exclude` skips one
    /// reservation id so modification never conflicts with itself.
    pub async fn is_available(
        &self,
        resource_id: &str,
        interval: Interval,
        exclude: Option<ReservationId>,
    ) -> Result<bool, EngineError> {
        validate_interval(&interval)?;
        let Some(sched) = self.get_schedule(resource_id) else {
            return Ok(true); // no reservations yet — nothing to conflict with
        };
        let guard = sched.read().await;
        Ok(find_conflict(&guard, &interval, exclude).is_none())
    }

    pub async fn get_by_id(&self, id: ReservationId) -> Option<Reservation> {
        let resource_id = self.resource_of(&id)?;
        let sched = self.get_schedule(&resource_id)?;
        let guard = sched.read().await;
        guard.get(id).map(effective_view)
    }

    /// All reservations for a resource, in schedule order (interval start,
    /// insertion-stable for equal starts).
    pub async fn list_by_resource(&self, resource_id: &str) -> Vec<Reservation> {
        let Some(sched) = self.get_schedule(resource_id) else {
            return Vec::new();
        };
        let guard = sched.read().await;
        guard.reservations.iter().map(effective_view).collect()
    }

    /// A requester's reservations in creation order — the booking history the
    /// caller-facing layers page through.
    pub async fn list_by_requester(&self, requester_id: &str) -> Vec<Reservation> {
        let ids: Vec<ReservationId> = match self.by_requester.get(requester_id) {
            Some(entry) => entry.value().clone(),
            None => return Vec::new(),
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(r) = self.get_by_id(id).await {
                out.push(r);
            }
        }
        out
    }
}

fn effective_view(row: &Reservation) -> Reservation {
    let mut r = row.clone();
    r.status = r.effective_status(Utc::now());
    r
}
