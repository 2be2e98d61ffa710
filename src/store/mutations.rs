use chrono::Utc;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::overlap::{check_no_conflict, validate_interval};
use super::{EngineError, ReservationStore, WalCommand};

impl ReservationStore {
    /// The defining store operation: check availability and insert as one
    /// indivisible unit. The schedule's write lock is held from the conflict
    /// check through the WAL fsync and the in-memory apply, so two
    /// overlapping requests for the same resource can never both succeed.
    pub async fn insert_if_available(
        &self,
        resource_id: ResourceId,
        requester_id: RequesterId,
        interval: Interval,
        reason: Option<String>,
    ) -> Result<Reservation, EngineError> {
        if resource_id.len() > MAX_ID_LEN || requester_id.len() > MAX_ID_LEN {
            return Err(EngineError::LimitExceeded("identifier too long"));
        }
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN
        {
            return Err(EngineError::LimitExceeded("reason too long"));
        }
        validate_interval(&interval)?;

        // Existence precondition for directory-backed catalogs (books).
        // Checked before any schedule access.
        if let Some(dir) = self.directory()
            && !dir.resource_exists(&resource_id).await?
        {
            return Err(EngineError::ResourceNotFound(resource_id));
        }

        let sched = self.get_or_create_schedule(&resource_id);
        let mut guard = sched.write().await;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many reservations on resource"));
        }

        check_no_conflict(&guard, &interval, None)?;

        let now = Utc::now();
        let id = Ulid::new();
        let event = Event::Created {
            id,
            resource_id: resource_id.clone(),
            requester_id: requester_id.clone(),
            interval,
            reason: reason.clone(),
            at: now,
        };
        self.wal_append(&event).await?;

        let reservation = Reservation {
            id,
            resource_id: resource_id.clone(),
            requester_id,
            interval,
            reason,
            status: Status::Pending,
            created_at: now,
            updated_at: now,
        };
        guard.insert(reservation.clone());
        self.record_insert(&reservation);
        self.notify.send(&resource_id, &event);
        Ok(reservation)
    }

    /// Apply a status transition. The transition table is evaluated against
    /// the effective status, so an `Active` reservation whose end has passed
    /// behaves as `Completed` (terminal) here.
    pub async fn update_status(
        &self,
        id: ReservationId,
        new_status: Status,
    ) -> Result<Reservation, EngineError> {
        let (resource_id, mut guard) = self.resolve_write(&id).await?;
        let now = Utc::now();

        let row = guard.get(id).ok_or(EngineError::NotFound(id))?;
        let from = row.effective_status(now);
        if !from.can_transition_to(new_status) {
            return Err(EngineError::InvalidTransition {
                from,
                to: new_status,
            });
        }

        let event = Event::StatusChanged {
            id,
            resource_id: resource_id.clone(),
            status: new_status,
            at: now,
        };
        self.wal_append(&event).await?;

        let row = guard.get_mut(id).expect("row held under write lock");
        row.status = new_status;
        row.updated_at = now;
        let updated = row.clone();
        self.notify.send(&resource_id, &event);
        Ok(updated)
    }

    /// Reschedule a reservation, optionally moving it to another resource.
    /// Owner-only; permitted only while effectively `Pending`. Availability
    /// is re-checked on the target schedule excluding the reservation itself.
    pub async fn update_interval(
        &self,
        id: ReservationId,
        requester_id: &str,
        new_interval: Interval,
        new_resource_id: Option<ResourceId>,
        new_reason: Option<String>,
    ) -> Result<Reservation, EngineError> {
        validate_interval(&new_interval)?;
        if let Some(ref r) = new_reason
            && r.len() > MAX_REASON_LEN
        {
            return Err(EngineError::LimitExceeded("reason too long"));
        }

        let current = self.resource_of(&id).ok_or(EngineError::NotFound(id))?;
        let target = new_resource_id.unwrap_or_else(|| current.clone());
        if target.len() > MAX_ID_LEN {
            return Err(EngineError::LimitExceeded("identifier too long"));
        }

        if target != current
            && let Some(dir) = self.directory()
            && !dir.resource_exists(&target).await?
        {
            return Err(EngineError::ResourceNotFound(target));
        }

        let source_arc = self.get_schedule(&current).ok_or(EngineError::NotFound(id))?;
        let now = Utc::now();

        if target == current {
            let mut guard = source_arc.write().await;
            let row = guard.get(id).ok_or(EngineError::NotFound(id))?;
            if row.requester_id != requester_id {
                return Err(EngineError::Forbidden(id));
            }
            let from = row.effective_status(now);
            if from != Status::Pending {
                return Err(EngineError::InvalidTransition {
                    from,
                    to: Status::Pending,
                });
            }
            // A reservation never conflicts with itself
            check_no_conflict(&guard, &new_interval, Some(id))?;

            let event = Event::Rescheduled {
                id,
                resource_id: current.clone(),
                new_resource_id: current.clone(),
                interval: new_interval,
                reason: new_reason.clone(),
                at: now,
            };
            self.wal_append(&event).await?;

            let mut row = guard.remove(id).expect("row held under write lock");
            row.interval = new_interval;
            if new_reason.is_some() {
                row.reason = new_reason;
            }
            row.updated_at = now;
            let updated = row.clone();
            guard.insert(row);
            self.notify.send(&current, &event);
            return Ok(updated);
        }

        // Cross-resource move: lock both schedules in sorted id order so two
        // concurrent moves can never deadlock.
        let target_arc = self.get_or_create_schedule(&target);
        let (mut source_guard, mut target_guard) = if current < target {
            let s = source_arc.write().await;
            let t = target_arc.write().await;
            (s, t)
        } else {
            let t = target_arc.write().await;
            let s = source_arc.write().await;
            (s, t)
        };

        let row = source_guard.get(id).ok_or(EngineError::NotFound(id))?;
        if row.requester_id != requester_id {
            return Err(EngineError::Forbidden(id));
        }
        let from = row.effective_status(now);
        if from != Status::Pending {
            return Err(EngineError::InvalidTransition {
                from,
                to: Status::Pending,
            });
        }
        if target_guard.reservations.len() >= MAX_RESERVATIONS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many reservations on resource"));
        }
        check_no_conflict(&target_guard, &new_interval, Some(id))?;

        let event = Event::Rescheduled {
            id,
            resource_id: current.clone(),
            new_resource_id: target.clone(),
            interval: new_interval,
            reason: new_reason.clone(),
            at: now,
        };
        self.wal_append(&event).await?;

        let mut row = source_guard.remove(id).expect("row held under write lock");
        row.resource_id = target.clone();
        row.interval = new_interval;
        if new_reason.is_some() {
            row.reason = new_reason;
        }
        row.updated_at = now;
        let updated = row.clone();
        target_guard.insert(row);
        self.index.insert(id, target.clone());
        // Both sides care: the old resource freed a slot, the new one gained a hold
        self.notify.send(&current, &event);
        self.notify.send(&target, &event);
        Ok(updated)
    }

    /// Owner cancellation, checked and applied under the schedule's write
    /// lock: the caller must own the reservation and it must still be
    /// effectively `Pending`. Administrative cancellation of `Active`
    /// reservations goes through `update_status` instead.
    pub async fn cancel_by_owner(
        &self,
        id: ReservationId,
        requester_id: &str,
    ) -> Result<Reservation, EngineError> {
        let (resource_id, mut guard) = self.resolve_write(&id).await?;
        let now = Utc::now();

        let row = guard.get(id).ok_or(EngineError::NotFound(id))?;
        if row.requester_id != requester_id {
            return Err(EngineError::Forbidden(id));
        }
        let from = row.effective_status(now);
        if from != Status::Pending {
            return Err(EngineError::InvalidTransition {
                from,
                to: Status::Cancelled,
            });
        }

        let event = Event::StatusChanged {
            id,
            resource_id: resource_id.clone(),
            status: Status::Cancelled,
            at: now,
        };
        self.wal_append(&event).await?;

        let row = guard.get_mut(id).expect("row held under write lock");
        row.status = Status::Cancelled;
        row.updated_at = now;
        let updated = row.clone();
        self.notify.send(&resource_id, &event);
        Ok(updated)
    }

    /// Hard delete. Only the undo-last compensating flow uses this — every
    /// other removal is a status transition.
    pub async fn delete(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let (resource_id, mut guard) = self.resolve_write(&id).await?;
        if guard.get(id).is_none() {
            return Err(EngineError::NotFound(id));
        }

        let event = Event::Deleted {
            id,
            resource_id: resource_id.clone(),
        };
        self.wal_append(&event).await?;

        let removed = guard.remove(id).expect("row held under write lock");
        self.record_delete(&removed);
        self.notify.send(&resource_id, &event);
        Ok(removed)
    }

    /// Rewrite the WAL with only the events needed to recreate current state:
    /// one `Created` per live reservation, plus a `StatusChanged` where the
    /// status moved on from `Pending`. Call from a quiet moment — writes that
    /// race the snapshot stay in memory but may miss the rewritten log.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        let arcs: Vec<super::SharedSchedule> =
            self.schedules.iter().map(|e| e.value().clone()).collect();
        for sched in arcs {
            let guard = sched.read().await;
            for r in &guard.reservations {
                events.push(Event::Created {
                    id: r.id,
                    resource_id: r.resource_id.clone(),
                    requester_id: r.requester_id.clone(),
                    interval: r.interval,
                    reason: r.reason.clone(),
                    at: r.created_at,
                });
                if r.status != Status::Pending {
                    events.push(Event::StatusChanged {
                        id: r.id,
                        resource_id: r.resource_id.clone(),
                        status: r.status,
                        at: r.updated_at,
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
