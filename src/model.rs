use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Reservation ids are minted by the store; resource and requester ids are
/// opaque strings owned by external systems.
pub type ReservationId = Ulid;
pub type ResourceId = String;
pub type RequesterId = String;

/// Closed time interval `[start, end]` — both endpoints inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start <= end, "Interval start must not be after end");
        Self { start, end }
    }

    /// Closed-interval intersection: `[s1,e1]` and `[s2,e2]` overlap iff
    /// `s1 <= e2 && s2 <= e1`. Touching endpoints DO overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    #[allow(dead_code)]
    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Reservation lifecycle states. `Rejected`, `Cancelled` and `Completed` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Active,
    Rejected,
    Cancelled,
    Completed,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Rejected | Status::Cancelled | Status::Completed)
    }

    /// Whether a reservation in this state holds its interval against other
    /// candidates. Only cancelled and rejected reservations free the slot.
    pub fn blocks_availability(self) -> bool {
        !matches!(self, Status::Cancelled | Status::Rejected)
    }

    /// The transition table:
    ///
    /// ```text
    /// Pending → Active | Rejected | Cancelled
    /// Active  → Cancelled | Completed
    /// ```
    pub fn can_transition_to(self, to: Status) -> bool {
        match self {
            Status::Pending => matches!(to, Status::Active | Status::Rejected | Status::Cancelled),
            Status::Active => matches!(to, Status::Cancelled | Status::Completed),
            Status::Rejected | Status::Cancelled | Status::Completed => false,
        }
    }

    /// Normalize a caller-supplied status string. Case-insensitive; accepts
    /// the legacy spellings still emitted by older clients (`aceptado`,
    /// `cancelada`/`cancelado`, `finalizada`, …).
    pub fn parse(input: &str) -> Option<Status> {
        match input.trim().to_lowercase().as_str() {
            "pending" | "pendiente" => Some(Status::Pending),
            "active" | "activa" | "activo" | "aceptado" | "aceptada" | "approved" => {
                Some(Status::Active)
            }
            "rejected" | "rechazado" | "rechazada" => Some(Status::Rejected),
            "cancelled" | "canceled" | "cancelada" | "cancelado" => Some(Status::Cancelled),
            "completed" | "finalizada" | "finalizado" => Some(Status::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Active => "active",
            Status::Rejected => "rejected",
            Status::Cancelled => "cancelled",
            Status::Completed => "completed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reservation row. Owned exclusively by the store; every mutation goes
/// through a WAL event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub resource_id: ResourceId,
    pub requester_id: RequesterId,
    pub interval: Interval,
    pub reason: Option<String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Status as observed at `now`: an `Active` reservation whose end has
    /// passed reads as `Completed`. The stored row is not rewritten — the
    /// transition is computed on read, no timer involved.
    pub fn effective_status(&self, now: DateTime<Utc>) -> Status {
        if self.status == Status::Active && self.interval.end < now {
            Status::Completed
        } else {
            self.status
        }
    }
}

/// Per-resource reservation list, sorted by `interval.start`. Insertion order
/// is stable for equal start timestamps.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub resource_id: ResourceId,
    pub reservations: Vec<Reservation>,
}

impl Schedule {
    pub fn new(resource_id: ResourceId) -> Self {
        Self {
            resource_id,
            reservations: Vec::new(),
        }
    }

    /// Insert keeping sort order; equal starts land after existing entries.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.interval.start <= reservation.interval.start);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove(&mut self, id: ReservationId) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations whose interval overlaps `query` under the closed-interval
    /// rule. Binary search skips everything starting after `query.end`.
    pub fn overlapping(&self, query: &Interval) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.interval.start <= query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.interval.end >= query.start)
    }
}

/// WAL record format — flat, no nesting. Every event carries enough to be
/// replayed without consulting prior state beyond the row itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Created {
        id: ReservationId,
        resource_id: ResourceId,
        requester_id: RequesterId,
        interval: Interval,
        reason: Option<String>,
        at: DateTime<Utc>,
    },
    StatusChanged {
        id: ReservationId,
        resource_id: ResourceId,
        status: Status,
        at: DateTime<Utc>,
    },
    Rescheduled {
        id: ReservationId,
        /// Resource the reservation lived on before the move (same as
        /// `new_resource_id` when the reservation stays put).
        resource_id: ResourceId,
        new_resource_id: ResourceId,
        interval: Interval,
        reason: Option<String>,
        at: DateTime<Utc>,
    },
    Deleted {
        id: ReservationId,
        resource_id: ResourceId,
    },
}

impl Event {
    pub fn reservation_id(&self) -> ReservationId {
        match self {
            Event::Created { id, .. }
            | Event::StatusChanged { id, .. }
            | Event::Rescheduled { id, .. }
            | Event::Deleted { id, .. } => *id,
        }
    }

    /// The resource whose schedule this event is applied to.
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Event::Created { resource_id, .. }
            | Event::StatusChanged { resource_id, .. }
            | Event::Rescheduled { resource_id, .. }
            | Event::Deleted { resource_id, .. } => resource_id,
        }
    }
}
