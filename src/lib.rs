//! `reserva` — reservation conflict-detection and lifecycle engine for
//! shared, exclusive-use resources (spaces, lendable books).
//!
//! Given a resource id and a requested interval the engine decides atomically
//! whether the interval may be granted, records the grant in a WAL-backed
//! store, and drives the reservation's state machine from there. Routing,
//! accounts, inventory and notification delivery all live outside; the engine
//! only signals.

pub mod booking;
pub mod catalog;
pub mod lifecycle;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;
mod wal;

pub use booking::{BookingRequest, BookingResult, BookingService, ModifyRequest};
pub use catalog::{CatalogSpec, MemoryDirectory, RegistryConfig, StoreRegistry};
pub use lifecycle::{BookingAction, Lifecycle};
pub use model::{Interval, Reservation, ReservationId, Status};
pub use store::{EngineError, ReservationStore, ResourceDirectory};
