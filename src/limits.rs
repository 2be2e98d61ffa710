//! Engine limits. These are guardrails against pathological input, not
//! tunables — callers hitting them should be fixed, not accommodated.

use chrono::Duration;

/// Longest single reservation. A year covers every space hire and book loan
/// the source systems ever recorded.
pub fn max_reservation_duration() -> Duration {
    Duration::days(366)
}

/// Reservations per resource schedule.
pub const MAX_RESERVATIONS_PER_RESOURCE: usize = 100_000;

/// Free-text reason length, in bytes.
pub const MAX_REASON_LEN: usize = 1_024;

/// Resource / requester identifier length, in bytes.
pub const MAX_ID_LEN: usize = 256;

/// Catalog name length (becomes a WAL filename).
pub const MAX_CATALOG_NAME_LEN: usize = 128;

/// Catalogs per registry.
pub const MAX_CATALOGS: usize = 64;

/// Timestamps must fall in [2000-01-01, 9999-01-01) UTC.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 9999;
