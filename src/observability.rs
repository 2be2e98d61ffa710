use std::net::SocketAddr;

use crate::lifecycle::BookingAction;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total booking operations. Labels: op, outcome.
pub const OPERATIONS_TOTAL: &str = "reserva_operations_total";

/// Histogram: booking operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "reserva_operation_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: number of open catalog stores.
pub const STORES_ACTIVE: &str = "reserva_stores_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "reserva_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "reserva_wal_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if port
/// is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Install the default fmt tracing subscriber. Embedders with their own
/// subscriber skip this.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}

/// Map an action variant to a short label for metrics.
pub fn action_label(action: &BookingAction) -> &'static str {
    match action {
        BookingAction::CreateReservation { .. } => "create_reservation",
        BookingAction::ModifyReservation { .. } => "modify_reservation",
        BookingAction::UpdateStatus { .. } => "update_status",
        BookingAction::CancelReservation { .. } => "cancel_reservation",
    }
}
