use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "sitegate_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "sitegate_query_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: bookings stored.
pub const BOOKINGS_CREATED_TOTAL: &str = "sitegate_bookings_created_total";

/// Counter: bookings rejected because a reservation in scope overlapped.
pub const BOOKING_CONFLICTS_TOTAL: &str = "sitegate_booking_conflicts_total";

/// Counter: access decisions. Labels: status (Successful, NotSuccessful, Attempted).
pub const ACCESS_DECISIONS_TOTAL: &str = "sitegate_access_decisions_total";

/// Counter: access decisions whose audit record could not be written.
pub const AUDIT_FAILURES_TOTAL: &str = "sitegate_audit_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "sitegate_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "sitegate_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "sitegate_connections_rejected_total";

/// Gauge: number of loaded tenants.
pub const TENANTS_ACTIVE: &str = "sitegate_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "sitegate_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "sitegate_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metrics label for a command.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertSite { .. } => "insert_site",
        Command::UpdateSite { .. } => "update_site",
        Command::DeleteSite { .. } => "delete_site",
        Command::InsertAccessPoint { .. } => "insert_access_point",
        Command::UpdateAccessPoint { .. } => "update_access_point",
        Command::DeleteAccessPoint { .. } => "delete_access_point",
        Command::InsertBooking { .. } => "insert_booking",
        Command::UpdateBooking { .. } => "update_booking",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::InsertAccessAttempt { .. } => "access_attempt",
        Command::SelectSites => "select_sites",
        Command::SelectAccessPoints { .. } => "select_access_points",
        Command::SelectBookings { .. } => "select_bookings",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectSiteUsers { .. } => "select_site_users",
        Command::SelectFreeSlots { .. } => "select_free_slots",
        Command::SelectAccessHistory { .. } => "select_access_history",
    }
}
