use std::net::SocketAddr;

use crate::engine::BookingError;
use crate::model::Reservation;

// ── Request-driven metrics ──────────────────────────────────────

/// Counter: admission attempts. Labels: outcome.
pub const ADMISSIONS_TOTAL: &str = "stayline_admissions_total";

/// Counter: status changes applied. Labels: status.
pub const STATUS_CHANGES_TOTAL: &str = "stayline_status_changes_total";

/// Counter: search calls. Labels: filtered (whether a stay was requested).
pub const SEARCHES_TOTAL: &str = "stayline_searches_total";

/// Histogram: time spent waiting for a listing's write lock, in seconds.
pub const LISTING_LOCK_WAIT_SECONDS: &str = "stayline_listing_lock_wait_seconds";

// ── Resource utilization ────────────────────────────────────────

/// Gauge: registered listings.
pub const LISTINGS_ACTIVE: &str = "stayline_listings_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "stayline_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "stayline_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Label for the outcome of an admission attempt.
pub fn admission_outcome(result: &Result<Reservation, BookingError>) -> &'static str {
    use BookingError::*;
    match result {
        Ok(_) => "admitted",
        Err(Conflict { .. }) => "conflict",
        Err(Validation(_)) => "invalid",
        Err(TransientStore(_)) => "transient",
        Err(_) => "rejected",
    }
}
