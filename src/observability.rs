use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings accepted with status pending.
pub const BOOKINGS_CREATED_TOTAL: &str = "pitchlock_bookings_created_total";

/// Counter: booking attempts rejected for overlap or missing window.
pub const BOOKING_CONFLICTS_TOTAL: &str = "pitchlock_booking_conflicts_total";

/// Counter: booking status transitions committed.
pub const BOOKING_TRANSITIONS_TOTAL: &str = "pitchlock_booking_transitions_total";

/// Counter: lobby joins committed.
pub const LOBBY_JOINS_TOTAL: &str = "pitchlock_lobby_joins_total";

/// Counter: joins rejected (full, duplicate, or cancelled lobby).
pub const LOBBY_JOIN_REJECTIONS_TOTAL: &str = "pitchlock_lobby_join_rejections_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: registered pitches.
pub const PITCHES_ACTIVE: &str = "pitchlock_pitches_active";

/// Gauge: lobbies not yet cancelled.
pub const LOBBIES_ACTIVE: &str = "pitchlock_lobbies_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "pitchlock_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "pitchlock_wal_flush_batch_size";

/// Install the fmt tracing subscriber, honoring `RUST_LOG`. Call once at
/// process startup; embedding applications that install their own subscriber
/// skip this.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
