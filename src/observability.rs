use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "slotbook_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "slotbook_query_duration_seconds";

/// Counter: booking operations. Labels: op (create/move/cancel), outcome.
pub const BOOKING_OPS_TOTAL: &str = "slotbook_booking_ops_total";

/// Histogram: booking operation latency in seconds, lock wait included. Labels: op.
pub const BOOKING_OP_DURATION_SECONDS: &str = "slotbook_booking_op_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: slots currently held by a reservation.
pub const SLOTS_BOOKED: &str = "slotbook_slots_booked";

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "slotbook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "slotbook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotbook_connections_rejected_total";

/// Counter: schedule commands refused because the session user is not the admin.
pub const ADMIN_DENIED_TOTAL: &str = "slotbook_admin_denied_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotbook_wal_flush_batch_size";

/// Counter: WAL compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "slotbook_wal_compactions_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertBooking { .. } => "insert_booking",
        Command::MoveBooking { .. } => "move_booking",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::SelectBookings => "select_bookings",
        Command::SelectFreeSlots { .. } => "select_free_slots",
        Command::SelectTrainers => "select_trainers",
        Command::SelectClasses => "select_classes",
        Command::InsertTrainer { .. } => "insert_trainer",
        Command::InsertClass { .. } => "insert_class",
        Command::InsertSlot { .. } => "insert_slot",
        Command::DeleteSlot { .. } => "delete_slot",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn labels_are_distinct() {
        let id = Ulid::new();
        let commands = [
            Command::InsertBooking {
                client_name: "a".into(),
                slot_id: id,
            },
            Command::MoveBooking { id, slot_id: id },
            Command::DeleteBooking { id },
            Command::SelectBookings,
            Command::SelectFreeSlots { trainer_id: id },
            Command::SelectTrainers,
            Command::SelectClasses,
            Command::DeleteSlot { id },
        ];
        let mut labels: Vec<_> = commands.iter().map(command_label).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), commands.len());
    }

    #[test]
    fn init_without_port_is_noop() {
        assert!(init(None).is_ok());
    }
}
