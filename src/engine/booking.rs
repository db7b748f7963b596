use std::time::Instant;

use tracing::{debug, info};

use crate::limits::*;
use crate::model::*;

use super::guard::AccessGuard;
use super::{Engine, EngineError, Ledger};

/// Where a moved reservation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Moved {
    pub from_slot: SlotId,
    pub to_trainer: TrainerId,
}

// ── Ledger transitions ───────────────────────────────────
//
// Each transition is all-or-nothing on the ledger: a failing step undoes
// the steps before it. They are shared by live operations and WAL replay.

impl Ledger {
    /// Bind a new reservation to a free slot, capturing the slot's trainer.
    pub(super) fn bind(
        &mut self,
        id: Option<ReservationId>,
        owner: ClientId,
        display_name: String,
        slot_id: SlotId,
    ) -> Result<ReservationId, EngineError> {
        let slot = self
            .slots
            .get(&slot_id)
            .map_err(|_| EngineError::SlotUnavailable(slot_id))?;
        if slot.booked {
            return Err(EngineError::SlotUnavailable(slot_id));
        }
        let trainer_id = slot.trainer_id;

        let id = match id {
            Some(id) => {
                self.reservations
                    .create_with_id(id, owner, display_name, slot_id, trainer_id)?;
                id
            }
            None => self
                .reservations
                .create(owner, display_name, slot_id, trainer_id),
        };
        if let Err(e) = self.slots.mark_booked(&slot_id) {
            let _ = self.reservations.delete(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// Move a reservation to `to_slot`: free the old slot, rebind, book the new one.
    /// Moving onto the reservation's own slot is allowed and changes nothing.
    pub(super) fn rebind(
        &mut self,
        id: &ReservationId,
        to_slot: SlotId,
    ) -> Result<Moved, EngineError> {
        let reservation = self.reservations.get(id)?;
        let (from_slot, from_trainer) = (reservation.slot_id, reservation.trainer_id);

        let target = self
            .slots
            .get(&to_slot)
            .map_err(|_| EngineError::InvalidSlot(to_slot))?;
        if target.booked && to_slot != from_slot {
            return Err(EngineError::SlotUnavailable(to_slot));
        }
        let to_trainer = target.trainer_id;

        self.slots.mark_free(&from_slot)?;
        if let Err(e) = self.reservations.rebind(id, to_slot, to_trainer) {
            let _ = self.slots.mark_booked(&from_slot);
            return Err(e);
        }
        if let Err(e) = self.slots.mark_booked(&to_slot) {
            let _ = self.reservations.rebind(id, from_slot, from_trainer);
            let _ = self.slots.mark_booked(&from_slot);
            return Err(e);
        }
        Ok(Moved {
            from_slot,
            to_trainer,
        })
    }

    /// Delete a reservation and free its slot.
    pub(super) fn unbind(&mut self, id: &ReservationId) -> Result<Reservation, EngineError> {
        let removed = self.reservations.delete(id)?;
        if let Err(e) = self.slots.mark_free(&removed.slot_id) {
            let _ = self.reservations.restore(removed);
            return Err(e);
        }
        Ok(removed)
    }

    /// Inverse of `unbind`.
    pub(super) fn rebook(&mut self, reservation: Reservation) -> Result<(), EngineError> {
        let (id, slot_id) = (reservation.id, reservation.slot_id);
        self.slots.mark_booked(&slot_id)?;
        if let Err(e) = self.reservations.restore(reservation) {
            let _ = self.slots.mark_free(&slot_id);
            return Err(e);
        }
        debug!("restored reservation {id} on slot {slot_id}");
        Ok(())
    }
}

// ── Validation ───────────────────────────────────────────

pub(super) fn validate_client(client: &ClientId) -> Result<(), EngineError> {
    if client.as_str().trim().is_empty() {
        return Err(EngineError::InvalidInput("client id must not be empty"));
    }
    if client.as_str().len() > MAX_CLIENT_ID_LEN {
        return Err(EngineError::LimitExceeded("client id too long"));
    }
    Ok(())
}

fn validate_display_name(name: &str) -> Result<String, EngineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidInput("display name must not be empty"));
    }
    if name.len() > MAX_DISPLAY_NAME_LEN {
        return Err(EngineError::LimitExceeded("display name too long"));
    }
    Ok(name.to_string())
}

fn record_op<T>(op: &'static str, started: Instant, result: &Result<T, EngineError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(crate::observability::BOOKING_OPS_TOTAL, "op" => op, "outcome" => outcome)
        .increment(1);
    metrics::histogram!(crate::observability::BOOKING_OP_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}

// ── Booking operations ───────────────────────────────────

impl Engine {
    /// Reserve `slot_id` for `client`. Returns the new reservation id.
    pub async fn create_reservation(
        &self,
        client: &ClientId,
        display_name: &str,
        slot_id: SlotId,
    ) -> Result<ReservationId, EngineError> {
        let started = Instant::now();
        let result = self.create_inner(client, display_name, slot_id).await;
        record_op("create", started, &result);
        result
    }

    async fn create_inner(
        &self,
        client: &ClientId,
        display_name: &str,
        slot_id: SlotId,
    ) -> Result<ReservationId, EngineError> {
        validate_client(client)?;
        let display_name = validate_display_name(display_name)?;

        let mut ledger = self.ledger.write().await;
        if ledger.reservations.count_for_client(client) >= MAX_RESERVATIONS_PER_CLIENT {
            return Err(EngineError::LimitExceeded("too many reservations for client"));
        }

        let id = ledger.bind(None, client.clone(), display_name.clone(), slot_id)?;
        let trainer_id = ledger.reservations.get(&id)?.trainer_id;

        let event = Event::ReservationCreated {
            id,
            owner: client.clone(),
            display_name,
            slot_id,
            trainer_id,
        };
        if let Err(e) = self.wal_append(&event).await {
            let _ = ledger.unbind(&id);
            return Err(e);
        }

        metrics::gauge!(crate::observability::SLOTS_BOOKED).increment(1.0);
        info!("client {client} booked slot {slot_id} as reservation {id}");
        Ok(id)
    }

    /// Move `client`'s reservation to `new_slot`. The destination is re-checked
    /// under the ledger lock, so it must be free (or already this reservation's).
    pub async fn move_reservation(
        &self,
        client: &ClientId,
        reservation_id: ReservationId,
        new_slot: SlotId,
    ) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self.move_inner(client, reservation_id, new_slot).await;
        record_op("move", started, &result);
        result
    }

    async fn move_inner(
        &self,
        client: &ClientId,
        reservation_id: ReservationId,
        new_slot: SlotId,
    ) -> Result<(), EngineError> {
        let mut ledger = self.ledger.write().await;
        AccessGuard::new(&ledger.reservations).authorize(client, &reservation_id)?;

        let moved = ledger.rebind(&reservation_id, new_slot)?;

        let event = Event::ReservationMoved {
            id: reservation_id,
            from_slot: moved.from_slot,
            to_slot: new_slot,
            trainer_id: moved.to_trainer,
        };
        if let Err(e) = self.wal_append(&event).await {
            let _ = ledger.rebind(&reservation_id, moved.from_slot);
            return Err(e);
        }

        info!(
            "client {client} moved reservation {reservation_id} from slot {} to {new_slot}",
            moved.from_slot
        );
        Ok(())
    }

    /// Cancel `client`'s reservation and free its slot.
    pub async fn cancel_reservation(
        &self,
        client: &ClientId,
        reservation_id: ReservationId,
    ) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self.cancel_inner(client, reservation_id).await;
        record_op("cancel", started, &result);
        result
    }

    async fn cancel_inner(
        &self,
        client: &ClientId,
        reservation_id: ReservationId,
    ) -> Result<(), EngineError> {
        let mut ledger = self.ledger.write().await;
        AccessGuard::new(&ledger.reservations).authorize(client, &reservation_id)?;

        let removed = ledger.unbind(&reservation_id)?;
        let slot_id = removed.slot_id;

        let event = Event::ReservationCancelled {
            id: reservation_id,
            slot_id,
        };
        if let Err(e) = self.wal_append(&event).await {
            let _ = ledger.rebook(removed);
            return Err(e);
        }

        metrics::gauge!(crate::observability::SLOTS_BOOKED).decrement(1.0);
        info!("client {client} cancelled reservation {reservation_id}, slot {slot_id} is free");
        Ok(())
    }
}
