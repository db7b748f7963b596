use std::collections::HashMap;

use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// Reservation → bound slot and owner, with a per-client index in insertion order.
#[derive(Debug, Default)]
pub struct ReservationStore {
    reservations: HashMap<ReservationId, Reservation>,
    /// Client → reservation ids, ascending by `seq`.
    by_client: HashMap<ClientId, Vec<ReservationId>>,
    next_seq: u64,
}

impl ReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.values()
    }

    /// Insert a new reservation bound to `slot_id` and return its id.
    pub fn create(
        &mut self,
        owner: ClientId,
        display_name: String,
        slot_id: SlotId,
        trainer_id: TrainerId,
    ) -> ReservationId {
        let mut id = Ulid::new();
        while self.reservations.contains_key(&id) {
            id = Ulid::new();
        }
        self.put(id, owner, display_name, slot_id, trainer_id);
        id
    }

    /// Insert under a known id (WAL replay).
    pub fn create_with_id(
        &mut self,
        id: ReservationId,
        owner: ClientId,
        display_name: String,
        slot_id: SlotId,
        trainer_id: TrainerId,
    ) -> Result<(), EngineError> {
        if self.reservations.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        self.put(id, owner, display_name, slot_id, trainer_id);
        Ok(())
    }

    fn put(
        &mut self,
        id: ReservationId,
        owner: ClientId,
        display_name: String,
        slot_id: SlotId,
        trainer_id: TrainerId,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.link(id, &owner, seq);
        self.reservations.insert(
            id,
            Reservation {
                id,
                owner,
                display_name,
                slot_id,
                trainer_id,
                seq,
            },
        );
    }

    /// Put a deleted reservation back at its original position.
    pub fn restore(&mut self, reservation: Reservation) -> Result<(), EngineError> {
        if self.reservations.contains_key(&reservation.id) {
            return Err(EngineError::AlreadyExists(reservation.id));
        }
        self.next_seq = self.next_seq.max(reservation.seq + 1);
        self.link(reservation.id, &reservation.owner, reservation.seq);
        self.reservations.insert(reservation.id, reservation);
        Ok(())
    }

    fn link(&mut self, id: ReservationId, owner: &ClientId, seq: u64) {
        let reservations = &self.reservations;
        let ids = self.by_client.entry(owner.clone()).or_default();
        let pos = ids.partition_point(|rid| reservations.get(rid).is_some_and(|r| r.seq < seq));
        ids.insert(pos, id);
    }

    pub fn rebind(
        &mut self,
        id: &ReservationId,
        slot_id: SlotId,
        trainer_id: TrainerId,
    ) -> Result<(), EngineError> {
        let r = self
            .reservations
            .get_mut(id)
            .ok_or(EngineError::NotFound(*id))?;
        r.slot_id = slot_id;
        r.trainer_id = trainer_id;
        Ok(())
    }

    pub fn get(&self, id: &ReservationId) -> Result<&Reservation, EngineError> {
        self.reservations.get(id).ok_or(EngineError::NotFound(*id))
    }

    /// All reservations owned by `owner`, oldest first.
    pub fn list_for_client(&self, owner: &ClientId) -> Vec<&Reservation> {
        self.by_client
            .get(owner)
            .map(|ids| ids.iter().filter_map(|id| self.reservations.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn count_for_client(&self, owner: &ClientId) -> usize {
        self.by_client.get(owner).map_or(0, Vec::len)
    }

    pub fn delete(&mut self, id: &ReservationId) -> Result<Reservation, EngineError> {
        let removed = self
            .reservations
            .remove(id)
            .ok_or(EngineError::NotFound(*id))?;
        if let Some(ids) = self.by_client.get_mut(&removed.owner) {
            ids.retain(|rid| rid != id);
            if ids.is_empty() {
                self.by_client.remove(&removed.owner);
            }
        }
        Ok(removed)
    }
}
