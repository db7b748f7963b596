use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// The client's reservations, oldest first, joined with slot time and trainer name.
    /// Rows whose slot or trainer cannot be resolved are left out.
    pub async fn list_for_client(&self, client: &ClientId) -> Vec<ReservationView> {
        let ledger = self.ledger.read().await;
        ledger
            .reservations
            .list_for_client(client)
            .into_iter()
            .filter_map(|r| {
                let slot = ledger.slots.get(&r.slot_id).ok()?;
                let trainer_name = self.trainers.get(&r.trainer_id)?.name.clone();
                Some(ReservationView {
                    id: r.id,
                    display_name: r.display_name.clone(),
                    trainer_name,
                    window: slot.window,
                })
            })
            .collect()
    }

    /// Unbooked slots of a trainer, earliest first.
    pub async fn free_slots(&self, trainer_id: &TrainerId) -> Vec<Slot> {
        self.ledger.read().await.slots.free_for_trainer(trainer_id)
    }

    pub async fn get_slot(&self, id: &SlotId) -> Result<Slot, EngineError> {
        self.ledger.read().await.slots.get(id).cloned()
    }

    pub async fn get_reservation(&self, id: &ReservationId) -> Result<Reservation, EngineError> {
        self.ledger.read().await.reservations.get(id).cloned()
    }

    /// All trainers, by name.
    pub fn trainers(&self) -> Vec<Trainer> {
        let mut out: Vec<Trainer> = self.trainers.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    /// All group classes in chronological order, with the trainer's name when known.
    pub fn classes(&self) -> Vec<ClassView> {
        let mut out: Vec<ClassView> = self
            .classes
            .iter()
            .map(|e| {
                let c = e.value();
                ClassView {
                    id: c.id,
                    title: c.title.clone(),
                    trainer_name: c
                        .trainer_id
                        .and_then(|tid| self.trainers.get(&tid).map(|t| t.name.clone())),
                    window: c.window,
                }
            })
            .collect();
        out.sort_by_key(|c| (c.window.sort_key(), c.id));
        out
    }

    /// Slots violating booked ⇔ exactly one bound reservation. Empty when consistent.
    pub async fn verify_bindings(&self) -> Vec<SlotId> {
        self.ledger.read().await.binding_violations()
    }
}
