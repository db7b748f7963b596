use std::collections::HashMap;

use crate::model::*;

use super::EngineError;

/// Booked/free state of every schedule slot, indexed per trainer.
#[derive(Debug, Default)]
pub struct SlotStore {
    slots: HashMap<SlotId, Slot>,
    /// Trainer → slot ids, in chronological order.
    by_trainer: HashMap<TrainerId, Vec<SlotId>>,
}

impl SlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: &SlotId) -> Result<&Slot, EngineError> {
        self.slots.get(id).ok_or(EngineError::NotFound(*id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values()
    }

    pub fn booked_count(&self) -> usize {
        self.slots.values().filter(|s| s.booked).count()
    }

    /// Fails `SlotUnavailable` if the slot is missing or already booked.
    pub fn mark_booked(&mut self, id: &SlotId) -> Result<(), EngineError> {
        match self.slots.get_mut(id) {
            Some(slot) if !slot.booked => {
                slot.booked = true;
                Ok(())
            }
            _ => Err(EngineError::SlotUnavailable(*id)),
        }
    }

    /// Idempotent: freeing a free slot is a no-op.
    pub fn mark_free(&mut self, id: &SlotId) -> Result<(), EngineError> {
        let slot = self.slots.get_mut(id).ok_or(EngineError::NotFound(*id))?;
        slot.booked = false;
        Ok(())
    }

    pub fn insert(&mut self, slot: Slot) -> Result<(), EngineError> {
        if self.slots.contains_key(&slot.id) {
            return Err(EngineError::AlreadyExists(slot.id));
        }
        let key = slot.window.sort_key();
        let slots = &self.slots;
        let ids = self.by_trainer.entry(slot.trainer_id).or_default();
        let pos = ids.partition_point(|sid| {
            slots
                .get(sid)
                .is_some_and(|s| s.window.sort_key() <= key)
        });
        ids.insert(pos, slot.id);
        self.slots.insert(slot.id, slot);
        Ok(())
    }

    /// Remove an unbooked slot.
    pub fn remove(&mut self, id: &SlotId) -> Result<Slot, EngineError> {
        let slot = self.get(id)?;
        if slot.booked {
            return Err(EngineError::SlotInUse(*id));
        }
        let trainer_id = slot.trainer_id;
        if let Some(ids) = self.by_trainer.get_mut(&trainer_id) {
            ids.retain(|sid| sid != id);
            if ids.is_empty() {
                self.by_trainer.remove(&trainer_id);
            }
        }
        self.slots.remove(id).ok_or(EngineError::NotFound(*id))
    }

    /// First slot of `trainer_id` whose window overlaps `window`.
    pub fn find_overlap(&self, trainer_id: &TrainerId, window: &Window) -> Option<SlotId> {
        self.by_trainer.get(trainer_id).and_then(|ids| {
            ids.iter()
                .copied()
                .find(|sid| self.slots.get(sid).is_some_and(|s| s.window.overlaps(window)))
        })
    }

    /// Unbooked slots of a trainer, earliest first.
    pub fn free_for_trainer(&self, trainer_id: &TrainerId) -> Vec<Slot> {
        self.by_trainer
            .get(trainer_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|sid| self.slots.get(sid))
                    .filter(|s| !s.booked)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use ulid::Ulid;

    fn window(d: u32, h: u32) -> Window {
        Window::new(
            NaiveDate::from_ymd_opt(2025, 3, d).unwrap(),
            NaiveTime::from_hms_opt(h, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(h + 1, 0, 0).unwrap(),
        )
    }

    fn store_with(trainer: TrainerId, windows: &[Window]) -> (SlotStore, Vec<SlotId>) {
        let mut store = SlotStore::new();
        let ids = windows
            .iter()
            .map(|w| {
                let id = Ulid::new();
                store.insert(Slot::new(id, trainer, *w)).unwrap();
                id
            })
            .collect();
        (store, ids)
    }

    #[test]
    fn mark_booked_then_again_is_unavailable() {
        let (mut store, ids) = store_with(Ulid::new(), &[window(1, 9)]);
        store.mark_booked(&ids[0]).unwrap();
        assert!(store.get(&ids[0]).unwrap().booked);
        assert_eq!(
            store.mark_booked(&ids[0]),
            Err(EngineError::SlotUnavailable(ids[0]))
        );
    }

    #[test]
    fn mark_booked_missing_is_unavailable() {
        let mut store = SlotStore::new();
        let id = Ulid::new();
        assert_eq!(store.mark_booked(&id), Err(EngineError::SlotUnavailable(id)));
    }

    #[test]
    fn mark_free_is_idempotent() {
        let (mut store, ids) = store_with(Ulid::new(), &[window(1, 9)]);
        store.mark_booked(&ids[0]).unwrap();
        store.mark_free(&ids[0]).unwrap();
        store.mark_free(&ids[0]).unwrap();
        assert!(!store.get(&ids[0]).unwrap().booked);
    }

    #[test]
    fn mark_free_missing_is_not_found() {
        let mut store = SlotStore::new();
        let id = Ulid::new();
        assert_eq!(store.mark_free(&id), Err(EngineError::NotFound(id)));
    }

    #[test]
    fn duplicate_insert_rejected() {
        let trainer = Ulid::new();
        let (mut store, ids) = store_with(trainer, &[window(1, 9)]);
        let dup = Slot::new(ids[0], trainer, window(2, 9));
        assert_eq!(store.insert(dup), Err(EngineError::AlreadyExists(ids[0])));
    }

    #[test]
    fn free_slots_are_chronological_and_skip_booked() {
        let trainer = Ulid::new();
        let (mut store, ids) =
            store_with(trainer, &[window(2, 9), window(1, 14), window(1, 9)]);
        store.mark_booked(&ids[1]).unwrap();

        let free: Vec<SlotId> = store.free_for_trainer(&trainer).iter().map(|s| s.id).collect();
        assert_eq!(free, vec![ids[2], ids[0]]);
    }

    #[test]
    fn free_slots_scoped_to_trainer() {
        let (store, _) = store_with(Ulid::new(), &[window(1, 9)]);
        assert!(store.free_for_trainer(&Ulid::new()).is_empty());
    }

    #[test]
    fn remove_booked_slot_rejected() {
        let (mut store, ids) = store_with(Ulid::new(), &[window(1, 9)]);
        store.mark_booked(&ids[0]).unwrap();
        assert_eq!(store.remove(&ids[0]), Err(EngineError::SlotInUse(ids[0])));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_free_slot_drops_index() {
        let trainer = Ulid::new();
        let (mut store, ids) = store_with(trainer, &[window(1, 9)]);
        store.remove(&ids[0]).unwrap();
        assert!(store.is_empty());
        assert!(store.free_for_trainer(&trainer).is_empty());
        assert_eq!(store.get(&ids[0]), Err(EngineError::NotFound(ids[0])));
    }

    #[test]
    fn overlap_detection_per_trainer() {
        let trainer = Ulid::new();
        let (store, ids) = store_with(trainer, &[window(1, 9)]);
        let clash = Window::new(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        );
        assert_eq!(store.find_overlap(&trainer, &clash), Some(ids[0]));
        assert_eq!(store.find_overlap(&trainer, &window(1, 10)), None);
        assert_eq!(store.find_overlap(&Ulid::new(), &clash), None);
    }
}
