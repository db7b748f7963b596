use tracing::info;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

fn validate_name(name: &str, what: &'static str) -> Result<String, EngineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidInput(what));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(name.to_string())
}

fn validate_window(window: &Window) -> Result<(), EngineError> {
    if !window.is_valid() {
        return Err(EngineError::InvalidInput("window must end after it starts"));
    }
    Ok(())
}

/// Schedule administration: directory entries and slots.
impl Engine {
    pub async fn add_trainer(
        &self,
        id: TrainerId,
        name: &str,
        specialization: Option<&str>,
    ) -> Result<(), EngineError> {
        let name = validate_name(name, "trainer name must not be empty")?;
        let specialization = specialization
            .map(|s| validate_name(s, "specialization must not be empty"))
            .transpose()?;

        let _commit = self.ledger.write().await;
        if self.trainers.len() >= MAX_TRAINERS {
            return Err(EngineError::LimitExceeded("too many trainers"));
        }
        if self.trainers.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::TrainerAdded {
            id,
            name: name.clone(),
            specialization: specialization.clone(),
        };
        self.wal_append(&event).await?;
        self.trainers.insert(
            id,
            Trainer {
                id,
                name,
                specialization,
            },
        );
        info!("trainer {id} added");
        Ok(())
    }

    pub async fn add_class(
        &self,
        id: ClassId,
        title: &str,
        trainer_id: Option<TrainerId>,
        window: Window,
    ) -> Result<(), EngineError> {
        let title = validate_name(title, "class title must not be empty")?;
        validate_window(&window)?;

        let _commit = self.ledger.write().await;
        if self.classes.len() >= MAX_CLASSES {
            return Err(EngineError::LimitExceeded("too many classes"));
        }
        if self.classes.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if let Some(tid) = trainer_id
            && !self.trainers.contains_key(&tid)
        {
            return Err(EngineError::NotFound(tid));
        }

        let event = Event::ClassAdded {
            id,
            title: title.clone(),
            trainer_id,
            window,
        };
        self.wal_append(&event).await?;
        self.classes.insert(
            id,
            GroupClass {
                id,
                title,
                trainer_id,
                window,
            },
        );
        info!("class {id} added");
        Ok(())
    }

    /// Publish a new free slot. A trainer's slots may not overlap.
    pub async fn add_slot(
        &self,
        id: SlotId,
        trainer_id: TrainerId,
        window: Window,
    ) -> Result<(), EngineError> {
        validate_window(&window)?;

        let mut ledger = self.ledger.write().await;
        if ledger.slots.len() >= MAX_SLOTS {
            return Err(EngineError::LimitExceeded("too many slots"));
        }
        if !self.trainers.contains_key(&trainer_id) {
            return Err(EngineError::NotFound(trainer_id));
        }
        if ledger.slots.get(&id).is_ok() {
            return Err(EngineError::AlreadyExists(id));
        }
        if ledger.slots.find_overlap(&trainer_id, &window).is_some() {
            return Err(EngineError::InvalidInput("slot overlaps another slot of this trainer"));
        }

        let event = Event::SlotAdded {
            id,
            trainer_id,
            window,
        };
        self.wal_append(&event).await?;
        ledger.slots.insert(Slot::new(id, trainer_id, window))?;
        info!("slot {id} added for trainer {trainer_id}");
        Ok(())
    }

    /// Withdraw a slot. Booked slots cannot be removed.
    pub async fn remove_slot(&self, id: SlotId) -> Result<(), EngineError> {
        let mut ledger = self.ledger.write().await;
        if ledger.slots.get(&id)?.booked {
            return Err(EngineError::SlotInUse(id));
        }

        let event = Event::SlotRemoved { id };
        self.wal_append(&event).await?;
        ledger.slots.remove(&id)?;
        info!("slot {id} removed");
        Ok(())
    }
}
