mod booking;
mod error;
mod guard;
mod queries;
mod reservations;
mod schedule;
mod slots;

pub use error::EngineError;
pub use guard::AccessGuard;
pub use reservations::ReservationStore;
pub use slots::SlotStore;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{error, info, warn};

use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Every append already queued when the first one arrives
/// joins the same batch and shares a single fsync. Exits if a failed batch
/// cannot be cut back out of the log; later appends then fail.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    let mut batch: Vec<PendingAppend> = Vec::new();
    while let Some(cmd) = rx.recv().await {
        let mut control = match cmd {
            WalCommand::Append { event, response } => {
                batch.push((event, response));
                None
            }
            other => Some(other),
        };
        while control.is_none() {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => control = Some(other),
                Err(_) => break,
            }
        }
        if !batch.is_empty()
            && let Err(e) = commit_batch(&mut wal, &mut batch)
        {
            error!("WAL writer stopping, log could not be rolled back: {e}");
            return;
        }
        if let Some(cmd) = control {
            handle_control(&mut wal, cmd);
        }
    }
}

/// Append and fsync a batch, then answer every caller. A failed batch is
/// truncated off the log so callers that undo in memory match what replay sees.
/// Errors only when that truncation fails.
fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) -> io::Result<()> {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mark = wal.synced_len();
    let outcome = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    let rollback = match &outcome {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!("WAL batch of {} failed: {e}", batch.len());
            wal.truncate_to(mark)
        }
    };

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let reply = match &outcome {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
    rollback
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched"),
    }
}

// ── Ledger ───────────────────────────────────────────────

/// The slot store and reservation store. Always locked together so every
/// booking operation is observed either fully applied or not at all.
#[derive(Debug, Default)]
pub struct Ledger {
    pub slots: SlotStore,
    pub reservations: ReservationStore,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-apply a logged ledger event. Directory events are ignored here.
    fn replay(&mut self, event: &Event) -> Result<(), EngineError> {
        match event {
            Event::SlotAdded {
                id,
                trainer_id,
                window,
            } => self.slots.insert(Slot::new(*id, *trainer_id, *window)),
            Event::SlotRemoved { id } => self.slots.remove(id).map(|_| ()),
            Event::ReservationCreated {
                id,
                owner,
                display_name,
                slot_id,
                ..
            } => self
                .bind(Some(*id), owner.clone(), display_name.clone(), *slot_id)
                .map(|_| ()),
            Event::ReservationMoved { id, to_slot, .. } => self.rebind(id, *to_slot).map(|_| ()),
            Event::ReservationCancelled { id, .. } => self.unbind(id).map(|_| ()),
            Event::TrainerAdded { .. } | Event::ClassAdded { .. } => Ok(()),
        }
    }

    /// Slots whose `booked` flag disagrees with the number of reservations
    /// bound to them (booked ⇔ exactly one).
    pub fn binding_violations(&self) -> Vec<SlotId> {
        let mut refs: HashMap<SlotId, usize> = HashMap::new();
        for r in self.reservations.iter() {
            *refs.entry(r.slot_id).or_default() += 1;
        }
        let mut bad: Vec<SlotId> = self
            .slots
            .iter()
            .filter(|s| {
                let n = refs.remove(&s.id).unwrap_or(0);
                s.booked != (n == 1) || n > 1
            })
            .map(|s| s.id)
            .collect();
        // reservations pointing at slots that no longer exist
        bad.extend(refs.into_keys());
        bad.sort();
        bad
    }
}

// ── Engine ───────────────────────────────────────────────

pub struct Engine {
    /// Held for writing across validate → apply → WAL append of every mutation.
    pub(super) ledger: RwLock<Ledger>,
    pub(super) trainers: DashMap<TrainerId, Trainer>,
    pub(super) classes: DashMap<ClassId, GroupClass>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start the group-commit writer.
    /// Must be called inside a tokio runtime.
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut ledger = Ledger::new();
        let trainers = DashMap::new();
        let classes = DashMap::new();

        for event in &events {
            match event {
                Event::TrainerAdded {
                    id,
                    name,
                    specialization,
                } => {
                    trainers.insert(
                        *id,
                        Trainer {
                            id: *id,
                            name: name.clone(),
                            specialization: specialization.clone(),
                        },
                    );
                }
                Event::ClassAdded {
                    id,
                    title,
                    trainer_id,
                    window,
                } => {
                    classes.insert(
                        *id,
                        GroupClass {
                            id: *id,
                            title: title.clone(),
                            trainer_id: *trainer_id,
                            window: *window,
                        },
                    );
                }
                other => {
                    if let Err(e) = ledger.replay(other) {
                        warn!("replay: skipping {other:?}: {e}");
                    }
                }
            }
        }

        let violations = ledger.binding_violations();
        if !violations.is_empty() {
            warn!("replay: {} slot(s) with inconsistent bindings: {violations:?}", violations.len());
        }
        metrics::gauge!(crate::observability::SLOTS_BOOKED).set(ledger.slots.booked_count() as f64);
        info!(
            "replayed {} events: {} trainers, {} slots, {} reservations",
            events.len(),
            trainers.len(),
            ledger.slots.len(),
            ledger.reservations.len()
        );

        Ok(Self {
            ledger: RwLock::new(ledger),
            trainers,
            classes,
            wal_tx,
        })
    }

    /// Durably log one event through the group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Rewrite the WAL as the minimal event set that recreates current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Every writer holds the ledger write lock across its append, so a
        // read lock freezes both the state and the log while we swap.
        let ledger = self.ledger.read().await;

        let mut trainers: Vec<Trainer> = self.trainers.iter().map(|e| e.value().clone()).collect();
        trainers.sort_by_key(|t| t.id);
        let mut classes: Vec<GroupClass> = self.classes.iter().map(|e| e.value().clone()).collect();
        classes.sort_by_key(|c| c.id);
        let mut slots: Vec<&Slot> = ledger.slots.iter().collect();
        slots.sort_by_key(|s| s.id);
        let mut reservations: Vec<&Reservation> = ledger.reservations.iter().collect();
        reservations.sort_by_key(|r| r.seq);

        let mut events = Vec::with_capacity(
            trainers.len() + classes.len() + slots.len() + reservations.len(),
        );
        events.extend(trainers.into_iter().map(|t| Event::TrainerAdded {
            id: t.id,
            name: t.name,
            specialization: t.specialization,
        }));
        events.extend(classes.into_iter().map(|c| Event::ClassAdded {
            id: c.id,
            title: c.title,
            trainer_id: c.trainer_id,
            window: c.window,
        }));
        events.extend(slots.into_iter().map(|s| Event::SlotAdded {
            id: s.id,
            trainer_id: s.trainer_id,
            window: s.window,
        }));
        events.extend(reservations.into_iter().map(|r| Event::ReservationCreated {
            id: r.id,
            owner: r.owner.clone(),
            display_name: r.display_name.clone(),
            slot_id: r.slot_id,
            trainer_id: r.trainer_id,
        }));

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[cfg(test)]
impl Engine {
    /// Replace the writer channel with one nobody reads, so every append fails.
    pub(super) fn disconnect_wal(&mut self) {
        let (tx, _) = mpsc::channel(1);
        self.wal_tx = tx;
    }
}
