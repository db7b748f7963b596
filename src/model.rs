use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type SlotId = Ulid;
pub type ReservationId = Ulid;
pub type TrainerId = Ulid;
pub type ClassId = Ulid;

/// Authenticated caller identity, as supplied by the session handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Time range `[start, end)` on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Window {
    pub fn new(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "Window start must be before end");
        Self { date, start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    pub fn overlaps(&self, other: &Window) -> bool {
        self.date == other.date && self.start < other.end && other.start < self.end
    }

    /// Chronological ordering key.
    pub fn sort_key(&self) -> (NaiveDate, NaiveTime) {
        (self.date, self.start)
    }
}

/// A bookable trainer time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub trainer_id: TrainerId,
    pub window: Window,
    pub booked: bool,
}

impl Slot {
    pub fn new(id: SlotId, trainer_id: TrainerId, window: Window) -> Self {
        Self {
            id,
            trainer_id,
            window,
            booked: false,
        }
    }
}

/// A client's claim on exactly one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: ReservationId,
    pub owner: ClientId,
    pub display_name: String,
    pub slot_id: SlotId,
    /// Denormalized from the bound slot.
    pub trainer_id: TrainerId,
    /// Insertion order, assigned by the reservation store.
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trainer {
    pub id: TrainerId,
    pub name: String,
    pub specialization: Option<String>,
}

/// Group class. No occupancy limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupClass {
    pub id: ClassId,
    pub title: String,
    pub trainer_id: Option<TrainerId>,
    pub window: Window,
}

/// One variant per state change. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TrainerAdded {
        id: TrainerId,
        name: String,
        specialization: Option<String>,
    },
    ClassAdded {
        id: ClassId,
        title: String,
        trainer_id: Option<TrainerId>,
        window: Window,
    },
    SlotAdded {
        id: SlotId,
        trainer_id: TrainerId,
        window: Window,
    },
    SlotRemoved {
        id: SlotId,
    },
    ReservationCreated {
        id: ReservationId,
        owner: ClientId,
        display_name: String,
        slot_id: SlotId,
        trainer_id: TrainerId,
    },
    ReservationMoved {
        id: ReservationId,
        from_slot: SlotId,
        to_slot: SlotId,
        trainer_id: TrainerId,
    },
    ReservationCancelled {
        id: ReservationId,
        slot_id: SlotId,
    },
}

// ── Query result types ───────────────────────────────────────────

/// One row of a client's reservation listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationView {
    pub id: ReservationId,
    pub display_name: String,
    pub trainer_name: String,
    pub window: Window,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassView {
    pub id: ClassId,
    pub title: String,
    pub trainer_name: Option<String>,
    pub window: Window,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn window_overlap_same_day() {
        let a = Window::new(day(1), at(9, 0), at(10, 0));
        let b = Window::new(day(1), at(9, 30), at(10, 30));
        let c = Window::new(day(1), at(10, 0), at(11, 0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn window_overlap_needs_same_date() {
        let a = Window::new(day(1), at(9, 0), at(10, 0));
        let b = Window::new(day(2), at(9, 0), at(10, 0));
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn window_sort_key_is_chronological() {
        let mut windows = [
            Window::new(day(2), at(8, 0), at(9, 0)),
            Window::new(day(1), at(14, 0), at(15, 0)),
            Window::new(day(1), at(9, 0), at(10, 0)),
        ];
        windows.sort_by_key(|w| w.sort_key());
        assert_eq!(windows[0].start, at(9, 0));
        assert_eq!(windows[1].start, at(14, 0));
        assert_eq!(windows[2].date, day(2));
    }

    #[test]
    fn inverted_window_is_invalid() {
        let w = Window {
            date: day(1),
            start: at(11, 0),
            end: at(10, 0),
        };
        assert!(!w.is_valid());
    }

    #[test]
    fn new_slot_starts_free() {
        let slot = Slot::new(Ulid::new(), Ulid::new(), Window::new(day(1), at(9, 0), at(10, 0)));
        assert!(!slot.booked);
    }

    #[test]
    fn client_id_display() {
        let c = ClientId::from("anna");
        assert_eq!(c.to_string(), "anna");
        assert_eq!(c.as_str(), "anna");
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationCreated {
            id: Ulid::new(),
            owner: ClientId::new("anna"),
            display_name: "Anna K.".into(),
            slot_id: Ulid::new(),
            trainer_id: Ulid::new(),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
