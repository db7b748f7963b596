use crate::model::*;

use super::reservations::ReservationStore;
use super::EngineError;

/// Ownership check gating every move and cancel.
pub struct AccessGuard<'a> {
    reservations: &'a ReservationStore,
}

impl<'a> AccessGuard<'a> {
    pub fn new(reservations: &'a ReservationStore) -> Self {
        Self { reservations }
    }

    /// Returns the reservation if `client` owns it. A missing reservation is
    /// reported as `Forbidden` too, so callers cannot learn whether an id exists.
    pub fn authorize(
        &self,
        client: &ClientId,
        reservation_id: &ReservationId,
    ) -> Result<&'a Reservation, EngineError> {
        match self.reservations.get(reservation_id) {
            Ok(r) if &r.owner == client => Ok(r),
            _ => Err(EngineError::Forbidden(*reservation_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn owner_is_authorized() {
        let mut store = ReservationStore::new();
        let owner = ClientId::new("anna");
        let id = store.create(owner.clone(), "Anna".into(), Ulid::new(), Ulid::new());

        let r = AccessGuard::new(&store).authorize(&owner, &id).unwrap();
        assert_eq!(r.id, id);
    }

    #[test]
    fn other_client_is_forbidden() {
        let mut store = ReservationStore::new();
        let id = store.create(ClientId::new("anna"), "Anna".into(), Ulid::new(), Ulid::new());

        let result = AccessGuard::new(&store).authorize(&ClientId::new("bohdan"), &id);
        assert_eq!(result, Err(EngineError::Forbidden(id)));
    }

    #[test]
    fn missing_reservation_is_forbidden_not_not_found() {
        let store = ReservationStore::new();
        let id = Ulid::new();
        let result = AccessGuard::new(&store).authorize(&ClientId::new("anna"), &id);
        assert_eq!(result, Err(EngineError::Forbidden(id)));
    }
}
