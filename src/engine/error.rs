use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Target slot missing or already booked.
    SlotUnavailable(Ulid),
    /// Referenced slot does not exist.
    InvalidSlot(Ulid),
    /// Caller does not own the reservation, or it does not exist.
    Forbidden(Ulid),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Slot is still bound to a reservation.
    SlotInUse(Ulid),
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// SQLSTATE reported to wire clients.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            EngineError::SlotUnavailable(_) => "23P01",
            EngineError::InvalidSlot(_) | EngineError::InvalidInput(_) => "22023",
            EngineError::Forbidden(_) => "42501",
            EngineError::NotFound(_) => "02000",
            EngineError::AlreadyExists(_) => "23505",
            EngineError::SlotInUse(_) => "23503",
            EngineError::LimitExceeded(_) => "54000",
            EngineError::WalError(_) => "58030",
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::SlotUnavailable(_) => "slot_unavailable",
            EngineError::InvalidSlot(_) => "invalid_slot",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::SlotInUse(_) => "slot_in_use",
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal_error",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::SlotUnavailable(id) => write!(f, "slot unavailable: {id}"),
            EngineError::InvalidSlot(id) => write!(f, "invalid slot: {id}"),
            EngineError::Forbidden(id) => write!(f, "access denied to reservation: {id}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::SlotInUse(id) => {
                write!(f, "cannot remove slot {id}: it is booked")
            }
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
