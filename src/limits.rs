/// Max trainers in the directory.
pub const MAX_TRAINERS: usize = 10_000;

/// Max group classes in the directory.
pub const MAX_CLASSES: usize = 100_000;

/// Max schedule slots held by the engine.
pub const MAX_SLOTS: usize = 1_000_000;

/// Max live reservations a single client may hold.
pub const MAX_RESERVATIONS_PER_CLIENT: usize = 64;

/// Max length of trainer names, class titles and specializations.
pub const MAX_NAME_LEN: usize = 256;

/// Max length of the display name attached to a reservation.
pub const MAX_DISPLAY_NAME_LEN: usize = 128;

/// Max length of a client id (pgwire login user).
pub const MAX_CLIENT_ID_LEN: usize = 128;
