//! Hard caps. A caller that exceeds one gets `LimitExceeded`, never OOM.

pub const MAX_PITCHES: usize = 10_000;

pub const MAX_SCHEDULES_PER_PITCH: usize = 256;

/// Bookings are never deleted, so this bounds the full history of a pitch.
pub const MAX_BOOKINGS_PER_PITCH: usize = 100_000;

pub const MAX_LOBBIES: usize = 100_000;

/// Ceiling on `max_players` at lobby creation.
pub const MAX_LOBBY_CAPACITY: u32 = 64;

pub const MAX_WINDOWS_PER_PLAYER: usize = 64;

pub const MAX_NAME_LEN: usize = 256;
