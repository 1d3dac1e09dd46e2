use ulid::Ulid;

use crate::model::{BookingStatus, LobbyStatus};

/// Every public operation fails fast with one of these; no operation retries
/// internally and no failed operation leaves partial state behind.
#[derive(Debug)]
pub enum EngineError {
    /// Malformed input shape or range.
    Validation(&'static str),
    /// No available schedule window fully contains the requested slot.
    NoAvailability,
    /// The requested slot overlaps an existing pending/confirmed booking.
    SlotConflict(Ulid),
    /// A new schedule overlaps an existing available one on the same day.
    ScheduleOverlap(Ulid),
    /// A new player window overlaps an existing one on the same day.
    WindowOverlap(Ulid),
    /// Join attempted on a lobby already at `max_players`.
    CapacityFull { max_players: u32 },
    /// The player is already a participant of the lobby.
    AlreadyJoined(Ulid),
    /// The player is not a participant of the lobby.
    NotParticipant(Ulid),
    /// The requested booking status change is not in the transition table.
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    /// Operation attempted against a lobby in a terminal state.
    LobbyClosed { id: Ulid, status: LobbyStatus },
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The actor is not authorized for this transition.
    Forbidden(&'static str),
    LimitExceeded(&'static str),
    /// The store could not commit the atomic unit. Callers may retry.
    Store(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::NoAvailability => {
                write!(f, "no available schedule window covers the requested slot")
            }
            EngineError::SlotConflict(id) => write!(f, "slot conflicts with booking: {id}"),
            EngineError::ScheduleOverlap(id) => {
                write!(f, "window overlaps existing schedule: {id}")
            }
            EngineError::WindowOverlap(id) => {
                write!(f, "window overlaps existing player window: {id}")
            }
            EngineError::CapacityFull { max_players } => {
                write!(f, "lobby is full: {max_players} players")
            }
            EngineError::AlreadyJoined(id) => write!(f, "player already in lobby: {id}"),
            EngineError::NotParticipant(id) => write!(f, "player not in lobby: {id}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid booking transition: {from} -> {to}")
            }
            EngineError::LobbyClosed { id, status } => {
                write!(f, "lobby {id} is {status}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
