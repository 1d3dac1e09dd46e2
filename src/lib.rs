//! pitchlock — availability/booking/lobby coordination engine.
//!
//! Facility owners publish recurring weekly availability windows per pitch;
//! players reserve slots against them and self-organize into capacity-bounded
//! lobbies. The engine's job is the part that is easy to get wrong under
//! concurrency: a booking is accepted only if a published window covers it
//! and no pending/confirmed booking collides with it, and a lobby never
//! exceeds its capacity — both enforced by per-entity write locks around each
//! read-check-write unit, made durable by a group-committed WAL, and surfaced
//! to live-sync subscribers through a per-topic change feed.

pub mod clock;
pub mod compactor;
pub mod engine;
pub mod feed;
pub mod limits;
pub mod model;
pub mod observability;
pub mod wal;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{Engine, EngineConfig, EngineError};
pub use feed::{Change, ChangeFeed, ChangeKind, EntityKind, Topic};
pub use model::{
    Booking, BookingStatus, Event, Lobby, LobbyStatus, Participant, PitchState, PlayerWindow,
    Schedule, TimeRange,
};
