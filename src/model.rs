use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minutes since midnight — the only time-of-day type.
pub type Minute = u16;

pub const MINUTES_PER_DAY: Minute = 1440;

/// Sunday-based day of week (0 = Sunday … 6 = Saturday), matching the
/// stored schema.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Half-open time-of-day range `[start, end)`, minute granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Minute,
    pub end: Minute,
}

impl TimeRange {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "TimeRange start must be before end");
        Self { start, end }
    }

    pub fn duration_mins(&self) -> Minute {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// A recurring weekly availability window on a pitch. Price is stored in
/// integer minor units (pence) — no floating-point money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Ulid,
    pub pitch_id: Ulid,
    pub day_of_week: u8,
    pub window: TimeRange,
    pub is_peak: bool,
    pub price: u32,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    /// Active bookings hold their slot against new reservations.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Rejected | BookingStatus::Cancelled)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A single-slot reservation against a pitch on a calendar date.
/// Never deleted — only status-transitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub pitch_id: Ulid,
    pub booker_id: Ulid,
    pub date: NaiveDate,
    pub slot: TimeRange,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyStatus {
    Open,
    Filled,
    Cancelled,
}

impl std::fmt::Display for LobbyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LobbyStatus::Open => "open",
            LobbyStatus::Filled => "filled",
            LobbyStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A player's membership record within a lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub player_id: Ulid,
    pub joined_at: DateTime<Utc>,
}

/// A group-formation session, optionally tied to a booking. The lobby owns
/// its participant set; a linked booking is referenced, never owned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lobby {
    pub id: Ulid,
    pub creator_id: Ulid,
    pub pitch_id: Ulid,
    pub booking_id: Option<Ulid>,
    pub date: NaiveDate,
    pub slot: TimeRange,
    pub min_players: u32,
    pub max_players: u32,
    pub status: LobbyStatus,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
}

impl Lobby {
    pub fn player_count(&self) -> u32 {
        self.participants.len() as u32
    }

    pub fn slots_remaining(&self) -> u32 {
        self.max_players.saturating_sub(self.player_count())
    }

    pub fn has_minimum(&self) -> bool {
        self.player_count() >= self.min_players
    }

    pub fn is_participant(&self, player_id: &Ulid) -> bool {
        self.participants.iter().any(|p| &p.player_id == player_id)
    }
}

/// A player's own recurring weekly availability window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerWindow {
    pub id: Ulid,
    pub player_id: Ulid,
    pub day_of_week: u8,
    pub window: TimeRange,
    pub created_at: DateTime<Utc>,
}

/// Everything the engine knows about one pitch: identity, ownership, the
/// weekly schedule grid, and every booking ever taken against it.
#[derive(Debug, Clone)]
pub struct PitchState {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub name: Option<String>,
    /// Sorted by (day_of_week, window.start) — this ordering is what makes
    /// listings and covering-window search deterministic.
    pub schedules: Vec<Schedule>,
    /// Sorted by (date, slot.start).
    pub bookings: Vec<Booking>,
}

impl PitchState {
    pub fn new(id: Ulid, owner_id: Ulid, name: Option<String>) -> Self {
        Self {
            id,
            owner_id,
            name,
            schedules: Vec::new(),
            bookings: Vec::new(),
        }
    }

    /// Insert a schedule maintaining (day_of_week, start) order.
    pub fn insert_schedule(&mut self, schedule: Schedule) {
        let pos = self.schedules.partition_point(|s| {
            (s.day_of_week, s.window.start) < (schedule.day_of_week, schedule.window.start)
        });
        self.schedules.insert(pos, schedule);
    }

    pub fn schedule_mut(&mut self, id: &Ulid) -> Option<&mut Schedule> {
        self.schedules.iter_mut().find(|s| &s.id == id)
    }

    /// Available schedules for one day, in start order.
    pub fn open_windows_on(&self, day: u8) -> impl Iterator<Item = &Schedule> {
        self.schedules
            .iter()
            .filter(move |s| s.day_of_week == day && s.is_available)
    }

    /// Insert a booking maintaining (date, start) order.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self.bookings.partition_point(|b| {
            (b.date, b.slot.start) < (booking.date, booking.slot.start)
        });
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| &b.id == id)
    }

    pub fn booking_mut(&mut self, id: &Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| &b.id == id)
    }

    /// Bookings on one date, using binary search over the sorted vector.
    pub fn bookings_on(&self, date: NaiveDate) -> &[Booking] {
        let lo = self.bookings.partition_point(|b| b.date < date);
        let hi = self.bookings.partition_point(|b| b.date <= date);
        &self.bookings[lo..hi]
    }
}

/// The event types — flat, no nesting. This is both the WAL record format
/// and the change-feed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PitchRegistered {
        id: Ulid,
        owner_id: Ulid,
        name: Option<String>,
    },
    ScheduleCreated {
        schedule: Schedule,
    },
    ScheduleRetired {
        id: Ulid,
        pitch_id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingStatusChanged {
        id: Ulid,
        pitch_id: Ulid,
        status: BookingStatus,
    },
    LobbyCreated {
        lobby: Lobby,
    },
    PlayerJoined {
        lobby_id: Ulid,
        participant: Participant,
        status: LobbyStatus,
    },
    PlayerLeft {
        lobby_id: Ulid,
        player_id: Ulid,
        status: LobbyStatus,
    },
    LobbyCancelled {
        id: Ulid,
    },
    PlayerWindowSet {
        window: PlayerWindow,
    },
    PlayerWindowRemoved {
        id: Ulid,
        player_id: Ulid,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn range_overlap_is_half_open() {
        let a = TimeRange::new(600, 720);
        let b = TimeRange::new(660, 780);
        let c = TimeRange::new(720, 840);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn range_containment() {
        let outer = TimeRange::new(1080, 1200); // 18:00-20:00
        let inner = TimeRange::new(1080, 1140); // 18:00-19:00
        let spill = TimeRange::new(1020, 1140); // 17:00-19:00
        assert!(outer.contains(&inner));
        assert!(outer.contains(&outer));
        assert!(!outer.contains(&spill));
    }

    #[test]
    fn sunday_based_weekday() {
        // 2025-06-01 was a Sunday, 2025-06-02 a Monday.
        assert_eq!(day_of_week(date(2025, 6, 1)), 0);
        assert_eq!(day_of_week(date(2025, 6, 2)), 1);
        assert_eq!(day_of_week(date(2025, 6, 7)), 6);
    }

    #[test]
    fn schedules_keep_day_then_start_order() {
        let mut ps = PitchState::new(Ulid::new(), Ulid::new(), None);
        for (day, start, end) in [(3u8, 600, 720), (1, 1080, 1200), (1, 540, 660), (0, 600, 720)] {
            ps.insert_schedule(Schedule {
                id: Ulid::new(),
                pitch_id: ps.id,
                day_of_week: day,
                window: TimeRange::new(start, end),
                is_peak: false,
                price: 1000,
                is_available: true,
                created_at: Utc::now(),
            });
        }
        let keys: Vec<_> = ps
            .schedules
            .iter()
            .map(|s| (s.day_of_week, s.window.start))
            .collect();
        assert_eq!(keys, vec![(0, 600), (1, 540), (1, 1080), (3, 600)]);
    }

    #[test]
    fn bookings_on_selects_single_date() {
        let mut ps = PitchState::new(Ulid::new(), Ulid::new(), None);
        let booker = Ulid::new();
        for (d, start) in [(2, 600u16), (3, 600), (3, 720), (4, 600)] {
            ps.insert_booking(Booking {
                id: Ulid::new(),
                pitch_id: ps.id,
                booker_id: booker,
                date: date(2025, 6, d),
                slot: TimeRange::new(start, start + 60),
                status: BookingStatus::Pending,
                created_at: Utc::now(),
            });
        }
        let day = ps.bookings_on(date(2025, 6, 3));
        assert_eq!(day.len(), 2);
        assert!(day.iter().all(|b| b.date == date(2025, 6, 3)));
        assert!(ps.bookings_on(date(2025, 6, 9)).is_empty());
    }

    #[test]
    fn lobby_counts() {
        let mut lobby = Lobby {
            id: Ulid::new(),
            creator_id: Ulid::new(),
            pitch_id: Ulid::new(),
            booking_id: None,
            date: date(2025, 6, 2),
            slot: TimeRange::new(1080, 1200),
            min_players: 4,
            max_players: 6,
            status: LobbyStatus::Open,
            created_at: Utc::now(),
            participants: Vec::new(),
        };
        assert_eq!(lobby.slots_remaining(), 6);
        assert!(!lobby.has_minimum());

        let p = Ulid::new();
        lobby.participants.push(Participant {
            player_id: p,
            joined_at: Utc::now(),
        });
        assert_eq!(lobby.player_count(), 1);
        assert_eq!(lobby.slots_remaining(), 5);
        assert!(lobby.is_participant(&p));
        assert!(!lobby.is_participant(&Ulid::new()));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            booking: Booking {
                id: Ulid::new(),
                pitch_id: Ulid::new(),
                booker_id: Ulid::new(),
                date: date(2025, 6, 2),
                slot: TimeRange::new(1080, 1140),
                status: BookingStatus::Pending,
                created_at: Utc::now(),
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
