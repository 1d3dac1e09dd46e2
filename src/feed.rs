use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// What a subscription is keyed on. Schedule and booking changes fan out per
/// pitch; lobby changes per lobby; player-window changes per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Pitch(Ulid),
    Lobby(Ulid),
    Player(Ulid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Pitch,
    Schedule,
    Booking,
    Lobby,
    PlayerWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One committed mutation, as delivered to subscribers. `event` carries the
/// new state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub entity: EntityKind,
    pub entity_id: Ulid,
    pub kind: ChangeKind,
    pub event: Event,
}

impl Change {
    /// Classify an event into its topic and change record.
    pub fn from_event(event: &Event) -> (Topic, Change) {
        use ChangeKind::*;
        use EntityKind::*;
        let (topic, entity, entity_id, kind) = match event {
            Event::PitchRegistered { id, .. } => (Topic::Pitch(*id), Pitch, *id, Insert),
            Event::ScheduleCreated { schedule } => {
                (Topic::Pitch(schedule.pitch_id), Schedule, schedule.id, Insert)
            }
            Event::ScheduleRetired { id, pitch_id } => (Topic::Pitch(*pitch_id), Schedule, *id, Update),
            Event::BookingCreated { booking } => {
                (Topic::Pitch(booking.pitch_id), Booking, booking.id, Insert)
            }
            Event::BookingStatusChanged { id, pitch_id, .. } => {
                (Topic::Pitch(*pitch_id), Booking, *id, Update)
            }
            Event::LobbyCreated { lobby } => (Topic::Lobby(lobby.id), Lobby, lobby.id, Insert),
            Event::PlayerJoined { lobby_id, .. } => (Topic::Lobby(*lobby_id), Lobby, *lobby_id, Update),
            Event::PlayerLeft { lobby_id, .. } => (Topic::Lobby(*lobby_id), Lobby, *lobby_id, Update),
            Event::LobbyCancelled { id } => (Topic::Lobby(*id), Lobby, *id, Update),
            Event::PlayerWindowSet { window } => {
                (Topic::Player(window.player_id), PlayerWindow, window.id, Insert)
            }
            Event::PlayerWindowRemoved { id, player_id } => {
                (Topic::Player(*player_id), PlayerWindow, *id, Delete)
            }
        };
        (
            topic,
            Change {
                entity,
                entity_id,
                kind,
                event: event.clone(),
            },
        )
    }
}

/// Broadcast hub for live-sync subscribers. Delivery is at-least-once and
/// ordered per topic: the engine publishes while still holding the entity
/// lock, so subscribers see one entity's changes in commit order. Across
/// topics there is no ordering guarantee.
pub struct ChangeFeed {
    channels: DashMap<Topic, broadcast::Sender<Change>>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a topic. Creates the channel if needed. Unsubscribe by
    /// dropping the receiver.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Change> {
        let sender = self
            .channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish a committed event. No-op if nobody is listening.
    pub fn publish(&self, event: &Event) {
        let (topic, change) = Change::from_event(event);
        if let Some(sender) = self.channels.get(&topic) {
            let _ = sender.send(change);
        }
    }

    /// Remove a topic's channel.
    pub fn remove(&self, topic: &Topic) {
        self.channels.remove(topic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let feed = ChangeFeed::new();
        let pitch_id = Ulid::new();
        let mut rx = feed.subscribe(Topic::Pitch(pitch_id));

        let event = Event::PitchRegistered {
            id: pitch_id,
            owner_id: Ulid::new(),
            name: None,
        };
        feed.publish(&event);

        let change = rx.recv().await.unwrap();
        assert_eq!(change.entity, EntityKind::Pitch);
        assert_eq!(change.entity_id, pitch_id);
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(change.event, event);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let feed = ChangeFeed::new();
        // No subscriber — should not panic
        feed.publish(&Event::LobbyCancelled { id: Ulid::new() });
    }

    #[test]
    fn lobby_events_share_one_topic() {
        let lobby_id = Ulid::new();
        let (t1, _) = Change::from_event(&Event::LobbyCancelled { id: lobby_id });
        let (t2, c2) = Change::from_event(&Event::PlayerLeft {
            lobby_id,
            player_id: Ulid::new(),
            status: crate::model::LobbyStatus::Open,
        });
        assert_eq!(t1, t2);
        assert_eq!(c2.kind, ChangeKind::Update);
    }
}
