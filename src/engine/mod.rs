mod availability;
mod bookings;
mod conflict;
mod error;
mod lobbies;
mod queries;
mod schedule;

pub use availability::{free_ranges, merge_overlapping, subtract_ranges};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::clock::Clock;
use crate::feed::ChangeFeed;
use crate::model::*;
use crate::wal::Wal;

pub type SharedPitchState = Arc<RwLock<PitchState>>;
pub type SharedLobby = Arc<RwLock<Lobby>>;
pub type SharedPlayerWindows = Arc<RwLock<Vec<PlayerWindow>>>;

/// Policy switches resolved at construction time.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConfig {
    /// Whether a lobby's creator is inserted as its first participant.
    pub auto_join_creator: bool,
}

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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The coordination core. One write lock per pitch serializes schedule writes
/// and booking lookup-then-insert; one write lock per lobby serializes
/// join/leave/cancel. Each operation commits to the WAL, applies to state,
/// and publishes to the feed before releasing its lock.
pub struct Engine {
    pub pitches: DashMap<Ulid, SharedPitchState>,
    pub lobbies: DashMap<Ulid, SharedLobby>,
    pub(super) player_windows: DashMap<Ulid, SharedPlayerWindows>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub feed: Arc<ChangeFeed>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: EngineConfig,
    /// Reverse lookup: schedule/booking id → pitch id, window id → player id.
    pub(super) entity_owner: DashMap<Ulid, Ulid>,
    /// Mutations hold this shared across their WAL commit; compaction holds
    /// it exclusive across snapshot and swap. An append therefore lands either
    /// fully before the snapshot (and is in it) or fully after the swap (and
    /// is in the new log) — never in between, where it would be lost.
    /// Acquired before any entity lock.
    pub(super) compaction_gate: RwLock<()>,
}

/// Apply a pitch-scoped event directly to a PitchState (no locking — caller
/// holds the lock).
fn apply_to_pitch(ps: &mut PitchState, event: &Event, entity_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::ScheduleCreated { schedule } => {
            ps.insert_schedule(schedule.clone());
            entity_map.insert(schedule.id, schedule.pitch_id);
        }
        Event::ScheduleRetired { id, .. } => {
            if let Some(s) = ps.schedule_mut(id) {
                s.is_available = false;
            }
        }
        Event::BookingCreated { booking } => {
            ps.insert_booking(booking.clone());
            entity_map.insert(booking.id, booking.pitch_id);
        }
        Event::BookingStatusChanged { id, status, .. } => {
            if let Some(b) = ps.booking_mut(id) {
                b.status = *status;
            }
        }
        // Everything else is handled at the map level, not here
        _ => {}
    }
}

/// Apply a lobby-scoped event directly to a Lobby.
fn apply_to_lobby(lobby: &mut Lobby, event: &Event) {
    match event {
        Event::PlayerJoined {
            participant, status, ..
        } => {
            lobby.participants.push(participant.clone());
            lobby.status = *status;
        }
        Event::PlayerLeft {
            player_id, status, ..
        } => {
            lobby.participants.retain(|p| &p.player_id != player_id);
            lobby.status = *status;
        }
        Event::LobbyCancelled { .. } => {
            lobby.status = LobbyStatus::Cancelled;
        }
        _ => {}
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        feed: Arc<ChangeFeed>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            pitches: DashMap::new(),
            lobbies: DashMap::new(),
            player_windows: DashMap::new(),
            wal_tx,
            feed,
            clock,
            config,
            entity_owner: DashMap::new(),
            compaction_gate: RwLock::new(()),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never block here: this
        // may run inside an async context.
        for event in &events {
            match event {
                Event::PitchRegistered { id, owner_id, name } => {
                    let ps = PitchState::new(*id, *owner_id, name.clone());
                    engine.pitches.insert(*id, Arc::new(RwLock::new(ps)));
                }
                Event::LobbyCreated { lobby } => {
                    // Compacted lobbies carry their participant set and status.
                    engine
                        .lobbies
                        .insert(lobby.id, Arc::new(RwLock::new(lobby.clone())));
                }
                Event::PlayerJoined { lobby_id, .. }
                | Event::PlayerLeft { lobby_id, .. }
                | Event::LobbyCancelled { id: lobby_id } => {
                    if let Some(entry) = engine.lobbies.get(lobby_id) {
                        let arc = entry.value().clone();
                        let mut guard = arc.try_write().expect("replay: uncontended write");
                        apply_to_lobby(&mut guard, event);
                    }
                }
                Event::PlayerWindowSet { window } => {
                    let arc = engine
                        .player_windows
                        .entry(window.player_id)
                        .or_insert_with(|| Arc::new(RwLock::new(Vec::new())))
                        .value()
                        .clone();
                    let mut guard = arc.try_write().expect("replay: uncontended write");
                    guard.retain(|w| w.id != window.id);
                    guard.push(window.clone());
                    engine.entity_owner.insert(window.id, window.player_id);
                }
                Event::PlayerWindowRemoved { id, player_id } => {
                    if let Some(entry) = engine.player_windows.get(player_id) {
                        let arc = entry.value().clone();
                        let mut guard = arc.try_write().expect("replay: uncontended write");
                        guard.retain(|w| &w.id != id);
                    }
                    engine.entity_owner.remove(id);
                }
                other => {
                    if let Some(pitch_id) = event_pitch_id(other)
                        && let Some(entry) = engine.pitches.get(&pitch_id)
                    {
                        let arc = entry.value().clone();
                        let mut guard = arc.try_write().expect("replay: uncontended write");
                        apply_to_pitch(&mut guard, other, &engine.entity_owner);
                    }
                }
            }
        }

        metrics::gauge!(crate::observability::PITCHES_ACTIVE).set(engine.pitches.len() as f64);
        tracing::info!(
            events = events.len(),
            pitches = engine.pitches.len(),
            lobbies = engine.lobbies.len(),
            "engine replayed"
        );
        Ok(engine)
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Store("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Store("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Store(e.to_string()))
    }

    pub fn get_pitch(&self, id: &Ulid) -> Option<SharedPitchState> {
        self.pitches.get(id).map(|e| e.value().clone())
    }

    pub fn get_lobby_state(&self, id: &Ulid) -> Option<SharedLobby> {
        self.lobbies.get(id).map(|e| e.value().clone())
    }

    pub fn owner_of(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_owner.get(entity_id).map(|e| *e.value())
    }

    /// Register a pitch with its owning account. The engine only needs
    /// identity and ownership; metadata editing lives outside the core.
    pub async fn register_pitch(
        &self,
        id: Ulid,
        owner_id: Ulid,
        name: Option<String>,
    ) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        if self.pitches.len() >= crate::limits::MAX_PITCHES {
            return Err(EngineError::LimitExceeded("too many pitches"));
        }
        if let Some(ref n) = name
            && n.len() > crate::limits::MAX_NAME_LEN
        {
            return Err(EngineError::LimitExceeded("pitch name too long"));
        }

        // Reserve the id in the map before the WAL append; concurrent creates
        // with the same id must lose here, not overwrite each other after a
        // shared lookup. The held write lock makes other operations on this
        // pitch wait for the commit.
        let ps = Arc::new(RwLock::new(PitchState::new(id, owner_id, name.clone())));
        let _guard = ps.clone().try_write_owned().expect("fresh lock");
        match self.pitches.entry(id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(id)),
            Entry::Vacant(v) => {
                v.insert(ps);
            }
        }

        let event = Event::PitchRegistered {
            id,
            owner_id,
            name,
        };
        if let Err(e) = self.wal_append(&event).await {
            self.pitches.remove(&id);
            return Err(e);
        }
        metrics::gauge!(crate::observability::PITCHES_ACTIVE).set(self.pitches.len() as f64);
        self.feed.publish(&event);
        Ok(())
    }

    /// WAL-append + apply + publish in one call, for pitch-scoped events.
    /// Caller holds the pitch write lock.
    pub(super) async fn persist_and_apply(
        &self,
        ps: &mut PitchState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_pitch(ps, event, &self.entity_owner);
        self.feed.publish(event);
        Ok(())
    }

    /// Lookup booking/schedule → pitch, get pitch, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<PitchState>), EngineError> {
        let pitch_id = self
            .owner_of(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let ps = self
            .get_pitch(&pitch_id)
            .ok_or(EngineError::NotFound(pitch_id))?;
        let guard = ps.write_owned().await;
        Ok((pitch_id, guard))
    }

    /// Compact the WAL down to the events needed to recreate current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Exclusive: no mutation can commit between the snapshot below and
        // the log swap, so nothing committed is missing from the new log.
        let _gate = self.compaction_gate.write().await;
        let mut events = Vec::new();

        for entry in self.pitches.iter() {
            let arc = entry.value().clone();
            let guard = arc.read().await;
            events.push(Event::PitchRegistered {
                id: guard.id,
                owner_id: guard.owner_id,
                name: guard.name.clone(),
            });
            for schedule in &guard.schedules {
                events.push(Event::ScheduleCreated {
                    schedule: schedule.clone(),
                });
            }
            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    booking: booking.clone(),
                });
            }
        }

        for entry in self.lobbies.iter() {
            let arc = entry.value().clone();
            let guard = arc.read().await;
            // The lobby record carries its participants and status, so one
            // event per lobby recreates it exactly.
            events.push(Event::LobbyCreated {
                lobby: guard.clone(),
            });
        }

        for entry in self.player_windows.iter() {
            let arc = entry.value().clone();
            let guard = arc.read().await;
            for window in guard.iter() {
                events.push(Event::PlayerWindowSet {
                    window: window.clone(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Store("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Store("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Store(e.to_string()))
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

/// Extract the pitch id from a pitch-scoped event.
fn event_pitch_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ScheduleCreated { schedule } => Some(schedule.pitch_id),
        Event::ScheduleRetired { pitch_id, .. } => Some(*pitch_id),
        Event::BookingCreated { booking } => Some(booking.pitch_id),
        Event::BookingStatusChanged { pitch_id, .. } => Some(*pitch_id),
        _ => None,
    }
}
