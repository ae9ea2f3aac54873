//! Room registry and the per-room task that owns each room

use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::{tick_delta, tick_duration, unix_millis, DEFAULT_TICK_RATE};
use crate::ws::protocol::{RoomPhase, RoomState, ServerMsg};

use super::dispatch::{self, Audience, Outbound, RoomEvent};
use super::room::{GameRoom, RoomSettings};
use super::snapshot::SnapshotBuilder;

const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 256;

/// Work for a room task
#[derive(Debug)]
pub enum RoomCommand {
    Event { session_id: Uuid, event: RoomEvent },
    Snapshot { reply: oneshot::Sender<RoomState> },
}

/// Read-only view of a room for HTTP endpoints
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub player_count: usize,
    pub phase: RoomPhase,
    pub game_active: bool,
}

impl RoomSummary {
    fn of(room: &GameRoom) -> Self {
        Self {
            room_id: room.id().to_string(),
            player_count: room.player_count(),
            phase: room.phase(),
            game_active: room.is_active(),
        }
    }
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    id: Arc<str>,
    command_tx: mpsc::Sender<RoomCommand>,
    events_tx: broadcast::Sender<Outbound>,
    summary: Arc<RwLock<RoomSummary>>,
}

impl RoomHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Subscribe before sending `Join` so the joiner sees its own `room_state`
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.events_tx.subscribe()
    }

    /// Queue an event for the room. False if the room task is gone.
    pub async fn send(&self, session_id: Uuid, event: RoomEvent) -> bool {
        self.command_tx
            .send(RoomCommand::Event { session_id, event })
            .await
            .is_ok()
    }

    /// Full snapshot, taken on the room task
    pub async fn snapshot(&self) -> Option<RoomState> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(RoomCommand::Snapshot { reply })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub fn summary(&self) -> RoomSummary {
        self.summary.read().clone()
    }

    pub fn player_count(&self) -> usize {
        self.summary.read().player_count
    }
}

/// Settings every room in the registry is created with
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub room: RoomSettings,
    pub default_room: String,
    pub max_rooms: usize,
    pub tick_rate: u32,
    /// Seconds between unsolicited full snapshots; 0 disables them
    pub resync_interval_secs: u32,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            room: RoomSettings::default(),
            default_room: "main".to_string(),
            max_rooms: 16,
            tick_rate: DEFAULT_TICK_RATE,
            resync_interval_secs: 5,
        }
    }
}

/// Registry of all rooms. Rooms live until the process exits.
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
    settings: RegistrySettings,
}

impl RoomRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            rooms: DashMap::new(),
            settings,
        }
    }

    pub fn default_room_id(&self) -> &str {
        &self.settings.default_room
    }

    pub fn get(&self, id: &str) -> Option<RoomHandle> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    /// Find a room, creating it if there is room for one more.
    /// Past the cap this falls back to the default room.
    pub fn get_or_create(&self, id: &str) -> RoomHandle {
        if let Some(handle) = self.get(id) {
            return handle;
        }

        let is_default = id == self.settings.default_room;
        if !is_default && self.rooms.len() >= self.settings.max_rooms {
            warn!(
                room_id = %id,
                max_rooms = self.settings.max_rooms,
                "Room cap reached, using default room"
            );
            return self.get_or_create(&self.settings.default_room);
        }

        self.rooms
            .entry(id.to_string())
            .or_insert_with(|| self.spawn_room(id))
            .value()
            .clone()
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }

    /// Summaries sorted by room id
    pub fn summaries(&self) -> Vec<RoomSummary> {
        let mut summaries: Vec<RoomSummary> =
            self.rooms.iter().map(|r| r.value().summary()).collect();
        summaries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        summaries
    }

    fn spawn_room(&self, id: &str) -> RoomHandle {
        let seed: u64 = rand::thread_rng().gen();
        let room = GameRoom::new(id, self.settings.room.clone(), seed);
        let (task, handle) = RoomTask::new(room, &self.settings);
        tokio::spawn(task.run());
        info!(room_id = %id, seed, "Room created");
        handle
    }
}

/// The task that owns a room
pub struct RoomTask {
    room: GameRoom,
    command_rx: mpsc::Receiver<RoomCommand>,
    events_tx: broadcast::Sender<Outbound>,
    summary: Arc<RwLock<RoomSummary>>,
    snapshot_builder: SnapshotBuilder,
    tick_rate: u32,
}

impl RoomTask {
    pub fn new(room: GameRoom, settings: &RegistrySettings) -> (Self, RoomHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        let summary = Arc::new(RwLock::new(RoomSummary::of(&room)));

        let handle = RoomHandle {
            id: Arc::from(room.id()),
            command_tx,
            events_tx: events_tx.clone(),
            summary: summary.clone(),
        };

        let task = Self {
            room,
            command_rx,
            events_tx,
            summary,
            snapshot_builder: SnapshotBuilder::every_secs(
                settings.resync_interval_secs,
                settings.tick_rate,
            ),
            tick_rate: settings.tick_rate,
        };

        (task, handle)
    }

    /// Serve commands as they arrive and run the fixed tick in between
    pub async fn run(mut self) {
        info!(room_id = %self.room.id(), tick_rate = self.tick_rate, "Room task started");

        let dt = tick_delta(self.tick_rate);
        let mut tick_interval = interval(tick_duration(self.tick_rate));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = unix_millis();

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command);
                }
                _ = tick_interval.tick() => {
                    let now = unix_millis();
                    let elapsed = now.saturating_sub(last_tick);
                    last_tick = now;

                    let out = dispatch::tick(&mut self.room, now, dt, elapsed);
                    let resynced = out.iter().any(|o| {
                        o.audience == Audience::Everyone && matches!(o.msg, ServerMsg::RoomState(_))
                    });
                    self.publish(out);

                    if resynced {
                        self.snapshot_builder.reset();
                    } else if self.snapshot_builder.should_send() && self.room.player_count() > 0 {
                        let state = self.room.get_state(now);
                        self.publish(vec![Outbound::everyone(ServerMsg::RoomState(state))]);
                    }
                }
            }

            *self.summary.write() = RoomSummary::of(&self.room);
        }

        info!(room_id = %self.room.id(), "Room task stopped");
    }

    fn handle_command(&mut self, command: RoomCommand) {
        let now = unix_millis();
        match command {
            RoomCommand::Event { session_id, event } => {
                let out = dispatch::dispatch(&mut self.room, session_id, event, now);
                self.publish(out);
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.room.get_state(now));
            }
        }
    }

    fn publish(&self, out: Vec<Outbound>) {
        for envelope in out {
            // No subscribers is fine: nobody is connected
            if self.events_tx.send(envelope).is_err() {
                debug!(room_id = %self.room.id(), "No sessions to receive event");
            }
        }
    }
}
