//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::game::map::GameMap;
use crate::game::math::Vec3;

/// Weapons a player can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    /// Slow, hard-hitting sidearm
    #[default]
    Pistol,
    /// Fast, light automatic
    Rifle,
}

impl FromStr for WeaponKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pistol" => Ok(Self::Pistol),
            "rifle" => Ok(Self::Rifle),
            other => Err(format!("unknown weapon: {other}")),
        }
    }
}

/// Match phase of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    /// No timer running
    Idle,
    /// Match in progress
    Active,
    /// Match just ended; the next tick starts a new round
    Ended,
}

/// Messages sent from client to server.
/// Joining and leaving are implied by the connection itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Client-reported position (accepted as-is)
    PlayerMove { position: Vec3 },

    /// Fire the current weapon from `position` along `direction`
    PlayerShoot { position: Vec3, direction: Vec3 },

    /// Change weapon
    SwitchWeapon { weapon: WeaponKind },

    /// Start reloading the current weapon
    Reload,

    /// Ask for a full `room_state` resync
    RequestState,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Full snapshot for joining or resyncing clients
    RoomState(RoomState),

    /// New participant
    PlayerJoined { id: Uuid, position: Vec3 },

    /// Position update (client move or server correction)
    PlayerMoved { id: Uuid, position: Vec3 },

    /// Visual-only shot notification
    PlayerShot {
        id: Uuid,
        position: Vec3,
        direction: Vec3,
    },

    /// Authoritative hit outcome
    PlayerHit {
        shooter: Uuid,
        target: Uuid,
        shooter_score: u32,
        damage: u32,
        target_health: u32,
        killed: bool,
    },

    /// A dead player is back on the map
    PlayerRespawned { id: Uuid, position: Vec3 },

    /// A player changed weapon
    WeaponSwitched { id: Uuid, weapon: WeaponKind },

    /// A new round started
    GameStart {
        /// Seconds left in the round
        time_remaining: u64,
    },

    /// Match end. No winner on a tied timeout.
    GameOver { winner: Option<Uuid>, score: u32 },

    /// Arena geometry replaced
    NewMap(GameMap),

    /// Participant disconnected
    PlayerLeft { id: Uuid },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
        server_time: u64,
    },
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: Uuid,
    pub position: Vec3,
    /// Health (0-100)
    pub health: u32,
    pub score: u32,
    pub alive: bool,
    pub weapon: WeaponKind,
    /// Rounds left in the magazine
    pub ammo: u32,
}

/// Room snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub room_id: String,
    pub players: HashMap<Uuid, PlayerSnapshot>,
    pub map_data: GameMap,
    pub game_active: bool,
    pub phase: RoomPhase,
    /// Seconds left in the current match
    pub time_remaining: u64,
}
