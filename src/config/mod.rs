//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::map::MapConfig;
use crate::game::{RegistrySettings, RoomSettings};
use crate::util::rate_limit::DEFAULT_INPUT_RATE_LIMIT;
use crate::util::time::DEFAULT_TICK_RATE;
use crate::ws::protocol::WeaponKind;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// `json` switches logs to JSON lines
    pub log_format: String,
    /// Allowed client origins for CORS, comma-separated; `*` allows any
    pub client_origin: String,

    /// Inbound messages per second per session
    pub input_rate_limit: u32,

    /// Room registry and gameplay settings
    pub rooms: RegistrySettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any name -> value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port.trim()),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
        };

        let map_defaults = MapConfig::default();
        let map = MapConfig {
            size: parse_or(&lookup, "MAP_SIZE", map_defaults.size)?,
            min_obstacles: parse_or(&lookup, "OBSTACLE_MIN", map_defaults.min_obstacles)?,
            max_obstacles: parse_or(&lookup, "OBSTACLE_MAX", map_defaults.max_obstacles)?,
            spawn_points: parse_or(&lookup, "SPAWN_POINTS", map_defaults.spawn_points)?,
            ..map_defaults
        };

        let room_defaults = RoomSettings::default();
        let room = RoomSettings {
            map,
            score_to_win: parse_or(&lookup, "SCORE_TO_WIN", room_defaults.score_to_win)?,
            match_time_limit_ms: parse_or(
                &lookup,
                "MATCH_TIME_LIMIT_SECS",
                room_defaults.match_time_limit_ms / 1000,
            )?
            .saturating_mul(1000),
            instant_respawn: parse_or(&lookup, "INSTANT_RESPAWN", room_defaults.instant_respawn)?,
            report_all_hits: parse_or(&lookup, "REPORT_ALL_HITS", room_defaults.report_all_hits)?,
            default_weapon: parse_or::<WeaponKind, _>(
                &lookup,
                "DEFAULT_WEAPON",
                room_defaults.default_weapon,
            )?,
            physics_step: parse_or(&lookup, "PHYSICS_STEP", room_defaults.physics_step)?,
            min_players_to_start: parse_or(
                &lookup,
                "MIN_PLAYERS_TO_START",
                room_defaults.min_players_to_start,
            )?,
        };

        let registry_defaults = RegistrySettings::default();
        let rooms = RegistrySettings {
            room,
            default_room: lookup("DEFAULT_ROOM")
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .unwrap_or(registry_defaults.default_room),
            max_rooms: parse_or(&lookup, "MAX_ROOMS", registry_defaults.max_rooms)?,
            tick_rate: parse_or(&lookup, "TICK_RATE", DEFAULT_TICK_RATE)?,
            resync_interval_secs: parse_or(
                &lookup,
                "RESYNC_INTERVAL_SECS",
                registry_defaults.resync_interval_secs,
            )?,
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(server_addr.clone()))?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: lookup("LOG_FORMAT").unwrap_or_default(),
            client_origin: lookup("CLIENT_ORIGIN").unwrap_or_else(|| "*".to_string()),
            input_rate_limit: parse_or(&lookup, "INPUT_RATE_LIMIT", DEFAULT_INPUT_RATE_LIMIT)?,
            rooms,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let room = &self.rooms.room;

        if self.rooms.tick_rate == 0 {
            return Err(ConfigError::OutOfRange("TICK_RATE", "must be at least 1"));
        }
        if self.rooms.max_rooms == 0 {
            return Err(ConfigError::OutOfRange("MAX_ROOMS", "must be at least 1"));
        }
        if room.score_to_win == 0 {
            return Err(ConfigError::OutOfRange("SCORE_TO_WIN", "must be at least 1"));
        }
        if room.match_time_limit_ms == 0 {
            return Err(ConfigError::OutOfRange("MATCH_TIME_LIMIT_SECS", "must be at least 1"));
        }
        if !(room.map.size.is_finite() && room.map.size > 0.0) {
            return Err(ConfigError::OutOfRange("MAP_SIZE", "must be positive"));
        }
        if room.map.min_obstacles > room.map.max_obstacles {
            return Err(ConfigError::OutOfRange(
                "OBSTACLE_MIN",
                "must not exceed OBSTACLE_MAX",
            ));
        }
        if room.map.spawn_points == 0 {
            return Err(ConfigError::OutOfRange("SPAWN_POINTS", "must be at least 1"));
        }
        Ok(())
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// Parse a variable, falling back to `default` when it is unset
fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw.clone(),
        }),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("{0} {1}")]
    OutOfRange(&'static str, &'static str),
}
