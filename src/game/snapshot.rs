//! Room snapshots and periodic resync cadence

use std::collections::HashMap;
use uuid::Uuid;

use crate::ws::protocol::{RoomPhase, RoomState};

use super::map::GameMap;
use super::player::PlayerState;

/// Decides when a room pushes an unsolicited full snapshot
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks; 0 disables periodic snapshots
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval,
        }
    }

    /// Interval in ticks for a resync every `secs` seconds at `tick_rate`
    pub fn every_secs(secs: u32, tick_rate: u32) -> Self {
        Self::new(secs.saturating_mul(tick_rate))
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        if self.snapshot_interval == 0 {
            return false;
        }
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Restart the countdown, e.g. after a full snapshot went out for another reason
    pub fn reset(&mut self) {
        self.ticks_since_snapshot = 0;
    }
}

/// Build the wire snapshot of a room
pub fn build_room_state(
    room_id: &str,
    phase: RoomPhase,
    time_remaining: u64,
    players: &HashMap<Uuid, PlayerState>,
    map: &GameMap,
) -> RoomState {
    RoomState {
        room_id: room_id.to_string(),
        players: players
            .iter()
            .map(|(id, player)| (*id, player.snapshot()))
            .collect(),
        map_data: map.clone(),
        game_active: phase == RoomPhase::Active,
        phase,
        time_remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::math::Vec3;

    #[test]
    fn cadence() {
        let mut builder = SnapshotBuilder::every_secs(1, 3);
        assert!(!builder.should_send());
        assert!(!builder.should_send());
        assert!(builder.should_send());
        assert!(!builder.should_send());

        builder.reset();
        assert!(!builder.should_send());
        assert!(!builder.should_send());
        assert!(builder.should_send());
    }

    #[test]
    fn zero_interval_never_sends() {
        let mut builder = SnapshotBuilder::new(0);
        assert!((0..100).all(|_| !builder.should_send()));
    }

    #[test]
    fn state_carries_every_player() {
        let map = GameMap {
            size: 50.0,
            obstacles: Vec::new(),
            spawn_points: vec![Vec3::new(0.0, 1.0, 0.0)],
        };
        let mut players = HashMap::new();
        for _ in 0..3 {
            let id = Uuid::new_v4();
            players.insert(id, PlayerState::new(id, Vec3::new(0.0, 1.0, 0.0)));
        }

        let state = build_room_state("arena", RoomPhase::Ended, 600, &players, &map);
        assert_eq!(state.players.len(), 3);
        assert!(!state.game_active);
        assert_eq!(state.phase, RoomPhase::Ended);
        assert!(players.keys().all(|id| state.players.contains_key(id)));
    }
}
