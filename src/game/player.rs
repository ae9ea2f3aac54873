//! Authoritative per-player state

use rand::Rng;
use uuid::Uuid;

use crate::ws::protocol::{PlayerSnapshot, WeaponKind};

use super::combat::WeaponStats;
use super::map::GameMap;
use super::math::Vec3;

/// Full health
pub const MAX_HEALTH: u32 = 100;
/// Time a killed player stays dead when respawns are delayed
pub const RESPAWN_COUNTDOWN_MS: u64 = 3000;

/// Player state in a room (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: Uuid,

    // Position and movement
    pub position: Vec3,
    pub velocity: Vec3,
    pub grounded: bool,

    // Combat
    pub health: u32,
    pub score: u32,
    pub alive: bool,
    pub last_shot_time: Option<u64>,
    /// Only meaningful while dead
    pub respawn_countdown_ms: Option<u64>,

    // Weapon
    pub weapon: WeaponKind,
    pub ammo: u32,
    pub reload_started_at: Option<u64>,
}

impl PlayerState {
    #[cfg(test)]
    pub(crate) fn new(id: Uuid, spawn: Vec3) -> Self {
        Self::with_weapon(id, spawn, WeaponKind::default())
    }

    pub fn with_weapon(id: Uuid, spawn: Vec3, weapon: WeaponKind) -> Self {
        Self {
            id,
            position: spawn,
            velocity: Vec3::ZERO,
            grounded: true,
            health: MAX_HEALTH,
            score: 0,
            alive: true,
            last_shot_time: None,
            respawn_countdown_ms: None,
            weapon,
            ammo: WeaponStats::for_kind(weapon).magazine,
            reload_started_at: None,
        }
    }

    /// Subtract health, clamped at zero. Returns true if this damage killed the player.
    pub fn apply_damage(&mut self, amount: u32) -> bool {
        if !self.alive {
            return false;
        }

        self.health = self.health.saturating_sub(amount);
        if self.health == 0 {
            self.alive = false;
            self.velocity = Vec3::ZERO;
            self.respawn_countdown_ms = Some(RESPAWN_COUNTDOWN_MS);
            return true;
        }
        false
    }

    /// Count the respawn timer down. Returns true once the player may respawn.
    pub fn advance_respawn(&mut self, elapsed_ms: u64) -> bool {
        match self.respawn_countdown_ms.as_mut() {
            Some(remaining) if !self.alive => {
                *remaining = remaining.saturating_sub(elapsed_ms);
                *remaining == 0
            }
            _ => false,
        }
    }

    /// Bring a dead player back at a random spawn point. No-op while alive.
    pub fn respawn<R: Rng + ?Sized>(&mut self, map: &GameMap, rng: &mut R) -> bool {
        if self.alive {
            return false;
        }

        self.position = map.random_spawn_point(rng);
        self.velocity = Vec3::ZERO;
        self.health = MAX_HEALTH;
        self.alive = true;
        self.grounded = true;
        self.respawn_countdown_ms = None;
        self.refill();
        true
    }

    /// Fresh start for a new round: score, health, weapon and position all reset
    pub fn reset_for_round(&mut self, spawn: Vec3) {
        self.position = spawn;
        self.velocity = Vec3::ZERO;
        self.grounded = true;
        self.health = MAX_HEALTH;
        self.score = 0;
        self.alive = true;
        self.last_shot_time = None;
        self.respawn_countdown_ms = None;
        self.refill();
    }

    /// Cooldown gate. Records the shot time when the shot is allowed.
    pub fn try_shoot(&mut self, now: u64, cooldown_ms: u64) -> bool {
        if let Some(last) = self.last_shot_time {
            if now.saturating_sub(last) < cooldown_ms {
                return false;
            }
        }
        self.last_shot_time = Some(now);
        true
    }

    /// Full fire check for the held weapon: reload state, ammo and fire rate.
    /// Consumes a round and starts a reload when the magazine runs dry.
    pub fn try_fire(&mut self, now: u64) -> bool {
        if !self.alive {
            return false;
        }

        self.finish_reload(now);
        if self.is_reloading() {
            return false;
        }

        if self.ammo == 0 {
            self.start_reload(now);
            return false;
        }

        let stats = WeaponStats::for_kind(self.weapon);
        if !self.try_shoot(now, stats.fire_interval_ms) {
            return false;
        }

        self.ammo -= 1;
        if self.ammo == 0 {
            self.start_reload(now);
        }
        true
    }

    pub fn is_reloading(&self) -> bool {
        self.reload_started_at.is_some()
    }

    /// Begin reloading. False if already reloading or the magazine is full.
    pub fn start_reload(&mut self, now: u64) -> bool {
        let stats = WeaponStats::for_kind(self.weapon);
        if self.is_reloading() || self.ammo >= stats.magazine {
            return false;
        }
        self.reload_started_at = Some(now);
        true
    }

    /// Complete a pending reload whose time has elapsed
    pub fn finish_reload(&mut self, now: u64) {
        if let Some(started) = self.reload_started_at {
            if now.saturating_sub(started) >= WeaponStats::for_kind(self.weapon).reload_ms {
                self.refill();
            }
        }
    }

    /// Swap weapons. The new weapon comes loaded. Returns false if nothing changed.
    pub fn switch_weapon(&mut self, weapon: WeaponKind) -> bool {
        if self.weapon == weapon {
            return false;
        }
        self.weapon = weapon;
        self.refill();
        true
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            position: self.position,
            health: self.health,
            score: self.score,
            alive: self.alive,
            weapon: self.weapon,
            ammo: self.ammo,
        }
    }

    fn refill(&mut self) {
        self.ammo = WeaponStats::for_kind(self.weapon).magazine;
        self.reload_started_at = None;
    }
}
