//! Game room: authoritative player set, arena and match lifecycle

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::protocol::{PlayerSnapshot, RoomPhase, RoomState, WeaponKind};

use super::combat::{CombatSystem, HitResult, WeaponStats};
use super::map::{GameMap, MapConfig, MapGenerator};
use super::math::Vec3;
use super::physics::PhysicsSystem;

/// Net displacement below which a collision contact is not reported as a correction
const CORRECTION_EPSILON: f32 = 1e-3;
use super::player::PlayerState;
use super::snapshot::build_room_state;

/// Gameplay settings shared by every room
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSettings {
    pub map: MapConfig,
    /// Score that ends the match
    pub score_to_win: u32,
    /// Match length (ms)
    pub match_time_limit_ms: u64,
    /// Respawn killed players inside the shot that killed them
    pub instant_respawn: bool,
    /// Report non-lethal hits as well as kills
    pub report_all_hits: bool,
    pub default_weapon: WeaponKind,
    /// Run gravity and collision resolution on every tick
    pub physics_step: bool,
    /// Players needed before a round starts
    pub min_players_to_start: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            map: MapConfig::default(),
            score_to_win: 10,
            match_time_limit_ms: 600_000,
            instant_respawn: true,
            report_all_hits: true,
            default_weapon: WeaponKind::Pistol,
            physics_step: true,
            min_players_to_start: 1,
        }
    }
}

/// How a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    /// None on a tie or when nobody scored
    pub winner: Option<Uuid>,
    pub score: u32,
}

/// Everything a fired shot changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShotOutcome {
    pub hit: Option<HitResult>,
    /// Target brought back immediately after a kill
    pub respawn: Option<(Uuid, Vec3)>,
    /// Set when this shot won the match
    pub game_over: Option<MatchResult>,
}

impl ShotOutcome {
    /// Id of the target if the shot killed it
    #[cfg(test)]
    pub(crate) fn killed_target(&self) -> Option<Uuid> {
        self.hit
            .as_ref()
            .filter(|hit| hit.target_killed)
            .map(|hit| hit.target_id)
    }
}

/// Authoritative room state. Owned by a single room task; every mutation goes through here.
pub struct GameRoom {
    id: String,
    settings: RoomSettings,
    generator: MapGenerator,
    players: HashMap<Uuid, PlayerState>,
    map: GameMap,
    phase: RoomPhase,
    start_time: Option<u64>,
    rng: ChaCha8Rng,
}

impl GameRoom {
    pub fn new(id: impl Into<String>, settings: RoomSettings, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let generator = MapGenerator::new(settings.map.clone());
        let map = generator.generate(&mut rng);

        Self {
            id: id.into(),
            settings,
            generator,
            players: HashMap::new(),
            map,
            phase: RoomPhase::Idle,
            start_time: None,
            rng,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == RoomPhase::Active
    }

    pub fn map(&self) -> &GameMap {
        &self.map
    }

    pub fn player(&self, id: &Uuid) -> Option<&PlayerState> {
        self.players.get(id)
    }

    #[cfg(test)]
    pub(crate) fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Insert a new player at a random spawn point
    pub fn add_player(&mut self, id: Uuid) -> PlayerSnapshot {
        if let Some(existing) = self.players.get(&id) {
            debug!(room_id = %self.id, player_id = %id, "Player already in room");
            return existing.snapshot();
        }

        let spawn = self.map.random_spawn_point(&mut self.rng);
        let player = PlayerState::with_weapon(id, spawn, self.settings.default_weapon);
        let snapshot = player.snapshot();
        self.players.insert(id, player);

        info!(
            room_id = %self.id,
            player_id = %id,
            player_count = self.players.len(),
            "Player joined room"
        );
        snapshot
    }

    /// Remove a player whatever state it is in. Idempotent.
    pub fn remove_player(&mut self, id: &Uuid) -> bool {
        if self.players.remove(id).is_none() {
            return false;
        }

        info!(
            room_id = %self.id,
            player_id = %id,
            player_count = self.players.len(),
            "Player left room"
        );

        if self.players.is_empty() {
            self.phase = RoomPhase::Idle;
            self.start_time = None;
        }
        true
    }

    /// Accept a client-reported position as-is.
    /// Reachability is not checked: the client is trusted for movement.
    pub fn update_player_position(&mut self, id: &Uuid, position: Vec3) -> bool {
        if !position.is_finite() {
            debug!(room_id = %self.id, player_id = %id, "Dropped non-finite move");
            return false;
        }
        match self.players.get_mut(id) {
            Some(player) => {
                player.position = position;
                true
            }
            None => false,
        }
    }

    /// Resolve a shot. None means the intent was dropped (unknown shooter,
    /// no running match, cooldown, reload or empty magazine).
    pub fn process_shot(&mut self, shooter_id: &Uuid, direction: Vec3, now: u64) -> Option<ShotOutcome> {
        if !self.is_active() || !direction.is_finite() {
            return None;
        }

        let shooter = self.players.get_mut(shooter_id)?;
        if !shooter.try_fire(now) {
            debug!(room_id = %self.id, player_id = %shooter_id, "Shot dropped");
            return None;
        }
        let origin = shooter.position;
        let damage = WeaponStats::for_kind(shooter.weapon).damage;

        let Some(cone) =
            CombatSystem::find_cone_target(*shooter_id, origin, direction, self.players.values())
        else {
            return Some(ShotOutcome::default());
        };

        let mut outcome = ShotOutcome::default();

        let target = self.players.get_mut(&cone.target_id)?;
        let killed = target.apply_damage(damage);
        let target_health = target.health;
        if killed && self.settings.instant_respawn && target.respawn(&self.map, &mut self.rng) {
            outcome.respawn = Some((target.id, target.position));
        }

        let shooter = self.players.get_mut(shooter_id)?;
        if killed {
            shooter.score += 1;
        }
        let shooter_score = shooter.score;

        outcome.hit = Some(HitResult {
            shooter_id: *shooter_id,
            target_id: cone.target_id,
            damage,
            target_health,
            target_killed: killed,
            shooter_score,
        });

        if killed {
            info!(
                room_id = %self.id,
                shooter_id = %shooter_id,
                target_id = %cone.target_id,
                shooter_score,
                "Player killed"
            );
        }

        if killed && shooter_score >= self.settings.score_to_win {
            outcome.game_over = Some(self.finish_match(MatchResult {
                winner: Some(*shooter_id),
                score: shooter_score,
            }));
        }

        Some(outcome)
    }

    pub fn switch_weapon(&mut self, id: &Uuid, weapon: WeaponKind) -> bool {
        self.players
            .get_mut(id)
            .map(|p| p.switch_weapon(weapon))
            .unwrap_or(false)
    }

    pub fn reload(&mut self, id: &Uuid, now: u64) -> bool {
        self.players
            .get_mut(id)
            .map(|p| p.start_reload(now))
            .unwrap_or(false)
    }

    /// Begin a match: scores, health and positions are reset on the current map
    pub fn start_game(&mut self, now: u64) {
        self.phase = RoomPhase::Active;
        self.start_time = Some(now);

        for player in self.players.values_mut() {
            let spawn = self.map.random_spawn_point(&mut self.rng);
            player.reset_for_round(spawn);
        }

        info!(room_id = %self.id, player_count = self.players.len(), "Match started");
    }

    /// End the match now. The winner is the single highest scorer, if any.
    pub fn end_game(&mut self) -> MatchResult {
        let best = self.players.values().map(|p| p.score).max().unwrap_or(0);
        let leaders: Vec<Uuid> = self
            .players
            .values()
            .filter(|p| p.score == best)
            .map(|p| p.id)
            .collect();

        let winner = match leaders.as_slice() {
            [only] if best > 0 => Some(*only),
            _ => None,
        };

        self.finish_match(MatchResult { winner, score: best })
    }

    fn finish_match(&mut self, result: MatchResult) -> MatchResult {
        self.phase = RoomPhase::Ended;
        self.start_time = None;

        info!(
            room_id = %self.id,
            winner = ?result.winner,
            score = result.score,
            "Match ended"
        );

        self.generate_new_map();
        result
    }

    /// Replace the arena and put every player on one of its spawn points
    pub fn generate_new_map(&mut self) -> &GameMap {
        self.map = self.generator.generate(&mut self.rng);

        for player in self.players.values_mut() {
            if !player.respawn(&self.map, &mut self.rng) {
                player.position = self.map.random_spawn_point(&mut self.rng);
                player.velocity = Vec3::ZERO;
            }
        }

        info!(
            room_id = %self.id,
            obstacles = self.map.obstacles.len(),
            "New map generated"
        );
        &self.map
    }

    /// Whole seconds left in the running match; the full limit when no match runs
    pub fn time_remaining(&self, now: u64) -> u64 {
        self.remaining_ms(now) / 1000
    }

    fn remaining_ms(&self, now: u64) -> u64 {
        let limit = self.settings.match_time_limit_ms;
        match (self.phase, self.start_time) {
            (RoomPhase::Active, Some(start)) => limit.saturating_sub(now.saturating_sub(start)),
            _ => limit,
        }
    }

    /// End the match if its time is up
    pub fn poll_timer(&mut self, now: u64) -> Option<MatchResult> {
        if self.is_active() && self.remaining_ms(now) == 0 {
            Some(self.end_game())
        } else {
            None
        }
    }

    /// Start the next round if enough players are present; otherwise fall back to idle.
    /// Returns true if a round was started.
    pub fn next_round(&mut self, now: u64) -> bool {
        if self.is_active() {
            return false;
        }
        if !self.players.is_empty() && self.players.len() >= self.settings.min_players_to_start {
            self.start_game(now);
            true
        } else {
            self.phase = RoomPhase::Idle;
            false
        }
    }

    /// One physics step for every living player.
    /// Returns the players whose positions were corrected by a collision.
    /// Resting contact (standing on a box) leaves the position unchanged and is not reported.
    pub fn step_physics(&mut self, dt: f32) -> Vec<Uuid> {
        let mut corrected = Vec::new();

        for player in self.players.values_mut() {
            if !player.alive {
                continue;
            }
            let before = player.position;
            PhysicsSystem::integrate(player, dt);
            let hit_obstacle = PhysicsSystem::resolve_obstacles(player, &self.map);
            let hit_wall = PhysicsSystem::resolve_boundaries(player, &self.map);
            if (hit_obstacle || hit_wall) && player.position.distance(before) > CORRECTION_EPSILON {
                corrected.push(player.id);
            }
        }

        for id in PhysicsSystem::resolve_player_pairs(self.players.values_mut()) {
            if !corrected.contains(&id) {
                corrected.push(id);
            }
        }

        corrected
    }

    /// Run respawn countdowns. Returns players that came back and where.
    pub fn advance_respawns(&mut self, elapsed_ms: u64) -> Vec<(Uuid, Vec3)> {
        let mut respawned = Vec::new();
        for player in self.players.values_mut() {
            if player.advance_respawn(elapsed_ms) && player.respawn(&self.map, &mut self.rng) {
                respawned.push((player.id, player.position));
            }
        }
        respawned
    }

    /// Full snapshot for joining or resyncing clients
    pub fn get_state(&self, now: u64) -> RoomState {
        build_room_state(
            &self.id,
            self.phase,
            self.time_remaining(now),
            &self.players,
            &self.map,
        )
    }

    #[cfg(test)]
    pub(crate) fn player_mut(&mut self, id: &Uuid) -> Option<&mut PlayerState> {
        self.players.get_mut(id)
    }

    #[cfg(test)]
    pub(crate) fn set_map(&mut self, map: GameMap) {
        self.map = map;
    }
}
