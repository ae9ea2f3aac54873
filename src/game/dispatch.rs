//! Turns session events and room ticks into outbound messages

use uuid::Uuid;

use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::combat::HitResult;
use super::room::{GameRoom, MatchResult};

/// Who an outbound message is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    EveryoneExcept(Uuid),
    Only(Uuid),
}

impl Audience {
    pub fn includes(&self, session_id: &Uuid) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::EveryoneExcept(id) => id != session_id,
            Audience::Only(id) => id == session_id,
        }
    }
}

/// A server message addressed to part of a room
#[derive(Debug, Clone)]
pub struct Outbound {
    pub audience: Audience,
    pub msg: ServerMsg,
}

impl Outbound {
    pub fn everyone(msg: ServerMsg) -> Self {
        Self {
            audience: Audience::Everyone,
            msg,
        }
    }

    pub fn except(session_id: Uuid, msg: ServerMsg) -> Self {
        Self {
            audience: Audience::EveryoneExcept(session_id),
            msg,
        }
    }

    pub fn only(session_id: Uuid, msg: ServerMsg) -> Self {
        Self {
            audience: Audience::Only(session_id),
            msg,
        }
    }
}

/// Something a session did
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Join,
    Client(ClientMsg),
    Leave,
    /// The session fell behind and needs a full snapshot
    Resync,
}

/// Apply one session event to the room.
/// The session id doubles as the player id.
pub fn dispatch(room: &mut GameRoom, session_id: Uuid, event: RoomEvent, now: u64) -> Vec<Outbound> {
    let mut out = Vec::new();

    match event {
        RoomEvent::Join => {
            let joined = room.add_player(session_id);
            out.push(Outbound::only(session_id, ServerMsg::RoomState(room.get_state(now))));
            out.push(Outbound::except(
                session_id,
                ServerMsg::PlayerJoined {
                    id: joined.id,
                    position: joined.position,
                },
            ));
        }

        RoomEvent::Leave => {
            if room.remove_player(&session_id) {
                out.push(Outbound::except(session_id, ServerMsg::PlayerLeft { id: session_id }));
            }
        }

        RoomEvent::Resync | RoomEvent::Client(ClientMsg::RequestState) => {
            out.push(Outbound::only(session_id, ServerMsg::RoomState(room.get_state(now))));
        }

        RoomEvent::Client(ClientMsg::PlayerMove { position }) => {
            if room.update_player_position(&session_id, position) {
                out.push(Outbound::except(
                    session_id,
                    ServerMsg::PlayerMoved {
                        id: session_id,
                        position,
                    },
                ));
            }
        }

        RoomEvent::Client(ClientMsg::PlayerShoot {
            position,
            direction,
        }) => {
            let Some(outcome) = room.process_shot(&session_id, direction, now) else {
                return out;
            };

            out.push(Outbound::except(
                session_id,
                ServerMsg::PlayerShot {
                    id: session_id,
                    position,
                    direction,
                },
            ));

            if let Some(hit) = &outcome.hit {
                if hit.target_killed || room.settings().report_all_hits {
                    out.push(Outbound::everyone(hit_msg(hit)));
                }
            }

            match outcome.game_over {
                Some(result) => push_match_end(&mut out, room, result, now),
                None => {
                    if let Some((id, position)) = outcome.respawn {
                        out.push(Outbound::everyone(ServerMsg::PlayerRespawned { id, position }));
                    }
                }
            }
        }

        RoomEvent::Client(ClientMsg::SwitchWeapon { weapon }) => {
            if room.switch_weapon(&session_id, weapon) {
                out.push(Outbound::except(
                    session_id,
                    ServerMsg::WeaponSwitched {
                        id: session_id,
                        weapon,
                    },
                ));
            }
        }

        RoomEvent::Client(ClientMsg::Reload) => {
            room.reload(&session_id, now);
        }

        RoomEvent::Client(ClientMsg::Ping { t }) => {
            out.push(Outbound::only(
                session_id,
                ServerMsg::Pong { t, server_time: now },
            ));
        }
    }

    out
}

/// Advance the room by one tick.
/// `dt` drives physics (seconds); `elapsed_ms` drives respawn countdowns.
pub fn tick(room: &mut GameRoom, now: u64, dt: f32, elapsed_ms: u64) -> Vec<Outbound> {
    let mut out = Vec::new();

    if room.settings().physics_step {
        for id in room.step_physics(dt) {
            if let Some(player) = room.player(&id) {
                out.push(Outbound::everyone(ServerMsg::PlayerMoved {
                    id,
                    position: player.position,
                }));
            }
        }
    }

    for (id, position) in room.advance_respawns(elapsed_ms) {
        out.push(Outbound::everyone(ServerMsg::PlayerRespawned { id, position }));
    }

    if room.is_active() {
        if let Some(result) = room.poll_timer(now) {
            push_match_end(&mut out, room, result, now);
        }
    } else if room.next_round(now) {
        out.push(Outbound::everyone(ServerMsg::GameStart {
            time_remaining: room.time_remaining(now),
        }));
        out.push(Outbound::everyone(ServerMsg::RoomState(room.get_state(now))));
    }

    out
}

fn hit_msg(hit: &HitResult) -> ServerMsg {
    ServerMsg::PlayerHit {
        shooter: hit.shooter_id,
        target: hit.target_id,
        shooter_score: hit.shooter_score,
        damage: hit.damage,
        target_health: hit.target_health,
        killed: hit.target_killed,
    }
}

/// game_over, then the new arena, then positions on it
fn push_match_end(out: &mut Vec<Outbound>, room: &GameRoom, result: MatchResult, now: u64) {
    out.push(Outbound::everyone(ServerMsg::GameOver {
        winner: result.winner,
        score: result.score,
    }));
    out.push(Outbound::everyone(ServerMsg::NewMap(room.map().clone())));
    out.push(Outbound::everyone(ServerMsg::RoomState(room.get_state(now))));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::math::Vec3;
    use crate::game::room::RoomSettings;
    use crate::ws::protocol::RoomPhase;

    const DOWN_Z: Vec3 = Vec3::new(0.0, 0.0, -1.0);

    fn room_with(settings: RoomSettings) -> GameRoom {
        GameRoom::new("main", settings, 7)
    }

    fn room() -> GameRoom {
        room_with(RoomSettings {
            physics_step: false,
            ..RoomSettings::default()
        })
    }

    fn shoot() -> RoomEvent {
        RoomEvent::Client(ClientMsg::PlayerShoot {
            position: Vec3::new(0.0, 1.0, 0.0),
            direction: DOWN_Z,
        })
    }

    fn move_to(x: f32, z: f32) -> RoomEvent {
        RoomEvent::Client(ClientMsg::PlayerMove {
            position: Vec3::new(x, 1.0, z),
        })
    }

    /// Two joined players in a running match, facing each other along Z
    fn duel(room: &mut GameRoom) -> (Uuid, Uuid) {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        dispatch(room, a, RoomEvent::Join, 0);
        dispatch(room, b, RoomEvent::Join, 0);
        tick(room, 0, 0.05, 50);
        assert!(room.is_active());
        dispatch(room, a, move_to(0.0, 0.0), 0);
        dispatch(room, b, move_to(0.0, -10.0), 0);
        (a, b)
    }

    #[test]
    fn join_sends_state_to_joiner_and_announces_to_others() {
        let mut room = room();
        let first = Uuid::new_v4();
        dispatch(&mut room, first, RoomEvent::Join, 0);

        let second = Uuid::new_v4();
        let out = dispatch(&mut room, second, RoomEvent::Join, 0);
        assert_eq!(out.len(), 2);

        assert_eq!(out[0].audience, Audience::Only(second));
        match &out[0].msg {
            ServerMsg::RoomState(state) => {
                assert_eq!(state.players.len(), 2);
                assert!(state.players.contains_key(&first));
                assert!(state.players.contains_key(&second));
            }
            other => panic!("expected room_state, got {other:?}"),
        }

        assert_eq!(out[1].audience, Audience::EveryoneExcept(second));
        assert!(out[1].audience.includes(&first));
        assert!(matches!(out[1].msg, ServerMsg::PlayerJoined { id, .. } if id == second));
    }

    #[test]
    fn move_is_relayed_to_others_only() {
        let mut room = room();
        let (a, _b) = duel(&mut room);
        let out = dispatch(&mut room, a, move_to(3.0, 4.0), 10);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].audience, Audience::EveryoneExcept(a));
        assert!(matches!(
            out[0].msg,
            ServerMsg::PlayerMoved { id, position } if id == a && position == Vec3::new(3.0, 1.0, 4.0)
        ));

        let stranger = Uuid::new_v4();
        assert!(dispatch(&mut room, stranger, move_to(1.0, 1.0), 10).is_empty());
    }

    #[test]
    fn hit_is_broadcast_to_everyone() {
        let mut room = room();
        let (a, b) = duel(&mut room);

        let out = dispatch(&mut room, a, shoot(), 1000);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].audience, Audience::EveryoneExcept(a));
        assert!(matches!(out[0].msg, ServerMsg::PlayerShot { id, .. } if id == a));
        assert_eq!(out[1].audience, Audience::Everyone);
        assert!(matches!(
            out[1].msg,
            ServerMsg::PlayerHit { shooter, target, target_health: 75, killed: false, .. }
                if shooter == a && target == b
        ));
    }

    #[test]
    fn non_lethal_hits_can_be_muted() {
        let mut room = room_with(RoomSettings {
            physics_step: false,
            report_all_hits: false,
            ..RoomSettings::default()
        });
        let (a, _b) = duel(&mut room);

        let out = dispatch(&mut room, a, shoot(), 1000);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].msg, ServerMsg::PlayerShot { .. }));

        for t in [2000, 3000] {
            dispatch(&mut room, a, shoot(), t);
        }
        let out = dispatch(&mut room, a, shoot(), 4000);
        assert!(out
            .iter()
            .any(|o| matches!(o.msg, ServerMsg::PlayerHit { killed: true, .. })));
        assert!(out
            .iter()
            .any(|o| matches!(o.msg, ServerMsg::PlayerRespawned { .. })));
    }

    #[test]
    fn dropped_shot_produces_nothing() {
        let mut room = room();
        let (a, _b) = duel(&mut room);
        assert!(!dispatch(&mut room, a, shoot(), 1000).is_empty());
        assert!(dispatch(&mut room, a, shoot(), 1200).is_empty());
    }

    #[test]
    fn winning_kill_emits_game_over_then_new_map() {
        let mut room = room();
        let (a, b) = duel(&mut room);
        let mut now = 1000;
        let mut last = Vec::new();

        // Ten kills at four hits each
        for _ in 0..40 {
            dispatch(&mut room, b, move_to(0.0, -10.0), now);
            dispatch(&mut room, a, move_to(0.0, 0.0), now);
            last = dispatch(&mut room, a, shoot(), now);
            now += 1000;
            if room.phase() == RoomPhase::Ended {
                break;
            }
        }

        assert_eq!(room.phase(), RoomPhase::Ended);
        let kinds: Vec<&ServerMsg> = last.iter().map(|o| &o.msg).collect();
        let over = kinds
            .iter()
            .position(|m| matches!(m, ServerMsg::GameOver { winner: Some(w), score: 10 } if *w == a))
            .expect("game_over sent");
        let new_map = kinds
            .iter()
            .position(|m| matches!(m, ServerMsg::NewMap(_)))
            .expect("new_map sent");
        assert!(over < new_map);
        assert!(!kinds.iter().any(|m| matches!(m, ServerMsg::PlayerRespawned { .. })));

        // The next tick starts a fresh round
        let out = tick(&mut room, now, 0.05, 50);
        assert!(room.is_active());
        assert!(matches!(out[0].msg, ServerMsg::GameStart { time_remaining: 600 }));
        assert!(room.players().all(|p| p.score == 0));
    }

    #[test]
    fn leave_notifies_remaining_players() {
        let mut room = room();
        let (a, b) = duel(&mut room);
        let out = dispatch(&mut room, b, RoomEvent::Leave, 100);
        assert_eq!(out.len(), 1);
        assert!(out[0].audience.includes(&a));
        assert!(!out[0].audience.includes(&b));
        assert!(matches!(out[0].msg, ServerMsg::PlayerLeft { id } if id == b));

        // Second leave is a no-op
        assert!(dispatch(&mut room, b, RoomEvent::Leave, 100).is_empty());
    }

    #[test]
    fn ping_and_state_requests_answer_only_the_sender() {
        let mut room = room();
        let (a, _b) = duel(&mut room);

        let out = dispatch(&mut room, a, RoomEvent::Client(ClientMsg::Ping { t: 42 }), 900);
        assert_eq!(out[0].audience, Audience::Only(a));
        assert!(matches!(out[0].msg, ServerMsg::Pong { t: 42, server_time: 900 }));

        let out = dispatch(&mut room, a, RoomEvent::Client(ClientMsg::RequestState), 900);
        assert_eq!(out[0].audience, Audience::Only(a));
        assert!(matches!(out[0].msg, ServerMsg::RoomState(_)));
    }

    #[test]
    fn weapon_switch_is_announced_once() {
        use crate::ws::protocol::WeaponKind;

        let mut room = room();
        let (a, _b) = duel(&mut room);
        let switch = RoomEvent::Client(ClientMsg::SwitchWeapon {
            weapon: WeaponKind::Rifle,
        });
        let out = dispatch(&mut room, a, switch.clone(), 0);
        assert!(matches!(
            out[0].msg,
            ServerMsg::WeaponSwitched { weapon: WeaponKind::Rifle, .. }
        ));
        assert!(dispatch(&mut room, a, switch, 0).is_empty());
    }

    #[test]
    fn tick_reports_collision_corrections() {
        let mut room = room_with(RoomSettings::default());
        let (a, _b) = duel(&mut room);
        dispatch(&mut room, a, move_to(40.0, 0.0), 0);

        let out = tick(&mut room, 50, 0.05, 50);
        assert!(out.iter().any(|o| {
            o.audience == Audience::Everyone
                && matches!(o.msg, ServerMsg::PlayerMoved { id, position } if id == a && position.x < 25.0)
        }));
    }

    #[test]
    fn idle_player_on_a_box_causes_no_traffic() {
        use crate::game::map::{GameMap, Obstacle, ObstacleSize};
        use crate::game::physics::PLAYER_RADIUS;

        let mut room = room_with(RoomSettings::default());
        room.set_map(GameMap {
            size: 50.0,
            obstacles: vec![Obstacle {
                position: Vec3::new(-6.0, 1.0, 8.0),
                size: ObstacleSize {
                    width: 3.0,
                    height: 2.0,
                    depth: 3.0,
                },
            }],
            spawn_points: vec![Vec3::new(10.0, 1.0, 10.0)],
        });
        let id = Uuid::new_v4();
        dispatch(&mut room, id, RoomEvent::Join, 0);
        tick(&mut room, 0, 0.05, 50);
        assert!(room.is_active());
        room.update_player_position(&id, Vec3::new(-6.0, 2.0 + PLAYER_RADIUS, 8.0));

        let mut now = 0;
        for _ in 0..40 {
            now += 50;
            let out = tick(&mut room, now, 0.05, 50);
            assert!(
                !out.iter().any(|o| matches!(o.msg, ServerMsg::PlayerMoved { .. })),
                "unexpected correction at {now}ms"
            );
        }
    }

    #[test]
    fn timeout_ends_match_on_tick() {
        let mut room = room_with(RoomSettings {
            physics_step: false,
            match_time_limit_ms: 1_000,
            ..RoomSettings::default()
        });
        duel(&mut room);

        assert!(tick(&mut room, 500, 0.05, 50).is_empty());
        let out = tick(&mut room, 1_000, 0.05, 50);
        assert!(matches!(out[0].msg, ServerMsg::GameOver { winner: None, score: 0 }));
        assert!(matches!(out[1].msg, ServerMsg::NewMap(_)));
        assert_eq!(room.phase(), RoomPhase::Ended);
    }
}
