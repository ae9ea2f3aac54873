//! Player movement, collision response and ray hit-testing

use uuid::Uuid;

use super::map::{GameMap, Obstacle};
use super::math::Vec3;
use super::player::PlayerState;

/// Downward acceleration (units/s²)
pub const GRAVITY: f32 = 9.8;
/// Lowest allowed height of a player's centre
pub const GROUND_HEIGHT: f32 = 1.0;
/// Horizontal velocity multiplier applied every step
pub const FRICTION: f32 = 0.9;
/// Fraction of the into-surface speed kept (reflected) after a wall hit
pub const RESTITUTION: f32 = 0.5;
/// Players collide as spheres of this radius
pub const PLAYER_RADIUS: f32 = 0.5;
/// Minimum horizontal distance between two living players
pub const MIN_PLAYER_SEPARATION: f32 = 1.0;
/// Max perpendicular distance from a ray for it to count as hitting a player
pub const HIT_RADIUS: f32 = 0.5;

/// Passes over the obstacle list, so boxes touching each other still settle
const MAX_RESOLVE_PASSES: usize = 4;

/// A contact to push out of
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    /// Unit vector pointing away from the surface
    pub normal: Vec3,
    /// How far to move along `normal` to clear the surface
    pub depth: f32,
}

/// Result of a ray test against players
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub target_id: Uuid,
    /// Distance along the ray to the closest approach
    pub distance: f32,
}

/// Physics system for integrating and resolving player bodies
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Apply gravity, move by velocity, floor at the ground and damp horizontal speed
    pub fn integrate(player: &mut PlayerState, dt: f32) {
        if !player.alive {
            return;
        }

        player.velocity.y -= GRAVITY * dt;
        player.position += player.velocity * dt;

        if player.position.y < GROUND_HEIGHT {
            player.position.y = GROUND_HEIGHT;
            player.velocity.y = 0.0;
            player.grounded = true;
        } else {
            player.grounded = false;
        }

        player.velocity.x *= FRICTION;
        player.velocity.z *= FRICTION;
    }

    /// Sphere-vs-box test. Returns the push-out contact if they overlap.
    pub fn obstacle_collision(position: Vec3, radius: f32, obstacle: &Obstacle) -> Option<Collision> {
        let (min, max) = (obstacle.min(), obstacle.max());
        let closest = position.clamp(min, max);
        let distance = position.distance(closest);

        if distance >= radius {
            return None;
        }

        if distance > 0.0 {
            return Some(Collision {
                normal: (position - closest).normalize(),
                depth: radius - distance,
            });
        }

        // Centre is inside the box: leave through the nearest face.
        // Boxes rest on the floor, so their bottom face is never an exit.
        let faces = [
            (position.x - min.x, -Vec3::X),
            (max.x - position.x, Vec3::X),
            (max.y - position.y, Vec3::Y),
            (position.z - min.z, -Vec3::Z),
            (max.z - position.z, Vec3::Z),
        ];
        let (face_distance, normal) = faces
            .into_iter()
            .fold((f32::INFINITY, Vec3::Y), |best, face| if face.0 < best.0 { face } else { best });

        Some(Collision {
            normal,
            depth: face_distance + radius,
        })
    }

    /// Contacts against the four arena walls
    pub fn boundary_collisions(position: Vec3, radius: f32, map: &GameMap) -> Vec<Collision> {
        let half = map.half_extent();
        let mut collisions = Vec::new();

        if position.x - radius < -half {
            collisions.push(Collision {
                normal: Vec3::X,
                depth: radius - (position.x + half),
            });
        }
        if position.x + radius > half {
            collisions.push(Collision {
                normal: -Vec3::X,
                depth: radius - (half - position.x),
            });
        }
        if position.z - radius < -half {
            collisions.push(Collision {
                normal: Vec3::Z,
                depth: radius - (position.z + half),
            });
        }
        if position.z + radius > half {
            collisions.push(Collision {
                normal: -Vec3::Z,
                depth: radius - (half - position.z),
            });
        }

        collisions
    }

    /// Push the player out along the contact normal and kill the into-surface velocity
    pub fn resolve_collision(player: &mut PlayerState, collision: &Collision) {
        player.position += collision.normal * collision.depth;

        let into = player.velocity.dot(collision.normal);
        if into < 0.0 {
            if collision.normal.y > 0.7 {
                // Landing on top of something: stop, don't bounce
                player.velocity -= collision.normal * into;
                player.grounded = true;
            } else {
                player.velocity -= collision.normal * ((1.0 + RESTITUTION) * into);
            }
        }
    }

    /// Resolve against every obstacle. Returns true if anything was touched.
    pub fn resolve_obstacles(player: &mut PlayerState, map: &GameMap) -> bool {
        if !player.alive {
            return false;
        }

        let mut touched = false;
        for _ in 0..MAX_RESOLVE_PASSES {
            let mut pass_touched = false;
            for obstacle in &map.obstacles {
                if let Some(collision) =
                    Self::obstacle_collision(player.position, PLAYER_RADIUS, obstacle)
                {
                    Self::resolve_collision(player, &collision);
                    pass_touched = true;
                }
            }
            touched |= pass_touched;
            if !pass_touched {
                break;
            }
        }
        touched
    }

    /// Keep the player inside the arena walls. Returns true if a wall was touched.
    pub fn resolve_boundaries(player: &mut PlayerState, map: &GameMap) -> bool {
        if !player.alive {
            return false;
        }

        let collisions = Self::boundary_collisions(player.position, PLAYER_RADIUS, map);
        for collision in &collisions {
            Self::resolve_collision(player, collision);
        }
        !collisions.is_empty()
    }

    /// Separate overlapping living players on the horizontal plane.
    /// Returns the ids of players that were moved.
    pub fn resolve_player_pairs<'a, I>(players: I) -> Vec<Uuid>
    where
        I: IntoIterator<Item = &'a mut PlayerState>,
    {
        let mut living: Vec<&mut PlayerState> = players.into_iter().filter(|p| p.alive).collect();
        let mut moved = Vec::new();

        for i in 0..living.len() {
            let (head, tail) = living.split_at_mut(i + 1);
            let first = &mut head[i];
            for second in tail.iter_mut() {
                let offset = (first.position - second.position).horizontal();
                let distance = offset.length();
                if distance >= MIN_PLAYER_SEPARATION {
                    continue;
                }

                // Coincident players: pick an arbitrary axis
                let direction = if distance > 0.0 { offset.normalize() } else { Vec3::X };
                let push = direction * ((MIN_PLAYER_SEPARATION - distance) / 2.0);

                first.position += push;
                second.position -= push;

                for id in [first.id, second.id] {
                    if !moved.contains(&id) {
                        moved.push(id);
                    }
                }
            }
        }

        moved
    }

    /// Cast a ray from `origin` and return the nearest living player it passes through.
    /// Obstacles do not block the ray.
    pub fn raycast_players<'a, I>(
        origin_id: Uuid,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        players: I,
    ) -> Option<RayHit>
    where
        I: IntoIterator<Item = &'a PlayerState>,
    {
        let direction = direction.normalize();
        if direction == Vec3::ZERO {
            return None;
        }

        let mut best: Option<(RayHit, f32)> = None;

        for player in players {
            if !player.alive || player.id == origin_id {
                continue;
            }

            let to_player = player.position - origin;
            let along = to_player.dot(direction);
            if along < 0.0 || along > max_distance {
                continue;
            }

            let closest = origin + direction * along;
            let perpendicular = closest.distance(player.position);
            if perpendicular >= HIT_RADIUS {
                continue;
            }

            let better = match &best {
                None => true,
                Some((hit, best_perp)) => {
                    along < hit.distance || (along == hit.distance && perpendicular < *best_perp)
                }
            };
            if better {
                best = Some((
                    RayHit {
                        target_id: player.id,
                        distance: along,
                    },
                    perpendicular,
                ));
            }
        }

        best.map(|(hit, _)| hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::ObstacleSize;

    const EPS: f32 = 1e-4;

    fn player_at(position: Vec3) -> PlayerState {
        PlayerState::new(Uuid::new_v4(), position)
    }

    fn empty_map() -> GameMap {
        GameMap {
            size: 50.0,
            obstacles: Vec::new(),
            spawn_points: vec![Vec3::new(0.0, GROUND_HEIGHT, 0.0)],
        }
    }

    fn crate_box(center_x: f32, center_z: f32, width: f32, height: f32, depth: f32) -> Obstacle {
        Obstacle {
            position: Vec3::new(center_x, height / 2.0, center_z),
            size: ObstacleSize { width, height, depth },
        }
    }

    fn sphere_box_overlap(position: Vec3, obstacle: &Obstacle) -> f32 {
        let closest = position.clamp(obstacle.min(), obstacle.max());
        let inside = closest == position;
        if inside {
            PLAYER_RADIUS
        } else {
            (PLAYER_RADIUS - position.distance(closest)).max(0.0)
        }
    }

    #[test]
    fn integrate_applies_gravity_and_floors() {
        let mut p = player_at(Vec3::new(0.0, 5.0, 0.0));
        PhysicsSystem::integrate(&mut p, 0.1);
        assert!((p.velocity.y + GRAVITY * 0.1).abs() < EPS);
        assert!(p.position.y < 5.0);
        assert!(!p.grounded);

        let mut p = player_at(Vec3::new(0.0, GROUND_HEIGHT, 0.0));
        p.velocity = Vec3::new(2.0, -3.0, -4.0);
        PhysicsSystem::integrate(&mut p, 0.05);
        assert_eq!(p.position.y, GROUND_HEIGHT);
        assert_eq!(p.velocity.y, 0.0);
        assert!(p.grounded);
        assert!((p.velocity.x - 2.0 * FRICTION).abs() < EPS);
        assert!((p.velocity.z + 4.0 * FRICTION).abs() < EPS);
    }

    #[test]
    fn integrate_skips_dead_players() {
        let mut p = player_at(Vec3::new(0.0, 5.0, 0.0));
        p.apply_damage(100);
        PhysicsSystem::integrate(&mut p, 0.1);
        assert_eq!(p.position, Vec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn side_contact_pushes_out_and_damps() {
        let obstacle = crate_box(0.0, 0.0, 2.0, 4.0, 2.0);
        let mut map = empty_map();
        map.obstacles.push(obstacle);

        // Sphere centre 0.3 from the +X face
        let mut p = player_at(Vec3::new(1.3, GROUND_HEIGHT, 0.0));
        p.velocity = Vec3::new(-4.0, 0.0, 1.0);

        assert!(PhysicsSystem::resolve_obstacles(&mut p, &map));
        assert!((p.position.x - 1.5).abs() < EPS);
        // Reflected with restitution, tangent untouched
        assert!((p.velocity.x - 2.0).abs() < EPS);
        assert!((p.velocity.z - 1.0).abs() < EPS);
        assert!(sphere_box_overlap(p.position, &obstacle) < EPS);
    }

    #[test]
    fn centre_inside_box_exits_through_nearest_face() {
        let obstacle = crate_box(0.0, 0.0, 4.0, 6.0, 4.0);
        let collision =
            PhysicsSystem::obstacle_collision(Vec3::new(1.8, 3.0, 0.5), PLAYER_RADIUS, &obstacle)
                .expect("centre inside must collide");
        assert_eq!(collision.normal, Vec3::X);
        assert!((collision.depth - (0.2 + PLAYER_RADIUS)).abs() < EPS);

        let mut map = empty_map();
        map.obstacles.push(obstacle);
        let mut p = player_at(Vec3::new(0.3, 1.0, -1.6));
        PhysicsSystem::resolve_obstacles(&mut p, &map);
        assert!(sphere_box_overlap(p.position, &obstacle) < EPS);
        assert!(p.position.y >= GROUND_HEIGHT - EPS);
    }

    #[test]
    fn no_overlap_after_resolution_over_grid() {
        let obstacle = crate_box(3.0, -2.0, 3.0, 2.5, 1.5);
        let mut map = empty_map();
        map.obstacles.push(obstacle);

        for ix in -10..=10 {
            for iz in -10..=10 {
                let start = Vec3::new(3.0 + ix as f32 * 0.2, 1.0, -2.0 + iz as f32 * 0.15);
                let mut p = player_at(start);
                PhysicsSystem::resolve_obstacles(&mut p, &map);
                assert!(
                    sphere_box_overlap(p.position, &obstacle) < EPS,
                    "still overlapping from {start:?} -> {:?}",
                    p.position
                );
            }
        }
    }

    #[test]
    fn landing_on_top_stops_vertical_motion() {
        let obstacle = crate_box(0.0, 0.0, 4.0, 2.0, 4.0);
        let mut map = empty_map();
        map.obstacles.push(obstacle);

        let mut p = player_at(Vec3::new(0.0, 2.3, 0.0));
        p.velocity = Vec3::new(0.0, -3.0, 0.0);
        PhysicsSystem::resolve_obstacles(&mut p, &map);
        assert!((p.position.y - 2.5).abs() < EPS);
        assert_eq!(p.velocity.y, 0.0);
        assert!(p.grounded);
    }

    #[test]
    fn boundaries_push_back_inside() {
        let map = empty_map();
        let mut p = player_at(Vec3::new(25.2, 1.0, -26.0));
        p.velocity = Vec3::new(3.0, 0.0, -2.0);

        assert!(PhysicsSystem::resolve_boundaries(&mut p, &map));
        assert!((p.position.x - 24.5).abs() < EPS);
        assert!((p.position.z + 24.5).abs() < EPS);
        assert!(p.velocity.x < 0.0);
        assert!(p.velocity.z > 0.0);

        let mut inside = player_at(Vec3::new(0.0, 1.0, 0.0));
        assert!(!PhysicsSystem::resolve_boundaries(&mut inside, &map));
    }

    #[test]
    fn close_players_separate_symmetrically() {
        let mut a = player_at(Vec3::new(0.0, 1.0, 0.0));
        let mut b = player_at(Vec3::new(0.4, 3.0, 0.0));

        let moved = PhysicsSystem::resolve_player_pairs([&mut a, &mut b]);
        assert_eq!(moved.len(), 2);

        let gap = (a.position - b.position).horizontal().length();
        assert!(gap >= MIN_PLAYER_SEPARATION - EPS, "gap {gap}");
        assert!((a.position.x + 0.3).abs() < EPS);
        assert!((b.position.x - 0.7).abs() < EPS);
        // Vertical untouched
        assert_eq!(a.position.y, 1.0);
        assert_eq!(b.position.y, 3.0);
    }

    #[test]
    fn coincident_and_dead_players() {
        let mut a = player_at(Vec3::new(2.0, 1.0, 2.0));
        let mut b = player_at(Vec3::new(2.0, 1.0, 2.0));
        PhysicsSystem::resolve_player_pairs([&mut a, &mut b]);
        assert!(((a.position - b.position).horizontal().length() - 1.0).abs() < EPS);

        let mut c = player_at(Vec3::new(0.0, 1.0, 0.0));
        let mut d = player_at(Vec3::new(0.2, 1.0, 0.0));
        d.apply_damage(100);
        let moved = PhysicsSystem::resolve_player_pairs([&mut c, &mut d]);
        assert!(moved.is_empty());
        assert_eq!(c.position, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn raycast_hits_target_in_line_and_misses_off_axis() {
        let shooter = player_at(Vec3::ZERO);
        let a = player_at(Vec3::new(0.0, 0.0, -10.0));
        let b = player_at(Vec3::new(5.0, 0.0, -10.0));
        let players = [shooter.clone(), a.clone(), b.clone()];

        let hit = PhysicsSystem::raycast_players(
            shooter.id,
            shooter.position,
            Vec3::new(0.0, 0.0, -1.0),
            50.0,
            players.iter(),
        );
        assert_eq!(hit.map(|h| h.target_id), Some(a.id));

        let only_b = [shooter.clone(), b];
        let miss = PhysicsSystem::raycast_players(
            shooter.id,
            shooter.position,
            Vec3::new(0.0, 0.0, -1.0),
            50.0,
            only_b.iter(),
        );
        assert!(miss.is_none());
    }

    #[test]
    fn raycast_prefers_nearest_and_ignores_behind_far_dead() {
        let shooter = player_at(Vec3::ZERO);
        let near = player_at(Vec3::new(0.2, 0.0, -5.0));
        let far = player_at(Vec3::new(0.0, 0.0, -8.0));
        let behind = player_at(Vec3::new(0.0, 0.0, 3.0));
        let beyond = player_at(Vec3::new(0.0, 0.0, -60.0));
        let mut dead = player_at(Vec3::new(0.0, 0.0, -2.0));
        dead.apply_damage(100);

        let players = [near.clone(), far, behind.clone(), beyond.clone(), dead];
        let hit = PhysicsSystem::raycast_players(
            shooter.id,
            shooter.position,
            Vec3::new(0.0, 0.0, -3.0),
            50.0,
            players.iter(),
        )
        .expect("near target is on the ray");
        assert_eq!(hit.target_id, near.id);
        assert!((hit.distance - 5.0).abs() < EPS);

        let none = PhysicsSystem::raycast_players(
            shooter.id,
            shooter.position,
            Vec3::new(0.0, 0.0, -1.0),
            50.0,
            [behind, beyond].iter(),
        );
        assert!(none.is_none());

        let zero_dir =
            PhysicsSystem::raycast_players(shooter.id, shooter.position, Vec3::ZERO, 50.0, players.iter());
        assert!(zero_dir.is_none());
    }
}
