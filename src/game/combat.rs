//! Combat system - weapons, damage, hit detection

use uuid::Uuid;

use crate::ws::protocol::WeaponKind;

use super::math::Vec3;
use super::player::PlayerState;

/// Cosine of the hit-cone half angle (about 25 degrees)
pub const HIT_CONE_COS: f32 = 0.9;
/// Maximum distance a shot can reach
pub const WEAPON_RANGE: f32 = 50.0;

/// Weapon stats per weapon kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponStats {
    /// Damage per hit
    pub damage: u32,
    /// Minimum time between shots (ms)
    pub fire_interval_ms: u64,
    /// Rounds per magazine
    pub magazine: u32,
    /// Time to refill the magazine (ms)
    pub reload_ms: u64,
}

impl WeaponStats {
    pub fn for_kind(kind: WeaponKind) -> Self {
        match kind {
            WeaponKind::Pistol => Self {
                damage: 25,
                fire_interval_ms: 500,
                magazine: 10,
                reload_ms: 1000,
            },
            WeaponKind::Rifle => Self {
                damage: 15,
                fire_interval_ms: 100,
                magazine: 30,
                reload_ms: 2000,
            },
        }
    }
}

/// Candidate picked by the hit-cone test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConeHit {
    pub target_id: Uuid,
    pub distance: f32,
    /// Cosine between the shot direction and the direction to the target
    pub alignment: f32,
}

/// Hit result from combat resolution
#[derive(Debug, Clone, PartialEq)]
pub struct HitResult {
    pub shooter_id: Uuid,
    pub target_id: Uuid,
    pub damage: u32,
    pub target_health: u32,
    pub target_killed: bool,
    pub shooter_score: u32,
}

/// Combat system for directional hit decisions
pub struct CombatSystem;

impl CombatSystem {
    /// Angular-cone hit test: the best-aligned living target inside the cone and range,
    /// nearest first on equal alignment.
    pub fn find_cone_target<'a, I>(
        shooter_id: Uuid,
        origin: Vec3,
        direction: Vec3,
        players: I,
    ) -> Option<ConeHit>
    where
        I: IntoIterator<Item = &'a PlayerState>,
    {
        let direction = direction.normalize();
        if direction == Vec3::ZERO {
            return None;
        }

        let mut best: Option<ConeHit> = None;

        for target in players {
            if target.id == shooter_id || !target.alive {
                continue;
            }

            let to_target = target.position - origin;
            let distance = to_target.length();
            if distance == 0.0 || distance > WEAPON_RANGE {
                continue;
            }

            let alignment = to_target.normalize().dot(direction);
            if alignment <= HIT_CONE_COS {
                continue;
            }

            let better = match &best {
                None => true,
                Some(b) => {
                    alignment > b.alignment || (alignment == b.alignment && distance < b.distance)
                }
            };
            if better {
                best = Some(ConeHit {
                    target_id: target.id,
                    distance,
                    alignment,
                });
            }
        }

        best
    }
}
