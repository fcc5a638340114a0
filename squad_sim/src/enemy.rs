// Enemy entities and enemy AI.
//
// Enemies carry their stats copied from the `EnemyData` row at spawn time
// and one of three behaviors:
// - `MeleeSwarm` closes to melee range of the nearest active unit and hits.
// - `RangedKite` approaches until the target is inside weapon range with a
//   clear line of sight, then holds and shoots.
// - `Stationary` (the hive) never moves or attacks.
//
// Re-pathing is throttled to once per `enemy_repath_ms` while the target is
// out of reach. Enemies plan straight through locked doors; the walker
// stops them at the door, where combat turns the wait into bashing. The decision is applied in the AI phase; movement and
// attacks happen in the movement and combat phases like everyone else's.
//
// See also: `world.rs` where enemies live, `combat.rs` for enemy attacks
// and door bashing, `director.rs` which spawns waves.

use crate::archetype::*;
use crate::config::GameConfig;
use crate::los::has_line_of_sight;
use crate::pathfinding::astar_breaching;
use crate::types::*;
use crate::world::World;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnemyState {
    Idle,
    Moving,
    Attacking,
    WaitingForDoor,
    Dead,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Enemy {
    pub id: EnemyId,
    pub kind: EnemyKind,
    pub pos: Vec2,
    pub hp: f32,
    pub max_hp: f32,
    pub damage: f32,
    pub fire_rate_ms: u32,
    pub accuracy: f32,
    pub range: f32,
    pub speed: f32,
    pub behavior: EnemyBehavior,
    pub elite: bool,
    pub state: EnemyState,
    pub path: Vec<CellCoord>,
    pub target_unit: Option<UnitId>,
    pub last_attack_ms: Option<u64>,
    pub last_repath_ms: Option<u64>,
    pub waiting_door: Option<DoorId>,
}

impl Enemy {
    pub fn new(id: EnemyId, kind: EnemyKind, pos: Vec2, data: &EnemyData) -> Self {
        Self {
            id,
            kind,
            pos,
            hp: data.hp,
            max_hp: data.hp,
            damage: data.damage,
            fire_rate_ms: data.fire_rate_ms,
            accuracy: data.accuracy,
            range: data.range,
            speed: data.speed,
            behavior: data.behavior,
            elite: data.elite,
            state: EnemyState::Idle,
            path: Vec::new(),
            target_unit: None,
            last_attack_ms: None,
            last_repath_ms: None,
            waiting_door: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state != EnemyState::Dead
    }

    pub fn cell(&self) -> CellCoord {
        self.pos.cell()
    }

    /// Whether `target` is close enough (and, for ranged enemies, visible)
    /// to attack without moving.
    pub fn can_strike(&self, target: Vec2, world: &World, config: &GameConfig) -> bool {
        let dist = self.pos.distance(target);
        match self.behavior {
            EnemyBehavior::Stationary => false,
            EnemyBehavior::MeleeSwarm => dist <= self.range + config.combat.melee_swap_margin,
            EnemyBehavior::RangedKite => {
                dist <= self.range && has_line_of_sight(&world.grid, self.pos, target)
            }
        }
    }
}

/// Pick the nearest active unit. Ties resolve to the lower unit id.
fn nearest_unit(enemy: &Enemy, world: &World) -> Option<(UnitId, Vec2)> {
    world
        .units
        .values()
        .filter(|u| u.is_active())
        .map(|u| (u.id, u.pos, enemy.pos.distance(u.pos)))
        .min_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)))
        .map(|(id, pos, _)| (id, pos))
}

/// Enemy decision step: choose a target, then either hold to attack or
/// (re)plan a path toward it.
pub fn decide_enemies(world: &mut World, config: &GameConfig, now_ms: u64) {
    for id in world.alive_enemy_ids() {
        let Some(enemy) = world.enemies.get(&id) else {
            continue;
        };
        if enemy.behavior == EnemyBehavior::Stationary {
            continue;
        }
        let target = nearest_unit(enemy, world);
        let strike = target.is_some_and(|(_, pos)| enemy.can_strike(pos, world, config));
        let repath_due = enemy.path.is_empty()
            || enemy
                .last_repath_ms
                .is_none_or(|t| now_ms.saturating_sub(t) >= config.combat.enemy_repath_ms);
        let new_path = match target {
            Some((_, pos)) if !strike && repath_due => Some(
                astar_breaching(&world.grid, enemy.cell(), pos.cell())
                    .map(|p| p.cells.into_iter().skip(1).collect::<Vec<_>>())
                    .unwrap_or_default(),
            ),
            _ => None,
        };

        let Some(enemy) = world.enemies.get_mut(&id) else {
            continue;
        };
        enemy.target_unit = target.map(|(uid, _)| uid);
        if strike {
            enemy.path.clear();
            enemy.state = EnemyState::Attacking;
        } else if let Some(path) = new_path {
            enemy.path = path;
            enemy.last_repath_ms = Some(now_ms);
            enemy.state = if enemy.path.is_empty() {
                EnemyState::Idle
            } else {
                EnemyState::Moving
            };
        }
        if target.is_none() {
            enemy.path.clear();
            enemy.state = EnemyState::Idle;
        }
    }
}
