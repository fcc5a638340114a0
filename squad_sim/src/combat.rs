// Combat resolution: targeting, hit rolls, damage.
//
// Hit chance is the same for every shooter:
//
//   chance = clamp(accuracy / 100 × range / max(0.1, distance), 0, 1)
//
// so a shooter with 100 accuracy never misses inside its range and point
// blank shots always land. Every attack consumes exactly one PRNG draw, hit
// or miss, which keeps the stream aligned across replays.
//
// Unit targeting keeps the sticky target while it stays valid, otherwise it
// scores every enemy in reach by `missing hp + 100 / distance` (finish off
// the wounded, prefer the close). `StandGround` units that moved this tick
// do not fire; the AI phase halts them first when a target is already in
// reach.
//
// See also: `world.rs` for `damage_enemy` / `damage_unit` (kill and
// casualty bookkeeping), `sim.rs` for the phase order.

use crate::archetype::AiProfile;
use crate::config::GameConfig;
use crate::door::DoorState;
use crate::enemy::EnemyState;
use crate::event::SimEventKind;
use crate::los::has_line_of_sight;
use crate::prng::GameRng;
use crate::types::*;
use crate::unit::{EngagementPolicy, Unit, UnitState};
use crate::world::World;

pub fn hit_chance(accuracy: f32, range: f32, distance: f32) -> f32 {
    (accuracy / 100.0 * range / distance.max(0.1)).clamp(0.0, 1.0)
}

fn ready_to_fire(last_attack_ms: Option<u64>, fire_rate_ms: u32, now_ms: u64) -> bool {
    last_attack_ms.is_none_or(|t| now_ms.saturating_sub(t) >= u64::from(fire_rate_ms))
}

/// Nearest live enemy the viewer can see within `radius`.
pub fn nearest_visible_enemy(world: &World, from: Vec2, radius: f32) -> Option<(EnemyId, f32)> {
    world
        .enemies
        .values()
        .filter(|e| e.is_alive())
        .map(|e| (e.id, e.pos, from.distance(e.pos)))
        .filter(|(_, pos, d)| *d <= radius && has_line_of_sight(&world.grid, from, *pos))
        .min_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)))
        .map(|(id, _, d)| (id, d))
}

/// The enemy this unit should shoot at right now, with its distance.
pub fn choose_target(unit: &Unit, world: &World, config: &GameConfig) -> Option<(EnemyId, f32)> {
    let reach = unit.stats.range + config.combat.range_margin;
    let candidates: Vec<(EnemyId, f32, f32)> = world
        .enemies
        .values()
        .filter(|e| e.is_alive())
        .filter_map(|e| {
            let d = unit.pos.distance(e.pos);
            (d <= reach && has_line_of_sight(&world.grid, unit.pos, e.pos))
                .then(|| (e.id, d, (e.max_hp - e.hp) + 100.0 / d.max(0.1)))
        })
        .collect();
    if let Some(sticky) = unit.target_enemy {
        if let Some(&(id, d, _)) = candidates.iter().find(|c| c.0 == sticky) {
            return Some((id, d));
        }
    }
    candidates
        .into_iter()
        .max_by(|a, b| a.2.total_cmp(&b.2).then(b.0.cmp(&a.0)))
        .map(|(id, d, _)| (id, d))
}

/// Whether a unit has something to shoot without moving. Used by the AI
/// phase to halt `StandGround` units before they step.
pub fn has_target_in_reach(unit: &Unit, world: &World, config: &GameConfig) -> bool {
    choose_target(unit, world, config).is_some()
}

pub fn resolve_unit_attacks(world: &mut World, rng: &mut GameRng, config: &GameConfig, now_ms: u64) {
    for id in world.active_unit_ids() {
        let Some(unit) = world.units.get(&id) else {
            continue;
        };
        if unit.state == UnitState::Channeling || unit.engagement == EngagementPolicy::Ignore {
            continue;
        }
        if unit.ai_profile == AiProfile::StandGround && unit.moved_this_tick && !unit.is_extracting()
        {
            continue;
        }
        let nearest = nearest_visible_enemy(world, unit.pos, config.units.sight_radius);

        let Some(unit) = world.units.get_mut(&id) else {
            continue;
        };
        unit.update_active_weapon(nearest.map(|(_, d)| d), config);
        unit.refresh_stats(config);

        let Some(unit) = world.units.get(&id) else {
            continue;
        };
        let target = choose_target(unit, world, config);
        let (fire_rate, accuracy, range, damage) = (
            unit.stats.fire_rate_ms,
            unit.stats.accuracy,
            unit.stats.range,
            unit.stats.damage,
        );

        let Some(unit) = world.units.get_mut(&id) else {
            continue;
        };
        let Some((enemy, dist)) = target else {
            unit.target_enemy = None;
            if unit.state == UnitState::Attacking {
                unit.state = UnitState::Idle;
            }
            continue;
        };
        unit.target_enemy = Some(enemy);
        if unit.path.is_empty() && unit.state != UnitState::WaitingForDoor {
            unit.state = UnitState::Attacking;
        }
        if damage <= 0.0 || !ready_to_fire(unit.last_attack_ms, fire_rate, now_ms) {
            continue;
        }
        unit.last_attack_ms = Some(now_ms);
        world.stats.shots_fired += 1;
        let roll = rng.next_f32();
        if roll < hit_chance(accuracy, range, dist) {
            world.damage_enemy(enemy, damage, Some(id));
        }
    }
}

pub fn resolve_turret_attacks(
    world: &mut World,
    rng: &mut GameRng,
    config: &GameConfig,
    now_ms: u64,
) {
    let items = &config.items;
    let turret_ids: Vec<TurretId> = world.turrets.keys().copied().collect();
    for id in turret_ids {
        let Some(turret) = world.turrets.get(&id) else {
            continue;
        };
        if !ready_to_fire(turret.last_attack_ms, items.sentry_fire_rate_ms, now_ms) {
            continue;
        }
        let Some((enemy, dist)) = nearest_visible_enemy(world, turret.pos, items.sentry_range)
        else {
            continue;
        };
        if let Some(turret) = world.turrets.get_mut(&id) {
            turret.last_attack_ms = Some(now_ms);
        }
        let roll = rng.next_f32();
        if roll < hit_chance(items.sentry_accuracy, items.sentry_range, dist) {
            world.damage_enemy(enemy, items.sentry_damage, None);
        }
    }
}

/// Enemy attacks on units, and enemies beating on locked doors that stand
/// between them and their target.
pub fn resolve_enemy_attacks(
    world: &mut World,
    rng: &mut GameRng,
    config: &GameConfig,
    now_ms: u64,
) {
    for id in world.alive_enemy_ids() {
        let Some(enemy) = world.enemies.get(&id) else {
            continue;
        };
        if !ready_to_fire(enemy.last_attack_ms, enemy.fire_rate_ms, now_ms) || enemy.damage <= 0.0
        {
            continue;
        }

        if enemy.state == EnemyState::WaitingForDoor {
            let Some(door_id) = enemy.waiting_door else {
                continue;
            };
            let damage = enemy.damage;
            let Some(door) = world.doors.get_mut(&door_id) else {
                continue;
            };
            if door.state != DoorState::Locked {
                continue;
            }
            if door.damage(damage) {
                door.sync_boundary(&mut world.grid);
                tracing::debug!(door = %door_id, enemy = %id, "door destroyed");
                world.emit(SimEventKind::DoorChanged {
                    door: door_id,
                    state: DoorState::Destroyed,
                });
            }
            if let Some(enemy) = world.enemies.get_mut(&id) {
                enemy.last_attack_ms = Some(now_ms);
            }
            continue;
        }

        if enemy.state != EnemyState::Attacking {
            continue;
        }
        let Some(target) = enemy.target_unit.and_then(|u| world.units.get(&u)) else {
            continue;
        };
        if !target.is_active() || !enemy.can_strike(target.pos, world, config) {
            continue;
        }
        let (target_id, dist) = (target.id, enemy.pos.distance(target.pos));
        let (accuracy, range, damage) = (enemy.accuracy, enemy.range, enemy.damage);
        if let Some(enemy) = world.enemies.get_mut(&id) {
            enemy.last_attack_ms = Some(now_ms);
        }
        let roll = rng.next_f32();
        if roll < hit_chance(accuracy, range, dist) {
            world.damage_unit(target_id, damage);
        }
    }
}

/// Detonate every mine with a live enemy standing on it. The blast hits all
/// enemies in the cell and consumes the mine.
pub fn trigger_mines(world: &mut World, config: &GameConfig) {
    let mines: Vec<(MineId, CellCoord)> = world.mines.values().map(|m| (m.id, m.cell)).collect();
    for (mine, cell) in mines {
        let victims: Vec<EnemyId> = world
            .enemies
            .values()
            .filter(|e| e.is_alive() && e.cell() == cell)
            .map(|e| e.id)
            .collect();
        if victims.is_empty() {
            continue;
        }
        world.mines.remove(&mine);
        for enemy in victims {
            world.damage_enemy(enemy, config.items.mine_damage, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::{Archetype, EnemyKind, WeaponClass, WeaponKind};
    use crate::graph::Grid;
    use crate::map::{MapDefinition, WallDef};
    use crate::unit::SoldierConfig;
    use crate::world::{Mine, Turret};

    fn open_room(archetype: Archetype) -> (World, GameConfig, UnitId) {
        let config = GameConfig::default();
        let mut world = World::new(Grid::new(&MapDefinition::rectangle(12, 3)));
        let id = world.ids.unit();
        let soldier = SoldierConfig {
            archetype,
            equipment: Vec::new(),
            level: 0,
        };
        let unit = Unit::new(id, &soldier, CellCoord::new(0, 1).center(), &config).unwrap();
        world.units.insert(id, unit);
        (world, config, id)
    }

    #[test]
    fn hit_chance_formula() {
        assert_eq!(hit_chance(100.0, 10.0, 10.0), 1.0);
        assert_eq!(hit_chance(50.0, 10.0, 10.0), 0.5);
        assert_eq!(hit_chance(50.0, 10.0, 5.0), 1.0);
        assert_eq!(hit_chance(80.0, 4.0, 0.0), 1.0);
        assert_eq!(hit_chance(-10.0, 4.0, 1.0), 0.0);
    }

    #[test]
    fn targeting_prefers_the_wounded_and_keeps_sticky_target() {
        let (mut world, config, unit) = open_room(Archetype::Assault);
        let near = world
            .spawn_enemy(EnemyKind::XenoMite, CellCoord::new(3, 1).center(), &config)
            .unwrap();
        let far = world
            .spawn_enemy(EnemyKind::WarriorDrone, CellCoord::new(6, 1).center(), &config)
            .unwrap();
        let (picked, _) = choose_target(&world.units[&unit], &world, &config).unwrap();
        assert_eq!(picked, near);

        world.enemies.get_mut(&far).unwrap().hp = 50.0;
        let (picked, _) = choose_target(&world.units[&unit], &world, &config).unwrap();
        assert_eq!(picked, far);

        world.units.get_mut(&unit).unwrap().target_enemy = Some(near);
        let (picked, _) = choose_target(&world.units[&unit], &world, &config).unwrap();
        assert_eq!(picked, near);
    }

    #[test]
    fn walls_hide_targets() {
        let config = GameConfig::default();
        let mut map = MapDefinition::rectangle(4, 1);
        map.walls.push(WallDef { cells: [CellCoord::new(1, 0), CellCoord::new(2, 0)] });
        let mut world = World::new(Grid::new(&map));
        let soldier = SoldierConfig {
            archetype: Archetype::Assault,
            equipment: Vec::new(),
            level: 0,
        };
        let id = world.ids.unit();
        world.units.insert(
            id,
            Unit::new(id, &soldier, CellCoord::new(0, 0).center(), &config).unwrap(),
        );
        world.spawn_enemy(EnemyKind::XenoMite, CellCoord::new(3, 0).center(), &config);
        assert!(choose_target(&world.units[&id], &world, &config).is_none());
        assert!(nearest_visible_enemy(&world, CellCoord::new(0, 0).center(), 8.0).is_none());
    }

    #[test]
    fn sure_shot_kills_and_counts_once() {
        let (mut world, mut config, unit) = open_room(Archetype::Sniper);
        config.weapons.get_mut(&WeaponKind::SniperRifle).unwrap().damage = 500.0;
        world.units.get_mut(&unit).unwrap().stats_dirty = true;
        let enemy = world
            .spawn_enemy(EnemyKind::XenoMite, CellCoord::new(2, 1).center(), &config)
            .unwrap();
        let mut rng = GameRng::new(7);
        resolve_unit_attacks(&mut world, &mut rng, &config, 0);
        assert!(!world.enemies[&enemy].is_alive());
        assert_eq!(world.units[&unit].kills, 1);
        assert_eq!(world.stats.aliens_killed, 1);
        assert_eq!(world.stats.shots_fired, 1);

        // The fire-rate gate holds the next shot.
        resolve_unit_attacks(&mut world, &mut rng, &config, 100);
        assert_eq!(world.stats.shots_fired, 1);
    }

    #[test]
    fn close_enemy_swaps_to_melee() {
        let (mut world, config, unit) = open_room(Archetype::Heavy);
        world.spawn_enemy(EnemyKind::WarriorDrone, CellCoord::new(1, 1).center(), &config);
        let mut rng = GameRng::new(1);
        resolve_unit_attacks(&mut world, &mut rng, &config, 0);
        let heavy = &world.units[&unit];
        assert_eq!(heavy.active_weapon, WeaponClass::Melee);
        assert_eq!(heavy.stats.damage, 80.0);
    }

    #[test]
    fn stand_ground_that_moved_holds_fire() {
        let (mut world, config, unit) = open_room(Archetype::Sniper);
        world.spawn_enemy(EnemyKind::XenoMite, CellCoord::new(4, 1).center(), &config);
        world.units.get_mut(&unit).unwrap().moved_this_tick = true;
        let mut rng = GameRng::new(3);
        resolve_unit_attacks(&mut world, &mut rng, &config, 0);
        assert_eq!(world.stats.shots_fired, 0);
    }

    #[test]
    fn ignore_policy_never_fires() {
        let (mut world, config, unit) = open_room(Archetype::Assault);
        world.spawn_enemy(EnemyKind::XenoMite, CellCoord::new(2, 1).center(), &config);
        world.units.get_mut(&unit).unwrap().engagement = EngagementPolicy::Ignore;
        let mut rng = GameRng::new(3);
        resolve_unit_attacks(&mut world, &mut rng, &config, 0);
        assert_eq!(world.stats.shots_fired, 0);
    }

    #[test]
    fn mine_blast_hits_everyone_in_the_cell() {
        let (mut world, config, _) = open_room(Archetype::Assault);
        let cell = CellCoord::new(5, 1);
        let a = world.spawn_enemy(EnemyKind::XenoMite, cell.center(), &config).unwrap();
        let b = world.spawn_enemy(EnemyKind::XenoMite, Vec2::new(5.2, 1.7), &config).unwrap();
        let id = world.ids.mine();
        world.mines.insert(id, Mine { id, cell });
        trigger_mines(&mut world, &config);
        assert!(world.mines.is_empty());
        assert!(!world.enemies[&a].is_alive());
        assert!(!world.enemies[&b].is_alive());
        assert_eq!(world.stats.aliens_killed, 2);
    }

    #[test]
    fn sentry_shoots_enemies_in_range() {
        let (mut world, mut config, _) = open_room(Archetype::Assault);
        config.items.sentry_accuracy = 100.0;
        config.items.sentry_damage = 100.0;
        let enemy = world
            .spawn_enemy(EnemyKind::XenoMite, CellCoord::new(8, 1).center(), &config)
            .unwrap();
        let id = world.ids.turret();
        world.turrets.insert(
            id,
            Turret {
                id,
                pos: CellCoord::new(5, 1).center(),
                last_attack_ms: None,
            },
        );
        let mut rng = GameRng::new(11);
        resolve_turret_attacks(&mut world, &mut rng, &config, 0);
        assert!(!world.enemies[&enemy].is_alive());
    }

    #[test]
    fn enemy_melee_damages_units() {
        let (mut world, mut config, unit) = open_room(Archetype::Assault);
        config.enemies.get_mut(&EnemyKind::XenoMite).unwrap().accuracy = 100.0;
        let enemy = world
            .spawn_enemy(EnemyKind::XenoMite, CellCoord::new(1, 1).center(), &config)
            .unwrap();
        crate::enemy::decide_enemies(&mut world, &config, 0);
        assert_eq!(world.enemies[&enemy].state, EnemyState::Attacking);
        let mut rng = GameRng::new(5);
        resolve_enemy_attacks(&mut world, &mut rng, &config, 0);
        assert_eq!(world.units[&unit].hp, 100.0 - 15.0);
    }
}
