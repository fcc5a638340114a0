// The mutable entity store of a running mission.
//
// `World` owns every entity collection (units, enemies, loot, mines,
// turrets, objectives, doors), the discovered/visible cell sets, the squad
// inventory and the mission statistics. `SimState` keeps the clock, the PRNG,
// the Director and the command log beside it, so systems can borrow the
// world mutably while also holding the RNG or the Director.
//
// All damage that can kill goes through `damage_enemy` / `damage_unit`, so
// kill counters, casualty counters and artifact drops happen in the same
// call as the death itself.
//
// The `Grid` is derived from the map plus door states and is not
// serialized; `SimState::rebuild_transient_state` restores it after load.
//
// See also: `sim.rs` for the tick phases that drive the world, `event.rs`
// for the pending event buffer drained each step.
//
// **Critical constraint: determinism.** Every collection is a `BTreeMap` or
// `BTreeSet` so iteration is in id / coordinate order.

use crate::archetype::{EnemyKind, ItemKind};
use crate::config::GameConfig;
use crate::door::Door;
use crate::enemy::{Enemy, EnemyState};
use crate::event::SimEventKind;
use crate::graph::Grid;
use crate::mission::Objective;
use crate::types::*;
use crate::unit::{Unit, UnitState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Minor entities
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LootContent {
    Item(ItemKind),
    /// A dropped mission artifact; picking it up makes the unit carry it.
    Artifact(ObjectiveId),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Loot {
    pub id: LootId,
    pub pos: Vec2,
    pub content: LootContent,
}

impl Loot {
    pub fn cell(&self) -> CellCoord {
        self.pos.cell()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mine {
    pub id: MineId,
    pub cell: CellCoord,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turret {
    pub id: TurretId,
    pub pos: Vec2,
    pub last_attack_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionStats {
    pub threat_level: u32,
    pub aliens_killed: u32,
    pub elites_killed: u32,
    pub scrap_gained: u32,
    pub casualties: u32,
    pub shots_fired: u32,
    pub damage_dealt: f32,
    pub waves_spawned: u32,
    /// Wall-clock milliseconds reported by the host. Informational only;
    /// nothing in the sim reads it.
    pub real_time_ms: u64,
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct World {
    pub units: BTreeMap<UnitId, Unit>,
    pub enemies: BTreeMap<EnemyId, Enemy>,
    pub loot: BTreeMap<LootId, Loot>,
    pub mines: BTreeMap<MineId, Mine>,
    pub turrets: BTreeMap<TurretId, Turret>,
    pub objectives: BTreeMap<ObjectiveId, Objective>,
    pub doors: BTreeMap<DoorId, Door>,
    pub discovered: BTreeSet<CellCoord>,
    pub visible: BTreeSet<CellCoord>,
    pub inventory: BTreeMap<ItemKind, u32>,
    pub stats: MissionStats,
    pub ids: IdCounters,
    /// Doors someone is waiting at; granted in the next door phase.
    pub door_requests: BTreeSet<DoorId>,
    #[serde(skip)]
    pub grid: Grid,
    #[serde(skip)]
    pending_events: Vec<SimEventKind>,
}

impl World {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            ..Self::default()
        }
    }

    pub fn emit(&mut self, kind: SimEventKind) {
        self.pending_events.push(kind);
    }

    pub fn take_events(&mut self) -> Vec<SimEventKind> {
        std::mem::take(&mut self.pending_events)
    }

    pub fn spawn_enemy(
        &mut self,
        kind: EnemyKind,
        pos: Vec2,
        config: &GameConfig,
    ) -> Option<EnemyId> {
        let data = config.enemies.get(&kind)?;
        let id = self.ids.enemy();
        self.enemies.insert(id, Enemy::new(id, kind, pos, data));
        Some(id)
    }

    pub fn add_loot(&mut self, pos: Vec2, content: LootContent) -> LootId {
        let id = self.ids.loot();
        self.loot.insert(id, Loot { id, pos, content });
        id
    }

    pub fn active_unit_ids(&self) -> Vec<UnitId> {
        self.units
            .values()
            .filter(|u| u.is_active())
            .map(|u| u.id)
            .collect()
    }

    pub fn alive_enemy_ids(&self) -> Vec<EnemyId> {
        self.enemies
            .values()
            .filter(|e| e.is_alive())
            .map(|e| e.id)
            .collect()
    }

    /// Cells currently occupied by an active unit or a live enemy.
    pub fn occupied_cells(&self) -> BTreeSet<CellCoord> {
        let units = self.units.values().filter(|u| u.is_active()).map(|u| u.cell());
        let enemies = self.enemies.values().filter(|e| e.is_alive()).map(|e| e.cell());
        units.chain(enemies).collect()
    }

    pub fn inventory_count(&self, item: ItemKind) -> u32 {
        self.inventory.get(&item).copied().unwrap_or(0)
    }

    /// Take one item from the squad inventory. Returns false when empty.
    pub fn consume_item(&mut self, item: ItemKind) -> bool {
        match self.inventory.get_mut(&item) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Apply damage to an enemy, crediting `by`. Returns true on the killing
    /// blow. Kill counters update here, in the same call as the death.
    pub fn damage_enemy(&mut self, id: EnemyId, amount: f32, by: Option<UnitId>) -> bool {
        let Some(enemy) = self.enemies.get_mut(&id) else {
            return false;
        };
        if !enemy.is_alive() {
            return false;
        }
        let dealt = amount.min(enemy.hp).max(0.0);
        enemy.hp -= amount;
        let killed = enemy.hp <= 0.0;
        let (kind, elite) = (enemy.kind, enemy.elite);
        if killed {
            enemy.hp = 0.0;
            enemy.state = EnemyState::Dead;
            enemy.path.clear();
        }

        self.stats.damage_dealt += dealt;
        if let Some(unit) = by.and_then(|u| self.units.get_mut(&u)) {
            unit.damage_dealt += dealt;
            if killed {
                unit.kills += 1;
            }
        }
        if killed {
            self.stats.aliens_killed += 1;
            if elite {
                self.stats.elites_killed += 1;
            }
            self.emit(SimEventKind::EnemyKilled {
                enemy: id,
                kind,
                by,
            });
        }
        killed
    }

    /// Apply damage to a unit. On death the unit drops whatever artifact it
    /// carried and the casualty counter ticks.
    pub fn damage_unit(&mut self, id: UnitId, amount: f32) -> bool {
        let Some(unit) = self.units.get_mut(&id) else {
            return false;
        };
        if !unit.is_active() {
            return false;
        }
        unit.hp -= amount;
        if unit.hp > 0.0 {
            return false;
        }
        unit.hp = 0.0;
        unit.state = UnitState::Dead;
        unit.channeling = None;
        unit.active_command = None;
        unit.command_queue.clear();
        unit.clear_path();
        unit.claim = None;
        let dropped = unit.carried_objective.take().map(|obj| (obj, unit.pos));
        self.stats.casualties += 1;
        if let Some((objective, pos)) = dropped {
            if let Some(o) = self.objectives.get_mut(&objective) {
                o.carrier = None;
            }
            self.add_loot(pos, LootContent::Artifact(objective));
        }
        self.emit(SimEventKind::UnitKilled { unit: id });
        true
    }

    /// Drop dead enemies once their death has been reported.
    pub fn prune_dead_enemies(&mut self) {
        self.enemies.retain(|_, e| e.is_alive());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::Archetype;
    use crate::map::MapDefinition;
    use crate::unit::SoldierConfig;

    fn world_with_unit() -> (World, GameConfig, UnitId) {
        let config = GameConfig::default();
        let mut world = World::new(Grid::new(&MapDefinition::rectangle(5, 5)));
        let id = world.ids.unit();
        let soldier = SoldierConfig {
            archetype: Archetype::Assault,
            equipment: Vec::new(),
            level: 0,
        };
        let unit = Unit::new(id, &soldier, Vec2::new(0.5, 0.5), &config).unwrap();
        world.units.insert(id, unit);
        (world, config, id)
    }

    #[test]
    fn kill_credit_lands_with_the_killing_blow() {
        let (mut world, config, unit) = world_with_unit();
        let enemy = world
            .spawn_enemy(EnemyKind::XenoMite, Vec2::new(2.5, 2.5), &config)
            .unwrap();
        assert!(!world.damage_enemy(enemy, 30.0, Some(unit)));
        assert_eq!(world.units[&unit].kills, 0);
        assert!(world.damage_enemy(enemy, 30.0, Some(unit)));
        assert_eq!(world.units[&unit].kills, 1);
        assert_eq!(world.stats.aliens_killed, 1);
        // Overkill does not count as dealt damage.
        assert_eq!(world.stats.damage_dealt, 50.0);
        // A dead enemy cannot be killed twice.
        assert!(!world.damage_enemy(enemy, 30.0, Some(unit)));
        assert_eq!(world.stats.aliens_killed, 1);
        let events = world.take_events();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn dying_carrier_drops_the_artifact() {
        let (mut world, _config, unit) = world_with_unit();
        world.units.get_mut(&unit).unwrap().carried_objective = Some(ObjectiveId(3));
        assert!(world.damage_unit(unit, 500.0));
        assert_eq!(world.units[&unit].state, UnitState::Dead);
        assert_eq!(world.stats.casualties, 1);
        let loot: Vec<_> = world.loot.values().collect();
        assert_eq!(loot.len(), 1);
        assert_eq!(loot[0].content, LootContent::Artifact(ObjectiveId(3)));
        assert_eq!(loot[0].cell(), CellCoord::new(0, 0));
    }

    #[test]
    fn consume_item_stops_at_zero() {
        let (mut world, _, _) = world_with_unit();
        world.inventory.insert(ItemKind::Medkit, 1);
        assert!(world.consume_item(ItemKind::Medkit));
        assert!(!world.consume_item(ItemKind::Medkit));
        assert!(!world.consume_item(ItemKind::FragGrenade));
        assert_eq!(world.inventory_count(ItemKind::Medkit), 0);
    }
}
