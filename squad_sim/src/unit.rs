// Squad units: the `Unit` entity, its orders, and derived-stat computation.
//
// A `Unit` is a soldier (or a VIP) owned by the sim. Its combat numbers are
// *derived*: archetype base stats, plus equipment modifiers, plus a per-level
// bonus, plus the active weapon's bonus, minus the artifact-carry penalty.
// `refresh_stats` recomputes them from scratch whenever one of those inputs
// changes (`stats_dirty`), so swapping weapons back and forth can never
// accumulate bonuses. When max HP moves, current HP is rescaled to the same
// fraction of the new maximum.
//
// Weapon swap: `update_active_weapon` picks the melee weapon when the nearest
// enemy is within melee range (plus a small margin) and the ranged weapon
// otherwise.
//
// Orders (`Order`) are what a unit is currently trying to do on behalf of a
// player command; autonomous behavior lives in `ai.rs` and runs when the
// unit has no order or an `Explore` order.
//
// See also: `archetype.rs` for the data tables, `ai.rs` for the behavior
// chain, `command_handler.rs` which creates orders.

use crate::archetype::*;
use crate::config::GameConfig;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitState {
    Idle,
    Moving,
    Attacking,
    WaitingForDoor,
    Channeling,
    Extracted,
    Dead,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngagementPolicy {
    Engage,
    Ignore,
}

/// What a pickup/collect interaction points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InteractTarget {
    Loot(LootId),
    Objective(ObjectiveId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelAction {
    Extract,
    Collect,
    Pickup,
    UseItem,
}

/// An in-progress timed interaction. Cancellable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channeling {
    pub action: ChannelAction,
    pub remaining_ms: u64,
    pub total_ms: u64,
    pub target: Option<InteractTarget>,
}

/// A unit's active order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Order {
    MoveTo { target: CellCoord },
    Overwatch { target: CellCoord },
    Explore,
    Extract,
    Pickup { target: InteractTarget },
    UseItem {
        item: ItemKind,
        target: Option<CellCoord>,
        target_unit: Option<UnitId>,
    },
    Escort { target_unit: UnitId },
    ResumeAi,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    pub damage: f32,
    pub fire_rate_ms: u32,
    pub accuracy: f32,
    pub speed: f32,
    pub range: f32,
}

/// One soldier slot in the squad loadout handed to the sim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoldierConfig {
    pub archetype: Archetype,
    #[serde(default)]
    pub equipment: Vec<Equipment>,
    #[serde(default)]
    pub level: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SquadConfig {
    pub soldiers: Vec<SoldierConfig>,
    #[serde(default)]
    pub inventory: BTreeMap<ItemKind, u32>,
}

/// A squad member.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub archetype: Archetype,
    pub pos: Vec2,
    pub hp: f32,
    pub max_hp: f32,
    pub stats: UnitStats,
    pub state: UnitState,
    pub ai_profile: AiProfile,
    /// Agent control: whether the autonomous chain may act for this unit.
    pub ai_enabled: bool,
    pub engagement: EngagementPolicy,
    pub active_command: Option<Order>,
    pub command_queue: Vec<Order>,
    /// Remaining cells to walk, next cell first.
    pub path: Vec<CellCoord>,
    /// Final cell of `path`.
    pub target_cell: Option<CellCoord>,
    pub channeling: Option<Channeling>,
    pub equipment: Vec<Equipment>,
    pub level: u32,
    pub active_weapon: WeaponClass,
    pub carried_objective: Option<ObjectiveId>,
    /// Objective or loot this unit has claimed through autonomous pursuit.
    pub claim: Option<InteractTarget>,
    pub explore_target: Option<CellCoord>,
    pub explore_decided_ms: u64,
    /// Sticky target set by the player or kept from the last shot.
    pub target_enemy: Option<EnemyId>,
    pub last_attack_ms: Option<u64>,
    pub stats_dirty: bool,
    /// Whether this unit covered ground during the current tick.
    pub moved_this_tick: bool,
    /// Set by the AI phase when a `StandGround` unit holds to fire.
    pub holding_fire_position: bool,
    pub kills: u32,
    pub damage_dealt: f32,
    pub distance_travelled: f32,
}

impl Unit {
    pub fn new(
        id: UnitId,
        soldier: &SoldierConfig,
        pos: Vec2,
        config: &GameConfig,
    ) -> Option<Self> {
        let data = config.archetypes.get(&soldier.archetype)?;
        let active_weapon = if data.ranged_weapon.is_some() {
            WeaponClass::Ranged
        } else {
            WeaponClass::Melee
        };
        let mut unit = Self {
            id,
            archetype: soldier.archetype,
            pos,
            hp: 0.0,
            max_hp: 0.0,
            stats: UnitStats::default(),
            state: UnitState::Idle,
            ai_profile: data.ai_profile,
            ai_enabled: soldier.archetype != Archetype::Vip,
            engagement: EngagementPolicy::Engage,
            active_command: None,
            command_queue: Vec::new(),
            path: Vec::new(),
            target_cell: None,
            channeling: None,
            equipment: soldier.equipment.clone(),
            level: soldier.level,
            active_weapon,
            carried_objective: None,
            claim: None,
            explore_target: None,
            explore_decided_ms: 0,
            target_enemy: None,
            last_attack_ms: None,
            stats_dirty: true,
            moved_this_tick: false,
            holding_fire_position: false,
            kills: 0,
            damage_dealt: 0.0,
            distance_travelled: 0.0,
        };
        unit.refresh_stats(config);
        unit.hp = unit.max_hp;
        Some(unit)
    }

    /// Alive and still on the map.
    pub fn is_active(&self) -> bool {
        !matches!(self.state, UnitState::Dead | UnitState::Extracted)
    }

    pub fn cell(&self) -> CellCoord {
        self.pos.cell()
    }

    pub fn is_vip(&self) -> bool {
        self.archetype == Archetype::Vip
    }

    pub fn is_extracting(&self) -> bool {
        self.active_command == Some(Order::Extract)
    }

    /// Whether the autonomous layers (opportunism, exploration) may steer.
    pub fn is_autonomous(&self) -> bool {
        self.ai_enabled && matches!(self.active_command, None | Some(Order::Explore))
    }

    pub fn clear_path(&mut self) {
        self.path.clear();
        self.target_cell = None;
    }

    pub fn cancel_channel(&mut self) {
        if self.channeling.take().is_some() && self.state == UnitState::Channeling {
            self.state = UnitState::Idle;
        }
    }

    /// Recompute derived stats from base data if any input changed.
    pub fn refresh_stats(&mut self, config: &GameConfig) {
        if !self.stats_dirty {
            return;
        }
        self.stats_dirty = false;
        let Some(data) = config.archetypes.get(&self.archetype) else {
            return;
        };

        let mut max_hp = data.hp + self.level as f32 * config.units.hp_per_level;
        let mut speed = data.speed;
        let mut accuracy = data.aim + self.level as f32 * config.units.aim_per_level;
        for gear in &self.equipment {
            if let Some(mods) = config.equipment.get(gear) {
                max_hp += mods.hp_bonus;
                speed += mods.speed_bonus;
                accuracy += mods.accuracy_bonus;
            }
        }
        if self.carried_objective.is_some() {
            speed -= config.units.artifact_speed_penalty;
            accuracy -= config.units.artifact_accuracy_penalty;
        }

        let weapon_kind = match self.active_weapon {
            WeaponClass::Melee => data.melee_weapon.or(data.ranged_weapon),
            WeaponClass::Ranged => data.ranged_weapon.or(data.melee_weapon),
        };
        let weapon = weapon_kind.and_then(|k| config.weapon(k));
        let (damage, fire_rate_ms, range) = match weapon {
            Some(w) => {
                accuracy += w.accuracy;
                (w.damage, w.fire_rate_ms, w.range)
            }
            None => (0.0, u32::MAX, 0.0),
        };

        // A loadout change keeps the unit's health fraction.
        if (max_hp - self.max_hp).abs() > f32::EPSILON && self.max_hp > 0.0 {
            self.hp = (self.hp * max_hp / self.max_hp).min(max_hp);
        }
        self.max_hp = max_hp;
        self.stats = UnitStats {
            damage,
            fire_rate_ms,
            accuracy,
            speed: speed.max(0.1),
            range,
        };
    }

    /// Swap to the melee weapon when an enemy is inside melee reach.
    /// Marks stats dirty on change; the caller refreshes.
    pub fn update_active_weapon(&mut self, nearest_enemy: Option<f32>, config: &GameConfig) {
        let Some(data) = config.archetypes.get(&self.archetype) else {
            return;
        };
        let melee_reach = data
            .melee_weapon
            .and_then(|k| config.weapon(k))
            .map(|w| w.range + config.combat.melee_swap_margin);
        let wanted = match (melee_reach, nearest_enemy) {
            (Some(reach), Some(dist)) if dist <= reach => WeaponClass::Melee,
            _ if data.ranged_weapon.is_some() => WeaponClass::Ranged,
            _ => WeaponClass::Melee,
        };
        if wanted != self.active_weapon {
            self.active_weapon = wanted;
            self.stats_dirty = true;
        }
    }

    /// Channel duration scaled by movement speed: faster units interact
    /// proportionally faster.
    pub fn scaled_duration(&self, base_ms: u64, config: &GameConfig) -> u64 {
        let factor = config.units.speed_normalization / self.stats.speed.max(0.1);
        ((base_ms as f32) * factor).round().max(1.0) as u64
    }

    pub fn heal(&mut self, amount: f32) {
        self.hp = (self.hp + amount).min(self.max_hp);
    }
}
