// Data-driven game configuration.
//
// All tunable simulation parameters live here in `GameConfig`, loadable from
// JSON. The sim never uses magic numbers; it reads from the config. Balance
// numbers can be iterated without recompiling, and a replay is only valid
// against the config it was recorded with.
//
// Parameters are grouped into nested sub-structs per subsystem:
// `DirectorConfig`, `DoorConfig`, `UnitConfig`, `CombatConfig`,
// `ItemConfig`, `MissionConfig`. The data tables (archetypes, weapons,
// equipment, enemies) are `BTreeMap`s keyed by the enums in `archetype.rs`.
//
// See also: `archetype.rs` for the table row types, `sim.rs` which owns the
// `GameConfig` as part of `SimState`.
//
// **Critical constraint: determinism.** Config values feed directly into
// simulation logic. Replaying a log with a different config is not expected
// to reproduce the recorded mission.

use crate::archetype::*;
use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Subsystem parameter groups
// ---------------------------------------------------------------------------

/// One step of the Director's tier ladder: at `min_threat` and above,
/// enemies costing up to `max_difficulty` points become eligible.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TierGate {
    pub min_threat: u32,
    pub max_difficulty: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectorConfig {
    /// Simulated milliseconds per threat turn.
    pub turn_duration_ms: u64,
    /// Threat gained per completed turn.
    pub threat_per_turn: u32,
    pub max_threat: u32,
    /// Hard ceiling on difficulty points spent in one wave.
    pub wave_cap: u32,
    /// Multiplier on `threat / threat_per_turn` when computing the budget.
    pub scaling_factor: f32,
    /// Sorted by `min_threat` ascending.
    pub tiers: Vec<TierGate>,
    /// Enemies one spawn point can emit per wave.
    pub spawn_point_capacity: u32,
    /// Max offset (cells) from the spawn point centre.
    pub spawn_jitter: f32,
    /// Difficulty points spent on enemies placed before the mission starts,
    /// unless the mission setup names its own budget.
    #[serde(default)]
    pub starting_points: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DoorConfig {
    pub open_duration_ms: u64,
    pub close_duration_ms: u64,
    pub max_hp: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnitConfig {
    pub sight_radius: f32,
    /// Reference speed (cells/s) at which channel durations are nominal.
    /// Faster units channel proportionally quicker.
    pub speed_normalization: f32,
    pub pickup_ms: u64,
    pub collect_ms: u64,
    pub extract_ms: u64,
    pub medkit_ms: u64,
    pub mine_ms: u64,
    pub hp_per_level: f32,
    pub aim_per_level: f32,
    pub exploration_retarget_ms: u64,
    /// Cells within which two exploring units avoid the same frontier.
    pub exploration_claim_radius: u32,
    pub escort_follow_distance: f32,
    /// Reach for proximity items and loot pickup.
    pub item_reach: f32,
    /// `Retreat` units back off from enemies closer than this.
    pub retreat_distance: f32,
    pub spawn_jitter: f32,
    pub artifact_speed_penalty: f32,
    pub artifact_accuracy_penalty: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CombatConfig {
    /// Slack added to melee range when deciding to swap to melee.
    pub melee_swap_margin: f32,
    /// Slack added to weapon range when deciding whether to fire.
    pub range_margin: f32,
    pub enemy_sight_radius: f32,
    pub enemy_repath_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemConfig {
    pub grenade_damage: f32,
    pub scanner_radius: f32,
    pub mine_damage: f32,
    pub medkit_heal: f32,
    pub stimpack_heal: f32,
    pub sentry_damage: f32,
    pub sentry_fire_rate_ms: u32,
    pub sentry_range: f32,
    pub sentry_accuracy: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MissionConfig {
    pub objective_scrap_reward: u32,
    pub scrap_crate_value: u32,
}

// ---------------------------------------------------------------------------
// Top-level game config
// ---------------------------------------------------------------------------

/// Every tunable the simulation reads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameConfig {
    /// Fixed internal step. Host deltas are accumulated and consumed in
    /// whole ticks, which is what makes replay step-size invariant.
    pub tick_ms: u64,
    /// Simulated milliseconds between automatic snapshots. Zero disables.
    pub snapshot_interval_ms: u64,
    pub director: DirectorConfig,
    pub doors: DoorConfig,
    pub units: UnitConfig,
    pub combat: CombatConfig,
    pub items: ItemConfig,
    pub mission: MissionConfig,
    pub archetypes: BTreeMap<Archetype, ArchetypeData>,
    pub weapons: BTreeMap<WeaponKind, WeaponData>,
    pub equipment: BTreeMap<Equipment, EquipmentData>,
    pub enemies: BTreeMap<EnemyKind, EnemyData>,
}

impl GameConfig {
    /// Parse a config from JSON and check its cross-references.
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs the sim cannot run: a zero tick, archetypes naming
    /// weapons that are not in the weapon table, unsorted tier ladders.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.tick_ms == 0 {
            return Err(SimError::InvalidConfig {
                reason: "tick_ms must be positive".into(),
            });
        }
        if self.director.turn_duration_ms == 0 {
            return Err(SimError::InvalidConfig {
                reason: "director.turn_duration_ms must be positive".into(),
            });
        }
        for (archetype, data) in &self.archetypes {
            for weapon in data.melee_weapon.iter().chain(data.ranged_weapon.iter()) {
                if !self.weapons.contains_key(weapon) {
                    return Err(SimError::InvalidConfig {
                        reason: format!("{archetype:?} references unknown weapon {weapon:?}"),
                    });
                }
            }
        }
        if !self
            .director
            .tiers
            .windows(2)
            .all(|w| w[0].min_threat <= w[1].min_threat)
        {
            return Err(SimError::InvalidConfig {
                reason: "director.tiers must be sorted by min_threat".into(),
            });
        }
        Ok(())
    }

    pub fn weapon(&self, kind: WeaponKind) -> Option<&WeaponData> {
        self.weapons.get(&kind)
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        let mut archetypes = BTreeMap::new();
        let soldier = |hp, speed, aim, ai_profile, melee_weapon, ranged_weapon| ArchetypeData {
            hp,
            speed,
            aim,
            ai_profile,
            melee_weapon,
            ranged_weapon,
        };
        use AiProfile::*;
        use WeaponKind::*;
        archetypes.insert(
            Archetype::Assault,
            soldier(100.0, 2.0, 75.0, Rush, Some(CombatKnife), Some(PulseRifle)),
        );
        archetypes.insert(Archetype::Medic, soldier(80.0, 2.5, 70.0, Retreat, None, Some(Pistol)));
        archetypes.insert(Archetype::Scout, soldier(80.0, 3.0, 80.0, Retreat, None, Some(Pistol)));
        archetypes.insert(
            Archetype::Heavy,
            soldier(120.0, 1.5, 60.0, StandGround, Some(ThunderHammer), Some(Shotgun)),
        );
        archetypes.insert(
            Archetype::Sniper,
            soldier(80.0, 2.0, 90.0, StandGround, None, Some(SniperRifle)),
        );
        archetypes.insert(
            Archetype::Demolitionist,
            soldier(100.0, 2.0, 65.0, Rush, None, Some(Flamer)),
        );
        archetypes.insert(Archetype::Vip, soldier(60.0, 2.2, 0.0, Retreat, None, None));

        let mut weapons = BTreeMap::new();
        let weapon = |class, damage, fire_rate_ms, accuracy, range| WeaponData {
            class,
            damage,
            fire_rate_ms,
            accuracy,
            range,
        };
        use WeaponClass::*;
        weapons.insert(CombatKnife, weapon(Melee, 15.0, 400, 10.0, 1.0));
        weapons.insert(PowerSword, weapon(Melee, 35.0, 800, 15.0, 1.0));
        weapons.insert(ThunderHammer, weapon(Melee, 80.0, 1500, 5.0, 1.0));
        weapons.insert(Pistol, weapon(Ranged, 15.0, 500, 0.0, 6.0));
        weapons.insert(PulseRifle, weapon(Ranged, 20.0, 600, 5.0, 10.0));
        weapons.insert(Shotgun, weapon(Ranged, 40.0, 1000, -10.0, 4.0));
        weapons.insert(Flamer, weapon(Ranged, 25.0, 100, -5.0, 3.0));
        weapons.insert(SniperRifle, weapon(Ranged, 60.0, 1500, 20.0, 14.0));

        let mut equipment = BTreeMap::new();
        let gear = |hp_bonus, speed_bonus, accuracy_bonus| EquipmentData {
            hp_bonus,
            speed_bonus,
            accuracy_bonus,
        };
        equipment.insert(Equipment::CombatBoots, gear(0.0, 0.5, 0.0));
        equipment.insert(Equipment::MagLevBoots, gear(0.0, 1.0, 0.0));
        equipment.insert(Equipment::LightRecon, gear(50.0, 0.2, 0.0));
        equipment.insert(Equipment::HeavyPlate, gear(150.0, -0.5, -10.0));

        let mut enemies = BTreeMap::new();
        let enemy = |hp, damage, fire_rate_ms, accuracy, range, speed, difficulty, behavior, elite| {
            EnemyData {
                hp,
                damage,
                fire_rate_ms,
                accuracy,
                range,
                speed,
                difficulty,
                behavior,
                elite,
            }
        };
        use EnemyBehavior::*;
        enemies.insert(
            EnemyKind::XenoMite,
            enemy(50.0, 15.0, 400, 50.0, 1.0, 3.0, 1, MeleeSwarm, false),
        );
        enemies.insert(
            EnemyKind::WarriorDrone,
            enemy(150.0, 35.0, 800, 75.0, 1.0, 2.4, 3, MeleeSwarm, false),
        );
        enemies.insert(
            EnemyKind::SpitterAcid,
            enemy(120.0, 30.0, 1200, 90.0, 6.0, 2.8, 3, RangedKite, false),
        );
        enemies.insert(
            EnemyKind::PraetorianGuard,
            enemy(600.0, 80.0, 1500, 85.0, 1.0, 1.8, 5, MeleeSwarm, true),
        );
        enemies.insert(
            EnemyKind::Hive,
            enemy(1200.0, 0.0, 1000, 0.0, 0.0, 0.0, 0, Stationary, true),
        );

        Self {
            tick_ms: 16,
            snapshot_interval_ms: 5000,
            director: DirectorConfig {
                turn_duration_ms: 10_000,
                threat_per_turn: 10,
                max_threat: 100,
                wave_cap: 12,
                scaling_factor: 1.0,
                tiers: vec![
                    TierGate { min_threat: 0, max_difficulty: 1 },
                    TierGate { min_threat: 30, max_difficulty: 3 },
                    TierGate { min_threat: 60, max_difficulty: 5 },
                ],
                spawn_point_capacity: 3,
                spawn_jitter: 0.3,
                starting_points: 0,
            },
            doors: DoorConfig {
                open_duration_ms: 500,
                close_duration_ms: 500,
                max_hp: 100.0,
            },
            units: UnitConfig {
                sight_radius: 8.0,
                speed_normalization: 3.0,
                pickup_ms: 1000,
                collect_ms: 3000,
                extract_ms: 5000,
                medkit_ms: 2000,
                mine_ms: 3000,
                hp_per_level: 10.0,
                aim_per_level: 2.0,
                exploration_retarget_ms: 1000,
                exploration_claim_radius: 3,
                escort_follow_distance: 1.5,
                item_reach: 1.5,
                retreat_distance: 2.0,
                spawn_jitter: 0.2,
                artifact_speed_penalty: 1.0,
                artifact_accuracy_penalty: 15.0,
            },
            combat: CombatConfig {
                melee_swap_margin: 0.05,
                range_margin: 0.5,
                enemy_sight_radius: 10.0,
                enemy_repath_ms: 1000,
            },
            items: ItemConfig {
                grenade_damage: 100.0,
                scanner_radius: 5.0,
                mine_damage: 150.0,
                medkit_heal: 50.0,
                stimpack_heal: 25.0,
                sentry_damage: 20.0,
                sentry_fire_rate_ms: 600,
                sentry_range: 6.0,
                sentry_accuracy: 70.0,
            },
            mission: MissionConfig {
                objective_scrap_reward: 25,
                scrap_crate_value: 10,
            },
            archetypes,
            weapons,
            equipment,
            enemies,
        }
    }
}
