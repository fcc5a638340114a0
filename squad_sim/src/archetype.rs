// Archetype data: data-driven soldier, enemy, weapon, equipment and item
// definitions.
//
// All behavioral differences between soldier archetypes (assault, medic,
// heavy, ...) and between enemy kinds are expressed as data, keyed by enum in
// `GameConfig`. The sim uses a single `Unit` type and a single `Enemy` type
// and reads the per-kind numbers at runtime; there is no per-archetype code
// branching beyond the AI profile and the enemy behavior tag.
//
// Speeds are in cells per second. Fire rates are milliseconds between
// shots. Accuracy is a percentage where 100 means a guaranteed hit at
// maximum weapon range.
//
// See also: `config.rs` where the tables live, `unit.rs` for derived-stat
// computation, `enemy.rs` for enemy behavior.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Soldiers
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Archetype {
    Assault,
    Medic,
    Scout,
    Heavy,
    Sniper,
    Demolitionist,
    Vip,
}

/// How a unit balances movement against firing.
///
/// `StandGround` halts to fire and never moves in a tick in which it
/// acquires a target. `Rush` may move and fire in the same tick. `Retreat`
/// backs away from enemies that close inside its comfort distance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiProfile {
    StandGround,
    Rush,
    Retreat,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchetypeData {
    pub hp: f32,
    pub speed: f32,
    /// Base aim before weapon and equipment modifiers.
    pub aim: f32,
    pub ai_profile: AiProfile,
    pub melee_weapon: Option<WeaponKind>,
    pub ranged_weapon: Option<WeaponKind>,
}

// ---------------------------------------------------------------------------
// Weapons
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WeaponKind {
    CombatKnife,
    PowerSword,
    ThunderHammer,
    Pistol,
    PulseRifle,
    Shotgun,
    Flamer,
    SniperRifle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeaponClass {
    Melee,
    Ranged,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeaponData {
    pub class: WeaponClass,
    pub damage: f32,
    pub fire_rate_ms: u32,
    /// Added to the wielder's base aim.
    pub accuracy: f32,
    pub range: f32,
}

// ---------------------------------------------------------------------------
// Equipment
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Equipment {
    CombatBoots,
    MagLevBoots,
    LightRecon,
    HeavyPlate,
}

/// Flat modifiers applied on top of archetype base stats.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EquipmentData {
    pub hp_bonus: f32,
    pub speed_bonus: f32,
    pub accuracy_bonus: f32,
}

// ---------------------------------------------------------------------------
// Consumables and loot
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemKind {
    FragGrenade,
    Medkit,
    Stimpack,
    Mine,
    Scanner,
    Sentry,
    /// Loot-only: converts to scrap on pickup instead of entering inventory.
    ScrapCrate,
}

impl ItemKind {
    /// Items a commander may use with an empty unit list.
    pub fn supports_global_use(self) -> bool {
        matches!(self, ItemKind::FragGrenade | ItemKind::Medkit | ItemKind::Scanner)
    }

    /// Items that must be placed or applied within reach of the user, who
    /// walks into range first.
    pub fn requires_proximity(self) -> bool {
        matches!(self, ItemKind::Mine | ItemKind::Sentry | ItemKind::Medkit)
    }
}

// ---------------------------------------------------------------------------
// Enemies
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnemyKind {
    XenoMite,
    WarriorDrone,
    SpitterAcid,
    PraetorianGuard,
    Hive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnemyBehavior {
    /// Close to melee range and attack.
    MeleeSwarm,
    /// Approach until in weapon range, then hold and shoot.
    RangedKite,
    /// Never moves, never attacks (the hive).
    Stationary,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnemyData {
    pub hp: f32,
    pub damage: f32,
    pub fire_rate_ms: u32,
    pub accuracy: f32,
    pub range: f32,
    pub speed: f32,
    /// Director point cost. Zero means never picked for waves.
    pub difficulty: u32,
    pub behavior: EnemyBehavior,
    /// Kills of elite enemies are tallied separately in mission stats.
    pub elite: bool,
}
