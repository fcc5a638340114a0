// Mission setup, objectives, and win/loss.
//
// A mission is a map plus a `MissionType` and a campaign `NodeType`. Setup
// turns the map's objective definitions into `Objective`s, places the hive
// (DestroyHive), the VIP (EscortVip) and the node's elite/boss guard, and
// drops bonus loot. After every tick `update_objectives` refreshes
// visibility and completion, and `evaluate_status` decides the outcome.
//
// Outcome rules:
// - any VIP dead ⇒ Lost, immediately;
// - otherwise nothing is decided while an active unit remains on the map;
// - once none remain: Won iff at least one unit extracted and every
//   required objective is Completed.
// For DestroyHive only the Kill objective is required.
//
// See also: `world.rs` for the entity store, `ai.rs` which consults
// `objectives_ready` before starting autonomous extraction.

use crate::archetype::{EnemyKind, ItemKind};
use crate::config::GameConfig;
use crate::event::SimEventKind;
use crate::map::MapDefinition;
use crate::pathfinding::{distance_field, field_distance};
use crate::types::*;
use crate::unit::UnitState;
use crate::world::{LootContent, World};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissionType {
    Default,
    ExtractArtifacts,
    RecoverIntel,
    DestroyHive,
    EscortVip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Combat,
    Elite,
    Boss,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveKind {
    /// Completed by a Collect channel at the target cell.
    Recover,
    /// Collected, carried, and completed when the carrier extracts.
    Artifact,
    /// Completed when the target enemy dies.
    Kill,
    /// Completed when every VIP extracts.
    Escort,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveState {
    Pending,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub id: ObjectiveId,
    pub kind: ObjectiveKind,
    pub target_cell: Option<CellCoord>,
    pub target_enemy: Option<EnemyId>,
    pub state: ObjectiveState,
    /// Follows discovery of the target.
    pub visible: bool,
    /// Unit carrying an artifact objective.
    pub carrier: Option<UnitId>,
}

impl Objective {
    fn new(id: ObjectiveId, kind: ObjectiveKind) -> Self {
        Self {
            id,
            kind,
            target_cell: None,
            target_enemy: None,
            state: ObjectiveState::Pending,
            visible: false,
            carrier: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == ObjectiveState::Pending
    }

    /// Recover and uncarried artifacts are picked up by channeling at their
    /// cell.
    pub fn is_collectable(&self) -> bool {
        self.is_pending()
            && self.carrier.is_none()
            && matches!(self.kind, ObjectiveKind::Recover | ObjectiveKind::Artifact)
            && self.target_cell.is_some()
    }
}

/// Populate objectives and mission-specific enemies. Units are already
/// placed; `farthest` (the floor cell farthest from the squad by walking
/// distance) hosts the hive and node guards.
pub fn setup_mission(
    world: &mut World,
    map: &MapDefinition,
    mission: MissionType,
    node: NodeType,
    config: &GameConfig,
) {
    let squad_origin = map
        .squad_spawns
        .first()
        .copied()
        .or_else(|| world.units.values().next().map(|u| u.cell()));
    let farthest = squad_origin.and_then(|origin| {
        let field = distance_field(&world.grid, origin);
        world
            .grid
            .floor_cells()
            .filter_map(|c| field_distance(&world.grid, &field, c).map(|d| (d, c)))
            .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
            .map(|(_, c)| c)
    });

    for def in &map.objectives {
        let kind = match (mission, def.kind) {
            (MissionType::ExtractArtifacts, ObjectiveKind::Recover) => ObjectiveKind::Artifact,
            (_, kind) => kind,
        };
        if matches!(kind, ObjectiveKind::Kill | ObjectiveKind::Escort) {
            // Kill and escort objectives are created by the mission type.
            continue;
        }
        let id = world.ids.objective();
        let mut objective = Objective::new(id, kind);
        objective.target_cell = def.target_cell;
        world.objectives.insert(id, objective);
    }

    match mission {
        MissionType::DestroyHive => {
            if let Some(cell) = farthest {
                if let Some(hive) = world.spawn_enemy(EnemyKind::Hive, cell.center(), config) {
                    let id = world.ids.objective();
                    let mut objective = Objective::new(id, ObjectiveKind::Kill);
                    objective.target_cell = Some(cell);
                    objective.target_enemy = Some(hive);
                    world.objectives.insert(id, objective);
                }
            }
        }
        MissionType::EscortVip => {
            let id = world.ids.objective();
            let mut objective = Objective::new(id, ObjectiveKind::Escort);
            objective.visible = true;
            world.objectives.insert(id, objective);
        }
        MissionType::Default | MissionType::ExtractArtifacts | MissionType::RecoverIntel => {}
    }

    let guard = match node {
        NodeType::Combat => None,
        NodeType::Elite => Some(EnemyKind::WarriorDrone),
        NodeType::Boss => Some(EnemyKind::PraetorianGuard),
    };
    if let (Some(kind), Some(cell)) = (guard, farthest) {
        world.spawn_enemy(kind, cell.center(), config);
    }

    for loot in &map.bonus_loot {
        if world.grid.is_walkable(loot.cell) {
            world.add_loot(loot.cell.center(), LootContent::Item(loot.item));
        }
    }
}

/// Refresh objective visibility and completion after a tick.
pub fn update_objectives(world: &mut World, config: &GameConfig) {
    let vips: Vec<UnitState> = world
        .units
        .values()
        .filter(|u| u.is_vip())
        .map(|u| u.state)
        .collect();
    let mut completed = Vec::new();
    let mut failed = Vec::new();

    for objective in world.objectives.values_mut() {
        if let Some(cell) = objective.target_cell {
            objective.visible |= world.discovered.contains(&cell);
        }
        if !objective.is_pending() {
            continue;
        }
        match objective.kind {
            ObjectiveKind::Kill => {
                let alive = objective
                    .target_enemy
                    .and_then(|e| world.enemies.get(&e))
                    .is_some_and(|e| e.is_alive());
                if !alive {
                    objective.state = ObjectiveState::Completed;
                    completed.push(objective.id);
                }
            }
            ObjectiveKind::Escort => {
                if vips.contains(&UnitState::Dead) {
                    objective.state = ObjectiveState::Failed;
                    failed.push(objective.id);
                } else if !vips.is_empty() && vips.iter().all(|s| *s == UnitState::Extracted) {
                    objective.state = ObjectiveState::Completed;
                    completed.push(objective.id);
                }
            }
            ObjectiveKind::Recover | ObjectiveKind::Artifact => {}
        }
    }

    for id in completed {
        award_objective(world, id, config);
    }
    for id in failed {
        world.emit(SimEventKind::ObjectiveFailed { objective: id });
    }
}

/// Mark an objective completed (if it is not already) and pay out scrap.
pub fn complete_objective(world: &mut World, id: ObjectiveId, config: &GameConfig) {
    let Some(objective) = world.objectives.get_mut(&id) else {
        return;
    };
    if objective.state == ObjectiveState::Completed {
        return;
    }
    objective.state = ObjectiveState::Completed;
    objective.carrier = None;
    award_objective(world, id, config);
}

fn award_objective(world: &mut World, id: ObjectiveId, config: &GameConfig) {
    world.stats.scrap_gained += config.mission.objective_scrap_reward;
    world.emit(SimEventKind::ObjectiveCompleted { objective: id });
}

fn is_required(objective: &Objective, mission: MissionType) -> bool {
    match mission {
        MissionType::DestroyHive => objective.kind == ObjectiveKind::Kill,
        _ => objective.kind != ObjectiveKind::Escort,
    }
}

/// Whether the squad has done everything it needs before extracting:
/// required objectives completed, or (for artifacts) in a living carrier's
/// hands.
pub fn objectives_ready(world: &World, mission: MissionType) -> bool {
    world
        .objectives
        .values()
        .filter(|o| is_required(o, mission))
        .all(|o| match o.state {
            ObjectiveState::Completed => true,
            ObjectiveState::Failed => false,
            ObjectiveState::Pending => {
                o.kind == ObjectiveKind::Artifact
                    && o.carrier
                        .and_then(|u| world.units.get(&u))
                        .is_some_and(|u| u.is_active())
            }
        })
}

/// Decide Won/Lost, or `None` while the mission is still undecided.
pub fn evaluate_status(world: &World, mission: MissionType) -> Option<MissionStatus> {
    if world
        .units
        .values()
        .any(|u| u.is_vip() && u.state == UnitState::Dead)
    {
        return Some(MissionStatus::Lost);
    }
    if world.units.values().any(|u| u.is_active()) {
        return None;
    }
    let extracted = world
        .units
        .values()
        .any(|u| u.state == UnitState::Extracted);
    let objectives_done = world
        .objectives
        .values()
        .filter(|o| is_required(o, mission) || o.kind == ObjectiveKind::Escort)
        .all(|o| o.state == ObjectiveState::Completed);
    if extracted && objectives_done {
        Some(MissionStatus::Won)
    } else {
        Some(MissionStatus::Lost)
    }
}

/// Scrap crates convert straight to scrap on pickup.
pub fn scrap_value(item: ItemKind, config: &GameConfig) -> Option<u32> {
    (item == ItemKind::ScrapCrate).then_some(config.mission.scrap_crate_value)
}
