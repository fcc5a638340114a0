// Unit AI: a fixed-priority chain of pure behavior functions.
//
// Each behavior looks at one unit and a read-only `AiContext` and either
// claims the decision (`Some(CommandChange)`) or passes (`None`). The chain
// is evaluated in order and the first match wins:
//
//   1. extraction in progress   (an active Extract order is never preempted)
//   2. explicit order           (MoveTo, Overwatch, Pickup, UseItem, Escort;
//                                also holds any running channel)
//   3. escort following         (VIPs trail their escort)
//   4. objective opportunism    (discovered, reachable, unclaimed pickups)
//   5. combat engagement        (per AI profile and engagement policy)
//   6. exploration              (nearest undiscovered reachable cell; once
//                                nothing is left and objectives are ready,
//                                begin extraction)
//
// Layers 4–6 only run for agent-controlled units (`ai_enabled`) that are
// not on an explicit order. `decide_units` runs the chain for every active
// unit in id order and applies each change before the next unit decides,
// so claims made earlier in the tick are visible to later units.
//
// See also: `unit.rs` for `Order`, `combat.rs` for target selection,
// `channel.rs` for what happens when a channel started here completes.
//
// **Critical constraint: determinism.** Behaviors are pure functions of
// `(unit, context)`; every tie is broken by coordinate or id order.

use crate::archetype::{AiProfile, ItemKind};
use crate::channel::channel_duration;
use crate::combat::{has_target_in_reach, nearest_visible_enemy};
use crate::config::GameConfig;
use crate::director::apply_item_effect;
use crate::event::SimEventKind;
use crate::mission::{MissionType, ObjectiveKind};
use crate::pathfinding::{astar, distance_field, field_distance};
use crate::types::*;
use crate::unit::*;
use crate::world::World;

/// The single decision a behavior makes for a unit this tick.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandChange {
    /// Keep doing what the unit is already doing.
    Hold,
    /// Stop in place to fire.
    Halt,
    MoveTo(CellCoord),
    /// Claim a pickup and walk to it.
    Seek { target: InteractTarget, cell: CellCoord },
    Explore(CellCoord),
    Channel {
        action: ChannelAction,
        target: Option<InteractTarget>,
    },
    BeginExtract,
    /// The active order is done.
    CompleteOrder,
    /// The active order cannot be carried out.
    AbandonOrder,
    /// The unit is in position to use the item its order names.
    ExecuteItem,
}

/// Read-only view handed to every behavior.
pub struct AiContext<'a> {
    pub world: &'a World,
    pub config: &'a GameConfig,
    pub now_ms: u64,
    pub extraction: Option<CellCoord>,
    pub objectives_ready: bool,
}

impl AiContext<'_> {
    /// The cell a pickup target sits on, if it can still be picked up.
    pub fn interact_cell(&self, target: InteractTarget) -> Option<CellCoord> {
        match target {
            InteractTarget::Loot(id) => self.world.loot.get(&id).map(|l| l.cell()),
            InteractTarget::Objective(id) => self
                .world
                .objectives
                .get(&id)
                .filter(|o| o.is_collectable())
                .and_then(|o| o.target_cell),
        }
    }

    /// Whether another active unit is already after `target`.
    fn claimed_by_other(&self, target: InteractTarget, me: UnitId) -> bool {
        self.world.units.values().any(|u| {
            u.id != me
                && u.is_active()
                && (u.claim == Some(target)
                    || u.channeling.as_ref().is_some_and(|c| c.target == Some(target))
                    || u.active_command == Some(Order::Pickup { target }))
        })
    }
}

type Behavior = fn(&Unit, &AiContext) -> Option<CommandChange>;

const BEHAVIOR_CHAIN: [Behavior; 6] = [
    extraction_in_progress,
    explicit_order,
    escort_following,
    objective_opportunism,
    combat_engagement,
    exploration,
];

/// Evaluate the chain; first match wins.
pub fn decide(unit: &Unit, ctx: &AiContext) -> Option<CommandChange> {
    BEHAVIOR_CHAIN.iter().find_map(|behavior| behavior(unit, ctx))
}

fn interact_action(target: InteractTarget) -> ChannelAction {
    match target {
        InteractTarget::Loot(_) => ChannelAction::Pickup,
        InteractTarget::Objective(_) => ChannelAction::Collect,
    }
}

/// Keep walking if already headed for `cell`, otherwise plan a route there.
fn head_for(unit: &Unit, cell: CellCoord) -> CommandChange {
    if unit.target_cell == Some(cell) && !unit.path.is_empty() {
        CommandChange::Hold
    } else {
        CommandChange::MoveTo(cell)
    }
}

// ---------------------------------------------------------------------------
// Behaviors
// ---------------------------------------------------------------------------

fn extraction_in_progress(unit: &Unit, ctx: &AiContext) -> Option<CommandChange> {
    if !unit.is_extracting() {
        return None;
    }
    if unit.channeling.is_some() {
        return Some(CommandChange::Hold);
    }
    let Some(zone) = ctx.extraction else {
        return Some(CommandChange::AbandonOrder);
    };
    if unit.cell() == zone {
        Some(CommandChange::Channel {
            action: ChannelAction::Extract,
            target: None,
        })
    } else {
        Some(head_for(unit, zone))
    }
}

fn explicit_order(unit: &Unit, ctx: &AiContext) -> Option<CommandChange> {
    if unit.channeling.is_some() {
        return Some(CommandChange::Hold);
    }
    match unit.active_command.as_ref()? {
        Order::Explore | Order::ResumeAi | Order::Extract => None,
        Order::MoveTo { target } => Some(if unit.cell() == *target && unit.path.is_empty() {
            CommandChange::CompleteOrder
        } else {
            head_for(unit, *target)
        }),
        Order::Overwatch { target } => Some(if unit.cell() == *target && unit.path.is_empty() {
            CommandChange::Hold
        } else {
            head_for(unit, *target)
        }),
        Order::Pickup { target } => Some(match ctx.interact_cell(*target) {
            None => CommandChange::AbandonOrder,
            Some(cell) if unit.cell() == cell => CommandChange::Channel {
                action: interact_action(*target),
                target: Some(*target),
            },
            Some(cell) => head_for(unit, cell),
        }),
        Order::UseItem {
            item,
            target,
            target_unit,
        } => {
            if !item.requires_proximity() || *item == ItemKind::Medkit {
                return Some(CommandChange::ExecuteItem);
            }
            let place = target
                .or_else(|| {
                    target_unit
                        .and_then(|id| ctx.world.units.get(&id))
                        .map(|u| u.cell())
                })
                .unwrap_or_else(|| unit.cell());
            Some(
                if unit.pos.distance(place.center()) <= ctx.config.units.item_reach {
                    CommandChange::ExecuteItem
                } else {
                    head_for(unit, place)
                },
            )
        }
        Order::Escort { target_unit } => {
            let Some(ward) = ctx.world.units.get(target_unit).filter(|u| u.is_active()) else {
                return Some(CommandChange::CompleteOrder);
            };
            Some(
                if unit.pos.distance(ward.pos) > ctx.config.units.escort_follow_distance {
                    head_for(unit, ward.cell())
                } else {
                    CommandChange::Hold
                },
            )
        }
    }
}

/// VIPs have no autonomy of their own; they trail the soldier escorting
/// them (or the nearest soldier) and extract when that soldier does.
fn escort_following(unit: &Unit, ctx: &AiContext) -> Option<CommandChange> {
    if !unit.is_vip() || unit.active_command.is_some() {
        return None;
    }
    let soldiers = || {
        ctx.world
            .units
            .values()
            .filter(|u| u.is_active() && !u.is_vip())
    };
    let by_distance = |a: &&Unit, b: &&Unit| {
        unit.pos
            .distance(a.pos)
            .total_cmp(&unit.pos.distance(b.pos))
            .then(a.id.cmp(&b.id))
    };
    let escort = soldiers()
        .filter(|u| {
            u.active_command
                == Some(Order::Escort {
                    target_unit: unit.id,
                })
        })
        .min_by(by_distance)
        .or_else(|| soldiers().min_by(by_distance))?;

    if escort.is_extracting() && ctx.extraction.is_some() {
        return Some(CommandChange::BeginExtract);
    }
    Some(
        if unit.pos.distance(escort.pos) > ctx.config.units.escort_follow_distance {
            head_for(unit, escort.cell())
        } else {
            CommandChange::Hold
        },
    )
}

fn objective_opportunism(unit: &Unit, ctx: &AiContext) -> Option<CommandChange> {
    if !unit.is_autonomous() || unit.is_vip() {
        return None;
    }
    if let Some(claim) = unit.claim {
        if let Some(cell) = ctx.interact_cell(claim) {
            return Some(if unit.cell() == cell {
                CommandChange::Channel {
                    action: interact_action(claim),
                    target: Some(claim),
                }
            } else {
                head_for(unit, cell)
            });
        }
    }

    let world = ctx.world;
    let objectives = world
        .objectives
        .values()
        .filter(|o| o.is_collectable() && o.visible)
        .filter(|o| {
            o.kind != ObjectiveKind::Artifact || unit.carried_objective.is_none()
        })
        .filter_map(|o| Some((InteractTarget::Objective(o.id), o.target_cell?)));
    let loot = world
        .loot
        .values()
        .filter(|l| world.discovered.contains(&l.cell()))
        .map(|l| (InteractTarget::Loot(l.id), l.cell()));
    let candidates: Vec<(InteractTarget, CellCoord)> = objectives
        .chain(loot)
        .filter(|(target, _)| !ctx.claimed_by_other(*target, unit.id))
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let field = distance_field(&world.grid, unit.cell());
    let (target, cell) = candidates
        .into_iter()
        .filter_map(|(t, c)| field_distance(&world.grid, &field, c).map(|d| (d, t, c)))
        .min_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(_, t, c)| (t, c))?;
    Some(if unit.cell() == cell {
        CommandChange::Channel {
            action: interact_action(target),
            target: Some(target),
        }
    } else {
        CommandChange::Seek { target, cell }
    })
}

fn combat_engagement(unit: &Unit, ctx: &AiContext) -> Option<CommandChange> {
    if !unit.is_autonomous() || unit.engagement == EngagementPolicy::Ignore {
        return None;
    }
    if unit.stats.damage <= 0.0 {
        return None;
    }
    let (enemy, dist) = nearest_visible_enemy(ctx.world, unit.pos, ctx.config.units.sight_radius)?;
    let enemy_pos = ctx.world.enemies.get(&enemy)?.pos;
    match unit.ai_profile {
        AiProfile::StandGround => {
            has_target_in_reach(unit, ctx.world, ctx.config).then_some(CommandChange::Halt)
        }
        AiProfile::Rush => Some(if dist > 1.0 {
            head_for(unit, enemy_pos.cell())
        } else {
            CommandChange::Halt
        }),
        AiProfile::Retreat => {
            if dist < ctx.config.units.retreat_distance {
                let here = unit.cell();
                let away = ctx
                    .world
                    .grid
                    .open_neighbors(here)
                    .into_iter()
                    .map(|c| (c.center().distance(enemy_pos), c))
                    .filter(|(d, _)| *d > dist)
                    .max_by(|a, b| a.0.total_cmp(&b.0).then(b.1.cmp(&a.1)));
                if let Some((_, cell)) = away {
                    return Some(head_for(unit, cell));
                }
            }
            has_target_in_reach(unit, ctx.world, ctx.config).then_some(CommandChange::Halt)
        }
    }
}

fn exploration(unit: &Unit, ctx: &AiContext) -> Option<CommandChange> {
    if !unit.is_autonomous() || unit.is_vip() {
        return None;
    }
    let world = ctx.world;
    let current = unit
        .explore_target
        .filter(|t| !world.discovered.contains(t) && unit.target_cell == Some(*t))
        .filter(|_| !unit.path.is_empty());
    let retarget_due = ctx.now_ms.saturating_sub(unit.explore_decided_ms)
        >= ctx.config.units.exploration_retarget_ms;
    if current.is_some() && !retarget_due {
        return Some(CommandChange::Hold);
    }

    let field = distance_field(&world.grid, unit.cell());
    let radius = ctx.config.units.exploration_claim_radius;
    let others: Vec<CellCoord> = world
        .units
        .values()
        .filter(|u| u.id != unit.id && u.is_active())
        .filter_map(|u| u.explore_target)
        .collect();
    let mut best: Option<(u32, CellCoord)> = None;
    let mut best_claimed: Option<(u32, CellCoord)> = None;
    for cell in world.grid.floor_cells() {
        if world.discovered.contains(&cell) {
            continue;
        }
        let Some(d) = field_distance(&world.grid, &field, cell) else {
            continue;
        };
        let claimed = others.iter().any(|o| o.manhattan_distance(cell) <= radius);
        let slot = if claimed { &mut best_claimed } else { &mut best };
        if slot.is_none_or(|(bd, _)| d < bd) {
            *slot = Some((d, cell));
        }
    }

    match (best.or(best_claimed), current) {
        (Some((d, cell)), Some(cur)) => {
            let cur_d = field_distance(&world.grid, &field, cur).unwrap_or(u32::MAX);
            // Only switch when the new frontier is clearly closer.
            if (d as f32) < 0.7 * cur_d as f32 {
                Some(CommandChange::Explore(cell))
            } else {
                Some(CommandChange::Hold)
            }
        }
        (Some((_, cell)), None) => Some(CommandChange::Explore(cell)),
        (None, _) => {
            let zone = ctx.extraction?;
            let reachable = field_distance(&world.grid, &field, zone).is_some();
            (ctx.objectives_ready && world.discovered.contains(&zone) && reachable)
                .then_some(CommandChange::BeginExtract)
        }
    }
}

// ---------------------------------------------------------------------------
// Applying decisions
// ---------------------------------------------------------------------------

/// Plan a route for a unit. On failure the unit falls back to Idle and any
/// explicit order it was carrying is dropped.
fn set_destination(world: &mut World, id: UnitId, cell: CellCoord) -> bool {
    let Some(unit) = world.units.get(&id) else {
        return false;
    };
    if unit.target_cell == Some(cell) && !unit.path.is_empty() {
        return true;
    }
    let route = astar(&world.grid, unit.cell(), cell);
    let Some(unit) = world.units.get_mut(&id) else {
        return false;
    };
    match route {
        Some(route) => {
            unit.path = route.cells.into_iter().skip(1).collect();
            if unit.path.is_empty() {
                unit.target_cell = None;
                unit.state = UnitState::Idle;
            } else {
                unit.target_cell = Some(cell);
                unit.state = UnitState::Moving;
            }
            true
        }
        None => {
            tracing::debug!(unit = %id, target = %cell, "no path, falling back to idle");
            unit.clear_path();
            unit.claim = None;
            unit.explore_target = None;
            if !matches!(unit.active_command, None | Some(Order::Explore)) {
                unit.active_command = None;
            }
            unit.state = UnitState::Idle;
            false
        }
    }
}

fn start_channel(
    world: &mut World,
    id: UnitId,
    action: ChannelAction,
    target: Option<InteractTarget>,
    config: &GameConfig,
) {
    let Some(unit) = world.units.get_mut(&id) else {
        return;
    };
    let duration = channel_duration(unit, action, config);
    unit.clear_path();
    unit.channeling = Some(Channeling {
        action,
        remaining_ms: duration,
        total_ms: duration,
        target,
    });
    unit.state = UnitState::Channeling;
}

/// Use the item named by the unit's `UseItem` order: channelled items start
/// a channel, the rest take effect immediately.
fn execute_item(world: &mut World, id: UnitId, config: &GameConfig) {
    let Some(unit) = world.units.get(&id) else {
        return;
    };
    let Some(Order::UseItem {
        item,
        target,
        target_unit,
    }) = unit.active_command.clone()
    else {
        return;
    };
    let channelled = channel_duration(unit, ChannelAction::UseItem, config) > 0;
    if world.inventory_count(item) == 0 {
        tracing::debug!(unit = %id, item = ?item, "item exhausted before use");
        finish_order(world, id);
        return;
    }
    if channelled {
        start_channel(world, id, ChannelAction::UseItem, None, config);
        return;
    }
    world.consume_item(item);
    apply_item_effect(world, item, target, target_unit, Some(id), config);
    world.emit(SimEventKind::ItemUsed { item, by: Some(id) });
    finish_order(world, id);
}

fn finish_order(world: &mut World, id: UnitId) {
    if let Some(unit) = world.units.get_mut(&id) {
        unit.active_command = None;
        unit.clear_path();
        if unit.state != UnitState::Channeling {
            unit.state = UnitState::Idle;
        }
    }
}

pub fn apply_change(
    world: &mut World,
    id: UnitId,
    change: CommandChange,
    config: &GameConfig,
    now_ms: u64,
) {
    match change {
        CommandChange::Hold => {}
        CommandChange::Halt => {
            if let Some(unit) = world.units.get_mut(&id) {
                unit.clear_path();
                unit.holding_fire_position = true;
                unit.state = UnitState::Attacking;
            }
        }
        CommandChange::MoveTo(cell) => {
            set_destination(world, id, cell);
        }
        CommandChange::Seek { target, cell } => {
            if let Some(unit) = world.units.get_mut(&id) {
                unit.claim = Some(target);
            }
            set_destination(world, id, cell);
        }
        CommandChange::Explore(cell) => {
            if let Some(unit) = world.units.get_mut(&id) {
                unit.explore_target = Some(cell);
                unit.explore_decided_ms = now_ms;
            }
            set_destination(world, id, cell);
        }
        CommandChange::Channel { action, target } => {
            start_channel(world, id, action, target, config);
        }
        CommandChange::BeginExtract => {
            if let Some(unit) = world.units.get_mut(&id) {
                unit.active_command = Some(Order::Extract);
                unit.command_queue.clear();
                unit.clear_path();
                unit.explore_target = None;
                unit.claim = None;
            }
        }
        CommandChange::CompleteOrder => finish_order(world, id),
        CommandChange::AbandonOrder => {
            tracing::debug!(unit = %id, "order abandoned");
            finish_order(world, id);
        }
        CommandChange::ExecuteItem => execute_item(world, id, config),
    }
}

/// Per-tick bookkeeping before a unit decides: pop its next queued order
/// if it is free, drop stale claims, reset per-tick flags, refresh stats.
fn prepare_unit(world: &mut World, id: UnitId, config: &GameConfig) {
    let claim_alive = |world: &World, target: InteractTarget| match target {
        InteractTarget::Loot(l) => world.loot.contains_key(&l),
        InteractTarget::Objective(o) => world
            .objectives
            .get(&o)
            .is_some_and(|o| o.is_collectable()),
    };
    let stale_claim = world
        .units
        .get(&id)
        .and_then(|u| u.claim)
        .is_some_and(|c| !claim_alive(world, c));

    let Some(unit) = world.units.get_mut(&id) else {
        return;
    };
    unit.moved_this_tick = false;
    unit.holding_fire_position = false;
    if stale_claim {
        unit.claim = None;
    }
    let free = unit.channeling.is_none()
        && matches!(unit.active_command, None | Some(Order::Explore));
    if free && !unit.command_queue.is_empty() {
        let order = unit.command_queue.remove(0);
        unit.clear_path();
        if order == Order::ResumeAi {
            unit.ai_enabled = true;
        } else {
            unit.active_command = Some(order);
        }
    }
    unit.refresh_stats(config);
}

/// Run the behavior chain for every active unit, in id order.
pub fn decide_units(
    world: &mut World,
    config: &GameConfig,
    now_ms: u64,
    extraction: Option<CellCoord>,
    mission: MissionType,
) {
    let objectives_ready = crate::mission::objectives_ready(world, mission);
    for id in world.active_unit_ids() {
        prepare_unit(world, id, config);
        let change = {
            let Some(unit) = world.units.get(&id) else {
                continue;
            };
            let ctx = AiContext {
                world,
                config,
                now_ms,
                extraction,
                objectives_ready,
            };
            decide(unit, &ctx)
        };
        if let Some(change) = change {
            apply_change(world, id, change, config, now_ms);
        }
    }
}
