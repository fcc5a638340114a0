// Channel progress: timed, cancellable unit interactions.
//
// A channel (extract, collect, pickup, item use) counts down in simulated
// milliseconds. Durations scale with the unit's speed relative to
// `speed_normalization`. Each tick, before counting down, the channel's
// target is re-validated: if a competitor already consumed it the channel is
// cancelled and the unit returns to Idle.
//
// When a channel consumes an exhaustible target (loot, a single-use
// objective), every other unit channeling the same target is cancelled in
// the same call. Exactly one unit is ever granted the resource.
//
// See also: `ai.rs` where channels start, `mission.rs` for objective
// completion, `director.rs` for item effects.

use crate::archetype::ItemKind;
use crate::config::GameConfig;
use crate::director::apply_item_effect;
use crate::event::SimEventKind;
use crate::mission::{ObjectiveKind, complete_objective, scrap_value};
use crate::types::*;
use crate::unit::*;
use crate::world::{LootContent, World};

/// Duration of a channel for this unit, zero if the action is instant.
pub fn channel_duration(unit: &Unit, action: ChannelAction, config: &GameConfig) -> u64 {
    let base = match action {
        ChannelAction::Extract => config.units.extract_ms,
        ChannelAction::Collect => config.units.collect_ms,
        ChannelAction::Pickup => config.units.pickup_ms,
        ChannelAction::UseItem => match unit.active_command {
            Some(Order::UseItem {
                item: ItemKind::Medkit,
                ..
            }) => config.units.medkit_ms,
            Some(Order::UseItem {
                item: ItemKind::Mine,
                ..
            }) => config.units.mine_ms,
            _ => 0,
        },
    };
    if base == 0 {
        0
    } else {
        unit.scaled_duration(base, config)
    }
}

fn target_available(world: &World, target: InteractTarget) -> bool {
    match target {
        InteractTarget::Loot(id) => world.loot.contains_key(&id),
        InteractTarget::Objective(id) => world
            .objectives
            .get(&id)
            .is_some_and(|o| o.is_collectable()),
    }
}

/// Reset a unit whose channel ended (completed or cancelled).
fn end_channel(unit: &mut Unit) {
    unit.channeling = None;
    unit.claim = None;
    if matches!(
        unit.active_command,
        Some(Order::Pickup { .. }) | Some(Order::UseItem { .. })
    ) {
        unit.active_command = None;
    }
    if unit.state == UnitState::Channeling {
        unit.state = UnitState::Idle;
    }
}

/// Cancel every other unit channeling `target`.
fn cancel_competitors(world: &mut World, target: InteractTarget, winner: UnitId) {
    for unit in world.units.values_mut() {
        if unit.id == winner {
            continue;
        }
        let racing = unit
            .channeling
            .as_ref()
            .is_some_and(|c| c.target == Some(target));
        if racing {
            tracing::debug!(unit = %unit.id, ?target, "channel lost the race");
            end_channel(unit);
        }
        if unit.claim == Some(target) {
            unit.claim = None;
        }
    }
}

fn take_objective(world: &mut World, id: UnitId, objective: ObjectiveId, config: &GameConfig) {
    let Some(kind) = world.objectives.get(&objective).map(|o| o.kind) else {
        return;
    };
    if kind == ObjectiveKind::Artifact {
        // The artifact leaves its cell; if the carrier falls it comes back
        // as loot, not at the original spot.
        if let Some(o) = world.objectives.get_mut(&objective) {
            o.carrier = Some(id);
            o.target_cell = None;
        }
        if let Some(unit) = world.units.get_mut(&id) {
            unit.carried_objective = Some(objective);
            unit.stats_dirty = true;
        }
    } else {
        complete_objective(world, objective, config);
    }
}

fn complete_channel(world: &mut World, id: UnitId, channel: Channeling, config: &GameConfig) {
    match (channel.action, channel.target) {
        (ChannelAction::Extract, _) => {
            let Some(unit) = world.units.get_mut(&id) else {
                return;
            };
            unit.channeling = None;
            unit.active_command = None;
            unit.command_queue.clear();
            unit.clear_path();
            unit.state = UnitState::Extracted;
            let carried = unit.carried_objective.take();
            tracing::debug!(unit = %id, "unit extracted");
            world.emit(SimEventKind::UnitExtracted { unit: id });
            if let Some(objective) = carried {
                complete_objective(world, objective, config);
            }
            return;
        }
        (ChannelAction::Collect, Some(InteractTarget::Objective(objective))) => {
            take_objective(world, id, objective, config);
            cancel_competitors(world, InteractTarget::Objective(objective), id);
        }
        (ChannelAction::Pickup, Some(InteractTarget::Loot(loot))) => {
            if let Some(item) = world.loot.remove(&loot) {
                match item.content {
                    LootContent::Item(kind) => {
                        match scrap_value(kind, config) {
                            Some(scrap) => world.stats.scrap_gained += scrap,
                            None => *world.inventory.entry(kind).or_insert(0) += 1,
                        }
                        world.emit(SimEventKind::LootPickedUp { unit: id, item: kind });
                    }
                    LootContent::Artifact(objective) => take_objective(world, id, objective, config),
                }
            }
            cancel_competitors(world, InteractTarget::Loot(loot), id);
        }
        (ChannelAction::UseItem, _) => {
            let order = world.units.get(&id).and_then(|u| u.active_command.clone());
            if let Some(Order::UseItem {
                item,
                target,
                target_unit,
            }) = order
            {
                if world.consume_item(item) {
                    apply_item_effect(world, item, target, target_unit, Some(id), config);
                    world.emit(SimEventKind::ItemUsed { item, by: Some(id) });
                }
            }
        }
        (action, target) => {
            tracing::debug!(unit = %id, ?action, ?target, "channel completed with mismatched target");
        }
    }
    if let Some(unit) = world.units.get_mut(&id) {
        end_channel(unit);
    }
}

/// Advance every running channel by `dt_ms`.
pub fn progress_channels(world: &mut World, config: &GameConfig, dt_ms: u64) {
    for id in world.active_unit_ids() {
        let Some(channel) = world.units.get(&id).and_then(|u| u.channeling.clone()) else {
            continue;
        };
        if let Some(target) = channel.target {
            if !target_available(world, target) {
                if let Some(unit) = world.units.get_mut(&id) {
                    end_channel(unit);
                }
                continue;
            }
        }
        let remaining = channel.remaining_ms.saturating_sub(dt_ms);
        if remaining > 0 {
            if let Some(c) = world.units.get_mut(&id).and_then(|u| u.channeling.as_mut()) {
                c.remaining_ms = remaining;
            }
            continue;
        }
        complete_channel(world, id, channel, config);
    }
}
