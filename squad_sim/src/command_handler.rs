// Command validation and dispatch.
//
// `SimState::apply_command` is the only way a `SimCommand` touches the world.
// It returns whether the command was accepted; rejected commands change
// nothing and are not logged, so a replayed log with a corrupted entry
// simply skips it.
//
// Validation happens in three layers:
//   1. phase: nothing applies once the mission is over; in Deployment only
//      `DeployUnit` and `StartMission` apply, and those two apply nowhere
//      else.
//   2. units: the id list is filtered to units that exist and are still on
//      the map (not dead, not extracted). Unit orders with nothing left are
//      rejected. An empty list is the global form, accepted only by door
//      commands, lifecycle commands and commander item use.
//   3. per action: targets must be walkable and discovered, inventory must
//      be non-zero, doors and loot must exist.
//
// Unit orders replace the active order (cancelling any channel) unless
// `queue` is set, in which case they append to the unit's queue and start
// once the unit is free. Orders put a unit under manual control; a manual
// pickup or item use on a unit that was autonomous queues a `ResumeAi`
// behind it.
//
// See also: `command.rs` for the command types, `unit.rs` for `Order`,
// `director.rs` for commander abilities.

use crate::archetype::{AiProfile, ItemKind};
use crate::command::{SimAction, SimCommand};
use crate::door::DoorState;
use crate::event::SimEventKind;
use crate::pathfinding::astar;
use crate::sim::SimState;
use crate::types::*;
use crate::unit::{InteractTarget, Order, UnitState};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

fn reject(action: &SimAction, reason: &str) -> bool {
    tracing::debug!(?action, reason, "command rejected");
    false
}

impl SimState {
    /// Validate and apply one command. Returns whether it was accepted.
    pub(crate) fn apply_command(&mut self, command: &SimCommand) -> bool {
        let action = &command.action;
        if self.status.is_terminal() {
            return reject(action, "mission is over");
        }
        let deployment_only = matches!(
            action,
            SimAction::DeployUnit { .. } | SimAction::StartMission
        );
        if deployment_only != (self.status == MissionStatus::Deployment) {
            return reject(action, "not allowed in this phase");
        }

        let units: Vec<UnitId> = command
            .unit_ids
            .iter()
            .copied()
            .filter(|id| self.world.units.get(id).is_some_and(|u| u.is_active()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let queue = command.queue;

        match action {
            SimAction::MoveTo { target } | SimAction::OverwatchPoint { target } => {
                if units.is_empty() {
                    return reject(action, "no eligible units");
                }
                if !self.world.grid.is_walkable(*target) || !self.world.discovered.contains(target) {
                    return reject(action, "target not walkable or undiscovered");
                }
                let overwatch = matches!(action, SimAction::OverwatchPoint { .. });
                for id in units {
                    let order = if overwatch {
                        if let Some(unit) = self.world.units.get_mut(&id) {
                            unit.ai_profile = AiProfile::StandGround;
                        }
                        Order::Overwatch { target: *target }
                    } else {
                        Order::MoveTo { target: *target }
                    };
                    self.assign_order(id, order, queue);
                }
                true
            }
            SimAction::Explore => {
                let units: Vec<UnitId> = units
                    .into_iter()
                    .filter(|id| self.world.units.get(id).is_some_and(|u| !u.is_vip()))
                    .collect();
                if units.is_empty() {
                    return reject(action, "no eligible units");
                }
                for id in units {
                    self.assign_order(id, Order::Explore, queue);
                    if let Some(unit) = self.world.units.get_mut(&id) {
                        unit.ai_enabled = true;
                    }
                }
                true
            }
            SimAction::Extract => {
                let Some(zone) = self.extraction() else {
                    return reject(action, "map has no extraction zone");
                };
                let reachable: Vec<UnitId> = units
                    .into_iter()
                    .filter(|id| {
                        self.world
                            .units
                            .get(id)
                            .is_some_and(|u| astar(&self.world.grid, u.cell(), zone).is_some())
                    })
                    .collect();
                if reachable.is_empty() {
                    return reject(action, "extraction unreachable");
                }
                for id in reachable {
                    self.assign_order(id, Order::Extract, queue);
                }
                true
            }
            SimAction::Pickup { target } => {
                if units.is_empty() {
                    return reject(action, "no eligible units");
                }
                let available = match *target {
                    InteractTarget::Loot(loot) => self
                        .world
                        .loot
                        .get(&loot)
                        .is_some_and(|l| self.world.discovered.contains(&l.cell())),
                    InteractTarget::Objective(objective) => self
                        .world
                        .objectives
                        .get(&objective)
                        .is_some_and(|o| o.is_collectable() && o.visible),
                };
                if !available {
                    return reject(action, "pickup target unavailable");
                }
                for id in units {
                    self.assign_manual(id, Order::Pickup { target: *target }, queue);
                }
                true
            }
            SimAction::UseItem {
                item,
                target,
                target_unit,
            } => {
                if command.unit_ids.is_empty() {
                    let accepted = self.director.handle_use_item(
                        &mut self.world,
                        *item,
                        *target,
                        *target_unit,
                        &self.config,
                    );
                    return accepted || reject(action, "commander ability unavailable");
                }
                if units.is_empty() {
                    return reject(action, "no eligible units");
                }
                if self.world.inventory_count(*item) == 0 {
                    return reject(action, "item not in inventory");
                }
                let grid = &self.world.grid;
                let valid = match item {
                    ItemKind::FragGrenade => target.is_some_and(|c| self.world.visible.contains(&c)),
                    ItemKind::Scanner => target.is_none_or(|c| grid.in_bounds(c)),
                    ItemKind::Mine | ItemKind::Sentry => target.is_none_or(|c| grid.is_walkable(c)),
                    ItemKind::Medkit | ItemKind::Stimpack => true,
                    ItemKind::ScrapCrate => false,
                };
                if !valid {
                    return reject(action, "invalid item target");
                }
                for id in units {
                    let order = Order::UseItem {
                        item: *item,
                        target: *target,
                        target_unit: *target_unit,
                    };
                    self.assign_manual(id, order, queue);
                }
                true
            }
            SimAction::EscortUnit { target_unit } => {
                let ward_active = self
                    .world
                    .units
                    .get(target_unit)
                    .is_some_and(|u| u.is_active());
                let units: Vec<UnitId> = units.into_iter().filter(|id| id != target_unit).collect();
                if !ward_active || units.is_empty() {
                    return reject(action, "no escort or ward");
                }
                for id in units {
                    self.assign_order(
                        id,
                        Order::Escort {
                            target_unit: *target_unit,
                        },
                        queue,
                    );
                }
                true
            }
            SimAction::Stop => {
                if units.is_empty() {
                    return reject(action, "no eligible units");
                }
                for id in units {
                    let Some(unit) = self.world.units.get_mut(&id) else {
                        continue;
                    };
                    unit.command_queue.clear();
                    unit.active_command = None;
                    unit.cancel_channel();
                    unit.clear_path();
                    unit.claim = None;
                    unit.explore_target = None;
                    unit.ai_enabled = false;
                    unit.state = UnitState::Idle;
                }
                true
            }
            SimAction::ResumeAi => {
                let units: Vec<UnitId> = units
                    .into_iter()
                    .filter(|id| self.world.units.get(id).is_some_and(|u| !u.is_vip()))
                    .collect();
                if units.is_empty() {
                    return reject(action, "no eligible units");
                }
                for id in units {
                    let Some(unit) = self.world.units.get_mut(&id) else {
                        continue;
                    };
                    if queue {
                        unit.command_queue.push(Order::ResumeAi);
                    } else {
                        unit.ai_enabled = true;
                        if !unit.is_extracting() {
                            unit.active_command = None;
                            unit.clear_path();
                        }
                    }
                }
                true
            }
            SimAction::SetEngagement { policy } => {
                if units.is_empty() {
                    return reject(action, "no eligible units");
                }
                for id in units {
                    if let Some(unit) = self.world.units.get_mut(&id) {
                        unit.engagement = *policy;
                    }
                }
                true
            }
            SimAction::OpenDoor { door_id } => {
                let world = &mut self.world;
                let Some(door) = world.doors.get_mut(door_id) else {
                    return reject(action, "no such door");
                };
                if !door.request_open(true, &self.config.doors) {
                    return reject(action, "door cannot open");
                }
                door.sync_boundary(&mut world.grid);
                world.emit(SimEventKind::DoorChanged {
                    door: *door_id,
                    state: DoorState::Opening,
                });
                true
            }
            SimAction::LockDoor { door_id } => {
                let world = &mut self.world;
                let Some(door) = world.doors.get_mut(door_id) else {
                    return reject(action, "no such door");
                };
                let before = door.state;
                if !door.lock() {
                    return reject(action, "door cannot lock");
                }
                door.sync_boundary(&mut world.grid);
                let after = door.state;
                if after != before {
                    world.emit(SimEventKind::DoorChanged {
                        door: *door_id,
                        state: after,
                    });
                }
                true
            }
            SimAction::DeployUnit { unit_id, target } => self.deploy_unit(action, *unit_id, *target),
            SimAction::StartMission => {
                tracing::info!(t = self.t, "mission started");
                self.status = MissionStatus::Playing;
                self.world.emit(SimEventKind::MissionStarted);
                true
            }
            SimAction::DebugForceWin => {
                self.finish(MissionStatus::Won);
                true
            }
            SimAction::DebugForceLose => {
                self.finish(MissionStatus::Lost);
                true
            }
        }
    }

    /// Replace the unit's order, or append it when `queue` is set.
    fn assign_order(&mut self, id: UnitId, order: Order, queue: bool) {
        let Some(unit) = self.world.units.get_mut(&id) else {
            return;
        };
        if queue {
            unit.command_queue.push(order);
            return;
        }
        unit.command_queue.clear();
        unit.cancel_channel();
        unit.clear_path();
        unit.claim = None;
        unit.explore_target = None;
        unit.holding_fire_position = false;
        if matches!(
            unit.state,
            UnitState::Moving | UnitState::WaitingForDoor | UnitState::Attacking
        ) {
            unit.state = UnitState::Idle;
        }
        if order != Order::Explore {
            unit.ai_enabled = false;
        }
        unit.active_command = Some(order);
    }

    /// A manual order that hands control back to the AI afterwards if the
    /// unit was autonomous when it was issued.
    fn assign_manual(&mut self, id: UnitId, order: Order, queue: bool) {
        let was_autonomous = self.world.units.get(&id).is_some_and(|u| u.ai_enabled);
        self.assign_order(id, order, queue);
        if let Some(unit) = self.world.units.get_mut(&id) {
            if was_autonomous {
                unit.command_queue.push(Order::ResumeAi);
            }
        }
    }

    /// Place a unit on a squad-spawn cell, swapping with any unit already
    /// standing there.
    fn deploy_unit(&mut self, action: &SimAction, id: UnitId, target: CellCoord) -> bool {
        if !self.setup.map.squad_spawns.contains(&target) || !self.world.grid.is_walkable(target) {
            return reject(action, "not a squad spawn cell");
        }
        let occupants: FxHashMap<CellCoord, UnitId> = self
            .world
            .units
            .values()
            .map(|u| (u.cell(), u.id))
            .collect();
        let Some(from) = self.world.units.get(&id).map(|u| u.pos) else {
            return reject(action, "no such unit");
        };
        if let Some(&other) = occupants.get(&target).filter(|&&o| o != id) {
            if let Some(unit) = self.world.units.get_mut(&other) {
                unit.pos = from;
            }
        }
        if let Some(unit) = self.world.units.get_mut(&id) {
            unit.pos = target.center();
        }
        self.update_visibility();
        self.world.emit(SimEventKind::UnitDeployed { unit: id, cell: target });
        true
    }
}
