// squad_sim: pure Rust tactical squad-mission simulation.
//
// This crate contains all simulation logic for a real-time squad mission:
// the cell grid and its boundaries, doors, pathfinding, line of sight, unit
// and enemy AI, combat, the threat Director, objectives, and the command
// interface. It has no rendering or host dependencies and can be tested,
// benchmarked and replayed headless.
//
// Module overview:
// - `sim.rs`:             Top-level SimState, fixed-tick loop, snapshots, views.
// - `session.rs`:         SimSession, the host message contract and replay files.
// - `command.rs`:         SimCommand / SimAction, all player-issued mutations.
// - `command_handler.rs`: Command validation and application.
// - `world.rs`:           Entity store (units, enemies, loot, mines, turrets, doors).
// - `map.rs`:             MapDefinition input format and sanitization.
// - `graph.rs`:           Grid with a shared boundary arena per edge.
// - `door.rs`:            Door state machine over shared grid boundaries.
// - `pathfinding.rs`:     A* over the grid, reachability floods.
// - `los.rs`:             Grid-traversal line of sight and vision radius.
// - `movement.rs`:        Path following with boundary checks.
// - `unit.rs`:            Squad units, orders, channels and derived stats.
// - `ai.rs`:              Unit decision-making (engagement, explore, extract).
// - `enemy.rs`:           Enemy entities and their decision-making.
// - `combat.rs`:          Attack resolution, grenades, mines, turrets.
// - `channel.rs`:         Timed interactions (extract, collect, pickup, items).
// - `director.rs`:        Threat turns, wave budgets, item effects.
// - `mission.rs`:         Objectives, mission types, win/lose evaluation.
// - `event.rs`:           Narrative SimEvents.
// - `archetype.rs`:       Data-driven archetype, enemy and item stats.
// - `config.rs`:          GameConfig, all tunable parameters.
// - `error.rs`:           SimError for the parse / mode boundary.
// - `prng`:               Re-exported from `squad_prng` (xoshiro256++ PRNG).
// - `types.rs`:           Coordinates, entity IDs, mission enums, settings.
//
// **Critical constraint: determinism.** The simulation is a pure function:
// `(state, commands) -> (new_state, events)`. All randomness comes from a
// seeded xoshiro256++ PRNG. No system time, no OS entropy, and nothing ever
// iterates a hash map. Use `BTreeMap` for ordered collections.

pub mod ai;
pub mod archetype;
pub mod channel;
pub mod combat;
pub mod command;
pub mod command_handler;
pub mod config;
pub mod director;
pub mod door;
pub mod enemy;
pub mod error;
pub mod event;
pub mod graph;
pub mod los;
pub mod map;
pub mod mission;
pub mod movement;
pub mod pathfinding;
pub use squad_prng as prng;
pub mod session;
pub mod sim;
pub mod types;
pub mod unit;
pub mod world;
