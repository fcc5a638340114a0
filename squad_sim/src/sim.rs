// Core simulation state and tick loop.
//
// `SimState` is the single source of truth for a mission. It owns the world
// (entities, doors, objectives, discovery), the Director, the PRNG, the
// config and the command log. The sim is a pure function:
// `(state, commands, sim deltas) -> (new_state, events)`.
//
// ## Time
//
// The host calls `step(sim_delta_ms, real_delta_ms)`. The sim delta feeds an
// integer accumulator that is drained in fixed ticks of `config.tick_ms`, so
// the same total simulated time produces the same ticks no matter how the
// host slices it. The real delta only feeds `stats.real_time_ms`. A zero sim
// delta (pause) runs no ticks, so nothing turn-based accrues.
//
// `t` is simulated milliseconds and is the only clock the sim reads.
//
// ## Mission phases
//
//   Deployment ──StartMission──▶ Playing ──▶ Won | Lost
//
// In Deployment only `DeployUnit`/`StartMission` apply and time does not
// advance. Won and Lost are terminal: further steps are no-ops.
//
// ## Per-tick order
//
//   1. drain pending logged commands due at `t`
//   2. doors: grant passage requests, advance timers, patch the grid
//   3. AI: unit behavior chain, then enemy decisions
//   4. movement: units, then enemies, then mines
//   5. combat: units, turrets, enemies
//   6. channel progress
//   7. visibility and discovery (parallel per unit, merged in id order)
//   8. Director
//   9. objectives, then win/loss
//  10. prune dead enemies, snapshot if due
//
// Doors always run before movement. `StandGround` units that acquire a
// target are halted by the AI phase, so they never move and fire in the
// same tick; `Rush` units may do both.
//
// ## Replay and resume
//
// Every accepted command is logged as `(t, command)`. `resume` builds a fresh
// mission from the same setup, queues the log as pending, and fast-forwards
// with ordinary steps; pending commands apply at the start of the first
// tick at or after their recorded time, which is exactly where a live
// command issued between steps lands. There is no separate replay path.
//
// ## Save/load
//
// `SimState` derives serde. The grid is `#[serde(skip)]` and rebuilt from
// the stored (sanitized) map by `rebuild_transient_state()`, which also
// re-applies every door's state to its boundary. `to_json()`/`from_json()`
// wrap the full cycle. Snapshots are JSON strings taken every
// `snapshot_interval_ms`. The tick accumulator is not serialized: a
// snapshot taken in the middle of a long step must not carry the rest of
// that step's time into whoever restores it.
//
// See also: `command_handler.rs` for command validation, `director.rs`,
// `ai.rs`, `combat.rs`, `door.rs`, `session.rs` for the host message
// contract.
//
// **Critical constraint: determinism.** All state mutations flow through
// `SimCommand` or the fixed tick. No wall clock, no OS entropy, no
// unordered iteration.

use crate::ai::decide_units;
use crate::archetype::{Archetype, ItemKind};
use crate::channel::progress_channels;
use crate::combat::{
    resolve_enemy_attacks, resolve_turret_attacks, resolve_unit_attacks, trigger_mines,
};
use crate::command::{CommandLogEntry, SimCommand};
use crate::config::GameConfig;
use crate::director::Director;
use crate::door::{Door, DoorState, build_doors, update_doors};
use crate::enemy::{Enemy, EnemyState, decide_enemies};
use crate::error::SimError;
use crate::event::{SimEvent, SimEventKind};
use crate::graph::Grid;
use crate::los::visible_cells;
use crate::map::MapDefinition;
use crate::mission::{
    MissionType, NodeType, Objective, evaluate_status, setup_mission, update_objectives,
};
use crate::movement::{StepOutcome, advance_along_path};
use crate::prng::GameRng;
use crate::types::*;
use crate::unit::{SoldierConfig, SquadConfig, Unit, UnitState};
use crate::world::{Loot, Mine, MissionStats, Turret, World};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Everything needed to regenerate a mission from scratch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissionSetup {
    pub seed: u64,
    pub map: MapDefinition,
    pub squad: SquadConfig,
    #[serde(default = "default_mission_type")]
    pub mission_type: MissionType,
    #[serde(default = "default_node_type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub starting_threat: u32,
    /// Starting-force budget; `None` uses `director.starting_points`.
    #[serde(default)]
    pub starting_points: Option<u32>,
}

fn default_mission_type() -> MissionType {
    MissionType::Default
}

fn default_node_type() -> NodeType {
    NodeType::Combat
}

/// A serialized copy of the full state at simulated time `t`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub t: u64,
    pub state: String,
}

/// Top-level simulation state. This is the entire mission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimState {
    /// Simulated milliseconds since the mission started playing.
    pub t: u64,
    pub status: MissionStatus,

    /// The simulation's deterministic PRNG (combat rolls).
    pub rng: GameRng,

    /// Game configuration (immutable after initialization).
    pub config: GameConfig,

    /// Mission inputs. The map is stored sanitized.
    pub setup: MissionSetup,

    pub director: Director,
    pub world: World,
    pub settings: Settings,

    /// Simulated milliseconds received but not yet spent on a tick. Belongs
    /// to the step in flight, so a serialized state always resumes on a
    /// tick boundary.
    #[serde(skip)]
    accumulator_ms: u64,

    /// Every command applied so far, in order.
    pub command_log: Vec<CommandLogEntry>,

    /// Logged commands waiting for their tick (resume/replay).
    pending: Vec<CommandLogEntry>,

    next_snapshot_ms: u64,

    /// Periodic snapshots. Not part of the snapshots themselves.
    #[serde(skip)]
    pub snapshots: Vec<Snapshot>,
}

/// The result of advancing the simulation.
pub struct StepResult {
    /// Narrative events emitted during this step, for the UI / event log.
    pub events: Vec<SimEvent>,
}

/// Read-only copy of the state handed to the host. Owned, so later ticks
/// can never change a view that was already returned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldView {
    pub t: u64,
    pub status: MissionStatus,
    pub rng_state: [u64; 4],
    pub threat_level: u32,
    pub turn_progress: f32,
    pub units: Vec<Unit>,
    pub enemies: Vec<Enemy>,
    pub loot: Vec<Loot>,
    pub mines: Vec<Mine>,
    pub turrets: Vec<Turret>,
    pub objectives: Vec<Objective>,
    pub doors: Vec<Door>,
    pub discovered: Vec<CellCoord>,
    pub visible: Vec<CellCoord>,
    pub inventory: BTreeMap<ItemKind, u32>,
    pub stats: MissionStats,
    pub settings: Settings,
    pub extraction: Option<CellCoord>,
    /// Static map geometry; present only when requested.
    pub geometry: Option<MapDefinition>,
}

impl SimState {
    /// Create a mission with the default config.
    pub fn new(setup: MissionSetup) -> Result<Self, SimError> {
        Self::with_config(setup, GameConfig::default())
    }

    /// Create a mission: sanitize the map, build the grid and doors, place
    /// the squad, set up objectives, and pre-spawn up to the starting
    /// threat. The mission starts in Deployment.
    pub fn with_config(mut setup: MissionSetup, config: GameConfig) -> Result<Self, SimError> {
        config.validate()?;
        if setup.map.width == 0 || setup.map.height == 0 {
            return Err(SimError::InvalidMap {
                reason: "map has zero width or height".into(),
            });
        }
        setup.map = setup.map.sanitize();
        let map = &setup.map;

        let mut grid = Grid::new(map);
        let doors = build_doors(&map.doors, &mut grid, &config.doors);
        let spawn_cells: Vec<CellCoord> = if map.squad_spawns.is_empty() {
            grid.floor_cells().take(1).collect()
        } else {
            map.squad_spawns
                .iter()
                .copied()
                .filter(|&c| grid.is_walkable(c))
                .collect()
        };
        if spawn_cells.is_empty() {
            return Err(SimError::InvalidMap {
                reason: "no walkable squad spawn".into(),
            });
        }

        let mut world = World::new(grid);
        world.doors = doors;
        world.inventory = setup.squad.inventory.clone();

        let mut roster: Vec<SoldierConfig> = setup.squad.soldiers.clone();
        if setup.mission_type == MissionType::EscortVip {
            roster.push(SoldierConfig {
                archetype: Archetype::Vip,
                equipment: Vec::new(),
                level: 0,
            });
        }
        for (i, soldier) in roster.iter().enumerate() {
            let cell = spawn_cells[i % spawn_cells.len()];
            let id = world.ids.unit();
            match Unit::new(id, soldier, cell.center(), &config) {
                Some(unit) => {
                    world.units.insert(id, unit);
                }
                None => {
                    tracing::warn!(archetype = ?soldier.archetype, "no archetype data, soldier skipped");
                }
            }
        }

        setup_mission(&mut world, map, setup.mission_type, setup.node_type, &config);

        let mut director = Director::new(
            setup.seed,
            Director::eligible_spawn_points(map, &world.grid),
        );
        let points = setup
            .starting_points
            .unwrap_or(config.director.starting_points);
        director.place_starting_force(setup.seed, points, map, &mut world, &config);
        director.pre_spawn(setup.starting_threat, &mut world, &config);

        let mut state = Self {
            t: 0,
            status: MissionStatus::Deployment,
            rng: GameRng::new(setup.seed),
            config,
            setup,
            director,
            world,
            settings: Settings::default(),
            accumulator_ms: 0,
            command_log: Vec::new(),
            pending: Vec::new(),
            next_snapshot_ms: 0,
            snapshots: Vec::new(),
        };
        state.update_visibility();
        update_objectives(&mut state.world, &state.config);
        state.take_snapshot_if_due();
        Ok(state)
    }

    /// Rebuild a mission from its setup and command log, fast-forwarding
    /// through ordinary steps until `target_t` (or until the log runs out
    /// of ways to make progress).
    pub fn resume(
        setup: MissionSetup,
        config: GameConfig,
        log: &[CommandLogEntry],
        target_t: u64,
    ) -> Result<Self, SimError> {
        let mut state = Self::with_config(setup, config)?;
        let mut pending = log.to_vec();
        // Stable: entries with equal ticks keep their recorded order.
        pending.sort_by_key(|e| e.tick);
        state.pending = pending;
        state.fast_forward(target_t);
        Ok(state)
    }

    /// Rehydrate from a snapshot, then replay the part of `log` the
    /// snapshot had not yet applied.
    pub fn from_snapshot(
        snapshot: &Snapshot,
        log: &[CommandLogEntry],
        target_t: u64,
    ) -> Result<Self, SimError> {
        let mut state = Self::from_json(&snapshot.state)?;
        let applied = state.command_log.len() + state.pending.len();
        state.pending.extend(log.iter().skip(applied).cloned());
        state.fast_forward(target_t);
        Ok(state)
    }

    /// Repeat ordinary steps of one tick until `t` reaches `target_t`.
    pub fn fast_forward(&mut self, target_t: u64) {
        let tick = self.config.tick_ms;
        while self.t < target_t && !self.status.is_terminal() {
            let before = (self.t, self.status, self.pending.len());
            self.step(tick, None);
            if (self.t, self.status, self.pending.len()) == before {
                tracing::debug!(t = self.t, "fast-forward stalled in deployment");
                break;
            }
        }
    }

    pub fn mission_type(&self) -> MissionType {
        self.setup.mission_type
    }

    pub fn extraction(&self) -> Option<CellCoord> {
        self.setup.map.extraction
    }

    /// Apply a command now and log it. Rejected in Replay mode, where every
    /// command comes from the recorded log.
    pub fn issue_command(&mut self, command: SimCommand) -> Result<bool, SimError> {
        if self.settings.mode == EngineMode::Replay {
            return Err(SimError::UnsupportedInReplay);
        }
        Ok(self.apply_and_log(CommandLogEntry {
            tick: self.t,
            command,
        }))
    }

    fn apply_and_log(&mut self, entry: CommandLogEntry) -> bool {
        let accepted = self.apply_command(&entry.command);
        if accepted {
            debug_assert!(self.command_log.last().is_none_or(|e| e.tick <= self.t));
            self.command_log.push(CommandLogEntry {
                tick: self.t,
                command: entry.command,
            });
        }
        accepted
    }

    fn drain_pending(&mut self) {
        let due = self.pending.iter().take_while(|e| e.tick <= self.t).count();
        if due == 0 {
            return;
        }
        let entries: Vec<CommandLogEntry> = self.pending.drain(..due).collect();
        for entry in entries {
            if entry.tick < self.t {
                tracing::warn!(tick = entry.tick, t = self.t, "replayed command is late");
            }
            self.apply_and_log(entry);
        }
    }

    /// Advance the simulation. Only `sim_delta_ms` moves simulated time.
    pub fn step(&mut self, sim_delta_ms: u64, real_delta_ms: Option<u64>) -> StepResult {
        let mut events = Vec::new();
        self.world.stats.real_time_ms += real_delta_ms.unwrap_or(0);
        if self.status.is_terminal() {
            return StepResult { events };
        }

        self.drain_pending();
        if self.status == MissionStatus::Deployment || self.status.is_terminal() {
            self.collect_events(&mut events);
            return StepResult { events };
        }

        self.accumulator_ms += sim_delta_ms;
        let tick = self.config.tick_ms;
        while self.accumulator_ms >= tick && !self.status.is_terminal() {
            self.accumulator_ms -= tick;
            self.tick(&mut events);
        }
        if self.status.is_terminal() {
            self.accumulator_ms = 0;
        }
        StepResult { events }
    }

    fn collect_events(&mut self, events: &mut Vec<SimEvent>) {
        let t = self.t;
        events.extend(
            self.world
                .take_events()
                .into_iter()
                .map(|kind| SimEvent { t, kind }),
        );
    }

    fn tick(&mut self, events: &mut Vec<SimEvent>) {
        self.drain_pending();
        if self.status != MissionStatus::Playing {
            self.collect_events(events);
            return;
        }
        let dt = self.config.tick_ms;
        self.t += dt;
        let now = self.t;

        // Doors.
        let occupied = self.world.occupied_cells();
        let requests = std::mem::take(&mut self.world.door_requests);
        let changed = update_doors(
            &mut self.world.doors,
            &mut self.world.grid,
            &requests,
            &occupied,
            dt,
            &self.config.doors,
        );
        for (door, state) in changed {
            self.world.emit(SimEventKind::DoorChanged { door, state });
        }

        // Decisions.
        let extraction = self.extraction();
        let mission = self.mission_type();
        decide_units(&mut self.world, &self.config, now, extraction, mission);
        decide_enemies(&mut self.world, &self.config, now);

        // Movement.
        self.move_units(dt);
        self.move_enemies(dt);
        trigger_mines(&mut self.world, &self.config);

        // Combat.
        resolve_unit_attacks(&mut self.world, &mut self.rng, &self.config, now);
        resolve_turret_attacks(&mut self.world, &mut self.rng, &self.config, now);
        resolve_enemy_attacks(&mut self.world, &mut self.rng, &self.config, now);

        progress_channels(&mut self.world, &self.config, dt);
        self.update_visibility();
        self.director.step(dt, &mut self.world, &self.config);

        update_objectives(&mut self.world, &self.config);
        if let Some(status) = evaluate_status(&self.world, mission) {
            self.finish(status);
        }
        self.world.prune_dead_enemies();
        self.collect_events(events);
        self.take_snapshot_if_due();
    }

    /// Enter a terminal status.
    pub(crate) fn finish(&mut self, status: MissionStatus) {
        if self.status.is_terminal() {
            return;
        }
        tracing::info!(t = self.t, ?status, "mission ended");
        self.status = status;
        self.world.emit(SimEventKind::MissionEnded { status });
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    fn move_units(&mut self, dt: u64) {
        let world = &mut self.world;
        let mut requests = Vec::new();
        for id in world.active_unit_ids() {
            let Some(unit) = world.units.get_mut(&id) else {
                continue;
            };
            if unit.channeling.is_some() || unit.holding_fire_position || unit.path.is_empty() {
                continue;
            }
            let budget = unit.stats.speed * dt as f32 / 1000.0;
            let (covered, outcome) =
                advance_along_path(&mut unit.pos, &mut unit.path, budget, &world.grid);
            unit.distance_travelled += covered;
            unit.moved_this_tick |= covered > 0.0;
            match outcome {
                StepOutcome::Arrived => {
                    unit.target_cell = None;
                    if matches!(unit.state, UnitState::Moving | UnitState::WaitingForDoor) {
                        unit.state = UnitState::Idle;
                    }
                }
                StepOutcome::Moving => unit.state = UnitState::Moving,
                StepOutcome::BlockedByDoor(door) => {
                    let locked = world
                        .doors
                        .get(&door)
                        .is_some_and(|d| d.state == DoorState::Locked);
                    if locked {
                        tracing::debug!(unit = %id, door = %door, "path blocked by locked door");
                        unit.clear_path();
                        unit.state = UnitState::Idle;
                    } else {
                        unit.state = UnitState::WaitingForDoor;
                        requests.push(door);
                    }
                }
                StepOutcome::Blocked => {
                    unit.clear_path();
                    unit.state = UnitState::Idle;
                }
            }
        }
        world.door_requests.extend(requests);
    }

    fn move_enemies(&mut self, dt: u64) {
        let world = &mut self.world;
        let mut requests = Vec::new();
        for id in world.alive_enemy_ids() {
            let Some(enemy) = world.enemies.get_mut(&id) else {
                continue;
            };
            if enemy.path.is_empty() || enemy.state == EnemyState::Attacking {
                continue;
            }
            let budget = enemy.speed * dt as f32 / 1000.0;
            let (_, outcome) = advance_along_path(&mut enemy.pos, &mut enemy.path, budget, &world.grid);
            match outcome {
                StepOutcome::Arrived => {
                    enemy.state = EnemyState::Idle;
                    enemy.waiting_door = None;
                }
                StepOutcome::Moving => {
                    enemy.state = EnemyState::Moving;
                    enemy.waiting_door = None;
                }
                StepOutcome::BlockedByDoor(door) => {
                    enemy.state = EnemyState::WaitingForDoor;
                    enemy.waiting_door = Some(door);
                    let locked = world
                        .doors
                        .get(&door)
                        .is_some_and(|d| d.state == DoorState::Locked);
                    if !locked {
                        requests.push(door);
                    }
                }
                StepOutcome::Blocked => {
                    enemy.state = EnemyState::Idle;
                    enemy.waiting_door = None;
                }
            }
        }
        world.door_requests.extend(requests);
    }

    // -----------------------------------------------------------------------
    // Visibility
    // -----------------------------------------------------------------------

    /// Recompute visible cells from every active unit and accumulate them
    /// into the discovered set.
    pub(crate) fn update_visibility(&mut self) {
        let grid = &self.world.grid;
        let radius = self.config.units.sight_radius;
        let viewers: Vec<Vec2> = self
            .world
            .units
            .values()
            .filter(|u| u.is_active())
            .map(|u| u.pos)
            .collect();
        let per_unit: Vec<Vec<CellCoord>> = viewers
            .par_iter()
            .map(|&pos| visible_cells(grid, pos, radius))
            .collect();
        let visible: BTreeSet<CellCoord> = per_unit.into_iter().flatten().collect();
        self.world.discovered.extend(visible.iter().copied());
        self.world.visible = visible;
    }

    // -----------------------------------------------------------------------
    // Views and persistence
    // -----------------------------------------------------------------------

    /// An owned copy of the state for the host. Static geometry is only
    /// included when the caller asks for it.
    pub fn state_view(&self, include_static_geometry: bool) -> WorldView {
        let world = &self.world;
        WorldView {
            t: self.t,
            status: self.status,
            rng_state: self.rng.state(),
            threat_level: self.director.threat_level,
            turn_progress: self.director.turn_progress(&self.config),
            units: world.units.values().cloned().collect(),
            enemies: world.enemies.values().cloned().collect(),
            loot: world.loot.values().cloned().collect(),
            mines: world.mines.values().cloned().collect(),
            turrets: world.turrets.values().cloned().collect(),
            objectives: world
                .objectives
                .values()
                .filter(|o| o.visible)
                .cloned()
                .collect(),
            doors: world.doors.values().cloned().collect(),
            discovered: world.discovered.iter().copied().collect(),
            visible: world.visible.iter().copied().collect(),
            inventory: world.inventory.clone(),
            stats: world.stats.clone(),
            settings: self.settings.clone(),
            extraction: self.extraction(),
            geometry: include_static_geometry.then(|| self.setup.map.clone()),
        }
    }

    fn take_snapshot_if_due(&mut self) {
        let interval = self.config.snapshot_interval_ms;
        if interval == 0 || self.t < self.next_snapshot_ms {
            return;
        }
        self.next_snapshot_ms = self.t - self.t % interval + interval;
        match self.to_json() {
            Ok(state) => self.snapshots.push(Snapshot { t: self.t, state }),
            Err(e) => tracing::warn!(t = self.t, error = %e, "snapshot failed"),
        }
    }

    /// Restore the grid from the stored map and re-apply door state to it.
    pub fn rebuild_transient_state(&mut self) {
        self.world.grid = Grid::new(&self.setup.map);
        for door in self.world.doors.values() {
            door.sync_boundary(&mut self.world.grid);
        }
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let mut state: SimState = serde_json::from_str(json)?;
        state.rebuild_transient_state();
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::EnemyKind;
    use crate::command::SimAction;
    use crate::map::{DoorDef, SpawnPointDef};
    use crate::unit::Order;

    fn squad(archetypes: &[Archetype]) -> SquadConfig {
        SquadConfig {
            soldiers: archetypes
                .iter()
                .map(|&archetype| SoldierConfig {
                    archetype,
                    equipment: Vec::new(),
                    level: 0,
                })
                .collect(),
            inventory: BTreeMap::new(),
        }
    }

    fn corridor_setup(seed: u64) -> MissionSetup {
        let mut map = MapDefinition::rectangle(10, 1);
        map.squad_spawns = vec![CellCoord::new(1, 0)];
        map.extraction = Some(CellCoord::new(9, 0));
        MissionSetup {
            seed,
            map,
            squad: squad(&[Archetype::Assault]),
            mission_type: MissionType::Default,
            node_type: NodeType::Combat,
            starting_threat: 0,
            starting_points: None,
        }
    }

    fn started(setup: MissionSetup) -> SimState {
        let mut sim = SimState::new(setup).unwrap();
        assert!(sim.issue_command(SimCommand::global(SimAction::StartMission)).unwrap());
        sim
    }

    #[test]
    fn deployment_does_not_advance_time() {
        let mut sim = SimState::new(corridor_setup(1)).unwrap();
        sim.step(1000, Some(1000));
        assert_eq!(sim.t, 0);
        assert_eq!(sim.status, MissionStatus::Deployment);
        assert_eq!(sim.world.stats.real_time_ms, 1000);
    }

    #[test]
    fn ticks_are_fixed_size() {
        let mut sim = started(corridor_setup(1));
        sim.step(40, None);
        assert_eq!(sim.t, 32);
        sim.step(8, None);
        assert_eq!(sim.t, 48);
    }

    #[test]
    fn pause_changes_nothing_but_the_real_clock() {
        let mut sim = started(corridor_setup(1));
        sim.step(160, None);
        let before = sim.state_view(false);
        let threat = sim.director.threat_level;
        for _ in 0..100 {
            sim.step(0, Some(500));
        }
        assert_eq!(sim.t, before.t);
        assert_eq!(sim.director.threat_level, threat);
        assert_eq!(sim.director.time_in_turn_ms, 160);
        assert_eq!(sim.state_view(false).units, before.units);
    }

    #[test]
    fn first_turn_spawns_one_wave() {
        let mut setup = corridor_setup(5);
        setup.map.spawn_points.push(SpawnPointDef {
            id: 0,
            pos: CellCoord::new(8, 0),
            radius: 1.0,
        });
        let mut sim = started(setup);
        sim.issue_command(SimCommand::new(vec![UnitId(0)], SimAction::Stop))
            .unwrap();
        let result = sim.step(10_000, None);
        let waves: Vec<_> = result
            .events
            .iter()
            .filter(|e| matches!(e.kind, SimEventKind::WaveSpawned { .. }))
            .collect();
        assert_eq!(waves.len(), 1);
        assert_eq!(sim.director.threat_level, 10);
    }

    #[test]
    fn terminal_status_freezes_time() {
        let mut sim = started(corridor_setup(1));
        sim.step(64, None);
        assert!(sim.issue_command(SimCommand::global(SimAction::DebugForceLose)).unwrap());
        assert_eq!(sim.status, MissionStatus::Lost);
        let t = sim.t;
        sim.step(10_000, None);
        assert_eq!(sim.t, t);
        assert!(!sim.issue_command(SimCommand::global(SimAction::StartMission)).unwrap());
    }

    #[test]
    fn earlier_views_are_not_mutated_by_later_ticks() {
        let mut sim = started(corridor_setup(1));
        let unit = UnitId(0);
        sim.issue_command(SimCommand::new(vec![unit], SimAction::Extract))
            .unwrap();
        let before = sim.state_view(false);
        sim.step(500, None);
        let after = sim.state_view(false);
        assert_ne!(before.units[0].pos, after.units[0].pos);
        assert_eq!(before.units[0].pos, CellCoord::new(1, 0).center());
    }

    #[test]
    fn geometry_only_when_requested() {
        let sim = SimState::new(corridor_setup(1)).unwrap();
        assert!(sim.state_view(true).geometry.is_some_and(|m| !m.cells.is_empty()));
        assert!(sim.state_view(false).geometry.is_none());
    }

    #[test]
    fn json_roundtrip_rebuilds_door_boundaries() {
        let mut setup = corridor_setup(3);
        setup.map.doors.push(DoorDef {
            id: DoorId(1),
            cells: [CellCoord::new(4, 0), CellCoord::new(5, 0)],
            locked: false,
        });
        let mut sim = started(setup);
        sim.issue_command(SimCommand::global(SimAction::OpenDoor { door_id: DoorId(1) }))
            .unwrap();
        let json = sim.to_json().unwrap();
        let restored = SimState::from_json(&json).unwrap();
        assert!(
            restored
                .world
                .grid
                .can_traverse(CellCoord::new(4, 0), CellCoord::new(5, 0))
        );
        assert_eq!(restored.t, sim.t);
        assert_eq!(restored.world.units, sim.world.units);
    }

    #[test]
    fn snapshots_are_periodic() {
        let mut sim = started(corridor_setup(1));
        sim.issue_command(SimCommand::new(vec![UnitId(0)], SimAction::Stop))
            .unwrap();
        assert_eq!(sim.snapshots.len(), 1);
        sim.step(12_000, None);
        let times: Vec<u64> = sim.snapshots.iter().map(|s| s.t).collect();
        assert_eq!(times.len(), 3);
        assert_eq!(times[0], 0);
        assert!(times[1] >= 5000 && times[1] < 5016);
        assert!(times[2] >= 10_000 && times[2] < 10_016);
    }

    #[test]
    fn restoring_a_mid_step_snapshot_lands_on_target() {
        let mut live = started(corridor_setup(4));
        live.issue_command(SimCommand::new(vec![UnitId(0)], SimAction::Stop))
            .unwrap();
        live.step(12_000, None);
        let snapshot = live.snapshots[1].clone();
        assert!(snapshot.t > 0 && snapshot.t < 12_000);

        let target = snapshot.t + 16;
        let restored = SimState::from_snapshot(&snapshot, &live.command_log, target).unwrap();
        assert_eq!(restored.t, target);

        let resumed = SimState::resume(
            corridor_setup(4),
            GameConfig::default(),
            &live.command_log,
            target,
        )
        .unwrap();
        assert_eq!(resumed.t, restored.t);
        assert_eq!(resumed.rng.state(), restored.rng.state());
        assert_eq!(resumed.world.units, restored.world.units);

        let mut stepped = SimState::from_snapshot(&snapshot, &live.command_log, snapshot.t).unwrap();
        assert_eq!(stepped.t, snapshot.t);
        stepped.step(16, None);
        assert_eq!(stepped.t, snapshot.t + 16);
    }

    #[test]
    fn enemies_break_down_locked_doors() {
        let mut setup = corridor_setup(6);
        setup.map = MapDefinition::rectangle(8, 1);
        setup.map.squad_spawns = vec![CellCoord::new(0, 0)];
        setup.map.doors.push(DoorDef {
            id: DoorId(2),
            cells: [CellCoord::new(3, 0), CellCoord::new(4, 0)],
            locked: true,
        });
        let mut sim = started(setup);
        sim.issue_command(SimCommand::new(vec![UnitId(0)], SimAction::Stop))
            .unwrap();
        let mite = sim
            .world
            .spawn_enemy(
                EnemyKind::XenoMite,
                CellCoord::new(7, 0).center(),
                &sim.config,
            )
            .unwrap();

        let mut destroyed_event = false;
        let mut waited_at_door = false;
        for _ in 0..(20_000 / 16) {
            let result = sim.step(16, None);
            destroyed_event |= result.events.iter().any(|e| {
                e.kind
                    == SimEventKind::DoorChanged {
                        door: DoorId(2),
                        state: DoorState::Destroyed,
                    }
            });
            waited_at_door |= sim
                .world
                .enemies
                .get(&mite)
                .is_some_and(|e| e.state == EnemyState::WaitingForDoor);
            if sim.world.doors[&DoorId(2)].state == DoorState::Destroyed {
                break;
            }
        }
        assert!(waited_at_door);
        assert_eq!(sim.world.doors[&DoorId(2)].state, DoorState::Destroyed);
        assert!(destroyed_event);
        assert!(
            sim.world
                .grid
                .can_traverse(CellCoord::new(4, 0), CellCoord::new(3, 0))
        );
    }

    #[test]
    fn fallen_carrier_drops_the_artifact_for_another_soldier() {
        use crate::map::ObjectiveDef;
        use crate::mission::{ObjectiveKind, objectives_ready};
        use crate::unit::InteractTarget;
        use crate::world::LootContent;

        let mut setup = corridor_setup(8);
        setup.map = MapDefinition::rectangle(6, 1);
        setup.map.squad_spawns = vec![CellCoord::new(1, 0), CellCoord::new(0, 0)];
        setup.map.objectives.push(ObjectiveDef {
            kind: ObjectiveKind::Recover,
            target_cell: Some(CellCoord::new(3, 0)),
        });
        setup.mission_type = MissionType::ExtractArtifacts;
        setup.squad = squad(&[Archetype::Assault, Archetype::Assault]);
        let mut sim = started(setup);
        let (carrier, rescuer) = (UnitId(0), UnitId(1));
        sim.issue_command(SimCommand::new(vec![carrier, rescuer], SimAction::Stop))
            .unwrap();
        let artifact = *sim.world.objectives.keys().next().unwrap();
        assert!(
            sim.issue_command(SimCommand::new(
                vec![carrier],
                SimAction::Pickup {
                    target: InteractTarget::Objective(artifact),
                },
            ))
            .unwrap()
        );
        for _ in 0..(10_000 / 16) {
            sim.step(16, None);
            if sim.world.units[&carrier].carried_objective.is_some() {
                break;
            }
        }
        assert_eq!(sim.world.objectives[&artifact].carrier, Some(carrier));
        assert!(objectives_ready(&sim.world, MissionType::ExtractArtifacts));

        assert!(sim.world.damage_unit(carrier, 10_000.0));
        assert_eq!(sim.world.objectives[&artifact].carrier, None);
        assert!(!sim.world.objectives[&artifact].is_collectable());
        assert!(!objectives_ready(&sim.world, MissionType::ExtractArtifacts));
        let (&loot, dropped) = sim.world.loot.iter().next().unwrap();
        assert_eq!(dropped.content, LootContent::Artifact(artifact));

        assert!(
            sim.issue_command(SimCommand::new(
                vec![rescuer],
                SimAction::Pickup {
                    target: InteractTarget::Loot(loot),
                },
            ))
            .unwrap()
        );
        for _ in 0..(10_000 / 16) {
            sim.step(16, None);
            if sim.world.units[&rescuer].carried_objective.is_some() {
                break;
            }
        }
        assert_eq!(sim.world.units[&rescuer].carried_objective, Some(artifact));
        assert_eq!(sim.world.objectives[&artifact].carrier, Some(rescuer));
        assert!(sim.world.loot.is_empty());
        assert!(objectives_ready(&sim.world, MissionType::ExtractArtifacts));
        assert_eq!(sim.status, MissionStatus::Playing);
    }

    #[test]
    fn starting_force_roams_from_the_first_tick() {
        let mut setup = corridor_setup(14);
        setup.starting_points = Some(4);
        let sim = SimState::new(setup.clone()).unwrap();
        assert_eq!(sim.status, MissionStatus::Deployment);
        assert!(!sim.director.starting_force.is_empty());
        assert_eq!(sim.world.enemies.len(), sim.director.starting_force.len());
        assert!(sim.world.enemies.values().all(|e| e.cell().x >= 5));

        let again = SimState::new(setup).unwrap();
        assert_eq!(again.world.enemies, sim.world.enemies);
    }

    #[test]
    fn replay_mode_rejects_live_commands() {
        let mut sim = SimState::new(corridor_setup(1)).unwrap();
        sim.settings.mode = EngineMode::Replay;
        assert!(matches!(
            sim.issue_command(SimCommand::global(SimAction::StartMission)),
            Err(SimError::UnsupportedInReplay)
        ));
    }

    #[test]
    fn resume_matches_the_live_run() {
        let mut live = started(corridor_setup(11));
        live.step(320, None);
        live.issue_command(SimCommand::new(vec![UnitId(0)], SimAction::Extract))
            .unwrap();
        live.step(1000, None);

        let resumed = SimState::resume(
            corridor_setup(11),
            GameConfig::default(),
            &live.command_log,
            live.t,
        )
        .unwrap();
        assert_eq!(resumed.t, live.t);
        assert_eq!(resumed.rng.state(), live.rng.state());
        assert_eq!(resumed.world.units, live.world.units);
        assert_eq!(resumed.command_log, live.command_log);
        assert_eq!(
            resumed.world.units[&UnitId(0)].active_command,
            Some(Order::Extract)
        );
    }

    #[test]
    fn escort_missions_add_a_vip() {
        let mut setup = corridor_setup(2);
        setup.mission_type = MissionType::EscortVip;
        let sim = SimState::new(setup).unwrap();
        assert_eq!(sim.world.units.len(), 2);
        assert!(sim.world.units.values().any(|u| u.is_vip()));
    }

    #[test]
    fn initial_visibility_is_computed_at_construction() {
        let sim = SimState::new(corridor_setup(1)).unwrap();
        assert!(sim.world.visible.contains(&CellCoord::new(1, 0)));
        assert!(sim.world.discovered.contains(&CellCoord::new(1, 0)));
    }

    #[test]
    fn empty_map_is_rejected() {
        let mut setup = corridor_setup(1);
        setup.map.width = 0;
        assert!(matches!(
            SimState::new(setup),
            Err(SimError::InvalidMap { .. })
        ));
    }
}
