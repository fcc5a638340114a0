//! Property tests for replay determinism.
//!
//! A mission is played live with a fixed 16 ms cadence and a few commands
//! along the way. Its command log is then replayed from scratch through
//! arbitrary step partitions; every partition must land on the identical
//! state at the same simulated time.

use proptest::prelude::*;
use squad_sim::archetype::Archetype;
use squad_sim::command::{CommandLogEntry, SimAction, SimCommand};
use squad_sim::config::GameConfig;
use squad_sim::map::{MapDefinition, SpawnPointDef};
use squad_sim::mission::{MissionType, NodeType};
use squad_sim::sim::{MissionSetup, SimState};
use squad_sim::types::*;
use squad_sim::unit::{SoldierConfig, SquadConfig};
use std::collections::BTreeMap;

const TARGET_MS: u64 = 12_000;

fn open_room_setup(seed: u64) -> MissionSetup {
    let mut map = MapDefinition::rectangle(24, 16);
    map.squad_spawns = vec![CellCoord::new(2, 2), CellCoord::new(3, 2)];
    map.extraction = Some(CellCoord::new(2, 3));
    map.spawn_points = vec![
        SpawnPointDef {
            id: 0,
            pos: CellCoord::new(20, 12),
            radius: 1.0,
        },
        SpawnPointDef {
            id: 1,
            pos: CellCoord::new(18, 14),
            radius: 1.0,
        },
    ];
    MissionSetup {
        seed,
        map,
        squad: SquadConfig {
            soldiers: [Archetype::Assault, Archetype::Sniper]
                .into_iter()
                .map(|archetype| SoldierConfig {
                    archetype,
                    equipment: Vec::new(),
                    level: 0,
                })
                .collect(),
            inventory: BTreeMap::new(),
        },
        mission_type: MissionType::Default,
        node_type: NodeType::Combat,
        starting_threat: 10,
        starting_points: None,
    }
}

/// Play the mission live at 16 ms per step and return its command log and
/// the final state.
fn live_run(seed: u64) -> (Vec<CommandLogEntry>, SimState) {
    let mut sim = SimState::new(open_room_setup(seed)).unwrap();
    let units: Vec<UnitId> = sim.world.units.keys().copied().collect();
    sim.issue_command(SimCommand::global(SimAction::StartMission))
        .unwrap();
    sim.issue_command(SimCommand::new(units.clone(), SimAction::Explore))
        .unwrap();
    while sim.t < TARGET_MS && !sim.status.is_terminal() {
        if sim.t == 4000 {
            sim.issue_command(SimCommand::new(
                vec![units[1]],
                SimAction::MoveTo {
                    target: CellCoord::new(6, 4),
                },
            ))
            .unwrap();
        }
        sim.step(16, None);
    }
    (sim.command_log.clone(), sim)
}

/// Replay `log` from scratch, feeding `sizes` round-robin until `TARGET_MS`.
fn replay_with_steps(seed: u64, log: &[CommandLogEntry], sizes: &[u64]) -> SimState {
    let mut sim = SimState::resume(open_room_setup(seed), GameConfig::default(), log, 0).unwrap();
    let mut fed = 0;
    for &size in sizes.iter().cycle() {
        if fed >= TARGET_MS {
            break;
        }
        let size = size.min(TARGET_MS - fed);
        sim.step(size, None);
        fed += size;
    }
    sim
}

fn assert_same(a: &SimState, b: &SimState) {
    assert_eq!(a.t, b.t);
    assert_eq!(a.status, b.status);
    assert_eq!(a.rng.state(), b.rng.state());
    assert_eq!(a.director.threat_level, b.director.threat_level);
    assert_eq!(a.director.history, b.director.history);
    assert_eq!(a.world.units, b.world.units);
    assert_eq!(a.world.enemies, b.world.enemies);
    assert_eq!(a.world.discovered, b.world.discovered);
    assert_eq!(a.command_log, b.command_log);
}

#[test]
fn sixteen_and_twenty_four_ms_steps_agree() {
    let (log, live) = live_run(77);
    let sixteen = replay_with_steps(77, &log, &[16]);
    let twenty_four = replay_with_steps(77, &log, &[24]);
    assert_same(&live, &sixteen);
    assert_same(&sixteen, &twenty_four);
}

#[test]
fn resume_reaches_the_live_state() {
    let (log, live) = live_run(31);
    let resumed = SimState::resume(open_room_setup(31), GameConfig::default(), &log, TARGET_MS)
        .unwrap();
    assert_same(&live, &resumed);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn any_step_partition_reaches_the_same_state(
        seed in 0u64..1000,
        sizes in proptest::collection::vec(1u64..400, 1..24),
    ) {
        let (log, live) = live_run(seed);
        let replayed = replay_with_steps(seed, &log, &sizes);
        assert_same(&live, &replayed);
    }
}
