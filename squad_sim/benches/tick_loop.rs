//! Tick loop benchmark.
//!
//! Measures one second of simulated time (about 62 fixed ticks) on an open
//! 48x32 map with a four-soldier squad exploring, a pre-spawned enemy
//! force, and visibility recomputed every tick. Also measures a snapshot
//! round trip at the end of that second.
//!
//! Run with: `cargo bench --bench tick_loop`

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use squad_sim::archetype::Archetype;
use squad_sim::command::{SimAction, SimCommand};
use squad_sim::map::{MapDefinition, SpawnPointDef};
use squad_sim::mission::{MissionType, NodeType};
use squad_sim::sim::{MissionSetup, SimState};
use squad_sim::types::*;
use squad_sim::unit::{SoldierConfig, SquadConfig};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_map() -> MapDefinition {
    let mut map = MapDefinition::rectangle(48, 32);
    map.squad_spawns = (1..5).map(|x| CellCoord::new(x, 1)).collect();
    map.extraction = Some(CellCoord::new(2, 2));
    map.spawn_points = [(40, 24), (44, 28), (36, 30)]
        .into_iter()
        .enumerate()
        .map(|(i, (x, y))| SpawnPointDef {
            id: i as u32,
            pos: CellCoord::new(x, y),
            radius: 1.0,
        })
        .collect();
    map
}

/// A started mission whose squad is exploring.
fn started_mission(starting_threat: u32) -> SimState {
    let setup = MissionSetup {
        seed: 0xBEEF,
        map: open_map(),
        squad: SquadConfig {
            soldiers: [
                Archetype::Assault,
                Archetype::Heavy,
                Archetype::Sniper,
                Archetype::Medic,
            ]
            .into_iter()
            .map(|archetype| SoldierConfig {
                archetype,
                equipment: Vec::new(),
                level: 1,
            })
            .collect(),
            inventory: BTreeMap::new(),
        },
        mission_type: MissionType::Default,
        node_type: NodeType::Combat,
        starting_threat,
        starting_points: None,
    };
    let mut sim = SimState::new(setup).expect("bench mission");
    let units: Vec<UnitId> = sim.world.units.keys().copied().collect();
    sim.issue_command(SimCommand::global(SimAction::StartMission))
        .expect("start");
    sim.issue_command(SimCommand::new(units, SimAction::Explore))
        .expect("explore");
    sim
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_one_second(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_loop");
    for threat in [0u32, 30, 60] {
        group.bench_with_input(BenchmarkId::new("one_second", threat), &threat, |b, &threat| {
            b.iter_batched(
                || started_mission(threat),
                |mut sim| {
                    for _ in 0..62 {
                        black_box(sim.step(16, None));
                    }
                    sim
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut sim = started_mission(30);
    for _ in 0..62 {
        sim.step(16, None);
    }
    c.bench_function("snapshot_round_trip", |b| {
        b.iter(|| {
            let json = sim.to_json().expect("serialize");
            black_box(SimState::from_json(&json).expect("deserialize"))
        });
    });
}

criterion_group!(benches, bench_one_second, bench_snapshot);
criterion_main!(benches);
