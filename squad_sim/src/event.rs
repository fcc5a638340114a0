// Player-visible narrative events.
//
// Systems push `SimEventKind`s into the world's pending buffer while a tick
// runs; `SimState::step` stamps them with the simulated time and returns
// them in a `StepResult`. Events are output only. Nothing in the sim reads
// them back, and they are not part of snapshots.
//
// See also: `sim.rs` for `StepResult`, `world.rs` for the pending buffer.

use crate::archetype::{EnemyKind, ItemKind};
use crate::door::DoorState;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// A narrative event emitted by the simulation for the UI / event log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    /// Simulated milliseconds.
    pub t: u64,
    pub kind: SimEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimEventKind {
    MissionStarted,
    MissionEnded { status: MissionStatus },
    UnitDeployed { unit: UnitId, cell: CellCoord },
    WaveSpawned { turn: u32, threat: u32, enemies: u32 },
    EnemyKilled {
        enemy: EnemyId,
        kind: EnemyKind,
        by: Option<UnitId>,
    },
    UnitKilled { unit: UnitId },
    UnitExtracted { unit: UnitId },
    ObjectiveCompleted { objective: ObjectiveId },
    ObjectiveFailed { objective: ObjectiveId },
    LootPickedUp { unit: UnitId, item: ItemKind },
    ItemUsed { item: ItemKind, by: Option<UnitId> },
    DoorChanged { door: DoorId, state: DoorState },
}
