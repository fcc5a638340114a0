// Commands that mutate simulation state.
//
// All external mutations to a mission go through `SimCommand`. The sim is a
// pure function `(state, commands, sim deltas) -> (new_state, events)`, and
// commands are the only non-time input.
//
// A `SimCommand` names the units it applies to, whether it replaces or
// appends to their order queues, and a `SimAction`. Actions fall into three
// groups:
// - unit orders (`MoveTo`, `OverwatchPoint`, `Explore`, `Pickup`,
//   `EscortUnit`, `Extract`, `UseItem`, `Stop`, `ResumeAi`,
//   `SetEngagement`),
// - world interactions (`OpenDoor`, `LockDoor`, global `UseItem`),
// - lifecycle (`DeployUnit`, `StartMission`, `DebugForceWin`,
//   `DebugForceLose`).
//
// Every command the sim accepts is appended to the command log as a
// `CommandLogEntry` stamped with the simulated time it was applied at.
// Replaying that log from the same seed reproduces the mission.
//
// See also: `command_handler.rs` for validation and dispatch, `unit.rs` for
// the `Order` a unit command turns into, `session.rs` for the replay file.
//
// **Critical constraint: determinism.** Commands are the sole external input
// to the sim. Rejected commands change nothing and are not logged.

use crate::archetype::ItemKind;
use crate::types::*;
use crate::unit::{EngagementPolicy, InteractTarget};
use serde::{Deserialize, Serialize};

/// A player-issued command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimCommand {
    /// Units the command applies to. Empty means "no unit", which only a
    /// few actions accept.
    #[serde(default)]
    pub unit_ids: Vec<UnitId>,
    /// Append to each unit's order queue instead of replacing its order.
    #[serde(default)]
    pub queue: bool,
    pub action: SimAction,
}

impl SimCommand {
    pub fn new(unit_ids: Vec<UnitId>, action: SimAction) -> Self {
        Self {
            unit_ids,
            queue: false,
            action,
        }
    }

    /// A command that targets no units.
    pub fn global(action: SimAction) -> Self {
        Self::new(Vec::new(), action)
    }

    pub fn queued(mut self) -> Self {
        self.queue = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimAction {
    MoveTo { target: CellCoord },
    OpenDoor { door_id: DoorId },
    LockDoor { door_id: DoorId },
    SetEngagement { policy: EngagementPolicy },
    /// Cancel everything and disable autonomous control.
    Stop,
    ResumeAi,
    UseItem {
        item: ItemKind,
        #[serde(default)]
        target: Option<CellCoord>,
        #[serde(default)]
        target_unit: Option<UnitId>,
    },
    /// Walk to a cell and hold it in the `StandGround` profile.
    OverwatchPoint { target: CellCoord },
    Explore,
    Pickup { target: InteractTarget },
    EscortUnit { target_unit: UnitId },
    Extract,
    /// Deployment phase only: place a unit on a squad-spawn cell.
    DeployUnit { unit_id: UnitId, target: CellCoord },
    StartMission,
    DebugForceWin,
    DebugForceLose,
}

/// A command as recorded in the log and the replay file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandLogEntry {
    /// Simulated milliseconds at which the command was applied.
    pub tick: u64,
    pub command: SimCommand,
}
