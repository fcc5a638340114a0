// Door state machine.
//
// Each door controls exactly one boundary in the grid's arena. States:
//
//   Closed ──request──▶ Opening ──open_duration──▶ Open
//     ▲                    ▲                          │ nobody adjacent
//     │                    └────── someone adjacent ──┤
//     └──────────── close_duration ◀──── Closing ◀────┘
//
//   Closed ──lock──▶ Locked ──soldier request──▶ Opening
//   Locked ──hp ≤ 0──▶ Destroyed (permanently open)
//
// The boundary reads `Open` the instant a door enters `Opening`, and keeps
// reading `Open` through `Open` and `Closing`. It only reverts to `Door`
// once the close timer finishes. Pathfinding and line of sight therefore see
// an opening door as already passable, which is what lets a waiting unit
// start moving on the same tick its request is granted.
//
// See also: `graph.rs` for the boundary arena, `sim.rs` for the per-tick
// door phase (always before movement).

use crate::config::DoorConfig;
use crate::graph::{BoundaryIdx, BoundaryType, Grid};
use crate::map::DoorDef;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoorState {
    Closed,
    Opening,
    Open,
    Closing,
    Locked,
    Destroyed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Door {
    pub id: DoorId,
    pub cells: [CellCoord; 2],
    pub state: DoorState,
    /// Remaining milliseconds of the current Opening/Closing transition.
    pub timer_ms: u64,
    pub hp: f32,
    pub max_hp: f32,
    /// Lock as soon as the door finishes closing.
    pub lock_pending: bool,
    pub boundary: BoundaryIdx,
}

impl Door {
    pub fn from_def(def: &DoorDef, boundary: BoundaryIdx, config: &DoorConfig) -> Self {
        Self {
            id: def.id,
            cells: def.cells,
            state: if def.locked {
                DoorState::Locked
            } else {
                DoorState::Closed
            },
            timer_ms: 0,
            hp: config.max_hp,
            max_hp: config.max_hp,
            lock_pending: false,
            boundary,
        }
    }

    /// Whether the controlled boundary should currently read `Open`.
    pub fn boundary_open(&self) -> bool {
        matches!(
            self.state,
            DoorState::Opening | DoorState::Open | DoorState::Closing | DoorState::Destroyed
        )
    }

    pub fn touches(&self, cell: CellCoord) -> bool {
        self.cells.contains(&cell)
    }

    /// Ask the door to open. Only soldiers can open a locked door.
    /// Returns true if the door entered `Opening`.
    pub fn request_open(&mut self, by_soldier: bool, config: &DoorConfig) -> bool {
        match self.state {
            DoorState::Closed | DoorState::Closing => {}
            DoorState::Locked if by_soldier => {}
            _ => return false,
        }
        self.state = DoorState::Opening;
        self.timer_ms = config.open_duration_ms;
        self.lock_pending = false;
        true
    }

    /// Lock a closed door, or arrange for an open one to lock once shut.
    pub fn lock(&mut self) -> bool {
        match self.state {
            DoorState::Closed => {
                self.state = DoorState::Locked;
                true
            }
            DoorState::Opening | DoorState::Open | DoorState::Closing => {
                self.lock_pending = true;
                true
            }
            DoorState::Locked | DoorState::Destroyed => false,
        }
    }

    /// Apply damage; returns true if this destroyed the door.
    pub fn damage(&mut self, amount: f32) -> bool {
        if self.state == DoorState::Destroyed {
            return false;
        }
        self.hp -= amount;
        if self.hp <= 0.0 {
            self.hp = 0.0;
            self.state = DoorState::Destroyed;
            self.lock_pending = false;
            true
        } else {
            false
        }
    }

    /// Advance timers by one tick. `occupied` is whether any unit or enemy
    /// stands in either of the door's two cells.
    pub fn tick(&mut self, dt_ms: u64, occupied: bool, config: &DoorConfig) {
        match self.state {
            DoorState::Opening => {
                self.timer_ms = self.timer_ms.saturating_sub(dt_ms);
                if self.timer_ms == 0 {
                    self.state = DoorState::Open;
                }
            }
            DoorState::Open => {
                if !occupied {
                    self.state = DoorState::Closing;
                    self.timer_ms = config.close_duration_ms;
                }
            }
            DoorState::Closing => {
                if occupied {
                    self.state = DoorState::Opening;
                    self.timer_ms = config.open_duration_ms;
                } else {
                    self.timer_ms = self.timer_ms.saturating_sub(dt_ms);
                    if self.timer_ms == 0 {
                        self.state = if self.lock_pending {
                            DoorState::Locked
                        } else {
                            DoorState::Closed
                        };
                        self.lock_pending = false;
                    }
                }
            }
            DoorState::Closed | DoorState::Locked | DoorState::Destroyed => {}
        }
    }

    /// Write this door's traversability into its grid boundary.
    pub fn sync_boundary(&self, grid: &mut Grid) {
        let boundary = grid.boundary_mut(self.boundary);
        boundary.kind = if self.boundary_open() {
            BoundaryType::Open
        } else {
            BoundaryType::Door
        };
        boundary.sealed = self.state == DoorState::Locked;
    }
}

/// Build door entities for every door the grid actually contains.
pub fn build_doors(
    defs: &[DoorDef],
    grid: &mut Grid,
    config: &DoorConfig,
) -> BTreeMap<DoorId, Door> {
    let mut doors = BTreeMap::new();
    for def in defs {
        let Some(boundary) = grid.door_boundary(def.id) else {
            continue;
        };
        let door = Door::from_def(def, boundary, config);
        door.sync_boundary(grid);
        doors.insert(def.id, door);
    }
    doors
}

/// The per-tick door phase: grant passage requests, advance timers, and
/// patch the grid. Returns the ids of doors whose state changed.
pub fn update_doors(
    doors: &mut BTreeMap<DoorId, Door>,
    grid: &mut Grid,
    requests: &BTreeSet<DoorId>,
    occupied: &BTreeSet<CellCoord>,
    dt_ms: u64,
    config: &DoorConfig,
) -> Vec<(DoorId, DoorState)> {
    let mut changed = Vec::new();
    for door in doors.values_mut() {
        let before = door.state;
        let is_occupied = door.cells.iter().any(|c| occupied.contains(c));
        // Passage requests come from walkers already standing at the door;
        // locked doors only yield to an explicit soldier command.
        if requests.contains(&door.id) && door.state == DoorState::Closed {
            door.request_open(false, config);
        } else {
            door.tick(dt_ms, is_occupied, config);
        }
        if door.state != before {
            tracing::debug!(door = %door.id, from = ?before, to = ?door.state, "door transition");
            changed.push((door.id, door.state));
        }
        door.sync_boundary(grid);
    }
    changed
}
