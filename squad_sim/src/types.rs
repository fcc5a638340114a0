// Core types shared across the simulation.
//
// Defines the two spatial types (`Vec2` for continuous entity positions,
// `CellCoord` for grid cells), the four cardinal `Direction`s used by the
// boundary arena, compact entity identifiers, and the small status enums
// that several modules need. All types derive `Serialize`/`Deserialize` for
// snapshots and replay files.
//
// Positions are in cell units: cell (3, 4) spans [3, 4) x [4, 5) and its
// centre is (3.5, 4.5).
//
// **Critical constraint: determinism.** Entity ids are plain counters handed
// out by the sim in creation order. Every id type is `Ord` so it can key a
// `BTreeMap`; iteration order over entities is always id order.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A continuous position or offset, in cell units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// The grid cell containing this position.
    pub fn cell(self) -> CellCoord {
        CellCoord::new(self.x.floor() as i32, self.y.floor() as i32)
    }

    /// Move toward `target` by at most `max_step`. Returns the new position
    /// and whether the target was reached.
    pub fn step_toward(self, target: Self, max_step: f32) -> (Self, bool) {
        let dist = self.distance(target);
        if dist <= max_step || dist <= f32::EPSILON {
            (target, true)
        } else {
            let t = max_step / dist;
            (
                Self::new(
                    self.x + (target.x - self.x) * t,
                    self.y + (target.y - self.y) * t,
                ),
                false,
            )
        }
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// An integer grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

impl CellCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn center(self) -> Vec2 {
        Vec2::new(self.x as f32 + 0.5, self.y as f32 + 0.5)
    }

    pub fn offset(self, dir: Direction) -> Self {
        let (dx, dy) = dir.delta();
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn manhattan_distance(self, other: Self) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }

    /// The direction from `self` to an orthogonally adjacent `other`, or
    /// `None` if the cells are not neighbours.
    pub fn direction_to(self, other: Self) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|&dir| self.offset(dir) == other)
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Cardinal directions. `y` grows southward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }
}

// ---------------------------------------------------------------------------
// Entity IDs
// ---------------------------------------------------------------------------

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

entity_id!(/// A squad member (soldier or VIP).
UnitId);
entity_id!(/// A hostile entity spawned by the Director or by mission setup.
EnemyId);
entity_id!(/// A pickup lying on the floor.
LootId);
entity_id!(/// A door controlling one boundary.
DoorId);
entity_id!(/// A mission objective.
ObjectiveId);
entity_id!(/// A deployed proximity mine.
MineId);
entity_id!(/// A deployed sentry turret.
TurretId);

/// Monotonic id allocator. Lives in `SimState` so that ids survive
/// snapshot/restore without collisions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdCounters {
    pub next_unit: u32,
    pub next_enemy: u32,
    pub next_loot: u32,
    pub next_mine: u32,
    pub next_turret: u32,
    pub next_objective: u32,
}

impl IdCounters {
    pub fn unit(&mut self) -> UnitId {
        let id = UnitId(self.next_unit);
        self.next_unit += 1;
        id
    }

    pub fn enemy(&mut self) -> EnemyId {
        let id = EnemyId(self.next_enemy);
        self.next_enemy += 1;
        id
    }

    pub fn loot(&mut self) -> LootId {
        let id = LootId(self.next_loot);
        self.next_loot += 1;
        id
    }

    pub fn mine(&mut self) -> MineId {
        let id = MineId(self.next_mine);
        self.next_mine += 1;
        id
    }

    pub fn turret(&mut self) -> TurretId {
        let id = TurretId(self.next_turret);
        self.next_turret += 1;
        id
    }

    pub fn objective(&mut self) -> ObjectiveId {
        let id = ObjectiveId(self.next_objective);
        self.next_objective += 1;
        id
    }
}

// ---------------------------------------------------------------------------
// Simulation enums
// ---------------------------------------------------------------------------

/// Mission lifecycle. `Won` and `Lost` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissionStatus {
    Deployment,
    Playing,
    Won,
    Lost,
}

impl MissionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, MissionStatus::Won | MissionStatus::Lost)
    }
}

/// Where commands come from. In `Replay` every command is sourced from the
/// recorded log and live commands are rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineMode {
    Simulation,
    Replay,
}

/// Host-facing time controls. These never feed back into the simulation
/// other than through the sim delta the host passes to `step`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub mode: EngineMode,
    pub time_scale: f32,
    pub is_paused: bool,
    pub allow_tactical_pause: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: EngineMode::Simulation,
            time_scale: 1.0,
            is_paused: false,
            allow_tactical_pause: true,
        }
    }
}
