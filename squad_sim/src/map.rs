// Map definition input format and sanitization.
//
// `MapDefinition` is what the (external) map generator hands the sim: a
// width/height, a possibly sparse list of cells, and optional walls, doors,
// spawn points, squad spawns, extraction, objectives and bonus loot. Omitted
// cells are Void. Walls and doors are given as the pair of orthogonally
// adjacent cells they separate.
//
// `sanitize()` reduces a definition to its canonical reachable form: cells
// that cannot be reached from the squad spawns are dropped, along with every
// wall, door and marker that touched them. Sanitizing is idempotent.
//
// See also: `graph.rs` which builds the boundary arena from a definition,
// `mission.rs` for `ObjectiveKind`.

use crate::archetype::ItemKind;
use crate::mission::ObjectiveKind;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    #[default]
    Void,
    Floor,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDef {
    pub x: i32,
    pub y: i32,
    #[serde(rename = "type")]
    pub cell_type: CellType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

impl CellDef {
    pub fn coord(&self) -> CellCoord {
        CellCoord::new(self.x, self.y)
    }
}

/// A wall between two orthogonally adjacent cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WallDef {
    pub cells: [CellCoord; 2],
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorDef {
    pub id: DoorId,
    pub cells: [CellCoord; 2],
    #[serde(default)]
    pub locked: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnPointDef {
    pub id: u32,
    pub pos: CellCoord,
    #[serde(default = "default_spawn_radius")]
    pub radius: f32,
}

fn default_spawn_radius() -> f32 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveDef {
    pub kind: ObjectiveKind,
    #[serde(default)]
    pub target_cell: Option<CellCoord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LootDef {
    pub item: ItemKind,
    pub cell: CellCoord,
}

/// The static map consumed by the sim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapDefinition {
    pub width: u32,
    pub height: u32,
    pub cells: Vec<CellDef>,
    #[serde(default)]
    pub walls: Vec<WallDef>,
    #[serde(default)]
    pub doors: Vec<DoorDef>,
    #[serde(default)]
    pub spawn_points: Vec<SpawnPointDef>,
    #[serde(default)]
    pub squad_spawns: Vec<CellCoord>,
    #[serde(default)]
    pub extraction: Option<CellCoord>,
    #[serde(default)]
    pub objectives: Vec<ObjectiveDef>,
    #[serde(default)]
    pub bonus_loot: Vec<LootDef>,
}

/// Normalize an unordered cell pair so walls and doors compare equal
/// regardless of the order they were written in.
pub fn edge_key(a: CellCoord, b: CellCoord) -> [CellCoord; 2] {
    if a <= b { [a, b] } else { [b, a] }
}

impl MapDefinition {
    /// An all-floor rectangle with no markers. Handy for tests and benches.
    pub fn rectangle(width: u32, height: u32) -> Self {
        let mut cells = Vec::with_capacity((width * height) as usize);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                cells.push(CellDef {
                    x,
                    y,
                    cell_type: CellType::Floor,
                    room_id: Some("room-0".into()),
                });
            }
        }
        Self {
            width,
            height,
            cells,
            walls: Vec::new(),
            doors: Vec::new(),
            spawn_points: Vec::new(),
            squad_spawns: Vec::new(),
            extraction: None,
            objectives: Vec::new(),
            bonus_loot: Vec::new(),
        }
    }

    pub fn in_bounds(&self, c: CellCoord) -> bool {
        c.x >= 0 && c.y >= 0 && (c.x as u32) < self.width && (c.y as u32) < self.height
    }

    fn floor_set(&self) -> BTreeSet<CellCoord> {
        self.cells
            .iter()
            .filter(|c| c.cell_type == CellType::Floor && self.in_bounds(c.coord()))
            .map(CellDef::coord)
            .collect()
    }

    /// Reduce to the canonical reachable form.
    ///
    /// Reachability is a BFS from the squad spawns (falling back to the
    /// enemy spawn points when the map has none) across Floor↔Floor
    /// boundaries that are not walled. Doors count as passable. The output
    /// lists cells in row-major order and walls/doors in sorted order, so
    /// `m.sanitize().sanitize() == m.sanitize()`.
    pub fn sanitize(&self) -> MapDefinition {
        let floors = self.floor_set();
        let walls: BTreeSet<[CellCoord; 2]> = self
            .walls
            .iter()
            .map(|w| edge_key(w.cells[0], w.cells[1]))
            .collect();

        let mut seeds: Vec<CellCoord> = self.squad_spawns.clone();
        if seeds.is_empty() {
            seeds = self.spawn_points.iter().map(|s| s.pos).collect();
        }

        let mut reachable = BTreeSet::new();
        let mut queue = VecDeque::new();
        for seed in seeds {
            if floors.contains(&seed) && reachable.insert(seed) {
                queue.push_back(seed);
            }
        }
        while let Some(cell) = queue.pop_front() {
            for dir in Direction::ALL {
                let next = cell.offset(dir);
                if !floors.contains(&next) || reachable.contains(&next) {
                    continue;
                }
                if walls.contains(&edge_key(cell, next)) {
                    continue;
                }
                reachable.insert(next);
                queue.push_back(next);
            }
        }

        let room_of = |c: CellCoord| {
            self.cells
                .iter()
                .find(|d| d.coord() == c && d.cell_type == CellType::Floor)
                .and_then(|d| d.room_id.clone())
        };
        let mut cells: Vec<CellDef> = reachable
            .iter()
            .map(|&c| CellDef {
                x: c.x,
                y: c.y,
                cell_type: CellType::Floor,
                room_id: room_of(c),
            })
            .collect();
        cells.sort_by_key(|c| (c.y, c.x));

        let both_reachable = |pair: &[CellCoord; 2]| {
            reachable.contains(&pair[0])
                && reachable.contains(&pair[1])
                && pair[0].direction_to(pair[1]).is_some()
        };
        let walls: Vec<WallDef> = walls
            .into_iter()
            .filter(both_reachable)
            .map(|cells| WallDef { cells })
            .collect();

        let mut doors: Vec<DoorDef> = self
            .doors
            .iter()
            .map(|d| DoorDef {
                cells: edge_key(d.cells[0], d.cells[1]),
                ..d.clone()
            })
            .filter(|d| both_reachable(&d.cells))
            .collect();
        doors.sort_by_key(|d| d.id);
        doors.dedup_by_key(|d| d.id);

        let keep = |c: &CellCoord| reachable.contains(c);
        MapDefinition {
            width: self.width,
            height: self.height,
            cells,
            walls,
            doors,
            spawn_points: self
                .spawn_points
                .iter()
                .filter(|s| keep(&s.pos))
                .cloned()
                .collect(),
            squad_spawns: self.squad_spawns.iter().copied().filter(keep).collect(),
            extraction: self.extraction.filter(keep),
            objectives: self
                .objectives
                .iter()
                .filter(|o| o.target_cell.is_none_or(|c| keep(&c)))
                .cloned()
                .collect(),
            bonus_loot: self
                .bonus_loot
                .iter()
                .filter(|l| keep(&l.cell))
                .cloned()
                .collect(),
        }
    }
}
