// Spatial graph: the cell grid and its boundary arena.
//
// `Grid` is built once from a (possibly sparse) `MapDefinition`. Every
// in-bounds cell has four boundary slots, one per `Direction`. Each slot
// stores a `BoundaryIdx` into a single `Vec<Boundary>` arena, and the two
// cells on either side of an edge store the *same* index. Inspecting an edge
// from either side therefore yields the identical record, and a door patching
// its boundary is seen from both sides at once.
//
// Boundary derivation:
// - Floor↔Floor is `Open` unless a wall is listed for the pair.
// - Floor↔Void, Void↔Void and any edge on the map border are `Wall`.
// - A door-listed pair is `Door` (until the door module flips it to `Open`).
//
// Storage is `Vec`-indexed by `y * width + x`; iteration order is row-major
// and never depends on hashing.
//
// See also: `door.rs` which patches door boundaries, `pathfinding.rs` and
// `los.rs` which read them, `map.rs` for the input format.
//
// **Critical constraint: determinism.** Boundary indices are assigned in a
// fixed row-major, North/East/South/West order, so a grid rebuilt from the
// same definition after a snapshot load has identical indices.

use crate::map::{CellType, MapDefinition, edge_key};
use crate::types::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryType {
    Open,
    Wall,
    Door,
}

/// Stable index of a boundary record in `Grid::boundaries`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoundaryIdx(pub u32);

/// One shared traversability record between two adjacent cells.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    /// The two cells this boundary separates, in sorted order. On the map
    /// border one of them lies outside the grid.
    pub cells: [CellCoord; 2],
    pub kind: BoundaryType,
    /// Set for door boundaries for their whole life, even while `kind`
    /// reads `Open`.
    pub door_id: Option<DoorId>,
    /// A locked door is impassable even to path planning.
    pub sealed: bool,
}

impl Boundary {
    pub fn is_open(&self) -> bool {
        self.kind == BoundaryType::Open
    }

    /// Whether a path may be planned through this boundary. Closed (but not
    /// locked) doors qualify: the walker will request them open on arrival.
    pub fn is_plannable(&self) -> bool {
        match self.kind {
            BoundaryType::Open => true,
            BoundaryType::Door => !self.sealed,
            BoundaryType::Wall => false,
        }
    }

    /// Like `is_plannable`, but a locked door also qualifies. Enemies plan
    /// this way so they end up at the door and break it down.
    pub fn is_breachable(&self) -> bool {
        self.kind != BoundaryType::Wall
    }
}

#[derive(Clone, Debug, Default)]
pub struct Grid {
    pub width: u32,
    pub height: u32,
    cells: Vec<CellType>,
    room_ids: Vec<Option<String>>,
    boundaries: Vec<Boundary>,
    cell_boundaries: Vec<[BoundaryIdx; 4]>,
}

impl Grid {
    /// Build the grid and its boundary arena from a map definition.
    ///
    /// Out-of-bounds cells and walls/doors between non-adjacent cells are
    /// dropped with a warning rather than rejecting the whole map.
    pub fn new(map: &MapDefinition) -> Self {
        let width = map.width;
        let height = map.height;
        let count = (width as usize) * (height as usize);
        let mut cells = vec![CellType::Void; count];
        let mut room_ids = vec![None; count];

        for def in &map.cells {
            let c = def.coord();
            if !map.in_bounds(c) {
                tracing::warn!(cell = %c, "map cell out of bounds, dropped");
                continue;
            }
            let i = (c.y as usize) * (width as usize) + c.x as usize;
            cells[i] = def.cell_type;
            room_ids[i] = def.room_id.clone();
        }

        let mut walls = std::collections::BTreeSet::new();
        for wall in &map.walls {
            let [a, b] = wall.cells;
            if a.direction_to(b).is_none() {
                tracing::warn!(a = %a, b = %b, "wall between non-adjacent cells, dropped");
                continue;
            }
            walls.insert(edge_key(a, b));
        }
        let mut doors = BTreeMap::new();
        for door in &map.doors {
            let [a, b] = door.cells;
            if a.direction_to(b).is_none() {
                tracing::warn!(door = %door.id, "door between non-adjacent cells, dropped");
                continue;
            }
            doors.insert(edge_key(a, b), (door.id, door.locked));
        }

        let mut grid = Grid {
            width,
            height,
            cells,
            room_ids,
            boundaries: Vec::new(),
            cell_boundaries: vec![[BoundaryIdx(0); 4]; count],
        };

        for y in 0..height as i32 {
            for x in 0..width as i32 {
                let c = CellCoord::new(x, y);
                for dir in Direction::ALL {
                    let n = c.offset(dir);
                    // The southern/eastern neighbour (or an earlier row-major
                    // cell) may already own this edge.
                    if grid.in_bounds(n) && n < c {
                        let shared = grid.cell_boundaries[grid.index(n)][dir.opposite().index()];
                        let ci = grid.index(c);
                        grid.cell_boundaries[ci][dir.index()] = shared;
                        continue;
                    }
                    let key = edge_key(c, n);
                    let both_floor =
                        grid.cell_type(c) == CellType::Floor && grid.cell_type(n) == CellType::Floor;
                    let (kind, door_id, sealed) = match doors.get(&key) {
                        Some(&(id, locked)) if both_floor => (BoundaryType::Door, Some(id), locked),
                        _ if both_floor && !walls.contains(&key) => (BoundaryType::Open, None, false),
                        _ => (BoundaryType::Wall, None, false),
                    };
                    let idx = BoundaryIdx(grid.boundaries.len() as u32);
                    grid.boundaries.push(Boundary {
                        cells: key,
                        kind,
                        door_id,
                        sealed,
                    });
                    let ci = grid.index(c);
                    grid.cell_boundaries[ci][dir.index()] = idx;
                }
            }
        }

        debug_assert!(grid.check_boundary_identity(), "boundary identity broken");
        grid
    }

    fn index(&self, c: CellCoord) -> usize {
        (c.y as usize) * (self.width as usize) + c.x as usize
    }

    pub fn in_bounds(&self, c: CellCoord) -> bool {
        c.x >= 0 && c.y >= 0 && (c.x as u32) < self.width && (c.y as u32) < self.height
    }

    pub fn cell_type(&self, c: CellCoord) -> CellType {
        if self.in_bounds(c) {
            self.cells[self.index(c)]
        } else {
            CellType::Void
        }
    }

    pub fn is_walkable(&self, c: CellCoord) -> bool {
        self.cell_type(c) == CellType::Floor
    }

    pub fn room_id(&self, c: CellCoord) -> Option<&str> {
        if self.in_bounds(c) {
            self.room_ids[self.index(c)].as_deref()
        } else {
            None
        }
    }

    /// All floor cells in row-major order.
    pub fn floor_cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        (0..self.height as i32)
            .flat_map(move |y| (0..self.width as i32).map(move |x| CellCoord::new(x, y)))
            .filter(|&c| self.is_walkable(c))
    }

    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    pub fn boundary_index(&self, c: CellCoord, dir: Direction) -> Option<BoundaryIdx> {
        if self.in_bounds(c) {
            Some(self.cell_boundaries[self.index(c)][dir.index()])
        } else {
            None
        }
    }

    pub fn boundary(&self, c: CellCoord, dir: Direction) -> Option<&Boundary> {
        self.boundary_index(c, dir)
            .map(|idx| &self.boundaries[idx.0 as usize])
    }

    /// The boundary between two orthogonally adjacent cells.
    pub fn boundary_between(&self, a: CellCoord, b: CellCoord) -> Option<&Boundary> {
        let dir = a.direction_to(b)?;
        self.boundary(a, dir)
            .or_else(|| self.boundary(b, dir.opposite()))
    }

    pub fn boundary_mut(&mut self, idx: BoundaryIdx) -> &mut Boundary {
        &mut self.boundaries[idx.0 as usize]
    }

    /// Index of the boundary owned by a door, if the door is on this grid.
    pub fn door_boundary(&self, door: DoorId) -> Option<BoundaryIdx> {
        self.boundaries
            .iter()
            .position(|b| b.door_id == Some(door))
            .map(|i| BoundaryIdx(i as u32))
    }

    /// Whether an entity may step from `a` to adjacent `b` right now.
    pub fn can_traverse(&self, a: CellCoord, b: CellCoord) -> bool {
        self.is_walkable(b) && self.boundary_between(a, b).is_some_and(Boundary::is_open)
    }

    /// Walkable neighbours reachable through boundaries a path may plan
    /// through (open edges and unlocked doors).
    pub fn plannable_neighbors(&self, c: CellCoord) -> SmallVec<[CellCoord; 4]> {
        self.neighbors_where(c, Boundary::is_plannable)
    }

    /// Walkable neighbours behind any boundary that is not a wall.
    pub fn breachable_neighbors(&self, c: CellCoord) -> SmallVec<[CellCoord; 4]> {
        self.neighbors_where(c, Boundary::is_breachable)
    }

    fn neighbors_where(
        &self,
        c: CellCoord,
        passable: fn(&Boundary) -> bool,
    ) -> SmallVec<[CellCoord; 4]> {
        Direction::ALL
            .into_iter()
            .filter_map(|dir| {
                let n = c.offset(dir);
                let b = self.boundary(c, dir)?;
                (self.is_walkable(n) && passable(b)).then_some(n)
            })
            .collect()
    }

    /// Walkable neighbours behind currently open boundaries.
    pub fn open_neighbors(&self, c: CellCoord) -> SmallVec<[CellCoord; 4]> {
        Direction::ALL
            .into_iter()
            .map(|dir| c.offset(dir))
            .filter(|&n| self.can_traverse(c, n))
            .collect()
    }

    /// Every edge seen from both sides resolves to the same arena slot.
    pub fn check_boundary_identity(&self) -> bool {
        (0..self.height as i32).all(|y| {
            (0..self.width as i32).all(|x| {
                let c = CellCoord::new(x, y);
                Direction::ALL.into_iter().all(|dir| {
                    let n = c.offset(dir);
                    !self.in_bounds(n)
                        || self.boundary_index(c, dir) == self.boundary_index(n, dir.opposite())
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{CellDef, DoorDef, WallDef};

    #[test]
    fn boundary_identity_from_both_sides() {
        let grid = Grid::new(&MapDefinition::rectangle(4, 3));
        assert!(grid.check_boundary_identity());
        let a = CellCoord::new(1, 1);
        let b = CellCoord::new(2, 1);
        let from_a = grid.boundary(a, Direction::East).unwrap();
        let from_b = grid.boundary(b, Direction::West).unwrap();
        assert!(std::ptr::eq(from_a, from_b), "both sides must share one record");
        assert_eq!(from_a.kind, BoundaryType::Open);
    }

    #[test]
    fn sparse_cells_default_to_void_and_are_walled() {
        let mut map = MapDefinition::rectangle(3, 1);
        map.cells.retain(|c| c.x != 2);
        let grid = Grid::new(&map);
        assert_eq!(grid.cell_type(CellCoord::new(2, 0)), CellType::Void);
        let edge = grid
            .boundary_between(CellCoord::new(1, 0), CellCoord::new(2, 0))
            .unwrap();
        assert_eq!(edge.kind, BoundaryType::Wall);
        assert!(!grid.can_traverse(CellCoord::new(1, 0), CellCoord::new(2, 0)));
    }

    #[test]
    fn map_border_is_wall() {
        let grid = Grid::new(&MapDefinition::rectangle(2, 2));
        let edge = grid.boundary(CellCoord::new(0, 0), Direction::West).unwrap();
        assert_eq!(edge.kind, BoundaryType::Wall);
    }

    #[test]
    fn walls_and_doors_from_definition() {
        let mut map = MapDefinition::rectangle(3, 1);
        map.walls.push(WallDef { cells: [CellCoord::new(0, 0), CellCoord::new(1, 0)] });
        map.doors.push(DoorDef {
            id: DoorId(7),
            cells: [CellCoord::new(2, 0), CellCoord::new(1, 0)],
            locked: false,
        });
        let grid = Grid::new(&map);
        let wall = grid.boundary_between(CellCoord::new(0, 0), CellCoord::new(1, 0)).unwrap();
        assert_eq!(wall.kind, BoundaryType::Wall);
        let door = grid.boundary_between(CellCoord::new(1, 0), CellCoord::new(2, 0)).unwrap();
        assert_eq!(door.kind, BoundaryType::Door);
        assert_eq!(door.door_id, Some(DoorId(7)));
        assert!(door.is_plannable());
        assert!(!door.is_open());
        assert!(grid.door_boundary(DoorId(7)).is_some());
        assert_eq!(grid.plannable_neighbors(CellCoord::new(1, 0)).len(), 1);
        assert!(grid.open_neighbors(CellCoord::new(1, 0)).is_empty());
    }

    #[test]
    fn out_of_bounds_cells_are_dropped() {
        let mut map = MapDefinition::rectangle(2, 1);
        map.cells.push(CellDef {
            x: 9,
            y: 9,
            cell_type: CellType::Floor,
            room_id: None,
        });
        let grid = Grid::new(&map);
        assert_eq!(grid.floor_cells().count(), 2);
    }

    #[test]
    fn room_ids_are_kept() {
        let grid = Grid::new(&MapDefinition::rectangle(2, 1));
        assert_eq!(grid.room_id(CellCoord::new(1, 0)), Some("room-0"));
        assert_eq!(grid.room_id(CellCoord::new(5, 0)), None);
    }
}
