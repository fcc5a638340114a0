// A* pathfinding over the cell grid.
//
// Implements standard A* search using a `BinaryHeap` (min-heap via reversed
// ordering, same pattern as the event ordering elsewhere in the crate). Node
// scores and came-from data are stored in `Vec`s indexed by cell index for
// O(1) access and deterministic behavior (no `HashMap`). Movement is
// 4-connected with unit step cost, so Manhattan distance is an admissible
// and consistent heuristic.
//
// A step is allowed through any boundary that `Boundary::is_plannable`
// accepts: open edges and closed-but-unlocked doors. Walls, void edges and
// locked doors are impassable. "No path" is `None`, never an error; callers
// fall back to Idle. `astar_breaching` is the enemy variant: it also plans
// through locked doors, leaving the walker parked in front of one.
//
// `distance_field` is a plain BFS over the same edges, used by exploration
// to rank frontier cells by walking distance.
//
// See also: `graph.rs` for the boundary arena, `ai.rs` and `enemy.rs` which
// request paths.
//
// **Critical constraint: determinism.** Ties in f-score are broken by cell
// index, so two equal-cost routes always resolve the same way.

use crate::graph::Grid;
use crate::types::CellCoord;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

/// The result of a successful A* search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathResult {
    /// Cells from start to goal, both inclusive.
    pub cells: Vec<CellCoord>,
    /// Number of steps (`cells.len() - 1`).
    pub total_cost: u32,
}

/// Entry in the A* open set (min-heap via reversed ordering).
#[derive(PartialEq, Eq)]
struct OpenEntry {
    index: usize,
    f_score: u32,
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f_score is "greatest".
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.index.cmp(&self.index))
    }
}

fn cell_index(grid: &Grid, c: CellCoord) -> usize {
    (c.y as usize) * (grid.width as usize) + c.x as usize
}

fn index_cell(grid: &Grid, i: usize) -> CellCoord {
    let w = grid.width as usize;
    CellCoord::new((i % w) as i32, (i / w) as i32)
}

/// Find the shortest path from `start` to `goal` using A*.
///
/// Returns `None` if either end is not walkable or no path exists.
pub fn astar(grid: &Grid, start: CellCoord, goal: CellCoord) -> Option<PathResult> {
    search(grid, start, goal, Grid::plannable_neighbors)
}

/// A* that treats locked doors as passable.
pub fn astar_breaching(grid: &Grid, start: CellCoord, goal: CellCoord) -> Option<PathResult> {
    search(grid, start, goal, Grid::breachable_neighbors)
}

fn search(
    grid: &Grid,
    start: CellCoord,
    goal: CellCoord,
    neighbors: fn(&Grid, CellCoord) -> SmallVec<[CellCoord; 4]>,
) -> Option<PathResult> {
    if !grid.is_walkable(start) || !grid.is_walkable(goal) {
        return None;
    }
    if start == goal {
        return Some(PathResult {
            cells: vec![start],
            total_cost: 0,
        });
    }

    let n = (grid.width as usize) * (grid.height as usize);
    let mut g_score = vec![u32::MAX; n];
    let mut came_from: Vec<Option<usize>> = vec![None; n];
    let mut closed = vec![false; n];

    let si = cell_index(grid, start);
    let gi = cell_index(grid, goal);
    g_score[si] = 0;

    let mut open = BinaryHeap::new();
    open.push(OpenEntry {
        index: si,
        f_score: start.manhattan_distance(goal),
    });

    while let Some(current) = open.pop() {
        let ci = current.index;
        if ci == gi {
            return Some(reconstruct_path(grid, &came_from, si, gi, g_score[gi]));
        }
        if closed[ci] {
            continue;
        }
        closed[ci] = true;

        let cell = index_cell(grid, ci);
        let tentative_g = g_score[ci] + 1;
        for neighbor in neighbors(grid, cell) {
            let ni = cell_index(grid, neighbor);
            if closed[ni] {
                continue;
            }
            if tentative_g < g_score[ni] {
                g_score[ni] = tentative_g;
                came_from[ni] = Some(ci);
                open.push(OpenEntry {
                    index: ni,
                    f_score: tentative_g + neighbor.manhattan_distance(goal),
                });
            }
        }
    }

    None
}

fn reconstruct_path(
    grid: &Grid,
    came_from: &[Option<usize>],
    start: usize,
    goal: usize,
    cost: u32,
) -> PathResult {
    let mut cells = vec![index_cell(grid, goal)];
    let mut current = goal;
    while current != start {
        match came_from[current] {
            Some(prev) => {
                cells.push(index_cell(grid, prev));
                current = prev;
            }
            None => break,
        }
    }
    cells.reverse();
    PathResult {
        cells,
        total_cost: cost,
    }
}

/// BFS walking distance from `start` to every reachable cell, indexed
/// row-major. Unreachable cells are `None`.
pub fn distance_field(grid: &Grid, start: CellCoord) -> Vec<Option<u32>> {
    let n = (grid.width as usize) * (grid.height as usize);
    let mut dist = vec![None; n];
    if !grid.is_walkable(start) {
        return dist;
    }
    let mut queue = VecDeque::new();
    dist[cell_index(grid, start)] = Some(0);
    queue.push_back(start);
    while let Some(cell) = queue.pop_front() {
        let d = dist[cell_index(grid, cell)].unwrap_or(0);
        for neighbor in grid.plannable_neighbors(cell) {
            let ni = cell_index(grid, neighbor);
            if dist[ni].is_none() {
                dist[ni] = Some(d + 1);
                queue.push_back(neighbor);
            }
        }
    }
    dist
}

/// Look up a cell in a `distance_field` result.
pub fn field_distance(grid: &Grid, field: &[Option<u32>], c: CellCoord) -> Option<u32> {
    if grid.in_bounds(c) {
        field[cell_index(grid, c)]
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{DoorDef, MapDefinition, WallDef};
    use crate::types::DoorId;

    #[test]
    fn straight_corridor() {
        let grid = Grid::new(&MapDefinition::rectangle(10, 1));
        let path = astar(&grid, CellCoord::new(0, 0), CellCoord::new(9, 0)).unwrap();
        assert_eq!(path.total_cost, 9);
        assert_eq!(path.cells.len(), 10);
        assert_eq!(path.cells.first(), Some(&CellCoord::new(0, 0)));
        assert_eq!(path.cells.last(), Some(&CellCoord::new(9, 0)));
    }

    #[test]
    fn routes_around_a_wall() {
        let mut map = MapDefinition::rectangle(3, 2);
        map.walls.push(WallDef { cells: [CellCoord::new(0, 0), CellCoord::new(1, 0)] });
        let grid = Grid::new(&map);
        let path = astar(&grid, CellCoord::new(0, 0), CellCoord::new(1, 0)).unwrap();
        assert_eq!(path.total_cost, 3, "must detour through row 1: {:?}", path.cells);
    }

    #[test]
    fn void_gap_means_no_path() {
        let mut map = MapDefinition::rectangle(3, 1);
        map.cells.retain(|c| c.x != 1);
        let grid = Grid::new(&map);
        assert!(astar(&grid, CellCoord::new(0, 0), CellCoord::new(2, 0)).is_none());
        assert!(astar(&grid, CellCoord::new(0, 0), CellCoord::new(1, 0)).is_none());
    }

    #[test]
    fn closed_door_is_plannable_locked_is_not() {
        let mut map = MapDefinition::rectangle(2, 1);
        map.doors.push(DoorDef {
            id: DoorId(0),
            cells: [CellCoord::new(0, 0), CellCoord::new(1, 0)],
            locked: false,
        });
        let grid = Grid::new(&map);
        assert!(astar(&grid, CellCoord::new(0, 0), CellCoord::new(1, 0)).is_some());

        map.doors[0].locked = true;
        let grid = Grid::new(&map);
        assert!(astar(&grid, CellCoord::new(0, 0), CellCoord::new(1, 0)).is_none());
    }

    #[test]
    fn breaching_plans_through_locked_doors_but_not_walls() {
        let mut map = MapDefinition::rectangle(3, 1);
        map.doors.push(DoorDef {
            id: DoorId(0),
            cells: [CellCoord::new(0, 0), CellCoord::new(1, 0)],
            locked: true,
        });
        map.walls.push(WallDef { cells: [CellCoord::new(1, 0), CellCoord::new(2, 0)] });
        let grid = Grid::new(&map);
        let path = astar_breaching(&grid, CellCoord::new(0, 0), CellCoord::new(1, 0)).unwrap();
        assert_eq!(path.total_cost, 1);
        assert!(astar_breaching(&grid, CellCoord::new(0, 0), CellCoord::new(2, 0)).is_none());
    }

    #[test]
    fn path_is_deterministic() {
        let grid = Grid::new(&MapDefinition::rectangle(6, 6));
        let a = astar(&grid, CellCoord::new(0, 0), CellCoord::new(5, 5)).unwrap();
        let b = astar(&grid, CellCoord::new(0, 0), CellCoord::new(5, 5)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.total_cost, 10);
    }

    #[test]
    fn distance_field_matches_astar() {
        let grid = Grid::new(&MapDefinition::rectangle(5, 4));
        let start = CellCoord::new(1, 1);
        let field = distance_field(&grid, start);
        for goal in grid.floor_cells() {
            let expected = astar(&grid, start, goal).map(|p| p.total_cost);
            assert_eq!(field_distance(&grid, &field, goal), expected, "goal {goal}");
        }
    }
}
