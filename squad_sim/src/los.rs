// Line of sight over the boundary grid.
//
// Uses the Amanatides–Woo voxel traversal to walk every cell a ray from the
// viewer to the target passes through. Sight is blocked when the ray crosses
// a boundary that is not `Open` (walls, void edges, closed or locked doors)
// or enters a non-floor cell. When the ray passes exactly through a cell
// corner, either of the two L-shaped crossings being clear is enough.
//
// `visible_cells` tests every floor cell centre within the radius.
//
// See also: `graph.rs` for the boundaries consulted here, `sim.rs` for the
// visibility phase that merges per-unit results.

use crate::graph::Grid;
use crate::types::*;

fn step_clear(grid: &Grid, from: CellCoord, to: CellCoord) -> bool {
    grid.can_traverse(from, to)
}

/// Whether a ray from `from` to `to` reaches the target cell unobstructed.
pub fn has_line_of_sight(grid: &Grid, from: Vec2, to: Vec2) -> bool {
    let start = from.cell();
    let end = to.cell();
    if start == end {
        return true;
    }

    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let step_x = if dx > 0.0 { 1 } else if dx < 0.0 { -1 } else { 0 };
    let step_y = if dy > 0.0 { 1 } else if dy < 0.0 { -1 } else { 0 };

    let t_delta_x = if step_x != 0 { (1.0 / dx).abs() } else { f32::INFINITY };
    let t_delta_y = if step_y != 0 { (1.0 / dy).abs() } else { f32::INFINITY };

    let frac_x = from.x - from.x.floor();
    let frac_y = from.y - from.y.floor();
    let mut t_max_x = match step_x {
        1 => (1.0 - frac_x) * t_delta_x,
        -1 => frac_x * t_delta_x,
        _ => f32::INFINITY,
    };
    let mut t_max_y = match step_y {
        1 => (1.0 - frac_y) * t_delta_y,
        -1 => frac_y * t_delta_y,
        _ => f32::INFINITY,
    };

    let mut cell = start;
    let max_steps = start.manhattan_distance(end) + 2;
    for _ in 0..max_steps {
        if cell == end {
            return true;
        }
        let next_x = CellCoord::new(cell.x + step_x, cell.y);
        let next_y = CellCoord::new(cell.x, cell.y + step_y);
        if (t_max_x - t_max_y).abs() < 1e-6 && step_x != 0 && step_y != 0 {
            let diagonal = CellCoord::new(cell.x + step_x, cell.y + step_y);
            let via_x = step_clear(grid, cell, next_x) && step_clear(grid, next_x, diagonal);
            let via_y = step_clear(grid, cell, next_y) && step_clear(grid, next_y, diagonal);
            if !(via_x || via_y) {
                return false;
            }
            cell = diagonal;
            t_max_x += t_delta_x;
            t_max_y += t_delta_y;
        } else if t_max_x < t_max_y {
            if !step_clear(grid, cell, next_x) {
                return false;
            }
            cell = next_x;
            t_max_x += t_delta_x;
        } else {
            if !step_clear(grid, cell, next_y) {
                return false;
            }
            cell = next_y;
            t_max_y += t_delta_y;
        }
    }
    cell == end
}

/// Floor cells whose centre is within `radius` of `origin` and in sight.
/// Returned in row-major order.
pub fn visible_cells(grid: &Grid, origin: Vec2, radius: f32) -> Vec<CellCoord> {
    let mut out = Vec::new();
    if !grid.is_walkable(origin.cell()) {
        return out;
    }
    let r = radius.ceil() as i32;
    let oc = origin.cell();
    let radius_sq = radius * radius;
    for y in (oc.y - r).max(0)..=(oc.y + r).min(grid.height as i32 - 1) {
        for x in (oc.x - r).max(0)..=(oc.x + r).min(grid.width as i32 - 1) {
            let cell = CellCoord::new(x, y);
            if !grid.is_walkable(cell) {
                continue;
            }
            let centre = cell.center();
            let dx = centre.x - origin.x;
            let dy = centre.y - origin.y;
            if dx * dx + dy * dy <= radius_sq && has_line_of_sight(grid, origin, centre) {
                out.push(cell);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::door::{build_doors, DoorState};
    use crate::config::GameConfig;
    use crate::map::{DoorDef, MapDefinition, WallDef};

    #[test]
    fn open_room_sees_everything_in_radius() {
        let grid = Grid::new(&MapDefinition::rectangle(5, 5));
        let seen = visible_cells(&grid, CellCoord::new(2, 2).center(), 10.0);
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn radius_limits_sight() {
        let grid = Grid::new(&MapDefinition::rectangle(10, 1));
        let seen = visible_cells(&grid, CellCoord::new(0, 0).center(), 3.0);
        assert_eq!(seen.len(), 4, "cells 0..=3: {seen:?}");
    }

    #[test]
    fn wall_blocks_sight() {
        let mut map = MapDefinition::rectangle(4, 1);
        map.walls.push(WallDef { cells: [CellCoord::new(1, 0), CellCoord::new(2, 0)] });
        let grid = Grid::new(&map);
        let eye = CellCoord::new(0, 0).center();
        assert!(has_line_of_sight(&grid, eye, CellCoord::new(1, 0).center()));
        assert!(!has_line_of_sight(&grid, eye, CellCoord::new(3, 0).center()));
    }

    #[test]
    fn opening_door_lets_sight_through() {
        let mut map = MapDefinition::rectangle(3, 1);
        map.doors.push(DoorDef {
            id: DoorId(0),
            cells: [CellCoord::new(0, 0), CellCoord::new(1, 0)],
            locked: false,
        });
        let mut grid = Grid::new(&map);
        let config = GameConfig::default().doors;
        let mut doors = build_doors(&map.doors, &mut grid, &config);
        let eye = CellCoord::new(0, 0).center();
        let far = CellCoord::new(2, 0).center();
        assert!(!has_line_of_sight(&grid, eye, far));

        let door = doors.get_mut(&DoorId(0)).unwrap();
        door.request_open(false, &config);
        assert_eq!(door.state, DoorState::Opening);
        door.sync_boundary(&mut grid);
        assert!(has_line_of_sight(&grid, eye, far));
    }

    #[test]
    fn diagonal_corner_needs_one_clear_route() {
        let mut map = MapDefinition::rectangle(2, 2);
        let grid_open = Grid::new(&map);
        let a = CellCoord::new(0, 0).center();
        let d = CellCoord::new(1, 1).center();
        assert!(has_line_of_sight(&grid_open, a, d));

        map.walls.push(WallDef { cells: [CellCoord::new(0, 0), CellCoord::new(1, 0)] });
        map.walls.push(WallDef { cells: [CellCoord::new(0, 0), CellCoord::new(0, 1)] });
        let grid_closed = Grid::new(&map);
        assert!(!has_line_of_sight(&grid_closed, a, d));
    }
}
