// Continuous movement along a cell path.
//
// Units and enemies both walk the same way: toward the centre of the next
// cell in their path, spending a per-tick distance budget of
// `speed * dt / 1000` cells. Before stepping into a new cell the boundary
// between the two cells is checked against the live grid. A closed door
// stops the walker (`BlockedByDoor`) so it can request passage; a wall or
// void edge invalidates the path (`Blocked`).
//
// See also: `sim.rs` movement phase, `door.rs` for how a request turns into
// an open boundary.

use crate::graph::{BoundaryType, Grid};
use crate::types::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The path is exhausted; the walker stands on its final cell centre.
    Arrived,
    /// Budget spent with path remaining.
    Moving,
    BlockedByDoor(DoorId),
    /// The next step crosses an impassable boundary; the path was cleared.
    Blocked,
}

/// Advance `pos` along `path` by at most `budget` cells. Reached cells are
/// removed from the front of `path`. Returns distance covered and outcome.
pub fn advance_along_path(
    pos: &mut Vec2,
    path: &mut Vec<CellCoord>,
    budget: f32,
    grid: &Grid,
) -> (f32, StepOutcome) {
    let mut remaining = budget;
    let mut covered = 0.0;
    while let Some(&next) = path.first() {
        let here = pos.cell();
        if next != here {
            if here.manhattan_distance(next) != 1 {
                path.clear();
                return (covered, StepOutcome::Blocked);
            }
            if !grid.can_traverse(here, next) {
                let door = grid
                    .boundary_between(here, next)
                    .filter(|b| b.kind == BoundaryType::Door)
                    .and_then(|b| b.door_id);
                return match door {
                    Some(id) => (covered, StepOutcome::BlockedByDoor(id)),
                    None => {
                        path.clear();
                        (covered, StepOutcome::Blocked)
                    }
                };
            }
        }
        if remaining <= 0.0 {
            return (covered, StepOutcome::Moving);
        }
        let (new_pos, reached) = pos.step_toward(next.center(), remaining);
        let step = pos.distance(new_pos);
        remaining -= step;
        covered += step;
        *pos = new_pos;
        if reached {
            path.remove(0);
        } else {
            return (covered, StepOutcome::Moving);
        }
    }
    (covered, StepOutcome::Arrived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{DoorDef, MapDefinition, WallDef};

    #[test]
    fn walks_budget_worth_of_cells() {
        let grid = Grid::new(&MapDefinition::rectangle(10, 1));
        let mut pos = CellCoord::new(0, 0).center();
        let mut path: Vec<_> = (1..10).map(|x| CellCoord::new(x, 0)).collect();
        let (covered, outcome) = advance_along_path(&mut pos, &mut path, 2.5, &grid);
        assert_eq!(outcome, StepOutcome::Moving);
        assert!((covered - 2.5).abs() < 1e-4);
        assert!((pos.x - 3.0).abs() < 1e-4);
        assert_eq!(path.first(), Some(&CellCoord::new(3, 0)));
    }

    #[test]
    fn arrives_and_empties_path() {
        let grid = Grid::new(&MapDefinition::rectangle(3, 1));
        let mut pos = CellCoord::new(0, 0).center();
        let mut path = vec![CellCoord::new(1, 0), CellCoord::new(2, 0)];
        let (_, outcome) = advance_along_path(&mut pos, &mut path, 10.0, &grid);
        assert_eq!(outcome, StepOutcome::Arrived);
        assert!(path.is_empty());
        assert_eq!(pos, CellCoord::new(2, 0).center());
    }

    #[test]
    fn closed_door_stops_walker_at_the_edge() {
        let mut map = MapDefinition::rectangle(3, 1);
        map.doors.push(DoorDef {
            id: DoorId(4),
            cells: [CellCoord::new(1, 0), CellCoord::new(2, 0)],
            locked: false,
        });
        let grid = Grid::new(&map);
        let mut pos = CellCoord::new(0, 0).center();
        let mut path = vec![CellCoord::new(1, 0), CellCoord::new(2, 0)];
        let (_, outcome) = advance_along_path(&mut pos, &mut path, 10.0, &grid);
        assert_eq!(outcome, StepOutcome::BlockedByDoor(DoorId(4)));
        assert_eq!(pos.cell(), CellCoord::new(1, 0));
        assert_eq!(path, vec![CellCoord::new(2, 0)]);
    }

    #[test]
    fn wall_invalidates_path() {
        let mut map = MapDefinition::rectangle(2, 1);
        map.walls.push(WallDef { cells: [CellCoord::new(0, 0), CellCoord::new(1, 0)] });
        let grid = Grid::new(&map);
        let mut pos = CellCoord::new(0, 0).center();
        let mut path = vec![CellCoord::new(1, 0)];
        let (covered, outcome) = advance_along_path(&mut pos, &mut path, 1.0, &grid);
        assert_eq!(outcome, StepOutcome::Blocked);
        assert_eq!(covered, 0.0);
        assert!(path.is_empty());
    }
}
