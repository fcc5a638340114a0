// The Director: threat accrual and enemy waves.
//
// Simulated time is cut into turns of `turn_duration_ms`. Each completed
// turn raises the threat level by `threat_per_turn` (capped at
// `max_threat`) and spends a point budget on a wave:
//
//   budget = min(floor(threat / threat_per_turn × scaling_factor), wave_cap)
//
// Only enemies whose difficulty the current tier allows are eligible, and
// the composition prefers kinds not yet picked in this wave so that waves
// mix tiers instead of filling up on the cheapest unit. A wave never has
// more enemies than the eligible spawn points can emit
// (`points × spawn_point_capacity`).
//
// Spawn points must sit in a room (never a corridor) and outside the
// squad's starting quadrant. If that filter leaves nothing, the quadrant
// rule is dropped first.
//
// `pre_spawn` replays every turn up to a starting threat level, so a mission
// that starts mid-progression has the same wave history as one that reached
// that threat by stepping.
//
// Separately, `place_starting_force` spends a starting-points budget on
// enemies already roaming the map when the mission begins. They stand on
// room cells (never corridors) outside every squad quadrant, and draw from
// their own PRNG stream so they never shift wave composition. Picks lean
// cheap: 60% the cheapest kinds, 30% mid-cost, 10% the most expensive, each
// falling back to any affordable kind. The Director owns its own PRNG stream for this
// reason: wave composition never depends on how many combat rolls happened.
//
// Commander abilities (global `UseItem`) also route through here:
// `handle_use_item` validates and applies them; `apply_item_effect` is the
// shared effect code used by units as well.
//
// See also: `config.rs` (`DirectorConfig`), `world.rs` for `spawn_enemy`,
// `command_handler.rs` for the global item path.
//
// **Critical constraint: determinism.** Turn accrual only ever follows the
// simulated delta. A zero delta (pause) accrues nothing.

use crate::archetype::{EnemyBehavior, EnemyKind, ItemKind};
use crate::config::GameConfig;
use crate::event::SimEventKind;
use crate::graph::Grid;
use crate::map::MapDefinition;
use crate::prng::GameRng;
use crate::types::*;
use crate::world::{Mine, Turret, World};
use serde::{Deserialize, Serialize};

/// Salt for the Director's PRNG stream.
const DIRECTOR_STREAM: u64 = 0xD1EC_7012;
/// Salt for the starting-force placement stream.
const STARTING_FORCE_STREAM: u64 = 0x57A2_7F0C;

/// One spawned wave, as recorded in the Director's history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaveRecord {
    pub turn: u32,
    pub threat: u32,
    pub budget: u32,
    /// Total difficulty points actually spent.
    pub spent: u32,
    pub spawns: Vec<(EnemyKind, CellCoord)>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Director {
    pub threat_level: u32,
    pub turn: u32,
    pub time_in_turn_ms: u64,
    last_spawned_turn: u32,
    rng: GameRng,
    spawn_points: Vec<CellCoord>,
    pub history: Vec<WaveRecord>,
    /// Enemies placed before the mission started, in placement order.
    #[serde(default)]
    pub starting_force: Vec<(EnemyKind, CellCoord)>,
}

fn quadrant(c: CellCoord, width: u32, height: u32) -> (bool, bool) {
    (c.x * 2 >= width as i32, c.y * 2 >= height as i32)
}

fn squad_quadrants(map: &MapDefinition) -> Vec<(bool, bool)> {
    map.squad_spawns
        .iter()
        .map(|&c| quadrant(c, map.width, map.height))
        .collect()
}

fn in_room(grid: &Grid, c: CellCoord) -> bool {
    grid.room_id(c).is_some_and(|r| !r.starts_with("corridor"))
}

impl Director {
    pub fn new(seed: u64, spawn_points: Vec<CellCoord>) -> Self {
        Self {
            threat_level: 0,
            turn: 0,
            time_in_turn_ms: 0,
            last_spawned_turn: 0,
            rng: GameRng::fork(seed, DIRECTOR_STREAM),
            spawn_points,
            history: Vec::new(),
            starting_force: Vec::new(),
        }
    }

    /// Spawn points a wave may use: walkable, inside a room, and outside
    /// the squad's quadrant when possible. Sorted and deduplicated.
    pub fn eligible_spawn_points(map: &MapDefinition, grid: &Grid) -> Vec<CellCoord> {
        let in_room: Vec<CellCoord> = map
            .spawn_points
            .iter()
            .map(|s| s.pos)
            .filter(|&c| grid.is_walkable(c))
            .filter(|&c| !grid.room_id(c).is_some_and(|r| r.starts_with("corridor")))
            .collect();
        let squad = squad_quadrants(map);
        let mut away: Vec<CellCoord> = in_room
            .iter()
            .copied()
            .filter(|&c| !squad.contains(&quadrant(c, map.width, map.height)))
            .collect();
        if away.is_empty() {
            away = in_room;
        }
        away.sort();
        away.dedup();
        away
    }

    pub fn spawn_points(&self) -> &[CellCoord] {
        &self.spawn_points
    }

    pub fn budget_for(threat: u32, config: &GameConfig) -> u32 {
        let d = &config.director;
        let raw = (threat as f32 / d.threat_per_turn.max(1) as f32 * d.scaling_factor).floor();
        (raw.max(0.0) as u32).min(d.wave_cap)
    }

    /// Highest enemy difficulty the tier ladder allows at `threat`.
    pub fn max_difficulty(threat: u32, config: &GameConfig) -> u32 {
        config
            .director
            .tiers
            .iter()
            .filter(|t| t.min_threat <= threat)
            .map(|t| t.max_difficulty)
            .last()
            .unwrap_or(0)
    }

    /// Fraction of the current turn elapsed, for display.
    pub fn turn_progress(&self, config: &GameConfig) -> f32 {
        self.time_in_turn_ms as f32 / config.director.turn_duration_ms.max(1) as f32
    }

    /// Accrue simulated time; spawn a wave for every completed turn.
    pub fn step(&mut self, dt_ms: u64, world: &mut World, config: &GameConfig) {
        if dt_ms == 0 {
            return;
        }
        self.time_in_turn_ms += dt_ms;
        while self.time_in_turn_ms >= config.director.turn_duration_ms {
            self.time_in_turn_ms -= config.director.turn_duration_ms;
            self.advance_turn(world, config);
        }
    }

    /// Replay turns until threat reaches `threat`. Turns already passed are
    /// never replayed.
    pub fn pre_spawn(&mut self, threat: u32, world: &mut World, config: &GameConfig) {
        let target_turn = threat.min(config.director.max_threat) / config.director.threat_per_turn.max(1);
        while self.turn < target_turn {
            self.advance_turn(world, config);
        }
    }

    /// Spend `points` on enemies placed in rooms away from the squad before
    /// the mission starts. Places nothing when no room cell qualifies.
    pub fn place_starting_force(
        &mut self,
        seed: u64,
        points: u32,
        map: &MapDefinition,
        world: &mut World,
        config: &GameConfig,
    ) {
        let squad = squad_quadrants(map);
        let cells: Vec<CellCoord> = world
            .grid
            .floor_cells()
            .filter(|&c| in_room(&world.grid, c))
            .filter(|&c| !squad.contains(&quadrant(c, map.width, map.height)))
            .collect();
        if points == 0 || cells.is_empty() {
            return;
        }

        let pool: Vec<(EnemyKind, u32)> = config
            .enemies
            .iter()
            .filter(|(_, e)| e.behavior != EnemyBehavior::Stationary && e.difficulty > 0)
            .map(|(k, e)| (*k, e.difficulty))
            .collect();
        let (Some(cheapest), Some(dearest)) = (
            pool.iter().map(|(_, d)| *d).min(),
            pool.iter().map(|(_, d)| *d).max(),
        ) else {
            return;
        };

        let mut rng = GameRng::fork(seed, STARTING_FORCE_STREAM);
        let jitter = config.director.spawn_jitter;
        let mut budget = points;
        loop {
            let affordable: Vec<(EnemyKind, u32)> =
                pool.iter().copied().filter(|(_, d)| *d <= budget).collect();
            if affordable.is_empty() {
                break;
            }
            let roll = rng.next_f32();
            let band: Vec<(EnemyKind, u32)> = affordable
                .iter()
                .copied()
                .filter(|&(_, d)| {
                    if roll < 0.6 {
                        d == cheapest
                    } else if roll < 0.9 {
                        d > cheapest && d < dearest
                    } else {
                        d == dearest
                    }
                })
                .collect();
            let choices = if band.is_empty() { &affordable } else { &band };
            let Some(i) = rng.choose_index(choices.len()) else {
                break;
            };
            let (kind, cost) = choices[i];
            let Some(c) = rng.choose_index(cells.len()) else {
                break;
            };
            let cell = cells[c];
            let mut pos = cell.center();
            if jitter > 0.0 {
                pos.x += rng.range_f32(-jitter, jitter);
                pos.y += rng.range_f32(-jitter, jitter);
            }
            if world.spawn_enemy(kind, pos, config).is_some() {
                self.starting_force.push((kind, cell));
            }
            budget -= cost;
        }
        tracing::info!(
            points,
            enemies = self.starting_force.len(),
            "starting force placed"
        );
    }

    fn advance_turn(&mut self, world: &mut World, config: &GameConfig) {
        self.turn += 1;
        self.threat_level = (self.turn * config.director.threat_per_turn).min(config.director.max_threat);
        world.stats.threat_level = self.threat_level;
        if self.turn > self.last_spawned_turn {
            self.last_spawned_turn = self.turn;
            self.spawn_wave(world, config);
        }
    }

    /// Pick wave contents: random among affordable unlocked kinds,
    /// preferring kinds not yet in this wave.
    fn compose(
        &mut self,
        budget: u32,
        max_difficulty: u32,
        slots: usize,
        config: &GameConfig,
    ) -> Vec<(EnemyKind, u32)> {
        let pool: Vec<(EnemyKind, u32)> = config
            .enemies
            .iter()
            .filter(|(_, e)| e.behavior != EnemyBehavior::Stationary)
            .filter(|(_, e)| e.difficulty > 0 && e.difficulty <= max_difficulty)
            .map(|(k, e)| (*k, e.difficulty))
            .collect();
        let mut picks = Vec::new();
        let mut remaining = budget;
        while remaining > 0 && picks.len() < slots {
            let affordable: Vec<(EnemyKind, u32)> =
                pool.iter().copied().filter(|(_, d)| *d <= remaining).collect();
            let fresh: Vec<(EnemyKind, u32)> = affordable
                .iter()
                .copied()
                .filter(|(k, _)| !picks.iter().any(|(p, _)| p == k))
                .collect();
            let choices = if fresh.is_empty() { &affordable } else { &fresh };
            let Some(i) = self.rng.choose_index(choices.len()) else {
                break;
            };
            let (kind, cost) = choices[i];
            picks.push((kind, cost));
            remaining -= cost;
        }
        picks
    }

    fn spawn_wave(&mut self, world: &mut World, config: &GameConfig) {
        let threat = self.threat_level;
        let budget = Self::budget_for(threat, config);
        let slots = self.spawn_points.len() * config.director.spawn_point_capacity as usize;
        let picks = self.compose(budget, Self::max_difficulty(threat, config), slots, config);

        let mut points = self.spawn_points.clone();
        self.rng.shuffle(&mut points);
        let jitter = config.director.spawn_jitter;
        let mut spawns = Vec::with_capacity(picks.len());
        let mut spent = 0;
        for (i, (kind, cost)) in picks.into_iter().enumerate() {
            let cell = points[i % points.len()];
            let mut pos = cell.center();
            if jitter > 0.0 {
                pos.x += self.rng.range_f32(-jitter, jitter);
                pos.y += self.rng.range_f32(-jitter, jitter);
            }
            if world.spawn_enemy(kind, pos, config).is_some() {
                spawns.push((kind, cell));
                spent += cost;
            }
        }

        tracing::info!(
            turn = self.turn,
            threat,
            budget,
            spent,
            enemies = spawns.len(),
            "wave spawned"
        );
        world.stats.waves_spawned += 1;
        world.emit(SimEventKind::WaveSpawned {
            turn: self.turn,
            threat,
            enemies: spawns.len() as u32,
        });
        self.history.push(WaveRecord {
            turn: self.turn,
            threat,
            budget,
            spent,
            spawns,
        });
    }

    /// Execute a commander ability from the squad inventory (global
    /// `UseItem` with no unit). Returns false, consuming nothing, when the
    /// item cannot be used that way or the target is invalid.
    pub fn handle_use_item(
        &self,
        world: &mut World,
        item: ItemKind,
        target: Option<CellCoord>,
        target_unit: Option<UnitId>,
        config: &GameConfig,
    ) -> bool {
        if !item.supports_global_use() || world.inventory_count(item) == 0 {
            return false;
        }
        let valid = match item {
            ItemKind::FragGrenade => target.is_some_and(|c| world.visible.contains(&c)),
            ItemKind::Scanner => target.is_some_and(|c| world.grid.in_bounds(c)),
            ItemKind::Medkit => target_unit
                .and_then(|id| world.units.get(&id))
                .is_some_and(|u| u.is_active()),
            _ => false,
        };
        if !valid {
            return false;
        }
        world.consume_item(item);
        apply_item_effect(world, item, target, target_unit, None, config);
        world.emit(SimEventKind::ItemUsed { item, by: None });
        true
    }
}

/// Apply one item's effect. `user` is the unit using it, `None` for a
/// commander ability. A unit's medkit always heals the user.
pub fn apply_item_effect(
    world: &mut World,
    item: ItemKind,
    target: Option<CellCoord>,
    target_unit: Option<UnitId>,
    user: Option<UnitId>,
    config: &GameConfig,
) {
    let user_cell = user.and_then(|id| world.units.get(&id)).map(|u| u.cell());
    let place = target.or(user_cell);
    let items = &config.items;
    match item {
        ItemKind::FragGrenade => {
            let Some(cell) = target else {
                return;
            };
            let victims: Vec<EnemyId> = world
                .enemies
                .values()
                .filter(|e| e.is_alive() && e.cell() == cell)
                .map(|e| e.id)
                .collect();
            for enemy in victims {
                world.damage_enemy(enemy, items.grenade_damage, user);
            }
        }
        ItemKind::Scanner => {
            let Some(centre) = place else {
                return;
            };
            let revealed: Vec<CellCoord> = world
                .grid
                .floor_cells()
                .filter(|c| c.center().distance(centre.center()) <= items.scanner_radius)
                .collect();
            world.discovered.extend(revealed);
        }
        ItemKind::Medkit | ItemKind::Stimpack => {
            let amount = if item == ItemKind::Medkit {
                items.medkit_heal
            } else {
                items.stimpack_heal
            };
            if let Some(unit) = user.or(target_unit).and_then(|id| world.units.get_mut(&id)) {
                if unit.is_active() {
                    unit.heal(amount);
                }
            }
        }
        ItemKind::Mine => {
            if let Some(cell) = place.filter(|c| world.grid.is_walkable(*c)) {
                let id = world.ids.mine();
                world.mines.insert(id, Mine { id, cell });
            }
        }
        ItemKind::Sentry => {
            if let Some(cell) = place.filter(|c| world.grid.is_walkable(*c)) {
                let id = world.ids.turret();
                world.turrets.insert(
                    id,
                    Turret {
                        id,
                        pos: cell.center(),
                        last_attack_ms: None,
                    },
                );
            }
        }
        ItemKind::ScrapCrate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::SpawnPointDef;

    fn corridor_world(spawn_points: &[(i32, i32)]) -> (MapDefinition, World) {
        let mut map = MapDefinition::rectangle(10, 4);
        map.squad_spawns = vec![CellCoord::new(0, 0)];
        map.spawn_points = spawn_points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| SpawnPointDef {
                id: i as u32,
                pos: CellCoord::new(x, y),
                radius: 1.0,
            })
            .collect();
        let world = World::new(Grid::new(&map));
        (map, world)
    }

    fn director_for(map: &MapDefinition, world: &World, seed: u64) -> Director {
        Director::new(seed, Director::eligible_spawn_points(map, &world.grid))
    }

    #[test]
    fn first_turn_spawns_one_point_of_enemies() {
        let config = GameConfig::default();
        let (map, mut world) = corridor_world(&[(9, 3)]);
        let mut director = director_for(&map, &world, 42);
        director.step(10_000, &mut world, &config);
        assert_eq!(director.threat_level, 10);
        assert_eq!(director.history.len(), 1);
        assert_eq!(director.history[0].spent, 1);
        assert_eq!(director.history[0].spawns.len(), 1);
        assert_eq!(world.enemies.len(), 1);
        assert_eq!(world.enemies.values().next().unwrap().kind, EnemyKind::XenoMite);
    }

    #[test]
    fn zero_delta_accrues_nothing() {
        let config = GameConfig::default();
        let (map, mut world) = corridor_world(&[(9, 3)]);
        let mut director = director_for(&map, &world, 42);
        for _ in 0..1000 {
            director.step(0, &mut world, &config);
        }
        assert_eq!(director.threat_level, 0);
        assert_eq!(director.time_in_turn_ms, 0);
        assert!(world.enemies.is_empty());
    }

    #[test]
    fn budget_respects_wave_cap() {
        let mut config = GameConfig::default();
        config.director.scaling_factor = 3.0;
        assert_eq!(Director::budget_for(100, &config), config.director.wave_cap);
        assert_eq!(Director::budget_for(30, &config), 9);
        config.director.scaling_factor = 0.5;
        assert_eq!(Director::budget_for(30, &config), 1);
    }

    #[test]
    fn wave_spend_never_exceeds_budget() {
        let mut config = GameConfig::default();
        config.director.scaling_factor = 2.5;
        let (map, mut world) = corridor_world(&[(9, 3), (8, 3), (9, 2), (6, 3)]);
        let mut director = director_for(&map, &world, 9);
        director.pre_spawn(100, &mut world, &config);
        assert_eq!(director.history.len(), 10);
        for wave in &director.history {
            let cap = Director::budget_for(wave.threat, &config);
            assert!(wave.spent <= cap, "wave {wave:?} over budget {cap}");
            let max_tier = Director::max_difficulty(wave.threat, &config);
            for (kind, _) in &wave.spawns {
                assert!(config.enemies[kind].difficulty <= max_tier);
            }
        }
    }

    #[test]
    fn spawn_count_limited_by_capacity() {
        let mut config = GameConfig::default();
        config.director.spawn_point_capacity = 2;
        let (map, mut world) = corridor_world(&[(9, 3)]);
        let mut director = director_for(&map, &world, 1);
        director.pre_spawn(100, &mut world, &config);
        for wave in &director.history {
            assert!(wave.spawns.len() <= 2);
        }
    }

    #[test]
    fn pre_spawn_matches_stepping() {
        let config = GameConfig::default();
        let (map, mut world_a) = corridor_world(&[(9, 3), (7, 2)]);
        let mut a = director_for(&map, &world_a, 77);
        a.pre_spawn(50, &mut world_a, &config);
        // Idempotent: a second call replays nothing.
        a.pre_spawn(50, &mut world_a, &config);

        let (_, mut world_b) = corridor_world(&[(9, 3), (7, 2)]);
        let mut b = director_for(&map, &world_b, 77);
        for _ in 0..5 {
            b.step(10_000, &mut world_b, &config);
        }
        assert_eq!(a.history, b.history);
        assert_eq!(a.threat_level, 50);
        assert_eq!(world_a.enemies.len(), world_b.enemies.len());
    }

    #[test]
    fn spawn_points_avoid_corridors_and_squad_quadrant() {
        let mut map = MapDefinition::rectangle(10, 4);
        map.squad_spawns = vec![CellCoord::new(0, 0)];
        for cell in map.cells.iter_mut().filter(|c| c.y == 3) {
            cell.room_id = Some("corridor-1".into());
        }
        map.spawn_points = [(1, 1), (8, 1), (8, 3)]
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| SpawnPointDef {
                id: i as u32,
                pos: CellCoord::new(x, y),
                radius: 1.0,
            })
            .collect();
        let grid = Grid::new(&map);
        assert_eq!(Director::eligible_spawn_points(&map, &grid), vec![CellCoord::new(8, 1)]);
    }

    #[test]
    fn starting_force_spends_its_points_in_rooms_away_from_the_squad() {
        let config = GameConfig::default();
        let mut map = MapDefinition::rectangle(10, 4);
        map.squad_spawns = vec![CellCoord::new(0, 0)];
        for cell in map.cells.iter_mut().filter(|c| c.y == 3) {
            cell.room_id = Some("corridor-1".into());
        }
        let mut world = World::new(Grid::new(&map));
        let mut director = director_for(&map, &world, 12);
        let wave_stream = director.rng.state();

        director.place_starting_force(12, 10, &map, &mut world, &config);
        let spent: u32 = director
            .starting_force
            .iter()
            .map(|(kind, _)| config.enemies[kind].difficulty)
            .sum();
        assert_eq!(spent, 10);
        assert_eq!(world.enemies.len(), director.starting_force.len());
        for (_, cell) in &director.starting_force {
            assert_ne!(cell.y, 3, "placed in a corridor");
            assert!(cell.x >= 5 || cell.y >= 2, "placed in the squad quadrant: {cell:?}");
        }
        assert!(director.history.is_empty());
        assert_eq!(director.rng.state(), wave_stream);
    }

    #[test]
    fn starting_force_needs_points_and_an_eligible_room() {
        let config = GameConfig::default();
        let (map, mut world) = corridor_world(&[]);
        let mut director = director_for(&map, &world, 4);
        director.place_starting_force(4, 0, &map, &mut world, &config);
        assert!(world.enemies.is_empty());

        let mut hall = MapDefinition::rectangle(10, 4);
        hall.squad_spawns = vec![CellCoord::new(0, 0)];
        for cell in hall.cells.iter_mut() {
            cell.room_id = Some("corridor-main".into());
        }
        let mut world = World::new(Grid::new(&hall));
        director.place_starting_force(4, 20, &hall, &mut world, &config);
        assert!(world.enemies.is_empty());
        assert!(director.starting_force.is_empty());
    }

    #[test]
    fn no_spawn_points_means_empty_waves() {
        let config = GameConfig::default();
        let (map, mut world) = corridor_world(&[]);
        let mut director = director_for(&map, &world, 3);
        director.step(20_000, &mut world, &config);
        assert_eq!(director.threat_level, 20);
        assert!(world.enemies.is_empty());
        assert_eq!(director.history.len(), 2);
    }

    #[test]
    fn global_grenade_needs_a_visible_target() {
        let config = GameConfig::default();
        let (map, mut world) = corridor_world(&[(9, 3)]);
        let director = director_for(&map, &world, 3);
        world.inventory.insert(ItemKind::FragGrenade, 1);
        let cell = CellCoord::new(5, 1);
        let enemy = world.spawn_enemy(EnemyKind::XenoMite, cell.center(), &config).unwrap();
        assert!(!director.handle_use_item(&mut world, ItemKind::FragGrenade, Some(cell), None, &config));
        assert_eq!(world.inventory_count(ItemKind::FragGrenade), 1);

        world.visible.insert(cell);
        assert!(director.handle_use_item(&mut world, ItemKind::FragGrenade, Some(cell), None, &config));
        assert_eq!(world.inventory_count(ItemKind::FragGrenade), 0);
        assert!(!world.enemies[&enemy].is_alive());
        assert_eq!(world.stats.aliens_killed, 1);
    }

    #[test]
    fn mines_and_sentries_cannot_be_thrown_globally() {
        let config = GameConfig::default();
        let (map, mut world) = corridor_world(&[(9, 3)]);
        let director = director_for(&map, &world, 3);
        world.inventory.insert(ItemKind::Mine, 1);
        assert!(!director.handle_use_item(
            &mut world,
            ItemKind::Mine,
            Some(CellCoord::new(1, 1)),
            None,
            &config
        ));
        assert!(world.mines.is_empty());
    }

    #[test]
    fn scanner_reveals_cells_in_radius() {
        let config = GameConfig::default();
        let (map, mut world) = corridor_world(&[(9, 3)]);
        let director = director_for(&map, &world, 3);
        world.inventory.insert(ItemKind::Scanner, 1);
        assert!(director.handle_use_item(
            &mut world,
            ItemKind::Scanner,
            Some(CellCoord::new(9, 3)),
            None,
            &config
        ));
        assert!(world.discovered.contains(&CellCoord::new(9, 3)));
        assert!(world.discovered.contains(&CellCoord::new(5, 3)));
        assert!(!world.discovered.contains(&CellCoord::new(0, 0)));
    }
}
