//! The world model the controller drives.
//!
//! [`Stage`] is the seam between coordination and simulation: the
//! controller decides *who* may move what and *when*, the stage knows
//! *how* things move and collide. [`GridStage`] is a small reference
//! world (snakes chasing one target on a bounded grid).

use std::fmt;

use meshplay_protocol::{
    Direction, ElementVector, Location, PlayerConfiguration, PlayerType,
    TargetConfiguration, TargetMode,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::StageConfig;

/// Index of a player within its stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerHandle(pub usize);

impl fmt::Display for PlayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player-{}", self.0)
    }
}

/// Something on the stage that can move and be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    Player(PlayerHandle),
    Target,
}

/// Everything a view needs to draw one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSnapshot {
    pub element: Element,
    pub locations: Vec<Location>,
    pub direction: Option<Direction>,
    pub player_type: Option<PlayerType>,
    pub active: bool,
}

/// World model used by the game controller.
pub trait Stage {
    fn random_direction(&mut self) -> Direction;

    /// `size` free cells. With a direction the cells form a body whose
    /// head comes first and which trails away from `direction`.
    fn random_locations(
        &mut self,
        size: usize,
        direction: Option<Direction>,
    ) -> Vec<Location>;

    /// Places the target, replacing any existing one.
    fn add_target(&mut self, config: &TargetConfiguration);

    fn has_target(&self) -> bool;

    fn add_player(&mut self, config: &PlayerConfiguration) -> PlayerHandle;

    fn player_count(&self) -> usize;

    fn active_player_count(&self) -> usize;

    fn is_active(&self, player: PlayerHandle) -> bool;

    fn direction_of(&self, player: PlayerHandle) -> Option<Direction>;

    fn set_direction(&mut self, player: PlayerHandle, direction: Direction);

    /// Overwrites a player's position verbatim. Empty locations keep the
    /// current body; a missing direction keeps the current heading.
    fn apply_vector(&mut self, player: PlayerHandle, vector: &ElementVector);

    /// Current position of `element` in wire form.
    fn vector_of(&self, element: Element) -> ElementVector;

    fn deactivate(&mut self, player: PlayerHandle);

    fn did_player_crash(&self, player: PlayerHandle) -> bool;

    fn did_player_eat_itself(&self, player: PlayerHandle) -> bool;

    fn did_player_secure_target(&self, player: PlayerHandle) -> bool;

    /// Moves the target to a fresh random spot after a capture. Returns
    /// its new position, or `None` without a target.
    fn secure_target(&mut self) -> Option<ElementVector>;

    /// Moves the target to `locations` verbatim.
    fn set_target_locations(&mut self, locations: Vec<Location>);

    /// Rewards a capture.
    fn grow_player(&mut self, player: PlayerHandle);

    /// Advances one step: the `local` player (if active) and a
    /// self-updating target. Returns what moved, in move order.
    fn advance(&mut self, local: Option<PlayerHandle>) -> Vec<Element>;

    fn snapshot(&self, element: Element) -> Option<ElementSnapshot>;

    fn snapshots(&self) -> Vec<ElementSnapshot> {
        let mut all: Vec<ElementSnapshot> = (0..self.player_count())
            .filter_map(|i| self.snapshot(Element::Player(PlayerHandle(i))))
            .collect();
        all.extend(self.snapshot(Element::Target));
        all
    }
}

// ---------------------------------------------------------------------------
// GridStage
// ---------------------------------------------------------------------------

struct Snake {
    /// Head first.
    body: Vec<Location>,
    direction: Direction,
    player_type: PlayerType,
    active: bool,
    growth: usize,
}

struct Target {
    locations: Vec<Location>,
    mode: TargetMode,
    steps: u32,
}

/// A bounded grid with snakes and one target.
///
/// A player crashes when its head leaves the grid or lands on another
/// active player. Placement is random but seedable.
pub struct GridStage {
    config: StageConfig,
    rng: StdRng,
    players: Vec<Snake>,
    target: Option<Target>,
}

const PLACEMENT_ATTEMPTS: usize = 64;

impl GridStage {
    pub fn new(config: StageConfig) -> Self {
        Self::with_seed(config, rand::rng().random())
    }

    pub fn with_seed(config: StageConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            players: Vec::new(),
            target: None,
        }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    fn in_bounds(&self, location: Location) -> bool {
        (0..self.config.width).contains(&location.x)
            && (0..self.config.height).contains(&location.y)
    }

    fn is_occupied(&self, location: Location) -> bool {
        self.players.iter().any(|p| p.body.contains(&location))
            || self
                .target
                .as_ref()
                .is_some_and(|t| t.locations.contains(&location))
    }

    fn snake(&self, player: PlayerHandle) -> Option<&Snake> {
        self.players.get(player.0)
    }

    fn snake_mut(&mut self, player: PlayerHandle) -> Option<&mut Snake> {
        self.players.get_mut(player.0)
    }

    /// Random coordinate in `0..len`, kept `inset` cells from both edges
    /// when the grid is large enough.
    fn coordinate(&mut self, len: i32, inset: i32) -> i32 {
        if len > inset.saturating_mul(2) {
            self.rng.random_range(inset..len - inset)
        } else {
            self.rng.random_range(0..len.max(1))
        }
    }

    fn layout(&mut self, size: usize, direction: Direction) -> Vec<Location> {
        let inset = i32::try_from(size).unwrap_or(i32::MAX);
        let head = Location::new(
            self.coordinate(self.config.width, inset),
            self.coordinate(self.config.height, inset),
        );
        let mut body = Vec::with_capacity(size);
        let mut cell = head;
        for _ in 0..size {
            body.push(cell);
            cell = cell.step(direction.opposite());
        }
        body
    }

    fn relocate_target(&mut self) -> Option<ElementVector> {
        let size = self.target.as_ref()?.locations.len().max(1);
        let locations = self.random_locations(size, None);
        let target = self.target.as_mut()?;
        target.locations = locations;
        target.steps = 0;
        Some(ElementVector::new(target.locations.clone(), None))
    }
}

impl Stage for GridStage {
    fn random_direction(&mut self) -> Direction {
        Direction::ALL[self.rng.random_range(0..Direction::ALL.len())]
    }

    fn random_locations(
        &mut self,
        size: usize,
        direction: Option<Direction>,
    ) -> Vec<Location> {
        let direction = direction.unwrap_or(Direction::Left);
        let mut body = self.layout(size, direction);
        for _ in 1..PLACEMENT_ATTEMPTS {
            let free = body
                .iter()
                .all(|l| self.in_bounds(*l) && !self.is_occupied(*l));
            if free {
                break;
            }
            body = self.layout(size, direction);
        }
        body
    }

    fn add_target(&mut self, config: &TargetConfiguration) {
        self.target = Some(Target {
            locations: config.locations.clone(),
            mode: config.mode,
            steps: 0,
        });
    }

    fn has_target(&self) -> bool {
        self.target.is_some()
    }

    fn add_player(&mut self, config: &PlayerConfiguration) -> PlayerHandle {
        self.players.push(Snake {
            body: config.locations.clone(),
            direction: config.direction,
            player_type: config.player_type,
            active: true,
            growth: 0,
        });
        PlayerHandle(self.players.len() - 1)
    }

    fn player_count(&self) -> usize {
        self.players.len()
    }

    fn active_player_count(&self) -> usize {
        self.players.iter().filter(|p| p.active).count()
    }

    fn is_active(&self, player: PlayerHandle) -> bool {
        self.snake(player).is_some_and(|p| p.active)
    }

    fn direction_of(&self, player: PlayerHandle) -> Option<Direction> {
        self.snake(player).map(|p| p.direction)
    }

    fn set_direction(&mut self, player: PlayerHandle, direction: Direction) {
        if let Some(snake) = self.snake_mut(player) {
            snake.direction = direction;
        }
    }

    fn apply_vector(&mut self, player: PlayerHandle, vector: &ElementVector) {
        if let Some(snake) = self.snake_mut(player) {
            if !vector.locations.is_empty() {
                snake.body.clone_from(&vector.locations);
            }
            if let Some(direction) = vector.direction {
                snake.direction = direction;
            }
        }
    }

    fn vector_of(&self, element: Element) -> ElementVector {
        match element {
            Element::Player(handle) => self
                .snake(handle)
                .map(|p| ElementVector::new(p.body.clone(), Some(p.direction)))
                .unwrap_or_else(|| ElementVector::new(Vec::new(), None)),
            Element::Target => ElementVector::new(
                self.target
                    .as_ref()
                    .map(|t| t.locations.clone())
                    .unwrap_or_default(),
                None,
            ),
        }
    }

    fn deactivate(&mut self, player: PlayerHandle) {
        if let Some(snake) = self.snake_mut(player) {
            snake.active = false;
        }
    }

    fn did_player_crash(&self, player: PlayerHandle) -> bool {
        let Some(head) = self.snake(player).and_then(|p| p.body.first()) else {
            return false;
        };
        !self.in_bounds(*head)
            || self.players.iter().enumerate().any(|(i, other)| {
                i != player.0 && other.active && other.body.contains(head)
            })
    }

    fn did_player_eat_itself(&self, player: PlayerHandle) -> bool {
        self.snake(player).is_some_and(|p| match p.body.split_first() {
            Some((head, rest)) => rest.contains(head),
            None => false,
        })
    }

    fn did_player_secure_target(&self, player: PlayerHandle) -> bool {
        let (Some(snake), Some(target)) = (self.snake(player), &self.target)
        else {
            return false;
        };
        snake
            .body
            .first()
            .is_some_and(|head| target.locations.contains(head))
    }

    fn secure_target(&mut self) -> Option<ElementVector> {
        self.relocate_target()
    }

    fn set_target_locations(&mut self, locations: Vec<Location>) {
        if let Some(target) = self.target.as_mut() {
            target.locations = locations;
            target.steps = 0;
        }
    }

    fn grow_player(&mut self, player: PlayerHandle) {
        if let Some(snake) = self.snake_mut(player) {
            snake.growth += 1;
        }
    }

    fn advance(&mut self, local: Option<PlayerHandle>) -> Vec<Element> {
        let mut moved = Vec::new();

        if let Some(handle) = local {
            if let Some(snake) = self.snake_mut(handle).filter(|s| s.active) {
                if let Some(head) = snake.body.first().copied() {
                    snake.body.insert(0, head.step(snake.direction));
                    if snake.growth > 0 {
                        snake.growth -= 1;
                    } else {
                        snake.body.pop();
                    }
                    moved.push(Element::Player(handle));
                }
            }
        }

        let relocate_every = self.config.target_relocate_steps;
        let due = match self.target.as_mut() {
            Some(target) if target.mode == TargetMode::SelfUpdate && relocate_every > 0 => {
                target.steps += 1;
                target.steps >= relocate_every
            }
            _ => false,
        };
        if due && self.relocate_target().is_some() {
            moved.push(Element::Target);
        }

        moved
    }

    fn snapshot(&self, element: Element) -> Option<ElementSnapshot> {
        match element {
            Element::Player(handle) => self.snake(handle).map(|p| ElementSnapshot {
                element,
                locations: p.body.clone(),
                direction: Some(p.direction),
                player_type: Some(p.player_type),
                active: p.active,
            }),
            Element::Target => self.target.as_ref().map(|t| ElementSnapshot {
                element,
                locations: t.locations.clone(),
                direction: None,
                player_type: None,
                active: true,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> GridStage {
        GridStage::with_seed(StageConfig::default(), 7)
    }

    fn player_at(
        stage: &mut GridStage,
        cells: &[(i32, i32)],
        direction: Direction,
    ) -> PlayerHandle {
        stage.add_player(&PlayerConfiguration {
            locations: cells.iter().map(|&(x, y)| Location::new(x, y)).collect(),
            direction,
            player_type: PlayerType(0),
        })
    }

    #[test]
    fn test_random_locations_with_direction_trails_behind_head() {
        let mut s = stage();
        let body = s.random_locations(5, Some(Direction::Up));

        assert_eq!(body.len(), 5);
        for pair in body.windows(2) {
            assert_eq!(pair[1], pair[0].step(Direction::Down));
        }
        assert!(body.iter().all(|l| s.in_bounds(*l)));
    }

    #[test]
    fn test_random_locations_same_seed_is_deterministic() {
        let mut a = stage();
        let mut b = stage();
        assert_eq!(
            a.random_locations(5, Some(Direction::Left)),
            b.random_locations(5, Some(Direction::Left))
        );
        assert_eq!(a.random_direction(), b.random_direction());
    }

    #[test]
    fn test_random_locations_avoids_occupied_cells() {
        let mut s = stage();
        for _ in 0..20 {
            let body = s.random_locations(5, Some(Direction::Right));
            assert!(body.iter().all(|l| !s.is_occupied(*l)));
            player_at(
                &mut s,
                &body.iter().map(|l| (l.x, l.y)).collect::<Vec<_>>(),
                Direction::Right,
            );
        }
    }

    #[test]
    fn test_advance_moves_head_and_drops_tail() {
        let mut s = stage();
        let p = player_at(&mut s, &[(5, 5), (4, 5), (3, 5)], Direction::Right);

        let moved = s.advance(Some(p));

        assert_eq!(moved, vec![Element::Player(p)]);
        assert_eq!(
            s.vector_of(Element::Player(p)).locations,
            vec![Location::new(6, 5), Location::new(5, 5), Location::new(4, 5)]
        );
    }

    #[test]
    fn test_advance_after_growth_keeps_tail() {
        let mut s = stage();
        let p = player_at(&mut s, &[(5, 5), (4, 5)], Direction::Right);
        s.grow_player(p);

        s.advance(Some(p));

        assert_eq!(s.vector_of(Element::Player(p)).locations.len(), 3);
    }

    #[test]
    fn test_advance_inactive_player_does_not_move() {
        let mut s = stage();
        let p = player_at(&mut s, &[(5, 5)], Direction::Up);
        s.deactivate(p);

        assert!(s.advance(Some(p)).is_empty());
        assert_eq!(s.active_player_count(), 0);
    }

    #[test]
    fn test_advance_self_updating_target_relocates_when_due() {
        let mut s = GridStage::with_seed(
            StageConfig {
                target_relocate_steps: 2,
                ..StageConfig::default()
            },
            1,
        );
        s.add_target(&TargetConfiguration {
            locations: vec![Location::new(1, 1)],
            mode: TargetMode::SelfUpdate,
        });

        assert!(s.advance(None).is_empty());
        assert_eq!(s.advance(None), vec![Element::Target]);
    }

    #[test]
    fn test_advance_mirrored_target_never_moves() {
        let mut s = GridStage::with_seed(
            StageConfig {
                target_relocate_steps: 1,
                ..StageConfig::default()
            },
            1,
        );
        s.add_target(&TargetConfiguration {
            locations: vec![Location::new(1, 1)],
            mode: TargetMode::NoUpdate,
        });

        assert!(s.advance(None).is_empty());
    }

    #[test]
    fn test_did_player_crash_out_of_bounds() {
        let mut s = stage();
        let p = player_at(&mut s, &[(0, 0), (1, 0)], Direction::Left);
        assert!(!s.did_player_crash(p));

        s.advance(Some(p));

        assert!(s.did_player_crash(p));
    }

    #[test]
    fn test_did_player_crash_into_active_player_only() {
        let mut s = stage();
        let a = player_at(&mut s, &[(5, 5), (4, 5)], Direction::Right);
        let b = player_at(&mut s, &[(6, 4), (6, 5), (6, 6)], Direction::Up);

        s.advance(Some(a));
        assert!(s.did_player_crash(a));

        s.deactivate(b);
        assert!(!s.did_player_crash(a));
    }

    #[test]
    fn test_did_player_eat_itself() {
        let mut s = stage();
        let p = player_at(
            &mut s,
            &[(5, 5), (5, 6), (6, 6), (6, 5), (6, 4)],
            Direction::Right,
        );
        assert!(!s.did_player_eat_itself(p));

        s.advance(Some(p));

        assert!(s.did_player_eat_itself(p));
    }

    #[test]
    fn test_did_player_secure_target_and_secure_relocates() {
        let mut s = stage();
        s.add_target(&TargetConfiguration {
            locations: vec![Location::new(6, 5)],
            mode: TargetMode::NoUpdate,
        });
        let p = player_at(&mut s, &[(5, 5), (4, 5)], Direction::Right);

        s.advance(Some(p));
        assert!(s.did_player_secure_target(p));

        let vector = s.secure_target().unwrap();
        assert_eq!(vector.locations.len(), 1);
        assert!(!s.did_player_secure_target(p));
    }

    #[test]
    fn test_apply_vector_empty_locations_changes_heading_only() {
        let mut s = stage();
        let p = player_at(&mut s, &[(5, 5)], Direction::Right);

        s.apply_vector(p, &ElementVector::heading(Direction::Down));

        assert_eq!(s.direction_of(p), Some(Direction::Down));
        assert_eq!(
            s.vector_of(Element::Player(p)).locations,
            vec![Location::new(5, 5)]
        );
    }

    #[test]
    fn test_snapshots_lists_players_then_target() {
        let mut s = stage();
        player_at(&mut s, &[(5, 5)], Direction::Right);
        s.add_target(&TargetConfiguration {
            locations: vec![Location::new(1, 1)],
            mode: TargetMode::NoUpdate,
        });

        let all = s.snapshots();

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].element, Element::Player(PlayerHandle(0)));
        assert_eq!(all[1].element, Element::Target);
    }
}
