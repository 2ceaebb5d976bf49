//! World State Definitions
//!
//! The grid, the player roster, and the per-color bookkeeping that the
//! automaton and turn resolver mutate. One `World` is the single source of
//! truth for a session; the network layer never touches it directly.
//!
//! Invariant: outside of `automaton::advance`, `scores[c]` equals the
//! number of `Alive(c)` cells on the grid, for every color `c`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

use crate::core::hash::{StateHash, StateHasher};
use crate::core::rng::GameRng;
use crate::game::config::{GameConfig, GameMode};
use crate::MAX_SLOTS;

// =============================================================================
// SLOT ID
// =============================================================================

/// Identifier of a roster slot and, equivalently, of a cell color.
///
/// Slot 0 is the neutral color: contested cells and noise belong to it and
/// no generator ever does. Slot 1 is the local player; slots 2-9 are the
/// other generators.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SlotId(u8);

impl SlotId {
    /// The neutral color; owns contested and noise cells.
    pub const NEUTRAL: SlotId = SlotId(0);

    /// The local player's slot.
    pub const LOCAL: SlotId = SlotId(1);

    /// Highest valid slot number.
    pub const MAX: u8 = 9;

    /// Create a slot id, rejecting out-of-range values.
    pub fn new(raw: u8) -> Option<SlotId> {
        (raw <= Self::MAX).then_some(SlotId(raw))
    }

    /// Raw slot number.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Slot number as an array index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterate every slot in ascending order.
    pub fn all() -> impl Iterator<Item = SlotId> {
        (0..MAX_SLOTS as u8).map(SlotId)
    }

    /// Iterate the generator slots (1-9) in ascending order.
    pub fn generators() -> impl Iterator<Item = SlotId> {
        (1..MAX_SLOTS as u8).map(SlotId)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// CELL
// =============================================================================

/// One grid position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    /// Nothing here.
    #[default]
    Empty,
    /// A planted seed, not yet alive.
    Seed(SlotId),
    /// A living cell.
    Alive(SlotId),
}

impl Cell {
    /// Color of the cell, if it has one.
    #[inline]
    pub fn color(self) -> Option<SlotId> {
        match self {
            Cell::Empty => None,
            Cell::Seed(c) | Cell::Alive(c) => Some(c),
        }
    }

    /// Is this a living cell?
    #[inline]
    pub fn is_alive(self) -> bool {
        matches!(self, Cell::Alive(_))
    }

    /// Is this a seed?
    #[inline]
    pub fn is_seed(self) -> bool {
        matches!(self, Cell::Seed(_))
    }
}

// =============================================================================
// PLAYERS
// =============================================================================

/// Lifecycle state of a roster slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Slot is unused this round.
    #[default]
    Absent,
    /// Generator existed but is gone (quit, attrition, disconnect).
    Dead,
    /// Taking turns normally.
    Playing,
    /// Will hatch all of its seeds on the next generation.
    Hatching,
}

impl Lifecycle {
    /// Playing or hatching.
    #[inline]
    pub fn is_alive(self) -> bool {
        matches!(self, Lifecycle::Playing | Lifecycle::Hatching)
    }
}

/// One generator on the board.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Player {
    /// Lifecycle state.
    pub state: Lifecycle,
    /// Column of the generator.
    pub x: u16,
    /// Row of the generator.
    pub y: u16,
}

/// The ten-slot player roster, indexed by [`SlotId`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Roster {
    players: [Player; MAX_SLOTS],
}

impl Roster {
    /// Iterate `(slot, player)` pairs in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &Player)> {
        self.players
            .iter()
            .enumerate()
            .map(|(i, p)| (SlotId(i as u8), p))
    }

    /// Number of slots whose generator is still alive.
    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|p| p.state.is_alive()).count()
    }
}

impl Index<SlotId> for Roster {
    type Output = Player;

    fn index(&self, slot: SlotId) -> &Player {
        &self.players[slot.index()]
    }
}

impl IndexMut<SlotId> for Roster {
    fn index_mut(&mut self, slot: SlotId) -> &mut Player {
        &mut self.players[slot.index()]
    }
}

// =============================================================================
// GRID
// =============================================================================

/// Errors from sizing the world.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The cell buffers could not be allocated. The round is aborted and
    /// no partial state is kept.
    #[error("cannot allocate a {width}x{height} grid")]
    AllocationFailure {
        /// Requested width.
        width: u16,
        /// Requested height.
        height: u16,
    },
}

/// Per-cell neighbor census, filled during a generation step.
///
/// Lives in the grid's scratch buffer; contents are meaningful only inside
/// one `advance` call.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub(crate) struct Census {
    /// Color with the strictly greatest neighbor count; neutral on a tie.
    pub dominant: SlotId,
    /// Total living neighbors of any color.
    pub total: u8,
}

/// The board: a width x height array of cells.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Grid {
    width: u16,
    height: u16,
    wrap: bool,
    pub(crate) cells: Vec<Cell>,
    /// Neighbor-census scratch, same length as `cells`.
    #[serde(skip)]
    pub(crate) scratch: Vec<Census>,
}

impl Grid {
    /// Allocate an empty grid.
    pub fn new(width: u16, height: u16, wrap: bool) -> Result<Grid, WorldError> {
        let len = width as usize * height as usize;
        let oom = |_| WorldError::AllocationFailure { width, height };

        let mut cells = Vec::new();
        cells.try_reserve_exact(len).map_err(oom)?;
        cells.resize(len, Cell::Empty);

        let mut scratch = Vec::new();
        scratch.try_reserve_exact(len).map_err(oom)?;
        scratch.resize(len, Census::default());

        Ok(Grid {
            width,
            height,
            wrap,
            cells,
            scratch,
        })
    }

    /// Grid width in cells.
    #[inline]
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Grid height in cells.
    #[inline]
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Toroidal adjacency?
    #[inline]
    pub fn wrap(&self) -> bool {
        self.wrap
    }

    /// Total number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True for a zero-area grid (cannot happen through `new`).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Flat index of a coordinate.
    #[inline]
    pub(crate) fn idx(&self, x: u16, y: u16) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Cell at a coordinate.
    #[inline]
    pub fn get(&self, x: u16, y: u16) -> Cell {
        self.cells[self.idx(x, y)]
    }

    /// Replace the cell at a coordinate.
    #[inline]
    pub fn set(&mut self, x: u16, y: u16, cell: Cell) {
        let i = self.idx(x, y);
        self.cells[i] = cell;
    }

    /// Destination of a one-cell step from `(x, y)`.
    ///
    /// Wrapped grids map across the edges; bounded grids cancel the
    /// offending axis independently, leaving the other intact.
    pub fn step(&self, x: u16, y: u16, dx: i32, dy: i32) -> (u16, u16) {
        let (w, h) = (self.width as i32, self.height as i32);
        let (mut nx, mut ny) = (x as i32 + dx, y as i32 + dy);

        if self.wrap {
            nx = nx.rem_euclid(w);
            ny = ny.rem_euclid(h);
        } else {
            if nx < 0 || nx >= w {
                nx = x as i32;
            }
            if ny < 0 || ny >= h {
                ny = y as i32;
            }
        }

        (nx as u16, ny as u16)
    }
}

// =============================================================================
// WORLD
// =============================================================================

/// Complete deterministic state of a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct World {
    /// Rule parameters for the round.
    pub config: GameConfig,
    /// Active game mode.
    pub mode: GameMode,
    /// Generators besides the local player (0-8).
    pub rivals: usize,
    /// The board.
    pub grid: Grid,
    /// The ten-slot roster.
    pub roster: Roster,
    /// Living-cell counts per color. Mirrors the grid at all times
    /// outside the atomic generation step.
    pub scores: [u32; MAX_SLOTS],
    /// Seed inventory per slot.
    pub seeds: [u32; MAX_SLOTS],
    /// Generation counter, reset each round.
    pub generation: u32,
    /// Automaton freeze flag (Sandbox rules only).
    pub stasis: bool,
    /// Display color per slot (terminal palette index).
    pub colors: [u8; MAX_SLOTS],
    /// The session's deterministic randomness stream.
    pub rng: GameRng,
}

impl World {
    /// Build a fresh world. The grid starts empty; call
    /// [`World::start_round`] to populate it.
    pub fn new(
        config: GameConfig,
        mode: GameMode,
        rivals: usize,
        seed: u64,
    ) -> Result<World, WorldError> {
        let grid = Grid::new(config.grid_width, config.grid_height, config.grid_wrap)?;
        Ok(World {
            config,
            mode,
            rivals: rivals.min(8),
            grid,
            roster: Roster::default(),
            scores: [0; MAX_SLOTS],
            seeds: [0; MAX_SLOTS],
            generation: 0,
            stasis: false,
            colors: [0; MAX_SLOTS],
            rng: GameRng::new(seed),
        })
    }

    /// Reset the world for a new round.
    ///
    /// Clears the board and counters, deals display colors, revives the
    /// roster, refills seed inventories, re-randomizes generator
    /// positions, and populates the board for the mode: scattered rival
    /// colonies in Conquest, neutral noise when the option is on.
    pub fn start_round(&mut self) {
        self.generation = 0;
        self.scores = [0; MAX_SLOTS];
        self.seeds = [self.config.starting_seeds; MAX_SLOTS];
        self.roster = Roster::default();
        self.grid.cells.fill(Cell::Empty);
        self.stasis = false;

        // Deal display colors: white for neutral, the configured color for
        // the local player, distinct random colors for slots 2-6.
        self.colors = [0; MAX_SLOTS];
        self.colors[0] = 7;
        self.colors[1] = self.config.player_color;
        let mut dealt = 2;
        while dealt < 7 {
            let c = (self.rng.next_int(6) + 1) as u8;
            if !self.colors[..dealt].contains(&c) {
                self.colors[dealt] = c;
                dealt += 1;
            }
        }

        // Revive the roster. Rival generators only act for themselves in
        // the multiplayer modes; in Conquest/Challenge their colonies play
        // without an avatar.
        self.roster[SlotId::LOCAL].state = Lifecycle::Playing;
        for i in 0..self.rivals.min(8) {
            let slot = SlotId(i as u8 + 2);
            self.roster[slot].state = if self.mode.is_multiplayer() {
                Lifecycle::Playing
            } else {
                Lifecycle::Dead
            };
        }

        // Scatter rival colonies across a Conquest board.
        if self.mode == GameMode::Conquest && self.rivals > 0 {
            for i in 0..self.grid.len() {
                if self.rng.next_float() < 0.20 {
                    let owner = SlotId(self.rng.next_int(self.rivals as u32) as u8 + 2);
                    self.grid.cells[i] = Cell::Alive(owner);
                    self.scores[owner.index()] += 1;
                }
            }
        }

        // Neutral noise, except on authored Challenge boards.
        if self.mode != GameMode::Challenge && self.config.noise {
            for i in 0..self.grid.len() {
                if self.grid.cells[i] == Cell::Empty && self.rng.next_float() < 0.20 {
                    self.grid.cells[i] = Cell::Alive(SlotId::NEUTRAL);
                    self.scores[0] += 1;
                }
            }
        }

        // Fresh positions for every present generator.
        let (w, h) = (self.grid.width() as u32, self.grid.height() as u32);
        for i in 0..=self.rivals.min(8) {
            let slot = SlotId(i as u8 + 1);
            self.roster[slot].x = self.rng.next_int(w) as u16;
            self.roster[slot].y = self.rng.next_int(h) as u16;
        }
    }

    /// Count living cells per color by scanning the grid.
    ///
    /// `scores` must equal this everywhere outside the generation step;
    /// tests verify the invariant with it.
    pub fn live_counts(&self) -> [u32; MAX_SLOTS] {
        let mut counts = [0u32; MAX_SLOTS];
        for cell in &self.grid.cells {
            if let Cell::Alive(c) = cell {
                counts[c.index()] += 1;
            }
        }
        counts
    }

    /// Deterministic digest of the simulation state.
    ///
    /// Two lockstep mirrors that have resolved the same turns must produce
    /// identical hashes; a mismatch means desync.
    pub fn state_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_world_state();
        hasher.update_u16(self.grid.width());
        hasher.update_u16(self.grid.height());
        hasher.update_bool(self.grid.wrap());
        for cell in &self.grid.cells {
            match cell {
                Cell::Empty => hasher.update_u8(0),
                Cell::Seed(c) => {
                    hasher.update_u8(1);
                    hasher.update_u8(c.as_u8());
                }
                Cell::Alive(c) => {
                    hasher.update_u8(2);
                    hasher.update_u8(c.as_u8());
                }
            }
        }
        for (_, player) in self.roster.iter() {
            hasher.update_u8(player.state as u8);
            hasher.update_u16(player.x);
            hasher.update_u16(player.y);
        }
        for &score in &self.scores {
            hasher.update_u32(score);
        }
        for &seeds in &self.seeds {
            hasher.update_u32(seeds);
        }
        hasher.update_u32(self.generation);
        hasher.update_bool(self.stasis);
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::RuleSet;

    fn test_config() -> GameConfig {
        GameConfig {
            grid_width: 12,
            grid_height: 9,
            ..GameConfig::default()
        }
    }

    #[test]
    fn test_grid_step_wrap() {
        let grid = Grid::new(10, 8, true).unwrap();
        assert_eq!(grid.step(0, 0, -1, 0), (9, 0));
        assert_eq!(grid.step(9, 7, 1, 1), (0, 0));
        assert_eq!(grid.step(5, 0, 0, -1), (5, 7));
    }

    #[test]
    fn test_grid_step_bounded_clamps_axes_independently() {
        let grid = Grid::new(10, 8, false).unwrap();
        assert_eq!(grid.step(0, 0, -1, 0), (0, 0));
        assert_eq!(grid.step(0, 3, -1, 1), (0, 4));
        assert_eq!(grid.step(9, 7, 1, 1), (9, 7));
        assert_eq!(grid.step(4, 4, 1, -1), (5, 3));
    }

    #[test]
    fn test_start_round_multiplayer_roster() {
        let mut world = World::new(test_config(), GameMode::Hotseat, 3, 7).unwrap();
        world.start_round();

        assert_eq!(world.roster[SlotId::LOCAL].state, Lifecycle::Playing);
        for raw in 2..=4 {
            let slot = SlotId::new(raw).unwrap();
            assert_eq!(world.roster[slot].state, Lifecycle::Playing);
        }
        assert_eq!(world.roster[SlotId::new(5).unwrap()].state, Lifecycle::Absent);
        assert_eq!(world.roster.alive_count(), 4);
    }

    #[test]
    fn test_start_round_conquest_rivals_have_no_avatar() {
        let mut world = World::new(test_config(), GameMode::Conquest, 2, 99).unwrap();
        world.start_round();

        assert_eq!(world.roster[SlotId::new(2).unwrap()].state, Lifecycle::Dead);
        assert_eq!(world.roster[SlotId::new(3).unwrap()].state, Lifecycle::Dead);

        // Scattered colonies belong to rival slots only, and the score
        // table matches the board.
        assert_eq!(world.scores, world.live_counts());
        assert_eq!(world.scores[0], 0);
        assert_eq!(world.scores[1], 0);
        assert!(world.scores[2] + world.scores[3] > 0, "scatter left the board empty");
    }

    #[test]
    fn test_start_round_noise_is_neutral() {
        let mut config = test_config();
        config.noise = true;
        let mut world = World::new(config, GameMode::Hotseat, 1, 5).unwrap();
        world.start_round();

        assert!(world.scores[0] > 0, "no noise scattered");
        assert_eq!(world.scores, world.live_counts());
    }

    #[test]
    fn test_start_round_deals_distinct_colors() {
        let mut world = World::new(test_config(), GameMode::Hotseat, 5, 3).unwrap();
        world.start_round();

        assert_eq!(world.colors[0], 7);
        assert_eq!(world.colors[1], world.config.player_color);
        for i in 2..7 {
            assert!((1..=6).contains(&world.colors[i]));
            for j in 2..i {
                assert_ne!(world.colors[i], world.colors[j]);
            }
        }
    }

    #[test]
    fn test_positions_rerandomized_each_round() {
        let mut world = World::new(test_config(), GameMode::Hotseat, 4, 1234).unwrap();
        world.start_round();
        let first: Vec<(u16, u16)> = SlotId::generators()
            .map(|s| (world.roster[s].x, world.roster[s].y))
            .collect();
        world.start_round();
        let second: Vec<(u16, u16)> = SlotId::generators()
            .map(|s| (world.roster[s].x, world.roster[s].y))
            .collect();
        assert_ne!(first, second);
    }

    #[test]
    fn test_state_hash_tracks_mutation() {
        let mut world = World::new(test_config(), GameMode::Hotseat, 1, 42).unwrap();
        world.start_round();

        let before = world.state_hash();
        world.grid.set(3, 3, Cell::Seed(SlotId::LOCAL));
        let after = world.state_hash();
        assert_ne!(before, after);
    }

    #[test]
    fn test_worlds_from_same_seed_match() {
        let mut a = World::new(test_config(), GameMode::Conquest, 3, 77).unwrap();
        let mut b = World::new(test_config(), GameMode::Conquest, 3, 77).unwrap();
        a.start_round();
        b.start_round();
        assert_eq!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_sandbox_round_starts_unfrozen() {
        let mut config = test_config();
        config.rules = RuleSet::Sandbox;
        let mut world = World::new(config, GameMode::Hotseat, 1, 8).unwrap();
        world.stasis = true;
        world.start_round();
        assert!(!world.stasis);
    }
}
