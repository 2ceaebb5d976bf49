//! Cellular Automaton Step
//!
//! One generation of the color-aware Game of Life. This is the hot path of
//! the lockstep simulation and must be 100% deterministic.
//!
//! The step is two passes over the board plus a roster sweep:
//!
//! 1. **Census**: for every cell, count living neighbors by color from a
//!    fully materialized "before" snapshot into the grid's scratch buffer.
//!    A cell's update never sees another cell's already-updated state.
//! 2. **Update**: one percentage roll per cell, in row-major order,
//!    decides survival or birth against the rulestrings. Survival and
//!    color capture share the single roll; hatching overrides birth.
//! 3. **Settle**: hatching players revert to playing; under the Deadly
//!    policy, players standing on foreign living cells die.

use std::cmp::Ordering;

use crate::game::world::{Cell, Census, Grid, Lifecycle, SlotId, World};
use crate::game::config::OtherCells;
use crate::MAX_SLOTS;

/// The 8-neighborhood, row-major.
const OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Run one generation over the world.
///
/// The caller is responsible for honoring the stasis flag; `advance`
/// itself always steps. Complexity is O(width * height); the result is a
/// pure function of (grid, rulestrings, RNG stream).
pub fn advance(world: &mut World) {
    census(&mut world.grid);
    update_cells(world);
    settle_players(world);
}

/// Pass 1: fill the scratch buffer with each cell's neighbor summary.
fn census(grid: &mut Grid) {
    // Rebuild the scratch if the grid arrived without one (deserialized).
    if grid.scratch.len() != grid.cells.len() {
        grid.scratch.resize(grid.cells.len(), Census::default());
    }

    let (w, h) = (grid.width() as i32, grid.height() as i32);
    for y in 0..h {
        for x in 0..w {
            let mut counts = [0u8; MAX_SLOTS];
            for (dx, dy) in OFFSETS {
                let (nx, ny) = (x + dx, y + dy);
                let (nx, ny) = if grid.wrap() {
                    (nx.rem_euclid(w), ny.rem_euclid(h))
                } else if nx < 0 || nx >= w || ny < 0 || ny >= h {
                    continue;
                } else {
                    (nx, ny)
                };
                if let Cell::Alive(c) = grid.get(nx as u16, ny as u16) {
                    counts[c.index()] += 1;
                }
            }

            // Neutral neighbors count toward the total but never dominate.
            // A tie for the greatest colored count leaves the cell
            // contested: dominant becomes neutral.
            let total: u8 = counts.iter().sum();
            let mut dominant = SlotId::NEUTRAL;
            let mut best = 0u8;
            let mut tied = false;
            for (raw, &count) in counts.iter().enumerate().skip(1) {
                match count.cmp(&best) {
                    Ordering::Greater => {
                        best = count;
                        dominant = SlotId::new(raw as u8).unwrap_or(SlotId::NEUTRAL);
                        tied = false;
                    }
                    Ordering::Equal => tied = true,
                    Ordering::Less => {}
                }
            }
            if tied {
                dominant = SlotId::NEUTRAL;
            }

            let i = grid.idx(x as u16, y as u16);
            grid.scratch[i] = Census { dominant, total };
        }
    }
}

/// Pass 2: one roll per cell against the rulestrings.
fn update_cells(world: &mut World) {
    let World {
        grid,
        rng,
        scores,
        roster,
        config,
        ..
    } = world;

    for i in 0..grid.cells.len() {
        let roll = rng.percent();
        let Census { dominant, total } = grid.scratch[i];
        let t = total as usize;

        match grid.cells[i] {
            Cell::Alive(c) => {
                if roll >= config.survival[t] {
                    scores[c.index()] -= 1;
                    grid.cells[i] = Cell::Empty;
                } else if dominant != SlotId::NEUTRAL && dominant != c {
                    // Captured: the same roll that let it live flips it to
                    // the dominant neighboring color.
                    scores[c.index()] -= 1;
                    scores[dominant.index()] += 1;
                    grid.cells[i] = Cell::Alive(dominant);
                }
            }
            before => {
                let mut now = before;
                if roll < config.birth[t] {
                    now = Cell::Alive(dominant);
                }
                // Hatching is evaluated after birth and wins the cell for
                // the seed's owner regardless of the birth outcome.
                if let Cell::Seed(owner) = before {
                    if roster[owner].state == Lifecycle::Hatching {
                        now = Cell::Alive(owner);
                    }
                }
                if now != before {
                    if let Cell::Alive(b) = now {
                        scores[b.index()] += 1;
                    }
                    grid.cells[i] = now;
                }
            }
        }
    }
}

/// Roster sweep after the board settles.
fn settle_players(world: &mut World) {
    for raw in 0..MAX_SLOTS as u8 {
        let slot = SlotId::new(raw).unwrap_or(SlotId::NEUTRAL);
        let player = world.roster[slot];

        if player.state == Lifecycle::Hatching {
            world.roster[slot].state = Lifecycle::Playing;
        }

        if world.config.other_cells == OtherCells::Deadly
            && world.roster[slot].state == Lifecycle::Playing
        {
            if let Cell::Alive(c) = world.grid.get(player.x, player.y) {
                if c != SlotId::NEUTRAL && c != slot {
                    world.roster[slot].state = Lifecycle::Dead;
                }
            }
        }
    }
}
