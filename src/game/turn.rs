//! Turn Resolution
//!
//! Applies a turn's full action vector to the world. Slots resolve in
//! ascending order and each action sees the mutations of the slots before
//! it — a sequential-update convention, not a snapshot. Every lockstep
//! participant must resolve identically, so nothing here may consult
//! anything but the world and the vector.

use crate::game::action::{ActionVector, TurnAction};
use crate::game::config::{OtherCells, RuleSet};
use crate::game::world::{Cell, Lifecycle, SlotId, World};

/// Resolve one turn: apply every living generator's action in ascending
/// slot order.
pub fn resolve_turn(world: &mut World, actions: &ActionVector) {
    for slot in SlotId::generators() {
        if world.roster[slot].state.is_alive() {
            apply(world, slot, actions.get(slot));
        }
    }
}

/// Apply a single player's action.
fn apply(world: &mut World, slot: SlotId, action: TurnAction) {
    match action {
        TurnAction::Wait => {}

        TurnAction::Move(dir) => {
            let (dx, dy) = dir.delta();
            let player = world.roster[slot];
            let (tx, ty) = world.grid.step(player.x, player.y, dx, dy);

            // Solid policy: foreign living cells are walls.
            let blocked = world.config.other_cells == OtherCells::Solid
                && matches!(world.grid.get(tx, ty), Cell::Alive(c) if c != slot);
            if !blocked {
                world.roster[slot].x = tx;
                world.roster[slot].y = ty;
            }
        }

        TurnAction::Plant(dir) => {
            let (dx, dy) = dir.delta();
            let player = world.roster[slot];
            let (tx, ty) = world.grid.step(player.x, player.y, dx, dy);

            let economy = world.config.starting_seeds != 0;
            if world.grid.get(tx, ty) == Cell::Empty
                && (!economy || world.seeds[slot.index()] > 0)
            {
                world.grid.set(tx, ty, Cell::Seed(slot));
                if economy {
                    world.seeds[slot.index()] -= 1;
                }
            }
        }

        TurnAction::Harvest => {
            if world.config.rules == RuleSet::Extermination {
                return;
            }
            let player = world.roster[slot];
            let reclaimed = match world.grid.get(player.x, player.y) {
                Cell::Alive(c) if c == slot => {
                    world.scores[slot.index()] -= 1;
                    true
                }
                Cell::Seed(c) if c == slot => true,
                _ => false,
            };
            if reclaimed {
                world.grid.set(player.x, player.y, Cell::Empty);
                if world.seeds[slot.index()] < world.config.max_seeds {
                    world.seeds[slot.index()] += 1;
                }
            }
        }

        TurnAction::Hatch => {
            world.roster[slot].state = Lifecycle::Hatching;
        }

        TurnAction::ToggleStasis => {
            if world.config.rules == RuleSet::Sandbox {
                world.stasis = !world.stasis;
            }
        }

        TurnAction::Quit => {
            world.roster[slot].state = Lifecycle::Dead;
        }
    }
}
