//! Turn Actions
//!
//! The one input each living player contributes per turn, and its
//! single-byte wire encoding. The wire alphabet is the classic roguelike
//! key set, so a captured keystroke is already its own serialization:
//! lowercase direction keys move, uppercase ones plant in that direction,
//! `>` plants in place, space hatches, `,` harvests, `e` toggles stasis,
//! `Q` quits, `.` passes. Unknown bytes decode to a pass, which keeps
//! filler bytes for dead slots harmless.

use serde::{Deserialize, Serialize};

use crate::game::world::SlotId;
use crate::MAX_SLOTS;

/// A step direction, or staying in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dir {
    /// No displacement (used by in-place planting).
    Here,
    /// Up.
    North,
    /// Down.
    South,
    /// Right.
    East,
    /// Left.
    West,
    /// Up-right.
    NorthEast,
    /// Up-left.
    NorthWest,
    /// Down-right.
    SouthEast,
    /// Down-left.
    SouthWest,
}

impl Dir {
    /// Grid delta for this direction.
    #[inline]
    pub fn delta(self) -> (i32, i32) {
        match self {
            Dir::Here => (0, 0),
            Dir::North => (0, -1),
            Dir::South => (0, 1),
            Dir::East => (1, 0),
            Dir::West => (-1, 0),
            Dir::NorthEast => (1, -1),
            Dir::NorthWest => (-1, -1),
            Dir::SouthEast => (1, 1),
            Dir::SouthWest => (-1, 1),
        }
    }
}

/// One player's input for one turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnAction {
    /// Do nothing (explicit pass, or the filler for unresolved players).
    #[default]
    Wait,
    /// Step the generator one cell.
    Move(Dir),
    /// Plant a seed on the adjacent (or current) cell without moving.
    Plant(Dir),
    /// Hatch all of this player's seeds on the next generation.
    Hatch,
    /// Pick the cell under the generator back up as a seed.
    Harvest,
    /// Freeze or thaw the automaton (Sandbox rules only).
    ToggleStasis,
    /// Retire this generator immediately.
    Quit,
}

impl TurnAction {
    /// Encode for the wire.
    pub fn to_byte(self) -> u8 {
        match self {
            TurnAction::Wait => b'.',
            TurnAction::Move(Dir::North) => b'k',
            TurnAction::Move(Dir::South) => b'j',
            TurnAction::Move(Dir::East) => b'l',
            TurnAction::Move(Dir::West) => b'h',
            TurnAction::Move(Dir::NorthEast) => b'u',
            TurnAction::Move(Dir::NorthWest) => b'y',
            TurnAction::Move(Dir::SouthEast) => b'n',
            TurnAction::Move(Dir::SouthWest) => b'b',
            // Moving nowhere is just a pass.
            TurnAction::Move(Dir::Here) => b'.',
            TurnAction::Plant(Dir::North) => b'K',
            TurnAction::Plant(Dir::South) => b'J',
            TurnAction::Plant(Dir::East) => b'L',
            TurnAction::Plant(Dir::West) => b'H',
            TurnAction::Plant(Dir::NorthEast) => b'U',
            TurnAction::Plant(Dir::NorthWest) => b'Y',
            TurnAction::Plant(Dir::SouthEast) => b'N',
            TurnAction::Plant(Dir::SouthWest) => b'B',
            TurnAction::Plant(Dir::Here) => b'>',
            TurnAction::Hatch => b' ',
            TurnAction::Harvest => b',',
            TurnAction::ToggleStasis => b'e',
            TurnAction::Quit => b'Q',
        }
    }

    /// Decode from the wire. Unknown bytes are a pass.
    pub fn from_byte(byte: u8) -> TurnAction {
        match byte {
            b'k' => TurnAction::Move(Dir::North),
            b'j' => TurnAction::Move(Dir::South),
            b'l' => TurnAction::Move(Dir::East),
            b'h' => TurnAction::Move(Dir::West),
            b'u' => TurnAction::Move(Dir::NorthEast),
            b'y' => TurnAction::Move(Dir::NorthWest),
            b'n' => TurnAction::Move(Dir::SouthEast),
            b'b' => TurnAction::Move(Dir::SouthWest),
            b'K' => TurnAction::Plant(Dir::North),
            b'J' => TurnAction::Plant(Dir::South),
            b'L' => TurnAction::Plant(Dir::East),
            b'H' => TurnAction::Plant(Dir::West),
            b'U' => TurnAction::Plant(Dir::NorthEast),
            b'Y' => TurnAction::Plant(Dir::NorthWest),
            b'N' => TurnAction::Plant(Dir::SouthEast),
            b'B' => TurnAction::Plant(Dir::SouthWest),
            b'>' => TurnAction::Plant(Dir::Here),
            b' ' => TurnAction::Hatch,
            b',' => TurnAction::Harvest,
            b'e' => TurnAction::ToggleStasis,
            b'Q' => TurnAction::Quit,
            _ => TurnAction::Wait,
        }
    }
}

/// The canonical per-turn input: one action per roster slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionVector {
    actions: [TurnAction; MAX_SLOTS],
}

impl ActionVector {
    /// A vector of passes.
    pub fn new() -> ActionVector {
        ActionVector::default()
    }

    /// Action assigned to a slot.
    #[inline]
    pub fn get(&self, slot: SlotId) -> TurnAction {
        self.actions[slot.index()]
    }

    /// Assign a slot's action.
    #[inline]
    pub fn set(&mut self, slot: SlotId, action: TurnAction) {
        self.actions[slot.index()] = action;
    }

    /// Encode all ten slots for the wire.
    pub fn to_bytes(&self) -> [u8; MAX_SLOTS] {
        let mut bytes = [0u8; MAX_SLOTS];
        for (dst, action) in bytes.iter_mut().zip(self.actions.iter()) {
            *dst = action.to_byte();
        }
        bytes
    }

    /// Decode a ten-byte wire vector. Returns `None` on a short or long
    /// payload.
    pub fn from_bytes(bytes: &[u8]) -> Option<ActionVector> {
        if bytes.len() != MAX_SLOTS {
            return None;
        }
        let mut actions = [TurnAction::Wait; MAX_SLOTS];
        for (dst, &byte) in actions.iter_mut().zip(bytes) {
            *dst = TurnAction::from_byte(byte);
        }
        Some(ActionVector { actions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ACTIONS: [TurnAction; 22] = [
        TurnAction::Wait,
        TurnAction::Move(Dir::North),
        TurnAction::Move(Dir::South),
        TurnAction::Move(Dir::East),
        TurnAction::Move(Dir::West),
        TurnAction::Move(Dir::NorthEast),
        TurnAction::Move(Dir::NorthWest),
        TurnAction::Move(Dir::SouthEast),
        TurnAction::Move(Dir::SouthWest),
        TurnAction::Plant(Dir::North),
        TurnAction::Plant(Dir::South),
        TurnAction::Plant(Dir::East),
        TurnAction::Plant(Dir::West),
        TurnAction::Plant(Dir::NorthEast),
        TurnAction::Plant(Dir::NorthWest),
        TurnAction::Plant(Dir::SouthEast),
        TurnAction::Plant(Dir::SouthWest),
        TurnAction::Plant(Dir::Here),
        TurnAction::Hatch,
        TurnAction::Harvest,
        TurnAction::ToggleStasis,
        TurnAction::Quit,
    ];

    #[test]
    fn test_byte_roundtrip() {
        for action in ALL_ACTIONS {
            assert_eq!(TurnAction::from_byte(action.to_byte()), action);
        }
    }

    #[test]
    fn test_unknown_bytes_decode_to_wait() {
        assert_eq!(TurnAction::from_byte(0), TurnAction::Wait);
        assert_eq!(TurnAction::from_byte(1), TurnAction::Wait);
        assert_eq!(TurnAction::from_byte(b'z'), TurnAction::Wait);
        assert_eq!(TurnAction::from_byte(0xFF), TurnAction::Wait);
    }

    #[test]
    fn test_deltas_cover_compass() {
        let mut seen = std::collections::HashSet::new();
        for dir in [
            Dir::Here,
            Dir::North,
            Dir::South,
            Dir::East,
            Dir::West,
            Dir::NorthEast,
            Dir::NorthWest,
            Dir::SouthEast,
            Dir::SouthWest,
        ] {
            let (dx, dy) = dir.delta();
            assert!((-1..=1).contains(&dx) && (-1..=1).contains(&dy));
            assert!(seen.insert((dx, dy)), "duplicate delta for {dir:?}");
        }
        assert_eq!(seen.len(), 9);
    }

    #[test]
    fn test_vector_roundtrip() {
        let mut vector = ActionVector::new();
        vector.set(SlotId::LOCAL, TurnAction::Hatch);
        vector.set(SlotId::new(4).unwrap(), TurnAction::Move(Dir::West));
        vector.set(SlotId::new(9).unwrap(), TurnAction::Quit);

        let bytes = vector.to_bytes();
        let decoded = ActionVector::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, vector);
    }

    #[test]
    fn test_vector_rejects_bad_length() {
        assert!(ActionVector::from_bytes(&[b'.'; 9]).is_none());
        assert!(ActionVector::from_bytes(&[b'.'; 11]).is_none());
    }
}
