//! Round Recording and Replay
//!
//! A round is fully determined by its starting RNG state, configuration,
//! and the per-turn action vectors, so that is all a recording keeps. A
//! replay reconstructs the round turn by turn and can be checked against
//! the recorded final state hash.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::hash::StateHash;
use crate::game::action::ActionVector;
use crate::game::automaton::advance;
use crate::game::config::{GameConfig, GameMode};
use crate::game::turn::resolve_turn;
use crate::game::world::{World, WorldError};
use crate::session::{check_victory, Verdict};
use crate::MAX_SLOTS;

/// Everything needed to reproduce one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecording {
    /// RNG state the round started from.
    pub rng_state: [u64; 2],
    /// Rules the round ran under.
    pub config: GameConfig,
    /// Mode the round ran in.
    pub mode: GameMode,
    /// Rival generator count.
    pub rivals: usize,
    /// Resolved action vectors, one per turn, in wire form.
    pub turns: Vec<[u8; MAX_SLOTS]>,
    /// World hash after the final recorded turn.
    pub final_hash: StateHash,
}

/// Errors from loading a recording.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// File I/O failed.
    #[error("recording i/o: {0}")]
    Io(#[from] io::Error),

    /// The file is not a usable recording.
    #[error("recording is corrupt: {0}")]
    Corrupt(#[from] bincode::Error),

    /// The recorded world could not be allocated.
    #[error(transparent)]
    World(#[from] WorldError),
}

impl RoundRecording {
    /// Start an empty recording for a freshly dealt round.
    ///
    /// `rng_state` must be the RNG state from just *before* the round was
    /// dealt — the replay re-deals the round from it. Challenge rounds
    /// start from a bitmap rather than the RNG and are not replayable.
    pub fn begin(rng_state: [u64; 2], world: &World) -> RoundRecording {
        RoundRecording {
            rng_state,
            config: world.config.clone(),
            mode: world.mode,
            rivals: world.rivals,
            turns: Vec::new(),
            final_hash: [0; 32],
        }
    }

    /// Append a resolved turn.
    pub fn push_turn(&mut self, vector: &ActionVector) {
        self.turns.push(vector.to_bytes());
    }

    /// Stamp the final state.
    pub fn finish(&mut self, world: &World) {
        self.final_hash = world.state_hash();
    }

    /// Persist as a compact binary file.
    pub fn save(&self, path: &Path) -> Result<(), ReplayError> {
        let bytes = bincode::serialize(self)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Load a recording from disk.
    pub fn load(path: &Path) -> Result<RoundRecording, ReplayError> {
        let bytes = fs::read(path)?;
        Ok(bincode::deserialize(&bytes)?)
    }
}

/// Re-run a recorded round and return the resulting world.
///
/// Follows the orchestrator's exact turn sequence: resolve the vector,
/// step the automaton unless frozen, then apply the victory rules. The
/// replay stops early if a victory ends the round, exactly as the live
/// session did.
pub fn replay(recording: &RoundRecording) -> Result<World, ReplayError> {
    let mut world = World::new(
        recording.config.clone(),
        recording.mode,
        recording.rivals,
        0,
    )?;
    world.rng.set_state(recording.rng_state);
    world.start_round();

    for turn in &recording.turns {
        let vector = ActionVector::from_bytes(turn).unwrap_or_default();
        resolve_turn(&mut world, &vector);
        if !world.stasis {
            advance(&mut world);
            world.generation += 1;
        }
        if check_victory(&mut world) != Verdict::Continue {
            break;
        }
    }

    Ok(world)
}

/// Does the recording replay to its recorded final hash?
pub fn verify(recording: &RoundRecording) -> Result<bool, ReplayError> {
    let world = replay(recording)?;
    Ok(world.state_hash() == recording.final_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::action::{Dir, TurnAction};
    use crate::game::world::SlotId;

    fn scripted_round() -> (RoundRecording, World) {
        let config = GameConfig {
            grid_width: 10,
            grid_height: 10,
            noise: true,
            generation_limit: 0,
            ..GameConfig::default()
        };
        let mut world = World::new(config, GameMode::Hotseat, 2, 321).unwrap();
        let start_state = world.rng.state();
        world.start_round();
        let mut recording = RoundRecording::begin(start_state, &world);

        let script = [
            TurnAction::Plant(Dir::Here),
            TurnAction::Move(Dir::East),
            TurnAction::Hatch,
            TurnAction::Plant(Dir::North),
            TurnAction::Harvest,
            TurnAction::Move(Dir::SouthWest),
        ];
        for (i, &action) in script.iter().enumerate() {
            let mut vector = ActionVector::new();
            vector.set(SlotId::LOCAL, action);
            vector.set(
                SlotId::new(2).unwrap(),
                script[(i + 1) % script.len()],
            );
            recording.push_turn(&vector);
            resolve_turn(&mut world, &vector);
            if !world.stasis {
                advance(&mut world);
                world.generation += 1;
            }
            if check_victory(&mut world) != Verdict::Continue {
                break;
            }
        }
        recording.finish(&world);
        (recording, world)
    }

    #[test]
    fn test_replay_reproduces_final_state() {
        let (recording, live) = scripted_round();
        let replayed = replay(&recording).unwrap();
        assert_eq!(replayed.state_hash(), live.state_hash());
        assert!(verify(&recording).unwrap());
    }

    #[test]
    fn test_tampered_recording_fails_verification() {
        let (mut recording, _) = scripted_round();
        recording.turns[2] = [b'Q'; MAX_SLOTS];
        assert!(!verify(&recording).unwrap());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = std::env::temp_dir().join("petri-replay-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("round.replay");

        let (recording, _) = scripted_round();
        recording.save(&path).unwrap();
        let loaded = RoundRecording::load(&path).unwrap();

        assert_eq!(loaded.turns, recording.turns);
        assert_eq!(loaded.final_hash, recording.final_hash);
        assert!(verify(&loaded).unwrap());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = std::env::temp_dir().join("petri-replay-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("garbage.replay");
        std::fs::write(&path, b"\xFF\xFF\xFF\xFF not a recording").unwrap();
        assert!(RoundRecording::load(&path).is_err());
    }
}
