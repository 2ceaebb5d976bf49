//! # Petri
//!
//! Turn-structured multiplayer variant of Conway's Game of Life: colored
//! generators roam a grid, plant seeds, and hatch them into living cells
//! that evolve under probabilistic, color-aware survival/birth rules.
//! Sessions run locally (hotseat) or over the network in lockstep
//! (host + up to five remote peers).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          PETRI                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State hashing for desync detection        │
//! │                                                              │
//! │  game/           - Game logic (deterministic)                │
//! │  ├── config.rs   - Session tunables and profile I/O          │
//! │  ├── world.rs    - Grid, roster, scores, seed inventories    │
//! │  ├── automaton.rs- One generation of the cellular automaton  │
//! │  ├── action.rs   - Turn actions and their wire codec         │
//! │  ├── turn.rs     - Per-turn action resolution                │
//! │  └── bitmap.rs   - Challenge-bitmap level codec              │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── frame.rs    - ASCII length-prefixed framing             │
//! │  ├── protocol.rs - Payload classes and handshake encoding    │
//! │  └── peer.rs     - Peer transport with non-blocking polls    │
//! │                                                              │
//! │  session/        - Turn orchestration                        │
//! │  ├── mod.rs      - Turn-phase state machine, victory checks  │
//! │  ├── sync.rs     - Host/client lockstep drivers              │
//! │  └── replay.rs   - Round recording and deterministic replay  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are **100% deterministic**:
//! - Fixed slot-order iteration everywhere outcomes depend on order
//! - No system time dependencies
//! - All randomness from a seeded Xorshift128+ stream
//!
//! Every participant in a networked session runs the same simulation; the
//! protocol's only job is to agree on each turn's action vector. Given an
//! identical seed and action history, all mirrors produce **identical
//! state hashes**.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod session;

// Re-export commonly used types
pub use crate::core::rng::GameRng;
pub use game::action::{Dir, TurnAction};
pub use game::config::{GameConfig, GameMode, OtherCells, RuleSet};
pub use game::world::{Cell, Lifecycle, SlotId, World};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of roster slots (slot 0 is the neutral placeholder).
pub const MAX_SLOTS: usize = 10;

/// Maximum live network connections a host accepts.
pub const MAX_REMOTE_PEERS: usize = 5;

/// Cooperative poll period for the turn loop (milliseconds).
pub const POLL_INTERVAL_MS: u64 = 10;

/// Forced turn cadence while a sandbox is frozen (milliseconds).
pub const STASIS_IDLE_MS: u64 = 50;
