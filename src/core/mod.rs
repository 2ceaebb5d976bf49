//! Deterministic Core Primitives
//!
//! Shared building blocks for the deterministic simulation:
//! - `rng`: Seeded Xorshift128+ random number generation
//! - `hash`: SHA-256 state hashing for desync detection and replays

pub mod hash;
pub mod rng;
