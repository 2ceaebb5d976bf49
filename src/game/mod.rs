//! Deterministic Game Logic
//!
//! Everything in this module is part of the lockstep-mirrored simulation:
//! given the same configuration, RNG seed, and per-turn action vectors,
//! every participant computes identical state.
//!
//! - `config`: session tunables, validation, profile I/O
//! - `world`: grid, roster, scores, seed inventories
//! - `automaton`: one generation of the cellular automaton
//! - `action`: turn actions and their single-byte wire codec
//! - `turn`: per-turn action resolution
//! - `bitmap`: challenge-level bitmap codec

pub mod action;
pub mod automaton;
pub mod bitmap;
pub mod config;
pub mod turn;
pub mod world;
