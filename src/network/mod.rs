//! Networking
//!
//! The non-deterministic half of the crate. Nothing in here touches the
//! world; the network's entire job is to deliver chat and to get every
//! participant the same action vector for the same turn.
//!
//! - `frame`: ASCII length-prefixed framing over byte streams
//! - `protocol`: payload classes and handshake encoding
//! - `peer`: tokio transport with non-blocking polls and cancellation

pub mod frame;
pub mod peer;
pub mod protocol;
