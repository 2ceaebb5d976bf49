//! Lockstep Synchronization
//!
//! Host and client drivers for networked turns. The host is the single
//! serializer: it decides when a turn closes, collects one action byte
//! per client, and publishes the canonical ten-slot vector (reordered per
//! recipient so every mirror keeps itself in slot 1). Clients only ever
//! contribute their own action.
//!
//! Chat rides the same streams as a side channel; frames that arrive
//! while a sync wait is in progress are delivered to the message log and
//! never consumed as sync data. All faults are per-peer: a dead client
//! becomes a quit in the vector, and nothing else stalls.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::game::action::{ActionVector, TurnAction};
use crate::game::world::{Lifecycle, SlotId, World};
use crate::network::peer::{CancelToken, Peer, PeerPoll, WaitOutcome};
use crate::network::protocol::{self, Payload, ProtocolError};
use crate::session::{MessageLog, SessionError};
use crate::MAX_SLOTS;

/// How long the bootstrap handshake waits on any one step.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Map a host-side peer index (0-4) to its roster slot (2-6).
fn peer_slot(index: usize) -> SlotId {
    SlotId::new(index as u8 + 2).expect("peer indices map to slots 2-6")
}

// =============================================================================
// HOST
// =============================================================================

/// The host's view of its remote peers.
pub struct HostSync {
    /// Peer `i` plays roster slot `i + 2`; `None` once dropped.
    peers: Vec<Option<Peer>>,
    /// Action bytes that arrived before the fan-in asked for them.
    early_actions: Vec<Option<u8>>,
}

impl HostSync {
    /// Adopt the accepted connections.
    pub fn new(peers: Vec<Peer>) -> HostSync {
        let early_actions = vec![None; peers.len()];
        HostSync {
            peers: peers.into_iter().map(Some).collect(),
            early_actions,
        }
    }

    /// Living connections.
    pub fn connected(&self) -> usize {
        self.peers.iter().flatten().count()
    }

    /// Run the bootstrap handshake against every peer.
    ///
    /// Sends the rule vector and player count, waits for each `OK`, then
    /// sends every surviving client its reordered starting positions.
    /// Failed peers are dropped and their slots die immediately.
    pub async fn handshake(
        &mut self,
        world: &mut World,
        log: &mut MessageLog,
        cancel: &mut CancelToken,
    ) {
        let rules = protocol::encode_rule_config(&world.config, self.peers.len());
        for peer in self.peers.iter().flatten() {
            peer.send(rules.clone());
        }

        for index in 0..self.peers.len() {
            loop {
                let outcome = match self.peers[index].as_mut() {
                    Some(peer) => peer.recv_timeout(HANDSHAKE_TIMEOUT, cancel).await,
                    None => break,
                };
                match outcome {
                    WaitOutcome::Frame(frame) if frame == protocol::HANDSHAKE_ACK => {
                        debug!("peer {} acknowledged the rules", index);
                        break;
                    }
                    WaitOutcome::Frame(frame) => match protocol::parse_payload(&frame) {
                        // A chat line during the handshake is fine.
                        Payload::Chat(text) => log.push(text),
                        _ => {
                            self.drop_peer(index, world, log, "handshake desync");
                            break;
                        }
                    },
                    WaitOutcome::TimedOut | WaitOutcome::Closed | WaitOutcome::Cancelled => {
                        self.drop_peer(index, world, log, "no handshake response");
                        break;
                    }
                }
            }
        }

        let host_position = {
            let host = world.roster[SlotId::LOCAL];
            (host.x, host.y)
        };
        let client_positions: Vec<(u16, u16)> = (0..self.peers.len())
            .map(|index| {
                let player = world.roster[peer_slot(index)];
                (player.x, player.y)
            })
            .collect();

        for (index, peer) in self.peers.iter().enumerate() {
            if let Some(peer) = peer {
                peer.send(protocol::encode_start_positions(
                    index,
                    host_position,
                    &client_positions,
                ));
            }
        }
    }

    /// Non-blocking poll of every peer during action selection.
    ///
    /// Chat is logged and relayed; ready signals set the slot's flag; a
    /// closed stream is an implicit quit for that slot, within this very
    /// poll cycle.
    pub fn poll(&mut self, world: &mut World, log: &mut MessageLog, ready: &mut [bool; MAX_SLOTS]) {
        let mut events: Vec<(usize, Option<Vec<u8>>)> = Vec::new();
        for (index, entry) in self.peers.iter_mut().enumerate() {
            if let Some(peer) = entry {
                loop {
                    match peer.try_recv() {
                        PeerPoll::NoData => break,
                        PeerPoll::Frame(frame) => events.push((index, Some(frame))),
                        PeerPoll::Closed => {
                            events.push((index, None));
                            break;
                        }
                    }
                }
            }
        }

        for (index, event) in events {
            let slot = peer_slot(index);
            match event {
                None => self.drop_peer(index, world, log, "connection lost"),
                Some(frame) => match protocol::parse_payload(&frame) {
                    Payload::Close => self.drop_peer(index, world, log, "left the game"),
                    Payload::Chat(text) => {
                        log.push(text.clone());
                        self.relay_chat(index, &text);
                    }
                    Payload::TurnReady => {
                        if !ready[slot.index()] {
                            ready[slot.index()] = true;
                            self.announce_ready(slot);
                        }
                    }
                    // An action racing ahead of the fan-in still counts
                    // as ready; keep the byte for later.
                    Payload::Act(byte) => {
                        self.early_actions[index] = Some(byte);
                        if !ready[slot.index()] {
                            ready[slot.index()] = true;
                            self.announce_ready(slot);
                        }
                    }
                    Payload::Ready(_) | Payload::Actions(_) | Payload::Unknown(_) => {
                        debug!("ignoring unexpected payload from peer {index}");
                    }
                },
            }
        }

        // A vanished peer's slot must not hold the turn open.
        for (index, entry) in self.peers.iter().enumerate() {
            if entry.is_none() {
                ready[peer_slot(index).index()] = true;
            }
        }
    }

    /// Close the turn: tell everyone, collect each client's action byte,
    /// build the canonical vector, and publish it per recipient.
    pub async fn finish_turn(
        &mut self,
        world: &mut World,
        log: &mut MessageLog,
        local_action: TurnAction,
        cancel: &mut CancelToken,
    ) -> ActionVector {
        self.broadcast(protocol::encode_turn_ready());

        let net_hang = Duration::from_millis(world.config.net_hang_ms as u64);
        let mut vector = ActionVector::new();
        vector.set(SlotId::LOCAL, local_action);

        for index in 0..self.peers.len() {
            let slot = peer_slot(index);

            // Dead slots answer with a quit so late mirrors agree.
            if world.roster[slot].state == Lifecycle::Dead || self.peers[index].is_none() {
                vector.set(slot, TurnAction::Quit);
                continue;
            }

            if let Some(byte) = self.early_actions[index].take() {
                vector.set(slot, TurnAction::from_byte(byte));
                continue;
            }

            loop {
                let outcome = match self.peers[index].as_mut() {
                    Some(peer) => peer.recv_timeout(net_hang, cancel).await,
                    None => WaitOutcome::Closed,
                };
                match outcome {
                    WaitOutcome::Frame(frame) => match protocol::parse_payload(&frame) {
                        Payload::Act(byte) => {
                            vector.set(slot, TurnAction::from_byte(byte));
                            break;
                        }
                        // Late ready signals are stale; chat is delayed,
                        // not dropped.
                        Payload::TurnReady => {}
                        Payload::Chat(text) => {
                            log.push(text.clone());
                            self.relay_chat(index, &text);
                        }
                        Payload::Close => {
                            self.drop_peer(index, world, log, "left the game");
                            vector.set(slot, TurnAction::Quit);
                            break;
                        }
                        _ => {}
                    },
                    WaitOutcome::TimedOut
                    | WaitOutcome::Closed
                    | WaitOutcome::Cancelled => {
                        self.drop_peer(index, world, log, "no action this turn");
                        vector.set(slot, TurnAction::Quit);
                        break;
                    }
                }
            }
        }

        for (index, peer) in self.peers.iter().enumerate() {
            if let Some(peer) = peer {
                peer.send(protocol::encode_action_vector(peer_slot(index), &vector));
            }
        }

        vector
    }

    /// Send a payload to every connected peer.
    pub fn broadcast(&self, payload: Vec<u8>) {
        for peer in self.peers.iter().flatten() {
            peer.send(payload.clone());
        }
    }

    /// Relay the host's own chat line.
    pub fn broadcast_chat(&self, text: &str) {
        self.broadcast(protocol::encode_chat(text));
    }

    /// Advisory: tell everyone a slot has locked in its action.
    pub fn announce_ready(&self, slot: SlotId) {
        self.broadcast(protocol::encode_ready(slot));
    }

    /// Relay a client's chat line to the other clients.
    fn relay_chat(&self, from: usize, text: &str) {
        let payload = protocol::encode_chat(text);
        for (index, peer) in self.peers.iter().enumerate() {
            if index != from {
                if let Some(peer) = peer {
                    peer.send(payload.clone());
                }
            }
        }
    }

    /// Disconnect a peer and retire its slot. Never touches the others.
    fn drop_peer(&mut self, index: usize, world: &mut World, log: &mut MessageLog, why: &str) {
        if let Some(peer) = self.peers[index].take() {
            let slot = peer_slot(index);
            warn!("peer {} (slot {slot}): {why}", peer.addr());
            log.push(format!("Player {slot} disconnected."));
            if world.roster[slot].state.is_alive() {
                world.roster[slot].state = Lifecycle::Dead;
            }
        }
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// What a client's non-blocking poll learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// Turn still open.
    Waiting,
    /// The host closed the turn; send the action.
    TurnClosed,
    /// The host is gone; the session is over.
    HostLost,
}

/// The joining side of a lockstep session.
pub struct ClientSync {
    host: Peer,
}

impl ClientSync {
    /// Run the joining half of the bootstrap handshake.
    ///
    /// Waits for the rule line, parses it (aborting the join on any
    /// mismatch), and acknowledges with `OK`. Positions follow separately
    /// via [`ClientSync::receive_positions`] once the mirror world
    /// exists.
    pub async fn handshake(
        mut host: Peer,
        log: &mut MessageLog,
        cancel: &mut CancelToken,
    ) -> Result<(ClientSync, crate::game::config::GameConfig, usize), SessionError> {
        loop {
            match host.recv_timeout(HANDSHAKE_TIMEOUT, cancel).await {
                WaitOutcome::Frame(frame) => match protocol::parse_payload(&frame) {
                    Payload::Chat(text) => log.push(text),
                    _ => {
                        let (config, count) = protocol::parse_rule_config(&frame)?;
                        info!("joined a {count}-client session");
                        host.send(protocol::HANDSHAKE_ACK.to_vec());
                        return Ok((ClientSync { host }, config, count));
                    }
                },
                WaitOutcome::TimedOut | WaitOutcome::Closed | WaitOutcome::Cancelled => {
                    return Err(SessionError::HandshakeFailed);
                }
            }
        }
    }

    /// Receive and install this mirror's starting positions (own slot
    /// first, then the rest of the roster in order).
    pub async fn receive_positions(
        &mut self,
        world: &mut World,
        log: &mut MessageLog,
        cancel: &mut CancelToken,
    ) -> Result<(), SessionError> {
        loop {
            match self.host.recv_timeout(HANDSHAKE_TIMEOUT, cancel).await {
                WaitOutcome::Frame(frame) => match protocol::parse_payload(&frame) {
                    Payload::Chat(text) => log.push(text),
                    _ => {
                        let participants = world.rivals + 1;
                        let positions = protocol::parse_start_positions(&frame, participants)?;
                        let (w, h) = (world.grid.width(), world.grid.height());
                        for (offset, (x, y)) in positions.into_iter().enumerate() {
                            let slot = SlotId::new(offset as u8 + 1)
                                .ok_or(ProtocolError::Desync("too many start positions"))?;
                            world.roster[slot].x = x.min(w - 1);
                            world.roster[slot].y = y.min(h - 1);
                        }
                        return Ok(());
                    }
                },
                WaitOutcome::TimedOut | WaitOutcome::Closed | WaitOutcome::Cancelled => {
                    return Err(SessionError::HandshakeFailed);
                }
            }
        }
    }

    /// Tell the host our action is locked in.
    pub fn send_ready(&self) {
        self.host.send(protocol::encode_turn_ready());
    }

    /// Send a chat line up to the host (it relays to the others).
    pub fn send_chat(&self, text: &str) {
        self.host.send(protocol::encode_chat(text));
    }

    /// Non-blocking poll during action selection.
    pub fn poll(&mut self, log: &mut MessageLog) -> ClientStatus {
        loop {
            match self.host.try_recv() {
                PeerPoll::NoData => return ClientStatus::Waiting,
                PeerPoll::Closed => return ClientStatus::HostLost,
                PeerPoll::Frame(frame) => match protocol::parse_payload(&frame) {
                    Payload::Close => return ClientStatus::HostLost,
                    Payload::Chat(text) => log.push(text),
                    Payload::TurnReady => return ClientStatus::TurnClosed,
                    Payload::Ready(slot) => debug!("slot {slot} is ready"),
                    _ => {}
                },
            }
        }
    }

    /// Send our action byte and wait for the host's vector.
    ///
    /// Chat arriving during the wait is logged, never consumed as sync
    /// data. `None` means the host is gone (timeout, close, or cancel).
    pub async fn finish_turn(
        &mut self,
        local_action: TurnAction,
        net_hang: Duration,
        log: &mut MessageLog,
        cancel: &mut CancelToken,
    ) -> Option<ActionVector> {
        self.host
            .send(protocol::encode_act(local_action.to_byte()));

        loop {
            match self.host.recv_timeout(net_hang, cancel).await {
                WaitOutcome::Frame(frame) => match protocol::parse_payload(&frame) {
                    Payload::Actions(bytes) => {
                        return Some(protocol::decode_action_vector(&bytes));
                    }
                    Payload::Chat(text) => log.push(text),
                    Payload::Close => return None,
                    Payload::Ready(_) | Payload::TurnReady => {}
                    _ => {}
                },
                WaitOutcome::TimedOut | WaitOutcome::Closed | WaitOutcome::Cancelled => {
                    return None;
                }
            }
        }
    }
}
