//! Protocol Messages
//!
//! Payload classes layered over `frame`. Byte 0 of a payload is its class
//! tag: `'c'` is chat, `'!'` is turn synchronization, a decimal digit is a
//! ready announcement, and an empty payload is a peer-initiated close.
//!
//! Turn-sync payloads are disambiguated by length: a bare `'!'` closes the
//! turn, `'!'` plus one byte carries a client's action, and `'!'` plus ten
//! bytes carries the host's consolidated action vector.
//!
//! The bootstrap handshake speaks space-separated decimal text instead:
//! the rule vector plus player count, an `OK` acknowledgment, and each
//! client's starting positions with the recipient's own slot listed
//! first.

use crate::game::action::ActionVector;
use crate::game::config::{GameConfig, RULE_VECTOR_LEN};
use crate::game::world::SlotId;
use crate::{MAX_REMOTE_PEERS, MAX_SLOTS};

/// The literal acknowledgment a client sends after installing the rules.
pub const HANDSHAKE_ACK: &[u8] = b"OK";

/// Errors from malformed protocol data.
///
/// Any of these during the bootstrap aborts the join or host attempt;
/// during a round they are isolated to the offending peer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A handshake line did not parse as expected.
    #[error("handshake desync: {0}")]
    Desync(&'static str),
}

/// A classified in-round payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Empty payload: the peer is leaving.
    Close,
    /// Chat text to display and relay.
    Chat(String),
    /// Host to clients: the turn is closed, send your action.
    TurnReady,
    /// Client to host: my single-byte action.
    Act(u8),
    /// Host to clients: the consolidated ten-slot action vector.
    Actions([u8; MAX_SLOTS]),
    /// Advisory: the named slot has locked in its action this turn.
    Ready(SlotId),
    /// Anything unrecognized; mirrors ignore it.
    Unknown(Vec<u8>),
}

/// Classify a received payload.
pub fn parse_payload(bytes: &[u8]) -> Payload {
    match bytes.first() {
        None => Payload::Close,
        Some(b'c') => Payload::Chat(String::from_utf8_lossy(&bytes[1..]).into_owned()),
        Some(b'!') => match bytes.len() - 1 {
            0 => Payload::TurnReady,
            1 => Payload::Act(bytes[1]),
            MAX_SLOTS => {
                let mut vector = [0u8; MAX_SLOTS];
                vector.copy_from_slice(&bytes[1..]);
                Payload::Actions(vector)
            }
            _ => Payload::Unknown(bytes.to_vec()),
        },
        Some(d @ b'0'..=b'9') => {
            if bytes.len() == 1 {
                match SlotId::new(d - b'0') {
                    Some(slot) => Payload::Ready(slot),
                    None => Payload::Unknown(bytes.to_vec()),
                }
            } else {
                Payload::Unknown(bytes.to_vec())
            }
        }
        Some(_) => Payload::Unknown(bytes.to_vec()),
    }
}

/// Encode a chat line.
pub fn encode_chat(text: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + text.len());
    payload.push(b'c');
    payload.extend_from_slice(text.as_bytes());
    payload
}

/// Encode the turn-closed signal.
pub fn encode_turn_ready() -> Vec<u8> {
    vec![b'!']
}

/// Encode a client's action byte.
pub fn encode_act(action: u8) -> Vec<u8> {
    vec![b'!', action]
}

/// Encode a ready announcement for a slot.
pub fn encode_ready(slot: SlotId) -> Vec<u8> {
    vec![b'0' + slot.as_u8()]
}

/// Encode the host's action vector for one recipient.
///
/// The canonical vector is in host slot order; each recipient's mirror
/// numbers itself slot 1 and the host at the recipient's own host-side
/// slot, so the two positions are swapped per recipient. Pure function of
/// its inputs; the canonical vector is never mutated.
pub fn encode_action_vector(recipient: SlotId, vector: &ActionVector) -> Vec<u8> {
    let mut bytes = vector.to_bytes();
    bytes.swap(1, recipient.index());

    let mut payload = Vec::with_capacity(1 + MAX_SLOTS);
    payload.push(b'!');
    payload.extend_from_slice(&bytes);
    payload
}

/// Decode a received action vector.
pub fn decode_action_vector(bytes: &[u8; MAX_SLOTS]) -> ActionVector {
    ActionVector::from_bytes(bytes).expect("length is fixed by the payload class")
}

// =============================================================================
// BOOTSTRAP HANDSHAKE
// =============================================================================

/// Encode the rule vector and player count a host sends each client.
pub fn encode_rule_config(config: &GameConfig, player_count: usize) -> Vec<u8> {
    let mut text = String::new();
    for value in config.rule_vector() {
        text.push_str(&value.to_string());
        text.push(' ');
    }
    text.push_str(&player_count.to_string());
    text.into_bytes()
}

/// Parse a received rule line into a configuration and player count.
///
/// The line must carry exactly the rule vector plus the count; anything
/// else aborts the join.
pub fn parse_rule_config(bytes: &[u8]) -> Result<(GameConfig, usize), ProtocolError> {
    let text =
        std::str::from_utf8(bytes).map_err(|_| ProtocolError::Desync("rules are not text"))?;
    let values: Vec<i64> = text
        .split_ascii_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| ProtocolError::Desync("rules are not integers"))?;

    if values.len() != RULE_VECTOR_LEN + 1 {
        return Err(ProtocolError::Desync("rule vector has the wrong length"));
    }

    let mut config = GameConfig::default();
    if !config.apply_rule_vector(&values[..RULE_VECTOR_LEN]) {
        return Err(ProtocolError::Desync("rule vector is out of range"));
    }

    let count = values[RULE_VECTOR_LEN];
    if count < 1 || count > MAX_REMOTE_PEERS as i64 {
        return Err(ProtocolError::Desync("impossible player count"));
    }

    Ok((config, count as usize))
}

/// Encode a client's starting positions, its own slot first.
///
/// `recipient` indexes into `client_positions`; the host's position takes
/// the recipient's place in the list so every mirror sees the same board
/// under its own slot numbering.
pub fn encode_start_positions(
    recipient: usize,
    host_position: (u16, u16),
    client_positions: &[(u16, u16)],
) -> Vec<u8> {
    let mut text = String::new();
    let mut push = |(x, y): (u16, u16)| {
        text.push_str(&x.to_string());
        text.push(' ');
        text.push_str(&y.to_string());
        text.push(' ');
    };

    push(client_positions[recipient]);
    for (index, &position) in client_positions.iter().enumerate() {
        if index == recipient {
            push(host_position);
        } else {
            push(position);
        }
    }

    text.into_bytes()
}

/// Parse starting positions for this mirror's generator slots.
///
/// Expects one `(x, y)` pair per participant: self first, then the rest.
pub fn parse_start_positions(
    bytes: &[u8],
    participants: usize,
) -> Result<Vec<(u16, u16)>, ProtocolError> {
    let text =
        std::str::from_utf8(bytes).map_err(|_| ProtocolError::Desync("positions are not text"))?;
    let values: Vec<u16> = text
        .split_ascii_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| ProtocolError::Desync("positions are not integers"))?;

    if values.len() != participants * 2 {
        return Err(ProtocolError::Desync("wrong number of start positions"));
    }

    Ok(values.chunks_exact(2).map(|p| (p[0], p[1])).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::action::TurnAction;

    #[test]
    fn test_payload_classes() {
        assert_eq!(parse_payload(b""), Payload::Close);
        assert_eq!(parse_payload(b"chello"), Payload::Chat("hello".into()));
        assert_eq!(parse_payload(b"!"), Payload::TurnReady);
        assert_eq!(parse_payload(b"!k"), Payload::Act(b'k'));
        assert_eq!(
            parse_payload(b"3"),
            Payload::Ready(SlotId::new(3).unwrap())
        );
        assert!(matches!(parse_payload(b"??"), Payload::Unknown(_)));
        assert!(matches!(parse_payload(b"!toolong"), Payload::Unknown(_)));
    }

    #[test]
    fn test_chat_roundtrip() {
        let payload = encode_chat("all your cells are belong to us");
        assert_eq!(
            parse_payload(&payload),
            Payload::Chat("all your cells are belong to us".into())
        );
    }

    #[test]
    fn test_action_vector_swaps_recipient_into_slot_one() {
        let mut vector = ActionVector::new();
        vector.set(SlotId::LOCAL, TurnAction::Hatch); // host
        vector.set(SlotId::new(3).unwrap(), TurnAction::Harvest); // recipient
        vector.set(SlotId::new(4).unwrap(), TurnAction::Quit);

        let payload = encode_action_vector(SlotId::new(3).unwrap(), &vector);
        let Payload::Actions(bytes) = parse_payload(&payload) else {
            panic!("not an action vector");
        };
        let received = decode_action_vector(&bytes);

        // The recipient sees its own action in slot 1 and the host's in
        // its former slot; everyone else is untouched.
        assert_eq!(received.get(SlotId::LOCAL), TurnAction::Harvest);
        assert_eq!(received.get(SlotId::new(3).unwrap()), TurnAction::Hatch);
        assert_eq!(received.get(SlotId::new(4).unwrap()), TurnAction::Quit);
        assert_eq!(received.get(SlotId::new(2).unwrap()), TurnAction::Wait);
    }

    #[test]
    fn test_action_vector_does_not_mutate_canonical() {
        let mut vector = ActionVector::new();
        vector.set(SlotId::LOCAL, TurnAction::Hatch);
        let before = vector;

        let _ = encode_action_vector(SlotId::new(2).unwrap(), &vector);
        let _ = encode_action_vector(SlotId::new(5).unwrap(), &vector);
        assert_eq!(vector, before);
    }

    #[test]
    fn test_rule_config_roundtrip() {
        let mut config = GameConfig::default();
        config.grid_width = 40;
        config.survival[4] = 55;

        let line = encode_rule_config(&config, 3);
        let (received, count) = parse_rule_config(&line).unwrap();

        assert_eq!(count, 3);
        assert_eq!(received.grid_width, 40);
        assert_eq!(received.survival[4], 55);
        assert_eq!(received.rule_vector(), config.rule_vector());
    }

    #[test]
    fn test_rule_config_rejects_short_line() {
        let config = GameConfig::default();
        let mut line = encode_rule_config(&config, 2);
        line.truncate(line.len() / 2);
        assert!(parse_rule_config(&line).is_err());
    }

    #[test]
    fn test_rule_config_rejects_garbage() {
        assert!(parse_rule_config(b"not numbers at all").is_err());
        assert!(parse_rule_config(b"").is_err());
    }

    #[test]
    fn test_rule_config_rejects_bad_count() {
        let config = GameConfig::default();
        let mut line = String::from_utf8(encode_rule_config(&config, 1)).unwrap();
        line.truncate(line.rfind(' ').unwrap() + 1);
        line.push('9');
        assert!(parse_rule_config(line.as_bytes()).is_err());
    }

    #[test]
    fn test_start_positions_recipient_first() {
        let clients = [(3, 4), (7, 8), (1, 2)];
        let host = (9, 9);

        // Recipient 1 sees: self, client 0, host (in its place), client 2.
        let line = encode_start_positions(1, host, &clients);
        let positions = parse_start_positions(&line, 4).unwrap();
        assert_eq!(positions, vec![(7, 8), (3, 4), (9, 9), (1, 2)]);
    }

    #[test]
    fn test_start_positions_reject_short() {
        let line = encode_start_positions(0, (0, 0), &[(1, 1)]);
        assert!(parse_start_positions(&line, 3).is_err());
        assert!(parse_start_positions(b"1 2 x", 1).is_err());
    }
}
