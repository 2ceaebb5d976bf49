//! Message Framing
//!
//! Every message on the wire is a 4-ASCII-digit, zero-padded decimal
//! length prefix followed by exactly that many payload bytes — no
//! delimiter. The prefix caps payloads at 9999 bytes, far above anything
//! this protocol sends (the largest frame is a handshake line).
//!
//! A clean end-of-stream before a prefix is a graceful close; an
//! end-of-stream inside a frame, or a prefix that is not four digits, is
//! a protocol error. The distinction matters: a close ends a peer's
//! participation quietly, a desync aborts the join.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD: usize = 9999;

/// Length of the decimal prefix.
pub const PREFIX_LEN: usize = 4;

/// Errors from reading or writing a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The peer closed the stream between frames.
    #[error("peer closed the connection")]
    Closed,

    /// The length prefix was not four decimal digits.
    #[error("invalid length prefix {0:?}")]
    BadPrefix([u8; PREFIX_LEN]),

    /// The stream ended inside a frame.
    #[error("frame truncated mid-payload")]
    Truncated,

    /// The payload does not fit the four-digit prefix.
    #[error("payload too large: {0} bytes (max {MAX_PAYLOAD})")]
    Oversize(usize),

    /// Transport failure.
    #[error("frame i/o: {0}")]
    Io(#[from] io::Error),
}

/// Render a payload length as the four-digit prefix.
pub fn encode_prefix(len: usize) -> Option<[u8; PREFIX_LEN]> {
    if len > MAX_PAYLOAD {
        return None;
    }
    let mut prefix = [0u8; PREFIX_LEN];
    let mut value = len;
    for slot in prefix.iter_mut().rev() {
        *slot = b'0' + (value % 10) as u8;
        value /= 10;
    }
    Some(prefix)
}

/// Parse a four-digit prefix back into a payload length.
///
/// Rejects anything that is not exactly four ASCII digits.
pub fn parse_prefix(prefix: &[u8; PREFIX_LEN]) -> Option<usize> {
    let mut len = 0usize;
    for &byte in prefix {
        if !byte.is_ascii_digit() {
            return None;
        }
        len = len * 10 + (byte - b'0') as usize;
    }
    Some(len)
}

/// Frame a payload into a standalone buffer.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let prefix = encode_prefix(payload.len()).ok_or(FrameError::Oversize(payload.len()))?;
    let mut frame = Vec::with_capacity(PREFIX_LEN + payload.len());
    frame.extend_from_slice(&prefix);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Write one framed payload.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed payload.
///
/// Returns [`FrameError::Closed`] only when the stream ends cleanly
/// between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
        Err(e) => return Err(e.into()),
    }

    let len = parse_prefix(&prefix).ok_or(FrameError::BadPrefix(prefix))?;

    let mut payload = vec![0u8; len];
    match reader.read_exact(&mut payload).await {
        Ok(_) => Ok(payload),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FrameError::Truncated),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_prefix_examples() {
        assert_eq!(encode_prefix(0), Some(*b"0000"));
        assert_eq!(encode_prefix(7), Some(*b"0007"));
        assert_eq!(encode_prefix(42), Some(*b"0042"));
        assert_eq!(encode_prefix(9999), Some(*b"9999"));
        assert_eq!(encode_prefix(10_000), None);
    }

    #[test]
    fn test_prefix_rejects_non_digits() {
        assert_eq!(parse_prefix(b"12a4"), None);
        assert_eq!(parse_prefix(b"-123"), None);
        assert_eq!(parse_prefix(b"12 4"), None);
        assert_eq!(parse_prefix(&[0, 0, 0, 0]), None);
    }

    proptest! {
        #[test]
        fn prop_prefix_roundtrip(len in 0usize..=9999) {
            let prefix = encode_prefix(len).unwrap();
            prop_assert_eq!(parse_prefix(&prefix), Some(len));
        }

        #[test]
        fn prop_frame_roundtrip(payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let frame = encode_frame(&payload).unwrap();
            let prefix = encode_prefix(payload.len()).unwrap();
            prop_assert_eq!(&frame[..PREFIX_LEN], &prefix[..]);
            prop_assert_eq!(&frame[PREFIX_LEN..], &payload[..]);
        }
    }

    #[tokio::test]
    async fn test_async_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(4096);

        write_frame(&mut a, b"hello, lockstep").await.unwrap();
        write_frame(&mut a, b"").await.unwrap();
        write_frame(&mut a, &[b'!'; 11]).await.unwrap();

        assert_eq!(read_frame(&mut b).await.unwrap(), b"hello, lockstep");
        assert_eq!(read_frame(&mut b).await.unwrap(), b"");
        assert_eq!(read_frame(&mut b).await.unwrap(), vec![b'!'; 11]);
    }

    #[tokio::test]
    async fn test_clean_close_between_frames() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, b"last words").await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b).await.unwrap(), b"last words");
        assert!(matches!(read_frame(&mut b).await, Err(FrameError::Closed)));
    }

    #[tokio::test]
    async fn test_truncation_mid_frame() {
        let (mut a, mut b) = tokio::io::duplex(64);
        use tokio::io::AsyncWriteExt;
        a.write_all(b"0042only half of it").await.unwrap();
        drop(a);

        assert!(matches!(read_frame(&mut b).await, Err(FrameError::Truncated)));
    }

    #[tokio::test]
    async fn test_bad_prefix_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        use tokio::io::AsyncWriteExt;
        a.write_all(b"12x4whatever").await.unwrap();

        assert!(matches!(
            read_frame(&mut b).await,
            Err(FrameError::BadPrefix(_))
        ));
    }
}
