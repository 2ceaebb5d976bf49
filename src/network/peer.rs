//! Peer Transport
//!
//! One `Peer` per remote participant: a connected TCP stream split into a
//! reader task and a writer task, bridged to the single-threaded session
//! loop over channels. The session polls with [`Peer::try_recv`] (never
//! blocks, reports "no data yet" and "connection closed" distinctly) or
//! waits with [`Peer::recv_timeout`] (bounded, cancellable).
//!
//! Faults are isolated per peer: a stream error surfaces as that peer's
//! `Closed` event and nothing else. Dropping a `Peer` sends the protocol's
//! empty goodbye frame before the socket closes.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::network::frame::{read_frame, write_frame, FrameError};

// =============================================================================
// CANCELLATION
// =============================================================================

/// Create a linked cancel source/token pair.
///
/// Every blocking wait in the session takes a token; firing the source
/// (the user's cancel key, session teardown) resolves those waits with a
/// distinct `Cancelled` outcome.
pub fn cancellation() -> (CancelSource, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSource { tx }, CancelToken { rx })
}

/// The firing half of a cancellation pair.
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    /// Resolve every wait holding a matching token.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// A cancellation token; cheap to clone, one per waiting site.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Has the source fired (or been dropped)?
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancelled. A dropped source counts as cancelled so no
    /// wait can outlive its session.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

// =============================================================================
// PEER
// =============================================================================

/// Outcome of a non-blocking poll.
#[derive(Debug, PartialEq, Eq)]
pub enum PeerPoll {
    /// Nothing waiting; try again next tick.
    NoData,
    /// One framed payload.
    Frame(Vec<u8>),
    /// The stream is gone (clean close, goodbye frame, or hard error).
    Closed,
}

/// Outcome of a bounded wait.
#[derive(Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// One framed payload.
    Frame(Vec<u8>),
    /// The stream is gone.
    Closed,
    /// The bound elapsed; not an error.
    TimedOut,
    /// The wait was cancelled by the user or session teardown.
    Cancelled,
}

enum PeerEvent {
    Frame(Vec<u8>),
    Closed,
}

/// A connected remote participant.
pub struct Peer {
    addr: SocketAddr,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    incoming: mpsc::UnboundedReceiver<PeerEvent>,
    closed: bool,
}

impl Peer {
    /// Wrap a connected stream in reader/writer tasks.
    pub fn spawn(stream: TcpStream) -> Peer {
        let addr = stream
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        tokio::spawn(read_loop(read_half, incoming_tx, addr));
        tokio::spawn(write_loop(write_half, outgoing_rx));

        Peer {
            addr,
            outgoing: outgoing_tx,
            incoming: incoming_rx,
            closed: false,
        }
    }

    /// Remote address, for logs.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue a payload for delivery. Best-effort: a dead stream is
    /// reported by the next receive, never here.
    pub fn send(&self, payload: Vec<u8>) {
        let _ = self.outgoing.send(payload);
    }

    /// Has this peer's stream closed?
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Non-blocking poll for the next frame.
    pub fn try_recv(&mut self) -> PeerPoll {
        if self.closed {
            return PeerPoll::Closed;
        }
        match self.incoming.try_recv() {
            Ok(PeerEvent::Frame(frame)) => PeerPoll::Frame(frame),
            Ok(PeerEvent::Closed) => {
                self.closed = true;
                PeerPoll::Closed
            }
            Err(mpsc::error::TryRecvError::Empty) => PeerPoll::NoData,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.closed = true;
                PeerPoll::Closed
            }
        }
    }

    /// Bounded, cancellable wait for the next frame.
    pub async fn recv_timeout(&mut self, timeout: Duration, cancel: &mut CancelToken) -> WaitOutcome {
        if self.closed {
            return WaitOutcome::Closed;
        }
        tokio::select! {
            event = self.incoming.recv() => match event {
                Some(PeerEvent::Frame(frame)) => WaitOutcome::Frame(frame),
                Some(PeerEvent::Closed) | None => {
                    self.closed = true;
                    WaitOutcome::Closed
                }
            },
            _ = tokio::time::sleep(timeout) => WaitOutcome::TimedOut,
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
        }
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<PeerEvent>,
    addr: SocketAddr,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(payload) => {
                if events.send(PeerEvent::Frame(payload)).is_err() {
                    return;
                }
            }
            Err(FrameError::Closed) => {
                debug!(%addr, "peer closed its stream");
                let _ = events.send(PeerEvent::Closed);
                return;
            }
            Err(e) => {
                // Hard errors and malformed frames both end this peer's
                // participation; nobody else is affected.
                warn!(%addr, "peer stream failed: {e}");
                let _ = events.send(PeerEvent::Closed);
                return;
            }
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(payload) = outgoing.recv().await {
        if let Err(e) = write_frame(&mut writer, &payload).await {
            debug!("peer write failed: {e}");
            return;
        }
    }
    // Peer handle dropped: announce the close before the socket goes.
    let _ = write_frame(&mut writer, &[]).await;
}

// =============================================================================
// CONNECTING
// =============================================================================

/// Bind the host's listening socket.
pub async fn host_listen(port: u16) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept peers until the table is full or the wait is cancelled
/// (the host pressing "start" is a cancellation, not an error).
pub async fn accept_peers(
    listener: &TcpListener,
    max: usize,
    cancel: &mut CancelToken,
) -> Vec<Peer> {
    let mut peers = Vec::new();
    while peers.len() < max {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    info!("peer {} joined ({}/{})", addr, peers.len() + 1, max);
                    peers.push(Peer::spawn(stream));
                }
                Err(e) => warn!("accept failed: {e}"),
            },
            _ = cancel.cancelled() => break,
        }
    }
    peers
}

/// Connect to a host.
pub async fn connect(host: &str, port: u16) -> io::Result<Peer> {
    let stream = TcpStream::connect((host, port)).await?;
    info!("connected to {}:{}", host, port);
    Ok(Peer::spawn(stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn local_pair() -> (Peer, Peer) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            Peer::spawn(TcpStream::connect(addr).await.unwrap())
        });
        let (stream, _) = listener.accept().await.unwrap();
        let server_side = Peer::spawn(stream);
        (server_side, client.await.unwrap())
    }

    #[tokio::test]
    async fn test_frames_cross_both_ways() {
        let (mut host, mut client) = local_pair().await;
        let (_, mut cancel) = cancellation();

        client.send(b"!k".to_vec());
        host.send(b"chello".to_vec());

        let up = host.recv_timeout(Duration::from_secs(2), &mut cancel).await;
        assert_eq!(up, WaitOutcome::Frame(b"!k".to_vec()));

        let down = client.recv_timeout(Duration::from_secs(2), &mut cancel).await;
        assert_eq!(down, WaitOutcome::Frame(b"chello".to_vec()));
    }

    #[tokio::test]
    async fn test_try_recv_distinguishes_empty_from_closed() {
        let (mut host, client) = local_pair().await;

        assert_eq!(host.try_recv(), PeerPoll::NoData);

        drop(client);
        let (_, mut cancel) = cancellation();
        // The goodbye frame arrives first, then the close.
        match host.recv_timeout(Duration::from_secs(2), &mut cancel).await {
            WaitOutcome::Frame(payload) => assert!(payload.is_empty()),
            WaitOutcome::Closed => return,
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            host.recv_timeout(Duration::from_secs(2), &mut cancel).await,
            WaitOutcome::Closed
        );
        assert_eq!(host.try_recv(), PeerPoll::Closed);
    }

    #[tokio::test]
    async fn test_recv_timeout_times_out() {
        let (mut host, _client) = local_pair().await;
        let (_, mut cancel) = cancellation();

        let outcome = host
            .recv_timeout(Duration::from_millis(30), &mut cancel)
            .await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_cancel_resolves_wait() {
        let (mut host, _client) = local_pair().await;
        let (source, mut cancel) = cancellation();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            source.cancel();
        });

        let outcome = host.recv_timeout(Duration::from_secs(5), &mut cancel).await;
        assert_eq!(outcome, WaitOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_accept_respects_cancellation() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let (source, mut cancel) = cancellation();
        source.cancel();

        let peers = accept_peers(&listener, 5, &mut cancel).await;
        assert!(peers.is_empty());
    }

    #[tokio::test]
    async fn test_accept_collects_up_to_max() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_source, mut cancel) = cancellation();

        let dialers = tokio::spawn(async move {
            let mut held = Vec::new();
            for _ in 0..2 {
                held.push(TcpStream::connect(addr).await.unwrap());
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
            held
        });

        let peers = accept_peers(&listener, 2, &mut cancel).await;
        assert_eq!(peers.len(), 2);
        dialers.await.unwrap();
    }
}
