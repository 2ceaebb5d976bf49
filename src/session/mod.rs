//! Session Orchestration
//!
//! The per-turn loop that gathers every participant's action, resolves the
//! turn, steps the automaton, and applies the victory rules — the same
//! sequence whether the participants share a keyboard or a network.
//!
//! A turn moves through explicit phases:
//!
//! ```text
//! SelectingAction -> TurnReady -> Resolving -> CheckingVictory
//!        ^                                          |
//!        └──────────────── next turn ───────────────┘ -> RoundOver
//! ```
//!
//! `SelectingAction` closes when every living player has an action, when
//! the configured timeout elapses, or on the stasis idle tick (a short
//! forced cadence that keeps a frozen sandbox responsive for chat). The
//! world is mutated only in `Resolving` and `CheckingVictory`; the
//! network layer never touches it.

pub mod replay;
pub mod sync;

use std::collections::VecDeque;
use std::io::Write;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::game::action::{ActionVector, TurnAction};
use crate::game::automaton::advance;
use crate::game::bitmap::{self, BitmapError};
use crate::game::config::{GameMode, RuleSet};
use crate::game::turn::resolve_turn;
use crate::game::world::{Lifecycle, SlotId, World, WorldError};
use crate::network::peer::{cancellation, CancelSource, CancelToken, Peer};
use crate::network::protocol::ProtocolError;
use crate::session::replay::RoundRecording;
use crate::session::sync::{ClientStatus, ClientSync, HostSync};
use crate::{MAX_SLOTS, POLL_INTERVAL_MS, STASIS_IDLE_MS};

// =============================================================================
// ERRORS
// =============================================================================

/// Failures that abort a session or a join attempt.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The world could not be allocated.
    #[error(transparent)]
    World(#[from] WorldError),

    /// A challenge bitmap failed to load.
    #[error(transparent)]
    Bitmap(#[from] BitmapError),

    /// Handshake data did not parse.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The host never completed the bootstrap handshake.
    #[error("the host did not complete the handshake")]
    HandshakeFailed,
}

// =============================================================================
// MESSAGE LOG
// =============================================================================

/// Bounded circular buffer of player-facing notices, optionally teed to a
/// timestamped file on disk.
#[derive(Default)]
pub struct MessageLog {
    messages: VecDeque<String>,
    file: Option<std::fs::File>,
}

impl MessageLog {
    /// Notices kept before the oldest is dropped.
    pub const CAPACITY: usize = 100;

    /// An empty log.
    pub fn new() -> MessageLog {
        MessageLog::default()
    }

    /// Append a notice, evicting the oldest past capacity.
    pub fn push(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!(notice = %text, "session notice");
        if let Some(file) = self.file.as_mut() {
            let _ = writeln!(file, "{text}");
        }
        if self.messages.len() == Self::CAPACITY {
            self.messages.pop_front();
        }
        self.messages.push_back(text);
    }

    /// The most recent notices, newest last.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &str> {
        let skip = self.messages.len().saturating_sub(count);
        self.messages.iter().skip(skip).map(String::as_str)
    }

    /// Is the log teeing to a file?
    pub fn is_logging_to_file(&self) -> bool {
        self.file.is_some()
    }

    /// Toggle the on-disk tee. Opening failure is reported in the log
    /// itself, never fatal.
    pub fn toggle_file(&mut self) {
        if self.file.take().is_some() {
            self.push("Logging has stopped.");
            return;
        }
        let name = format!("log{}.txt", chrono::Utc::now().timestamp());
        match std::fs::File::create(&name) {
            Ok(file) => {
                self.file = Some(file);
                self.push(format!("Now logging to {name}!"));
            }
            Err(_) => self.push("Could not open the logfile."),
        }
    }
}

// =============================================================================
// FRONTEND PORT
// =============================================================================

/// A command from the local terminal.
///
/// Rendering and menus live outside this crate; the session only needs a
/// non-blocking command source and somewhere to hand the world for
/// drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalCommand {
    /// The current player's action for this turn.
    Act(TurnAction),
    /// A chat line to show and, in netplay, relay.
    Chat(String),
    /// Save the board as a bitmap (challenge palette when set).
    SaveSnapshot {
        /// Color by slot id so the file loads back as a level.
        challenge: bool,
    },
    /// Toggle the notice log's file tee.
    ToggleLogFile,
    /// Abandon the session.
    EndSession,
}

/// The terminal boundary: input polling and presentation.
pub trait Frontend {
    /// Non-blocking poll for the next local command; `None` means no
    /// input yet.
    fn poll_command(&mut self) -> Option<LocalCommand>;

    /// Show the world. `current` is the slot whose turn is being
    /// captured. Headless frontends ignore this.
    fn present(&mut self, _world: &World, _log: &MessageLog, _current: SlotId) {}
}

/// A frontend that never produces input; useful for spectators and tests
/// with timeouts.
#[derive(Debug, Default)]
pub struct NullFrontend;

impl Frontend for NullFrontend {
    fn poll_command(&mut self) -> Option<LocalCommand> {
        None
    }
}

// =============================================================================
// VICTORY RULES
// =============================================================================

/// Outcome of the post-turn victory check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Play on.
    Continue,
    /// The local player took the round; Conquest restarts, other modes
    /// end the session.
    RoundWon,
    /// The session is over.
    SessionOver,
}

/// Apply the mode- and rule-set-specific end conditions.
///
/// Mutates the world where the rules demand it (attrition deaths); runs
/// after every resolving phase, including during replays.
pub fn check_victory(world: &mut World) -> Verdict {
    // Extermination: every checked color must be out of cells and out of
    // usable seeds. Seeds only keep a color in the game while a living
    // generator can still plant them.
    if world.config.rules == RuleSet::Extermination {
        let out = |world: &World, slot: SlotId| {
            world.scores[slot.index()] == 0
                && (world.seeds[slot.index()] == 0 || !world.roster[slot].state.is_alive())
        };
        let exterminated = if world.rivals == 0 {
            out(world, SlotId::LOCAL)
        } else {
            SlotId::generators()
                .filter(|s| *s != SlotId::LOCAL)
                .all(|s| out(world, s))
        };
        if exterminated {
            return Verdict::RoundWon;
        }
    }

    // Generation limit: highest score wins, ties to the lowest slot.
    if world.config.generation_limit > 0 && world.generation > world.config.generation_limit {
        let mut winner = SlotId::LOCAL;
        for slot in SlotId::generators() {
            if world.scores[slot.index()] > world.scores[winner.index()] {
                winner = slot;
            }
        }
        return if winner == SlotId::LOCAL {
            Verdict::RoundWon
        } else {
            Verdict::SessionOver
        };
    }

    // Attrition: out of cells and out of seeds means out of the game.
    if world.config.starting_seeds > 0 {
        for slot in SlotId::all() {
            let starved = world.scores[slot.index()] + world.seeds[slot.index()] == 0;
            if world.roster[slot].state.is_alive() && starved {
                world.roster[slot].state = Lifecycle::Dead;
            }
        }
    }

    // Universal: the session cannot outlive its players. In the
    // multiplayer modes the local placeholder doesn't count.
    let mut alive = world.roster.alive_count();
    if world.mode.is_multiplayer() {
        alive = alive.saturating_sub(1);
    }
    if alive == 0 {
        return Verdict::SessionOver;
    }

    // Proliferation: a third of the board wins outright.
    if world.config.rules == RuleSet::Proliferation {
        let cells = world.grid.len() as u64;
        for slot in SlotId::generators() {
            if 3 * world.scores[slot.index()] as u64 > cells {
                return if slot == SlotId::LOCAL {
                    Verdict::RoundWon
                } else {
                    Verdict::SessionOver
                };
            }
        }
    }

    Verdict::Continue
}

// =============================================================================
// SESSION
// =============================================================================

/// Which lockstep role this session plays, if any.
pub enum Lockstep {
    /// We serialize the canonical action vector for up to five peers.
    Host(HostSync),
    /// We mirror a host's turns.
    Client(ClientSync),
}

/// A running game session: one world, one roster, one turn loop.
pub struct Session<F: Frontend> {
    /// The deterministic world this session owns exclusively.
    pub world: World,
    /// Player-facing notices.
    pub log: MessageLog,
    /// Completed round recordings, newest last.
    pub recordings: Vec<RoundRecording>,
    frontend: F,
    net: Option<Lockstep>,
    cancel_source: CancelSource,
    cancel: CancelToken,
    /// RNG state from just before the current round was dealt; replays
    /// start here.
    round_rng_state: [u64; 2],
    ending: bool,
}

impl<F: Frontend> Session<F> {
    /// Build a local (Conquest/Challenge/Hotseat) session and deal the
    /// first round.
    pub fn local(mut world: World, frontend: F) -> Session<F> {
        let (cancel_source, cancel) = cancellation();
        let round_rng_state = world.rng.state();
        world.start_round();
        Session {
            world,
            log: MessageLog::new(),
            recordings: Vec::new(),
            frontend,
            net: None,
            cancel_source,
            cancel,
            round_rng_state,
            ending: false,
        }
    }

    /// Build the hosting side of a netplay session.
    ///
    /// Deals the round, then runs the bootstrap handshake: rules and
    /// player count to every peer, an `OK` back from each, then
    /// per-client starting positions. Peers that fail the handshake are
    /// dropped; their slots die on the first turn.
    pub async fn host(world: World, frontend: F, peers: Vec<Peer>) -> Session<F> {
        let mut session = Session::local(world, frontend);
        let mut host_sync = HostSync::new(peers);
        host_sync
            .handshake(&mut session.world, &mut session.log, &mut session.cancel)
            .await;
        session.net = Some(Lockstep::Host(host_sync));
        session
    }

    /// Build the joining side of a netplay session.
    ///
    /// Receives the rules, acknowledges, builds the mirror world (seeded
    /// locally), and installs the host-assigned starting positions with
    /// this mirror's own slot first.
    pub async fn join(peer: Peer, frontend: F, seed: u64) -> Result<Session<F>, SessionError> {
        let (cancel_source, mut cancel) = cancellation();

        let mut log = MessageLog::new();
        let (mut client_sync, config, count) =
            ClientSync::handshake(peer, &mut log, &mut cancel).await?;

        let mut world = World::new(config, GameMode::Netplay, count, seed)?;
        let round_rng_state = world.rng.state();
        world.start_round();
        client_sync
            .receive_positions(&mut world, &mut log, &mut cancel)
            .await?;

        Ok(Session {
            world,
            log,
            recordings: Vec::new(),
            frontend,
            net: Some(Lockstep::Client(client_sync)),
            cancel_source,
            cancel,
            round_rng_state,
            ending: false,
        })
    }

    /// Abort any wait the session is blocked in.
    pub fn cancel_source(&self) -> &CancelSource {
        &self.cancel_source
    }

    /// Swap the dealt board for an authored challenge level.
    ///
    /// A bad file aborts only the load; the board is untouched and the
    /// session can fall back to a menu.
    pub fn load_challenge_level(&mut self, path: &std::path::Path) -> Result<(), SessionError> {
        bitmap::load_challenge(&mut self.world, path)?;
        self.log.push("Finished loading the specified file.");
        Ok(())
    }

    /// Run the session to completion: rounds, restarts, and all.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        self.log.push(match self.world.mode {
            GameMode::Conquest => "Starting a new Conquest game. Clear as many levels as you can!",
            GameMode::Challenge => "Starting a new Challenge game. Good luck!",
            GameMode::Hotseat => "Starting a new Hotseat game. Good luck!",
            GameMode::Netplay => "Starting a new Netplay game. Have fun!",
        });

        let mut recording = RoundRecording::begin(self.round_rng_state, &self.world);

        loop {
            // SelectingAction -> TurnReady
            let Some(vector) = self.collect_turn().await else {
                break;
            };

            // Resolving
            recording.push_turn(&vector);
            resolve_turn(&mut self.world, &vector);
            if !self.world.stasis {
                advance(&mut self.world);
                self.world.generation += 1;
            }

            // CheckingVictory
            match check_victory(&mut self.world) {
                Verdict::Continue => {}
                Verdict::RoundWon => {
                    self.log.push("Congratulations!");
                    if self.world.mode == GameMode::Conquest {
                        recording.finish(&self.world);
                        self.recordings.push(recording);
                        self.round_rng_state = self.world.rng.state();
                        self.world.start_round();
                        recording = RoundRecording::begin(self.round_rng_state, &self.world);
                        self.log.push("A fresh board awaits.");
                        continue;
                    }
                    break;
                }
                Verdict::SessionOver => break,
            }

            self.frontend
                .present(&self.world, &self.log, SlotId::LOCAL);

            if self.ending {
                break;
            }
        }

        recording.finish(&self.world);
        info!(
            generation = self.world.generation,
            hash = %hex::encode(&self.world.state_hash()[..8]),
            "round over"
        );
        self.recordings.push(recording);
        self.log.push("This round has ended.");
        Ok(())
    }

    /// Gather the turn's action vector, by whatever means the session
    /// mode demands. `None` ends the session (user abort or lost host).
    async fn collect_turn(&mut self) -> Option<ActionVector> {
        match &mut self.net {
            None => self.collect_local().await,
            Some(Lockstep::Host(_)) => self.collect_host().await,
            Some(Lockstep::Client(_)) => self.collect_client().await,
        }
    }

    /// When does the current selection phase close on its own?
    fn turn_deadline(&self) -> Option<Instant> {
        let timeout = if self.world.config.turn_timeout_ms > 0 {
            Some(self.world.config.turn_timeout_ms as u64)
        } else if self.world.stasis {
            // Keep a frozen sandbox ticking for chat and the UI.
            Some(STASIS_IDLE_MS)
        } else {
            None
        };
        timeout.map(|ms| Instant::now() + Duration::from_millis(ms))
    }

    fn deadline_passed(deadline: &Option<Instant>) -> bool {
        deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Local modes: walk the living slots in order, capturing one action
    /// each from the shared terminal. Unresolved slots pass when the
    /// deadline closes the turn.
    async fn collect_local(&mut self) -> Option<ActionVector> {
        let mut vector = ActionVector::new();
        let deadline = self.turn_deadline();

        let mut pending: Vec<SlotId> = SlotId::generators()
            .filter(|s| self.world.roster[*s].state.is_alive())
            .collect();
        pending.reverse();

        while let Some(current) = pending.pop() {
            self.frontend.present(&self.world, &self.log, current);
            loop {
                if Self::deadline_passed(&deadline) {
                    return Some(vector);
                }
                match self.frontend.poll_command() {
                    Some(LocalCommand::Act(action)) => {
                        vector.set(current, action);
                        break;
                    }
                    Some(command) => {
                        if !self.handle_side_command(command) {
                            return None;
                        }
                    }
                    None => tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await,
                }
            }
        }

        Some(vector)
    }

    /// Netplay host: poll the terminal and every peer until all living
    /// slots are ready or the deadline fires, then run the fan-in and
    /// publish the canonical vector.
    async fn collect_host(&mut self) -> Option<ActionVector> {
        let mut ready = [false; MAX_SLOTS];
        let mut local_action: Option<TurnAction> = None;
        let deadline = self.turn_deadline();

        self.frontend
            .present(&self.world, &self.log, SlotId::LOCAL);

        loop {
            match self.frontend.poll_command() {
                Some(LocalCommand::Act(action)) if local_action.is_none() => {
                    local_action = Some(action);
                    ready[SlotId::LOCAL.index()] = true;
                    if let Some(Lockstep::Host(host)) = &self.net {
                        host.announce_ready(SlotId::LOCAL);
                    }
                }
                Some(LocalCommand::Act(_)) => {}
                Some(LocalCommand::Chat(text)) => {
                    self.log.push(text.clone());
                    if let Some(Lockstep::Host(host)) = &self.net {
                        host.broadcast_chat(&text);
                    }
                }
                Some(command) => {
                    if !self.handle_side_command(command) {
                        return None;
                    }
                }
                None => {}
            }

            let Some(Lockstep::Host(host)) = &mut self.net else {
                return None;
            };
            host.poll(&mut self.world, &mut self.log, &mut ready);

            let all_ready = SlotId::generators()
                .all(|s| !self.world.roster[s].state.is_alive() || ready[s.index()]);

            if all_ready || Self::deadline_passed(&deadline) {
                let vector = host
                    .finish_turn(
                        &mut self.world,
                        &mut self.log,
                        local_action.unwrap_or_default(),
                        &mut self.cancel,
                    )
                    .await;
                return Some(vector);
            }

            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    /// Netplay client: offer our action, then mirror whatever the host
    /// serializes. The host closes turns; we only watch for it.
    async fn collect_client(&mut self) -> Option<ActionVector> {
        let mut local_action: Option<TurnAction> = None;
        let mut announced = false;

        self.frontend
            .present(&self.world, &self.log, SlotId::LOCAL);

        loop {
            match self.frontend.poll_command() {
                Some(LocalCommand::Act(action)) if local_action.is_none() => {
                    local_action = Some(action);
                }
                Some(LocalCommand::Act(_)) => {}
                Some(LocalCommand::Chat(text)) => {
                    self.log.push(text.clone());
                    if let Some(Lockstep::Client(client)) = &self.net {
                        client.send_chat(&text);
                    }
                }
                Some(command) => {
                    if !self.handle_side_command(command) {
                        return None;
                    }
                }
                None => {}
            }

            let Some(Lockstep::Client(client)) = &mut self.net else {
                return None;
            };

            if local_action.is_some() && !announced {
                client.send_ready();
                announced = true;
            }

            match client.poll(&mut self.log) {
                ClientStatus::Waiting => {}
                ClientStatus::TurnClosed => break,
                ClientStatus::HostLost => {
                    self.log.push("Disconnected from server...");
                    return None;
                }
            }

            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }

        let net_hang = Duration::from_millis(self.world.config.net_hang_ms as u64);
        let Some(Lockstep::Client(client)) = &mut self.net else {
            return None;
        };
        match client
            .finish_turn(
                local_action.unwrap_or_default(),
                net_hang,
                &mut self.log,
                &mut self.cancel,
            )
            .await
        {
            Some(vector) => Some(vector),
            None => {
                self.log.push("Disconnected from server...");
                None
            }
        }
    }

    /// Handle a non-action command. Returns `false` when the session
    /// should end.
    fn handle_side_command(&mut self, command: LocalCommand) -> bool {
        match command {
            LocalCommand::Chat(text) => {
                // Local modes: chat is just a notice.
                self.log.push(text);
            }
            LocalCommand::SaveSnapshot { challenge } => {
                let name = format!("life{}.bmp", chrono::Utc::now().timestamp());
                match bitmap::save_snapshot(&self.world, std::path::Path::new(&name), challenge) {
                    Ok(()) => self.log.push("Saved a screenshot."),
                    Err(_) => self
                        .log
                        .push("Could not save the screenshot for some reason..."),
                }
            }
            LocalCommand::ToggleLogFile => self.log.toggle_file(),
            LocalCommand::EndSession => {
                self.ending = true;
                self.cancel_source.cancel();
                return false;
            }
            LocalCommand::Act(_) => {}
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::action::Dir;
    use crate::game::config::GameConfig;

    /// Feeds a fixed list of commands, one per presentation, then
    /// nothing — the shape of a human who acts once per prompt.
    struct Script {
        commands: std::vec::IntoIter<LocalCommand>,
        armed: bool,
    }

    impl Script {
        fn new(commands: Vec<LocalCommand>) -> Script {
            Script {
                commands: commands.into_iter(),
                armed: true,
            }
        }
    }

    impl Frontend for Script {
        fn poll_command(&mut self) -> Option<LocalCommand> {
            if !self.armed {
                return None;
            }
            self.armed = false;
            self.commands.next()
        }

        fn present(&mut self, _world: &World, _log: &MessageLog, _current: SlotId) {
            self.armed = true;
        }
    }

    fn test_world(mode: GameMode, rivals: usize) -> World {
        let config = GameConfig {
            grid_width: 10,
            grid_height: 10,
            generation_limit: 0,
            ..GameConfig::default()
        };
        let mut world = World::new(config, mode, rivals, 42).unwrap();
        world.start_round();
        world
    }

    #[test]
    fn test_message_log_is_bounded() {
        let mut log = MessageLog::new();
        for i in 0..(MessageLog::CAPACITY + 10) {
            log.push(format!("notice {i}"));
        }
        let recent: Vec<&str> = log.recent(MessageLog::CAPACITY + 10).collect();
        assert_eq!(recent.len(), MessageLog::CAPACITY);
        assert_eq!(recent.last(), Some(&"notice 109"));
        assert_eq!(recent.first(), Some(&"notice 10"));
    }

    #[test]
    fn test_victory_attrition_kills_starved_players() {
        let mut world = test_world(GameMode::Hotseat, 2);
        let rival = SlotId::new(2).unwrap();
        world.scores[rival.index()] = 0;
        world.seeds[rival.index()] = 0;

        assert_eq!(check_victory(&mut world), Verdict::Continue);
        assert_eq!(world.roster[rival].state, Lifecycle::Dead);
    }

    #[test]
    fn test_victory_universal_single_player() {
        let mut world = test_world(GameMode::Conquest, 0);
        world.roster[SlotId::LOCAL].state = Lifecycle::Dead;
        assert_eq!(check_victory(&mut world), Verdict::SessionOver);
    }

    #[test]
    fn test_victory_universal_multiplayer_counts_out_local() {
        let mut world = test_world(GameMode::Hotseat, 1);
        // Two alive: local + one rival; rival dies -> one left -> over.
        world.roster[SlotId::new(2).unwrap()].state = Lifecycle::Dead;
        world.seeds = [1; MAX_SLOTS]; // keep attrition out of the picture
        assert_eq!(check_victory(&mut world), Verdict::SessionOver);
    }

    #[test]
    fn test_victory_generation_limit_prefers_local_on_tie() {
        let mut world = test_world(GameMode::Hotseat, 2);
        world.config.generation_limit = 5;
        world.generation = 6;
        world.scores[1] = 4;
        world.scores[2] = 4;
        assert_eq!(check_victory(&mut world), Verdict::RoundWon);

        world.scores[2] = 5;
        assert_eq!(check_victory(&mut world), Verdict::SessionOver);
    }

    #[test]
    fn test_victory_proliferation_third_of_board() {
        let mut world = test_world(GameMode::Hotseat, 2);
        world.config.rules = RuleSet::Proliferation;

        // 100 cells; a third is 33.33..., so 33 is not enough.
        world.scores[1] = 33;
        assert_eq!(check_victory(&mut world), Verdict::Continue);
        world.scores[1] = 34;
        assert_eq!(check_victory(&mut world), Verdict::RoundWon);

        world.scores[1] = 0;
        world.scores[3] = 34;
        assert_eq!(check_victory(&mut world), Verdict::SessionOver);
    }

    #[test]
    fn test_victory_extermination_waits_for_live_seeds() {
        let mut world = test_world(GameMode::Hotseat, 1);
        world.config.rules = RuleSet::Extermination;
        let rival = SlotId::new(2).unwrap();

        // The rival has no cells but still holds seeds and a live
        // generator: not exterminated yet.
        world.scores[rival.index()] = 0;
        assert!(world.seeds[rival.index()] > 0);
        assert_eq!(check_victory(&mut world), Verdict::Continue);

        // Once the generator is gone, hoarded seeds don't count.
        world.roster[rival].state = Lifecycle::Dead;
        assert_eq!(check_victory(&mut world), Verdict::RoundWon);
    }

    #[test]
    fn test_victory_extermination_ignores_avatarless_seeds() {
        // Conquest rivals never have avatars; their colonies alone decide.
        let mut world = test_world(GameMode::Conquest, 2);
        world.config.rules = RuleSet::Extermination;
        world.scores[2] = 0;
        world.scores[3] = 1;
        assert_eq!(check_victory(&mut world), Verdict::Continue);

        world.scores[3] = 0;
        assert_eq!(check_victory(&mut world), Verdict::RoundWon);
    }

    #[tokio::test]
    async fn test_hotseat_round_runs_to_completion() {
        let mut world = test_world(GameMode::Hotseat, 1);
        world.config.turn_timeout_ms = 0;

        // Local plants and hatches, rival quits on its first turn; the
        // universal rule then ends the session (one player left).
        let script = Script::new(vec![
            LocalCommand::Act(TurnAction::Plant(Dir::Here)),
            LocalCommand::Act(TurnAction::Quit),
        ]);

        let mut session = Session::local(world, script);
        session.run().await.unwrap();

        assert_eq!(session.recordings.len(), 1);
        assert_eq!(session.recordings[0].turns.len(), 1);
        assert_eq!(
            session.world.roster[SlotId::new(2).unwrap()].state,
            Lifecycle::Dead
        );
    }

    #[tokio::test]
    async fn test_timeout_closes_turn_with_passes() {
        let mut world = test_world(GameMode::Hotseat, 1);
        world.config.turn_timeout_ms = 30;
        world.seeds = [5; MAX_SLOTS];

        let mut session = Session::local(world, NullFrontend);

        // One turn of nothing: both players pass when the deadline fires.
        let vector = session.collect_turn().await.unwrap();
        assert_eq!(vector, ActionVector::new());
    }

    #[tokio::test]
    async fn test_end_session_command_stops_collection() {
        let world = test_world(GameMode::Hotseat, 1);
        let script = Script::new(vec![LocalCommand::EndSession]);
        let mut session = Session::local(world, script);

        assert!(session.collect_turn().await.is_none());
    }

    #[tokio::test]
    async fn test_netplay_sessions_agree_on_every_turn() {
        use tokio::net::{TcpListener, TcpStream};

        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move {
            let peer = Peer::spawn(TcpStream::connect(addr).await.unwrap());
            let script = Script::new(vec![
                LocalCommand::Act(TurnAction::Plant(Dir::Here)),
                LocalCommand::Act(TurnAction::Move(Dir::East)),
                LocalCommand::Act(TurnAction::Quit),
            ]);
            let mut session = Session::join(peer, script, 9001).await.unwrap();
            session.run().await.unwrap();
            session
        });

        let config = GameConfig {
            grid_width: 10,
            grid_height: 10,
            net_hang_ms: 2000,
            generation_limit: 0,
            ..GameConfig::default()
        };
        let world = World::new(config, GameMode::Netplay, 1, 55).unwrap();
        let script = Script::new(vec![
            LocalCommand::Act(TurnAction::Plant(Dir::Here)),
            LocalCommand::Act(TurnAction::Hatch),
            LocalCommand::Act(TurnAction::Move(Dir::West)),
        ]);

        let (stream, _) = listener.accept().await.unwrap();
        let mut session = Session::host(world, script, vec![Peer::spawn(stream)]).await;
        session.run().await.unwrap();

        let client_session = client_task.await.unwrap();

        // The client quitting leaves one participant: both sides end, in
        // the same turn, with mirrored action vectors (each mirror keeps
        // itself in slot 1, so slots 1 and 2 trade places).
        let host_turns = &session.recordings[0].turns;
        let client_turns = &client_session.recordings[0].turns;
        assert_eq!(host_turns.len(), 3);
        assert_eq!(client_turns.len(), 3);
        for (host_turn, client_turn) in host_turns.iter().zip(client_turns) {
            assert_eq!(host_turn[1], client_turn[2]);
            assert_eq!(host_turn[2], client_turn[1]);
        }
        assert_eq!(
            session.world.roster[SlotId::new(2).unwrap()].state,
            Lifecycle::Dead
        );
    }

    #[tokio::test]
    async fn test_recorded_hotseat_round_replays() {
        let mut world = test_world(GameMode::Hotseat, 1);
        world.config.turn_timeout_ms = 0;

        let script = Script::new(vec![
            LocalCommand::Act(TurnAction::Plant(Dir::Here)),
            LocalCommand::Act(TurnAction::Plant(Dir::North)),
            LocalCommand::Act(TurnAction::Hatch),
            LocalCommand::Act(TurnAction::Move(Dir::East)),
            LocalCommand::Act(TurnAction::Quit),
            LocalCommand::Act(TurnAction::Quit),
        ]);

        let mut session = Session::local(world, script);
        session.run().await.unwrap();

        let recording = session.recordings.last().unwrap();
        assert!(replay::verify(recording).unwrap());
    }
}
