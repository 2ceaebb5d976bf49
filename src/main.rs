//! Petri
//!
//! Headless driver for the simulation: runs a scripted demo round (the
//! terminal frontend lives outside this crate), records it, and verifies
//! the recording replays to the identical state hash. Also verifies
//! previously saved recordings.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use petri::core::rng::GameRng;
use petri::game::config::GameConfig;
use petri::session::replay::{self, RoundRecording};
use petri::session::{Frontend, LocalCommand, Session};
use petri::{Dir, GameMode, TurnAction, World, VERSION};

struct Args {
    width: Option<u16>,
    height: Option<u16>,
    config: Option<PathBuf>,
    seed: Option<u64>,
    rivals: usize,
    turns: u32,
    save_replay: Option<PathBuf>,
    verify_replay: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            config: None,
            seed: None,
            rivals: 3,
            turns: 100,
            save_replay: None,
            verify_replay: None,
        }
    }
}

fn usage() -> &'static str {
    "usage: petri [options]\n\
     \n\
     options:\n\
       --width N           override the grid width\n\
       --height N          override the grid height\n\
       --config PATH       load a configuration profile\n\
       --seed N            seed the simulation (default: wall clock)\n\
       --rivals N          rival colonies in the demo round (default 3)\n\
       --turns N           scripted demo turns before quitting (default 100)\n\
       --save-replay PATH  save the demo round's recording\n\
       --replay PATH       verify a saved recording and exit\n"
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let argv: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < argv.len() {
        let flag = argv[i].as_str();
        let mut value = |name: &str| -> Result<String> {
            i += 1;
            argv.get(i)
                .cloned()
                .with_context(|| format!("{name} needs a value"))
        };
        match flag {
            "--width" => args.width = Some(value("--width")?.parse()?),
            "--height" => args.height = Some(value("--height")?.parse()?),
            "--config" => args.config = Some(value("--config")?.into()),
            "--seed" => args.seed = Some(value("--seed")?.parse()?),
            "--rivals" => args.rivals = value("--rivals")?.parse()?,
            "--turns" => args.turns = value("--turns")?.parse()?,
            "--save-replay" => args.save_replay = Some(value("--save-replay")?.into()),
            "--replay" => args.verify_replay = Some(value("--replay")?.into()),
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other => bail!("unknown flag {other}\n\n{}", usage()),
        }
        i += 1;
    }

    Ok(args)
}

/// Scripted stand-in for the out-of-scope terminal frontend: plays
/// pseudo-random turns, then quits.
struct DemoFrontend {
    rng: GameRng,
    turns_left: u32,
}

impl DemoFrontend {
    const DIRS: [Dir; 8] = [
        Dir::North,
        Dir::South,
        Dir::East,
        Dir::West,
        Dir::NorthEast,
        Dir::NorthWest,
        Dir::SouthEast,
        Dir::SouthWest,
    ];

    fn new(seed: u64, turns: u32) -> DemoFrontend {
        DemoFrontend {
            rng: GameRng::new(seed),
            turns_left: turns,
        }
    }
}

impl Frontend for DemoFrontend {
    fn poll_command(&mut self) -> Option<LocalCommand> {
        if self.turns_left == 0 {
            return Some(LocalCommand::Act(TurnAction::Quit));
        }
        self.turns_left -= 1;

        let dir = Self::DIRS[self.rng.next_int(8) as usize];
        let action = match self.rng.next_int(10) {
            0..=3 => TurnAction::Move(dir),
            4..=6 => TurnAction::Plant(dir),
            7 => TurnAction::Plant(Dir::Here),
            8 => TurnAction::Hatch,
            _ => TurnAction::Harvest,
        };
        Some(LocalCommand::Act(action))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let args = parse_args()?;
    info!("Petri v{VERSION}");

    if let Some(path) = &args.verify_replay {
        let recording = RoundRecording::load(path)?;
        info!(
            turns = recording.turns.len(),
            "loaded recording from {}",
            path.display()
        );
        if replay::verify(&recording)? {
            info!("REPLAY VERIFIED: final state hash matches");
        } else {
            bail!("replay diverged from its recorded final hash");
        }
        return Ok(());
    }

    // Assemble the demo configuration: profile, then CLI overrides.
    let mut config = match &args.config {
        Some(path) => GameConfig::load_profile(path),
        None => GameConfig::default(),
    };
    if let Some(width) = args.width {
        config.grid_width = width;
    }
    if let Some(height) = args.height {
        config.grid_height = height;
    }
    config.generation_limit = 500;
    if !config.validate() {
        info!("configuration had out-of-range values, clamped to defaults");
    }

    let seed = args
        .seed
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis() as u64);
    info!(seed, rivals = args.rivals, "=== Starting Demo Round ===");

    let world = World::new(config, GameMode::Conquest, args.rivals, seed)?;
    let frontend = DemoFrontend::new(seed ^ 0xD5, args.turns);
    let mut session = Session::local(world, frontend);
    session.run().await?;

    info!("=== Round Results ===");
    info!(
        generations = session.world.generation,
        rounds = session.recordings.len(),
        "final state hash: {}",
        hex::encode(session.world.state_hash())
    );
    for (slot, score) in session.world.scores.iter().enumerate() {
        if *score > 0 || session.world.seeds[slot] != session.world.config.starting_seeds {
            info!("color {slot}: {score} cells, {} seeds", session.world.seeds[slot]);
        }
    }
    for line in session.log.recent(8) {
        info!("notice: {line}");
    }

    // Verify determinism by replaying every recorded round.
    info!("=== Verifying Determinism ===");
    for (index, recording) in session.recordings.iter().enumerate() {
        if replay::verify(recording)? {
            info!("round {index}: DETERMINISM VERIFIED ({} turns)", recording.turns.len());
        } else {
            bail!("round {index}: replay hash mismatch");
        }
    }

    if let Some(path) = &args.save_replay {
        if let Some(recording) = session.recordings.last() {
            recording.save(path)?;
            info!("saved recording to {}", path.display());
        }
    }

    Ok(())
}
