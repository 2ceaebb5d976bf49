//! Session Configuration
//!
//! All tunables for a round, their validation, and profile I/O.
//!
//! Out-of-range values are never fatal: `validate` clamps each offending
//! field back to its default and reports whether anything was corrected,
//! so a mangled profile degrades to a playable configuration.
//!
//! The subset from `starting_seeds` onward is the *rule vector* — the
//! ordered integer list a host transmits to joining clients so that every
//! participant simulates under identical rules.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Number of integers in the netplay rule vector.
pub const RULE_VECTOR_LEN: usize = 29;

/// Game mode selected for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Single player against scattered colonies; rounds restart on a win.
    Conquest,
    /// Single player on a board loaded from a challenge bitmap.
    Challenge,
    /// Multiple players sharing one terminal, taking turns.
    Hotseat,
    /// Host plus remote peers in lockstep.
    Netplay,
}

impl GameMode {
    /// True for the modes where several generators act each turn.
    #[inline]
    pub fn is_multiplayer(self) -> bool {
        matches!(self, GameMode::Hotseat | GameMode::Netplay)
    }
}

/// Policy for standing on (or walking into) another color's living cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtherCells {
    /// Foreign cells are ignored.
    Passive,
    /// Foreign living cells block movement.
    Solid,
    /// Standing on a foreign living cell after a generation is fatal.
    Deadly,
}

impl OtherCells {
    /// Decode from a rule-vector integer.
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(OtherCells::Passive),
            1 => Some(OtherCells::Solid),
            2 => Some(OtherCells::Deadly),
            _ => None,
        }
    }

    /// Encode for the rule vector.
    #[inline]
    pub fn as_index(self) -> i64 {
        self as i64
    }
}

/// Victory rule set for a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSet {
    /// No special victory condition; play until everyone is gone.
    Survival,
    /// Wipe out every rival color's cells and seeds.
    Extermination,
    /// First color to hold a third of the board wins.
    Proliferation,
    /// Free play; the automaton can be frozen (stasis).
    Sandbox,
}

impl RuleSet {
    /// Decode from a rule-vector integer.
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(RuleSet::Survival),
            1 => Some(RuleSet::Extermination),
            2 => Some(RuleSet::Proliferation),
            3 => Some(RuleSet::Sandbox),
            _ => None,
        }
    }

    /// Encode for the rule vector.
    #[inline]
    pub fn as_index(self) -> i64 {
        self as i64
    }
}

/// Complete session configuration.
///
/// `survival[n]` and `birth[n]` are percentage probabilities (0-100) of an
/// alive cell surviving, or a dead/seeded cell being born, given `n` total
/// living neighbors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Display color of the local player (1-6).
    pub player_color: u8,
    /// Seed inventory every generator starts with; 0 disables the seed
    /// economy entirely (planting is free, attrition never triggers).
    pub starting_seeds: u32,
    /// Inventory cap for harvesting.
    pub max_seeds: u32,
    /// Grid width in cells.
    pub grid_width: u16,
    /// Grid height in cells.
    pub grid_height: u16,
    /// Toroidal adjacency when true, bounded when false.
    pub grid_wrap: bool,
    /// Sprinkle neutral noise cells at round start.
    pub noise: bool,
    /// Policy for other colors' living cells.
    pub other_cells: OtherCells,
    /// Turn timeout in milliseconds; 0 means turns never time out.
    pub turn_timeout_ms: u32,
    /// How long to wait on a peer during the per-turn action exchange.
    pub net_hang_ms: u32,
    /// Generation cap; 0 means unlimited.
    pub generation_limit: u32,
    /// Active victory rule set.
    pub rules: RuleSet,
    /// Survival rulestring indexed by living-neighbor count (0-8).
    pub survival: [u8; 9],
    /// Birth rulestring indexed by living-neighbor count (0-8).
    pub birth: [u8; 9],
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            player_color: 1,
            starting_seeds: 100,
            max_seeds: 999,
            grid_width: 20,
            grid_height: 20,
            grid_wrap: true,
            noise: false,
            other_cells: OtherCells::Passive,
            turn_timeout_ms: 0,
            net_hang_ms: 500,
            generation_limit: 10_000,
            rules: RuleSet::Survival,
            survival: [0, 0, 100, 100, 0, 0, 0, 0, 0],
            birth: [0, 0, 0, 100, 0, 0, 0, 0, 0],
        }
    }
}

impl GameConfig {
    /// Clamp every out-of-range field back to its default.
    ///
    /// Returns `true` when the configuration was already valid. A `false`
    /// return is informational only; the configuration is usable either
    /// way.
    pub fn validate(&mut self) -> bool {
        let defaults = GameConfig::default();
        let mut clean = true;

        if self.player_color < 1 || self.player_color > 6 {
            self.player_color = defaults.player_color;
            clean = false;
        }
        if self.starting_seeds > 1_000_000_000 {
            self.starting_seeds = defaults.starting_seeds;
            clean = false;
        }
        if self.max_seeds < 1 || self.max_seeds > 1_000_000_000 {
            self.max_seeds = defaults.max_seeds;
            clean = false;
        }
        if self.grid_width < 5 || self.grid_width > 10_000 {
            self.grid_width = defaults.grid_width;
            clean = false;
        }
        if self.grid_height < 5 || self.grid_height > 10_000 {
            self.grid_height = defaults.grid_height;
            clean = false;
        }
        if self.turn_timeout_ms > 60_000 {
            self.turn_timeout_ms = defaults.turn_timeout_ms;
            clean = false;
        }
        if self.net_hang_ms < 1 || self.net_hang_ms > 60_000 {
            self.net_hang_ms = defaults.net_hang_ms;
            clean = false;
        }
        if self.generation_limit > 1_000_000_000 {
            self.generation_limit = defaults.generation_limit;
            clean = false;
        }
        for value in self.survival.iter_mut().chain(self.birth.iter_mut()) {
            if *value > 100 {
                *value = 0;
                clean = false;
            }
        }

        clean
    }

    /// Encode the tunables a host shares with joining clients, in wire
    /// order.
    pub fn rule_vector(&self) -> Vec<i64> {
        let mut v = Vec::with_capacity(RULE_VECTOR_LEN);
        v.push(self.starting_seeds as i64);
        v.push(self.max_seeds as i64);
        v.push(self.grid_width as i64);
        v.push(self.grid_height as i64);
        v.push(self.grid_wrap as i64);
        v.push(self.noise as i64);
        v.push(self.other_cells.as_index());
        v.push(self.turn_timeout_ms as i64);
        v.push(self.net_hang_ms as i64);
        v.push(self.generation_limit as i64);
        v.push(self.rules.as_index());
        v.extend(self.survival.iter().map(|&p| p as i64));
        v.extend(self.birth.iter().map(|&p| p as i64));
        debug_assert_eq!(v.len(), RULE_VECTOR_LEN);
        v
    }

    /// Install a received rule vector.
    ///
    /// Returns `false` if the vector has the wrong length or contains a
    /// value no field can represent; the configuration is left unchanged
    /// in that case.
    pub fn apply_rule_vector(&mut self, values: &[i64]) -> bool {
        if values.len() != RULE_VECTOR_LEN {
            return false;
        }

        let in_u32 = |v: i64| v >= 0 && v <= u32::MAX as i64;
        let in_u16 = |v: i64| v >= 0 && v <= u16::MAX as i64;
        let in_pct = |v: i64| (0..=100).contains(&v);

        if !in_u32(values[0])
            || !in_u32(values[1])
            || !in_u16(values[2])
            || !in_u16(values[3])
            || !in_u32(values[7])
            || !in_u32(values[8])
            || !in_u32(values[9])
            || !values[11..].iter().all(|&v| in_pct(v))
        {
            return false;
        }
        let Some(other_cells) = OtherCells::from_index(values[6]) else {
            return false;
        };
        let Some(rules) = RuleSet::from_index(values[10]) else {
            return false;
        };

        self.starting_seeds = values[0] as u32;
        self.max_seeds = values[1] as u32;
        self.grid_width = values[2] as u16;
        self.grid_height = values[3] as u16;
        self.grid_wrap = values[4] != 0;
        self.noise = values[5] != 0;
        self.other_cells = other_cells;
        self.turn_timeout_ms = values[7] as u32;
        self.net_hang_ms = values[8] as u32;
        self.generation_limit = values[9] as u32;
        self.rules = rules;
        for (dst, &src) in self.survival.iter_mut().zip(&values[11..20]) {
            *dst = src as u8;
        }
        for (dst, &src) in self.birth.iter_mut().zip(&values[20..29]) {
            *dst = src as u8;
        }

        self.validate();
        true
    }

    /// Load a configuration profile from disk.
    ///
    /// A missing or unreadable profile yields the defaults; out-of-range
    /// fields are clamped. Never fails.
    pub fn load_profile(path: &Path) -> Self {
        let mut config = match fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<GameConfig>(&text) {
                Ok(config) => config,
                Err(e) => {
                    warn!("unreadable profile {}: {}", path.display(), e);
                    GameConfig::default()
                }
            },
            Err(_) => GameConfig::default(),
        };
        if !config.validate() {
            warn!("profile {} had out-of-range values, clamped", path.display());
        }
        config
    }

    /// Save this configuration as a profile.
    pub fn save_profile(&self, path: &Path) -> io::Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        fs::write(path, text)
    }
}
