//! Machine configuration
//!
//! Loaded once before a session starts and never mutated afterwards; the
//! machine keeps its own copy.

use std::path::Path;
use std::time::Duration;

use pk_core::{DEFAULT_SYMBOL_COUNT, Ease, PkError, PkResult, secs, secs_floored};
use serde::{Deserialize, Serialize};

/// Shortest open or close phase of the prize gate (s)
pub const MIN_GATE_PHASE_SECS: f32 = 0.05;
/// Shortest round safety timer (s)
pub const MIN_ROUND_SAFETY_SECS: f32 = 0.2;
/// Shortest wait between rounds (s)
pub const MIN_INTER_ROUND_SECS: f32 = 0.1;
/// Shortest single reel step (s)
pub const MIN_STEP_SECS: f32 = 0.001;
/// Longest accepted value of any configured timing (s)
pub const MAX_TIMING_SECS: f32 = 3600.0;
/// Fastest accepted loop speed in symbols per second
pub const MAX_SYMBOLS_PER_SEC: f32 = 10_000.0;

/// Reel strip geometry and stop motion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReelConfig {
    /// Symbols on the strip, labelled `1..=symbol_count`
    pub symbol_count: u8,
    /// Visible row read as the result (0 = top row)
    pub result_row: usize,
    /// Loop speed in strip units per second
    pub loop_speed: f32,
    /// Height of one symbol in strip units
    pub symbol_extent: f32,
    /// Duration of each decorative stop step (s)
    pub step_secs: f32,
    pub step_ease: Ease,
    /// Duration of the final, decelerating step (s)
    pub final_step_secs: f32,
    pub final_ease: Ease,
}

impl Default for ReelConfig {
    fn default() -> Self {
        Self {
            symbol_count: DEFAULT_SYMBOL_COUNT,
            result_row: 1,
            loop_speed: 1600.0,
            symbol_extent: 100.0,
            step_secs: 0.03,
            step_ease: Ease::Linear,
            final_step_secs: 0.12,
            final_ease: Ease::OutCubic,
        }
    }
}

impl ReelConfig {
    pub fn step_duration(&self) -> Duration {
        secs_floored(self.step_secs, MIN_STEP_SECS)
    }

    pub fn final_step_duration(&self) -> Duration {
        secs_floored(self.final_step_secs, MIN_STEP_SECS)
    }

    /// Symbols advanced per second while looping
    pub fn symbols_per_sec(&self) -> f32 {
        if self.symbol_extent > 0.0 {
            (self.loop_speed / self.symbol_extent).max(0.0)
        } else {
            0.0
        }
    }
}

/// Stop sequencing of the three-reel slot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotTiming {
    /// All reels loop for this long before the left reel stops (s)
    pub pre_spin_secs: f32,
    /// Gap after each of the left and right stops (s)
    pub stop_gap_secs: f32,
    /// Decorative steps added to every stop
    pub extra_steps: u32,
}

impl SlotTiming {
    pub fn pre_spin(&self) -> Duration {
        secs(self.pre_spin_secs)
    }

    pub fn stop_gap(&self) -> Duration {
        secs(self.stop_gap_secs)
    }
}

impl Default for SlotTiming {
    fn default() -> Self {
        Self {
            pre_spin_secs: 0.6,
            stop_gap_secs: 0.25,
            extra_steps: 20,
        }
    }
}

/// Lottery draw and hold queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LotteryConfig {
    /// Probability that a spin is a guaranteed win (0.0-1.0)
    pub win_rate: f64,
    /// Hold queue capacity (0 disables holding)
    pub max_hold: u32,
    /// Slot stays visible this long after a losing spin (s)
    pub lose_hold_secs: f32,
    /// Result presentation after a reach spin (s)
    pub reach_result_secs: f32,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            win_rate: 0.05,
            max_hold: 4,
            lose_hold_secs: 2.0,
            reach_result_secs: 0.65,
        }
    }
}

/// Hit (bonus) specification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HitSpec {
    pub round_count: u32,
    /// Balls paid for every accepted prize entry
    pub balls_per_prize_in: u32,
    pub min_in_per_round: u32,
    pub max_in_per_round: u32,
    /// Wait between a round end and the next round start (s)
    pub inter_round_wait_secs: f32,
    /// Safety net that force-ends a stalled round (s, 0 disables)
    pub max_round_secs: f32,
}

impl Default for HitSpec {
    fn default() -> Self {
        Self {
            round_count: 10,
            balls_per_prize_in: 10,
            min_in_per_round: 8,
            max_in_per_round: 12,
            inter_round_wait_secs: 0.6,
            max_round_secs: 12.0,
        }
    }
}

impl HitSpec {
    /// Inclusive quota range, floored to at least one entry per round
    pub fn in_range(&self) -> (u32, u32) {
        let min = self.min_in_per_round.max(1);
        (min, self.max_in_per_round.max(min))
    }

    pub fn inter_round_wait(&self) -> Duration {
        secs_floored(self.inter_round_wait_secs, MIN_INTER_ROUND_SECS)
    }

    /// `None` when the safety net is disabled
    pub fn safety_timeout(&self) -> Option<Duration> {
        if self.max_round_secs > 0.0 {
            Some(secs_floored(self.max_round_secs, MIN_ROUND_SAFETY_SECS))
        } else {
            None
        }
    }
}

/// Prize gate open/close loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateTiming {
    pub open_secs: f32,
    pub close_secs: f32,
}

impl Default for GateTiming {
    fn default() -> Self {
        Self {
            open_secs: 0.30,
            close_secs: 0.50,
        }
    }
}

impl GateTiming {
    pub fn open_duration(&self) -> Duration {
        secs_floored(self.open_secs, MIN_GATE_PHASE_SECS)
    }

    pub fn close_duration(&self) -> Duration {
        secs_floored(self.close_secs, MIN_GATE_PHASE_SECS)
    }
}

/// Per-hole entry effects
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HoleConfig {
    /// Added to the IN counter
    pub add_in_count: i32,
    /// Balls paid directly by the hole
    pub prize_balls: i32,
    /// Entry only counts while the prize gate is open
    pub gate_controlled: bool,
}

impl Default for HoleConfig {
    fn default() -> Self {
        Self {
            add_in_count: 1,
            prize_balls: 0,
            gate_controlled: false,
        }
    }
}

/// Board-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub start_balls: u32,
    pub start_hole: HoleConfig,
    pub prize_hole: HoleConfig,
    pub out_hole: HoleConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            start_balls: 100,
            start_hole: HoleConfig::default(),
            prize_hole: HoleConfig {
                gate_controlled: true,
                ..HoleConfig::default()
            },
            out_hole: HoleConfig {
                add_in_count: 0,
                ..HoleConfig::default()
            },
        }
    }
}

/// Complete machine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub reel: ReelConfig,
    pub slot: SlotTiming,
    pub lottery: LotteryConfig,
    pub hit: HitSpec,
    pub gate: GateTiming,
    pub board: BoardConfig,
}

impl MachineConfig {
    /// Fast timings for tests and headless runs
    pub fn turbo() -> Self {
        let mut config = Self::default();
        config.slot.pre_spin_secs = 0.1;
        config.slot.stop_gap_secs = 0.05;
        config.slot.extra_steps = 4;
        config.reel.step_secs = 0.01;
        config.reel.final_step_secs = 0.02;
        config.lottery.lose_hold_secs = 0.2;
        config.lottery.reach_result_secs = 0.1;
        config
    }

    /// Reject values no component can run with
    pub fn validate(&self) -> PkResult<()> {
        if self.reel.symbol_count < 2 {
            return Err(PkError::InvalidConfig(format!(
                "reel.symbol_count must be >= 2 (got {})",
                self.reel.symbol_count
            )));
        }
        if self.reel.result_row >= self.reel.symbol_count as usize {
            return Err(PkError::InvalidConfig(format!(
                "reel.result_row must be < symbol_count (got {} for {})",
                self.reel.result_row, self.reel.symbol_count
            )));
        }
        if !(0.0..=1.0).contains(&self.lottery.win_rate) {
            return Err(PkError::InvalidConfig(format!(
                "lottery.win_rate must be within [0, 1] (got {})",
                self.lottery.win_rate
            )));
        }
        if self.hit.round_count == 0 {
            return Err(PkError::InvalidConfig(
                "hit.round_count must be at least 1".into(),
            ));
        }

        let speeds = [
            ("reel.loop_speed", self.reel.loop_speed),
            ("reel.symbol_extent", self.reel.symbol_extent),
        ];
        if let Some((name, value)) = speeds.iter().find(|(_, v)| !v.is_finite()) {
            return Err(PkError::InvalidConfig(format!(
                "{} must be finite (got {})",
                name, value
            )));
        }
        if self.reel.symbols_per_sec() > MAX_SYMBOLS_PER_SEC {
            return Err(PkError::InvalidConfig(format!(
                "reel loops at {} symbols/s, at most {} allowed",
                self.reel.symbols_per_sec(),
                MAX_SYMBOLS_PER_SEC
            )));
        }

        let timings = [
            ("reel.step_secs", self.reel.step_secs),
            ("reel.final_step_secs", self.reel.final_step_secs),
            ("slot.pre_spin_secs", self.slot.pre_spin_secs),
            ("slot.stop_gap_secs", self.slot.stop_gap_secs),
            ("lottery.lose_hold_secs", self.lottery.lose_hold_secs),
            ("lottery.reach_result_secs", self.lottery.reach_result_secs),
            ("hit.inter_round_wait_secs", self.hit.inter_round_wait_secs),
            ("hit.max_round_secs", self.hit.max_round_secs),
            ("gate.open_secs", self.gate.open_secs),
            ("gate.close_secs", self.gate.close_secs),
        ];
        if let Some((name, value)) = timings
            .iter()
            .find(|(_, v)| !v.is_finite() || *v > MAX_TIMING_SECS)
        {
            return Err(PkError::InvalidConfig(format!(
                "{} must be finite and at most {}s (got {})",
                name, MAX_TIMING_SECS, value
            )));
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> PkResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_yaml(yaml: &str) -> PkResult<Self> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn load(path: impl AsRef<Path>) -> PkResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match ext.as_str() {
            "json" => Self::from_json(&text),
            "yaml" | "yml" => Self::from_yaml(&text),
            other => Err(PkError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Export as pretty JSON
    pub fn to_json(&self) -> PkResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
