//! Stage — The core enum defining all canonical machine phases
//!
//! A Stage is NOT an animation and NOT a component callback.
//! A Stage is the SEMANTIC MEANING of a moment in the machine flow.

use serde::{Deserialize, Serialize};

/// Kind of hole a ball can enter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoleKind {
    /// Start chucker, triggers a lottery spin
    Start,
    /// Attacker, pays out during a hit
    Prize,
    /// Drain at the bottom of the board
    Out,
}

impl HoleKind {
    pub fn name(&self) -> &'static str {
        match self {
            HoleKind::Start => "start",
            HoleKind::Prize => "prize",
            HoleKind::Out => "out",
        }
    }
}

/// Canonical machine stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Stage {
    // ═══════════════════════════════════════════════════════════════════════
    // SPIN LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════
    /// Spin request arrived while the slot was busy
    SpinQueued { spin_id: u64, depth: u32 },

    /// All three reels started looping
    SpinStart {
        spin_id: u64,
        /// Target labels (left, center, right)
        targets: [u8; 3],
        reach: bool,
        win: bool,
    },

    /// A reel landed on its target
    ReelStop {
        spin_id: u64,
        /// 0 = left, 1 = center, 2 = right
        reel_index: u8,
        symbol: u8,
    },

    /// Left and right matched; center keeps looping until PUSH
    ReachWait {
        spin_id: u64,
        presentation_key: String,
    },

    /// PUSH received, center reel is stopping
    ReachResume { spin_id: u64 },

    /// All reels stopped
    SpinEnd {
        spin_id: u64,
        symbols: [u8; 3],
        win: bool,
    },

    /// Slot panel hidden, in-flight motion discarded
    SlotHidden,

    // ═══════════════════════════════════════════════════════════════════════
    // HOLD QUEUE
    // ═══════════════════════════════════════════════════════════════════════
    HoldAccepted { held: u32, max: u32 },

    HoldRejected { held: u32, max: u32, reason: String },

    HoldConsumed { held: u32, max: u32 },

    // ═══════════════════════════════════════════════════════════════════════
    // HIT / ROUNDS
    // ═══════════════════════════════════════════════════════════════════════
    HitStart { round_count: u32 },

    RoundStart { round: u32, target_in: u32 },

    GateOpen,

    GateClose,

    PrizeIn {
        round: u32,
        in_count: u32,
        target_in: u32,
        payout: u32,
    },

    RoundEnd {
        round: u32,
        in_count: u32,
        target_in: u32,
        by_timeout: bool,
    },

    HitEnd {
        total_payout: u32,
        rounds_played: u32,
        timeouts: u32,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // BALLS
    // ═══════════════════════════════════════════════════════════════════════
    BallLaunched { ball_id: u64, balls_left: u32 },

    LaunchRejected { balls_left: u32 },

    BallEntered { ball_id: u64, hole: HoleKind },

    EntryIgnored {
        ball_id: u64,
        hole: HoleKind,
        reason: String,
    },
}

impl Stage {
    /// Stable snake_case name, matching the serde tag
    pub fn type_name(&self) -> &'static str {
        match self {
            Stage::SpinQueued { .. } => "spin_queued",
            Stage::SpinStart { .. } => "spin_start",
            Stage::ReelStop { .. } => "reel_stop",
            Stage::ReachWait { .. } => "reach_wait",
            Stage::ReachResume { .. } => "reach_resume",
            Stage::SpinEnd { .. } => "spin_end",
            Stage::SlotHidden => "slot_hidden",
            Stage::HoldAccepted { .. } => "hold_accepted",
            Stage::HoldRejected { .. } => "hold_rejected",
            Stage::HoldConsumed { .. } => "hold_consumed",
            Stage::HitStart { .. } => "hit_start",
            Stage::RoundStart { .. } => "round_start",
            Stage::GateOpen => "gate_open",
            Stage::GateClose => "gate_close",
            Stage::PrizeIn { .. } => "prize_in",
            Stage::RoundEnd { .. } => "round_end",
            Stage::HitEnd { .. } => "hit_end",
            Stage::BallLaunched { .. } => "ball_launched",
            Stage::LaunchRejected { .. } => "launch_rejected",
            Stage::BallEntered { .. } => "ball_entered",
            Stage::EntryIgnored { .. } => "entry_ignored",
        }
    }

    /// Whether this stage belongs to the hit/round flow
    pub fn is_hit_flow(&self) -> bool {
        matches!(
            self,
            Stage::HitStart { .. }
                | Stage::RoundStart { .. }
                | Stage::GateOpen
                | Stage::GateClose
                | Stage::PrizeIn { .. }
                | Stage::RoundEnd { .. }
                | Stage::HitEnd { .. }
        )
    }
}
