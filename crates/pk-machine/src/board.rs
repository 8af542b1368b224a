//! Board — ball identities, hole entries and the counted-once guard

use std::collections::HashSet;

use pk_stage::HoleKind;
use serde::{Deserialize, Serialize};

use crate::config::{BoardConfig, HoleConfig};
use crate::lottery::HoldDecision;

/// Identity of one physical ball
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BallId(pub u64);

/// A ball entering a hole, as reported by the physics layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallEntry {
    pub ball: BallId,
    pub hole: HoleKind,
    pub add_in_count: i32,
    pub prize_balls: i32,
}

impl BallEntry {
    /// Entry carrying the configured effects of its hole
    pub fn from_board(ball: BallId, hole: HoleKind, board: &BoardConfig) -> Self {
        let config = board.hole(hole);
        Self {
            ball,
            hole,
            add_in_count: config.add_in_count,
            prize_balls: config.prize_balls,
        }
    }

    pub fn in_count(&self) -> u32 {
        self.add_in_count.max(0) as u32
    }

    pub fn prize_balls(&self) -> u32 {
        self.prize_balls.max(0) as u32
    }
}

impl BoardConfig {
    pub fn hole(&self, kind: HoleKind) -> &HoleConfig {
        match kind {
            HoleKind::Start => &self.start_hole,
            HoleKind::Prize => &self.prize_hole,
            HoleKind::Out => &self.out_hole,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreReason {
    NotInHit,
    GateClosed,
}

impl IgnoreReason {
    pub fn name(&self) -> &'static str {
        match self {
            IgnoreReason::NotInHit => "not_in_hit",
            IgnoreReason::GateClosed => "gate_closed",
        }
    }
}

/// Result of processing one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Not counted; the ball stays free to enter another hole
    Ignored(IgnoreReason),
    /// This ball was already counted once
    AlreadyCounted,
    Start(HoldDecision),
    Prize { accepted: bool },
    Out,
}

/// Live balls and the counted-once markers attached to them
#[derive(Debug, Default)]
pub struct BallRegistry {
    next_id: u64,
    live: HashSet<BallId>,
    counted: HashSet<BallId>,
}

impl BallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self) -> BallId {
        self.next_id += 1;
        let id = BallId(self.next_id);
        self.live.insert(id);
        id
    }

    /// Attach the guard marker. Returns false if it was already there.
    pub fn mark_counted(&mut self, ball: BallId) -> bool {
        self.counted.insert(ball)
    }

    pub fn is_counted(&self, ball: BallId) -> bool {
        self.counted.contains(&ball)
    }

    /// Drop a ball together with its marker
    pub fn despawn(&mut self, ball: BallId) -> bool {
        self.counted.remove(&ball);
        self.live.remove(&ball)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}
