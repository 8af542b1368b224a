//! RoundDirector — multi-round hit (bonus) progression
//!
//! A hit runs `round_count` rounds. Each round draws a prize-entry quota,
//! cycles the prize gate and arms a safety timer. A round ends exactly once,
//! either on quota or on timeout; the ending guard and the round identity
//! carried by every timer absorb whichever path arrives second.

use std::time::Duration;

use pk_core::Countdown;
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::config::{GateTiming, HitSpec};
use crate::gate::{GateCycle, GateTransition};
use crate::ledger::BallLedger;

// ═══════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// State of the active hit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitSession {
    /// 1-based; 0 only before the first round starts
    pub current_round: u32,
    pub round_count: u32,
    pub in_count: u32,
    pub target_in: u32,
    pub total_payout: u32,
    pub ended_by_timeout: bool,
    pub is_ending_round: bool,
    /// Rounds closed by the safety timer so far
    pub timeouts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: u32,
    pub in_count: u32,
    pub target: u32,
    pub ended_by_timeout: bool,
    pub payout_so_far: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitSummary {
    pub rounds_played: u32,
    pub total_payout: u32,
    pub timeouts: u32,
}

/// Director output, drained by the owner in emission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundNotice {
    HitStarted {
        round_count: u32,
    },
    RoundStarted {
        round: u32,
        target_in: u32,
    },
    Gate(GateTransition),
    PrizeIn {
        round: u32,
        in_count: u32,
        target_in: u32,
        payout: u32,
    },
    RoundEnded(RoundSummary),
    HitEnded(HitSummary),
}

/// Round and hit observer
pub trait HitListener: Send {
    fn on_round_start(&mut self, _round: u32) {}
    fn on_round_end(&mut self, _summary: &RoundSummary) {}
    fn on_hit_end(&mut self, _summary: &HitSummary) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundTimer {
    /// Safety net of one specific round
    Safety { round: u32 },
    NextRound,
}

// ═══════════════════════════════════════════════════════════════════════════
// DIRECTOR
// ═══════════════════════════════════════════════════════════════════════════

pub struct RoundDirector {
    spec: HitSpec,
    gate: GateCycle,
    ledger: BallLedger,
    rng: StdRng,
    session: Option<HitSession>,
    timer: Option<(RoundTimer, Countdown)>,
    last_hit: Option<HitSummary>,
    notices: Vec<RoundNotice>,
    listeners: Vec<(ListenerId, Box<dyn HitListener>)>,
    next_listener: u64,
}

impl RoundDirector {
    pub fn new(spec: HitSpec, gate: GateTiming, ledger: BallLedger, rng: StdRng) -> Self {
        Self {
            spec,
            gate: GateCycle::new(gate),
            ledger,
            rng,
            session: None,
            timer: None,
            last_hit: None,
            notices: Vec::new(),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    // ─── queries ───────────────────────────────────────────────────────────

    pub fn is_in_hit(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&HitSession> {
        self.session.as_ref()
    }

    pub fn last_hit(&self) -> Option<HitSummary> {
        self.last_hit
    }

    pub fn gate(&self) -> &GateCycle {
        &self.gate
    }

    pub fn drain_notices(&mut self) -> Vec<RoundNotice> {
        std::mem::take(&mut self.notices)
    }

    // ─── listeners ─────────────────────────────────────────────────────────

    pub fn subscribe(&mut self, listener: Box<dyn HitListener>) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    // ─── hit lifecycle ─────────────────────────────────────────────────────

    /// Start a hit. Returns false (and changes nothing) while one is active.
    pub fn begin_hit(&mut self) -> bool {
        if self.session.is_some() {
            log::warn!("begin_hit ignored: hit already active");
            return false;
        }

        let round_count = self.spec.round_count.max(1);
        log::info!("hit start: {} rounds", round_count);

        self.session = Some(HitSession {
            round_count,
            ..HitSession::default()
        });
        self.ledger.set_hit(true);
        self.notices.push(RoundNotice::HitStarted { round_count });

        self.start_next_round();
        true
    }

    /// Open the next round with a fresh quota
    pub fn start_next_round(&mut self) {
        let (min, max) = self.spec.in_range();
        let target = self.rng.random_range(min..=max);

        let Some(session) = self.session.as_mut() else {
            log::debug!("start_next_round outside a hit");
            return;
        };
        session.current_round += 1;
        session.in_count = 0;
        session.target_in = target;
        session.ended_by_timeout = false;
        session.is_ending_round = false;
        let round = session.current_round;

        log::info!("round {} start: target {}", round, target);

        self.gate.start_cycle();
        self.pump_gate();

        self.timer = self
            .spec
            .safety_timeout()
            .map(|limit| (RoundTimer::Safety { round }, Countdown::new(limit)));

        self.notices.push(RoundNotice::RoundStarted {
            round,
            target_in: target,
        });
        for (_, listener) in &mut self.listeners {
            listener.on_round_start(round);
        }
    }

    /// Count one prize entry. Returns false when it was not accepted.
    pub fn on_prize_in(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            log::debug!("prize entry outside a hit");
            return false;
        };
        if session.is_ending_round {
            log::debug!("prize entry while round {} ends", session.current_round);
            return false;
        }

        let payout = self.spec.balls_per_prize_in;
        session.in_count += 1;
        session.total_payout = session.total_payout.saturating_add(payout);
        self.ledger.add_balls(payout);

        let notice = RoundNotice::PrizeIn {
            round: session.current_round,
            in_count: session.in_count,
            target_in: session.target_in,
            payout: session.total_payout,
        };
        let quota_met = session.in_count >= session.target_in;
        self.notices.push(notice);

        if quota_met {
            self.end_current_round();
        }
        true
    }

    /// End the running round. Side effects run at most once per round.
    pub fn end_current_round(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.is_ending_round {
            log::debug!("round {} already ending", session.current_round);
            return false;
        }
        session.is_ending_round = true;
        if session.ended_by_timeout {
            session.timeouts += 1;
        }

        let summary = RoundSummary {
            round: session.current_round,
            in_count: session.in_count,
            target: session.target_in,
            ended_by_timeout: session.ended_by_timeout,
            payout_so_far: session.total_payout,
        };
        let more_rounds = session.current_round < session.round_count;

        self.timer = None;
        self.gate.stop_cycle();
        self.pump_gate();

        log::info!(
            "round {} end: {}/{}{}",
            summary.round,
            summary.in_count,
            summary.target,
            if summary.ended_by_timeout { " (timeout)" } else { "" }
        );
        self.notices.push(RoundNotice::RoundEnded(summary));
        for (_, listener) in &mut self.listeners {
            listener.on_round_end(&summary);
        }

        if more_rounds {
            self.timer = Some((
                RoundTimer::NextRound,
                Countdown::new(self.spec.inter_round_wait()),
            ));
        } else {
            self.end_hit();
        }
        true
    }

    /// Close the hit and reset the session
    pub fn end_hit(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };

        self.timer = None;
        self.gate.stop_cycle();
        self.pump_gate();
        self.ledger.set_hit(false);

        let summary = HitSummary {
            rounds_played: session.current_round,
            total_payout: session.total_payout,
            timeouts: session.timeouts,
        };
        self.last_hit = Some(summary);

        log::info!(
            "hit end: {} rounds, payout {}, timeouts {}",
            summary.rounds_played,
            summary.total_payout,
            summary.timeouts
        );
        self.notices.push(RoundNotice::HitEnded(summary));
        for (_, listener) in &mut self.listeners {
            listener.on_hit_end(&summary);
        }
        true
    }

    // ─── time ──────────────────────────────────────────────────────────────

    pub fn tick(&mut self, dt: Duration) {
        self.gate.tick(dt);
        self.pump_gate();

        let mut budget = dt;
        while let Some((kind, timer)) = self.timer.as_mut() {
            let kind = *kind;
            let Some(overshoot) = timer.tick(budget) else {
                break;
            };
            budget = overshoot;
            self.timer = None;

            match kind {
                RoundTimer::Safety { round } => self.expire_round(round),
                RoundTimer::NextRound => {
                    self.start_next_round();
                    // the fresh round's gate gets the remainder of this tick
                    self.gate.tick(budget);
                    self.pump_gate();
                }
            }
        }
    }

    fn expire_round(&mut self, round: u32) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.current_round != round || session.is_ending_round {
            log::debug!("stale safety timer for round {}", round);
            return;
        }
        log::warn!("round {} hit its safety timeout", round);
        session.ended_by_timeout = true;
        self.end_current_round();
    }

    fn pump_gate(&mut self) {
        self.notices.extend(
            self.gate
                .drain_transitions()
                .into_iter()
                .map(RoundNotice::Gate),
        );
    }
}
