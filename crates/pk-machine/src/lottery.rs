//! LotteryCoordinator — spin admission, hold queue and outcome draw
//!
//! One spin is in flight at a time. Start-hole entries that arrive while a
//! spin (or its result presentation) runs, or while a hit is active, become
//! holds up to `max_hold`; the rest are rejected. Holds drain one at a time
//! whenever the coordinator goes idle outside a hit.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pk_core::{Countdown, DEFAULT_SYMBOL_COUNT, secs};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::config::LotteryConfig;
use crate::round::RoundDirector;
use crate::slot::{
    ReelPosition, ResumeHandle, SlotEvent, SlotOrchestrator, SpinId, SpinRequest, SpinTargets,
};

/// Presentation key of a reach that ends in a win
pub const REACH_STRONG: &str = "reach.strong";
/// Presentation key of a reach that ends in a loss
pub const REACH_NORMAL: &str = "reach.normal";

// ═══════════════════════════════════════════════════════════════════════════
// OUTCOME
// ═══════════════════════════════════════════════════════════════════════════

/// Drawn result of one lottery spin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryOutcome {
    pub targets: SpinTargets,
    pub is_win: bool,
    /// Left and right match
    pub is_reach: bool,
}

impl LotteryOutcome {
    pub fn presentation_key(&self) -> &'static str {
        if self.is_win { REACH_STRONG } else { REACH_NORMAL }
    }
}

/// Draw one outcome over labels `1..=symbol_count`
///
/// A win forces all three reels to one drawn label. A loss never shows three
/// equal labels: the center is nudged to the next label instead.
pub fn draw_outcome<R: Rng>(rng: &mut R, win_rate: f64, symbol_count: u8) -> LotteryOutcome {
    let n = symbol_count.max(2);
    let is_win = rng.random::<f64>() < win_rate;

    let mut left = rng.random_range(1..=n);
    let mut center = rng.random_range(1..=n);
    let mut right = rng.random_range(1..=n);

    if is_win {
        let v = rng.random_range(1..=n);
        left = v;
        center = v;
        right = v;
    } else if left == center && center == right {
        center = center % n + 1;
    }

    let targets = SpinTargets::new(left as i64, center as i64, right as i64);
    LotteryOutcome {
        targets,
        is_win,
        is_reach: targets.is_reach(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// REACH PRESENTATION
// ═══════════════════════════════════════════════════════════════════════════

/// What the reach presentation should play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachCue {
    pub spin: SpinId,
    pub is_win: bool,
    pub presentation_key: &'static str,
}

/// External reach/PUSH presentation
///
/// `play_reach_until_push` must eventually call `resume` exactly once; the
/// center reel loops until it does.
pub trait ReachPresenter: Send + Sync {
    fn play_reach_until_push(&self, cue: ReachCue, resume: ResumeHandle);

    /// Result animation after the center reel lands
    fn play_result(&self, _is_win: bool) {}
}

/// Holds the pending resume until the player presses PUSH
#[derive(Debug, Default)]
pub struct PushButton {
    pending: Mutex<Option<(ReachCue, ResumeHandle)>>,
}

impl PushButton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_waiting(&self) -> bool {
        self.pending.lock().is_some()
    }

    pub fn pending_cue(&self) -> Option<ReachCue> {
        self.pending.lock().as_ref().map(|(cue, _)| *cue)
    }

    /// Returns false when nothing was waiting
    pub fn press(&self) -> bool {
        match self.pending.lock().take() {
            Some((cue, handle)) => {
                log::debug!("PUSH for spin {} ({})", cue.spin, cue.presentation_key);
                handle.resume()
            }
            None => false,
        }
    }
}

impl ReachPresenter for PushButton {
    fn play_reach_until_push(&self, cue: ReachCue, resume: ResumeHandle) {
        *self.pending.lock() = Some((cue, resume));
    }
}

/// Resumes every reach at once
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoPush;

impl ReachPresenter for AutoPush {
    fn play_reach_until_push(&self, _cue: ReachCue, resume: ResumeHandle) {
        resume.resume();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// COORDINATOR
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    HoldDisabled,
    HoldFull,
}

impl RejectReason {
    pub fn name(&self) -> &'static str {
        match self {
            RejectReason::HoldDisabled => "hold_disabled",
            RejectReason::HoldFull => "hold_full",
        }
    }
}

/// Answer to a start-hole entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldDecision {
    Started { spin: SpinId },
    Held { count: u32 },
    Rejected { reason: RejectReason },
}

impl HoldDecision {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, HoldDecision::Rejected { .. })
    }
}

/// Coordinator output, drained by the owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LotteryEvent {
    SpinDrawn { spin: SpinId, outcome: LotteryOutcome },
    ReachWait { spin: SpinId, presentation_key: &'static str },
    Slot(SlotEvent),
    HoldAccepted { held: u32, max: u32 },
    HoldRejected { held: u32, max: u32, reason: RejectReason },
    HoldConsumed { held: u32, max: u32 },
}

#[derive(Debug)]
enum FlightPhase {
    Spinning,
    ResultPresentation(Countdown),
    LoseHold(Countdown),
}

#[derive(Debug)]
struct InFlight {
    spin: SpinId,
    outcome: LotteryOutcome,
    phase: FlightPhase,
}

pub struct LotteryCoordinator {
    config: LotteryConfig,
    slot: SlotOrchestrator,
    rng: StdRng,
    presenter: Option<Arc<dyn ReachPresenter>>,
    hold_count: u32,
    busy: bool,
    in_flight: Option<InFlight>,
    events: Vec<LotteryEvent>,
}

impl LotteryCoordinator {
    pub fn new(config: LotteryConfig, slot: SlotOrchestrator, rng: StdRng) -> Self {
        Self {
            config,
            slot,
            rng,
            presenter: None,
            hold_count: 0,
            busy: false,
            in_flight: None,
            events: Vec::new(),
        }
    }

    pub fn set_presenter(&mut self, presenter: Option<Arc<dyn ReachPresenter>>) {
        self.presenter = presenter;
    }

    // ─── queries ───────────────────────────────────────────────────────────

    pub fn hold_count(&self) -> u32 {
        self.hold_count
    }

    pub fn max_hold(&self) -> u32 {
        self.config.max_hold
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn slot(&self) -> &SlotOrchestrator {
        &self.slot
    }

    pub fn drain_events(&mut self) -> Vec<LotteryEvent> {
        std::mem::take(&mut self.events)
    }

    // ─── admission ─────────────────────────────────────────────────────────

    /// Handle one start-hole entry
    pub fn request_spin(&mut self, director: &RoundDirector) -> HoldDecision {
        if director.is_in_hit() || self.busy {
            return self.try_enqueue_hold();
        }
        let spin = self.play_from_start_hole();
        HoldDecision::Started { spin }
    }

    /// Mark the spin presentation finished (or started). Going idle drains
    /// one hold, never during a hit.
    pub fn set_busy(&mut self, busy: bool, director: &RoundDirector) {
        self.busy = busy;
        if !busy {
            self.consume_hold_if_any(director);
        }
    }

    /// The director closed its hit; held spins may run again
    pub fn on_hit_ended(&mut self, director: &RoundDirector) {
        if self.in_flight.is_some() {
            return;
        }
        self.set_busy(false, director);
    }

    fn try_enqueue_hold(&mut self) -> HoldDecision {
        let max = self.config.max_hold;
        let reason = if max == 0 {
            Some(RejectReason::HoldDisabled)
        } else if self.hold_count >= max {
            Some(RejectReason::HoldFull)
        } else {
            None
        };

        if let Some(reason) = reason {
            log::debug!("hold rejected ({}): {}/{}", reason.name(), self.hold_count, max);
            self.events.push(LotteryEvent::HoldRejected {
                held: self.hold_count,
                max,
                reason,
            });
            return HoldDecision::Rejected { reason };
        }

        self.hold_count += 1;
        log::info!("hold +1 => {}/{}", self.hold_count, max);
        self.events.push(LotteryEvent::HoldAccepted {
            held: self.hold_count,
            max,
        });
        HoldDecision::Held {
            count: self.hold_count,
        }
    }

    fn consume_hold_if_any(&mut self, director: &RoundDirector) {
        if self.hold_count == 0 || director.is_in_hit() {
            return;
        }

        self.hold_count -= 1;
        log::info!("hold consume => {}/{}", self.hold_count, self.config.max_hold);
        self.events.push(LotteryEvent::HoldConsumed {
            held: self.hold_count,
            max: self.config.max_hold,
        });
        self.play_from_start_hole();
    }

    fn play_from_start_hole(&mut self) -> SpinId {
        self.busy = true;

        let symbols = (self.slot.reel(ReelPosition::Left).symbol_count() as u8)
            .min(DEFAULT_SYMBOL_COUNT);
        let outcome = draw_outcome(&mut self.rng, self.config.win_rate, symbols);
        log::info!(
            "lottery: win={} reach={} targets={:?}",
            outcome.is_win,
            outcome.is_reach,
            outcome.targets.labels()
        );

        let mut request = SpinRequest::new(outcome.targets);
        let presenter = self.presenter.as_ref().filter(|_| outcome.is_reach).map(Arc::clone);
        if let Some(presenter) = presenter {
            let is_win = outcome.is_win;
            let key = outcome.presentation_key();
            request = request.with_before_center_stop(move |resume| {
                let cue = ReachCue {
                    spin: resume.spin(),
                    is_win,
                    presentation_key: key,
                };
                presenter.play_reach_until_push(cue, resume);
            });
        }

        let spin = self.slot.request_spin(request).spin();
        self.in_flight = Some(InFlight {
            spin,
            outcome,
            phase: FlightPhase::Spinning,
        });
        self.events.push(LotteryEvent::SpinDrawn { spin, outcome });
        self.forward_slot_events();
        spin
    }

    // ─── time ──────────────────────────────────────────────────────────────

    pub fn tick(&mut self, dt: Duration, director: &mut RoundDirector) {
        self.tick_presentation(dt, director);
        self.slot.tick(dt);
        for spin in self.forward_slot_events() {
            self.on_spin_finished(spin, director);
        }
    }

    fn tick_presentation(&mut self, dt: Duration, director: &mut RoundDirector) {
        let Some(flight) = self.in_flight.as_mut() else {
            return;
        };

        match &mut flight.phase {
            FlightPhase::Spinning => {}
            FlightPhase::ResultPresentation(timer) => {
                if timer.tick(dt).is_some() {
                    self.settle_outcome(director);
                }
            }
            FlightPhase::LoseHold(timer) => {
                if timer.tick(dt).is_some() {
                    self.conclude(director);
                }
            }
        }
    }

    /// Forward slot output; returns the spins that finished
    fn forward_slot_events(&mut self) -> Vec<SpinId> {
        let mut finished = Vec::new();
        for event in self.slot.drain_events() {
            match &event {
                SlotEvent::AwaitingResume { spin } => {
                    if let Some(flight) = self.in_flight.as_ref().filter(|f| f.spin == *spin) {
                        self.events.push(LotteryEvent::ReachWait {
                            spin: *spin,
                            presentation_key: flight.outcome.presentation_key(),
                        });
                    }
                }
                SlotEvent::Finished(result) => finished.push(result.spin),
                _ => {}
            }
            self.events.push(LotteryEvent::Slot(event));
        }
        finished
    }

    fn on_spin_finished(&mut self, spin: SpinId, director: &mut RoundDirector) {
        let Some(flight) = self.in_flight.as_mut() else {
            return;
        };
        if flight.spin != spin {
            log::debug!("ignoring completion of stale spin {}", spin);
            return;
        }

        let is_win = flight.outcome.is_win;
        let presenter = self.presenter.clone().filter(|_| flight.outcome.is_reach);
        match presenter {
            Some(presenter) => {
                presenter.play_result(is_win);
                flight.phase = FlightPhase::ResultPresentation(Countdown::new(secs(
                    self.config.reach_result_secs,
                )));
            }
            None => self.settle_outcome(director),
        }
    }

    /// Win starts the hit; a loss keeps the slot up for `lose_hold_secs`
    fn settle_outcome(&mut self, director: &mut RoundDirector) {
        let Some(flight) = self.in_flight.as_mut() else {
            return;
        };

        if flight.outcome.is_win {
            director.begin_hit();
            self.conclude(director);
        } else if self.config.lose_hold_secs > 0.0 {
            flight.phase = FlightPhase::LoseHold(Countdown::new(secs(self.config.lose_hold_secs)));
        } else {
            self.conclude(director);
        }
    }

    fn conclude(&mut self, director: &RoundDirector) {
        self.in_flight = None;
        self.slot.hide();
        self.forward_slot_events();
        self.set_busy(false, director);
    }
}
