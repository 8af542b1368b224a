//! PachinkoMachine — composition root
//!
//! Owns every state machine, wires them together explicitly and republishes
//! everything they do as timestamped [`StageEvent`]s on a [`StageBus`].
//!
//! Tick order: round director (timers, gate) → director notices (a hit end
//! lets the coordinator drain its holds) → lottery coordinator (slot, result
//! presentation) → outbound events again.

use std::sync::Arc;
use std::time::Duration;

use pk_core::{PkResult, SessionClock};
use pk_stage::{HoleKind, Stage, StageBus, StageEvent, StageSubscription, SubscriptionId};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::board::{BallEntry, BallId, BallRegistry, EntryOutcome, IgnoreReason};
use crate::config::MachineConfig;
use crate::gate::GateTransition;
use crate::ledger::{BallLedger, LedgerSnapshot};
use crate::lottery::{HoldDecision, LotteryCoordinator, LotteryEvent, ReachPresenter};
use crate::round::{HitListener, ListenerId, RoundDirector, RoundNotice};
use crate::slot::{SlotEvent, SlotOrchestrator, SlotState};

/// Tag carried by every stage event published while a hit is active
pub const HIT_TAG: &str = "hit";

// ═══════════════════════════════════════════════════════════════════════════
// STATS / SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════

/// Session statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineStats {
    pub spins: u64,
    pub wins: u64,
    pub reaches: u64,
    pub hits: u64,
    pub rounds: u64,
    pub round_timeouts: u64,
    pub holds_accepted: u64,
    pub holds_rejected: u64,
    pub holds_consumed: u64,
    pub balls_launched: u64,
    pub launch_rejections: u64,
    pub prize_payout: u64,
}

impl MachineStats {
    /// Fold one published stage into the counters
    pub fn record(&mut self, stage: &Stage) {
        match stage {
            Stage::SpinStart { reach, win, .. } => {
                self.spins += 1;
                self.wins += *win as u64;
                self.reaches += *reach as u64;
            }
            Stage::HitStart { .. } => self.hits += 1,
            Stage::RoundEnd { by_timeout, .. } => {
                self.rounds += 1;
                self.round_timeouts += *by_timeout as u64;
            }
            Stage::HitEnd { total_payout, .. } => self.prize_payout += *total_payout as u64,
            Stage::HoldAccepted { .. } => self.holds_accepted += 1,
            Stage::HoldRejected { .. } => self.holds_rejected += 1,
            Stage::HoldConsumed { .. } => self.holds_consumed += 1,
            Stage::BallLaunched { .. } => self.balls_launched += 1,
            Stage::LaunchRejected { .. } => self.launch_rejections += 1,
            _ => {}
        }
    }

    /// Win rate in percent
    pub fn win_rate(&self) -> f64 {
        if self.spins > 0 {
            (self.wins as f64 / self.spins as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Everything a HUD shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub ledger: LedgerSnapshot,
    pub round: u32,
    pub round_count: u32,
    pub in_this_round: u32,
    pub target_in: u32,
    pub payout: u32,
    pub hold: u32,
    pub max_hold: u32,
    pub busy: bool,
    pub gate_open: bool,
    pub slot_state: SlotState,
    pub slot_visible: bool,
    pub live_balls: usize,
    pub elapsed_ms: f64,
}

// ═══════════════════════════════════════════════════════════════════════════
// MACHINE
// ═══════════════════════════════════════════════════════════════════════════

pub struct PachinkoMachine {
    config: MachineConfig,
    ledger: BallLedger,
    lottery: LotteryCoordinator,
    director: RoundDirector,
    balls: BallRegistry,
    clock: SessionClock,
    bus: StageBus,
    stats: MachineStats,
}

impl PachinkoMachine {
    /// Create with OS-seeded randomness
    pub fn new(config: MachineConfig) -> PkResult<Self> {
        Self::build(config, StdRng::from_os_rng(), StdRng::from_os_rng())
    }

    /// Create with deterministic randomness
    pub fn with_seed(config: MachineConfig, seed: u64) -> PkResult<Self> {
        Self::build(
            config,
            StdRng::seed_from_u64(seed),
            StdRng::seed_from_u64(seed.wrapping_add(0x9E37_79B9)),
        )
    }

    fn build(config: MachineConfig, lottery_rng: StdRng, round_rng: StdRng) -> PkResult<Self> {
        if let Err(e) = config.validate() {
            log::error!("machine config rejected: {}", e);
            return Err(e);
        }

        let ledger = BallLedger::new(config.board.start_balls);
        let slot = SlotOrchestrator::new(config.reel.clone(), config.slot.clone())?;
        let lottery = LotteryCoordinator::new(config.lottery.clone(), slot, lottery_rng);
        let director = RoundDirector::new(
            config.hit.clone(),
            config.gate.clone(),
            ledger.clone(),
            round_rng,
        );

        log::info!(
            "machine ready: {} balls, win rate {}, max hold {}",
            config.board.start_balls,
            config.lottery.win_rate,
            config.lottery.max_hold
        );

        Ok(Self {
            config,
            ledger,
            lottery,
            director,
            balls: BallRegistry::new(),
            clock: SessionClock::new(),
            bus: StageBus::new(),
            stats: MachineStats::default(),
        })
    }

    // ─── wiring ────────────────────────────────────────────────────────────

    pub fn set_reach_presenter(&mut self, presenter: Option<Arc<dyn ReachPresenter>>) {
        self.lottery.set_presenter(presenter);
    }

    pub fn subscribe(&mut self) -> StageSubscription {
        self.bus.subscribe()
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn subscribe_hits(&mut self, listener: Box<dyn HitListener>) -> ListenerId {
        self.director.subscribe(listener)
    }

    pub fn unsubscribe_hits(&mut self, id: ListenerId) -> bool {
        self.director.unsubscribe(id)
    }

    // ─── queries ───────────────────────────────────────────────────────────

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Shared handle to the ball balance
    pub fn ledger(&self) -> &BallLedger {
        &self.ledger
    }

    pub fn lottery(&self) -> &LotteryCoordinator {
        &self.lottery
    }

    pub fn director(&self) -> &RoundDirector {
        &self.director
    }

    pub fn stats(&self) -> &MachineStats {
        &self.stats
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        let session = self.director.session();
        let slot = self.lottery.slot();
        MachineSnapshot {
            ledger: self.ledger.snapshot(),
            round: session.map_or(0, |s| s.current_round),
            round_count: session.map_or(0, |s| s.round_count),
            in_this_round: session.map_or(0, |s| s.in_count),
            target_in: session.map_or(0, |s| s.target_in),
            payout: session.map_or(0, |s| s.total_payout),
            hold: self.lottery.hold_count(),
            max_hold: self.lottery.max_hold(),
            busy: self.lottery.is_busy(),
            gate_open: self.director.gate().is_open(),
            slot_state: slot.state(),
            slot_visible: slot.is_visible(),
            live_balls: self.balls.live_count(),
            elapsed_ms: self.clock.now_ms(),
        }
    }

    // ─── balls ─────────────────────────────────────────────────────────────

    /// Spend one ball and put it into play. `None` when the tray is empty.
    pub fn launch_ball(&mut self) -> Option<BallId> {
        if !self.ledger.try_consume_ball(1) {
            self.publish(Stage::LaunchRejected { balls_left: 0 });
            return None;
        }

        let ball = self.balls.spawn();
        self.publish(Stage::BallLaunched {
            ball_id: ball.0,
            balls_left: self.ledger.balls(),
        });
        Some(ball)
    }

    /// The ball left play; its counted marker goes with it
    pub fn despawn_ball(&mut self, ball: BallId) -> bool {
        self.balls.despawn(ball)
    }

    /// Ball entered a hole, using the board's configured effects
    pub fn enter_hole(&mut self, ball: BallId, hole: HoleKind) -> EntryOutcome {
        let entry = BallEntry::from_board(ball, hole, &self.config.board);
        self.on_ball_entered(entry)
    }

    pub fn on_ball_entered(&mut self, entry: BallEntry) -> EntryOutcome {
        if entry.hole == HoleKind::Prize {
            let ignore = if !self.director.is_in_hit() {
                Some(IgnoreReason::NotInHit)
            } else if self.config.board.prize_hole.gate_controlled
                && !self.director.gate().is_open()
            {
                Some(IgnoreReason::GateClosed)
            } else {
                None
            };

            if let Some(reason) = ignore {
                self.publish(Stage::EntryIgnored {
                    ball_id: entry.ball.0,
                    hole: entry.hole,
                    reason: reason.name().to_string(),
                });
                return EntryOutcome::Ignored(reason);
            }
        }

        if !self.balls.mark_counted(entry.ball) {
            log::debug!("ball {:?} already counted", entry.ball);
            return EntryOutcome::AlreadyCounted;
        }

        self.publish(Stage::BallEntered {
            ball_id: entry.ball.0,
            hole: entry.hole,
        });
        self.ledger.add_in_count(entry.in_count());

        let outcome = match entry.hole {
            HoleKind::Start => {
                let decision = self.lottery.request_spin(&self.director);
                self.ledger.add_balls(entry.prize_balls());
                EntryOutcome::Start(decision)
            }
            HoleKind::Prize => {
                let accepted = self.director.on_prize_in();
                self.ledger.add_balls(entry.prize_balls());
                EntryOutcome::Prize { accepted }
            }
            HoleKind::Out => EntryOutcome::Out,
        };
        self.pump();
        outcome
    }

    /// Lottery request that bypasses the board (debug key, tests)
    pub fn request_spin(&mut self) -> HoldDecision {
        let decision = self.lottery.request_spin(&self.director);
        self.pump();
        decision
    }

    // ─── time ──────────────────────────────────────────────────────────────

    pub fn tick(&mut self, dt: Duration) {
        self.clock.advance(dt);

        self.director.tick(dt);
        self.pump();

        self.lottery.tick(dt, &mut self.director);
        self.pump();
    }

    // ─── publishing ────────────────────────────────────────────────────────

    fn pump(&mut self) {
        loop {
            let lottery_events = self.lottery.drain_events();
            let notices = self.director.drain_notices();
            if lottery_events.is_empty() && notices.is_empty() {
                return;
            }

            for event in lottery_events {
                if let Some(stage) = lottery_stage(event) {
                    self.publish(stage);
                }
            }

            let mut hit_ended = false;
            for notice in notices {
                hit_ended |= matches!(notice, RoundNotice::HitEnded(_));
                self.publish(round_stage(notice));
            }
            if hit_ended {
                self.lottery.on_hit_ended(&self.director);
            }
        }
    }

    fn publish(&mut self, stage: Stage) {
        self.stats.record(&stage);
        let mut event = StageEvent::new(stage, self.clock.now_ms());
        if self.ledger.is_hit() {
            event = event.with_tag(HIT_TAG);
        }
        self.bus.publish(&event);
    }
}

fn lottery_stage(event: LotteryEvent) -> Option<Stage> {
    let stage = match event {
        LotteryEvent::SpinDrawn { spin, outcome } => Stage::SpinStart {
            spin_id: spin.0,
            targets: outcome.targets.labels(),
            reach: outcome.is_reach,
            win: outcome.is_win,
        },
        LotteryEvent::ReachWait {
            spin,
            presentation_key,
        } => Stage::ReachWait {
            spin_id: spin.0,
            presentation_key: presentation_key.to_string(),
        },
        LotteryEvent::HoldAccepted { held, max } => Stage::HoldAccepted { held, max },
        LotteryEvent::HoldRejected { held, max, reason } => Stage::HoldRejected {
            held,
            max,
            reason: reason.name().to_string(),
        },
        LotteryEvent::HoldConsumed { held, max } => Stage::HoldConsumed { held, max },
        LotteryEvent::Slot(slot) => match slot {
            SlotEvent::Queued { spin, depth } => Stage::SpinQueued {
                spin_id: spin.0,
                depth: depth as u32,
            },
            SlotEvent::ReelStopped { spin, reel, symbol } => Stage::ReelStop {
                spin_id: spin.0,
                reel_index: reel.index() as u8,
                symbol: symbol.label(),
            },
            SlotEvent::Resumed { spin } => Stage::ReachResume { spin_id: spin.0 },
            SlotEvent::Finished(result) => {
                let [l, c, r] = result.labels();
                Stage::SpinEnd {
                    spin_id: result.spin.0,
                    symbols: [l, c, r],
                    win: l == c && c == r,
                }
            }
            SlotEvent::Hidden { .. } => Stage::SlotHidden,
            // covered by SpinStart / ReachWait
            SlotEvent::Started { .. } | SlotEvent::AwaitingResume { .. } => return None,
        },
    };
    Some(stage)
}

fn round_stage(notice: RoundNotice) -> Stage {
    match notice {
        RoundNotice::HitStarted { round_count } => Stage::HitStart { round_count },
        RoundNotice::RoundStarted { round, target_in } => Stage::RoundStart { round, target_in },
        RoundNotice::Gate(GateTransition::Opened) => Stage::GateOpen,
        RoundNotice::Gate(GateTransition::Closed) => Stage::GateClose,
        RoundNotice::PrizeIn {
            round,
            in_count,
            target_in,
            payout,
        } => Stage::PrizeIn {
            round,
            in_count,
            target_in,
            payout,
        },
        RoundNotice::RoundEnded(summary) => Stage::RoundEnd {
            round: summary.round,
            in_count: summary.in_count,
            target_in: summary.target,
            by_timeout: summary.ended_by_timeout,
        },
        RoundNotice::HitEnded(summary) => Stage::HitEnd {
            total_payout: summary.total_payout,
            rounds_played: summary.rounds_played,
            timeouts: summary.timeouts,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(config: MachineConfig) -> PachinkoMachine {
        PachinkoMachine::with_seed(config, 11).unwrap()
    }

    fn run(machine: &mut PachinkoMachine, seconds: f32) {
        for _ in 0..(seconds / 0.016).ceil() as usize {
            machine.tick(Duration::from_millis(16));
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = MachineConfig::default();
        config.lottery.win_rate = 2.0;
        assert!(PachinkoMachine::with_seed(config, 1).is_err());
    }

    #[test]
    fn test_launch_consumes_and_fails_closed() {
        let mut config = MachineConfig::turbo();
        config.board.start_balls = 2;
        let mut m = machine(config);

        assert!(m.launch_ball().is_some());
        assert!(m.launch_ball().is_some());
        assert!(m.launch_ball().is_none());
        assert_eq!(m.ledger().balls(), 0);
        assert_eq!(m.stats().balls_launched, 2);
        assert_eq!(m.stats().launch_rejections, 1);
    }

    #[test]
    fn test_prize_entry_ignored_outside_hit_keeps_ball_free() {
        let mut m = machine(MachineConfig::turbo());
        let ball = m.launch_ball().unwrap();

        assert_eq!(
            m.enter_hole(ball, HoleKind::Prize),
            EntryOutcome::Ignored(IgnoreReason::NotInHit)
        );
        // not marked: the same ball can still drain
        assert_eq!(m.enter_hole(ball, HoleKind::Out), EntryOutcome::Out);
        assert_eq!(m.enter_hole(ball, HoleKind::Out), EntryOutcome::AlreadyCounted);
    }

    #[test]
    fn test_start_entry_counts_once() {
        let mut m = machine(MachineConfig::turbo());
        let ball = m.launch_ball().unwrap();

        assert!(matches!(
            m.enter_hole(ball, HoleKind::Start),
            EntryOutcome::Start(HoldDecision::Started { .. })
        ));
        assert_eq!(m.enter_hole(ball, HoleKind::Start), EntryOutcome::AlreadyCounted);
        assert_eq!(m.ledger().in_count(), 1);
        assert_eq!(m.lottery().hold_count(), 0);

        m.despawn_ball(ball);
        assert_eq!(m.snapshot().live_balls, 0);
    }

    #[test]
    fn test_stats_follow_published_stages() {
        let mut config = MachineConfig::turbo();
        config.lottery.win_rate = 0.0;
        let mut m = machine(config);
        let sub = m.subscribe();

        m.request_spin();
        m.request_spin();
        run(&mut m, 5.0);

        assert_eq!(m.stats().spins, 2);
        assert_eq!(m.stats().holds_accepted, 1);
        assert_eq!(m.stats().holds_consumed, 1);
        assert_eq!(m.stats().wins, 0);

        let events = sub.drain();
        let ends = events.iter().filter(|e| e.type_name() == "spin_end").count();
        assert_eq!(ends, 2);
        assert!(events.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
    }

    #[test]
    fn test_snapshot_during_hit() {
        let mut config = MachineConfig::turbo();
        config.lottery.win_rate = 1.0;
        let mut m = machine(config);

        m.request_spin();
        run(&mut m, 2.0);

        let snap = m.snapshot();
        assert!(snap.ledger.is_hit);
        assert_eq!(snap.round, 1);
        assert_eq!(snap.round_count, 10);
        assert!((8..=12).contains(&snap.target_in));
        assert!(!snap.busy);
        assert!(!snap.slot_visible);
    }
}
