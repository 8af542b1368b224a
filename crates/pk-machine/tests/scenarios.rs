//! End-to-end machine scenarios
//!
//! Every scenario drives a seeded `PachinkoMachine` with explicit ticks and
//! asserts on the published stage events.

use std::sync::Arc;
use std::time::Duration;

use pk_core::PkError;
use pk_machine::{
    AutoPush, EntryOutcome, HIT_TAG, HoldDecision, MachineConfig, PachinkoMachine, PushButton,
    ReachPresenter, SlotState,
};
use pk_stage::{HoleKind, Stage, StageSubscription, StageTrace};

// ═══════════════════════════════════════════════════════════════════════════════
// FIXTURES
// ═══════════════════════════════════════════════════════════════════════════════

const TICK: Duration = Duration::from_millis(16);

fn machine(config: MachineConfig) -> (PachinkoMachine, StageSubscription) {
    let mut machine = PachinkoMachine::with_seed(config, 2024).unwrap();
    let sub = machine.subscribe();
    (machine, sub)
}

fn run(machine: &mut PachinkoMachine, seconds: f32) {
    for _ in 0..(seconds / 0.016).ceil() as usize {
        machine.tick(TICK);
    }
}

fn record(trace: &mut StageTrace, sub: &StageSubscription) {
    trace.extend(sub.drain());
}

fn guaranteed_win() -> MachineConfig {
    let mut config = MachineConfig::turbo();
    config.lottery.win_rate = 1.0;
    config.hit.round_count = 2;
    config.hit.min_in_per_round = 3;
    config.hit.max_in_per_round = 3;
    config.hit.balls_per_prize_in = 10;
    config.hit.max_round_secs = 0.0;
    config
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_queued_spin_runs_without_reinvocation() {
    let mut config = MachineConfig::turbo();
    config.lottery.win_rate = 0.0;
    let (mut m, sub) = machine(config);
    let mut trace = StageTrace::new("queued");

    let first = m.launch_ball().unwrap();
    let second = m.launch_ball().unwrap();
    assert!(matches!(
        m.enter_hole(first, HoleKind::Start),
        EntryOutcome::Start(HoldDecision::Started { .. })
    ));
    assert_eq!(
        m.enter_hole(second, HoleKind::Start),
        EntryOutcome::Start(HoldDecision::Held { count: 1 })
    );

    run(&mut m, 5.0);
    record(&mut trace, &sub);

    assert_eq!(trace.count("spin_start"), 2);
    assert_eq!(trace.count("spin_end"), 2);
    assert_eq!(trace.count("hold_consumed"), 1);
    assert!(trace.position("slot_hidden") < trace.position("hold_consumed"));
    assert_eq!(m.lottery().hold_count(), 0);
    assert!(!m.lottery().is_busy());

    // the second spin began only after the first finished
    let starts: Vec<usize> = trace
        .events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.type_name() == "spin_start")
        .map(|(i, _)| i)
        .collect();
    let first_end = trace.position("spin_end").unwrap();
    assert!(starts[0] < first_end && first_end < starts[1]);
}

#[test]
fn test_reach_waits_for_push() {
    let mut config = MachineConfig::turbo();
    config.lottery.win_rate = 1.0;
    let (mut m, sub) = machine(config);
    let button = Arc::new(PushButton::new());
    let presenter: Arc<dyn ReachPresenter> = button.clone();
    m.set_reach_presenter(Some(presenter));
    let mut trace = StageTrace::new("reach");

    m.request_spin();
    run(&mut m, 30.0);
    assert_eq!(m.snapshot().slot_state, SlotState::WaitingForResume);
    assert!(button.is_waiting());
    assert!(!m.ledger().is_hit());

    assert!(button.press());
    assert!(!button.press());
    run(&mut m, 2.0);
    record(&mut trace, &sub);

    assert_eq!(trace.count("reach_wait"), 1);
    assert_eq!(trace.count("reach_resume"), 1);
    assert!(trace.position("reach_wait") < trace.position("reach_resume"));
    assert!(trace.position("reach_resume") < trace.position("hit_start"));

    let wait = trace.find_event(|e| e.type_name() == "reach_wait").unwrap();
    assert_eq!(
        wait.stage,
        Stage::ReachWait {
            spin_id: 1,
            presentation_key: "reach.strong".into()
        }
    );

    // the center reel only started stopping after the push
    let stops = trace.reel_stops();
    assert_eq!(stops.iter().map(|(reel, _)| *reel).collect::<Vec<_>>(), vec![0, 2, 1]);
}

#[test]
fn test_auto_push_never_stalls_a_reach() {
    let mut config = MachineConfig::turbo();
    config.lottery.win_rate = 1.0;
    config.hit.max_round_secs = 0.5;
    config.hit.round_count = 1;
    let (mut m, sub) = machine(config);
    let presenter: Arc<dyn ReachPresenter> = Arc::new(AutoPush);
    m.set_reach_presenter(Some(presenter));
    let mut trace = StageTrace::new("auto-push");

    m.request_spin();
    run(&mut m, 3.0);
    record(&mut trace, &sub);

    assert_eq!(trace.count("reach_wait"), 1);
    assert_eq!(trace.count("reach_resume"), 1);
    assert_eq!(trace.count("spin_end"), 1);
    assert!(trace.position("reach_resume") < trace.position("hit_start"));
    assert_ne!(m.snapshot().slot_state, SlotState::WaitingForResume);
}

#[test]
fn test_oversized_timing_rejected_at_startup() {
    let mut config = MachineConfig::turbo();
    config.slot.pre_spin_secs = 1e30;
    assert!(matches!(
        PachinkoMachine::with_seed(config, 1),
        Err(PkError::InvalidConfig(_))
    ));

    let mut config = MachineConfig::turbo();
    config.reel.result_row = config.reel.symbol_count as usize;
    assert!(PachinkoMachine::with_seed(config, 1).is_err());
}

#[test]
fn test_guaranteed_win_pays_out() {
    let (mut m, sub) = machine(guaranteed_win());
    let mut trace = StageTrace::new("win");

    let starter = m.launch_ball().unwrap();
    m.enter_hole(starter, HoleKind::Start);

    let mut launched = 1u32;
    for _ in 0..2000 {
        m.tick(TICK);
        if m.director().last_hit().is_some() {
            break;
        }
        if m.snapshot().gate_open {
            let ball = m.launch_ball().unwrap();
            launched += 1;
            m.enter_hole(ball, HoleKind::Prize);
            m.despawn_ball(ball);
        }
    }
    record(&mut trace, &sub);

    let hit = m.director().last_hit().unwrap();
    assert_eq!(hit.total_payout, 60);
    assert_eq!(hit.rounds_played, 2);
    assert_eq!(hit.timeouts, 0);
    assert_eq!(trace.total_payout(), 60);
    assert_eq!(trace.count("prize_in"), 6);
    assert_eq!(trace.count("round_end"), 2);

    let round_start = trace.find_event(|e| e.type_name() == "round_start").unwrap();
    assert!(round_start.tags.iter().any(|t| t == HIT_TAG));
    let spin_start = trace.find_event(|e| e.type_name() == "spin_start").unwrap();
    assert!(spin_start.tags.is_empty());

    assert_eq!(m.ledger().balls(), 100 - launched + 60);
    assert!(!m.ledger().is_hit());
    assert_eq!(m.stats().hits, 1);
    assert_eq!(m.stats().prize_payout, 60);
}

#[test]
fn test_stalled_round_times_out() {
    let mut config = MachineConfig::turbo();
    config.lottery.win_rate = 1.0;
    config.hit.round_count = 1;
    config.hit.min_in_per_round = 5;
    config.hit.max_in_per_round = 5;
    config.hit.max_round_secs = 1.0;
    let (mut m, sub) = machine(config);
    let mut trace = StageTrace::new("timeout");

    m.request_spin();
    run(&mut m, 4.0);
    record(&mut trace, &sub);

    let start = trace.find_event(|e| e.type_name() == "round_start").unwrap();
    let end = trace.find_event(|e| e.type_name() == "round_end").unwrap();
    let waited = end.timestamp_ms - start.timestamp_ms;
    assert!((1000.0..1020.0).contains(&waited), "waited {waited} ms");

    assert!(matches!(
        end.stage,
        Stage::RoundEnd {
            by_timeout: true,
            in_count: 0,
            ..
        }
    ));
    assert_eq!(m.director().last_hit().unwrap().total_payout, 0);
    assert_eq!(m.stats().round_timeouts, 1);
}

#[test]
fn test_ball_counted_once_across_overlapping_holes() {
    let (mut m, _sub) = machine(guaranteed_win());
    m.request_spin();

    for _ in 0..500 {
        m.tick(TICK);
        if m.snapshot().gate_open {
            break;
        }
    }
    assert!(m.snapshot().gate_open);

    let ball = m.launch_ball().unwrap();
    assert_eq!(
        m.enter_hole(ball, HoleKind::Prize),
        EntryOutcome::Prize { accepted: true }
    );
    assert_eq!(m.enter_hole(ball, HoleKind::Prize), EntryOutcome::AlreadyCounted);
    assert_eq!(m.enter_hole(ball, HoleKind::Out), EntryOutcome::AlreadyCounted);
    assert_eq!(m.snapshot().payout, 10);
}

#[test]
fn test_holds_during_hit_drain_after_it() {
    let mut config = guaranteed_win();
    config.hit.round_count = 1;
    config.hit.max_round_secs = 0.5;
    let (mut m, sub) = machine(config);
    let mut trace = StageTrace::new("holds");

    m.request_spin();
    for _ in 0..500 {
        m.tick(TICK);
        if m.ledger().is_hit() {
            break;
        }
    }
    assert!(m.ledger().is_hit());
    assert_eq!(m.request_spin(), HoldDecision::Held { count: 1 });

    run(&mut m, 2.0);
    record(&mut trace, &sub);

    assert!(trace.position("hit_end") < trace.position("hold_consumed"));
    assert_eq!(trace.count("spin_start"), 2);
}

#[test]
fn test_trace_exports_json() {
    let mut config = MachineConfig::turbo();
    config.lottery.win_rate = 0.0;
    let (mut m, sub) = machine(config);
    let mut trace = StageTrace::new("export");

    m.request_spin();
    run(&mut m, 2.0);
    record(&mut trace, &sub);

    let json = trace.to_json().unwrap();
    assert!(json.contains("\"type\": \"spin_start\""));
    let parsed: StageTrace = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.len(), trace.len());
}
