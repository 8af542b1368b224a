//! SlotOrchestrator — three-reel stop sequencing
//!
//! Reels stop left → right → center. Before the center stop the request may
//! suspend the spin on an external resume (the reach PUSH); the center reel
//! keeps looping until [`ResumeHandle::resume`] is called, with no timeout.
//!
//! Requests arriving while a spin is active are queued and started
//! automatically once the active spin finishes.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pk_core::{Countdown, DEFAULT_SYMBOL_COUNT, PkResult, Symbol};
use serde::{Deserialize, Serialize};

use crate::config::{ReelConfig, SlotTiming};
use crate::reel::{MotionTicket, Reel, ReelSettled};

// ═══════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// Monotonic spin identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpinId(pub u64);

impl fmt::Display for SpinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reel slot on the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReelPosition {
    Left,
    Center,
    Right,
}

impl ReelPosition {
    pub fn index(self) -> usize {
        match self {
            ReelPosition::Left => 0,
            ReelPosition::Center => 1,
            ReelPosition::Right => 2,
        }
    }
}

/// Target labels for one spin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinTargets {
    pub left: Symbol,
    pub center: Symbol,
    pub right: Symbol,
}

impl SpinTargets {
    /// Out-of-range values are clamped into `1..=9`
    pub fn new(left: i64, center: i64, right: i64) -> Self {
        Self {
            left: Symbol::clamped(left, DEFAULT_SYMBOL_COUNT),
            center: Symbol::clamped(center, DEFAULT_SYMBOL_COUNT),
            right: Symbol::clamped(right, DEFAULT_SYMBOL_COUNT),
        }
    }

    pub fn get(&self, position: ReelPosition) -> Symbol {
        match position {
            ReelPosition::Left => self.left,
            ReelPosition::Center => self.center,
            ReelPosition::Right => self.right,
        }
    }

    pub fn labels(&self) -> [u8; 3] {
        [self.left.label(), self.center.label(), self.right.label()]
    }

    /// Left and right match
    pub fn is_reach(&self) -> bool {
        self.left == self.right
    }

    pub fn is_triple(&self) -> bool {
        self.is_reach() && self.center == self.left
    }

    fn clamped_to(self, count: u8) -> Self {
        Self {
            left: Symbol::clamped(self.left.label() as i64, count),
            center: Symbol::clamped(self.center.label() as i64, count),
            right: Symbol::clamped(self.right.label() as i64, count),
        }
    }
}

/// Outcome of a finished spin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinResult {
    pub spin: SpinId,
    /// Landed labels (left, center, right)
    pub symbols: [Symbol; 3],
    /// The spin suspended before its center stop
    pub waited_for_resume: bool,
}

impl SpinResult {
    pub fn labels(&self) -> [u8; 3] {
        self.symbols.map(Symbol::label)
    }
}

#[derive(Debug, Default)]
struct ResumeLatch {
    released: AtomicBool,
    /// Set when the waiting spin is hidden
    orphaned: AtomicBool,
}

/// Releases a spin waiting before its center stop
///
/// Only the first [`resume`](Self::resume) has an effect. A handle whose spin
/// was hidden is inert and never reports success.
#[derive(Debug, Clone)]
pub struct ResumeHandle {
    spin: SpinId,
    latch: Arc<ResumeLatch>,
}

impl ResumeHandle {
    pub fn spin(&self) -> SpinId {
        self.spin
    }

    /// Returns true on the first call against a live spin only
    pub fn resume(&self) -> bool {
        if self.latch.orphaned.load(Ordering::Acquire) {
            return false;
        }
        !self.latch.released.swap(true, Ordering::AcqRel)
    }

    pub fn is_resumed(&self) -> bool {
        self.latch.released.load(Ordering::Acquire)
    }
}

pub type BeforeCenterStop = Box<dyn FnOnce(ResumeHandle) + Send>;
pub type OnSpinFinished = Box<dyn FnOnce(&SpinResult) + Send>;

/// A lottery spin handed to the orchestrator
pub struct SpinRequest {
    pub targets: SpinTargets,
    /// Called once, after the right reel stops, with the resume handle
    pub before_center_stop: Option<BeforeCenterStop>,
    /// Called once when the center reel lands; dropped on hide
    pub on_finished: Option<OnSpinFinished>,
}

impl SpinRequest {
    pub fn new(targets: SpinTargets) -> Self {
        Self {
            targets,
            before_center_stop: None,
            on_finished: None,
        }
    }

    pub fn with_before_center_stop(
        mut self,
        hook: impl FnOnce(ResumeHandle) + Send + 'static,
    ) -> Self {
        self.before_center_stop = Some(Box::new(hook));
        self
    }

    pub fn with_on_finished(mut self, callback: impl FnOnce(&SpinResult) + Send + 'static) -> Self {
        self.on_finished = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for SpinRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinRequest")
            .field("targets", &self.targets)
            .field("before_center_stop", &self.before_center_stop.is_some())
            .field("on_finished", &self.on_finished.is_some())
            .finish()
    }
}

/// Result of handing a request to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinAdmission {
    Started(SpinId),
    Queued { spin: SpinId, depth: usize },
}

impl SpinAdmission {
    pub fn spin(&self) -> SpinId {
        match self {
            SpinAdmission::Started(spin) | SpinAdmission::Queued { spin, .. } => *spin,
        }
    }
}

/// Public orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    Idle,
    SpinningLeftRight,
    WaitingForResume,
    StoppingCenter,
}

/// Orchestrator output, drained by the owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotEvent {
    Started { spin: SpinId, targets: SpinTargets },
    Queued { spin: SpinId, depth: usize },
    ReelStopped {
        spin: SpinId,
        reel: ReelPosition,
        symbol: Symbol,
    },
    AwaitingResume { spin: SpinId },
    Resumed { spin: SpinId },
    Finished(SpinResult),
    /// Panel hidden; `dropped` queued requests were discarded
    Hidden { dropped: usize },
}

// ═══════════════════════════════════════════════════════════════════════════
// ORCHESTRATOR
// ═══════════════════════════════════════════════════════════════════════════

enum Step {
    PreSpin(Countdown),
    StoppingLeft(MotionTicket),
    GapBeforeRight(Countdown),
    StoppingRight(MotionTicket),
    GapBeforeCenter(Countdown),
    AwaitResume(Arc<ResumeLatch>),
    StoppingCenter(MotionTicket),
}

struct ActiveSpin {
    id: SpinId,
    targets: SpinTargets,
    step: Step,
    landed: [Option<Symbol>; 3],
    waited_for_resume: bool,
    before_center_stop: Option<BeforeCenterStop>,
    on_finished: Option<OnSpinFinished>,
}

enum Flow {
    Continue,
    Wait,
    Finish,
}

/// Three reels plus the stop sequence
pub struct SlotOrchestrator {
    reels: [Reel; 3],
    timing: SlotTiming,
    active: Option<ActiveSpin>,
    queue: VecDeque<(SpinId, SpinRequest)>,
    next_id: u64,
    visible: bool,
    events: Vec<SlotEvent>,
}

impl SlotOrchestrator {
    pub fn new(reel: ReelConfig, timing: SlotTiming) -> PkResult<Self> {
        Ok(Self {
            reels: [
                Reel::new(reel.clone())?,
                Reel::new(reel.clone())?,
                Reel::new(reel)?,
            ],
            timing,
            active: None,
            queue: VecDeque::new(),
            next_id: 0,
            visible: false,
            events: Vec::new(),
        })
    }

    // ─── state ─────────────────────────────────────────────────────────────

    pub fn state(&self) -> SlotState {
        match self.active.as_ref().map(|a| &a.step) {
            None => SlotState::Idle,
            Some(Step::AwaitResume(_)) => SlotState::WaitingForResume,
            Some(Step::StoppingCenter(_)) => SlotState::StoppingCenter,
            Some(_) => SlotState::SpinningLeftRight,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn active_spin(&self) -> Option<SpinId> {
        self.active.as_ref().map(|a| a.id)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn reel(&self, position: ReelPosition) -> &Reel {
        &self.reels[position.index()]
    }

    pub fn drain_events(&mut self) -> Vec<SlotEvent> {
        std::mem::take(&mut self.events)
    }

    // ─── control ───────────────────────────────────────────────────────────

    /// Start at once when idle, otherwise queue behind the active spin
    pub fn request_spin(&mut self, request: SpinRequest) -> SpinAdmission {
        self.next_id += 1;
        let spin = SpinId(self.next_id);

        if self.active.is_some() {
            self.queue.push_back((spin, request));
            let depth = self.queue.len();
            log::debug!("slot busy, spin {} queued (depth {})", spin, depth);
            self.events.push(SlotEvent::Queued { spin, depth });
            return SpinAdmission::Queued { spin, depth };
        }

        self.begin(spin, request);
        SpinAdmission::Started(spin)
    }

    /// Abort everything: motion, timers, queue. No callbacks fire.
    pub fn hide(&mut self) {
        for reel in &mut self.reels {
            reel.halt();
        }
        let dropped = self.queue.len();
        self.queue.clear();
        if let Some(active) = self.active.take() {
            if let Step::AwaitResume(latch) = &active.step {
                latch.orphaned.store(true, Ordering::Release);
            }
            log::debug!("slot hidden during spin {}", active.id);
        }
        self.visible = false;
        self.events.push(SlotEvent::Hidden { dropped });
    }

    pub fn tick(&mut self, dt: Duration) {
        let mut settled: [Option<ReelSettled>; 3] = [None, None, None];
        for (slot, reel) in settled.iter_mut().zip(self.reels.iter_mut()) {
            *slot = reel.tick(dt);
        }

        if self.active.is_none() {
            return;
        }

        let mut budget = dt;
        loop {
            match self.step_active(&mut budget, &mut settled) {
                Flow::Continue => continue,
                Flow::Wait => return,
                Flow::Finish => {
                    self.finish_active();
                    return;
                }
            }
        }
    }

    // ─── internals ─────────────────────────────────────────────────────────

    fn begin(&mut self, spin: SpinId, request: SpinRequest) {
        let count = self.reels[0].symbol_count() as u8;
        let targets = request.targets.clamped_to(count);

        for reel in &mut self.reels {
            reel.start_loop();
        }
        self.visible = true;

        log::info!("spin {} start: targets {:?}", spin, targets.labels());
        self.active = Some(ActiveSpin {
            id: spin,
            targets,
            step: Step::PreSpin(Countdown::new(self.timing.pre_spin())),
            landed: [None; 3],
            waited_for_resume: false,
            before_center_stop: request.before_center_stop,
            on_finished: request.on_finished,
        });
        self.events.push(SlotEvent::Started { spin, targets });
    }

    fn step_active(
        &mut self,
        budget: &mut Duration,
        settled: &mut [Option<ReelSettled>; 3],
    ) -> Flow {
        let Some(active) = self.active.as_mut() else {
            return Flow::Wait;
        };
        let extra = self.timing.extra_steps;

        match &mut active.step {
            Step::PreSpin(timer) => {
                let Some(overshoot) = timer.tick(*budget) else {
                    return Flow::Wait;
                };
                *budget = overshoot;
                let ticket = self.reels[0].stop_at(active.targets.left, extra);
                active.step = Step::StoppingLeft(ticket);
                Flow::Continue
            }
            Step::StoppingLeft(ticket) => {
                let ticket = *ticket;
                let Some(symbol) = take_settled(settled, ReelPosition::Left, ticket) else {
                    return Flow::Wait;
                };
                Self::record_stop(&mut self.events, active, ReelPosition::Left, symbol);
                active.step = Step::GapBeforeRight(Countdown::new(self.timing.stop_gap()));
                Flow::Continue
            }
            Step::GapBeforeRight(timer) => {
                let Some(overshoot) = timer.tick(*budget) else {
                    return Flow::Wait;
                };
                *budget = overshoot;
                let ticket = self.reels[2].stop_at(active.targets.right, extra);
                active.step = Step::StoppingRight(ticket);
                Flow::Continue
            }
            Step::StoppingRight(ticket) => {
                let ticket = *ticket;
                let Some(symbol) = take_settled(settled, ReelPosition::Right, ticket) else {
                    return Flow::Wait;
                };
                Self::record_stop(&mut self.events, active, ReelPosition::Right, symbol);
                active.step = Step::GapBeforeCenter(Countdown::new(self.timing.stop_gap()));
                Flow::Continue
            }
            Step::GapBeforeCenter(timer) => {
                let Some(overshoot) = timer.tick(*budget) else {
                    return Flow::Wait;
                };
                *budget = overshoot;

                // the center reel keeps looping through the wait
                self.reels[1].start_loop();

                match active.before_center_stop.take() {
                    Some(hook) => {
                        let latch = Arc::new(ResumeLatch::default());
                        let handle = ResumeHandle {
                            spin: active.id,
                            latch: Arc::clone(&latch),
                        };
                        active.step = Step::AwaitResume(latch);
                        active.waited_for_resume = true;
                        log::debug!("spin {} waiting for resume", active.id);
                        self.events.push(SlotEvent::AwaitingResume { spin: active.id });
                        hook(handle);
                    }
                    None => {
                        let ticket = self.reels[1].stop_at(active.targets.center, extra);
                        active.step = Step::StoppingCenter(ticket);
                    }
                }
                Flow::Continue
            }
            Step::AwaitResume(latch) => {
                if !latch.released.load(Ordering::Acquire) {
                    return Flow::Wait;
                }
                log::debug!("spin {} resumed", active.id);
                self.events.push(SlotEvent::Resumed { spin: active.id });
                let ticket = self.reels[1].stop_at(active.targets.center, extra);
                active.step = Step::StoppingCenter(ticket);
                Flow::Continue
            }
            Step::StoppingCenter(ticket) => {
                let ticket = *ticket;
                let Some(symbol) = take_settled(settled, ReelPosition::Center, ticket) else {
                    return Flow::Wait;
                };
                Self::record_stop(&mut self.events, active, ReelPosition::Center, symbol);
                Flow::Finish
            }
        }
    }

    fn record_stop(
        events: &mut Vec<SlotEvent>,
        active: &mut ActiveSpin,
        reel: ReelPosition,
        symbol: Symbol,
    ) {
        active.landed[reel.index()] = Some(symbol);
        events.push(SlotEvent::ReelStopped {
            spin: active.id,
            reel,
            symbol,
        });
    }

    fn finish_active(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        let symbols = [
            active.landed[0].unwrap_or(active.targets.left),
            active.landed[1].unwrap_or(active.targets.center),
            active.landed[2].unwrap_or(active.targets.right),
        ];
        let result = SpinResult {
            spin: active.id,
            symbols,
            waited_for_resume: active.waited_for_resume,
        };
        log::info!("spin {} end: {:?}", active.id, result.labels());

        if let Some(callback) = active.on_finished.take() {
            callback(&result);
        }
        self.events.push(SlotEvent::Finished(result));

        if let Some((spin, next)) = self.queue.pop_front() {
            log::debug!("dequeued spin {} ({} left)", spin, self.queue.len());
            self.begin(spin, next);
        }
    }
}

fn take_settled(
    settled: &mut [Option<ReelSettled>; 3],
    reel: ReelPosition,
    ticket: MotionTicket,
) -> Option<Symbol> {
    match settled[reel.index()].take() {
        Some(done) if done.ticket == ticket => Some(done.symbol),
        Some(stale) => {
            log::debug!("discarding stale settle on {:?}: {:?}", reel, stale.ticket);
            None
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn slot() -> SlotOrchestrator {
        SlotOrchestrator::new(
            ReelConfig {
                step_secs: 0.01,
                final_step_secs: 0.02,
                ..ReelConfig::default()
            },
            SlotTiming {
                pre_spin_secs: 0.1,
                stop_gap_secs: 0.05,
                extra_steps: 4,
            },
        )
        .unwrap()
    }

    fn run(slot: &mut SlotOrchestrator, seconds: f32) {
        let ticks = (seconds / 0.016).ceil() as usize;
        for _ in 0..ticks {
            slot.tick(Duration::from_millis(16));
        }
    }

    fn finished(events: &[SlotEvent]) -> Vec<SpinResult> {
        events
            .iter()
            .filter_map(|e| match e {
                SlotEvent::Finished(result) => Some(*result),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_stop_order_and_landing() {
        let mut slot = slot();
        let admission = slot.request_spin(SpinRequest::new(SpinTargets::new(3, 7, 5)));
        assert!(matches!(admission, SpinAdmission::Started(_)));
        assert_eq!(slot.state(), SlotState::SpinningLeftRight);

        run(&mut slot, 3.0);
        assert_eq!(slot.state(), SlotState::Idle);

        let events = slot.drain_events();
        let stops: Vec<ReelPosition> = events
            .iter()
            .filter_map(|e| match e {
                SlotEvent::ReelStopped { reel, .. } => Some(*reel),
                _ => None,
            })
            .collect();
        assert_eq!(
            stops,
            vec![ReelPosition::Left, ReelPosition::Right, ReelPosition::Center]
        );

        let results = finished(&events);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].labels(), [3, 7, 5]);
        assert_eq!(slot.reel(ReelPosition::Center).result_symbol().label(), 7);
    }

    #[test]
    fn test_targets_are_clamped() {
        let targets = SpinTargets::new(0, 42, -3);
        assert_eq!(targets.labels(), [1, 9, 1]);
        assert!(targets.is_reach());
    }

    #[test]
    fn test_queued_spin_runs_after_first() {
        let mut slot = slot();
        slot.request_spin(SpinRequest::new(SpinTargets::new(1, 2, 3)));
        let second = slot.request_spin(SpinRequest::new(SpinTargets::new(4, 5, 6)));
        assert!(matches!(second, SpinAdmission::Queued { depth: 1, .. }));

        run(&mut slot, 6.0);

        let results = finished(&slot.drain_events());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].labels(), [1, 2, 3]);
        assert_eq!(results[1].labels(), [4, 5, 6]);
        assert!(results[0].spin < results[1].spin);
        assert!(slot.is_idle());
    }

    #[test]
    fn test_resume_gate_holds_center_indefinitely() {
        let mut slot = slot();
        let handle_slot: Arc<Mutex<Option<ResumeHandle>>> = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&handle_slot);

        slot.request_spin(
            SpinRequest::new(SpinTargets::new(7, 2, 7))
                .with_before_center_stop(move |handle| *captured.lock() = Some(handle)),
        );

        run(&mut slot, 2.0);
        assert_eq!(slot.state(), SlotState::WaitingForResume);

        // a long wait changes nothing
        run(&mut slot, 30.0);
        assert_eq!(slot.state(), SlotState::WaitingForResume);
        assert!(slot.reel(ReelPosition::Center).is_moving());

        // re-entrant request queues instead of interrupting
        let queued = slot.request_spin(SpinRequest::new(SpinTargets::new(1, 1, 1)));
        assert!(matches!(queued, SpinAdmission::Queued { .. }));
        assert_eq!(slot.state(), SlotState::WaitingForResume);

        let handle = handle_slot.lock().take().unwrap();
        assert!(handle.resume());
        assert!(!handle.resume());

        slot.tick(Duration::from_millis(16));
        assert_eq!(slot.state(), SlotState::StoppingCenter);

        run(&mut slot, 1.0);
        let events = slot.drain_events();
        let results = finished(&events);
        assert_eq!(results[0].labels(), [7, 2, 7]);
        assert!(results[0].waited_for_resume);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, SlotEvent::Resumed { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_hook_may_resume_synchronously() {
        let mut slot = slot();
        slot.request_spin(
            SpinRequest::new(SpinTargets::new(4, 4, 4)).with_before_center_stop(|handle| {
                handle.resume();
            }),
        );
        run(&mut slot, 3.0);
        assert!(slot.is_idle());
        assert_eq!(finished(&slot.drain_events())[0].labels(), [4, 4, 4]);
    }

    #[test]
    fn test_on_finished_called_once() {
        let mut slot = slot();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);

        slot.request_spin(
            SpinRequest::new(SpinTargets::new(9, 8, 7))
                .with_on_finished(move |result| sink.lock().push(result.labels())),
        );
        run(&mut slot, 5.0);
        assert_eq!(*calls.lock(), vec![[9, 8, 7]]);
    }

    #[test]
    fn test_hide_drops_queue_without_callbacks() {
        let mut slot = slot();
        let calls = Arc::new(Mutex::new(0u32));

        for _ in 0..3 {
            let sink = Arc::clone(&calls);
            slot.request_spin(
                SpinRequest::new(SpinTargets::new(2, 3, 4))
                    .with_on_finished(move |_| *sink.lock() += 1),
            );
        }
        slot.tick(Duration::from_millis(50));
        slot.hide();

        assert!(slot.is_idle());
        assert!(!slot.is_visible());
        assert_eq!(slot.queue_len(), 0);
        assert!(
            slot.drain_events()
                .contains(&SlotEvent::Hidden { dropped: 2 })
        );

        run(&mut slot, 10.0);
        assert_eq!(*calls.lock(), 0);
        assert!(slot.drain_events().is_empty());
    }

    #[test]
    fn test_stale_handle_is_inert() {
        let mut slot = slot();
        let first: Arc<Mutex<Option<ResumeHandle>>> = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&first);
        slot.request_spin(
            SpinRequest::new(SpinTargets::new(5, 1, 5))
                .with_before_center_stop(move |h| *captured.lock() = Some(h)),
        );
        run(&mut slot, 2.0);
        slot.hide();

        slot.request_spin(
            SpinRequest::new(SpinTargets::new(6, 1, 6)).with_before_center_stop(|_| {}),
        );
        run(&mut slot, 2.0);
        assert_eq!(slot.state(), SlotState::WaitingForResume);

        let stale = first.lock().take().unwrap();
        assert!(!stale.resume());
        assert!(!stale.is_resumed());
        run(&mut slot, 2.0);
        assert_eq!(slot.state(), SlotState::WaitingForResume);
    }
}
