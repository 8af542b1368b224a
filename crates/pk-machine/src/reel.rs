//! Reel — continuous cyclic motion with exact stop targeting
//!
//! The strip only ever moves forward. While looping it advances one symbol
//! every time accumulated motion passes one symbol extent. A stop executes a
//! precomputed number of whole-symbol steps so the result row lands exactly
//! on the requested symbol, with no fractional drift left behind.

use std::time::Duration;

use pk_core::{Generation, PkError, PkResult, Symbol};
use serde::{Deserialize, Serialize};

use crate::config::ReelConfig;

/// Reel motion phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReelPhase {
    Idle,
    Looping,
    Stopping,
}

/// Identifies one stop motion; a cancelled motion's ticket never settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MotionTicket(u64);

/// Completion signal of a stop motion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReelSettled {
    pub ticket: MotionTicket,
    pub symbol: Symbol,
    /// Whole-symbol advances the stop performed
    pub steps: u64,
}

/// Step budget of a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPlan {
    pub extra_steps: u32,
    /// Steps needed after the decorative ones to reach the target
    pub need: u32,
    /// Wide enough for any `extra_steps + need`
    pub total_steps: u64,
}

/// Compute how many forward steps land `target_index` on the result row.
///
/// All indices are strip indices (`0..symbol_count`).
pub fn plan_stop(
    top_index: usize,
    result_row: usize,
    symbol_count: usize,
    target_index: usize,
    extra_steps: u32,
) -> StopPlan {
    let n = symbol_count.max(1);
    let target = target_index % n;
    let current = (top_index + result_row) % n;
    let after_extra = (current + extra_steps as usize % n) % n;
    let need = ((target + n - after_extra) % n) as u32;

    StopPlan {
        extra_steps,
        need,
        total_steps: extra_steps as u64 + need as u64,
    }
}

#[derive(Debug, Clone)]
struct ActiveStop {
    ticket: MotionTicket,
    target: Symbol,
    remaining: u64,
    total: u64,
    /// Time spent inside the current step
    elapsed: Duration,
}

/// A single reel
#[derive(Debug, Clone)]
pub struct Reel {
    config: ReelConfig,
    symbol_count: usize,
    /// Strip index shown on the top row
    top: usize,
    phase: ReelPhase,
    /// Linear fraction of the current symbol travelled (0.0-1.0)
    progress: f32,
    generation: Generation,
    stop: Option<ActiveStop>,
    advances: u64,
}

impl Reel {
    pub fn new(config: ReelConfig) -> PkResult<Self> {
        if config.symbol_count < 2 {
            log::error!(
                "reel needs at least 2 symbols (got {})",
                config.symbol_count
            );
            return Err(PkError::InvalidConfig(format!(
                "reel.symbol_count must be >= 2 (got {})",
                config.symbol_count
            )));
        }
        if config.result_row >= config.symbol_count as usize {
            log::error!(
                "reel result row {} is outside a {}-symbol strip",
                config.result_row,
                config.symbol_count
            );
            return Err(PkError::InvalidConfig(format!(
                "reel.result_row must be < symbol_count (got {} for {})",
                config.result_row, config.symbol_count
            )));
        }

        Ok(Self {
            symbol_count: config.symbol_count as usize,
            config,
            top: 0,
            phase: ReelPhase::Idle,
            progress: 0.0,
            generation: Generation::default(),
            stop: None,
            advances: 0,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STATE
    // ═══════════════════════════════════════════════════════════════════════

    pub fn phase(&self) -> ReelPhase {
        self.phase
    }

    pub fn is_moving(&self) -> bool {
        self.phase != ReelPhase::Idle
    }

    pub fn symbol_count(&self) -> usize {
        self.symbol_count
    }

    pub fn top_index(&self) -> usize {
        self.top
    }

    /// Total forward advances since creation
    pub fn advances(&self) -> u64 {
        self.advances
    }

    /// Symbol on the result row
    pub fn result_symbol(&self) -> Symbol {
        Symbol::from_index(
            self.top + self.config.result_row,
            self.symbol_count as u8,
        )
    }

    /// Strip labels from the top row down
    pub fn visible_symbols(&self, rows: usize) -> Vec<Symbol> {
        (0..rows)
            .map(|row| Symbol::from_index(self.top + row, self.symbol_count as u8))
            .collect()
    }

    /// Eased fraction of a symbol the strip is displaced by (0.0-1.0)
    pub fn offset(&self) -> f32 {
        match (&self.phase, &self.stop) {
            (ReelPhase::Stopping, Some(stop)) => {
                let (duration, ease) = self.step_shape(stop.remaining);
                let t = stop.elapsed.as_secs_f32() / duration.as_secs_f32();
                ease.apply(t)
            }
            (ReelPhase::Looping, _) => self.progress,
            _ => 0.0,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MOTION
    // ═══════════════════════════════════════════════════════════════════════

    /// Begin continuous looping. A running loop is left untouched; a stop in
    /// flight is cancelled.
    pub fn start_loop(&mut self) -> bool {
        if self.phase == ReelPhase::Looping {
            return false;
        }
        self.generation.bump();
        self.stop = None;
        self.phase = ReelPhase::Looping;
        self.progress = 0.0;
        true
    }

    /// Stop so that `target` lands on the result row after at least
    /// `extra_steps` decorative steps. Completion arrives via [`Reel::tick`].
    pub fn stop_at(&mut self, target: Symbol, extra_steps: u32) -> MotionTicket {
        let target = Symbol::clamped(target.label() as i64, self.symbol_count as u8);
        let plan = plan_stop(
            self.top,
            self.config.result_row,
            self.symbol_count,
            target.index(),
            extra_steps,
        );

        let ticket = MotionTicket(self.generation.bump());
        log::debug!(
            "reel stop: target={} extra={} need={} total={}",
            target,
            plan.extra_steps,
            plan.need,
            plan.total_steps
        );

        self.stop = Some(ActiveStop {
            ticket,
            target,
            remaining: plan.total_steps,
            total: plan.total_steps,
            elapsed: Duration::ZERO,
        });
        self.phase = ReelPhase::Stopping;
        self.progress = 0.0;
        ticket
    }

    /// Cancel any motion without settling
    pub fn halt(&mut self) {
        self.generation.bump();
        self.stop = None;
        self.phase = ReelPhase::Idle;
        self.progress = 0.0;
    }

    /// Advance motion by real elapsed time
    pub fn tick(&mut self, dt: Duration) -> Option<ReelSettled> {
        match self.phase {
            ReelPhase::Idle => None,
            ReelPhase::Looping => {
                self.progress += self.config.symbols_per_sec() * dt.as_secs_f32();
                let whole = self.progress.floor();
                if whole >= 1.0 {
                    self.progress -= whole;
                    self.advance_by(whole as u64);
                }
                None
            }
            ReelPhase::Stopping => self.tick_stop(dt),
        }
    }

    fn tick_stop(&mut self, dt: Duration) -> Option<ReelSettled> {
        let mut budget = dt;

        loop {
            let (remaining, elapsed) = match &self.stop {
                Some(stop) => (stop.remaining, stop.elapsed),
                None => {
                    self.phase = ReelPhase::Idle;
                    return None;
                }
            };

            if remaining == 0 {
                return self.settle();
            }

            let (duration, _) = self.step_shape(remaining);
            let needed = duration.saturating_sub(elapsed);

            if budget >= needed {
                budget -= needed;
                self.advance();
                if let Some(stop) = self.stop.as_mut() {
                    stop.remaining -= 1;
                    stop.elapsed = Duration::ZERO;
                }
            } else {
                if let Some(stop) = self.stop.as_mut() {
                    stop.elapsed += budget;
                }
                return None;
            }
        }
    }

    fn settle(&mut self) -> Option<ReelSettled> {
        let stop = self.stop.take()?;
        self.phase = ReelPhase::Idle;
        self.progress = 0.0;

        let symbol = self.result_symbol();
        debug_assert_eq!(symbol, stop.target);

        Some(ReelSettled {
            ticket: stop.ticket,
            symbol,
            steps: stop.total,
        })
    }

    /// Duration and easing of the step with `remaining` steps left
    fn step_shape(&self, remaining: u64) -> (Duration, pk_core::Ease) {
        if remaining <= 1 {
            (self.config.final_step_duration(), self.config.final_ease)
        } else {
            (self.config.step_duration(), self.config.step_ease)
        }
    }

    #[inline]
    fn advance(&mut self) {
        self.advance_by(1);
    }

    fn advance_by(&mut self, steps: u64) {
        let n = self.symbol_count as u64;
        self.top = ((self.top as u64 + steps % n) % n) as usize;
        self.advances = self.advances.saturating_add(steps);
    }
}
