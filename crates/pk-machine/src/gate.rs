//! GateCycle — timed open/close loop of the prize attacker

use std::time::Duration;

use pk_core::Countdown;

use crate::config::GateTiming;

/// Observable gate change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    Opened,
    Closed,
}

/// Open/closed acceptance window with an optional repeating cycle
#[derive(Debug, Clone)]
pub struct GateCycle {
    timing: GateTiming,
    is_open: bool,
    cycling: bool,
    phase_timer: Option<Countdown>,
    transitions: Vec<GateTransition>,
}

impl GateCycle {
    pub fn new(timing: GateTiming) -> Self {
        Self {
            timing,
            is_open: false,
            cycling: false,
            phase_timer: None,
            transitions: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_cycling(&self) -> bool {
        self.cycling
    }

    /// Returns true if the gate changed state
    pub fn open(&mut self) -> bool {
        if self.is_open {
            return false;
        }
        self.is_open = true;
        self.transitions.push(GateTransition::Opened);
        true
    }

    /// Returns true if the gate changed state
    pub fn close(&mut self) -> bool {
        if !self.is_open {
            return false;
        }
        self.is_open = false;
        self.transitions.push(GateTransition::Closed);
        true
    }

    /// Begin the open/close loop. No-op while already cycling.
    pub fn start_cycle(&mut self) {
        if self.cycling {
            return;
        }
        self.cycling = true;
        self.open();
        self.phase_timer = Some(Countdown::new(self.timing.open_duration()));
    }

    /// Halt the loop and force the gate closed
    pub fn stop_cycle(&mut self) {
        self.cycling = false;
        self.phase_timer = None;
        self.close();
    }

    pub fn tick(&mut self, dt: Duration) {
        if !self.cycling {
            return;
        }

        let mut budget = dt;
        while let Some(timer) = self.phase_timer.as_mut() {
            let Some(overshoot) = timer.tick(budget) else {
                break;
            };
            budget = overshoot;

            let next = if self.is_open {
                self.close();
                self.timing.close_duration()
            } else {
                self.open();
                self.timing.open_duration()
            };
            self.phase_timer = Some(Countdown::new(next));
        }
    }

    pub fn drain_transitions(&mut self) -> Vec<GateTransition> {
        std::mem::take(&mut self.transitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> GateCycle {
        GateCycle::new(GateTiming {
            open_secs: 0.3,
            close_secs: 0.5,
        })
    }

    #[test]
    fn test_open_close_idempotent() {
        let mut g = gate();
        assert!(g.open());
        assert!(!g.open());
        assert!(g.close());
        assert!(!g.close());
        assert_eq!(
            g.drain_transitions(),
            vec![GateTransition::Opened, GateTransition::Closed]
        );
    }

    #[test]
    fn test_cycle_timing() {
        let mut g = gate();
        g.start_cycle();
        assert!(g.is_open());

        g.tick(Duration::from_millis(299));
        assert!(g.is_open());
        g.tick(Duration::from_millis(2));
        assert!(!g.is_open());

        g.tick(Duration::from_millis(500));
        assert!(g.is_open());
    }

    #[test]
    fn test_long_tick_runs_several_phases() {
        let mut g = gate();
        g.start_cycle();
        g.drain_transitions();

        // 0.3 open → close, 0.5 closed → open, 0.3 → close at 1.1 s
        g.tick(Duration::from_millis(1200));
        assert!(!g.is_open());
        assert_eq!(g.drain_transitions().len(), 3);
    }

    #[test]
    fn test_start_while_cycling_is_noop() {
        let mut g = gate();
        g.start_cycle();
        g.tick(Duration::from_millis(200));
        g.start_cycle();
        g.tick(Duration::from_millis(110));
        assert!(!g.is_open());
    }

    #[test]
    fn test_stop_cycle_closes() {
        let mut g = gate();
        g.start_cycle();
        g.stop_cycle();
        assert!(!g.is_open());
        assert!(!g.is_cycling());
        g.tick(Duration::from_secs(5));
        assert!(!g.is_open());
    }

    #[test]
    fn test_zero_phase_is_floored() {
        let mut g = GateCycle::new(GateTiming {
            open_secs: 0.0,
            close_secs: 0.0,
        });
        g.start_cycle();
        g.drain_transitions();
        // 0.05 s floor per phase
        g.tick(Duration::from_millis(1010));
        assert_eq!(g.drain_transitions().len(), 20);
    }
}
