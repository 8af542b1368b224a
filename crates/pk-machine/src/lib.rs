//! # pk-machine — Pachinko machine decision core
//!
//! Decides when a lottery spin happens, drives the three-reel slot onto its
//! drawn targets, and runs the multi-round hit with its prize gate and payout
//! accounting. Physics, rendering and audio stay outside; they talk to the
//! core through ball entries, the ball ledger, the reach presenter and the
//! published stage events.
//!
//! ## Architecture
//!
//! ```text
//! PachinkoMachine
//!     │
//!     ├── LotteryCoordinator (hold queue, outcome draw)
//!     │       └── SlotOrchestrator ── Reel × 3
//!     ├── RoundDirector (rounds, safety timer)
//!     │       └── GateCycle
//!     ├── BallLedger (shared balance)
//!     └── BallRegistry (counted-once guard)
//!           │
//!           v
//!     Stage → StageEvent → StageBus
//! ```
//!
//! Everything is driven by `tick(dt)` with real elapsed time.

pub mod board;
pub mod config;
pub mod gate;
pub mod ledger;
pub mod lottery;
pub mod machine;
pub mod reel;
pub mod round;
pub mod slot;

pub use board::*;
pub use config::*;
pub use gate::*;
pub use ledger::*;
pub use lottery::*;
pub use machine::*;
pub use reel::*;
pub use round::*;
pub use slot::*;
