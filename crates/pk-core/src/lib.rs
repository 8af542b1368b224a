//! pk-core: Shared types, timers, and utilities for the pachinko machine
//!
//! This crate provides the foundational types used across all machine crates.

mod ease;
mod error;
mod symbol;
mod time;

pub use ease::*;
pub use error::*;
pub use symbol::*;
pub use time::*;

/// Number of symbols on each reel in the reference machine (`1..=9`)
pub const DEFAULT_SYMBOL_COUNT: u8 = 9;
