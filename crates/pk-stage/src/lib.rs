//! # pk-stage — Machine Stage System
//!
//! Defines the canonical stages the machine passes through. Presentation
//! collaborators (HUD, audio, video) never look at component internals,
//! only at STAGES.
//!
//! ## Flow
//!
//! ```text
//! ball enters start hole → hold / spin start → reel stops → reach wait
//!     → reach resume → spin end → hit start → round start ⇄ gate open/close
//!     → prize in … → round end → … → hit end
//! ```

pub mod bus;
pub mod event;
pub mod stage;
pub mod trace;

pub use bus::*;
pub use event::*;
pub use stage::*;
pub use trace::*;
