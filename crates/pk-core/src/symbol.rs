//! Reel symbol labels
//!
//! Symbols are labelled `1..=count`; label `n` sits at strip index `n - 1`.

use serde::{Deserialize, Serialize};

/// A symbol label on a reel strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(u8);

impl Symbol {
    /// Clamp any raw value into `1..=count`
    pub fn clamped(raw: i64, count: u8) -> Self {
        let count = count.max(1);
        let label = raw.clamp(1, count as i64) as u8;
        if label as i64 != raw {
            log::debug!("symbol {} clamped to {} (count={})", raw, label, count);
        }
        Self(label)
    }

    /// Symbol at a strip index (wraps modulo `count`)
    pub fn from_index(index: usize, count: u8) -> Self {
        let count = count.max(1) as usize;
        Self((index % count) as u8 + 1)
    }

    #[inline]
    pub fn label(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
