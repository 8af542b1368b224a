//! Easing curves for reel step motion

use serde::{Deserialize, Serialize};

/// Step easing curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Ease {
    /// Constant speed
    #[default]
    Linear,
    /// Quadratic ease-out
    OutQuad,
    /// Cubic ease-out (slow landing)
    OutCubic,
    /// Quadratic ease-in-out
    InOutQuad,
}

impl Ease {
    /// Apply the curve to a linear progress value (0.0-1.0)
    #[inline]
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);

        match self {
            Ease::Linear => t,
            Ease::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Ease::OutCubic => 1.0 - (1.0 - t).powi(3),
            Ease::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
        }
    }
}
