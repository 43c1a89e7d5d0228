//! Lock-screen vs. backgrounding classification.
//!
//! When the app leaves the foreground the platform cannot tell us whether the
//! device was locked (the widget and live activity stay visible, so the timer
//! keeps running) or the user switched apps (the timer should pause). Screen
//! brightness is used as a proxy: locking blanks the screen quickly.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// What the engine knows when the app reaches the background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionSample {
    /// Brightness recorded on resign-active, if a resign was seen.
    pub brightness_before: Option<f64>,
    pub brightness_after: f64,
    /// Time between resign-active and entering the background.
    pub since_resign: Option<Duration>,
}

/// Decides whether a background transition was the device locking.
pub trait LockScreenDetector: Send + Sync {
    fn is_likely_lock_screen_transition(&self, sample: &TransitionSample) -> bool;
}

/// Brightness thresholds for [`BrightnessLockDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LockHeuristic {
    /// Brightness at or below this counts as a blanked screen.
    #[serde(default = "default_floor")]
    pub lock_brightness_floor: f64,
    /// A resign-to-background gap shorter than this is "immediate".
    #[serde(default = "default_quick_resign_ms")]
    pub quick_resign_ms: u64,
    /// An immediate transition must also dim below this fraction.
    #[serde(default = "default_drop_ratio")]
    pub brightness_drop_ratio: f64,
}

fn default_floor() -> f64 {
    0.01
}
fn default_quick_resign_ms() -> u64 {
    300
}
fn default_drop_ratio() -> f64 {
    0.5
}

impl Default for LockHeuristic {
    fn default() -> Self {
        Self {
            lock_brightness_floor: default_floor(),
            quick_resign_ms: default_quick_resign_ms(),
            brightness_drop_ratio: default_drop_ratio(),
        }
    }
}

/// Default detector: a near-black screen, or a fast and sharp dimming.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrightnessLockDetector {
    heuristic: LockHeuristic,
}

impl BrightnessLockDetector {
    pub fn new(heuristic: LockHeuristic) -> Self {
        Self { heuristic }
    }
}

impl LockScreenDetector for BrightnessLockDetector {
    fn is_likely_lock_screen_transition(&self, sample: &TransitionSample) -> bool {
        if sample.brightness_after <= self.heuristic.lock_brightness_floor {
            return true;
        }
        let (Some(before), Some(gap)) = (sample.brightness_before, sample.since_resign) else {
            return false;
        };
        let quick = gap < Duration::milliseconds(self.heuristic.quick_resign_ms as i64);
        quick && sample.brightness_after < before * self.heuristic.brightness_drop_ratio
    }
}

/// Bookkeeping from the last resign-active signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ResignRecord {
    pub brightness: f64,
    pub at: DateTime<Utc>,
}
