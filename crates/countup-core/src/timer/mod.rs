mod engine;
mod lifecycle;
mod model;

pub use engine::{EngineBuilder, NoSync, SyncTrigger, TimerEngine};
pub use lifecycle::{BrightnessLockDetector, LockHeuristic, LockScreenDetector, TransitionSample};
pub use model::{EngineState, Timer, RESET_GUARD_SECS};
