//! Small shared utilities.

mod clock;

pub use clock::{Sleeper, TokioSleeper};
