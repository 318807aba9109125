//! Run identity and the per-step execution context.

mod identity;
mod inputs;
mod step;

pub use identity::RunIdentity;
pub use inputs::{StepInputs, UndeclaredInputError};
pub use step::StepContext;
