//! Mock step actions and collaborators for testing.

use crate::context::StepContext;
use crate::core::StepOutput;
use crate::errors::StepError;
use crate::steps::StepAction;
use crate::utils::Sleeper;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// An action that counts invocations and succeeds with no output.
#[derive(Debug, Default)]
pub struct CountingStep {
    calls: AtomicUsize,
}

impl CountingStep {
    /// Creates a counting action.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepAction for CountingStep {
    async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, StepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(StepOutput::empty())
    }
}

/// An action that fails a configured number of times before succeeding.
///
/// Configure with `usize::MAX` failures to model a permanently broken
/// dependency.
#[derive(Debug)]
pub struct FlakyStep {
    failures_before_success: usize,
    calls: AtomicUsize,
    error: StepError,
}

impl FlakyStep {
    /// Creates a flaky action failing transiently `failures` times.
    #[must_use]
    pub fn new(failures: usize) -> Self {
        Self {
            failures_before_success: failures,
            calls: AtomicUsize::new(0),
            error: StepError::transient("simulated transient failure"),
        }
    }

    /// Creates an action that always fails with the given error.
    #[must_use]
    pub fn always(error: StepError) -> Self {
        Self {
            failures_before_success: usize::MAX,
            calls: AtomicUsize::new(0),
            error,
        }
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepAction for FlakyStep {
    async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, StepError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_before_success {
            Err(self.error.clone())
        } else {
            Ok(StepOutput::empty())
        }
    }
}

/// An action that parks until the test releases its gate.
///
/// Lets tests observe a step in the `running` state (e.g. to signal
/// cancellation mid-run) and then let it finish naturally.
#[derive(Debug)]
pub struct GatedStep {
    gate: Arc<Semaphore>,
}

impl GatedStep {
    /// Creates a gated action and returns it with its release handle.
    #[must_use]
    pub fn new() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (Self { gate: gate.clone() }, gate)
    }
}

#[async_trait]
impl StepAction for GatedStep {
    async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, StepError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| StepError::transient("gate closed"))?;
        permit.forget();
        Ok(StepOutput::empty())
    }
}

/// A sleeper that records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Creates a recording sleeper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the delays requested so far.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RunIdentity, StepInputs};
    use std::collections::BTreeMap;

    fn ctx() -> StepContext {
        StepContext::new(
            RunIdentity::new("test"),
            "mock",
            StepInputs::default(),
            BTreeMap::new(),
        )
    }

    #[tokio::test]
    async fn test_counting_step() {
        let step = CountingStep::new();
        step.run(&ctx()).await.unwrap();
        step.run(&ctx()).await.unwrap();
        assert_eq!(step.calls(), 2);
    }

    #[tokio::test]
    async fn test_flaky_step_recovers() {
        let step = FlakyStep::new(2);
        assert!(step.run(&ctx()).await.is_err());
        assert!(step.run(&ctx()).await.is_err());
        assert!(step.run(&ctx()).await.is_ok());
        assert_eq!(step.calls(), 3);
    }

    #[tokio::test]
    async fn test_gated_step_waits_for_release() {
        let (step, gate) = GatedStep::new();
        gate.add_permits(1);
        assert!(step.run(&ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn test_recording_sleeper() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_millis(5)).await;
        sleeper.sleep(Duration::from_millis(10)).await;
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(5), Duration::from_millis(10)]
        );
    }
}
