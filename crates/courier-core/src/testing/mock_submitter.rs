//! Scripted submitter for deterministic tests.

use super::ManualClock;
use courier_proto::{Record, RecordId, SubmissionError, Submitter};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// What a scripted submission does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Succeed,
    Fail(String),
}

/// One recorded call to [`Submitter::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitCall {
    pub record: RecordId,
    pub message: String,
    pub subject: Option<String>,
}

#[derive(Debug)]
struct MockState {
    script: VecDeque<MockOutcome>,
    fallback: MockOutcome,
    calls: Vec<SubmitCall>,
    resets: usize,
    fail_resets: bool,
    latency: Option<(ManualClock, Duration)>,
}

/// A submitter that plays back scripted outcomes and records every call.
///
/// Clones share state, so a test can hand one clone to the session and
/// inspect the other afterwards.
#[derive(Debug, Clone)]
pub struct MockSubmitter {
    state: Arc<Mutex<MockState>>,
}

impl MockSubmitter {
    fn with_fallback(fallback: MockOutcome) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                script: VecDeque::new(),
                fallback,
                calls: Vec::new(),
                resets: 0,
                fail_resets: false,
                latency: None,
            })),
        }
    }

    /// Every submission succeeds.
    pub fn succeeding() -> Self {
        Self::with_fallback(MockOutcome::Succeed)
    }

    /// Every submission fails.
    pub fn failing() -> Self {
        Self::with_fallback(MockOutcome::Fail("scripted failure".to_string()))
    }

    /// Plays `outcomes` in order, then succeeds.
    pub fn scripted(outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
        let mock = Self::succeeding();
        mock.lock().script.extend(outcomes);
        mock
    }

    /// Each submission advances `clock` by `latency` before returning.
    pub fn with_latency(self, clock: &ManualClock, latency: Duration) -> Self {
        self.lock().latency = Some((clock.clone(), latency));
        self
    }

    /// Makes every [`Submitter::reset`] call fail.
    pub fn failing_resets(self) -> Self {
        self.lock().fail_resets = true;
        self
    }

    pub fn calls(&self) -> Vec<SubmitCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Rendered messages in submission order.
    pub fn messages(&self) -> Vec<String> {
        self.lock().calls.iter().map(|c| c.message.clone()).collect()
    }

    /// Number of reset requests, including failed ones.
    pub fn resets(&self) -> usize {
        self.lock().resets
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Submitter for MockSubmitter {
    fn submit(
        &mut self,
        record: &Record,
        message: &str,
        subject: Option<&str>,
    ) -> Result<(), SubmissionError> {
        let mut state = self.lock();
        state.calls.push(SubmitCall {
            record: record.id(),
            message: message.to_string(),
            subject: subject.map(str::to_string),
        });
        if let Some((clock, latency)) = &state.latency {
            clock.advance(*latency);
        }
        let scripted = state.script.pop_front();
        let outcome = scripted.unwrap_or_else(|| state.fallback.clone());
        match outcome {
            MockOutcome::Succeed => Ok(()),
            MockOutcome::Fail(reason) => Err(SubmissionError::Rejected(reason)),
        }
    }

    fn reset(&mut self) -> Result<(), SubmissionError> {
        let mut state = self.lock();
        state.resets += 1;
        if state.fail_resets {
            return Err(SubmissionError::Rejected("reset refused".to_string()));
        }
        Ok(())
    }
}
