//! Per-record retry loop.
//!
//! The dispatcher renders a record's message, submits it, and retries failed
//! submissions until the record's retry budget is spent. Between attempts it
//! waits a randomized delay, minus however long the attempt itself took.
//! Submission failures are counted and logged here and never escape.

use crate::budget::SendBudget;
use crate::pacing::{Pacing, next_delay};
use crate::stats::RunStatistics;
use crate::template::Template;
use courier_proto::{EventSink, Record, SessionEvent, SubmissionError, Submitter};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of dispatching one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// True if one attempt succeeded.
    pub success: bool,
    /// Number of submission calls made.
    pub attempts: u32,
}

/// Submits records one at a time with bounded retries and pacing.
pub struct RetryDispatcher<S> {
    submitter: S,
    pacing: Pacing,
    budget: SendBudget,
    subject: Option<Template>,
    sink: Arc<dyn EventSink>,
}

impl<S: Submitter> RetryDispatcher<S> {
    /// Creates a dispatcher using real time and the thread RNG.
    pub fn new(submitter: S, budget: SendBudget, sink: Arc<dyn EventSink>) -> Self {
        Self {
            submitter,
            pacing: Pacing::system(),
            budget,
            subject: None,
            sink,
        }
    }

    /// Replaces the clock, sleeper and random source.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Renders and submits a subject alongside every message.
    #[must_use]
    pub fn with_subject(mut self, subject: Option<Template>) -> Self {
        self.subject = subject;
        self
    }

    pub fn budget(&self) -> &SendBudget {
        &self.budget
    }

    pub fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    pub fn pacing_mut(&mut self) -> &mut Pacing {
        &mut self.pacing
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    pub fn submitter_mut(&mut self) -> &mut S {
        &mut self.submitter
    }

    pub fn into_submitter(self) -> S {
        self.submitter
    }

    /// Asks the submitter to recycle its session handle.
    pub fn reset_submitter(&mut self) -> Result<(), SubmissionError> {
        self.submitter.reset()
    }

    /// Attempts `record` up to `max_retries` times.
    ///
    /// Counters in `stats` are updated after every attempt. The loop ends
    /// early, without waiting, as soon as the time budget is exhausted.
    pub fn attempt(
        &mut self,
        record: &Record,
        template: &Template,
        max_retries: u32,
        stats: &mut RunStatistics,
        has_more_records: bool,
    ) -> Outcome {
        let id = record.id();
        let mut remaining = max_retries;
        let mut attempts = 0;
        let mut success = false;

        while !success && remaining > 0 {
            attempts += 1;
            let message = template.render(record, self.sink.as_ref());
            let subject = self
                .subject
                .as_ref()
                .map(|subject| subject.render(record, self.sink.as_ref()));

            self.sink.emit(&SessionEvent::AttemptStarted {
                record: id,
                attempt: attempts,
            });
            let started = self.pacing.now();
            let result = self.submitter.submit(record, &message, subject.as_deref());
            let elapsed = self.pacing.now().saturating_sub(started).as_secs_f64();

            match result {
                Ok(()) => {
                    success = true;
                    stats.messages_sent += 1;
                    stats.time_sending += elapsed;
                    info!(
                        record = %id,
                        attempt = attempts,
                        elapsed_secs = elapsed,
                        sent = stats.messages_sent,
                        "Message submitted"
                    );
                    self.sink.emit(&SessionEvent::AttemptSucceeded {
                        record: id,
                        attempt: attempts,
                        elapsed_secs: elapsed,
                        messages_sent: stats.messages_sent,
                    });
                }
                Err(e) => {
                    remaining -= 1;
                    stats.times_failed += 1;
                    stats.time_retrying += elapsed;
                    warn!(
                        record = %id,
                        attempt = attempts,
                        remaining_retries = remaining,
                        error = %e,
                        "Submission failed"
                    );
                    self.sink.emit(&SessionEvent::AttemptFailed {
                        record: id,
                        attempt: attempts,
                        remaining_retries: remaining,
                        elapsed_secs: elapsed,
                        error: e.to_string(),
                    });
                }
            }

            stats.time_running = self.pacing.time_running();
            let status = self.budget.status(stats, has_more_records);
            let sampled = self
                .pacing
                .sample_delay(self.budget.min_delay(), self.budget.random_delay());
            let delay = next_delay(sampled, elapsed, success, status);

            if !status.has_more_time {
                debug!(record = %id, "Time budget exhausted, abandoning retries");
                break;
            }
            if delay > 0.0 {
                debug!(record = %id, delay_secs = delay, "Waiting");
                self.sink.emit(&SessionEvent::Waiting {
                    record: id,
                    delay_secs: delay,
                    retrying: !success,
                });
                self.pacing.sleep(delay);
            }
        }

        if !success {
            stats.messages_failed += 1;
            warn!(record = %id, attempts, "Giving up on record");
            self.sink.emit(&SessionEvent::RecordFailed {
                record: id,
                attempts,
            });
        }

        Outcome { success, attempts }
    }
}

impl<S> std::fmt::Debug for RetryDispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryDispatcher")
            .field("budget", &self.budget)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}
