//! The send-session loop.
//!
//! A session loads the statistics snapshot, resumes the roster at the
//! recorded position, and hands records to the [`RetryDispatcher`] one at a
//! time until a budget runs out, the roster is exhausted, or the interrupt
//! flag is raised. The snapshot is rewritten after every record.

use crate::budget::SendBudget;
use crate::dispatcher::RetryDispatcher;
use crate::stats::{RunStatistics, StatsError, StatsStore};
use crate::summary::{SessionSummary, StopCause};
use crate::template::Template;
use courier_proto::{EventSink, Roster, SessionEvent, Submitter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Records between housekeeping steps unless configured otherwise.
pub const DEFAULT_RESET_INTERVAL: u64 = 10;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionState {
    /// Not started, or processing records.
    Running,
    /// The loop has ended for the given cause.
    Stopped(StopCause),
}

/// Errors that end a session abnormally.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The final snapshot could not be written. Counters from this session
    /// may be lost on the next resume.
    #[error("failed to save final statistics snapshot: {0}")]
    Snapshot(#[from] StatsError),
}

/// Drives a roster through a dispatcher under the session budgets.
pub struct SessionController<S, R> {
    dispatcher: RetryDispatcher<S>,
    roster: R,
    store: StatsStore,
    template: Template,
    reset_interval: u64,
    sink: Arc<dyn EventSink>,
    interrupt: Arc<AtomicBool>,
    state: SessionState,
}

impl<S: Submitter, R: Roster> SessionController<S, R> {
    pub fn new(
        dispatcher: RetryDispatcher<S>,
        roster: R,
        store: StatsStore,
        template: Template,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            dispatcher,
            roster,
            store,
            template,
            reset_interval: DEFAULT_RESET_INTERVAL,
            sink,
            interrupt: Arc::new(AtomicBool::new(false)),
            state: SessionState::Running,
        }
    }

    /// Sets how many records pass between housekeeping steps. `0` disables them.
    #[must_use]
    pub fn with_reset_interval(mut self, reset_interval: u64) -> Self {
        self.reset_interval = reset_interval;
        self
    }

    /// Uses an externally owned interrupt flag.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Flag that stops the session before the next record when set.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn roster(&self) -> &R {
        &self.roster
    }

    pub fn dispatcher(&self) -> &RetryDispatcher<S> {
        &self.dispatcher
    }

    /// Runs the session to completion.
    ///
    /// Only a failure to write the final snapshot is an error; every other
    /// way the loop can end is reported through [`SessionSummary::cause`].
    pub fn run(&mut self) -> Result<SessionSummary, SessionError> {
        let mut stats = self.store.load(self.sink.as_ref());
        self.roster.seek(stats.current_position);
        self.dispatcher.pacing_mut().rebase(stats.time_running);
        self.state = SessionState::Running;

        info!(
            position = stats.current_position,
            time_running = stats.time_running,
            messages_sent = stats.messages_sent,
            "Starting send session"
        );
        self.sink.emit(&SessionEvent::SessionStarted {
            resumed_from: stats.current_position,
            time_running: stats.time_running,
            messages_sent: stats.messages_sent,
        });

        let budget = *self.dispatcher.budget();
        let mut iteration: u64 = 0;
        let mut records_processed: u64 = 0;

        let cause = loop {
            stats.time_running = self.dispatcher.pacing().time_running();
            if let Some(cause) = self.stop_cause(&budget, &stats) {
                break cause;
            }

            iteration += 1;
            if self.reset_interval > 0 && iteration % self.reset_interval == 0 {
                self.housekeeping(iteration, &stats);
            }

            let Some(record) = self.roster.next_record() else {
                debug!("Roster returned no record");
                break StopCause::RosterExhausted;
            };
            let has_more_records = self.roster.has_next();

            let outcome = self.dispatcher.attempt(
                &record,
                &self.template,
                budget.max_retries(),
                &mut stats,
                has_more_records,
            );
            records_processed += 1;

            stats.time_running = self.dispatcher.pacing().time_running();
            stats.advance_position(self.roster.position());
            self.save_snapshot(&stats);

            debug!(
                record = %record.id(),
                position = stats.current_position,
                success = outcome.success,
                attempts = outcome.attempts,
                "Finished record"
            );
            self.sink.emit(&SessionEvent::RecordFinished {
                record: record.id(),
                position: stats.current_position,
                success: outcome.success,
                time_running: stats.time_running,
            });
        };

        stats.time_running = self.dispatcher.pacing().time_running();
        self.state = SessionState::Stopped(cause);
        if let Err(e) = self.store.save(&stats) {
            self.report_save_failure(&e);
            return Err(SessionError::Snapshot(e));
        }

        info!(
            cause = cause.as_str(),
            time_running = stats.time_running,
            messages_sent = stats.messages_sent,
            messages_failed = stats.messages_failed,
            "Send session stopped: {cause}"
        );
        self.sink.emit(&SessionEvent::SessionStopped {
            cause: cause.as_str().to_string(),
            time_running: stats.time_running,
            messages_sent: stats.messages_sent,
            messages_failed: stats.messages_failed,
        });

        Ok(SessionSummary {
            cause,
            rates: stats.rates(),
            records_processed,
            remaining_time: budget.remaining_time(stats.time_running),
            remaining_messages: budget.remaining_messages(stats.messages_sent),
            statistics: stats,
        })
    }

    /// Checks the stop conditions in priority order.
    fn stop_cause(&self, budget: &SendBudget, stats: &RunStatistics) -> Option<StopCause> {
        if let Some(limit_secs) = budget.max_time()
            && stats.time_running >= limit_secs
        {
            return Some(StopCause::MaxTime { limit_secs });
        }
        if let Some(limit) = budget.max_messages()
            && stats.messages_sent >= limit
        {
            return Some(StopCause::MaxMessages { limit });
        }
        if !self.roster.has_next() {
            return Some(StopCause::RosterExhausted);
        }
        if self.interrupt.load(Ordering::SeqCst) {
            return Some(StopCause::Interrupted);
        }
        None
    }

    /// Saves a snapshot and recycles the submitter's session handle.
    ///
    /// Never changes counters; failures are only reported.
    fn housekeeping(&mut self, iteration: u64, stats: &RunStatistics) {
        info!(iteration, "Housekeeping: saving statistics and resetting submitter");
        self.sink.emit(&SessionEvent::Housekeeping { iteration });
        self.save_snapshot(stats);
        if let Err(e) = self.dispatcher.reset_submitter() {
            warn!(iteration, error = %e, "Submitter reset failed");
            self.sink.emit(&SessionEvent::ResetFailed {
                error: e.to_string(),
            });
        }
    }

    fn save_snapshot(&self, stats: &RunStatistics) {
        if let Err(e) = self.store.save(stats) {
            self.report_save_failure(&e);
        }
    }

    fn report_save_failure(&self, error: &StatsError) {
        warn!(
            path = %self.store.path().display(),
            error = %error,
            "Failed to save statistics snapshot"
        );
        self.sink.emit(&SessionEvent::SnapshotSaveFailed {
            path: self.store.path().display().to_string(),
            error: error.to_string(),
        });
    }
}

impl<S, R> std::fmt::Debug for SessionController<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("store", &self.store)
            .field("reset_interval", &self.reset_interval)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacing::Pacing;
    use crate::testing::{FixedRandom, ManualClock, MemorySink, MockSubmitter, VecRoster};
    use tempfile::TempDir;

    fn controller(
        submitter: MockSubmitter,
        roster: VecRoster,
        budget: SendBudget,
        dir: &TempDir,
    ) -> (SessionController<MockSubmitter, VecRoster>, Arc<MemorySink>) {
        let clock = ManualClock::new();
        let sink = Arc::new(MemorySink::new());
        let dispatcher = RetryDispatcher::new(submitter, budget, sink.clone()).with_pacing(
            Pacing::new(clock.clone(), clock.sleeper(), FixedRandom::low()),
        );
        let store = StatsStore::new(dir.path().join("stats.json"));
        let session =
            SessionController::new(dispatcher, roster, store, "Hi {name}".into(), sink.clone());
        (session, sink)
    }

    #[test]
    fn test_stops_when_roster_exhausted() {
        let dir = TempDir::new().unwrap();
        let submitter = MockSubmitter::succeeding();
        let (mut session, sink) = controller(
            submitter.clone(),
            VecRoster::numbered(3),
            SendBudget::unpaced(2),
            &dir,
        );

        let summary = session.run().unwrap();

        assert_eq!(summary.cause, StopCause::RosterExhausted);
        assert_eq!(summary.records_processed, 3);
        assert_eq!(summary.statistics.messages_sent, 3);
        assert_eq!(summary.statistics.current_position, 3);
        assert_eq!(session.state(), SessionState::Stopped(StopCause::RosterExhausted));
        assert_eq!(submitter.call_count(), 3);
        assert_eq!(sink.count("record.finished"), 3);
        assert_eq!(sink.names().last(), Some(&"session.stopped"));
    }

    #[test]
    fn test_empty_roster() {
        let dir = TempDir::new().unwrap();
        let (mut session, _sink) = controller(
            MockSubmitter::succeeding(),
            VecRoster::new(Vec::new()),
            SendBudget::unpaced(2),
            &dir,
        );

        let summary = session.run().unwrap();

        assert_eq!(summary.cause, StopCause::RosterExhausted);
        assert_eq!(summary.records_processed, 0);
        assert!(dir.path().join("stats.json").exists());
    }

    #[test]
    fn test_time_budget_checked_before_message_budget() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("stats.json"),
            r#"{"time_running": 100.0, "messages_sent": 5, "messages_failed": 0,
                "times_failed": 0, "time_sending": 0.0, "time_retrying": 0.0,
                "current_position": 0}"#,
        )
        .unwrap();
        let budget = SendBudget::new(Some(50.0), Some(5), 1, 0.0, 0.0).unwrap();
        let (mut session, _sink) =
            controller(MockSubmitter::succeeding(), VecRoster::numbered(2), budget, &dir);

        let summary = session.run().unwrap();

        assert_eq!(summary.cause, StopCause::MaxTime { limit_secs: 50.0 });
        assert_eq!(summary.remaining_time, Some(0.0));
        assert_eq!(summary.remaining_messages, Some(0));
    }

    #[test]
    fn test_interrupt_stops_before_next_record() {
        let dir = TempDir::new().unwrap();
        let submitter = MockSubmitter::succeeding();
        let (session, _sink) = controller(
            submitter.clone(),
            VecRoster::numbered(3),
            SendBudget::unpaced(1),
            &dir,
        );
        let flag = Arc::new(AtomicBool::new(true));
        let mut session = session.with_interrupt(Arc::clone(&flag));

        let summary = session.run().unwrap();

        assert_eq!(summary.cause, StopCause::Interrupted);
        assert_eq!(summary.cause.exit_code(), 130);
        assert_eq!(submitter.call_count(), 0);
    }

    #[test]
    fn test_housekeeping_resets_submitter() {
        let dir = TempDir::new().unwrap();
        let submitter = MockSubmitter::succeeding().failing_resets();
        let (session, sink) = controller(
            submitter.clone(),
            VecRoster::numbered(7),
            SendBudget::unpaced(1),
            &dir,
        );
        let mut session = session.with_reset_interval(3);

        let summary = session.run().unwrap();

        // Iterations 3 and 6 trigger housekeeping.
        assert_eq!(submitter.resets(), 2);
        assert_eq!(sink.count("session.housekeeping"), 2);
        assert_eq!(sink.count("session.reset_failed"), 2);
        assert_eq!(summary.statistics.messages_sent, 7);
        assert_eq!(summary.statistics.messages_failed, 0);
    }

    #[test]
    fn test_housekeeping_disabled() {
        let dir = TempDir::new().unwrap();
        let submitter = MockSubmitter::succeeding();
        let (session, _sink) = controller(
            submitter.clone(),
            VecRoster::numbered(25),
            SendBudget::unpaced(1),
            &dir,
        );
        let mut session = session.with_reset_interval(0);
        session.run().unwrap();
        assert_eq!(submitter.resets(), 0);
    }

    #[test]
    fn test_final_save_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new();
        let sink = Arc::new(MemorySink::new());
        let dispatcher = RetryDispatcher::new(
            MockSubmitter::succeeding(),
            SendBudget::unpaced(1),
            sink.clone(),
        )
        .with_pacing(Pacing::new(clock.clone(), clock.sleeper(), FixedRandom::low()));
        // A directory at the snapshot path makes every rename fail.
        let stats_path = dir.path().join("stats.json");
        std::fs::create_dir(&stats_path).unwrap();
        let mut session = SessionController::new(
            dispatcher,
            VecRoster::numbered(1),
            StatsStore::new(stats_path),
            "Hi".into(),
            sink.clone(),
        );

        let result = session.run();

        assert!(matches!(result, Err(SessionError::Snapshot(_))));
        assert!(sink.count("stats.save_failed") >= 2);
        assert_eq!(sink.count("session.stopped"), 0);
    }
}
