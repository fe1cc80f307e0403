//! The submission collaborator boundary.

use crate::Record;

/// Failure reported by a submission attempt.
///
/// Every variant is transient from the session's point of view: the retry
/// dispatcher counts it and tries again until its retry budget is spent.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("submission timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("submission I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Delivers one rendered message for one record.
///
/// Calls are strictly sequential. Implementations may hold a long-lived,
/// stateful session handle that the controller periodically asks to reset.
pub trait Submitter {
    /// Submits `message` (and `subject`, when configured) for `record`.
    fn submit(
        &mut self,
        record: &Record,
        message: &str,
        subject: Option<&str>,
    ) -> Result<(), SubmissionError>;

    /// Recycles the underlying session handle.
    fn reset(&mut self) -> Result<(), SubmissionError> {
        Ok(())
    }
}

impl<S: Submitter + ?Sized> Submitter for Box<S> {
    fn submit(
        &mut self,
        record: &Record,
        message: &str,
        subject: Option<&str>,
    ) -> Result<(), SubmissionError> {
        (**self).submit(record, message, subject)
    }

    fn reset(&mut self) -> Result<(), SubmissionError> {
        (**self).reset()
    }
}
