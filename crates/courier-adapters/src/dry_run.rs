//! A submitter that only logs.

use courier_proto::{Record, SubmissionError, Submitter};
use tracing::info;

/// Logs each rendered message instead of delivering it. Never fails.
#[derive(Debug, Default)]
pub struct DryRunSubmitter {
    submitted: u64,
    resets: u64,
}

impl DryRunSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages "sent" so far.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }
}

impl Submitter for DryRunSubmitter {
    fn submit(
        &mut self,
        record: &Record,
        message: &str,
        subject: Option<&str>,
    ) -> Result<(), SubmissionError> {
        self.submitted += 1;
        info!(
            record = %record.id(),
            subject = subject.unwrap_or(""),
            message = %message,
            "[dry run] would submit message"
        );
        Ok(())
    }

    fn reset(&mut self) -> Result<(), SubmissionError> {
        self.resets += 1;
        info!("[dry run] would reset submitter session");
        Ok(())
    }
}
