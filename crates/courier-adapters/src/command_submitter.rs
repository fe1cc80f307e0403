//! Submits messages by running an external command.

use crate::command_executor::{CommandOutput, run_command};
use courier_core::{SessionSettings, Template};
use courier_proto::{EventSink, Record, SubmissionError, Submitter};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Record id, as a decimal string.
pub const ENV_RECORD_ID: &str = "COURIER_RECORD_ID";
/// Rendered subject, only set when a subject is configured.
pub const ENV_SUBJECT: &str = "COURIER_SUBJECT";
/// Rendered target template, only set when a target is configured.
pub const ENV_TARGET: &str = "COURIER_TARGET";
/// Every record field as a JSON object.
pub const ENV_FIELDS: &str = "COURIER_FIELDS";

/// Runs one command per submission attempt.
///
/// The rendered message is written to the command's stdin; the record is
/// described through `COURIER_*` environment variables. Exit status 0 means
/// the message was delivered.
pub struct CommandSubmitter {
    program: String,
    args: Vec<String>,
    reset_command: Vec<String>,
    target: Option<Template>,
    timeout: Option<Duration>,
    handle: Handle,
    sink: Arc<dyn EventSink>,
}

impl CommandSubmitter {
    pub fn new(program: impl Into<String>, handle: Handle, sink: Arc<dyn EventSink>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            reset_command: Vec::new(),
            target: None,
            timeout: None,
            handle,
            sink,
        }
    }

    /// Builds a submitter from validated settings.
    pub fn from_settings(
        settings: &SessionSettings,
        handle: Handle,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self::new(settings.command.clone(), handle, sink)
            .with_args(settings.args.clone())
            .with_reset_command(settings.reset_command.clone())
            .with_target(settings.target.as_deref().map(Template::new))
            .with_timeout(Some(settings.submit_timeout).filter(|t| !t.is_zero()))
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Program and arguments run on every reset; empty disables resets.
    #[must_use]
    pub fn with_reset_command(mut self, reset_command: Vec<String>) -> Self {
        self.reset_command = reset_command;
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: Option<Template>) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn environment(&self, record: &Record, subject: Option<&str>) -> Vec<(&'static str, String)> {
        let mut envs = vec![
            (ENV_RECORD_ID, record.id().to_string()),
            (ENV_FIELDS, record.fields_json().to_string()),
        ];
        if let Some(subject) = subject {
            envs.push((ENV_SUBJECT, subject.to_string()));
        }
        if let Some(target) = &self.target {
            envs.push((ENV_TARGET, target.render(record, self.sink.as_ref())));
        }
        envs
    }

    fn check(&self, program: &str, output: CommandOutput) -> Result<(), SubmissionError> {
        if output.success {
            return Ok(());
        }
        if output.timed_out {
            return Err(SubmissionError::Timeout {
                secs: self.timeout.map_or(0, |t| t.as_secs()),
            });
        }
        let code = output
            .exit_code
            .map_or_else(|| "a signal".to_string(), |c| format!("status {c}"));
        let detail = output.stderr.lines().last().unwrap_or_default();
        Err(SubmissionError::Rejected(if detail.is_empty() {
            format!("{program} exited with {code}")
        } else {
            format!("{program} exited with {code}: {detail}")
        }))
    }
}

impl Submitter for CommandSubmitter {
    fn submit(
        &mut self,
        record: &Record,
        message: &str,
        subject: Option<&str>,
    ) -> Result<(), SubmissionError> {
        let envs = self.environment(record, subject);
        debug!(record = %record.id(), command = %self.program, "Running submit command");
        let output = self.handle.block_on(run_command(
            &self.program,
            &self.args,
            &envs,
            Some(message),
            self.timeout,
        ))?;
        self.check(&self.program, output)
    }

    fn reset(&mut self) -> Result<(), SubmissionError> {
        let Some((program, args)) = self.reset_command.split_first() else {
            return Ok(());
        };
        info!(command = %program, "Running reset command");
        let output = self
            .handle
            .block_on(run_command(program, args, &[], None, self.timeout))?;
        self.check(program, output)
    }
}

impl std::fmt::Debug for CommandSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSubmitter")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("reset_command", &self.reset_command)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
