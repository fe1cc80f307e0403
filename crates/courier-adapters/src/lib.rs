//! # courier-adapters
//!
//! Submitter implementations for Courier.
//!
//! - `CommandSubmitter` hands each rendered message to an external command.
//!   The command receives the message on stdin and the record in its
//!   environment, and reports success through its exit status.
//! - `DryRunSubmitter` logs what would be sent and always succeeds.
//!
//! `build_submitter` picks one from validated session settings.

mod command_executor;
mod command_submitter;
mod dry_run;

pub use command_executor::{CommandOutput, run_command};
pub use command_submitter::{
    ENV_FIELDS, ENV_RECORD_ID, ENV_SUBJECT, ENV_TARGET, CommandSubmitter,
};
pub use dry_run::DryRunSubmitter;

use courier_core::SessionSettings;
use courier_proto::{EventSink, Submitter};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Builds the submitter described by `settings`.
///
/// `handle` is the runtime used to drive external commands; the returned
/// submitter must be called from outside that runtime's async context
/// (for example from `spawn_blocking`).
pub fn build_submitter(
    settings: &SessionSettings,
    handle: Handle,
    sink: Arc<dyn EventSink>,
) -> Box<dyn Submitter + Send> {
    if settings.dry_run {
        Box::new(DryRunSubmitter::new())
    } else {
        Box::new(CommandSubmitter::from_settings(settings, handle, sink))
    }
}
