//! Command Dispatcher
//!
//! Routes a decoded [`Command`] to its registered handler and turns whatever
//! happens into a [`Reply`]. Nothing that goes wrong while executing a
//! command escapes this module: unknown names, bad arguments, handler errors
//! and even handler panics all become `-ERR` replies, and the connection
//! stays open.
//!
//! ## Dispatch Steps
//!
//! ```text
//! Command ──> lower-case name ──> registry lookup ──> coerce args ──> handler
//!                                      │                  │              │
//!                                      ▼                  ▼              ▼
//!                           "unknown command 'x'"     "ERR <why>"    Reply / None / error
//!                                                                        │
//!                                                 inline request? ───────┤
//!                                                  yes: Reply::Inline    │
//!                                                  no:  as is, or NotYetImplemented for None
//! ```
//!
//! Errors the handler signals on purpose (`CommandError::Domain`) are user
//! errors and are logged at debug level. Internal errors and panics are bugs:
//! they are logged at error level and counted in [`Dispatcher::faults`].

use crate::commands::registry::{CommandError, CommandRegistry};
use crate::protocol::{Command, Reply};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Dispatches commands against a shared, immutable registry.
///
/// A single dispatcher is shared by all connections; it holds no
/// per-connection state.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    faults: AtomicU64,
}

impl Dispatcher {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self {
            registry,
            faults: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Number of unexpected handler faults (internal errors and panics) so far.
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    /// Executes a command and returns the reply to send.
    ///
    /// `Reply::Quit` is passed through untouched: the caller must flush what
    /// it already queued and close the connection without writing anything
    /// for the quit itself.
    pub fn dispatch(&self, command: Command) -> Reply {
        let inline = command.is_inline();
        let reply = self.execute(&command);

        match (inline, reply) {
            (_, Some(Reply::Quit)) => Reply::Quit,
            (true, Some(reply)) => reply.into_inline(),
            (true, None) => Reply::Inline(None),
            (false, Some(reply)) => reply,
            (false, None) => Reply::NotYetImplemented,
        }
    }

    fn execute(&self, command: &Command) -> Option<Reply> {
        let Some(raw_name) = command.name() else {
            return Some(Reply::NoSuchCommand);
        };

        // ASCII-only folding; other bytes pass through unchanged
        let name = raw_name.to_ascii_lowercase();

        let Some(spec) = self.registry.lookup(&name) else {
            debug!(command = %name.escape_ascii(), "Unknown command");
            return Some(Reply::error(format!(
                "unknown command '{}'",
                name.escape_ascii()
            )));
        };

        let args = match spec.shape.coerce(&spec.name, command.args()) {
            Ok(args) => args,
            Err(e) => {
                debug!(command = %spec.name, error = %e, "Invalid arguments");
                return Some(error_reply(&e));
            }
        };

        match catch_unwind(AssertUnwindSafe(|| (spec.handler)(&args))) {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) if e.is_unexpected() => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                error!(command = %spec.name, error = ?e, "Unexpected error in command handler");
                Some(error_reply(&e))
            }
            Ok(Err(e)) => {
                debug!(command = %spec.name, error = %e, "Command failed");
                Some(error_reply(&e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.faults.fetch_add(1, Ordering::Relaxed);
                error!(command = %spec.name, panic = %message, "Command handler panicked");
                Some(Reply::error(format!("ERR {}", message)))
            }
        }
    }
}

fn error_reply(e: &CommandError) -> Reply {
    Reply::error(format!("ERR {}", e))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "command handler panicked".to_string()
    }
}
