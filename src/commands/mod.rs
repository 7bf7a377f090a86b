//! Command Dispatch Module
//!
//! This module implements the command processing layer: it receives decoded
//! commands, finds the registered handler, coerces the arguments and turns
//! the outcome into a reply.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ CommandDecoder  │  (protocol module)
//! └────────┬────────┘
//!          │ Command
//!          ▼
//! ┌─────────────────┐
//! │   Dispatcher    │  (this module)
//! │                 │
//! │  - Lookup       │
//! │  - Coerce       │
//! │  - Execute      │
//! └────────┬────────┘
//!          │ lookup
//!          ▼
//! ┌─────────────────┐
//! │ CommandRegistry │  built once, shared read-only
//! └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `registry`: Argument shapes, coercion and the handler table
//! - `dispatcher`: Turns one `Command` into one `Reply`
//! - `builtin`: `PING`, `ECHO`, `QUIT`, `TIME`, `COMMAND` and a few key commands

pub mod builtin;
pub mod dispatcher;
pub mod registry;

pub use builtin::Keyspace;
pub use dispatcher::Dispatcher;
pub use registry::{
    Arg, ArgKind, ArgShape, Args, CommandError, CommandRegistry, CommandSpec, Handler,
    HandlerResult, RegistryBuilder,
};
