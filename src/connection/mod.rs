//! Connection Handler Module
//!
//! This module manages individual client connections. Each connection runs
//! in its own async task and owns its own `CommandDecoder`, so framing state
//! is never shared between clients.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (main.rs)                                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│   Decode    │───>│  Dispatch   │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Queue reply │        │
//! │                                      │ flush/batch │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use respframe::commands::{builtin, Dispatcher, Keyspace};
//! use respframe::connection::{handle_connection, ConnectionStats};
//! use respframe::protocol::DecoderLimits;
//! use std::sync::Arc;
//!
//! let registry = builtin::registry(Arc::new(Keyspace::new()));
//! let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));
//! let stats = Arc::new(ConnectionStats::new());
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(
//!     stream,
//!     addr,
//!     Arc::clone(&dispatcher),
//!     DecoderLimits::default(),
//!     Arc::clone(&stats),
//! ));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
