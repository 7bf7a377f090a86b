//! # respframe - RESP Command Framing and Dispatch
//!
//! respframe is the request side of a Redis-compatible server: it turns the
//! raw bytes of a client connection into discrete commands and routes each
//! command to a registered handler.
//!
//! ## Features
//!
//! - **Resumable Decoding**: Commands may arrive split at any byte boundary;
//!   the decoder picks up exactly where it stopped
//! - **Two Request Forms**: RESP multi-bulk arrays and telnet-style inline lines
//! - **Typed Registry**: Handlers declare their argument shape and receive
//!   coerced arguments
//! - **Contained Failures**: Handler errors and panics become error replies;
//!   only framing errors close a connection
//! - **Async I/O**: Built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              respframe                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│ Dispatcher  │                  │
//! │  │ (Listener)  │    │  Handler    │    │             │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌─────────────────┐              │
//! │                     │  Command    │    │ CommandRegistry │              │
//! │                     │  Decoder    │    │  (read-only,    │              │
//! │                     │ (per conn)  │    │   shared)       │              │
//! │                     └─────────────┘    └─────────────────┘              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use respframe::commands::{builtin, Dispatcher, Keyspace};
//! use respframe::connection::{handle_connection, ConnectionStats};
//! use respframe::protocol::DecoderLimits;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = builtin::registry(Arc::new(Keyspace::new()));
//!     let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         tokio::spawn(handle_connection(
//!             stream,
//!             addr,
//!             Arc::clone(&dispatcher),
//!             DecoderLimits::default(),
//!             Arc::clone(&stats),
//!         ));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `ECHO message`
//! - `QUIT`
//! - `TIME`
//! - `COMMAND`
//! - `GET key` / `SET key value` / `DEL key [key ...]`
//! - `INCR key` / `INCRBY key increment` / `STRLEN key`
//!
//! ## Module Overview
//!
//! - [`protocol`]: Resumable command decoder and reply encoding
//! - [`commands`]: Command registry, dispatcher and built-in commands
//! - [`connection`]: Client connection management
//! - [`config`]: Command-line configuration
//!
//! ## Design Highlights
//!
//! ### Checkpointed Decoding
//!
//! The decoder reads through a cursor that can be rewound to the last whole
//! unit. Bytes leave the connection buffer only once a header, a bulk
//! argument or an inline line is complete, so a short read costs nothing
//! but a retry on the next one.
//!
//! ### Zero-Copy Arguments
//!
//! Bulk arguments are split off the connection buffer as `bytes::Bytes`,
//! so large values are never copied between the socket and the handler.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;

// Re-export commonly used types for convenience
pub use commands::{CommandRegistry, Dispatcher};
pub use config::{ConfigAction, ServerConfig};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{Command, CommandDecoder, DecoderLimits, FrameError, Reply};

/// The default port the server listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host the server binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of respframe
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
