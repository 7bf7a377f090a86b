//! RESP Request Framing
//!
//! This module turns raw connection bytes into [`Command`]s and defines the
//! [`Reply`] values that flow back to the client.
//!
//! ## Modules
//!
//! - `primitives`: Checkpointing cursor and the CRLF-terminated length reader
//! - `command`: The decoded `Command` unit
//! - `decoder`: Resumable per-connection `CommandDecoder`
//! - `reply`: The `Reply` model and its wire encoding
//!
//! ## Example
//!
//! ```
//! use bytes::BytesMut;
//! use respframe::protocol::{CommandDecoder, Reply};
//!
//! let mut decoder = CommandDecoder::new();
//! let mut buffer = BytesMut::from(&b"*1\r\n$4\r\nPING\r\nPING\r\n"[..]);
//!
//! let commands = decoder.feed(&mut buffer).unwrap();
//! assert_eq!(commands.len(), 2);
//! assert!(!commands[0].is_inline());
//! assert!(commands[1].is_inline());
//!
//! assert_eq!(Reply::pong().serialize(), b"+PONG\r\n");
//! ```

pub mod command;
pub mod decoder;
pub mod primitives;
pub mod reply;

pub use command::Command;
pub use decoder::{CommandDecoder, DecoderLimits};
pub use primitives::FrameError;
pub use reply::{InlineData, Reply};
