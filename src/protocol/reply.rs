//! Reply Values
//!
//! This module defines what a command handler can answer with, and how each
//! answer is written back on the wire.
//!
//! ## Protocol Format
//!
//! - `+` Status: `+OK\r\n`
//! - `-` Error: `-ERR unknown command\r\n`
//! - `:` Integer: `:1000\r\n`
//! - `$` Bulk: `$5\r\nhello\r\n`, absent bulk `$-1\r\n`
//! - `*` Multi-bulk: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`, absent `*-1\r\n`
//!
//! Inline requests (the legacy `PING\r\n` form) receive inline replies, which
//! flatten any structured reply into a single line.

use crate::protocol::primitives::CRLF;
use bytes::Bytes;
use std::fmt;

/// Reply type prefixes
pub mod prefix {
    pub const STATUS: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK: u8 = b'$';
    pub const MULTI_BULK: u8 = b'*';
}

const NO_SUCH_COMMAND: &str = "ERR unknown command";
const NOT_YET_IMPLEMENTED: &str = "ERR not yet implemented";

/// The payload of an inline reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineData {
    Text(Bytes),
    Integer(i64),
    Error(String),
}

/// A reply produced by dispatching one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Format: `+<status>\r\n`
    Status(String),

    /// Format: `-<message>\r\n`
    Error(String),

    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe payload, `None` is the nil bulk `$-1\r\n`.
    Bulk(Option<Bytes>),

    /// Nested replies, `None` is the nil array `*-1\r\n`.
    MultiBulk(Option<Vec<Reply>>),

    /// Flattened reply to an inline request; `None` writes a bare CRLF.
    Inline(Option<InlineData>),

    /// Sentinel for a request that carried no command name at all.
    NoSuchCommand,

    /// Sentinel for a handler that produced no value.
    NotYetImplemented,

    /// Close the connection after flushing queued output. Writes nothing.
    Quit,
}

impl Reply {
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    /// Creates an error reply.
    ///
    /// # Example
    /// ```
    /// use respframe::protocol::Reply;
    /// let err = Reply::error("ERR wrong number of arguments for 'get' command");
    /// assert!(err.is_error());
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(Some(data.into()))
    }

    /// The nil bulk string.
    pub fn nil() -> Self {
        Reply::Bulk(None)
    }

    pub fn array(values: Vec<Reply>) -> Self {
        Reply::MultiBulk(Some(values))
    }

    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn pong() -> Self {
        Reply::Status("PONG".to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Reply::Error(_)
                | Reply::NoSuchCommand
                | Reply::NotYetImplemented
                | Reply::Inline(Some(InlineData::Error(_)))
        )
    }

    pub fn is_quit(&self) -> bool {
        matches!(self, Reply::Quit)
    }

    /// Flattens this reply into the inline form.
    ///
    /// Multi-bulk replies become the flattened text of their elements joined
    /// by single spaces. `Quit` is returned unchanged, since it never reaches
    /// the wire.
    pub fn into_inline(self) -> Reply {
        match self {
            Reply::Inline(data) => Reply::Inline(data),
            Reply::Quit => Reply::Quit,
            Reply::Bulk(None) => Reply::Inline(None),
            other => Reply::Inline(Some(other.flatten())),
        }
    }

    fn flatten(self) -> InlineData {
        match self {
            Reply::Status(s) => InlineData::Text(Bytes::from(s)),
            Reply::Error(s) => InlineData::Error(s),
            Reply::Integer(n) => InlineData::Integer(n),
            Reply::Bulk(data) => InlineData::Text(data.unwrap_or_default()),
            Reply::MultiBulk(values) => {
                let mut text = Vec::new();
                for (i, value) in values.unwrap_or_default().into_iter().enumerate() {
                    if i > 0 {
                        text.push(b' ');
                    }
                    match value.flatten() {
                        InlineData::Text(t) => text.extend_from_slice(&t),
                        InlineData::Integer(n) => text.extend_from_slice(n.to_string().as_bytes()),
                        InlineData::Error(e) => text.extend_from_slice(e.as_bytes()),
                    }
                }
                InlineData::Text(Bytes::from(text))
            }
            Reply::Inline(data) => data.unwrap_or(InlineData::Text(Bytes::new())),
            Reply::NoSuchCommand => InlineData::Error(NO_SUCH_COMMAND.to_string()),
            Reply::NotYetImplemented => InlineData::Error(NOT_YET_IMPLEMENTED.to_string()),
            Reply::Quit => InlineData::Text(Bytes::new()),
        }
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    ///
    /// The connection uses this to queue every reply of a pipelined batch
    /// before a single flush.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => write_line(buf, prefix::STATUS, s.as_bytes()),
            Reply::Error(s) => write_line(buf, prefix::ERROR, s.as_bytes()),
            Reply::Integer(n) => write_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            Reply::Bulk(Some(data)) => {
                write_line(buf, prefix::BULK, data.len().to_string().as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Reply::Bulk(None) => write_line(buf, prefix::BULK, b"-1"),
            Reply::MultiBulk(Some(values)) => {
                write_line(buf, prefix::MULTI_BULK, values.len().to_string().as_bytes());
                for value in values {
                    value.serialize_into(buf);
                }
            }
            Reply::MultiBulk(None) => write_line(buf, prefix::MULTI_BULK, b"-1"),
            Reply::Inline(None) => buf.extend_from_slice(CRLF),
            Reply::Inline(Some(InlineData::Text(text))) => {
                write_line(buf, prefix::STATUS, text)
            }
            Reply::Inline(Some(InlineData::Integer(n))) => {
                write_line(buf, prefix::INTEGER, n.to_string().as_bytes())
            }
            Reply::Inline(Some(InlineData::Error(e))) => {
                write_line(buf, prefix::ERROR, e.as_bytes())
            }
            Reply::NoSuchCommand => write_line(buf, prefix::ERROR, NO_SUCH_COMMAND.as_bytes()),
            Reply::NotYetImplemented => {
                write_line(buf, prefix::ERROR, NOT_YET_IMPLEMENTED.as_bytes())
            }
            Reply::Quit => {}
        }
    }
}

/// Writes `<prefix><body>\r\n`, replacing any CR or LF in the body.
///
/// Status and error lines are not length-prefixed, so an embedded line break
/// would desynchronize the client.
fn write_line(buf: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    buf.push(prefix);
    buf.extend(
        body.iter()
            .map(|&b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
    );
    buf.extend_from_slice(CRLF);
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(Some(data)) => write!(f, "\"{}\"", data.escape_ascii()),
            Reply::Bulk(None) | Reply::MultiBulk(None) => write!(f, "(nil)"),
            Reply::MultiBulk(Some(values)) => {
                if values.is_empty() {
                    return write!(f, "(empty array)");
                }
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
            Reply::Inline(None) => Ok(()),
            Reply::Inline(Some(InlineData::Text(t))) => write!(f, "{}", t.escape_ascii()),
            Reply::Inline(Some(InlineData::Integer(n))) => write!(f, "{}", n),
            Reply::Inline(Some(InlineData::Error(e))) => write!(f, "(error) {}", e),
            Reply::NoSuchCommand => write!(f, "(error) {}", NO_SUCH_COMMAND),
            Reply::NotYetImplemented => write!(f, "(error) {}", NOT_YET_IMPLEMENTED),
            Reply::Quit => write!(f, "(quit)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialize() {
        assert_eq!(Reply::ok().serialize(), b"+OK\r\n");
        assert_eq!(Reply::pong().serialize(), b"+PONG\r\n");
    }

    #[test]
    fn test_error_serialize() {
        let value = Reply::error("ERR unknown command 'foo'");
        assert_eq!(value.serialize(), b"-ERR unknown command 'foo'\r\n");
    }

    #[test]
    fn test_error_line_breaks_are_neutralized() {
        let value = Reply::error("ERR bad\r\nthing");
        assert_eq!(value.serialize(), b"-ERR bad  thing\r\n");
    }

    #[test]
    fn test_integer_serialize() {
        assert_eq!(Reply::integer(1000).serialize(), b":1000\r\n");
        assert_eq!(Reply::integer(-42).serialize(), b":-42\r\n");
    }

    #[test]
    fn test_bulk_serialize() {
        assert_eq!(Reply::bulk("hello").serialize(), b"$5\r\nhello\r\n");
        assert_eq!(Reply::nil().serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_multi_bulk_serialize() {
        let value = Reply::array(vec![
            Reply::integer(1),
            Reply::array(vec![Reply::bulk("a"), Reply::nil()]),
        ]);
        assert_eq!(value.serialize(), b"*2\r\n:1\r\n*2\r\n$1\r\na\r\n$-1\r\n");
        assert_eq!(Reply::MultiBulk(None).serialize(), b"*-1\r\n");
    }

    #[test]
    fn test_sentinels_serialize() {
        assert_eq!(Reply::NotYetImplemented.serialize(), b"-ERR not yet implemented\r\n");
        assert_eq!(Reply::NoSuchCommand.serialize(), b"-ERR unknown command\r\n");
        assert!(Reply::Quit.serialize().is_empty());
    }

    #[test]
    fn test_into_inline() {
        assert_eq!(
            Reply::pong().into_inline(),
            Reply::Inline(Some(InlineData::Text(Bytes::from("PONG"))))
        );
        assert_eq!(Reply::nil().into_inline(), Reply::Inline(None));
        assert_eq!(
            Reply::integer(7).into_inline(),
            Reply::Inline(Some(InlineData::Integer(7)))
        );
        assert_eq!(
            Reply::array(vec![Reply::bulk("a"), Reply::integer(2), Reply::nil()]).into_inline(),
            Reply::Inline(Some(InlineData::Text(Bytes::from("a 2 "))))
        );
        assert_eq!(Reply::Quit.into_inline(), Reply::Quit);
    }

    #[test]
    fn test_inline_serialize() {
        assert_eq!(Reply::pong().into_inline().serialize(), b"+PONG\r\n");
        assert_eq!(Reply::Inline(None).serialize(), b"\r\n");
        assert_eq!(
            Reply::error("ERR boom").into_inline().serialize(),
            b"-ERR boom\r\n"
        );
    }
}
