//! Low-Level Protocol Primitives
//!
//! The building blocks the frame decoder is made of: a checkpointing read
//! cursor, the `Progress` result of a parse attempt, and the CRLF-terminated
//! decimal length reader used for both the array header (`*<n>\r\n`) and
//! every bulk string header (`$<n>\r\n`).
//!
//! ## The Attempt Discipline
//!
//! Every parse step works the same way:
//!
//! 1. Take a checkpoint of the cursor position
//! 2. Try to read the whole unit (length line, bulk body, ...)
//! 3. If the buffer runs out, rewind to the checkpoint and report
//!    `Progress::Incomplete` together with how many more bytes are needed
//!
//! Because a failed attempt never moves the cursor, retrying the same step
//! after more bytes arrive produces exactly the same result as if all the
//! bytes had been there the first time.

use thiserror::Error;

/// The CRLF terminator used by the protocol
pub const CRLF: &[u8] = b"\r\n";

/// Protocol type prefixes understood by the request decoder
pub mod prefix {
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// Longest decimal length line we accept before giving up on finding CRLF.
///
/// `i64::MIN` is 20 characters including the sign.
pub const MAX_LENGTH_DIGITS: usize = 20;

/// Fatal framing errors.
///
/// None of these are recoverable: once the byte stream is misaligned there is
/// no way to find the start of the next command, so the connection must close.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A type marker other than the one the grammar requires at this point
    #[error("expected '{expected}', got {}", describe_byte(.found))]
    UnexpectedByte { expected: char, found: u8 },

    /// A length line that is not a decimal integer
    #[error("invalid length: {0}")]
    InvalidLength(String),

    /// A length that is negative or larger than the configured maximum
    #[error("invalid {kind} length: {length} (max: {max})")]
    LengthOutOfRange {
        kind: &'static str,
        length: i64,
        max: usize,
    },

    /// A line or payload not followed by CRLF
    #[error("missing CRLF terminator")]
    MissingCrlf,

    /// An inline command line longer than the configured maximum
    #[error("too big inline request (max: {max} bytes)")]
    InlineTooLong { max: usize },

    /// The decoder already failed on this stream and refuses further input
    #[error("stream already failed to decode")]
    Poisoned,
}

fn describe_byte(b: &u8) -> String {
    if b.is_ascii_graphic() {
        format!("'{}'", char::from(*b))
    } else {
        format!("{:#04x}", b)
    }
}

/// Outcome of a single parse attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<T> {
    /// The unit was read completely; the cursor sits just past it.
    Complete(T),
    /// The buffer ended early; the cursor is back where the attempt started.
    ///
    /// `needed` is the minimum number of extra bytes before a retry can make
    /// any progress. It is always at least 1.
    Incomplete { needed: usize },
}

impl<T> Progress<T> {
    /// Builds an `Incomplete`, clamping `needed` to at least 1.
    pub fn need(needed: usize) -> Self {
        Progress::Incomplete {
            needed: needed.max(1),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Progress::Complete(_))
    }
}

/// A read position over a borrowed byte slice.
///
/// The cursor never owns or mutates the bytes; the decoder decides separately
/// how much of the underlying buffer to release once a unit is complete.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current read offset from the start of the slice.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// The next unread byte, without consuming it.
    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    /// All unread bytes.
    #[inline]
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Consumes and returns the next byte.
    #[inline]
    pub fn next_byte(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Skips up to `n` bytes.
    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n).min(self.buf.len());
    }

    /// Consumes exactly `n` bytes, or nothing if fewer are available.
    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        let start = self.pos;
        self.pos += n;
        Some(&self.buf[start..self.pos])
    }

    /// Records the current position so a failed attempt can be undone.
    #[inline]
    pub fn checkpoint(&self) -> usize {
        self.pos
    }

    /// Restores a position previously returned by [`Cursor::checkpoint`].
    #[inline]
    pub fn rewind(&mut self, checkpoint: usize) {
        debug_assert!(checkpoint <= self.buf.len());
        self.pos = checkpoint;
    }
}

/// Reads a CRLF-terminated, optionally signed decimal integer.
///
/// On success the cursor is positioned just past the `\n`. When the buffer
/// ends before the terminator the cursor is rewound and `Incomplete` is
/// returned; the caller simply retries later.
///
/// Range checks (negative, too large) are left to the caller, since the
/// bounds differ between array counts and bulk lengths.
pub fn read_length(cursor: &mut Cursor<'_>) -> Result<Progress<i64>, FrameError> {
    let start = cursor.checkpoint();
    let mut negative = false;
    let mut digits = 0usize;
    let mut value: i64 = 0;
    let mut overflow = false;

    loop {
        let b = match cursor.next_byte() {
            Some(b) => b,
            None => {
                cursor.rewind(start);
                return Ok(Progress::need(2));
            }
        };

        match b {
            b'-' if digits == 0 && !negative => negative = true,
            b'0'..=b'9' => {
                digits += 1;
                if digits > MAX_LENGTH_DIGITS {
                    return Err(FrameError::InvalidLength(
                        "length line too long".to_string(),
                    ));
                }
                let d = i64::from(b - b'0');
                // Accumulate as a negative number so i64::MIN stays representable
                match value.checked_mul(10).and_then(|v| v.checked_sub(d)) {
                    Some(v) => value = v,
                    None => overflow = true,
                }
            }
            b'\r' => {
                let lf = match cursor.next_byte() {
                    Some(lf) => lf,
                    None => {
                        cursor.rewind(start);
                        return Ok(Progress::need(1));
                    }
                };
                if lf != b'\n' {
                    return Err(FrameError::MissingCrlf);
                }
                if digits == 0 {
                    return Err(FrameError::InvalidLength("empty length".to_string()));
                }
                if overflow {
                    return Err(FrameError::LengthOutOfRange {
                        kind: "declared",
                        length: if negative { i64::MIN } else { i64::MAX },
                        max: usize::MAX,
                    });
                }
                let value = if negative {
                    value
                } else {
                    value.checked_neg().ok_or(FrameError::LengthOutOfRange {
                        kind: "declared",
                        length: i64::MAX,
                        max: usize::MAX,
                    })?
                };
                return Ok(Progress::Complete(value));
            }
            other => {
                return Err(FrameError::InvalidLength(format!(
                    "unexpected byte {} in length",
                    describe_byte(&other)
                )));
            }
        }
    }
}

/// Reads exactly `len` payload bytes followed by CRLF.
///
/// Like [`read_length`], the cursor is left untouched when the buffer is too
/// short, and `needed` says exactly how many bytes are missing.
pub fn read_payload<'a>(
    cursor: &mut Cursor<'a>,
    len: usize,
) -> Result<Progress<&'a [u8]>, FrameError> {
    let total = len.saturating_add(CRLF.len());
    if cursor.remaining() < total {
        return Ok(Progress::need(total - cursor.remaining()));
    }

    let start = cursor.checkpoint();
    let data = cursor.take(len).ok_or(FrameError::MissingCrlf)?;
    match cursor.take(CRLF.len()) {
        Some(terminator) if terminator == CRLF => Ok(Progress::Complete(data)),
        _ => {
            cursor.rewind(start);
            Err(FrameError::MissingCrlf)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_length() {
        let mut cursor = Cursor::new(b"42\r\nrest");
        assert_eq!(read_length(&mut cursor).unwrap(), Progress::Complete(42));
        assert_eq!(cursor.rest(), b"rest");
    }

    #[test]
    fn test_read_negative_length() {
        let mut cursor = Cursor::new(b"-1\r\n");
        assert_eq!(read_length(&mut cursor).unwrap(), Progress::Complete(-1));
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_read_length_incomplete_rewinds() {
        for input in [&b""[..], b"1", b"12", b"12\r"] {
            let mut cursor = Cursor::new(input);
            let result = read_length(&mut cursor).unwrap();
            assert!(!result.is_complete(), "input {:?}", input);
            assert_eq!(cursor.position(), 0);
        }
    }

    #[test]
    fn test_read_length_rejects_garbage() {
        let mut cursor = Cursor::new(b"1x\r\n");
        assert!(matches!(
            read_length(&mut cursor),
            Err(FrameError::InvalidLength(_))
        ));

        let mut cursor = Cursor::new(b"\r\n");
        assert!(matches!(
            read_length(&mut cursor),
            Err(FrameError::InvalidLength(_))
        ));

        let mut cursor = Cursor::new(b"12\rX");
        assert_eq!(read_length(&mut cursor), Err(FrameError::MissingCrlf));
    }

    #[test]
    fn test_read_length_overflow() {
        let mut cursor = Cursor::new(b"99999999999999999999\r\n");
        assert!(matches!(
            read_length(&mut cursor),
            Err(FrameError::LengthOutOfRange { .. })
        ));

        let mut cursor = Cursor::new(b"9223372036854775807\r\n");
        assert_eq!(
            read_length(&mut cursor).unwrap(),
            Progress::Complete(i64::MAX)
        );
    }

    #[test]
    fn test_read_length_unbounded_line() {
        let mut cursor = Cursor::new(b"111111111111111111111111");
        assert!(matches!(
            read_length(&mut cursor),
            Err(FrameError::InvalidLength(_))
        ));
    }

    #[test]
    fn test_cursor_checkpoint_and_rewind() {
        let mut cursor = Cursor::new(b"*2\r\n");
        cursor.advance(1);
        let mark = cursor.checkpoint();
        assert_eq!(cursor.take(2), Some(&b"2\r"[..]));
        assert_eq!(cursor.take(5), None);
        cursor.rewind(mark);
        assert_eq!(cursor.peek(), Some(b'2'));

        cursor.advance(100);
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(cursor.next_byte(), None);
    }

    #[test]
    fn test_read_payload() {
        let mut cursor = Cursor::new(b"hel\r\nlo\r\n");
        assert_eq!(
            read_payload(&mut cursor, 7).unwrap(),
            Progress::Complete(&b"hel\r\nlo"[..])
        );
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_read_payload_incomplete() {
        let mut cursor = Cursor::new(b"hel");
        assert_eq!(
            read_payload(&mut cursor, 5).unwrap(),
            Progress::Incomplete { needed: 4 }
        );
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_read_payload_bad_terminator() {
        let mut cursor = Cursor::new(b"helloXY");
        assert_eq!(read_payload(&mut cursor, 5), Err(FrameError::MissingCrlf));
    }
}
