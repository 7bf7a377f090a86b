//! Resumable Command Decoder
//!
//! This module turns the raw byte stream of one client connection into
//! [`Command`]s. TCP hands us the stream in arbitrary pieces, so a command can
//! be split anywhere: in the middle of a length line, inside a bulk payload,
//! or between the `\r` and `\n` of a terminator.
//!
//! ## How the Decoder Works
//!
//! The decoder is a small state machine that owns all partial-parse state:
//!
//! ```text
//!            '*' + count            all arguments read
//!   ┌──────┐ ───────────────> ┌─────────────────┐ ─────────────> emit array Command
//!   │ Idle │                  │ CollectingArray │
//!   └──────┘ <─────────────── └─────────────────┘
//!      │
//!      │ anything else
//!      ▼
//!   scan for '\n' (resumes at the last scanned offset) ──> emit inline Command
//! ```
//!
//! Bytes are only released from the connection buffer once a whole unit has
//! been read: the array header, one complete bulk argument, or one complete
//! inline line. A unit that is cut short is left untouched in the buffer and
//! parsed again from its first byte when more data arrives, which makes the
//! result independent of where the chunk boundaries fell.
//!
//! Completed arguments are carved out of the buffer with `split_to` and
//! frozen, so argument payloads share the connection buffer's allocation
//! instead of being copied.

use crate::protocol::command::Command;
use crate::protocol::primitives::{
    prefix, read_length, read_payload, Cursor, FrameError, Progress,
};
use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

/// Maximum number of elements in one command array (same as Redis)
pub const DEFAULT_MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const DEFAULT_MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Maximum length of an inline command line (64 KB, same as Redis)
pub const DEFAULT_MAX_INLINE_LEN: usize = 64 * 1024;

/// Upper bound on argument slots allocated up front for a declared array.
///
/// A client can declare a million arguments and then send none of them.
const MAX_PREALLOC_ARGS: usize = 1024;

/// Size limits enforced while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderLimits {
    /// Largest accepted `*<count>`
    pub max_array_len: usize,
    /// Largest accepted `$<length>`
    pub max_bulk_len: usize,
    /// Longest inline line, terminator excluded
    pub max_inline_len: usize,
}

impl Default for DecoderLimits {
    fn default() -> Self {
        Self {
            max_array_len: DEFAULT_MAX_ARRAY_LEN,
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
            max_inline_len: DEFAULT_MAX_INLINE_LEN,
        }
    }
}

#[derive(Debug)]
enum State {
    /// No command in progress.
    Idle,
    /// An array header was read; `arguments.len()` is the next index to fill.
    CollectingArray {
        declared: usize,
        arguments: Vec<Bytes>,
    },
}

/// Per-connection command decoder.
///
/// One instance lives exactly as long as its connection. Dropping it (or
/// calling [`CommandDecoder::reset`]) discards any half-decoded command.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use respframe::protocol::CommandDecoder;
///
/// let mut decoder = CommandDecoder::new();
/// let mut buffer = BytesMut::from(&b"*2\r\n$3\r\nGET"[..]);
/// assert!(decoder.decode(&mut buffer).unwrap().is_none());
///
/// buffer.extend_from_slice(b"\r\n$1\r\nk\r\n");
/// let command = decoder.decode(&mut buffer).unwrap().unwrap();
/// assert_eq!(command.arguments(), &["GET", "k"]);
/// ```
#[derive(Debug)]
pub struct CommandDecoder {
    state: State,
    /// Bytes of the current inline line already searched for a terminator
    inline_scanned: usize,
    /// Extra bytes the last incomplete attempt asked for
    needed: usize,
    limits: DecoderLimits,
    failed: bool,
}

impl Default for CommandDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandDecoder {
    /// Creates a decoder with the default limits.
    pub fn new() -> Self {
        Self::with_limits(DecoderLimits::default())
    }

    pub fn with_limits(limits: DecoderLimits) -> Self {
        Self {
            state: State::Idle,
            inline_scanned: 0,
            needed: 1,
            limits,
            failed: false,
        }
    }

    pub fn limits(&self) -> &DecoderLimits {
        &self.limits
    }

    /// Decodes every complete command currently in `buf`, in arrival order.
    ///
    /// Consumed bytes are removed from the front of `buf`; a trailing partial
    /// command stays in the decoder state and the buffer until more bytes
    /// arrive.
    pub fn feed(&mut self, buf: &mut BytesMut) -> Result<Vec<Command>, FrameError> {
        let mut commands = Vec::new();
        while let Some(command) = self.decode(buf)? {
            commands.push(command);
        }
        Ok(commands)
    }

    /// Attempts to decode one command from the front of `buf`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(command))` - A command was completed
    /// - `Ok(None)` - More bytes are needed (see [`CommandDecoder::bytes_needed`])
    /// - `Err(e)` - The stream is malformed; the connection should be closed
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Command>, FrameError> {
        if self.failed {
            return Err(FrameError::Poisoned);
        }

        match self.step(buf) {
            Ok(command) => Ok(command),
            Err(e) => {
                self.failed = true;
                self.state = State::Idle;
                self.inline_scanned = 0;
                Err(e)
            }
        }
    }

    /// Minimum number of additional bytes the last incomplete attempt needed.
    pub fn bytes_needed(&self) -> usize {
        self.needed
    }

    /// True when no command is partially decoded.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle) && self.inline_scanned == 0
    }

    /// `(collected, declared)` for an array command in progress.
    pub fn pending_arguments(&self) -> Option<(usize, usize)> {
        match &self.state {
            State::Idle => None,
            State::CollectingArray {
                declared,
                arguments,
            } => Some((arguments.len(), *declared)),
        }
    }

    /// Discards all partial state, including a previous failure.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.inline_scanned = 0;
        self.needed = 1;
        self.failed = false;
    }

    fn step(&mut self, buf: &mut BytesMut) -> Result<Option<Command>, FrameError> {
        if let State::Idle = self.state {
            let Some(&first) = buf.first() else {
                self.needed = 1;
                return Ok(None);
            };

            if first != prefix::ARRAY {
                return self.decode_inline(buf);
            }

            let mut cursor = Cursor::new(&buf[..]);
            cursor.advance(1);
            let count = match read_length(&mut cursor)? {
                Progress::Complete(count) => count,
                Progress::Incomplete { needed } => {
                    self.needed = needed;
                    return Ok(None);
                }
            };
            let declared = check_length("array", count, self.limits.max_array_len)?;
            let header_len = cursor.position();
            buf.advance(header_len);

            trace!(declared, "Read array header");

            if declared == 0 {
                return Ok(Some(Command::array(Vec::new())));
            }

            self.state = State::CollectingArray {
                declared,
                arguments: Vec::with_capacity(declared.min(MAX_PREALLOC_ARGS)),
            };
        }

        self.collect_arguments(buf)
    }

    /// Reads the remaining bulk arguments of the current array, one at a time.
    fn collect_arguments(&mut self, buf: &mut BytesMut) -> Result<Option<Command>, FrameError> {
        let State::CollectingArray {
            declared,
            arguments,
        } = &mut self.state
        else {
            return Ok(None);
        };

        while arguments.len() < *declared {
            let mut cursor = Cursor::new(&buf[..]);
            match cursor.next_byte() {
                Some(prefix::BULK_STRING) => {}
                Some(found) => {
                    return Err(FrameError::UnexpectedByte {
                        expected: char::from(prefix::BULK_STRING),
                        found,
                    });
                }
                None => {
                    self.needed = 1;
                    return Ok(None);
                }
            }

            let len = match read_length(&mut cursor)? {
                Progress::Complete(len) => check_length("bulk", len, self.limits.max_bulk_len)?,
                Progress::Incomplete { needed } => {
                    self.needed = needed;
                    return Ok(None);
                }
            };
            let header_len = cursor.position();

            if let Progress::Incomplete { needed } = read_payload(&mut cursor, len)? {
                self.needed = needed;
                trace!(
                    index = arguments.len(),
                    len,
                    needed,
                    "Bulk argument incomplete"
                );
                return Ok(None);
            }
            let unit_len = cursor.position();

            let mut unit = buf.split_to(unit_len);
            unit.advance(header_len);
            unit.truncate(len);
            arguments.push(unit.freeze());
        }

        let arguments = std::mem::take(arguments);
        self.state = State::Idle;
        self.needed = 1;
        Ok(Some(Command::array(arguments)))
    }

    /// Reads one inline command line.
    ///
    /// The terminator is `\n`; a `\r` right before it is dropped. The scan
    /// resumes where the previous call stopped, so a long line arriving in
    /// small pieces is searched only once.
    fn decode_inline(&mut self, buf: &mut BytesMut) -> Result<Option<Command>, FrameError> {
        let max = self.limits.max_inline_len;
        let start = self.inline_scanned.min(buf.len());

        let newline = match buf[start..].iter().position(|&b| b == b'\n') {
            Some(offset) => start + offset,
            None => {
                self.inline_scanned = buf.len();
                if buf.len() > max {
                    return Err(FrameError::InlineTooLong { max });
                }
                self.needed = 1;
                return Ok(None);
            }
        };
        self.inline_scanned = 0;

        let mut line = buf.split_to(newline + 1).freeze();
        line.truncate(newline);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        if line.len() > max {
            return Err(FrameError::InlineTooLong { max });
        }

        self.needed = 1;
        Ok(Some(Command::inline(split_inline(line))))
    }
}

/// Validates a declared length against `0..=max`.
fn check_length(kind: &'static str, length: i64, max: usize) -> Result<usize, FrameError> {
    match usize::try_from(length) {
        Ok(n) if n <= max => Ok(n),
        _ => Err(FrameError::LengthOutOfRange { kind, length, max }),
    }
}

fn is_inline_space(b: &u8) -> bool {
    *b == b' ' || *b == b'\t'
}

/// Splits an inline line into the command name and at most one payload.
///
/// Leading blanks are skipped, the name runs up to the next blank, and the
/// rest of the line after the separating blanks is kept verbatim as a single
/// argument. An empty line yields a single empty name.
fn split_inline(line: Bytes) -> Vec<Bytes> {
    let name_start = line
        .iter()
        .position(|b| !is_inline_space(b))
        .unwrap_or(line.len());
    let name_end = line[name_start..]
        .iter()
        .position(is_inline_space)
        .map_or(line.len(), |p| name_start + p);

    let name = line.slice(name_start..name_end);
    match line[name_end..].iter().position(|b| !is_inline_space(b)) {
        Some(p) => vec![name, line.slice(name_end + p..)],
        None => vec![name],
    }
}
