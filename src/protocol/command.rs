//! Decoded Client Commands
//!
//! A [`Command`] is the unit handed from the frame decoder to the dispatcher:
//! an ordered list of binary-safe arguments, the first of which names the
//! command, plus a flag recording whether it arrived as a multi-bulk array or
//! as a legacy inline line. The flag matters on the way back out, because
//! inline requests get inline replies.

use bytes::Bytes;
use std::fmt;

/// One fully decoded client request.
///
/// Commands are only ever built by the decoder and are immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    arguments: Vec<Bytes>,
    inline: bool,
}

impl Command {
    /// A command decoded from a `*<n>\r\n` multi-bulk array.
    pub fn array(arguments: Vec<Bytes>) -> Self {
        Self {
            arguments,
            inline: false,
        }
    }

    /// A command decoded from a single inline line.
    pub fn inline(arguments: Vec<Bytes>) -> Self {
        Self {
            arguments,
            inline: true,
        }
    }

    /// The command name (first argument), if there is one.
    ///
    /// Only `*0\r\n` produces a command without a name.
    pub fn name(&self) -> Option<&Bytes> {
        self.arguments.first()
    }

    /// Everything after the command name.
    pub fn args(&self) -> &[Bytes] {
        self.arguments.get(1..).unwrap_or(&[])
    }

    /// All arguments including the name.
    pub fn arguments(&self) -> &[Bytes] {
        &self.arguments
    }

    pub fn into_arguments(self) -> Vec<Bytes> {
        self.arguments
    }

    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    /// True when the command came from the legacy line-based form.
    pub fn is_inline(&self) -> bool {
        self.inline
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "\"{}\"", arg.escape_ascii())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_args() {
        let cmd = Command::array(vec![Bytes::from("GET"), Bytes::from("key")]);
        assert_eq!(cmd.name(), Some(&Bytes::from("GET")));
        assert_eq!(cmd.args(), &[Bytes::from("key")]);
        assert!(!cmd.is_inline());
        assert_eq!(cmd.len(), 2);
    }

    #[test]
    fn test_empty_command() {
        let cmd = Command::array(Vec::new());
        assert!(cmd.is_empty());
        assert_eq!(cmd.name(), None);
        assert!(cmd.args().is_empty());
    }

    #[test]
    fn test_display_escapes_binary() {
        let cmd = Command::inline(vec![Bytes::from("SET"), Bytes::from(&b"a\x00\n"[..])]);
        assert_eq!(cmd.to_string(), r#""SET" "a\x00\n""#);
    }
}
