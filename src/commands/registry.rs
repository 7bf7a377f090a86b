//! Command Registry
//!
//! The registry maps lower-cased command names to a [`CommandSpec`]: the
//! argument shape the handler expects and the handler itself. It is built
//! once with [`RegistryBuilder`] and never changes afterwards, so one
//! `Arc<CommandRegistry>` can be shared by every connection without locking.
//!
//! ## Argument Coercion
//!
//! Raw arguments arrive as byte strings. Before a handler runs, each one is
//! converted to the [`ArgKind`] declared for its position:
//!
//! | Kind      | Accepts                         | Error reply                                    |
//! |-----------|---------------------------------|------------------------------------------------|
//! | `Bytes`   | anything                        | -                                              |
//! | `Utf8`    | valid UTF-8                     | `ERR invalid UTF-8 argument`                   |
//! | `Integer` | a decimal `i64`                 | `ERR value is not an integer or out of range`  |
//! | `Float`   | a decimal `f64` other than NaN  | `ERR value is not a valid float`               |
//!
//! ## Example
//!
//! ```
//! use respframe::commands::{ArgKind, ArgShape, CommandRegistry};
//! use respframe::protocol::Reply;
//!
//! let registry = CommandRegistry::builder()
//!     .register("ECHO", ArgShape::exact(&[ArgKind::Bytes]), |args| {
//!         Ok(Some(Reply::bulk(args.bytes(0)?.clone())))
//!     })
//!     .build();
//!
//! assert!(registry.lookup(b"echo").is_some());
//! ```

use crate::protocol::Reply;
use anyhow::anyhow;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors a command can fail with. All of them become `-ERR ...` replies.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Argument count outside what the command's shape allows
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(String),

    /// An argument could not be converted to the declared kind
    #[error("{0}")]
    Coercion(String),

    /// A business rule violation reported by the handler
    #[error("{0}")]
    Domain(String),

    /// Anything the handler did not anticipate; indicates a bug
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CommandError {
    /// Shorthand for a handler-signalled domain error.
    pub fn domain(message: impl Into<String>) -> Self {
        CommandError::Domain(message.into())
    }

    /// True for faults that should be logged as bugs rather than user errors.
    pub fn is_unexpected(&self) -> bool {
        matches!(self, CommandError::Internal(_))
    }
}

/// The closed set of conversions applied to raw arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Bytes,
    Utf8,
    Integer,
    Float,
}

impl ArgKind {
    fn coerce(self, raw: &Bytes) -> Result<Arg, CommandError> {
        match self {
            ArgKind::Bytes => Ok(Arg::Bytes(raw.clone())),
            ArgKind::Utf8 => std::str::from_utf8(raw)
                .map(|s| Arg::Str(s.to_string()))
                .map_err(|_| CommandError::Coercion("invalid UTF-8 argument".to_string())),
            ArgKind::Integer => std::str::from_utf8(raw)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .map(Arg::Int)
                .ok_or_else(|| {
                    CommandError::Coercion("value is not an integer or out of range".to_string())
                }),
            ArgKind::Float => std::str::from_utf8(raw)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|f| !f.is_nan())
                .map(Arg::Float)
                .ok_or_else(|| CommandError::Coercion("value is not a valid float".to_string())),
        }
    }
}

/// One coerced argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Bytes(Bytes),
    Str(String),
    Int(i64),
    Float(f64),
}

impl Arg {
    fn kind(&self) -> ArgKind {
        match self {
            Arg::Bytes(_) => ArgKind::Bytes,
            Arg::Str(_) => ArgKind::Utf8,
            Arg::Int(_) => ArgKind::Integer,
            Arg::Float(_) => ArgKind::Float,
        }
    }
}

/// The argument layout a handler declares: required positions, then optional
/// positions, then an optional variadic tail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgShape {
    required: Vec<ArgKind>,
    optional: Vec<ArgKind>,
    rest: Option<ArgKind>,
}

impl ArgShape {
    /// A command that takes no arguments.
    pub fn none() -> Self {
        Self::default()
    }

    /// A command with exactly these positional arguments.
    pub fn exact(kinds: &[ArgKind]) -> Self {
        Self {
            required: kinds.to_vec(),
            ..Self::default()
        }
    }

    /// Appends an optional trailing position.
    pub fn optional(mut self, kind: ArgKind) -> Self {
        self.optional.push(kind);
        self
    }

    /// Accepts any number of further arguments of `kind`.
    pub fn rest(mut self, kind: ArgKind) -> Self {
        self.rest = Some(kind);
        self
    }

    pub fn min_args(&self) -> usize {
        self.required.len()
    }

    /// `None` when the shape has a variadic tail.
    pub fn max_args(&self) -> Option<usize> {
        match self.rest {
            Some(_) => None,
            None => Some(self.required.len() + self.optional.len()),
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args() && self.max_args().map_or(true, |max| count <= max)
    }

    fn kind_at(&self, index: usize) -> ArgKind {
        let optional_end = self.required.len() + self.optional.len();
        if index < self.required.len() {
            self.required[index]
        } else if index < optional_end {
            self.optional[index - self.required.len()]
        } else {
            self.rest.unwrap_or(ArgKind::Bytes)
        }
    }

    /// Converts raw arguments (command name excluded) to this shape.
    pub fn coerce(&self, command: &str, raw: &[Bytes]) -> Result<Args, CommandError> {
        if !self.accepts(raw.len()) {
            return Err(CommandError::WrongArity(command.to_string()));
        }

        let values = raw
            .iter()
            .enumerate()
            .map(|(i, b)| self.kind_at(i).coerce(b))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Args {
            command: command.to_string(),
            values,
        })
    }
}

/// Coerced arguments handed to a handler.
///
/// The typed accessors fail with [`CommandError::Internal`] when a handler
/// asks for a kind its own shape does not declare, since that is a bug in
/// the handler and not something the client did.
#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    command: String,
    values: Vec<Arg>,
}

impl Args {
    /// The lower-cased name of the command being executed.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.values.get(index)
    }

    /// Arguments from `from` to the end (the variadic tail, usually).
    pub fn rest(&self, from: usize) -> &[Arg] {
        self.values.get(from..).unwrap_or(&[])
    }

    pub fn bytes(&self, index: usize) -> Result<&Bytes, CommandError> {
        match self.slot(index, ArgKind::Bytes)? {
            Arg::Bytes(b) => Ok(b),
            other => Err(self.mismatch(index, ArgKind::Bytes, other)),
        }
    }

    /// Like [`Args::bytes`], but `Ok(None)` for an absent optional position.
    pub fn opt_bytes(&self, index: usize) -> Result<Option<&Bytes>, CommandError> {
        if index >= self.values.len() {
            return Ok(None);
        }
        self.bytes(index).map(Some)
    }

    pub fn str(&self, index: usize) -> Result<&str, CommandError> {
        match self.slot(index, ArgKind::Utf8)? {
            Arg::Str(s) => Ok(s),
            other => Err(self.mismatch(index, ArgKind::Utf8, other)),
        }
    }

    pub fn int(&self, index: usize) -> Result<i64, CommandError> {
        match self.slot(index, ArgKind::Integer)? {
            Arg::Int(n) => Ok(*n),
            other => Err(self.mismatch(index, ArgKind::Integer, other)),
        }
    }

    pub fn float(&self, index: usize) -> Result<f64, CommandError> {
        match self.slot(index, ArgKind::Float)? {
            Arg::Float(f) => Ok(*f),
            other => Err(self.mismatch(index, ArgKind::Float, other)),
        }
    }

    fn slot(&self, index: usize, kind: ArgKind) -> Result<&Arg, CommandError> {
        self.values.get(index).ok_or_else(|| {
            CommandError::Internal(anyhow!(
                "'{}' handler read missing argument {} as {:?}",
                self.command,
                index,
                kind
            ))
        })
    }

    fn mismatch(&self, index: usize, wanted: ArgKind, found: &Arg) -> CommandError {
        CommandError::Internal(anyhow!(
            "'{}' handler read argument {} as {:?}, but it was coerced to {:?}",
            self.command,
            index,
            wanted,
            found.kind()
        ))
    }
}

/// What a handler returns: a reply, "no value" (`None`), or an error.
pub type HandlerResult = Result<Option<Reply>, CommandError>;

/// A registered command implementation.
pub type Handler = Arc<dyn Fn(&Args) -> HandlerResult + Send + Sync>;

/// Registry entry for one command.
#[derive(Clone)]
pub struct CommandSpec {
    /// Lower-cased command name
    pub name: String,
    /// Expected argument layout
    pub shape: ArgShape,
    /// Handler callback
    pub handler: Handler,
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// Immutable name → handler table.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    entries: HashMap<Vec<u8>, CommandSpec>,
}

impl CommandRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Looks a command up by its already lower-cased name.
    pub fn lookup(&self, name: &[u8]) -> Option<&CommandSpec> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.values().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Collects command registrations before freezing them into a registry.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<Vec<u8>, CommandSpec>,
}

impl RegistryBuilder {
    /// Registers `handler` under `name` (case-insensitive).
    ///
    /// Registering the same name twice keeps the later handler.
    pub fn register<F>(mut self, name: &str, shape: ArgShape, handler: F) -> Self
    where
        F: Fn(&Args) -> HandlerResult + Send + Sync + 'static,
    {
        let name = name.to_ascii_lowercase();
        let spec = CommandSpec {
            name: name.clone(),
            shape,
            handler: Arc::new(handler),
        };
        if self.entries.insert(name.clone().into_bytes(), spec).is_some() {
            warn!(command = %name, "Command registered twice, keeping the later handler");
        }
        self
    }

    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(args: &[&str]) -> Vec<Bytes> {
        args.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    #[test]
    fn test_shape_arity() {
        let shape = ArgShape::exact(&[ArgKind::Bytes]).optional(ArgKind::Integer);
        assert!(!shape.accepts(0));
        assert!(shape.accepts(1));
        assert!(shape.accepts(2));
        assert!(!shape.accepts(3));
        assert_eq!(shape.max_args(), Some(2));

        let variadic = ArgShape::exact(&[ArgKind::Bytes]).rest(ArgKind::Bytes);
        assert!(variadic.accepts(100));
        assert_eq!(variadic.max_args(), None);

        assert!(ArgShape::none().accepts(0));
        assert!(!ArgShape::none().accepts(1));
    }

    #[test]
    fn test_coerce_kinds() {
        let shape = ArgShape::exact(&[
            ArgKind::Bytes,
            ArgKind::Utf8,
            ArgKind::Integer,
            ArgKind::Float,
        ]);
        let args = shape
            .coerce("mixed", &raw(&["k", "text", "-42", "2.5"]))
            .unwrap();
        assert_eq!(args.bytes(0).unwrap(), &Bytes::from("k"));
        assert_eq!(args.str(1).unwrap(), "text");
        assert_eq!(args.int(2).unwrap(), -42);
        assert_eq!(args.float(3).unwrap(), 2.5);
        assert_eq!(args.command(), "mixed");
    }

    #[test]
    fn test_wrong_arity() {
        let shape = ArgShape::exact(&[ArgKind::Bytes, ArgKind::Bytes]);
        let err = shape.coerce("set", &raw(&["k"])).unwrap_err();
        assert!(matches!(err, CommandError::WrongArity(_)));
        assert_eq!(err.to_string(), "wrong number of arguments for 'set' command");
    }

    #[test]
    fn test_coercion_failures() {
        let shape = ArgShape::exact(&[ArgKind::Integer]);
        let err = shape.coerce("incrby", &raw(&["abc"])).unwrap_err();
        assert_eq!(err.to_string(), "value is not an integer or out of range");

        let err = shape
            .coerce("incrby", &raw(&["99999999999999999999"]))
            .unwrap_err();
        assert!(matches!(err, CommandError::Coercion(_)));

        let shape = ArgShape::exact(&[ArgKind::Float]);
        let err = shape.coerce("f", &raw(&["nan"])).unwrap_err();
        assert_eq!(err.to_string(), "value is not a valid float");

        let shape = ArgShape::exact(&[ArgKind::Utf8]);
        let err = shape
            .coerce("s", &[Bytes::from(&b"\xff\xfe"[..])])
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid UTF-8 argument");
    }

    #[test]
    fn test_rest_and_optional() {
        let shape = ArgShape::exact(&[ArgKind::Bytes]).rest(ArgKind::Integer);
        let args = shape.coerce("sum", &raw(&["k", "1", "2", "3"])).unwrap();
        assert_eq!(args.rest(1).len(), 3);
        assert_eq!(args.rest(1)[2], Arg::Int(3));

        let shape = ArgShape::none().optional(ArgKind::Bytes);
        let args = shape.coerce("ping", &[]).unwrap();
        assert_eq!(args.opt_bytes(0).unwrap(), None);
    }

    #[test]
    fn test_accessor_mismatch_is_internal() {
        let shape = ArgShape::exact(&[ArgKind::Bytes]);
        let args = shape.coerce("get", &raw(&["k"])).unwrap();
        assert!(args.int(0).unwrap_err().is_unexpected());
        assert!(args.bytes(1).unwrap_err().is_unexpected());
    }

    #[test]
    fn test_registry_is_case_insensitive() {
        let registry = CommandRegistry::builder()
            .register("PING", ArgShape::none(), |_| Ok(Some(Reply::pong())))
            .register("Echo", ArgShape::exact(&[ArgKind::Bytes]), |args| {
                Ok(Some(Reply::bulk(args.bytes(0)?.clone())))
            })
            .build();

        assert_eq!(registry.len(), 2);
        assert!(registry.lookup(b"ping").is_some());
        assert!(registry.lookup(b"echo").is_some());
        assert!(registry.lookup(b"PING").is_none());
        assert_eq!(registry.names(), vec!["echo", "ping"]);
    }

    #[test]
    fn test_duplicate_registration_keeps_later() {
        let registry = CommandRegistry::builder()
            .register("ping", ArgShape::none(), |_| Ok(Some(Reply::pong())))
            .register("PING", ArgShape::none(), |_| Ok(Some(Reply::ok())))
            .build();

        let spec = registry.lookup(b"ping").unwrap();
        let args = spec.shape.coerce("ping", &[]).unwrap();
        assert_eq!((spec.handler)(&args).unwrap(), Some(Reply::ok()));
    }
}
