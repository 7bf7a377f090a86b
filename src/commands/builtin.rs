//! Built-in Commands
//!
//! A small command set that makes the server usable out of the box and
//! exercises every part of the registry: optional and variadic arguments,
//! integer coercion, domain errors and the `QUIT` sentinel.
//!
//! ### Connection Commands
//! - `PING [message]` - Test connection
//! - `ECHO message` - Echo message
//! - `QUIT` - Close the connection
//!
//! ### Server Commands
//! - `TIME` - Server time
//! - `COMMAND` - List commands
//!
//! ### Key Commands
//! - `GET key` - Get a key's value
//! - `SET key value` - Set a key
//! - `DEL key [key ...]` - Delete keys
//! - `INCR key` / `INCRBY key increment` - Increment an integer value
//! - `STRLEN key` - Get string length

use crate::commands::registry::{
    Arg, ArgKind, ArgShape, Args, CommandError, CommandRegistry, HandlerResult,
};
use crate::protocol::Reply;
use anyhow::anyhow;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Names of every built-in command, as listed by `COMMAND`.
pub const COMMAND_NAMES: &[&str] = &[
    "command", "del", "echo", "get", "incr", "incrby", "ping", "quit", "set", "strlen", "time",
];

const NOT_AN_INTEGER: &str = "value is not an integer or out of range";

/// A minimal string keyspace backing the key commands.
#[derive(Debug, Default)]
pub struct Keyspace {
    data: RwLock<HashMap<Bytes, Bytes>>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Bytes) -> Result<Option<Bytes>, CommandError> {
        Ok(self.read()?.get(key).cloned())
    }

    pub fn set(&self, key: Bytes, value: Bytes) -> Result<(), CommandError> {
        self.write()?.insert(key, value);
        Ok(())
    }

    /// Removes the given keys and returns how many existed.
    pub fn del<'a>(&self, keys: impl IntoIterator<Item = &'a Bytes>) -> Result<i64, CommandError> {
        let mut data = self.write()?;
        Ok(keys
            .into_iter()
            .filter(|key| data.remove(*key).is_some())
            .count() as i64)
    }

    /// Adds `delta` to the integer stored at `key` (missing keys count as 0).
    pub fn incr_by(&self, key: &Bytes, delta: i64) -> Result<i64, CommandError> {
        let mut data = self.write()?;

        let current = match data.get(key) {
            Some(value) => std::str::from_utf8(value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| CommandError::domain(NOT_AN_INTEGER))?,
            None => 0,
        };

        let updated = current
            .checked_add(delta)
            .ok_or_else(|| CommandError::domain("increment or decrement would overflow"))?;
        data.insert(key.clone(), Bytes::from(updated.to_string()));
        Ok(updated)
    }

    pub fn len(&self) -> Result<usize, CommandError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, CommandError> {
        Ok(self.len()? == 0)
    }

    // A poisoned lock means a handler panicked mid-update
    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Bytes, Bytes>>, CommandError> {
        self.data
            .read()
            .map_err(|_| CommandError::Internal(anyhow!("keyspace lock poisoned")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Bytes, Bytes>>, CommandError> {
        self.data
            .write()
            .map_err(|_| CommandError::Internal(anyhow!("keyspace lock poisoned")))
    }
}

/// Builds the registry of built-in commands over `keyspace`.
pub fn registry(keyspace: Arc<Keyspace>) -> CommandRegistry {
    let get = Arc::clone(&keyspace);
    let set = Arc::clone(&keyspace);
    let del = Arc::clone(&keyspace);
    let incr = Arc::clone(&keyspace);
    let incrby = Arc::clone(&keyspace);
    let strlen = keyspace;

    CommandRegistry::builder()
        .register("ping", ArgShape::none().optional(ArgKind::Bytes), cmd_ping)
        .register("echo", ArgShape::exact(&[ArgKind::Bytes]), cmd_echo)
        .register("quit", ArgShape::none(), |_| Ok(Some(Reply::Quit)))
        .register("time", ArgShape::none(), cmd_time)
        .register("command", ArgShape::none().rest(ArgKind::Bytes), cmd_command)
        .register("get", ArgShape::exact(&[ArgKind::Bytes]), move |args| {
            Ok(Some(Reply::Bulk(get.get(args.bytes(0)?)?)))
        })
        .register(
            "set",
            ArgShape::exact(&[ArgKind::Bytes, ArgKind::Bytes]),
            move |args| {
                set.set(args.bytes(0)?.clone(), args.bytes(1)?.clone())?;
                Ok(Some(Reply::ok()))
            },
        )
        .register(
            "del",
            ArgShape::exact(&[ArgKind::Bytes]).rest(ArgKind::Bytes),
            move |args| {
                let keys = args
                    .rest(0)
                    .iter()
                    .map(|arg| match arg {
                        Arg::Bytes(key) => Ok(key),
                        _ => Err(CommandError::Internal(anyhow!("DEL key was not coerced to bytes"))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(Reply::integer(del.del(keys)?)))
            },
        )
        .register("incr", ArgShape::exact(&[ArgKind::Bytes]), move |args| {
            Ok(Some(Reply::integer(incr.incr_by(args.bytes(0)?, 1)?)))
        })
        .register(
            "incrby",
            ArgShape::exact(&[ArgKind::Bytes, ArgKind::Integer]),
            move |args| {
                Ok(Some(Reply::integer(
                    incrby.incr_by(args.bytes(0)?, args.int(1)?)?,
                )))
            },
        )
        .register("strlen", ArgShape::exact(&[ArgKind::Bytes]), move |args| {
            let len = strlen.get(args.bytes(0)?)?.map_or(0, |v| v.len());
            Ok(Some(Reply::integer(len as i64)))
        })
        .build()
}

/// PING [message]
fn cmd_ping(args: &Args) -> HandlerResult {
    Ok(Some(match args.opt_bytes(0)? {
        Some(message) => Reply::bulk(message.clone()),
        None => Reply::pong(),
    }))
}

/// ECHO message
fn cmd_echo(args: &Args) -> HandlerResult {
    Ok(Some(Reply::bulk(args.bytes(0)?.clone())))
}

/// TIME
fn cmd_time(_args: &Args) -> HandlerResult {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);

    Ok(Some(Reply::array(vec![
        Reply::bulk(now.as_secs().to_string()),
        Reply::bulk(now.subsec_micros().to_string()),
    ])))
}

/// COMMAND
fn cmd_command(_args: &Args) -> HandlerResult {
    Ok(Some(Reply::array(
        COMMAND_NAMES.iter().map(|name| Reply::bulk(*name)).collect(),
    )))
}
