//! Server Configuration
//!
//! Command-line parsing for the server binary. Parsing never exits the
//! process itself; it returns a [`ConfigAction`] and leaves printing and
//! exit codes to `main`.

use crate::protocol::DecoderLimits;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing command-line arguments.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// What the binary should do after parsing its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    Run(ServerConfig),
    Help,
    Version,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Default log filter when `RUST_LOG` is not set
    pub log_level: String,
    /// Framing limits applied to every connection
    pub limits: DecoderLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_level: "info".to_string(),
            limits: DecoderLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Parses configuration from command-line arguments (program name excluded).
    pub fn from_args<I>(args: I) -> Result<ConfigAction, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = ServerConfig::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => config.host = value_for(&arg, args.next())?,
                "--port" | "-p" => config.port = parse_value(&arg, args.next())?,
                "--log-level" => config.log_level = value_for(&arg, args.next())?,
                "--max-bulk-len" => config.limits.max_bulk_len = parse_value(&arg, args.next())?,
                "--max-array-len" => config.limits.max_array_len = parse_value(&arg, args.next())?,
                "--max-inline-len" => {
                    config.limits.max_inline_len = parse_value(&arg, args.next())?
                }
                "--help" => return Ok(ConfigAction::Help),
                "--version" | "-v" => return Ok(ConfigAction::Version),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(ConfigAction::Run(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn value_for(flag: &str, value: Option<String>) -> Result<String, ConfigError> {
    value.ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}

fn parse_value<T: FromStr>(flag: &str, value: Option<String>) -> Result<T, ConfigError> {
    let value = value_for(flag, value)?;
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value,
    })
}

/// Usage text for `--help`.
pub fn help_text() -> &'static str {
    r#"
respframe - RESP command framing and dispatch server

USAGE:
    respframe [OPTIONS]

OPTIONS:
    -h, --host <HOST>           Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>           Port to listen on (default: 6379)
        --log-level <LEVEL>     Log filter when RUST_LOG is unset (default: info)
        --max-bulk-len <N>      Largest accepted bulk argument in bytes (default: 536870912)
        --max-array-len <N>     Largest accepted argument count (default: 1048576)
        --max-inline-len <N>    Longest accepted inline command line (default: 65536)
    -v, --version               Print version information
        --help                  Print this help message

CONNECTING:
    Use redis-cli, or type inline commands over telnet/nc:
    $ redis-cli -p 6379 PING
    PONG
    $ printf 'ECHO hello world\r\n' | nc 127.0.0.1 6379
    +hello world
"#
}
