//! Request grammar and execution.
//!
//! A request line is split on runs of whitespace. Keywords are case-sensitive
//! and there is no quoting:
//!
//! - `put <name> <value> <timestamp>`: store one sample
//! - `get <name>`: read one metric, or every metric with `*`

use thiserror::Error;

use crate::store::{MetricStore, Snapshot};

/// A parsed request.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Put {
        name: String,
        value: f64,
        timestamp: i64,
    },
    Get {
        name: String,
    },
}

/// Successful outcome of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A `put` was applied; the response carries no payload.
    Stored,
    /// Result of a `get`, possibly empty.
    Samples(Snapshot),
}

/// Reasons a request line is malformed.
///
/// Every variant is answered with the same wire error; the distinction only
/// shows up in logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty request")]
    Empty,
    #[error("unknown command '{0}'")]
    UnknownVerb(String),
    #[error("'{verb}' expects {expected} tokens, got {got}")]
    WrongArity {
        verb: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid value '{0}'")]
    InvalidValue(String),
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&verb) = parts.first() else {
            return Err(CommandError::Empty);
        };

        match (verb, parts.len()) {
            ("put", 4) => Ok(Command::Put {
                name: parts[1].to_string(),
                value: parse_value(parts[2])?,
                timestamp: parts[3]
                    .parse()
                    .map_err(|_| CommandError::InvalidTimestamp(parts[3].to_string()))?,
            }),
            ("get", 2) => Ok(Command::Get {
                name: parts[1].to_string(),
            }),
            ("put", got) => Err(CommandError::WrongArity {
                verb: "put",
                expected: 4,
                got,
            }),
            ("get", got) => Err(CommandError::WrongArity {
                verb: "get",
                expected: 2,
                got,
            }),
            (other, _) => Err(CommandError::UnknownVerb(other.to_string())),
        }
    }

    pub fn apply(self, store: &MetricStore) -> Reply {
        match self {
            Command::Put {
                name,
                value,
                timestamp,
            } => {
                store.put(&name, value, timestamp);
                Reply::Stored
            }
            Command::Get { name } => Reply::Samples(store.get(&name)),
        }
    }
}

/// Parses and applies one request line. Nothing is written unless the whole
/// line is valid.
pub fn execute(line: &str, store: &MetricStore) -> Result<Reply, CommandError> {
    Command::parse(line).map(|command| command.apply(store))
}

fn parse_value(token: &str) -> Result<f64, CommandError> {
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(CommandError::InvalidValue(token.to_string())),
    }
}
