//! CLI command implementations.

pub mod compact;
pub mod inspect;
pub mod resolve;

use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by command argument handling.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The requested output format is not supported.
    #[error("unknown output format: {0} (expected text or json)")]
    UnknownFormat(String),

    /// The queue journal does not exist.
    #[error("no queue journal found at {}", .0.display())]
    QueueNotFound(PathBuf),

    /// A timestamp argument is not RFC 3339.
    #[error("invalid timestamp {value:?}: {source}")]
    InvalidTime {
        /// The rejected argument.
        value: String,
        /// Parser error.
        source: chrono::ParseError,
    },
}

/// Output format for listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl FromStr for OutputFormat {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(CommandError::UnknownFormat(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!(matches!(
            "yaml".parse::<OutputFormat>(),
            Err(CommandError::UnknownFormat(_))
        ));
    }
}
