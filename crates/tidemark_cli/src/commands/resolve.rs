//! Resolve command implementation.

use super::CommandError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tidemark_engine::{ConflictResolver, ConflictStrategy};
use tidemark_protocol::{Conflict, Resolution};

/// Arguments of the resolve command.
#[derive(Debug)]
pub struct ResolveRequest {
    /// Entity key reported in the resolution.
    pub key: String,
    /// Strategy to apply.
    pub strategy: ConflictStrategy,
    /// File holding the local version.
    pub local: PathBuf,
    /// File holding the server version.
    pub server: PathBuf,
    /// Local write time; defaults to the file's modification time.
    pub local_time: Option<String>,
    /// Server write time; defaults to the file's modification time.
    pub server_time: Option<String>,
}

/// Printed result of a resolution.
#[derive(Debug, Serialize)]
pub struct ResolveOutput {
    /// Entity key.
    pub key: String,
    /// Strategy applied.
    pub strategy: ConflictStrategy,
    /// Winning side.
    pub source: String,
    /// Resolved document, as JSON when it parses, otherwise as text.
    pub data: serde_json::Value,
}

/// Runs the resolve command.
pub fn run(request: &ResolveRequest) -> Result<(), Box<dyn std::error::Error>> {
    let conflict = load_conflict(request)?;
    let resolution = ConflictResolver::new(request.strategy).resolve(&conflict);
    tracing::debug!(key = %resolution.key, source = %resolution.source, "conflict resolved");

    let output = render(request.strategy, resolution);
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Reads both versions and their write times into a [`Conflict`].
pub fn load_conflict(request: &ResolveRequest) -> Result<Conflict, Box<dyn std::error::Error>> {
    let local_data = fs::read(&request.local)?;
    let server_data = fs::read(&request.server)?;
    let local_time = write_time(&request.local, request.local_time.as_deref())?;
    let server_time = write_time(&request.server, request.server_time.as_deref())?;

    Ok(Conflict::new(
        request.key.clone(),
        local_data,
        local_time,
        server_data,
        server_time,
    ))
}

/// Converts a resolution into printable form.
pub fn render(strategy: ConflictStrategy, resolution: Resolution) -> ResolveOutput {
    let data = serde_json::from_slice(&resolution.data).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(&resolution.data).into_owned())
    });
    ResolveOutput {
        key: resolution.key,
        strategy,
        source: resolution.source.to_string(),
        data,
    }
}

fn write_time(path: &Path, explicit: Option<&str>) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    match explicit {
        Some(value) => {
            let time = DateTime::parse_from_rfc3339(value).map_err(|source| {
                CommandError::InvalidTime {
                    value: value.to_string(),
                    source,
                }
            })?;
            Ok(time.with_timezone(&Utc))
        }
        None => Ok(DateTime::<Utc>::from(fs::metadata(path)?.modified()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_protocol::ResolutionSource;

    fn request(dir: &Path, strategy: ConflictStrategy, local: &str, server: &str) -> ResolveRequest {
        let local_path = dir.join("local.json");
        let server_path = dir.join("server.json");
        fs::write(&local_path, local).unwrap();
        fs::write(&server_path, server).unwrap();
        ResolveRequest {
            key: "reading-1".into(),
            strategy,
            local: local_path,
            server: server_path,
            local_time: Some("2024-03-01T12:00:00Z".into()),
            server_time: Some("2024-03-01T12:00:00Z".into()),
        }
    }

    #[test]
    fn merge_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let request = request(dir.path(), ConflictStrategy::Merge, r#"{"a":1}"#, r#"{"a":2,"b":3}"#);

        let conflict = load_conflict(&request).unwrap();
        let resolution = ConflictResolver::new(request.strategy).resolve(&conflict);
        assert_eq!(resolution.source, ResolutionSource::Merged);

        let output = render(request.strategy, resolution);
        assert_eq!(output.data, serde_json::json!({"a": 1, "b": 3}));
        assert_eq!(output.source, "merged");
    }

    #[test]
    fn equal_times_favour_server() {
        let dir = tempfile::tempdir().unwrap();
        let request = request(dir.path(), ConflictStrategy::LastWrite, "1", "2");
        run(&request).unwrap();

        let conflict = load_conflict(&request).unwrap();
        let resolution = ConflictResolver::new(request.strategy).resolve(&conflict);
        assert_eq!(resolution.source, ResolutionSource::Server);
    }

    #[test]
    fn non_json_data_is_rendered_as_text() {
        let resolution = Resolution::merged("k", b"plain text".to_vec());
        let output = render(ConflictStrategy::Merge, resolution);
        assert_eq!(output.data, serde_json::Value::String("plain text".into()));
    }

    #[test]
    fn rejects_bad_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = request(dir.path(), ConflictStrategy::LastWrite, "1", "2");
        request.local_time = Some("yesterday".into());
        let err = load_conflict(&request).unwrap_err();
        assert!(err.to_string().contains("invalid timestamp"));
    }
}
