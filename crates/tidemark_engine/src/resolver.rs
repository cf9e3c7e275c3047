//! Conflict resolution strategies.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tidemark_protocol::{Conflict, Resolution};

/// Policy for choosing between divergent local and server versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// The server version always wins.
    #[default]
    ServerWins,
    /// The local version always wins.
    ClientWins,
    /// The strictly newer version wins; ties go to the server.
    LastWrite,
    /// Top-level JSON object keys are combined, local keys overriding.
    Merge,
}

impl ConflictStrategy {
    /// Returns the configuration name of this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::ServerWins => "server_wins",
            ConflictStrategy::ClientWins => "client_wins",
            ConflictStrategy::LastWrite => "last_write",
            ConflictStrategy::Merge => "merge",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "server_wins" => Ok(ConflictStrategy::ServerWins),
            "client_wins" => Ok(ConflictStrategy::ClientWins),
            "last_write" => Ok(ConflictStrategy::LastWrite),
            "merge" => Ok(ConflictStrategy::Merge),
            _ => Err(SyncError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Applies a [`ConflictStrategy`] to conflicts.
///
/// Resolution is a pure function of the strategy and the conflict: the same
/// inputs always produce the same result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    /// Creates a resolver using `strategy`.
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy }
    }

    /// Returns the configured strategy.
    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Resolves a conflict.
    ///
    /// `Merge` needs both sides to be JSON objects. When either side is not,
    /// it behaves like `LastWrite`.
    pub fn resolve(&self, conflict: &Conflict) -> Resolution {
        match self.strategy {
            ConflictStrategy::ServerWins => Resolution::server(conflict),
            ConflictStrategy::ClientWins => Resolution::local(conflict),
            ConflictStrategy::LastWrite => last_write(conflict),
            ConflictStrategy::Merge => merge(conflict).unwrap_or_else(|| last_write(conflict)),
        }
    }
}

fn last_write(conflict: &Conflict) -> Resolution {
    if conflict.local_is_newer() {
        Resolution::local(conflict)
    } else {
        Resolution::server(conflict)
    }
}

// Shallow: nested objects are replaced whole, never merged.
fn merge(conflict: &Conflict) -> Option<Resolution> {
    let local: Map<String, Value> = serde_json::from_slice(&conflict.local_data).ok()?;
    let mut merged: Map<String, Value> = serde_json::from_slice(&conflict.server_data).ok()?;
    merged.extend(local);
    let data = serde_json::to_vec(&merged).ok()?;
    Some(Resolution::merged(conflict.key.clone(), data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use tidemark_protocol::ResolutionSource;

    fn conflict(local: &[u8], server: &[u8], local_offset_secs: i64) -> Conflict {
        let server_time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Conflict::new(
            "reading-1",
            local.to_vec(),
            server_time + Duration::seconds(local_offset_secs),
            server.to_vec(),
            server_time,
        )
    }

    fn json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn strategy_names_round_trip() {
        for strategy in [
            ConflictStrategy::ServerWins,
            ConflictStrategy::ClientWins,
            ConflictStrategy::LastWrite,
            ConflictStrategy::Merge,
        ] {
            assert_eq!(strategy.as_str().parse::<ConflictStrategy>().unwrap(), strategy);
        }
        assert_eq!("Last-Write".parse::<ConflictStrategy>().unwrap(), ConflictStrategy::LastWrite);
        assert!(matches!(
            "newest".parse::<ConflictStrategy>(),
            Err(SyncError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn strategy_serde_uses_snake_case() {
        let json = serde_json::to_string(&ConflictStrategy::ClientWins).unwrap();
        assert_eq!(json, "\"client_wins\"");
    }

    #[test]
    fn server_wins() {
        let c = conflict(b"{\"a\":1}", b"{\"a\":2}", 60);
        let r = ConflictResolver::new(ConflictStrategy::ServerWins).resolve(&c);
        assert_eq!(r.source, ResolutionSource::Server);
        assert_eq!(r.data, c.server_data);
        assert_eq!(r.key, "reading-1");
    }

    #[test]
    fn client_wins() {
        let c = conflict(b"{\"a\":1}", b"{\"a\":2}", -60);
        let r = ConflictResolver::new(ConflictStrategy::ClientWins).resolve(&c);
        assert_eq!(r.source, ResolutionSource::Local);
        assert_eq!(r.data, c.local_data);
    }

    #[test]
    fn last_write_prefers_newer_side() {
        let resolver = ConflictResolver::new(ConflictStrategy::LastWrite);

        let newer_local = conflict(b"1", b"2", 1);
        assert_eq!(resolver.resolve(&newer_local).source, ResolutionSource::Local);

        let newer_server = conflict(b"1", b"2", -1);
        assert_eq!(resolver.resolve(&newer_server).source, ResolutionSource::Server);
    }

    #[test]
    fn last_write_tie_goes_to_server() {
        let c = conflict(b"1", b"2", 0);
        let r = ConflictResolver::new(ConflictStrategy::LastWrite).resolve(&c);
        assert_eq!(r.source, ResolutionSource::Server);
        assert_eq!(r.data, b"2");
    }

    #[test]
    fn merge_overlays_local_keys() {
        let c = conflict(br#"{"a":1}"#, br#"{"a":2,"b":3}"#, 0);
        let r = ConflictResolver::new(ConflictStrategy::Merge).resolve(&c);
        assert_eq!(r.source, ResolutionSource::Merged);
        assert_eq!(json(&r.data), serde_json::json!({"a": 1, "b": 3}));
    }

    #[test]
    fn merge_replaces_nested_objects_whole() {
        let c = conflict(
            br#"{"meta":{"unit":"kg"}}"#,
            br#"{"meta":{"unit":"t","scope":2},"site":"north"}"#,
            0,
        );
        let r = ConflictResolver::new(ConflictStrategy::Merge).resolve(&c);
        assert_eq!(
            json(&r.data),
            serde_json::json!({"meta": {"unit": "kg"}, "site": "north"})
        );
    }

    #[test]
    fn merge_falls_back_to_last_write() {
        let resolver = ConflictResolver::new(ConflictStrategy::Merge);

        let not_object = conflict(b"[1,2]", br#"{"a":2}"#, 5);
        let r = resolver.resolve(&not_object);
        assert_eq!(r.source, ResolutionSource::Local);
        assert_eq!(r.data, b"[1,2]");

        let garbage = conflict(br#"{"a":1}"#, b"\xff\xfe", -5);
        let r = resolver.resolve(&garbage);
        assert_eq!(r.source, ResolutionSource::Server);
    }

    proptest! {
        #[test]
        fn resolution_is_deterministic(
            a in 0i64..100,
            b in 0i64..100,
            offset in -3i64..3,
            strategy in prop_oneof![
                Just(ConflictStrategy::ServerWins),
                Just(ConflictStrategy::ClientWins),
                Just(ConflictStrategy::LastWrite),
                Just(ConflictStrategy::Merge),
            ],
        ) {
            let local = format!("{{\"a\":{a},\"x\":true}}");
            let server = format!("{{\"a\":{b},\"y\":false}}");
            let c = conflict(local.as_bytes(), server.as_bytes(), offset);
            let resolver = ConflictResolver::new(strategy);

            let first = resolver.resolve(&c);
            let second = resolver.resolve(&c);
            prop_assert_eq!(first, second);
        }
    }
}
