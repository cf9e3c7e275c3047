//! Conflicts between local and server versions of an entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two divergent versions of the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Entity key.
    pub key: String,
    /// Local payload.
    #[serde(with = "crate::payload")]
    pub local_data: Vec<u8>,
    /// When the local version was written.
    pub local_time: DateTime<Utc>,
    /// Server payload.
    #[serde(with = "crate::payload")]
    pub server_data: Vec<u8>,
    /// When the server version was written.
    pub server_time: DateTime<Utc>,
}

impl Conflict {
    /// Creates a new conflict.
    pub fn new(
        key: impl Into<String>,
        local_data: impl Into<Vec<u8>>,
        local_time: DateTime<Utc>,
        server_data: impl Into<Vec<u8>>,
        server_time: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            local_data: local_data.into(),
            local_time,
            server_data: server_data.into(),
            server_time,
        }
    }

    /// Returns true if the local version is strictly newer.
    ///
    /// Ties are not newer, so they favour the server.
    pub fn local_is_newer(&self) -> bool {
        self.local_time > self.server_time
    }
}

/// Which side a resolution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    /// The local version won.
    Local,
    /// The server version won.
    Server,
    /// Both versions were merged.
    Merged,
}

impl ResolutionSource {
    /// Returns the wire name of this source.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::Local => "local",
            ResolutionSource::Server => "server",
            ResolutionSource::Merged => "merged",
        }
    }
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The winning version of a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Entity key.
    pub key: String,
    /// Winning payload.
    #[serde(with = "crate::payload")]
    pub data: Vec<u8>,
    /// Where the winning payload came from.
    pub source: ResolutionSource,
}

impl Resolution {
    /// Creates a resolution taken from the local side.
    pub fn local(conflict: &Conflict) -> Self {
        Self {
            key: conflict.key.clone(),
            data: conflict.local_data.clone(),
            source: ResolutionSource::Local,
        }
    }

    /// Creates a resolution taken from the server side.
    pub fn server(conflict: &Conflict) -> Self {
        Self {
            key: conflict.key.clone(),
            data: conflict.server_data.clone(),
            source: ResolutionSource::Server,
        }
    }

    /// Creates a merged resolution.
    pub fn merged(key: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            data,
            source: ResolutionSource::Merged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn local_is_newer_is_strict() {
        let now = Utc::now();
        let tie = Conflict::new("k", b"1".to_vec(), now, b"2".to_vec(), now);
        assert!(!tie.local_is_newer());

        let newer = Conflict::new(
            "k",
            b"1".to_vec(),
            now + Duration::seconds(1),
            b"2".to_vec(),
            now,
        );
        assert!(newer.local_is_newer());
    }

    #[test]
    fn resolution_source_serializes_lowercase() {
        let json = serde_json::to_string(&ResolutionSource::Merged).unwrap();
        assert_eq!(json, "\"merged\"");
        assert_eq!(ResolutionSource::Server.to_string(), "server");
    }

    #[test]
    fn constructors_pick_sides() {
        let now = Utc::now();
        let conflict = Conflict::new("k", b"L".to_vec(), now, b"S".to_vec(), now);

        let local = Resolution::local(&conflict);
        assert_eq!(local.data, b"L");
        assert_eq!(local.source, ResolutionSource::Local);

        let server = Resolution::server(&conflict);
        assert_eq!(server.data, b"S");
        assert_eq!(server.source, ResolutionSource::Server);
    }
}
