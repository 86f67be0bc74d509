use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub name: String,
    pub source_url: String,
    pub expected_hash: String, // SHA-256 of the compressed download
}

impl ModelDescriptor {
    pub fn new(
        name: impl Into<String>,
        source_url: impl Into<String>,
        expected_hash: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            expected_hash: expected_hash.into(),
        }
    }

    pub fn hash_matches(&self, actual: &str) -> bool {
        self.expected_hash.trim().eq_ignore_ascii_case(actual)
    }
}

/// Body of the installation marker. Only the marker's presence is consulted.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InstallationRecord {
    pub model: String,
    pub sha256: String,
    pub artifact: String,
}
