use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic dataset hash (content hash of a candle series or frame).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl DatasetHash {
    pub fn from_hash(hash: &str) -> Self {
        Self(hash.to_string())
    }

    /// First 12 hex chars, enough to tell runs apart in logs.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one pipeline run in the experiment tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// BLAKE3 of the pipeline name, start time and a caller nonce.
    pub fn generate(pipeline: &str, started_at: DateTime<Utc>, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(pipeline.as_bytes());
        hasher.update(started_at.to_rfc3339().as_bytes());
        hasher.update(&nonce.to_le_bytes());
        let hex = hasher.finalize().to_hex();
        Self(hex[..32].to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn run_id_is_deterministic_per_input() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(RunId::generate("__default__", at, 1), RunId::generate("__default__", at, 1));
        assert_ne!(RunId::generate("__default__", at, 1), RunId::generate("__default__", at, 2));
        assert_eq!(RunId::generate("inference", at, 0).0.len(), 32);
    }

    #[test]
    fn short_hash_prefix() {
        let h = DatasetHash::from_hash("0123456789abcdef");
        assert_eq!(h.short(), "0123456789ab");
        assert_eq!(DatasetHash::from_hash("abc").short(), "abc");
    }
}
