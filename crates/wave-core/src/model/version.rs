//! Hashed wavelet versions.
//!
//! A wavelet version is a counter plus a BLAKE3 digest chained over every
//! delta applied so far. Two replicas at the same counter with different
//! hashes have diverged histories.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::ids::WaveletId;

/// A version number paired with the history hash that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashedVersion {
    pub version: u64,
    #[serde(serialize_with = "hash_to_hex", deserialize_with = "hash_from_hex")]
    pub hash: [u8; 32],
}

impl HashedVersion {
    /// The version every wavelet starts at, seeded by the wavelet's name.
    #[must_use]
    pub fn initial(wavelet: &WaveletId) -> Self {
        Self {
            version: 0,
            hash: *blake3::hash(wavelet.as_str().as_bytes()).as_bytes(),
        }
    }

    /// A version with an all-zero hash, for callers that only track counters.
    #[must_use]
    pub const fn unsigned(version: u64) -> Self {
        Self {
            version,
            hash: [0; 32],
        }
    }

    /// Chain `payload` onto this version, advancing the counter by `ops`.
    #[must_use]
    pub fn next(&self, ops: u64, payload: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.hash);
        hasher.update(payload);
        Self {
            version: self.version + ops,
            hash: *hasher.finalize().as_bytes(),
        }
    }

    /// First eight hex characters of the hash, for logs.
    #[must_use]
    pub fn short_hash(&self) -> String {
        blake3::Hash::from(self.hash).to_hex()[..8].to_string()
    }
}

impl fmt::Display for HashedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.version, self.short_hash())
    }
}

fn hash_to_hex<S: Serializer>(hash: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(blake3::Hash::from(*hash).to_hex().as_str())
}

fn hash_from_hex<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
    let raw = String::deserialize(deserializer)?;
    blake3::Hash::from_hex(raw.as_bytes())
        .map(|h| *h.as_bytes())
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_advances_counter_and_changes_hash() {
        let start = HashedVersion::initial(&WaveletId::from("example.com/conv+root"));
        let next = start.next(2, b"delta");
        assert_eq!(next.version, 2);
        assert_ne!(next.hash, start.hash);
        assert_eq!(next, start.next(2, b"delta"));
        assert_ne!(next, start.next(2, b"other"));
    }

    #[test]
    fn hash_serializes_as_hex() {
        let v = HashedVersion::initial(&WaveletId::from("w"));
        let json = serde_json::to_value(v).expect("serialize");
        let hex = json["hash"].as_str().expect("hash is a string");
        assert_eq!(hex.len(), 64);
        let back: HashedVersion = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, v);
    }
}
