//! String-backed identifiers.
//!
//! Identifiers are opaque to the algebra: equality and ordering are the only
//! operations it needs. They serialize as bare strings.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }
    };
}

string_id!(
    /// A wavelet participant, usually an address such as `alice@example.com`.
    ParticipantId
);
string_id!(
    /// A document inside a wavelet (a blip or a data document).
    DocumentId
);
string_id!(
    /// A wavelet within a wave.
    WaveletId
);
string_id!(
    /// A wave: the container that groups wavelets.
    WaveId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_bare_strings() {
        let id = ParticipantId::from("alice@example.com");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"alice@example.com\"");
        let back: ParticipantId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn display_is_raw_value() {
        assert_eq!(DocumentId::new("b+root").to_string(), "b+root");
    }
}
