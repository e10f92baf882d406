//! Newtype IDs for type-safe entity references.
//!
//! Every record in the managed backend is keyed by a UUID. The `define_id!`
//! macro wraps them so a quote id can never be passed where a shipment id is
//! expected. [`ReferenceId`] is the separate, human-shareable key used for
//! public tracking.

use core::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Macro to define a type-safe UUID wrapper.
///
/// Creates a newtype wrapper around [`uuid::Uuid`] with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`
/// - `new()`, `random()`, `as_uuid()`, `Display` and `FromStr`
///
/// # Example
///
/// ```rust
/// # use autohaul_core::define_id;
/// define_id!(DriverId);
///
/// let id = DriverId::random();
/// let parsed: DriverId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(::uuid::Uuid);

        impl $name {
            /// Wrap an existing UUID.
            #[must_use]
            pub const fn new(id: ::uuid::Uuid) -> Self {
                Self(id)
            }

            /// Generate a fresh random (v4) id.
            #[must_use]
            pub fn random() -> Self {
                Self(::uuid::Uuid::new_v4())
            }

            /// Get the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> ::uuid::Uuid {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                ::uuid::Uuid::parse_str(s.trim()).map(Self)
            }
        }

        impl From<::uuid::Uuid> for $name {
            fn from(id: ::uuid::Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id!(UserId);
define_id!(QuoteId);
define_id!(ShipmentId);

/// Alphabet for generated reference ids.
///
/// Omits `0`, `O`, `1` and `I` so ids read back over the phone unambiguously.
const REFERENCE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Number of random characters after the prefix.
const REFERENCE_LEN: usize = 8;

/// Prefix for quote reference ids.
pub const QUOTE_REFERENCE_PREFIX: &str = "AH";

/// A human-shareable reference id, the public lookup key for tracking.
///
/// Assigned once when a quote is created and copied onto the shipment at
/// conversion; never rewritten afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(String);

impl ReferenceId {
    /// Generate a new reference id, e.g. `AH-7K2M9QXD`.
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..REFERENCE_LEN)
            .map(|_| {
                let idx = rng.random_range(0..REFERENCE_ALPHABET.len());
                char::from(REFERENCE_ALPHABET.get(idx).copied().unwrap_or(b'X'))
            })
            .collect();
        Self(format!("{prefix}-{suffix}"))
    }

    /// Wrap a reference id received from a caller or the store.
    ///
    /// Returns `None` for blank input.
    #[must_use]
    pub fn from_input(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// Returns the reference id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ReferenceId> for String {
    fn from(id: ReferenceId) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_generate_reference_format() {
        let id = ReferenceId::generate(QUOTE_REFERENCE_PREFIX);
        let (prefix, suffix) = id.as_str().split_once('-').unwrap();
        assert_eq!(prefix, "AH");
        assert_eq!(suffix.len(), REFERENCE_LEN);
        assert!(suffix.bytes().all(|b| REFERENCE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_generate_is_not_constant() {
        let a = ReferenceId::generate("AH");
        let b = ReferenceId::generate("AH");
        let c = ReferenceId::generate("AH");
        assert!(a != b || b != c);
    }

    #[test]
    fn test_from_input_trims_and_rejects_blank() {
        assert_eq!(ReferenceId::from_input("  AH-1234 ").unwrap().as_str(), "AH-1234");
        assert!(ReferenceId::from_input("   ").is_none());
    }

    #[test]
    fn test_typed_ids_round_trip_through_strings() {
        let id = QuoteId::random();
        let parsed: QuoteId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<ShipmentId>().is_err());
    }

    #[test]
    fn test_typed_ids_serialize_transparently() {
        let uuid = Uuid::new_v4();
        let json = serde_json::to_string(&ShipmentId::new(uuid)).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
    }
}
