//! Canonical string identifiers.
//!
//! Every identifier that leaves the sample store and enters a task payload is
//! one of these newtypes. They are opaque, stable and compared as strings. A
//! storage backend may keep native identifiers (integers, object ids, ...) but
//! must convert them here before they cross into the pipeline, and must fail
//! rather than guess when a value has an unexpected shape.

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn validate(kind: &str, raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::MalformedRecord(format!("{kind} is empty")));
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(DomainError::MalformedRecord(format!(
            "{kind} contains whitespace or control characters: {trimmed:?}"
        )));
    }
    Ok(trimmed.to_string())
}

macro_rules! canonical_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, DomainError> {
                validate($kind, raw).map(Self)
            }

            /// Canonical form of a native integer identifier.
            pub fn from_native(value: i64) -> Self {
                Self(value.to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(&s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

canonical_id!(
    /// Storefront product variant being monitored.
    VariantId,
    "variant_id"
);
canonical_id!(
    /// Retailer tag, e.g. `amazon`. Also the key of the adapter registry.
    RetailerId,
    "retailer_id"
);
canonical_id!(
    /// Sales region a price applies to.
    RegionId,
    "region_id"
);

impl RetailerId {
    /// Retailer tags are case-insensitive; the canonical form is lowercase.
    pub fn tag(raw: &str) -> Result<Self, DomainError> {
        Self::parse(&raw.to_ascii_lowercase())
    }
}
