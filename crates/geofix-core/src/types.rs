//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seconds in one day.
pub const SECONDS_PER_DAY: i64 = 60 * 60 * 24;

/// Milliseconds in one day. Capture time offsets are expressed in
/// milliseconds relative to the source's start time.
pub const MILLIS_PER_DAY: i64 = SECONDS_PER_DAY * 1000;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated device identifier (hardware identity such as an IMEI).
    ///
    /// Device IDs must be non-empty strings. They key datasets: all sources
    /// reporting the same device ID merge into one event stream.
    DeviceId, "device ID"
);

impl DeviceId {
    /// Bucket for sources whose metadata carries no device identity.
    #[must_use]
    pub fn unknown() -> Self {
        Self("unknown".to_string())
    }
}

define_string_id!(
    /// A validated subscriber identifier (SIM identity such as an IMSI).
    ///
    /// One device may report several subscriber IDs across its capture files
    /// when SIM cards change between recordings.
    SubscriberId, "subscriber ID"
);

/// Identifies one parsed capture file within a run.
///
/// Assigned sequentially at parse time; only meaningful for the lifetime of
/// the batch, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src{}", self.0)
    }
}

/// Identifies one event within a run: the source it came from plus its
/// construction index within that source.
///
/// Used as the key for location and correlation side tables so events
/// themselves stay immutable after parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId {
    pub source: SourceId,
    pub index: u32,
}

impl EventId {
    #[must_use]
    pub const fn new(source: SourceId, index: u32) -> Self {
        Self { source, index }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source, self.index)
    }
}
