//! Typed ID wrappers for entity identifiers.
//!
//! Store-assigned bookkeeping IDs (library roots, scan runs, collections,
//! TV grouping) are newtypes over `Uuid`. Media, profile and job IDs are
//! opaque strings: a media ID may be a random UUID or a content-derived
//! stable key, and a job ID is a deterministic hash.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Generate a newtype ID wrapper over `Uuid`.
macro_rules! typed_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                /// Create a new random ID.
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }

                /// Return the inner UUID value.
                #[must_use]
                pub fn as_uuid(&self) -> &Uuid {
                    &self.0
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    Uuid::parse_str(s).map(Self)
                }
            }

            impl From<Uuid> for $name {
                fn from(uuid: Uuid) -> Self {
                    Self(uuid)
                }
            }

            impl From<$name> for Uuid {
                fn from(id: $name) -> Self {
                    id.0
                }
            }
        )+
    };
}

/// Generate a newtype ID wrapper over an opaque `String`.
macro_rules! string_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(String);

            impl $name {
                /// Wrap an existing identifier.
                pub fn new(id: impl Into<String>) -> Self {
                    Self(id.into())
                }

                /// Borrow the identifier as a string slice.
                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<String> for $name {
                fn from(s: String) -> Self {
                    Self(s)
                }
            }

            impl From<&str> for $name {
                fn from(s: &str) -> Self {
                    Self(s.to_string())
                }
            }

            impl AsRef<str> for $name {
                fn as_ref(&self) -> &str {
                    &self.0
                }
            }
        )+
    };
}

typed_id! {
    /// Unique identifier for a configured library root.
    LibraryRootId,
    /// Unique identifier for one scan execution.
    ScanRunId,
    /// Unique identifier for a user collection.
    CollectionId,
    /// Unique identifier for a TV show grouping row.
    ShowId,
    /// Unique identifier for a TV season grouping row.
    SeasonId,
}

string_id! {
    /// Opaque identifier of an indexed media file, stable across rescans.
    MediaId,
    /// Identifier of a transcoding profile.
    ProfileId,
    /// Deterministic identifier of a transcoding job (and its cache row).
    JobId,
}

impl MediaId {
    /// Generate a fresh random media ID.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}
