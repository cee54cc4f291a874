//! rh-core: shared types, IDs, errors, and configuration.
//!
//! This crate is the foundational dependency for the other rh-* crates. It
//! provides typed identifiers, a unified error type, library and transcoding
//! domain types, parsed sidecar metadata, and application configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod media;
pub mod metadata;
pub mod transcode;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use media::*;
pub use metadata::NfoMetadata;
pub use transcode::*;
