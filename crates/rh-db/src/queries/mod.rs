//! Database query modules.

pub mod collections;
pub mod libraries;
pub mod media_items;
pub mod metadata;
pub mod playback;
pub mod profiles;
pub mod transcode_cache;
pub mod tv;
