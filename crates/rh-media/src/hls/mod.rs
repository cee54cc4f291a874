//! HLS master playlist generation and served-playlist URI rewriting.

mod generator;
mod rewrite;
mod types;

pub use generator::{estimate_bandwidth, generate_master_playlist};
pub use rewrite::{playlist_base, rewrite_playlist};
pub use types::{AudioRendition, MasterPlaylist, RenditionNamer, Variant, AUDIO_GROUP_ID};
