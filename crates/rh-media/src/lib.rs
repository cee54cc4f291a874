//! rh-media: HLS playlist handling.
//!
//! - [`hls::generate_master_playlist`] synthesizes a master playlist with an
//!   alternate-audio group from separately encoded renditions.
//! - [`hls::rewrite_playlist`] roots the relative URIs of a stored playlist
//!   under the URL it is being served from.

pub mod hls;

pub use hls::{
    estimate_bandwidth, generate_master_playlist, playlist_base, rewrite_playlist,
    AudioRendition, MasterPlaylist, RenditionNamer, Variant, AUDIO_GROUP_ID,
};
