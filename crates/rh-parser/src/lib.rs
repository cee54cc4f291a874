//! rh-parser: metadata extraction from filenames and sidecar files.
//!
//! # Quick start
//!
//! ```
//! let info = rh_parser::parse_episode("The.Wire.S01E02.The.Detail").unwrap();
//! assert_eq!(info.show.as_deref(), Some("The Wire"));
//! assert_eq!((info.season, info.episode), (1, 2));
//! assert_eq!(info.display_title(), "The Wire S01E02 - The Detail");
//! ```

pub mod episode;
pub mod nfo;

pub use episode::{derive_title, parse_episode, EpisodeInfo};
pub use nfo::{parse_nfo, parse_nfo_file};
