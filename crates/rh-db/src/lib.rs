//! rh-db: database access and persistence layer.
//!
//! This crate provides SQLite-backed storage with connection pooling,
//! embedded migrations, typed models, query modules, and the
//! [`MediaStore`] trait the scanner and transcoding manager consume.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
pub mod store;

pub use models::{Collection, PlaybackState, TvEpisode, TvSeason, TvShow, UserFlags};
pub use store::{MediaStore, SqliteStore};
