//! YouTrack API client: the write side of the migration.
//!
//! Accounts live in Hub (`/hub/api/rest`), everything else in the YouTrack
//! REST API (`/api`). Both are reached through the same base URL and token.
//!
//! # Module Structure
//!
//! - [`error`] - `YouTrackError` and its conversion into `RemoteError`
//! - [`types`] - request bodies and response entries
//! - [`client`] - `YouTrackClient`, an implementation of `TargetApi`

mod client;
mod error;
mod types;

pub use client::YouTrackClient;
pub use error::YouTrackError;
