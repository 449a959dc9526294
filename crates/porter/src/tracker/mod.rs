//! Tracker API client: the read side of the migration.
//!
//! # Module Structure
//!
//! - [`error`] - `TrackerError` and its conversion into `RemoteError`
//! - [`client`] - `TrackerClient`, an implementation of `SourceApi`
//!
//! ```ignore
//! use porter::tracker::{OrgHosting, TrackerClient, TrackerSettings, DEFAULT_BASE_URL};
//!
//! let settings = TrackerSettings {
//!     base_url: DEFAULT_BASE_URL.to_string(),
//!     token: token.clone(),
//!     org_id: org_id.clone(),
//!     hosting: OrgHosting::Cloud,
//! };
//! let client = TrackerClient::new(&settings, Duration::from_millis(500))?;
//! ```

mod client;
mod error;

pub use client::{DEFAULT_BASE_URL, OrgHosting, TrackerClient, TrackerSettings};
pub use error::TrackerError;
