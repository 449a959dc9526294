//! The boundary between the migration engine and the two remote systems.
//!
//! [`SourceApi`] is the read side (users, queues, issues, comments, links),
//! [`TargetApi`] the write side. Both are object-safe so the orchestrator can
//! hold them as `&dyn` and tests can substitute in-memory fakes.
//!
//! # Example
//!
//! ```ignore
//! use porter::platform::{SourceApi, RemoteError};
//!
//! async fn count_queues(source: &dyn SourceApi) -> Result<usize, RemoteError> {
//!     Ok(source.list_queues(1, 50).await?.len())
//! }
//! ```

mod errors;
mod rate_limit;
mod types;

pub use errors::{CONFLICT_STATUS, ErrorClass, RemoteError, Result};
pub use rate_limit::{DEFAULT_REQUEST_DELAY_MS, PacedTransport};
pub use types::{
    KeyRef, NewAccount, NewLink, NewProject, NewStatus, NewWorkItem, RawId, SourceApi,
    SourceComment, SourceIssue, SourceLink, SourceLinkType, SourceQueue, SourceStatus,
    SourceUser, TargetApi, TargetLinkType, TargetUser, UserRef,
};
