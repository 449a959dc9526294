//! Porter - staged, resumable migration between issue trackers.
//!
//! Accounts, projects, work items and links are moved from a Tracker-style
//! source to a YouTrack-style target, one stage per kind, in dependency
//! order. Every stage keeps a mapping ledger on disk, so a run can be
//! interrupted and started again without duplicating anything on the target.
//!
//! # Example
//!
//! ```ignore
//! use porter::{LedgerStore, Orchestrator, StageSelection, SyncOptions};
//! use porter::tracker::TrackerClient;
//! use porter::youtrack::YouTrackClient;
//!
//! let source = TrackerClient::new(&tracker_settings, delay)?;
//! let target = YouTrackClient::new(&url, &token, delay)?;
//! let orchestrator = Orchestrator::new(&source, &target, LedgerStore::new("state"), SyncOptions::default());
//!
//! orchestrator.check_connection().await?;
//! let report = orchestrator.run(StageSelection::All, false).await?;
//! ```

pub mod error;
pub mod http;
pub mod kind;
pub mod ledger;
pub mod orchestrator;
pub mod platform;
pub mod retry;
pub mod sync;
pub mod tracker;
pub mod youtrack;

pub use error::{FetchError, MigrationError, RecordError, RecordErrorClass};
pub use kind::EntityKind;
pub use ledger::{LedgerError, LedgerStore, MappingLedger, StageMarker, StageState, StageStatus};
pub use orchestrator::{Orchestrator, RunReport, StageSelection, VerifyReport};
pub use platform::{ErrorClass, RemoteError, SourceApi, TargetApi};
pub use retry::RetryConfig;
pub use sync::{EventCallback, MigrationEvent, StageOutcome, StageReport, StopSignal, SyncOptions};
