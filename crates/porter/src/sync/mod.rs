//! Stage synchronizers and the machinery they share.
//!
//! # Module Structure
//!
//! - [`types`] - `SyncOptions`, `StageReport`, `StopSignal`
//! - [`progress`] - `MigrationEvent`, `EventCallback`, `emit()`
//! - [`fetch`] - `Paginator` and the source listings
//! - [`engine`] - `EntitySync` and the per-record `StageRun` loop
//! - [`accounts`], [`projects`], [`work_items`], [`links`] - one module per stage
//!
//! # Example
//!
//! ```ignore
//! use porter::ledger::LedgerStore;
//! use porter::kind::EntityKind;
//! use porter::sync::{SyncOptions, sync_accounts};
//!
//! let store = LedgerStore::new("state");
//! let mut ledger = store.open(EntityKind::Accounts)?;
//! let report = sync_accounts(&source, &target, &mut ledger, &SyncOptions::default(), None).await?;
//! println!("{} created, {} errors", report.created, report.errors.len());
//! ```

pub mod accounts;
pub mod engine;
pub mod fetch;
pub mod link_types;
pub mod links;
mod progress;
pub mod projects;
mod types;
pub mod work_items;

pub use types::{LinkStats, StageOutcome, StageReport, StopSignal, SyncOptions};

pub use progress::{EventCallback, MigrationEvent, emit};

pub use fetch::{DEFAULT_PAGE_SIZE, PageSource, Paginator};

pub use engine::{EntitySync, MissingDependency, StageRun};

pub use accounts::sync_accounts;
pub use links::sync_links;
pub use projects::sync_projects;
pub use work_items::sync_work_items;
