//! # Sluice Core
//!
//! Client side core for following orchestrator runs. It subscribes to a run's
//! event log, keeps the authoritative ordered log across reconnects, derives
//! step and run state from it, filters it for display and search, and
//! aggregates historical materializations into partition buckets and numeric
//! series.
//!
//! All derivation is pure and recomputed from the complete log. The only I/O
//! boundary is the [`stream::SubscriptionTransport`] supplied by the caller, and
//! the only shared mutation is publishing run status to a
//! [`run_status::RunRecordStore`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sluice_core::prelude::*;
//!
//! async fn follow<T: SubscriptionTransport>(transport: T) -> Result<()> {
//!     let client = EventStreamClient::new(Arc::new(transport), StreamConfig::default());
//!     let store = Arc::new(InMemoryRunStore::new());
//!     let mut watcher = RunWatcher::new(client, store);
//!
//!     watcher.watch("b1f6c9d0");
//!     while let Some(update) = watcher.next().await? {
//!         if update.change.is_terminal() {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod log_filter;
pub mod materializations;
pub mod prelude;
pub mod run_log;
pub mod run_status;
pub mod step_state;
pub mod stream;
pub mod watcher;

pub use error::{Error, Result};
