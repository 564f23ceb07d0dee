//! Following one run at a time.

use std::sync::Arc;

use sluice_schemas::RunStatusRecord;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::run_log::{LogChange, RunLog};
use crate::run_status::{RunRecordStore, RunStatusSync};
use crate::stream::{EventStreamClient, SubscriptionHandle, SubscriptionTransport};

/// Result of one [`RunWatcher::next`] step
#[derive(Debug, Clone, PartialEq)]
pub struct WatchUpdate {
    pub change: LogChange,
    /// Status published for the new events, if they carried a lifecycle marker
    pub status: Option<RunStatusRecord>,
}

struct Watched {
    handle: SubscriptionHandle,
    log: RunLog,
}

/// Keeps exactly one live subscription and the log it feeds.
///
/// Switching runs closes the previous subscription before the next one is
/// opened. Updates are applied one at a time, in delivery order, and the
/// run status derived from them is published to the shared store.
pub struct RunWatcher<T, S> {
    client: EventStreamClient<T>,
    status: RunStatusSync<S>,
    current: Option<Watched>,
}

impl<T, S> RunWatcher<T, S>
where
    T: SubscriptionTransport,
    S: RunRecordStore,
{
    pub fn new(client: EventStreamClient<T>, store: Arc<S>) -> Self {
        Self {
            client,
            status: RunStatusSync::new(store),
            current: None,
        }
    }

    /// Start following `run_id`, dropping any previously watched run
    #[instrument(skip(self))]
    pub fn watch(&mut self, run_id: &str) {
        self.unwatch();

        let handle = self.client.open(run_id);
        info!(subscription_id = %handle.id(), "Watching run");
        self.current = Some(Watched {
            handle,
            log: RunLog::new(run_id),
        });
    }

    /// Stop following the current run. The log is discarded with the subscription.
    pub fn unwatch(&mut self) {
        if let Some(mut watched) = self.current.take() {
            self.client.close(&mut watched.handle);
            debug!(run_id = %watched.log.run_id(), "Stopped watching run");
        }
    }

    pub fn log(&self) -> Option<&RunLog> {
        self.current.as_ref().map(|watched| &watched.log)
    }

    pub fn store(&self) -> &Arc<S> {
        self.status.store()
    }

    /// Wait for the next update of the watched run and apply it.
    ///
    /// Returns `Ok(None)` once the subscription has delivered its last update.
    pub async fn next(&mut self) -> Result<Option<WatchUpdate>> {
        let watched = self.current.as_mut().ok_or(Error::NotSubscribed)?;

        let Some(update) = watched.handle.recv().await else {
            return Ok(None);
        };

        let change = watched.log.apply(update);
        let status = match change {
            LogChange::Appended { .. } | LogChange::Reset { .. } => {
                let run_id = watched.log.run_id();
                self.status.publish(run_id, watched.log.added_by(&change))
            }
            LogChange::Stale { .. } | LogChange::Failed(_) | LogChange::Ended(_) => None,
        };

        Ok(Some(WatchUpdate { change, status }))
    }
}
