//! Subscription sessions over a run's event log.
//!
//! An [`EventStreamClient`] opens one [`SubscriptionHandle`] per run. Behind the
//! handle a stream task drains the transport and forwards ordered
//! [`StreamUpdate`]s through a bounded channel, which the consumer reads
//! serially with [`SubscriptionHandle::recv`].
//!
//! Every (re)connect of the transport starts a new epoch. The first batch of an
//! epoch carries an incremented [`EventBatch::epoch`] and tells consumers to
//! drop whatever they accumulated before and treat the batch as the start of a
//! fresh log.

use std::sync::Arc;

use sluice_protocol::{FailureKind, ServerMessage};
use sluice_schemas::RunEvent;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::StreamConfig;
use crate::error::TransportError;

mod transport;

pub use transport::{SubscriptionTransport, TransportEvent};

/// Ordered batch of events delivered within one epoch
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    /// Epoch counter, starting at 1 for the first connection of a subscription
    pub epoch: u64,
    /// Whether this is the first batch since the subscription (re)connected
    pub first_in_epoch: bool,
    pub events: Vec<RunEvent>,
}

/// Explicit error record received for a run. Terminal for that run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFailure {
    pub run_id: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Update delivered through a [`SubscriptionHandle`]
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    Batch(EventBatch),
    /// The server rejected the subscription. No further updates follow.
    Failure(SubscriptionFailure),
    /// The transport gave up. No further updates follow.
    Ended(TransportError),
}

/// Opens subscription sessions through a [`SubscriptionTransport`]
pub struct EventStreamClient<T> {
    transport: Arc<T>,
    config: StreamConfig,
}

impl<T> Clone for EventStreamClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            config: self.config,
        }
    }
}

impl<T: SubscriptionTransport> EventStreamClient<T> {
    pub fn new(transport: Arc<T>, config: StreamConfig) -> Self {
        Self { transport, config }
    }

    /// Open a subscription for `run_id`.
    ///
    /// Must be called from within a tokio runtime. The returned handle stops all
    /// delivery when closed or dropped.
    pub fn open(&self, run_id: impl Into<String>) -> SubscriptionHandle {
        let run_id = run_id.into();
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        let (transport_tx, transport_rx) = mpsc::channel(self.config.transport_capacity);
        let (update_tx, update_rx) = mpsc::channel(self.config.buffer_capacity);
        let span = tracing::info_span!("subscription", subscription_id = %id, run_id = %run_id);

        let (result_tx, result_rx) = oneshot::channel();
        let driver = {
            let transport = self.transport.clone();
            let run_id = run_id.clone();
            let cancel = cancel.clone();
            tokio::spawn(
                async move {
                    let result = transport.subscribe(run_id, transport_tx, cancel).await;
                    if let Err(e) = &result {
                        error!("Subscription transport failed: {}", e);
                    }
                    let _ = result_tx.send(result);
                }
                .instrument(span.clone()),
            )
        };

        let forwarder = tokio::spawn(
            forward_updates(
                run_id.clone(),
                transport_rx,
                result_rx,
                update_tx,
                cancel.clone(),
            )
            .instrument(span),
        );

        info!(subscription_id = %id, run_id = %run_id, "Opened subscription");

        SubscriptionHandle {
            id,
            run_id,
            updates: update_rx,
            cancel,
            tasks: vec![driver, forwarder],
            closed: false,
        }
    }

    /// Close a subscription. Idempotent.
    pub fn close(&self, handle: &mut SubscriptionHandle) {
        handle.close();
    }
}

/// A live subscription for one run
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: Uuid,
    run_id: String,
    updates: mpsc::Receiver<StreamUpdate>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    closed: bool,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Receive the next update in delivery order.
    ///
    /// Returns `None` once the handle is closed or the stream has finished.
    pub async fn recv(&mut self) -> Option<StreamUpdate> {
        if self.closed {
            return None;
        }
        self.updates.recv().await
    }

    /// Stop delivery and release the stream tasks. Nothing is delivered after
    /// this returns, including updates that were already buffered.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        self.updates.close();
        while self.updates.try_recv().is_ok() {}
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!(subscription_id = %self.id, run_id = %self.run_id, "Closed subscription");
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

// Drains transport events into consumer updates, numbering epochs
async fn forward_updates(
    run_id: String,
    mut transport_rx: mpsc::Receiver<TransportEvent>,
    driver_result: oneshot::Receiver<Result<(), TransportError>>,
    update_tx: mpsc::Sender<StreamUpdate>,
    cancel: CancellationToken,
) {
    let mut epoch = 0u64;
    let mut fresh = true;

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = transport_rx.recv() => event,
        };

        let update = match event {
            Some(TransportEvent::Connected) => {
                debug!("Transport connected, next batch starts a new epoch");
                fresh = true;
                continue;
            }
            Some(TransportEvent::Message(ServerMessage::LogsBatch {
                run_id: batch_run_id,
                events,
                ..
            })) => {
                if batch_run_id != run_id {
                    warn!(
                        "Dropping batch for run {} on subscription for run {}",
                        batch_run_id, run_id
                    );
                    continue;
                }
                let first_in_epoch = fresh;
                if fresh {
                    epoch += 1;
                    fresh = false;
                    info!(epoch, "Starting epoch");
                }
                debug!(epoch, events = events.len(), "Forwarding batch");
                StreamUpdate::Batch(EventBatch {
                    epoch,
                    first_in_epoch,
                    events,
                })
            }
            Some(TransportEvent::Message(ServerMessage::SubscriptionFailure {
                run_id: failed_run_id,
                kind,
                message,
            })) => {
                warn!("Subscription failed for run {}: {}", failed_run_id, message);
                let failure = SubscriptionFailure {
                    run_id: failed_run_id,
                    kind,
                    message,
                };
                let _ = update_tx.send(StreamUpdate::Failure(failure)).await;
                break;
            }
            // the transport dropped its sink, so the driver has finished
            None => {
                let reason = match driver_result.await {
                    Ok(Ok(())) if cancel.is_cancelled() => break,
                    Ok(Ok(())) => {
                        TransportError::Disconnected("subscription ended by transport".to_string())
                    }
                    Ok(Err(e)) => e,
                    Err(_) => TransportError::Disconnected("transport driver stopped".to_string()),
                };
                let _ = update_tx.send(StreamUpdate::Ended(reason)).await;
                break;
            }
        };

        if update_tx.send(update).await.is_err() {
            debug!("Consumer dropped, stopping forwarder");
            break;
        }
    }

    cancel.cancel();
    debug!("Forwarder finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_is_preserved() {
        let failure = SubscriptionFailure {
            run_id: "r".to_string(),
            kind: FailureKind::RunNotFound,
            message: "missing".to_string(),
        };
        let update = StreamUpdate::Failure(failure.clone());
        assert_eq!(update, StreamUpdate::Failure(failure));
    }
}
