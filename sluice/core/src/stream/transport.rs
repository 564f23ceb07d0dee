use async_trait::async_trait;
use sluice_protocol::ServerMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// Events a transport reports while a subscription is live
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection was (re)established. Messages that follow replay the run
    /// log from the beginning.
    Connected,
    /// A decoded server message
    Message(ServerMessage),
}

/// The subscription mechanism underneath an [`EventStreamClient`](super::EventStreamClient).
///
/// Implementations own connection handling, including reconnects. Every time a
/// connection is (re)established they must report [`TransportEvent::Connected`]
/// before forwarding any message received over it.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use sluice_core::error::TransportError;
/// use sluice_core::stream::{SubscriptionTransport, TransportEvent};
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// /// A transport for runs that never produce any events
/// struct SilentTransport;
///
/// #[async_trait]
/// impl SubscriptionTransport for SilentTransport {
///     async fn subscribe(
///         &self,
///         _run_id: String,
///         sink: mpsc::Sender<TransportEvent>,
///         cancel: CancellationToken,
///     ) -> Result<(), TransportError> {
///         let _ = sink.send(TransportEvent::Connected).await;
///         cancel.cancelled().await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait SubscriptionTransport: Send + Sync + 'static {
    /// Deliver the event log of `run_id` into `sink` until `cancel` fires or the
    /// sink is dropped.
    ///
    /// Returning `Ok` means the subscription was stopped on request. Returning an
    /// error means the transport gave up and no further events will follow.
    async fn subscribe(
        &self,
        run_id: String,
        sink: mpsc::Sender<TransportEvent>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError>;
}
