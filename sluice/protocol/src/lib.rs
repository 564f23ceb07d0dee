//! Communication protocol for sluice run subscriptions
//!
//! This crate defines the messages exchanged between a sluice client and the
//! orchestrator's run event server. It includes message types for:
//!
//! - Client requests (subscribing to and unsubscribing from a run's event log)
//! - Server responses (ordered batches of run events, subscription failures)
//!
//! The protocol is designed to work over WebSockets. A server that reconnects a
//! client replays the run log from the requested cursor; clients treat the first
//! batch after every (re)connect as the start of a new epoch.

use serde::{Deserialize, Serialize};
use sluice_schemas::RunEvent;

/// Client websocket message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to the event log of a run
    Subscribe {
        /// Id of the run to follow
        run_id: String,
        /// Resume after this cursor, replay from the beginning when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursor: Option<String>,
    },
    /// Stop following a run
    Unsubscribe {
        /// Id of the run to stop following
        run_id: String,
    },
}

/// Reason a server rejected or terminated a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The requested run does not exist
    RunNotFound,
    /// Any other server side failure
    Other,
}

/// Server websocket message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Ordered batch of run events
    LogsBatch {
        /// Id of the run the events belong to
        run_id: String,
        /// Events in log order
        events: Vec<RunEvent>,
        /// Cursor of the last event in this batch
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursor: Option<String>,
    },
    /// The subscription for this run cannot continue
    SubscriptionFailure {
        /// Id of the run the subscription was for
        run_id: String,
        /// Failure classification
        kind: FailureKind,
        /// Error message
        message: String,
    },
}

impl ServerMessage {
    pub fn run_id(&self) -> &str {
        match self {
            ServerMessage::LogsBatch { run_id, .. } => run_id,
            ServerMessage::SubscriptionFailure { run_id, .. } => run_id,
        }
    }
}
