//! Shared helpers for sluice core integration tests.
//!
//! [`ScriptedTransport`] replays canned server messages per run, one list per
//! connection, so tests can drive reconnects and transport failures
//! deterministically.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sluice_core::error::TransportError;
use sluice_core::stream::{SubscriptionTransport, TransportEvent};
use sluice_protocol::{FailureKind, ServerMessage};
use sluice_schemas::{EventKind, LogLevel, RunEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What the transport does after replaying all connections
#[derive(Debug, Clone, Default)]
pub enum Ending {
    /// Stay connected until cancelled
    #[default]
    HoldOpen,
    /// Give up with an error
    Fail(TransportError),
    /// Return without error as if the server closed the stream
    Finish,
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    pub connections: Vec<Vec<ServerMessage>>,
    pub ending: Ending,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(mut self, messages: Vec<ServerMessage>) -> Self {
        self.connections.push(messages);
        self
    }

    pub fn ending(mut self, ending: Ending) -> Self {
        self.ending = ending;
        self
    }
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: HashMap<String, Script>,
    opened: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, run_id: &str, script: Script) -> Self {
        self.scripts.insert(run_id.to_string(), script);
        self
    }

    /// Run ids in the order they were subscribed
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriptionTransport for ScriptedTransport {
    async fn subscribe(
        &self,
        run_id: String,
        sink: mpsc::Sender<TransportEvent>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        self.opened.lock().unwrap().push(run_id.clone());
        let script = self.scripts.get(&run_id).cloned().unwrap_or_default();

        for messages in script.connections {
            if sink.send(TransportEvent::Connected).await.is_err() {
                return Ok(());
            }
            for message in messages {
                if sink.send(TransportEvent::Message(message)).await.is_err() {
                    return Ok(());
                }
            }
        }

        match script.ending {
            Ending::HoldOpen => {
                cancel.cancelled().await;
                Ok(())
            }
            Ending::Fail(error) => Err(error),
            Ending::Finish => Ok(()),
        }
    }
}

pub fn run_event(run_id: &str, kind: EventKind, timestamp: i64) -> RunEvent {
    RunEvent::builder()
        .run_id(run_id.to_string())
        .timestamp(timestamp)
        .kind(kind)
        .build()
}

pub fn step_event(run_id: &str, kind: EventKind, step_key: &str, timestamp: i64) -> RunEvent {
    RunEvent::builder()
        .run_id(run_id.to_string())
        .step_key(step_key.to_string())
        .timestamp(timestamp)
        .kind(kind)
        .build()
}

pub fn log_line(run_id: &str, level: LogLevel, message: &str, timestamp: i64) -> RunEvent {
    RunEvent::builder()
        .run_id(run_id.to_string())
        .timestamp(timestamp)
        .level(level)
        .message(message.to_string())
        .kind(EventKind::LogMessage)
        .build()
}

pub fn batch(run_id: &str, events: Vec<RunEvent>) -> ServerMessage {
    ServerMessage::LogsBatch {
        run_id: run_id.to_string(),
        events,
        cursor: None,
    }
}

pub fn not_found(run_id: &str) -> ServerMessage {
    ServerMessage::SubscriptionFailure {
        run_id: run_id.to_string(),
        kind: FailureKind::RunNotFound,
        message: format!("Run {run_id} could not be found"),
    }
}
