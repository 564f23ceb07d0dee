use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use sluice_core::error::TransportError;
use sluice_core::stream::{SubscriptionTransport, TransportEvent};
use sluice_protocol::{ClientMessage, ServerMessage};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, protocol::Message},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// The custom header for API key authentication
const X_API_KEY_HEADER: &str = "X-API-Key";

/// Path of the run event endpoint on the orchestrator
const RUNS_ENDPOINT: &str = "api/ws/runs";

/// Errors that can occur while validating the websocket configuration
#[derive(Debug, Error)]
pub enum WebSocketConfigError {
    #[error("Server URL cannot be empty")]
    EmptyUrl,

    #[error("Invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported URL scheme '{0}', expected ws, wss, http or https")]
    UnsupportedScheme(String),

    #[error("API key cannot be empty")]
    EmptyApiKey,
}

/// Connection settings for [`WebSocketTransport`]
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub endpoint: Url,
    pub api_key: Option<String>,
    /// Consecutive failed connection attempts tolerated before giving up
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl WebSocketConfig {
    /// Create a new config with validation
    pub fn try_new(
        server_url: &str,
        api_key: Option<String>,
        reconnect_attempts: u32,
        reconnect_delay: Duration,
    ) -> Result<Self, WebSocketConfigError> {
        let server_url = server_url.trim();
        if server_url.is_empty() {
            return Err(WebSocketConfigError::EmptyUrl);
        }
        if api_key.as_deref().is_some_and(|key| key.trim().is_empty()) {
            return Err(WebSocketConfigError::EmptyApiKey);
        }

        Ok(Self {
            endpoint: endpoint_url(server_url)?,
            api_key,
            reconnect_attempts,
            reconnect_delay,
        })
    }
}

// Map http(s) onto ws(s) and make sure the url points at the runs endpoint
fn endpoint_url(server_url: &str) -> Result<Url, WebSocketConfigError> {
    let connect_url = if server_url.ends_with("/api/ws/runs") {
        server_url.to_string()
    } else if server_url.ends_with("/api/ws") {
        format!("{server_url}/runs")
    } else if server_url.ends_with("/api") {
        format!("{server_url}/ws/runs")
    } else if server_url.ends_with('/') {
        format!("{server_url}{RUNS_ENDPOINT}")
    } else {
        format!("{server_url}/{RUNS_ENDPOINT}")
    };

    let mut url = Url::parse(&connect_url)?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(WebSocketConfigError::UnsupportedScheme(other.to_string())),
    };
    // switching between special schemes always succeeds
    let _ = url.set_scheme(scheme);

    Ok(url)
}

/// How a single connection ended
enum SessionEnd {
    /// The consumer went away, nothing left to deliver to
    SinkClosed,
    /// The server closed the connection or the network dropped it
    Dropped(String),
}

/// Subscription transport speaking the sluice protocol over a websocket.
///
/// Reconnects after dropped connections. Every connection re-subscribes from
/// the beginning of the run log and reports [`TransportEvent::Connected`] first.
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    async fn session(
        &self,
        run_id: &str,
        sink: &mpsc::Sender<TransportEvent>,
    ) -> Result<SessionEnd, TransportError> {
        let endpoint = self.config.endpoint.to_string();
        let connect_error = |message: String| TransportError::Connect {
            url: endpoint.clone(),
            message,
        };

        let mut request = self
            .config
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| connect_error(e.to_string()))?;

        if let Some(api_key) = &self.config.api_key {
            debug!("Connecting with API key authentication");
            let value = HeaderValue::from_str(api_key).map_err(|e| connect_error(e.to_string()))?;
            request.headers_mut().insert(X_API_KEY_HEADER, value);
        }

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| connect_error(e.to_string()))?;
        debug!("WebSocket connection established");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let subscribe = ClientMessage::Subscribe {
            run_id: run_id.to_string(),
            cursor: None,
        };
        let json = serde_json::to_string(&subscribe)
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        debug!("Sending message: {}", json);
        if let Err(e) = ws_sender.send(Message::Text(json)).await {
            return Ok(SessionEnd::Dropped(e.to_string()));
        }

        if sink.send(TransportEvent::Connected).await.is_err() {
            return Ok(SessionEnd::SinkClosed);
        }

        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let message = serde_json::from_str::<ServerMessage>(&text)
                        .map_err(|e| TransportError::Protocol(e.to_string()))?;
                    debug!(run_id = message.run_id(), "Received message");
                    if sink.send(TransportEvent::Message(message)).await.is_err() {
                        let _ = ws_sender
                            .send(Message::Text(unsubscribe_message(run_id)))
                            .await;
                        return Ok(SessionEnd::SinkClosed);
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket connection closed by server");
                    return Ok(SessionEnd::Dropped("closed by server".to_string()));
                }
                Err(e) => {
                    error!("Error receiving message: {}", e);
                    return Ok(SessionEnd::Dropped(e.to_string()));
                }
                Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            }
        }

        Ok(SessionEnd::Dropped("stream ended".to_string()))
    }
}

fn unsubscribe_message(run_id: &str) -> String {
    let message = ClientMessage::Unsubscribe {
        run_id: run_id.to_string(),
    };
    serde_json::to_string(&message).unwrap_or_default()
}

#[async_trait]
impl SubscriptionTransport for WebSocketTransport {
    async fn subscribe(
        &self,
        run_id: String,
        sink: mpsc::Sender<TransportEvent>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        let mut failed_attempts = 0u32;

        loop {
            info!("Connecting to {}", self.config.endpoint);
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                outcome = self.session(&run_id, &sink) => outcome,
            };

            let reason = match outcome {
                Ok(SessionEnd::SinkClosed) => return Ok(()),
                Ok(SessionEnd::Dropped(reason)) => {
                    failed_attempts = 0;
                    TransportError::Disconnected(reason)
                }
                Err(e @ TransportError::Connect { .. }) => {
                    failed_attempts += 1;
                    e
                }
                Err(e @ (TransportError::Protocol(_) | TransportError::Disconnected(_))) => {
                    return Err(e)
                }
            };

            if failed_attempts > self.config.reconnect_attempts {
                error!(
                    "Giving up after {} failed connection attempts",
                    failed_attempts
                );
                return Err(reason);
            }

            warn!(
                "Connection lost ({}), reconnecting in {:?}",
                reason, self.config.reconnect_delay
            );
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }
}
