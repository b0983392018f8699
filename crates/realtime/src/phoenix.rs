//! WebSocket transport speaking the Phoenix channel protocol (Supabase
//! Realtime, serializer `vsn=1.0.0`).
//!
//! One WebSocket connection is opened per channel. A background task reads
//! frames, translates them into [`ChannelEvent`]s and keeps the socket alive
//! with heartbeats; a heartbeat left unanswered for a full interval is
//! reported as a transport error.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::channel::{ChangePayload, ChannelSpec};
use crate::error::RealtimeError;
use crate::transport::{ChannelEvent, ChannelLink, RealtimeTransport};

/// How often a heartbeat is sent on the `phoenix` topic.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

const SOCKET_PATH: &str = "realtime/v1/websocket";
const PROTOCOL_VERSION: &str = "1.0.0";
const HEARTBEAT_TOPIC: &str = "phoenix";
const JOIN_REF: &str = "1";
const EVENT_BUFFER: usize = 64;

/// Realtime transport over a Phoenix WebSocket.
pub struct PhoenixTransport {
    socket: Url,
    api_key: SecretString,
    access_token: Option<SecretString>,
}

impl PhoenixTransport {
    /// Build a transport for the backend at `endpoint` (the project URL,
    /// e.g. `https://abc.supabase.co`).
    ///
    /// `access_token` is the user's JWT; without one the API key is used,
    /// which only sees rows visible to anonymous users.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidEndpoint`] if `endpoint` is not an
    /// http(s) or ws(s) URL.
    pub fn new(
        endpoint: &str,
        api_key: SecretString,
        access_token: Option<SecretString>,
    ) -> Result<Self, RealtimeError> {
        Ok(Self {
            socket: socket_url(endpoint)?,
            api_key,
            access_token,
        })
    }

    fn connect_url(&self) -> Url {
        let mut url = self.socket.clone();
        url.query_pairs_mut()
            .append_pair("apikey", self.api_key.expose_secret())
            .append_pair("vsn", PROTOCOL_VERSION);
        url
    }

    fn token(&self) -> &str {
        self.access_token
            .as_ref()
            .unwrap_or(&self.api_key)
            .expose_secret()
    }
}

impl fmt::Debug for PhoenixTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhoenixTransport")
            .field("socket", &self.socket.as_str())
            .field("authenticated", &self.access_token.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RealtimeTransport for PhoenixTransport {
    #[instrument(skip(self, spec), fields(channel = %spec.name))]
    async fn open(&self, spec: &ChannelSpec) -> Result<ChannelLink, RealtimeError> {
        if spec.tables.is_empty() {
            return Err(RealtimeError::NothingToWatch(spec.name.clone()));
        }

        let (ws_stream, _) = connect_async(self.connect_url().as_str())
            .await
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;
        let (mut writer, reader) = ws_stream.split();

        let topic = spec.topic();
        let join = join_frame(spec, self.token());
        writer
            .send(Message::Text(serde_json::to_string(&join)?.into()))
            .await
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;
        debug!(%topic, "join sent");

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (leave_tx, leave_rx) = oneshot::channel();
        tokio::spawn(pump(writer, reader, topic, event_tx, leave_rx));

        Ok(ChannelLink::new(event_rx, move || {
            let _ = leave_tx.send(());
        }))
    }
}

/// Derive the WebSocket endpoint from the project URL.
fn socket_url(endpoint: &str) -> Result<Url, RealtimeError> {
    let mut url =
        Url::parse(endpoint).map_err(|e| RealtimeError::InvalidEndpoint(format!("{endpoint}: {e}")))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(RealtimeError::InvalidEndpoint(format!(
                "unsupported scheme {other:?}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| RealtimeError::InvalidEndpoint(endpoint.to_string()))?;

    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base}/{SOCKET_PATH}"));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// A Phoenix protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl Frame {
    fn new(topic: &str, event: &str, payload: Value, reference: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference),
            join_ref: None,
        }
    }
}

/// The `phx_join` frame subscribing to every table in `spec`.
#[must_use]
pub fn join_frame(spec: &ChannelSpec, access_token: &str) -> Frame {
    let changes: Vec<Value> = spec
        .tables
        .iter()
        .map(|watch| {
            let mut entry = json!({
                "event": watch.event.as_str(),
                "schema": watch.schema,
                "table": watch.table,
            });
            if let Some(filter) = &watch.filter {
                entry["filter"] = Value::String(filter.to_string());
            }
            entry
        })
        .collect();

    let payload = json!({
        "config": {
            "broadcast": { "ack": false, "self": false },
            "presence": { "key": "" },
            "postgres_changes": changes,
        },
        "access_token": access_token,
    });

    let mut frame = Frame::new(&spec.topic(), "phx_join", payload, JOIN_REF.to_string());
    frame.join_ref = Some(JOIN_REF.to_string());
    frame
}

/// What an inbound frame means for a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(ChannelEvent),
    /// Reply to the heartbeat with this ref.
    HeartbeatAck(String),
    /// Presence, broadcasts and frames for other topics.
    Ignored,
}

/// Interpret one text frame received for `topic`.
///
/// # Errors
///
/// Returns an error if the frame is not a valid Phoenix message or a change
/// payload cannot be decoded.
pub fn decode_frame(text: &str, topic: &str) -> Result<Inbound, RealtimeError> {
    let frame: Frame = serde_json::from_str(text)?;

    if frame.topic == HEARTBEAT_TOPIC {
        return Ok(match (frame.event.as_str(), frame.reference) {
            ("phx_reply", Some(reference)) => Inbound::HeartbeatAck(reference),
            _ => Inbound::Ignored,
        });
    }
    if frame.topic != topic {
        return Ok(Inbound::Ignored);
    }

    let event = match frame.event.as_str() {
        "phx_reply" if frame.reference.as_deref() == Some(JOIN_REF) => {
            match frame.payload.get("status").and_then(Value::as_str) {
                Some("ok") => ChannelEvent::Subscribed,
                _ => ChannelEvent::Error(format!(
                    "join rejected: {}",
                    reply_reason(&frame.payload)
                )),
            }
        }
        "postgres_changes" => {
            let data = frame
                .payload
                .get("data")
                .cloned()
                .ok_or_else(|| RealtimeError::Protocol("postgres_changes without data".to_string()))?;
            ChannelEvent::Change(serde_json::from_value::<ChangePayload>(data)?)
        }
        "system" if frame.payload.get("status").and_then(Value::as_str) == Some("error") => {
            ChannelEvent::Error(reply_reason(&frame.payload))
        }
        "phx_error" => ChannelEvent::Error("channel crashed on the server".to_string()),
        "phx_close" => ChannelEvent::Closed,
        _ => return Ok(Inbound::Ignored),
    };
    Ok(Inbound::Event(event))
}

fn reply_reason(payload: &Value) -> String {
    payload
        .pointer("/response/reason")
        .or_else(|| payload.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("no reason given")
        .to_string()
}

/// Read frames until the link is released, the server closes the socket or
/// the transport fails.
async fn pump<W, R>(
    mut writer: W,
    mut reader: R,
    topic: String,
    events: mpsc::Sender<ChannelEvent>,
    mut leave: oneshot::Receiver<()>,
) where
    W: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut next_ref: u64 = 2;
    let mut awaiting_heartbeat: Option<String> = None;
    let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);

    let failure = loop {
        tokio::select! {
            _ = &mut leave => {
                let frame = Frame::new(&topic, "phx_leave", json!({}), next_ref.to_string());
                if let Ok(text) = serde_json::to_string(&frame) {
                    let _ = writer.send(Message::Text(text.into())).await;
                }
                let _ = writer.close().await;
                debug!(%topic, "channel left");
                return;
            }
            _ = heartbeat.tick() => {
                if let Some(reference) = awaiting_heartbeat.take() {
                    break format!("heartbeat {reference} not acknowledged");
                }
                let reference = next_ref.to_string();
                next_ref += 1;
                let frame = Frame::new(HEARTBEAT_TOPIC, "heartbeat", json!({}), reference.clone());
                let sent = match serde_json::to_string(&frame) {
                    Ok(text) => writer.send(Message::Text(text.into())).await.map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                if let Err(e) = sent {
                    break format!("heartbeat failed: {e}");
                }
                awaiting_heartbeat = Some(reference);
            }
            message = reader.next() => match message {
                Some(Ok(Message::Text(text))) => match decode_frame(text.as_str(), &topic) {
                    Ok(Inbound::Event(event)) => {
                        let terminal = matches!(event, ChannelEvent::Closed | ChannelEvent::Error(_));
                        if events.send(event).await.is_err() || terminal {
                            return;
                        }
                    }
                    Ok(Inbound::HeartbeatAck(reference)) => {
                        if awaiting_heartbeat.as_deref() == Some(reference.as_str()) {
                            awaiting_heartbeat = None;
                        }
                    }
                    Ok(Inbound::Ignored) => {}
                    Err(e) => warn!(%topic, error = %e, "dropping undecodable frame"),
                },
                Some(Ok(Message::Ping(data))) => {
                    let _ = writer.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => break "socket closed".to_string(),
                Some(Ok(_)) => {}
                Some(Err(e)) => break e.to_string(),
            }
        }
    };

    warn!(%topic, reason = %failure, "realtime socket failed");
    let _ = events.send(ChannelEvent::Error(failure)).await;
}
