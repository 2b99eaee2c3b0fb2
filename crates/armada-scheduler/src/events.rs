// Events pushed over a subscription, and the handlers that consume them.
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ClientError;
use crate::calls::FrameworkId;

/// One typed event decoded from a subscription frame.
///
/// Apart from `Error`, which the controller's default handler treats as
/// stream-terminating, variants are opaque to the controller and only
/// meaningful to the application handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// First event of a successful registration cycle; carries the identity
    /// to remember for failover resumption.
    Subscribed {
        framework_id: FrameworkId,
        #[serde(skip_serializing_if = "Option::is_none")]
        heartbeat_interval: Option<Duration>,
    },
    /// Periodic liveness signal from the manager.
    Heartbeat,
    /// Opaque manager-to-framework payload.
    Message {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    /// An agent or executor tied to this framework went away.
    Failure {
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<i32>,
    },
    /// Unrecoverable registration-level error; the manager will close the
    /// stream after sending this.
    Error { message: String },
    // Event types newer than this client decode as Unknown. serde requires
    // the catch-all variant to come last.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Processes one decoded event; returning an error terminates the current
/// stream and sends the controller back to registration.
pub trait EventHandler: Send {
    fn handle_event(&mut self, event: &Event) -> Result<(), ClientError>;
}

/// Functional adaptation of `EventHandler`.
pub struct HandlerFn<F>(pub F);

impl<F> EventHandler for HandlerFn<F>
where
    F: FnMut(&Event) -> Result<(), ClientError> + Send,
{
    fn handle_event(&mut self, event: &Event) -> Result<(), ClientError> {
        (self.0)(event)
    }
}

/// Minimum handling required for correct controller behavior: an error event
/// aborts the stream so the controller can re-register, everything else is
/// accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandler;

impl EventHandler for DefaultHandler {
    fn handle_event(&mut self, event: &Event) -> Result<(), ClientError> {
        match event {
            Event::Error { message } => Err(ClientError::Manager {
                message: message.clone(),
            }),
            _ => Ok(()),
        }
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::Deserialize;
    use serde::de::Error;

    // Encode Vec<u8> as base64 string for JSON payloads.
    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let encoded = base64::engine::general_purpose::STANDARD.encode(value);
        serializer.serialize_str(&encoded)
    }

    // Decode base64 string into Vec<u8>.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(D::Error::custom)
    }
}
