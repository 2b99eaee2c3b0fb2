// Client-side engine that keeps a framework process subscribed to a cluster
// resource manager: register, consume the pushed event stream, and
// re-register when the stream breaks, until the context says stop.
//
// DESIGN INTENT
// -------------
// This crate is deliberately *not* a general-purpose RPC client. One
// registration cycle owns exactly one live response stream, and the
// controller is a single sequential control flow:
//
// - Registration, decoding, and dispatch happen in order within one task;
//   there are no internally spawned workers competing for the stream.
// - The only suspension points are the registration-token receive (how an
//   external supervisor paces or pauses reconnection) and the stream read
//   itself. Cancellation is cooperative via `SchedulerContext::done`, polled
//   at loop boundaries.
// - Transport is a boundary, not a dependency: anything that can issue the
//   subscribe call and hand back a readable event stream implements `Caller`
//   and `Response`. Redirects to a new leading manager surface as a
//   replacement caller and flow through the context.
use armada_codec::CodecError;

pub mod calls;
pub mod config;
pub mod context;
pub mod controller;
pub mod events;
pub mod response;


pub use calls::{CallResult, Caller, CallerRef, FrameworkId, FrameworkInfo, Subscribe};
pub use context::{ContextAdapter, SchedulerContext};
pub use controller::{Config, RegistrationTokens, run};
pub use events::{DefaultHandler, Event, EventHandler, HandlerFn};
pub use response::{FramedResponse, Response};

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// The subscribe call itself failed; no events were streamed.
    #[error("transport: {0}")]
    Transport(String),
    /// Framing or payload decode failure on the event stream.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Error event pushed by the manager; always stream-terminating.
    #[error("manager error event: {message:?}")]
    Manager { message: String },
    /// The application handler rejected an event.
    #[error("handler: {0}")]
    Handler(String),
}
