// Subscription lifecycle: register, stream events, re-register on stream
// break, until the context reports done.
use std::time::Duration;

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::calls::{CallerRef, FrameworkInfo, Subscribe};
use crate::context::SchedulerContext;
use crate::events::{DefaultHandler, Event, EventHandler};
use crate::response::Response;
use crate::{ClientError, Result};

/// Backpressure gate on registration attempts. One token is consumed before
/// every subscribe call; withholding tokens pauses reconnection without
/// tearing the controller down.
pub enum RegistrationTokens {
    /// Never blocks. The default.
    Unlimited,
    /// Blocks until the paired sender supplies a token. A sender that stays
    /// alive but silent stalls the controller indefinitely; dropping every
    /// sender degrades to `Unlimited`.
    Throttled(mpsc::Receiver<()>),
}

impl Default for RegistrationTokens {
    fn default() -> Self {
        Self::Unlimited
    }
}

impl RegistrationTokens {
    pub fn throttled(tokens: mpsc::Receiver<()>) -> Self {
        Self::Throttled(tokens)
    }

    /// One token per `period`, the first available immediately. Unclaimed
    /// tokens do not accumulate past one.
    pub fn interval(period: Duration) -> Self {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if tx.send(()).await.is_err() {
                    break;
                }
            }
        });
        Self::Throttled(rx)
    }

    async fn acquire(&mut self) {
        if let Self::Throttled(tokens) = self
            && tokens.recv().await.is_none()
        {
            *self = Self::Unlimited;
        }
    }
}

/// Everything `run` needs for the lifetime of one controller.
pub struct Config {
    pub context: Box<dyn SchedulerContext>,
    pub framework: FrameworkInfo,
    pub caller: CallerRef,
    pub handler: Option<Box<dyn EventHandler>>,
    pub registration_tokens: RegistrationTokens,
}

impl Config {
    pub fn new(
        context: impl SchedulerContext + 'static,
        framework: FrameworkInfo,
        caller: CallerRef,
    ) -> Self {
        Self {
            context: Box::new(context),
            framework,
            caller,
            handler: None,
            registration_tokens: RegistrationTokens::default(),
        }
    }

    /// Replaces `DefaultHandler` as the event sink.
    pub fn with_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn with_registration_tokens(mut self, tokens: RegistrationTokens) -> Self {
        self.registration_tokens = tokens;
        self
    }
}

/// Drives registration cycles until `context.done()` reports true, then
/// returns the most recent cycle's outcome.
///
/// Each cycle subscribes through the current caller, streams events to the
/// handler until the stream breaks or the context is done, and reports the
/// outcome (success included) through `SchedulerContext::error`. Cycles are
/// retried without limit; giving up is the context's decision, expressed via
/// `done`.
pub async fn run(config: Config) -> Result<()> {
    let Config {
        mut context,
        framework,
        caller: initial_caller,
        handler,
        mut registration_tokens,
    } = config;
    let mut handler = handler.unwrap_or_else(|| Box::new(DefaultHandler));
    let mut last = Ok(());

    while !context.done() {
        // Every cycle resolves afresh from the initial caller; carrying a
        // redirect forward is the context's job, not the controller's.
        let caller = context.caller_changed(initial_caller.clone());

        let mut subscribe = Subscribe::new(framework.clone());
        // Resume under a prior identity only while the manager would still
        // honor it; otherwise register fresh even if an id is remembered.
        subscribe.framework.id = context
            .framework_id()
            .filter(|id| framework.can_failover() && !id.is_empty());

        registration_tokens.acquire().await;

        counter!("armada_registration_attempts_total").increment(1);
        debug!(
            framework = %subscribe.framework.name,
            resuming = subscribe.framework.id.is_some(),
            "subscribing"
        );

        let result = caller.call(&subscribe).await;
        if let Some(redirect) = result.redirect {
            context.caller_changed(redirect);
        }

        last = process_subscription(
            context.as_mut(),
            handler.as_mut(),
            result.response,
            result.error,
        )
        .await;
        if let Err(err) = &last {
            counter!("armada_subscription_failures_total").increment(1);
            warn!(error = %err, "subscription cycle ended");
        }
        context.error(last.as_ref().err());
    }
    last
}

async fn process_subscription(
    context: &mut dyn SchedulerContext,
    handler: &mut dyn EventHandler,
    response: Option<Box<dyn Response>>,
    error: Option<ClientError>,
) -> Result<()> {
    // A response accompanying a call error is dropped unread.
    match (response, error) {
        (_, Some(err)) => Err(err),
        (Some(mut response), None) => event_loop(context, handler, response.as_mut()).await,
        (None, None) => Err(ClientError::Transport(
            "subscribe call produced neither response nor error".to_string(),
        )),
    }
}

async fn event_loop(
    context: &mut dyn SchedulerContext,
    handler: &mut dyn EventHandler,
    response: &mut dyn Response,
) -> Result<()> {
    let mut result = Ok(());
    while result.is_ok() && !context.done() {
        let mut event = Event::default();
        result = match response.decode_event(&mut event).await {
            Ok(()) => {
                counter!("armada_events_handled_total").increment(1);
                handler.handle_event(&event)
            }
            Err(err) => Err(ClientError::Codec(err)),
        };
    }
    result
}
