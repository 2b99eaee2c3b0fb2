// Caller-supplied policy hooks consulted by the controller loop.
use crate::ClientError;
use crate::calls::{CallerRef, FrameworkId};

/// Application-side policy the controller consults on every iteration.
///
/// Implementations may carry interior state; the controller calls every
/// method with `&mut self` and never concurrently.
pub trait SchedulerContext: Send {
    /// Checked before each registration cycle and before each event decode.
    /// Once this returns true the controller finishes its current step and
    /// returns.
    fn done(&mut self) -> bool;

    /// The identity to resume as, if one is known from a prior registration.
    fn framework_id(&mut self) -> Option<FrameworkId>;

    /// Reports the outcome of every completed registration cycle, `None`
    /// included. This is the place to remember assigned identities, count
    /// failures, or trip `done`.
    fn error(&mut self, error: Option<&ClientError>);

    /// Invoked at the start of every cycle with the initial caller, and again
    /// to report any redirect the subscribe call produced. The caller
    /// returned from the cycle-start resolution is the one used for that
    /// cycle; a reported redirect only takes effect if the context hands it
    /// back from a later resolution.
    fn caller_changed(&mut self, caller: CallerRef) -> CallerRef;
}

type DoneFn = Box<dyn FnMut() -> bool + Send>;
type FrameworkIdFn = Box<dyn FnMut() -> Option<FrameworkId> + Send>;
type ErrorFn = Box<dyn FnMut(Option<&ClientError>) + Send>;
type CallerChangedFn = Box<dyn FnMut(CallerRef) -> CallerRef + Send>;

/// Closure-backed `SchedulerContext` where every hook is optional.
///
/// Unset hooks fall back to: never done, no remembered identity, outcomes
/// dropped, callers passed through unchanged.
#[derive(Default)]
pub struct ContextAdapter {
    pub done: Option<DoneFn>,
    pub framework_id: Option<FrameworkIdFn>,
    pub error: Option<ErrorFn>,
    pub caller_changed: Option<CallerChangedFn>,
}

impl SchedulerContext for ContextAdapter {
    fn done(&mut self) -> bool {
        match self.done.as_mut() {
            Some(f) => f(),
            None => false,
        }
    }

    fn framework_id(&mut self) -> Option<FrameworkId> {
        self.framework_id.as_mut().and_then(|f| f())
    }

    fn error(&mut self, error: Option<&ClientError>) {
        if let Some(f) = self.error.as_mut() {
            f(error);
        }
    }

    fn caller_changed(&mut self, caller: CallerRef) -> CallerRef {
        match self.caller_changed.as_mut() {
            Some(f) => f(caller),
            None => caller,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::{CallResult, Caller, Subscribe};
    use std::sync::Arc;

    struct NullCaller;

    #[async_trait::async_trait]
    impl Caller for NullCaller {
        async fn call(&self, _subscribe: &Subscribe) -> CallResult {
            CallResult::failed(ClientError::Transport("unused".to_string()))
        }
    }

    #[test]
    fn defaults_never_done_and_pass_callers_through() {
        let mut ctx = ContextAdapter::default();
        assert!(!ctx.done());
        assert!(ctx.framework_id().is_none());
        ctx.error(None);

        let caller: CallerRef = Arc::new(NullCaller);
        let returned = ctx.caller_changed(Arc::clone(&caller));
        assert!(Arc::ptr_eq(&caller, &returned));
    }

    #[test]
    fn hooks_override_defaults() {
        let mut ctx = ContextAdapter {
            done: Some(Box::new(|| true)),
            framework_id: Some(Box::new(|| Some(FrameworkId::from("fw-7")))),
            ..Default::default()
        };
        assert!(ctx.done());
        assert_eq!(ctx.framework_id(), Some(FrameworkId::from("fw-7")));
    }
}
