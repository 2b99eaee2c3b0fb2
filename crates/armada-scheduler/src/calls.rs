// Registration call types and the transport boundary.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::ClientError;
use crate::response::Response;

/// Manager-assigned framework identity, opaque to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameworkId(pub String);

impl FrameworkId {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FrameworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FrameworkId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Immutable per-process framework descriptor. Owned by the application;
/// read-only to the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub user: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// How long the manager keeps this framework's entitlements alive after a
    /// disconnect. Declaring a positive timeout is what makes resumption
    /// under a prior `FrameworkId` meaningful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failover_timeout: Option<Duration>,
    /// Identity from a previous registration, stamped per attempt by the
    /// controller when resuming.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<FrameworkId>,
}

impl FrameworkInfo {
    pub fn new(user: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// True when the descriptor declares a positive failover timeout.
    pub(crate) fn can_failover(&self) -> bool {
        self.failover_timeout.is_some_and(|timeout| !timeout.is_zero())
    }
}

/// Registration request issued once per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscribe {
    pub framework: FrameworkInfo,
}

impl Subscribe {
    pub fn new(framework: FrameworkInfo) -> Self {
        Self { framework }
    }
}

pub type CallerRef = Arc<dyn Caller>;

/// Outcome of one subscribe call.
pub struct CallResult {
    /// Live event stream for this cycle; released when dropped.
    pub response: Option<Box<dyn Response>>,
    /// Replacement transport chosen by the caller itself, e.g. a redirect to
    /// the new leading manager. May accompany either outcome; the controller
    /// forwards it through the context before the next cycle.
    pub redirect: Option<CallerRef>,
    /// Transport-level failure of the call itself.
    pub error: Option<ClientError>,
}

impl CallResult {
    pub fn ok(response: impl Response + 'static) -> Self {
        Self {
            response: Some(Box::new(response)),
            redirect: None,
            error: None,
        }
    }

    pub fn failed(error: ClientError) -> Self {
        Self {
            response: None,
            redirect: None,
            error: Some(error),
        }
    }

    pub fn with_redirect(mut self, caller: CallerRef) -> Self {
        self.redirect = Some(caller);
        self
    }
}

/// Transport handle able to issue the subscribe call and hand back a
/// streaming response. Implemented outside this crate.
#[async_trait]
pub trait Caller: Send + Sync {
    async fn call(&self, subscribe: &Subscribe) -> CallResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_info_failover_requires_positive_timeout() {
        let mut framework = FrameworkInfo::new("svc", "analytics");
        assert!(!framework.can_failover());
        framework.failover_timeout = Some(Duration::ZERO);
        assert!(!framework.can_failover());
        framework.failover_timeout = Some(Duration::from_secs(60));
        assert!(framework.can_failover());
    }

    #[test]
    fn subscribe_serializes_without_empty_optionals() {
        let subscribe = Subscribe::new(FrameworkInfo::new("svc", "analytics"));
        let json = serde_json::to_string(&subscribe).expect("serialize");
        assert!(!json.contains("failover_timeout"));
        assert!(!json.contains("\"id\""));
        assert!(!json.contains("roles"));
    }

    #[test]
    fn subscribe_round_trips_with_id() {
        let mut framework = FrameworkInfo::new("svc", "analytics");
        framework.failover_timeout = Some(Duration::from_secs(60));
        framework.id = Some(FrameworkId::from("fw-2718"));
        let subscribe = Subscribe::new(framework);
        let json = serde_json::to_vec(&subscribe).expect("serialize");
        let decoded: Subscribe = serde_json::from_slice(&json).expect("deserialize");
        assert_eq!(decoded, subscribe);
    }
}
