//! Notification and Lifecycle Event Types
//!
//! Notification events are published after a successful mutating action.
//! They drive cache invalidation and the live updates sent to socket
//! clients. Lifecycle events are the request/response pair the dispatcher
//! emits around every action, for observability.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

use crate::error::ErrorCode;

/// Transport a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Rest,
    Socket,
    Graphql,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Rest => "rest",
            Transport::Socket => "socket",
            Transport::Graphql => "graphql",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a mutating action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeVerb {
    Created,
    Updated,
    Removed,
    RemovedAll,
    Voted,
    Unvoted,
}

impl ChangeVerb {
    /// Event name sent to socket clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeVerb::Created => "created",
            ChangeVerb::Updated => "updated",
            ChangeVerb::Removed => "removed",
            ChangeVerb::RemovedAll => "removedAll",
            ChangeVerb::Voted => "voted",
            ChangeVerb::Unvoted => "unvoted",
        }
    }
}

impl fmt::Display for ChangeVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-mutation broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub service: String,
    pub verb: ChangeVerb,
    /// Serialized (filtered and populated) result of the action.
    pub payload: JsonValue,
    pub request_id: Uuid,
}

impl NotificationEvent {
    /// Frame pushed to socket clients.
    pub fn to_frame(&self) -> JsonValue {
        serde_json::json!({
            "type": "notification",
            "service": self.service,
            "event": self.verb.as_str(),
            "data": self.payload,
        })
    }
}

/// Request/response pair emitted by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Request {
        request_id: Uuid,
        transport: Transport,
        service: String,
        action: String,
    },
    Response {
        request_id: Uuid,
        transport: Transport,
        service: String,
        action: String,
        /// `None` on success.
        error: Option<ErrorCode>,
        elapsed_ms: u64,
        cache_hit: bool,
    },
}

impl LifecycleEvent {
    pub fn request_id(&self) -> Uuid {
        match self {
            LifecycleEvent::Request { request_id, .. }
            | LifecycleEvent::Response { request_id, .. } => *request_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::Request { .. } => "request",
            LifecycleEvent::Response { .. } => "response",
        }
    }
}
