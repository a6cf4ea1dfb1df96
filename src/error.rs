//! Typed error taxonomy shared across components.
//!
//! Per-component errors are defined next to their component; this module holds
//! the handful of kinds referenced from more than one place, plus the
//! credential redaction wrapper used anywhere a secret crosses a boundary.

use std::fmt;

/// Wraps a secret (camera password, stream key, OAuth refresh token) so it can
/// never accidentally end up in a log line or error message.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Only way to get the raw value back out; callers that need it for a
    /// wire protocol (RTSP URL, SOAP header, RTMP URL) must call this
    /// explicitly, which makes "reads a secret" visible at call sites.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(REDACTED)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "REDACTED")
    }
}

/// Input errors: caller referenced an unknown entity, or supplied malformed
/// data. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("unknown {kind} id {id}")]
    UnknownEntity { kind: &'static str, id: i64 },

    #[error("malformed timeline: {reason}")]
    MalformedTimeline { reason: String },

    #[error("ill-formed address: {0}")]
    IllFormedAddress(String),
}

/// Precondition errors: caller's request is well-formed but the system is not
/// in a state that can satisfy it right now.
#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    #[error("preview server unhealthy: {0}")]
    PreviewServerUnhealthy(String),

    #[error("relay preroll failed for cameras {0:?}")]
    PrerollFailed(Vec<i64>),

    #[error("camera {camera_id} unreachable over ONVIF")]
    PtzUnreachable { camera_id: i64 },
}
