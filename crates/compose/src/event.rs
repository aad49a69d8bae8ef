//! Composition lifecycle events.
//!
//! Everything observable about a request is reported through an [`EventSink`]
//! injected at construction time, so hosts can wire their own metrics without
//! a process-global collector. The default sink forwards to `tracing`.

use std::time::Duration;

use http::{HeaderMap, StatusCode};
use tracing::{debug, error, info, warn};

use crate::error::{ComposeError, FragmentError};

/// Page-level events, one request each of `start`, then `response` or
/// `error`, then `end`.
#[derive(Debug)]
pub enum ComposeEvent<'a> {
    Start,
    Response { status: StatusCode },
    End { content_length: u64, duration: Duration },
    Error { error: &'a ComposeError },
    ContextError { reason: &'a str },
}

/// Per-fragment events, tagged with the fragment's id (when declared) and
/// its position index.
#[derive(Debug)]
pub enum FragmentEvent<'a> {
    Start,
    Response { status: StatusCode, headers: &'a HeaderMap },
    End { content_length: u64 },
    Error { error: &'a FragmentError },
    Timeout,
    Warn { message: &'a str },
}

impl ComposeEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Response { .. } => "response",
            Self::End { .. } => "end",
            Self::Error { .. } => "error",
            Self::ContextError { .. } => "context:error",
        }
    }
}

impl FragmentEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "fragment:start",
            Self::Response { .. } => "fragment:response",
            Self::End { .. } => "fragment:end",
            Self::Error { .. } => "fragment:error",
            Self::Timeout => "fragment:timeout",
            Self::Warn { .. } => "fragment:warn",
        }
    }
}

/// Receiver of lifecycle events. Implementations must be cheap; events are
/// emitted on the hot path.
pub trait EventSink: Send + Sync {
    fn on_page(&self, event: &ComposeEvent<'_>);

    fn on_fragment(&self, fragment_id: Option<&str>, index: usize, event: &FragmentEvent<'_>);
}

/// Default sink logging every event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_page(&self, event: &ComposeEvent<'_>) {
        match event {
            ComposeEvent::Start => debug!(event = event.name(), "composition started"),
            ComposeEvent::Response { status } => {
                debug!(event = event.name(), status = %status, "response head sent");
            }
            ComposeEvent::End { content_length, duration } => {
                info!(event = event.name(), content_length, duration_ms = duration.as_millis() as u64, "composition finished");
            }
            ComposeEvent::Error { error } => error!(event = event.name(), %error, "composition failed"),
            ComposeEvent::ContextError { reason } => {
                warn!(event = event.name(), reason, "context fetch failed, using empty context");
            }
        }
    }

    fn on_fragment(&self, fragment_id: Option<&str>, index: usize, event: &FragmentEvent<'_>) {
        let id = fragment_id.unwrap_or("");
        match event {
            FragmentEvent::Start => debug!(event = event.name(), id, index, "fragment request started"),
            FragmentEvent::Response { status, .. } => {
                debug!(event = event.name(), id, index, status = %status, "fragment responded");
            }
            FragmentEvent::End { content_length } => {
                debug!(event = event.name(), id, index, content_length, "fragment finished");
            }
            FragmentEvent::Error { error } => warn!(event = event.name(), id, index, %error, "fragment failed"),
            FragmentEvent::Timeout => warn!(event = event.name(), id, index, "fragment timed out"),
            FragmentEvent::Warn { message } => warn!(event = event.name(), id, index, message),
        }
    }
}
