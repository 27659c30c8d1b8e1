/// Fetch state definitions for the per-job content state machine
///
/// This module defines every state a job id passes through while its
/// description is fetched, plus the classification of transport failures.
use std::fmt;

/// Represents the current state of a job id in the content fetch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchState {
    // ===== Active States =====
    /// Job id accepted, existence not yet checked
    Start,

    /// A request is about to be issued with the current identity
    Fetching,

    // ===== Retry States =====
    /// Last attempt failed at the proxy
    RetryProxy,

    /// Last attempt could not connect
    RetryConn,

    /// Last attempt failed for a generic request reason (timeout, body read)
    RetryRequest,

    /// Last attempt failed the TLS handshake
    RetrySsl,

    /// Last attempt failed for an unclassified reason
    RetryUnknown,

    // ===== Terminal States =====
    /// Description (or the missing sentinel) was written
    Saved,

    /// Content already present in the store; nothing fetched
    Skipped,

    /// Retry caps exhausted or an unexpected status was returned
    GiveUp,

    /// Stopped by an external signal before reaching another terminal state
    Cancelled,
}

impl FetchState {
    /// Returns true if no further transitions follow this state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Saved | Self::Skipped | Self::GiveUp | Self::Cancelled
        )
    }

    /// Returns true for the transport retry states
    pub fn is_retry(&self) -> bool {
        matches!(
            self,
            Self::RetryProxy
                | Self::RetryConn
                | Self::RetryRequest
                | Self::RetrySsl
                | Self::RetryUnknown
        )
    }

    /// Short lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Fetching => "fetching",
            Self::RetryProxy => "retry_proxy",
            Self::RetryConn => "retry_conn",
            Self::RetryRequest => "retry_request",
            Self::RetrySsl => "retry_ssl",
            Self::RetryUnknown => "retry_unknown",
            Self::Saved => "saved",
            Self::Skipped => "skipped",
            Self::GiveUp => "give_up",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a failed request that produced no HTTP response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// TLS handshake or certificate failure
    Ssl,

    /// The proxy refused or dropped the connection
    Proxy,

    /// The target could not be reached
    Connection,

    /// Any other request failure (timeout, truncated body)
    Request,

    /// Failure outside the transport taxonomy (e.g. an unbuildable request)
    Unknown,
}

impl FailureKind {
    /// All failure kinds, in escalation-table order
    pub const ALL: [FailureKind; 5] = [
        FailureKind::Ssl,
        FailureKind::Proxy,
        FailureKind::Connection,
        FailureKind::Request,
        FailureKind::Unknown,
    ];

    /// The retry state entered after a failure of this kind
    pub fn retry_state(&self) -> FetchState {
        match self {
            Self::Ssl => FetchState::RetrySsl,
            Self::Proxy => FetchState::RetryProxy,
            Self::Connection => FetchState::RetryConn,
            Self::Request => FetchState::RetryRequest,
            Self::Unknown => FetchState::RetryUnknown,
        }
    }

    /// Returns true when repeated failures of this kind force a pool refresh
    pub fn escalates(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ssl => "ssl",
            Self::Proxy => "proxy",
            Self::Connection => "connection",
            Self::Request => "request",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
