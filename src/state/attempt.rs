use crate::state::FailureKind;

/// What the caller must do after recording a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Move to the next identity in the pool
    Rotate,

    /// Re-download the proxy list, then move to the next identity
    Refresh,
}

/// Per-job-id failure counters
///
/// Created fresh for every job id (or listing page) and dropped once a
/// terminal state is reached. Transport counters are tracked per kind so
/// that only consecutive failures of the same kind escalate.
#[derive(Debug, Clone, Default)]
pub struct FetchAttemptContext {
    ssl_failures: u32,
    proxy_failures: u32,
    conn_failures: u32,
    request_failures: u32,
    unknown_failures: u32,
    redirects: u32,
    content_misses: u32,
}

impl FetchAttemptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a transport failure and decides whether the pool must refresh
    ///
    /// When the counter for `kind` reaches `threshold` the counter resets and
    /// `Escalation::Refresh` is returned. Unknown failures never escalate;
    /// they are bounded separately through [`Self::unknown_failures`].
    pub fn record_failure(&mut self, kind: FailureKind, threshold: u32) -> Escalation {
        let counter = self.counter_mut(kind);
        *counter += 1;

        if kind.escalates() && *counter >= threshold {
            *counter = 0;
            Escalation::Refresh
        } else {
            Escalation::Rotate
        }
    }

    /// Clears the transport counters after any HTTP response arrives
    pub fn clear_transport_failures(&mut self) {
        self.ssl_failures = 0;
        self.proxy_failures = 0;
        self.conn_failures = 0;
        self.request_failures = 0;
        self.unknown_failures = 0;
    }

    /// Records a redirect and returns the running total
    pub fn record_redirect(&mut self) -> u32 {
        self.redirects += 1;
        self.redirects
    }

    /// Records a page that carried no description and returns the running total
    pub fn record_content_miss(&mut self) -> u32 {
        self.content_misses += 1;
        self.content_misses
    }

    /// Current consecutive count for a failure kind
    pub fn failures(&self, kind: FailureKind) -> u32 {
        match kind {
            FailureKind::Ssl => self.ssl_failures,
            FailureKind::Proxy => self.proxy_failures,
            FailureKind::Connection => self.conn_failures,
            FailureKind::Request => self.request_failures,
            FailureKind::Unknown => self.unknown_failures,
        }
    }

    pub fn unknown_failures(&self) -> u32 {
        self.unknown_failures
    }

    pub fn redirects(&self) -> u32 {
        self.redirects
    }

    fn counter_mut(&mut self, kind: FailureKind) -> &mut u32 {
        match kind {
            FailureKind::Ssl => &mut self.ssl_failures,
            FailureKind::Proxy => &mut self.proxy_failures,
            FailureKind::Connection => &mut self.conn_failures,
            FailureKind::Request => &mut self.request_failures,
            FailureKind::Unknown => &mut self.unknown_failures,
        }
    }
}
