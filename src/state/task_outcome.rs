use std::fmt;

/// Outcome of one claimed crawl task
///
/// Workers classify every processed task into one of these so that counters,
/// the consecutive-failure guard and log lines all agree on what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskOutcome {
    // ===== Success =====
    /// Page fetched, extracted and handed to the result sink
    Recorded,

    // ===== Skips (fetch succeeded, nothing to record) =====
    /// Response was not HTML
    ContentMismatch,

    /// HTML contained no visible text
    NoContent,

    // ===== Failures =====
    /// Non-retryable HTTP status (4xx/5xx other than 403/429)
    HttpError,

    /// Retryable failure; the task went back into the frontier
    Retried,

    /// Retry budget exhausted or permanent network failure
    Failed,

    /// Stop signal arrived before the request was sent
    Interrupted,
}

impl TaskOutcome {
    /// Returns true if the fetch itself succeeded
    pub fn is_fetch_success(&self) -> bool {
        matches!(self, Self::Recorded | Self::ContentMismatch | Self::NoContent)
    }

    /// Returns true if this outcome counts toward the consecutive-failure guard
    ///
    /// Client errors such as 404 are properties of a single URL and do not
    /// count; server errors, network failures and rate limiting do.
    pub fn counts_as_failure(&self, status: Option<u16>) -> bool {
        match self {
            Self::Retried | Self::Failed => true,
            Self::HttpError => status.map_or(true, |code| code >= 500),
            _ => false,
        }
    }

    /// Returns true if the task will not be seen again this run
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Retried | Self::Interrupted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recorded => "recorded",
            Self::ContentMismatch => "content_mismatch",
            Self::NoContent => "no_content",
            Self::HttpError => "http_error",
            Self::Retried => "retried",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
