use thiserror::Error;

/// Top-level error type of a page composition.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("template not found: {name}")]
    TemplateNotFound { name: String },

    #[error("template fetch failed: {reason}")]
    TemplateFetch { reason: String },

    #[error("primary fragment failed: {source}")]
    PrimaryFragment {
        #[from]
        source: FragmentError,
    },

    /// Any fragment failure fails a bot-guarded request, since crawlers must
    /// never index a partial page.
    #[error("fragment failed during guarded request: {source}")]
    Guarded { source: FragmentError },

    /// A cut/restore mismatch in the region cutter. Always a caller bug:
    /// either a cutter instance was reused across templates or the segment
    /// sequence was corrupted. Never suppress this.
    #[error("no ignored part #{index} recorded for the current template")]
    Restore { index: usize },

    #[error("response stream failed: {reason}")]
    Stream { reason: String },
}

impl ComposeError {
    /// The body text shown to the client when this error aborts a request
    /// before the head was flushed.
    pub fn presentable(&self) -> &str {
        match self {
            Self::TemplateNotFound { .. } => "Page not found",
            _ => "Internal Server Error",
        }
    }

    pub fn stream<S: ToString>(reason: S) -> Self {
        Self::Stream { reason: reason.to_string() }
    }
}

/// Why a single fragment failed. Non-primary fragment failures are isolated
/// to the fragment's own region; a primary failure aborts the request.
#[derive(Debug, Clone, Error)]
pub enum FragmentError {
    #[error("fragment responded with status {status}")]
    Status { status: http::StatusCode },

    #[error("fragment timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("fragment transport error: {reason}")]
    Transport { reason: String },
}

impl FragmentError {
    pub fn transport<S: ToString>(reason: S) -> Self {
        Self::Transport { reason: reason.to_string() }
    }
}

/// Error contract of the template fetch collaborator. `NotFound` is kept
/// distinct so the default error page can say so.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found: {name}")]
    NotFound { name: String },

    #[error("{reason}")]
    Fetch { reason: String },
}

impl TemplateError {
    pub fn fetch<S: ToString>(reason: S) -> Self {
        Self::Fetch { reason: reason.to_string() }
    }
}

impl From<TemplateError> for ComposeError {
    fn from(value: TemplateError) -> Self {
        match value {
            TemplateError::NotFound { name } => Self::TemplateNotFound { name },
            TemplateError::Fetch { reason } => Self::TemplateFetch { reason },
        }
    }
}
