use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad caller input (page number) or a malformed monetary field in the feed.
    #[error("invalid input: {message}")]
    Validation { message: String },

    #[error("store error during {op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("store operation {op} timed out after {timeout:?}")]
    StoreTimeout { op: &'static str, timeout: Duration },

    #[error("upstream feed error: {message}")]
    UpstreamFeed { message: String },

    /// Ranking oracle failure; `raw_output` keeps the provider body for diagnostics.
    #[error("ranking oracle error: {detail}")]
    Oracle {
        detail: String,
        raw_output: Option<String>,
    },

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamFeed {
            message: message.into(),
        }
    }

    pub fn oracle(detail: impl Into<String>) -> Self {
        Self::Oracle {
            detail: detail.into(),
            raw_output: None,
        }
    }

    pub(crate) fn store(op: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Store { op, source }
    }
}
