use thiserror::Error;

#[derive(Debug, Error)]
pub enum GlbError {
    #[error("malformed push envelope: {0}")]
    MalformedEnvelope(String),

    #[error("bad base64 payload: {0}")]
    BadEncoding(String),

    #[error("malformed log record: {0}")]
    MalformedRecord(String),

    #[error("bad request url: {0}")]
    BadUrl(String),

    #[error("bad latency: {0}")]
    BadDuration(String),

    #[error("bad span id: {0}")]
    BadSpanId(String),

    #[error("bad trace id: {0}")]
    BadTraceId(String),

    #[error("span sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("ingest error: {0}")]
    Ingest(String),

    #[error("io error: {0}")]
    Io(String),
}

impl GlbError {
    /// Only a refused handoff to the sink is worth a redelivery; every other
    /// kind describes upstream data that will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SinkUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, GlbError>;
