use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayoutError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported source: {0}")]
    Unsupported(String),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("demux error: {0}")]
    Demux(String),

    #[error("payload unavailable for packet on stream {stream_index}")]
    PayloadUnavailable { stream_index: usize },

    #[error("seek error on stream {stream_index}: {reason}")]
    Seek { stream_index: usize, reason: String },
}

impl PlayoutError {
    /// Whether the error only concerns a single packet read.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlayoutError::Io(_) | PlayoutError::Demux(_) | PlayoutError::PayloadUnavailable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PlayoutError>;
