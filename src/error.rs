/// Failures surfaced by the streaming pipeline.
///
/// `Aborted` is the user-initiated stop and is never reported through the
/// error callback; every other variant is a real failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The stream was cancelled by the consumer.
    #[error("stream aborted")]
    Aborted,
    /// Network or HTTP failure before or during the body read.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
    },
    /// The response declared a content type no decoder understands.
    #[error("unsupported content type '{0}'")]
    UnsupportedContentType(String),
    #[error("frame encode error: {0}")]
    Encode(String),
    #[error("frame decode error: {0}")]
    Decode(String),
    /// The model/tool runtime feeding the producer failed.
    #[error("upstream generation failed: {0}")]
    Upstream(String),
    #[error("transcript store error: {0}")]
    Store(String),
}

impl StreamError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_aborted_is_flagged_as_abort() {
        assert!(StreamError::Aborted.is_aborted());
        assert!(!StreamError::transport("reset").is_aborted());
        assert!(!StreamError::upstream("boom").is_aborted());
    }

    #[test]
    fn test_transport_error_carries_status() {
        let err = StreamError::Transport {
            message: "bad gateway".to_string(),
            status: Some(502),
        };
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.to_string(), "transport error: bad gateway");
        assert_eq!(StreamError::Aborted.status(), None);
    }
}
