use std::path::PathBuf;

/// Result alias that carries the crate-level [`TunevizError`] type.
pub type Result<T> = std::result::Result<T, TunevizError>;

/// Result alias for decoded audio sources.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Result alias for the playback engine.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Result alias for audio output backends.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Top-level error type used by the application crate.
#[derive(Debug, thiserror::Error)]
pub enum TunevizError {
    /// Free-form message for conditions that have no dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TunevizError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for TunevizError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for TunevizError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

/// Failures reported by a decoded audio source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The container or codec cannot be handled.
    #[error("unsupported audio: {0}")]
    Unsupported(String),
    /// The stream was readable but a packet could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<symphonia::core::errors::Error> for SourceError {
    fn from(value: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error;

        match value {
            Error::IoError(err) => Self::Io(err),
            Error::Unsupported(what) => Self::Unsupported(what.to_string()),
            Error::DecodeError(what) => Self::Decode(what.to_string()),
            other => Self::Decode(other.to_string()),
        }
    }
}

/// Failures reported by an audio output backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("audio device error: {0}")]
    Device(String),
    #[error("failed to build output stream: {0}")]
    StreamBuild(String),
    #[error("failed to start output stream: {0}")]
    StreamPlay(String),
}

/// Failures reported by the playback engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The track could not be opened or its format was not recognised.
    #[error("failed to load `{path}`: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: SourceError,
    },
    #[error("no track is loaded")]
    NoTrack,
    /// A mid-stream read failure on the decode thread.
    #[error("decode failed: {0}")]
    Decode(#[from] SourceError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The decode thread did not exit within its join bound.
    #[error("decode thread did not stop within {0} ms")]
    ThreadJoinTimeout(u64),
    #[error("failed to spawn decode thread: {0}")]
    Spawn(std::io::Error),
}

/// Failures while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is outside its accepted range.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_mentions_path() {
        let err = EngineError::Load {
            path: PathBuf::from("missing.flac"),
            source: SourceError::Unsupported("no audio track".into()),
        };

        let message = err.to_string();
        assert!(message.contains("missing.flac"));
        assert!(message.contains("no audio track"));
    }

    #[test]
    fn engine_errors_wrap_into_crate_error() {
        let err: TunevizError = EngineError::NoTrack.into();
        assert!(matches!(err, TunevizError::Engine(EngineError::NoTrack)));
    }
}
