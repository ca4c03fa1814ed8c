//! Domain error types.

/// Top-level error type for barbacktest.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no candles for {symbol}")]
    NoData { symbol: String },

    #[error("candle {index} is earlier than the candle before it")]
    UnorderedCandles { index: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        EngineError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(section: &str, key: &str) -> Self {
        EngineError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

/// Failure talking to a decision oracle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error("oracle returned unknown action {action:?}")]
    UnknownAction { action: String },

    #[error("oracle unavailable: {reason}")]
    Unavailable { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_invalid_message() {
        let err = EngineError::invalid("risk", "risk_fraction", "must be positive");
        assert_eq!(
            err.to_string(),
            "invalid config value [risk] risk_fraction: must be positive"
        );
    }

    #[test]
    fn config_missing_message() {
        let err = EngineError::missing("signal", "confidence_threshold");
        assert_eq!(
            err.to_string(),
            "missing config key [signal] confidence_threshold"
        );
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[test]
    fn oracle_timeout_message() {
        let err = OracleError::Timeout { millis: 250 };
        assert_eq!(err.to_string(), "oracle timed out after 250 ms");
    }
}
