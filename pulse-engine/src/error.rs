use thiserror::Error;

/// Errors raised by a [`KeyValueStore`](crate::store::KeyValueStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failure for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode or decode stored value for key {key}: {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid store key: {0}")]
    InvalidKey(String),
}

/// All errors generated at the edges of `pulse-engine`.
///
/// The tick pipeline itself never fails; these cover persistence, export and feeds.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("persistence: {0}")]
    Store(#[from] StoreError),

    #[error("export serialisation failed: {0}")]
    Export(#[from] serde_json::Error),

    #[error("feed I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed feed record at line {line}: {reason}")]
    Feed { line: usize, reason: String },
}

impl EngineError {
    /// Determine if the error means the feed can no longer produce ticks.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_terminal(&self) -> bool {
        match self {
            EngineError::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_is_terminal() {
        struct TestCase {
            input: EngineError,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: feed I/O failure ends the stream
                input: EngineError::Io(std::io::Error::other("pipe closed")),
                expected: true,
            },
            TestCase {
                // TC1: a single malformed line is skippable
                input: EngineError::Feed {
                    line: 3,
                    reason: "expected value".to_string(),
                },
                expected: false,
            },
            TestCase {
                // TC2: store failures never stop the feed
                input: EngineError::Store(StoreError::InvalidKey("../x".to_string())),
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.is_terminal();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
