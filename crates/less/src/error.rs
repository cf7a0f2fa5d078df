use livedev_protocol::AnalyzerFailure;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LessError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LessError {
    #[error("unterminated comment starting on line {line}")]
    UnterminatedComment { line: usize },

    #[error("unterminated string starting on line {line}")]
    UnterminatedString { line: usize },

    #[error("unbalanced '}}' on line {line}")]
    UnbalancedBrace { line: usize },

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl From<LessError> for AnalyzerFailure {
    fn from(err: LessError) -> Self {
        AnalyzerFailure::parse(err.to_string())
    }
}
