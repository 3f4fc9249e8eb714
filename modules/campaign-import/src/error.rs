use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("basic block file {0} has no 'bb' column")]
    MissingBbColumn(String),
    #[error("malformed remark in discovery {discovery}: {reason}")]
    MalformedRemark { discovery: String, reason: String },
    #[error("'{0}' is not a hex encoded basic block")]
    InvalidHex(String),
    #[error("discovery {0} has no abstract block")]
    MissingAbstractBlock(String),
    #[error("unrecognised start date '{0}'")]
    InvalidDate(String),
    #[error("metrics command '{program}' failed: {status}")]
    MetricsCommand { program: String, status: String },
}
