use thiserror::Error;

/// Failures raised by the abstraction domain and the artifact formats it reads.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid feature value: {0}")]
    InvalidFeature(String),
    #[error("invalid abstract block: {0}")]
    InvalidBlock(String),
    #[error("expansion does not apply: {0}")]
    InvalidExpansion(String),
    #[error("expansion does not refine the current block: {0}")]
    NonRefiningExpansion(String),
    #[error("malformed remark entry: {0}")]
    MalformedRemark(String),
    #[error("cannot decode basic block '{hex}': {reason}")]
    Decode { hex: String, reason: String },
    #[error("cannot parse instruction '{asm}': {reason}")]
    Parse { asm: String, reason: String },
    #[error("unknown isa: {0}")]
    UnknownIsa(String),
    #[error("invalid abstraction config: {0}")]
    Config(String),
}
