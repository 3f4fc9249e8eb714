use absdisc_core::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("witness trace: {0}")]
    Format(String),
    #[error("step {step} records no expansion")]
    MissingExpansion { step: usize },
    #[error("step {step}: {source}")]
    Step {
        step: usize,
        #[source]
        source: DomainError,
    },
    #[error(transparent)]
    Domain(#[from] DomainError),
}
