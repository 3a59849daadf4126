use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Survey already submitted")]
    AlreadySubmitted,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The durable store or the lookup cache could not serve the request
    #[error("dependency unavailable: {0:#}")]
    DependencyUnavailable(#[from] anyhow::Error),
}

pub type PortalResult<T> = Result<T, PortalError>;
