use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatRecError {
    #[error("Invalid pattern recognition parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid seed strategy: {0}")]
    InvalidStrategy(String),

    #[error("Invalid tracker layout: {0}")]
    InvalidLayout(String),

    #[error("Hit lists do not match the tracker layout: expected {expected} modules, got {got}")]
    GeometryMismatch { expected: usize, got: usize },
}
