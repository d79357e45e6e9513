use thiserror::Error;

pub type Result<T> = std::result::Result<T, FabricError>;

#[derive(Error, Debug)]
pub enum FabricError {
    #[error("invalid registration: {0}")]
    Validation(String),

    #[error("no lease for {service}/{instance}")]
    LeaseNotFound { service: String, instance: String },

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
