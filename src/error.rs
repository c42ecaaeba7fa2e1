use thiserror::Error;

/// Errors surfaced by the store, router, cluster, and server layers.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("routing error: {0}")]
    Routing(String),

    #[error("key not found")]
    KeyNotFound,

    #[error("key has expired")]
    KeyExpired,

    #[error("relay error: {0}")]
    Relay(String),

    #[error("cluster error: {0}")]
    Cluster(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Clone for DbError {
    fn clone(&self) -> Self {
        match self {
            DbError::Io(e) => DbError::Internal(e.to_string()),
            DbError::Protocol(s) => DbError::Protocol(s.clone()),
            DbError::Routing(s) => DbError::Routing(s.clone()),
            DbError::KeyNotFound => DbError::KeyNotFound,
            DbError::KeyExpired => DbError::KeyExpired,
            DbError::Relay(s) => DbError::Relay(s.clone()),
            DbError::Cluster(s) => DbError::Cluster(s.clone()),
            DbError::Unavailable(s) => DbError::Unavailable(s.clone()),
            DbError::InvalidArgument(s) => DbError::InvalidArgument(s.clone()),
            DbError::Configuration(s) => DbError::Configuration(s.clone()),
            DbError::Internal(s) => DbError::Internal(s.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
