/// Failure to establish or use a connection held by a [`ConnectionManager`].
///
/// [`ConnectionManager`]: crate::connection::ConnectionManager
#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    #[error("database connection error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("queue connection error: {0}")]
    Queue(#[from] redis::RedisError),
    #[error("timed out connecting to {resource} after {seconds}s")]
    Timeout { resource: &'static str, seconds: u64 },
    #[error("{resource} refused connection: {message}")]
    Refused {
        resource: &'static str,
        message: String,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("flag store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("corrupt flag record {key:?}: {reason}")]
    CorruptRecord { key: String, reason: String },
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} missing, it is required")]
    Missing(&'static str),
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}
