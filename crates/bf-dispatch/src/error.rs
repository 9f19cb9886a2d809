use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    /// Zero pool weight, inconsistent rule data, empty broker set
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown member or broker
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// Payload could not be encoded. Only affects one recipient.
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store write error: {0}")]
    Store(String),

    #[error("Publish error: {0}")]
    Publish(String),
}

impl From<serde_json::Error> for DispatchError {
    fn from(e: serde_json::Error) -> Self {
        DispatchError::Serialization(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for DispatchError {
    fn from(e: redis::RedisError) -> Self {
        DispatchError::Store(e.to_string())
    }
}

impl DispatchError {
    /// Precondition failures are raised before any recipient is touched
    pub fn is_precondition(&self) -> bool {
        matches!(self, DispatchError::Config(_) | DispatchError::Lookup(_))
    }
}
