use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("duplicate recent event: {0}")]
    DuplicateEvent(String),

    #[error("vehicle not whitelisted: {0}")]
    VehicleNotWhitelisted(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Policy and validation rejections that are reported to the caller as-is.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::DuplicateEvent(_) | Error::VehicleNotWhitelisted(_)
        )
    }

    /// Errors whose message is safe to return to the caller.
    pub fn is_client_error(&self) -> bool {
        self.is_rejection() || matches!(self, Error::NotFound(_) | Error::Authentication(_))
    }
}
