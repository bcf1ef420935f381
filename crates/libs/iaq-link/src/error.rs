/// Conditions reported by the messaging stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("no message buffers available")]
    NoBufs,

    #[error("transport busy")]
    Busy,

    #[error("no response before the exchange timed out")]
    ResponseTimeout,

    #[error("peer reset the exchange")]
    Reset,

    #[error("malformed message")]
    Parse,

    #[error("operation invalid in current state")]
    InvalidState,
}

/// Fatal Delivery Client failures. Neither consumes retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("failed to allocate request message: {0}")]
    Allocation(TransportError),

    #[error("failed to build request message: {0}")]
    Build(TransportError),
}

/// Rejected delivery configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_retries must be between 1 and {max}, got {got}")]
    RetryCeiling { got: u8, max: u8 },

    #[error("resource path must not be empty")]
    EmptyResourcePath,
}
