//! Common error types for the link engine and its driver backends

/// Result type alias for link operations
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// Backend-agnostic error type.
///
/// Driver-specific failure codes are folded into a small stable set of
/// categories; the raw driver message is preserved in [`LinkError::Driver`].
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Operation on a link that was never opened or already closed
    #[error("device not opened")]
    NotOpened,

    /// The underlying driver handle is no longer valid
    #[error("invalid device handle")]
    InvalidHandle,

    /// I/O error from the operating system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The driver ran out of buffers or descriptors
    #[error("insufficient resources")]
    InsufficientResources,

    /// A caller-supplied argument was rejected
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Deadline expired before the operation completed.
    ///
    /// `transferred` is the number of bytes moved before expiry. For
    /// exact-count receives those bytes are already in the caller's buffer;
    /// pattern reads discard them, while line reads keep them buffered for
    /// the next call.
    #[error("timed out after {transferred} bytes")]
    Timeout { transferred: usize },

    /// Device dropped off the bus mid-transfer
    #[error("device disconnected")]
    Disconnected,

    /// Unmapped backend-specific error
    #[error("driver error: {0}")]
    Driver(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LinkError {
    /// True for deadline expiry, regardless of how many bytes moved first.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout { .. })
    }

    /// Bytes transferred before the failure, when the error tracks that.
    pub fn transferred(&self) -> usize {
        match self {
            LinkError::Timeout { transferred } => *transferred,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_predicate() {
        assert!(LinkError::Timeout { transferred: 3 }.is_timeout());
        assert!(!LinkError::Disconnected.is_timeout());
    }

    #[test]
    fn transferred_count_travels_in_error() {
        assert_eq!(LinkError::Timeout { transferred: 17 }.transferred(), 17);
        assert_eq!(LinkError::NotOpened.transferred(), 0);
    }

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(LinkError::NotOpened.to_string(), "device not opened");
        assert_eq!(
            LinkError::Timeout { transferred: 5 }.to_string(),
            "timed out after 5 bytes"
        );
    }
}
