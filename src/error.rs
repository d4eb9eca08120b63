//! Error types and handling for Kestrel

/// Result type alias for Kestrel operations
pub type Result<T> = std::result::Result<T, KestrelError>;

/// Error types for the Kestrel topic broker
///
/// All broker failures are local and recoverable: a failed publish this cycle
/// does not corrupt node state and a retry next cycle is expected to succeed.
/// Internal consistency violations (existence registry and node directory
/// disagreeing) are not surfaced here; they are broker defects and assert.
#[derive(Debug, thiserror::Error)]
pub enum KestrelError {
    /// Payload ring could not be allocated on first publish.
    ///
    /// The node remains valid and the allocation is retried on the next
    /// publish call.
    #[error("Allocation failure: could not allocate {requested} bytes for payload ring")]
    Allocation { requested: usize },

    /// Advertise/subscribe called with an unknown or malformed descriptor
    #[error("Invalid descriptor: {message}")]
    InvalidDescriptor { message: String },

    /// A new instance was requested but the per-topic instance cap is reached
    #[error("Instance exhausted: all {max} instances of '{topic}' are advertised")]
    InstanceExhausted { topic: String, max: usize },

    /// Queue depth change rejected (ring already allocated, shrink, or cap)
    #[error("Queue resize rejected: {message}")]
    QueueResize { message: String },

    /// Invalid parameters or arguments
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },
}

impl KestrelError {
    /// Create an allocation error for a failed payload ring allocation
    pub fn allocation(requested: usize) -> Self {
        Self::Allocation { requested }
    }

    /// Create an invalid descriptor error
    pub fn invalid_descriptor(message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            message: message.into(),
        }
    }

    /// Create an instance exhausted error
    pub fn instance_exhausted(topic: impl Into<String>, max: usize) -> Self {
        Self::InstanceExhausted {
            topic: topic.into(),
            max,
        }
    }

    /// Create a queue resize error
    pub fn queue_resize(message: impl Into<String>) -> Self {
        Self::QueueResize {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Whether the failed operation is expected to succeed on retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Allocation { .. })
    }
}
