/// Errors originating from the delivery service layer.
///
/// String payloads carry the underlying transport error message. These are
/// human-readable but not structured — callers should treat them as opaque
/// diagnostic text, not match on their content.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryServiceError {
    #[error("Publish error: {0}")]
    PublishError(String),
    #[error("State fetch error: {0}")]
    StateFetchError(String),
    #[error("Malformed packet payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("An unknown error occurred: {0}")]
    Other(anyhow::Error),
}
