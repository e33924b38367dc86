/// Plain-text body returned by `/ping`.
pub const PING_RESPONSE: &str = "Hello World !!";

/// Liveness check for humans: answers any method with plain text, outside
/// the envelope.
pub async fn ping_handler() -> &'static str {
    PING_RESPONSE
}
