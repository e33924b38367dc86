use async_trait::async_trait;
use stackdemo_core::QueueMessage;
use tracing::{info, warn};

use super::consumer::MessageHandler;
use super::protocol::NsqMessage;

/// Logs each `{message, id}` payload from the demo topic.
///
/// Bodies that are not valid JSON are logged and finished rather than
/// requeued, since redelivery cannot fix them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleProcess;

impl SimpleProcess {
    /// Decodes a message body. Missing fields decode as empty strings.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the body is not a JSON object.
    pub fn decode(body: &[u8]) -> Result<QueueMessage, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

#[async_trait]
impl MessageHandler for SimpleProcess {
    async fn handle(&self, message: &NsqMessage) -> anyhow::Result<()> {
        match Self::decode(&message.body) {
            Ok(decoded) => info!(
                nsq_id = %message.id,
                queue.message = %decoded.message,
                queue.id = %decoded.id,
                "This is from NSQ"
            ),
            Err(e) => warn!(nsq_id = %message.id, error = %e, "dropping undecodable message"),
        }
        Ok(())
    }
}
