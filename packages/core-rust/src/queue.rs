//! Queue message body and topic/channel naming rules.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Valid topic and channel names: 1 to 64 characters of `[.a-zA-Z0-9_-]`,
/// optionally followed by the `#ephemeral` marker.
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[.a-zA-Z0-9_-]+(#ephemeral)?$").expect("static pattern"));

const MAX_NAME_LEN: usize = 64;

/// Errors from validating topic and channel names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("invalid topic name: {0:?}")]
    Topic(String),
    #[error("invalid channel name: {0:?}")]
    Channel(String),
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_NAME_LEN && NAME_PATTERN.is_match(name)
}

/// A validated topic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicName(String);

impl TopicName {
    /// Validates and wraps a topic name.
    ///
    /// # Errors
    ///
    /// Returns [`NameError::Topic`] if the name breaks the naming rules.
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        if is_valid_name(&name) {
            Ok(Self(name))
        } else {
            Err(NameError::Topic(name))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName(String);

impl ChannelName {
    /// Validates and wraps a channel name.
    ///
    /// # Errors
    ///
    /// Returns [`NameError::Channel`] if the name breaks the naming rules.
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        if is_valid_name(&name) {
            Ok(Self(name))
        } else {
            Err(NameError::Channel(name))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body published by the queue endpoint and read back by the consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_ephemeral_names() {
        assert!(TopicName::new("ini_testing_docker").is_ok());
        assert!(TopicName::new("events.v1-raw").is_ok());
        assert!(ChannelName::new("ini_channel_docker#ephemeral").is_ok());
    }

    #[test]
    fn rejects_bad_names() {
        assert_eq!(TopicName::new(""), Err(NameError::Topic(String::new())));
        assert!(TopicName::new("has space").is_err());
        assert!(TopicName::new("a".repeat(65)).is_err());
        assert!(matches!(ChannelName::new("x#durable"), Err(NameError::Channel(_))));
    }

    #[test]
    fn queue_message_wire_shape() {
        let msg = QueueMessage {
            message: "hello".to_string(),
            id: "42".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({ "message": "hello", "id": "42" }));

        let partial: QueueMessage = serde_json::from_str(r#"{"message":"only"}"#).unwrap();
        assert_eq!(partial.id, "");
    }
}
