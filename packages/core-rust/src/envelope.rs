//! Uniform JSON envelope wrapped around every API response.
//!
//! Field names are part of the public wire contract and never change:
//! `server_process_time`, `message_error`, `message_status`, `data`.
//! Empty message lists and an absent payload are left out of the output.

use serde::{Deserialize, Serialize};

/// The response body shape shared by all enveloped endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Wall time spent in the domain handler, formatted by
    /// [`format_duration`](crate::format_duration). Always populated.
    #[serde(rename = "server_process_time")]
    pub processing_duration: String,
    /// Client-facing error messages, in the order they were raised.
    #[serde(rename = "message_error", default, skip_serializing_if = "Vec::is_empty")]
    pub error_messages: Vec<String>,
    /// Informational messages attached by the handler.
    #[serde(rename = "message_status", default, skip_serializing_if = "Vec::is_empty")]
    pub status_messages: Vec<String>,
    /// The handler's payload, if it produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Envelope {
    /// Creates an envelope carrying only the processing duration.
    #[must_use]
    pub fn new(processing_duration: impl Into<String>) -> Self {
        Self {
            processing_duration: processing_duration.into(),
            ..Self::default()
        }
    }

    /// Appends a client-facing error message.
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.error_messages.push(message.into());
    }

    /// Appends an informational status message.
    pub fn push_status(&mut self, message: impl Into<String>) {
        self.status_messages.push(message.into());
    }

    /// Returns `true` when the envelope carries at least one error message.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.error_messages.is_empty()
    }

    /// Serializes the envelope to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
