//! Visitor counter payload.

use serde::{Deserialize, Serialize};

/// Response payload for the visitor counter, serialized as `{"Visitor": n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorCount {
    #[serde(rename = "Visitor")]
    pub visitor: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_visitor_object() {
        let json = serde_json::to_string(&VisitorCount { visitor: 5 }).unwrap();
        assert_eq!(json, r#"{"Visitor":5}"#);
    }
}
