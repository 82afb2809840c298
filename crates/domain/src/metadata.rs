//! Typed order metadata.
//!
//! The known extension points are first-class fields; anything else a
//! collaborator attaches rides along in the pass-through bag and is
//! preserved verbatim on writes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Machine-readable cancel reason written by the abandoned-cart reaper.
pub const CANCEL_REASON_ABANDONED_CART: &str = "ABANDONED_CART";

/// Opaque order metadata with known extension points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderMetadata {
    /// Why the order was cancelled, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,

    /// Whether the abandoned-cart reminder has been delivered.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reminder_email_sent: bool,

    /// Unrecognized keys, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderMetadata {
    /// Returns true if no metadata has been recorded.
    pub fn is_empty(&self) -> bool {
        self.cancel_reason.is_none() && !self.reminder_email_sent && self.extra.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_are_preserved() {
        let json = r#"{"cancel_reason":"fraud","source":"mobile"}"#;
        let meta: OrderMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.cancel_reason.as_deref(), Some("fraud"));
        assert_eq!(meta.extra.get("source"), Some(&Value::String("mobile".into())));

        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["source"], "mobile");
    }

    #[test]
    fn reminder_flag_roundtrip() {
        let mut meta = OrderMetadata::default();
        assert!(meta.is_empty());

        meta.reminder_email_sent = true;
        let back: OrderMetadata =
            serde_json::from_value(serde_json::to_value(&meta).unwrap()).unwrap();
        assert!(back.reminder_email_sent);
    }

    #[test]
    fn empty_metadata_serializes_to_empty_object() {
        let meta = OrderMetadata::default();
        assert_eq!(serde_json::to_string(&meta).unwrap(), "{}");
    }
}
