//! Error types for message decoding and transition handling

/// Errors that cause an incoming message to be dropped.
///
/// Everything except `UnknownEvent` is a decode failure; `UnknownEvent` is a
/// protocol violation in an otherwise well-formed transition.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// Payload bytes are not UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Payload is not JSON, or a field has the wrong type.
    #[error("unable to parse payload as JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A field required for this message type is absent.
    #[error("{kind} message is missing required field `{field}`")]
    MissingField { kind: &'static str, field: &'static str },

    /// Topic does not have the `<ns>/<host>/<device>` shape.
    #[error("topic `{0}` has fewer than 3 segments")]
    InvalidTopic(String),

    /// Transition `event` is neither `enter` nor `leave`.
    #[error("misformatted transition message, event={0}")]
    UnknownEvent(String),
}

impl PresenceError {
    /// True for protocol errors, false for decode errors
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::UnknownEvent(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(PresenceError::UnknownEvent("bogus".to_string()).is_protocol());
        assert!(!PresenceError::InvalidTopic("a/b".to_string()).is_protocol());
        assert!(!PresenceError::MissingField { kind: "location", field: "lat" }.is_protocol());
    }

    #[test]
    fn test_display() {
        let err = PresenceError::MissingField { kind: "transition", field: "desc" };
        assert_eq!(err.to_string(), "transition message is missing required field `desc`");
        let err = PresenceError::UnknownEvent("wander".to_string());
        assert_eq!(err.to_string(), "misformatted transition message, event=wander");
    }
}
