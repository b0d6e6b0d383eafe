//! Translation between chat socket frames and typed values.

use crate::error::DecodeError;
use crate::models::{Envelope, OutgoingMessage};

/// Longest slice of an offending payload kept in a [`DecodeError`].
const MAX_ECHOED_PAYLOAD: usize = 200;

/// Encodes user text as the `{"content": ...}` frame the server expects.
pub fn encode(text: &str) -> String {
    let frame = OutgoingMessage { content: text.to_string() };
    // A struct with a single string field always serializes.
    serde_json::to_string(&frame).unwrap_or_else(|_| String::from("{\"content\":\"\"}"))
}

/// Parses a text frame into an [`Envelope`].
pub fn decode(raw: &str) -> Result<Envelope, DecodeError> {
    serde_json::from_str::<Envelope>(raw).map_err(|e| DecodeError {
        reason: e.to_string(),
        payload: truncate(raw),
    })
}

fn truncate(raw: &str) -> String {
    if raw.chars().count() > MAX_ECHOED_PAYLOAD {
        format!("{}…", raw.chars().take(MAX_ECHOED_PAYLOAD).collect::<String>())
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FinalMessage;

    #[test]
    fn encodes_content_field() {
        assert_eq!(encode("hello"), r#"{"content":"hello"}"#);
    }

    #[test]
    fn encodes_quotes_and_newlines() {
        let frame: serde_json::Value = serde_json::from_str(&encode("say \"hi\"\nbye")).unwrap();
        assert_eq!(frame["content"], "say \"hi\"\nbye");
    }

    #[test]
    fn decodes_start_without_id() {
        assert_eq!(
            decode(r#"{"type":"assistant_start"}"#).unwrap(),
            Envelope::AssistantStart { message_id: None }
        );
    }

    #[test]
    fn decodes_start_with_id() {
        assert_eq!(
            decode(r#"{"type":"assistant_start","message_id":"msg-7"}"#).unwrap(),
            Envelope::AssistantStart { message_id: Some("msg-7".into()) }
        );
    }

    #[test]
    fn decodes_end_and_ignores_extra_fields() {
        let raw = r#"{"type":"assistant_end","message":{"id":"m1","chat_id":"c1","role":"assistant","content":"Hello!","timestamp":"T"}}"#;
        assert_eq!(
            decode(raw).unwrap(),
            Envelope::AssistantEnd {
                message: FinalMessage {
                    id: "m1".into(),
                    content: "Hello!".into(),
                    timestamp: "T".into(),
                },
            }
        );
    }

    #[test]
    fn decodes_user_echo_with_and_without_payload() {
        assert_eq!(
            decode(r#"{"type":"user_message"}"#).unwrap(),
            Envelope::UserMessage { message: None }
        );
        let echoed = decode(
            r#"{"type":"user_message","message":{"id":"u1","chat_id":"c1","role":"user","content":"hi","timestamp":"T"}}"#,
        )
        .unwrap();
        assert_eq!(echoed.kind(), "user_message");
    }

    #[test]
    fn rejects_unknown_type() {
        let err = decode(r#"{"type":"typing"}"#).unwrap_err();
        assert!(err.payload.contains("typing"));
    }

    #[test]
    fn rejects_chunk_without_content() {
        assert!(decode(r#"{"type":"assistant_chunk"}"#).is_err());
    }

    #[test]
    fn rejects_non_json() {
        assert!(decode("not json").is_err());
    }

    #[test]
    fn truncates_long_payloads_in_errors() {
        let raw = "x".repeat(1000);
        let err = decode(&raw).unwrap_err();
        assert_eq!(err.payload.chars().count(), MAX_ECHOED_PAYLOAD + 1);
    }
}
