//! Wire-level types for the line protocol.
//!
//! Requests are single lines of text terminated by `\n`. Replies have no
//! length prefix; the framer decides where one ends. A reply is either plain
//! text or a tag-delimited payload, and [`classify`] decides which rendering
//! applies.

use crate::error::MessageError;
use std::borrow::Cow;

/// Line terminator closing every request and, normally, every reply.
pub const TERMINATOR: u8 = b'\n';

/// Default request limit: a 1024-byte input line minus its terminator.
pub const DEFAULT_MAX_INPUT: usize = 1023;

/// A single line of user input, validated for transmission.
///
/// Input is sent byte for byte; it does not have to be valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    bytes: Vec<u8>,
}

impl OutboundMessage {
    /// Validate `line` against the length limit and the no-terminator rule.
    pub fn new(line: impl Into<Vec<u8>>, max_len: usize) -> Result<Self, MessageError> {
        let bytes = line.into();
        if bytes.contains(&TERMINATOR) {
            return Err(MessageError::EmbeddedTerminator);
        }
        if bytes.len() > max_len {
            return Err(MessageError::TooLong {
                len: bytes.len(),
                max: max_len,
            });
        }
        Ok(Self { bytes })
    }

    /// The message without terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lossy text form, for logging.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Bytes to put on the wire: the message followed by one terminator.
    pub fn frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.bytes.len() + 1);
        frame.extend_from_slice(&self.bytes);
        frame.push(TERMINATOR);
        frame
    }
}

/// One complete server reply as assembled by the framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Vec<u8>,
}

impl Payload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Decode as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// How a reply should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// `<command>clear</command>` inside a command response.
    CommandClear,
    /// `<command>models</command>`: current model plus available list.
    CommandModels,
    /// `<command>model_change</command>`.
    CommandModelChange,
    /// A command response with an unrecognized subtype.
    CommandOther,
    /// A model reply carrying `<model>` and `<content>`.
    AiReply,
    /// Starts with `<` but matches nothing above.
    GenericXml,
    /// Does not start with `<`.
    PlainText,
}

/// Classify a reply by substring presence. The first matching rule wins.
pub fn classify(payload: &str) -> ResponseKind {
    if !payload.starts_with('<') {
        return ResponseKind::PlainText;
    }

    if payload.contains("<response>") && payload.contains("<type>command</type>") {
        return if payload.contains("<command>clear</command>") {
            ResponseKind::CommandClear
        } else if payload.contains("<command>models</command>") {
            ResponseKind::CommandModels
        } else if payload.contains("<command>model_change</command>") {
            ResponseKind::CommandModelChange
        } else {
            ResponseKind::CommandOther
        };
    }

    if payload.contains("<model>") && payload.contains("<content>") {
        return ResponseKind::AiReply;
    }

    ResponseKind::GenericXml
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_frame_appends_one_terminator() {
        let msg = OutboundMessage::new("hello", DEFAULT_MAX_INPUT).unwrap();
        assert_eq!(msg.frame(), b"hello\n".to_vec());
        assert_eq!(msg.text(), "hello");
    }

    #[test]
    fn test_message_rejects_terminator() {
        assert_eq!(
            OutboundMessage::new("a\nb", DEFAULT_MAX_INPUT),
            Err(MessageError::EmbeddedTerminator)
        );
    }

    #[test]
    fn test_message_length_limit() {
        assert!(OutboundMessage::new("x".repeat(4), 4).is_ok());
        assert_eq!(
            OutboundMessage::new("x".repeat(5), 4),
            Err(MessageError::TooLong { len: 5, max: 4 })
        );
    }

    #[test]
    fn test_message_keeps_non_utf8_bytes() {
        let msg = OutboundMessage::new(b"caf\xe9".to_vec(), DEFAULT_MAX_INPUT).unwrap();
        assert_eq!(msg.as_bytes(), b"caf\xe9");
        assert_eq!(msg.frame(), b"caf\xe9\n".to_vec());
        assert_eq!(msg.text(), "caf\u{fffd}");
    }

    #[test]
    fn test_empty_message_is_allowed() {
        let msg = OutboundMessage::new("", DEFAULT_MAX_INPUT).unwrap();
        assert_eq!(msg.frame(), b"\n".to_vec());
    }

    #[test]
    fn test_payload_text_is_lossy() {
        let payload = Payload::new(vec![b'o', b'k', 0xff]);
        assert_eq!(payload.text(), "ok\u{fffd}");
        assert_eq!(payload.len(), 3);
    }

    #[test]
    fn test_classify_plain_text() {
        assert_eq!(classify("hello <model>x</model>"), ResponseKind::PlainText);
        assert_eq!(classify(" <response>"), ResponseKind::PlainText);
        assert_eq!(classify(""), ResponseKind::PlainText);
    }

    #[test]
    fn test_classify_command_subtypes() {
        let base = "<response><type>command</type>";
        assert_eq!(
            classify(&format!("{base}<command>clear</command></response>")),
            ResponseKind::CommandClear
        );
        assert_eq!(
            classify(&format!("{base}<command>models</command></response>")),
            ResponseKind::CommandModels
        );
        assert_eq!(
            classify(&format!("{base}<command>model_change</command></response>")),
            ResponseKind::CommandModelChange
        );
        assert_eq!(
            classify(&format!("{base}<command>history</command></response>")),
            ResponseKind::CommandOther
        );
    }

    #[test]
    fn test_classify_command_takes_precedence_over_ai_reply() {
        let payload = "<response><type>command</type><command>models</command>\
                       <available_models><model>a</model></available_models>\
                       <content>x</content></response>";
        assert_eq!(classify(payload), ResponseKind::CommandModels);
    }

    #[test]
    fn test_classify_command_needs_response_wrapper() {
        let payload = "<type>command</type><command>clear</command>";
        assert_eq!(classify(payload), ResponseKind::GenericXml);
    }

    #[test]
    fn test_classify_ai_reply_and_generic() {
        assert_eq!(
            classify("<model>gpt</model><content>hello</content>"),
            ResponseKind::AiReply
        );
        assert_eq!(classify("<status>ok</status>"), ResponseKind::GenericXml);
    }
}
