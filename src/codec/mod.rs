//! Storage codec: conversation list <-> compact persisted blob.
//!
//! The blob is the JSON array of conversations, compressed with raw DEFLATE
//! and wrapped in standard base64 so it fits a string-only key-value store.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{ParleyError, Result};
use crate::types::Conversation;

/// Serialize and compress a conversation list.
pub fn encode(conversations: &[Conversation]) -> Result<String> {
    let json = serde_json::to_vec(conversations)?;
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(json.len() / 2), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Invert [`encode`].
///
/// Any failure (bad base64, broken deflate stream, malformed JSON) is
/// reported as [`ParleyError::CorruptData`].
pub fn decode(blob: &str) -> Result<Vec<Conversation>> {
    let compressed = STANDARD
        .decode(blob.trim())
        .map_err(|e| ParleyError::CorruptData(format!("invalid base64: {e}")))?;

    let mut json = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .map_err(|e| ParleyError::CorruptData(format!("invalid compressed stream: {e}")))?;

    serde_json::from_slice(&json)
        .map_err(|e| ParleyError::CorruptData(format!("invalid conversation list: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConversationId, Message};
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<Conversation> {
        let mut first = Conversation::new(ConversationId(1_000), "Conversation 1");
        first.messages.push(Message::user("hi"));
        first
            .messages
            .push(Message::assistant("```rust\nfn main() {}\n```\n**bold** ünïcödé"));
        let second = Conversation::new(ConversationId(2_000), "");
        vec![first, second]
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let conversations = sample();
        let blob = encode(&conversations).unwrap();
        assert_eq!(decode(&blob).unwrap(), conversations);
    }

    #[test]
    fn empty_list_round_trips() {
        let blob = encode(&[]).unwrap();
        assert!(decode(&blob).unwrap().is_empty());
    }

    #[test]
    fn blob_is_smaller_than_json_for_repetitive_history() {
        let mut conv = Conversation::new(ConversationId(1), "Conversation 1");
        for i in 0..500 {
            conv.messages.push(Message::user(format!("message number {i}")));
            conv.messages.push(Message::assistant("the same reply every time"));
        }
        let conversations = vec![conv];
        let json = serde_json::to_string(&conversations).unwrap();
        let blob = encode(&conversations).unwrap();
        assert!(blob.len() < json.len() / 4, "blob {} vs json {}", blob.len(), json.len());
    }

    #[test]
    fn blob_is_string_safe() {
        let blob = encode(&sample()).unwrap();
        assert!(blob
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')));
    }

    #[test]
    fn corrupt_inputs_are_reported_as_corrupt_data() {
        let valid = encode(&sample()).unwrap();
        let truncated = &valid[..valid.len() / 2];
        let plain_json = STANDARD.encode(br#"[{"id":1,"title":"x","messages":[]}]"#);
        let wrong_shape = {
            let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
            enc.write_all(br#"{"not":"a list"}"#).unwrap();
            STANDARD.encode(enc.finish().unwrap())
        };

        for input in ["", "not base64 at all!", truncated, &plain_json, &wrong_shape] {
            match decode(input) {
                Err(ParleyError::CorruptData(_)) => {}
                other => panic!("expected corrupt data for {input:?}, got {other:?}"),
            }
        }
    }
}
