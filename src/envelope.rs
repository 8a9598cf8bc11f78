// Copyright 2026 The Refract Project
// SPDX-License-Identifier: Apache-2.0

// Completion envelopes
//
// Every response leaving the proxy — buffered or streamed — is wrapped in
// a fixed chat-completion shape. The two forms are separate typed structs
// tagged by `object` kind, so a full-message choice and a delta choice
// cannot be mixed up at compile time.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Discriminates the two envelope forms on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    #[serde(rename = "chat.completion")]
    Completion,
    #[serde(rename = "chat.completion.chunk")]
    Chunk,
}

/// Placeholder token accounting.
///
/// Never computed from content — the counters are fixed per route and
/// configurable (see `config::DEFAULT_STREAM_USAGE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub const ZERO: Usage = Usage {
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
    };
}

/// Buffered form: one full assistant message, `object = "chat.completion"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEnvelope {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub object: ObjectKind,
    pub created: i64,
    pub choices: Vec<MessageChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageChoice {
    pub logprobs: Option<serde_json::Value>,
    pub finish_reason: Option<String>,
    pub native_finish_reason: Option<String>,
    pub index: u32,
    pub message: AssistantMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
    pub refusal: Option<serde_json::Value>,
    pub reasoning: Option<serde_json::Value>,
}

/// Incremental form: one delta, `object = "chat.completion.chunk"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEnvelope {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub object: ObjectKind,
    pub created: i64,
    pub choices: Vec<DeltaChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
    pub native_finish_reason: Option<String>,
    pub logprobs: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub role: String,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Formatter
// ---------------------------------------------------------------------------

/// Builds envelopes for one route.
///
/// Pure value-to-value transforms; the only ambient inputs are the wall
/// clock (`created`) and the id randomness. Every emission gets a fresh
/// id, distinct even within one clock tick.
#[derive(Debug, Clone)]
pub struct Formatter {
    provider: String,
    model: String,
    usage: Usage,
}

impl Formatter {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, usage: Usage) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            usage,
        }
    }

    /// Envelope for a fully-buffered upstream JSON payload.
    ///
    /// The payload is carried JSON-serialized inside `message.content`,
    /// not inlined as structure.
    pub fn buffered(&self, payload: &serde_json::Value) -> CompletionEnvelope {
        let created = Utc::now().timestamp();
        CompletionEnvelope {
            id: fresh_id(created),
            provider: self.provider.clone(),
            model: self.model.clone(),
            object: ObjectKind::Completion,
            created,
            choices: vec![MessageChoice {
                logprobs: None,
                finish_reason: Some("stop".to_string()),
                native_finish_reason: Some("stop".to_string()),
                index: 0,
                message: AssistantMessage {
                    role: "assistant".to_string(),
                    content: payload.to_string(),
                    refusal: None,
                    reasoning: None,
                },
            }],
            usage: self.usage,
        }
    }

    /// Envelope for one re-framed stream event. Never terminal.
    pub fn chunk(&self, text: &str) -> ChunkEnvelope {
        self.delta_envelope(text.to_string(), None)
    }

    /// Terminal envelope summarizing the trailing event window.
    ///
    /// Joins the payloads (oldest first, at most the window capacity)
    /// with newlines. Callers only invoke this for a non-empty window.
    pub fn final_chunk(&self, events: &[String]) -> ChunkEnvelope {
        self.delta_envelope(events.join("\n"), Some("stop"))
    }

    fn delta_envelope(&self, content: String, finish_reason: Option<&str>) -> ChunkEnvelope {
        let created = Utc::now().timestamp();
        ChunkEnvelope {
            id: fresh_id(created),
            provider: self.provider.clone(),
            model: self.model.clone(),
            object: ObjectKind::Chunk,
            created,
            choices: vec![DeltaChoice {
                index: 0,
                delta: Delta {
                    role: "assistant".to_string(),
                    content,
                },
                finish_reason: finish_reason.map(str::to_string),
                native_finish_reason: finish_reason.map(str::to_string),
                logprobs: None,
            }],
            usage: self.usage,
        }
    }
}

/// `gen-<epoch-secs>-<random>`. The uuid suffix keeps ids distinct even
/// when two envelopes are stamped within the same second.
fn fresh_id(created: i64) -> String {
    format!("gen-{created}-{}", Uuid::new_v4().simple())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn formatter() -> Formatter {
        Formatter::new("Chutes", "deepseek/deepseek-r1:free", Usage::ZERO)
    }

    #[test]
    fn buffered_envelope_carries_serialized_payload() {
        let payload = json!({"answer": 42});
        let envelope = formatter().buffered(&payload);

        assert_eq!(envelope.object, ObjectKind::Completion);
        assert_eq!(envelope.provider, "Chutes");
        assert_eq!(envelope.model, "deepseek/deepseek-r1:free");
        assert_eq!(envelope.choices.len(), 1);

        let choice = &envelope.choices[0];
        assert_eq!(choice.finish_reason.as_deref(), Some("stop"));
        assert_eq!(choice.native_finish_reason.as_deref(), Some("stop"));
        assert_eq!(choice.index, 0);
        assert_eq!(choice.message.role, "assistant");
        // Content is the serialized payload, not inlined structure.
        assert_eq!(choice.message.content, payload.to_string());
    }

    #[test]
    fn chunk_envelope_is_not_terminal() {
        let envelope = formatter().chunk("hello");

        assert_eq!(envelope.object, ObjectKind::Chunk);
        let choice = &envelope.choices[0];
        assert_eq!(choice.delta.content, "hello");
        assert_eq!(choice.delta.role, "assistant");
        assert_eq!(choice.finish_reason, None);
        assert_eq!(choice.native_finish_reason, None);
    }

    #[test]
    fn final_chunk_joins_events_and_stops() {
        let events = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let envelope = formatter().final_chunk(&events);

        let choice = &envelope.choices[0];
        assert_eq!(choice.delta.content, "a\nb\nc");
        assert_eq!(choice.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn usage_counters_come_from_construction() {
        let usage = Usage {
            prompt_tokens: 3134,
            completion_tokens: 500,
            total_tokens: 3634,
        };
        let formatter = Formatter::new("Chutes", "m", usage);

        assert_eq!(formatter.chunk("x").usage, usage);
        assert_eq!(formatter.buffered(&json!(null)).usage, usage);
    }

    #[test]
    fn ids_are_distinct_within_one_tick() {
        let formatter = formatter();
        let a = formatter.chunk("x");
        let b = formatter.chunk("x");

        assert!(a.id.starts_with("gen-"), "id format: {}", a.id);
        assert_ne!(a.id, b.id, "two emissions in the same tick must differ");
    }

    #[test]
    fn object_kind_serializes_to_wire_names() {
        let chunk = serde_json::to_value(formatter().chunk("x")).unwrap();
        assert_eq!(chunk["object"], "chat.completion.chunk");

        let buffered = serde_json::to_value(formatter().buffered(&json!({}))).unwrap();
        assert_eq!(buffered["object"], "chat.completion");
    }

    #[test]
    fn null_fields_are_serialized_explicitly() {
        let value = serde_json::to_value(formatter().chunk("x")).unwrap();
        let choice = &value["choices"][0];

        // Present-and-null, matching the wire contract.
        assert!(choice["finish_reason"].is_null());
        assert!(choice["native_finish_reason"].is_null());
        assert!(choice["logprobs"].is_null());
    }
}
