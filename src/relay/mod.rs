// Copyright 2026 The Refract Project
// SPDX-License-Identifier: Apache-2.0

// SSE relay
//
// Responsibilities:
// - Split the upstream byte stream into logical SSE lines, tolerating
//   reads split mid-line or mid-codepoint
// - Re-frame each `data:` payload into a chunk envelope, in order
// - Pass every other line through untouched
// - Track the trailing window of recent payloads and emit one summary
//   frame at upstream end-of-data
// - Abort the outbound stream on mid-relay upstream failure

mod engine;
mod parser;
mod recent;

pub use engine::{RelayEngine, RelayError};
pub use parser::{SseLine, SseLineParser};
pub use recent::{RecentEvents, RECENT_EVENT_CAPACITY};
