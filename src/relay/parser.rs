// Copyright 2026 The Refract Project
// SPDX-License-Identifier: Apache-2.0

// Incremental SSE line splitting and classification.

/// A logical line observed on the upstream stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// A `data:`-prefixed line; payload has the prefix stripped and
    /// surrounding whitespace trimmed.
    Data(String),
    /// Any other line — comments, `event:`/`id:`/`retry:` fields, blank
    /// separators — carried verbatim without its terminator.
    Other(String),
}

/// Restartable incremental splitter over the upstream byte stream.
///
/// Bytes accumulate until a `\n` is seen, so reads split at any boundary
/// — including inside a multi-byte UTF-8 character — reassemble
/// correctly: decoding happens per complete line, and a continuation
/// byte can never be mistaken for the terminator. An unterminated
/// trailing line at end-of-stream is dropped, matching SSE framing.
#[derive(Debug, Default)]
pub struct SseLineParser {
    buf: Vec<u8>,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk, yielding every line it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseLine> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop(); // the '\n'
            if line.last() == Some(&b'\r') {
                line.pop(); // CRLF terminator
            }
            lines.push(classify(&String::from_utf8_lossy(&line)));
        }
        lines
    }
}

fn classify(line: &str) -> SseLine {
    match line.strip_prefix("data:") {
        Some(rest) => SseLine::Data(rest.trim().to_string()),
        None => SseLine::Other(line.to_string()),
    }
}
