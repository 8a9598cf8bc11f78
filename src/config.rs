// Copyright 2026 The Refract Project
// SPDX-License-Identifier: Apache-2.0

// Runtime configuration
//
// Everything has a default; the YAML file is optional. The proxied target
// URL is never configured here — it is caller-supplied per request.

use std::path::PathBuf;

use serde::Deserialize;

use crate::envelope::Usage;

// ---------------------------------------------------------------------------
// Typed config
// ---------------------------------------------------------------------------

/// Envelope labels stamped on one route's responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLabels {
    pub provider: String,
    pub model: String,
}

/// Upstream HTTP client tuning.
///
/// Both timeouts default to none; setting them bounds connect/read
/// stalls on slow upstreams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Labels for `/proxy` responses.
    pub buffered: RouteLabels,
    /// Labels for `/proxy/stream` responses, including the non-SSE fallback.
    pub stream: RouteLabels,
    /// Placeholder usage counters stamped on streaming-route envelopes.
    pub stream_usage: Usage,
    pub upstream: UpstreamConfig,
    /// Outbound frame buffer between the relay pump and the client.
    pub relay_channel_capacity: usize,
}

pub const DEFAULT_RELAY_CHANNEL_CAPACITY: usize = 64;

/// Placeholder counters stamped on every stream-route envelope.
/// Never computed from content.
pub const DEFAULT_STREAM_USAGE: Usage = Usage {
    prompt_tokens: 3134,
    completion_tokens: 500,
    total_tokens: 3634,
};

impl Default for Config {
    fn default() -> Self {
        Self {
            buffered: RouteLabels {
                provider: "ProxyService".to_string(),
                model: "proxy".to_string(),
            },
            stream: RouteLabels {
                provider: "Chutes".to_string(),
                model: "deepseek/deepseek-r1:free".to_string(),
            },
            stream_usage: DEFAULT_STREAM_USAGE,
            upstream: UpstreamConfig::default(),
            relay_channel_capacity: DEFAULT_RELAY_CHANNEL_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// All errors that can occur during config loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config source: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Abstraction over where config YAML comes from.
///
/// `FileSource` reads from disk; `StringSource` provides content directly
/// (used in tests to avoid file I/O).
pub trait ConfigSource {
    fn load(&self) -> Result<String, ConfigError>;
}

/// Loads config from a file on disk.
pub struct FileSource {
    pub path: PathBuf,
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<String, ConfigError> {
        Ok(std::fs::read_to_string(&self.path)?)
    }
}

/// Provides config content directly as a string. Used for testing.
pub struct StringSource {
    pub content: String,
}

impl ConfigSource for StringSource {
    fn load(&self) -> Result<String, ConfigError> {
        Ok(self.content.clone())
    }
}

// ---------------------------------------------------------------------------
// Raw deserialization types
// ---------------------------------------------------------------------------

// Every field is optional so a partial file only overrides what it names.

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    buffered: Option<RawLabels>,
    #[serde(default)]
    stream: Option<RawStream>,
    #[serde(default)]
    upstream: Option<RawUpstream>,
    #[serde(default)]
    relay: Option<RawRelay>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLabels {
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStream {
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUpstream {
    #[serde(default)]
    connect_timeout_ms: Option<u64>,
    #[serde(default)]
    read_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRelay {
    #[serde(default)]
    channel_capacity: Option<usize>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load and validate a config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source (empty content means all defaults)
/// 2. Parse into raw optional-field types
/// 3. Overlay onto `Config::default()`
/// 4. Validate labels, timeouts, and channel capacity
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;

    let mut config = Config::default();
    if !raw_yaml.trim().is_empty() {
        let raw: RawConfig = serde_yaml::from_str(&raw_yaml)?;
        overlay(&mut config, raw);
    }

    validate(&config)?;
    Ok(config)
}

fn overlay(config: &mut Config, raw: RawConfig) {
    if let Some(labels) = raw.buffered {
        if let Some(provider) = labels.provider {
            config.buffered.provider = provider;
        }
        if let Some(model) = labels.model {
            config.buffered.model = model;
        }
    }

    if let Some(stream) = raw.stream {
        if let Some(provider) = stream.provider {
            config.stream.provider = provider;
        }
        if let Some(model) = stream.model {
            config.stream.model = model;
        }
        if let Some(usage) = stream.usage {
            if let Some(n) = usage.prompt_tokens {
                config.stream_usage.prompt_tokens = n;
            }
            if let Some(n) = usage.completion_tokens {
                config.stream_usage.completion_tokens = n;
            }
            if let Some(n) = usage.total_tokens {
                config.stream_usage.total_tokens = n;
            }
        }
    }

    if let Some(upstream) = raw.upstream {
        if upstream.connect_timeout_ms.is_some() {
            config.upstream.connect_timeout_ms = upstream.connect_timeout_ms;
        }
        if upstream.read_timeout_ms.is_some() {
            config.upstream.read_timeout_ms = upstream.read_timeout_ms;
        }
    }

    if let Some(relay) = raw.relay {
        if let Some(capacity) = relay.channel_capacity {
            config.relay_channel_capacity = capacity;
        }
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    for (route, labels) in [("buffered", &config.buffered), ("stream", &config.stream)] {
        if labels.provider.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{route}.provider must not be empty"
            )));
        }
        if labels.model.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{route}.model must not be empty"
            )));
        }
    }

    if config.relay_channel_capacity == 0 {
        return Err(ConfigError::Validation(
            "relay.channel_capacity must be greater than zero".to_string(),
        ));
    }
    if config.upstream.connect_timeout_ms == Some(0) {
        return Err(ConfigError::Validation(
            "upstream.connect_timeout_ms must be greater than zero".to_string(),
        ));
    }
    if config.upstream.read_timeout_ms == Some(0) {
        return Err(ConfigError::Validation(
            "upstream.read_timeout_ms must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
