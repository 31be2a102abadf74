//! Settings type definitions.
//!
//! All types use camelCase JSON and `#[serde(default)]`, so a settings file
//! only needs the keys it wants to change.

use serde::{Deserialize, Serialize};

/// Root settings for the Zendroid client.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZendroidSettings {
    /// Where the test-agent server lives.
    pub server: ServerSettings,
    /// How run events are received.
    pub transport: TransportSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Remote server endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// HTTP base URL, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// WebSocket base URL. Derived from `base_url` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    /// Start runs with `POST /test` instead of `POST /test/start`.
    pub legacy_endpoints: bool,
    /// Per-request HTTP timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            ws_url: None,
            legacy_endpoints: false,
            request_timeout_ms: 30_000,
        }
    }
}

impl ServerSettings {
    /// WebSocket base URL: the explicit `ws_url`, or `base_url` with its
    /// scheme swapped (`http` → `ws`, `https` → `wss`).
    pub fn resolved_ws_url(&self) -> String {
        if let Some(url) = &self.ws_url {
            return url.trim_end_matches('/').to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        }
    }
}

/// Which transport strategy delivers run events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Push-based WebSocket channel; supports replies.
    #[default]
    Duplex,
    /// Fixed-interval status fetches; read only.
    Polling,
}

impl std::str::FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "duplex" | "ws" | "websocket" => Ok(Self::Duplex),
            "polling" | "poll" => Ok(Self::Polling),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}

/// Transport settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    pub mode: TransportMode,
    /// Interval between status fetches for the polling transport.
    pub poll_interval_ms: u64,
    /// Capacity of the session → controller event queue.
    pub event_buffer: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            mode: TransportMode::Duplex,
            poll_interval_ms: 2_000,
            event_buffer: 256,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`error`, `warn`, `info`, `debug`, `trace`). `RUST_LOG`
    /// takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module level overrides, e.g. `{"zendroid_client": "debug"}`.
    pub modules: std::collections::BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
            modules: std::collections::BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = ZendroidSettings::default();
        assert_eq!(s.server.base_url, "http://localhost:8000");
        assert!(!s.server.legacy_endpoints);
        assert_eq!(s.transport.mode, TransportMode::Duplex);
        assert_eq!(s.transport.poll_interval_ms, 2_000);
        assert_eq!(s.logging.level, "warn");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: ZendroidSettings =
            serde_json::from_str(r#"{"transport":{"mode":"polling"}}"#).unwrap();
        assert_eq!(s.transport.mode, TransportMode::Polling);
        assert_eq!(s.transport.poll_interval_ms, 2_000);
        assert_eq!(s.server, ServerSettings::default());
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(ZendroidSettings::default()).unwrap();
        assert!(json["server"].get("baseUrl").is_some());
        assert!(json["server"].get("legacyEndpoints").is_some());
        assert!(json["transport"].get("pollIntervalMs").is_some());
        assert!(json["server"].get("wsUrl").is_none());
    }

    #[test]
    fn ws_url_derivation() {
        let mut server = ServerSettings::default();
        assert_eq!(server.resolved_ws_url(), "ws://localhost:8000");

        server.base_url = "https://agent.example.com/".into();
        assert_eq!(server.resolved_ws_url(), "wss://agent.example.com");

        server.ws_url = Some("ws://10.0.0.2:9000/".into());
        assert_eq!(server.resolved_ws_url(), "ws://10.0.0.2:9000");
    }

    #[test]
    fn transport_mode_from_str() {
        assert_eq!("Polling".parse::<TransportMode>(), Ok(TransportMode::Polling));
        assert_eq!("ws".parse::<TransportMode>(), Ok(TransportMode::Duplex));
        assert!("carrier-pigeon".parse::<TransportMode>().is_err());
    }
}
