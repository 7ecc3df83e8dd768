use std::path::Path;

use serde::{Deserialize, Serialize};

use super::CallCore;

const CONFIG_FILE: &str = "ringlet_config.json";

// Public Google STUN pair the web client shipped with.
const DEFAULT_ICE_SERVERS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct CallConfig {
    pub(crate) ice_servers: Option<Vec<String>>,
    pub(crate) hangup_on_transport_failure: Option<bool>,
}

pub(crate) fn load_call_config(data_dir: &str) -> CallConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE);
    let Ok(bytes) = std::fs::read(&path) else {
        return CallConfig::default();
    };
    match serde_json::from_slice::<CallConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), err = %e, "invalid call config; using defaults");
            CallConfig::default()
        }
    }
}

pub(crate) fn default_call_config_json() -> String {
    let config = CallConfig {
        ice_servers: Some(DEFAULT_ICE_SERVERS.iter().map(ToString::to_string).collect()),
        hangup_on_transport_failure: Some(true),
    };
    serde_json::to_string_pretty(&config).unwrap_or_else(|_| "{}".to_string())
}

impl CallConfig {
    pub(crate) fn ice_servers(&self) -> Vec<String> {
        let configured: Vec<String> = self
            .ice_servers
            .iter()
            .flatten()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
        if !configured.is_empty() {
            return configured;
        }
        DEFAULT_ICE_SERVERS.iter().map(ToString::to_string).collect()
    }

    pub(crate) fn hangup_on_transport_failure(&self) -> bool {
        self.hangup_on_transport_failure.unwrap_or(true)
    }
}

impl CallCore {
    pub(super) fn transport_config(&self) -> ringlet_media::TransportConfig {
        ringlet_media::TransportConfig {
            ice_servers: self.config.ice_servers(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_call_config(dir.path().to_str().unwrap());
        assert_eq!(config.ice_servers().len(), 2);
        assert!(config.hangup_on_transport_failure());
    }

    #[test]
    fn reads_overrides_and_ignores_blank_servers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"ice_servers":["turn:turn.example.org:3478"," "],"hangup_on_transport_failure":false,"unknown":1}"#,
        )
        .unwrap();
        let config = load_call_config(dir.path().to_str().unwrap());
        assert_eq!(config.ice_servers(), vec!["turn:turn.example.org:3478"]);
        assert!(!config.hangup_on_transport_failure());
    }

    #[test]
    fn invalid_json_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), b"{not json").unwrap();
        let config = load_call_config(dir.path().to_str().unwrap());
        assert_eq!(config.ice_servers()[0], DEFAULT_ICE_SERVERS[0]);
    }

    #[test]
    fn default_json_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), default_call_config_json()).unwrap();
        let config = load_call_config(dir.path().to_str().unwrap());
        assert_eq!(config.ice_servers().len(), 2);
        assert!(config.hangup_on_transport_failure());
    }
}
