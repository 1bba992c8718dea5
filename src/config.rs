use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The official public PlantUML server, used when no host is configured.
pub const OFFICIAL_SERVER_URL: &str = "http://www.plantuml.com/plantuml";

/// Configuration of the local engine backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LocalConfig {
    /// Command starting the PlantUML engine, e.g. `/usr/bin/plantuml` or
    /// `java -jar plantuml.jar`. Extra flags can be appended here, they are
    /// passed on every render call. The executable itself must exist, the
    /// engine is never searched for.
    pub engine_cmd: String,
    /// Kill the engine process when a single render call takes longer than
    /// this many seconds. No limit when absent.
    pub timeout_secs: Option<u64>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            engine_cmd: String::from("plantuml"),
            timeout_secs: None,
        }
    }
}

/// Configuration of the remote server backend.
///
/// The request options are captured once at construction and applied
/// identically to every request the backend makes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RemoteConfig {
    /// Base URL of the PlantUML server. Query and fragment are stripped.
    pub server_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Extra headers sent with every request (e.g. authorization).
    pub headers: BTreeMap<String, String>,
    /// HTTP(S) proxy URL.
    pub proxy: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            server_url: String::from(OFFICIAL_SERVER_URL),
            timeout_secs: None,
            headers: BTreeMap::new(),
            proxy: None,
        }
    }
}

/// Combined configuration for backend selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Local engine to try first; skipped when absent.
    pub local: Option<LocalConfig>,
    /// Server to fall back to; skipped when absent.
    pub remote: Option<RemoteConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn local_default() {
        let cfg = LocalConfig::default();
        assert_eq!(cfg.engine_cmd, "plantuml");
        assert_eq!(cfg.timeout_secs, None);
    }

    #[test]
    fn remote_default() {
        let cfg = RemoteConfig::default();
        assert_eq!(cfg.server_url, OFFICIAL_SERVER_URL);
        assert_eq!(cfg.timeout_secs, None);
        assert!(cfg.headers.is_empty());
        assert_eq!(cfg.proxy, None);
    }

    #[test]
    fn deserializes_kebab_case() {
        let cfg: Config = serde_json::from_value(serde_json::json!({
            "local": { "engine-cmd": "java -jar plantuml.jar", "timeout-secs": 30 },
            "remote": {
                "server-url": "https://uml.example.org/plantuml",
                "headers": { "authorization": "Bearer sesame" }
            }
        }))
        .unwrap();

        let local = cfg.local.unwrap();
        assert_eq!(local.engine_cmd, "java -jar plantuml.jar");
        assert_eq!(local.timeout_secs, Some(30));

        let remote = cfg.remote.unwrap();
        assert_eq!(remote.server_url, "https://uml.example.org/plantuml");
        assert_eq!(
            remote.headers.get("authorization").map(String::as_str),
            Some("Bearer sesame")
        );
    }
}
