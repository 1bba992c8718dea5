use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong when talking to a backend.
///
/// Configuration faults (`Configuration`, `EngineNotFound`) are fatal at
/// construction or first use and never retried. `Unreachable` covers network
/// and process launch failures, the availability probes report it as plain
/// `false`. The two execution variants describe one failed render call and
/// keep the diagnostics of the failing input, a batch continues past them.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Malformed backend configuration (bad server URL, bad engine command,
    /// invalid request options).
    #[error("invalid backend configuration: {0}")]
    Configuration(String),

    /// The configured engine executable does not exist. Nothing was spawned.
    #[error("PlantUML engine '{}' does not exist or is not executable", .path.display())]
    EngineNotFound { path: PathBuf },

    /// The backend could not be reached at all (DNS/connection failure, or
    /// the engine process could not be started).
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The engine process ran but exited with a failure status. Both the
    /// exit code and the captured stderr are preserved verbatim.
    #[error("PlantUML engine failed with exit code {exit_code}: {stderr}")]
    LocalExecution { exit_code: i32, stderr: String },

    /// The server answered a render request with a non-2xx status.
    #[error("PlantUML server returned HTTP {status}: {body}")]
    RemoteExecution { status: u16, body: String },

    /// The engine did not finish within the configured per-call limit and
    /// was killed.
    #[error("rendering did not finish within {limit:?}")]
    Timeout { limit: Duration },

    /// The version probe got an answer, but not one that looks like a
    /// PlantUML version marker. Treated as "not a valid backend of this
    /// kind".
    #[error("no recognizable version in backend response: {0:?}")]
    VersionUnavailable(String),

    /// Neither the local engine nor the remote server answered its probe.
    #[error("neither a local PlantUML engine nor a remote PlantUML server is available")]
    NoBackendAvailable,
}
