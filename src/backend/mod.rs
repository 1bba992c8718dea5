//! The backend abstraction: one capability contract, served either by a
//! local PlantUML engine process or by a remote PlantUML server.

pub mod factory;
pub mod local;
pub mod remote;

use crate::errors::BackendError;

/// Target representation of a render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderFormat {
    /// ASCII art.
    Text,
    Png,
    Svg,
    Eps,
    /// URL of the diagram in the server's online editor.
    EditorUrl,
}

impl RenderFormat {
    /// Path segment the PlantUML server uses for this representation.
    pub fn path_segment(self) -> &'static str {
        match self {
            RenderFormat::Text => "txt",
            RenderFormat::Png => "png",
            RenderFormat::Svg => "svg",
            RenderFormat::Eps => "eps",
            RenderFormat::EditorUrl => "uml",
        }
    }

    /// Output language the engine understands as `-t<lang>`. The editor URL
    /// has no local equivalent.
    pub(crate) fn engine_lang(self) -> Option<&'static str> {
        match self {
            RenderFormat::Text => Some("txt"),
            RenderFormat::Png => Some("png"),
            RenderFormat::Svg => Some("svg"),
            RenderFormat::Eps => Some("eps"),
            RenderFormat::EditorUrl => None,
        }
    }
}

/// Payload of a successful render call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutput {
    /// Textual diagram (the `Text` format).
    Text(String),
    /// Image bytes (`Png`, `Svg`, `Eps`).
    Image(Vec<u8>),
    /// Editor URL (`EditorUrl`).
    Url(String),
}

impl RenderOutput {
    /// The payload as raw bytes, whatever its representation.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            RenderOutput::Text(s) | RenderOutput::Url(s) => s.into_bytes(),
            RenderOutput::Image(b) => b,
        }
    }
}

/// Result of rendering one input. A failure keeps the failing call's
/// diagnostics (exit code and stderr, or HTTP status and body).
pub type RenderOutcome = Result<RenderOutput, BackendError>;

/// Capability contract shared by [`local::LocalBackend`] and
/// [`remote::RemoteBackend`].
///
/// A backend owns its configuration for its entire lifetime and holds no
/// per-call state, so one instance may serve concurrent render calls.
pub trait Backend: Send + Sync {
    /// Best-effort liveness probe. Ordinary unavailability is `false`,
    /// never an error. The answer is not cached, every call probes again.
    fn check_available(&self) -> bool;

    /// The backend-reported version line, fetched once and then cached for
    /// the lifetime of this instance.
    fn version(&self) -> Result<String, BackendError>;

    /// Render `source` into the requested representation.
    fn render(&self, format: RenderFormat, source: &str) -> RenderOutcome;

    /// URL of `source` in the server's online editor, `None` when the
    /// backend has no server to point at.
    fn shareable_url(&self, source: &str) -> Option<String>;
}
