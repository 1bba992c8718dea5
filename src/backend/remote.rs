//! Backend talking to a PlantUML server over HTTP.
//!
//! Render requests are plain GETs of `<host>/<format>/<token>` with the
//! token produced by [`crate::encoder`]. The server's identity is validated
//! through its homepage footer, which must read like a PlantUML server
//! version marker.

use crate::backend::{Backend, RenderFormat, RenderOutcome, RenderOutput};
use crate::config::RemoteConfig;
use crate::encoder;
use crate::errors::BackendError;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::LazyLock;
use std::time::Duration;

static FOOTER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<div[^>]*\bid="footer"[^>]*>(.*?)</div>"#).unwrap());
static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

pub(crate) struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Seam for unit testing without a live server.
pub(crate) trait HttpTransport {
    fn get(&self, url: &Url) -> Result<HttpResponse, BackendError>;
}

struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &Url) -> Result<HttpResponse, BackendError> {
        log::debug!("GET {url}");
        let response = self.client.get(url.clone()).send().map_err(|e| {
            BackendError::Unreachable(format!("request to '{url}' failed ({e})"))
        })?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| {
                BackendError::Unreachable(format!("failed to read response from '{url}' ({e})"))
            })?
            .to_vec();
        Ok(HttpResponse { status, body })
    }
}

pub struct RemoteBackend {
    server_url: Url,
    transport: ReqwestTransport,
    version: OnceCell<String>,
}

impl RemoteBackend {
    /// Normalize the configured host URL and fix the request options for
    /// the lifetime of the backend.
    pub fn new(cfg: &RemoteConfig) -> Result<Self, BackendError> {
        let server_url = normalize_server_url(&cfg.server_url)?;
        let client = build_client(cfg)?;
        log::info!("Using PlantUML server '{server_url}'");
        Ok(Self {
            server_url,
            transport: ReqwestTransport { client },
            version: OnceCell::new(),
        })
    }

    fn request_url(&self, path: &str) -> Result<Url, BackendError> {
        self.server_url.join(path).map_err(|e| {
            BackendError::Configuration(format!(
                "cannot build a request URL from '{}' and '{path}' ({e})",
                self.server_url
            ))
        })
    }

    /// URL serving `source` in the given representation.
    pub fn render_url(&self, format: RenderFormat, source: &str) -> Result<Url, BackendError> {
        self.request_url(&format!(
            "{}/{}",
            format.path_segment(),
            encoder::encode(source)
        ))
    }

    fn render_with(
        &self,
        format: RenderFormat,
        source: &str,
        transport: &dyn HttpTransport,
    ) -> RenderOutcome {
        let url = self.render_url(format, source)?;
        if format == RenderFormat::EditorUrl {
            return Ok(RenderOutput::Url(url.into()));
        }

        let response = transport.get(&url)?;
        if !response.is_success() {
            return Err(BackendError::RemoteExecution {
                status: response.status,
                body: response.body_text(),
            });
        }

        Ok(match format {
            RenderFormat::Text => RenderOutput::Text(response.body_text()),
            _ => RenderOutput::Image(response.body),
        })
    }

    fn version_with(&self, transport: &dyn HttpTransport) -> Result<String, BackendError> {
        self.version
            .get_or_try_init(|| self.fetch_version(transport))
            .cloned()
    }

    /// Fetch the homepage and read the version marker from its footer.
    fn fetch_version(&self, transport: &dyn HttpTransport) -> Result<String, BackendError> {
        let homepage = transport.get(&self.server_url)?;
        if !homepage.is_success() {
            return Err(BackendError::RemoteExecution {
                status: homepage.status,
                body: homepage.body_text(),
            });
        }

        let footer = extract_footer_text(&homepage.body_text())
            .ok_or_else(|| BackendError::VersionUnavailable(String::new()))?;
        check_version(&footer)?;
        Ok(footer)
    }

    fn check_available_with(&self, transport: &dyn HttpTransport) -> bool {
        transport
            .get(&self.server_url)
            .map(|response| response.is_success())
            .unwrap_or(false)
    }
}

impl Backend for RemoteBackend {
    fn check_available(&self) -> bool {
        self.check_available_with(&self.transport)
    }

    fn version(&self) -> Result<String, BackendError> {
        self.version_with(&self.transport)
    }

    fn render(&self, format: RenderFormat, source: &str) -> RenderOutcome {
        self.render_with(format, source, &self.transport)
    }

    fn shareable_url(&self, source: &str) -> Option<String> {
        self.render_url(RenderFormat::EditorUrl, source)
            .ok()
            .map(String::from)
    }
}

/// Parse and normalize the host URL: query and fragment are stripped, and
/// the path gets a trailing slash so `Url::join` keeps it intact.
fn normalize_server_url(raw: &str) -> Result<Url, BackendError> {
    let mut url = Url::parse(raw).map_err(|e| {
        BackendError::Configuration(format!("invalid PlantUML server URL '{raw}' ({e})"))
    })?;
    url.set_query(None);
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn build_client(cfg: &RemoteConfig) -> Result<reqwest::blocking::Client, BackendError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &cfg.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            BackendError::Configuration(format!("invalid request header name '{name}' ({e})"))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            BackendError::Configuration(format!("invalid value for request header '{name}' ({e})"))
        })?;
        headers.insert(header_name, header_value);
    }

    let mut builder = reqwest::blocking::Client::builder().default_headers(headers);
    if let Some(secs) = cfg.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(proxy) = &cfg.proxy {
        let proxy = reqwest::Proxy::all(proxy.as_str()).map_err(|e| {
            BackendError::Configuration(format!("invalid proxy URL '{proxy}' ({e})"))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| BackendError::Configuration(format!("failed to build the HTTP client ({e})")))
}

/// Text content of the homepage footer element, tags stripped and
/// whitespace collapsed.
fn extract_footer_text(html: &str) -> Option<String> {
    let captures = FOOTER_PATTERN.captures(html)?;
    let inner = captures.get(1)?.as_str();
    let text = TAG_PATTERN.replace_all(inner, " ");
    Some(text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// A genuine PlantUML server footer mentions both "version" and
/// "plantuml server"; anything else is a malformed or hijacked endpoint.
fn check_version(version_info: &str) -> Result<(), BackendError> {
    let lowered = version_info.to_lowercase();
    if lowered.contains("version") && lowered.contains("plantuml server") {
        Ok(())
    } else {
        Err(BackendError::VersionUnavailable(version_info.to_string()))
    }
}
