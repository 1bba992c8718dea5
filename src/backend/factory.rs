//! Probe-and-select backend construction.

use crate::backend::Backend;
use crate::backend::local::LocalBackend;
use crate::backend::remote::RemoteBackend;
use crate::config::Config;
use crate::errors::BackendError;

/// Probe the configured backends and return the first one that answers:
/// the local engine is preferred, the server is the fallback.
///
/// A backend that fails to construct or does not answer its liveness probe
/// is logged and skipped. When nothing answers, the caller gets the
/// distinct [`BackendError::NoBackendAvailable`] signal.
pub fn create(cfg: &Config) -> Result<Box<dyn Backend>, BackendError> {
    if let Some(local_cfg) = &cfg.local {
        match LocalBackend::new(local_cfg) {
            Ok(backend) => {
                if backend.check_available() {
                    log::info!("Selected the local PlantUML engine '{}'", local_cfg.engine_cmd);
                    return Ok(Box::new(backend));
                }
                log::warn!(
                    "Local PlantUML engine '{}' did not answer its version probe",
                    local_cfg.engine_cmd
                );
            }
            Err(e) => log::warn!("Local PlantUML engine is unusable ({e})"),
        }
    }

    if let Some(remote_cfg) = &cfg.remote {
        match RemoteBackend::new(remote_cfg) {
            Ok(backend) => {
                if backend.check_available() {
                    log::info!("Selected the PlantUML server '{}'", remote_cfg.server_url);
                    return Ok(Box::new(backend));
                }
                log::warn!("PlantUML server '{}' is unreachable", remote_cfg.server_url);
            }
            Err(e) => log::warn!("PlantUML server configuration is invalid ({e})"),
        }
    }

    Err(BackendError::NoBackendAvailable)
}
