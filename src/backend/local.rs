//! Backend invoking a locally installed PlantUML engine.
//!
//! Every render call spawns a fresh engine process, pipes the diagram source
//! to its stdin and captures stdout as the rendered output. Process-per-call
//! isolation keeps calls independent, so one backend instance can serve
//! concurrent renders without any locking.

use crate::backend::{Backend, RenderFormat, RenderOutcome, RenderOutput};
use crate::config::LocalConfig;
use crate::errors::BackendError;
use once_cell::sync::OnceCell;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct LocalBackend {
    cmd_parts: Vec<String>,
    timeout: Option<Duration>,
    version: OnceCell<String>,
}

impl LocalBackend {
    /// Validate the configured engine command and build the backend.
    ///
    /// The executable must exist up front; with a bad path this fails with
    /// [`BackendError::EngineNotFound`] and no process is ever spawned.
    pub fn new(cfg: &LocalConfig) -> Result<Self, BackendError> {
        let cmd_parts = split_engine_cmd(&cfg.engine_cmd)?;
        let engine = Path::new(&cmd_parts[0]);
        if !is_executable(engine) {
            return Err(BackendError::EngineNotFound {
                path: engine.to_path_buf(),
            });
        }

        log::info!("Using local PlantUML engine '{}'", cfg.engine_cmd);
        Ok(Self {
            cmd_parts,
            timeout: cfg.timeout_secs.map(Duration::from_secs),
            version: OnceCell::new(),
        })
    }

    fn engine_command(&self) -> Command {
        let mut command = Command::new(&self.cmd_parts[0]);
        command.args(&self.cmd_parts[1..]);
        command
    }

    /// Run `<engine> -version` and return the first stdout line.
    fn probe_version(&self) -> Result<String, BackendError> {
        let output = self.engine_command().arg("-version").output().map_err(|e| {
            BackendError::Unreachable(format!(
                "failed to run '{} -version' ({e})",
                self.cmd_parts[0]
            ))
        })?;
        if !output.status.success() {
            return Err(BackendError::LocalExecution {
                exit_code: exit_code_of(output.status),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = stdout.lines().next().unwrap_or("").trim().to_string();
        if first_line.to_lowercase().contains("version") {
            Ok(first_line)
        } else {
            Err(BackendError::VersionUnavailable(first_line))
        }
    }

    /// Spawn one engine process for this render call and collect its stdout.
    fn run_engine(&self, format: RenderFormat, source: &str) -> Result<Vec<u8>, BackendError> {
        let lang = format.engine_lang().ok_or_else(|| {
            BackendError::Configuration(String::from(
                "the local engine cannot produce an editor URL",
            ))
        })?;

        let mut child = self
            .engine_command()
            // No space between -t and the language, PlantUML falls back to
            // PNG otherwise.
            .arg(format!("-t{lang}"))
            .arg("-nometadata")
            .arg("-pipe")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BackendError::Unreachable(format!(
                    "failed to start PlantUML engine '{}' ({e})",
                    self.cmd_parts[0]
                ))
            })?;

        // stdin is piped, the handle is always there
        let mut stdin = child.stdin.take().unwrap();
        if let Err(e) = stdin.write_all(source.as_bytes()) {
            // A broken pipe means the engine quit early; its exit status is
            // the more useful diagnostic, so fall through to the wait.
            if e.kind() != io::ErrorKind::BrokenPipe {
                let _ = child.kill();
                return Err(BackendError::Unreachable(format!(
                    "failed to pipe diagram source to the engine ({e})"
                )));
            }
        }
        drop(stdin);

        let output = match self.timeout {
            Some(limit) => wait_with_timeout(child, limit)?,
            None => child.wait_with_output().map_err(|e| {
                BackendError::Unreachable(format!("failed to collect engine output ({e})"))
            })?,
        };

        if output.status.success() {
            Ok(output.stdout)
        } else {
            log::error!("PlantUML engine failed ({})", output.status);
            Err(BackendError::LocalExecution {
                exit_code: exit_code_of(output.status),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

impl Backend for LocalBackend {
    fn check_available(&self) -> bool {
        self.probe_version().is_ok()
    }

    fn version(&self) -> Result<String, BackendError> {
        self.version.get_or_try_init(|| self.probe_version()).cloned()
    }

    fn render(&self, format: RenderFormat, source: &str) -> RenderOutcome {
        let stdout = self.run_engine(format, source)?;
        Ok(match format {
            RenderFormat::Text => RenderOutput::Text(String::from_utf8_lossy(&stdout).into_owned()),
            _ => RenderOutput::Image(stdout),
        })
    }

    fn shareable_url(&self, _source: &str) -> Option<String> {
        None
    }
}

/// Split the configured engine command into executable and arguments.
/// Windows paths get their backslashes flipped first because shlex treats
/// the backslash as an escape character.
fn split_engine_cmd(cmd: &str) -> Result<Vec<String>, BackendError> {
    let preprocessed = if cfg!(target_family = "windows") {
        cmd.replace('\\', "/")
    } else {
        String::from(cmd)
    };

    let parts = shlex::split(&preprocessed)
        .ok_or_else(|| BackendError::Configuration(format!("invalid engine command '{cmd}'")))?;
    if parts.is_empty() {
        return Err(BackendError::Configuration(String::from(
            "the engine command is empty",
        )));
    }
    Ok(parts)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Numeric exit code, with the Python-style `-signum` for signal deaths.
#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signum| -signum))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Poll the child until it exits or the deadline passes, then kill it.
/// stdout/stderr are drained from the side so the engine cannot block on a
/// full pipe while we wait.
fn wait_with_timeout(mut child: Child, limit: Duration) -> Result<Output, BackendError> {
    let stdout = child.stdout.take().unwrap();
    let stderr = child.stderr.take().unwrap();
    let stdout_reader = thread::spawn(move || read_all(stdout));
    let stderr_reader = thread::spawn(move || read_all(stderr));

    let deadline = Instant::now() + limit;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Ok(Output {
                    status,
                    stdout: stdout_reader.join().unwrap_or_default(),
                    stderr: stderr_reader.join().unwrap_or_default(),
                });
            }
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                log::warn!("killed the PlantUML engine after {limit:?}");
                return Err(BackendError::Timeout { limit });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(BackendError::Unreachable(format!(
                    "failed to wait for the engine ({e})"
                )));
            }
        }
    }
}

fn read_all(mut source: impl Read) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = source.read_to_end(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn split_engine_cmd_splits_arguments() {
        assert_eq!(
            vec![
                String::from("java"),
                String::from("-jar"),
                String::from("plantuml.jar")
            ],
            split_engine_cmd("java -jar plantuml.jar").unwrap()
        );
    }

    #[test]
    fn split_engine_cmd_rejects_empty_command() {
        assert!(matches!(
            split_engine_cmd(""),
            Err(BackendError::Configuration(_))
        ));
    }

    #[test]
    fn split_engine_cmd_rejects_unclosed_quote() {
        assert!(matches!(
            split_engine_cmd("java \"/foo"),
            Err(BackendError::Configuration(_))
        ));
    }

    #[cfg(not(target_family = "windows"))]
    #[test]
    fn split_engine_cmd_honors_escaped_spaces() {
        assert_eq!(
            vec![String::from("java"), String::from("foo bar")],
            split_engine_cmd("java foo\\ bar").unwrap()
        );
    }

    #[cfg(unix)]
    mod engine_tests {
        use super::*;
        use pretty_assertions::assert_eq;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn fake_engine(dir: &TempDir, script: &str) -> LocalConfig {
            let path = dir.path().join("engine.sh");
            fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            LocalConfig {
                engine_cmd: path.to_str().unwrap().to_string(),
                timeout_secs: None,
            }
        }

        #[test]
        fn missing_engine_fails_at_construction() {
            let cfg = LocalConfig {
                engine_cmd: String::from("/definitely/not/plantuml"),
                timeout_secs: None,
            };
            assert!(matches!(
                LocalBackend::new(&cfg),
                Err(BackendError::EngineNotFound { .. })
            ));
        }

        #[test]
        fn render_captures_stdout() {
            let dir = TempDir::new().unwrap();
            let cfg = fake_engine(&dir, "cat >/dev/null\necho 'ascii art'");
            let backend = LocalBackend::new(&cfg).unwrap();

            let output = backend.render(RenderFormat::Text, "A -> B").unwrap();
            assert_eq!(RenderOutput::Text(String::from("ascii art\n")), output);
        }

        #[test]
        fn failing_engine_reports_exit_code_and_stderr() {
            let dir = TempDir::new().unwrap();
            let cfg = fake_engine(
                &dir,
                "cat >/dev/null\necho 'syntax error on line 3' >&2\nexit 3",
            );
            let backend = LocalBackend::new(&cfg).unwrap();

            match backend.render(RenderFormat::Svg, "A -> B") {
                Err(BackendError::LocalExecution { exit_code, stderr }) => {
                    assert_eq!(3, exit_code);
                    assert_eq!("syntax error on line 3\n", stderr);
                }
                other => panic!("expected LocalExecution, got {other:?}"),
            }
        }

        #[test]
        fn slow_engine_is_killed_after_the_timeout() {
            let dir = TempDir::new().unwrap();
            let mut cfg = fake_engine(&dir, "sleep 30");
            cfg.timeout_secs = Some(1);
            let backend = LocalBackend::new(&cfg).unwrap();

            assert!(matches!(
                backend.render(RenderFormat::Png, "A -> B"),
                Err(BackendError::Timeout { .. })
            ));
        }

        #[test]
        fn version_comes_from_the_probe_and_is_cached() {
            let dir = TempDir::new().unwrap();
            let cfg = fake_engine(
                &dir,
                r#"for arg in "$@"; do
  if [ "$arg" = "-version" ]; then
    echo 'PlantUML version 1.2025.0 (Test)'
    exit 0
  fi
done
cat >/dev/null"#,
            );
            let backend = LocalBackend::new(&cfg).unwrap();

            assert!(backend.check_available());
            assert_eq!(
                "PlantUML version 1.2025.0 (Test)",
                backend.version().unwrap()
            );
            // Second call answers from the cache.
            assert_eq!(
                "PlantUML version 1.2025.0 (Test)",
                backend.version().unwrap()
            );
        }

        #[test]
        fn unrecognizable_version_line_is_rejected() {
            let dir = TempDir::new().unwrap();
            let cfg = fake_engine(&dir, "echo 'hello world'");
            let backend = LocalBackend::new(&cfg).unwrap();

            assert!(matches!(
                backend.version(),
                Err(BackendError::VersionUnavailable(_))
            ));
        }

        #[test]
        fn editor_urls_are_not_a_local_capability() {
            let dir = TempDir::new().unwrap();
            let cfg = fake_engine(&dir, "cat >/dev/null\necho ok");
            let backend = LocalBackend::new(&cfg).unwrap();

            assert_eq!(None, backend.shareable_url("A -> B"));
            assert!(matches!(
                backend.render(RenderFormat::EditorUrl, "A -> B"),
                Err(BackendError::Configuration(_))
            ));
        }
    }
}
