use std::{
    fmt::Debug,
    io::Write,
    path::Path,
    process::{Command, Stdio},
};

use tracing::{debug, error};

use crate::errors::{Result, TtsError};
use crate::tts::provider_id::ProviderId;

/// Native engine settings for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineArgs {
    pub voice: String,
    pub words_per_minute: i32,
    pub pitch: i32,
    pub amplitude: i32,
}

/// Blocking access to a local speech engine.
///
/// Every method may block for as long as the engine runs; callers move them
/// onto a blocking worker.
#[cfg_attr(test, mockall::automock)]
pub trait LocalEngine: Send + Sync + Debug {
    fn probe(&self) -> bool;

    /// Raw `--voices` listing.
    fn list_voices(&self) -> Result<String>;

    /// Writes a WAV file for `text` to `output`.
    fn speak(&self, args: &EngineArgs, text: &str, output: &Path) -> Result<()>;
}

/// `espeak-ng` command-line driver.
#[derive(Debug, Clone)]
pub struct EspeakEngine {
    binary: String,
}

impl EspeakEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl LocalEngine for EspeakEngine {
    fn probe(&self) -> bool {
        let status = Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) => status.success(),
            Err(e) => {
                debug!(binary = %self.binary, error = %e, "Local engine not found");
                false
            }
        }
    }

    fn list_voices(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--voices")
            .output()
            .map_err(|e| TtsError::synthesis(ProviderId::Local, format!("cannot run engine: {}", e)))?;
        if !output.status.success() {
            return Err(TtsError::synthesis(
                ProviderId::Local,
                format!("voice listing exited with {}", output.status),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn speak(&self, args: &EngineArgs, text: &str, output: &Path) -> Result<()> {
        let mut child = Command::new(&self.binary)
            .arg("-v")
            .arg(&args.voice)
            .arg("-s")
            .arg(args.words_per_minute.to_string())
            .arg("-p")
            .arg(args.pitch.to_string())
            .arg("-a")
            .arg(args.amplitude.to_string())
            .arg("-w")
            .arg(output)
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TtsError::synthesis(ProviderId::Local, format!("cannot run engine: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(text.as_bytes()) {
                drop(stdin);
                if let Err(kill_error) = child.kill() {
                    debug!(error = %kill_error, "Local engine already exited");
                }
                if let Err(wait_error) = child.wait() {
                    debug!(error = %wait_error, "Cannot reap local engine");
                }
                return Err(TtsError::synthesis(
                    ProviderId::Local,
                    format!("cannot feed engine: {}", e),
                ));
            }
        }

        let result = child
            .wait_with_output()
            .map_err(|e| TtsError::synthesis(ProviderId::Local, format!("engine crashed: {}", e)))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            error!(status = %result.status, stderr = %stderr.trim(), "Local engine failed");
            return Err(TtsError::synthesis(
                ProviderId::Local,
                format!("engine exited with {}: {}", result.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}
