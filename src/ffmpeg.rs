use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::FFmpegConfig;
use crate::environment::ActiveEnvironment;
use crate::error::{LaunchError, Result};
use crate::process::{ProcessCommand, ProcessRunner};

/// Where FFmpeg was found, if anywhere
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status", content = "dir")]
pub enum FFmpegStatus {
    /// Answers `-version` through the search path
    OnPath,
    /// Only the project-local copy exists; its directory must go on PATH
    Local(PathBuf),
    Missing,
}

impl FFmpegStatus {
    pub fn is_available(&self) -> bool {
        !matches!(self, FFmpegStatus::Missing)
    }
}

/// Locates the FFmpeg binary for one launcher directory
pub struct FFmpegLocator {
    config: FFmpegConfig,
    base_dir: PathBuf,
}

impl FFmpegLocator {
    pub fn new(config: FFmpegConfig, base_dir: &Path) -> Self {
        Self {
            config,
            base_dir: base_dir.to_path_buf(),
        }
    }

    pub fn install_dir(&self) -> PathBuf {
        self.base_dir.join(&self.config.install_dir)
    }

    pub fn local_bin_dir(&self) -> PathBuf {
        self.install_dir().join("bin")
    }

    pub fn local_binary(&self) -> PathBuf {
        let name = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
        self.local_bin_dir().join(name)
    }

    /// Check if ffmpeg is available. Without an environment the probe runs
    /// with this process's PATH.
    pub async fn check_availability(
        &self,
        env: Option<&ActiveEnvironment>,
        runner: &dyn ProcessRunner,
    ) -> Result<FFmpegStatus> {
        let description = "FFmpeg version probe";
        let probe = match env {
            Some(env) => env.command(&self.config.binary_path, description)?,
            None => ProcessCommand::new(self.config.binary_path.as_str(), description).current_dir(&self.base_dir),
        }
        .arg("-version");

        match runner.output(&probe).await {
            Ok(output) if output.success() => {
                info!("FFmpeg is available");
                return Ok(FFmpegStatus::OnPath);
            }
            Ok(output) => debug!("FFmpeg version check failed: {}", output.summary()),
            Err(e) => debug!("FFmpeg not found: {}", e),
        }

        let local = self.local_binary();
        if local.is_file() {
            info!("Using project-local FFmpeg at {}", local.display());
            return Ok(FFmpegStatus::Local(self.local_bin_dir()));
        }

        Ok(FFmpegStatus::Missing)
    }
}

/// Installs an external tool the launched program needs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolInstaller: Send + Sync {
    /// Tool name shown to the operator
    fn tool_name(&self) -> String;

    /// Run the installation once. Errors are already operator-facing.
    async fn install(&self) -> Result<()>;
}

/// Runs a configured installer command, e.g. `python install_ffmpeg.py`
pub struct CommandInstaller {
    command: Vec<String>,
    working_dir: PathBuf,
    manual_url: String,
    runner: Arc<dyn ProcessRunner>,
}

impl CommandInstaller {
    pub fn new(config: &FFmpegConfig, command: Vec<String>, working_dir: &Path, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            command,
            working_dir: working_dir.to_path_buf(),
            manual_url: config.manual_url.clone(),
            runner,
        }
    }

    fn failed(&self, detail: String) -> LaunchError {
        LaunchError::ExternalToolInstallFailed {
            tool: self.tool_name(),
            detail,
            manual_url: self.manual_url.clone(),
        }
    }
}

#[async_trait]
impl ToolInstaller for CommandInstaller {
    fn tool_name(&self) -> String {
        "FFmpeg".to_string()
    }

    async fn install(&self) -> Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| self.failed("no installer command configured".to_string()))?;

        let command = ProcessCommand::new(program.as_str(), "FFmpeg installer")
            .args(args.iter().cloned())
            .current_dir(&self.working_dir);

        info!("Running FFmpeg installer: {}", command.display());
        let code = self
            .runner
            .run_attached(&command)
            .await
            .map_err(|e| self.failed(e.to_string()))?;

        if code != 0 {
            return Err(self.failed(format!("installer exited with code {}", code)));
        }
        Ok(())
    }
}

/// The configured external command if any, otherwise the built-in downloader
pub fn installer_for(config: &FFmpegConfig, base_dir: &Path, runner: Arc<dyn ProcessRunner>) -> Box<dyn ToolInstaller> {
    match &config.installer {
        Some(command) => Box::new(CommandInstaller::new(config, command.clone(), base_dir, runner)),
        None => Box::new(crate::installer::ArchiveInstaller::new(config.clone(), base_dir, runner)),
    }
}
