//! Built-in FFmpeg installer.
//!
//! Downloads the essentials build, unpacks it into the project-local install
//! directory, keeps only `bin/` and registers that directory in the user's
//! persistent PATH.

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::FFmpegConfig;
use crate::console;
use crate::error::{LaunchError, Result};
use crate::ffmpeg::ToolInstaller;
use crate::process::{ProcessCommand, ProcessRunner};

const ARCHIVE_NAME: &str = "ffmpeg.zip";
const EXTRACTED_PREFIX: &str = "ffmpeg-";
const STAGED_BIN: &str = "bin.new";

pub struct ArchiveInstaller {
    config: FFmpegConfig,
    base_dir: PathBuf,
    runner: Arc<dyn ProcessRunner>,
}

impl ArchiveInstaller {
    pub fn new(config: FFmpegConfig, base_dir: &Path, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            config,
            base_dir: base_dir.to_path_buf(),
            runner,
        }
    }

    fn install_dir(&self) -> PathBuf {
        self.base_dir.join(&self.config.install_dir)
    }

    fn failed(&self, detail: String) -> LaunchError {
        LaunchError::ExternalToolInstallFailed {
            tool: "FFmpeg".to_string(),
            detail,
            manual_url: self.config.manual_url.clone(),
        }
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<()> {
        info!("Downloading FFmpeg from {}", url);

        let client = Client::builder()
            .user_agent(concat!("launchkit/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(LaunchError::Config(format!(
                "Failed to download FFmpeg: HTTP {}",
                response.status()
            )));
        }

        let pb = match response.content_length() {
            Some(total) if total > 0 => {
                let pb = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                {
                    pb.set_style(style.progress_chars("#>-"));
                }
                pb
            }
            _ => ProgressBar::new_spinner(),
        };

        // Partial downloads never take the final name
        let temp_path = destination.with_extension("part");
        let mut file = async_fs::File::create(&temp_path).await?;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            pb.inc(chunk.len() as u64);
        }

        file.flush().await?;
        drop(file);

        async_fs::rename(&temp_path, destination).await?;
        pb.finish_with_message("Downloaded FFmpeg");
        Ok(())
    }

    async fn install_inner(&self) -> Result<PathBuf> {
        let install_dir = self.install_dir();
        async_fs::create_dir_all(&install_dir).await?;

        let result = self.fetch_and_unpack(&install_dir).await;
        remove_staging(&install_dir);
        result
    }

    async fn fetch_and_unpack(&self, install_dir: &Path) -> Result<PathBuf> {
        let archive = install_dir.join(ARCHIVE_NAME);
        console::notice("Downloading FFmpeg. This may take a few minutes...");
        self.download(&self.config.download_url, &archive).await?;

        info!("Extracting {}", archive.display());
        let install_dir = install_dir.to_path_buf();
        let bin_dir = tokio::task::spawn_blocking(move || install_from_archive(&archive, &install_dir))
            .await
            .map_err(|e| LaunchError::Config(format!("Extraction task failed: {}", e)))??;

        info!("FFmpeg installed to {}", bin_dir.display());
        Ok(bin_dir)
    }
}

#[async_trait]
impl ToolInstaller for ArchiveInstaller {
    fn tool_name(&self) -> String {
        "FFmpeg".to_string()
    }

    async fn install(&self) -> Result<()> {
        let bin_dir = match self.install_inner().await {
            Ok(dir) => dir,
            Err(e @ LaunchError::ExternalToolInstallFailed { .. }) => return Err(e),
            Err(e) => return Err(self.failed(e.to_string())),
        };

        console::notice(&format!("FFmpeg installed to {}", bin_dir.display()));

        if self.config.persist_path {
            match persist_user_path(&bin_dir, self.runner.as_ref()).await {
                Ok(true) => console::notice("FFmpeg was added to your user PATH."),
                Ok(false) => {}
                // The launcher itself still finds the local copy
                Err(e) => warn!("Could not update the persistent PATH: {}", e),
            }
        }

        Ok(())
    }
}

/// Unpack `archive` into `dest`
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    zip.extract(dest)?;
    Ok(())
}

/// Extract a downloaded archive into `install_dir` and keep only its `bin`.
/// Folders left by an earlier interrupted install are removed first.
pub fn install_from_archive(archive: &Path, install_dir: &Path) -> Result<PathBuf> {
    for stale in extracted_dirs(install_dir)? {
        warn!("Removing leftover {}", stale.display());
        fs::remove_dir_all(&stale)?;
    }

    extract_archive(archive, install_dir)?;
    promote_bin_dir(install_dir)
}

fn extracted_dirs(install_dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(fs::read_dir(install_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(EXTRACTED_PREFIX))
        })
        .collect())
}

/// Replace `<install_dir>/bin` with the `bin` folder of the extracted
/// `ffmpeg-*` directory, then delete that directory. The new folder is
/// copied next to the old one and only renamed into place once complete.
pub fn promote_bin_dir(install_dir: &Path) -> Result<PathBuf> {
    let extracted = extracted_dirs(install_dir)?
        .into_iter()
        .next()
        .ok_or_else(|| LaunchError::Config("Could not find extracted FFmpeg folder".to_string()))?;

    let source = extracted.join("bin");
    if !source.is_dir() {
        return Err(LaunchError::Config(format!(
            "Extracted folder {} has no bin directory",
            extracted.display()
        )));
    }

    let staged = install_dir.join(STAGED_BIN);
    if staged.exists() {
        fs::remove_dir_all(&staged)?;
    }
    if let Err(e) = copy_dir(&source, &staged) {
        let _ = fs::remove_dir_all(&staged);
        return Err(e);
    }

    let target = install_dir.join("bin");
    if target.exists() {
        fs::remove_dir_all(&target)?;
    }
    fs::rename(&staged, &target)?;
    fs::remove_dir_all(&extracted)?;

    Ok(target)
}

/// Remove everything an install leaves behind except `bin`: the archive,
/// a partial download, extracted folders and a half-copied `bin.new`.
pub fn remove_staging(install_dir: &Path) {
    let archive = install_dir.join(ARCHIVE_NAME);
    for file in [archive.with_extension("part"), archive] {
        if file.exists() {
            if let Err(e) = fs::remove_file(&file) {
                warn!("Could not remove {}: {}", file.display(), e);
            }
        }
    }

    let mut dirs = extracted_dirs(install_dir).unwrap_or_default();
    dirs.push(install_dir.join(STAGED_BIN));
    for dir in dirs.into_iter().filter(|d| d.exists()) {
        if let Err(e) = fs::remove_dir_all(&dir) {
            warn!("Could not remove {}: {}", dir.display(), e);
        }
    }
}

fn copy_dir(source: &Path, target: &Path) -> Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| LaunchError::Config(e.to_string()))?;
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

/// Append `dir` to a PATH-style value. `None` when it is already listed.
pub fn append_path_entry(current: &str, dir: &Path, separator: char) -> Option<String> {
    let dir = dir.to_string_lossy();
    let normalize = |entry: &str| entry.trim().trim_end_matches(['\\', '/']).to_lowercase();
    let wanted = normalize(&dir);

    if current.split(separator).any(|entry| normalize(entry) == wanted) {
        return None;
    }

    let current = current.trim_end_matches(separator);
    if current.is_empty() {
        Some(dir.to_string())
    } else {
        Some(format!("{}{}{}", current, separator, dir))
    }
}

fn powershell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn powershell(script: String, description: &str) -> ProcessCommand {
    ProcessCommand::new("powershell", description).args(["-NoProfile", "-NonInteractive", "-Command"]).arg(script)
}

/// Add `dir` to the persistent user PATH. Returns whether anything changed.
///
/// Only Windows has a persistent user environment we can edit; elsewhere
/// the operator gets the line to add to their shell profile.
pub async fn persist_user_path(dir: &Path, runner: &dyn ProcessRunner) -> Result<bool> {
    if !cfg!(windows) {
        console::notice(&format!(
            "Add FFmpeg to your PATH by putting this line in your shell profile:\n  export PATH=\"{}:$PATH\"",
            dir.display()
        ));
        return Ok(false);
    }

    update_user_path(dir, runner).await
}

/// Read the user-scope `Path` through PowerShell and write it back with
/// `dir` appended, unless it is already listed.
pub async fn update_user_path(dir: &Path, runner: &dyn ProcessRunner) -> Result<bool> {
    let read = powershell(
        "[Environment]::GetEnvironmentVariable('Path', 'User')".to_string(),
        "Read user PATH",
    );
    let output = runner.output(&read).await?;
    if !output.success() {
        return Err(LaunchError::Config(format!("Reading user PATH failed: {}", output.summary())));
    }

    let Some(updated) = append_path_entry(output.stdout.trim(), dir, ';') else {
        info!("{} is already on the user PATH", dir.display());
        return Ok(false);
    };

    let write = powershell(
        format!(
            "[Environment]::SetEnvironmentVariable('Path', {}, 'User')",
            powershell_quote(&updated)
        ),
        "Update user PATH",
    );
    let output = runner.output(&write).await?;
    if !output.success() {
        return Err(LaunchError::Config(format!("Updating user PATH failed: {}", output.summary())));
    }

    info!("Added {} to the user PATH", dir.display());
    Ok(true)
}
