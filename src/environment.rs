//! Isolated Python environment (venv) handling.
//!
//! Activation never touches this process's own environment. Instead an
//! [`ActiveEnvironment`] carries the interpreter to use plus the variables
//! every later child process gets (`VIRTUAL_ENV`, an extended `PATH`).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{LaunchError, Result};
use crate::interpreter::Interpreter;
use crate::process::{ProcessCommand, ProcessRunner};

/// A venv directory on disk (which may not exist yet)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualEnv {
    root: PathBuf,
}

impl VirtualEnv {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `Scripts` on Windows-created environments, `bin` elsewhere.
    /// An existing layout wins over the host default.
    pub fn scripts_dir(&self) -> PathBuf {
        let windows = self.root.join("Scripts");
        let posix = self.root.join("bin");
        if windows.join("python.exe").exists() {
            windows
        } else if posix.join("python").exists() {
            posix
        } else if cfg!(windows) {
            windows
        } else {
            posix
        }
    }

    pub fn interpreter_path(&self) -> PathBuf {
        let scripts = self.scripts_dir();
        if scripts.ends_with("Scripts") {
            scripts.join("python.exe")
        } else {
            scripts.join("python")
        }
    }

    /// The environment counts as present when its interpreter exists
    pub fn exists(&self) -> bool {
        self.interpreter_path().is_file()
    }

    /// `<python> -m venv <root>`; exactly one attempt.
    pub async fn create(&self, base: &Interpreter, runner: &dyn ProcessRunner) -> Result<()> {
        info!("Creating virtual environment at {}", self.root.display());

        let command = ProcessCommand::new(base.program.as_str(), "Create virtual environment")
            .arg("-m")
            .arg("venv")
            .path_arg(&self.root);

        let output = runner.output(&command).await.map_err(|e| self.create_failed(e.to_string()))?;

        if !output.success() {
            return Err(self.create_failed(output.summary()));
        }

        info!("Virtual environment created");
        Ok(())
    }

    fn create_failed(&self, detail: String) -> LaunchError {
        LaunchError::EnvironmentCreateFailed {
            path: self.root.display().to_string(),
            detail,
        }
    }
}

/// The interpreter and child-process environment used after activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEnvironment {
    /// Interpreter used for probes, installs and the launch
    pub python: String,
    /// Activated venv root, if any
    pub venv: Option<PathBuf>,
    /// Directories put in front of PATH for child processes
    pub search_path: Vec<PathBuf>,
    /// Working directory of every child process
    pub working_dir: PathBuf,
}

impl ActiveEnvironment {
    /// No venv: use the interpreter found on PATH
    pub fn ambient(interpreter: &Interpreter, working_dir: &Path) -> Self {
        Self {
            python: interpreter.program.clone(),
            venv: None,
            search_path: Vec::new(),
            working_dir: working_dir.to_path_buf(),
        }
    }

    /// Run everything inside `venv`
    pub fn activated(venv: &VirtualEnv, working_dir: &Path) -> Self {
        Self {
            python: venv.interpreter_path().to_string_lossy().to_string(),
            venv: Some(venv.root().to_path_buf()),
            search_path: vec![venv.scripts_dir()],
            working_dir: working_dir.to_path_buf(),
        }
    }

    pub fn is_isolated(&self) -> bool {
        self.venv.is_some()
    }

    /// Make `dir` visible to child processes, ahead of everything else
    pub fn prepend_search_path(&mut self, dir: PathBuf) {
        if !self.search_path.contains(&dir) {
            self.search_path.insert(0, dir);
        }
    }

    /// Variables applied to every child process
    pub fn overlay(&self) -> Result<Vec<(String, String)>> {
        let mut envs = Vec::new();
        if let Some(venv) = &self.venv {
            envs.push(("VIRTUAL_ENV".to_string(), venv.to_string_lossy().to_string()));
        }
        if !self.search_path.is_empty() {
            let path = extend_search_path(&self.search_path, std::env::var_os("PATH"))?;
            envs.push(("PATH".to_string(), path));
        }
        Ok(envs)
    }

    /// A command for any program, with the overlay applied
    pub fn command(&self, program: &str, description: &str) -> Result<ProcessCommand> {
        Ok(ProcessCommand::new(program, description)
            .envs(self.overlay()?)
            .current_dir(&self.working_dir))
    }

    /// A command running the active interpreter
    pub fn python_command(&self, description: &str) -> Result<ProcessCommand> {
        self.command(&self.python, description)
    }
}

/// Join `dirs` in front of an existing PATH value, dropping duplicates.
pub fn extend_search_path(dirs: &[PathBuf], current: Option<OsString>) -> Result<String> {
    let mut entries: Vec<PathBuf> = dirs.to_vec();
    if let Some(current) = current {
        for entry in std::env::split_paths(&current) {
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
    }

    let joined = std::env::join_paths(entries)
        .map_err(|e| LaunchError::Config(format!("Cannot build PATH: {}", e)))?;
    debug!("Child PATH: {}", joined.to_string_lossy());
    Ok(joined.to_string_lossy().to_string())
}
