//! The readiness sequence every launcher runs before starting its program.
//!
//! Order is fixed: interpreter, environment, activation, capabilities,
//! external tool, launch. The first failing step aborts; nothing is retried.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capability;
use crate::config::{ActivationPolicy, CapabilityKind, Config, Profile};
use crate::console;
use crate::environment::{ActiveEnvironment, VirtualEnv};
use crate::error::{LaunchError, Result};
use crate::ffmpeg::{self, FFmpegLocator, FFmpegStatus, ToolInstaller};
use crate::interpreter::{self, Interpreter};
use crate::process::ProcessRunner;

/// Something the bootstrapper changed on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "target", rename_all = "kebab-case")]
pub enum SetupAction {
    CreatedEnvironment(PathBuf),
    InstalledPackage(String),
    InstalledManifest(PathBuf),
    InstalledTool(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOutcome {
    /// Exit code of the launched program
    pub exit_code: i32,
    /// Empty when the host was already ready
    pub actions: Vec<SetupAction>,
    /// Keep the console open so the operator can read the output
    pub hold_terminal: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityStatus {
    pub name: String,
    pub module: String,
    pub kind: CapabilityKind,
    pub present: bool,
}

/// Result of `check`: the same probes as a launch, without side effects
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub interpreter: Option<Interpreter>,
    pub interpreter_error: Option<String>,
    pub environment: PathBuf,
    pub environment_present: bool,
    pub environment_required: bool,
    pub capabilities: Vec<CapabilityStatus>,
    pub external_tool: Option<FFmpegStatus>,
    pub entry_point: PathBuf,
    pub entry_point_present: bool,
}

impl ReadinessReport {
    pub fn is_ready(&self) -> bool {
        self.interpreter.is_some()
            && (self.environment_present || !self.environment_required)
            && self.capabilities.iter().all(|c| c.present)
            && self.external_tool.as_ref().is_none_or(FFmpegStatus::is_available)
            && self.entry_point_present
    }
}

pub struct Bootstrapper {
    config: Config,
    base_dir: PathBuf,
    runner: Arc<dyn ProcessRunner>,
    tool_installer: Box<dyn ToolInstaller>,
}

impl Bootstrapper {
    pub fn new(config: Config, base_dir: &Path, runner: Arc<dyn ProcessRunner>) -> Self {
        let tool_installer = ffmpeg::installer_for(&config.ffmpeg, base_dir, runner.clone());
        Self::with_installer(config, base_dir, runner, tool_installer)
    }

    pub fn with_installer(
        config: Config,
        base_dir: &Path,
        runner: Arc<dyn ProcessRunner>,
        tool_installer: Box<dyn ToolInstaller>,
    ) -> Self {
        Self {
            config,
            base_dir: base_dir.to_path_buf(),
            runner,
            tool_installer,
        }
    }

    fn venv(&self) -> VirtualEnv {
        VirtualEnv::new(self.base_dir.join(&self.config.environment.path))
    }

    /// Make the host ready for `profile`, then run its entry point.
    pub async fn run(&self, profile: &Profile, args: &[String]) -> Result<BootstrapOutcome> {
        let mut actions = Vec::new();
        let env = self.prepare(profile, &mut actions).await?;
        let exit_code = self.launch(&env, profile, args).await?;

        Ok(BootstrapOutcome {
            exit_code,
            actions,
            hold_terminal: exit_code != 0 && self.config.launch.pause_on_failure,
        })
    }

    /// Steps 1 to 5. Returns the environment the entry point will run in.
    pub async fn prepare(&self, profile: &Profile, actions: &mut Vec<SetupAction>) -> Result<ActiveEnvironment> {
        info!("Checking Python...");
        let interpreter = interpreter::locate(&self.config.python, self.runner.as_ref()).await?;

        let venv = self.venv();
        self.ensure_environment(&interpreter, &venv, actions).await?;

        let mut env = self.activate(&interpreter, &venv)?;

        let created = actions.iter().any(|a| matches!(a, SetupAction::CreatedEnvironment(_)));
        if created && env.is_isolated() && self.config.environment.upgrade_pip {
            capability::upgrade_pip(&env, self.runner.as_ref()).await?;
        }

        self.ensure_capabilities(&env, profile, actions).await?;

        if profile.requires_external_tool {
            self.ensure_external_tool(&mut env, actions).await?;
        }

        info!("Environment ready");
        Ok(env)
    }

    async fn ensure_environment(
        &self,
        interpreter: &Interpreter,
        venv: &VirtualEnv,
        actions: &mut Vec<SetupAction>,
    ) -> Result<()> {
        if venv.exists() {
            debug!("Virtual environment found at {}", venv.root().display());
            return Ok(());
        }

        if !self.config.environment.create_if_missing {
            info!("No virtual environment at {}; creation disabled", venv.root().display());
            return Ok(());
        }

        console::notice("Creating virtual environment (first run only)...");
        venv.create(interpreter, self.runner.as_ref()).await?;
        actions.push(SetupAction::CreatedEnvironment(venv.root().to_path_buf()));
        Ok(())
    }

    fn activate(&self, interpreter: &Interpreter, venv: &VirtualEnv) -> Result<ActiveEnvironment> {
        if venv.exists() {
            info!("Activated virtual environment {}", venv.root().display());
            return Ok(ActiveEnvironment::activated(venv, &self.base_dir));
        }

        match self.config.environment.activation {
            ActivationPolicy::BestEffort => {
                warn!(
                    "No usable virtual environment at {}; continuing with {}",
                    venv.root().display(),
                    interpreter.program
                );
                Ok(ActiveEnvironment::ambient(interpreter, &self.base_dir))
            }
            ActivationPolicy::Required => Err(LaunchError::EnvironmentCreateFailed {
                path: venv.root().display().to_string(),
                detail: format!("{} does not exist", venv.interpreter_path().display()),
            }),
        }
    }

    async fn ensure_capabilities(
        &self,
        env: &ActiveEnvironment,
        profile: &Profile,
        actions: &mut Vec<SetupAction>,
    ) -> Result<()> {
        let mut manifest_installed = false;

        for cap in &profile.capabilities {
            let present = capability::probe(env, &cap.module, self.runner.as_ref())
                .await
                .unwrap_or_else(|e| {
                    warn!("Probe for {} could not run: {}", cap.module, e);
                    false
                });

            if present {
                debug!("{} is available", cap.name);
                continue;
            }

            match cap.kind {
                CapabilityKind::Mandatory => {
                    return Err(LaunchError::CapabilityMissing {
                        name: cap.name.clone(),
                        remediation: cap.remediation_text(),
                    });
                }
                CapabilityKind::Installable => match &cap.package {
                    Some(package) => {
                        console::notice(&format!("{} is missing, installing {}...", cap.name, package));
                        capability::install_package(env, package, self.runner.as_ref()).await?;
                        actions.push(SetupAction::InstalledPackage(package.clone()));
                    }
                    None if manifest_installed => {
                        debug!("{} should come from the manifest installed earlier", cap.name);
                    }
                    None => {
                        console::notice(&format!("{} is missing, installing dependencies...", cap.name));
                        let manifest = self.base_dir.join(&self.config.environment.manifest);
                        capability::install_manifest(env, &manifest, self.runner.as_ref()).await?;
                        manifest_installed = true;
                        actions.push(SetupAction::InstalledManifest(manifest));
                    }
                },
            }
        }

        Ok(())
    }

    async fn ensure_external_tool(&self, env: &mut ActiveEnvironment, actions: &mut Vec<SetupAction>) -> Result<()> {
        let locator = FFmpegLocator::new(self.config.ffmpeg.clone(), &self.base_dir);

        match locator.check_availability(Some(env), self.runner.as_ref()).await? {
            FFmpegStatus::OnPath => {}
            FFmpegStatus::Local(dir) => env.prepend_search_path(dir),
            FFmpegStatus::Missing => {
                let name = self.tool_installer.tool_name();
                console::notice(&format!("{} not found. Installing it now...", name));
                self.install_tool(&name).await?;
                console::notice(&console::restart_notice(&name));
                actions.push(SetupAction::InstalledTool(name));

                // A fresh local install is not on anyone's PATH yet
                let bin = locator.local_bin_dir();
                if bin.is_dir() {
                    env.prepend_search_path(bin);
                }
            }
        }

        Ok(())
    }

    async fn install_tool(&self, name: &str) -> Result<()> {
        self.tool_installer.install().await.map_err(|e| match e {
            e @ LaunchError::ExternalToolInstallFailed { .. } => e,
            other => LaunchError::ExternalToolInstallFailed {
                tool: name.to_string(),
                detail: other.to_string(),
                manual_url: self.config.ffmpeg.manual_url.clone(),
            },
        })
    }

    async fn launch(&self, env: &ActiveEnvironment, profile: &Profile, args: &[String]) -> Result<i32> {
        let entry = self.base_dir.join(&profile.entry_point);
        let entry_failed = |detail: String| LaunchError::EntryPointFailed {
            entry_point: profile.entry_point.display().to_string(),
            detail,
        };

        if !entry.is_file() {
            return Err(entry_failed(format!("{} does not exist", entry.display())));
        }

        let mut command = env.python_command("Entry point")?.path_arg(&entry);
        if profile.forward_args {
            command = command.args(args.iter().cloned());
        } else if !args.is_empty() {
            warn!("This profile does not forward arguments; ignoring {:?}", args);
        }

        info!("Launching {}", command.display());
        let code = self
            .runner
            .run_attached(&command)
            .await
            .map_err(|e| entry_failed(e.to_string()))?;

        if code != 0 {
            warn!("{} exited with code {}", profile.entry_point.display(), code);
        } else {
            info!("{} finished", profile.entry_point.display());
        }
        Ok(code)
    }

    /// Probe everything `run` would check, changing nothing.
    pub async fn check(&self, profile: &Profile) -> ReadinessReport {
        let venv = self.venv();
        let entry_point = self.base_dir.join(&profile.entry_point);
        let environment = &self.config.environment;

        let mut report = ReadinessReport {
            interpreter: None,
            interpreter_error: None,
            environment: venv.root().to_path_buf(),
            environment_present: venv.exists(),
            environment_required: environment.create_if_missing
                || environment.activation == ActivationPolicy::Required,
            capabilities: Vec::new(),
            external_tool: None,
            entry_point_present: entry_point.is_file(),
            entry_point,
        };

        let interpreter = match interpreter::locate(&self.config.python, self.runner.as_ref()).await {
            Ok(interpreter) => interpreter,
            Err(e) => {
                report.interpreter_error = Some(e.to_string());
                return report;
            }
        };

        let env = if report.environment_present {
            ActiveEnvironment::activated(&venv, &self.base_dir)
        } else {
            ActiveEnvironment::ambient(&interpreter, &self.base_dir)
        };
        report.interpreter = Some(interpreter);

        for cap in &profile.capabilities {
            let present = capability::probe(&env, &cap.module, self.runner.as_ref())
                .await
                .unwrap_or(false);
            report.capabilities.push(CapabilityStatus {
                name: cap.name.clone(),
                module: cap.module.clone(),
                kind: cap.kind,
                present,
            });
        }

        if profile.requires_external_tool {
            let locator = FFmpegLocator::new(self.config.ffmpeg.clone(), &self.base_dir);
            let status = locator
                .check_availability(Some(&env), self.runner.as_ref())
                .await
                .unwrap_or(FFmpegStatus::Missing);
            report.external_tool = Some(status);
        }

        report
    }

    /// Install the external tool unless it is already usable.
    pub async fn install_external_tool(&self) -> Result<Vec<SetupAction>> {
        let locator = FFmpegLocator::new(self.config.ffmpeg.clone(), &self.base_dir);
        let name = self.tool_installer.tool_name();

        match locator.check_availability(None, self.runner.as_ref()).await? {
            FFmpegStatus::OnPath => {
                console::notice(&format!("{} already installed and working!", name));
                Ok(Vec::new())
            }
            FFmpegStatus::Local(dir) => {
                console::notice(&format!("{} already installed in {}", name, dir.display()));
                Ok(Vec::new())
            }
            FFmpegStatus::Missing => {
                self.install_tool(&name).await?;
                console::notice(&console::restart_notice(&name));
                Ok(vec![SetupAction::InstalledTool(name)])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CapabilityConfig;
    use crate::ffmpeg::MockToolInstaller;
    use crate::process::{CommandOutput, MockProcessRunner, ProcessCommand};
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.python.candidates = vec!["python".to_string()];
        config
    }

    fn bootstrapper(config: Config, dir: &Path, runner: MockProcessRunner, installer: MockToolInstaller) -> Bootstrapper {
        Bootstrapper::with_installer(config, dir, Arc::new(runner), Box::new(installer))
    }

    fn profile(entry: &str, capabilities: Vec<CapabilityConfig>) -> Profile {
        Profile {
            description: String::new(),
            entry_point: PathBuf::from(entry),
            forward_args: false,
            requires_external_tool: false,
            capabilities,
        }
    }

    fn is_version_probe(cmd: &ProcessCommand) -> bool {
        cmd.has_arg("--version")
    }

    fn launches(cmd: &ProcessCommand, entry: &str) -> bool {
        cmd.args.first().is_some_and(|a| a.ends_with(entry))
    }

    fn expect_python(runner: &mut MockProcessRunner) {
        runner
            .expect_output()
            .withf(is_version_probe)
            .returning(|_| Ok(CommandOutput::ok("Python 3.11.9\n")));
    }

    /// Lay out a venv the way `python -m venv` would on this host
    fn make_venv(dir: &Path) {
        let python = VirtualEnv::new(dir.join("venv")).interpreter_path();
        std::fs::create_dir_all(python.parent().unwrap()).unwrap();
        std::fs::write(python, "").unwrap();
    }

    fn no_installer() -> MockToolInstaller {
        let mut installer = MockToolInstaller::new();
        installer.expect_install().never();
        installer.expect_tool_name().returning(|| "FFmpeg".to_string());
        installer
    }

    #[tokio::test]
    async fn test_missing_interpreter_stops_before_environment() {
        let temp = TempDir::new().unwrap();
        temp.child("gui.py").touch().unwrap();

        let mut runner = MockProcessRunner::new();
        runner.expect_output().withf(is_version_probe).times(1).returning(|_| {
            Err(LaunchError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "python")))
        });
        runner.expect_run_attached().never();

        let boot = bootstrapper(test_config(), temp.path(), runner, no_installer());
        let err = boot.run(&profile("gui.py", vec![]), &[]).await.unwrap_err();

        assert!(matches!(err, LaunchError::InterpreterMissing { .. }));
        assert_ne!(err.exit_code(), 0);
        assert!(!temp.path().join("venv").exists());
    }

    #[tokio::test]
    async fn test_environment_creation_failure_aborts() {
        let temp = TempDir::new().unwrap();
        temp.child("gui.py").touch().unwrap();

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("venv"))
            .times(1)
            .returning(|_| Ok(CommandOutput::failed(1, "Error: Command returned non-zero exit status 1.")));
        runner.expect_output().withf(|cmd| cmd.has_arg("-c")).never();
        runner.expect_run_attached().never();

        let caps = vec![CapabilityConfig::installable("Flet", "flet", Some("flet"))];
        let boot = bootstrapper(test_config(), temp.path(), runner, no_installer());
        let err = boot.run(&profile("gui.py", caps), &[]).await.unwrap_err();

        assert!(matches!(err, LaunchError::EnvironmentCreateFailed { .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_mandatory_capability_is_never_installed() {
        let temp = TempDir::new().unwrap();
        temp.child("gui.py").touch().unwrap();
        make_venv(temp.path());

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("import tkinter"))
            .times(1)
            .returning(|_| Ok(CommandOutput::failed(1, "ModuleNotFoundError: No module named 'tkinter'")));
        runner.expect_run_attached().never();

        let caps = vec![CapabilityConfig::mandatory("Tkinter", "tkinter", "Reinstall Python with tcl/tk")];
        let boot = bootstrapper(test_config(), temp.path(), runner, no_installer());
        let err = boot.run(&profile("gui.py", caps), &[]).await.unwrap_err();

        match err {
            LaunchError::CapabilityMissing { name, remediation } => {
                assert_eq!(name, "Tkinter");
                assert_eq!(remediation, "Reinstall Python with tcl/tk");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_package_is_installed_once_then_launched() {
        let temp = TempDir::new().unwrap();
        temp.child("main_gui.py").touch().unwrap();
        make_venv(temp.path());

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("import flet"))
            .times(1)
            .returning(|_| Ok(CommandOutput::failed(1, "No module named 'flet'")));
        runner
            .expect_run_attached()
            .withf(|cmd| cmd.has_arg("pip") && cmd.has_arg("flet"))
            .times(1)
            .returning(|_| Ok(0));
        runner
            .expect_run_attached()
            .withf(|cmd| launches(cmd, "main_gui.py"))
            .times(1)
            .returning(|_| Ok(0));

        let caps = vec![CapabilityConfig::installable("Flet", "flet", Some("flet"))];
        let boot = bootstrapper(test_config(), temp.path(), runner, no_installer());
        let outcome = boot.run(&profile("main_gui.py", caps), &[]).await.unwrap();

        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.actions, vec![SetupAction::InstalledPackage("flet".to_string())]);
        assert!(!outcome.hold_terminal);
    }

    #[tokio::test]
    async fn test_failed_install_aborts_before_launch() {
        let temp = TempDir::new().unwrap();
        temp.child("main_gui.py").touch().unwrap();
        make_venv(temp.path());

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("-c"))
            .returning(|_| Ok(CommandOutput::failed(1, "")));
        runner
            .expect_run_attached()
            .withf(|cmd| cmd.has_arg("pip"))
            .times(1)
            .returning(|_| Ok(1));
        runner
            .expect_run_attached()
            .withf(|cmd| launches(cmd, "main_gui.py"))
            .never();

        let caps = vec![CapabilityConfig::installable("Flet", "flet", Some("flet"))];
        let boot = bootstrapper(test_config(), temp.path(), runner, no_installer());
        let err = boot.run(&profile("main_gui.py", caps), &[]).await.unwrap_err();

        assert!(matches!(err, LaunchError::DependencyInstallFailed { .. }));
        assert!(err.remediation().contains("network"));
    }

    #[tokio::test]
    async fn test_fresh_host_creates_installs_and_launches() {
        let temp = TempDir::new().unwrap();
        temp.child("main.py").touch().unwrap();
        temp.child("requirements.txt").write_str("rich\nopenai-whisper\n").unwrap();

        let venv_root = temp.path().join("venv");
        let base = temp.path().to_path_buf();

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("venv"))
            .times(1)
            .returning(move |_| {
                make_venv(&base);
                Ok(CommandOutput::ok(""))
            });
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("-c"))
            .times(2)
            .returning(|_| Ok(CommandOutput::failed(1, "ModuleNotFoundError")));
        runner
            .expect_run_attached()
            .withf(|cmd| cmd.has_arg("-r"))
            .times(1)
            .returning(|_| Ok(0));
        runner
            .expect_run_attached()
            .withf(|cmd| launches(cmd, "main.py"))
            .times(1)
            .returning(|cmd| {
                assert!(cmd.envs.iter().any(|(k, _)| k == "VIRTUAL_ENV"));
                Ok(3)
            });

        let caps = vec![
            CapabilityConfig::installable("Rich console", "rich", None),
            CapabilityConfig::installable("Whisper", "whisper", None),
        ];
        let boot = bootstrapper(test_config(), temp.path(), runner, no_installer());
        let outcome = boot.run(&profile("main.py", caps), &[]).await.unwrap();

        assert_eq!(outcome.exit_code, 3);
        assert_eq!(
            outcome.actions,
            vec![
                SetupAction::CreatedEnvironment(venv_root),
                SetupAction::InstalledManifest(temp.path().join("requirements.txt")),
            ]
        );
    }

    #[tokio::test]
    async fn test_ready_host_has_no_side_effects_across_runs() {
        let temp = TempDir::new().unwrap();
        temp.child("youtube_cli.py").touch().unwrap();
        make_venv(temp.path());

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner.expect_output().withf(|cmd| cmd.has_arg("venv")).never();
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("import yt_dlp"))
            .times(2)
            .returning(|_| Ok(CommandOutput::ok("")));
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("-version"))
            .times(2)
            .returning(|_| Ok(CommandOutput::ok("ffmpeg version 7.0")));
        runner.expect_run_attached().withf(|cmd| cmd.has_arg("pip")).never();
        runner
            .expect_run_attached()
            .withf(|cmd| launches(cmd, "youtube_cli.py"))
            .times(2)
            .returning(|cmd| {
                assert_eq!(&cmd.args[1..], ["--url", "https://youtu.be/x", "--full"]);
                Ok(0)
            });

        let config = test_config();
        let youtube = config.profile(Some("youtube")).unwrap().clone();
        let boot = bootstrapper(config, temp.path(), runner, no_installer());
        let args: Vec<String> = ["--url", "https://youtu.be/x", "--full"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for _ in 0..2 {
            let outcome = boot.run(&youtube, &args).await.unwrap();
            assert_eq!(outcome.exit_code, 0);
            assert!(outcome.actions.is_empty());
        }
    }

    #[tokio::test]
    async fn test_failing_entry_point_holds_terminal() {
        let temp = TempDir::new().unwrap();
        temp.child("gui.py").touch().unwrap();
        make_venv(temp.path());

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner
            .expect_run_attached()
            .withf(|cmd| launches(cmd, "gui.py"))
            .times(1)
            .returning(|cmd| {
                assert_eq!(cmd.args.len(), 1);
                Ok(1)
            });

        let boot = bootstrapper(test_config(), temp.path(), runner, no_installer());
        let outcome = boot
            .run(&profile("gui.py", vec![]), &["ignored".to_string()])
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, 1);
        assert!(outcome.hold_terminal);
    }

    #[tokio::test]
    async fn test_missing_entry_point() {
        let temp = TempDir::new().unwrap();
        make_venv(temp.path());

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner.expect_run_attached().never();

        let boot = bootstrapper(test_config(), temp.path(), runner, no_installer());
        let err = boot.run(&profile("gui.py", vec![]), &[]).await.unwrap_err();
        assert_eq!(err.exit_code(), 7);
    }

    #[tokio::test]
    async fn test_activation_policy_without_environment() {
        let temp = TempDir::new().unwrap();
        temp.child("gui.py").touch().unwrap();

        let mut config = test_config();
        config.environment.create_if_missing = false;

        // best-effort: falls back to the ambient interpreter
        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner
            .expect_run_attached()
            .withf(|cmd| cmd.program == "python" && launches(cmd, "gui.py"))
            .times(1)
            .returning(|cmd| {
                assert!(cmd.envs.is_empty());
                Ok(0)
            });
        let boot = bootstrapper(config.clone(), temp.path(), runner, no_installer());
        let outcome = boot.run(&profile("gui.py", vec![]), &[]).await.unwrap();
        assert!(outcome.actions.is_empty());

        // required: missing environment is fatal
        config.environment.activation = ActivationPolicy::Required;
        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner.expect_run_attached().never();
        let boot = bootstrapper(config, temp.path(), runner, no_installer());
        let err = boot.run(&profile("gui.py", vec![]), &[]).await.unwrap_err();
        assert!(matches!(err, LaunchError::EnvironmentCreateFailed { .. }));
    }

    #[tokio::test]
    async fn test_external_tool_install_failure() {
        let temp = TempDir::new().unwrap();
        temp.child("youtube_cli.py").touch().unwrap();
        make_venv(temp.path());

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("-c"))
            .returning(|_| Ok(CommandOutput::ok("")));
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("-version"))
            .times(1)
            .returning(|_| Ok(CommandOutput::failed(1, "")));
        runner.expect_run_attached().never();

        let mut installer = MockToolInstaller::new();
        installer.expect_tool_name().returning(|| "FFmpeg".to_string());
        installer
            .expect_install()
            .times(1)
            .returning(|| Err(LaunchError::Config("download interrupted".to_string())));

        let config = test_config();
        let youtube = config.profile(Some("youtube")).unwrap().clone();
        let boot = bootstrapper(config, temp.path(), runner, installer);
        let err = boot.run(&youtube, &[]).await.unwrap_err();

        assert_eq!(err.exit_code(), 6);
        assert!(err.to_string().contains("download interrupted"));
    }

    #[tokio::test]
    async fn test_external_tool_installed_and_put_on_path() {
        let temp = TempDir::new().unwrap();
        temp.child("youtube_cli.py").touch().unwrap();
        make_venv(temp.path());
        let bin_dir = temp.path().join("ffmpeg").join("bin");

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("-c"))
            .returning(|_| Ok(CommandOutput::ok("")));
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("-version"))
            .times(1)
            .returning(|_| Ok(CommandOutput::failed(1, "")));
        let expected_bin = bin_dir.clone();
        runner
            .expect_run_attached()
            .withf(|cmd| launches(cmd, "youtube_cli.py"))
            .times(1)
            .returning(move |cmd| {
                let path = &cmd.envs.iter().find(|(k, _)| k == "PATH").unwrap().1;
                assert_eq!(std::env::split_paths(path).next().unwrap(), expected_bin);
                Ok(0)
            });

        let mut installer = MockToolInstaller::new();
        installer.expect_tool_name().returning(|| "FFmpeg".to_string());
        let created_bin = bin_dir.clone();
        installer.expect_install().times(1).returning(move || {
            std::fs::create_dir_all(&created_bin).unwrap();
            Ok(())
        });

        let config = test_config();
        let youtube = config.profile(Some("youtube")).unwrap().clone();
        let boot = bootstrapper(config, temp.path(), runner, installer);
        let outcome = boot.run(&youtube, &[]).await.unwrap();

        assert_eq!(outcome.actions, vec![SetupAction::InstalledTool("FFmpeg".to_string())]);
    }

    #[tokio::test]
    async fn test_check_reports_without_changes() {
        let temp = TempDir::new().unwrap();
        temp.child("gui_youtube.py").touch().unwrap();

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("import tkinter"))
            .returning(|_| Ok(CommandOutput::ok("")));
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("import yt_dlp"))
            .returning(|_| Ok(CommandOutput::failed(1, "")));
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("-version"))
            .returning(|_| Ok(CommandOutput::ok("ffmpeg version 7.0")));
        runner.expect_output().withf(|cmd| cmd.has_arg("venv")).never();
        runner.expect_run_attached().never();

        let config = test_config();
        let profile = config.profile(Some("youtube-gui")).unwrap().clone();
        let boot = bootstrapper(config, temp.path(), runner, no_installer());
        let report = boot.check(&profile).await;

        assert!(report.interpreter.is_some());
        assert!(!report.environment_present);
        assert_eq!(report.capabilities.len(), 2);
        assert!(report.capabilities[0].present);
        assert!(!report.capabilities[1].present);
        assert_eq!(report.external_tool, Some(FFmpegStatus::OnPath));
        assert!(!report.is_ready());
        assert!(!temp.path().join("venv").exists());
    }

    #[tokio::test]
    async fn test_install_external_tool_skips_when_present() {
        let temp = TempDir::new().unwrap();

        let mut runner = MockProcessRunner::new();
        runner
            .expect_output()
            .withf(|cmd| cmd.program == "ffmpeg")
            .times(1)
            .returning(|_| Ok(CommandOutput::ok("ffmpeg version 7.0")));

        let boot = bootstrapper(test_config(), temp.path(), runner, no_installer());
        let actions = boot.install_external_tool().await.unwrap();
        assert!(actions.is_empty());
    }

    fn upgrades_pip(cmd: &ProcessCommand) -> bool {
        cmd.has_arg("--upgrade") && cmd.has_arg("pip")
    }

    #[tokio::test]
    async fn test_pip_upgraded_once_after_creating_environment() {
        let temp = TempDir::new().unwrap();
        temp.child("gui.py").touch().unwrap();
        let base = temp.path().to_path_buf();

        let mut config = test_config();
        config.environment.upgrade_pip = true;

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("venv"))
            .times(1)
            .returning(move |_| {
                make_venv(&base);
                Ok(CommandOutput::ok(""))
            });
        runner
            .expect_run_attached()
            .withf(upgrades_pip)
            .times(1)
            .returning(|cmd| {
                assert!(cmd.envs.iter().any(|(k, _)| k == "VIRTUAL_ENV"));
                Ok(0)
            });
        runner
            .expect_run_attached()
            .withf(|cmd| launches(cmd, "gui.py"))
            .times(2)
            .returning(|_| Ok(0));

        let boot = bootstrapper(config, temp.path(), runner, no_installer());
        let outcome = boot.run(&profile("gui.py", vec![]), &[]).await.unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.actions.len(), 1);

        // Second run finds the environment and leaves pip alone
        let outcome = boot.run(&profile("gui.py", vec![]), &[]).await.unwrap();
        assert!(outcome.actions.is_empty());
    }

    #[tokio::test]
    async fn test_pip_not_upgraded_for_existing_environment() {
        let temp = TempDir::new().unwrap();
        temp.child("gui.py").touch().unwrap();
        make_venv(temp.path());

        let mut config = test_config();
        config.environment.upgrade_pip = true;

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner.expect_output().withf(|cmd| cmd.has_arg("venv")).never();
        runner.expect_run_attached().withf(upgrades_pip).never();
        runner
            .expect_run_attached()
            .withf(|cmd| launches(cmd, "gui.py"))
            .times(1)
            .returning(|_| Ok(0));

        let boot = bootstrapper(config, temp.path(), runner, no_installer());
        let outcome = boot.run(&profile("gui.py", vec![]), &[]).await.unwrap();
        assert!(outcome.actions.is_empty());
    }

    #[tokio::test]
    async fn test_failed_pip_upgrade_aborts() {
        let temp = TempDir::new().unwrap();
        temp.child("gui.py").touch().unwrap();
        let base = temp.path().to_path_buf();

        let mut config = test_config();
        config.environment.upgrade_pip = true;

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("venv"))
            .times(1)
            .returning(move |_| {
                make_venv(&base);
                Ok(CommandOutput::ok(""))
            });
        runner.expect_run_attached().withf(upgrades_pip).times(1).returning(|_| Ok(1));
        runner
            .expect_run_attached()
            .withf(|cmd| launches(cmd, "gui.py"))
            .never();

        let boot = bootstrapper(config, temp.path(), runner, no_installer());
        let err = boot.run(&profile("gui.py", vec![]), &[]).await.unwrap_err();

        assert!(matches!(err, LaunchError::DependencyInstallFailed { ref target, .. } if target == "pip"));
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn test_configured_installer_command_is_used() {
        let temp = TempDir::new().unwrap();
        temp.child("youtube_cli.py").touch().unwrap();
        make_venv(temp.path());

        let mut config = test_config();
        config.ffmpeg.installer = Some(vec!["python".to_string(), "install_ffmpeg.py".to_string()]);
        let youtube = config.profile(Some("youtube")).unwrap().clone();

        let mut runner = MockProcessRunner::new();
        expect_python(&mut runner);
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("-c"))
            .returning(|_| Ok(CommandOutput::ok("")));
        runner
            .expect_output()
            .withf(|cmd| cmd.has_arg("-version"))
            .times(1)
            .returning(|_| Ok(CommandOutput::failed(1, "")));
        runner
            .expect_run_attached()
            .withf(|cmd| cmd.has_arg("install_ffmpeg.py"))
            .times(1)
            .returning(|_| Ok(0));
        runner
            .expect_run_attached()
            .withf(|cmd| launches(cmd, "youtube_cli.py"))
            .times(1)
            .returning(|_| Ok(0));

        let boot = Bootstrapper::new(config, temp.path(), Arc::new(runner));
        let outcome = boot.run(&youtube, &[]).await.unwrap();

        assert_eq!(outcome.actions, vec![SetupAction::InstalledTool("FFmpeg".to_string())]);
    }
}
