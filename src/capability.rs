use std::path::Path;
use tracing::{debug, info};

use crate::environment::ActiveEnvironment;
use crate::error::{LaunchError, Result};
use crate::process::{ProcessCommand, ProcessRunner};

/// `python -c "import <module>"` inside the active environment.
pub async fn probe(env: &ActiveEnvironment, module: &str, runner: &dyn ProcessRunner) -> Result<bool> {
    let command = env
        .python_command("Capability probe")?
        .arg("-c")
        .arg(format!("import {}", module));

    let output = runner.output(&command).await?;
    debug!("import {} -> {:?}", module, output.code);
    Ok(output.success())
}

/// `python -m pip install <package>`; output goes straight to the console.
pub async fn install_package(env: &ActiveEnvironment, package: &str, runner: &dyn ProcessRunner) -> Result<()> {
    info!("Installing {}...", package);

    let command = env
        .python_command("Install package")?
        .args(["-m", "pip", "install", package]);

    run_install(command, package, runner).await
}

/// `python -m pip install -r <manifest>`
pub async fn install_manifest(env: &ActiveEnvironment, manifest: &Path, runner: &dyn ProcessRunner) -> Result<()> {
    let target = manifest.display().to_string();

    if !manifest.is_file() {
        return Err(LaunchError::DependencyInstallFailed {
            target,
            detail: "the requirements file does not exist".to_string(),
        });
    }

    info!("Installing dependencies from {}...", target);

    let command = env
        .python_command("Install requirements")?
        .args(["-m", "pip", "install", "-r"])
        .path_arg(manifest);

    run_install(command, &target, runner).await
}

/// `python -m pip install --upgrade pip`
pub async fn upgrade_pip(env: &ActiveEnvironment, runner: &dyn ProcessRunner) -> Result<()> {
    let command = env
        .python_command("Upgrade pip")?
        .args(["-m", "pip", "install", "--upgrade", "pip"]);

    run_install(command, "pip", runner).await
}

async fn run_install(
    command: ProcessCommand,
    target: &str,
    runner: &dyn ProcessRunner,
) -> Result<()> {
    let code = runner
        .run_attached(&command)
        .await
        .map_err(|e| LaunchError::DependencyInstallFailed {
            target: target.to_string(),
            detail: e.to_string(),
        })?;

    if code != 0 {
        return Err(LaunchError::DependencyInstallFailed {
            target: target.to_string(),
            detail: format!("pip exited with code {}", code),
        });
    }

    info!("Installed {}", target);
    Ok(())
}
