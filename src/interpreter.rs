//! Locating a usable Python interpreter.
//!
//! Candidates are probed with `--version` in the configured order. The
//! first one that answers with a version at least `min_version` wins.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::PythonConfig;
use crate::error::{LaunchError, Result};
use crate::process::{ProcessCommand, ProcessRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PythonVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parse the banner printed by `python --version`, e.g. `Python 3.11.4`.
    /// Pre-release suffixes (`3.13.0rc1`) are ignored.
    pub fn from_banner(banner: &str) -> Option<Self> {
        let rest = banner.trim().strip_prefix("Python")?.trim();
        let token = rest.split_whitespace().next()?;
        token.parse().ok()
    }
}

impl FromStr for PythonVersion {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || LaunchError::Config(format!("Invalid Python version '{}'", s));

        let mut parts = s.trim().splitn(3, '.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = match parts.next() {
            Some(p) => leading_number(p).ok_or_else(invalid)?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => leading_number(p).ok_or_else(invalid)?,
            None => 0,
        };

        Ok(Self::new(major, minor, patch))
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn leading_number(part: &str) -> Option<u32> {
    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// An interpreter that answered the version probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interpreter {
    pub program: String,
    pub version: PythonVersion,
    /// Where `program` resolves on PATH, when it does
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
}

/// Probe the configured candidates and return the first acceptable interpreter.
pub async fn locate(config: &PythonConfig, runner: &dyn ProcessRunner) -> Result<Interpreter> {
    let required: PythonVersion = config.min_version.parse()?;
    let mut too_old: Vec<String> = Vec::new();

    for candidate in &config.candidates {
        let location = which::which(candidate).ok();
        let shown = match &location {
            Some(path) => format!("{} ({})", candidate, path.display()),
            None => candidate.clone(),
        };

        let probe = ProcessCommand::new(candidate.as_str(), "Python version probe").arg("--version");
        let output = match runner.output(&probe).await {
            Ok(output) => output,
            Err(e) => {
                debug!("{} is not invocable: {}", shown, e);
                continue;
            }
        };

        if !output.success() {
            // The Windows Store alias answers this way when no real Python is installed
            debug!("{} --version failed: {}", shown, output.summary());
            continue;
        }

        // Python 2 prints the banner on stderr
        let version = PythonVersion::from_banner(&output.stdout)
            .or_else(|| PythonVersion::from_banner(&output.stderr));

        match version {
            Some(version) if version >= required => {
                info!("Using {}, Python {}", shown, version);
                return Ok(Interpreter {
                    program: candidate.clone(),
                    version,
                    location,
                });
            }
            Some(version) => {
                warn!("{} is Python {}, need {} or newer", shown, version, required);
                too_old.push(format!("{} is Python {}", shown, version));
            }
            None => {
                warn!("Could not read the version reported by {}", shown);
            }
        }
    }

    let detail = if too_old.is_empty() {
        format!("none of {} could be started", config.candidates.join(", "))
    } else {
        too_old.join("; ")
    };

    Err(LaunchError::InterpreterMissing {
        required: config.min_version.clone(),
        detail,
        download_url: config.download_url.clone(),
    })
}
