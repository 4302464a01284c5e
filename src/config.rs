use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{LaunchError, Result};

/// File looked up in the launcher directory when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "launchkit.toml";

const TKINTER_REMEDIATION: &str = "Tkinter is part of Python itself. Re-run the Python installer, choose \"Modify\", tick \"tcl/tk and IDLE\", then run this launcher again.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Profile used when none is given on the command line
    pub default_profile: String,
    pub python: PythonConfig,
    pub environment: EnvironmentConfig,
    pub ffmpeg: FFmpegConfig,
    pub launch: LaunchConfig,
    pub profiles: BTreeMap<String, Profile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    /// Interpreter commands tried in order
    pub candidates: Vec<String>,
    /// Oldest acceptable interpreter version
    pub min_version: String,
    /// Where the operator is sent when no interpreter is found
    pub download_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Virtual environment directory, relative to the launcher directory
    pub path: PathBuf,
    /// Create the environment when it does not exist
    pub create_if_missing: bool,
    /// What happens when no environment interpreter can be found
    pub activation: ActivationPolicy,
    /// Requirements manifest used for bulk installs
    pub manifest: PathBuf,
    /// Run `pip install --upgrade pip` right after creating the environment
    pub upgrade_pip: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationPolicy {
    /// Fall back to the interpreter found on PATH
    BestEffort,
    /// Abort when the environment cannot be used
    Required,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FFmpegConfig {
    /// Command probed with `-version`
    pub binary_path: String,
    /// Project-local install directory; binaries end up in `<install_dir>/bin`
    pub install_dir: PathBuf,
    /// Archive downloaded by the built-in installer
    pub download_url: String,
    /// Page for manual installation
    pub manual_url: String,
    /// External installer command; replaces the built-in installer when set
    pub installer: Option<Vec<String>>,
    /// Register `<install_dir>/bin` in the user's persistent PATH after install
    pub persist_path: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Keep the console open when something fails
    pub pause_on_failure: bool,
}

/// One launcher: which checks apply and what gets started afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub description: String,
    /// Script run with the environment interpreter
    pub entry_point: PathBuf,
    /// Pass command line arguments through to the entry point
    #[serde(default)]
    pub forward_args: bool,
    /// Needs FFmpeg reachable before launch
    #[serde(default)]
    pub requires_external_tool: bool,
    #[serde(default)]
    pub capabilities: Vec<CapabilityConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Operator-facing name
    pub name: String,
    /// Python module imported by the probe
    pub module: String,
    pub kind: CapabilityKind,
    /// pip requirement; the manifest is installed when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// Shown when a mandatory capability is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityKind {
    /// Ships with the interpreter; cannot be installed with pip
    Mandatory,
    /// Ordinary package, installed on demand
    Installable,
}

impl Default for PythonConfig {
    fn default() -> Self {
        let candidates = if cfg!(windows) {
            vec!["python".to_string(), "py".to_string()]
        } else {
            vec!["python3".to_string(), "python".to_string()]
        };
        Self {
            candidates,
            min_version: "3.8".to_string(),
            download_url: "https://www.python.org/downloads/".to_string(),
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("venv"),
            create_if_missing: true,
            activation: ActivationPolicy::BestEffort,
            manifest: PathBuf::from("requirements.txt"),
            upgrade_pip: false,
        }
    }
}

impl Default for FFmpegConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            install_dir: PathBuf::from("ffmpeg"),
            download_url: "https://www.gyan.dev/ffmpeg/builds/ffmpeg-release-essentials.zip".to_string(),
            manual_url: "https://www.gyan.dev/ffmpeg/builds/".to_string(),
            installer: None,
            persist_path: true,
        }
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            pause_on_failure: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: "gui".to_string(),
            python: PythonConfig::default(),
            environment: EnvironmentConfig::default(),
            ffmpeg: FFmpegConfig::default(),
            launch: LaunchConfig::default(),
            profiles: builtin_profiles(),
        }
    }
}

impl CapabilityConfig {
    pub fn mandatory(name: &str, module: &str, remediation: &str) -> Self {
        Self {
            name: name.to_string(),
            module: module.to_string(),
            kind: CapabilityKind::Mandatory,
            package: None,
            remediation: Some(remediation.to_string()),
        }
    }

    pub fn installable(name: &str, module: &str, package: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            module: module.to_string(),
            kind: CapabilityKind::Installable,
            package: package.map(str::to_string),
            remediation: None,
        }
    }

    /// Text shown to the operator when this capability is absent
    pub fn remediation_text(&self) -> String {
        match &self.remediation {
            Some(text) => text.clone(),
            None => format!(
                "Install the Python module '{}' into the virtual environment and run this launcher again.",
                self.module
            ),
        }
    }
}

/// The launchers shipped with the trainer, one profile each.
pub fn builtin_profiles() -> BTreeMap<String, Profile> {
    let mut profiles = BTreeMap::new();

    profiles.insert(
        "cli".to_string(),
        Profile {
            description: "Terminal trainer".to_string(),
            entry_point: PathBuf::from("main.py"),
            forward_args: false,
            requires_external_tool: false,
            capabilities: vec![
                CapabilityConfig::installable("Rich console", "rich", None),
                CapabilityConfig::installable("Whisper", "whisper", None),
            ],
        },
    );

    profiles.insert(
        "gui".to_string(),
        Profile {
            description: "Desktop trainer (Tkinter)".to_string(),
            entry_point: PathBuf::from("gui.py"),
            forward_args: false,
            requires_external_tool: false,
            capabilities: vec![
                CapabilityConfig::mandatory("Tkinter", "tkinter", TKINTER_REMEDIATION),
                CapabilityConfig::installable("Whisper", "whisper", None),
            ],
        },
    );

    profiles.insert(
        "modern-gui".to_string(),
        Profile {
            description: "Desktop trainer (Flet)".to_string(),
            entry_point: PathBuf::from("main_gui.py"),
            forward_args: false,
            requires_external_tool: false,
            capabilities: vec![CapabilityConfig::installable("Flet", "flet", Some("flet"))],
        },
    );

    profiles.insert(
        "youtube".to_string(),
        Profile {
            description: "YouTube learning mode (command line)".to_string(),
            entry_point: PathBuf::from("youtube_cli.py"),
            forward_args: true,
            requires_external_tool: true,
            capabilities: vec![CapabilityConfig::installable(
                "yt-dlp",
                "yt_dlp",
                Some("yt-dlp"),
            )],
        },
    );

    profiles.insert(
        "youtube-gui".to_string(),
        Profile {
            description: "YouTube learning mode (Tkinter)".to_string(),
            entry_point: PathBuf::from("gui_youtube.py"),
            forward_args: false,
            requires_external_tool: true,
            capabilities: vec![
                CapabilityConfig::mandatory("Tkinter", "tkinter", TKINTER_REMEDIATION),
                CapabilityConfig::installable("yt-dlp", "yt_dlp", Some("yt-dlp")),
            ],
        },
    );

    profiles
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LaunchError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse a TOML document. Built-in profiles not named in the document stay available.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;

        for (name, profile) in builtin_profiles() {
            config.profiles.entry(name).or_insert(profile);
        }

        config.validate()?;
        Ok(config)
    }

    /// `--config` wins, then `launchkit.toml` in `base_dir`, then defaults.
    pub fn load(explicit: Option<&Path>, base_dir: &Path) -> Result<Self> {
        match explicit {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(path)
            }
            None => {
                let candidate = base_dir.join(CONFIG_FILE_NAME);
                if candidate.exists() {
                    info!("Found {} in {}, loading...", CONFIG_FILE_NAME, base_dir.display());
                    Self::from_file(candidate)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;

        std::fs::write(path, content)
            .map_err(|e| LaunchError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Look up a profile, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<&Profile> {
        let name = name.unwrap_or(&self.default_profile);
        self.profiles.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
            LaunchError::Config(format!(
                "Unknown profile '{}'. Known profiles: {}",
                name,
                known.join(", ")
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.python.candidates.is_empty() {
            return Err(LaunchError::Config(
                "python.candidates must name at least one interpreter".to_string(),
            ));
        }

        if let Some(installer) = &self.ffmpeg.installer {
            if installer.is_empty() {
                return Err(LaunchError::Config(
                    "ffmpeg.installer must not be an empty command".to_string(),
                ));
            }
        }

        for (name, profile) in &self.profiles {
            for capability in &profile.capabilities {
                if !is_module_name(&capability.module) {
                    return Err(LaunchError::Config(format!(
                        "Profile '{}': '{}' is not a valid Python module name",
                        name, capability.module
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Dotted Python identifier, e.g. `yt_dlp` or `PIL.Image`.
fn is_module_name(module: &str) -> bool {
    !module.is_empty()
        && module.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
