use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Python {required} or newer was not found: {detail}")]
    InterpreterMissing {
        required: String,
        detail: String,
        download_url: String,
    },

    #[error("Failed to create virtual environment at {path}: {detail}")]
    EnvironmentCreateFailed { path: String, detail: String },

    #[error("Required component '{name}' is not available")]
    CapabilityMissing { name: String, remediation: String },

    #[error("Failed to install {target}: {detail}")]
    DependencyInstallFailed { target: String, detail: String },

    #[error("Failed to install {tool}: {detail}")]
    ExternalToolInstallFailed {
        tool: String,
        detail: String,
        manual_url: String,
    },

    #[error("Failed to start {entry_point}: {detail}")]
    EntryPointFailed { entry_point: String, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LaunchError {
    /// Process exit code reported for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::InterpreterMissing { .. } => 2,
            LaunchError::EnvironmentCreateFailed { .. } => 3,
            LaunchError::CapabilityMissing { .. } => 4,
            LaunchError::DependencyInstallFailed { .. } => 5,
            LaunchError::ExternalToolInstallFailed { .. } => 6,
            LaunchError::EntryPointFailed { .. } => 7,
            _ => 1,
        }
    }

    /// What the operator should do about it, in plain words.
    pub fn remediation(&self) -> String {
        match self {
            LaunchError::InterpreterMissing {
                required,
                download_url,
                ..
            } => format!(
                "Install Python {} or newer from {} and tick \"Add python.exe to PATH\" during setup, then run this launcher again.",
                required, download_url
            ),
            LaunchError::EnvironmentCreateFailed { path, .. } => format!(
                "Delete the '{}' folder if it exists and run this launcher again. If it keeps failing, reinstall Python.",
                path
            ),
            LaunchError::CapabilityMissing { remediation, .. } => remediation.clone(),
            LaunchError::DependencyInstallFailed { .. } => {
                "Check your network connection and run this launcher again.".to_string()
            }
            LaunchError::ExternalToolInstallFailed { manual_url, .. } => format!(
                "Check your network connection and try again, or download it manually from {}. After changing PATH, restart the terminal.",
                manual_url
            ),
            LaunchError::EntryPointFailed { entry_point, .. } => format!(
                "Make sure '{}' exists next to this launcher and is not blocked by antivirus software.",
                entry_point
            ),
            LaunchError::Config(_) | LaunchError::Toml(_) | LaunchError::TomlSer(_) => {
                "Fix or delete launchkit.toml and run this launcher again.".to_string()
            }
            LaunchError::Http(_) => {
                "Check your network connection and run this launcher again.".to_string()
            }
            _ => "Run again with --verbose and check the log in .launchkit/log.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LaunchError>;
