use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Defaults to `run` with the default profile
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Prepare the environment and start the program
    Run {
        /// Launch profile
        #[arg(short, long)]
        profile: Option<String>,

        /// Arguments passed to the program (profiles that forward arguments only)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Report what is missing without installing anything
    Check {
        /// Launch profile
        #[arg(short, long)]
        profile: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List launch profiles
    Profiles,

    /// Download FFmpeg into the project directory and add it to PATH
    InstallFfmpeg,

    /// Write the effective configuration to launchkit.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Args {
    /// The subcommand to execute; no subcommand means `run`
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run {
            profile: None,
            args: Vec::new(),
        })
    }
}
