//! Launchkit - Python Application Launcher
//!
//! One configurable bootstrapper in place of a pile of batch launchers:
//! find Python, make sure the virtual environment and dependencies are
//! there, provide FFmpeg when needed, then start the program.

pub mod bootstrap;
pub mod capability;
pub mod cli;
pub mod config;
pub mod console;
pub mod environment;
pub mod error;
pub mod ffmpeg;
pub mod installer;
pub mod interpreter;
pub mod process;
