//! Messages meant for the person sitting at the console.
//!
//! Logs go through `tracing`; these go straight to stdout/stderr because
//! the operator may have launched us by double-clicking and will only read
//! what stays on screen.

use std::io::{self, BufRead, IsTerminal, Write};

use crate::error::LaunchError;

pub fn notice(message: &str) {
    println!("{}", message);
}

/// Shown after installing an external tool, whichever installer ran
pub fn restart_notice(tool: &str) -> String {
    format!(
        "{} is ready for programs started by this launcher. Restart any other open terminal before using it there.",
        tool
    )
}

/// Diagnostic plus remediation for a failed bootstrap step
pub fn render_failure(err: &LaunchError) -> String {
    let rule = "=".repeat(60);
    format!(
        "\n{rule}\n[ERROR] {err}\n\nWhat to do:\n  {}\n{rule}\n",
        err.remediation()
    )
}

pub fn report_failure(err: &LaunchError) {
    eprintln!("{}", render_failure(err));
}

/// Hold the window open until Enter is pressed. No-op without a terminal.
pub fn pause() {
    if !io::stdin().is_terminal() {
        return;
    }

    print!("Press Enter to close this window...");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}
