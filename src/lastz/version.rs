// src/lastz/version.rs

use std::process::{Command, Stdio};

pub const UNKNOWN_VERSION: &str = "Could not determine Lastz version";

/// First line mentioning "version", case-insensitively.
pub fn version_line(text: &str) -> Option<&str> {
    text.lines()
        .map(str::trim)
        .find(|line| line.to_ascii_lowercase().contains("version"))
}

/// Ask `<binary> -v` for its version banner.
///
/// Returns `None` when the binary cannot be started or prints no version line.
pub fn detect_version(binary: &str) -> Option<String> {
    let output = match Command::new(binary)
        .arg("-v")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            log::debug!("Could not run {} -v: {}", binary, e);
            return None;
        }
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    version_line(&stdout).map(str::to_string)
}
