//! External tool detection and management.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Information about an external tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// Version string if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Check if a tool is available using a custom version argument.
///
/// # Example
///
/// ```no_run
/// use streamforged_av::check_tool;
///
/// let info = check_tool("ffmpeg", "-version");
/// if info.available {
///     println!("ffmpeg version: {:?}", info.version);
/// }
/// ```
pub fn check_tool(program: impl AsRef<Path>, version_arg: &str) -> ToolInfo {
    let program = program.as_ref();
    let name = program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string());

    match Command::new(program).arg(version_arg).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string());

            ToolInfo {
                name,
                available: true,
                version,
                path: which::which(program).ok(),
            }
        }
        _ => ToolInfo {
            name,
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check the transcoders the default rule set relies on.
///
/// A configured ffmpeg path takes precedence over `PATH` lookup.
pub fn check_tools(ffmpeg_path: Option<&Path>) -> Vec<ToolInfo> {
    let ffmpeg = ffmpeg_path.unwrap_or(Path::new("ffmpeg"));
    vec![
        check_tool(ffmpeg, "-version"),
        check_tool("ffprobe", "-version"),
        check_tool("lame", "--version"),
    ]
}

/// Require that a tool is available, returning its path.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::tool_not_found(name))
}

/// Resolve the program for a command template's first token.
///
/// Absolute or relative paths are used as-is when they exist. A bare name
/// matching a configured override is mapped to that path, otherwise it is
/// looked up on `PATH`.
pub fn resolve_program(name: &str, overrides: &[(String, PathBuf)]) -> Result<PathBuf> {
    if let Some((_, path)) = overrides.iter().find(|(n, _)| n == name) {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let as_path = Path::new(name);
    if as_path.components().count() > 1 {
        return if as_path.exists() {
            Ok(as_path.to_path_buf())
        } else {
            Err(Error::tool_not_found(name))
        };
    }

    require_tool(name)
}
