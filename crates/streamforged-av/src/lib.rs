//! # streamforged-av
//!
//! Everything that touches external transcoder processes:
//!
//! - [`tools`]: locating ffmpeg and friends on the host
//! - [`template`]: expanding `%s`/`%b`/... placeholders in rule templates
//! - [`chain`]: running one or two piped stages as a single [`std::io::Read`]
//!
//! ## Example
//!
//! ```no_run
//! use std::io::Read;
//! use streamforged_av::{CommandTemplate, StageCommand, TranscodeChain, TranscodeVars};
//!
//! let template = CommandTemplate::new("ffmpeg -i %s -b:a %bk -f mp3 -");
//! let vars = TranscodeVars {
//!     source: "/music/track.flac".into(),
//!     bit_rate: 128,
//!     ..Default::default()
//! };
//! let argv = template.render(&vars);
//! let stage = StageCommand::new(&argv[0]).args(argv[1..].iter().cloned());
//!
//! let mut chain = TranscodeChain::spawn(vec![stage], None)?;
//! let mut mp3 = Vec::new();
//! chain.read_to_end(&mut mp3)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod chain;
mod error;
pub mod template;
pub mod tools;

// Re-exports
pub use chain::{StageCommand, TranscodeChain};
pub use error::{Error, Result};
pub use template::{CommandTemplate, TranscodeVars};
pub use tools::{check_tool, check_tools, require_tool, resolve_program, ToolInfo};
