//! Placeholder substitution for transcoder command templates.
//!
//! A template is a whitespace-separated command line such as
//! `ffmpeg -i %s -ss %o -b:a %bk -f mp3 -`. Each token is expanded
//! independently, so substituted values containing spaces (paths, titles)
//! stay a single argument.
//!
//! | Placeholder | Value |
//! |---|---|
//! | `%s` | source file path |
//! | `%b` | max bitrate (kbps) |
//! | `%t` | title |
//! | `%l` | album |
//! | `%a` | artist |
//! | `%o` | time offset (seconds) |
//! | `%d` | duration (seconds) |
//! | `%w` | width |
//! | `%h` | height |
//! | `%f` | target format |

use std::fmt;
use std::path::PathBuf;

/// Values available to a command template.
#[derive(Debug, Clone, Default)]
pub struct TranscodeVars {
    pub source: PathBuf,
    pub bit_rate: u32,
    pub title: String,
    pub album: String,
    pub artist: String,
    pub time_offset: u32,
    pub duration: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: String,
}

impl TranscodeVars {
    fn lookup(&self, key: char) -> Option<String> {
        let value = match key {
            's' => self.source.display().to_string(),
            'b' => self.bit_rate.to_string(),
            't' => self.title.clone(),
            'l' => self.album.clone(),
            'a' => self.artist.clone(),
            'o' => self.time_offset.to_string(),
            'd' => self.duration.map(|d| d.to_string()).unwrap_or_default(),
            'w' => self.width.map(|w| w.to_string()).unwrap_or_default(),
            'h' => self.height.map(|h| h.to_string()).unwrap_or_default(),
            'f' => self.format.clone(),
            _ => return None,
        };
        Some(value)
    }
}

/// One stage of a transcoding rule, kept as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate(String);

impl CommandTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the program (first token), if any.
    pub fn program(&self) -> Option<&str> {
        self.0.split_whitespace().next()
    }

    /// Whether the output bitrate is pinned by the `%b` placeholder.
    pub fn references_bit_rate(&self) -> bool {
        self.0.contains("%b")
    }

    /// Expand into an argv, first element being the program name.
    pub fn render(&self, vars: &TranscodeVars) -> Vec<String> {
        self.0
            .split_whitespace()
            .map(|token| substitute(token, vars))
            .collect()
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Expand `%x` placeholders in one token. Unknown placeholders and a
/// trailing `%` are kept literally.
fn substitute(token: &str, vars: &TranscodeVars) -> String {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek().and_then(|&k| vars.lookup(k)) {
            Some(value) => {
                out.push_str(&value);
                chars.next();
            }
            None => out.push('%'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TranscodeVars {
        TranscodeVars {
            source: PathBuf::from("/music/My Song.flac"),
            bit_rate: 192,
            title: "My Song".into(),
            album: "Album".into(),
            artist: "Band".into(),
            time_offset: 30,
            duration: Some(10),
            width: Some(640),
            height: Some(360),
            format: "mp3".into(),
        }
    }

    #[test]
    fn test_render_keeps_paths_with_spaces_as_one_arg() {
        let t = CommandTemplate::new("ffmpeg -i %s -b:a %bk -f %f -");
        assert_eq!(
            t.render(&vars()),
            vec!["ffmpeg", "-i", "/music/My Song.flac", "-b:a", "192k", "-f", "mp3", "-"]
        );
    }

    #[test]
    fn test_video_placeholders() {
        let t = CommandTemplate::new("ffmpeg -ss %o -t %d -i %s -s %wx%h");
        let argv = t.render(&vars());
        assert_eq!(argv[2], "30");
        assert_eq!(argv[4], "10");
        assert_eq!(argv[8], "640x360");
    }

    #[test]
    fn test_unknown_and_trailing_percent_kept() {
        let t = CommandTemplate::new("echo 100% %z");
        assert_eq!(t.render(&vars()), vec!["echo", "100%", "%z"]);
    }

    #[test]
    fn test_missing_optional_values_expand_empty() {
        let mut v = vars();
        v.duration = None;
        let t = CommandTemplate::new("x -t=%d");
        assert_eq!(t.render(&v), vec!["x", "-t="]);
    }

    #[test]
    fn test_metadata_placeholders() {
        let t = CommandTemplate::new("lame --tt %t --ta %a --tl %l");
        assert_eq!(
            t.render(&vars()),
            vec!["lame", "--tt", "My Song", "--ta", "Band", "--tl", "Album"]
        );
    }

    #[test]
    fn test_bit_rate_reference() {
        assert!(CommandTemplate::new("lame -b %b - -").references_bit_rate());
        assert!(!CommandTemplate::new("ffmpeg -i %s -f wav -").references_bit_rate());
        assert_eq!(CommandTemplate::new("  lame -").program(), Some("lame"));
        assert_eq!(CommandTemplate::new("").program(), None);
    }
}
