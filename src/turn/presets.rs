//! Prompt-pattern presets for common agents.
//!
//! Exact patterns are placeholders until validated against real agent
//! output. Custom `--pattern` works as an escape hatch.

/// Returns the regex pattern string for a named preset, or `None` if
/// the name is not a recognized preset (in which case it should be
/// treated as a custom regex).
pub fn preset_pattern(name: &str) -> Option<&'static str> {
    match name {
        "claude" => Some(CLAUDE),
        "aider" => Some(AIDER),
        "generic" => Some(GENERIC),
        _ => None,
    }
}

/// Claude Code CLI prompt pattern.
///
/// Placeholder — needs validation against real Claude Code output.
/// Matches lines ending with a `>` followed by optional whitespace,
/// typical of the Claude Code interactive prompt.
const CLAUDE: &str = r"(?:^|\n)\s*>\s*$";

/// Aider CLI prompt pattern.
///
/// Placeholder — needs validation against real Aider output.
/// Matches the aider prompt which typically looks like `aider> ` or
/// contains the repo name.
const AIDER: &str = r"(?:^|\n)[\w/.-]*>\s*$";

/// Generic shell-style prompt pattern.
///
/// Matches common `$ ` or `> ` style prompts at the end of a line.
/// Deliberately broad — intended as a fallback.
const GENERIC: &str = r"[>$#%]\s*$";
