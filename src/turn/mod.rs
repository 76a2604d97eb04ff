//! Turn detection — prompt-pattern matching and turn extraction.
//!
//! The [`TurnDetector`] is a state machine that consumes agent output
//! byte-by-byte, detects prompt patterns (after ANSI stripping), and
//! emits [`TurnEvent`]s when turn boundaries are found.

pub mod ansi;
pub mod presets;

use std::time::{SystemTime, UNIX_EPOCH};

use ansi::AnsiStripper;
use regex::Regex;

/// Errors that can occur when constructing a [`TurnDetector`].
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(
        "prompt pattern contains literal newline — multi-line patterns are not supported in v0"
    )]
    MultiLinePattern,
    #[error("invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Default accumulator cap: 4 MiB. Bytes past this are still forwarded
/// to the user but dropped from the stored turn content.
pub const DEFAULT_MAX_TURN_BYTES: usize = 4 * 1024 * 1024;

/// A completed turn — the agent output between user input and the
/// next prompt.
#[derive(Debug, Clone)]
pub struct Turn {
    /// Raw bytes of the turn content (ANSI sequences preserved).
    pub content: Vec<u8>,
    /// Whether the turn was interrupted (e.g., Ctrl+C).
    pub interrupted: bool,
    /// Unix epoch milliseconds when the turn was detected.
    pub timestamp: u64,
    /// Whether the accumulator cap was hit — bytes past the cap were
    /// dropped from `content` (but still forwarded to the user).
    pub truncated: bool,
}

/// Current time as Unix epoch milliseconds.
pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

/// Events emitted by the turn detector.
#[derive(Debug)]
pub enum TurnEvent {
    /// The agent's initial prompt was detected — the session is ready
    /// for user input. No turn is produced.
    SessionReady,
    /// A complete turn was detected.
    TurnCompleted(Turn),
}

/// Internal state of the turn detector state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectorState {
    /// Waiting for the agent to show its first prompt.
    AwaitingFirstPrompt,
    /// A prompt was shown — waiting for the user to submit input.
    AwaitingUserInput,
    /// User has submitted input — accumulating agent output until the
    /// next prompt.
    AccumulatingOutput,
}

/// Prompt-pattern turn detector.
///
/// Feed agent output via [`feed_output`] and user input notifications
/// via [`notify_user_input`]. The detector emits [`TurnEvent`]s when
/// turn boundaries are found.
///
/// # Contract compliance
///
/// - Prompt matching is per-line, after ANSI stripping.
/// - First prompt → `SessionReady` (no turn).
/// - Consecutive prompts without output → no empty turns.
/// - Interrupted turns are marked.
/// - ANSI sequences are preserved in turn content.
#[derive(Debug)]
pub struct TurnDetector {
    pattern: Regex,
    state: DetectorState,
    stripper: AnsiStripper,

    /// Accumulates the current line for prompt detection (ANSI-stripped).
    line_buf: Vec<u8>,

    /// Accumulates raw output bytes for the current turn content.
    /// Lines are moved here once complete (newline encountered).
    /// The current partial line is in `raw_line_buf`.
    content_buf: Vec<u8>,

    /// Accumulates raw bytes for the current (possibly incomplete) line.
    raw_line_buf: Vec<u8>,

    /// Whether the current turn was interrupted.
    interrupted: bool,

    /// Maximum bytes retained in `content_buf` for one turn.
    max_turn_bytes: usize,

    /// Whether the cap has been hit during the current response window.
    /// Once set, further bytes are dropped from `content_buf` (but are
    /// still forwarded to the user by the wrapper's independent tap).
    truncated: bool,
}

impl TurnDetector {
    /// Create a new turn detector with the given prompt pattern and the
    /// default accumulator cap ([`DEFAULT_MAX_TURN_BYTES`]).
    ///
    /// If `pattern` matches a known preset name, the preset regex is
    /// used. Otherwise, `pattern` is compiled as a custom regex.
    ///
    /// Returns an error if the pattern contains literal newlines or
    /// is not a valid regex.
    pub fn new(pattern: &str) -> Result<Self, TurnError> {
        Self::with_max_turn_bytes(pattern, DEFAULT_MAX_TURN_BYTES)
    }

    /// Create a new turn detector with an explicit accumulator cap.
    ///
    /// See [`Self::new`] for pattern resolution rules.
    pub fn with_max_turn_bytes(pattern: &str, max_turn_bytes: usize) -> Result<Self, TurnError> {
        // Resolve preset or use as custom regex.
        let pattern_str = presets::preset_pattern(pattern).unwrap_or(pattern);

        // Multi-line patterns are not supported — prompt matching works line-by-line.
        if pattern_str.contains('\n') {
            return Err(TurnError::MultiLinePattern);
        }

        let regex = Regex::new(pattern_str)?;

        Ok(Self {
            pattern: regex,
            state: DetectorState::AwaitingFirstPrompt,
            stripper: AnsiStripper::new(),
            line_buf: Vec::new(),
            content_buf: Vec::new(),
            raw_line_buf: Vec::new(),
            interrupted: false,
            max_turn_bytes,
            truncated: false,
        })
    }

    /// Feed agent output bytes to the detector.
    ///
    /// Returns any events produced by processing this chunk. Output
    /// is processed byte-by-byte: lines are assembled and checked
    /// against the prompt pattern after ANSI stripping.
    ///
    /// **Echo-stripping**: The caller (PTY wrapper) is responsible for
    /// excluding echoed user input before feeding data here — turn
    /// content must exclude the user's own echoed keystrokes, but the
    /// mechanism for that is an upstream concern.
    pub fn feed_output(&mut self, data: &[u8]) -> Vec<TurnEvent> {
        let mut events = Vec::new();

        for &byte in data {
            self.raw_line_buf.push(byte);

            // Strip ANSI for prompt detection.
            let stripped = self.stripper.strip(&[byte]);
            self.line_buf.extend_from_slice(&stripped);

            if byte == b'\n' {
                // Line complete — check for prompt match.
                self.process_line(&mut events);
            }
        }

        events
    }

    /// Notify the detector that the user has submitted input.
    ///
    /// Transitions from `AwaitingUserInput` to `AccumulatingOutput`.
    /// No-op in other states.
    pub fn notify_user_input(&mut self) {
        if self.state == DetectorState::AwaitingUserInput {
            self.state = DetectorState::AccumulatingOutput;
            self.content_buf.clear();
            self.interrupted = false;
            self.truncated = false;
        }
    }

    /// Notify the detector that the user interrupted the agent (e.g., Ctrl+C).
    ///
    /// Sets the interrupted flag on the current turn. Only meaningful
    /// in `AccumulatingOutput` state.
    pub fn notify_interrupt(&mut self) {
        if self.state == DetectorState::AccumulatingOutput {
            self.interrupted = true;
        }
    }

    /// Check the current line against the prompt pattern and handle
    /// state transitions.
    fn process_line(&mut self, events: &mut Vec<TurnEvent>) {
        // Trim trailing newline/carriage return — we use newlines as
        // line delimiters, but they shouldn't be part of the match input.
        let line = &self.line_buf;
        let trimmed = match line.last() {
            Some(b'\n') => {
                let end = line.len() - 1;
                if end > 0 && line[end - 1] == b'\r' {
                    &line[..end - 1]
                } else {
                    &line[..end]
                }
            }
            _ => line.as_slice(),
        };
        let line_str = String::from_utf8_lossy(trimmed);
        let is_prompt = self.pattern.is_match(&line_str);

        if is_prompt {
            match self.state {
                DetectorState::AwaitingFirstPrompt => {
                    events.push(TurnEvent::SessionReady);
                    self.state = DetectorState::AwaitingUserInput;
                }
                DetectorState::AwaitingUserInput => {
                    // Consecutive prompt without intervening output.
                    // No empty turn produced.
                }
                DetectorState::AccumulatingOutput => {
                    // Turn boundary — emit completed turn.
                    // Content is everything accumulated so far, excluding
                    // the prompt line itself.
                    let content = std::mem::take(&mut self.content_buf);

                    if !content.is_empty() {
                        events.push(TurnEvent::TurnCompleted(Turn {
                            content,
                            interrupted: self.interrupted,
                            timestamp: epoch_millis(),
                            truncated: self.truncated,
                        }));
                    }
                    // Even if content was empty (e.g., only whitespace
                    // was accumulated), transition to awaiting input.
                    self.interrupted = false;
                    self.truncated = false;
                    self.state = DetectorState::AwaitingUserInput;
                }
            }
        } else if self.state == DetectorState::AccumulatingOutput {
            // Non-prompt line during output accumulation — append to
            // turn content (raw bytes, ANSI preserved), unless the cap
            // has already been hit for this response window.
            if self.content_buf.len() < self.max_turn_bytes {
                let remaining = self.max_turn_bytes - self.content_buf.len();
                if self.raw_line_buf.len() <= remaining {
                    self.content_buf.extend_from_slice(&self.raw_line_buf);
                } else {
                    self.content_buf
                        .extend_from_slice(&self.raw_line_buf[..remaining]);
                    self.truncated = true;
                }
            } else {
                self.truncated = true;
            }
        }

        self.line_buf.clear();
        self.raw_line_buf.clear();
    }

    /// Check for a prompt match on a partial (unterminated) line.
    ///
    /// Some agents emit a prompt without a trailing newline. This
    /// method allows the PTY wrapper to flush the line buffer when
    /// idle (e.g., after a read timeout with no new data).
    pub fn flush_line(&mut self) -> Vec<TurnEvent> {
        if self.line_buf.is_empty() {
            return Vec::new();
        }

        let mut events = Vec::new();
        self.process_line(&mut events);
        events
    }
}
