//! Individual text-transform passes.
//!
//! Each pass is stateless and built once. The regexes it needs are compiled
//! on first use and shared across all calls.

use std::borrow::Cow;
use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::{Captures, NoExpand, Regex};

use super::CompressionLevel;
use crate::fingerprint::short_hex;

/// A single step of the compression pipeline
pub trait TextPass: Send + Sync {
    /// Pass name (for logs and debugging)
    fn name(&self) -> &'static str;

    /// Lowest level at which the pass runs
    fn min_level(&self) -> CompressionLevel;

    /// Rewrite `text` unconditionally
    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str>;

    /// Rewrite `text` if `level` enables this pass
    fn transform<'a>(&self, text: &'a str, level: CompressionLevel) -> Cow<'a, str> {
        if level >= self.min_level() {
            self.apply(text)
        } else {
            Cow::Borrowed(text)
        }
    }
}

/// The standard pipeline, in application order
pub fn default_passes() -> Vec<Box<dyn TextPass>> {
    vec![
        Box::new(WhitespacePass),
        Box::new(CodeBlockPass),
        Box::new(DedupPass::default()),
        Box::new(AbbreviationPass),
    ]
}

lazy_static! {
    static ref TRAILING_WHITESPACE: Regex = Regex::new(r"[ \t]+\n").unwrap();
    static ref EXCESS_NEWLINES: Regex = Regex::new(r"\n{3,}").unwrap();
    static ref MULTI_SPACE: Regex = Regex::new(r"  +").unwrap();
    /// Any fenced region, language tag or not
    static ref FENCED_REGION: Regex = Regex::new(r"(?s)```.*?```").unwrap();
    /// Fenced block with an optional language tag on the opening line
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```(\w*)\n(.*?)```").unwrap();
}

fn owned_if_changed<'a>(original: &'a str, rewritten: String) -> Cow<'a, str> {
    if rewritten == original {
        Cow::Borrowed(original)
    } else {
        Cow::Owned(rewritten)
    }
}

/// Collapses blank-line runs, strips trailing spaces and collapses interior
/// space runs outside fenced code.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespacePass;

impl WhitespacePass {
    fn collapse_spaces_outside_fences(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for fence in FENCED_REGION.find_iter(text) {
            out.push_str(&MULTI_SPACE.replace_all(&text[last..fence.start()], " "));
            out.push_str(fence.as_str());
            last = fence.end();
        }
        out.push_str(&MULTI_SPACE.replace_all(&text[last..], " "));
        out
    }
}

impl TextPass for WhitespacePass {
    fn name(&self) -> &'static str {
        "whitespace"
    }

    fn min_level(&self) -> CompressionLevel {
        CompressionLevel::Light
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        // Trailing whitespace goes first so "a \n \n \n" still counts as a
        // blank-line run.
        let stripped = TRAILING_WHITESPACE.replace_all(text, "\n");
        let collapsed = EXCESS_NEWLINES.replace_all(&stripped, "\n\n");
        owned_if_changed(text, Self::collapse_spaces_outside_fences(&collapsed))
    }
}

/// Strips comments and blank lines from fenced code blocks.
///
/// `#!` lines (shebangs) are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeBlockPass;

impl CodeBlockPass {
    fn is_comment_line(line: &str) -> bool {
        let line = line.trim_start();
        line.starts_with("//") || (line.starts_with('#') && !line.starts_with("#!"))
    }

    fn compress_block(caps: &Captures<'_>) -> String {
        let lang = caps.get(1).map_or("", |m| m.as_str());
        let code = caps.get(2).map_or("", |m| m.as_str());

        let kept: Vec<&str> = code
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty() && !Self::is_comment_line(line))
            .collect();

        format!("```{lang}\n{}\n```", kept.join("\n"))
    }
}

impl TextPass for CodeBlockPass {
    fn name(&self) -> &'static str {
        "code_blocks"
    }

    fn min_level(&self) -> CompressionLevel {
        CompressionLevel::Balanced
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match FENCED_BLOCK.replace_all(text, |caps: &Captures<'_>| Self::compress_block(caps)) {
            Cow::Borrowed(_) => Cow::Borrowed(text),
            Cow::Owned(rewritten) => owned_if_changed(text, rewritten),
        }
    }
}

/// Replaces repeated 3-line windows with a back-reference marker.
#[derive(Debug, Clone, Copy)]
pub struct DedupPass {
    /// Texts with fewer lines are left alone
    pub min_lines: usize,
    /// Lines per window
    pub window: usize,
    /// Windows must be strictly longer than this (in chars) to be tracked
    pub min_window_chars: usize,
}

impl Default for DedupPass {
    fn default() -> Self {
        Self {
            min_lines: 20,
            window: 3,
            min_window_chars: 100,
        }
    }
}

impl DedupPass {
    /// Marker line emitted in place of a repeated window
    pub fn marker(fingerprint: &str) -> String {
        format!("[... same as above ({fingerprint}) ...]")
    }
}

impl TextPass for DedupPass {
    fn name(&self) -> &'static str {
        "dedup"
    }

    fn min_level(&self) -> CompressionLevel {
        CompressionLevel::Balanced
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let lines: Vec<&str> = text.split('\n').collect();
        if lines.len() < self.min_lines || self.window == 0 {
            return Cow::Borrowed(text);
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut out: Vec<Cow<'_, str>> = Vec::with_capacity(lines.len());
        let mut elided = false;
        let mut i = 0;

        while i < lines.len() {
            if i + self.window <= lines.len() {
                let window = lines[i..i + self.window].join("\n");
                if window.chars().count() > self.min_window_chars {
                    let fingerprint = short_hex(window.as_bytes(), 8);
                    if seen.contains(&fingerprint) {
                        out.push(Cow::Owned(Self::marker(&fingerprint)));
                        i += self.window;
                        elided = true;
                        continue;
                    }
                    seen.insert(fingerprint);
                }
            }
            out.push(Cow::Borrowed(lines[i]));
            i += 1;
        }

        if elided {
            Cow::Owned(out.join("\n"))
        } else {
            Cow::Borrowed(text)
        }
    }
}

/// Verbose stock phrases and their short forms, applied in order.
pub const ABBREVIATIONS: &[(&str, &str)] = &[
    ("Please note that ", ""),
    ("It is important to note that ", ""),
    ("As mentioned earlier, ", ""),
    ("In order to ", "To "),
    ("Due to the fact that ", "Because "),
    ("At this point in time", "Now"),
    ("In the event that ", "If "),
    ("For the purpose of ", "For "),
    ("With regard to ", "About "),
    ("In the context of ", "In "),
];

lazy_static! {
    static ref ABBREVIATION_REGEX: Vec<(Regex, &'static str)> = ABBREVIATIONS
        .iter()
        .filter_map(|(phrase, short)| {
            Regex::new(&format!("(?i){}", regex::escape(phrase)))
                .ok()
                .map(|r| (r, *short))
        })
        .collect();
}

/// Case-insensitive literal phrase abbreviation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbbreviationPass;

impl TextPass for AbbreviationPass {
    fn name(&self) -> &'static str {
        "abbreviate"
    }

    fn min_level(&self) -> CompressionLevel {
        CompressionLevel::Aggressive
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut current = Cow::Borrowed(text);
        for (regex, short) in ABBREVIATION_REGEX.iter() {
            let rewritten = match regex.replace_all(&current, NoExpand(short)) {
                Cow::Borrowed(_) => continue,
                Cow::Owned(rewritten) => rewritten,
            };
            current = Cow::Owned(rewritten);
        }
        current
    }
}
