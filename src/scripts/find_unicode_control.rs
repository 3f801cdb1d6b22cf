//! Looks for Unicode control characters in source trees
//!
//! Each offending line is reported as a csdiff `UNICONTROL_WARNING` with
//! its line and column so that csgrep can pick it up.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::Path;
use walkdir::WalkDir;

const SCAN_EXCLUDE: &[&str] = &[
    r"\.git/",
    r"\.hg/",
    r"\.desktop$",
    r"ChangeLog$",
    r"NEWS$",
    r"\.ppd$",
    r"\.txt$",
    r"\.directory$",
];

const SCAN_EXCLUDE_MIME: &[&str] = &[
    r"text/x-po$",
    r"text/x-tex$",
    r"text/x-troff$",
    r"text/html$",
];

const TESTS_EXCLUDE: &str = r"/test[^/]+/";

/// Bytes inspected when guessing whether a file is text.
const SNIFF_LEN: usize = 8192;

/// Unicode general category Cf.
const FORMAT_CHARS: &[(u32, u32)] = &[
    (0x00AD, 0x00AD),
    (0x0600, 0x0605),
    (0x061C, 0x061C),
    (0x06DD, 0x06DD),
    (0x070F, 0x070F),
    (0x0890, 0x0891),
    (0x08E2, 0x08E2),
    (0x180E, 0x180E),
    (0x200B, 0x200F),
    (0x202A, 0x202E),
    (0x2060, 0x2064),
    (0x2066, 0x206F),
    (0xFEFF, 0xFEFF),
    (0xFFF9, 0xFFFB),
    (0x110BD, 0x110BD),
    (0x110CD, 0x110CD),
    (0x13430, 0x1343F),
    (0x1BCA0, 0x1BCA3),
    (0x1D173, 0x1D17A),
    (0xE0001, 0xE0001),
    (0xE0020, 0xE007F),
];

/// Private use areas (Co) and noncharacters.
const OTHER_NONPRINT: &[(u32, u32)] = &[
    (0xE000, 0xF8FF),
    (0xFDD0, 0xFDEF),
    (0xF0000, 0xFFFFD),
    (0x100000, 0x10FFFD),
];

const BIDI_CHARS: &[(u32, u32)] = &[(0x202A, 0x202E), (0x2066, 0x2069)];

fn in_ranges(c: char, ranges: &[(u32, u32)]) -> bool {
    let c = c as u32;
    ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&c))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CharSet {
    /// Formatting control characters, bidi controls included
    #[default]
    #[value(skip)]
    Format,
    /// Every non-printable character except ASCII controls
    All,
    /// The nine bidirectional control characters
    Bidi,
}

impl CharSet {
    pub fn contains(self, c: char) -> bool {
        match self {
            CharSet::Format => in_ranges(c, FORMAT_CHARS),
            CharSet::All => {
                in_ranges(c, FORMAT_CHARS)
                    || in_ranges(c, OTHER_NONPRINT)
                    || (c as u32 & 0xFFFE) == 0xFFFE
            }
            CharSet::Bidi => in_ranges(c, BIDI_CHARS),
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            CharSet::Format => "unicode control characters",
            CharSet::All => "disallowed characters",
            CharSet::Bidi => "bidirectional control characters",
        }
    }
}

/// Best-effort stand-in for libmagic, good enough for the exclusion list.
fn guess_mime(path: &Path, head: &[u8]) -> &'static str {
    if head.contains(&0) {
        return "application/octet-stream";
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" | "xhtml" => "text/html",
        "po" | "pot" => "text/x-po",
        "tex" | "sty" | "cls" => "text/x-tex",
        "man" | "ms" | "me" | "roff" | "1" | "2" | "3" | "4" | "5" | "6" | "7" | "8" | "9" => {
            "text/x-troff"
        }
        _ => "text/plain",
    }
}

/// Decodes as UTF-8, falling back to latin-1.
fn decode(bytes: Vec<u8>) -> (String, bool) {
    match String::from_utf8(bytes) {
        Ok(text) => (text, false),
        Err(err) => (err.into_bytes().iter().map(|&b| b as char).collect(), true),
    }
}

pub struct Scanner {
    chars: CharSet,
    exclude: Vec<Regex>,
    exclude_mime: Vec<Regex>,
}

impl Scanner {
    pub fn new(
        chars: CharSet,
        notests: bool,
        extra_exclude: &[String],
        extra_exclude_mime: &[String],
    ) -> Result<Self> {
        let compile = |patterns: Vec<&str>| -> Result<Vec<Regex>> {
            patterns
                .into_iter()
                .map(|p| Regex::new(p).with_context(|| format!("Invalid exclude pattern: {}", p)))
                .collect()
        };

        let mut exclude: Vec<&str> = SCAN_EXCLUDE.to_vec();
        exclude.extend(extra_exclude.iter().map(String::as_str));
        if notests {
            exclude.push(TESTS_EXCLUDE);
        }
        let mut exclude_mime: Vec<&str> = SCAN_EXCLUDE_MIME.to_vec();
        exclude_mime.extend(extra_exclude_mime.iter().map(String::as_str));

        Ok(Self {
            chars,
            exclude: compile(exclude)?,
            exclude_mime: compile(exclude_mime)?,
        })
    }

    /// Scans `root` recursively, reporting paths under `display_root`.
    ///
    /// Findings go to `out` and per-file notes to `log`. Returns the number
    /// of findings.
    pub fn scan<W: Write, L: Write>(
        &self,
        root: &Path,
        display_root: &Path,
        out: &mut W,
        log: &mut L,
    ) -> Result<usize> {
        let mut found = 0;
        let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    writeln!(log, "{}: UNREADABLE", err)?;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let shown = if rel.as_os_str().is_empty() {
                display_root.to_path_buf()
            } else {
                display_root.join(rel)
            };
            found += self.scan_file(entry.path(), &shown, out, log)?;
        }
        out.flush()?;
        Ok(found)
    }

    fn should_read(&self, shown: &str, mime: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(shown)) {
            return false;
        }
        mime.starts_with("text/") && !self.exclude_mime.iter().any(|re| re.is_match(mime))
    }

    fn scan_file<W: Write, L: Write>(
        &self,
        path: &Path,
        shown: &Path,
        out: &mut W,
        log: &mut L,
    ) -> Result<usize> {
        let shown = shown.display().to_string();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                writeln!(log, "{}: {}", shown, err)?;
                return Ok(0);
            }
        };

        let mime = guess_mime(path, &bytes[..bytes.len().min(SNIFF_LEN)]);
        if !self.should_read(&shown, mime) {
            writeln!(log, "{}: SKIPPED", shown)?;
            return Ok(0);
        }

        let (text, latin1) = decode(bytes);
        if latin1 {
            writeln!(log, "{}: Retrying with latin1", shown)?;
        }

        let mut found = 0;
        for (lineno, line) in text.lines().enumerate() {
            let hits: Vec<(usize, char)> = line
                .chars()
                .enumerate()
                .filter(|&(_, c)| self.chars.contains(c))
                .collect();
            let Some(&(col, _)) = hits.first() else {
                continue;
            };

            let codes: Vec<String> = hits.iter().map(|(_, c)| format!("U+{:04X}", *c as u32)).collect();
            writeln!(out, "Error: UNICONTROL_WARNING:")?;
            writeln!(
                out,
                "{}:{}:{}: warning: {}: {}",
                shown,
                lineno + 1,
                col + 1,
                self.chars.message(),
                codes.join(" ")
            )?;
            writeln!(out)?;
            found += 1;
        }

        if found == 0 {
            writeln!(log, "{}: OK", shown)?;
        }
        Ok(found)
    }
}
