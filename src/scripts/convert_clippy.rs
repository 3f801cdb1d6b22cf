//! Cargo JSON messages produced by clippy to csdiff text

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use std::io::{BufRead, Write};

const BUILD_DIR: &str = "/builddir/build/BUILD/";

struct Patterns {
    message: Regex,
    package_ids: [Regex; 2],
}

impl Patterns {
    fn new() -> Result<Self> {
        Ok(Self {
            message: Regex::new(r"(?s)^(.*?): (.*?)\s+-->\s+(.*?):(\d+):(\d+)(.*)")?,
            package_ids: [
                // "stratisd 3.6.5 (path+file:///builddir/build/BUILD/stratisd-3.6.5)"
                Regex::new(r"path\+file://(.*)\)")?,
                // "path+file:///builddir/build/BUILD/stratisd-3.6.5#stratisd@3.6.5"
                Regex::new(r"^path\+file://([^#]+)(?:#([^@]*))?(?:@(.+))?$")?,
            ],
        })
    }

    /// `/builddir/build/BUILD/<top-level dir>` of the package a message belongs to.
    fn package_path(&self, package_id: &str) -> Option<String> {
        let path = self
            .package_ids
            .iter()
            .find_map(|re| re.captures(package_id))?
            .get(1)?
            .as_str();

        let package = path
            .get(BUILD_DIR.len()..)
            .unwrap_or("")
            .split('/')
            .next()
            .unwrap_or("");
        Some(format!("{}{}", BUILD_DIR, package))
    }
}

/// Converts one message; `None` when it is not a diagnostic we can place.
fn convert_message(patterns: &Patterns, item: &Value) -> Option<String> {
    if item.get("reason")?.as_str()? != "compiler-message" {
        return None;
    }

    let package_path = patterns.package_path(item.get("package_id")?.as_str()?)?;
    let rendered = item.get("message")?.get("rendered")?.as_str()?.trim();
    let caps = patterns.message.captures(rendered)?;

    let mut out = String::from("Error: CLIPPY_WARNING:\n");
    out.push_str(&format!(
        "{}/{}:{}:{}: {}: {}\n",
        package_path, &caps[3], &caps[4], &caps[5], &caps[1], &caps[2]
    ));
    for (i, line) in caps[6].split('\n').enumerate() {
        if i == 0 && line.trim().is_empty() {
            continue;
        }
        out.push_str(&format!("#  {}\n", line));
    }
    out.push('\n');
    Some(out)
}

/// Reads cargo messages, one JSON document per line, and writes csdiff text.
pub fn convert<R: BufRead, W: Write>(input: R, mut output: W) -> Result<usize> {
    let patterns = Patterns::new()?;
    let mut count = 0;

    for (lineno, line) in input.lines().enumerate() {
        let line = line.context("Failed to read clippy output")?;
        if line.trim().is_empty() {
            continue;
        }

        let item: Value = serde_json::from_str(&line).with_context(|| {
            format!("rust-clippy: Error while converting results (line {})", lineno + 1)
        })?;

        if let Some(text) = convert_message(&patterns, &item) {
            output.write_all(text.as_bytes())?;
            count += 1;
        }
    }
    output.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(package_id: &str, rendered: &str) -> String {
        json!({
            "reason": "compiler-message",
            "package_id": package_id,
            "message": { "rendered": rendered }
        })
        .to_string()
    }

    const RENDERED: &str = "warning: this `if` has identical blocks\n  --> src/engine/mod.rs:42:13\n   |\n42 |     if x {\n   |\n";

    #[test]
    fn test_convert_new_package_id() {
        let input = message(
            "path+file:///builddir/build/BUILD/stratisd-3.6.5#stratisd@3.6.5",
            RENDERED,
        );
        let mut out = Vec::new();
        assert_eq!(convert(input.as_bytes(), &mut out).unwrap(), 1);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Error: CLIPPY_WARNING:\n\
             /builddir/build/BUILD/stratisd-3.6.5/src/engine/mod.rs:42:13: warning: this `if` has identical blocks\n\
             #     |\n\
             #  42 |     if x {\n\
             #     |\n\
             \n"
        );
    }

    #[test]
    fn test_convert_old_package_id_nested_crate() {
        let input = message(
            "stratisd 3.6.5 (path+file:///builddir/build/BUILD/stratisd-3.6.5/devicemapper)",
            RENDERED,
        );
        let mut out = Vec::new();
        convert(input.as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\n/builddir/build/BUILD/stratisd-3.6.5/src/engine/mod.rs:42:13: "));
    }

    #[test]
    fn test_skips_other_messages() {
        let input = format!(
            "{}\n\n{}\n{}\n",
            json!({"reason": "compiler-artifact", "package_id": "x"}),
            message("registry+https://github.com/rust-lang/crates.io-index#libc@0.2.1", RENDERED),
            message("path+file:///builddir/build/BUILD/a-1", "no location here"),
        );
        let mut out = Vec::new();
        assert_eq!(convert(input.as_bytes(), &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_invalid_json_fails() {
        let mut out = Vec::new();
        let err = convert("{not json".as_bytes(), &mut out).unwrap_err();
        assert!(err.to_string().contains("rust-clippy"));
    }
}
