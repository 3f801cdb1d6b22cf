//! Shell quoting helpers for the command lines csmock renders.
//!
//! Most tool invocations are rendered as shell strings and executed by
//! `sh -c` either on the host or inside the chroot, so every value that
//! comes from the user has to pass through one of these functions.

use crate::error::ScanError;

/// Wraps `input` in double quotes, escaping `\`, `"` and `$`.
pub fn shell_quote(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('"');
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '$' => out.push_str("\\$"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Wraps `input` in single quotes so that the shell takes it literally.
pub fn single_quote(input: &str) -> String {
    if !input.is_empty()
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c))
    {
        return input.to_string();
    }
    format!("'{}'", input.replace('\'', "'\"'\"'"))
}

/// Renders an argv vector as a single shell command line.
///
/// With `escape_special` each argument goes through [`shell_quote`],
/// otherwise it is just wrapped in single quotes.
pub fn strlist_to_shell_cmd<S: AsRef<str>>(argv: &[S], escape_special: bool) -> String {
    argv.iter()
        .map(|arg| {
            if escape_special {
                shell_quote(arg.as_ref())
            } else {
                format!("'{}'", arg.as_ref())
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits a string the way a POSIX shell splits words.
pub fn split_words(input: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err("No closing quotation".to_string()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => current.push(c),
                            Some('\n') => {}
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err("No closing quotation".to_string()),
                        },
                        Some(c) => current.push(c),
                        None => return Err("No closing quotation".to_string()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some('\n') => {}
                    Some(c) => current.push(c),
                    None => return Err("No escaped character".to_string()),
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Re-quotes user supplied tool options so they cannot inject shell code.
pub fn sanitize_opts(option_name: &str, value: &str) -> Result<String, ScanError> {
    let words = split_words(value).map_err(|e| {
        ScanError::usage(format!(
            "failed to parse value given to {}: {}",
            option_name, e
        ))
    })?;
    Ok(words
        .iter()
        .map(|w| single_quote(w))
        .collect::<Vec<_>>()
        .join(" "))
}

/// Joins flags with `separator`, the way cswrap expects them in env vars.
pub fn serialize_flags<S: AsRef<str>>(flags: &[S], separator: &str) -> String {
    flags
        .iter()
        .map(|f| f.as_ref())
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_escapes_specials() {
        assert_eq!(shell_quote("plain"), "\"plain\"");
        assert_eq!(shell_quote("a\"b"), "\"a\\\"b\"");
        assert_eq!(shell_quote("$HOME"), "\"\\$HOME\"");
        assert_eq!(shell_quote("c:\\x"), "\"c:\\\\x\"");
    }

    #[test]
    fn test_strlist_to_shell_cmd() {
        let argv = ["ln", "-s", "a b", "c"];
        assert_eq!(strlist_to_shell_cmd(&argv, false), "'ln' '-s' 'a b' 'c'");
        assert_eq!(
            strlist_to_shell_cmd(&argv, true),
            "\"ln\" \"-s\" \"a b\" \"c\""
        );
    }

    #[test]
    fn test_single_quote() {
        assert_eq!(single_quote("--severity-threshold=high"), "--severity-threshold=high");
        assert_eq!(single_quote("a b"), "'a b'");
        assert_eq!(single_quote("it's"), "'it'\"'\"'s'");
        assert_eq!(single_quote(""), "''");
    }

    #[test]
    fn test_split_words() {
        assert_eq!(
            split_words(r#"--a 'b c' "d \"e\"" f\ g"#).unwrap(),
            vec!["--a", "b c", "d \"e\"", "f g"]
        );
        assert!(split_words("  ").unwrap().is_empty());
        assert!(split_words("'open").is_err());
    }

    #[test]
    fn test_sanitize_opts_neutralizes_injection() {
        let out = sanitize_opts("--snyk-code-test-opts", "--org=x; rm -rf /").unwrap();
        assert_eq!(out, "'--org=x;' rm -rf /");

        let out = sanitize_opts("--snyk-code-test-opts", "$(reboot)").unwrap();
        assert_eq!(out, "'$(reboot)'");

        let err = sanitize_opts("--snyk-code-test-opts", "\"oops").unwrap_err();
        assert!(err.to_string().contains("--snyk-code-test-opts"));
    }

    #[test]
    fn test_serialize_flags() {
        assert_eq!(serialize_flags(&["-Wall", "-Wextra"], ":"), "-Wall:-Wextra");
        assert_eq!(serialize_flags::<&str>(&[], ":"), "");
        assert_eq!(serialize_flags(&["--pulse"], " "), "--pulse");
    }
}
