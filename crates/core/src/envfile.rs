//! Targeted `KEY=VALUE` substitution for env files.
//!
//! The dependent service reads its credentials from a flat env file that
//! other tooling also writes. Only the named keys are touched; every other
//! line (comments, blank lines, unrelated keys) is preserved as-is.

use crate::error::{Error, Result};

/// Read the value of `key`, if present. Surrounding quotes are stripped.
pub fn read_var(contents: &str, key: &str) -> Option<String> {
    contents
        .lines()
        .filter_map(split_line)
        .filter(|(name, _)| *name == key)
        .map(|(_, value)| unquote(value).to_string())
        .last()
}

/// Return `contents` with each `(key, value)` pair set.
///
/// Existing assignments (including `export KEY=...`) are replaced in place,
/// missing keys are appended. Values are written unquoted because
/// `docker compose --env-file` does not strip quotes.
pub fn set_vars(contents: &str, updates: &[(&str, &str)]) -> Result<String> {
    for (key, value) in updates {
        validate_key(key)?;
        if value.contains(['\n', '\r']) {
            return Err(Error::InvalidEnvValue {
                key: key.to_string(),
                reason: "value contains a line break".to_string(),
            });
        }
    }

    let mut seen = vec![false; updates.len()];
    let mut out = String::with_capacity(contents.len());
    for raw in contents.split_inclusive('\n') {
        let (line, ending) = split_ending(raw);
        let matched = split_line(line)
            .and_then(|(name, _)| updates.iter().position(|(key, _)| *key == name));
        match matched {
            Some(idx) => {
                seen[idx] = true;
                let (key, value) = updates[idx];
                out.push_str(&format!("{key}={value}{ending}"));
            }
            None => out.push_str(raw),
        }
    }

    for (idx, (key, value)) in updates.iter().enumerate() {
        if seen[idx] {
            continue;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{key}={value}\n"));
    }

    Ok(out)
}

/// Split a line from `split_inclusive` into its text and its terminator.
fn split_ending(raw: &str) -> (&str, &str) {
    if let Some(line) = raw.strip_suffix("\r\n") {
        (line, "\r\n")
    } else if let Some(line) = raw.strip_suffix('\n') {
        (line, "\n")
    } else {
        (raw, "")
    }
}

fn split_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (name, value) = trimmed.split_once('=')?;
    let name = name.trim();
    is_valid_key(name).then_some((name, value.trim()))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_key(key: &str) -> Result<()> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(Error::InvalidEnvKey(key.to_string()))
    }
}
