//! Connection-configuration file codec.
//!
//! The application service reads its database settings from a small PHP
//! include. The file also carries the `$config` flag the application uses
//! to decide whether it has been set up; a successful bootstrap always
//! leaves it at `1`.

use crate::error::{Error, Result};

/// Contents of the application's connection-configuration file.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    pub database: String,
    /// The "already configured" flag. Must be `true` after a successful bootstrap.
    pub configured: bool,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("configured", &self.configured)
            .finish()
    }
}

impl ConnectionConfig {
    /// Render the file contents.
    pub fn render(&self) -> String {
        let flag = if self.configured { 1 } else { 0 };
        format!(
            r#"<?php
//  Database connection settings, rewritten on every cold start.

global $disable_utf8_flag;
$disable_utf8_flag = false;

$host   = '{host}';
$port   = '{port}';
$login  = '{login}';
$pass   = '{pass}';
$dbase  = '{dbase}';
$db_encoding = 'utf8mb4';

$sqlconf = array();
global $sqlconf;
$sqlconf["host"] = $host;
$sqlconf["port"] = $port;
$sqlconf["login"] = $login;
$sqlconf["pass"] = $pass;
$sqlconf["dbase"] = $dbase;
$sqlconf["db_encoding"] = $db_encoding;

//////////////////////////
//////DO NOT TOUCH THIS///
$config = {flag}; /////////////
//////////////////////////
"#,
            host = php_quote(&self.host),
            port = self.port,
            login = php_quote(&self.login),
            pass = php_quote(&self.password),
            dbase = php_quote(&self.database),
        )
    }

    /// Parse file contents produced by [`render`](Self::render) or by the
    /// application's own installer.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut host = None;
        let mut port = None;
        let mut login = None;
        let mut password = None;
        let mut database = None;
        let mut configured = None;

        for line in contents.lines() {
            let Some((name, raw)) = split_assignment(line) else {
                continue;
            };
            match name {
                "host" => host = Some(php_unquote(raw)?),
                "port" => {
                    let value = php_unquote(raw).unwrap_or_else(|_| raw.to_string());
                    let parsed = value.parse::<u16>().map_err(|_| {
                        Error::ConnectionConfig(format!("invalid port: {value:?}"))
                    })?;
                    port = Some(parsed);
                }
                "login" => login = Some(php_unquote(raw)?),
                "pass" => password = Some(php_unquote(raw)?),
                "dbase" => database = Some(php_unquote(raw)?),
                "config" => configured = Some(raw.trim() == "1"),
                _ => {}
            }
        }

        let missing = |field: &str| Error::ConnectionConfig(format!("missing ${field}"));
        Ok(Self {
            host: host.ok_or_else(|| missing("host"))?,
            port: port.ok_or_else(|| missing("port"))?,
            login: login.ok_or_else(|| missing("login"))?,
            password: password.ok_or_else(|| missing("pass"))?,
            database: database.ok_or_else(|| missing("dbase"))?,
            configured: configured.unwrap_or(false),
        })
    }
}

/// Split `$name = value; // comment` into `("name", "value")`.
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim().strip_prefix('$')?;
    let (name, value) = rest.split_once('=')?;
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let value = value.trim();
    let end = value_end(value)?;
    Some((name, value[..end].trim()))
}

/// Byte offset of the terminating `;`, ignoring any `;` inside a quoted value.
fn value_end(value: &str) -> Option<usize> {
    let mut in_quote = false;
    let mut escaped = false;
    for (idx, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quote => escaped = true,
            '\'' => in_quote = !in_quote,
            ';' if !in_quote => return Some(idx),
            _ => {}
        }
    }
    None
}

fn php_quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn php_unquote(raw: &str) -> Result<String> {
    let inner = raw
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .ok_or_else(|| Error::ConnectionConfig(format!("expected quoted value, got {raw}")))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('\\' | '\'')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}
