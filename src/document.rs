//! Header-plus-body document codec.
//!
//! ```text
//! ---
//! <yaml header>
//! ---
//!
//! <free-form body>
//! ```

use std::error::Error;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

const DELIMITER: &str = "---";

pub fn parse<H: DeserializeOwned>(raw: &str) -> Result<(H, String), DocumentError> {
    let normalized = raw.replace("\r\n", "\n");
    let (header, body) = split(&normalized)?;
    if header.trim().is_empty() {
        return Err(DocumentError::EmptyHeader);
    }
    let parsed = serde_yaml::from_str(header).map_err(DocumentError::Yaml)?;
    Ok((parsed, normalize_body(body)))
}

pub fn render<H: Serialize>(header: &H, body: &str) -> Result<String, DocumentError> {
    let yaml = serde_yaml::to_string(header).map_err(DocumentError::Yaml)?;
    let body = normalize_body(body);
    let mut out = String::with_capacity(yaml.len() + body.len() + 16);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    if !body.is_empty() {
        out.push('\n');
        out.push_str(&body);
        out.push('\n');
    }
    Ok(out)
}

/// Trailing newlines are not significant; the renderer always emits one.
pub fn normalize_body(body: &str) -> String {
    body.trim_end_matches('\n').to_string()
}

fn split(raw: &str) -> Result<(&str, &str), DocumentError> {
    let rest = raw
        .strip_prefix("---\n")
        .ok_or(DocumentError::MissingHeader)?;

    if let Some(after) = rest.strip_prefix("---\n") {
        return Ok(("", strip_blank_line(after)));
    }
    if let Some(index) = rest.find("\n---\n") {
        let header = &rest[..=index];
        let after = &rest[index + 5..];
        return Ok((header, strip_blank_line(after)));
    }
    if let Some(header) = rest.strip_suffix("\n---") {
        return Ok((header, ""));
    }
    Err(DocumentError::UnterminatedHeader)
}

fn strip_blank_line(after: &str) -> &str {
    after.strip_prefix('\n').unwrap_or(after)
}

/// Every variant means the document is malformed.
#[derive(Debug)]
pub enum DocumentError {
    MissingHeader,
    UnterminatedHeader,
    EmptyHeader,
    Yaml(serde_yaml::Error),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::MissingHeader => {
                write!(f, "malformed document: missing '---' header block")
            }
            DocumentError::UnterminatedHeader => {
                write!(f, "malformed document: header block is not terminated")
            }
            DocumentError::EmptyHeader => write!(f, "malformed document: header block is empty"),
            DocumentError::Yaml(err) => write!(f, "malformed document header: {}", err),
        }
    }
}

impl Error for DocumentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DocumentError::Yaml(err) => Some(err),
            _ => None,
        }
    }
}
