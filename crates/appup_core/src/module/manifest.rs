//! Module manifest parsing (`META-INF/MANIFEST.MF`).
//!
//! # Invariants
//! - Only the main section is read; it ends at the first blank line.
//! - Continuation lines start with exactly one space and extend the
//!   previous header value.
//! - Header names compare case-insensitively; original spelling is kept.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Location of the manifest inside a module.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

pub const HEADER_ACTIVATOR: &str = "Bundle-Activator";
pub const HEADER_SYMBOLIC_NAME: &str = "Bundle-SymbolicName";
pub const HEADER_CLASS_PATH: &str = "Bundle-ClassPath";
pub const HEADER_NATIVE_CODE: &str = "Bundle-NativeCode";

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>[A-Za-z0-9][A-Za-z0-9_-]*):(?: (?P<value>.*))?$")
        .expect("valid manifest header regex")
});

/// Malformed manifest content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// Line in the main section is neither a header nor a continuation.
    InvalidHeader { line: usize, content: String },
    /// Continuation line appears before any header.
    OrphanContinuation { line: usize },
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidHeader { line, content } => {
                write!(f, "invalid manifest header at line {line}: `{content}`")
            }
            Self::OrphanContinuation { line } => {
                write!(f, "manifest continuation without header at line {line}")
            }
        }
    }
}

impl Error for ManifestError {}

/// Main-section headers of a module manifest, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    headers: Vec<(String, String)>,
}

impl Manifest {
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let mut headers: Vec<(String, String)> = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.is_empty() {
                break;
            }

            if let Some(rest) = line.strip_prefix(' ') {
                let Some((_, value)) = headers.last_mut() else {
                    return Err(ManifestError::OrphanContinuation { line: line_no });
                };
                value.push_str(rest);
                continue;
            }

            let captures =
                HEADER_RE
                    .captures(line)
                    .ok_or_else(|| ManifestError::InvalidHeader {
                        line: line_no,
                        content: line.to_string(),
                    })?;
            let name = captures["name"].to_string();
            let value = captures
                .name("value")
                .map(|value| value.as_str().to_string())
                .unwrap_or_default();

            match headers
                .iter_mut()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
            {
                Some(entry) => entry.1 = value,
                None => headers.push((name, value)),
            }
        }

        Ok(Self { headers })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Symbolic name without directives (`name;singleton:=true` -> `name`).
    pub fn symbolic_name(&self) -> Option<&str> {
        self.get(HEADER_SYMBOLIC_NAME)
            .map(|value| value.split(';').next().unwrap_or(value).trim())
            .filter(|name| !name.is_empty())
    }

    pub fn activator(&self) -> Option<&str> {
        self.get(HEADER_ACTIVATOR)
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Extra code-path entries; `.` (the module itself) is dropped.
    pub fn class_path(&self) -> Vec<&str> {
        list_header(self.get(HEADER_CLASS_PATH))
            .into_iter()
            .filter(|entry| *entry != ".")
            .collect()
    }

    /// Native resource entries in `path[;restriction]` form.
    pub fn native_code(&self) -> Vec<&str> {
        list_header(self.get(HEADER_NATIVE_CODE))
    }
}

fn list_header(value: Option<&str>) -> Vec<&str> {
    value
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
