//! Platform identification and restriction matching.
//!
//! # Responsibility
//! - Resolve the live OS/architecture pair once per process.
//! - Decide whether a conditional entry applies to a platform.
//!
//! # Invariants
//! - Matching is a pure function of the expression and the platform value.
//! - A category without clauses always matches.

mod restriction;

pub use restriction::{Restriction, KEY_OS_NAME, KEY_PROCESSOR};

use once_cell::sync::Lazy;
use std::fmt::{Display, Formatter};

static CURRENT: Lazy<Platform> =
    Lazy::new(|| Platform::new(std::env::consts::OS, std::env::consts::ARCH));

/// OS/architecture pair in both normalized and raw spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    os: String,
    os_name: String,
    arch: String,
    arch_name: String,
}

impl Platform {
    /// Builds a platform from raw OS and architecture identifiers.
    pub fn new(os_name: &str, arch_name: &str) -> Self {
        let os_name = os_name.trim().to_lowercase();
        let arch_name = arch_name.trim().to_lowercase();
        Self {
            os: normalize_os(&os_name),
            os_name,
            arch: normalize_arch(&arch_name),
            arch_name,
        }
    }

    /// The platform this process runs on.
    pub fn current() -> &'static Platform {
        &CURRENT
    }

    /// Normalized OS identifier (`linux`, `macosx`, `win32`, ...).
    pub fn os(&self) -> &str {
        &self.os
    }

    /// Raw OS identifier as reported by the toolchain.
    pub fn os_name(&self) -> &str {
        &self.os_name
    }

    /// Normalized processor identifier (`x86_64`, `aarch64`, ...).
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Raw processor identifier as reported by the toolchain.
    pub fn arch_name(&self) -> &str {
        &self.arch_name
    }

    /// Evaluates a restriction expression against this platform.
    pub fn matches(&self, expression: &str) -> bool {
        self.satisfies(&Restriction::parse(expression))
    }

    /// Evaluates an already parsed restriction against this platform.
    ///
    /// Processor values are normalized before comparison, so `amd64` and
    /// `x86_64` select the same machines.
    pub fn satisfies(&self, restriction: &Restriction) -> bool {
        let os_matches = restriction.os_names.is_empty()
            || restriction.os_names.contains(&self.os)
            || restriction.os_names.contains(&self.os_name);
        let arch_matches = restriction.processors.is_empty()
            || restriction
                .processors
                .iter()
                .any(|value| *value == self.arch_name || normalize_arch(value) == self.arch);
        os_matches && arch_matches
    }

    /// Splits `value;restriction` and reports whether the entry applies to
    /// this platform. Entries without a restriction part always apply.
    pub fn split_conditional<'a>(&self, entry: &'a str) -> (&'a str, bool) {
        match entry.split_once(';') {
            Some((value, expression)) => (value.trim(), self.matches(expression)),
            None => (entry.trim(), true),
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Evaluates a restriction expression against the live platform.
pub fn matches(expression: &str) -> bool {
    Platform::current().matches(expression)
}

fn normalize_os(raw: &str) -> String {
    if raw.starts_with("mac") {
        "macosx".to_string()
    } else if raw.starts_with("windows") {
        "win32".to_string()
    } else if raw.starts_with("linux") {
        "linux".to_string()
    } else {
        raw.to_string()
    }
}

fn normalize_arch(raw: &str) -> String {
    match raw {
        "amd64" => "x86_64".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::Platform;

    #[test]
    fn normalizes_known_operating_systems() {
        assert_eq!(Platform::new("macos", "aarch64").os(), "macosx");
        assert_eq!(Platform::new("windows", "x86_64").os(), "win32");
        assert_eq!(Platform::new("Linux", "x86_64").os(), "linux");
        assert_eq!(Platform::new("freebsd", "x86_64").os(), "freebsd");
    }

    #[test]
    fn normalizes_amd64() {
        let platform = Platform::new("linux", "amd64");
        assert_eq!(platform.arch(), "x86_64");
        assert_eq!(platform.arch_name(), "amd64");
    }

    #[test]
    fn current_platform_accepts_its_own_identifiers() {
        let current = Platform::current();
        let expression = format!("osname={};processor={}", current.os(), current.arch());
        assert!(current.matches(&expression));
        assert!(super::matches(&expression));
    }

    #[test]
    fn split_conditional_without_restriction_always_applies() {
        let (value, applies) = Platform::new("linux", "x86_64").split_conditional("lib/native.so");
        assert_eq!(value, "lib/native.so");
        assert!(applies);
    }

    #[test]
    fn amd64_restriction_matches_x86_64_machines() {
        let platform = Platform::new("linux", "x86_64");
        assert!(platform.matches("osname=linux;processor=amd64"));
        assert!(platform.matches("processor=\"AMD64\""));
        assert!(!Platform::new("linux", "aarch64").matches("processor=amd64"));
    }
}
