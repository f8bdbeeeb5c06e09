//! Restriction expression parsing.
//!
//! Grammar: `clause(;clause)*` where `clause = key=value`. Values may be
//! wrapped in double quotes and are compared lowercase.

use std::collections::BTreeSet;

/// Restriction key selecting operating-system names.
pub const KEY_OS_NAME: &str = "osname";
/// Restriction key selecting processor architectures.
pub const KEY_PROCESSOR: &str = "processor";

/// Parsed restriction sets, one per recognized category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Restriction {
    pub os_names: BTreeSet<String>,
    pub processors: BTreeSet<String>,
}

impl Restriction {
    /// Parses a restriction expression.
    ///
    /// Clauses without `=` and unknown keys are ignored, so parsing never
    /// fails; an empty expression yields an unrestricted value.
    pub fn parse(expression: &str) -> Self {
        let mut restriction = Self::default();
        for clause in expression.split(';') {
            let Some((key, value)) = clause.split_once('=') else {
                continue;
            };

            let value = normalize_value(value);
            match key.trim() {
                KEY_OS_NAME => {
                    restriction.os_names.insert(value);
                }
                KEY_PROCESSOR => {
                    restriction.processors.insert(value);
                }
                _ => {}
            }
        }
        restriction
    }

    /// Returns true when no category carries any clause.
    pub fn is_unrestricted(&self) -> bool {
        self.os_names.is_empty() && self.processors.is_empty()
    }
}

fn normalize_value(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let value = lowered.strip_prefix('"').unwrap_or(&lowered);
    let value = value.strip_suffix('"').unwrap_or(value);
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::Restriction;

    #[test]
    fn parses_both_categories() {
        let restriction = Restriction::parse("osname=Linux;processor=x86_64");
        assert!(restriction.os_names.contains("linux"));
        assert!(restriction.processors.contains("x86_64"));
    }

    #[test]
    fn strips_quotes_and_whitespace() {
        let restriction = Restriction::parse(" osname = \"Win32\" ; processor=\"AARCH64\"");
        assert!(restriction.os_names.contains("win32"));
        assert!(restriction.processors.contains("aarch64"));
    }

    #[test]
    fn ignores_unknown_keys_and_bare_clauses() {
        let restriction = Restriction::parse("language=en;garbage;selection-filter=x");
        assert!(restriction.is_unrestricted());
    }

    #[test]
    fn collects_repeated_values_in_one_category() {
        let restriction = Restriction::parse("osname=linux;osname=macosx");
        assert_eq!(restriction.os_names.len(), 2);
    }
}
