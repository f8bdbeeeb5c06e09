use appup_core::platform::{KEY_OS_NAME, KEY_PROCESSOR};
use appup_core::{Platform, Restriction};

fn platforms() -> Vec<Platform> {
    vec![
        Platform::new("linux", "x86_64"),
        Platform::new("linux", "aarch64"),
        Platform::new("windows", "x86_64"),
        Platform::new("macos", "aarch64"),
    ]
}

#[test]
fn os_and_processor_must_both_match() {
    let matching: Vec<String> = platforms()
        .iter()
        .filter(|platform| platform.matches("osname=linux;processor=x86_64"))
        .map(ToString::to_string)
        .collect();
    assert_eq!(matching, vec!["linux/x86_64".to_string()]);
}

#[test]
fn empty_expression_matches_everywhere() {
    assert!(Restriction::parse("").is_unrestricted());
    for platform in platforms() {
        assert!(platform.matches(""), "{platform} should accept no restriction");
    }
}

#[test]
fn os_only_restriction_ignores_processor() {
    let matching: Vec<String> = platforms()
        .iter()
        .filter(|platform| platform.matches("osname=linux"))
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        matching,
        vec!["linux/x86_64".to_string(), "linux/aarch64".to_string()]
    );
}

#[test]
fn repeated_clauses_widen_a_category() {
    let restriction = Restriction::parse("osname=win32;osname=macosx");
    assert_eq!(restriction.os_names.len(), 2);
    let matching: Vec<String> = platforms()
        .iter()
        .filter(|platform| platform.satisfies(&restriction))
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        matching,
        vec!["win32/x86_64".to_string(), "macosx/aarch64".to_string()]
    );
}

#[test]
fn raw_and_aliased_identifiers_both_match() {
    let platform = Platform::new("Linux", "amd64");
    assert!(platform.matches("processor=x86_64"));
    assert!(platform.matches("processor=amd64"));
    assert!(!platform.matches("processor=aarch64"));
}

#[test]
fn quoted_values_and_unknown_keys_are_tolerated() {
    let restriction = Restriction::parse(r#" osname = "Linux" ; ws=gtk; garbage "#);
    assert!(restriction.processors.is_empty());
    assert!(restriction.os_names.contains("linux"));
    assert!(Platform::new("linux", "riscv64").satisfies(&restriction));
    assert_eq!(KEY_OS_NAME, "osname");
    assert_eq!(KEY_PROCESSOR, "processor");
}

#[test]
fn conditional_entries_split_on_first_separator() {
    let platform = Platform::new("linux", "x86_64");
    assert_eq!(
        platform.split_conditional("lib/libfoo.so;osname=linux;processor=amd64"),
        ("lib/libfoo.so", true)
    );
    assert_eq!(
        platform.split_conditional(" lib/foo.dll ;osname=win32"),
        ("lib/foo.dll", false)
    );
}
