//! Lexical import extraction (part of C4, spec.md §4.4).
//!
//! Three regex patterns run over a file's raw text: static imports, dynamic
//! `import(...)`, and CommonJS `require(...)`. This is deliberately lexical rather than
//! a real parser — it will pick up string literals inside comments, which is accepted
//! per spec.md §7 (unresolved references are non-fatal, not an error).

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

static STATIC_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import\s+(?:[\w*${}\s,]+\s+from\s+)?['"]([^'"]+)['"]"#).unwrap()
});

static DYNAMIC_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

static REQUIRE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

/// Extracts every module reference string from `source`, in first-seen order with
/// duplicates removed.
pub fn extract_references(source: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for pattern in [&*STATIC_IMPORT, &*DYNAMIC_IMPORT, &*REQUIRE] {
        for capture in pattern.captures_iter(source) {
            let reference = capture[1].to_string();
            if seen.insert(reference.clone()) {
                out.push(reference);
            }
        }
    }

    out
}

/// A reference is external (a bare specifier, e.g. `react`) unless it starts with
/// `./`, `../`, or `/`.
pub fn is_external(reference: &str) -> bool {
    !(reference.starts_with("./") || reference.starts_with("../") || reference.starts_with('/'))
}

/// Applies `exclude_external` filtering to an already-deduplicated reference list.
pub fn filter_references(references: Vec<String>, exclude_external: bool) -> Vec<String> {
    if !exclude_external {
        return references;
    }
    references
        .into_iter()
        .filter(|r| !is_external(r))
        .collect()
}
