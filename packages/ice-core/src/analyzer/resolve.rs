//! Path resolution ladder (part of C4, spec.md §4.4).

use std::path::Path;

use crate::types::FilePath;

/// Resolves `reference` relative to `base_dir` (the directory containing the file the
/// reference was found in) by probing the filesystem in spec order. Returns `None` if
/// none of the candidates exist — an unresolved reference is dropped silently by the
/// caller, never an error.
pub fn resolve(reference: &str, base_dir: &FilePath, extensions: &[String]) -> Option<FilePath> {
    let resolved_base = base_dir.join(reference);

    // Step 1: already has a recognized extension and exists as-is.
    if let Some(ext) = resolved_base.extension() {
        let dotted = format!(".{ext}");
        if extensions.iter().any(|e| e == &dotted) && resolved_base.as_path().exists() {
            return Some(resolved_base);
        }
    }

    // Step 2: append each configured extension to the resolved path.
    for ext in extensions {
        let candidate = append_extension(&resolved_base, ext);
        if candidate.as_path().exists() {
            return Some(candidate);
        }
    }

    // Step 3: treat the resolved path as a directory, try its index file.
    for ext in extensions {
        let candidate = resolved_base.join(format!("index{ext}"));
        if candidate.as_path().exists() {
            return Some(candidate);
        }
    }

    None
}

fn append_extension(path: &FilePath, ext: &str) -> FilePath {
    let mut os = path.as_path().as_os_str().to_owned();
    os.push(ext);
    FilePath::new(Path::new(&os))
}
