//! Dependency Analyzer (C4): lexical extraction, path resolution, project scan.

mod extract;
mod resolve;
mod scanner;

pub use extract::{extract_references, filter_references, is_external};
pub use resolve::resolve;
pub use scanner::{ScanReport, Scanner};
