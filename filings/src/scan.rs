//! Recursive lookup of extracted filing files.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// All `*.xml` files under `root`, sorted for a stable processing order.
pub fn scan_xml_files(root: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case("xml"))
        })
        .collect();
    out.sort();
    out
}
