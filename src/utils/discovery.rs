//! Finds page sources carrying `ensureUI` comments and flow documents

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

const PAGE_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js", "mdx", "vue", "svelte"];
const SKIPPED_DIRS: &[&str] = &["node_modules", ".next", "dist", "build", ".git", "api"];
const MARKER: &str = "ensureUI";

/// A candidate page file and its full source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPage {
    /// Path relative to the project root, `/`-separated
    pub file_path: String,
    pub source_text: String,
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && SKIPPED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref())
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Walk `root` for page files that mention the marker, in path order.
pub fn discover_pages(root: &Path) -> Vec<DiscoveredPage> {
    let mut pages = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let is_page = path
            .extension()
            .map_or(false, |ext| PAGE_EXTENSIONS.iter().any(|p| ext == *p));
        if !is_page {
            continue;
        }

        let source_text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        if !source_text.contains(MARKER) {
            continue;
        }

        pages.push(DiscoveredPage {
            file_path: relative_path(root, path),
            source_text,
        });
    }

    log::debug!("Discovered {} page(s) under {}", pages.len(), root.display());
    pages
}

/// Markdown flow documents under `flows_dir`, in path order. A missing
/// directory simply yields no flows.
pub fn discover_flow_files(flows_dir: &Path) -> Vec<PathBuf> {
    if !flows_dir.is_dir() {
        log::debug!("No flows directory at {}", flows_dir.display());
        return Vec::new();
    }

    WalkDir::new(flows_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path().extension().map_or(false, |ext| ext == "md")
        })
        .map(|e| e.path().to_path_buf())
        .collect()
}
