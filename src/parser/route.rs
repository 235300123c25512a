//! File path to route resolution
//!
//! `src/app/(shop)/products/[id]/page.tsx` + `{id: "7"}` resolves to
//! `/products/7`. Every dynamic segment must be supplied by the caller;
//! a missing value is an error, never a placeholder.

use crate::error::{EnsureError, EnsureResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const SOURCE_PREFIX: &str = "src/";
const ROUTER_PREFIXES: &[&str] = &["app/", "pages/", "routes/"];
const INDEX_STEMS: &[&str] = &["page", "index", "+page"];

#[derive(Debug, Clone, Default)]
pub struct RouteResolver {
    project_root: Option<PathBuf>,
}

impl RouteResolver {
    pub fn new(project_root: Option<&Path>) -> Self {
        Self {
            project_root: project_root.map(|p| p.to_path_buf()),
        }
    }

    /// Resolve `file_path` into a request path starting with `/`, without a
    /// trailing slash unless it is the root.
    pub fn resolve(
        &self,
        file_path: &str,
        url_params: &HashMap<String, String>,
    ) -> EnsureResult<String> {
        let relative = self.strip_project_root(file_path);
        let mut rest = relative.as_str();

        // `src/` may wrap the router directory: `src/app/...`, `src/pages/...`
        if let Some(stripped) = rest.strip_prefix(SOURCE_PREFIX) {
            rest = stripped;
        }
        if let Some(stripped) = ROUTER_PREFIXES.iter().find_map(|p| rest.strip_prefix(p)) {
            rest = stripped;
        }

        let mut raw_segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

        if let Some(last) = raw_segments.pop() {
            let stem = strip_extension(last);
            if !INDEX_STEMS.contains(&stem) {
                raw_segments.push(stem);
            }
        }

        let mut segments = Vec::with_capacity(raw_segments.len());
        for segment in raw_segments {
            if segment.starts_with('(') && segment.ends_with(')') {
                continue;
            }
            match dynamic_param_name(segment) {
                Some(name) => {
                    let value = url_params
                        .get(name)
                        .map(|v| v.trim().trim_matches('/'))
                        .filter(|v| !v.is_empty())
                        .ok_or_else(|| EnsureError::MissingRouteParam {
                            param: name.to_string(),
                            file_path: file_path.to_string(),
                        })?;
                    segments.push(value.to_string());
                }
                None => segments.push(segment.to_string()),
            }
        }

        Ok(format!("/{}", segments.join("/")))
    }

    fn strip_project_root(&self, file_path: &str) -> String {
        let normalized = file_path.replace('\\', "/");
        let mut relative = normalized.as_str();

        if let Some(root) = &self.project_root {
            let root = root.to_string_lossy().replace('\\', "/");
            let root = root.trim_end_matches('/');
            if !root.is_empty() && root != "." {
                if let Some(stripped) = relative.strip_prefix(root) {
                    relative = stripped;
                }
            }
        }

        relative
            .trim_start_matches("./")
            .trim_start_matches('/')
            .to_string()
    }
}

/// Names of the dynamic segments in a file path, in order.
pub fn dynamic_params(file_path: &str) -> Vec<String> {
    file_path
        .replace('\\', "/")
        .split('/')
        .map(strip_extension)
        .filter_map(dynamic_param_name)
        .map(str::to_string)
        .collect()
}

/// `[id]` -> `id`, `[...slug]` -> `slug`, `[[...slug]]` -> `slug`
fn dynamic_param_name(segment: &str) -> Option<&str> {
    let inner = segment.strip_prefix('[')?.strip_suffix(']')?;
    let inner = inner
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(inner);
    let name = inner.trim_start_matches("...");
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn strip_extension(segment: &str) -> &str {
    if segment.starts_with('[') {
        return match segment.rfind(']') {
            Some(end) => &segment[..=end],
            None => segment,
        };
    }
    match segment.find('.') {
        Some(0) | None => segment,
        Some(idx) => &segment[..idx],
    }
}
