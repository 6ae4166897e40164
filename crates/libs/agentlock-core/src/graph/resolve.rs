//! Relative-import path resolution (§4.4 "Path resolution"), with an LRU
//! cache scoped to a single graph build keyed by `(fromFile, module)`.

use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;

const CACHE_CAPACITY: usize = 4096;

const CANDIDATE_SUFFIXES: &[&str] = &[
    ".ts",
    ".tsx",
    ".js",
    ".jsx",
    ".py",
    "/index.ts",
    "/index.tsx",
    "/index.js",
    "/index.jsx",
];

pub struct PathResolver {
    cache: Mutex<LruCache<(String, String), Option<String>>>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(CACHE_CAPACITY).expect("cache capacity is non-zero"))),
        }
    }

    /// Resolves `module` as imported from `from_file` against `tree_files`,
    /// the supported-extension file set of the tree currently being built.
    /// Returns `None` for non-relative modules (external libraries) or when
    /// no candidate matches.
    pub fn resolve(&self, from_file: &str, module: &str, tree_files: &HashSet<String>) -> Option<String> {
        if !(module.starts_with('.') || module.starts_with('/')) {
            return None;
        }

        let cache_key = (from_file.to_string(), module.to_string());
        if let Some(hit) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&cache_key) {
            return hit.clone();
        }

        let resolved = Self::resolve_uncached(from_file, module, tree_files);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(cache_key, resolved.clone());
        resolved
    }

    fn resolve_uncached(from_file: &str, module: &str, tree_files: &HashSet<String>) -> Option<String> {
        let dir = parent_dir(from_file);
        let target = normalize(&dir, module);

        for suffix in CANDIDATE_SUFFIXES {
            let candidate = format!("{target}{suffix}");
            if tree_files.contains(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

/// Applies `.`/`..` segments from `module` against `base_dir`, producing a
/// normalized slash-joined path with no `.`/`..` components remaining.
fn normalize(base_dir: &str, module: &str) -> String {
    let mut segments: Vec<&str> = if base_dir.is_empty() {
        Vec::new()
    } else {
        base_dir.split('/').collect()
    };

    for part in module.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(paths: &[&str]) -> HashSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn resolves_sibling_ts_file() {
        let resolver = PathResolver::new();
        let files = tree(&["src/a.ts", "src/b.ts"]);
        assert_eq!(
            resolver.resolve("src/a.ts", "./b", &files),
            Some("src/b.ts".to_string())
        );
    }

    #[test]
    fn resolves_parent_relative_and_index() {
        let resolver = PathResolver::new();
        let files = tree(&["src/a/x.ts", "src/b/index.ts"]);
        assert_eq!(
            resolver.resolve("src/a/x.ts", "../b", &files),
            Some("src/b/index.ts".to_string())
        );
    }

    #[test]
    fn non_relative_module_is_unresolved() {
        let resolver = PathResolver::new();
        let files = tree(&["src/a.ts"]);
        assert_eq!(resolver.resolve("src/a.ts", "react", &files), None);
    }

    #[test]
    fn unresolvable_target_yields_none() {
        let resolver = PathResolver::new();
        let files = tree(&["src/a.ts"]);
        assert_eq!(resolver.resolve("src/a.ts", "./missing", &files), None);
    }

    #[test]
    fn cache_hit_returns_same_result_on_repeat_lookup() {
        let resolver = PathResolver::new();
        let files = tree(&["src/a.ts", "src/b.ts"]);
        let first = resolver.resolve("src/a.ts", "./b", &files);
        let second = resolver.resolve("src/a.ts", "./b", &files);
        assert_eq!(first, second);
    }
}
