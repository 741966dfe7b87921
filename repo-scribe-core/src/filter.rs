//! Which paths of a repository are worth documenting.
//!
//! Paths are always evaluated relative to the repository root. A path is
//! excluded when any component is hidden (starts with `.`) or names a
//! dependency/cache directory, and a file is additionally excluded when its
//! extension marks it as binary.

use std::path::{Component, Path};

/// Directory names holding vendored dependencies, build output or caches.
pub const DEPENDENCY_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    "target",
    "vendor",
    "dist",
    "build",
    "venv",
];

/// Extensions (lowercase, without the dot) of binary and image files.
pub const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp", "zip", "gz", "tar", "tgz", "jar",
    "war", "pyc", "class", "so", "dylib", "dll", "exe", "bin", "pdf", "woff", "woff2", "ttf",
    "eot",
];

/// A single path component that prunes everything below it. The walk checks
/// directory names with this before recursing.
pub fn is_excluded_component(name: &str) -> bool {
    name.starts_with('.') || DEPENDENCY_DIRS.contains(&name)
}

fn has_excluded_component(relative: &Path) -> bool {
    relative.components().any(|component| match component {
        Component::Normal(name) => is_excluded_component(&name.to_string_lossy()),
        _ => false,
    })
}

pub fn is_binary(relative: &Path) -> bool {
    relative
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            BINARY_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

pub fn is_excluded_file(relative: &Path) -> bool {
    has_excluded_component(relative) || is_binary(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_and_dependency_components_are_excluded() {
        for path in [
            ".git/config",
            ".env",
            "src/.cache/data.txt",
            "node_modules/x.js",
            "pkg/__pycache__/mod.py",
            "web/node_modules/lib/index.js",
        ] {
            assert!(is_excluded_file(Path::new(path)), "{path} should be excluded");
        }
        assert!(is_excluded_component("node_modules"));
        assert!(is_excluded_component(".github"));
    }

    #[test]
    fn binary_extensions_are_excluded_case_insensitively() {
        assert!(is_excluded_file(Path::new("img.png")));
        assert!(is_excluded_file(Path::new("docs/Logo.JPG")));
        assert!(is_excluded_file(Path::new("dist.zip")));
        assert!(is_excluded_file(Path::new("mod.pyc")));
        // Only files are judged by extension.
        assert!(!is_excluded_component("assets.png"));
    }

    #[test]
    fn ordinary_sources_are_kept() {
        for path in ["a.py", "src/main.rs", "README.md", "Makefile", "docs/guide.v2.md"] {
            assert!(!is_excluded_file(Path::new(path)), "{path} should be kept");
        }
    }

    #[test]
    fn lookalike_names_are_not_dependency_dirs() {
        assert!(!is_excluded_file(Path::new("node_modules_notes.md")));
        assert!(!is_excluded_file(Path::new("targets/list.txt")));
    }
}
