//! Helpers for `/`-separated folder paths relative to a library root.

use crate::error::Error;

/// Trim separators, collapse empty segments and reject `.`/`..`.
pub fn normalize_folder_path(path: &str) -> Result<String, Error> {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        return Err(Error::InvalidData("folder path cannot be empty".into()));
    }
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(Error::InvalidData(format!(
            "folder path '{}' may not contain '.' or '..' segments",
            path
        )));
    }
    Ok(segments.join("/"))
}

pub fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

pub fn folder_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Root-adjacent folders sit at depth 0.
pub fn depth_of(path: &str) -> i64 {
    path.matches('/').count() as i64
}

pub fn join_path(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{}/{}", parent, name),
        _ => name.to_string(),
    }
}

/// Strict ancestors of `path`, root-first: `a/b/c` → `[a, a/b]`.
pub fn ancestor_paths(path: &str) -> Vec<String> {
    let mut ancestors = Vec::new();
    let mut current = path;
    while let Some(parent) = parent_path(current) {
        ancestors.push(parent.to_string());
        current = parent;
    }
    ancestors.reverse();
    ancestors
}

/// Ancestors followed by `path` itself.
pub fn path_chain(path: &str) -> Vec<String> {
    let mut chain = ancestor_paths(path);
    chain.push(path.to_string());
    chain
}

/// The folder holding a file, or None for files directly in the library root.
pub fn folder_of_file(relative_path: &str) -> Option<&str> {
    parent_path(relative_path).filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folder_path() {
        assert_eq!(normalize_folder_path("/X//Y/Z/").unwrap(), "X/Y/Z");
        assert_eq!(normalize_folder_path("X\\Y").unwrap(), "X/Y");
        assert!(normalize_folder_path("///").is_err());
        assert!(normalize_folder_path("X/../Y").is_err());
    }

    #[test]
    fn test_ancestors_and_depth() {
        assert_eq!(ancestor_paths("X/Y/Z"), vec!["X".to_string(), "X/Y".to_string()]);
        assert!(ancestor_paths("X").is_empty());
        assert_eq!(path_chain("X/Y"), vec!["X".to_string(), "X/Y".to_string()]);
        assert_eq!(depth_of("X"), 0);
        assert_eq!(depth_of("X/Y/Z"), 2);
    }

    #[test]
    fn test_names_and_parents() {
        assert_eq!(folder_name("Marvel/X-Men (1991)"), "X-Men (1991)");
        assert_eq!(folder_name("Marvel"), "Marvel");
        assert_eq!(parent_path("Marvel/X-Men"), Some("Marvel"));
        assert_eq!(parent_path("Marvel"), None);
        assert_eq!(join_path(Some("a/b"), "c"), "a/b/c");
        assert_eq!(join_path(None, "c"), "c");
    }

    #[test]
    fn test_folder_of_file() {
        assert_eq!(folder_of_file("Batman/001.cbz"), Some("Batman"));
        assert_eq!(folder_of_file("a/b/001.cbz"), Some("a/b"));
        assert_eq!(folder_of_file("001.cbz"), None);
    }
}
