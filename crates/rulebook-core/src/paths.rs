//! Path predicates used to decide whether a rule applies to a file.

/// Convert Windows separators so paths from any client compare the same way.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Extension of the last path segment including the dot, or "" when it has none.
/// Dotfiles such as `.bashrc` have no extension.
fn extension(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if name == ".." {
        return "";
    }
    match name.rfind('.') {
        None | Some(0) => "",
        Some(dot) => &name[dot..],
    }
}

/// Does `path` have the extension named by a `*.<ext>` pattern?
/// Any other pattern shape never matches.
pub fn matches_file_type(path: &str, pattern: &str) -> bool {
    let Some(suffix) = pattern.strip_prefix('*') else {
        return false;
    };
    if !suffix.starts_with('.') {
        return false;
    }
    extension(&normalize_path(path)) == suffix
}

/// Is `path` the folder itself or somewhere below it? An empty folder covers everything.
pub fn path_under_folder(path: &str, folder: &str) -> bool {
    let folder = normalize_path(folder);
    if folder.is_empty() {
        return true;
    }
    let path = normalize_path(path);
    match path.strip_prefix(folder.as_str()) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
