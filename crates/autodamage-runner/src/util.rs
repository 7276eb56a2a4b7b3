use std::path::{Path, PathBuf};

/// `~` expands to the home directory; other relative paths hang off `root`.
pub fn expand_path(root: &Path, raw: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(raw).to_string());
    if expanded.is_absolute() {
        expanded
    } else {
        root.join(expanded)
    }
}
