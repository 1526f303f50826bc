//! Home-directory shorthand expansion.

use std::path::{Path, PathBuf};

/// Expand `~` and `~/...` to the user's home directory.
///
/// `.` and `..` after the shorthand are resolved lexically. Any other input,
/// absolute or relative, is returned unchanged. If the host has no
/// resolvable home directory the input is also returned unchanged.
pub fn expand_path(path: &str) -> PathBuf {
    expand_with_home(path, dirs::home_dir().as_deref())
}

fn expand_with_home(path: &str, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return PathBuf::from(path);
    };

    if path == "~" {
        return home.to_path_buf();
    }

    let Some(rest) = path.strip_prefix("~/") else {
        return PathBuf::from(path);
    };

    // Join component by component, resolving `.` and `..` lexically.
    let mut expanded = home.to_path_buf();
    for component in rest.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                expanded.pop();
            }
            name => expanded.push(name),
        }
    }
    expanded
}
