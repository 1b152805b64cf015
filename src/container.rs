//! Root path remapping when running inside a container
//!
//! The wrapper script passes the host's working directory and a list of
//! mount prefixes; the root given on the command line is resolved against
//! the host directory and then looked up under each prefix.

use std::path::{Path, PathBuf};

/// Resolve the root the user typed into a path visible in this container
///
/// Without a host working directory the root is returned unchanged. When
/// no prefix contains the path, the host-resolved path is returned.
pub fn resolve_root(root: &Path, host_pwd: Option<&Path>, prefixes: &[PathBuf]) -> PathBuf {
    let Some(pwd) = host_pwd else {
        return root.to_path_buf();
    };

    let resolved = pwd.join(root);
    let relative = resolved.strip_prefix("/").unwrap_or(&resolved);
    for prefix in prefixes {
        let candidate = prefix.join(relative);
        if candidate.exists() {
            log::debug!("container root {} -> {}", resolved.display(), candidate.display());
            return candidate;
        }
    }
    resolved
}

/// Split the comma separated prefix list of the hidden CLI flag
pub fn parse_prefixes(list: &str) -> Vec<PathBuf> {
    list.split(',')
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}
