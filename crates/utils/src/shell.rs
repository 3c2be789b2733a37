//! Shell and PATH helpers for launching cluster tools

use std::{
    collections::HashSet,
    env::{join_paths, split_paths},
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

/// Returns the shell used for fixed scripts and its "run this string" flag.
///
/// Site environments rely on `source` and the `module` function, so bash is
/// preferred whenever it is installed; plain `sh` is the fallback.
pub fn get_shell_command() -> (String, &'static str) {
    if Path::new("/bin/bash").exists() {
        ("/bin/bash".into(), "-c")
    } else {
        ("sh".into(), "-c")
    }
}

/// Resolve an executable by name against a PATH-style search list.
///
/// Only files the current user may execute count. Explicit paths (absolute
/// or containing a separator) are checked as-is.
pub fn resolve_executable_path(executable: &str, search_path: &OsStr) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    which::which_in(executable, Some(search_path), cwd).ok()
}

/// Merge two PATH strings into a single, de-duplicated PATH.
///
/// - Keeps the order of entries from `primary`.
/// - Appends only *unseen* entries from `secondary`.
/// - Ignores empty components.
pub fn merge_paths(primary: impl AsRef<OsStr>, secondary: impl AsRef<OsStr>) -> OsString {
    let mut seen = HashSet::<PathBuf>::new();
    let mut merged = Vec::<PathBuf>::new();

    for p in split_paths(primary.as_ref()).chain(split_paths(secondary.as_ref())) {
        if !p.as_os_str().is_empty() && seen.insert(p.clone()) {
            merged.push(p);
        }
    }

    join_paths(merged).unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_primary_order_and_drops_duplicates() {
        let merged = merge_paths("/sw/local/bin:/usr/bin", "/usr/bin:/bin::");
        assert_eq!(merged, OsString::from("/sw/local/bin:/usr/bin:/bin"));
    }

    fn write_script(path: &Path, mode: u32) {
        use std::os::unix::fs::PermissionsExt;

        std::fs::write(path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn resolves_executables_from_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("showquota");
        write_script(&tool, 0o755);

        let search = merge_paths(dir.path(), "/nonexistent");
        assert_eq!(resolve_executable_path("showquota", &search), Some(tool));
        assert_eq!(resolve_executable_path("cpuavail", &search), None);
        assert_eq!(resolve_executable_path("  ", &search), None);
    }

    #[test]
    fn files_without_the_execute_bit_are_not_tools() {
        let dir = tempfile::tempdir().unwrap();
        write_script(&dir.path().join("cpuavail"), 0o644);

        let search = merge_paths(dir.path(), "/nonexistent");
        assert_eq!(resolve_executable_path("cpuavail", &search), None);
    }
}
