//! Path utilities for SFTP operations
//!
//! Remote SFTP paths always use `/` as separator (per SFTP protocol), local
//! paths use the platform separator.

use std::path::{Path, PathBuf};

/// Join remote SFTP path components using `/` separator.
pub fn join_remote_path(base: &str, component: &str) -> String {
    if base.is_empty() {
        component.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// Last component of a remote path, ignoring trailing slashes
pub fn remote_file_name(path: &str) -> Option<&str> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
}

/// Where an upload of `local_path` lands. A remote target ending in `/`
/// names a directory and receives the local file name.
pub fn upload_target(local_path: &Path, remote: &str) -> String {
    if remote.ends_with('/') {
        if let Some(name) = local_path.file_name() {
            return join_remote_path(remote, &name.to_string_lossy());
        }
    }
    remote.to_string()
}

/// Where a download of `remote_path` lands. An existing local directory (or
/// a path ending in a separator) receives the remote file name.
pub fn download_target(remote_path: &str, local: &str) -> PathBuf {
    let target = PathBuf::from(local);
    let names_dir = local.ends_with(std::path::MAIN_SEPARATOR) || local.ends_with('/') || target.is_dir();
    match remote_file_name(remote_path) {
        Some(name) if names_dir => target.join(name),
        _ => target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_join_remote_path() {
        assert_eq!(join_remote_path("/home", "file.txt"), "/home/file.txt");
        assert_eq!(join_remote_path("/home/", "file.txt"), "/home/file.txt");
        assert_eq!(join_remote_path("/", "home"), "/home");
        assert_eq!(join_remote_path("", "home"), "home");
    }

    #[test]
    fn test_remote_file_name() {
        assert_eq!(remote_file_name("/srv/data/report.csv"), Some("report.csv"));
        assert_eq!(remote_file_name("report.csv"), Some("report.csv"));
        assert_eq!(remote_file_name("/srv/data/"), Some("data"));
        assert_eq!(remote_file_name("/"), None);
        assert_eq!(remote_file_name(".."), None);
    }

    #[test]
    fn test_upload_target() {
        let local = Path::new("/tmp/notes.txt");
        assert_eq!(upload_target(local, "/upload/"), "/upload/notes.txt");
        assert_eq!(upload_target(local, "/upload/renamed.txt"), "/upload/renamed.txt");
    }

    #[test]
    fn test_download_target() {
        let temp = tempdir().unwrap();
        let dir = temp.path().to_string_lossy().to_string();

        assert_eq!(download_target("/srv/a.bin", &dir), temp.path().join("a.bin"));

        let explicit = temp.path().join("b.bin");
        assert_eq!(download_target("/srv/a.bin", &explicit.to_string_lossy()), explicit);
    }
}
