//! Text rendering for shell output

use std::fmt::Write;

use chrono::Local;

use crate::config::Bookmark;
use crate::sftp::{FileEntry, TransferProgress};

/// Directory listing table: type, size, local modification time, name
pub fn listing(title: &str, entries: &[FileEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nListing directory: {}", title);
    let _ = writeln!(out, "Type\tSize\t\tModified\t\tName");
    let _ = writeln!(out, "----\t----\t\t--------\t\t----");
    for entry in entries {
        let _ = writeln!(
            out,
            "{}\t{:<10}\t{}\t{}",
            if entry.is_dir() { "DIR " } else { "FILE" },
            entry.size,
            entry.modified.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            entry.name
        );
    }
    out
}

pub fn bookmarks(bookmarks: &[Bookmark]) -> String {
    if bookmarks.is_empty() {
        return "No bookmarks saved\n".to_string();
    }
    let mut out = String::new();
    for b in bookmarks {
        let auth = if b.use_ssh_key {
            format!("key {}", b.key_path)
        } else {
            "password".to_string()
        };
        let _ = writeln!(out, "{}\t{}@{}:{}\t{}", b.name, b.username, b.host, b.port, auth);
    }
    out
}

/// One progress line, without a trailing newline
pub fn progress(p: &TransferProgress) -> String {
    match p.percentage() {
        Some(pct) => format!("{:>3.0}% {} bytes", pct, p.transferred_bytes),
        None => format!("{} bytes", p.transferred_bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::{EntryKind, TransferDirection};
    use chrono::DateTime;

    #[test]
    fn test_listing_layout() {
        let entries = vec![
            FileEntry {
                name: "docs".to_string(),
                kind: EntryKind::Directory,
                size: 4096,
                modified: DateTime::from_timestamp(0, 0).unwrap(),
            },
            FileEntry {
                name: "a.txt".to_string(),
                kind: EntryKind::File,
                size: 12,
                modified: DateTime::from_timestamp(0, 0).unwrap(),
            },
        ];

        let text = listing(".", &entries);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "Listing directory: .");
        assert_eq!(lines[2], "Type\tSize\t\tModified\t\tName");
        assert!(lines[4].starts_with("DIR \t4096      \t"));
        assert!(lines[4].ends_with("\tdocs"));
        assert!(lines[5].starts_with("FILE\t12        \t"));
        assert!(lines[5].ends_with("\ta.txt"));
    }

    #[test]
    fn test_bookmarks() {
        assert_eq!(bookmarks(&[]), "No bookmarks saved\n");
        let text = bookmarks(&[Bookmark::key("prod", "h", 2222, "u", "/k")]);
        assert_eq!(text, "prod\tu@h:2222\tkey /k\n");
    }

    #[test]
    fn test_progress() {
        let mut p = TransferProgress {
            id: "x".to_string(),
            direction: TransferDirection::Download,
            total_bytes: Some(200),
            transferred_bytes: 100,
        };
        assert_eq!(progress(&p), " 50% 100 bytes");
        p.total_bytes = None;
        assert_eq!(progress(&p), "100 bytes");
    }
}
