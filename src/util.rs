use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Truncate to at most `max` characters, appending "..." when shortened.
pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    let char_count = s.chars().count();
    if char_count <= max {
        return s.to_string();
    }

    if max <= 3 {
        return s.chars().take(max).collect();
    }

    let truncated: String = s.chars().take(max - 3).collect();
    format!("{}...", truncated)
}

/// Truncate a string for display (Unicode-safe), borrowing instead of allocating.
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Collapse a multi-line model response into one line for log previews.
pub fn log_preview(text: &str, max_chars: usize) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(&single_line, max_chars)
}

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `path` with `suffix` appended to its file name (`history.json` -> `history.json.lock`).
pub fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("data"));
    name.push(suffix);
    path.with_file_name(name)
}

/// Write `content` to a temp file next to `path`, then rename it into place.
pub fn write_atomic(path: &Path, content: &str) -> anyhow::Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)?;

    // Owner read/write only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600));
    }

    #[cfg(windows)]
    {
        if path.exists() {
            if let Err(err) = fs::remove_file(path) {
                let _ = fs::remove_file(&tmp_path);
                return Err(err.into());
            }
        }
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}

/// Move an unreadable file aside as `<name>.corrupt` and return the backup path.
pub fn preserve_corrupt(path: &Path, content: &str) -> PathBuf {
    let corrupt_path = sidecar_path(path, ".corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
    corrupt_path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string_unchanged() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_adds_ellipsis() {
        assert_eq!(truncate("hello world", 8), "hello...");
    }

    #[test]
    fn test_truncate_tiny_limits() {
        assert_eq!(truncate("hello", 0), "");
        assert_eq!(truncate("hello", 2), "he");
    }

    #[test]
    fn test_truncate_multibyte() {
        let s = "🎉".repeat(10);
        assert_eq!(truncate(&s, 5).chars().count(), 5);
        assert_eq!(truncate_str(&s, 4).chars().count(), 4);
    }

    #[test]
    fn test_truncate_str_shorter_than_limit() {
        assert_eq!(truncate_str("abc", 10), "abc");
    }

    #[test]
    fn test_log_preview_collapses_whitespace() {
        assert_eq!(log_preview("a\n  b\tc", 20), "a b c");
    }

    #[test]
    fn test_sidecar_path_appends_suffix() {
        let path = Path::new("/tmp/x/history.json");
        assert_eq!(
            sidecar_path(path, ".lock"),
            PathBuf::from("/tmp/x/history.json.lock")
        );
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        write_atomic(&path, "first").unwrap();
        write_atomic(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!path.with_extension("tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        write_atomic(&path, "{}").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_preserve_corrupt_moves_file_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        let backup = preserve_corrupt(&path, "{not json");
        assert_eq!(backup, dir.path().join("config.json.corrupt"));
        assert!(!path.exists());
        assert_eq!(fs::read_to_string(backup).unwrap(), "{not json");
    }
}
