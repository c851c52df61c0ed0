//! Artifact file naming for local downloads and remote copies.
//!
//! Names are `<video_id>_<title>`; the title is reduced to a share-safe
//! character set and truncated (100 chars locally, 80 remotely).

use std::path::Path;

const LOCAL_TITLE_CHARS: usize = 100;
const REMOTE_TITLE_CHARS: usize = 80;

/// Keeps alphanumerics, space, `-` and `_`, drops everything else, trims
/// surrounding whitespace and truncates to `max_chars` characters. The result
/// is valid on Linux and on SMB shares.
pub fn sanitize_title(title: &str, max_chars: usize) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.trim()
        .chars()
        .take(max_chars)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// File stem for a download, without extension.
pub fn local_stem(video_id: &str, title: &str) -> String {
    join_stem(video_id, &sanitize_title(title, LOCAL_TITLE_CHARS))
}

/// Remote file name for an uploaded artifact. The extension is taken from
/// `local` (`.mp4` when it has none).
pub fn remote_file_name(video_id: &str, title: &str, local: &Path) -> String {
    let ext = local
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or("mp4");
    format!(
        "{}.{ext}",
        join_stem(video_id, &sanitize_title(title, REMOTE_TITLE_CHARS))
    )
}

/// Join a share directory (e.g. `/youtube`) and a file name into a path
/// relative to the share root.
pub fn remote_destination(directory: &str, file_name: &str) -> String {
    let dir = directory.trim_matches('/');
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{dir}/{file_name}")
    }
}

fn join_stem(video_id: &str, title: &str) -> String {
    if title.is_empty() {
        video_id.to_string()
    } else {
        format!("{video_id}_{title}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_share_unsafe_chars() {
        assert_eq!(sanitize_title("a/b\\c: d?", 100), "abc d");
        assert_eq!(sanitize_title("  ..Title..  ", 100), "Title");
        assert_eq!(sanitize_title("Rust - Part_2!", 100), "Rust - Part_2");
    }

    #[test]
    fn truncates_on_char_boundary() {
        let title = "é".repeat(120);
        assert_eq!(sanitize_title(&title, 80).chars().count(), 80);
    }

    #[test]
    fn remote_name_uses_local_extension() {
        let name = remote_file_name("abc123", "My Video", Path::new("/dl/abc123_My Video.mkv"));
        assert_eq!(name, "abc123_My Video.mkv");
        let name = remote_file_name("abc123", "", Path::new("/dl/abc123"));
        assert_eq!(name, "abc123.mp4");
    }

    #[test]
    fn destination_joins_without_double_slashes() {
        assert_eq!(remote_destination("/youtube/", "a.mp4"), "youtube/a.mp4");
        assert_eq!(remote_destination("/", "a.mp4"), "a.mp4");
        assert_eq!(local_stem("id", "Hello World"), "id_Hello World");
    }
}
