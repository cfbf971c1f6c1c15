use crate::error::Result;

use regex::Regex;

use std::io::Write as _;
use std::path::Path;
use std::sync::LazyLock;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]+"#).expect("valid regex"));

/// Writes `bytes` to a temporary file next to `path` and renames it into place, so readers
/// never observe a partially written file
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;

    Ok(())
}

/// Makes `name` usable as a single path component
pub(crate) fn sanitize_filename(name: &str) -> String {
    let cleaned = UNSAFE_CHARS.replace_all(name.trim(), "_");

    match cleaned.as_ref() {
        "" | "." | ".." => "_".to_owned(),
        _ => cleaned.into_owned(),
    }
}
