use anyhow::{bail, Context, Result};
use std::process::Command;
use std::time::Duration;

pub const MEDIA_EXTENSIONS: [&str; 5] = ["mkv", "mp4", "avi", "mov", "m4v"];

pub fn ensure_ffprobe_available() -> Result<()> {
    let out = Command::new("ffprobe")
        .arg("-version")
        .output()
        .context("failed to run ffprobe -version")?;
    if !out.status.success() {
        bail!("ffprobe exists but returned non-zero on -version");
    }
    Ok(())
}

/// Extension allow-list plus the macOS resource-fork prefix filter.
pub fn is_media_filename(name: &str) -> bool {
    if name.starts_with("._") {
        return false;
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            MEDIA_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

pub fn fmt_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{:02}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}
