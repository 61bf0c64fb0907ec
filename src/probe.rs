use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::process::Command;

/// Resolution bucket derived from the first video stream's pixel width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Sd,
    R720p,
    R1080p,
    R4k,
}

impl Resolution {
    pub fn from_width(width: u32) -> Self {
        if width >= 3800 {
            Resolution::R4k
        } else if width >= 1900 {
            Resolution::R1080p
        } else if width >= 1260 {
            Resolution::R720p
        } else {
            Resolution::Sd
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resolution::Sd => "SD",
            Resolution::R720p => "720p",
            Resolution::R1080p => "1080p",
            Resolution::R4k => "4K",
        };
        f.write_str(s)
    }
}

/// Bracketed technical summary appended to canonical names. Derived fresh
/// from the file's bytes on every run that needs it, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TechnicalTag {
    Probed {
        resolution: Resolution,
        codec: String,
        languages: Vec<String>,
    },
    /// Subprocess failure or unparsable output; the file is still renamed
    /// with this sentinel so one broken container never stalls a batch.
    Unavailable,
}

impl fmt::Display for TechnicalTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TechnicalTag::Probed {
                resolution,
                codec,
                languages,
            } => write!(f, "[{}][{}][{}]", resolution, codec, languages.join("-")),
            TechnicalTag::Unavailable => f.write_str("[ERROR-METADATA]"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<StreamInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamInfo {
    #[serde(default)]
    pub codec_type: String,
    #[serde(default)]
    pub codec_name: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub tags: StreamTags,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamTags {
    #[serde(default)]
    pub language: Option<String>,
}

fn display_codec(raw: &str) -> String {
    match raw {
        "hevc" | "h265" => "x265".to_string(),
        "h264" | "avc" => "x264".to_string(),
        "mpeg4" => "XviD".to_string(),
        other => other.to_string(),
    }
}

fn display_language(code: &str) -> String {
    match code {
        "spa" | "lat" => "Latino".to_string(),
        "eng" => "Ingles".to_string(),
        "jpn" => "Japones".to_string(),
        "fra" => "Frances".to_string(),
        "ita" => "Italiano".to_string(),
        other => other.to_string(),
    }
}

/// Reduces a parsed stream list to a tag. Pure so the bucketing and the
/// codec/language maps are testable without ffprobe on the machine.
pub fn tag_from_streams(streams: &[StreamInfo]) -> TechnicalTag {
    let video = streams.iter().find(|s| s.codec_type == "video");
    let (resolution, codec) = match video {
        Some(v) => (Resolution::from_width(v.width), display_codec(&v.codec_name)),
        None => (Resolution::Sd, "unknown".to_string()),
    };

    let mut langs: BTreeSet<String> = BTreeSet::new();
    for stream in streams.iter().filter(|s| s.codec_type == "audio") {
        let code = stream.tags.language.as_deref().unwrap_or("und");
        if code != "und" {
            langs.insert(display_language(code));
        }
    }

    let languages = if langs.is_empty() {
        vec!["Desconocido".to_string()]
    } else {
        langs.into_iter().collect()
    };

    TechnicalTag::Probed {
        resolution,
        codec,
        languages,
    }
}

/// Seam between the rename engine and the external prober.
pub trait TechProber {
    fn probe(&self, path: &Path) -> TechnicalTag;
}

/// Production prober: `ffprobe -v quiet -print_format json -show_streams`.
///
/// The call is synchronous with no timeout of its own; a hung ffprobe
/// blocks the run, which matches the rest of the sequential pipeline.
pub struct FfprobeProber;

impl FfprobeProber {
    fn run(&self, path: &Path) -> Result<TechnicalTag> {
        let out = Command::new("ffprobe")
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_streams")
            .arg(path)
            .output()
            .with_context(|| format!("spawn ffprobe for {:?}", path))?;
        if !out.status.success() {
            anyhow::bail!("ffprobe returned non-zero for {:?}", path);
        }
        let parsed: FfprobeOutput =
            serde_json::from_slice(&out.stdout).context("parse ffprobe json")?;
        Ok(tag_from_streams(&parsed.streams))
    }
}

impl TechProber for FfprobeProber {
    fn probe(&self, path: &Path) -> TechnicalTag {
        self.run(path).unwrap_or(TechnicalTag::Unavailable)
    }
}
