use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILENAME: &str = ".cine_manifest.json";

/// Processing outcome recorded per filename. Closed set; every read site
/// matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Found already in canonical form; adopted as-is.
    Adopted,
    /// Oracle + probe reproduced the current name exactly.
    Verified,
    /// Renamed by us; `origin` holds the prior filename.
    Renamed,
}

/// Ledger record keyed by filename (not full path). Wire keys `fecha` and
/// `origen` match manifests written by earlier versions of the tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<EntryStatus>,
    #[serde(rename = "origen", default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(rename = "fecha")]
    pub timestamp: String,
}

impl ManifestEntry {
    pub fn new(status: EntryStatus, origin: Option<String>) -> Self {
        let timestamp = chrono::Local::now()
            .format("%Y-%m-%d %H:%M:%S%.6f")
            .to_string();
        Self {
            status: Some(status),
            origin,
            timestamp,
        }
    }

    /// Older manifests wrote rename records with only `origen` + `fecha`.
    pub fn status(&self) -> EntryStatus {
        match self.status {
            Some(s) => s,
            None if self.origin.is_some() => EntryStatus::Renamed,
            None => EntryStatus::Adopted,
        }
    }
}

/// The only durable state in the system: once a filename is a key here,
/// later runs never re-submit the file to the oracle. Read once at startup,
/// written once after the full run. Entries are never deleted.
#[derive(Debug, Default)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    fn path_for(root: &Path) -> PathBuf {
        root.join(MANIFEST_FILENAME)
    }

    /// Missing or unparsable manifest is an empty manifest, never fatal:
    /// the worst case is re-resolving files the ledger already knew.
    pub fn load(root: &Path) -> Self {
        let path = Self::path_for(root);
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self { entries }
    }

    /// The caller logs and swallows errors: by save time every rename is
    /// already committed on disk, so a lost ledger update only costs
    /// re-resolution on the next run.
    pub fn save(&self, root: &Path) -> Result<()> {
        let path = Self::path_for(root);
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&path, json).with_context(|| format!("write manifest {:?}", path))?;
        Ok(())
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entries.contains_key(filename)
    }

    pub fn insert(&mut self, filename: String, entry: ManifestEntry) {
        self.entries.insert(filename, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, filename: &str) -> Option<&ManifestEntry> {
        self.entries.get(filename)
    }
}
