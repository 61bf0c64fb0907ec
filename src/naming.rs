use crate::oracle::OracleEntry;
use crate::probe::TechnicalTag;
use std::collections::HashMap;

/// Builds canonical names and disambiguates collisions within one run.
///
/// The counter is process-lifetime-scoped: two raw files resolving to the
/// same `"Title (Year)"` base in the same run get `base` and `base (1)` in
/// encounter order. Collisions against files renamed in *prior* runs are
/// not visible here; those are caught at filesystem-write time by the
/// destination-exists check.
#[derive(Default)]
pub struct NameSynthesizer {
    used: HashMap<String, u32>,
}

impl NameSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` when the oracle provided no usable title.
    pub fn synthesize(
        &mut self,
        raw_filename: &str,
        entry: &OracleEntry,
        tag: &TechnicalTag,
    ) -> Option<String> {
        let title = sanitize_title(&entry.title);
        if title.is_empty() {
            return None;
        }

        let ext = raw_filename
            .rfind('.')
            .map(|i| &raw_filename[i..])
            .unwrap_or("");

        let base = format!("{} ({})", title, entry.year);
        let seen = self.used.entry(base.clone()).or_insert(0);
        let name = if *seen > 0 {
            format!("{} ({}) {}{}", base, seen, tag, ext)
        } else {
            format!("{} {}{}", base, tag, ext)
        };
        *seen += 1;
        Some(name)
    }
}

/// Filesystem-safe title: `:` reads poorly as a separator so it becomes
/// ` -`, `/` would split paths, `?` is dropped.
fn sanitize_title(title: &str) -> String {
    title
        .replace(':', " -")
        .replace('/', "-")
        .replace('?', "")
        .trim()
        .to_string()
}
