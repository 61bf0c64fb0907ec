use crate::canonical;
use crate::util;
use colored::Colorize;
use indicatif::HumanBytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct DuplicateMember {
    pub filename: String,
    pub size_bytes: u64,
    pub path: PathBuf,
}

/// Media files sharing one `"Title (Year)"` prefix, largest first (larger
/// size usually means the better-quality copy).
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub title_year: String,
    pub members: Vec<DuplicateMember>,
}

/// Post-rename content-grouping pass. Advisory only: files are never moved
/// or deleted here.
pub fn audit(root: &Path) -> Vec<DuplicateGroup> {
    let mut inventory: BTreeMap<String, Vec<DuplicateMember>> = BTreeMap::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().to_string();
        if !util::is_media_filename(&filename) {
            continue;
        }
        let Some(title_year) = canonical::title_year_prefix(&filename) else {
            continue;
        };
        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        inventory.entry(title_year).or_default().push(DuplicateMember {
            filename,
            size_bytes,
            path: entry.path().to_path_buf(),
        });
    }

    inventory
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(title_year, mut members)| {
            // Path breaks size ties so report order is stable across runs.
            members.sort_by(|a, b| {
                b.size_bytes
                    .cmp(&a.size_bytes)
                    .then_with(|| a.path.cmp(&b.path))
            });
            DuplicateGroup { title_year, members }
        })
        .collect()
}

pub fn print_report(groups: &[DuplicateGroup]) {
    println!("\n{}", "Duplicate audit".bold());
    println!("{}", "-".repeat(60));

    if groups.is_empty() {
        println!("{}", "No duplicates found.".green());
        return;
    }

    for group in groups {
        println!(
            "\n{} {}",
            "CONFLICT:".magenta().bold(),
            group.title_year.bold()
        );
        for member in &group.members {
            // The bracketed suffix makes the quality comparison visible
            // without probing again.
            let tech_info = member
                .filename
                .find('[')
                .map(|i| &member.filename[i..])
                .unwrap_or("");
            println!(
                "   {:<10} | {}",
                HumanBytes(member.size_bytes).to_string().yellow(),
                tech_info
            );
        }
    }
    println!(
        "\n{} {} duplicate group(s) detected; review and delete inferior versions manually.",
        "Summary:".bold(),
        groups.len()
    );
}
