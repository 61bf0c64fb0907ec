use crate::config::OrganizeConfig;
use crate::manifest::{EntryStatus, Manifest, ManifestEntry};
use crate::naming::NameSynthesizer;
use crate::oracle::{OracleClient, Sleeper, ThreadSleeper};
use crate::probe::TechProber;
use crate::{canonical, util};

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct OrganizeSummary {
    pub apply: bool,
    pub scanned: usize,
    pub manifested_skips: usize,
    pub adopted: usize,
    pub queued: usize,
    pub batches: usize,
    pub verified: usize,
    pub renamed: usize,
    pub proposed: usize,
    pub conflicts: usize,
    pub oracle_failures: usize,
    pub rename_errors: usize,
    pub elapsed: Duration,
}

/// Top-level pipeline: scan -> partition -> sequential oracle batches ->
/// rename -> deferred manifest flush.
///
/// Batches run strictly one after another; the collision counter in
/// `NameSynthesizer` depends on that ordering, and so does the oracle's
/// request pacing.
pub struct RenameEngine {
    config: OrganizeConfig,
    oracle: OracleClient,
    prober: Box<dyn TechProber>,
    pacer: Box<dyn Sleeper>,
}

impl RenameEngine {
    pub fn new(config: OrganizeConfig, oracle: OracleClient, prober: Box<dyn TechProber>) -> Self {
        Self {
            config,
            oracle,
            prober,
            pacer: Box::new(ThreadSleeper),
        }
    }

    pub fn run(&mut self) -> Result<OrganizeSummary> {
        let started = Instant::now();
        let mut summary = OrganizeSummary {
            apply: self.config.apply,
            scanned: 0,
            manifested_skips: 0,
            adopted: 0,
            queued: 0,
            batches: 0,
            verified: 0,
            renamed: 0,
            proposed: 0,
            conflicts: 0,
            oracle_failures: 0,
            rename_errors: 0,
            elapsed: Duration::ZERO,
        };

        let mut manifest = Manifest::load(&self.config.root);
        if !manifest.is_empty() {
            println!("Manifest: {} known file(s)", manifest.len());
        }
        let queue = self.scan(&mut manifest, &mut summary);
        summary.queued = queue.len();

        println!(
            "Pending resolution: {}",
            summary.queued.to_string().yellow()
        );

        if queue.is_empty() {
            println!("{}", "Renaming is already up to date.".green());
        } else {
            self.process_queue(&queue, &mut manifest, &mut summary);
        }

        if self.config.apply {
            // Renames are already committed; a lost ledger update only
            // costs re-resolution next run.
            match manifest.save(&self.config.root) {
                Ok(()) => println!("{}", "Manifest updated.".green()),
                Err(e) => eprintln!("{}", format!("Error saving manifest: {e:#}").red()),
            }
        }

        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    /// One walk in encounter order. Manifested names never go back to the
    /// oracle; canonical names are adopted on sight.
    fn scan(&self, manifest: &mut Manifest, summary: &mut OrganizeSummary) -> Vec<PathBuf> {
        println!("{}", "1. Scanning directory...".bold());
        let mut queue = Vec::new();

        for entry in WalkDir::new(&self.config.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().to_string();
            if !util::is_media_filename(&filename) {
                continue;
            }
            summary.scanned += 1;

            if manifest.contains(&filename) {
                summary.manifested_skips += 1;
                continue;
            }
            if canonical::is_canonical(&filename) {
                manifest.insert(filename, ManifestEntry::new(EntryStatus::Adopted, None));
                summary.adopted += 1;
                continue;
            }
            queue.push(entry.path().to_path_buf());
        }
        queue
    }

    fn process_queue(
        &mut self,
        queue: &[PathBuf],
        manifest: &mut Manifest,
        summary: &mut OrganizeSummary,
    ) {
        let pb = ProgressBar::new(queue.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {wide_bar} {pos}/{len} files")
                .unwrap(),
        );

        let mut synthesizer = NameSynthesizer::new();
        let batches: Vec<&[PathBuf]> = queue.chunks(self.config.batch_limit).collect();
        summary.batches = batches.len();

        for (index, batch) in batches.iter().enumerate() {
            pb.println(
                format!(">>> Resolving titles (batch {})...", index + 1)
                    .cyan()
                    .to_string(),
            );

            let names: Vec<String> = batch
                .iter()
                .map(|p| p.file_name().unwrap_or_default().to_string_lossy().to_string())
                .collect();
            let resolved = self.oracle.classify_batch(&names);

            for path in batch.iter() {
                let filename = path
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
                    .to_string();

                // Probe regardless of oracle success: the tag is needed for
                // every usable result and the subprocess already ran.
                let tag = self.prober.probe(path);

                let candidate = resolved
                    .get(&filename)
                    .and_then(|entry| synthesizer.synthesize(&filename, entry, &tag));

                match candidate {
                    Some(new_name) if new_name == filename => {
                        summary.verified += 1;
                        manifest.insert(filename, ManifestEntry::new(EntryStatus::Verified, None));
                    }
                    Some(new_name) => {
                        pb.println(format!(
                            "   {} {} -> {}",
                            "Change:".yellow(),
                            filename,
                            new_name.green()
                        ));
                        if self.config.apply {
                            self.attempt_rename(path, &filename, &new_name, manifest, summary, &pb);
                        } else {
                            summary.proposed += 1;
                        }
                    }
                    None => {
                        summary.oracle_failures += 1;
                        pb.println(format!("   {} {}", "Oracle failed for:".red(), filename));
                    }
                }
                pb.inc(1);
            }

            if index + 1 < batches.len() {
                self.pacer.sleep(self.config.batch_pacing);
            }
        }
        pb.finish_and_clear();
    }

    fn attempt_rename(
        &self,
        path: &std::path::Path,
        filename: &str,
        new_name: &str,
        manifest: &mut Manifest,
        summary: &mut OrganizeSummary,
        pb: &ProgressBar,
    ) {
        let destination = path.with_file_name(new_name);
        if destination.exists() {
            // Cross-run collision the per-run counter can't see. Refuse,
            // never overwrite.
            summary.conflicts += 1;
            pb.println(format!(
                "   {} {:?}",
                "Destination exists, skipping:".red(),
                destination
            ));
            return;
        }
        match std::fs::rename(path, &destination) {
            Ok(()) => {
                summary.renamed += 1;
                manifest.insert(
                    new_name.to_string(),
                    ManifestEntry::new(EntryStatus::Renamed, Some(filename.to_string())),
                );
            }
            Err(e) => {
                summary.rename_errors += 1;
                pb.println(format!("   {} {}: {}", "Rename error for".red(), filename, e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{OracleError, OracleTransport};
    use crate::probe::{Resolution, TechnicalTag};
    use std::path::Path;
    use tempfile::TempDir;

    struct CannedTransport {
        response: String,
    }

    impl OracleTransport for CannedTransport {
        fn generate(&self, _prompt: &str) -> Result<String, OracleError> {
            Ok(self.response.clone())
        }
    }

    /// Panics if the engine reaches the oracle at all.
    struct UnreachableTransport;

    impl OracleTransport for UnreachableTransport {
        fn generate(&self, _prompt: &str) -> Result<String, OracleError> {
            panic!("oracle must not be consulted");
        }
    }

    struct FixedProber;

    impl TechProber for FixedProber {
        fn probe(&self, _path: &Path) -> TechnicalTag {
            TechnicalTag::Probed {
                resolution: Resolution::R1080p,
                codec: "x264".to_string(),
                languages: vec!["Ingles".to_string()],
            }
        }
    }

    struct NoopSleeper;

    impl Sleeper for NoopSleeper {
        fn sleep(&self, _duration: Duration) {}
    }

    struct FailingProber;

    impl TechProber for FailingProber {
        fn probe(&self, _path: &Path) -> TechnicalTag {
            TechnicalTag::Unavailable
        }
    }

    fn engine_with_prober(
        root: &Path,
        apply: bool,
        transport: Box<dyn OracleTransport>,
        prober: Box<dyn TechProber>,
    ) -> RenameEngine {
        let config = OrganizeConfig::for_tests(root.to_path_buf(), apply);
        let oracle = OracleClient::new(
            transport,
            Box::new(NoopSleeper),
            config.title_language.clone(),
            config.max_attempts,
            config.backoff_base,
        );
        RenameEngine::new(config, oracle, prober)
    }

    fn engine_with(root: &Path, apply: bool, transport: Box<dyn OracleTransport>) -> RenameEngine {
        engine_with_prober(root, apply, transport, Box::new(FixedProber))
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn renames_and_manifests_under_new_name() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "dune.2021.remux.mkv");
        let transport = CannedTransport {
            response: r#"{"dune.2021.remux.mkv": {"titulo": "Dune", "anio": "2021"}}"#.to_string(),
        };

        let summary = engine_with(tmp.path(), true, Box::new(transport))
            .run()
            .unwrap();
        assert_eq!(summary.renamed, 1);
        assert!(tmp
            .path()
            .join("Dune (2021) [1080p][x264][Ingles].mkv")
            .exists());
        assert!(!tmp.path().join("dune.2021.remux.mkv").exists());

        let manifest = Manifest::load(tmp.path());
        let entry = manifest
            .get("Dune (2021) [1080p][x264][Ingles].mkv")
            .expect("entry keyed by new name");
        assert_eq!(entry.status(), EntryStatus::Renamed);
        assert_eq!(entry.origin.as_deref(), Some("dune.2021.remux.mkv"));
    }

    #[test]
    fn collisions_within_a_run_get_numbered() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "dune-a.mkv");
        touch(tmp.path(), "dune-b.mkv");
        let transport = CannedTransport {
            response: r#"{
                "dune-a.mkv": {"titulo": "Dune", "anio": "2021"},
                "dune-b.mkv": {"titulo": "Dune", "anio": "2021"}
            }"#
            .to_string(),
        };

        let summary = engine_with(tmp.path(), true, Box::new(transport))
            .run()
            .unwrap();
        assert_eq!(summary.renamed, 2);
        // Encounter order is the sorted walk order: dune-a before dune-b.
        assert!(tmp
            .path()
            .join("Dune (2021) [1080p][x264][Ingles].mkv")
            .exists());
        assert!(tmp
            .path()
            .join("Dune (2021) (1) [1080p][x264][Ingles].mkv")
            .exists());
    }

    #[test]
    fn refuses_when_destination_exists() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "dune.2021.mkv");
        touch(tmp.path(), "Dune (2021) [1080p][x264][Ingles].mkv");
        let transport = CannedTransport {
            response: r#"{"dune.2021.mkv": {"titulo": "Dune", "anio": "2021"}}"#.to_string(),
        };

        let summary = engine_with(tmp.path(), true, Box::new(transport))
            .run()
            .unwrap();
        assert_eq!(summary.conflicts, 1);
        assert_eq!(summary.renamed, 0);
        // Source untouched.
        assert!(tmp.path().join("dune.2021.mkv").exists());
    }

    #[test]
    fn dry_run_proposes_without_touching_anything() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "dune.2021.mkv");
        let transport = CannedTransport {
            response: r#"{"dune.2021.mkv": {"titulo": "Dune", "anio": "2021"}}"#.to_string(),
        };

        let summary = engine_with(tmp.path(), false, Box::new(transport))
            .run()
            .unwrap();
        assert_eq!(summary.proposed, 1);
        assert_eq!(summary.renamed, 0);
        assert!(tmp.path().join("dune.2021.mkv").exists());
        // No manifest written in dry-run mode.
        assert!(Manifest::load(tmp.path()).is_empty());
    }

    #[test]
    fn matching_name_is_verified_without_filesystem_touch() {
        let tmp = TempDir::new().unwrap();
        // The sentinel tag has a single bracket group, so this name is not
        // canonical and reaches the oracle again; the synthesized candidate
        // then reproduces the current name exactly.
        touch(tmp.path(), "Dune (2021) [ERROR-METADATA].mkv");
        let transport = CannedTransport {
            response: r#"{"Dune (2021) [ERROR-METADATA].mkv": {"titulo": "Dune", "anio": "2021"}}"#
                .to_string(),
        };

        let summary =
            engine_with_prober(tmp.path(), true, Box::new(transport), Box::new(FailingProber))
                .run()
                .unwrap();
        assert_eq!(summary.verified, 1);
        assert_eq!(summary.renamed, 0);
        assert!(tmp.path().join("Dune (2021) [ERROR-METADATA].mkv").exists());

        let manifest = Manifest::load(tmp.path());
        assert_eq!(
            manifest
                .get("Dune (2021) [ERROR-METADATA].mkv")
                .unwrap()
                .status(),
            EntryStatus::Verified
        );
    }

    #[test]
    fn probe_failure_still_renames_with_sentinel_tag() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "heat.1995.mkv");
        let transport = CannedTransport {
            response: r#"{"heat.1995.mkv": {"titulo": "Heat", "anio": "1995"}}"#.to_string(),
        };

        let summary =
            engine_with_prober(tmp.path(), true, Box::new(transport), Box::new(FailingProber))
                .run()
                .unwrap();
        assert_eq!(summary.renamed, 1);
        assert!(tmp.path().join("Heat (1995) [ERROR-METADATA].mkv").exists());
    }

    #[test]
    fn second_run_never_reaches_the_oracle() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "dune.2021.mkv");
        let transport = CannedTransport {
            response: r#"{"dune.2021.mkv": {"titulo": "Dune", "anio": "2021"}}"#.to_string(),
        };
        let first = engine_with(tmp.path(), true, Box::new(transport))
            .run()
            .unwrap();
        assert_eq!(first.renamed, 1);

        // The renamed file is both canonical and manifested; a second run
        // must perform zero renames and zero oracle calls.
        let second = engine_with(tmp.path(), true, Box::new(UnreachableTransport))
            .run()
            .unwrap();
        assert_eq!(second.queued, 0);
        assert_eq!(second.renamed, 0);
        assert_eq!(second.manifested_skips, 1);
    }

    #[test]
    fn oracle_gap_leaves_file_unresolved_for_next_run() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "known.mkv");
        touch(tmp.path(), "mystery.mkv");
        let transport = CannedTransport {
            response: r#"{"known.mkv": {"titulo": "Known", "anio": "1999"}}"#.to_string(),
        };

        let summary = engine_with(tmp.path(), true, Box::new(transport))
            .run()
            .unwrap();
        assert_eq!(summary.renamed, 1);
        assert_eq!(summary.oracle_failures, 1);
        assert!(tmp.path().join("mystery.mkv").exists());
        // The gap file is not manifested, so the next run retries it.
        assert!(!Manifest::load(tmp.path()).contains("mystery.mkv"));
    }

    #[test]
    fn empty_title_counts_as_oracle_failure() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "mystery.mkv");
        let transport = CannedTransport {
            response: r#"{"mystery.mkv": {"titulo": "", "anio": "2001"}}"#.to_string(),
        };
        let summary = engine_with(tmp.path(), true, Box::new(transport))
            .run()
            .unwrap();
        assert_eq!(summary.oracle_failures, 1);
        assert_eq!(summary.renamed, 0);
    }

    #[test]
    fn canonical_files_are_adopted_not_queued() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "Heat (1995) [1080p][x264][Ingles].mkv");
        let summary = engine_with(tmp.path(), true, Box::new(UnreachableTransport))
            .run()
            .unwrap();
        assert_eq!(summary.adopted, 1);
        assert_eq!(summary.queued, 0);
        let manifest = Manifest::load(tmp.path());
        assert_eq!(
            manifest
                .get("Heat (1995) [1080p][x264][Ingles].mkv")
                .unwrap()
                .status(),
            EntryStatus::Adopted
        );
    }
}
