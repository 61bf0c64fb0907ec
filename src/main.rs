mod audit;
mod canonical;
mod config;
mod engine;
mod manifest;
mod naming;
mod oracle;
mod probe;
mod util;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use config::OrganizeConfig;
use engine::{OrganizeSummary, RenameEngine};
use oracle::{GeminiTransport, OracleClient, ThreadSleeper};
use probe::FfprobeProber;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "cineshelf",
    version,
    about = "Organize a movie library into canonical names (Title (Year) [Res][Codec][Langs].ext)"
)]
struct Cli {
    /// Library root to organize. Defaults to the current directory.
    path: Option<String>,

    /// Pass the literal token `run` to apply renames and persist the
    /// manifest; without it the tool reports proposed changes only.
    tokens: Vec<String>,
}

/// `cineshelf [PATH] [run]`. The `run` token may stand alone, in which case
/// it doubles as "apply in the current directory".
fn resolve_invocation(path: Option<&str>, tokens: &[String]) -> (PathBuf, bool) {
    let apply = path == Some("run") || tokens.iter().any(|t| t == "run");
    let root = match path {
        Some("run") | None => PathBuf::from("."),
        Some(p) => PathBuf::from(p),
    };
    (root, apply)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (root, apply) = resolve_invocation(cli.path.as_deref(), &cli.tokens);

    // The only fatal setup error: no credential means no oracle, so there
    // is nothing useful to do, not even a dry run.
    let config = OrganizeConfig::from_env(root, apply)?;

    if util::ensure_ffprobe_available().is_err() {
        eprintln!(
            "{}",
            "Warning: ffprobe not found; technical tags will degrade to [ERROR-METADATA]".yellow()
        );
    }

    if config.apply {
        eprintln!("{}", "!!! LIVE RUN: files will be renamed !!!".red().bold());
        std::thread::sleep(Duration::from_secs(2));
    }

    let transport = GeminiTransport::new(&config.model, &config.api_key);
    let client = OracleClient::new(
        Box::new(transport),
        Box::new(ThreadSleeper),
        config.title_language.clone(),
        config.max_attempts,
        config.backoff_base,
    );

    let root = config.root.clone();
    let mut eng = RenameEngine::new(config, client, Box::new(FfprobeProber));
    let summary = eng.run()?;
    print_organize_summary(&summary);

    let groups = audit::audit(&root);
    audit::print_report(&groups);

    Ok(())
}

fn print_organize_summary(summary: &OrganizeSummary) {
    println!(
        "Organize summary: mode={} duration={} scanned={} manifested={} adopted={} queued={} batches={} renamed={} verified={} proposed={} conflicts={} oracle_failures={} rename_errors={}",
        if summary.apply { "apply" } else { "dry-run" },
        util::fmt_duration(summary.elapsed),
        summary.scanned,
        summary.manifested_skips,
        summary.adopted,
        summary.queued,
        summary.batches,
        summary.renamed,
        summary.verified,
        summary.proposed,
        summary.conflicts,
        summary.oracle_failures,
        summary.rename_errors,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_defaults_to_dry_run_in_cwd() {
        let (root, apply) = resolve_invocation(None, &[]);
        assert_eq!(root, PathBuf::from("."));
        assert!(!apply);
    }

    #[test]
    fn invocation_path_then_run_token() {
        let (root, apply) = resolve_invocation(Some("/media/cine"), &["run".to_string()]);
        assert_eq!(root, PathBuf::from("/media/cine"));
        assert!(apply);
    }

    #[test]
    fn bare_run_token_applies_in_cwd() {
        let (root, apply) = resolve_invocation(Some("run"), &[]);
        assert_eq!(root, PathBuf::from("."));
        assert!(apply);
    }

    #[test]
    fn unknown_tokens_do_not_enable_apply() {
        let (root, apply) = resolve_invocation(Some("/media/cine"), &["dry".to_string()]);
        assert_eq!(root, PathBuf::from("/media/cine"));
        assert!(!apply);
    }
}
