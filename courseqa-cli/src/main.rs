#![deny(missing_docs)]
//! courseqa command-line interface.
//!
//! Scans and fixes local course packages, and reads run history from a
//! courseqa server.

mod remote;

use clap::{Args, Parser, Subcommand, ValueEnum};
use courseqa_core::{
    AutoFixer, FixCounts, FixOutcome, FixReport, PackageReport, PackageStatus, QualityScanner,
    RunComparison, RunWithScore, ScanConfig, Scores, build_rules, compare_runs, format_delta,
    render_fix_markdown, render_history_markdown, render_json, render_scan_markdown,
};
use remote::ScanRunsResponse;
use serde::Serialize;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub(crate) type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "courseqa", version, about = "Course package QA CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct OutputArgs {
    /// Output format for report data.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Write the report to a file instead of stdout.
    #[arg(long = "report-output")]
    report_output: Option<PathBuf>,
}

#[derive(ValueEnum, Copy, Clone, Debug, Eq, PartialEq)]
enum OutputFormat {
    Text,
    Json,
    Markdown,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan local course package archives.
    Scan {
        /// Archives to scan.
        #[arg(required = true)]
        packages: Vec<PathBuf>,
        /// Maximum number of concurrent scans.
        #[arg(short = 'j', long, default_value_t = 5)]
        concurrency: usize,
        #[command(flatten)]
        report: OutputArgs,
    },
    /// Apply auto-fix rules to a local course package archive.
    Fix {
        /// Archive to fix.
        package: PathBuf,
        /// Where to write the fixed archive.
        #[arg(short, long)]
        output: PathBuf,
        /// Where to write the diff document.
        #[arg(long)]
        diff: Option<PathBuf>,
        /// Fix rule IDs to run (repeatable or comma-separated). Defaults to all.
        #[arg(long, value_delimiter = ',')]
        rule: Vec<String>,
        #[command(flatten)]
        report: OutputArgs,
    },
    /// Show the scan history of a project on a courseqa server.
    Runs {
        /// Project identifier.
        project_id: String,
        /// Base URL of the courseqa server.
        #[arg(long, env = "COURSEQA_SERVER_URL", default_value = "http://127.0.0.1:8080")]
        server: String,
        /// Run to compare with its predecessor. Defaults to the newest run.
        #[arg(long = "scan-run")]
        scan_run: Option<String>,
        #[command(flatten)]
        report: OutputArgs,
    },
}

#[cfg(not(test))]
fn main() -> CliResult<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = ScanConfig::from_env()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Scan {
            packages,
            concurrency,
            report,
        } => {
            // The auditor's blocking client must be created outside the
            // runtime context and dropped there too.
            let scanner = QualityScanner::from_config(&config);
            runtime.block_on(async {
                let reports = run_scan(packages, concurrency, &scanner).await?;
                emit_scan_reports(&reports, &report).await
            })?;
        }
        Commands::Fix {
            package,
            output,
            diff,
            rule,
            report,
        } => {
            let fixer = if rule.is_empty() {
                AutoFixer::new(config.scratch.clone())
            } else {
                AutoFixer::with_rules(build_rules(&rule)?, config.scratch.clone())
            };
            runtime.block_on(async {
                let fix_report = run_fix(package, output, diff, fixer).await;
                emit_fix_report(&fix_report, &report).await
            })?;
        }
        Commands::Runs {
            project_id,
            server,
            scan_run,
            report,
        } => {
            runtime.block_on(run_history(&server, &project_id, scan_run.as_deref(), &report))?;
        }
    }

    Ok(())
}

#[cfg(test)]
fn main() {}

/// Scan archives concurrently, keeping the input order in the result.
async fn run_scan(
    packages: Vec<PathBuf>,
    concurrency: usize,
    scanner: &QualityScanner,
) -> CliResult<Vec<PackageReport>> {
    let concurrency = if concurrency == 0 { 1 } else { concurrency };
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();

    for (index, package) in packages.into_iter().enumerate() {
        let permit = semaphore.clone().acquire_owned().await?;
        let scanner = scanner.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let source = package.clone();
            let report = match tokio::task::spawn_blocking(move || scan_package(&scanner, package))
                .await
            {
                Ok(report) => report,
                Err(error) => PackageReport::failed(source, error.to_string()),
            };
            (index, report)
        });
    }

    let mut reports = Vec::new();
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(entry) => reports.push(entry),
            Err(error) => reports.push((usize::MAX, report_from_task_error(error))),
        }
    }
    reports.sort_by_key(|(index, _)| *index);
    Ok(reports.into_iter().map(|(_, report)| report).collect())
}

fn scan_package(scanner: &QualityScanner, path: PathBuf) -> PackageReport {
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(error) => return PackageReport::failed(path, format!("read failed: {error}")),
    };
    let project_id = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string());

    match scanner.scan(&project_id, Some(bytes)) {
        Ok(outcome) => {
            let mut report = PackageReport::new(path);
            report.status = PackageStatus::Scanned;
            report.scores = Some(outcome.score.scores);
            report.issues = outcome.issues;
            report
        }
        Err(error) => {
            log::warn!("scan of {} failed: {error}", path.display());
            PackageReport::failed(path, error.to_string())
        }
    }
}

fn report_from_task_error(error: tokio::task::JoinError) -> PackageReport {
    PackageReport::failed(PathBuf::from("unknown"), error.to_string())
}

/// Fix one archive and write the results. Failures end up in the report.
async fn run_fix(
    package: PathBuf,
    output: PathBuf,
    diff: Option<PathBuf>,
    fixer: AutoFixer,
) -> FixReport {
    let mut report = FixReport {
        source: package.clone(),
        output: output.clone(),
        diff_output: diff.clone(),
        status: PackageStatus::Pending,
        changed_files: 0,
        counts: FixCounts::default(),
    };
    match fix_and_write(fixer, &package, &output, diff.as_deref()).await {
        Ok(outcome) => {
            report.status = PackageStatus::Fixed;
            report.changed_files = outcome.changed_files;
            report.counts = outcome.counts;
        }
        Err(error) => {
            log::error!("fix of {} failed: {error}", package.display());
            report.status = PackageStatus::Failed(error.to_string());
        }
    }
    report
}

async fn fix_and_write(
    fixer: AutoFixer,
    package: &Path,
    output: &Path,
    diff: Option<&Path>,
) -> CliResult<FixOutcome> {
    let bytes = tokio::fs::read(package).await?;
    let outcome = tokio::task::spawn_blocking(move || fixer.fix_archive(bytes)).await??;
    write_file(output, &outcome.archive).await?;
    if let Some(diff) = diff {
        write_file(diff, outcome.diff.as_bytes()).await?;
    }
    Ok(outcome)
}

async fn write_file(path: &Path, contents: &[u8]) -> CliResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}

/// Fetch run history from a server and print it with the comparison.
async fn run_history(
    server: &str,
    project_id: &str,
    scan_run: Option<&str>,
    output: &OutputArgs,
) -> CliResult<()> {
    let client = remote::build_client()?;
    let response = remote::fetch_scan_runs(&client, server, project_id).await?;
    let comparison = compare_runs(&response.runs, scan_run);
    emit_history(&response, &comparison, output).await
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryReport<'a> {
    runs: &'a [RunWithScore],
    total: usize,
    comparison: &'a RunComparison,
}

async fn emit_scan_reports(reports: &[PackageReport], output: &OutputArgs) -> CliResult<()> {
    let contents = match output.format {
        OutputFormat::Text => render_scan_text(reports),
        OutputFormat::Markdown => render_scan_markdown(reports),
        OutputFormat::Json => render_json(reports)?,
    };
    emit_output(output, contents).await
}

async fn emit_fix_report(report: &FixReport, output: &OutputArgs) -> CliResult<()> {
    let contents = match output.format {
        OutputFormat::Text => render_fix_text(report),
        OutputFormat::Markdown => render_fix_markdown(report),
        OutputFormat::Json => render_json(report)?,
    };
    emit_output(output, contents).await
}

async fn emit_history(
    response: &ScanRunsResponse,
    comparison: &RunComparison,
    output: &OutputArgs,
) -> CliResult<()> {
    let contents = match output.format {
        OutputFormat::Text => render_history_text(&response.runs, response.total, comparison),
        OutputFormat::Markdown => render_history_markdown(&response.runs, comparison),
        OutputFormat::Json => render_json(&HistoryReport {
            runs: &response.runs,
            total: response.total,
            comparison,
        })?,
    };
    emit_output(output, contents).await
}

async fn emit_output(output: &OutputArgs, contents: String) -> CliResult<()> {
    if let Some(path) = &output.report_output {
        write_file(path, contents.as_bytes()).await?;
    } else {
        print!("{contents}");
    }
    Ok(())
}

fn status_line(status: &PackageStatus) -> String {
    match status {
        PackageStatus::Pending => "Status: pending".to_string(),
        PackageStatus::Scanned => "Status: scanned".to_string(),
        PackageStatus::Fixed => "Status: fixed".to_string(),
        PackageStatus::Failed(error) => format!("Status: failed ({error})"),
    }
}

fn scores_line(scores: &Scores) -> String {
    format!(
        "total {}, accessibility {}, scorm {}, reliability {}",
        scores.total_score, scores.accessibility_score, scores.scorm_score, scores.reliability_score
    )
}

fn render_scan_text(reports: &[PackageReport]) -> String {
    let mut output = String::new();
    for report in reports {
        let _ = writeln!(output, "Source: {}", report.source.display());
        let _ = writeln!(output, "{}", status_line(&report.status));
        if let PackageStatus::Failed(_) = report.status {
            let _ = writeln!(output);
            continue;
        }

        if let Some(scores) = &report.scores {
            let _ = writeln!(output, "Scores: {}", scores_line(scores));
        }
        let counts = report
            .severity_counts()
            .into_iter()
            .map(|(severity, count)| format!("{severity} {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(output, "Issues: {counts}");
        for issue in &report.issues {
            let location = issue
                .file_path
                .as_deref()
                .map(|file| format!(" ({file})"))
                .unwrap_or_default();
            let _ = writeln!(
                output,
                "- [{}] {} {}{location}",
                issue.severity, issue.rule_key, issue.title
            );
        }
        let _ = writeln!(output);
    }
    output
}

fn render_fix_text(report: &FixReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Source: {}", report.source.display());
    let _ = writeln!(output, "{}", status_line(&report.status));
    if let PackageStatus::Failed(_) = report.status {
        return output;
    }
    let _ = writeln!(output, "Output: {}", report.output.display());
    if let Some(diff) = &report.diff_output {
        let _ = writeln!(output, "Diff: {}", diff.display());
    }
    let _ = writeln!(output, "Changed files: {}", report.changed_files);
    let _ = writeln!(output, "Fixes: {}", report.counts.total());
    let _ = writeln!(output, "- img alt added: {}", report.counts.img_alt_added);
    let _ = writeln!(
        output,
        "- button aria-label added: {}",
        report.counts.button_aria_label_added
    );
    let _ = writeln!(
        output,
        "- input aria-label added: {}",
        report.counts.input_aria_label_added
    );
    let _ = writeln!(output, "- heading adjusted: {}", report.counts.heading_adjusted);
    output
}

fn render_history_text(runs: &[RunWithScore], total: usize, comparison: &RunComparison) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Runs: {total}");
    for entry in runs {
        let score = entry
            .score
            .as_ref()
            .map(|summary| scores_line(&summary.scores()))
            .unwrap_or_else(|| "unscored".to_string());
        let _ = writeln!(
            output,
            "- {} [{}] {}: {score}",
            entry.run.id,
            entry.run.status.as_str(),
            entry.run.created_at.to_rfc3339()
        );
    }
    match &comparison.delta {
        Some(delta) => {
            let _ = writeln!(output, "Delta: {}", format_delta(delta));
        }
        None => {
            let _ = writeln!(output, "Delta: unavailable");
        }
    }
    output
}
