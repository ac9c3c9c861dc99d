//! `logscope analyze` command handler
//!
//! Reads each file into its own bounded channel and runs one batch
//! analysis over all of them. Cross-file correlation links and the
//! optional digest are part of the same report.

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use logscope_analysis::{AnalysisReport, LineSource, SourceReport};
use logscope_core::config::LogscopeConfig;
use logscope_core::error::PluginError;
use logscope_core::pipeline::{BoxFuture, CommentaryGenerator};
use logscope_core::types::{AnalysisSummary, Level, LogEntry, TemplateShare};

use crate::cli::AnalyzeArgs;
use crate::commands::{cancel_on_ctrl_c, engine_builder, spawn_line_reader};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `analyze` command.
///
/// # Errors
///
/// - `CliError::Io` if a file cannot be opened or read
/// - `CliError::Rule` if the rule directory contains invalid rules
/// - `CliError::Config` if the analysis configuration is rejected by the engine
/// - `CliError::Analysis` if the run is interrupted
pub async fn execute(
    args: AnalyzeArgs,
    config: LogscopeConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mut builder = engine_builder(&config, args.rules.as_deref(), args.top).await?;
    if args.commentary {
        builder = builder.commentary(Arc::new(DigestCommentary));
    }
    let engine = builder.build()?;
    let capacity = engine.config().stage_channel_capacity;
    let max_line_length = engine.config().max_line_length;

    let mut sources = Vec::with_capacity(args.files.len());
    let mut readers = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            std::io::Error::new(e.kind(), format!("{}: {e}", path.display()))
        })?;
        let (tx, rx) = mpsc::channel(capacity);
        readers.push((path.clone(), spawn_line_reader(file, tx, max_line_length)));
        sources.push(LineSource::new(path.display().to_string(), rx));
    }

    info!(files = args.files.len(), rules = engine.rule_count(), "starting analysis");

    let cancel = CancellationToken::new();
    let interrupt = cancel_on_ctrl_c(cancel.clone());
    let result = engine.analyze_with_cancel(sources, cancel).await;
    interrupt.abort();

    // read errors end the channel early, so they must fail the command
    // even when the analysis itself completed
    for (path, reader) in readers {
        let lines = reader
            .await
            .map_err(|e| CliError::Command(format!("reader task for {} failed: {e}", path.display())))?
            .map_err(|e| std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), lines, "file read complete");
    }

    let report = result?;
    info!(
        run_id = %report.run_id,
        alerts = report.alerts().count(),
        anomalies = report.flagged_anomalies().count(),
        links = report.links.len(),
        degraded = report.degraded,
        "analysis complete"
    );

    writer.render(&AnalyzeReport(report))?;
    Ok(())
}

/// Batch analysis output.
///
/// JSON output is the full [`AnalysisReport`], entries included.
#[derive(Serialize)]
#[serde(transparent)]
pub struct AnalyzeReport(pub AnalysisReport);

impl Render for AnalyzeReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let report = &self.0;
        write!(
            w,
            "Analysis {} ({} sources, {} links)",
            report.run_id.to_string().bold(),
            report.sources.len(),
            report.links.len()
        )?;
        if report.degraded {
            write!(w, " {}", "DEGRADED".yellow().bold())?;
        }
        writeln!(w)?;

        for source in &report.sources {
            writeln!(w)?;
            render_source(w, source)?;
        }

        if !report.links.is_empty() {
            writeln!(w)?;
            writeln!(w, "{}", "Correlation links".bold())?;
            for link in &report.links {
                writeln!(
                    w,
                    "  {:<18} {:.2}  {} <-> {}  {}",
                    link.relation_type.to_string(),
                    link.confidence,
                    link.entry_id_a,
                    link.entry_id_b,
                    link.detail.dimmed()
                )?;
            }
        }

        if !report.recurring_templates.is_empty() {
            writeln!(w)?;
            writeln!(w, "{}", "Recurring across sources".bold())?;
            for recurring in &report.recurring_templates {
                let sources: Vec<String> = recurring
                    .sources
                    .iter()
                    .map(|o| format!("{}={}", o.source_id, o.count))
                    .collect();
                writeln!(
                    w,
                    "  {:>6}  {:<7} {}  {}",
                    recurring.occurrence_count,
                    colored_level(recurring.level),
                    recurring.template_string,
                    sources.join(" ").dimmed()
                )?;
            }
        }

        if let Some(ref commentary) = report.commentary {
            writeln!(w)?;
            writeln!(w, "{}", "Commentary".bold())?;
            for line in commentary.lines() {
                writeln!(w, "  {line}")?;
            }
        }

        if !report.warnings.is_empty() {
            writeln!(w)?;
            for warning in &report.warnings {
                writeln!(w, "{} {}", "warning:".yellow(), warning)?;
            }
        }

        Ok(())
    }
}

fn render_source(w: &mut dyn Write, source: &SourceReport) -> std::io::Result<()> {
    use colored::Colorize;

    let summary = &source.summary;
    write!(w, "{}", source.source_id.bold())?;
    if source.cancelled {
        write!(w, " {}", "(cancelled)".yellow())?;
    }
    if source.degraded {
        write!(w, " {}", "(degraded)".yellow())?;
    }
    writeln!(w)?;

    writeln!(
        w,
        "  Lines: {}  Entries: {}  Unparsed: {}  Untimestamped: {}  Late: {}",
        summary.total_lines,
        summary.total_entries,
        summary.unparsed_entries,
        summary.untimestamped_entries,
        summary.late_entries
    )?;

    let levels: Vec<String> = summary
        .level_counts
        .iter()
        .map(|(level, count)| format!("{}={}", colored_level(*level), count))
        .collect();
    writeln!(w, "  Levels: {}", levels.join(" "))?;

    if !summary.hourly_distribution.is_empty() {
        let hours: Vec<String> = summary
            .hourly_distribution
            .iter()
            .map(|(hour, count)| format!("{hour:02}h={count}"))
            .collect();
        writeln!(w, "  Hourly (UTC): {}", hours.join(" "))?;
    }

    render_shares(w, "Top errors", &summary.top_errors)?;
    render_shares(w, "Top warnings", &summary.top_warnings)?;

    if !summary.exception_types.is_empty() {
        let types: Vec<String> = summary
            .exception_types
            .iter()
            .map(|e| format!("{}={}", e.name, e.count))
            .collect();
        writeln!(w, "  Exception types: {}", types.join(" "))?;
    }

    let flagged: Vec<_> = source.flagged_anomalies().collect();
    if !flagged.is_empty() {
        writeln!(w, "  {}", "Anomalies".red().bold())?;
        for window in flagged {
            writeln!(
                w,
                "    {} {:<16} observed={} mean={:.1} stddev={:.1} score={:.2}",
                window.window_start.format("%Y-%m-%d %H:%M:%S"),
                window.metric_name,
                window.observed_value,
                window.baseline_mean,
                window.baseline_stddev,
                window.score
            )?;
        }
    }

    if !source.alerts.is_empty() {
        writeln!(w, "  {}", "Alerts".red().bold())?;
        for alert in &source.alerts {
            writeln!(w, "    {alert}")?;
        }
    }

    for warning in &source.warnings {
        writeln!(w, "  {} {}", "warning:".yellow(), warning.message)?;
    }

    Ok(())
}

fn render_shares(w: &mut dyn Write, title: &str, shares: &[TemplateShare]) -> std::io::Result<()> {
    if shares.is_empty() {
        return Ok(());
    }
    writeln!(w, "  {title}:")?;
    for share in shares {
        writeln!(
            w,
            "    {:>6}  {:>5.1}%  {}",
            share.count, share.percentage, share.template_string
        )?;
    }
    Ok(())
}

fn colored_level(level: Level) -> colored::ColoredString {
    use colored::Colorize;

    match level {
        Level::Error => level.as_str().red(),
        Level::Warning => level.as_str().yellow(),
        Level::Info => level.as_str().green(),
        Level::Debug => level.as_str().dimmed(),
        Level::Unknown => level.as_str().normal(),
    }
}

/// Deterministic plain-text digest of a run.
///
/// Built from the per-source summaries and the sampled ERROR entries,
/// no external service involved.
pub struct DigestCommentary;

impl DigestCommentary {
    fn digest(entries: &[LogEntry], summaries: &[AnalysisSummary]) -> Option<String> {
        let total: u64 = summaries.iter().map(|s| s.total_entries).sum();
        if total == 0 {
            return None;
        }
        let errors: u64 = summaries.iter().map(|s| s.count(Level::Error)).sum();
        let warnings: u64 = summaries.iter().map(|s| s.count(Level::Warning)).sum();

        let mut lines = vec![format!(
            "{total} entries across {} source(s): {errors} ERROR, {warnings} WARNING.",
            summaries.len()
        )];

        let top_error = summaries
            .iter()
            .filter_map(|s| s.top_errors.first().map(|t| (s, t)))
            .max_by(|(_, a), (_, b)| a.count.cmp(&b.count));
        if let Some((summary, share)) = top_error {
            lines.push(format!(
                "Most frequent error in {}: \"{}\" ({} times, {:.1}% of its errors).",
                summary.source_id, share.template_string, share.count, share.percentage
            ));
        }

        if let Some(first) = entries.iter().find(|e| e.timestamp.is_some())
            && let Some(ts) = first.timestamp
        {
            lines.push(format!(
                "First sampled error at {} in {}: {}",
                ts.to_rfc3339(),
                first.source_id,
                first.message
            ));
        }

        let noisy: Vec<&str> = summaries
            .iter()
            .filter(|s| s.unparsed_entries > 0)
            .map(|s| s.source_id.as_str())
            .collect();
        if !noisy.is_empty() {
            lines.push(format!("Unrecognised lines in: {}.", noisy.join(", ")));
        }

        Some(lines.join("\n"))
    }
}

impl CommentaryGenerator for DigestCommentary {
    fn name(&self) -> &str {
        "digest"
    }

    fn generate<'a>(
        &'a self,
        entries: &'a [LogEntry],
        summaries: &'a [AnalysisSummary],
    ) -> BoxFuture<'a, Result<Option<String>, PluginError>> {
        Box::pin(async move { Ok(Self::digest(entries, summaries)) })
    }
}
