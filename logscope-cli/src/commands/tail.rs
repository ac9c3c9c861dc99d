//! `logscope tail` command handler
//!
//! Streams stdin through a live analysis session. Alerts and flagged
//! anomaly windows are printed as they happen; classified entries only
//! with `--entries`. A summary line closes the session at EOF or Ctrl-C.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use logscope_analysis::{LineSource, SourceReport, StreamEvent, StreamHandle};
use logscope_core::config::LogscopeConfig;
use logscope_core::types::{AlertEvent, AnomalyWindow, LogEntry};

use crate::cli::TailArgs;
use crate::commands::{cancel_on_ctrl_c, engine_builder, spawn_line_reader};
use crate::error::CliError;
use crate::output::{OutputWriter, RenderLine};

/// Execute the `tail` command.
///
/// # Errors
///
/// - `CliError::Rule` if the rule directory contains invalid rules
/// - `CliError::Config` if the analysis configuration is rejected by the engine
/// - `CliError::Io` if stdin cannot be read or stdout is closed
pub async fn execute(
    args: TailArgs,
    config: LogscopeConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let engine = engine_builder(&config, args.rules.as_deref(), None)
        .await?
        .build()?;

    let limits = engine.config();
    let (tx, rx) = mpsc::channel(limits.stage_channel_capacity);
    let reader = spawn_line_reader(tokio::io::stdin(), tx, limits.max_line_length);

    let cancel = CancellationToken::new();
    let interrupt = cancel_on_ctrl_c(cancel.clone());

    info!(source = %args.source, rules = engine.rule_count(), "tailing stdin");
    let StreamHandle { mut events, join } = engine
        .stream(LineSource::new(args.source.clone(), rx), cancel)
        .await?;

    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Alert(alert) => writer.emit(&TailRecord::Alert(alert))?,
            StreamEvent::Anomaly(window) => writer.emit(&TailRecord::Anomaly {
                source_id: args.source.clone(),
                window,
            })?,
            StreamEvent::Entry(entry) if args.entries => {
                writer.emit(&TailRecord::Entry(entry))?;
            }
            StreamEvent::Entry(_) => {}
        }
    }

    let report = join
        .await
        .map_err(|e| CliError::Analysis(format!("stream task failed: {e}")))??;
    interrupt.abort();

    // stdin may still be blocked in a read after Ctrl-C
    if reader.is_finished() {
        match reader.await {
            Ok(Ok(lines)) => debug!(lines, "stdin closed"),
            Ok(Err(e)) => return Err(e.into()),
            Err(e) => return Err(CliError::Command(format!("stdin reader failed: {e}"))),
        }
    } else {
        reader.abort();
    }

    writer.emit(&TailRecord::Summary(TailSummary::from(&report)))?;
    Ok(())
}

/// One streamed output record.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TailRecord {
    Entry(LogEntry),
    Alert(AlertEvent),
    Anomaly {
        source_id: String,
        #[serde(flatten)]
        window: AnomalyWindow,
    },
    Summary(TailSummary),
}

/// Closing record of a tail session.
#[derive(Debug, Serialize)]
pub struct TailSummary {
    pub source_id: String,
    pub lines: u64,
    pub entries: u64,
    pub alerts: usize,
    pub anomalies: usize,
    pub warnings: Vec<String>,
    pub degraded: bool,
    pub cancelled: bool,
}

impl From<&SourceReport> for TailSummary {
    fn from(report: &SourceReport) -> Self {
        Self {
            source_id: report.source_id.clone(),
            lines: report.summary.total_lines,
            entries: report.summary.total_entries,
            alerts: report.alerts.len(),
            anomalies: report.flagged_anomalies().count(),
            warnings: report.warnings.iter().map(|w| w.message.clone()).collect(),
            degraded: report.degraded,
            cancelled: report.cancelled,
        }
    }
}

impl RenderLine for TailRecord {
    fn render_line(&self) -> String {
        use colored::Colorize;

        match self {
            Self::Entry(entry) => {
                let ts = entry
                    .timestamp
                    .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                    .unwrap_or_else(|| "-".repeat(20));
                format!(
                    "{} {:<7} {}#{} {}",
                    ts,
                    entry.level.as_str(),
                    entry.source_id,
                    entry.sequence_number,
                    entry.message
                )
            }
            Self::Alert(alert) => format!("{} {}", "ALERT".red().bold(), alert),
            Self::Anomaly { source_id, window } => format!(
                "{} {} {} {} observed={} mean={:.1} stddev={:.1} score={:.2}",
                "ANOMALY".yellow().bold(),
                source_id,
                window.window_start.format("%Y-%m-%dT%H:%M:%SZ"),
                window.metric_name,
                window.observed_value,
                window.baseline_mean,
                window.baseline_stddev,
                window.score
            ),
            Self::Summary(summary) => {
                let mut line = format!(
                    "-- {}: {} lines, {} entries, {} alerts, {} anomalies",
                    summary.source_id,
                    summary.lines,
                    summary.entries,
                    summary.alerts,
                    summary.anomalies
                );
                if summary.cancelled {
                    line.push_str(", cancelled");
                }
                if summary.degraded {
                    line.push_str(", degraded");
                }
                line
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logscope_analysis::AnalysisEngineBuilder;

    fn entry() -> LogEntry {
        LogEntry {
            source_id: "stdin".to_owned(),
            sequence_number: 3,
            line_number: 7,
            line_count: 1,
            timestamp: "2024-03-01T10:00:00Z".parse().ok(),
            level: logscope_core::types::Level::Error,
            level_token: Some("ERROR".to_owned()),
            format: Some("iso8601_level".to_owned()),
            message: "db timeout".to_owned(),
            raw_text: "2024-03-01T10:00:00Z ERROR db timeout".to_owned(),
            extracted_fields: Default::default(),
        }
    }

    #[test]
    fn entry_line_is_compact() {
        colored::control::set_override(false);
        let line = TailRecord::Entry(entry()).render_line();
        assert_eq!(line, "2024-03-01T10:00:00Z ERROR   stdin#3 db timeout");
    }

    #[test]
    fn records_are_tagged_in_json() {
        let json = serde_json::to_value(TailRecord::Entry(entry())).unwrap();
        assert_eq!(json["type"].as_str(), Some("entry"));
        assert_eq!(json["message"].as_str(), Some("db timeout"));
    }

    #[tokio::test]
    async fn stream_summary_counts_lines_and_entries() {
        let engine = AnalysisEngineBuilder::new().build().unwrap();
        let lines = vec![
            "2024-03-01T10:00:00Z INFO started",
            "2024-03-01T10:00:01Z ERROR failed",
            "    at worker.run",
        ];
        let StreamHandle { mut events, join } = engine
            .stream(LineSource::from_lines("stdin", lines), CancellationToken::new())
            .await
            .unwrap();
        while events.recv().await.is_some() {}
        let report = join.await.unwrap().unwrap();

        let summary = TailSummary::from(&report);
        assert_eq!(summary.lines, 3);
        assert_eq!(summary.entries, 2);
        assert!(!summary.cancelled);

        colored::control::set_override(false);
        let line = TailRecord::Summary(summary).render_line();
        assert_eq!(line, "-- stdin: 3 lines, 2 entries, 0 alerts, 0 anomalies");

        let json = serde_json::to_value(TailRecord::Summary(TailSummary::from(&report))).unwrap();
        assert_eq!(json["type"].as_str(), Some("summary"));
    }
}
