//! Command handlers -- one module per subcommand
//!
//! Shared plumbing lives here: engine construction from the loaded
//! configuration, the line reader that feeds a bounded channel, and
//! Ctrl-C cancellation.

pub mod analyze;
pub mod config;
pub mod rules;
pub mod tail;

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use logscope_analysis::{AnalysisConfig, AnalysisEngineBuilder};
use logscope_core::config::LogscopeConfig;
use logscope_core::error::PluginError;
use logscope_core::pipeline::{BoxFuture, NotificationSink};
use logscope_core::types::AlertEvent;

use crate::error::CliError;

/// Notification sink that reports fired alerts through the log.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    fn deliver<'a>(&'a self, event: &'a AlertEvent) -> BoxFuture<'a, Result<(), PluginError>> {
        Box::pin(async move {
            warn!(
                rule_id = %event.rule_id,
                source_id = %event.source_id,
                triggered_at = %event.triggered_at,
                matched = event.matched_entry_ids.len(),
                "alert fired: {}",
                event.rule_title
            );
            Ok(())
        })
    }
}

/// Engine builder prepared from the loaded configuration and an optional rule directory.
pub async fn engine_builder(
    config: &LogscopeConfig,
    rules_dir: Option<&Path>,
    top_n: Option<usize>,
) -> Result<AnalysisEngineBuilder, CliError> {
    let mut analysis = AnalysisConfig::from_core(&config.analysis);
    if let Some(top) = top_n {
        analysis.top_n = top;
    }

    let rules = match rules_dir {
        Some(dir) => rules::load_rules(dir).await?,
        None => Vec::new(),
    };

    Ok(AnalysisEngineBuilder::new()
        .config(analysis)
        .rules(rules)
        .notification_sink(Arc::new(TracingSink)))
}

/// Read `reader` line by line into a bounded channel.
///
/// Each message is one raw line including its terminator. The task stops at EOF
/// or when the receiving side is dropped, and returns the number of lines sent.
/// A full channel suspends reading.
///
/// Lines longer than `max_line_length` bytes are cut while reading; the engine
/// then truncates them to the limit and reports them. Memory per line stays bounded.
pub fn spawn_line_reader<R>(
    reader: R,
    tx: mpsc::Sender<Bytes>,
    max_line_length: usize,
) -> JoinHandle<std::io::Result<u64>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        // one byte past the limit so the engine still sees the line as over-long
        let keep = max_line_length.saturating_add(1);
        let mut lines = 0u64;
        while let Some(line) = read_bounded_line(&mut reader, keep).await? {
            lines += 1;
            if tx.send(line).await.is_err() {
                break;
            }
        }
        Ok(lines)
    })
}

/// Read one line, keeping at most `keep` bytes before the `\n`.
///
/// The rest of an over-long line is consumed and dropped. `None` at EOF.
async fn read_bounded_line<R>(reader: &mut R, keep: usize) -> std::io::Result<Option<Bytes>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut seen = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(seen.then(|| Bytes::from(buf)));
        }
        seen = true;

        let newline = available.iter().position(|&b| b == b'\n');
        let content = &available[..newline.unwrap_or(available.len())];
        let room = keep.saturating_sub(buf.len());
        buf.extend_from_slice(&content[..content.len().min(room)]);

        match newline {
            Some(pos) => {
                buf.push(b'\n');
                reader.consume(pos + 1);
                return Ok(Some(Bytes::from(buf)));
            }
            None => {
                let used = available.len();
                reader.consume(used);
            }
        }
    }
}

/// Cancel `token` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            token.cancel();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn line_reader_splits_on_newline_and_keeps_last_partial_line() {
        let input: &[u8] = b"first\nsecond\r\nthird";
        let (tx, mut rx) = mpsc::channel(8);
        let lines = spawn_line_reader(input, tx, 1024).await.unwrap().unwrap();
        assert_eq!(lines, 3);

        let mut got = Vec::new();
        while let Some(line) = rx.recv().await {
            got.push(line);
        }
        assert_eq!(
            got,
            vec![
                Bytes::from_static(b"first\n"),
                Bytes::from_static(b"second\r\n"),
                Bytes::from_static(b"third"),
            ]
        );
    }

    #[tokio::test]
    async fn line_reader_stops_when_receiver_dropped() {
        let input: &[u8] = b"a\nb\nc\n";
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let lines = spawn_line_reader(input, tx, 1024).await.unwrap().unwrap();
        assert_eq!(lines, 1);
    }

    #[tokio::test]
    async fn line_reader_bounds_over_long_lines() {
        let mut input = b"2024-01-15 10:00:00 ERROR ".to_vec();
        input.extend(std::iter::repeat_n(b'x', 100_000));
        input.extend_from_slice(b"\nnext line\n");
        let (tx, mut rx) = mpsc::channel(8);
        let lines = spawn_line_reader(std::io::Cursor::new(input), tx, 32)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lines, 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.len(), 34);
        assert!(first.starts_with(b"2024-01-15 10:00:00 ERROR xxxxxx"));
        assert!(first.ends_with(b"\n"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"next line\n"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn over_long_stdin_line_reaches_report_truncated() {
        use logscope_analysis::LineSource;

        let config = LogscopeConfig::default();
        let engine = engine_builder(&config, None, None)
            .await
            .unwrap()
            .build()
            .unwrap();
        let limit = engine.config().max_line_length;

        let mut input = b"2024-01-15 10:00:00 ERROR ".to_vec();
        input.extend(std::iter::repeat_n(b'y', limit * 3));
        input.push(b'\n');
        let (tx, rx) = mpsc::channel(4);
        let reader = spawn_line_reader(std::io::Cursor::new(input), tx, limit);
        let report = engine
            .analyze(vec![LineSource::new("big.log", rx)])
            .await
            .unwrap();
        assert_eq!(reader.await.unwrap().unwrap(), 1);

        let source = report.source("big.log").unwrap();
        assert_eq!(source.entries[0].raw_text.len(), limit);
        assert_eq!(source.warnings.len(), 1);
    }

    #[tokio::test]
    async fn engine_builder_applies_top_override() {
        let config = LogscopeConfig::default();
        let engine = engine_builder(&config, None, Some(3))
            .await
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(engine.config().top_n, 3);
        assert_eq!(engine.rule_count(), 0);
    }

    #[tokio::test]
    async fn tracing_sink_always_succeeds() {
        let event = AlertEvent {
            id: uuid::Uuid::nil(),
            rule_id: "r".to_owned(),
            rule_title: "Rule".to_owned(),
            source_id: "a.log".to_owned(),
            triggered_at: chrono::Utc::now(),
            matched_entry_ids: Vec::new(),
        };
        assert!(TracingSink.deliver(&event).await.is_ok());
    }
}
