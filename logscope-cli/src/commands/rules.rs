//! `logscope rules` command handler and rule directory loading
//!
//! The analysis core parses rule documents from strings; reading the
//! directory is done here.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use logscope_analysis::rule::RuleStatus;
use logscope_analysis::rule::loader::MAX_RULE_DOCUMENT_SIZE;
use logscope_analysis::{AlertRule, AnalysisError, RuleLoader};

use crate::cli::{RulesAction, RulesArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Parse result of one rule file.
pub struct RuleFile {
    pub path: PathBuf,
    pub result: Result<Vec<AlertRule>, AnalysisError>,
}

/// List `*.yml` / `*.yaml` files in a directory, sorted by name.
async fn rule_file_paths(dir: &Path) -> Result<Vec<PathBuf>, CliError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        CliError::Rule(format!("cannot read rule directory {}: {e}", dir.display()))
    })?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"));
        if is_yaml && entry.file_type().await?.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Read and parse every rule file in `dir`, keeping per-file results.
pub async fn read_rule_files(dir: &Path) -> Result<Vec<RuleFile>, CliError> {
    let mut files = Vec::new();
    for path in rule_file_paths(dir).await? {
        let metadata = tokio::fs::metadata(&path).await?;
        let origin = path.display().to_string();
        let result = if metadata.len() > MAX_RULE_DOCUMENT_SIZE as u64 {
            Err(AnalysisError::RuleParse {
                origin,
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_DOCUMENT_SIZE})",
                    metadata.len()
                ),
            })
        } else {
            let content = tokio::fs::read_to_string(&path).await?;
            RuleLoader::parse_yaml(&content, &origin)
        };
        debug!(path = %path.display(), ok = result.is_ok(), "parsed rule file");
        files.push(RuleFile { path, result });
    }
    Ok(files)
}

/// Load all rules from `dir` for an analysis run. Any invalid file fails the load.
pub async fn load_rules(dir: &Path) -> Result<Vec<AlertRule>, CliError> {
    let files = read_rule_files(dir).await?;
    let mut sets = Vec::with_capacity(files.len());
    for file in files {
        sets.push(file.result?);
    }
    let rules = RuleLoader::merge(sets)?;
    info!(dir = %dir.display(), count = rules.len(), "alert rules loaded");
    Ok(rules)
}

/// Execute the `rules` command.
pub async fn execute(args: RulesArgs, writer: &OutputWriter) -> Result<(), CliError> {
    match args.action {
        RulesAction::List { path, status } => execute_list(&path, status, writer).await,
        RulesAction::Validate { path } => execute_validate(&path, writer).await,
    }
}

fn status_name(status: RuleStatus) -> &'static str {
    match status {
        RuleStatus::Enabled => "enabled",
        RuleStatus::Disabled => "disabled",
    }
}

async fn execute_list(
    path: &Path,
    status_filter: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    if let Some(filter) = status_filter.as_deref()
        && !matches!(filter, "enabled" | "disabled")
    {
        return Err(CliError::Command(format!(
            "unknown status: {filter} (expected: enabled, disabled)"
        )));
    }

    let rules = load_rules(path).await?;
    let rules: Vec<RuleEntry> = rules
        .into_iter()
        .filter(|r| {
            status_filter
                .as_deref()
                .is_none_or(|f| f == status_name(r.status))
        })
        .map(RuleEntry::from)
        .collect();

    let report = RuleListReport {
        total: rules.len(),
        rules,
    };
    writer.render(&report)?;
    Ok(())
}

async fn execute_validate(path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %path.display(), "validating alert rules");

    let files = read_rule_files(path).await?;
    let report = build_validation_report(path, files);
    writer.render(&report)?;

    if report.invalid > 0 {
        return Err(CliError::Rule(format!(
            "{} invalid rule file(s)",
            report.invalid
        )));
    }
    Ok(())
}

/// Summarize per-file results, then check id uniqueness across the valid files.
fn build_validation_report(dir: &Path, files: Vec<RuleFile>) -> RuleValidationReport {
    let total_files = files.len();
    let mut errors = Vec::new();
    let mut sets = Vec::new();
    for file in files {
        match file.result {
            Ok(rules) => sets.push(rules),
            Err(e) => errors.push(RuleError {
                file: file.path.display().to_string(),
                error: e.to_string(),
            }),
        }
    }
    let invalid_files = errors.len();
    let valid_files = total_files - invalid_files;

    let rule_count: usize = sets.iter().map(Vec::len).sum();
    if let Err(e) = RuleLoader::merge(sets) {
        errors.push(RuleError {
            file: dir.display().to_string(),
            error: e.to_string(),
        });
    }

    RuleValidationReport {
        path: dir.display().to_string(),
        total_files,
        valid: valid_files,
        invalid: errors.len(),
        rules: rule_count,
        errors,
    }
}

#[derive(Serialize)]
pub struct RuleListReport {
    pub total: usize,
    pub rules: Vec<RuleEntry>,
}

#[derive(Serialize)]
pub struct RuleEntry {
    pub id: String,
    pub title: String,
    pub status: String,
    pub threshold_count: u64,
    pub window_secs: u64,
    pub cooldown_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl From<AlertRule> for RuleEntry {
    fn from(r: AlertRule) -> Self {
        Self {
            status: status_name(r.status).to_owned(),
            source: r.condition.source,
            id: r.id,
            title: r.title,
            threshold_count: r.threshold_count,
            window_secs: r.window_secs,
            cooldown_secs: r.cooldown_secs,
        }
    }
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Alert Rules ({} total)", self.total.to_string().bold())?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<25} {:<30} {:<10} Threshold",
            "ID", "Title", "Status"
        )?;
        writeln!(w, "{}", "-".repeat(90))?;

        for r in &self.rules {
            let status_colored = match r.status.as_str() {
                "enabled" => r.status.green(),
                "disabled" => r.status.yellow(),
                _ => r.status.normal(),
            };

            write!(
                w,
                "{:<25} {:<30} {:<10} {} in {}s (cooldown {}s)",
                r.id, r.title, status_colored, r.threshold_count, r.window_secs, r.cooldown_secs
            )?;
            match &r.source {
                Some(source) => writeln!(w, " on {source}")?,
                None => writeln!(w)?,
            }
        }

        Ok(())
    }
}

#[derive(Serialize)]
pub struct RuleValidationReport {
    pub path: String,
    pub total_files: usize,
    pub valid: usize,
    pub invalid: usize,
    /// Rules parsed from valid files
    pub rules: usize,
    pub errors: Vec<RuleError>,
}

#[derive(Serialize)]
pub struct RuleError {
    pub file: String,
    pub error: String,
}

impl Render for RuleValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rule Validation: {}", self.path.bold())?;
        writeln!(
            w,
            "  Files: {} total, {} valid, {} invalid ({} rules)",
            self.total_files,
            self.valid.to_string().green(),
            if self.invalid > 0 {
                self.invalid.to_string().red()
            } else {
                self.invalid.to_string().normal()
            },
            self.rules
        )?;

        if !self.errors.is_empty() {
            writeln!(w)?;
            writeln!(w, "Errors:")?;
            for e in &self.errors {
                writeln!(w, "  {}: {}", e.file.red(), e.error)?;
            }
        }

        Ok(())
    }
}
