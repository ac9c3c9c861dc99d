//! `logscope config` command handler and configuration resolution

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use logscope_core::config::LogscopeConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Configuration file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_PATH: &str = "logscope.toml";

/// Where the effective configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config PATH` (must exist)
    Explicit(PathBuf),
    /// `./logscope.toml` found in the working directory
    Discovered(PathBuf),
    /// No file: built-in defaults plus environment overrides
    Defaults,
}

impl ConfigSource {
    /// Resolve the source from the `--config` argument.
    pub fn resolve(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::Explicit(p.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default.is_file() {
                    Self::Discovered(default)
                } else {
                    Self::Defaults
                }
            }
        }
    }

    /// Human-readable label for reports.
    pub fn label(&self) -> String {
        match self {
            Self::Explicit(p) | Self::Discovered(p) => p.display().to_string(),
            Self::Defaults => "(built-in defaults)".to_owned(),
        }
    }

    /// Load, apply environment overrides and validate.
    pub async fn load(&self) -> Result<LogscopeConfig, CliError> {
        match self {
            Self::Explicit(p) | Self::Discovered(p) => {
                debug!(path = %p.display(), "loading configuration file");
                Ok(LogscopeConfig::load(p).await?)
            }
            Self::Defaults => {
                debug!("no configuration file, using defaults");
                let mut config = LogscopeConfig::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }
}

/// Execute the `config` command.
///
/// `loaded` is the result of [`ConfigSource::load`], already attempted by `main`
/// so that logging can be configured from it.
pub async fn execute(
    args: ConfigArgs,
    source: &ConfigSource,
    loaded: Result<LogscopeConfig, CliError>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(source, loaded, writer),
        ConfigAction::Show { section } => execute_show(source, loaded?, section, writer),
    }
}

/// Report whether the configuration loads and validates.
///
/// # Errors
///
/// Returns `CliError::Config` if validation fails (parse errors, invalid values).
fn execute_validate(
    source: &ConfigSource,
    loaded: Result<LogscopeConfig, CliError>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(source = %source.label(), "validating configuration");

    let report = match &loaded {
        Ok(_) => ConfigValidationReport {
            source: source.label(),
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: source.label(),
            valid: false,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

/// Display the effective configuration, optionally a single section.
fn execute_show(
    source: &ConfigSource,
    config: LogscopeConfig,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let report = build_config_report(source.label(), &config, section.as_deref())?;
    writer.render(&report)?;
    Ok(())
}

fn build_config_report(
    source: String,
    config: &LogscopeConfig,
    section: Option<&str>,
) -> Result<ConfigReport, CliError> {
    let (config_toml, value) = match section {
        None => (toml::to_string_pretty(config), serde_json::to_value(config)?),
        Some("general") => (
            toml::to_string_pretty(&config.general),
            serde_json::to_value(&config.general)?,
        ),
        Some("analysis") => (
            toml::to_string_pretty(&config.analysis),
            serde_json::to_value(&config.analysis)?,
        ),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: general, analysis)"
            )));
        }
    };
    let config_toml =
        config_toml.map_err(|e| CliError::Command(format!("failed to serialize config: {e}")))?;

    Ok(ConfigReport {
        source,
        section: section.map(str::to_owned),
        config: value,
        config_toml,
    })
}

/// Configuration display report.
///
/// Text output shows TOML; JSON output carries the same values as a JSON object.
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path or `(built-in defaults)`
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub config: serde_json::Value,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}
