//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Logscope -- log analysis for files and live streams.
///
/// Use `logscope <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "logscope", version, about, long_about = None)]
pub struct Cli {
    /// Path to the logscope.toml configuration file.
    ///
    /// When omitted, `./logscope.toml` is used if present, otherwise built-in defaults.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze one or more log files and print a report.
    Analyze(AnalyzeArgs),

    /// Stream stdin and print alerts and anomalies as they occur.
    Tail(TailArgs),

    /// Manage alert rules.
    Rules(RulesArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- analyze ----

/// Analyze log files in one run (cross-file correlation included).
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Log files to analyze. Each file becomes one source.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Directory containing YAML alert rule files.
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Number of top error/warning templates per source (overrides config).
    #[arg(long)]
    pub top: Option<usize>,

    /// Attach a short digest of the run to the report.
    #[arg(long)]
    pub commentary: bool,
}

// ---- tail ----

/// Stream stdin until EOF or Ctrl-C.
#[derive(Args, Debug)]
pub struct TailArgs {
    /// Source name used in entry ids and alerts.
    #[arg(long, default_value = "stdin")]
    pub source: String,

    /// Directory containing YAML alert rule files.
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Also print every classified entry.
    #[arg(long)]
    pub entries: bool,
}

// ---- rules ----

/// Manage alert rules.
#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List rules found in a directory.
    List {
        /// Directory containing YAML rule files.
        path: PathBuf,

        /// Filter by status (enabled, disabled).
        #[arg(long)]
        status: Option<String>,
    },
    /// Validate rule files without running an analysis.
    Validate {
        /// Directory containing YAML rule files.
        path: PathBuf,
    },
}

// ---- config ----

/// Manage logscope configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, analysis).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_analyze_files() {
        let cli = Cli::try_parse_from(["logscope", "analyze", "a.log", "b.log"])
            .expect("should parse 'analyze' with files");
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.files, vec![PathBuf::from("a.log"), PathBuf::from("b.log")]);
                assert!(args.rules.is_none());
                assert!(args.top.is_none());
                assert!(!args.commentary);
            }
            _ => panic!("expected Analyze command"),
        }
    }

    #[test]
    fn test_cli_parse_analyze_requires_files() {
        let args = Cli::try_parse_from(["logscope", "analyze"]);
        assert!(args.is_err(), "analyze without files should fail");
    }

    #[test]
    fn test_cli_parse_analyze_options() {
        let cli = Cli::try_parse_from([
            "logscope",
            "analyze",
            "app.log",
            "--rules",
            "/etc/logscope/rules",
            "--top",
            "3",
            "--commentary",
            "--output",
            "json",
        ])
        .expect("should parse analyze with options");
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.rules, Some(PathBuf::from("/etc/logscope/rules")));
                assert_eq!(args.top, Some(3));
                assert!(args.commentary);
            }
            _ => panic!("expected Analyze command"),
        }
    }

    #[test]
    fn test_cli_parse_tail_defaults() {
        let cli = Cli::try_parse_from(["logscope", "tail"]).expect("should parse 'tail'");
        match cli.command {
            Commands::Tail(args) => {
                assert_eq!(args.source, "stdin");
                assert!(args.rules.is_none());
                assert!(!args.entries);
            }
            _ => panic!("expected Tail command"),
        }
    }

    #[test]
    fn test_cli_parse_tail_with_source_and_rules() {
        let cli = Cli::try_parse_from([
            "logscope", "tail", "--source", "nginx", "--rules", "rules/", "--entries",
        ])
        .expect("should parse tail with options");
        match cli.command {
            Commands::Tail(args) => {
                assert_eq!(args.source, "nginx");
                assert_eq!(args.rules, Some(PathBuf::from("rules/")));
                assert!(args.entries);
            }
            _ => panic!("expected Tail command"),
        }
    }

    #[test]
    fn test_cli_parse_rules_validate() {
        let cli = Cli::try_parse_from(["logscope", "rules", "validate", "/custom/rules"])
            .expect("should parse 'rules validate'");
        match cli.command {
            Commands::Rules(rules_args) => match rules_args.action {
                RulesAction::Validate { path } => {
                    assert_eq!(path, PathBuf::from("/custom/rules"));
                }
                _ => panic!("expected Validate action"),
            },
            _ => panic!("expected Rules command"),
        }
    }

    #[test]
    fn test_cli_parse_rules_validate_requires_path() {
        let args = Cli::try_parse_from(["logscope", "rules", "validate"]);
        assert!(args.is_err(), "rules validate without a directory should fail");
    }

    #[test]
    fn test_cli_parse_rules_list_with_status_filter() {
        let cli = Cli::try_parse_from(["logscope", "rules", "list", "rules", "--status", "enabled"])
            .expect("should parse rules list with status filter");
        match cli.command {
            Commands::Rules(rules_args) => match rules_args.action {
                RulesAction::List { path, status } => {
                    assert_eq!(path, PathBuf::from("rules"));
                    assert_eq!(status, Some("enabled".to_owned()));
                }
                _ => panic!("expected List action"),
            },
            _ => panic!("expected Rules command"),
        }
    }

    #[test]
    fn test_cli_parse_config_validate() {
        let cli = Cli::try_parse_from(["logscope", "config", "validate"])
            .expect("should parse 'config validate'");
        match cli.command {
            Commands::Config(config_args) => {
                assert!(matches!(config_args.action, ConfigAction::Validate));
            }
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let cli = Cli::try_parse_from(["logscope", "config", "show", "--section", "analysis"])
            .expect("should parse config show with section");
        match cli.command {
            Commands::Config(config_args) => match config_args.action {
                ConfigAction::Show { section } => {
                    assert_eq!(section, Some("analysis".to_owned()));
                }
                _ => panic!("expected Show action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["logscope", "analyze", "a.log", "-c", "/custom/logscope.toml"])
            .expect("should parse with custom config path");
        assert_eq!(cli.config, Some(PathBuf::from("/custom/logscope.toml")));
    }

    #[test]
    fn test_cli_parse_log_level() {
        let cli = Cli::try_parse_from(["logscope", "--log-level", "debug", "config", "validate"])
            .expect("should parse with custom log level");
        assert_eq!(cli.log_level, Some("debug".to_owned()));
        assert!(cli.config.is_none());
        assert_eq!(cli.output, OutputFormat::Text);
    }

    #[test]
    fn test_cli_parse_invalid_output_format_fails() {
        let args = Cli::try_parse_from(["logscope", "--output", "yaml", "tail"]);
        assert!(args.is_err(), "unknown output format should fail");
    }

    #[test]
    fn test_cli_parse_missing_command_fails() {
        let args = Cli::try_parse_from(["logscope"]);
        assert!(args.is_err(), "should fail when no command provided");
    }

    #[test]
    fn test_cli_verify_command_structure() {
        let cmd = Cli::command();
        assert_eq!(cmd.get_name(), "logscope");

        let subcommands: Vec<_> = cmd.get_subcommands().map(|s| s.get_name()).collect();
        for expected in ["analyze", "tail", "rules", "config"] {
            assert!(
                subcommands.contains(&expected),
                "should have '{expected}' subcommand"
            );
        }
    }
}
