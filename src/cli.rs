use crate::ai_sql::GenerationMode;
use crate::format::OutputFormat;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// daibai - ask your MySQL databases questions in plain language
#[derive(Parser, Debug, Clone)]
#[command(name = "daibai")]
#[command(version, long_about = None)]
#[command(about = "Natural-language to SQL assistant for MySQL")]
pub struct Args {
    /// Config file (default: ./daibai.toml, ~/.daibai/daibai.toml, ...)
    #[arg(short, long, value_name = "PATH", env = "DAIBAI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database to start on
    #[arg(short, long, value_name = "NAME")]
    pub database: Option<String>,

    /// LLM provider to start on
    #[arg(short, long, value_name = "NAME")]
    pub llm: Option<String>,

    /// Kind of statement to generate
    #[arg(short, long, value_enum)]
    pub mode: Option<GenerationMode>,

    /// Generate SQL for this request, print it and exit
    #[arg(short, long, value_name = "REQUEST")]
    pub query: Option<String>,

    /// Run the generated SQL
    #[arg(short = 'x', long)]
    pub execute: bool,

    /// Skip the confirmation for destructive statements
    #[arg(short, long)]
    pub yes: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Result rendering; with -q, csv is written to stdout
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Train the schema of the selected database and exit
    #[arg(long)]
    pub train: bool,

    /// Discard the cached schema, retrain and exit
    #[arg(long)]
    pub refresh: bool,

    /// Show training status of every database and exit
    #[arg(long)]
    pub status: bool,

    /// List configured databases and providers and exit
    #[arg(long)]
    pub list: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Generate shell completions
    #[arg(long, value_enum)]
    pub completions: Option<Shell>,
}

impl Args {
    /// Any flag that does its work and exits instead of opening the REPL
    pub fn is_one_shot(&self) -> bool {
        self.query.is_some() || self.train || self.refresh || self.status || self.list
    }
}

/// Supported shells for completion generation
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

impl From<Shell> for clap_complete::Shell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => clap_complete::Shell::Bash,
            Shell::Zsh => clap_complete::Shell::Zsh,
            Shell::Fish => clap_complete::Shell::Fish,
            Shell::PowerShell => clap_complete::Shell::PowerShell,
            Shell::Elvish => clap_complete::Shell::Elvish,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[rstest]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[rstest]
    fn test_one_shot_query() {
        let args = Args::try_parse_from([
            "daibai", "-q", "top customers", "--mode", "crud", "-x", "--json", "-d", "shop",
        ])
        .unwrap();
        assert_eq!(args.query.as_deref(), Some("top customers"));
        assert_eq!(args.mode, Some(GenerationMode::Crud));
        assert_eq!(args.database.as_deref(), Some("shop"));
        assert!(args.execute && args.json && !args.yes);
        assert!(args.is_one_shot());
    }

    #[rstest]
    #[case(&["daibai"], false)]
    #[case(&["daibai", "--status"], true)]
    #[case(&["daibai", "--list"], true)]
    #[case(&["daibai", "--train", "-l", "gpt"], true)]
    #[case(&["daibai", "-v", "--llm", "gpt"], false)]
    fn test_is_one_shot(#[case] argv: &[&str], #[case] expected: bool) {
        assert_eq!(Args::try_parse_from(argv).unwrap().is_one_shot(), expected);
    }

    #[rstest]
    #[case("markdown", OutputFormat::Markdown)]
    #[case("csv", OutputFormat::Csv)]
    fn test_format_flag(#[case] value: &str, #[case] expected: OutputFormat) {
        let args = Args::try_parse_from(["daibai", "-q", "all users", "-x", "--format", value]).unwrap();
        assert_eq!(args.format, Some(expected));
    }

    #[rstest]
    fn test_bad_mode_rejected() {
        assert!(Args::try_parse_from(["daibai", "--mode", "nosql"]).is_err());
    }
}
