//! Interactive session: `@` commands and natural-language requests

use crate::ai_sql::{Agent, AiError, AiResult, GenerationMode};
use crate::config::{Preferences, default_exports_dir};
use crate::database::QueryResult;
use crate::format::{
    OutputFormat, export_file_name, format_name_list, format_query_result_as,
    format_query_result_csv, format_query_result_json, format_training_status,
};
use crate::highlighter::SqlHighlighter;
use crate::llm::GenerationContext;
use crate::prompt::SessionPrompt;
use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, Completer, DefaultHinter, Emacs, FileBackedHistory, KeyCode, KeyModifiers,
    MenuBuilder, Reedline, ReedlineEvent, ReedlineMenu, Signal, Span, Suggestion,
    default_emacs_keybindings,
};
use std::path::PathBuf;
use std::str::FromStr;
use strum::IntoEnumIterator;
use tracing::{debug, warn};

pub const HELP_TEXT: &str = "\
Type a request in plain language to generate SQL, or one of:
  @use <db>        switch database
  @llm <name>      switch LLM provider
  @databases       list databases
  @providers       list LLM providers
  @sql @ddl @crud  switch generation mode
  @ddl <request>   switch mode and ask in one go (same for @sql, @crud)
  @execute         toggle running generated SQL
  @run <sql>       run SQL directly
  @format <kind>   render results as table, markdown or csv (saved to a file)
  @test            check every database and LLM provider
  @schema          show the schema of the current database
  @tables          list tables
  @train           train the current database's schema
  @refresh         discard the cached schema and retrain
  @status          training status of every database
  @clipboard       toggle copying generated SQL
  @help            this help
  @quit, @exit     leave";

const COMMANDS: &[(&str, &str)] = &[
    ("@use", "Switch database"),
    ("@llm", "Switch LLM provider"),
    ("@databases", "List databases"),
    ("@providers", "List LLM providers"),
    ("@sql", "Generate SELECT queries"),
    ("@ddl", "Generate DDL"),
    ("@crud", "Generate INSERT/UPDATE/DELETE"),
    ("@execute", "Toggle auto-execute"),
    ("@run", "Run SQL directly"),
    ("@format", "Result format"),
    ("@test", "Check connectivity"),
    ("@schema", "Show schema"),
    ("@tables", "List tables"),
    ("@train", "Train schema"),
    ("@refresh", "Retrain schema"),
    ("@status", "Training status"),
    ("@clipboard", "Toggle clipboard copy"),
    ("@help", "Show help"),
    ("@quit", "Exit"),
    ("@exit", "Exit"),
];

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Use(String),
    Llm(String),
    Databases,
    Providers,
    Mode(GenerationMode),
    /// Switch mode, then ask
    AskWith(GenerationMode, String),
    ToggleExecute,
    Run(String),
    Format(OutputFormat),
    Test,
    Schema,
    Tables,
    Train,
    Refresh,
    Status,
    ToggleClipboard,
    Help,
    Quit,
    Ask(String),
}

/// Parse one input line. Anything not starting with `@` is a request.
pub fn parse_command(input: &str) -> Result<ReplCommand, String> {
    let input = input.trim();
    let Some(rest) = input.strip_prefix('@') else {
        return Ok(ReplCommand::Ask(input.to_string()));
    };
    let (name, argument) = match rest.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (rest, ""),
    };
    let needs_argument = |what: &str| {
        if argument.is_empty() {
            Err(format!("@{name} needs {what}"))
        } else {
            Ok(argument.to_string())
        }
    };

    Ok(match name.to_lowercase().as_str() {
        "use" => ReplCommand::Use(needs_argument("a database name")?),
        "llm" => ReplCommand::Llm(needs_argument("a provider name")?),
        "databases" | "dbs" => ReplCommand::Databases,
        "providers" | "llms" => ReplCommand::Providers,
        mode @ ("sql" | "ddl" | "crud") => {
            let mode = GenerationMode::from_str(mode).map_err(|e| e.to_string())?;
            if argument.is_empty() {
                ReplCommand::Mode(mode)
            } else {
                ReplCommand::AskWith(mode, argument.to_string())
            }
        }
        "execute" => ReplCommand::ToggleExecute,
        "run" => ReplCommand::Run(needs_argument("a SQL statement")?),
        "format" => {
            let kind = needs_argument("table, markdown or csv")?;
            ReplCommand::Format(
                OutputFormat::from_str(&kind)
                    .map_err(|_| format!("Unknown format '{kind}'. Use table, markdown or csv."))?,
            )
        }
        "test" => ReplCommand::Test,
        "schema" => ReplCommand::Schema,
        "tables" => ReplCommand::Tables,
        "train" => ReplCommand::Train,
        "refresh" => ReplCommand::Refresh,
        "status" => ReplCommand::Status,
        "clipboard" => ReplCommand::ToggleClipboard,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        other => return Err(format!("Unknown command @{other}. Type @help for the list.")),
    })
}

#[derive(Debug, PartialEq)]
pub enum Reply {
    Text(String),
    Quit,
}

/// Ask before running a destructive statement
pub type Confirm = Box<dyn Fn(&str) -> bool + Send + Sync>;

pub fn confirm_with_inquire() -> Confirm {
    Box::new(|sql: &str| {
        let message = format!("Run this statement? {}", sql.lines().next().unwrap_or(sql));
        inquire::Confirm::new(&message)
            .with_default(false)
            .with_help_message("It modifies data or schema")
            .prompt()
            .unwrap_or(false)
    })
}

pub fn copy_to_clipboard(text: &str) -> bool {
    match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text.to_string())) {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not copy to clipboard: {}", e);
            false
        }
    }
}

/// Run a statement, asking first when it is destructive. `None` when declined.
pub async fn run_statement(
    agent: &Agent,
    sql: &str,
    confirm: &Confirm,
) -> AiResult<Option<QueryResult>> {
    if agent.is_destructive(sql) && !confirm(sql) {
        return Ok(None);
    }
    Ok(Some(agent.run_sql(sql, None).await?))
}

/// Whether a request asks to see results, and in which form
pub fn requested_format(request: &str) -> Option<OutputFormat> {
    const MARKDOWN: &[&str] = &["markdown table", "md table", "as markdown"];
    const CSV: &[&str] = &["to csv", "as csv", "csv file", "export csv", "save csv"];
    const RESULTS: &[&str] = &[
        "run ", "execute", "show me", "give me", "get me", "fetch", "return results",
        "show results", "list all", "list the", "what are", "how many", "count of", "display",
    ];

    let request = request.to_lowercase();
    let mentions = |phrases: &[&str]| phrases.iter().any(|p| request.contains(p));
    if mentions(MARKDOWN) {
        Some(OutputFormat::Markdown)
    } else if mentions(CSV) {
        Some(OutputFormat::Csv)
    } else if mentions(RESULTS) {
        Some(OutputFormat::Table)
    } else {
        None
    }
}

const PING_PROMPT: &str = "Say 'OK' if you can hear me.";
/// Error text in the connectivity report is cut to this many characters
const STATUS_WIDTH: usize = 50;

fn clip(text: &str, width: usize) -> String {
    text.trim().replace('\n', " ").chars().take(width).collect()
}

pub struct Session {
    pub agent: Agent,
    pub mode: GenerationMode,
    pub auto_execute: bool,
    pub clipboard: bool,
    pub json: bool,
    pub format: OutputFormat,
    pub exports_dir: PathBuf,
    confirm: Confirm,
    highlighter: SqlHighlighter,
}

impl Session {
    pub fn new(agent: Agent, confirm: Confirm) -> Self {
        Self {
            agent,
            mode: GenerationMode::default(),
            auto_execute: false,
            clipboard: false,
            json: false,
            format: OutputFormat::default(),
            exports_dir: default_exports_dir(),
            confirm,
            highlighter: SqlHighlighter::new(),
        }
    }

    pub fn prompt(&self) -> SessionPrompt {
        SessionPrompt::new(
            self.agent.current_database(),
            self.agent.current_provider(),
            self.mode,
            self.auto_execute,
        )
    }

    /// Restore remembered choices; names no longer configured are ignored
    pub fn apply_preferences(&mut self, preferences: &Preferences) {
        if let Some(db) = &preferences.database {
            if let Err(e) = self.agent.switch_database(db) {
                debug!("[Session::apply_preferences] {}", e);
            }
        }
        if let Some(llm) = &preferences.llm {
            if let Err(e) = self.agent.switch_provider(llm) {
                debug!("[Session::apply_preferences] {}", e);
            }
        }
        self.mode = preferences.mode;
        self.auto_execute = preferences.auto_execute;
        if let Some(clipboard) = preferences.clipboard {
            self.clipboard = clipboard;
        }
    }

    pub fn preferences(&self) -> Preferences {
        Preferences {
            database: self.agent.current_database().map(str::to_string),
            llm: self.agent.current_provider().map(str::to_string),
            mode: self.mode,
            auto_execute: self.auto_execute,
            clipboard: Some(self.clipboard),
        }
    }

    fn on_off(flag: bool) -> &'static str {
        if flag { "on" } else { "off" }
    }

    /// Render an executed result; CSV goes to a file under `exports_dir`
    pub fn render(&self, result: &QueryResult, output: OutputFormat, request: &str, sql: &str) -> String {
        if self.json {
            return format_query_result_json(result);
        }
        if output != OutputFormat::Csv || result.affected_rows().is_some() {
            return format_query_result_as(result, output);
        }

        let path = self.exports_dir.join(export_file_name(request, sql));
        let written = std::fs::create_dir_all(&self.exports_dir)
            .and_then(|()| std::fs::write(&path, format_query_result_csv(result)));
        match written {
            Ok(()) => format!("Saved {} rows to {}", result.row_count(), path.display()),
            Err(e) => {
                warn!("[Session::render] Could not write {}: {}", path.display(), e);
                format!("Could not write {}: {}", path.display(), e)
            }
        }
    }

    async fn execute(&self, sql: &str, output: OutputFormat, request: &str) -> AiResult<String> {
        Ok(match run_statement(&self.agent, sql, &self.confirm).await? {
            Some(result) => self.render(&result, output, request, sql),
            None => "Cancelled".to_string(),
        })
    }

    /// `SELECT 1` on every database and a short prompt to every provider.
    /// The selected provider is restored afterwards.
    pub async fn test_connectivity(&mut self) -> String {
        let ok = Color::Green.paint("✓");
        let failed = Color::Red.paint("✗");
        let mut out = String::from("Databases:\n");

        let current_db = self.agent.current_database().map(str::to_string);
        for db in self.agent.databases() {
            let marker = if current_db.as_deref() == Some(db.as_str()) { " (current)" } else { "" };
            let line = match self.agent.run_sql("SELECT 1 AS test", Some(&db)).await {
                Ok(result) if !result.is_empty() => format!("  {ok} {db}{marker} - Connected"),
                Ok(_) => format!("  {failed} {db}{marker} - No response"),
                Err(e) => format!("  {failed} {db}{marker} - {}", clip(&e.user_message(), STATUS_WIDTH)),
            };
            out.push_str(&line);
            out.push('\n');
        }

        out.push_str(&format!("\nLLM providers (prompt: \"{PING_PROMPT}\"):\n"));
        let current_llm = self.agent.current_provider().map(str::to_string);
        for llm in self.agent.providers() {
            let marker = if current_llm.as_deref() == Some(llm.as_str()) { " (current)" } else { "" };
            if let Err(e) = self.agent.switch_provider(&llm) {
                out.push_str(&format!("  {failed} {llm}{marker} - {}\n", e.user_message()));
                continue;
            }
            // An empty schema keeps the ping from training the current database
            let context = GenerationContext {
                schema: Some(String::new()),
                ..GenerationContext::default()
            };
            let line = match self.agent.generate(PING_PROMPT, context).await {
                Ok(response) if !response.text.trim().is_empty() => {
                    format!("  {ok} {llm}{marker} - \"{}\"", clip(&response.text, 40))
                }
                Ok(_) => format!("  {failed} {llm}{marker} - No response"),
                Err(e) => format!("  {failed} {llm}{marker} - {}", clip(&e.user_message(), STATUS_WIDTH)),
            };
            out.push_str(&line);
            out.push('\n');
        }
        if let Some(name) = current_llm {
            if let Err(e) = self.agent.switch_provider(&name) {
                warn!("[Session::test_connectivity] Could not restore '{}': {}", name, e);
            }
        }
        out
    }

    pub async fn handle(&mut self, command: ReplCommand) -> AiResult<Reply> {
        let text = match command {
            ReplCommand::Quit => return Ok(Reply::Quit),
            ReplCommand::Help => HELP_TEXT.to_string(),
            ReplCommand::Use(name) => {
                self.agent.switch_database(&name)?;
                format!("Using database '{name}'")
            }
            ReplCommand::Llm(name) => {
                self.agent.switch_provider(&name)?;
                format!("Using LLM provider '{name}'")
            }
            ReplCommand::Databases => {
                format_name_list(&self.agent.databases(), self.agent.current_database())
            }
            ReplCommand::Providers => {
                format_name_list(&self.agent.providers(), self.agent.current_provider())
            }
            ReplCommand::Mode(mode) => {
                self.mode = mode;
                format!("Mode: {mode}")
            }
            ReplCommand::AskWith(mode, request) => {
                self.mode = mode;
                return self.ask(&request).await;
            }
            ReplCommand::Format(output) => {
                self.format = output;
                format!("Result format: {output}")
            }
            ReplCommand::Test => self.test_connectivity().await,
            ReplCommand::ToggleExecute => {
                self.auto_execute = !self.auto_execute;
                format!("Auto-execute {}", Self::on_off(self.auto_execute))
            }
            ReplCommand::ToggleClipboard => {
                self.clipboard = !self.clipboard;
                format!("Clipboard copy {}", Self::on_off(self.clipboard))
            }
            ReplCommand::Run(sql) => self.execute(&sql, self.format, &sql).await?,
            ReplCommand::Schema => {
                let schema = self.agent.get_schema(None, false).await?;
                if schema.is_empty() {
                    "(no schema)".to_string()
                } else {
                    self.highlighter.paint(schema.trim_start())
                }
            }
            ReplCommand::Tables => {
                format_name_list(&self.agent.list_tables(None).await?, None)
            }
            ReplCommand::Train => {
                let stats = self.agent.train_schema(None).await?;
                format!(
                    "Trained '{}': {} tables, {} chars",
                    stats.database, stats.tables, stats.schema_size
                )
            }
            ReplCommand::Refresh => {
                let stats = self.agent.refresh_schema(None).await?;
                format!(
                    "Refreshed '{}': {} tables, {} chars",
                    stats.database, stats.tables, stats.schema_size
                )
            }
            ReplCommand::Status => format_training_status(&self.agent.training_status()),
            ReplCommand::Ask(request) => return self.ask(&request).await,
        };
        Ok(Reply::Text(text))
    }

    async fn ask(&mut self, request: &str) -> AiResult<Reply> {
        if request.is_empty() {
            return Ok(Reply::Text(String::new()));
        }
        let sql = self.agent.generate_sql(request, self.mode).await?;
        let mut text = self.highlighter.paint(&sql);

        if self.clipboard && copy_to_clipboard(&sql) {
            text.push_str(&format!("\n{}", Style::new().dimmed().paint("(copied)")));
        }
        if self.agent.is_destructive(&sql) {
            text.push_str(&format!(
                "\n{}",
                Color::Yellow.paint("This statement modifies data or schema.")
            ));
        }
        let requested = requested_format(request);
        if self.auto_execute || requested.is_some() {
            let output = self
                .execute(&sql, requested.unwrap_or(self.format), request)
                .await?;
            text.push('\n');
            text.push_str(&output);
        }
        Ok(Reply::Text(text))
    }
}

/// Completes `@` commands, and names after `@use` / `@llm` / `@format`
pub struct CommandCompleter {
    databases: Vec<String>,
    providers: Vec<String>,
}

impl CommandCompleter {
    pub fn new(databases: Vec<String>, providers: Vec<String>) -> Self {
        Self {
            databases,
            providers,
        }
    }

    fn suggestion(value: &str, description: &str, start: usize, end: usize) -> Suggestion {
        Suggestion {
            value: value.to_string(),
            description: Some(description.to_string()),
            span: Span { start, end },
            append_whitespace: true,
            ..Suggestion::default()
        }
    }
}

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        let before = &line[..pos.min(line.len())];
        if !before.starts_with('@') {
            return Vec::new();
        }

        let Some((command, partial)) = before.split_once(' ') else {
            return COMMANDS
                .iter()
                .filter(|(name, _)| name.starts_with(before))
                .map(|(name, description)| Self::suggestion(name, description, 0, pos))
                .collect();
        };

        let (names, description) = match command {
            "@use" => (self.databases.clone(), "Database"),
            "@llm" => (self.providers.clone(), "LLM provider"),
            "@format" => (OutputFormat::iter().map(|f| f.to_string()).collect(), "Result format"),
            _ => return Vec::new(),
        };
        let partial = partial.trim_start();
        let start = pos - partial.len();
        names
            .iter()
            .filter(|name| name.starts_with(partial))
            .map(|name| Self::suggestion(name, description, start, pos))
            .collect()
    }
}

fn line_editor(session: &Session, history_path: Option<PathBuf>) -> Reedline {
    let completion_menu = Box::new(
        ColumnarMenu::default()
            .with_name("completion_menu")
            .with_text_style(Style::new().fg(Color::Green)),
    );

    let mut keybindings = default_emacs_keybindings();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::UntilFound(vec![
            ReedlineEvent::Menu("completion_menu".to_string()),
            ReedlineEvent::MenuNext,
        ]),
    );

    let hinter =
        Box::new(DefaultHinter::default().with_style(Style::new().italic().fg(Color::LightGray)));
    let completer = Box::new(CommandCompleter::new(
        session.agent.databases(),
        session.agent.providers(),
    ));

    let mut editor = Reedline::create()
        .with_completer(completer)
        .with_menu(ReedlineMenu::EngineCompleter(completion_menu))
        .with_edit_mode(Box::new(Emacs::new(keybindings)))
        .with_hinter(hinter)
        .with_highlighter(Box::new(SqlHighlighter::new()));

    if let Some(path) = history_path {
        match FileBackedHistory::with_file(1000, path) {
            Ok(history) => editor = editor.with_history(Box::new(history)),
            Err(e) => warn!("Could not open history file: {}", e),
        }
    }
    editor
}

/// Read-eval-print until `@quit` or Ctrl-D
pub async fn run(session: &mut Session, history_path: Option<PathBuf>) -> std::io::Result<()> {
    let mut editor = line_editor(session, history_path);
    println!("Type @help for help");

    loop {
        let prompt = session.prompt();
        match editor.read_line(&prompt)? {
            Signal::Success(input) => {
                if input.trim().is_empty() {
                    continue;
                }
                let command = match parse_command(&input) {
                    Ok(command) => command,
                    Err(message) => {
                        eprintln!("{message}");
                        continue;
                    }
                };
                match session.handle(command).await {
                    Ok(Reply::Quit) => break,
                    Ok(Reply::Text(text)) if text.is_empty() => {}
                    Ok(Reply::Text(text)) => println!("{}", text.trim_end()),
                    Err(e) => eprintln!("{}", Color::Red.paint(render_error(&e))),
                }
            }
            Signal::CtrlC => continue,
            Signal::CtrlD => break,
        }
    }
    println!("Goodbye!");
    Ok(())
}

pub fn render_error(error: &AiError) -> String {
    format!("Error: {}", error.user_message())
}
