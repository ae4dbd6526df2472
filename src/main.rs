use clap::{CommandFactory, Parser};
use daibai::ai_sql::{Agent, AiError};
use daibai::cli::Args;
use daibai::config::{Config, Preferences};
use daibai::format::{
    format_name_list, format_query_result_as, format_query_result_json, format_training_status,
};
use daibai::highlighter::SqlHighlighter;
use daibai::llm::ProviderRegistry;
use daibai::logging;
use daibai::repl::{self, Confirm, Session};
use std::error::Error as StdError;
use std::io;
use std::process::ExitCode;
use tracing::{debug, warn};

fn select(agent: &mut Agent, args: &Args) -> Result<(), AiError> {
    if let Some(db) = &args.database {
        agent.switch_database(db)?;
    }
    if let Some(llm) = &args.llm {
        agent.switch_provider(llm)?;
    }
    Ok(())
}

/// `--train`, `--refresh`, `--status`, `--list` and `-q`
async fn one_shot(session: &Session, args: &Args) -> Result<(), AiError> {
    let agent = &session.agent;
    if args.list {
        println!("Databases:\n{}", format_name_list(&agent.databases(), agent.current_database()));
        println!("LLM providers:\n{}", format_name_list(&agent.providers(), agent.current_provider()));
    }
    if args.refresh {
        let stats = agent.refresh_schema(None).await?;
        println!("Refreshed '{}': {} tables, {} chars", stats.database, stats.tables, stats.schema_size);
    } else if args.train {
        let stats = agent.train_schema(None).await?;
        println!("Trained '{}': {} tables, {} chars", stats.database, stats.tables, stats.schema_size);
    }
    if args.status {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&agent.training_status()).unwrap_or_default());
        } else {
            print!("{}", format_training_status(&agent.training_status()));
        }
    }

    if let Some(request) = &args.query {
        let sql = agent.generate_sql(request, session.mode).await?;
        if args.json && !args.execute {
            println!("{}", serde_json::json!({ "sql": sql }));
        } else if !args.json {
            println!("{}", SqlHighlighter::new().paint(&sql));
        }
        if session.clipboard {
            repl::copy_to_clipboard(&sql);
        }
        if args.execute {
            match repl::run_statement(agent, &sql, &confirm(args.yes)).await? {
                Some(result) if args.json => println!("{}", format_query_result_json(&result)),
                Some(result) => print!("{}", format_query_result_as(&result, session.format)),
                None => eprintln!("Cancelled"),
            }
        }
    }
    Ok(())
}

fn confirm(assume_yes: bool) -> Confirm {
    if assume_yes {
        Box::new(|_: &str| true)
    } else {
        repl::confirm_with_inquire()
    }
}

async fn async_main(args: Args) -> Result<(), Box<dyn StdError>> {
    if let Some(shell) = args.completions {
        let mut cmd = Args::command();
        clap_complete::generate(clap_complete::Shell::from(shell), &mut cmd, "daibai", &mut io::stdout());
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;
    let _log_guard = logging::init(&config.logging, args.verbose);
    debug!("daibai {} started with config {:?}", env!("CARGO_PKG_VERSION"), config.source);

    if config.databases.is_empty() {
        warn!("No databases configured");
    }

    let preferences_path = Preferences::default_path().ok();
    let preferences = preferences_path
        .as_deref()
        .map(Preferences::load_from)
        .unwrap_or_default();

    let agent = Agent::new(&config, ProviderRegistry::builtin());
    let mut session = Session::new(agent, confirm(args.yes));
    session.clipboard = config.clipboard;
    session.json = args.json;
    session.exports_dir = config.exports_dir.clone();
    if !args.is_one_shot() {
        session.apply_preferences(&preferences);
    }
    select(&mut session.agent, &args)?;
    if let Some(mode) = args.mode {
        session.mode = mode;
    }
    if let Some(output) = args.format {
        session.format = output;
    }
    if args.execute {
        session.auto_execute = true;
    }

    if args.is_one_shot() {
        let result = one_shot(&session, &args).await;
        session.agent.close().await;
        return result.map_err(|e| e.user_message().into());
    }

    session.agent.auto_train_current().await;
    let history_path = Config::get_config_directory().ok().map(|dir| dir.join("history.txt"));
    if let Some(dir) = history_path.as_ref().and_then(|p| p.parent()) {
        let _ = std::fs::create_dir_all(dir);
    }
    let result = repl::run(&mut session, history_path).await;

    if let Some(path) = preferences_path {
        if let Err(e) = session.preferences().save_to(&path) {
            warn!("Could not save preferences: {}", e);
        }
    }
    session.agent.close().await;
    Ok(result?)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(async_main(args));
    runtime.shutdown_timeout(std::time::Duration::from_secs(2));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
