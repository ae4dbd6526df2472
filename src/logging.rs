use crate::config::LoggingConfig;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins; otherwise the configured level, raised to `debug` for
/// this crate when `verbose` is set.
pub fn filter_directive(config: &LoggingConfig, verbose: bool, rust_log: Option<&str>) -> String {
    match rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directive) => directive.to_string(),
        None if verbose => format!("{},daibai=debug", config.level),
        None => config.level.to_string(),
    }
}

/// Install the global subscriber. Keep the returned guard alive until exit
/// so buffered file output gets flushed.
pub fn init(config: &LoggingConfig, verbose: bool) -> Option<WorkerGuard> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(config, verbose, rust_log.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    let console = (config.console_output || verbose)
        .then(|| fmt::layer().compact().with_target(false).with_writer(io::stderr));

    let mut guard = None;
    let file = if config.file_output {
        let path = Path::new(&config.file_path);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "daibai.log".into());
        match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(dir, file_name);
                let (writer, worker) = tracing_appender::non_blocking(appender);
                guard = Some(worker);
                Some(fmt::layer().with_ansi(false).with_writer(writer))
            }
            Err(e) => {
                eprintln!("Could not create log directory {}: {}", dir.display(), e);
                None
            }
        }
    } else {
        None
    };

    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init();
    guard
}
