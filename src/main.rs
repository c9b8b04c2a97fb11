use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chat_line::{Args, Config, repl};

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(args.log_level.as_deref().unwrap_or("chat_line=warn")))
        .unwrap_or_else(|_| EnvFilter::new("chat_line=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::try_from(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("chat-line: {e}");
            return ExitCode::from(2);
        }
    };
    tracing::debug!(db = %config.db_path.display(), "starting");

    match repl::run_stdio(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            eprintln!("chat-line: {e}");
            ExitCode::FAILURE
        }
    }
}
