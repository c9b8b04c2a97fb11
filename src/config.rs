//! Command-line arguments and the validated configuration built from them.
//!
//! Every setting can also come from a `CHAT_LINE_*` environment variable.
//! Secrets are read once here and handed to the components that need them;
//! nothing writes to the process environment.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error::{Error, Result};
use crate::model::{ChatModel, EchoModel, HttpModel, HttpModelConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelKind {
    /// Offline: repeat the user's words back.
    Echo,
    /// POST the conversation to `--endpoint`.
    Http,
}

/// chat-line: chat with a tool-using agent; conversations persist between runs.
#[derive(Parser, Debug)]
#[command(name = "chat-line", version, about)]
pub struct Args {
    /// SQLite file holding saved conversations.
    #[arg(long, env = "CHAT_LINE_DB", default_value = "chat_history.sqlite")]
    pub db: PathBuf,

    /// Which model answers.
    #[arg(long, value_enum, env = "CHAT_LINE_MODEL", default_value = "echo")]
    pub model: ModelKind,

    /// Model endpoint URL (required with `--model http`).
    #[arg(long, env = "CHAT_LINE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Bearer token for the endpoint (required with `--model http`).
    #[arg(long, env = "CHAT_LINE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model name forwarded to the endpoint.
    #[arg(long, env = "CHAT_LINE_MODEL_NAME")]
    pub model_name: Option<String>,

    /// Timeout for model and tool HTTP calls, in seconds.
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,

    /// Most graph steps one message may take.
    #[arg(long, default_value_t = 25)]
    pub max_steps: usize,

    /// Ask before running any tool.
    #[arg(long)]
    pub approve_tools: bool,

    /// Directory the file tools read from and write to.
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Log filter, e.g. `debug` or `chat_line=trace` (RUST_LOG wins).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ModelConfig {
    Echo,
    Http(HttpModelConfig),
}

/// Settings for one run, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub model: ModelConfig,
    pub http_timeout: Duration,
    pub max_steps: usize,
    pub approve_tools: bool,
    pub workdir: PathBuf,
}

fn required(value: Option<String>, what: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::config(format!("--model http needs {what}"))),
    }
}

impl TryFrom<Args> for Config {
    type Error = Error;

    fn try_from(args: Args) -> Result<Self> {
        if args.max_steps == 0 {
            return Err(Error::config("--max-steps must be at least 1"));
        }
        if args.timeout_secs == 0 {
            return Err(Error::config("--timeout-secs must be at least 1"));
        }
        let http_timeout = Duration::from_secs(args.timeout_secs);

        let model = match args.model {
            ModelKind::Echo => ModelConfig::Echo,
            ModelKind::Http => ModelConfig::Http(HttpModelConfig {
                endpoint: required(args.endpoint, "--endpoint (or CHAT_LINE_ENDPOINT)")?,
                api_key: required(args.api_key, "--api-key (or CHAT_LINE_API_KEY)")?,
                model: args.model_name,
                timeout: http_timeout,
            }),
        };

        Ok(Self {
            db_path: args.db,
            model,
            http_timeout,
            max_steps: args.max_steps,
            approve_tools: args.approve_tools,
            workdir: args.workdir,
        })
    }
}

impl Config {
    pub fn chat_model(&self) -> Result<Arc<dyn ChatModel>> {
        Ok(match &self.model {
            ModelConfig::Echo => Arc::new(EchoModel::new()),
            ModelConfig::Http(http) => Arc::new(HttpModel::new(http.clone())?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        let mut full = vec!["chat-line"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn defaults_to_offline_echo() {
        let config = Config::try_from(parse(&[])).unwrap();
        assert!(matches!(config.model, ModelConfig::Echo));
        assert_eq!(config.db_path, PathBuf::from("chat_history.sqlite"));
        assert_eq!(config.max_steps, 25);
        assert!(!config.approve_tools);
        assert!(config.chat_model().is_ok());
    }

    #[test]
    fn http_without_key_fails_fast() {
        let args = Args {
            api_key: None,
            ..parse(&["--model", "http", "--endpoint", "http://localhost:9/chat"])
        };
        let err = Config::try_from(args).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("--api-key")));
    }

    #[test]
    fn http_without_endpoint_fails_fast() {
        let args = Args {
            endpoint: None,
            api_key: Some("k".into()),
            ..parse(&["--model", "http"])
        };
        assert!(matches!(Config::try_from(args), Err(Error::Config(_))));
    }

    #[test]
    fn http_with_everything_builds_a_model() {
        let args = parse(&[
            "--model",
            "http",
            "--endpoint",
            "http://localhost:9/chat",
            "--api-key",
            "secret",
            "--model-name",
            "small",
            "--approve-tools",
        ]);
        let config = Config::try_from(args).unwrap();
        match &config.model {
            ModelConfig::Http(http) => {
                assert_eq!(http.api_key, "secret");
                assert_eq!(http.model.as_deref(), Some("small"));
            }
            other => panic!("unexpected model config: {other:?}"),
        }
        assert!(config.approve_tools);
        assert!(config.chat_model().is_ok());
    }

    #[test]
    fn zero_max_steps_rejected() {
        let err = Config::try_from(parse(&["--max-steps", "0"])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unknown_model_kind_is_a_parse_error() {
        assert!(Args::try_parse_from(["chat-line", "--model", "gpt"]).is_err());
    }
}
