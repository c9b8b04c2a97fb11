use std::time::Duration;

use serde::{Deserialize, Serialize};
use ureq::Agent;

use super::{ChatModel, ToolSpec};
use crate::error::{Error, Result};
use crate::turn::{Role, Turn};

/// Where and how to reach a model relay.
#[derive(Debug, Clone)]
pub struct HttpModelConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: Option<String>,
    pub timeout: Duration,
}

/// Posts the history as JSON to an endpoint and reads back one turn.
///
/// Request body: `{"model": .., "messages": [turns], "tools": [specs]}` with a
/// bearer token. The reply is either a bare assistant turn or
/// `{"message": turn}`. Translating that to a particular vendor is the relay's
/// business.
pub struct HttpModel {
    agent: Agent,
    config: HttpModelConfig,
}

#[derive(Serialize)]
struct Request<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [Turn],
    tools: &'a [ToolSpec],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Reply {
    Wrapped { message: Turn },
    Bare(Turn),
}

impl HttpModel {
    pub fn new(config: HttpModelConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(Error::config("model endpoint is required"));
        }
        if config.api_key.trim().is_empty() {
            return Err(Error::config("model API key is required"));
        }

        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .build()
            .into();

        Ok(Self { agent, config })
    }
}

fn classify(e: ureq::Error) -> Error {
    match e {
        ureq::Error::StatusCode(code) if code == 429 || code >= 500 => {
            Error::transient(format!("model endpoint returned {code}"))
        }
        ureq::Error::StatusCode(code) => Error::model(format!("model endpoint returned {code}")),
        other => other.into(),
    }
}

impl ChatModel for HttpModel {
    fn invoke(&self, turns: &[Turn], tools: &[ToolSpec]) -> Result<Turn> {
        let body = Request {
            model: self.config.model.as_deref(),
            messages: turns,
            tools,
        };

        tracing::debug!(endpoint = %self.config.endpoint, turns = turns.len(), "invoking model");

        let text = self
            .agent
            .post(self.config.endpoint.as_str())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send_json(&body)
            .map_err(classify)?
            .body_mut()
            .read_to_string()
            .map_err(classify)?;

        let turn = match serde_json::from_str::<Reply>(&text) {
            Ok(Reply::Wrapped { message }) | Ok(Reply::Bare(message)) => message,
            Err(e) => return Err(Error::model(format!("unreadable reply: {e}"))),
        };

        if turn.role != Role::Assistant {
            return Err(Error::model(format!(
                "expected an assistant turn, got {}",
                turn.role
            )));
        }
        Ok(turn)
    }
}
