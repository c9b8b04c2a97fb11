use std::time::Duration;

use serde_json::json;
use ureq::Agent;

use super::{Tool, str_arg};
use crate::error::{Error, Result};
use crate::model::ToolSpec;

/// Longest body handed back to the model, in characters.
const MAX_BODY_CHARS: usize = 8_000;

/// Send a GET request and return the response body as a string.
pub fn http_get(url: &str, timeout: Duration) -> Result<String> {
    let config = Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();

    let agent: Agent = config.into();

    let body: String = agent
        .get(url)
        .header("User-Agent", concat!("chat-line/", env!("CARGO_PKG_VERSION")))
        .call()?
        .body_mut()
        .read_to_string()?;

    Ok(body)
}

/// `fetch_url`: look something up on the web.
pub struct FetchUrl {
    timeout: Duration,
}

impl FetchUrl {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Tool for FetchUrl {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "fetch_url".into(),
            description: "Fetch a web page over HTTP(S) when you need recent events, people \
                          or facts you do not know."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Absolute http(s) URL"}
                },
                "required": ["url"]
            }),
        }
    }

    fn call(&self, args: &serde_json::Value) -> Result<String> {
        let url = str_arg(args, "url")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::invalid(format!("not an http(s) URL: {url}")));
        }
        tracing::info!(url, "fetching");
        let body = http_get(url, self.timeout)?;
        Ok(truncate(body, MAX_BODY_CHARS))
    }
}

fn truncate(mut text: String, max_chars: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(idx);
        text.push_str("\n[truncated]");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_get_bad_url_returns_error() {
        let result = http_get("http://localhost:1/nope", Duration::from_secs(1));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_non_http_urls() {
        let tool = FetchUrl::new(Duration::from_secs(1));
        let err = tool.call(&json!({"url": "file:///etc/passwd"})).unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }

    #[test]
    fn requires_url_argument() {
        let tool = FetchUrl::new(Duration::from_secs(1));
        assert!(tool.call(&json!({})).is_err());
    }

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate("héllo".into(), 10), "héllo");
        assert_eq!(truncate("héllo".into(), 2), "hé\n[truncated]");
    }
}
