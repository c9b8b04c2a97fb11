/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building a [`crate::Graph`].
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("duplicate node name: {0}")]
    DuplicateNode(&'static str),
    #[error("unknown step: {0}")]
    UnknownStep(&'static str),
    #[error("graph missing start step")]
    MissingStart,
}

/// Error type for the whole crate, with variants designed around what the
/// caller can do about them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad input or node logic error. Don't retry, fix the code.
    #[error("invalid: {0}")]
    Invalid(String),
    /// Transient failure (network, rate limit). Retrying might help.
    #[error("transient: {0}")]
    Transient(String),
    /// No persisted or freshly created session has this id.
    #[error("session not found: {0}")]
    SessionNotFound(String),
    /// The session is paused before a tool call and needs a yes/no first.
    #[error("session {0} is waiting for tool approval")]
    AwaitingApproval(String),
    /// The chat model failed to produce a turn.
    #[error("model: {0}")]
    Model(String),
    /// A tool could not be run.
    #[error("tool: {0}")]
    Tool(String),
    /// Persisted state could not be read or written.
    #[error("store: {0}")]
    Store(String),
    /// Missing or inconsistent configuration. Raised at startup.
    #[error("config: {0}")]
    Config(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Everything else. Inspect the message for details.
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::Invalid(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Error::Transient(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Error::Model(msg.into())
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        Error::Transient(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Other(e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Invalid(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- constructors ---

    #[test]
    fn invalid_constructor() {
        let err = Error::invalid("bad input");
        assert!(matches!(err, Error::Invalid(msg) if msg == "bad input"));
    }

    #[test]
    fn transient_constructor() {
        let err = Error::transient("timeout");
        assert!(matches!(err, Error::Transient(msg) if msg == "timeout"));
    }

    // --- Display ---

    #[test]
    fn display_session_not_found() {
        let err = Error::SessionNotFound("abc".into());
        assert_eq!(err.to_string(), "session not found: abc");
    }

    #[test]
    fn display_other_is_bare() {
        assert_eq!(Error::other("something").to_string(), "something");
    }

    #[test]
    fn display_graph_error_is_transparent() {
        let err: Error = GraphError::UnknownStep("tools").into();
        assert_eq!(err.to_string(), "unknown step: tools");
    }

    // --- From conversions ---

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Other(msg) if msg.contains("file missing")));
    }

    #[test]
    fn from_json_error_is_invalid() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Invalid(_)));
    }
}
