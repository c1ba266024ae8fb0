//! Error taxonomy for command handling
//!
//! Every variant here ends its life as a `{"success": false, "error": "..."}`
//! response payload. Nothing escapes the dispatch boundary to crash the
//! accept loop or the embedding host.

use thiserror::Error;

/// Failure modes of decoding and dispatching one command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Request bytes are not valid JSON, not a JSON object, or a known
    /// command is missing a required field.
    #[error("{0}")]
    Malformed(String),

    /// Token gate failed. No handler runs, no side effects occur.
    #[error("unauthorized")]
    Unauthorized,

    /// The `type` field named no known command.
    #[error("unknown command: '{0}'")]
    UnknownCommand(String),

    /// Named object, text block, or script does not exist in the host.
    #[error("{0}")]
    NotFound(String),

    /// Operator id is not `namespace.id`, or the host has no such operator.
    #[error("{0}")]
    InvalidOperator(String),

    /// Any other fault raised while a handler was executing, including
    /// faults from host-side script execution.
    #[error("{0}")]
    Handler(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(CommandError::Unauthorized.to_string(), "unauthorized");
        assert_eq!(
            CommandError::UnknownCommand("frobnicate".to_string()).to_string(),
            "unknown command: 'frobnicate'"
        );
        assert_eq!(
            CommandError::NotFound("object not found".to_string()).to_string(),
            "object not found"
        );
        assert_eq!(
            CommandError::InvalidOperator("invalid operator id".to_string()).to_string(),
            "invalid operator id"
        );
    }
}
