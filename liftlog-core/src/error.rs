use thiserror::Error as ThisError;

/// Failure categories the assistant distinguishes when turning an error into
/// something the user sees.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum LiftlogError {
    #[error("You do not have permission to use the assistant")]
    Unauthorized,

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("error: {0}")]
    Common(String),
}

impl From<anyhow::Error> for LiftlogError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<LiftlogError>() {
            Ok(err) => err,
            Err(e) => LiftlogError::Common(format!("{:#}", e)),
        }
    }
}

impl From<String> for LiftlogError {
    fn from(s: String) -> Self {
        LiftlogError::Common(s)
    }
}

impl From<&str> for LiftlogError {
    fn from(s: &str) -> Self {
        LiftlogError::Common(s.to_string())
    }
}

impl LiftlogError {
    pub fn with_display<D: std::fmt::Display>(d: D) -> Self {
        LiftlogError::Common(d.to_string())
    }

    pub fn invalid_arguments(tool: &str, reason: impl Into<String>) -> Self {
        LiftlogError::InvalidArguments {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anyhow_round_trip_keeps_the_variant() {
        let err: anyhow::Error = LiftlogError::UnknownTool("rsc_demo".into()).into();
        match LiftlogError::from(err) {
            LiftlogError::UnknownTool(name) => assert_eq!(name, "rsc_demo"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn plain_anyhow_errors_become_common() {
        let err = anyhow::anyhow!("database is locked");
        assert!(matches!(LiftlogError::from(err), LiftlogError::Common(m) if m == "database is locked"));
    }
}
