//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid relationship type: {0}")]
    InvalidType(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] neo4rs::Error),
}

impl GraphError {
    /// Shorthand for [`GraphError::NotFound`] with a described subject,
    /// e.g. `GraphError::not_found("session 'abc'")`.
    pub fn not_found(what: impl Into<String>) -> Self {
        GraphError::NotFound { what: what.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn not_found_display() {
        let e = GraphError::not_found("session 'abc'");
        assert_eq!(e.to_string(), "session 'abc' not found");
        assert!(e.is_not_found());
    }

    #[test]
    fn invalid_argument_display() {
        let e = GraphError::InvalidArgument("session id must not be empty".into());
        assert!(e.to_string().contains("must not be empty"));
        assert!(!e.is_not_found());
    }

    #[test]
    fn invalid_type_display() {
        let e = GraphError::InvalidType("ADMIN".into());
        assert!(e.to_string().contains("ADMIN"));
    }

    #[test]
    fn config_error_display() {
        let e = GraphError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
        // satisfies std::error::Error trait
        let _: &dyn Error = &e;
    }
}
