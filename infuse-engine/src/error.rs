//! Everything that can go wrong while loading rules or checking a
//! change stream.  Setup errors (the first group) abort a run before
//! any change is processed; the others are scoped to a single change
//! and name enough of the rule / pattern / context triple to track
//! down the upstream generator bug.
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("duplicate rule `{0}`")]
    DuplicateRule(String),

    #[error("duplicate pattern `{0}`")]
    DuplicatePattern(String),

    #[error("rule `{rule}`: variable `{var}` is not bound to any pattern")]
    UnboundVariable { rule: String, var: String },

    #[error("rule `{rule}`: variable `{var}` is bound twice on the same path")]
    ShadowedVariable { rule: String, var: String },

    #[error("rule `{rule}`: quantifier over unregistered pattern `{pattern}`")]
    UnregisteredPattern { rule: String, pattern: String },

    #[error("rule `{rule}`: behavior function `{function}` is not provided")]
    UnresolvedFunction { rule: String, function: String },

    #[error("malformed formula: {0}")]
    MalformedFormula(&'static str),

    #[error("unknown approach `{0}`")]
    UnknownApproach(String),

    #[error("unknown rule `{0}`")]
    UnknownRule(String),

    #[error("change targets unknown pattern `{pattern}`")]
    UnknownPattern { pattern: String },

    #[error("rule `{rule}`: context `{context}` is not live in pattern `{pattern}`")]
    MissingContext {
        rule: String,
        pattern: String,
        context: String,
    },

    #[error("rule `{rule}`: context `{context}` is already live in pattern `{pattern}`")]
    DuplicateContext {
        rule: String,
        pattern: String,
        context: String,
    },

    #[error("context `{context}` does not fit pattern `{pattern}`: undeclared field `{field}`")]
    SchemaMismatch {
        pattern: String,
        context: String,
        field: String,
    },

    #[error("behavior function `{function}` failed: {reason}")]
    Function { function: String, reason: String },
}

impl Error {
    /// Returns true for errors that can only arise while loading rules
    /// and patterns.
    #[must_use]
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Error::DuplicateRule(_)
                | Error::DuplicatePattern(_)
                | Error::UnboundVariable { .. }
                | Error::ShadowedVariable { .. }
                | Error::UnregisteredPattern { .. }
                | Error::UnresolvedFunction { .. }
                | Error::MalformedFormula(_)
                | Error::UnknownApproach(_)
        )
    }
}

#[test]
fn test_error_mentions_triple() {
    let err = Error::MissingContext {
        rule: "r1".into(),
        pattern: "loc".into(),
        context: "ctx_7".into(),
    };
    let rendered = err.to_string();

    assert!(rendered.contains("r1"));
    assert!(rendered.contains("loc"));
    assert!(rendered.contains("ctx_7"));
    assert!(!err.is_setup());
}

#[test]
fn test_setup_errors() {
    assert!(Error::DuplicateRule("r".into()).is_setup());
    assert!(Error::UnknownApproach("FOO+BAR".into()).is_setup());
    assert!(!Error::UnknownPattern {
        pattern: "p".into()
    }
    .is_setup());
}
