//! Error module
use std::fmt;
use thiserror::Error;

/// The result of a compilation step.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for everything that can go wrong while turning an
/// expression tree into SQL. All variants are compile-time findings: they are
/// raised at the point of detection during the single traversal pass and
/// abort the whole compilation.
#[derive(Debug, Error)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// A more specific error type for matching.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub(crate) fn unsupported(detail: impl Into<String>) -> Self {
        ErrorKind::UnsupportedOperator(detail.into()).into()
    }

    pub(crate) fn syntax(detail: impl Into<String>) -> Self {
        ErrorKind::SyntaxViolation(detail.into()).into()
    }

    pub(crate) fn type_access(detail: impl Into<String>) -> Self {
        ErrorKind::TypeAccessInvalid(detail.into()).into()
    }

    pub(crate) fn range(detail: impl Into<String>) -> Self {
        ErrorKind::RangeViolation(detail.into()).into()
    }

    pub(crate) fn no_queryable_fields(detail: impl Into<String>) -> Self {
        ErrorKind::NoQueryableFields(detail.into()).into()
    }

    pub(crate) fn unknown_entity(entity: impl Into<String>) -> Self {
        ErrorKind::UnknownEntity(entity.into()).into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    /// An operator or member combination the compiler has no translation
    /// for, and no custom handler was registered.
    #[error("Unsupported operator or member: {0}")]
    UnsupportedOperator(String),

    /// A structurally illegal composition, e.g. a projection that is not the
    /// last shape operator in the chain.
    #[error("Invalid query composition: {0}")]
    SyntaxViolation(String),

    /// A type was used in a position its shape does not allow.
    #[error("Invalid type access: {0}")]
    TypeAccessInvalid(String),

    /// A pagination argument is out of range or contradicts an earlier,
    /// narrower bound.
    #[error("Argument out of range: {0}")]
    RangeViolation(String),

    /// A cast or projection narrowed the usable field set down to nothing.
    #[error("No queryable fields: {0}")]
    NoQueryableFields(String),

    /// The schema resolver has no table registered for an entity reachable
    /// from the expression tree.
    #[error("No schema registered for entity '{0}'")]
    UnknownEntity(String),
}
