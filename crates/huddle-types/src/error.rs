use thiserror::Error;

/// Errors from repository operations (used by the persistence port in huddle-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,
}

/// Errors raised while validating a participant identity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity must not be empty")]
    Empty,
}

/// Errors raised while decoding a pipeline envelope from its JSON form.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The `type` tag names no known envelope variant.
    #[error("unknown event variant '{0}'")]
    UnknownVariant(String),

    /// The payload has no `type` tag at all.
    #[error("event is missing its type tag")]
    MissingTag,

    /// The tag is known but the fields do not match it.
    #[error("malformed event: {0}")]
    Malformed(String),
}

/// Errors raised while parsing an inbound client frame.
#[derive(Debug, Error)]
pub enum ClientFrameError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unsupported frame type '{0}'")]
    UnknownType(String),
}
