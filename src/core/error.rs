// Centralized error handling for the user directory

use std::fmt;
use thiserror::Error;

/// Classification of every failure the directory can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserErrorKind {
    NotFound,
    AlreadyExists,
    Internal,
    IncorrectPassword,
    InvalidArguments,
    SendEmailFailure,
    Unauthorized,
}

impl fmt::Display for UserErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UserErrorKind::NotFound => "not found",
            UserErrorKind::AlreadyExists => "already exists",
            UserErrorKind::Internal => "internal",
            UserErrorKind::IncorrectPassword => "incorrect password",
            UserErrorKind::InvalidArguments => "invalid arguments",
            UserErrorKind::SendEmailFailure => "send email failure",
            UserErrorKind::Unauthorized => "unauthorized",
        };
        f.write_str(name)
    }
}

/// Error returned by every `UserService` operation
///
/// Carries the kind the caller branches on and the underlying cause for
/// diagnostics. The cause is reachable through `std::error::Error::source`.
#[derive(Error, Debug)]
#[error("user error, {source}")]
pub struct UserError {
    kind: UserErrorKind,
    #[source]
    source: anyhow::Error,
}

impl UserError {
    pub fn new(kind: UserErrorKind, source: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    fn msg(kind: UserErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, anyhow::Error::msg(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::msg(UserErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::msg(UserErrorKind::AlreadyExists, message)
    }

    pub fn internal(source: impl Into<anyhow::Error>) -> Self {
        Self::new(UserErrorKind::Internal, source)
    }

    /// Generic "incorrect username or password" failure.
    pub fn incorrect_password() -> Self {
        Self::msg(UserErrorKind::IncorrectPassword, "incorrect username or password")
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::msg(UserErrorKind::InvalidArguments, message)
    }

    pub fn send_email(source: impl Into<anyhow::Error>) -> Self {
        Self::new(UserErrorKind::SendEmailFailure, source)
    }

    /// Generic authorization failure; never says which check failed.
    pub fn unauthorized() -> Self {
        Self::msg(UserErrorKind::Unauthorized, "unauthorized")
    }

    pub fn kind(&self) -> UserErrorKind {
        self.kind
    }

    pub fn cause(&self) -> &anyhow::Error {
        &self.source
    }

    /// Collaborator failures worth an error-level log line with the full chain
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self.kind,
            UserErrorKind::Internal | UserErrorKind::SendEmailFailure
        )
    }
}

/// Errors raised by user store backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("username already taken: {0}")]
    Duplicate(String),

    #[error("user not found: {0}")]
    NotFound(String),

    #[error("failed to persist change: {0:#}")]
    Persistence(anyhow::Error),
}

impl From<StoreError> for UserError {
    fn from(err: StoreError) -> Self {
        let kind = match &err {
            StoreError::Duplicate(_) => UserErrorKind::AlreadyExists,
            StoreError::NotFound(_) => UserErrorKind::NotFound,
            StoreError::Persistence(_) => UserErrorKind::Internal,
        };
        UserError::new(kind, err)
    }
}
