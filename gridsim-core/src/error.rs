//! Error handling for this crate
use thiserror::Error;

/// A Result containing a [SystemError] with its accompanying source
pub type TypedResult<T> = Result<T, TypedError>;

/// The error taxonomy shared by every gridsim component.
///
/// Matches the kinds enumerated by the toolkit's error-handling design:
/// invalid arguments are synchronous and local, capacity/not-found errors
/// flow back to callers as typed results, unsupported policy operations are
/// logged and swallowed, and a lost control-plane packet is fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("requested capacity could not be satisfied")]
    CapacityExhausted,
    #[error("job, reservation or file not found")]
    NotFound,
    #[error("operation not supported by this policy")]
    PolicyUnsupported,
    #[error("a control-plane packet could not be rescued from drop")]
    ControlPlaneLost,
}

/// Distinguishes errors that merely fail one request from errors that mean
/// the simulation can no longer continue meaningfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    /// Local to one request; the caller (user, job, reservation) is notified.
    Request,
    /// The whole simulation must be aborted (e.g. [SystemError::ControlPlaneLost]).
    Fatal,
}

impl SystemError {
    /// The severity this kind of error is raised at by default.
    pub fn level(self) -> ErrorLevel {
        match self {
            SystemError::ControlPlaneLost => ErrorLevel::Fatal,
            _ => ErrorLevel::Request,
        }
    }
}

/// Combination of a [SystemError] with the underlying `anyhow` cause.
#[derive(Error, Debug)]
#[error("{err}: {source:?}")]
pub struct TypedError {
    err: SystemError,
    source: anyhow::Error,
}

impl TypedError {
    /// Creates a new [TypedError].
    pub fn new(err: SystemError, source: anyhow::Error) -> Self {
        Self { err, source }
    }

    /// Returns the [SystemError] of this [TypedError].
    pub fn err(&self) -> SystemError {
        self.err
    }

    /// Returns the severity level of this error.
    pub fn level(&self) -> ErrorLevel {
        self.err.level()
    }

    /// Returns the underlying `anyhow` cause.
    pub fn source(&self) -> &anyhow::Error {
        &self.source
    }
}

/// Converts a plain [Result] into one of our own [TypedResult]s.
pub trait ResultExt<T> {
    /// Tags the error case with a [SystemError] kind.
    fn typ(self, err: SystemError) -> TypedResult<T>;
}

impl<T, E: Into<anyhow::Error>> ResultExt<T> for Result<T, E> {
    fn typ(self, err: SystemError) -> TypedResult<T> {
        self.map_err(|e| TypedError {
            err,
            source: e.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn control_plane_lost_is_fatal() {
        let e = TypedError::new(SystemError::ControlPlaneLost, anyhow!("whitelist rescue failed"));
        assert_eq!(e.level(), ErrorLevel::Fatal);
    }

    #[test]
    fn not_found_is_request_level() {
        let e = TypedError::new(SystemError::NotFound, anyhow!("no such job"));
        assert_eq!(e.level(), ErrorLevel::Request);
    }

    #[test]
    fn result_ext_wraps_error() {
        let r: Result<(), anyhow::Error> = Err(anyhow!("boom"));
        let typed = r.typ(SystemError::InvalidArgument);
        assert_eq!(typed.unwrap_err().err(), SystemError::InvalidArgument);
    }
}
