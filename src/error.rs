//! Error module
use std::fmt;

use thiserror::Error;

use crate::driver::DriverError;

#[derive(Debug, Error)]
/// The error type for adapted driver operations.
///
/// Keeps the driver's own diagnostics intact through the callback to future
/// conversion: the driver-reported `code`, `errno` and `sqlState`, and the
/// SQL text of the statement that failed.
pub struct Error {
    kind: ErrorKind,
    code: Option<String>,
    errno: Option<u16>,
    sql_state: Option<String>,
    sql: Option<String>,
}

pub(crate) struct ErrorBuilder {
    kind: ErrorKind,
    code: Option<String>,
    errno: Option<u16>,
    sql_state: Option<String>,
    sql: Option<String>,
}

impl ErrorBuilder {
    pub(crate) fn set_code(&mut self, code: impl Into<String>) -> &mut Self {
        self.code = Some(code.into());
        self
    }

    pub(crate) fn set_errno(&mut self, errno: u16) -> &mut Self {
        self.errno = Some(errno);
        self
    }

    pub(crate) fn set_sql_state(&mut self, sql_state: impl Into<String>) -> &mut Self {
        self.sql_state = Some(sql_state.into());
        self
    }

    pub(crate) fn set_sql(&mut self, sql: impl Into<String>) -> &mut Self {
        self.sql = Some(sql.into());
        self
    }

    pub(crate) fn build(self) -> Error {
        Error {
            kind: self.kind,
            code: self.code,
            errno: self.errno,
            sql_state: self.sql_state,
            sql: self.sql,
        }
    }
}

impl Error {
    pub(crate) fn builder(kind: ErrorKind) -> ErrorBuilder {
        ErrorBuilder {
            kind,
            code: None,
            errno: None,
            sql_state: None,
            sql: None,
        }
    }

    /// The error code reported by the driver, if available.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// The MySQL error number reported by the driver, if available.
    pub fn errno(&self) -> Option<u16> {
        self.errno
    }

    /// The SQLSTATE reported by the driver, if available.
    pub fn sql_state(&self) -> Option<&str> {
        self.sql_state.as_deref()
    }

    /// The SQL text of the failed statement, if the error came from a query.
    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    /// A more specific error type for matching.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.kind.fmt(f)
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("Error raised by the driver: {}", message)]
    Driver { message: String },

    #[error("The driver dropped the `{}` completion callback without calling it", operation)]
    Incomplete { operation: &'static str },

    #[error("Error parsing connection string: {}", _0)]
    DatabaseUrlIsInvalid(String),

    #[error("The provided connection arguments are not supported: {}", message)]
    InvalidConnectionArguments { message: String },
}

impl From<Error> for ErrorKind {
    fn from(e: Error) -> Self {
        e.kind
    }
}

impl From<DriverError> for Error {
    fn from(e: DriverError) -> Self {
        let DriverError {
            message,
            code,
            errno,
            sql_state,
        } = e;

        let mut builder = Error::builder(ErrorKind::Driver { message });

        if let Some(code) = code {
            builder.set_code(code);
        }

        if let Some(errno) = errno {
            builder.set_errno(errno);
        }

        if let Some(sql_state) = sql_state {
            builder.set_sql_state(sql_state);
        }

        builder.build()
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Error {
        let kind = ErrorKind::DatabaseUrlIsInvalid(e.to_string());
        Error::builder(kind).build()
    }
}

/// Call-site context for an operation handed to the driver.
///
/// Created when the adapted method is invoked, before the operation
/// suspends, so a failure points at the caller's statement rather than at
/// driver internals. For queries it carries the effective SQL text.
#[derive(Debug)]
pub(crate) struct ErrorContext {
    operation: &'static str,
    sql: Option<String>,
}

impl ErrorContext {
    pub(crate) fn new(operation: &'static str) -> Self {
        Self { operation, sql: None }
    }

    pub(crate) fn query(operation: &'static str, sql: impl Into<String>) -> Self {
        Self {
            operation,
            sql: Some(sql.into()),
        }
    }

    /// The error for a failure the driver reported, carrying the driver's
    /// fields and the SQL text captured at the call site.
    pub(crate) fn populate(self, error: DriverError) -> Error {
        let mut error = Error::from(error);
        error.sql = self.sql;
        error
    }

    /// The error for a completion callback the driver dropped unused.
    pub(crate) fn incomplete(self) -> Error {
        let mut builder = Error::builder(ErrorKind::Incomplete {
            operation: self.operation,
        });

        if let Some(sql) = self.sql {
            builder.set_sql(sql);
        }

        builder.build()
    }
}
