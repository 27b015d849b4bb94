// Copyright 2024 DictCol Project Authors. Licensed under Apache-2.0.

use std::backtrace::Backtrace;

use thiserror::Error;

/// Errors surfaced while decoding or accessing a column.
///
/// Parsing errors are returned to the caller unrecovered: a malformed column
/// invalidates the enclosing segment, and there are no retries at this layer.
#[derive(Error, Debug)]
pub enum ColumnError {
    #[error("corrupt column: {0}")]
    Corrupt(String),
    #[error("{accessor} called on a {arity} column")]
    InvalidArity {
        accessor: &'static str,
        arity: &'static str,
    },
    #[error("{component} rejected bytes: {message}")]
    Collaborator {
        component: &'static str,
        message: String,
    },
}

/// [`ColumnError`] with backtrace.
pub struct TracedColumnError {
    source: ColumnError,
    backtrace: Backtrace,
}

impl std::fmt::Display for TracedColumnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}\n{}", self.source, self.backtrace)
    }
}

impl std::fmt::Debug for TracedColumnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl std::error::Error for TracedColumnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl From<ColumnError> for TracedColumnError {
    fn from(source: ColumnError) -> Self {
        TracedColumnError {
            source,
            backtrace: Backtrace::capture(),
        }
    }
}

impl TracedColumnError {
    pub fn corrupt(message: impl ToString) -> Self {
        ColumnError::Corrupt(message.to_string()).into()
    }

    pub fn collaborator(component: &'static str, message: impl ToString) -> Self {
        ColumnError::Collaborator {
            component,
            message: message.to_string(),
        }
        .into()
    }

    pub fn kind(&self) -> &ColumnError {
        &self.source
    }
}

pub type ColumnResult<T> = std::result::Result<T, TracedColumnError>;
