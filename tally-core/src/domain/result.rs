//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::money::Money;

/// Core library error type
///
/// Every variant belongs to exactly one [`ErrorKind`], which is what callers
/// use to decide between rejecting a request and asking the user to retry.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Owner {0} already has a wallet")]
    WalletExists(Uuid),

    #[error("Email is already registered")]
    EmailTaken,

    #[error("No wallet found for owner {0}")]
    WalletNotFound(Uuid),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Money, requested: Money },

    #[error("Database error: {0}")]
    Database(String),

    /// A concurrent unit of work changed the same wallet first
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Wallet stayed contended after {attempts} attempts")]
    Busy { attempts: u32 },

    /// The owner exists but their wallet could not be created.
    /// The caller decides whether to retry or compensate.
    #[error("Wallet provisioning failed for owner {owner_id}: {reason}")]
    WalletProvisioning { owner_id: Uuid, reason: String },

    #[error("Operation cancelled before commit")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or out-of-range input; nothing changed
    Validation,
    NotFound,
    /// Well-formed request refused by a balance rule; nothing changed
    BusinessRule,
    /// Store or environment failure, possibly transient
    Operational,
    /// A write spanning two entities landed only partially
    PartialFailure,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::BusinessRule => "business_rule",
            ErrorKind::Operational => "operational",
            ErrorKind::PartialFailure => "partial_failure",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidAmount(_)
            | Error::Validation(_)
            | Error::WalletExists(_)
            | Error::EmailTaken => ErrorKind::Validation,
            Error::WalletNotFound(_) | Error::NotFound(_) => ErrorKind::NotFound,
            Error::InsufficientFunds { .. } => ErrorKind::BusinessRule,
            Error::WalletProvisioning { .. } => ErrorKind::PartialFailure,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Database(_)
            | Error::Conflict(_)
            | Error::Busy { .. }
            | Error::Config(_)
            | Error::Io(_)
            | Error::Json(_) => ErrorKind::Operational,
        }
    }

    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Operational | ErrorKind::Cancelled)
    }

    /// Message safe to show an end user.
    ///
    /// Operational errors collapse to a generic retry hint so store
    /// internals never leak.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Operational => {
                "The service is temporarily unavailable, please try again".to_string()
            }
            ErrorKind::PartialFailure => {
                "Your account was created but its wallet was not; please retry wallet creation"
                    .to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            context: None,
        }
    }

    /// Create a successful result with context
    pub fn ok_with_context(data: T, context: HashMap<String, serde_json::Value>) -> Self {
        Self {
            context: Some(context),
            ..Self::ok(data)
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            error_kind: Some(kind),
            context: None,
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(e.user_message(), e.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::invalid_amount("-1").kind(), ErrorKind::Validation);
        assert_eq!(Error::EmailTaken.kind(), ErrorKind::Validation);
        assert_eq!(Error::WalletNotFound(Uuid::nil()).kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::InsufficientFunds {
                balance: Money::from_minor(6_000),
                requested: Money::from_minor(100_000),
            }
            .kind(),
            ErrorKind::BusinessRule
        );
        assert_eq!(Error::Busy { attempts: 3 }.kind(), ErrorKind::Operational);
        assert_eq!(
            Error::WalletProvisioning {
                owner_id: Uuid::nil(),
                reason: "disk full".into(),
            }
            .kind(),
            ErrorKind::PartialFailure
        );
    }

    #[test]
    fn test_user_message_hides_store_details() {
        let err = Error::database("IO Error: could not write /var/lib/tally/tally.duckdb");
        let msg = err.user_message();
        assert!(!msg.contains("duckdb"));
        assert!(msg.contains("try again"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_user_message_keeps_business_reason() {
        let err = Error::InsufficientFunds {
            balance: Money::from_minor(6_000),
            requested: Money::from_minor(100_000),
        };
        assert_eq!(
            err.user_message(),
            "Insufficient funds: balance 60.00, requested 1000.00"
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i32> = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_from_result() {
        let ok: Result<i32> = Ok(42);
        let result: OperationResult<i32> = ok.into();
        assert!(result.success);

        let err: Result<i32> = Err(Error::validation("bad input"));
        let result: OperationResult<i32> = err.into();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Validation));
        assert!(result.error.unwrap().contains("Validation error"));
    }
}
