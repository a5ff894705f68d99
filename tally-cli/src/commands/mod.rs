//! CLI command implementations

pub mod balance;
pub mod doctor;
pub mod history;
pub mod logs;
pub mod movement;
pub mod register;
pub mod status;
pub mod wallet;

use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tally_core::{EntryPoint, ErrorKind, LogEvent, LoggingService, OperationResult, OwnerId, TallyContext};

use crate::output;

/// A failure that was already printed and logged; only the exit status is left
#[derive(Debug)]
pub struct Reported(pub ErrorKind);

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error", self.0.as_str())
    }
}

impl std::error::Error for Reported {}

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let tally_dir = get_tally_dir().ok()?;
    std::fs::create_dir_all(&tally_dir).ok()?;
    LoggingService::new(&tally_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the tally directory from environment or default
pub fn get_tally_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TALLY_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".tally"))
        .ok_or_else(|| anyhow!("Could not find home directory; set TALLY_DIR"))
}

/// Open the tally context for the configured data directory
pub fn get_context() -> Result<TallyContext> {
    let tally_dir = get_tally_dir()?;
    TallyContext::new(&tally_dir).context("Failed to initialize tally context")
}

/// Parse the verified owner ID handed over by the caller
pub fn parse_owner(owner: &str) -> Result<OwnerId> {
    Ok(owner.parse::<OwnerId>()?)
}

/// Print a core result as an `OperationResult` document.
///
/// A failure is returned as [`Reported`] so nothing else is printed.
pub fn print_json_result<T: Serialize>(result: tally_core::domain::result::Result<T>) -> Result<()> {
    let kind = result.as_ref().err().map(|e| e.kind());
    let document: OperationResult<T> = result.into();
    println!("{}", serde_json::to_string_pretty(&document)?);
    match kind {
        Some(kind) => Err(Reported(kind).into()),
        None => Ok(()),
    }
}

/// Print a core error the command has already logged, and hand back the
/// [`Reported`] marker so `main` only sets the exit status
pub fn report_error(err: &tally_core::Error) -> anyhow::Error {
    output::error(&err.user_message());
    Reported(err.kind()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{Error, Money};

    #[test]
    fn test_reported_error_keeps_kind() {
        let err = report_error(&Error::InsufficientFunds {
            balance: Money::from_minor(6_000),
            requested: Money::from_minor(100_000),
        });
        let reported = err.downcast_ref::<Reported>().unwrap();
        assert_eq!(reported.0, ErrorKind::BusinessRule);
    }

    #[test]
    fn test_unreported_errors_are_not_marked() {
        let err = anyhow!("settings.json is not valid JSON");
        assert!(err.downcast_ref::<Reported>().is_none());

        let core: anyhow::Error = Error::Cancelled.into();
        assert!(core.downcast_ref::<Reported>().is_none());
        assert!(core.downcast_ref::<Error>().is_some());
    }

    #[test]
    fn test_json_failure_is_reported() {
        let result: tally_core::domain::result::Result<()> = Err(Error::not_found("wallet"));
        let err = print_json_result(result).unwrap_err();
        assert_eq!(err.downcast_ref::<Reported>().unwrap().0, ErrorKind::NotFound);
    }
}
