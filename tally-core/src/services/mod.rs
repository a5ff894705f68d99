//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case and holds the store it was given.

mod doctor;
mod ledger;
pub mod logging;
pub mod migration;
mod movement;
mod onboarding;
mod status;

pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary};
pub use ledger::LedgerService;
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use movement::{CancelToken, MovementOptions, MovementService, Receipt, RetryPolicy};
pub use onboarding::{OnboardingService, Registration};
pub use status::{StatusService, StatusSummary};
