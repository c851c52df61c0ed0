//! Retry and backoff policy.
//!
//! Collaborator failures are classified into an [`ErrorKind`]; the policy turns
//! the kind and the job's attempt count into a decision, and [`plan_failure`]
//! turns that into the status and retry fields written on the job. Retry state
//! lives on the job row, not in timers, so it survives restarts.

mod classify;
mod plan;
mod policy;

pub use classify::{classify_fetch_error, classify_transport_error};
pub use plan::{plan_failure, FailurePlan};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
