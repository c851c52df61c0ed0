//! Turn a failed attempt into the job's next status and retry fields.

use crate::job_store::{JobStatus, JobUpdate, VideoJob};

use super::policy::{ErrorKind, RetryDecision, RetryPolicy};

/// Where a failed attempt leaves the job.
#[derive(Debug, Clone, PartialEq)]
pub struct FailurePlan {
    pub to: JobStatus,
    pub update: JobUpdate,
}

/// The attempt that just failed is `job.retry_count + 1`. Retryable failures
/// go back to `retry_to` with `next_attempt_at` pushed out by the backoff;
/// once the bound is reached the job is `Failed`. Live streams are always
/// `Skipped`.
pub fn plan_failure(
    policy: &RetryPolicy,
    job: &VideoJob,
    retry_to: JobStatus,
    kind: ErrorKind,
    message: &str,
    now: i64,
) -> FailurePlan {
    let attempt = job.retry_count.saturating_add(1);
    match policy.decide(attempt, kind) {
        RetryDecision::RetryAfter(delay) => FailurePlan {
            to: retry_to,
            update: JobUpdate::default()
                .with_error(message)
                .with_retry(attempt, now + delay.as_secs() as i64),
        },
        RetryDecision::NoRetry => {
            let to = if kind == ErrorKind::LiveInProgress {
                JobStatus::Skipped
            } else {
                JobStatus::Failed
            };
            FailurePlan {
                to,
                update: JobUpdate::default()
                    .with_error(message)
                    .with_retry(attempt, now),
            }
        }
    }
}
