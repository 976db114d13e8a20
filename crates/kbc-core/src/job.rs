//! Polling for long-running server-side jobs (branch creation, table export).
//!
//! The wait between polls is `min(2^attempt, cap)` seconds. The attempt
//! counter starts at 1 and is bumped before every sleep, so the waits run
//! 4s, 8s, 16s, 20s, 20s, ... with the default 20s cap.

use crate::client::ApiClient;
use crate::error::{KbcError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

// ---------------------------------------------------------------------------
// PollPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Total time spent sleeping before giving up.
    pub max_wait: Duration,
    /// Optional cap on the number of status fetches.
    pub max_attempts: Option<u32>,
    /// Upper bound for a single wait.
    pub max_delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(30 * 60),
            max_attempts: None,
            max_delay: Duration::from_secs(20),
        }
    }
}

impl PollPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.max_delay)
    }
}

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

pub fn job_status(job: &Value) -> &str {
    job.get("status").and_then(Value::as_str).unwrap_or("unknown")
}

pub fn is_terminal(job: &Value) -> bool {
    matches!(job_status(job), "success" | "error")
}

/// Fetch job status until it reaches `success` or `error` and return that
/// payload. An `error` job is returned as `Ok`; callers decide what it means.
pub fn poll_until_terminal<F>(
    label: &str,
    mut fetch: F,
    policy: &PollPolicy,
    sleeper: &dyn Sleeper,
) -> Result<Value>
where
    F: FnMut() -> Result<Value>,
{
    let mut attempt: u32 = 1;
    let mut polls: u32 = 0;
    let mut waited = Duration::ZERO;
    loop {
        let job = fetch()?;
        polls += 1;
        if is_terminal(&job) {
            tracing::debug!(job = label, polls, status = job_status(&job), "job finished");
            return Ok(job);
        }
        let exhausted_attempts = policy.max_attempts.is_some_and(|max| polls >= max);
        attempt = attempt.saturating_add(1);
        let delay = policy.delay_for(attempt);
        if exhausted_attempts || waited + delay > policy.max_wait {
            return Err(KbcError::PollTimeout {
                url: label.to_string(),
                attempts: polls,
                last_status: job_status(&job).to_string(),
            });
        }
        tracing::debug!(job = label, status = job_status(&job), ?delay, "job still running");
        sleeper.sleep(delay);
        waited += delay;
    }
}

impl ApiClient {
    /// Block until the job behind `url` (an absolute status link returned by
    /// the API) reaches a terminal status.
    pub fn wait_for_job(&self, url: &str, policy: &PollPolicy, sleeper: &dyn Sleeper) -> Result<Value> {
        poll_until_terminal(url, || self.get_url(url), policy, sleeper)
    }
}

/// Turn a terminal `error` job into an error; pass `success` through.
pub fn expect_success(job: Value) -> Result<Value> {
    if job_status(&job) == "success" {
        return Ok(job);
    }
    let message = job
        .pointer("/result/message")
        .or_else(|| job.pointer("/error/message"))
        .and_then(Value::as_str)
        .unwrap_or("job failed")
        .to_string();
    Err(KbcError::Api {
        method: "JOB".to_string(),
        url: job
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        status: 500,
        body: serde_json::json!({ "message": message, "job": job }),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
