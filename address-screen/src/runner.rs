//! Batch runner
//!
//! Drives every address through the rate limiter, the concurrency gate and
//! the risk client. Clients that rate-limit each attempt themselves (retries
//! included) are not limited a second time here.
//!
//! Failures stay with their own address: the run always yields exactly one
//! outcome per input record, in input order.

use crate::client::RiskClient;
use crate::config::Config;
use crate::error::{Result, ScreenError, ScreeningError};
use crate::gate::ConcurrencyGate;
use crate::rate_limiter::RateLimiter;
use crate::types::{AddressRecord, Outcome, RunSummary};
use chrono::Utc;
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Ordered outcomes plus totals
#[derive(Debug)]
pub struct RunReport {
    pub outcomes: Vec<Outcome>,
    pub summary: RunSummary,
}

pub struct BatchRunner {
    client: Arc<dyn RiskClient>,
    limiter: RateLimiter,
    gate: ConcurrencyGate,
    include_indirect: bool,
    deadline: Duration,
}

impl BatchRunner {
    pub fn new(config: &Config, client: Arc<dyn RiskClient>) -> Result<Self> {
        let rate = NonZeroU32::new(config.rate_limit)
            .ok_or_else(|| ScreenError::Config("rate limit must be at least 1".to_string()))?;
        let max_in_flight = NonZeroUsize::new(config.max_concurrent)
            .ok_or_else(|| ScreenError::Config("max concurrency must be at least 1".to_string()))?;

        Ok(Self {
            client,
            limiter: RateLimiter::per_second(rate),
            gate: ConcurrencyGate::new(max_in_flight),
            include_indirect: config.include_indirect,
            deadline: config.screen_deadline(),
        })
    }

    /// Screen every record to completion
    pub async fn run(&self, records: &[AddressRecord]) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let completed = AtomicUsize::new(0);

        let outcomes = self.screen_all(run_id, records, &completed).await;
        self.report(run_id, started_at, outcomes)
    }

    /// Screen every record unless `cancel` fires first. On cancellation no
    /// further address is admitted, in-flight calls are dropped and partial
    /// outcomes are discarded.
    pub async fn run_until_cancelled(
        &self,
        records: &[AddressRecord],
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let completed = AtomicUsize::new(0);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let completed = completed.load(Ordering::SeqCst);
                warn!(%run_id, completed, total = records.len(), "Screening run cancelled");
                Err(ScreenError::Cancelled { completed, total: records.len() })
            }
            outcomes = self.screen_all(run_id, records, &completed) => {
                Ok(self.report(run_id, started_at, outcomes))
            }
        }
    }

    async fn screen_all(
        &self,
        run_id: Uuid,
        records: &[AddressRecord],
        completed: &AtomicUsize,
    ) -> Vec<Outcome> {
        info!(
            %run_id,
            addresses = records.len(),
            max_in_flight = self.gate.max_in_flight(),
            rate_per_second = self.limiter.rate(),
            include_indirect = self.include_indirect,
            "Starting screening run"
        );

        self.gate
            .run(records, |_, record| async move {
                let outcome = self.screen_one(record).await;
                completed.fetch_add(1, Ordering::SeqCst);
                outcome
            })
            .await
    }

    async fn screen_one(&self, record: &AddressRecord) -> Outcome {
        if !self.client.limits_each_attempt() {
            self.limiter.acquire().await;
        }

        let call = self.client.screen(&record.address, self.include_indirect);
        let outcome = match tokio::time::timeout(self.deadline, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ScreeningError::timeout(self.deadline.as_secs())),
        };

        match &outcome {
            Ok(result) => debug!(
                index = record.index,
                address = %record.address,
                risk = ?result.risk,
                "Address screened"
            ),
            Err(e) => warn!(
                index = record.index,
                address = %record.address,
                detail = e.detail.as_deref().unwrap_or(""),
                "Failed to screen address: {}",
                e
            ),
        }
        outcome
    }

    fn report(&self, run_id: Uuid, started_at: chrono::DateTime<Utc>, outcomes: Vec<Outcome>) -> RunReport {
        let complete = outcomes.iter().filter(|o| o.is_ok()).count();
        let summary = RunSummary {
            run_id,
            total: outcomes.len(),
            complete,
            errors: outcomes.len() - complete,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            %run_id,
            "Screening complete: {} successful, {} errors",
            summary.complete, summary.errors
        );
        RunReport { outcomes, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RiskRating, RiskResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Answers from a fixed script keyed by address
    struct ScriptedClient {
        calls: Mutex<Vec<String>>,
        delay: Duration,
    }

    #[async_trait]
    impl RiskClient for ScriptedClient {
        async fn screen(&self, address: &str, _include_indirect: bool) -> std::result::Result<RiskResult, ScreeningError> {
            self.calls.lock().push(address.to_string());
            tokio::time::sleep(self.delay).await;
            match address {
                "hang" => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("deadline should fire first")
                }
                a if a.starts_with("bad") => Err(ScreeningError::api(400, "")),
                a if a.starts_with("severe") => Ok(RiskResult::complete(RiskRating::Severe)),
                _ => Ok(RiskResult::complete(RiskRating::Low)),
            }
        }
    }

    fn runner(delay: Duration) -> (BatchRunner, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient {
            calls: Mutex::new(Vec::new()),
            delay,
        });
        let mut config = Config::new("test-key");
        config.rate_limit = 100;
        config.max_concurrent = 3;
        config.screen_deadline_secs = 5;
        (BatchRunner::new(&config, client.clone()).unwrap(), client)
    }

    fn records(addresses: &[&str]) -> Vec<AddressRecord> {
        addresses
            .iter()
            .enumerate()
            .map(|(i, a)| AddressRecord::new(i, *a))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_outcomes_keep_order() {
        let (runner, _) = runner(Duration::from_millis(10));
        let report = runner.run(&records(&["A", "bad-B", "severe-C"])).await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.outcomes[0].as_ref().unwrap().risk, Some(RiskRating::Low));
        assert_eq!(
            report.outcomes[1].as_ref().unwrap_err().status_text(),
            "400 Bad Request"
        );
        assert_eq!(report.outcomes[2].as_ref().unwrap().risk, Some(RiskRating::Severe));
        assert_eq!(report.summary.complete, 2);
        assert_eq!(report.summary.errors, 1);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let (runner, client) = runner(Duration::ZERO);
        let report = runner.run(&[]).await;
        assert!(report.outcomes.is_empty());
        assert_eq!(report.summary.total, 0);
        assert!(client.calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_screened_independently() {
        let (runner, client) = runner(Duration::from_millis(1));
        let report = runner.run(&records(&["X", "X", "X"])).await;
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(client.calls.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_becomes_timeout_error() {
        let (runner, _) = runner(Duration::ZERO);
        let report = runner.run(&records(&["A", "hang", "B"])).await;

        let err = report.outcomes[1].as_ref().unwrap_err();
        assert_eq!(err.kind, crate::error::ScreeningErrorKind::Timeout);
        assert!(report.outcomes[0].is_ok());
        assert!(report.outcomes[2].is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_discards_results() {
        let (runner, client) = runner(Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let batch = records(&["A", "B", "C", "D", "E", "F", "G", "H"]);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let err = runner.run_until_cancelled(&batch, &cancel).await.unwrap_err();
        match err {
            ScreenError::Cancelled { completed, total } => {
                assert_eq!(total, 8);
                assert_eq!(completed, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Only the admitted addresses were ever sent
        assert_eq!(client.calls.lock().len(), 6);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (runner, client) = runner(Duration::ZERO);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = runner.run_until_cancelled(&records(&["A"]), &cancel).await;
        assert!(matches!(result, Err(ScreenError::Cancelled { completed: 0, total: 1 })));
        assert!(client.calls.lock().is_empty());
    }

    /// Takes its own limiter grants, like the HTTP client
    struct SelfLimitedClient;

    #[async_trait]
    impl RiskClient for SelfLimitedClient {
        async fn screen(&self, _address: &str, _include_indirect: bool) -> std::result::Result<RiskResult, ScreeningError> {
            Ok(RiskResult::complete(RiskRating::Low))
        }

        fn limits_each_attempt(&self) -> bool {
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_limited_client_not_limited_twice() {
        let mut config = Config::new("test-key");
        config.rate_limit = 1;
        let runner = BatchRunner::new(&config, Arc::new(SelfLimitedClient)).unwrap();
        let start = tokio::time::Instant::now();

        let report = runner.run(&records(&["A", "B", "C"])).await;

        assert_eq!(report.summary.complete, 3);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_limits_plain_client() {
        let (_, client) = runner(Duration::ZERO);
        let mut config = Config::new("test-key");
        config.rate_limit = 1;
        let runner = BatchRunner::new(&config, client).unwrap();
        let start = tokio::time::Instant::now();

        runner.run(&records(&["A", "B", "C"])).await;

        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
