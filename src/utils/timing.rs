use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::utils::logging::TIMING_TARGET;

/// Wall-clock bookkeeping for one generation run, written to the timing log.
#[derive(Debug)]
pub struct RunTimer {
    operation: String,
    date: String,
    attempt: usize,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    completed: bool,
}

impl RunTimer {
    pub fn start(operation: &str, date: &str, attempt: usize) -> Self {
        let timer = RunTimer {
            operation: operation.to_string(),
            date: date.to_string(),
            attempt,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            completed: false,
        };
        info!(
            target: TIMING_TARGET,
            "event=run_started operation={} date={} attempt={} started_at={}",
            timer.operation,
            timer.date,
            timer.attempt,
            timer.started_at.to_rfc3339()
        );
        timer
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started_perf.elapsed().as_secs_f64()
    }

    pub fn complete(&mut self, status: &str, detail: Option<String>) {
        if self.completed {
            return;
        }
        self.completed = true;
        info!(
            target: TIMING_TARGET,
            "event=run_completed operation={} date={} attempt={} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.operation,
            self.date,
            self.attempt,
            self.started_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
            self.elapsed_secs(),
            status,
            detail.unwrap_or_default()
        );
    }
}

impl Drop for RunTimer {
    fn drop(&mut self) {
        self.complete("aborted", None);
    }
}

pub async fn log_llm_timing<T, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, anyhow::Error>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: TIMING_TARGET,
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_err() { "error" } else { "success" };

    info!(
        target: TIMING_TARGET,
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        Utc::now().to_rfc3339(),
        started_perf.elapsed().as_secs_f64(),
        status,
        metadata_text
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_call_result() {
        let ok = log_llm_timing("test", "model", "op", None, || async { Ok(41 + 1) }).await;
        assert_eq!(ok.unwrap(), 42);

        let err = log_llm_timing::<(), _, _>("test", "model", "op", None, || async {
            Err(anyhow::anyhow!("boom"))
        })
        .await;
        assert_eq!(err.unwrap_err().to_string(), "boom");
    }

    #[test]
    fn completes_only_once() {
        let mut timer = RunTimer::start("generate", "2024-01-01", 1);
        timer.complete("success", None);
        assert!(timer.completed);
        timer.complete("error", Some("ignored".to_string()));
        assert!(timer.elapsed_secs() >= 0.0);
    }
}
