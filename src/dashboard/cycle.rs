use super::commands::{CycleEvent, CycleOutcome};
use super::types::CallRecord;
use crate::aggregate::WindowAggregate;
use crate::credentials::Credentials;
use crate::executor::{QueryResult, execute_sequential};
use crate::logging::StructuredLogger;
use crate::range::QueryDescriptor;
use crate::telemetry::TelemetrySource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Folds a cycle's call results into the window aggregate
pub(crate) type Reducer = Arc<dyn Fn(&str, &[QueryResult]) -> WindowAggregate + Send + Sync>;

/// Everything one fetch-and-aggregate cycle needs, detached from the coordinator
pub(crate) struct CycleJob {
    pub window_id: String,
    pub cycle_id: String,
    pub descriptors: Vec<QueryDescriptor>,
    pub credentials: Arc<Credentials>,
    pub source: Arc<dyn TelemetrySource>,
    pub metric_key: String,
    pub reduce: Reducer,
    pub pacing: Duration,
    pub events: mpsc::UnboundedSender<CycleEvent>,
    pub logger: StructuredLogger,
}

impl CycleJob {
    /// Run the cycle in its own task.
    ///
    /// A watcher task always reports `Finished`, also when the cycle task
    /// panics, so the coordinator can clear the window's busy flag.
    pub fn spawn(self) {
        let events = self.events.clone();
        let window_id = self.window_id.clone();
        let cycle_id = self.cycle_id.clone();
        let logger = self.logger.clone();

        let task = tokio::spawn(self.run());
        tokio::spawn(async move {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let message = if e.is_panic() {
                        "cycle task panicked".to_string()
                    } else {
                        "cycle task was cancelled".to_string()
                    };
                    logger.error(&format!("Cycle aborted: {}", message));
                    CycleOutcome::Failed { message }
                }
            };
            let _ = events.send(CycleEvent::Finished {
                window_id,
                cycle_id,
                outcome,
            });
        });
    }

    async fn run(self) -> CycleOutcome {
        self.logger.info(&format!(
            "Fetching {} day(s) sequentially",
            self.descriptors.len()
        ));

        let results = execute_sequential(
            self.source.as_ref(),
            &self.descriptors,
            &self.credentials,
            self.pacing,
            &self.logger,
        )
        .await;

        let _ = self.events.send(CycleEvent::Aggregating {
            window_id: self.window_id.clone(),
            cycle_id: self.cycle_id.clone(),
        });

        let aggregate = (self.reduce)(&self.metric_key, &results);
        let calls = results
            .iter()
            .map(|r| CallRecord::from_result(r, &self.metric_key))
            .collect();

        self.logger.info(&format!(
            "Aggregated {} sample(s) from {}/{} successful call(s): total={}",
            aggregate.samples_used,
            aggregate.successful_calls,
            aggregate.total_calls,
            aggregate.display_total()
        ));
        if !aggregate.has_data() {
            self.logger.warn("No usable samples in range");
        }

        CycleOutcome::Completed { calls, aggregate }
    }
}
