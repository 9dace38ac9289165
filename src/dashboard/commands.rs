use super::types::{CallRecord, CycleSummary};
use crate::aggregate::WindowAggregate;
use crate::error::{HoraeError, Result};
use crate::range::DateRangeInput;
use tokio::sync::oneshot;

/// Requests accepted by the dashboard coordinator
#[derive(Debug)]
pub enum DashboardCommand {
    RunWindow {
        window_id: String,
        reply: oneshot::Sender<Result<CycleTicket>>,
    },
    SetDateRange {
        range: DateRangeInput,
        reply: oneshot::Sender<()>,
    },
    SetWindowTimes {
        window_id: String,
        from_time: String,
        to_time: String,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Progress reported by a running cycle back to the coordinator
#[derive(Debug)]
pub(crate) enum CycleEvent {
    Aggregating {
        window_id: String,
        cycle_id: String,
    },
    Finished {
        window_id: String,
        cycle_id: String,
        outcome: CycleOutcome,
    },
}

#[derive(Debug)]
pub(crate) enum CycleOutcome {
    Completed {
        calls: Vec<CallRecord>,
        aggregate: WindowAggregate,
    },
    Failed {
        message: String,
    },
}

/// Handed out when a cycle starts; resolves once the window is idle again
#[derive(Debug)]
pub struct CycleTicket {
    pub cycle_id: String,
    pub(crate) done: oneshot::Receiver<CycleSummary>,
}

impl CycleTicket {
    /// Wait for the cycle to finish
    pub async fn wait(self) -> Result<CycleSummary> {
        self.done
            .await
            .map_err(|_| HoraeError::unexpected("Dashboard stopped before the cycle finished"))
    }
}
