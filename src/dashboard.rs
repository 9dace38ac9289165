//! Per-window cycle coordinator
//!
//! One task owns every window's state. Requests arrive as
//! [`DashboardCommand`]s, each cycle runs in its own task and reports back
//! over a second channel, and every state change is published as an
//! immutable [`DashboardSnapshot`] on a watch channel. User-facing messages
//! go out as [`Notice`]s on a broadcast channel.

mod commands;
mod cycle;
mod types;

pub use commands::{CycleTicket, DashboardCommand};
pub use types::{CallRecord, CyclePhase, CycleSummary, DashboardSnapshot, Notice, WindowState};

use crate::aggregate::{self, Sign};
use crate::config::{Config, WindowConfig};
use crate::credentials::Credentials;
use crate::error::{HoraeError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::range::{self, DateRangeInput, ValidatedRange};
use crate::telemetry::TelemetrySource;
use chrono::{DateTime, Utc};
use commands::{CycleEvent, CycleOutcome};
use cycle::{CycleJob, Reducer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Shown when a cycle dies without producing a result
pub const CYCLE_FAILED_MESSAGE: &str = "Error fetching data. Please try again.";

const NOTICE_CAPACITY: usize = 100;

/// Startup inputs of the coordinator
#[derive(Debug, Clone)]
pub struct DashboardOptions {
    pub windows: Vec<WindowConfig>,
    pub date_range: DateRangeInput,
    pub metric_key: String,
    pub pacing: Duration,
}

impl DashboardOptions {
    /// Windows, metric and pacing from `config`; the date range trails `now`
    pub fn from_config(config: &Config, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            windows: config.dashboard.windows.clone(),
            date_range: config.dashboard.initial_date_range(now)?,
            metric_key: config.telemetry.metric_key.clone(),
            pacing: config.telemetry.pacing_delay(),
        })
    }
}

/// A cycle currently in flight for one window
struct ActiveCycle {
    cycle_id: String,
    started_at: DateTime<Utc>,
    range: ValidatedRange,
    from_time: String,
    to_time: String,
    done: Option<oneshot::Sender<CycleSummary>>,
}

/// Coordinator-private window record
struct Window {
    state: WindowState,
    active: Option<ActiveCycle>,
}

impl Window {
    fn new(config: &WindowConfig) -> Self {
        Self {
            state: WindowState {
                id: config.id.clone(),
                label: config.label.clone(),
                from_time: config.from_time.clone(),
                to_time: config.to_time.clone(),
                total: "0.00".to_string(),
                sign: Sign::Positive,
                busy: false,
                phase: CyclePhase::Idle,
                last_cycle: None,
            },
            active: None,
        }
    }
}

/// The state-owning coordinator task
pub struct Dashboard {
    windows: Vec<Window>,
    date_range: DateRangeInput,
    metric_key: String,
    reduce: Reducer,
    pacing: Duration,
    credentials: Arc<Credentials>,
    source: Arc<dyn TelemetrySource>,
    commands_rx: mpsc::UnboundedReceiver<DashboardCommand>,
    events_tx: mpsc::UnboundedSender<CycleEvent>,
    events_rx: mpsc::UnboundedReceiver<CycleEvent>,
    snapshot_tx: watch::Sender<Arc<DashboardSnapshot>>,
    notices_tx: broadcast::Sender<Notice>,
    logger: StructuredLogger,
}

/// Cloneable front door to a running [`Dashboard`]
#[derive(Clone)]
pub struct DashboardHandle {
    commands_tx: mpsc::UnboundedSender<DashboardCommand>,
    snapshot_rx: watch::Receiver<Arc<DashboardSnapshot>>,
    notices_tx: broadcast::Sender<Notice>,
}

impl Dashboard {
    /// Build the coordinator and its handle. Nothing runs until
    /// [`Dashboard::spawn`] or [`Dashboard::run`].
    pub fn new(
        options: DashboardOptions,
        credentials: Credentials,
        source: Arc<dyn TelemetrySource>,
    ) -> (Self, DashboardHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices_tx, _) = broadcast::channel(NOTICE_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(DashboardSnapshot {
            timestamp: Utc::now(),
            device_id: credentials.device_id().to_string(),
            date_range: options.date_range.clone(),
            windows: Vec::new(),
            any_busy: false,
        }));

        let windows: Vec<Window> = options.windows.iter().map(Window::new).collect();
        let mut dashboard = Self {
            windows,
            date_range: options.date_range,
            metric_key: options.metric_key,
            reduce: Arc::new(aggregate::reduce),
            pacing: options.pacing,
            credentials: Arc::new(credentials),
            source,
            commands_rx,
            events_tx,
            events_rx,
            snapshot_tx,
            notices_tx: notices_tx.clone(),
            logger: get_logger("dashboard"),
        };
        dashboard.publish();

        let handle = DashboardHandle {
            commands_tx,
            snapshot_rx,
            notices_tx,
        };
        (dashboard, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process commands and cycle events until every handle is gone and no
    /// cycle is left in flight
    pub async fn run(mut self) {
        self.logger.info(&format!(
            "Dashboard started with {} window(s), range {}..{}",
            self.windows.len(),
            self.date_range.from_date,
            self.date_range.to_date
        ));

        let mut accepting = true;
        loop {
            tokio::select! {
                cmd = self.commands_rx.recv(), if accepting => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => accepting = false,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }

            if !accepting && !self.any_busy() {
                break;
            }
        }

        self.logger.info("Dashboard stopped");
    }

    fn handle_command(&mut self, cmd: DashboardCommand) {
        match cmd {
            DashboardCommand::RunWindow { window_id, reply } => {
                let result = self.start_cycle(&window_id);
                let _ = reply.send(result);
            }
            DashboardCommand::SetDateRange { range, reply } => {
                self.logger.info(&format!(
                    "Date range set to {}..{}",
                    range.from_date, range.to_date
                ));
                self.date_range = range;
                self.publish();
                let _ = reply.send(());
            }
            DashboardCommand::SetWindowTimes {
                window_id,
                from_time,
                to_time,
                reply,
            } => {
                let result = match self.window_mut(&window_id) {
                    Some(window) => {
                        window.state.from_time = from_time;
                        window.state.to_time = to_time;
                        Ok(())
                    }
                    None => Err(HoraeError::not_found(format!("window {}", window_id))),
                };
                if result.is_ok() {
                    self.publish();
                }
                let _ = reply.send(result);
            }
        }
    }

    fn start_cycle(&mut self, window_id: &str) -> Result<CycleTicket> {
        let date_range = self.date_range.clone();
        let notices_tx = self.notices_tx.clone();
        let dashboard_logger = self.logger.clone();

        let Some(window) = self.window_mut(window_id) else {
            return Err(HoraeError::not_found(format!("window {}", window_id)));
        };

        if window.state.busy {
            let err = HoraeError::busy(window_id);
            emit_notice(
                &notices_tx,
                &dashboard_logger,
                Notice::RunRejected {
                    window_id: window_id.to_string(),
                    message: err.to_string(),
                },
            );
            return Err(err);
        }

        window.state.phase = CyclePhase::Validating;
        let validated = match range::validate(
            &date_range,
            &window.state.from_time,
            &window.state.to_time,
        ) {
            Ok(v) => v,
            Err(err) => {
                window.state.phase = CyclePhase::Idle;
                let message = match &err {
                    HoraeError::Validation { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                emit_notice(
                    &notices_tx,
                    &dashboard_logger,
                    Notice::ValidationFailed {
                        window_id: window_id.to_string(),
                        message,
                    },
                );
                return Err(err);
            }
        };

        let cycle_id = uuid::Uuid::new_v4().to_string();
        let (done_tx, done_rx) = oneshot::channel();

        window.state.busy = true;
        window.state.phase = CyclePhase::Fetching;
        window.active = Some(ActiveCycle {
            cycle_id: cycle_id.clone(),
            started_at: Utc::now(),
            range: validated,
            from_time: window.state.from_time.clone(),
            to_time: window.state.to_time.clone(),
            done: Some(done_tx),
        });

        let logger = self.logger.for_cycle(window_id, &cycle_id);
        logger.info(&format!(
            "Starting cycle over {} day(s) {}..{} {}-{}",
            validated.day_count(),
            validated.from_date,
            validated.to_date,
            validated.from_time.format("%H:%M"),
            validated.to_time.format("%H:%M")
        ));

        CycleJob {
            window_id: window_id.to_string(),
            cycle_id: cycle_id.clone(),
            descriptors: validated.descriptors(),
            credentials: Arc::clone(&self.credentials),
            source: Arc::clone(&self.source),
            metric_key: self.metric_key.clone(),
            reduce: Arc::clone(&self.reduce),
            pacing: self.pacing,
            events: self.events_tx.clone(),
            logger,
        }
        .spawn();

        self.publish();
        Ok(CycleTicket {
            cycle_id,
            done: done_rx,
        })
    }

    fn handle_event(&mut self, event: CycleEvent) {
        match event {
            CycleEvent::Aggregating {
                window_id,
                cycle_id,
            } => {
                let Some(window) = self.window_mut(&window_id) else {
                    return;
                };
                if is_current(window, &cycle_id) {
                    window.state.phase = CyclePhase::Aggregating;
                    self.publish();
                }
            }
            CycleEvent::Finished {
                window_id,
                cycle_id,
                outcome,
            } => self.finish_cycle(&window_id, &cycle_id, outcome),
        }
    }

    fn finish_cycle(&mut self, window_id: &str, cycle_id: &str, outcome: CycleOutcome) {
        let notices_tx = self.notices_tx.clone();
        let logger = self.logger.for_cycle(window_id, cycle_id);

        let Some(window) = self.window_mut(window_id) else {
            return;
        };
        if !is_current(window, cycle_id) {
            logger.warn("Ignoring result of a stale cycle");
            return;
        }
        let Some(mut active) = window.active.take() else {
            return;
        };

        let (calls, aggregate, error) = match outcome {
            CycleOutcome::Completed { calls, aggregate } => {
                window.state.total = aggregate.display_total();
                window.state.sign = aggregate.sign;
                if let Some((failed, total)) = aggregate.partial_failure() {
                    emit_notice(
                        &notices_tx,
                        &logger,
                        Notice::partial_failure(window_id, failed, total),
                    );
                }
                (calls, Some(aggregate), None)
            }
            CycleOutcome::Failed { message } => {
                logger.error(&format!("Cycle failed: {}", message));
                emit_notice(
                    &notices_tx,
                    &logger,
                    Notice::CycleFailed {
                        window_id: window_id.to_string(),
                        message: CYCLE_FAILED_MESSAGE.to_string(),
                    },
                );
                (Vec::new(), None, Some(message))
            }
        };

        let summary = CycleSummary {
            cycle_id: cycle_id.to_string(),
            window_id: window_id.to_string(),
            from_date: active.range.from_date,
            to_date: active.range.to_date,
            from_time: active.from_time,
            to_time: active.to_time,
            started_at: active.started_at,
            finished_at: Utc::now(),
            calls,
            aggregate,
            error,
        };

        window.state.busy = false;
        window.state.phase = CyclePhase::Idle;
        window.state.last_cycle = Some(summary.clone());
        logger.info(&format!(
            "Cycle finished: total={} sign={:?}",
            window.state.total, window.state.sign
        ));

        let done = active.done.take();
        self.publish();
        if let Some(done) = done {
            let _ = done.send(summary);
        }
    }

    fn window_mut(&mut self, id: &str) -> Option<&mut Window> {
        self.windows.iter_mut().find(|w| w.state.id == id)
    }

    fn any_busy(&self) -> bool {
        self.windows.iter().any(|w| w.state.busy)
    }

    fn publish(&mut self) {
        let snapshot = DashboardSnapshot {
            timestamp: Utc::now(),
            device_id: self.credentials.device_id().to_string(),
            date_range: self.date_range.clone(),
            windows: self.windows.iter().map(|w| w.state.clone()).collect(),
            any_busy: self.any_busy(),
        };
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }
}

fn emit_notice(notices_tx: &broadcast::Sender<Notice>, logger: &StructuredLogger, notice: Notice) {
    logger.warn(&format!("Notice for {}: {}", notice.window_id(), notice.message()));
    let _ = notices_tx.send(notice);
}

fn is_current(window: &Window, cycle_id: &str) -> bool {
    window
        .active
        .as_ref()
        .is_some_and(|a| a.cycle_id == cycle_id)
}

impl DashboardHandle {
    /// Ask the coordinator to start a cycle for `window_id`
    pub async fn run_window(&self, window_id: &str) -> Result<CycleTicket> {
        let (reply, rx) = oneshot::channel();
        self.send(DashboardCommand::RunWindow {
            window_id: window_id.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| stopped())?
    }

    /// Start a cycle and wait for it to finish
    pub async fn run_window_and_wait(&self, window_id: &str) -> Result<CycleSummary> {
        self.run_window(window_id).await?.wait().await
    }

    pub async fn set_date_range(&self, range: DateRangeInput) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(DashboardCommand::SetDateRange { range, reply })?;
        rx.await.map_err(|_| stopped())
    }

    pub async fn set_window_times(
        &self,
        window_id: &str,
        from_time: &str,
        to_time: &str,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(DashboardCommand::SetWindowTimes {
            window_id: window_id.to_string(),
            from_time: from_time.to_string(),
            to_time: to_time.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| stopped())?
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<DashboardSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    pub fn watch_snapshots(&self) -> watch::Receiver<Arc<DashboardSnapshot>> {
        self.snapshot_rx.clone()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices_tx.subscribe()
    }

    fn send(&self, cmd: DashboardCommand) -> Result<()> {
        self.commands_tx.send(cmd).map_err(|_| stopped())
    }
}

fn stopped() -> HoraeError {
    HoraeError::unexpected("Dashboard is not running")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::QueryResult;
    use crate::range::QueryDescriptor;
    use crate::telemetry::{Sample, TimeseriesResponse};

    struct Fixed;

    #[async_trait::async_trait]
    impl TelemetrySource for Fixed {
        async fn fetch(
            &self,
            _query: &QueryDescriptor,
            _credentials: &Credentials,
        ) -> Result<TimeseriesResponse> {
            Ok(TimeseriesResponse::default().with_metric("netkvah", vec![Sample::new(1, "1.25")]))
        }
    }

    fn options() -> DashboardOptions {
        DashboardOptions {
            windows: vec![WindowConfig {
                id: "w".to_string(),
                label: "W".to_string(),
                from_time: "00:00".to_string(),
                to_time: "02:00".to_string(),
            }],
            date_range: DateRangeInput::new("2025-09-20", "2025-09-21"),
            metric_key: "netkvah".to_string(),
            pacing: Duration::ZERO,
        }
    }

    #[test]
    fn initial_snapshot_has_zero_totals() {
        let creds = Credentials::new("dev", "tok").unwrap();
        let (_dashboard, handle) = Dashboard::new(options(), creds, Arc::new(Fixed));
        let snap = handle.snapshot();
        assert_eq!(snap.device_id, "dev");
        assert_eq!(snap.windows.len(), 1);
        assert_eq!(snap.windows[0].total, "0.00");
        assert_eq!(snap.windows[0].sign, Sign::Positive);
        assert!(!snap.any_busy);
    }

    #[tokio::test]
    async fn cycle_updates_total() {
        let creds = Credentials::new("dev", "tok").unwrap();
        let (dashboard, handle) = Dashboard::new(options(), creds, Arc::new(Fixed));
        dashboard.spawn();

        let summary = handle.run_window_and_wait("w").await.unwrap();
        assert_eq!(summary.calls.len(), 2);
        assert!(summary.error.is_none());

        let snap = handle.snapshot();
        let w = snap.window("w").unwrap();
        assert_eq!(w.total, "2.50");
        assert_eq!(w.sign, Sign::Positive);
        assert!(!w.busy);
        assert_eq!(w.phase, CyclePhase::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panic_while_aggregating_clears_busy() {
        let creds = Credentials::new("dev", "tok").unwrap();
        let (mut dashboard, handle) = Dashboard::new(options(), creds, Arc::new(Fixed));

        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = std::sync::Mutex::new(release_rx);
        dashboard.reduce = Arc::new(move |_: &str, _: &[QueryResult]| -> aggregate::WindowAggregate {
            let _ = release_rx.lock().unwrap().recv();
            panic!("reducer blew up");
        });
        dashboard.spawn();

        let mut snapshots = handle.watch_snapshots();
        let mut busy_seen = snapshots.clone();
        let (saw_busy_tx, saw_busy_rx) = oneshot::channel();
        let recorder = tokio::spawn(async move {
            let mut saw_busy_tx = Some(saw_busy_tx);
            let mut transitions = Vec::new();
            let mut last = false;
            while busy_seen.changed().await.is_ok() {
                let busy = busy_seen.borrow_and_update().window("w").is_some_and(|w| w.busy);
                if busy != last {
                    transitions.push(busy);
                    last = busy;
                }
                if busy {
                    if let Some(tx) = saw_busy_tx.take() {
                        let _ = tx.send(());
                    }
                }
                if !busy && !transitions.is_empty() {
                    break;
                }
            }
            transitions
        });
        let mut notices = handle.subscribe_notices();

        let ticket = handle.run_window("w").await.unwrap();
        snapshots
            .wait_for(|s| s.window("w").is_some_and(|w| w.phase == CyclePhase::Aggregating))
            .await
            .unwrap();
        saw_busy_rx.await.unwrap();

        release_tx.send(()).unwrap();
        let summary = ticket.wait().await.unwrap();
        assert!(summary.error.as_deref().unwrap().contains("panicked"));
        assert!(summary.aggregate.is_none());

        let snap = handle.snapshot();
        let w = snap.window("w").unwrap();
        assert!(!w.busy);
        assert_eq!(w.phase, CyclePhase::Idle);
        assert_eq!(w.total, "0.00");

        assert_eq!(recorder.await.unwrap(), vec![true, false]);
        assert!(matches!(notices.recv().await.unwrap(), Notice::CycleFailed { .. }));
    }

    #[tokio::test]
    async fn unknown_window_is_not_found() {
        let creds = Credentials::new("dev", "tok").unwrap();
        let (dashboard, handle) = Dashboard::new(options(), creds, Arc::new(Fixed));
        dashboard.spawn();

        let err = handle.run_window("nope").await.unwrap_err();
        assert!(matches!(err, HoraeError::NotFound { .. }));
        let err = handle.set_window_times("nope", "00:00", "01:00").await.unwrap_err();
        assert!(matches!(err, HoraeError::NotFound { .. }));
    }
}
