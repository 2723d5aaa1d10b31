//! Real-time scheduler.
//!
//! Steps an assembly once per tick and hands every truth and delivered
//! reading to its destinations at the wall-clock moment it is due:
//!
//! ```text
//! tick n   event_time  = start + n·tick
//!          due         = anchor + n·tick/pace
//! truth    sent at due
//! reading  sent at due + delay/pace, arrival_time = event_time + delay
//! ```
//!
//! Deadlines are anchored to the moment the run starts, so the time spent
//! computing a tick never accumulates as drift. Each delivery runs as its
//! own task; the scheduler only returns once every task has finished and
//! every destination has been shut down.

use crate::config::{OverrunPolicy, RunnerConfig};
use crate::destinations::Routes;
use crate::error::{RunError, RunResult};
use crate::message::{shift_timestamp, Message};
use chrono::NaiveDateTime;
use iotsim_core::{Assembly, AssemblyTicker, Snapshot};
use iotsim_env::{DataView, RuntimeContext};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Totals for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub ticks: u64,
    /// Truth messages accepted by every routed sink
    pub truths_sent: u64,
    /// Reading messages accepted by every routed sink
    pub readings_sent: u64,
    /// Readings dropped by the network
    pub readings_lost: u64,
    /// Ticks on which a reader reported nothing
    pub readings_absent: u64,
    /// Ticks dropped under [`OverrunPolicy::Skip`]
    pub skipped: u64,
    pub sink_failures: u64,
}

/// Requests a graceful stop at the next tick boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Time base of a run.
struct Clock {
    /// Context time at launch
    anchor: Duration,
    /// Wall seconds per tick
    period: f64,
    start: NaiveDateTime,
    /// Simulated seconds per tick
    tick: f64,
}

#[derive(Debug, Default)]
struct Tally {
    truths_sent: AtomicU64,
    readings_sent: AtomicU64,
    sink_failures: AtomicU64,
}

/// Delivery totals, updated by each delivery task as it completes.
///
/// Totals accumulate over every run of the scheduler that owns it.
#[derive(Debug, Clone, Default)]
pub struct Progress(Arc<Tally>);

impl Progress {
    pub fn truths_sent(&self) -> u64 {
        self.0.truths_sent.load(Ordering::SeqCst)
    }

    pub fn readings_sent(&self) -> u64 {
        self.0.readings_sent.load(Ordering::SeqCst)
    }

    pub fn sink_failures(&self) -> u64 {
        self.0.sink_failures.load(Ordering::SeqCst)
    }

    fn record(&self, view: DataView, failures: u64) {
        if failures > 0 {
            self.0.sink_failures.fetch_add(failures, Ordering::SeqCst);
            return;
        }
        let counter = match view {
            DataView::Truth => &self.0.truths_sent,
            DataView::Reading => &self.0.readings_sent,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Deadline of tick `n` on the context clock; `None` past `Duration::MAX`.
pub fn tick_deadline(anchor: Duration, n: u64, period: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(n as f64 * period)
        .ok()
        .and_then(|d| anchor.checked_add(d))
}

/// Simulated time of tick `n`; `None` past chrono's range.
pub fn tick_event_time(start: NaiveDateTime, n: u64, tick: f64) -> Option<NaiveDateTime> {
    shift_timestamp(start, n as f64 * tick)
}

/// Drives an assembly in real time over a [`RuntimeContext`].
pub struct Scheduler<C: RuntimeContext> {
    ctx: Arc<C>,
    config: RunnerConfig,
    routes: Arc<Routes>,
    stop: StopHandle,
    progress: Progress,
}

impl<C: RuntimeContext> Scheduler<C> {
    pub fn new(ctx: Arc<C>, config: RunnerConfig, routes: Routes) -> RunResult<Self> {
        config.validate()?;
        for view in DataView::ALL {
            if routes.is_empty(view) {
                return Err(RunError::validation(format!("no destination routed for {}", view)));
            }
        }
        Ok(Self {
            ctx,
            config,
            routes: Arc::new(routes),
            stop: StopHandle::default(),
            progress: Progress::default(),
        })
    }

    /// Shares an existing stop handle instead of a fresh one.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Shares an existing progress tally instead of a fresh one.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    /// Runs `assembly` for the configured number of ticks.
    ///
    /// Stops early on an engine error, on an overrun under
    /// [`OverrunPolicy::Abort`], or when the stop handle fires. Deliveries
    /// already scheduled are always awaited before returning.
    pub async fn run(&self, mut assembly: Assembly) -> RunResult<RunReport> {
        if let Some(seed) = self.config.seed {
            assembly = assembly.with_seed(seed);
        }
        let name = self
            .config
            .name
            .clone()
            .unwrap_or_else(|| assembly.name().to_string());
        let wall_now = chrono::DateTime::<chrono::Local>::from(self.ctx.system_time()).naive_local();
        let start = self.config.resolve_start(wall_now)?;
        let tick = assembly.tick();
        let period = tick / self.config.pace;

        info!(
            assembly = %name,
            ticks = self.config.ticks,
            pace = self.config.pace,
            start = %start,
            "run started"
        );

        // Never sent on: the channel closes once every delivery task has
        // dropped its sender
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);
        let mut report = RunReport::default();
        let (truths_before, readings_before, failures_before) = (
            self.progress.truths_sent(),
            self.progress.readings_sent(),
            self.progress.sink_failures(),
        );
        let clock = Clock {
            anchor: self.ctx.now(),
            period,
            start,
            tick,
        };

        let result = match assembly.launch() {
            Ok(mut ticker) => {
                self.drive(&mut ticker, &name, &clock, &done_tx, &mut report)
                    .await
            }
            Err(e) => Err(e.into()),
        };

        drop(done_tx);
        let _ = done_rx.recv().await;
        report.truths_sent = self.progress.truths_sent() - truths_before;
        report.readings_sent = self.progress.readings_sent() - readings_before;
        report.sink_failures = self.progress.sink_failures() - failures_before;
        report.sink_failures += self.routes.shutdown_all().await as u64;

        match &result {
            Ok(()) => info!(
                assembly = %name,
                ticks = report.ticks,
                truths = report.truths_sent,
                readings = report.readings_sent,
                lost = report.readings_lost,
                skipped = report.skipped,
                "run finished"
            ),
            Err(e) => warn!(assembly = %name, ticks = report.ticks, error = %e, "run aborted"),
        }
        result.map(|()| report)
    }

    async fn drive(
        &self,
        ticker: &mut AssemblyTicker<'_>,
        name: &str,
        clock: &Clock,
        done: &mpsc::Sender<()>,
        report: &mut RunReport,
    ) -> RunResult<()> {
        let mut n = 0u64;
        while self.config.ticks == 0 || n < self.config.ticks {
            if self.stop.is_stopped() {
                info!(tick = n, "stop requested");
                break;
            }
            n += 1;
            let snapshot = ticker.step()?;
            report.ticks = n;

            let due = tick_deadline(clock.anchor, n, clock.period).ok_or(RunError::OutOfRange {
                tick: n,
                what: "deadline",
            })?;
            let late = self.ctx.now().saturating_sub(due).as_secs_f64();
            if late > self.config.overrun.tolerance {
                match self.config.overrun.policy {
                    OverrunPolicy::Abort => {
                        return Err(RunError::Overrun {
                            tick: n,
                            late_secs: late,
                        })
                    }
                    OverrunPolicy::Skip => {
                        warn!(tick = n, late_secs = late, "tick overran, skipped");
                        report.skipped += 1;
                        continue;
                    }
                }
            }

            let event_time =
                tick_event_time(clock.start, n, clock.tick).ok_or(RunError::OutOfRange {
                    tick: n,
                    what: "event time",
                })?;
            self.dispatch(name, &snapshot, due, event_time, done, report)?;
            trace!(tick = n, "tick dispatched");
            self.ctx.sleep_until(due).await;
        }
        Ok(())
    }

    /// Schedules the deliveries of one snapshot.
    fn dispatch(
        &self,
        name: &str,
        snapshot: &Snapshot,
        due: Duration,
        event_time: NaiveDateTime,
        done: &mpsc::Sender<()>,
        report: &mut RunReport,
    ) -> RunResult<()> {
        let format = self.config.message_format;

        for truth in snapshot.truths() {
            let message = Message::truth(name, &truth.signal, &truth.value, event_time);
            self.deliver(DataView::Truth, message.encode(format)?, due, done);
        }

        for reading in snapshot.all_readings() {
            let value = match &reading.value {
                Some(value) => value,
                None => {
                    report.readings_absent += 1;
                    continue;
                }
            };
            if !reading.arrived {
                debug!(signal = %reading.signal, tick = snapshot.tick(), "reading lost");
                report.readings_lost += 1;
                continue;
            }
            let out_of_range = |what| RunError::OutOfRange {
                tick: snapshot.tick(),
                what,
            };
            let arrival =
                shift_timestamp(event_time, reading.delay).ok_or_else(|| out_of_range("arrival time"))?;
            let message = Message::reading(name, &reading.signal, value, event_time, arrival);
            let deadline = Duration::try_from_secs_f64(reading.delay / self.config.pace)
                .ok()
                .and_then(|d| due.checked_add(d))
                .ok_or_else(|| out_of_range("reading deadline"))?;
            self.deliver(DataView::Reading, message.encode(format)?, deadline, done);
        }
        Ok(())
    }

    fn deliver(
        &self,
        view: DataView,
        message: String,
        deadline: Duration,
        done: &mpsc::Sender<()>,
    ) {
        let ctx = Arc::clone(&self.ctx);
        let routes = Arc::clone(&self.routes);
        let progress = self.progress.clone();
        let done = done.clone();
        self.ctx.spawn(view.as_str(), async move {
            ctx.sleep_until(deadline).await;
            let mut failures = 0;
            for (label, sink) in routes.sinks(view) {
                if let Err(e) = sink.send(&message).await {
                    warn!(destination = %label, error = %e, "send failed");
                    failures += 1;
                }
            }
            progress.record(view, failures);
            drop(done);
        });
    }
}
