use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};
use warehouse_mirror_core::{
    StateMirror,
    detections::MessageLog,
    fetch::SnapshotSource,
    scene::SceneGraph,
    snapshot::SnapshotMessage,
};

use crate::config::ViewerConfig;

/// Stopwatch that runs until every shelf is full.
#[derive(Debug, Clone, Copy)]
pub struct ShelfClock {
    started: Instant,
    stopped: Option<Duration>,
}

impl ShelfClock {
    pub fn start(now: Instant) -> Self {
        Self {
            started: now,
            stopped: None,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.stopped
            .unwrap_or_else(|| now.saturating_duration_since(self.started))
    }

    pub fn is_running(&self) -> bool {
        self.stopped.is_none()
    }

    /// Freezes the clock; later calls keep the first reading.
    pub fn stop(&mut self, now: Instant) -> Duration {
        *self
            .stopped
            .get_or_insert_with(|| now.saturating_duration_since(self.started))
    }
}

/// `mm:ss`
pub fn format_clock(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// `mm:ss.mmm`
pub fn format_clock_precise(elapsed: Duration) -> String {
    format!("{}.{:03}", format_clock(elapsed), elapsed.subsec_millis())
}

pub struct App {
    /// Local mirror of the simulated warehouse.
    pub mirror: StateMirror<SceneGraph>,
    pub clock: ShelfClock,
    pub messages: MessageLog,
    /// Last fetch or reconcile failure, shown in the status bar.
    pub last_error: Option<String>,
    /// The server has replayed its whole run.
    pub finished: bool,
    /// Flag to control the main loop.
    pub should_quit: bool,
    source: Box<dyn SnapshotSource>,
    poll_detections: bool,
    detection_interval: Duration,
    last_detection_poll: Option<Instant>,
    shelf_capacity: usize,
}

impl App {
    /// Fetches the initial snapshot and builds the mirror from it.
    pub fn new(mut source: Box<dyn SnapshotSource>, config: &ViewerConfig) -> Result<Self> {
        let mut mirror = StateMirror::new(SceneGraph::new(), config.mirror.clone());
        match source.init()? {
            SnapshotMessage::Snapshot(snapshot) => {
                mirror.initialize(&snapshot)?;
            }
            SnapshotMessage::End => {
                return Err(anyhow!("server reported the end of its run before init"));
            }
        }

        Ok(App {
            mirror,
            clock: ShelfClock::start(Instant::now()),
            messages: MessageLog::new(
                config.max_messages,
                Duration::from_millis(config.message_ttl_ms),
            ),
            last_error: None,
            finished: false,
            should_quit: false,
            source,
            poll_detections: config.detections,
            detection_interval: Duration::from_millis(config.detection_interval_ms),
            last_detection_poll: None,
            shelf_capacity: config.shelf_capacity,
        })
    }

    pub fn shelf_capacity(&self) -> usize {
        self.shelf_capacity
    }

    /// One fetch-then-reconcile cycle. A failed fetch keeps the stale state.
    pub fn tick(&mut self, now: Instant) {
        if !self.finished {
            self.poll_state();
        }
        if self.detections_due(now) {
            self.last_detection_poll = Some(now);
            match self.source.detections() {
                Ok(reports) => {
                    self.messages.ingest(&reports, now);
                }
                Err(e) => warn!(error = %e, "failed to fetch detections"),
            }
        }
        self.messages.expire(now);

        if self.clock.is_running() && self.mirror.all_shelves_full(self.shelf_capacity) {
            let spent = self.clock.stop(now);
            info!(
                "all shelves are full, time spent: {}",
                format_clock_precise(spent)
            );
        }
    }

    fn detections_due(&self, now: Instant) -> bool {
        self.poll_detections
            && self
                .last_detection_poll
                .is_none_or(|last| now.saturating_duration_since(last) >= self.detection_interval)
    }

    fn poll_state(&mut self) {
        match self.source.next() {
            Ok(SnapshotMessage::Snapshot(snapshot)) => match self.mirror.reconcile(&snapshot) {
                Ok(report) => {
                    debug!(
                        step = self.mirror.step(),
                        boxes_destroyed = report.boxes.destroyed,
                        "applied snapshot"
                    );
                    self.last_error = None;
                }
                Err(e) => {
                    warn!(error = %e, "rejected snapshot");
                    self.last_error = Some(e.to_string());
                }
            },
            Ok(SnapshotMessage::End) => {
                info!(step = self.mirror.step(), "simulation run finished");
                self.finished = true;
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch state, keeping last snapshot");
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Sets the quit flag.
    pub fn quit(&mut self) {
        self.should_quit = true;
    }
}
