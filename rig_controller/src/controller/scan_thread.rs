use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use ensemble::command;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};
use utilities::incremental_mean::IncrementalMean;

use crate::{
    command_executor::transport::{AcmdError, AcmdSender},
    config::ScanConfig,
    controller::scan_planner::{ScanParameters, Waypoint},
    models::{ScanState, SharedState},
};

#[derive(Debug, Clone, Copy)]
pub struct ScanTiming {
    pub poll_interval: Duration,
    pub remaining_update_interval: Duration,
    /// Acceptable difference between feedback and commanded position.
    pub in_position_window: f64,
    /// Plant limit on scanhead angular speed, deg/sec.
    pub max_scan_speed: f64,
    pub approach_scan_speed: f64,
    pub approach_index_speed: f64,
}

impl From<&ScanConfig> for ScanTiming {
    fn from(config: &ScanConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            remaining_update_interval: Duration::from_millis(config.remaining_update_interval_ms),
            in_position_window: config.in_position_window,
            max_scan_speed: config.max_scan_speed,
            approach_scan_speed: config.approach_scan_speed,
            approach_index_speed: config.approach_index_speed,
        }
    }
}

struct ScanFlags {
    running: AtomicBool,
    paused: AtomicBool,
}

/// Control surface of a running scan. Fault-driven and operator-driven
/// pauses go through the same abort+pause primitive.
#[derive(Clone)]
pub struct ScanHandle {
    flags: Arc<ScanFlags>,
    scan_cs: AcmdSender,
    scanhead: Arc<str>,
    pusher: Arc<str>,
    shared: Arc<Mutex<SharedState>>,
}

impl ScanHandle {
    pub fn is_active(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::SeqCst)
    }

    /// Aborts both axes; the sequencing loop stays alive and waits for
    /// `resume`. The device must acknowledge the aborts before the axes are
    /// trusted to be stationary.
    pub async fn pause(&self) {
        if !self.is_active() || self.flags.paused.swap(true, Ordering::SeqCst) {
            return;
        }

        self.abort_axes().await;
        self.set_state(ScanState::Paused).await;
        info!("scan paused");
    }

    pub async fn resume(&self) {
        if !self.is_active() || !self.flags.paused.swap(false, Ordering::SeqCst) {
            return;
        }

        self.set_state(ScanState::Running).await;
        info!("scan resumed");
    }

    pub async fn stop(&self) {
        if !self.flags.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.abort_axes().await;
        self.set_state(ScanState::Aborted).await;
        info!("scan stopped");
    }

    async fn abort_axes(&self) {
        for axis in [&self.scanhead, &self.pusher] {
            if let Err(e) = self.scan_cs.acmd(command::abort(axis)).await {
                warn!(axis = &**axis, "failed to abort axis: {e}");
            }
        }
    }

    async fn set_state(&self, state: ScanState) {
        self.shared.lock().await.scan.state = state;
    }
}

enum StepOutcome {
    Continue,
    Complete,
    FaultPause,
}

/// Walks the waypoint sequence, issuing the next move pair only when the
/// amplifier reports both axes enabled and in position at the current
/// target. All device traffic goes over the scan channel.
pub struct ScanThread {
    scan_cs: AcmdSender,
    scanhead: Arc<str>,
    pusher: Arc<str>,
    params: ScanParameters,
    points: Vec<Waypoint>,
    timing: ScanTiming,
    shared: Arc<Mutex<SharedState>>,
    flags: Arc<ScanFlags>,

    scan_leg: IncrementalMean,
    index_leg: IncrementalMean,
    current: usize,
    movement_start: Instant,
    carried: Duration,
    last_estimate: Instant,
}

impl ScanThread {
    pub fn new(
        scan_cs: AcmdSender,
        scanhead: &str,
        pusher: &str,
        params: ScanParameters,
        points: Vec<Waypoint>,
        timing: ScanTiming,
        shared: Arc<Mutex<SharedState>>,
    ) -> Self {
        // Leg averages start from the planned estimates and shift toward
        // observed durations as legs complete.
        let scan_leg =
            IncrementalMean::seeded((params.scan_stop - params.scan_start).abs() / params.scan_speed);
        let index_leg = IncrementalMean::seeded((params.index_size / params.index_speed).abs());

        Self {
            scan_cs,
            scanhead: Arc::from(scanhead),
            pusher: Arc::from(pusher),
            params,
            points,
            timing,
            shared,
            flags: Arc::new(ScanFlags {
                running: AtomicBool::new(true),
                paused: AtomicBool::new(false),
            }),
            scan_leg,
            index_leg,
            current: 0,
            movement_start: Instant::now(),
            carried: Duration::ZERO,
            last_estimate: Instant::now(),
        }
    }

    pub fn handle(&self) -> ScanHandle {
        ScanHandle {
            flags: self.flags.clone(),
            scan_cs: self.scan_cs.clone(),
            scanhead: self.scanhead.clone(),
            pusher: self.pusher.clone(),
            shared: self.shared.clone(),
        }
    }

    pub fn spawn(self) -> ScanHandle {
        let handle = self.handle();
        tokio::spawn(self.run());
        handle
    }

    pub async fn run(mut self) {
        info!(waypoints = self.points.len(), "scan started");
        self.publish_state(ScanState::Running).await;

        let mut interval = tokio::time::interval(self.timing.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut was_paused = false;

        while self.flags.running.load(Ordering::SeqCst) {
            interval.tick().await;

            if self.flags.paused.load(Ordering::SeqCst) {
                if !was_paused {
                    // Keep the partial leg time so a resumed leg is still
                    // measured over its true movement duration.
                    self.carried += self.movement_start.elapsed();
                    was_paused = true;
                }
                continue;
            }

            if was_paused {
                self.movement_start = Instant::now();
                was_paused = false;
            }

            if self.current != 0
                && self.last_estimate.elapsed() >= self.timing.remaining_update_interval
            {
                if let Err(e) = self.refresh_remaining_time().await {
                    warn!("remaining-time update failed: {e}");
                }
                self.last_estimate = Instant::now();
            }

            match self.step().await {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Complete) => {
                    self.flags.running.store(false, Ordering::SeqCst);
                    self.handle().abort_axes().await;
                    self.publish_state(ScanState::Completed).await;
                    info!("scan complete");
                    return;
                }
                Ok(StepOutcome::FaultPause) => {
                    warn!("axis disabled during scan; pausing");
                    self.handle().pause().await;
                }
                // Loss of the transport itself must not leave motion
                // running; other transaction failures retry next tick.
                Err(e) => {
                    if matches!(e, AcmdError::Link(_)) {
                        warn!("transport failed during scan: {e}; pausing");
                        self.handle().pause().await;
                    } else {
                        warn!("scan tick failed: {e}");
                    }
                }
            }
        }
    }

    async fn step(&mut self) -> Result<StepOutcome, AcmdError> {
        let scan_status = self.scan_cs.axis_status(&self.scanhead).await?;
        if !scan_status.is_enabled() {
            return Ok(StepOutcome::FaultPause);
        }
        if !scan_status.is_in_position() {
            return Ok(StepOutcome::Continue);
        }

        let index_status = self.scan_cs.axis_status(&self.pusher).await?;
        if !index_status.is_enabled() {
            return Ok(StepOutcome::FaultPause);
        }
        if !index_status.is_in_position() {
            return Ok(StepOutcome::Continue);
        }

        let scan_pos = self
            .scan_cs
            .acmd_f64(command::position_feedback(&self.scanhead))
            .await?;
        let index_pos = self
            .scan_cs
            .acmd_f64(command::position_feedback(&self.pusher))
            .await?;

        let target = self.points[self.current];
        let window = self.timing.in_position_window;

        if (scan_pos - target.scan).abs() < window && (index_pos - target.index).abs() < window {
            self.record_leg();

            if self.current + 1 == self.points.len() {
                return Ok(StepOutcome::Complete);
            }

            self.current += 1;
            self.shared.lock().await.scan.waypoint = self.current;
            self.issue_moves(false).await?;
        } else {
            // In position but not at the commanded vertex: approach it
            // (scan startup, or the first tick after a resume).
            self.issue_moves(self.current == 0).await?;
        }

        Ok(StepOutcome::Continue)
    }

    /// Fold the finished leg's duration into the moving axis's average.
    /// Arrival at the first vertex only starts the clock.
    fn record_leg(&mut self) {
        let elapsed = (self.carried + self.movement_start.elapsed()).as_secs_f64();
        self.carried = Duration::ZERO;
        self.movement_start = Instant::now();

        if self.current == 0 {
            return;
        }

        let target = self.points[self.current];
        let previous = self.points[self.current - 1];

        if target.scan != previous.scan {
            self.scan_leg.record(elapsed);
        } else if target.index != previous.index {
            self.index_leg.record(elapsed);
        }
    }

    async fn issue_moves(&self, approach: bool) -> Result<(), AcmdError> {
        let target = self.points[self.current];

        let (scan_speed, index_speed) = if approach {
            (
                self.timing.approach_scan_speed,
                self.timing.approach_index_speed,
            )
        } else {
            (self.converted_scan_speed(self.current), self.params.index_speed)
        };

        // A pause that arrived mid-tick already aborted both axes; do not
        // follow the abort with fresh motion.
        if self.flags.paused.load(Ordering::SeqCst) {
            return Ok(());
        }

        if scan_speed > 0.0 {
            self.scan_cs
                .acmd(command::move_absolute(&self.scanhead, target.scan, scan_speed))
                .await?;
        }
        self.scan_cs
            .acmd(command::move_absolute(&self.pusher, target.index, index_speed))
            .await?;

        Ok(())
    }

    /// Surface speed converted to the angular velocity of this leg, clamped
    /// to the plant's maximum rated circumferential speed. Zero when the
    /// scanhead does not move on this leg.
    fn converted_scan_speed(&self, i: usize) -> f64 {
        let target = self.points[i];
        let previous = self.points[i - 1];

        let dtheta = (target.scan - previous.scan).abs();
        if dtheta == 0.0 {
            return 0.0;
        }
        if target.travel <= 0.0 {
            return self.timing.max_scan_speed;
        }

        (dtheta / (target.travel / self.params.scan_speed)).min(self.timing.max_scan_speed)
    }

    /// Recompute the published estimate from observed leg durations: the
    /// proportional remainder of the leg in progress plus the role-average
    /// duration of every leg still ahead.
    async fn refresh_remaining_time(&mut self) -> Result<(), AcmdError> {
        let scan_pos = self
            .scan_cs
            .acmd_f64(command::position_feedback(&self.scanhead))
            .await?;
        let index_pos = self
            .scan_cs
            .acmd_f64(command::position_feedback(&self.pusher))
            .await?;

        let target = self.points[self.current];
        let previous = self.points[self.current - 1];
        let scan_leg_len = (target.scan - previous.scan).abs();
        let index_leg_len = (target.index - previous.index).abs();

        let mut remaining = 0.0;
        if scan_leg_len > 0.0 && index_leg_len == 0.0 {
            let fraction = ((scan_pos - target.scan).abs() / scan_leg_len).min(1.0);
            remaining += fraction * self.scan_leg.value();
        } else if index_leg_len > 0.0 && scan_leg_len == 0.0 {
            let fraction = ((index_pos - target.index).abs() / index_leg_len).min(1.0);
            remaining += fraction * self.index_leg.value();
        }

        for k in self.current + 1..self.points.len() {
            let scan_move = (self.points[k].scan - self.points[k - 1].scan).abs();
            let index_move = (self.points[k].index - self.points[k - 1].index).abs();

            if scan_move > 0.0 && index_move == 0.0 {
                remaining += self.scan_leg.value();
            } else if index_move > 0.0 {
                remaining += self.index_leg.value();
            }
        }

        self.shared.lock().await.scan.remaining_secs = remaining;
        Ok(())
    }

    async fn publish_state(&self, state: ScanState) {
        let mut shared = self.shared.lock().await;
        shared.scan.state = state;
        shared.scan.waypoint = self.current;

        match state {
            ScanState::Running if self.current == 0 => {
                shared.scan.remaining_secs =
                    self.points.first().map_or(0.0, |p| p.time_remaining);
            }
            ScanState::Completed => shared.scan.remaining_secs = 0.0,
            _ => {}
        }
    }
}
