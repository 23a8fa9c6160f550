use std::sync::Arc;

use tokio::sync::oneshot;

use crate::controller::scan_planner::ScanParameters;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisId {
    Scanhead,
    Pusher,
}

impl AxisId {
    pub const ALL: [AxisId; 2] = [AxisId::Scanhead, AxisId::Pusher];

    pub fn label(&self) -> &'static str {
        match self {
            AxisId::Scanhead => "Scanhead",
            AxisId::Pusher => "Pusher",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AxisFeedback {
    pub position: Option<f64>,
    pub current_ma: Option<f64>,
    pub position_error: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanProgress {
    pub state: ScanState,
    pub waypoint: usize,
    pub remaining_secs: f64,
}

/// Snapshot state published by the monitors and the scan sequencer, read by
/// the service and whatever front end is attached.
#[derive(Debug, Default)]
pub struct SharedState {
    pub scanhead: AxisFeedback,
    pub pusher: AxisFeedback,
    pub scan: ScanProgress,
    pub fault: Option<String>,
}

impl SharedState {
    pub fn feedback(&self, axis: AxisId) -> &AxisFeedback {
        match axis {
            AxisId::Scanhead => &self.scanhead,
            AxisId::Pusher => &self.pusher,
        }
    }

    pub fn feedback_mut(&mut self, axis: AxisId) -> &mut AxisFeedback {
        match axis {
            AxisId::Scanhead => &mut self.scanhead,
            AxisId::Pusher => &mut self.pusher,
        }
    }
}

/// Observer for feedback values, fed by the feedback monitor.
pub type FeedbackSink = Arc<dyn Fn(AxisId, AxisFeedback) + Send + Sync>;

/// Observer for operator-facing status and fault text.
pub type StatusSink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JogDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone)]
pub enum RigCommand {
    EnableAxis { axis: AxisId },
    DisableAxis { axis: AxisId },
    Jog { axis: AxisId, direction: JogDirection, speed: f64 },
    StopJog { axis: AxisId },
    /// No-op when `target` is absent.
    MoveAbsolute { axis: AxisId, target: Option<f64>, speed: f64 },
    MoveIncremental { axis: AxisId, distance: f64, speed: f64 },
    SetPositionOffset { axis: AxisId, value: f64 },
    StartScan(ScanParameters),
    PauseScan,
    ResumeScan,
    StopScan,
    ScanStatus,
    AcknowledgeFaults,
    Reset,
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub enum CommandResponse {
    Success,
    AxisEnabled(bool),
    Progress(ScanProgress),
}

#[derive(Debug, Clone)]
pub struct CommandError {
    pub message: String,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.message.fmt(f)
    }
}

impl CommandError {
    pub fn new(message: impl ToString) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

pub struct CommandEnvelope {
    pub command: RigCommand,
    pub response: oneshot::Sender<Result<CommandResponse, CommandError>>,
}
