use std::{sync::Arc, time::Duration};

use ensemble::command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    command_executor::transport::AcmdSender,
    controller::multi_axis::Axes,
    models::{AxisId, FeedbackSink, SharedState},
};

/// Round-robins position, motor current and position-error feedback for both
/// axes on the lowest-priority channel, publishing into shared state and to
/// the optional observer.
pub struct FeedbackMonitor {
    feedback_cs: AcmdSender,
    axes: Axes,
    shared: Arc<Mutex<SharedState>>,
    sink: Option<FeedbackSink>,
    poll_interval: Duration,
}

impl FeedbackMonitor {
    pub fn new(
        feedback_cs: AcmdSender,
        axes: Axes,
        shared: Arc<Mutex<SharedState>>,
        sink: Option<FeedbackSink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            feedback_cs,
            axes,
            shared,
            sink,
            poll_interval,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            interval.tick().await;

            for id in AxisId::ALL {
                self.poll_axis(id).await;
            }
        }
    }

    /// Stale values are left in place when a read fails; the next cycle
    /// refreshes them.
    async fn poll_axis(&self, id: AxisId) {
        let name = self.axes.by_id(id).wire_name().to_string();

        let position = self
            .feedback_cs
            .acmd_f64(command::position_feedback(&name))
            .await;
        let current = self
            .feedback_cs
            .acmd_f64(command::current_feedback(&name))
            .await;
        let error = self
            .feedback_cs
            .acmd_f64(command::position_error(&name))
            .await;

        let snapshot = {
            let mut shared = self.shared.lock().await;
            let feedback = shared.feedback_mut(id);

            match position {
                Ok(position) => feedback.position = Some(position),
                Err(e) => debug!(axis = %name, "position feedback failed: {e}"),
            }
            // The amplifier reports amps; operators read milliamps.
            match current {
                Ok(current) => feedback.current_ma = Some((current * 1000.0).round()),
                Err(e) => debug!(axis = %name, "current feedback failed: {e}"),
            }
            match error {
                Ok(error) => feedback.position_error = Some(error),
                Err(e) => debug!(axis = %name, "position error feedback failed: {e}"),
            }

            *feedback
        };

        if let Some(sink) = &self.sink {
            sink(id, snapshot);
        }
    }
}
