use tracing::error;

use super::single_axis::SingleAxis;
use crate::models::AxisId;

/// Both rig axes, addressed by id rather than positional index.
#[derive(Clone)]
pub struct Axes {
    pub scanhead: SingleAxis,
    pub pusher: SingleAxis,
}

impl Axes {
    pub fn new(scanhead: SingleAxis, pusher: SingleAxis) -> Self {
        Self { scanhead, pusher }
    }

    pub fn by_id(&self, id: AxisId) -> &SingleAxis {
        match id {
            AxisId::Scanhead => &self.scanhead,
            AxisId::Pusher => &self.pusher,
        }
    }

    pub fn all(&self) -> [&SingleAxis; 2] {
        [&self.scanhead, &self.pusher]
    }

    /// Best-effort disable of every axis; a failure is logged and the
    /// remaining axes are still attempted.
    pub async fn disable_all(&self) {
        for axis in self.all() {
            if let Err(e) = axis.disable().await {
                error!(axis = axis.wire_name(), "failed to disable axis: {e}");
            }
        }
    }
}
